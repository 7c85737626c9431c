#![deny(unused)]
//! Core types, configuration, and error definitions for Helios.
//!
//! This crate provides the foundational building blocks shared by the
//! sandbox provisioning layer and the binary entry point.

pub mod config;
pub mod error;
pub mod fs_policy;

pub use self::config::{AppConfig, SandboxConfig};
pub use error::{Error, Result};
