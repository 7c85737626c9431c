#![deny(unused)]
//! Sandbox provisioning for Helios.
//!
//! This crate provisions and supervises ephemeral Docker-backed execution
//! environments for an external agent. Each sandbox is bound to a logical
//! id, a host workspace directory mounted at `/workspace`, a fixed set of
//! declared ports mapped to dynamically allocated host ports, and a
//! command-execution channel.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  CommandExecutor (agent-facing exec bridge) │
//! │    ↓ get_or_start(id)                       │
//! ├─────────────────────────────────────────────┤
//! │  SandboxRegistry (id → handle, self-healing)│
//! │    ↓ owns                                   │
//! ├─────────────────────────────────────────────┤
//! │  SandboxHandle (one container's lifecycle)  │
//! │    ↓ ContainerRuntime trait                 │
//! ├─────────────────────────────────────────────┤
//! │  DockerRuntime (bollard) / MockRuntime      │
//! │    host workspace ↔ /workspace (rw bind)    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use helios_sandbox::{CommandExecutor, DockerRuntime, RunRequest, SandboxRegistry};
//!
//! let runtime = Arc::new(DockerRuntime::new(5)?);
//! let registry = Arc::new(SandboxRegistry::new(runtime, config.sandbox));
//!
//! let executor = CommandExecutor::new(registry.clone(), "agent-1");
//! let outcome = executor.run(RunRequest::new("echo hi")).await;
//! ```

pub mod executor;
pub mod handle;
pub mod ports;
pub mod project;
pub mod registry;
pub mod runtime;
pub mod workspace;

pub use executor::{CommandExecutor, RunOutcome, RunRequest, DEFAULT_SESSION};
pub use handle::SandboxHandle;
pub use ports::PortMap;
pub use project::{InMemoryProjectStore, ProjectRecord, ProjectStore, SandboxProvision};
pub use registry::{SandboxOptions, SandboxRegistry};
pub use runtime::{
    ContainerRuntime, ContainerSpec, DockerRuntime, ExecResult, MockRuntime, SandboxStatus,
    WORKSPACE_MOUNT,
};
pub use workspace::{FileInfo, WorkspaceFs};
