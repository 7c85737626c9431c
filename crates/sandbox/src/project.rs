//! External project → sandbox lookup seam.
//!
//! The record store itself is owned elsewhere; this module only defines the
//! trait Helios consumes plus an in-memory implementation for wiring and
//! tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use helios_core::{Error, Result};

/// Sandbox assignment carried on a project record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxProvision {
    /// Sandbox id to hand to the registry.
    pub id: String,
    /// Optional credential (e.g., VNC password) for the sandbox.
    pub pass: Option<String>,
}

/// One project record, as far as Helios cares about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub project_id: String,
    pub sandbox: Option<SandboxProvision>,
}

/// Read access to the external project record store.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Fetch a project record; a missing project is `Error::NotFound`.
    async fn project(&self, project_id: &str) -> Result<ProjectRecord>;
}

/// Resolve the sandbox assignment for a project. Absence of the record or of
/// a sandbox id on it is a not-found condition.
pub async fn resolve_sandbox(
    store: &dyn ProjectStore,
    project_id: &str,
) -> Result<SandboxProvision> {
    let record = store.project(project_id).await?;
    record.sandbox.ok_or_else(|| {
        Error::not_found(format!("No sandbox found for project {}", project_id))
    })
}

/// In-memory project store.
#[derive(Default)]
pub struct InMemoryProjectStore {
    records: std::sync::RwLock<HashMap<String, ProjectRecord>>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: ProjectRecord) {
        self.records
            .write()
            .unwrap()
            .insert(record.project_id.clone(), record);
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn project(&self, project_id: &str) -> Result<ProjectRecord> {
        self.records
            .read()
            .unwrap()
            .get(project_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Project {} not found", project_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_provisioned_sandbox() {
        let store = InMemoryProjectStore::new();
        store.insert(ProjectRecord {
            project_id: "p1".into(),
            sandbox: Some(SandboxProvision {
                id: "sb-1".into(),
                pass: Some("vncpassword".into()),
            }),
        });

        let provision = resolve_sandbox(&store, "p1").await.unwrap();
        assert_eq!(provision.id, "sb-1");
        assert_eq!(provision.pass.as_deref(), Some("vncpassword"));
    }

    #[tokio::test]
    async fn missing_project_is_not_found() {
        let store = InMemoryProjectStore::new();
        let err = resolve_sandbox(&store, "ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn project_without_sandbox_is_not_found() {
        let store = InMemoryProjectStore::new();
        store.insert(ProjectRecord {
            project_id: "p2".into(),
            sandbox: None,
        });
        let err = resolve_sandbox(&store, "p2").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
