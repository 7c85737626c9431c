//! Per-sandbox lifecycle handle.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use helios_core::{Error, Result};

use crate::ports::PortMap;
use crate::runtime::{ContainerRuntime, ContainerSpec, ExecResult, SandboxStatus};
use crate::workspace::WorkspaceFs;

/// In-process owner of one backing container's lifecycle.
///
/// A handle's id, image, workspace path and port map are fixed at
/// construction; only the container reference changes as the sandbox is
/// started and stopped. Exactly one backing container exists per live
/// handle.
pub struct SandboxHandle {
    id: String,
    image: String,
    command: String,
    ports: PortMap,
    env: HashMap<String, String>,
    host_workspace: PathBuf,
    container_name: String,
    container: tokio::sync::RwLock<Option<String>>,
    runtime: Arc<dyn ContainerRuntime>,
}

impl SandboxHandle {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        runtime: Arc<dyn ContainerRuntime>,
        id: String,
        image: String,
        command: String,
        ports: PortMap,
        env: HashMap<String, String>,
        host_workspace: PathBuf,
        name_prefix: &str,
    ) -> Self {
        // Deterministic name: prefix plus the id's first 8 characters, so a
        // restarted process maps the same id to the same container name.
        let short: String = id.chars().take(8).collect();
        let container_name = format!("{}{}", name_prefix, short);
        Self {
            id,
            image,
            command,
            ports,
            env,
            host_workspace,
            container_name,
            container: tokio::sync::RwLock::new(None),
            runtime,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn host_workspace(&self) -> &std::path::Path {
        &self.host_workspace
    }

    /// Port bindings assigned at creation; immutable for the handle's
    /// lifetime.
    pub fn ports(&self) -> &PortMap {
        &self.ports
    }

    /// The container id currently held, if any.
    pub async fn container_id(&self) -> Option<String> {
        self.container.read().await.clone()
    }

    /// Path-contained filesystem proxy for this sandbox's host workspace.
    pub async fn fs(&self) -> Result<WorkspaceFs> {
        WorkspaceFs::new(&self.host_workspace).await
    }

    fn container_spec(&self) -> ContainerSpec {
        ContainerSpec {
            name: self.container_name.clone(),
            image: self.image.clone(),
            command: self.command.clone(),
            ports: self.ports.clone(),
            env: self.env.clone(),
            host_workspace: self.host_workspace.clone(),
        }
    }

    /// Create the host workspace directory and start the backing container.
    ///
    /// A name conflict means a container with this handle's deterministic
    /// name already exists (a previous incarnation, or a stopped container
    /// being restarted): the pre-existing container is force-removed and the
    /// run retried exactly once. Any other fault propagates unchanged.
    pub async fn start(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.host_workspace).await?;

        let spec = self.container_spec();
        let container_id = match self.runtime.run(&spec).await {
            Ok(id) => id,
            Err(Error::NameConflict(msg)) => {
                tracing::warn!(
                    sandbox_id = %self.id,
                    container = %self.container_name,
                    "Container name conflict, removing existing container and retrying"
                );
                if let Err(remove_err) = self.runtime.remove(&self.container_name, true).await {
                    tracing::error!(
                        container = %self.container_name,
                        error = %remove_err,
                        "Failed to remove conflicting container"
                    );
                    return Err(Error::name_conflict(msg));
                }
                self.runtime.run(&spec).await?
            }
            Err(e) => return Err(e),
        };

        *self.container.write().await = Some(container_id);
        tracing::info!(sandbox_id = %self.id, container = %self.container_name, "Sandbox started");
        Ok(())
    }

    /// Stop and remove the backing container, clearing the local reference.
    /// Calling stop when no container is held is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let mut guard = self.container.write().await;
        if let Some(container_id) = guard.as_deref() {
            self.runtime.stop(container_id).await?;
            self.runtime.remove(container_id, false).await?;
            *guard = None;
            tracing::info!(sandbox_id = %self.id, "Sandbox stopped and removed");
        }
        Ok(())
    }

    /// Refresh and return the live container state, or the `not_created`
    /// sentinel if no container has ever been started.
    pub async fn status(&self) -> Result<SandboxStatus> {
        let guard = self.container.read().await;
        match guard.as_deref() {
            Some(container_id) => self.runtime.inspect_status(container_id).await,
            None => Ok(SandboxStatus::NotCreated),
        }
    }

    /// Run a shell command inside the running container. Nonzero exit is
    /// reported in the result, not as an error.
    pub async fn exec(&self, command: &str, timeout: Duration) -> Result<ExecResult> {
        let guard = self.container.read().await;
        let container_id = guard
            .as_deref()
            .ok_or_else(|| Error::not_found(format!("sandbox {} has no container", self.id)))?;
        self.runtime.exec(container_id, command, timeout).await
    }

    /// URL of the host port bound to the given declared container port.
    pub fn preview_url(&self, container_port: u16) -> Result<String> {
        let host_port = self.ports.get(&container_port).ok_or_else(|| {
            Error::not_found(format!(
                "no host mapping for container port {}",
                container_port
            ))
        })?;
        Ok(format!("http://127.0.0.1:{}", host_port))
    }
}

impl std::fmt::Debug for SandboxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxHandle")
            .field("id", &self.id)
            .field("image", &self.image)
            .field("container_name", &self.container_name)
            .field("ports", &self.ports)
            .field("host_workspace", &self.host_workspace)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use std::collections::BTreeMap;

    fn make_handle(runtime: Arc<MockRuntime>, dir: &std::path::Path) -> SandboxHandle {
        SandboxHandle::new(
            runtime,
            "test-sandbox-id".to_string(),
            "helios-sandbox:latest".to_string(),
            "sleep infinity".to_string(),
            BTreeMap::from([(8080, 49152)]),
            HashMap::new(),
            dir.join("test-sandbox-id"),
            "helios-sandbox-",
        )
    }

    #[tokio::test]
    async fn deterministic_container_name() {
        let runtime = Arc::new(MockRuntime::default());
        let dir = tempfile::tempdir().unwrap();
        let handle = make_handle(runtime, dir.path());
        assert_eq!(handle.container_name(), "helios-sandbox-test-san");
    }

    #[tokio::test]
    async fn status_before_start_is_not_created() {
        let runtime = Arc::new(MockRuntime::default());
        let dir = tempfile::tempdir().unwrap();
        let handle = make_handle(runtime, dir.path());
        assert_eq!(handle.status().await.unwrap(), SandboxStatus::NotCreated);
    }

    #[tokio::test]
    async fn start_creates_workspace_dir_and_container() {
        let runtime = Arc::new(MockRuntime::default());
        let dir = tempfile::tempdir().unwrap();
        let handle = make_handle(runtime.clone(), dir.path());

        handle.start().await.unwrap();
        assert!(handle.host_workspace().is_dir());
        assert!(handle.status().await.unwrap().is_running());
        assert_eq!(runtime.run_count(), 1);
    }

    #[tokio::test]
    async fn name_conflict_removes_and_retries_once() {
        let runtime = Arc::new(MockRuntime::default());
        let dir = tempfile::tempdir().unwrap();
        let handle = make_handle(runtime.clone(), dir.path());

        runtime.occupy_name(handle.container_name());
        handle.start().await.unwrap();
        assert!(handle.status().await.unwrap().is_running());
    }

    #[tokio::test]
    async fn unrelated_fault_is_not_retried() {
        let runtime = Arc::new(MockRuntime::default());
        let dir = tempfile::tempdir().unwrap();
        let handle = make_handle(runtime.clone(), dir.path());

        runtime.fail_next_run(Error::transport("daemon unreachable"));
        let err = handle.start().await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(runtime.run_count(), 0);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let runtime = Arc::new(MockRuntime::default());
        let dir = tempfile::tempdir().unwrap();
        let handle = make_handle(runtime.clone(), dir.path());

        // Stop before start: no-op
        handle.stop().await.unwrap();

        handle.start().await.unwrap();
        let container_id = handle.container_id().await.unwrap();
        handle.stop().await.unwrap();
        assert!(!runtime.exists(&container_id));
        assert_eq!(handle.status().await.unwrap(), SandboxStatus::NotCreated);

        // Second stop: no-op again
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn preview_url_for_declared_and_undeclared_ports() {
        let runtime = Arc::new(MockRuntime::default());
        let dir = tempfile::tempdir().unwrap();
        let handle = make_handle(runtime, dir.path());

        assert_eq!(handle.preview_url(8080).unwrap(), "http://127.0.0.1:49152");
        let err = handle.preview_url(9999).unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn exec_without_container_is_not_found() {
        let runtime = Arc::new(MockRuntime::default());
        let dir = tempfile::tempdir().unwrap();
        let handle = make_handle(runtime, dir.path());

        let err = handle
            .exec("echo hi", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
