//! Container runtime seam.
//!
//! This module provides the `ContainerRuntime` trait and a Docker-based
//! implementation using the `bollard` crate, plus an in-memory mock for
//! tests. Everything above this layer (handles, registry, executor) talks to
//! containers only through this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use helios_core::{Error, Result};

// =============================================================================
// Runtime Types
// =============================================================================

/// Observed state of a sandbox's backing container.
///
/// `NotCreated` is the sentinel for a handle that has never started a
/// container; the remaining variants mirror the Docker state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxStatus {
    NotCreated,
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
}

impl SandboxStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl std::fmt::Display for SandboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotCreated => "not_created",
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Removing => "removing",
            Self::Exited => "exited",
            Self::Dead => "dead",
        };
        write!(f, "{}", s)
    }
}

/// Result of executing a command inside a container.
///
/// The single concrete exec result shape: exit code plus the raw interleaved
/// stdout/stderr byte stream. Nonzero exit is data here, never an error.
/// Decoding to text is the caller's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResult {
    pub exit_code: i64,
    pub output: Vec<u8>,
    /// Whether the deadline elapsed before the command finished. When set,
    /// `output` holds whatever had been captured up to that point.
    pub timed_out: bool,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Everything needed to run one sandbox container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Deterministic container name (collisions surface as `NameConflict`).
    pub name: String,
    pub image: String,
    /// Startup command, whitespace-split into the container CMD.
    pub command: String,
    /// Declared container port → allocated host port.
    pub ports: BTreeMap<u16, u16>,
    pub env: HashMap<String, String>,
    /// Host directory bound read-write to `/workspace`.
    pub host_workspace: PathBuf,
}

/// Mount point for sandbox workspaces inside the container.
pub const WORKSPACE_MOUNT: &str = "/workspace";

// =============================================================================
// Container Runtime Trait
// =============================================================================

/// Trait for container runtime backends.
///
/// The default implementation drives the local Docker daemon via `bollard`.
/// Fault contract: a missing container/image maps to `Error::NotFound`
/// (the registry's staleness signal), a container name collision maps to
/// `Error::NameConflict` (retried once by the handle), and everything else
/// maps to `Error::Transport`.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Make sure the image is present locally, building it from the given
    /// context if absent. Idempotent; implementations serialize concurrent
    /// builds process-wide.
    async fn ensure_image(&self, image: &str, build_context: &Path) -> Result<()>;

    /// Create and start a container, returning its runtime id.
    async fn run(&self, spec: &ContainerSpec) -> Result<String>;

    /// Stop a running container.
    async fn stop(&self, container_id: &str) -> Result<()>;

    /// Remove a container by id or name.
    async fn remove(&self, name_or_id: &str, force: bool) -> Result<()>;

    /// Refresh and return the container's live state.
    async fn inspect_status(&self, container_id: &str) -> Result<SandboxStatus>;

    /// Execute `sh -c <command>` inside the container, enforcing the given
    /// deadline. Does not error on nonzero exit.
    async fn exec(&self, container_id: &str, command: &str, timeout: Duration)
        -> Result<ExecResult>;

    /// Whether the backend is reachable (e.g., Docker daemon running).
    async fn ping(&self) -> bool;
}

// =============================================================================
// Docker Runtime Implementation
// =============================================================================

/// Docker-based container runtime using the `bollard` crate.
pub struct DockerRuntime {
    docker: bollard::Docker,
    /// Serializes image builds so concurrent provisioning cannot trigger
    /// redundant builds of the same image.
    build_lock: tokio::sync::Mutex<()>,
    stop_grace_secs: u32,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon.
    pub fn new(stop_grace_secs: u32) -> Result<Self> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            Error::transport(format!(
                "Failed to connect to Docker daemon: {}. Is Docker running?",
                e
            ))
        })?;
        Ok(Self {
            docker,
            build_lock: tokio::sync::Mutex::new(()),
            stop_grace_secs,
        })
    }

    /// Create from an existing bollard client (for testing).
    pub fn from_client(docker: bollard::Docker, stop_grace_secs: u32) -> Self {
        Self {
            docker,
            build_lock: tokio::sync::Mutex::new(()),
            stop_grace_secs,
        }
    }

    fn map_err(context: &str, e: bollard::errors::Error) -> Error {
        match e {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => Error::not_found(format!("{}: {}", context, message)),
            bollard::errors::Error::DockerResponseServerError {
                status_code: 409,
                message,
            } => Error::name_conflict(format!("{}: {}", context, message)),
            other => Error::transport(format!("{}: {}", context, other)),
        }
    }

    /// Tar the build context in memory for the Docker build endpoint.
    async fn tar_context(build_context: &Path) -> Result<Vec<u8>> {
        let context = build_context.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let mut builder = tar::Builder::new(Vec::new());
            builder.append_dir_all(".", &context)?;
            Ok(builder.into_inner()?)
        })
        .await
        .map_err(|e| Error::internal(format!("tar task panicked: {}", e)))?
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ensure_image(&self, image: &str, build_context: &Path) -> Result<()> {
        use bollard::image::BuildImageOptions;
        use futures::StreamExt;

        let _guard = self.build_lock.lock().await;

        // Re-check under the lock: another task may have just built it.
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        tracing::info!(image = %image, context = %build_context.display(), "Image absent locally, building");

        let tar_bytes = Self::tar_context(build_context).await?;
        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_string(),
            t: image.to_string(),
            rm: true,
            ..Default::default()
        };

        let mut stream =
            self.docker
                .build_image(options, None, Some(tar_bytes.into()));
        while let Some(msg) = stream.next().await {
            let info = msg.map_err(|e| Self::map_err("image build failed", e))?;
            if let Some(err) = info.error {
                return Err(Error::transport(format!("image build failed: {}", err)));
            }
        }

        tracing::info!(image = %image, "Image built");
        Ok(())
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<String> {
        use bollard::container::{Config, CreateContainerOptions};
        use bollard::models::{HostConfig, PortBinding};

        let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
            .ports
            .keys()
            .map(|port| (format!("{}/tcp", port), HashMap::new()))
            .collect();

        let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = spec
            .ports
            .iter()
            .map(|(container_port, host_port)| {
                (
                    format!("{}/tcp", container_port),
                    Some(vec![PortBinding {
                        host_ip: Some("127.0.0.1".to_string()),
                        host_port: Some(host_port.to_string()),
                    }]),
                )
            })
            .collect();

        let host_config = HostConfig {
            binds: Some(vec![format!(
                "{}:{}:rw",
                spec.host_workspace.display(),
                WORKSPACE_MOUNT
            )]),
            port_bindings: Some(port_bindings),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.split_whitespace().map(String::from).collect()),
            env: Some(spec.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            labels: Some(HashMap::from([(
                "managed-by".to_string(),
                "helios-sandbox".to_string(),
            )])),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| Self::map_err("failed to create container", e))?;

        self.docker
            .start_container::<String>(&created.id, None)
            .await
            .map_err(|e| Self::map_err("failed to start container", e))?;

        tracing::info!(container = %spec.name, image = %spec.image, "Container started");
        Ok(created.id)
    }

    async fn stop(&self, container_id: &str) -> Result<()> {
        use bollard::container::StopContainerOptions;

        self.docker
            .stop_container(
                container_id,
                Some(StopContainerOptions {
                    t: self.stop_grace_secs as i64,
                }),
            )
            .await
            .map_err(|e| Self::map_err("failed to stop container", e))
    }

    async fn remove(&self, name_or_id: &str, force: bool) -> Result<()> {
        use bollard::container::RemoveContainerOptions;

        self.docker
            .remove_container(
                name_or_id,
                Some(RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| Self::map_err("failed to remove container", e))
    }

    async fn inspect_status(&self, container_id: &str) -> Result<SandboxStatus> {
        use bollard::models::ContainerStateStatusEnum as S;

        let inspect = self
            .docker
            .inspect_container(container_id, None)
            .await
            .map_err(|e| Self::map_err("failed to inspect container", e))?;

        let status = inspect
            .state
            .and_then(|state| state.status)
            .unwrap_or(S::EMPTY);

        Ok(match status {
            S::CREATED => SandboxStatus::Created,
            S::RUNNING => SandboxStatus::Running,
            S::PAUSED => SandboxStatus::Paused,
            S::RESTARTING => SandboxStatus::Restarting,
            S::REMOVING => SandboxStatus::Removing,
            S::EXITED => SandboxStatus::Exited,
            S::DEAD => SandboxStatus::Dead,
            S::EMPTY => SandboxStatus::Exited,
        })
    }

    async fn exec(
        &self,
        container_id: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<ExecResult> {
        use bollard::exec::{CreateExecOptions, StartExecResults};
        use futures::StreamExt;

        let exec_options = CreateExecOptions {
            cmd: Some(vec!["/bin/sh", "-c", command]),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(container_id, exec_options)
            .await
            .map_err(|e| Self::map_err("failed to create exec", e))?;

        let start_result = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| Self::map_err("failed to start exec", e))?;

        let mut output: Vec<u8> = Vec::new();

        if let StartExecResults::Attached {
            output: mut stream, ..
        } = start_result
        {
            let collect = async {
                while let Some(msg) = stream.next().await {
                    match msg {
                        Ok(bollard::container::LogOutput::StdOut { message })
                        | Ok(bollard::container::LogOutput::StdErr { message }) => {
                            output.extend_from_slice(&message);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            output.extend_from_slice(
                                format!("\n[runtime error: {}]", e).as_bytes(),
                            );
                            break;
                        }
                    }
                }
            };

            if tokio::time::timeout(timeout, collect).await.is_err() {
                tracing::warn!(container = %container_id, command = %command, "Exec timed out");
                return Ok(ExecResult {
                    exit_code: -1,
                    output,
                    timed_out: true,
                });
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| Self::map_err("failed to inspect exec", e))?;

        Ok(ExecResult {
            exit_code: inspect.exit_code.unwrap_or(-1),
            output,
            timed_out: false,
        })
    }

    async fn ping(&self) -> bool {
        self.docker.ping().await.is_ok()
    }
}

// =============================================================================
// Mock Runtime (for testing without Docker)
// =============================================================================

#[derive(Debug, Clone)]
struct MockContainer {
    name: String,
    running: bool,
}

#[derive(Default)]
struct MockState {
    containers: HashMap<String, MockContainer>,
    exec_responses: Vec<ExecResult>,
    run_count: usize,
    build_count: usize,
    image_present: bool,
    fail_next_run: Option<Error>,
}

/// In-memory container runtime for unit and integration tests.
///
/// Containers are entries in a map; tests can remove them out-of-band to
/// simulate external deletion, stop them to simulate crashes, or inject a
/// fault into the next `run` call.
#[derive(Default)]
pub struct MockRuntime {
    state: std::sync::Mutex<MockState>,
}

impl MockRuntime {
    /// Create a mock with predefined exec responses, consumed in order.
    pub fn with_exec_responses(responses: Vec<ExecResult>) -> Self {
        let mock = Self::default();
        mock.state.lock().unwrap().exec_responses = responses;
        mock
    }

    /// Simulate external removal of a container (e.g., `docker rm -f`).
    pub fn vanish(&self, container_id: &str) {
        self.state.lock().unwrap().containers.remove(container_id);
    }

    /// Simulate a container stopping without being removed.
    pub fn halt(&self, container_id: &str) {
        if let Some(c) = self.state.lock().unwrap().containers.get_mut(container_id) {
            c.running = false;
        }
    }

    /// Pre-register a container under the given name so the next `run` with
    /// that name collides.
    pub fn occupy_name(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        let id = format!("mock-preexisting-{}", name);
        state.containers.insert(
            id,
            MockContainer {
                name: name.to_string(),
                running: true,
            },
        );
    }

    /// Make the next `run` call fail with the given error.
    pub fn fail_next_run(&self, err: Error) {
        self.state.lock().unwrap().fail_next_run = Some(err);
    }

    /// Number of successful `run` calls so far.
    pub fn run_count(&self) -> usize {
        self.state.lock().unwrap().run_count
    }

    /// Number of image builds performed.
    pub fn build_count(&self) -> usize {
        self.state.lock().unwrap().build_count
    }

    /// Whether a container with the given id currently exists.
    pub fn exists(&self, container_id: &str) -> bool {
        self.state.lock().unwrap().containers.contains_key(container_id)
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn ensure_image(&self, _image: &str, _build_context: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.image_present {
            state.image_present = true;
            state.build_count += 1;
        }
        Ok(())
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.fail_next_run.take() {
            return Err(err);
        }
        if state.containers.values().any(|c| c.name == spec.name) {
            return Err(Error::name_conflict(format!(
                "Conflict. The container name \"/{}\" is already in use",
                spec.name
            )));
        }
        state.run_count += 1;
        let id = format!("mock-{}-{}", spec.name, state.run_count);
        state.containers.insert(
            id.clone(),
            MockContainer {
                name: spec.name.clone(),
                running: true,
            },
        );
        Ok(id)
    }

    async fn stop(&self, container_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.containers.get_mut(container_id) {
            Some(c) => {
                c.running = false;
                Ok(())
            }
            None => Err(Error::not_found(format!(
                "no such container: {}",
                container_id
            ))),
        }
    }

    async fn remove(&self, name_or_id: &str, _force: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.containers.remove(name_or_id).is_some() {
            return Ok(());
        }
        let by_name: Option<String> = state
            .containers
            .iter()
            .find(|(_, c)| c.name == name_or_id)
            .map(|(id, _)| id.clone());
        match by_name {
            Some(id) => {
                state.containers.remove(&id);
                Ok(())
            }
            None => Err(Error::not_found(format!(
                "no such container: {}",
                name_or_id
            ))),
        }
    }

    async fn inspect_status(&self, container_id: &str) -> Result<SandboxStatus> {
        let state = self.state.lock().unwrap();
        match state.containers.get(container_id) {
            Some(c) if c.running => Ok(SandboxStatus::Running),
            Some(_) => Ok(SandboxStatus::Exited),
            None => Err(Error::not_found(format!(
                "no such container: {}",
                container_id
            ))),
        }
    }

    async fn exec(
        &self,
        container_id: &str,
        command: &str,
        _timeout: Duration,
    ) -> Result<ExecResult> {
        let mut state = self.state.lock().unwrap();
        if !state.containers.contains_key(container_id) {
            return Err(Error::not_found(format!(
                "no such container: {}",
                container_id
            )));
        }
        if state.exec_responses.is_empty() {
            Ok(ExecResult {
                exit_code: 0,
                output: format!("[mock] {}", command).into_bytes(),
                timed_out: false,
            })
        } else {
            Ok(state.exec_responses.remove(0))
        }
    }

    async fn ping(&self) -> bool {
        true
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_result_success() {
        let ok = ExecResult {
            exit_code: 0,
            output: b"hello".to_vec(),
            timed_out: false,
        };
        assert!(ok.success());

        let timed_out = ExecResult {
            exit_code: 0,
            output: Vec::new(),
            timed_out: true,
        };
        assert!(!timed_out.success());

        let failed = ExecResult {
            exit_code: 3,
            output: Vec::new(),
            timed_out: false,
        };
        assert!(!failed.success());
    }

    #[test]
    fn status_display_matches_wire_names() {
        assert_eq!(SandboxStatus::NotCreated.to_string(), "not_created");
        assert_eq!(SandboxStatus::Running.to_string(), "running");
        assert!(SandboxStatus::Running.is_running());
        assert!(!SandboxStatus::Exited.is_running());
    }

    fn spec(name: &str) -> ContainerSpec {
        ContainerSpec {
            name: name.to_string(),
            image: "helios-sandbox:latest".to_string(),
            command: "sleep infinity".to_string(),
            ports: BTreeMap::new(),
            env: HashMap::new(),
            host_workspace: PathBuf::from("/tmp/ws"),
        }
    }

    #[tokio::test]
    async fn mock_run_and_inspect() {
        let mock = MockRuntime::default();
        let id = mock.run(&spec("a")).await.unwrap();
        assert!(mock
            .inspect_status(&id)
            .await
            .unwrap()
            .is_running());

        mock.halt(&id);
        assert_eq!(
            mock.inspect_status(&id).await.unwrap(),
            SandboxStatus::Exited
        );

        mock.vanish(&id);
        assert!(mock.inspect_status(&id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn mock_name_conflict_and_remove_by_name() {
        let mock = MockRuntime::default();
        mock.occupy_name("busy");
        let err = mock.run(&spec("busy")).await.unwrap_err();
        assert!(matches!(err, Error::NameConflict(_)));

        mock.remove("busy", true).await.unwrap();
        mock.run(&spec("busy")).await.unwrap();
    }
}
