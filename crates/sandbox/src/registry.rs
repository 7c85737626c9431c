//! In-memory sandbox registry with the idempotent get-or-start contract.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

use helios_core::{Result, SandboxConfig};

use crate::handle::SandboxHandle;
use crate::ports::{self, PortMap};
use crate::runtime::ContainerRuntime;

/// Per-creation overrides for `SandboxRegistry::create`.
///
/// Anything left unset falls back to the registry's `SandboxConfig`.
#[derive(Debug, Clone, Default)]
pub struct SandboxOptions {
    pub id: Option<String>,
    pub command: Option<String>,
    pub ports: Option<PortMap>,
    pub env: Option<HashMap<String, String>>,
}

type Slot = Arc<tokio::sync::Mutex<Option<Arc<SandboxHandle>>>>;

/// Process-wide id → handle map.
///
/// The central self-healing contract lives in `get_or_start`: callers never
/// need to distinguish "never created", "crashed", and "stopped" — all three
/// normalize into a live handle. Each id has its own mutex slot, so at most
/// one creation is in flight per id while unrelated ids proceed in parallel.
pub struct SandboxRegistry {
    runtime: Arc<dyn ContainerRuntime>,
    config: SandboxConfig,
    slots: DashMap<String, Slot>,
}

impl SandboxRegistry {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: SandboxConfig) -> Self {
        Self {
            runtime,
            config,
            slots: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Whether the sandbox backend is reachable.
    pub async fn is_available(&self) -> bool {
        self.runtime.ping().await
    }

    /// Ids currently registered.
    pub fn ids(&self) -> Vec<String> {
        self.slots.iter().map(|e| e.key().clone()).collect()
    }

    fn slot(&self, id: &str) -> Slot {
        self.slots.entry(id.to_string()).or_default().clone()
    }

    /// Return a live handle for `id`, creating or healing as needed.
    ///
    /// - absent: provision a fresh handle (new ports, deterministic
    ///   workspace, config defaults), start it, register it;
    /// - present and running: reuse unchanged;
    /// - present but the status query faults: the backing container no
    ///   longer exists — discard the stale entry and rebuild under the same
    ///   id;
    /// - present but not running (e.g., stopped): restart in place,
    ///   preserving id, workspace and port assignments.
    pub async fn get_or_start(&self, id: &str) -> Result<Arc<SandboxHandle>> {
        let slot = self.slot(id);
        let mut guard = slot.lock().await;

        if let Some(handle) = guard.clone() {
            match handle.status().await {
                Ok(status) if status.is_running() => {
                    tracing::debug!(sandbox_id = %id, "Reusing running sandbox");
                    return Ok(handle);
                }
                Ok(status) => {
                    tracing::info!(sandbox_id = %id, %status, "Sandbox not running, restarting in place");
                    handle.start().await?;
                    return Ok(handle);
                }
                Err(e) => {
                    tracing::warn!(
                        sandbox_id = %id,
                        error = %e,
                        "Status query failed, discarding stale sandbox and rebuilding"
                    );
                    *guard = None;
                }
            }
        }

        let handle = self.provision(id.to_string(), SandboxOptions::default()).await?;
        *guard = Some(handle.clone());
        tracing::info!(sandbox_id = %id, "Sandbox created and registered");
        Ok(handle)
    }

    /// Unconditionally construct, start, and register a new sandbox,
    /// bypassing reuse. A missing id is generated.
    pub async fn create(&self, options: SandboxOptions) -> Result<Arc<SandboxHandle>> {
        let id = options
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let slot = self.slot(&id);
        let mut guard = slot.lock().await;

        let handle = self.provision(id.clone(), options).await?;
        *guard = Some(handle.clone());
        tracing::info!(sandbox_id = %id, "Sandbox created and registered");
        Ok(handle)
    }

    /// Stop the sandbox for `id`, if registered, and drop the entry.
    pub async fn stop(&self, id: &str) -> Result<()> {
        let slot = match self.slots.get(id) {
            Some(entry) => entry.value().clone(),
            None => return Ok(()),
        };
        let mut guard = slot.lock().await;
        if let Some(handle) = guard.take() {
            handle.stop().await?;
        }
        drop(guard);
        self.slots.remove(id);
        Ok(())
    }

    /// Build and start a handle for `id`. Image provisioning runs first,
    /// outside the handle, so concurrent creations of different sandboxes
    /// never trigger redundant builds.
    async fn provision(&self, id: String, options: SandboxOptions) -> Result<Arc<SandboxHandle>> {
        self.runtime
            .ensure_image(&self.config.image, &self.config.build_context)
            .await?;

        let ports = match options.ports {
            Some(ports) => ports,
            None => ports::allocate_map(&self.config.declared_ports)?,
        };
        let handle = Arc::new(SandboxHandle::new(
            self.runtime.clone(),
            id.clone(),
            self.config.image.clone(),
            options.command.unwrap_or_else(|| self.config.command.clone()),
            ports,
            options.env.unwrap_or_else(|| self.config.env.clone()),
            self.config.workspace_root.join(&id),
            &self.config.container_name_prefix,
        ));
        handle.start().await?;
        Ok(handle)
    }
}
