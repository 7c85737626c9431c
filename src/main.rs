#![deny(unused)]
//! Helios - sandbox provisioning daemon entry point.
//!
//! Boots the sandbox registry against the local Docker daemon and, when a
//! sandbox id and command are supplied, provisions the sandbox and runs the
//! command through the execution bridge.

use std::sync::Arc;

use helios_core::AppConfig;
use helios_sandbox::{
    CommandExecutor, ContainerRuntime, DockerRuntime, RunRequest, SandboxRegistry,
};

fn configure_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,helios=debug".into()),
    );
    let fmt_layer = tracing_subscriber::fmt::layer();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    configure_tracing();

    tracing::info!("Starting Helios v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().map_err(|e| anyhow::anyhow!("config load failed: {}", e))?;

    let runtime = Arc::new(DockerRuntime::new(config.sandbox.stop_grace_secs)?);
    if !runtime.ping().await {
        anyhow::bail!("Docker daemon not reachable — cannot provision sandboxes");
    }

    let registry = Arc::new(SandboxRegistry::new(runtime, config.sandbox));

    let mut args = std::env::args().skip(1);
    let sandbox_id = match args.next() {
        Some(id) => id,
        None => {
            tracing::info!("No sandbox id supplied; registry ready, nothing to do");
            return Ok(());
        }
    };
    let command = args.collect::<Vec<_>>().join(" ");
    if command.is_empty() {
        let handle = registry.get_or_start(&sandbox_id).await?;
        tracing::info!(
            sandbox_id = %handle.id(),
            workspace = %handle.host_workspace().display(),
            "Sandbox ready"
        );
        for (&container_port, _) in handle.ports() {
            let url = handle.preview_url(container_port)?;
            tracing::info!(container_port, url = %url, "Port mapping");
        }
        return Ok(());
    }

    let executor = CommandExecutor::new(registry, &sandbox_id);
    let outcome = executor.run(RunRequest::new(command)).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if outcome.is_success() {
        Ok(())
    } else {
        std::process::exit(1)
    }
}
