use ::config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub sandbox: SandboxConfig,
}

/// Configuration for sandbox provisioning.
///
/// Every field has a default mirroring the stock sandbox image contract, so
/// partial config files and env overrides compose freely.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SandboxConfig {
    /// Docker image used for sandbox containers.
    pub image: String,
    /// Build context directory used when the image is absent locally.
    pub build_context: PathBuf,
    /// Startup command run as PID 1 inside the container.
    pub command: String,
    /// Container ports the sandbox image exposes; each is bound to a
    /// dynamically allocated host port at creation.
    pub declared_ports: Vec<u16>,
    /// Default environment injected into the container.
    pub env: HashMap<String, String>,
    /// Host directory under which per-sandbox workspaces live.
    pub workspace_root: PathBuf,
    /// Prefix for deterministic container names.
    pub container_name_prefix: String,
    /// Grace period passed to container stop, in seconds.
    pub stop_grace_secs: u32,
    /// Default command execution deadline, in seconds.
    pub exec_timeout_secs: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("HELIOS_ENV").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map HELIOS__SANDBOX__IMAGE=foo:latest to sandbox.image
            .add_source(Environment::with_prefix("HELIOS").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: "helios-sandbox:latest".into(),
            build_context: PathBuf::from("docker"),
            command: "/usr/bin/supervisord -c /etc/supervisor/conf.d/supervisord.conf".into(),
            declared_ports: vec![7788, 6080, 5901, 8000, 8080],
            env: HashMap::from([
                ("VNC_PASSWORD".to_string(), "vncpassword".to_string()),
                ("DISPLAY".to_string(), ":99".to_string()),
            ]),
            workspace_root: PathBuf::from("workspace"),
            container_name_prefix: "helios-sandbox-".into(),
            stop_grace_secs: 5,
            exec_timeout_secs: 180,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_sandbox_contract() {
        let cfg = SandboxConfig::default();
        assert_eq!(cfg.image, "helios-sandbox:latest");
        assert_eq!(cfg.declared_ports, vec![7788, 6080, 5901, 8000, 8080]);
        assert_eq!(cfg.env.get("DISPLAY").map(String::as_str), Some(":99"));
        assert_eq!(cfg.exec_timeout_secs, 180);
    }
}
