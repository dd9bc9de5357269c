use serde::Deserialize;
use std::path::PathBuf;

/// Per-service settings applied with [`Service::apply`](super::Service::apply)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServiceConfig {
    pub image: String,
    pub expose_ports: Vec<String>,
    pub disabled: bool,
    pub dir: PathBuf,
}

/// Network the launcher's services belong to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceContext {
    pub network: String,
}

impl ServiceContext {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
        }
    }
}

/// Process-wide launcher settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherConfig {
    /// Compose program followed by any fixed arguments
    pub compose_command: Vec<String>,
    /// Command used to force-remove a data directory; the path is appended
    pub privileged_remove_command: Vec<String>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            compose_command: vec!["docker-compose".to_string()],
            privileged_remove_command: vec![
                "sudo".to_string(),
                "rm".to_string(),
                "-rf".to_string(),
            ],
        }
    }
}

impl LauncherConfig {
    /// Defaults overridden by `LAUNCHER_COMPOSE` and `LAUNCHER_PRIVILEGED_RM`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            compose_command: lookup("LAUNCHER_COMPOSE")
                .and_then(|value| split_command(&value))
                .unwrap_or(defaults.compose_command),
            privileged_remove_command: lookup("LAUNCHER_PRIVILEGED_RM")
                .and_then(|value| split_command(&value))
                .unwrap_or(defaults.privileged_remove_command),
        }
    }
}

fn split_command(value: &str) -> Option<Vec<String>> {
    let parts: Vec<String> = value.split_whitespace().map(str::to_string).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts)
    }
}
