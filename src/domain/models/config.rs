//! CSC configuration, loadable from TOML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::DomainError;

/// Name of the file read when `start` is issued without an override.
pub const INIT_CONFIG_FILE: &str = "_init.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CscConfig {
    /// Vent controller host name or address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Vent controller TCP port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Seconds to wait for the TCP connection to open.
    #[serde(default = "default_timeout")]
    pub connection_timeout: f64,
    /// Seconds to wait for a command response.
    #[serde(default = "default_timeout")]
    pub read_timeout: f64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    15080
}

fn default_timeout() -> f64 {
    10.0
}

impl Default for CscConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connection_timeout: default_timeout(),
            read_timeout: default_timeout(),
        }
    }
}

impl CscConfig {
    pub fn from_toml(toml_str: &str) -> Result<Self, DomainError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| DomainError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, DomainError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DomainError::config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Resolve the configuration for a `start` command.
    ///
    /// With an override the named file must exist in `config_dir`. Without
    /// one, `_init.toml` is used if present and the defaults otherwise.
    pub fn load(config_dir: Option<&Path>, config_override: Option<&str>) -> Result<Self, DomainError> {
        let override_name = config_override.filter(|name| !name.is_empty());

        match (config_dir, override_name) {
            (Some(dir), Some(name)) => {
                if name.contains('/') || name.contains('\\') {
                    return Err(DomainError::config(format!(
                        "Config override must be a file name: {}",
                        name
                    )));
                }
                Self::from_file(&dir.join(name))
            }
            (None, Some(name)) => Err(DomainError::config(format!(
                "No config directory to read {} from",
                name
            ))),
            (Some(dir), None) => {
                let init = dir.join(INIT_CONFIG_FILE);
                if init.is_file() {
                    Self::from_file(&init)
                } else {
                    debug!("No {} in {}; using defaults", INIT_CONFIG_FILE, dir.display());
                    Ok(Self::default())
                }
            }
            (None, None) => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.host.trim().is_empty() {
            return Err(DomainError::config("host must not be empty"));
        }
        for (name, value) in [
            ("connection_timeout", self.connection_timeout),
            ("read_timeout", self.read_timeout),
        ] {
            if !(value > 0.0 && Duration::try_from_secs_f64(value).is_ok()) {
                return Err(DomainError::config(format!(
                    "{} must be a positive, representable number of seconds, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.connection_timeout)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.read_timeout)
    }
}
