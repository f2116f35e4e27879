use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

pub const NODE_URL_ENV: &str = "CASPER_NODE_URL";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WalletConfig {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub extension: ExtensionConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExtensionConfig {
    #[serde(default = "default_install_url")]
    pub install_url: String,
    /// Upper bound for any extension prompt, including user approval.
    #[serde(default = "default_extension_timeout")]
    pub timeout_secs: u64,
}

fn default_rpc_url() -> String {
    "http://136.243.187.84:7777/rpc".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_install_url() -> String {
    "https://www.casperwallet.io/".to_string()
}

fn default_extension_timeout() -> u64 {
    120
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            install_url: default_install_url(),
            timeout_secs: default_extension_timeout(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            extension: ExtensionConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ExtensionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl WalletConfig {
    pub fn load_or_default(path: &str) -> Self {
        let mut config = if std::path::Path::new(path).exists() {
            match std::fs::read_to_string(path) {
                Ok(s) => match toml::from_str(&s) {
                    Ok(c) => {
                        info!("Config loaded from {}", path);
                        c
                    }
                    Err(e) => {
                        warn!("Error parsing config: {}. Using defaults.", e);
                        Self::default()
                    }
                },
                Err(e) => {
                    warn!("Error reading config: {}. Using defaults.", e);
                    Self::default()
                }
            }
        } else {
            info!("Config file not found at '{}'. Creating default.", path);
            let config = Self::default();
            if let Ok(s) = toml::to_string_pretty(&config) {
                if let Err(e) = std::fs::write(path, s) {
                    warn!("Could not write default config to {}: {}", path, e);
                }
            }
            config
        };

        if let Ok(url) = std::env::var(NODE_URL_ENV) {
            if !url.trim().is_empty() {
                config.node.rpc_url = url.trim().to_string();
            }
        }
        config
    }

    pub fn from_toml(s: &str) -> crate::error::Result<Self> {
        toml::from_str(s).map_err(|e| crate::error::WalletError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = WalletConfig::from_toml(
            r#"
            [node]
            rpc_url = "http://localhost:11101/rpc"
            "#,
        )
        .unwrap();

        assert_eq!(config.node.rpc_url, "http://localhost:11101/rpc");
        assert_eq!(config.node.request_timeout_secs, 30);
        assert_eq!(config.extension.install_url, "https://www.casperwallet.io/");
        assert_eq!(config.extension.timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_invalid_config_is_error() {
        assert!(matches!(
            WalletConfig::from_toml("node = 5"),
            Err(crate::error::WalletError::Config(_))
        ));
    }

    #[test]
    fn test_default_round_trips_through_toml() {
        let s = toml::to_string_pretty(&WalletConfig::default()).unwrap();
        let parsed = WalletConfig::from_toml(&s).unwrap();
        assert_eq!(parsed.node.rpc_url, default_rpc_url());
    }
}
