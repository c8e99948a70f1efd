//! Configuration values consumed by the framework.
//!
//! The crate never reads configuration files itself. [`Config`] derives
//! `Deserialize` so callers can load it from whatever format they use, and
//! every field has a default.

use serde::Deserialize;

/// Listening address of the transport.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_on: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_on: "0.0.0.0".to_owned(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    pub fn address(&self) -> String {
        format!("{}:{}", self.listen_on, self.port)
    }
}

/// Response compression settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    /// Bodies of this many bytes or fewer are never compressed.
    pub threshold: u64,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 128,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub compression: CompressionConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_take_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"compression":{"enabled":true}}"#).unwrap();
        assert!(cfg.compression.enabled);
        assert_eq!(cfg.compression.threshold, 128);
        assert_eq!(cfg.server.address(), "0.0.0.0:8080");
    }

    #[test]
    fn full_document() {
        let cfg: Config = serde_json::from_str(
            r#"{"server":{"listen_on":"127.0.0.1","port":3000},
                "compression":{"enabled":true,"threshold":1024}}"#,
        )
        .unwrap();
        assert_eq!(cfg.server.address(), "127.0.0.1:3000");
        assert_eq!(cfg.compression.threshold, 1024);
    }
}
