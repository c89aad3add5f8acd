//! Local identity and socket settings for an engine

use serde::{Deserialize, Serialize};

/// Default UDP port
pub const DEFAULT_PORT: u16 = 2425;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            nickname: String::new(),
            group: String::new(),
            user: String::new(),
            host: String::new(),
            bind_address: default_bind_address(),
            port: DEFAULT_PORT,
        }
    }
}

impl EngineConfig {
    /// `address:port` string the engine binds to
    pub fn service(&self) -> String {
        if self.bind_address.contains(':') && !self.bind_address.starts_with('[') {
            format!("[{}]:{}", self.bind_address, self.port)
        } else {
            format!("{}:{}", self.bind_address, self.port)
        }
    }
}
