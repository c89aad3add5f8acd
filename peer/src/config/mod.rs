//! Peer configuration

use anyhow::{Context, Result};
use ipmsg::EngineConfig;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub general: EngineConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesConfig {
    /// Sent back to every delivered message when set
    #[serde(default)]
    pub auto_reply: Option<String>,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_history_limit() -> usize {
    1000
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            auto_reply: None,
            history_limit: default_history_limit(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context("Failed to read config file")?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .context("Failed to parse config file")?;

        check_field("nickname", &config.general.nickname)?;
        check_field("group", &config.general.group)?;
        check_field("user", &config.general.user)?;
        check_field("host", &config.general.host)?;

        Ok(config)
    }

    /// Engine settings with user, host and nickname filled from the system.
    ///
    /// Values taken from the environment are checked like configured ones.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut engine = self.general.clone();

        if engine.user.is_empty() {
            engine.user = std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .unwrap_or_else(|_| "ipmsg".to_string());
        }
        if engine.host.is_empty() {
            engine.host = hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "localhost".to_string());
        }
        if engine.nickname.is_empty() {
            engine.nickname = engine.user.clone();
        }

        check_field("user", &engine.user)?;
        check_field("host", &engine.host)?;
        check_field("nickname", &engine.nickname)?;

        Ok(engine)
    }
}

/// Header fields are ':' separated and entry options NUL separated
fn check_field(name: &str, value: &str) -> Result<()> {
    if value.contains(['\0', ':']) {
        anyhow::bail!("{} must not contain ':' or NUL: {:?}", name, value);
    }
    Ok(())
}
