//! TOML configuration for the server and the client.
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:9037"
//! data_dir = "./data"
//!
//! [client]
//! base_url = "http://127.0.0.1:9037"
//! ```
//!
//! Every key is optional. `SUBTREE_BASE_URL` overrides `client.base_url`.

use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
};

use crate::error::Result;

pub const DEFAULT_PORT: u16 = 9037;
pub const BASE_URL_ENV: &str = "SUBTREE_BASE_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Directory for the JSON-backed store. Absent means in-memory only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            data_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: format!("http://127.0.0.1:{DEFAULT_PORT}"),
        }
    }
}

impl ClientConfig {
    /// Apply the `SUBTREE_BASE_URL` override, if set and non-empty.
    pub fn with_env(mut self) -> Self {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.base_url = url.trim().to_string();
            }
        }
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
}

impl AppConfig {
    /// Read configuration from `path`. A missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("Attempting to read config from: {:?}", path);
        if !path.exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(AppConfig::default());
        }
        let content = read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        tracing::debug!("Attempting to write config to: {:?}", path.as_ref());
        write(path, toml::to_string(self)?)?;
        Ok(())
    }
}
