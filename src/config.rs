use anyhow::{Context, Result};
use corevpn_core::Tags;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const URL_ENV: &str = "COREVPN_NETBOX_URL";
pub const TOKEN_ENV: &str = "COREVPN_NETBOX_TOKEN";

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub netbox: NetboxSection,
    #[serde(default)]
    pub tags: TagSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetboxSection {
    #[serde(default = "default_url")]
    pub url: String,
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NetboxSection {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagSection {
    pub device: Option<String>,
    pub public_interface: Option<String>,
    pub pool: Option<String>,
}

impl TagSection {
    pub fn resolve(&self) -> Tags {
        let defaults = Tags::default();
        Tags {
            device: self.device.clone().unwrap_or(defaults.device),
            public_interface: self
                .public_interface
                .clone()
                .unwrap_or(defaults.public_interface),
            pool: self.pool.clone().unwrap_or(defaults.pool),
        }
    }
}

impl ClientConfig {
    fn dir() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/root"))
            .join(".corevpn")
    }

    pub fn default_path() -> PathBuf {
        Self::dir().join("config.toml")
    }

    /// Load `path`, or the default location when `None`. Only an explicitly
    /// named file has to exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path(), false),
        };
        if !required && !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Apply `COREVPN_NETBOX_URL` / `COREVPN_NETBOX_TOKEN`.
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(URL_ENV).ok(),
            std::env::var(TOKEN_ENV).ok(),
        );
    }

    fn apply_overrides(&mut self, url: Option<String>, token: Option<String>) {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.netbox.url = url;
        }
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.netbox.token = Some(token);
        }
    }
}
