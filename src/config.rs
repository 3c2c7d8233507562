//! Layered configuration for the Patchwork service.
//!
//! Values are resolved in order, later layers winning:
//! built-in defaults → `patchwork.toml` (or `--config`) → environment → CLI.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8000
//! cors = false
//!
//! [database]
//! path = "patchwork.db"
//!
//! [site]
//! base_url = "http://localhost:8000"
//!
//! [api]
//! default_page_size = 30
//! max_page_size = 100
//!
//! [logging]
//! format = "plain"
//! filter = "info"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "patchwork.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Serve permissive CORS headers (for browser clients on other origins).
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("patchwork.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Absolute URL prefix for every link the API emits.
    pub base_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub default_page_size: i64,
    pub max_page_size: i64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            default_page_size: 30,
            max_page_size: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: plain, json", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Plain,
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchworkConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub site: SiteConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

impl PatchworkConfig {
    /// Load the file layer. An explicit path must exist; without one,
    /// `patchwork.toml` in the working directory is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Invalid TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the environment layer from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply the environment layer using `lookup` to read variables.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("PATCHWORK_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PATCHWORK_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid PATCHWORK_PORT '{}'", port))?;
        }
        if let Some(path) = lookup("PATCHWORK_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(base_url) = lookup("PATCHWORK_BASE_URL") {
            self.site.base_url = base_url;
        }
        if let Some(format) = lookup("PATCHWORK_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.default_page_size < 1 || self.api.max_page_size < 1 {
            anyhow::bail!("Page sizes must be at least 1");
        }
        if self.api.default_page_size > self.api.max_page_size {
            anyhow::bail!(
                "default_page_size ({}) exceeds max_page_size ({})",
                self.api.default_page_size,
                self.api.max_page_size
            );
        }
        if !self.site.base_url.starts_with("http://") && !self.site.base_url.starts_with("https://")
        {
            anyhow::bail!(
                "site.base_url must be an absolute http(s) URL, got '{}'",
                self.site.base_url
            );
        }
        Ok(())
    }
}
