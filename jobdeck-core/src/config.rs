use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Channel endpoint and reconnect policy
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    /// WebSocket URL of the event channel
    pub url: String,

    /// Initial reconnect delay in milliseconds
    #[serde(default = "default_reconnect_min")]
    pub reconnect_min_ms: u64,

    /// Reconnect delay ceiling in milliseconds (doubles up to this)
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_ms: u64,
}

fn default_reconnect_min() -> u64 {
    1000
}
fn default_reconnect_max() -> u64 {
    30_000
}

/// Log tail display settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LogConfig {
    /// Visible buffer size per job, in line segments
    #[serde(default = "default_buffer_lines")]
    pub buffer_lines: usize,
}

fn default_buffer_lines() -> usize {
    10_000
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            buffer_lines: default_buffer_lines(),
        }
    }
}

/// Root configuration file structure
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct JobdeckConfig {
    /// Config file version
    #[serde(default = "default_version")]
    pub version: String,

    pub server: ServerConfig,

    #[serde(default)]
    pub logs: LogConfig,
}

fn default_version() -> String {
    "1".into()
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    EmptyUrl,
    ZeroBuffer,
    BackoffInverted { min_ms: u64, max_ms: u64 },
    NotFound { searched: Vec<PathBuf> },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::Yaml(e) => write!(f, "YAML parse error: {}", e),
            Self::EmptyUrl => write!(f, "server.url must not be empty"),
            Self::ZeroBuffer => write!(f, "logs.buffer_lines must be greater than zero"),
            Self::BackoffInverted { min_ms, max_ms } => {
                write!(
                    f,
                    "reconnect_min_ms ({}) exceeds reconnect_max_ms ({})",
                    min_ms, max_ms
                )
            }
            Self::NotFound { searched } => {
                write!(f, "no config file found, searched: {:?}", searched)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Yaml(e)
    }
}

impl JobdeckConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: JobdeckConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a string (useful for testing)
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: JobdeckConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Search for config file in standard locations
    pub fn discover(start_dir: &Path) -> Result<(PathBuf, Self), ConfigError> {
        let names = [
            "jobdeck.yaml",
            "jobdeck.yml",
            ".jobdeck.yaml",
            ".jobdeck.yml",
        ];
        let mut searched = Vec::new();

        // Check environment variable first
        if let Ok(env_path) = std::env::var("JOBDECK_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Ok((path.clone(), Self::load(&path)?));
            }
            searched.push(path);
        }

        // Search current directory and parents
        let mut dir = Some(start_dir);
        while let Some(current) = dir {
            for name in &names {
                let path = current.join(name);
                if path.exists() {
                    return Ok((path.clone(), Self::load(&path)?));
                }
                searched.push(path);
            }
            dir = current.parent();
        }

        Err(ConfigError::NotFound { searched })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.url.trim().is_empty() {
            return Err(ConfigError::EmptyUrl);
        }
        if self.logs.buffer_lines == 0 {
            return Err(ConfigError::ZeroBuffer);
        }
        if self.server.reconnect_min_ms > self.server.reconnect_max_ms {
            return Err(ConfigError::BackoffInverted {
                min_ms: self.server.reconnect_min_ms,
                max_ms: self.server.reconnect_max_ms,
            });
        }
        Ok(())
    }
}
