//! Layered settings: user file, project file, then `BEARX_*` environment variables.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_TOKEN_FILE: &str = "BEARX_TOKEN_FILE";
pub const ENV_CALLBACK_URL: &str = "BEARX_CALLBACK_URL";
pub const ENV_TIMEOUT: &str = "BEARX_TIMEOUT";
const PROJECT_CONFIG_FILE: &str = ".bearx.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub token_file: Option<String>,
    pub callback_url: Option<String>,
    pub timeout: Option<Duration>,
}

impl Config {
    /// Overlays every value `other` sets.
    fn apply(&mut self, other: Config) {
        if other.token_file.is_some() {
            self.token_file = other.token_file;
        }
        if other.callback_url.is_some() {
            self.callback_url = other.callback_url;
        }
        if other.timeout.is_some() {
            self.timeout = other.timeout;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    token_file: Option<String>,
    callback_url: Option<String>,
    timeout: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot locate config directory: HOME is not set")]
    MissingHome,
    #[error("cannot determine working directory: {0}")]
    WorkingDir(#[source] io::Error),
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("read config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid timeout in {origin}: {source}")]
    Timeout {
        origin: String,
        #[source]
        source: DurationParseError,
    },
}

/// Where settings are read from. [`ConfigSources::discover`] fills this from the process
/// environment; tests build it by hand.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub user_file: Option<PathBuf>,
    pub project_file: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl ConfigSources {
    pub fn discover() -> Result<ConfigSources, ConfigError> {
        let user_dir = match env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
            Some(base) => PathBuf::from(base),
            None => env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .ok_or(ConfigError::MissingHome)?,
        };
        let project_dir = env::current_dir().map_err(ConfigError::WorkingDir)?;
        let env = [ENV_TOKEN_FILE, ENV_CALLBACK_URL, ENV_TIMEOUT]
            .iter()
            .filter_map(|key| env::var(key).ok().map(|value| (key.to_string(), value)))
            .collect();

        Ok(ConfigSources {
            user_file: Some(user_dir.join("bearx").join("config.toml")),
            project_file: Some(project_dir.join(PROJECT_CONFIG_FILE)),
            env,
        })
    }

    pub fn load(&self) -> Result<Config, ConfigError> {
        let mut config = Config::default();
        for path in self.user_file.iter().chain(self.project_file.iter()) {
            config.apply(read_config_file(path)?);
        }
        config.apply(self.env_config()?);
        Ok(config)
    }

    fn env_config(&self) -> Result<Config, ConfigError> {
        let timeout = match self.env.get(ENV_TIMEOUT) {
            Some(raw) => Some(parse_duration(raw.trim()).map_err(|source| {
                ConfigError::Timeout {
                    origin: ENV_TIMEOUT.to_string(),
                    source,
                }
            })?),
            None => None,
        };
        Ok(Config {
            token_file: non_empty(self.env.get(ENV_TOKEN_FILE).cloned()),
            callback_url: non_empty(self.env.get(ENV_CALLBACK_URL).cloned()),
            timeout,
        })
    }
}

/// Loads the configuration visible to this process.
pub fn load() -> Result<Config, ConfigError> {
    ConfigSources::discover()?.load()
}

fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Config::default()),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let parsed = toml::from_str::<FileConfig>(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let timeout = match parsed.timeout {
        Some(raw) => Some(parse_duration(raw.trim()).map_err(|source| {
            ConfigError::Timeout {
                origin: path.display().to_string(),
                source,
            }
        })?),
        None => None,
    };
    Ok(Config {
        token_file: non_empty(parsed.token_file),
        callback_url: non_empty(parsed.callback_url),
        timeout,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    #[error("empty duration")]
    Empty,
    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),
    #[error("unknown unit {0:?} in duration")]
    UnknownUnit(String),
    #[error("invalid number in duration {0:?}")]
    InvalidNumber(String),
}

/// Parses durations such as `5s`, `250ms`, `1.5s`, `1m30s` or `0`.
pub fn parse_duration(raw: &str) -> Result<Duration, DurationParseError> {
    if raw.is_empty() {
        return Err(DurationParseError::Empty);
    }
    if raw == "0" {
        return Ok(Duration::from_secs(0));
    }

    let mut total_nanos = 0f64;
    let mut rest = raw;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or_else(|| rest.len());
        let (number, tail) = rest.split_at(number_len);
        if number.is_empty() {
            return Err(DurationParseError::InvalidNumber(raw.to_string()));
        }
        let value: f64 = number
            .parse()
            .map_err(|_| DurationParseError::InvalidNumber(raw.to_string()))?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or_else(|| tail.len());
        let (unit, next) = tail.split_at(unit_len);
        let scale = match unit {
            "" => return Err(DurationParseError::MissingUnit(raw.to_string())),
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            other => return Err(DurationParseError::UnknownUnit(other.to_string())),
        };
        total_nanos += value * scale;
        rest = next;
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}
