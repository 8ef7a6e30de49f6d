//! Configuration loading for the option pool.
//!
//! ```toml
//! [database]
//! path = "${HOME}/.optionpool/optionpool.db"
//! busy_timeout_ms = 5000
//!
//! [sweep]
//! batch_size = 100
//!
//! [exercise]
//! reference_attempts = 5
//!
//! [plans]
//! default_exercise_window_days = 90
//! ```

use std::path::PathBuf;
use std::time::Duration;
use std::{env, fs};

use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_ENV: &str = "OPTIONPOOL_CONFIG";

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_REFERENCE_ATTEMPTS: u32 = 5;
const DEFAULT_EXERCISE_WINDOW_DAYS: u32 = 90;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptionPoolConfig {
    pub database: Option<DatabaseConfig>,
    pub sweep: Option<SweepConfig>,
    pub exercise: Option<ExerciseConfig>,
    pub plans: Option<PlansConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DatabaseConfig {
    /// Database file. `${VAR}` references are expanded.
    pub path: Option<String>,
    pub busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SweepConfig {
    /// Upper bound on grants examined per expiration sweep.
    pub batch_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExerciseConfig {
    /// Payment reference regeneration attempts when a reference collides.
    pub reference_attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlansConfig {
    /// Post-termination exercise window used when a new plan doesn't set one.
    pub default_exercise_window_days: Option<u32>,
}

pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if !var.is_empty() {
                    out.push_str(&env::var(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

impl OptionPoolConfig {
    /// Load the config file. A missing file is not an error.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(path).map(Some)
    }

    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read { path, source: err });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse { path, source: err })
            }
        }
    }

    /// Database file, falling back to `optionpool.db` beside the config file.
    #[must_use]
    pub fn database_path(&self) -> Option<PathBuf> {
        let configured = self
            .database
            .as_ref()
            .and_then(|db| db.path.as_deref())
            .map(expand_env_vars)
            .filter(|path| !path.trim().is_empty());
        match configured {
            Some(path) => Some(PathBuf::from(path)),
            None => data_dir().map(|dir| dir.join("optionpool.db")),
        }
    }

    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        let ms = self
            .database
            .as_ref()
            .and_then(|db| db.busy_timeout_ms)
            .unwrap_or(DEFAULT_BUSY_TIMEOUT_MS);
        Duration::from_millis(ms)
    }

    #[must_use]
    pub fn sweep_batch_size(&self) -> usize {
        self.sweep
            .as_ref()
            .and_then(|s| s.batch_size)
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_BATCH_SIZE)
    }

    #[must_use]
    pub fn reference_attempts(&self) -> u32 {
        self.exercise
            .as_ref()
            .and_then(|e| e.reference_attempts)
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_REFERENCE_ATTEMPTS)
    }

    #[must_use]
    pub fn default_exercise_window_days(&self) -> u32 {
        self.plans
            .as_ref()
            .and_then(|p| p.default_exercise_window_days)
            .unwrap_or(DEFAULT_EXERCISE_WINDOW_DAYS)
    }
}

/// `$OPTIONPOOL_CONFIG` when set, else `~/.optionpool/config.toml`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    data_dir().map(|dir| dir.join("config.toml"))
}

/// `~/.optionpool`, home of the default config, database and log file.
#[must_use]
pub fn data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".optionpool"))
}
