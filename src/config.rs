//! Application configuration, loaded once at startup from environment variables via the
//! `config` crate, then passed explicitly by `Arc` rather than through a global or
//! lazy-static settings object.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    MissingConfig(String),
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    #[error("configuration error: {0}")]
    Other(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Other(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SavingMode {
    Local,
    RemoteObjectStore,
}

impl std::str::FromStr for SavingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(SavingMode::Local),
            "remote-object-store" | "remote_object_store" => Ok(SavingMode::RemoteObjectStore),
            other => Err(ConfigError::InvalidValue(format!(
                "unknown saving mode: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    storage_in: String,
    storage_out: String,
    base_dir: String,
    queue_url: Option<String>,
    result_store_url: Option<String>,
    saving_mode: String,
    job_timeout_secs: u64,
    truncation_cap: usize,
    sandbox_image: String,
}

/// Immutable, process-wide settings. Constructed once in `main` and shared by `Arc`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage_in: PathBuf,
    pub storage_out: PathBuf,
    pub base_dir: PathBuf,
    pub queue_url: Option<String>,
    pub result_store_url: Option<String>,
    pub saving_mode: SavingMode,
    pub job_timeout_secs: u64,
    pub truncation_cap: usize,
    pub sandbox_image: String,
}

impl AppConfig {
    /// Loads from environment variables, falling back to the documented defaults.
    /// Variables are read without a prefix, e.g. `STORAGE_IN`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw: RawConfig = config::Config::builder()
            .set_default("storage_in", "/var/lib/isobox/storage/in")?
            .set_default("storage_out", "/var/lib/isobox/storage/out")?
            .set_default("base_dir", "/var/lib/isobox")?
            .set_default("saving_mode", "local")?
            .set_default("job_timeout_secs", 30)?
            .set_default("truncation_cap", 64_000)?
            .set_default("sandbox_image", crate::language::SANDBOX_IMAGE)?
            .add_source(config::Environment::default())
            .build()?
            .try_deserialize()?;

        let saving_mode: SavingMode = raw.saving_mode.parse()?;
        if saving_mode == SavingMode::RemoteObjectStore {
            return Err(ConfigError::InvalidValue(
                "remote-object-store is accepted by parsing but has no backend implementation"
                    .to_string(),
            ));
        }

        if raw.job_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "job_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            storage_in: PathBuf::from(raw.storage_in),
            storage_out: PathBuf::from(raw.storage_out),
            base_dir: PathBuf::from(raw.base_dir),
            queue_url: raw.queue_url,
            result_store_url: raw.result_store_url,
            saving_mode,
            job_timeout_secs: raw.job_timeout_secs,
            truncation_cap: raw.truncation_cap,
            sandbox_image: raw.sandbox_image,
        })
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saving_mode_parses_known_values() {
        assert_eq!("local".parse::<SavingMode>().unwrap(), SavingMode::Local);
        assert_eq!(
            "remote-object-store".parse::<SavingMode>().unwrap(),
            SavingMode::RemoteObjectStore
        );
    }

    #[test]
    fn saving_mode_rejects_unknown_value() {
        assert!("s3".parse::<SavingMode>().is_err());
    }

    #[test]
    fn from_env_applies_documented_defaults_when_unset() {
        // Exercises the default path without depending on ambient environment state
        // set by other tests running in parallel would require serialization; this
        // only asserts the defaults compose into a value, not that env vars are unset.
        let raw: RawConfig = config::Config::builder()
            .set_default("storage_in", "/var/lib/isobox/storage/in")
            .unwrap()
            .set_default("storage_out", "/var/lib/isobox/storage/out")
            .unwrap()
            .set_default("base_dir", "/var/lib/isobox")
            .unwrap()
            .set_default("saving_mode", "local")
            .unwrap()
            .set_default("job_timeout_secs", 30)
            .unwrap()
            .set_default("truncation_cap", 64_000)
            .unwrap()
            .set_default("sandbox_image", crate::language::SANDBOX_IMAGE)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(raw.job_timeout_secs, 30);
        assert_eq!(raw.truncation_cap, 64_000);
        assert_eq!(raw.sandbox_image, crate::language::SANDBOX_IMAGE);
    }
}
