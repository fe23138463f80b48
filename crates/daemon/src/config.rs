// Daemon configuration (environment driven)

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use stepwise_core::application::runner::constants::{
    DEFAULT_REVERSAL_PROBABILITY, DEFAULT_TICK_INTERVAL,
};

pub const DEFAULT_SNAPSHOT_PATH: &str = "~/.stepwise/queues.json";
pub const DEFAULT_DB_PATH: &str = "~/.stepwise/queues.db";

/// Which snapshot backend the daemon uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    File { path: PathBuf },
    Sqlite { db_path: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub store: StoreConfig,
    pub tick_interval: Duration,
    pub reversal_probability: f64,
    pub step_timeout: Option<Duration>,
    pub marker_dir: PathBuf,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup (the process environment in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = match lookup("STEPWISE_STORE").as_deref().unwrap_or("file") {
            "file" => StoreConfig::File {
                path: PathBuf::from(expand(
                    lookup("STEPWISE_SNAPSHOT_PATH").as_deref(),
                    DEFAULT_SNAPSHOT_PATH,
                )),
            },
            "sqlite" => StoreConfig::Sqlite {
                db_path: expand(lookup("STEPWISE_DB_PATH").as_deref(), DEFAULT_DB_PATH),
            },
            other => bail!("STEPWISE_STORE must be 'file' or 'sqlite', got '{}'", other),
        };

        let tick_interval = match lookup("STEPWISE_TICK_INTERVAL_MS") {
            Some(raw) => Duration::from_millis(
                raw.parse()
                    .with_context(|| format!("invalid STEPWISE_TICK_INTERVAL_MS '{}'", raw))?,
            ),
            None => DEFAULT_TICK_INTERVAL,
        };

        let reversal_probability = match lookup("STEPWISE_REVERSAL_PROBABILITY") {
            Some(raw) => raw
                .parse::<f64>()
                .with_context(|| format!("invalid STEPWISE_REVERSAL_PROBABILITY '{}'", raw))?,
            None => DEFAULT_REVERSAL_PROBABILITY,
        };
        if !(0.0..=1.0).contains(&reversal_probability) {
            bail!(
                "STEPWISE_REVERSAL_PROBABILITY must be within 0..=1, got {}",
                reversal_probability
            );
        }

        let step_timeout = lookup("STEPWISE_STEP_TIMEOUT_MS")
            .map(|raw| {
                raw.parse::<u64>()
                    .map(Duration::from_millis)
                    .with_context(|| format!("invalid STEPWISE_STEP_TIMEOUT_MS '{}'", raw))
            })
            .transpose()?;

        let marker_dir = PathBuf::from(expand(lookup("STEPWISE_MARKER_DIR").as_deref(), "."));

        Ok(Self {
            store,
            tick_interval,
            reversal_probability,
            step_timeout,
            marker_dir,
        })
    }
}

fn expand(value: Option<&str>, default: &str) -> String {
    shellexpand::tilde(value.unwrap_or(default)).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<DaemonConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DaemonConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert!(matches!(config.store, StoreConfig::File { .. }));
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.reversal_probability, 0.1);
        assert_eq!(config.step_timeout, None);
        assert_eq!(config.marker_dir, PathBuf::from("."));
    }

    #[test]
    fn test_sqlite_store() {
        let config = config(&[
            ("STEPWISE_STORE", "sqlite"),
            ("STEPWISE_DB_PATH", "/tmp/q.db"),
            ("STEPWISE_STEP_TIMEOUT_MS", "250"),
        ])
        .unwrap();
        assert_eq!(
            config.store,
            StoreConfig::Sqlite {
                db_path: "/tmp/q.db".to_string()
            }
        );
        assert_eq!(config.step_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(config(&[("STEPWISE_STORE", "redis")]).is_err());
        assert!(config(&[("STEPWISE_TICK_INTERVAL_MS", "soon")]).is_err());
        assert!(config(&[("STEPWISE_REVERSAL_PROBABILITY", "1.5")]).is_err());
        assert!(config(&[("STEPWISE_STEP_TIMEOUT_MS", "-1")]).is_err());
    }
}
