//! Run configuration for the training demo.
//!
//! Every field can be overridden through a `MICRODIFF_`-prefixed environment
//! variable; unset variables fall back to [`TrainConfig::default`].

use std::path::PathBuf;

use crate::error::ConfigError;

pub(crate) const ENV_PREFIX: &str = "MICRODIFF_";

pub(crate) const ENV_SEED: &str = "SEED";
pub(crate) const ENV_DATA_PATH: &str = "DATA_PATH";
pub(crate) const ENV_WEIGHTS_PATH: &str = "WEIGHTS_PATH";
pub(crate) const ENV_GRAPH_PATH: &str = "GRAPH_PATH";
pub(crate) const ENV_HIDDEN: &str = "HIDDEN";
pub(crate) const ENV_STEPS: &str = "STEPS";
pub(crate) const ENV_ALPHA: &str = "ALPHA";
pub(crate) const ENV_SAMPLES: &str = "SAMPLES";

pub(crate) const DEFAULT_SEED: u64 = 42;
pub(crate) const DEFAULT_HIDDEN: [usize; 2] = [16, 16];
pub(crate) const DEFAULT_STEPS: usize = 100;
pub(crate) const DEFAULT_ALPHA: f64 = 1e-4;
pub(crate) const DEFAULT_SAMPLES: usize = 100;

#[derive(Clone, Debug, PartialEq)]
pub struct TrainConfig {
    /// Seed for weight initialization and synthetic data.
    pub seed: u64,
    /// `x1,x2,label` CSV; synthetic data is generated when unset.
    pub data_path: Option<PathBuf>,
    /// Comma-separated initial weights, one per parameter.
    pub weights_path: Option<PathBuf>,
    /// Where to write the DOT graph of the final loss.
    pub graph_path: Option<PathBuf>,
    /// Hidden layer widths. The output layer always has width 1.
    pub hidden: Vec<usize>,
    pub steps: usize,
    /// L2 regularization strength.
    pub alpha: f64,
    /// Number of synthetic samples.
    pub samples: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            data_path: None,
            weights_path: None,
            graph_path: None,
            hidden: DEFAULT_HIDDEN.to_vec(),
            steps: DEFAULT_STEPS,
            alpha: DEFAULT_ALPHA,
            samples: DEFAULT_SAMPLES,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steps == 0 {
            return Err(ConfigError::Validation(
                "steps must be greater than 0".to_string(),
            ));
        }
        if self.samples == 0 {
            return Err(ConfigError::Validation(
                "samples must be greater than 0".to_string(),
            ));
        }
        if self.hidden.iter().any(|&w| w == 0) {
            return Err(ConfigError::Validation(format!(
                "hidden widths must be greater than 0, got {:?}",
                self.hidden
            )));
        }
        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(ConfigError::Validation(format!(
                "alpha must be a finite non-negative number, got {}",
                self.alpha
            )));
        }
        Ok(())
    }

    /// Layer widths for a two-input, one-output model.
    pub fn layer_sizes(&self) -> Vec<usize> {
        self.hidden.iter().copied().chain([1]).collect()
    }
}

/// Returns the full environment variable key for a suffix (`SEED` → `MICRODIFF_SEED`).
pub fn env_key(suffix: &str) -> String {
    format!("{ENV_PREFIX}{suffix}")
}

/// Reads an environment variable; `Ok(None)` when it is unset.
pub fn env_string(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(s) => Ok(Some(s)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::EnvVar {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Reads and parses an environment variable; `Ok(None)` when it is unset.
pub fn env_parsed<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(s) = env_string(key)? else {
        return Ok(None);
    };
    match s.trim().parse() {
        Ok(t) => Ok(Some(t)),
        Err(e) => Err(ConfigError::Parse {
            key: key.to_string(),
            value: s,
            message: e.to_string(),
        }),
    }
}

fn env_widths(key: &str) -> Result<Option<Vec<usize>>, ConfigError> {
    let Some(s) = env_string(key)? else {
        return Ok(None);
    };
    s.split(',')
        .map(|part| {
            part.trim().parse::<usize>().map_err(|e| ConfigError::Parse {
                key: key.to_string(),
                value: s.clone(),
                message: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Builds a [`TrainConfig`] from the environment and validates it.
pub fn from_env() -> Result<TrainConfig, ConfigError> {
    let default = TrainConfig::default();

    let config = TrainConfig {
        seed: env_parsed::<u64>(&env_key(ENV_SEED))?.unwrap_or(default.seed),
        data_path: env_string(&env_key(ENV_DATA_PATH))?.map(PathBuf::from),
        weights_path: env_string(&env_key(ENV_WEIGHTS_PATH))?.map(PathBuf::from),
        graph_path: env_string(&env_key(ENV_GRAPH_PATH))?.map(PathBuf::from),
        hidden: env_widths(&env_key(ENV_HIDDEN))?.unwrap_or(default.hidden),
        steps: env_parsed::<usize>(&env_key(ENV_STEPS))?.unwrap_or(default.steps),
        alpha: env_parsed::<f64>(&env_key(ENV_ALPHA))?.unwrap_or(default.alpha),
        samples: env_parsed::<usize>(&env_key(ENV_SAMPLES))?.unwrap_or(default.samples),
    };
    config.validate()?;

    Ok(config)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Env tests share process state.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config_is_valid() {
        let config = TrainConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.layer_sizes(), vec![16, 16, 1]);
    }

    #[test]
    fn test_validate_rejects_zero_steps() {
        let config = TrainConfig {
            steps: 0,
            ..TrainConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_zero_width() {
        let config = TrainConfig {
            hidden: vec![8, 0],
            ..TrainConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_alpha() {
        let config = TrainConfig {
            alpha: -1.0,
            ..TrainConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_env_overrides() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var(env_key(ENV_HIDDEN), "4, 8");
        std::env::set_var(env_key(ENV_STEPS), "7");

        let config = from_env();

        std::env::remove_var(env_key(ENV_HIDDEN));
        std::env::remove_var(env_key(ENV_STEPS));

        let config = config.unwrap();
        assert_eq!(config.hidden, vec![4, 8]);
        assert_eq!(config.steps, 7);
        assert_eq!(config.seed, DEFAULT_SEED);
    }

    #[test]
    fn test_from_env_reports_parse_error() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var(env_key(ENV_SEED), "not_a_number");

        let result = from_env();

        std::env::remove_var(env_key(ENV_SEED));

        match result {
            Err(ConfigError::Parse { key, value, .. }) => {
                assert_eq!(key, "MICRODIFF_SEED");
                assert_eq!(value, "not_a_number");
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_env_parsed_unset_returns_none() {
        assert_eq!(env_parsed::<u64>("MICRODIFF_UNLIKELY_KEY_31337").unwrap(), None);
    }
}
