use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use imgpool_core::job::DEFAULT_STEPS;
use imgpool_core::WorkerId;

use crate::coordinator::{DispatchMode, DispatchOptions, SelectionStrategy};
use crate::session::JobDefaults;

/// Default NATS URL.
pub const DEFAULT_BUS_URL: &str = "nats://localhost:4223";

/// Seed used unless `RANDOM_SEED` is set.
pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "solicit" => Ok(Self::Solicit),
            "direct" => Ok(Self::Direct),
            other => Err(format!("expected 'solicit' or 'direct', got '{other}'")),
        }
    }
}

impl FromStr for SelectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue-group" => Ok(Self::QueueGroup),
            "broadcast" => Ok(Self::Broadcast),
            other => Err(format!("expected 'queue-group' or 'broadcast', got '{other}'")),
        }
    }
}

/// Requester configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct RequesterConfig {
    pub bus_url: String,
    pub dispatch: DispatchOptions,
    pub defaults: JobDefaults,
    pub output_dir: PathBuf,
}

impl RequesterConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                 |
    /// |-------------------------|-------------------------|
    /// | `BUS_URL`               | `nats://localhost:4223` |
    /// | `DISPATCH_MODE`         | `solicit`               |
    /// | `SELECTION`             | `queue-group`           |
    /// | `SOLICIT_TIMEOUT_MS`    | `1000`                  |
    /// | `MAX_SOLICIT_ATTEMPTS`  | `10`                    |
    /// | `RESULT_TIMEOUT_SECS`   | `600` (`0` = none)      |
    /// | `PROGRESS_MAX_MESSAGES` | `100`                   |
    /// | `DEFAULT_STEPS`         | `4`                     |
    /// | `DEFAULT_SEED`          | `42`                    |
    /// | `RANDOM_SEED`           | `false`                 |
    /// | `OUTPUT_DIR`            | `.`                     |
    /// | `BLACKLISTED_WORKERS`   | empty                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &'static str, default: &str| -> (&'static str, String) {
            (var, lookup(var).unwrap_or_else(|| default.to_string()))
        };

        let bus_url = get("BUS_URL", DEFAULT_BUS_URL).1;
        let mode = parse(get("DISPATCH_MODE", "solicit"))?;
        let selection = parse(get("SELECTION", "queue-group"))?;
        let solicit_timeout_ms: u64 = parse(get("SOLICIT_TIMEOUT_MS", "1000"))?;
        let max_solicit_attempts: u32 = parse(get("MAX_SOLICIT_ATTEMPTS", "10"))?;
        let result_timeout_secs: u64 = parse(get("RESULT_TIMEOUT_SECS", "600"))?;
        let progress_max_messages: u64 = parse(get("PROGRESS_MAX_MESSAGES", "100"))?;
        let num_steps: u32 = parse(get("DEFAULT_STEPS", &DEFAULT_STEPS.to_string()))?;
        let seed: u64 = parse(get("DEFAULT_SEED", &DEFAULT_SEED.to_string()))?;
        let random_seed: bool = parse(get("RANDOM_SEED", "false"))?;
        let output_dir = PathBuf::from(get("OUTPUT_DIR", ".").1);

        if max_solicit_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "MAX_SOLICIT_ATTEMPTS",
                reason: "must be at least 1".into(),
            });
        }
        if progress_max_messages == 0 {
            return Err(ConfigError::Invalid {
                var: "PROGRESS_MAX_MESSAGES",
                reason: "must be at least 1".into(),
            });
        }
        if num_steps == 0 {
            return Err(ConfigError::Invalid {
                var: "DEFAULT_STEPS",
                reason: "must be at least 1".into(),
            });
        }

        let blacklist = get("BLACKLISTED_WORKERS", "")
            .1
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(WorkerId::new)
            .collect::<HashSet<_>>();

        Ok(Self {
            bus_url,
            dispatch: DispatchOptions {
                mode,
                selection,
                solicit_timeout: Duration::from_millis(solicit_timeout_ms),
                max_solicit_attempts,
                result_timeout: (result_timeout_secs > 0)
                    .then(|| Duration::from_secs(result_timeout_secs)),
                progress_max_messages,
                blacklist,
            },
            defaults: JobDefaults {
                num_steps,
                seed: (!random_seed).then_some(seed),
            },
            output_dir,
        })
    }
}

fn parse<T>((var, raw): (&'static str, String)) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e| ConfigError::Invalid {
        var,
        reason: format!("{e}"),
    })
}
