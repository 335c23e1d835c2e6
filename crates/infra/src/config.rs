//! Configuration loading and representation.
//!
//! Everything is read from environment variables once at start-up. Unset
//! variables fall back to defaults; malformed ones abort start-up.

use std::time::Duration;

use rollcall_retry::{RetryPolicy, TaskType};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_SCHEDULER_INTERVAL_SECS: u64 = 60;
const DEFAULT_SCHEDULER_PAGE_SIZE: usize = 500;
const DEFAULT_INITIAL_DELAY_SECS: i64 = 300;
const MAX_INITIAL_DELAY_SECS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_CALL_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_INTERVAL_MINUTES: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be set: {reason}")]
    Missing { var: &'static str, reason: &'static str },
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Periodic scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Fixed wall-clock period between passes.
    pub interval: Duration,
    /// Due records fetched per store round trip. A pass keeps paging until
    /// every due record has been seen.
    pub page_size: usize,
    /// Deadline for each store or evaluator call.
    pub call_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_SCHEDULER_INTERVAL_SECS),
            page_size: DEFAULT_SCHEDULER_PAGE_SIZE,
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
        }
    }
}

/// Intake path settings.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Task type assigned to onboarding events.
    pub task_type: TaskType,
    /// Delay before a new record first becomes scheduler-eligible.
    pub initial_delay: chrono::Duration,
    /// Deadline for each store or evaluator call.
    pub call_timeout: Duration,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            task_type: TaskType::onboarding(),
            initial_delay: chrono::Duration::seconds(DEFAULT_INITIAL_DELAY_SECS),
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
        }
    }
}

/// Which outcome evaluator to wire in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluatorConfig {
    /// Simulated: last digit of the key decides.
    LastDigit,
    /// Real enrollment endpoint.
    Http { url: String, timeout: Duration },
}

/// Where records and policies live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    InMemory,
    Postgres { database_url: String },
}

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub stores: StoreConfig,
    pub scheduler: SchedulerConfig,
    pub intake: IntakeConfig,
    pub evaluator: EvaluatorConfig,
    /// Policy installed for the intake task type at start-up.
    pub seed_policy: RetryPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            stores: StoreConfig::InMemory,
            scheduler: SchedulerConfig::default(),
            intake: IntakeConfig::default(),
            evaluator: EvaluatorConfig::LastDigit,
            seed_policy: RetryPolicy {
                task_type: TaskType::onboarding(),
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                retry_interval_minutes: DEFAULT_RETRY_INTERVAL_MINUTES,
            },
        }
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load from an arbitrary variable source (tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let call_timeout = Duration::from_millis(parse_or(
            &lookup,
            "ROLLCALL_CALL_TIMEOUT_MS",
            DEFAULT_CALL_TIMEOUT_MS,
        )?);

        let stores = match lookup("USE_PERSISTENT_STORES").as_deref().map(str::trim) {
            Some("true") | Some("1") => StoreConfig::Postgres {
                database_url: lookup("DATABASE_URL").ok_or(ConfigError::Missing {
                    var: "DATABASE_URL",
                    reason: "required when USE_PERSISTENT_STORES=true",
                })?,
            },
            _ => StoreConfig::InMemory,
        };

        let interval_secs: u64 = parse_or(
            &lookup,
            "ROLLCALL_SCHEDULER_INTERVAL_SECS",
            DEFAULT_SCHEDULER_INTERVAL_SECS,
        )?;
        if interval_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "ROLLCALL_SCHEDULER_INTERVAL_SECS",
                value: "0".into(),
                reason: "period must be positive".into(),
            });
        }

        let page_size: usize = parse_or(&lookup, "ROLLCALL_SCHEDULER_PAGE_SIZE", DEFAULT_SCHEDULER_PAGE_SIZE)?;
        if page_size == 0 {
            return Err(ConfigError::Invalid {
                var: "ROLLCALL_SCHEDULER_PAGE_SIZE",
                value: "0".into(),
                reason: "page size must be positive".into(),
            });
        }

        let scheduler = SchedulerConfig {
            interval: Duration::from_secs(interval_secs),
            page_size,
            call_timeout,
        };

        let intake = IntakeConfig {
            task_type: defaults.intake.task_type.clone(),
            initial_delay: initial_delay(&lookup)?,
            call_timeout,
        };

        let evaluator = match lookup("ROLLCALL_EVALUATOR_URL") {
            Some(url) if !url.trim().is_empty() => EvaluatorConfig::Http {
                url,
                timeout: call_timeout,
            },
            _ => EvaluatorConfig::LastDigit,
        };

        let max_attempts: u32 = parse_or(&lookup, "ROLLCALL_DEFAULT_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        let retry_interval_minutes: u32 = parse_or(
            &lookup,
            "ROLLCALL_DEFAULT_RETRY_INTERVAL_MINUTES",
            DEFAULT_RETRY_INTERVAL_MINUTES,
        )?;
        let seed_policy = RetryPolicy::new(intake.task_type.clone(), max_attempts, retry_interval_minutes)
            .map_err(|e| ConfigError::Invalid {
                var: "ROLLCALL_DEFAULT_MAX_ATTEMPTS",
                value: max_attempts.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            bind_addr: lookup("ROLLCALL_BIND_ADDR").unwrap_or(defaults.bind_addr),
            stores,
            scheduler,
            intake,
            evaluator,
            seed_policy,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

/// Initial intake delay, bounded to `0..=MAX_INITIAL_DELAY_SECS`.
fn initial_delay(lookup: &impl Fn(&str) -> Option<String>) -> Result<chrono::Duration, ConfigError> {
    const VAR: &str = "ROLLCALL_INTAKE_INITIAL_DELAY_SECS";
    let secs: i64 = parse_or(lookup, VAR, DEFAULT_INITIAL_DELAY_SECS)?;
    let out_of_range = || ConfigError::Invalid {
        var: VAR,
        value: secs.to_string(),
        reason: format!("delay must be between 0 and {MAX_INITIAL_DELAY_SECS} seconds"),
    };
    if !(0..=MAX_INITIAL_DELAY_SECS).contains(&secs) {
        return Err(out_of_range());
    }
    chrono::Duration::try_seconds(secs).ok_or_else(out_of_range)
}
