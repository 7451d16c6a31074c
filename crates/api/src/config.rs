//! Service configuration from environment variables.

use std::time::Duration;

use ledgerq_core::OrgId;
use ledgerq_jobs::{Backoff, BackoffType, JobOptions, RetentionPolicy};
use ledgerq_ledger::GatewayOptions;

pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
pub const ENV_PORT: &str = "PORT";
pub const ENV_SUBMIT_JOB_BACKOFF_TYPE: &str = "SUBMIT_JOB_BACKOFF_TYPE";
pub const ENV_SUBMIT_JOB_BACKOFF_DELAY: &str = "SUBMIT_JOB_BACKOFF_DELAY";
pub const ENV_SUBMIT_JOB_ATTEMPTS: &str = "SUBMIT_JOB_ATTEMPTS";
pub const ENV_SUBMIT_JOB_CONCURRENCY: &str = "SUBMIT_JOB_CONCURRENCY";
pub const ENV_MAX_COMPLETED_SUBMIT_JOBS: &str = "MAX_COMPLETED_SUBMIT_JOBS";
pub const ENV_MAX_FAILED_SUBMIT_JOBS: &str = "MAX_FAILED_SUBMIT_JOBS";
pub const ENV_SUBMIT_JOB_QUEUE_SCHEDULER: &str = "SUBMIT_JOB_QUEUE_SCHEDULER";
pub const ENV_HLF_MSP_ID_ORG1: &str = "HLF_MSP_ID_ORG1";
pub const ENV_HLF_MSP_ID_ORG2: &str = "HLF_MSP_ID_ORG2";
pub const ENV_HLF_COMMIT_TIMEOUT: &str = "HLF_COMMIT_TIMEOUT";
pub const ENV_HLF_ENDORSE_TIMEOUT: &str = "HLF_ENDORSE_TIMEOUT";
pub const ENV_HLF_QUERY_TIMEOUT: &str = "HLF_QUERY_TIMEOUT";
pub const ENV_JOB_STORE: &str = "JOB_STORE";
pub const ENV_REDIS_HOST: &str = "REDIS_HOST";
pub const ENV_REDIS_PORT: &str = "REDIS_PORT";
pub const ENV_REDIS_USERNAME: &str = "REDIS_USERNAME";
pub const ENV_REDIS_PASSWORD: &str = "REDIS_PASSWORD";
pub const ENV_ORG1_APIKEY: &str = "ORG1_APIKEY";
pub const ENV_ORG2_APIKEY: &str = "ORG2_APIKEY";

const LOG_LEVELS: [&str; 7] = ["fatal", "error", "warn", "info", "debug", "trace", "silent"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{key} has an invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Backing store for the submit queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStoreKind {
    Memory,
    Redis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        let auth = match (&self.username, &self.password) {
            (Some(user), Some(pass)) => format!("{user}:{pass}@"),
            (None, Some(pass)) => format!(":{pass}@"),
            (Some(user), None) => format!("{user}@"),
            (None, None) => String::new(),
        };
        format!("redis://{auth}{}:{}", self.host, self.port)
    }
}

/// One organisation the gateway acts for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgConfig {
    pub msp_id: OrgId,
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub log_level: String,
    pub port: u16,
    pub job_options: JobOptions,
    pub concurrency: usize,
    pub retention: RetentionPolicy,
    pub queue_scheduler: bool,
    pub gateway: GatewayOptions,
    pub org1: OrgConfig,
    pub org2: OrgConfig,
    pub job_store: JobStoreKind,
    pub redis: RedisConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required key is unset or a value does
    /// not parse.
    pub fn from_env_with<F>(get_env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_level = get_env(ENV_LOG_LEVEL).unwrap_or_else(|| "info".to_string());
        if !LOG_LEVELS.contains(&log_level.as_str()) {
            return Err(invalid(ENV_LOG_LEVEL, &log_level, "unknown log level"));
        }

        let port = parse_env(&get_env, ENV_PORT, 3000u16)?;

        let backoff_kind = match get_env(ENV_SUBMIT_JOB_BACKOFF_TYPE) {
            Some(raw) => raw
                .parse::<BackoffType>()
                .map_err(|e| invalid(ENV_SUBMIT_JOB_BACKOFF_TYPE, &raw, e))?,
            None => BackoffType::Fixed,
        };
        let backoff_delay: u64 = parse_positive(&get_env, ENV_SUBMIT_JOB_BACKOFF_DELAY, 3000)?;
        let attempts: u32 = parse_positive(&get_env, ENV_SUBMIT_JOB_ATTEMPTS, 5)?;
        let concurrency: usize = parse_positive(&get_env, ENV_SUBMIT_JOB_CONCURRENCY, 5)?;
        let max_completed: usize = parse_positive(&get_env, ENV_MAX_COMPLETED_SUBMIT_JOBS, 1000)?;
        let max_failed: usize = parse_positive(&get_env, ENV_MAX_FAILED_SUBMIT_JOBS, 1000)?;
        let queue_scheduler = parse_bool(&get_env, ENV_SUBMIT_JOB_QUEUE_SCHEDULER, true)?;

        let gateway = GatewayOptions {
            endorse_timeout: Duration::from_secs(parse_positive(&get_env, ENV_HLF_ENDORSE_TIMEOUT, 30)?),
            commit_timeout: Duration::from_secs(parse_positive(&get_env, ENV_HLF_COMMIT_TIMEOUT, 300)?),
            query_timeout: Duration::from_secs(parse_positive(&get_env, ENV_HLF_QUERY_TIMEOUT, 3)?),
        };

        let org1 = OrgConfig {
            msp_id: parse_env(&get_env, ENV_HLF_MSP_ID_ORG1, OrgId::new("Org1MSP"))?,
            api_key: required(&get_env, ENV_ORG1_APIKEY)?,
        };
        let org2 = OrgConfig {
            msp_id: parse_env(&get_env, ENV_HLF_MSP_ID_ORG2, OrgId::new("Org2MSP"))?,
            api_key: required(&get_env, ENV_ORG2_APIKEY)?,
        };

        let job_store = match get_env(ENV_JOB_STORE).as_deref() {
            None | Some("memory") => JobStoreKind::Memory,
            Some("redis") => JobStoreKind::Redis,
            Some(other) => return Err(invalid(ENV_JOB_STORE, other, "expected memory or redis")),
        };

        let redis = RedisConfig {
            host: get_env(ENV_REDIS_HOST).unwrap_or_else(|| "localhost".to_string()),
            port: parse_env(&get_env, ENV_REDIS_PORT, 6379u16)?,
            username: get_env(ENV_REDIS_USERNAME).filter(|v| !v.is_empty()),
            password: get_env(ENV_REDIS_PASSWORD).filter(|v| !v.is_empty()),
        };

        Ok(Self {
            log_level,
            port,
            job_options: JobOptions {
                attempts,
                backoff: Backoff {
                    kind: backoff_kind,
                    delay: Duration::from_millis(backoff_delay),
                },
            },
            concurrency,
            retention: RetentionPolicy {
                max_completed,
                max_failed,
            },
            queue_scheduler,
            gateway,
            org1,
            org2,
            job_store,
            redis,
        })
    }

    /// Directive handed to the log filter. `fatal` and `silent` have no
    /// tracing level of their own.
    pub fn log_directive(&self) -> &str {
        match self.log_level.as_str() {
            "fatal" => "error",
            "silent" => "off",
            level => level,
        }
    }

    /// Organisation owning `api_key`, if any.
    pub fn org_for_api_key(&self, api_key: &str) -> Option<&OrgId> {
        [&self.org1, &self.org2]
            .into_iter()
            .find(|org| org.api_key == api_key)
            .map(|org| &org.msp_id)
    }
}

fn invalid(key: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn required<F>(get_env: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    get_env(key)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parse_env<F, T>(get_env: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get_env(key) {
        Some(raw) => raw.trim().parse().map_err(|e| invalid(key, &raw, e)),
        None => Ok(default),
    }
}

/// Parse a non-zero integer. Values that overflow `T` are rejected, not
/// truncated.
fn parse_positive<F, T>(get_env: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + PartialEq + From<u8>,
    T::Err: std::fmt::Display,
{
    let value = parse_env(get_env, key, default)?;
    if value == T::from(0) {
        return Err(invalid(key, "0", "must be a positive integer"));
    }
    Ok(value)
}

fn parse_bool<F>(get_env: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get_env(key).as_deref() {
        None => Ok(default),
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(other) => Err(invalid(key, other, "expected true or false")),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let mut vars: HashMap<String, String> = HashMap::from([
            (ENV_ORG1_APIKEY.to_string(), "org1key".to_string()),
            (ENV_ORG2_APIKEY.to_string(), "org2key".to_string()),
        ]);
        for (k, v) in pairs {
            vars.insert(k.to_string(), v.to_string());
        }
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::from_env_with(env(&[])).unwrap();

        assert_eq!(config.log_level, "info");
        assert_eq!(config.port, 3000);
        assert_eq!(config.job_options, JobOptions::default());
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.retention, RetentionPolicy::default());
        assert!(config.queue_scheduler);
        assert_eq!(config.gateway, GatewayOptions::default());
        assert_eq!(config.org1.msp_id, OrgId::new("Org1MSP"));
        assert_eq!(config.org2.msp_id, OrgId::new("Org2MSP"));
        assert_eq!(config.job_store, JobStoreKind::Memory);
        assert_eq!(config.redis.url(), "redis://localhost:6379");
    }

    #[test]
    fn overrides() {
        let config = Config::from_env_with(env(&[
            (ENV_SUBMIT_JOB_BACKOFF_TYPE, "exponential"),
            (ENV_SUBMIT_JOB_BACKOFF_DELAY, "250"),
            (ENV_SUBMIT_JOB_ATTEMPTS, "3"),
            (ENV_SUBMIT_JOB_QUEUE_SCHEDULER, "false"),
            (ENV_HLF_QUERY_TIMEOUT, "7"),
            (ENV_JOB_STORE, "redis"),
            (ENV_REDIS_PASSWORD, "secret"),
        ]))
        .unwrap();

        assert_eq!(config.job_options.attempts, 3);
        assert_eq!(config.job_options.backoff.kind, BackoffType::Exponential);
        assert_eq!(config.job_options.backoff.delay, Duration::from_millis(250));
        assert!(!config.queue_scheduler);
        assert_eq!(config.gateway.query_timeout, Duration::from_secs(7));
        assert_eq!(config.job_store, JobStoreKind::Redis);
        assert_eq!(config.redis.url(), "redis://:secret@localhost:6379");
    }

    #[test]
    fn api_keys_are_required() {
        let err = Config::from_env_with(|_| None).unwrap_err();
        assert_eq!(err, ConfigError::Missing(ENV_ORG1_APIKEY));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            Config::from_env_with(env(&[(ENV_SUBMIT_JOB_ATTEMPTS, "0")])),
            Err(ConfigError::Invalid { key: ENV_SUBMIT_JOB_ATTEMPTS, .. })
        ));
        assert!(matches!(
            Config::from_env_with(env(&[(ENV_PORT, "http")])),
            Err(ConfigError::Invalid { key: ENV_PORT, .. })
        ));
        assert!(matches!(
            Config::from_env_with(env(&[(ENV_SUBMIT_JOB_BACKOFF_TYPE, "linear")])),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            Config::from_env_with(env(&[(ENV_HLF_MSP_ID_ORG2, " ")])),
            Err(ConfigError::Invalid { key: ENV_HLF_MSP_ID_ORG2, .. })
        ));
        assert!(matches!(
            Config::from_env_with(env(&[(ENV_LOG_LEVEL, "verbose")])),
            Err(ConfigError::Invalid { key: ENV_LOG_LEVEL, .. })
        ));
    }

    #[test]
    fn overflowing_counts_are_rejected() {
        assert!(matches!(
            Config::from_env_with(env(&[(ENV_SUBMIT_JOB_ATTEMPTS, "4294967297")])),
            Err(ConfigError::Invalid { key: ENV_SUBMIT_JOB_ATTEMPTS, .. })
        ));
        assert!(matches!(
            Config::from_env_with(env(&[(ENV_SUBMIT_JOB_CONCURRENCY, "18446744073709551616")])),
            Err(ConfigError::Invalid { key: ENV_SUBMIT_JOB_CONCURRENCY, .. })
        ));
    }

    #[test]
    fn api_key_maps_to_org() {
        let config = Config::from_env_with(env(&[])).unwrap();

        assert_eq!(config.org_for_api_key("org2key"), Some(&OrgId::new("Org2MSP")));
        assert_eq!(config.org_for_api_key("nope"), None);
        assert_eq!(
            Config::from_env_with(env(&[(ENV_LOG_LEVEL, "silent")]))
                .unwrap()
                .log_directive(),
            "off"
        );
    }
}
