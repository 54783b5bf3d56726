//! Configuration management for the client runtime.

use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// What a mutation hook does when the target record already has a pending
/// operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Fail fast with `MutationError::ConflictPending`
    #[default]
    Reject,
    /// Log, count and proceed
    Advisory,
}

/// What the realtime reconciler does with a push event for a record that has
/// a pending operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeferredEventPolicy {
    /// Queue and replay once no conflicting operation remains
    #[default]
    Replay,
    /// Discard and rely on the operation's own settlement
    Drop,
}

impl FromStr for ConflictPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(ConflictPolicy::Reject),
            "advisory" => Ok(ConflictPolicy::Advisory),
            _ => Err(()),
        }
    }
}

impl FromStr for DeferredEventPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replay" => Ok(DeferredEventPolicy::Replay),
            "drop" => Ok(DeferredEventPolicy::Drop),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::Reject => f.write_str("reject"),
            ConflictPolicy::Advisory => f.write_str("advisory"),
        }
    }
}

impl fmt::Display for DeferredEventPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeferredEventPolicy::Replay => f.write_str("replay"),
            DeferredEventPolicy::Drop => f.write_str("drop"),
        }
    }
}

/// Reconnect behaviour of realtime subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// Attempts after the first failure before giving up
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any retry delay
    pub max_delay: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl RealtimeConfig {
    /// Delay before retry number `attempt` (zero-based): `min(base * 2^attempt, max)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// How often the housekeeping sweep runs
    pub sweep_interval: Duration,
    /// Age after which an operation is pruned regardless of status
    pub operation_ttl: Duration,
    /// Enforcement of the one-pending-mutation-per-record rule
    pub conflict_policy: ConflictPolicy,
    /// Handling of push events that arrive during a conflict
    pub deferred_events: DeferredEventPolicy,
    /// Subscription reconnect settings
    pub realtime: RealtimeConfig,
    /// Bind address of the status surface
    pub status_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            operation_ttl: Duration::from_secs(300),
            conflict_policy: ConflictPolicy::default(),
            deferred_events: DeferredEventPolicy::default(),
            realtime: RealtimeConfig::default(),
            status_addr: SocketAddr::from(([127, 0, 0, 1], 7070)),
        }
    }
}

impl Config {
    /// Load configuration from environment variables (and a `.env` file if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults for
    /// unset variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let sweep_interval = parse(&lookup, "OPTIMIST_SWEEP_INTERVAL_SECS")?
            .map_or(defaults.sweep_interval, Duration::from_secs);
        if sweep_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "OPTIMIST_SWEEP_INTERVAL_SECS",
                value: "0".into(),
            });
        }

        let operation_ttl = parse(&lookup, "OPTIMIST_OPERATION_TTL_SECS")?
            .map_or(defaults.operation_ttl, Duration::from_secs);
        let conflict_policy =
            parse(&lookup, "OPTIMIST_CONFLICT_POLICY")?.unwrap_or(defaults.conflict_policy);
        let deferred_events =
            parse(&lookup, "OPTIMIST_DEFERRED_EVENTS")?.unwrap_or(defaults.deferred_events);

        let realtime = RealtimeConfig {
            max_retries: parse(&lookup, "OPTIMIST_REALTIME_MAX_RETRIES")?
                .unwrap_or(defaults.realtime.max_retries),
            base_delay: parse(&lookup, "OPTIMIST_REALTIME_BASE_DELAY_MS")?
                .map_or(defaults.realtime.base_delay, Duration::from_millis),
            max_delay: parse(&lookup, "OPTIMIST_REALTIME_MAX_DELAY_MS")?
                .map_or(defaults.realtime.max_delay, Duration::from_millis),
        };

        let status_addr = parse(&lookup, "OPTIMIST_STATUS_ADDR")?.unwrap_or(defaults.status_addr);

        Ok(Self {
            sweep_interval,
            operation_ttl,
            conflict_policy,
            deferred_events,
            realtime,
            status_addr,
        })
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.operation_ttl, Duration::from_secs(300));
        assert_eq!(config.conflict_policy, ConflictPolicy::Reject);
        assert_eq!(config.deferred_events, DeferredEventPolicy::Replay);
        assert_eq!(config.status_addr.port(), 7070);
    }

    #[test]
    fn overrides() {
        let config = Config::from_lookup(lookup(&[
            ("OPTIMIST_SWEEP_INTERVAL_SECS", "5"),
            ("OPTIMIST_OPERATION_TTL_SECS", "30"),
            ("OPTIMIST_CONFLICT_POLICY", "Advisory"),
            ("OPTIMIST_DEFERRED_EVENTS", "drop"),
            ("OPTIMIST_REALTIME_MAX_RETRIES", "2"),
            ("OPTIMIST_REALTIME_BASE_DELAY_MS", "10"),
            ("OPTIMIST_REALTIME_MAX_DELAY_MS", "50"),
            ("OPTIMIST_STATUS_ADDR", "0.0.0.0:9000"),
        ]))
        .unwrap();

        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.operation_ttl, Duration::from_secs(30));
        assert_eq!(config.conflict_policy, ConflictPolicy::Advisory);
        assert_eq!(config.deferred_events, DeferredEventPolicy::Drop);
        assert_eq!(config.realtime.max_retries, 2);
        assert_eq!(config.realtime.base_delay, Duration::from_millis(10));
        assert_eq!(config.realtime.max_delay, Duration::from_millis(50));
        assert_eq!(config.status_addr.port(), 9000);
    }

    #[test]
    fn invalid_values() {
        let err = Config::from_lookup(lookup(&[("OPTIMIST_CONFLICT_POLICY", "strict")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                var: "OPTIMIST_CONFLICT_POLICY",
                value: "strict".into()
            }
        );

        assert!(Config::from_lookup(lookup(&[("OPTIMIST_OPERATION_TTL_SECS", "-1")])).is_err());
        assert!(Config::from_lookup(lookup(&[("OPTIMIST_SWEEP_INTERVAL_SECS", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("OPTIMIST_STATUS_ADDR", "nowhere")])).is_err());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let realtime = RealtimeConfig::default();
        let delays: Vec<u64> = (0..7)
            .map(|n| realtime.backoff(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 30000, 30000]);
        assert_eq!(realtime.backoff(64), Duration::from_millis(30_000));
    }
}
