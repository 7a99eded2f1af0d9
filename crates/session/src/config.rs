//! Session configuration.

use anyhow::Context;
use chrono::Duration;
use thiserror::Error;

pub const LIFETIME_ENV: &str = "SITEDESK_SESSION_LIFETIME_SECS";
pub const WARNING_ENV: &str = "SITEDESK_SESSION_WARNING_SECS";
pub const REVALIDATE_ENV: &str = "SITEDESK_SESSION_REVALIDATE_SECS";
pub const NAMESPACE_ENV: &str = "SITEDESK_STORAGE_NAMESPACE";
pub const VERIFY_TIMEOUT_ENV: &str = "SITEDESK_VERIFY_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long a login, extension or refresh keeps the session valid.
    pub lifetime: Duration,
    /// Lead time before expiry at which the warning fires.
    pub warning_window: Duration,
    /// Period of the independent "has the persisted expiry passed?" check.
    pub revalidation_interval: Duration,
    /// Upper bound on a credential check before it counts as a network failure.
    pub verification_timeout: Duration,
    /// Prefix of the durable store keys.
    pub storage_namespace: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    NonPositive(&'static str),

    #[error("warning window ({warning}s) must be shorter than the session lifetime ({lifetime}s)")]
    WarningNotBeforeExpiry { warning: i64, lifetime: i64 },

    #[error("storage namespace must be non-empty and contain no whitespace")]
    InvalidNamespace,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::seconds(3600),
            warning_window: Duration::seconds(300),
            revalidation_interval: Duration::seconds(60),
            verification_timeout: Duration::seconds(30),
            storage_namespace: "sitedesk".to_string(),
        }
    }
}

impl SessionConfig {
    /// Read overrides from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(secs) = read_secs(&lookup, LIFETIME_ENV)? {
            config.lifetime = secs;
        }
        if let Some(secs) = read_secs(&lookup, WARNING_ENV)? {
            config.warning_window = secs;
        }
        if let Some(secs) = read_secs(&lookup, REVALIDATE_ENV)? {
            config.revalidation_interval = secs;
        }
        if let Some(secs) = read_secs(&lookup, VERIFY_TIMEOUT_ENV)? {
            config.verification_timeout = secs;
        }
        if let Some(namespace) = lookup(NAMESPACE_ENV) {
            config.storage_namespace = namespace.trim().to_string();
        }

        config.validate().context("invalid session configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lifetime <= Duration::zero() {
            return Err(ConfigError::NonPositive("session lifetime"));
        }
        if self.warning_window <= Duration::zero() {
            return Err(ConfigError::NonPositive("warning window"));
        }
        if self.revalidation_interval <= Duration::zero() {
            return Err(ConfigError::NonPositive("revalidation interval"));
        }
        if self.verification_timeout <= Duration::zero() {
            return Err(ConfigError::NonPositive("verification timeout"));
        }
        if self.warning_window >= self.lifetime {
            return Err(ConfigError::WarningNotBeforeExpiry {
                warning: self.warning_window.num_seconds(),
                lifetime: self.lifetime.num_seconds(),
            });
        }
        if self.storage_namespace.is_empty()
            || self.storage_namespace.chars().any(char::is_whitespace)
        {
            return Err(ConfigError::InvalidNamespace);
        }
        Ok(())
    }
}

fn read_secs<F>(lookup: &F, key: &str) -> anyhow::Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let secs: i64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a whole number of seconds, got '{raw}'"))?;
    Ok(Some(Duration::seconds(secs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_session_policy() {
        let config = SessionConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.lifetime.num_seconds(), 3600);
        assert_eq!(config.warning_window.num_seconds(), 300);
        assert_eq!(config.revalidation_interval.num_seconds(), 60);
        assert_eq!(config.verification_timeout.num_seconds(), 30);
    }

    #[test]
    fn overrides_are_applied() {
        let config = SessionConfig::from_lookup(lookup(&[
            (LIFETIME_ENV, "900"),
            (WARNING_ENV, " 120 "),
            (NAMESPACE_ENV, "site-a"),
        ]))
        .unwrap();
        assert_eq!(config.lifetime, Duration::seconds(900));
        assert_eq!(config.warning_window, Duration::seconds(120));
        assert_eq!(config.storage_namespace, "site-a");
    }

    #[test]
    fn rejects_malformed_numbers_with_the_key_name() {
        let err = SessionConfig::from_lookup(lookup(&[(LIFETIME_ENV, "an hour")])).unwrap_err();
        assert!(format!("{err:#}").contains(LIFETIME_ENV));
    }

    #[test]
    fn warning_window_must_fit_inside_lifetime() {
        let config = SessionConfig {
            lifetime: Duration::seconds(300),
            ..SessionConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::WarningNotBeforeExpiry {
                warning: 300,
                lifetime: 300
            })
        );
    }

    #[test]
    fn rejects_zero_interval_and_blank_namespace() {
        let config = SessionConfig {
            revalidation_interval: Duration::zero(),
            ..SessionConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NonPositive(_))));

        assert!(SessionConfig::from_lookup(lookup(&[(NAMESPACE_ENV, "my app")])).is_err());
    }
}
