//! Environment-driven configuration.

use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

use quoteforge_core::Decimal;
use quoteforge_observability::LogFormat;
use quoteforge_quoting::{ApprovalOrdering, ApprovalPolicy};

pub const DATABASE_URL: &str = "QUOTEFORGE_DATABASE_URL";
pub const DB_MAX_CONNECTIONS: &str = "QUOTEFORGE_DB_MAX_CONNECTIONS";
pub const DEFAULT_MARGIN: &str = "QUOTEFORGE_DEFAULT_MARGIN";
pub const DEFAULT_VALIDITY_DAYS: &str = "QUOTEFORGE_DEFAULT_VALIDITY_DAYS";
pub const SALES_MANAGER_THRESHOLD: &str = "QUOTEFORGE_APPROVAL_SALES_MANAGER_THRESHOLD";
pub const GENERAL_MANAGER_THRESHOLD: &str = "QUOTEFORGE_APPROVAL_GENERAL_MANAGER_THRESHOLD";
pub const APPROVAL_ORDERING: &str = "QUOTEFORGE_APPROVAL_ORDERING";
pub const SENDER_NAME: &str = "QUOTEFORGE_SENDER_NAME";
pub const LOG_FORMAT: &str = "QUOTEFORGE_LOG_FORMAT";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime settings of the quoting engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotingConfig {
    /// Postgres connection string; `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub default_margin: Decimal,
    pub default_validity_days: i64,
    pub approval_policy: ApprovalPolicy,
    pub approval_ordering: ApprovalOrdering,
    pub sender_name: String,
    pub log_format: LogFormat,
}

impl Default for QuotingConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: 5,
            default_margin: Decimal::from(30),
            default_validity_days: 30,
            approval_policy: ApprovalPolicy::default(),
            approval_ordering: ApprovalOrdering::default(),
            sender_name: "Sales".to_string(),
            log_format: LogFormat::default(),
        }
    }
}

impl QuotingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset or blank keys keep their
    /// defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &'static str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let database_url = get(DATABASE_URL);
        let db_max_connections = parse_or(&get, DB_MAX_CONNECTIONS, defaults.db_max_connections)?;
        let default_margin = parse_or(&get, DEFAULT_MARGIN, defaults.default_margin)?;
        let default_validity_days =
            parse_or(&get, DEFAULT_VALIDITY_DAYS, defaults.default_validity_days)?;
        let approval_policy = ApprovalPolicy {
            sales_manager_threshold: parse_or(
                &get,
                SALES_MANAGER_THRESHOLD,
                defaults.approval_policy.sales_manager_threshold,
            )?,
            general_manager_threshold: parse_or(
                &get,
                GENERAL_MANAGER_THRESHOLD,
                defaults.approval_policy.general_manager_threshold,
            )?,
        };
        let approval_ordering = match get(APPROVAL_ORDERING) {
            Some(raw) => ApprovalOrdering::parse(&raw.to_ascii_lowercase()).ok_or_else(|| {
                ConfigError::Invalid {
                    key: APPROVAL_ORDERING,
                    value: raw.clone(),
                    reason: "expected 'parallel' or 'sequential'".to_string(),
                }
            })?,
            None => defaults.approval_ordering,
        };
        let sender_name = get(SENDER_NAME).unwrap_or(defaults.sender_name);
        let log_format = match get(LOG_FORMAT) {
            Some(raw) => LogFormat::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                key: LOG_FORMAT,
                value: raw.clone(),
                reason: "expected 'json' or 'pretty'".to_string(),
            })?,
            None => defaults.log_format,
        };

        let config = Self {
            database_url,
            db_max_connections,
            default_margin,
            default_validity_days,
            approval_policy,
            approval_ordering,
            sender_name,
            log_format,
        };
        config.validate()?;
        debug!(
            in_memory = config.database_url.is_none(),
            ordering = ?config.approval_ordering,
            "quoting configuration loaded"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.db_max_connections == 0 {
            return Err(invalid(DB_MAX_CONNECTIONS, self.db_max_connections, "must be positive"));
        }
        if self.default_margin < Decimal::ZERO || self.default_margin >= Decimal::ONE_HUNDRED {
            return Err(invalid(DEFAULT_MARGIN, self.default_margin, "must be in [0, 100)"));
        }
        if self.default_validity_days <= 0 {
            return Err(invalid(
                DEFAULT_VALIDITY_DAYS,
                self.default_validity_days,
                "must be positive",
            ));
        }
        let policy = &self.approval_policy;
        if policy.sales_manager_threshold <= Decimal::ZERO {
            return Err(invalid(
                SALES_MANAGER_THRESHOLD,
                policy.sales_manager_threshold,
                "must be positive",
            ));
        }
        if policy.general_manager_threshold < policy.sales_manager_threshold {
            return Err(invalid(
                GENERAL_MANAGER_THRESHOLD,
                policy.general_manager_threshold,
                "must not be below the sales manager threshold",
            ));
        }
        Ok(())
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&'static str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn invalid(key: &'static str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
