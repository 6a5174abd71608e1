//! Per-type TTLs for data cached on a session.

use anyhow::{bail, Result};
use chrono::{DateTime, TimeDelta, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// TTL applied to data types with no configured entry.
pub const DEFAULT_TTL_SECONDS: u64 = 300;

const TTL_KEY_SUFFIX: &str = "_ttl_seconds";

/// Mapping from `<data_type>_ttl_seconds` to a TTL in seconds (`[cache]`).
///
/// Defaults: profile 1800, metrics 300, transactions 60, alerts 30.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct CacheConfig {
    ttl_seconds: BTreeMap<String, u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::from_entries([
            ("profile_ttl_seconds", 1800),
            ("metrics_ttl_seconds", 300),
            ("transactions_ttl_seconds", 60),
            ("alerts_ttl_seconds", 30),
        ])
    }
}

impl CacheConfig {
    pub fn from_entries<K: Into<String>>(entries: impl IntoIterator<Item = (K, u64)>) -> Self {
        Self {
            ttl_seconds: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Set the TTL for one data type, returning the updated config.
    pub fn with_ttl(mut self, data_type: &str, seconds: u64) -> Self {
        self.ttl_seconds.insert(ttl_key(data_type), seconds);
        self
    }

    /// TTL for `data_type`, falling back to [`DEFAULT_TTL_SECONDS`].
    pub fn ttl_for(&self, data_type: &str) -> u64 {
        self.ttl_seconds
            .get(&ttl_key(data_type))
            .copied()
            .unwrap_or(DEFAULT_TTL_SECONDS)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, u64)> {
        self.ttl_seconds.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn validate(&self) -> Result<()> {
        for (key, seconds) in &self.ttl_seconds {
            let Some(data_type) = key.strip_suffix(TTL_KEY_SUFFIX) else {
                bail!("cache.{key} must end with '{TTL_KEY_SUFFIX}'");
            };
            if data_type.is_empty() {
                bail!("cache.{key} is missing a data type");
            }
            if *seconds == 0 {
                bail!("cache.{key} must be greater than 0");
            }
        }
        Ok(())
    }
}

fn ttl_key(data_type: &str) -> String {
    format!("{data_type}{TTL_KEY_SUFFIX}")
}

/// Why a cache lookup produced no value.
#[derive(Debug, Clone, PartialEq)]
pub enum MissReason {
    NotFound,
    Expired { age_seconds: f64, ttl_seconds: u64 },
}

impl MissReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Expired { .. } => "expired",
        }
    }
}

/// Outcome of [`SessionManager::get_cached_data`](super::SessionManager::get_cached_data).
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(Value),
    Miss(MissReason),
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Hit(value) => Some(value),
            Self::Miss(_) => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Hit(value) => Some(value),
            Self::Miss(_) => None,
        }
    }

    pub fn miss_reason(&self) -> Option<&MissReason> {
        match self {
            Self::Hit(_) => None,
            Self::Miss(reason) => Some(reason),
        }
    }
}

/// True when data cached at `cached_at` is older than `ttl_seconds` at `now`.
///
/// An entry exactly `ttl_seconds` old is still fresh.
pub fn is_expired(cached_at: DateTime<Utc>, now: DateTime<Utc>, ttl_seconds: u64) -> bool {
    let ttl = i64::try_from(ttl_seconds)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX);
    now - cached_at > ttl
}
