//! Ledger configuration: typed flags read from the settings table, with an
//! environment fallback and a code default.
//!
//! Lookup order for every setting:
//!
//! 1. the settings source (`system_settings` table, or a map in tests);
//! 2. the environment variable snapshot;
//! 3. the default declared next to the setting.
//!
//! A value that fails to parse is skipped with a warning and the next layer
//! is consulted.

pub mod postgres;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::warn;

use crate::ledger_store::StoreError;

pub use postgres::PostgresSettings;

/// Typed configuration consumed by the stock ledger engine.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Whether decreases may take a row below zero.
    async fn allow_negative_stock(&self) -> bool;

    /// Whether direct (forced) adjustments are permitted when the caller asks
    /// for the permission check.
    async fn allow_forced_adjustments(&self) -> bool;

    /// Balance under which a row is reported as below minimum.
    async fn minimum_stock_threshold(&self) -> i64;
}

#[async_trait]
impl<C> ConfigProvider for Arc<C>
where
    C: ConfigProvider + ?Sized,
{
    async fn allow_negative_stock(&self) -> bool {
        (**self).allow_negative_stock().await
    }

    async fn allow_forced_adjustments(&self) -> bool {
        (**self).allow_forced_adjustments().await
    }

    async fn minimum_stock_threshold(&self) -> i64 {
        (**self).minimum_stock_threshold().await
    }
}

/// Raw key/value lookup backing the configuration service.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
}

/// A named setting with its environment variable and default.
#[derive(Debug, Clone, Copy)]
pub struct Setting<T> {
    pub key: &'static str,
    pub env: &'static str,
    pub default: T,
}

pub const ALLOW_NEGATIVE_STOCK: Setting<bool> = Setting {
    key: "allow_negative_stock",
    env: "ALLOW_NEGATIVE_STOCK",
    default: false,
};

pub const ALLOW_FORCED_ADJUSTMENTS: Setting<bool> = Setting {
    key: "allow_forced_adjustments",
    env: "ALLOW_FORCED_ADJUSTMENTS",
    default: true,
};

pub const MINIMUM_STOCK_THRESHOLD: Setting<i64> = Setting {
    key: "minimum_stock_threshold",
    env: "MINIMUM_STOCK_THRESHOLD",
    default: 0,
};

/// Snapshot of environment variables.
///
/// Captured once so that lookups are deterministic and tests never touch the
/// process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvFallback {
    vars: HashMap<String, String>,
}

impl EnvFallback {
    pub fn from_process_env() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_int(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

/// Configuration service over a settings source and an environment snapshot.
#[derive(Debug, Clone)]
pub struct ConfigService<S> {
    source: S,
    env: EnvFallback,
}

impl<S> ConfigService<S>
where
    S: SettingsSource,
{
    pub fn new(source: S, env: EnvFallback) -> Self {
        Self { source, env }
    }

    pub async fn get_bool(&self, setting: &Setting<bool>) -> bool {
        self.lookup(setting, parse_bool).await
    }

    pub async fn get_int(&self, setting: &Setting<i64>) -> i64 {
        self.lookup(setting, parse_int).await
    }

    async fn lookup<T>(&self, setting: &Setting<T>, parse: fn(&str) -> Option<T>) -> T
    where
        T: Copy + core::fmt::Debug,
    {
        match self.source.get(setting.key).await {
            Ok(Some(raw)) => match parse(&raw) {
                Some(value) => return value,
                None => warn!(key = setting.key, value = %raw, "unparseable setting value; falling back"),
            },
            Ok(None) => {}
            Err(err) => warn!(key = setting.key, error = %err, "settings lookup failed; falling back"),
        }

        if let Some(raw) = self.env.get(setting.env) {
            match parse(raw) {
                Some(value) => return value,
                None => warn!(env = setting.env, value = %raw, "unparseable environment value; using default"),
            }
        }

        setting.default
    }
}

#[async_trait]
impl<S> ConfigProvider for ConfigService<S>
where
    S: SettingsSource,
{
    async fn allow_negative_stock(&self) -> bool {
        self.get_bool(&ALLOW_NEGATIVE_STOCK).await
    }

    async fn allow_forced_adjustments(&self) -> bool {
        self.get_bool(&ALLOW_FORCED_ADJUSTMENTS).await
    }

    async fn minimum_stock_threshold(&self) -> i64 {
        self.get_int(&MINIMUM_STOCK_THRESHOLD).await
    }
}

/// In-memory settings source for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySettings {
    values: RwLock<HashMap<String, String>>,
}

impl InMemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.into(), value.into());
        }
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.write() {
            values.remove(key);
        }
    }
}

#[async_trait]
impl SettingsSource for InMemorySettings {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self
            .values
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }
}

#[async_trait]
impl<S> SettingsSource for Arc<S>
where
    S: SettingsSource + ?Sized,
{
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }
}
