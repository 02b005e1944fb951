//! Connection source configuration
//!
//! `SourceConfig` is an immutable, value-equality description of one
//! connection source. Two configs that compare equal describe the same
//! source, which is what lets [`SourceRegistry`](crate::SourceRegistry) key
//! on it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{SourceError, SourceResult};

/// Default cap on connections checked out at once.
pub const DEFAULT_MAX_ACTIVE: u32 = 5;
/// Default number of idle connections a pooling source may keep.
pub const DEFAULT_MAX_IDLE: u32 = 5;

fn default_max_active() -> u32 {
    DEFAULT_MAX_ACTIVE
}

fn default_max_idle() -> u32 {
    DEFAULT_MAX_IDLE
}

/// Configuration handed to a [`SourceFactory`](crate::SourceFactory).
///
/// # Example
///
/// ```toml
/// url = "postgres://db.internal:5432/catalog"
/// user = "svc"
/// max_active = 10
///
/// [properties]
/// application_name = "indexer"
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Driver-specific connection URL
    pub url: String,
    /// Login user, if the driver needs one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Login password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Maximum connections checked out at once
    #[serde(default = "default_max_active")]
    pub max_active: u32,
    /// Maximum idle connections kept by a pooling source
    #[serde(default = "default_max_idle")]
    pub max_idle: u32,
    /// Extra driver properties, ordered so equal maps hash equally
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl SourceConfig {
    /// Create a config for `url` with default limits
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user: None,
            password: None,
            max_active: DEFAULT_MAX_ACTIVE,
            max_idle: DEFAULT_MAX_IDLE,
            properties: BTreeMap::new(),
        }
    }

    /// Set the login user
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the login password
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the maximum number of connections checked out at once
    pub fn with_max_active(mut self, max_active: u32) -> Self {
        self.max_active = max_active;
        self
    }

    /// Set the maximum number of idle connections
    pub fn with_max_idle(mut self, max_idle: u32) -> Self {
        self.max_idle = max_idle;
        self
    }

    /// Add a driver property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Look up a driver property
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Check the driver-independent constraints.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::InvalidConfig` if the URL is blank or
    /// `max_active` is zero.
    pub fn validate(&self) -> SourceResult<()> {
        if self.url.trim().is_empty() {
            return Err(SourceError::invalid_config("url must not be empty"));
        }
        if self.max_active == 0 {
            return Err(SourceError::invalid_config("max_active must be at least 1"));
        }
        Ok(())
    }
}

// Hand-written so passwords never reach logs.
impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("max_active", &self.max_active)
            .field("max_idle", &self.max_idle)
            .field("properties", &self.properties)
            .finish()
    }
}
