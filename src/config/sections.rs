//! Configuration sections.

use std::time::Duration;

use serde::Deserialize;

/// Default catalog management API endpoint.
pub const DEFAULT_CATALOG_ENDPOINT: &str = "https://cm.globalcatalog.cloud.ibm.com/api/v1-beta";
/// Default IAM token endpoint host.
pub const DEFAULT_IAM_ENDPOINT: &str = "https://iam.cloud.ibm.com";

/// Catalog service connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Base URL of the catalog management API.
    pub endpoint: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_CATALOG_ENDPOINT.to_string(),
            timeout_secs: 30,
        }
    }
}

/// IAM authentication settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Base URL of the IAM service.
    pub iam_endpoint: String,
    /// API key exchanged for tokens. Falls back to `CATVER_API_KEY`.
    pub api_key: Option<String>,
    /// Refresh this many seconds before the token expires.
    pub expiry_margin_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            iam_endpoint: DEFAULT_IAM_ENDPOINT.to_string(),
            api_key: None,
            expiry_margin_secs: 60,
        }
    }
}

/// Validation polling settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Seconds between status polls.
    pub poll_interval_secs: u64,
    /// Give up polling after this many seconds. None = wait indefinitely.
    pub deadline_secs: Option<u64>,
    /// Mark versions consumable after successful validation by default.
    pub mark_consumable: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            deadline_secs: Some(3600),
            mark_consumable: false,
        }
    }
}

impl ValidationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

/// Handling of stale-revision conflicts.
///
/// With `max_restarts = 0` conflicts are returned to the caller untouched.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConflictConfig {
    /// Full read-modify-write restarts attempted after a conflict.
    pub max_restarts: usize,
    /// Backoff before the first restart.
    pub min_delay_ms: u64,
    /// Backoff cap.
    pub max_delay_ms: u64,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            max_restarts: 0,
            min_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}
