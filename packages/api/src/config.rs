//! REST client configuration.

use serde::{Deserialize, Serialize};

/// Connection and policy settings for [`crate::HttpLocationApi`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API root (e.g., `"https://pinballmap.com/api/v1"`).
    pub base_url: String,
    /// Per-request timeout in seconds. A timed-out request surfaces as a
    /// retryable [`crate::ApiError::Http`].
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Largest bounding-box diagonal, in kilometres, that is still fetched.
    #[serde(default = "default_max_diagonal_km")]
    pub max_diagonal_km: f64,
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_max_diagonal_km() -> f64 {
    800.0
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://pinballmap.com/api/v1".to_string(),
            timeout_secs: default_timeout_secs(),
            max_diagonal_km: default_max_diagonal_km(),
        }
    }
}
