#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Result fetcher for the venue map.
//!
//! Wraps the three REST calls the viewport engine depends on (locations in
//! a bounding box, address geocoding, and region listings) behind the
//! [`LocationApi`] trait. The [`client::HttpLocationApi`] implementation
//! talks to the real service; tests and simulations substitute in-memory
//! implementations.
//!
//! Bounds fetches pass through a [`zoom::ZoomPolicy`] first: an area that
//! is too large is answered with [`FetchOutcome::ZoomedOutTooFar`] without
//! touching the network.

pub mod client;
pub mod config;
mod request;
pub mod zoom;

use async_trait::async_trait;
use thiserror::Error;
use venue_map_viewport_models::{
    BoundingBox, Coordinates, FetchOutcome, LocationSummary, Query, Region,
};

pub use client::HttpLocationApi;
pub use config::ApiConfig;

/// Errors from REST calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (connection, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Numeric status code.
        status: u16,
        /// Request URL.
        url: String,
    },

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },
}

impl ApiError {
    /// Whether a manual retry of the same request could succeed.
    ///
    /// Client errors other than 429 are permanent; everything else
    /// (timeouts, connection failures, 5xx, garbled bodies) is not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
            }
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Parse { .. } => true,
        }
    }
}

/// Backing calls used by the viewport engine.
#[async_trait]
pub trait LocationApi: Send + Sync {
    /// Fetches the locations inside `bounds` that match `query`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request or response parsing fails.
    async fn locations_in_bounds(
        &self,
        bounds: &BoundingBox,
        query: &Query,
    ) -> Result<FetchOutcome, ApiError>;

    /// Resolves a free-form address to the coordinates of the closest
    /// location. `Ok(None)` means the address did not resolve.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request or response parsing fails.
    async fn closest_by_address(&self, address: &str) -> Result<Option<Coordinates>, ApiError>;

    /// Fetches every location in a region, optionally narrowed to a city.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request or response parsing fails.
    async fn region_locations(
        &self,
        region: &str,
        city: Option<&str>,
    ) -> Result<Vec<LocationSummary>, ApiError>;

    /// Lists all known regions.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request or response parsing fails.
    async fn regions(&self) -> Result<Vec<Region>, ApiError>;
}
