#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Map viewport and query synchronization engine.
//!
//! Keeps the map camera, the visible bounds, the active filter query and
//! the fetched locations consistent while the user pans, zooms, filters
//! and follows deep links. The [`synchronizer::ViewportSynchronizer`]
//! actor drives everything; callers talk to it through a
//! [`synchronizer::SyncHandle`] and watch [`synchronizer::ViewportSnapshot`]s.
//!
//! The map itself and screen navigation are supplied by the embedding
//! application through the [`surface::MapSurface`] and
//! [`navigation::Navigator`] traits.

pub mod bounds;
pub mod config;
pub mod deep_link;
pub mod navigation;
pub mod query_state;
pub mod results;
pub mod surface;
pub mod synchronizer;

#[cfg(test)]
mod test_support;

use thiserror::Error;

pub use config::{AppConfig, ConfigError, SyncConfig};
pub use deep_link::{DeepLink, DeepLinkError, DeepLinkResolution, DeepLinkResolver};
pub use navigation::Navigator;
pub use surface::{CameraError, HeadlessSurface, MapSurface};
pub use synchronizer::{SyncHandle, SyncState, ViewportSnapshot, ViewportSynchronizer};

/// Errors from driving the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The camera stayed unmounted for every attempt.
    #[error("Camera not ready after {attempts} attempt(s)")]
    CameraNotReady {
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// A newer viewport request replaced the one being applied.
    #[error("Viewport request superseded")]
    Superseded,

    /// The synchronizer task is no longer running.
    #[error("Viewport synchronizer stopped")]
    Stopped,
}
