//! Screen navigation.

use venue_map_viewport_models::Destination;

/// Receives navigation decisions from the synchronizer.
pub trait Navigator: Send + Sync {
    /// Shows `destination`.
    fn navigate(&self, destination: Destination);
}
