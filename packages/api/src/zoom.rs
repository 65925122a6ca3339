//! Client-side zoom policy.
//!
//! Boxes whose great-circle diagonal exceeds the configured limit are
//! answered with
//! [`venue_map_viewport_models::FetchOutcome::ZoomedOutTooFar`].

use geo::{Distance, Haversine, Point};
use venue_map_viewport_models::BoundingBox;

/// Maximum fetchable area, expressed as a diagonal length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomPolicy {
    max_diagonal_km: f64,
}

impl ZoomPolicy {
    /// Creates a policy allowing diagonals up to `max_diagonal_km`.
    #[must_use]
    pub const fn new(max_diagonal_km: f64) -> Self {
        Self { max_diagonal_km }
    }

    /// Great-circle distance between the southwest and northeast corners.
    #[must_use]
    pub fn diagonal_km(bounds: &BoundingBox) -> f64 {
        let sw = Point::new(bounds.sw_lon, bounds.sw_lat);
        let ne = Point::new(bounds.ne_lon, bounds.ne_lat);
        Haversine.distance(sw, ne) / 1000.0
    }

    /// Whether `bounds` is too large to fetch.
    #[must_use]
    pub fn exceeds(&self, bounds: &BoundingBox) -> bool {
        Self::diagonal_km(bounds) > self.max_diagonal_km
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn city_sized_box_is_allowed() {
        let portland = BoundingBox::new(45.43, -122.84, 45.62, -122.47).unwrap();
        let diagonal = ZoomPolicy::diagonal_km(&portland);
        assert!(diagonal > 30.0 && diagonal < 40.0, "diagonal was {diagonal}");
        assert!(!ZoomPolicy::new(800.0).exceeds(&portland));
    }

    #[test]
    fn continental_box_is_refused() {
        let us = BoundingBox::new(24.5, -125.0, 49.4, -66.9).unwrap();
        assert!(ZoomPolicy::new(800.0).exceeds(&us));
    }
}
