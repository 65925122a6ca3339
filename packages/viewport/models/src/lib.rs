#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Data types shared by the venue map viewport engine.
//!
//! These types describe the visible map region, the active filter query,
//! pending camera requests, and the location summaries returned by the
//! REST API, plus the small derivations (box center, filter checks) that
//! both the API client and the synchronizer rely on.

use serde::{Deserialize, Deserializer, Serialize};
use strum_macros::{AsRefStr, Display};

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude.
    #[serde(deserialize_with = "de_number")]
    pub lat: f64,
    /// Longitude.
    #[serde(deserialize_with = "de_number")]
    pub lon: f64,
}

impl Coordinates {
    /// Creates a coordinate pair.
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// The rectangular region currently visible on the map.
///
/// The southwest corner is always strictly south and west of the northeast
/// corner; [`BoundingBox::new`] rejects anything else.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    /// Southern latitude boundary.
    pub sw_lat: f64,
    /// Western longitude boundary.
    pub sw_lon: f64,
    /// Northern latitude boundary.
    pub ne_lat: f64,
    /// Eastern longitude boundary.
    pub ne_lon: f64,
}

impl BoundingBox {
    /// Creates a bounding box from its southwest and northeast corners.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidBoundsError`] if any coordinate is not finite or the
    /// southwest corner is not strictly south and west of the northeast
    /// corner.
    pub fn new(
        sw_lat: f64,
        sw_lon: f64,
        ne_lat: f64,
        ne_lon: f64,
    ) -> Result<Self, InvalidBoundsError> {
        let finite = [sw_lat, sw_lon, ne_lat, ne_lon]
            .iter()
            .all(|v| v.is_finite());
        if !finite || sw_lat >= ne_lat || sw_lon >= ne_lon {
            return Err(InvalidBoundsError {
                sw_lat,
                sw_lon,
                ne_lat,
                ne_lon,
            });
        }

        Ok(Self {
            sw_lat,
            sw_lon,
            ne_lat,
            ne_lon,
        })
    }

    /// Builds a box of `lat_span` x `lon_span` degrees centered on `point`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidBoundsError`] if either span is not positive.
    pub fn around(
        point: Coordinates,
        lat_span: f64,
        lon_span: f64,
    ) -> Result<Self, InvalidBoundsError> {
        let half_lat = lat_span / 2.0;
        let half_lon = lon_span / 2.0;
        Self::new(
            point.lat - half_lat,
            point.lon - half_lon,
            point.lat + half_lat,
            point.lon + half_lon,
        )
    }

    /// Midpoint of the box, used as the camera target.
    #[must_use]
    pub fn center(&self) -> Coordinates {
        Coordinates {
            lat: f64::midpoint(self.sw_lat, self.ne_lat),
            lon: f64::midpoint(self.sw_lon, self.ne_lon),
        }
    }

    /// Southwest corner.
    #[must_use]
    pub const fn southwest(&self) -> Coordinates {
        Coordinates::new(self.sw_lat, self.sw_lon)
    }

    /// Northeast corner.
    #[must_use]
    pub const fn northeast(&self) -> Coordinates {
        Coordinates::new(self.ne_lat, self.ne_lon)
    }

    /// Whether `point` lies inside the box (edges inclusive).
    #[must_use]
    pub fn contains(&self, point: Coordinates) -> bool {
        (self.sw_lat..=self.ne_lat).contains(&point.lat)
            && (self.sw_lon..=self.ne_lon).contains(&point.lon)
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "sw({:.5},{:.5}) ne({:.5},{:.5})",
            self.sw_lat, self.sw_lon, self.ne_lat, self.ne_lon
        )
    }
}

/// Error returned when a [`BoundingBox`] would be degenerate or inverted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvalidBoundsError {
    /// Rejected southern latitude.
    pub sw_lat: f64,
    /// Rejected western longitude.
    pub sw_lon: f64,
    /// Rejected northern latitude.
    pub ne_lat: f64,
    /// Rejected eastern longitude.
    pub ne_lon: f64,
}

impl std::fmt::Display for InvalidBoundsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid bounds sw({}, {}) ne({}, {}): southwest must be strictly south and west of northeast",
            self.sw_lat, self.sw_lon, self.ne_lat, self.ne_lon
        )
    }
}

impl std::error::Error for InvalidBoundsError {}

/// A single filter criterion. Setting a criterion replaces any previous
/// value for the same field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QueryFilter {
    /// Only locations holding this machine.
    Machine(u64),
    /// Only locations of this type.
    LocationType(u64),
    /// Only locations run by this operator.
    Operator(u64),
    /// Only locations with at least this many machines.
    MinMachineCount(u32),
    /// Only the user's favorite locations.
    FavoritesOnly(bool),
}

/// The active filter query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// Free-text search string.
    pub free_text: String,
    /// Machine filter.
    pub machine_id: Option<u64>,
    /// Location type filter.
    pub location_type_id: Option<u64>,
    /// Minimum machine count filter.
    pub min_machine_count: Option<u32>,
    /// Operator filter.
    pub operator_id: Option<u64>,
    /// Whether only favorite locations are shown.
    pub favorites_only: bool,
}

impl Query {
    /// Whether any optional filter is set or favorites-only is on.
    #[must_use]
    pub const fn filter_applied(&self) -> bool {
        self.machine_id.is_some()
            || self.location_type_id.is_some()
            || self.min_machine_count.is_some()
            || self.operator_id.is_some()
            || self.favorites_only
    }

    /// Applies a single filter, replacing the previous value of that field.
    pub const fn apply(&mut self, filter: QueryFilter) {
        match filter {
            QueryFilter::Machine(id) => self.machine_id = Some(id),
            QueryFilter::LocationType(id) => self.location_type_id = Some(id),
            QueryFilter::Operator(id) => self.operator_id = Some(id),
            QueryFilter::MinMachineCount(n) => self.min_machine_count = Some(n),
            QueryFilter::FavoritesOnly(on) => self.favorites_only = on,
        }
    }
}

/// A transient instruction to move the camera.
///
/// "No request" is modelled as `Option::<ViewportRequest>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewportRequest {
    /// Move the camera; may be superseded by any later request.
    TriggerBoundsUpdate {
        /// Target bounds.
        bounds: BoundingBox,
        /// Skip the pre-animation delay (used for "my current location").
        immediate: bool,
    },
    /// Move the camera even if a normal request is already pending.
    ForceTriggerBoundsUpdate {
        /// Target bounds.
        bounds: BoundingBox,
    },
}

impl ViewportRequest {
    /// Target bounds of the request.
    #[must_use]
    pub const fn bounds(&self) -> BoundingBox {
        match self {
            Self::TriggerBoundsUpdate { bounds, .. } | Self::ForceTriggerBoundsUpdate { bounds } => {
                *bounds
            }
        }
    }

    /// Whether this is a forced request.
    #[must_use]
    pub const fn is_forced(&self) -> bool {
        matches!(self, Self::ForceTriggerBoundsUpdate { .. })
    }

    /// Whether the pre-animation delay should be skipped.
    #[must_use]
    pub const fn is_immediate(&self) -> bool {
        matches!(self, Self::TriggerBoundsUpdate { immediate: true, .. })
    }
}

/// A location summary as returned by the REST API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSummary {
    /// Location id.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Latitude.
    #[serde(deserialize_with = "de_number")]
    pub lat: f64,
    /// Longitude.
    #[serde(deserialize_with = "de_number")]
    pub lon: f64,
    /// Street address.
    #[serde(default)]
    pub street: Option<String>,
    /// City.
    #[serde(default)]
    pub city: Option<String>,
    /// State or province.
    #[serde(default)]
    pub state: Option<String>,
    /// Postal code.
    #[serde(default)]
    pub zip: Option<String>,
    /// Number of machines at the location.
    #[serde(default, alias = "machine_count")]
    pub num_machines: u32,
    /// Location type.
    #[serde(default)]
    pub location_type_id: Option<u64>,
    /// Operator.
    #[serde(default)]
    pub operator_id: Option<u64>,
}

impl LocationSummary {
    /// Coordinates of the location.
    #[must_use]
    pub const fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lon)
    }
}

/// A named region that groups locations (usually a metro area).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Region id.
    pub id: u64,
    /// URL slug (e.g. `"portland"`), matched by deep links.
    pub name: String,
    /// Human-readable name.
    #[serde(default)]
    pub full_name: String,
    /// Region center latitude, if known.
    #[serde(default, deserialize_with = "de_opt_number")]
    pub lat: Option<f64>,
    /// Region center longitude, if known.
    #[serde(default, deserialize_with = "de_opt_number")]
    pub lon: Option<f64>,
}

/// Outcome of a bounds fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "locations", rename_all = "snake_case")]
pub enum FetchOutcome {
    /// Locations matching the bounds and query.
    Locations(Vec<LocationSummary>),
    /// The requested area is too large; no results were fetched.
    ZoomedOutTooFar,
}

/// A screen the navigator can be asked to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum Destination {
    /// Details for a single location.
    LocationDetails {
        /// Location id.
        id: u64,
        /// Refresh the map bounds around the location when the user returns.
        refresh_map: bool,
    },
    /// The map tab.
    Map,
    /// The about/contact screen.
    Contact,
    /// The events screen.
    Events,
    /// The suggest-a-location screen.
    SuggestLocation,
    /// Saved (favorite) locations.
    Saved,
}

fn de_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn de_opt_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::String(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberOrString::String(s)) => {
            s.trim().parse().map(Some).map_err(serde::de::Error::custom)
        }
    }
}

/// The API sends coordinates both as JSON numbers and numeric strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    String(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_bounds() {
        assert!(BoundingBox::new(45.6, -122.7, 45.5, -122.6).is_err());
        assert!(BoundingBox::new(45.5, -122.6, 45.6, -122.7).is_err());
        assert!(BoundingBox::new(45.5, -122.7, 45.5, -122.6).is_err());
        assert!(BoundingBox::new(f64::NAN, -122.7, 45.6, -122.6).is_err());
    }

    #[test]
    fn around_is_centered_on_point() {
        let point = Coordinates::new(45.5, -122.6);
        let bbox = BoundingBox::around(point, 0.1, 0.1).unwrap();
        let center = bbox.center();
        assert!((center.lat - 45.5).abs() < 1e-9);
        assert!((center.lon - -122.6).abs() < 1e-9);
        assert!(bbox.contains(point));
        assert!((bbox.ne_lat - bbox.sw_lat - 0.1).abs() < 1e-9);
    }

    #[test]
    fn around_rejects_zero_span() {
        assert!(BoundingBox::around(Coordinates::new(1.0, 1.0), 0.0, 0.1).is_err());
    }

    #[test]
    fn filter_applied_tracks_every_optional_field() {
        let mut query = Query::default();
        assert!(!query.filter_applied());

        query.free_text = "pizza".to_string();
        assert!(!query.filter_applied());

        for filter in [
            QueryFilter::Machine(1),
            QueryFilter::LocationType(2),
            QueryFilter::Operator(3),
            QueryFilter::MinMachineCount(5),
            QueryFilter::FavoritesOnly(true),
        ] {
            let mut q = Query::default();
            q.apply(filter);
            assert!(q.filter_applied(), "{filter} should count as a filter");
        }
    }

    #[test]
    fn apply_is_last_write_wins() {
        let mut query = Query::default();
        query.apply(QueryFilter::Machine(1));
        query.apply(QueryFilter::Machine(7));
        assert_eq!(query.machine_id, Some(7));

        query.apply(QueryFilter::FavoritesOnly(true));
        query.apply(QueryFilter::FavoritesOnly(false));
        assert!(!query.favorites_only);
    }

    #[test]
    fn location_accepts_string_coordinates() {
        let json = serde_json::json!({
            "id": 42,
            "name": "Ground Kontrol",
            "lat": "45.5236",
            "lon": -122.6750,
            "city": "Portland",
            "machine_count": 37
        });
        let location: LocationSummary = serde_json::from_value(json).unwrap();
        assert!((location.lat - 45.5236).abs() < 1e-9);
        assert!((location.lon - -122.675).abs() < 1e-9);
        assert_eq!(location.num_machines, 37);
        assert_eq!(location.street, None);
    }

    #[test]
    fn region_tolerates_missing_and_blank_center() {
        let region: Region =
            serde_json::from_value(serde_json::json!({"id": 1, "name": "portland", "lat": ""}))
                .unwrap();
        assert_eq!(region.lat, None);
        assert_eq!(region.lon, None);
        assert!(region.full_name.is_empty());
    }

    #[test]
    fn viewport_request_accessors() {
        let bounds = BoundingBox::new(1.0, 1.0, 2.0, 2.0).unwrap();
        let normal = ViewportRequest::TriggerBoundsUpdate {
            bounds,
            immediate: true,
        };
        let forced = ViewportRequest::ForceTriggerBoundsUpdate { bounds };
        assert!(!normal.is_forced());
        assert!(normal.is_immediate());
        assert!(forced.is_forced());
        assert!(!forced.is_immediate());
        assert_eq!(forced.bounds(), bounds);
    }
}
