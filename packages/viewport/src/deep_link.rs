//! Inbound deep links.
//!
//! [`DeepLink::parse`] classifies a URL without any I/O. The first matching
//! rule wins, and a marker only counts when it is not at the very start of
//! the URL:
//!
//! 1. `location_id=<n>` opens the location details screen.
//! 2. `address=<text>` geocodes the address and centers the map on it.
//! 3. `region=<name>[&by_city_id=<city>]` centers on a city or loads a region.
//! 4. `about`, `events`, `suggest`, `saved` open the matching screen.
//! 5. Anything else loads the first known region named in the URL.
//!
//! [`DeepLinkResolver::resolve`] performs the lookups and produces a
//! [`DeepLinkResolution`] for the synchronizer to apply.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use venue_map_api::LocationApi;
use venue_map_viewport_models::{BoundingBox, Coordinates, Destination, Region};

use crate::config::SyncConfig;

const LOCATION_MARKER: &str = "location_id=";
const ADDRESS_MARKER: &str = "address=";
const REGION_MARKER: &str = "region=";
const CITY_MARKER: &str = "by_city_id=";

/// Screen keywords, checked in order.
const SCREEN_MARKERS: [(&str, Destination); 4] = [
    ("about", Destination::Contact),
    ("events", Destination::Events),
    ("suggest", Destination::SuggestLocation),
    ("saved", Destination::Saved),
];

/// A classified deep link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeepLink {
    /// Open details for a location.
    Location {
        /// Location id.
        id: u64,
    },
    /// Center the map on a geocoded address.
    Address {
        /// Percent-decoded address text.
        address: String,
    },
    /// Center on a city within a region, or load the whole region.
    Region {
        /// Region name as written in the URL.
        name: String,
        /// City filter, if present and non-empty.
        city: Option<String>,
    },
    /// Open a screen that does not involve the map.
    Screen(Destination),
    /// No marker matched.
    Unrecognized {
        /// The URL as received.
        url: String,
    },
}

impl DeepLink {
    /// Classifies `url`.
    #[must_use]
    pub fn parse(url: &str) -> Self {
        if has_marker(url, LOCATION_MARKER) {
            if let Some(id) = marker_value(url, LOCATION_MARKER).and_then(|v| v.parse().ok()) {
                return Self::Location { id };
            }
            log::debug!("Ignoring non-numeric location id in {url}");
            return Self::unrecognized(url);
        }

        if has_marker(url, ADDRESS_MARKER) {
            let Ok(decoded) = urlencoding::decode(url) else {
                log::debug!("Cannot percent-decode {url}");
                return Self::unrecognized(url);
            };
            if let Some((_, address)) = decoded.split_once(ADDRESS_MARKER) {
                return Self::Address {
                    address: address.to_string(),
                };
            }
            return Self::unrecognized(url);
        }

        if has_marker(url, REGION_MARKER) {
            let name = marker_value(url, REGION_MARKER).unwrap_or_default();
            let city = if has_marker(url, CITY_MARKER) {
                marker_value(url, CITY_MARKER)
                    .filter(|city| !city.is_empty())
                    .map(str::to_string)
            } else {
                None
            };
            return Self::Region {
                name: name.to_string(),
                city,
            };
        }

        SCREEN_MARKERS
            .iter()
            .find(|(marker, _)| has_marker(url, marker))
            .map_or_else(|| Self::unrecognized(url), |(_, dest)| Self::Screen(*dest))
    }

    fn unrecognized(url: &str) -> Self {
        Self::Unrecognized {
            url: url.to_string(),
        }
    }
}

fn has_marker(url: &str, marker: &str) -> bool {
    url.find(marker).is_some_and(|index| index > 0)
}

/// Text after the first `marker`, up to the next `&`.
fn marker_value<'a>(url: &'a str, marker: &str) -> Option<&'a str> {
    let (_, rest) = url.split_once(marker)?;
    Some(rest.split_once('&').map_or(rest, |(value, _)| value))
}

/// Non-fatal problems met while resolving a deep link. Navigation happens
/// regardless.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeepLinkError {
    /// The address did not resolve to any location.
    #[error("No location found for address {address:?}")]
    GeocodeNotFound {
        /// Address that was looked up.
        address: String,
    },

    /// The region is unknown and the city lookup found nothing.
    #[error("Unknown region {name:?}")]
    RegionNotFound {
        /// Region name from the URL.
        name: String,
    },
}

/// What the synchronizer should do for a deep link.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeepLinkResolution {
    /// Screen to show.
    pub destination: Destination,
    /// Bounds to force the camera to, if any.
    pub bounds_request: Option<BoundingBox>,
    /// Region whose locations should be loaded without a bounds constraint.
    pub region_load: Option<Region>,
    /// Problem met during resolution, if any.
    pub issue: Option<DeepLinkError>,
}

impl DeepLinkResolution {
    const fn navigate(destination: Destination) -> Self {
        Self {
            destination,
            bounds_request: None,
            region_load: None,
            issue: None,
        }
    }
}

/// Resolves deep links against the REST API and the region catalog.
pub struct DeepLinkResolver {
    api: Arc<dyn LocationApi>,
    regions: Arc<[Region]>,
    lat_span: f64,
    lon_span: f64,
}

impl DeepLinkResolver {
    #[must_use]
    pub fn new(api: Arc<dyn LocationApi>, regions: Arc<[Region]>, config: &SyncConfig) -> Self {
        Self {
            api,
            regions,
            lat_span: config.default_lat_span,
            lon_span: config.default_lon_span,
        }
    }

    /// Classifies and resolves `url`.
    pub async fn resolve(&self, url: &str) -> DeepLinkResolution {
        let link = DeepLink::parse(url);
        log::debug!("Deep link {url} classified as {link:?}");

        match link {
            DeepLink::Location { id } => DeepLinkResolution::navigate(Destination::LocationDetails {
                id,
                refresh_map: true,
            }),
            DeepLink::Address { address } => self.resolve_address(address).await,
            DeepLink::Region { name, city } => self.resolve_region(&name, city.as_deref()).await,
            DeepLink::Screen(destination) => DeepLinkResolution::navigate(destination),
            DeepLink::Unrecognized { url } => DeepLinkResolution {
                region_load: self.region_named_in(&url).cloned(),
                ..DeepLinkResolution::navigate(Destination::Map)
            },
        }
    }

    async fn resolve_address(&self, address: String) -> DeepLinkResolution {
        let point = match self.api.closest_by_address(&address).await {
            Ok(point) => point,
            Err(e) => {
                log::warn!("Address lookup for {address:?} failed: {e}");
                None
            }
        };

        match point.and_then(|point| self.box_around(point)) {
            Some(bounds) => DeepLinkResolution {
                bounds_request: Some(bounds),
                ..DeepLinkResolution::navigate(Destination::Map)
            },
            None => DeepLinkResolution {
                issue: Some(DeepLinkError::GeocodeNotFound { address }),
                ..DeepLinkResolution::navigate(Destination::Map)
            },
        }
    }

    async fn resolve_region(&self, name: &str, city: Option<&str>) -> DeepLinkResolution {
        if let Some(city) = city {
            match self.api.region_locations(name, Some(city)).await {
                Ok(locations) => {
                    if let Some(bounds) = locations
                        .first()
                        .and_then(|location| self.box_around(location.coordinates()))
                    {
                        return DeepLinkResolution {
                            bounds_request: Some(bounds),
                            ..DeepLinkResolution::navigate(Destination::Map)
                        };
                    }
                    log::debug!("No locations for city {city:?} in region {name:?}");
                }
                Err(e) => log::warn!("City lookup {city:?} in region {name:?} failed: {e}"),
            }
        }

        match self.known_region(name) {
            Some(region) => DeepLinkResolution {
                region_load: Some(region.clone()),
                ..DeepLinkResolution::navigate(Destination::Map)
            },
            None => DeepLinkResolution {
                issue: Some(DeepLinkError::RegionNotFound {
                    name: name.to_string(),
                }),
                ..DeepLinkResolution::navigate(Destination::Map)
            },
        }
    }

    fn known_region(&self, name: &str) -> Option<&Region> {
        self.regions
            .iter()
            .find(|region| region.name.eq_ignore_ascii_case(name))
    }

    fn region_named_in(&self, url: &str) -> Option<&Region> {
        self.regions
            .iter()
            .find(|region| !region.name.is_empty() && url.contains(region.name.as_str()))
    }

    fn box_around(&self, point: Coordinates) -> Option<BoundingBox> {
        BoundingBox::around(point, self.lat_span, self.lon_span)
            .inspect_err(|e| log::warn!("Cannot build default box: {e}"))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeApi, location_at, region};

    fn resolver(api: FakeApi) -> DeepLinkResolver {
        let regions: Arc<[Region]> = vec![region(1, "portland"), region(2, "seattle")].into();
        DeepLinkResolver::new(Arc::new(api), regions, &SyncConfig::default())
    }

    #[test]
    fn parses_location_id() {
        assert_eq!(
            DeepLink::parse("https://pinballmap.com/map?location_id=42&x=1"),
            DeepLink::Location { id: 42 }
        );
        assert!(matches!(
            DeepLink::parse("https://pinballmap.com/map?location_id=abc"),
            DeepLink::Unrecognized { .. }
        ));
    }

    #[test]
    fn marker_at_start_does_not_count() {
        assert!(matches!(
            DeepLink::parse("location_id=42"),
            DeepLink::Unrecognized { .. }
        ));
    }

    #[test]
    fn parses_decoded_address() {
        assert_eq!(
            DeepLink::parse("https://pinballmap.com/map?address=100%20Main%20St"),
            DeepLink::Address {
                address: "100 Main St".to_string()
            }
        );
    }

    #[test]
    fn undecodable_address_is_unrecognized() {
        assert_eq!(
            DeepLink::parse("https://pinballmap.com/map?address=%FF"),
            DeepLink::Unrecognized {
                url: "https://pinballmap.com/map?address=%FF".to_string()
            }
        );
    }

    #[test]
    fn parses_region_with_and_without_city() {
        assert_eq!(
            DeepLink::parse("https://pinballmap.com/map?region=Oregon&by_city_id=Portland"),
            DeepLink::Region {
                name: "Oregon".to_string(),
                city: Some("Portland".to_string())
            }
        );
        assert_eq!(
            DeepLink::parse("https://pinballmap.com/map?region=portland&by_city_id="),
            DeepLink::Region {
                name: "portland".to_string(),
                city: None
            }
        );
    }

    #[test]
    fn parses_screens_in_order() {
        assert_eq!(
            DeepLink::parse("https://pinballmap.com/about"),
            DeepLink::Screen(Destination::Contact)
        );
        assert_eq!(
            DeepLink::parse("https://pinballmap.com/saved"),
            DeepLink::Screen(Destination::Saved)
        );
        // An earlier rule wins even when a screen keyword is present.
        assert_eq!(
            DeepLink::parse("https://pinballmap.com/events?location_id=7"),
            DeepLink::Location { id: 7 }
        );
    }

    #[tokio::test]
    async fn location_link_only_navigates() {
        let resolution = resolver(FakeApi::new())
            .resolve("https://pinballmap.com/map?location_id=42")
            .await;
        assert_eq!(
            resolution.destination,
            Destination::LocationDetails {
                id: 42,
                refresh_map: true
            }
        );
        assert_eq!(resolution.bounds_request, None);
        assert_eq!(resolution.region_load, None);
    }

    #[tokio::test]
    async fn address_hit_centers_on_point() {
        let api = FakeApi::new().with_address("100 Main St", Coordinates::new(45.5, -122.6));
        let resolution = resolver(api)
            .resolve("https://pinballmap.com/map?address=100%20Main%20St")
            .await;

        let bounds = resolution.bounds_request.unwrap();
        assert!((bounds.center().lat - 45.5).abs() < 1e-9);
        assert!((bounds.center().lon - -122.6).abs() < 1e-9);
        assert_eq!(resolution.destination, Destination::Map);
        assert_eq!(resolution.issue, None);
    }

    #[tokio::test]
    async fn address_miss_reports_geocode_not_found() {
        let resolution = resolver(FakeApi::new())
            .resolve("https://pinballmap.com/map?address=nowhere")
            .await;
        assert_eq!(resolution.bounds_request, None);
        assert_eq!(
            resolution.issue,
            Some(DeepLinkError::GeocodeNotFound {
                address: "nowhere".to_string()
            })
        );
        assert_eq!(resolution.destination, Destination::Map);
    }

    #[tokio::test]
    async fn region_city_hit_centers_on_first_location() {
        let api = FakeApi::new().with_region_locations(
            "Oregon",
            Some("Portland"),
            vec![location_at(5, 45.52, -122.68), location_at(6, 45.0, -122.0)],
        );
        let resolution = resolver(api)
            .resolve("https://pinballmap.com/map?region=Oregon&by_city_id=Portland")
            .await;

        let bounds = resolution.bounds_request.unwrap();
        assert!(bounds.contains(Coordinates::new(45.52, -122.68)));
        assert!(!bounds.contains(Coordinates::new(45.0, -122.0)));
        assert_eq!(resolution.region_load, None);
    }

    #[tokio::test]
    async fn empty_city_falls_back_to_known_region() {
        let resolution = resolver(FakeApi::new())
            .resolve("https://pinballmap.com/map?region=Portland&by_city_id=Nowhere")
            .await;
        assert_eq!(resolution.bounds_request, None);
        assert_eq!(resolution.region_load.map(|r| r.id), Some(1));
        assert_eq!(resolution.issue, None);
    }

    #[tokio::test]
    async fn unknown_region_is_reported() {
        let resolution = resolver(FakeApi::new())
            .resolve("https://pinballmap.com/map?region=Oregon&by_city_id=Portland")
            .await;
        assert_eq!(resolution.bounds_request, None);
        assert_eq!(resolution.region_load, None);
        assert_eq!(
            resolution.issue,
            Some(DeepLinkError::RegionNotFound {
                name: "Oregon".to_string()
            })
        );
        assert_eq!(resolution.destination, Destination::Map);
    }

    #[tokio::test]
    async fn unrecognized_link_loads_named_region() {
        let resolution = resolver(FakeApi::new())
            .resolve("https://pinballmap.com/seattle")
            .await;
        assert_eq!(resolution.region_load.map(|r| r.id), Some(2));

        let resolution = resolver(FakeApi::new())
            .resolve("https://pinballmap.com/Seattle")
            .await;
        assert_eq!(resolution.region_load, None);
        assert_eq!(resolution.issue, None);
    }

    #[tokio::test]
    async fn undecodable_address_leaves_the_map_alone() {
        // Reaching the geocoder would panic.
        let resolution = resolver(FakeApi::new().with_panicking_geocoder())
            .resolve("https://pinballmap.com/map?address=%FF")
            .await;
        assert_eq!(resolution.bounds_request, None);
        assert_eq!(resolution.region_load, None);
        assert_eq!(resolution.issue, None);
        assert_eq!(resolution.destination, Destination::Map);
    }
}
