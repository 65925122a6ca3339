//! HTTP implementation of [`LocationApi`].
//!
//! Endpoints (relative to [`ApiConfig::base_url`]):
//!
//! - `locations/within_bounding_box.json` for bounds fetches
//! - `locations/closest_by_address.json` for address deep links
//! - `region/{name}/locations.json` for region deep links
//! - `regions.json` for the region catalog

use std::time::Duration;

use async_trait::async_trait;
use venue_map_viewport_models::{
    BoundingBox, Coordinates, FetchOutcome, LocationSummary, Query, Region,
};

use crate::request::send_json;
use crate::zoom::ZoomPolicy;
use crate::{ApiConfig, ApiError, LocationApi};

/// REST client for the location service.
#[derive(Debug, Clone)]
pub struct HttpLocationApi {
    client: reqwest::Client,
    base_url: String,
    zoom: ZoomPolicy,
}

impl HttpLocationApi {
    /// Builds a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Http`] if the underlying HTTP client cannot be
    /// constructed (e.g., the TLS backend fails to initialize).
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("venue_map/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            zoom: ZoomPolicy::new(config.max_diagonal_km),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

#[async_trait]
impl LocationApi for HttpLocationApi {
    async fn locations_in_bounds(
        &self,
        bounds: &BoundingBox,
        query: &Query,
    ) -> Result<FetchOutcome, ApiError> {
        if self.zoom.exceeds(bounds) {
            log::debug!(
                "Bounds {bounds} span {:.0} km, not fetching",
                ZoomPolicy::diagonal_km(bounds)
            );
            return Ok(FetchOutcome::ZoomedOutTooFar);
        }

        let body = send_json(
            self.client
                .get(self.url("locations/within_bounding_box.json"))
                .query(&bounds_params(bounds, query)),
        )
        .await?;

        parse_bounds_response(&body)
    }

    async fn closest_by_address(&self, address: &str) -> Result<Option<Coordinates>, ApiError> {
        let body = send_json(
            self.client
                .get(self.url("locations/closest_by_address.json"))
                .query(&[("address", address), ("no_details", "1")]),
        )
        .await?;

        parse_address_response(&body)
    }

    async fn region_locations(
        &self,
        region: &str,
        city: Option<&str>,
    ) -> Result<Vec<LocationSummary>, ApiError> {
        let mut request = self.client.get(self.url(&format!(
            "region/{}/locations.json",
            urlencoding::encode(region)
        )));
        if let Some(city) = city {
            request = request.query(&[("by_city_id", city)]);
        }

        let body = send_json(request).await?;
        parse_locations(&body)
    }

    async fn regions(&self) -> Result<Vec<Region>, ApiError> {
        let body = send_json(self.client.get(self.url("regions.json"))).await?;
        parse_regions(&body)
    }
}

/// Query-string parameters for a bounds fetch.
fn bounds_params(bounds: &BoundingBox, query: &Query) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("swlat", bounds.sw_lat.to_string()),
        ("swlon", bounds.sw_lon.to_string()),
        ("nelat", bounds.ne_lat.to_string()),
        ("nelon", bounds.ne_lon.to_string()),
    ];

    if let Some(id) = query.machine_id {
        params.push(("by_machine_id", id.to_string()));
    }
    if let Some(id) = query.location_type_id {
        params.push(("by_location_type_id", id.to_string()));
    }
    if let Some(id) = query.operator_id {
        params.push(("by_operator_id", id.to_string()));
    }
    if let Some(n) = query.min_machine_count {
        params.push(("by_at_least_n_machines", n.to_string()));
    }

    params.push(("no_details", "1".to_string()));
    params
}

/// Parses a bounds response.
///
/// `{"zoom_exceeded": true}` is the server-side zoom refusal; an `errors`
/// body without locations means nothing matched.
fn parse_bounds_response(body: &serde_json::Value) -> Result<FetchOutcome, ApiError> {
    if body["zoom_exceeded"].as_bool() == Some(true) {
        return Ok(FetchOutcome::ZoomedOutTooFar);
    }

    parse_locations(body).map(FetchOutcome::Locations)
}

fn parse_locations(body: &serde_json::Value) -> Result<Vec<LocationSummary>, ApiError> {
    match body.get("locations") {
        Some(locations) => {
            serde_json::from_value(locations.clone()).map_err(|e| ApiError::Parse {
                message: format!("Invalid locations array: {e}"),
            })
        }
        None if body.get("errors").is_some() => {
            log::debug!("No locations: {}", body["errors"]);
            Ok(Vec::new())
        }
        None => Err(ApiError::Parse {
            message: "Response has neither `locations` nor `errors`".to_string(),
        }),
    }
}

fn parse_address_response(body: &serde_json::Value) -> Result<Option<Coordinates>, ApiError> {
    match body.get("location") {
        Some(serde_json::Value::Null) | None if body.get("errors").is_some() => Ok(None),
        Some(serde_json::Value::Null) => Ok(None),
        Some(location) => serde_json::from_value(location.clone())
            .map(Some)
            .map_err(|e| ApiError::Parse {
                message: format!("Invalid location coordinates: {e}"),
            }),
        None => Err(ApiError::Parse {
            message: "Response has neither `location` nor `errors`".to_string(),
        }),
    }
}

fn parse_regions(body: &serde_json::Value) -> Result<Vec<Region>, ApiError> {
    let regions = body.get("regions").ok_or_else(|| ApiError::Parse {
        message: "Response has no `regions` array".to_string(),
    })?;

    serde_json::from_value(regions.clone()).map_err(|e| ApiError::Parse {
        message: format!("Invalid regions array: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn portland() -> BoundingBox {
        BoundingBox::new(45.43, -122.84, 45.62, -122.47).unwrap()
    }

    #[test]
    fn bounds_params_include_only_set_filters() {
        let query = Query {
            machine_id: Some(12),
            min_machine_count: Some(5),
            ..Query::default()
        };
        let params = bounds_params(&portland(), &query);
        let keys: Vec<&str> = params.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            [
                "swlat",
                "swlon",
                "nelat",
                "nelon",
                "by_machine_id",
                "by_at_least_n_machines",
                "no_details"
            ]
        );
        assert!(params.contains(&("by_machine_id", "12".to_string())));
        assert!(params.contains(&("swlat", "45.43".to_string())));
    }

    #[test]
    fn parses_locations() {
        let body = serde_json::json!({
            "locations": [
                {"id": 1, "name": "Ground Kontrol", "lat": "45.5236", "lon": "-122.6750", "num_machines": 37},
                {"id": 2, "name": "Quarterworld", "lat": 45.5646, "lon": -122.6616}
            ]
        });
        let FetchOutcome::Locations(locations) = parse_bounds_response(&body).unwrap() else {
            panic!("expected locations");
        };
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].num_machines, 37);
        assert_eq!(locations[1].name, "Quarterworld");
    }

    #[test]
    fn errors_body_is_empty_result() {
        let body = serde_json::json!({"errors": "No locations found within bounding box."});
        assert_eq!(
            parse_bounds_response(&body).unwrap(),
            FetchOutcome::Locations(Vec::new())
        );
    }

    #[test]
    fn server_zoom_refusal_is_distinct_from_empty() {
        let body = serde_json::json!({"zoom_exceeded": true});
        assert_eq!(
            parse_bounds_response(&body).unwrap(),
            FetchOutcome::ZoomedOutTooFar
        );
    }

    #[test]
    fn unexpected_body_is_parse_error() {
        let body = serde_json::json!({"hello": "world"});
        assert!(matches!(
            parse_bounds_response(&body),
            Err(ApiError::Parse { .. })
        ));
    }

    #[test]
    fn parses_address_hit_and_miss() {
        let hit = serde_json::json!({"location": {"id": 9, "lat": "45.5", "lon": "-122.6"}});
        let coords = parse_address_response(&hit).unwrap().unwrap();
        assert!((coords.lat - 45.5).abs() < 1e-9);
        assert!((coords.lon - -122.6).abs() < 1e-9);

        let miss = serde_json::json!({"errors": "Failed to find location"});
        assert_eq!(parse_address_response(&miss).unwrap(), None);
    }

    #[test]
    fn parses_regions() {
        let body = serde_json::json!({
            "regions": [
                {"id": 3, "name": "portland", "full_name": "Portland", "lat": "45.52", "lon": "-122.67"},
                {"id": 4, "name": "seattle", "full_name": "Seattle"}
            ]
        });
        let regions = parse_regions(&body).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].lat, Some(45.52));
        assert_eq!(regions[1].lat, None);
    }

    #[tokio::test]
    async fn oversized_bounds_skip_the_network() {
        // Port 9 (discard) is never listening; reaching the network would fail.
        let api = HttpLocationApi::new(&ApiConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
            max_diagonal_km: 800.0,
        })
        .unwrap();
        let us = BoundingBox::new(24.5, -125.0, 49.4, -66.9).unwrap();

        let outcome = api
            .locations_in_bounds(&us, &Query::default())
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::ZoomedOutTooFar);
    }
}
