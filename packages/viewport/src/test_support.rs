//! In-memory collaborators for unit tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use venue_map_api::{ApiError, LocationApi};
use venue_map_viewport_models::{
    BoundingBox, Coordinates, Destination, FetchOutcome, LocationSummary, Query, Region,
};

use crate::navigation::Navigator;
use crate::surface::{CameraError, HeadlessSurface, MapSurface};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn location_at(id: u64, lat: f64, lon: f64) -> LocationSummary {
    LocationSummary {
        id,
        name: format!("Location {id}"),
        lat,
        lon,
        street: None,
        city: None,
        state: None,
        zip: None,
        num_machines: 3,
        location_type_id: None,
        operator_id: None,
    }
}

pub fn region(id: u64, name: &str) -> Region {
    Region {
        id,
        name: name.to_string(),
        full_name: name.to_string(),
        lat: None,
        lon: None,
    }
}

/// A bounds fetch as seen by [`FakeApi`].
#[derive(Debug, Clone)]
pub struct BoundsCall {
    pub bounds: BoundingBox,
    pub query: Query,
    pub at: Instant,
}

/// Scripted [`LocationApi`]. Bounds fetches answer with the queued
/// responses in order, then with an empty list.
#[derive(Default)]
pub struct FakeApi {
    responses: Mutex<VecDeque<Result<FetchOutcome, ApiError>>>,
    bounds_calls: Mutex<Vec<BoundsCall>>,
    addresses: BTreeMap<String, Coordinates>,
    region_locations: BTreeMap<(String, Option<String>), Vec<LocationSummary>>,
    region_calls: Mutex<Vec<(String, Option<String>)>>,
    delay: Duration,
    geocoder_panics: bool,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, response: Result<FetchOutcome, ApiError>) -> Self {
        lock(&self.responses).push_back(response);
        self
    }

    pub fn with_address(mut self, address: &str, point: Coordinates) -> Self {
        self.addresses.insert(address.to_string(), point);
        self
    }

    pub fn with_region_locations(
        mut self,
        region: &str,
        city: Option<&str>,
        locations: Vec<LocationSummary>,
    ) -> Self {
        self.region_locations
            .insert((region.to_string(), city.map(str::to_string)), locations);
        self
    }

    /// Makes every call take `delay` to answer.
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes address lookups panic.
    pub const fn with_panicking_geocoder(mut self) -> Self {
        self.geocoder_panics = true;
        self
    }

    pub fn bounds_calls(&self) -> Vec<BoundsCall> {
        lock(&self.bounds_calls).clone()
    }

    pub fn fetched_bounds(&self) -> Vec<BoundingBox> {
        lock(&self.bounds_calls).iter().map(|c| c.bounds).collect()
    }

    pub fn region_calls(&self) -> Vec<(String, Option<String>)> {
        lock(&self.region_calls).clone()
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl LocationApi for FakeApi {
    async fn locations_in_bounds(
        &self,
        bounds: &BoundingBox,
        query: &Query,
    ) -> Result<FetchOutcome, ApiError> {
        lock(&self.bounds_calls).push(BoundsCall {
            bounds: *bounds,
            query: query.clone(),
            at: Instant::now(),
        });
        self.pause().await;
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| Ok(FetchOutcome::Locations(Vec::new())))
    }

    async fn closest_by_address(&self, address: &str) -> Result<Option<Coordinates>, ApiError> {
        self.pause().await;
        assert!(!self.geocoder_panics, "geocoder crashed on {address}");
        Ok(self.addresses.get(address).copied())
    }

    async fn region_locations(
        &self,
        region: &str,
        city: Option<&str>,
    ) -> Result<Vec<LocationSummary>, ApiError> {
        let key = (region.to_string(), city.map(str::to_string));
        lock(&self.region_calls).push(key.clone());
        self.pause().await;
        Ok(self.region_locations.get(&key).cloned().unwrap_or_default())
    }

    async fn regions(&self) -> Result<Vec<Region>, ApiError> {
        Ok(Vec::new())
    }
}

/// [`Navigator`] that records every destination.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    destinations: Mutex<Vec<Destination>>,
}

impl RecordingNavigator {
    pub fn destinations(&self) -> Vec<Destination> {
        lock(&self.destinations).clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, destination: Destination) {
        lock(&self.destinations).push(destination);
    }
}

/// A [`HeadlessSurface`] that claims a settle signal but never fires it.
#[derive(Debug)]
pub struct SilentSettleSurface(pub HeadlessSurface);

#[async_trait]
impl MapSurface for SilentSettleSurface {
    fn animate_to(&self, bounds: &BoundingBox) -> Result<(), CameraError> {
        self.0.animate_to(bounds)
    }

    async fn visible_bounds(&self) -> Result<BoundingBox, CameraError> {
        self.0.visible_bounds().await
    }

    fn has_settle_signal(&self) -> bool {
        true
    }

    async fn settled(&self) {
        std::future::pending::<()>().await;
    }
}
