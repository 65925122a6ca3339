//! The viewport synchronizer actor.
//!
//! One task owns the [`BoundsTracker`], [`QueryState`] and [`ResultStore`]
//! and reacts to [`SyncHandle`] calls in arrival order. Every wait (the
//! pre-animate delay, camera retries, settling, bounds read-back and the
//! network fetch) keeps draining the event channel, so a request that
//! arrives mid-wait is queued and seen by the next supersede check.
//!
//! State transitions:
//!
//! ```text
//! Idle -> AwaitingCameraSettle   a viewport request is pending
//! AwaitingCameraSettle -> Idle   request superseded or camera never mounted
//! AwaitingCameraSettle -> Fetching  bounds read back, nothing newer pending
//! Fetching -> Idle               result set replaced
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use venue_map_api::{ApiError, LocationApi};
use venue_map_viewport_models::{
    BoundingBox, Coordinates, FetchOutcome, LocationSummary, Query, QueryFilter, Region,
    ViewportRequest,
};

use crate::SyncError;
use crate::bounds::BoundsTracker;
use crate::config::SyncConfig;
use crate::deep_link::{DeepLinkResolution, DeepLinkResolver};
use crate::navigation::Navigator;
use crate::query_state::QueryState;
use crate::results::ResultStore;
use crate::surface::{CameraError, MapSurface};

/// Synchronizer state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncState {
    /// Nothing to do.
    #[default]
    Idle,
    /// Moving the camera and waiting for it to settle.
    AwaitingCameraSettle,
    /// Waiting for the location service.
    Fetching,
}

/// Everything a renderer needs, published after every change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ViewportSnapshot {
    pub state: SyncState,
    /// Bounds from the latest camera read-back.
    pub bounds: Option<BoundingBox>,
    pub query: Query,
    pub locations: Vec<LocationSummary>,
    /// The last fetch was refused because the area is too large.
    pub zoom_exceeded: bool,
    /// The last fetch failed; `locations` still holds the previous results.
    pub fetch_failed: bool,
    pub last_error: Option<String>,
    /// The user moved the map since the last fetch; offer a refresh.
    pub results_stale: bool,
    pub pending_request: bool,
    pub fetching: bool,
    /// Number of fetch completions applied.
    pub generation: u64,
    pub last_deep_link: Option<DeepLinkResolution>,
}

#[derive(Debug)]
enum SyncEvent {
    RequestBounds { bounds: BoundingBox, force: bool },
    CurrentLocation(Coordinates),
    Gesture,
    RefreshCurrentArea,
    SetFreeText(String),
    SetFilter(QueryFilter),
    ClearFilters { reset_bounds_too: bool },
    SetFavorites(Vec<u64>),
    SetRegions(Vec<Region>),
    OpenDeepLink(String),
}

/// Fetch work that does not start with a camera move.
#[derive(Debug, Clone, PartialEq)]
enum PendingFetch {
    /// Fetch the active bounds with the current query.
    Requery,
    /// Read the visible bounds back from the surface, then fetch them.
    RefreshArea,
    /// Re-query after the user panned: read the visible bounds back, clear
    /// the stale flag, then fetch. With `rebase_pre_filter`, the read-back
    /// bounds also replace the pre-filter bounds.
    RequeryVisible { rebase_pre_filter: bool },
    /// Fetch a whole region without a bounds constraint.
    Region(Region),
}

/// Cloneable front end of a running synchronizer.
///
/// Every method only enqueues an event and returns immediately. The
/// synchronizer stops once every handle is dropped and outstanding work
/// has finished.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    events: mpsc::UnboundedSender<SyncEvent>,
    snapshots: watch::Receiver<ViewportSnapshot>,
}

impl SyncHandle {
    fn send(&self, event: SyncEvent) -> Result<(), SyncError> {
        self.events.send(event).map_err(|_| SyncError::Stopped)
    }

    /// Asks the camera to show `bounds`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Stopped`] if the synchronizer task has exited.
    pub fn request_bounds_update(&self, bounds: BoundingBox, force: bool) -> Result<(), SyncError> {
        self.send(SyncEvent::RequestBounds { bounds, force })
    }

    /// Moves the camera, without the pre-animate delay, to a default-sized
    /// box around the user's position.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Stopped`] if the synchronizer task has exited.
    pub fn current_location(&self, point: Coordinates) -> Result<(), SyncError> {
        self.send(SyncEvent::CurrentLocation(point))
    }

    /// Reports a user pan or zoom. Never fetches.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Stopped`] if the synchronizer task has exited.
    pub fn mark_gesture_in_progress(&self) -> Result<(), SyncError> {
        self.send(SyncEvent::Gesture)
    }

    /// Clears the search text and fetches whatever is visible now.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Stopped`] if the synchronizer task has exited.
    pub fn refresh_current_area(&self) -> Result<(), SyncError> {
        self.send(SyncEvent::RefreshCurrentArea)
    }

    /// # Errors
    ///
    /// Returns [`SyncError::Stopped`] if the synchronizer task has exited.
    pub fn set_free_text(&self, text: impl Into<String>) -> Result<(), SyncError> {
        self.send(SyncEvent::SetFreeText(text.into()))
    }

    /// Applies a filter and re-queries the active bounds.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Stopped`] if the synchronizer task has exited.
    pub fn set_filter(&self, filter: QueryFilter) -> Result<(), SyncError> {
        self.send(SyncEvent::SetFilter(filter))
    }

    /// Clears all filters. With `reset_bounds_too`, the camera returns to
    /// where it was before the first filter.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Stopped`] if the synchronizer task has exited.
    pub fn clear_filters(&self, reset_bounds_too: bool) -> Result<(), SyncError> {
        self.send(SyncEvent::ClearFilters { reset_bounds_too })
    }

    /// # Errors
    ///
    /// Returns [`SyncError::Stopped`] if the synchronizer task has exited.
    pub fn set_favorites(&self, ids: impl IntoIterator<Item = u64>) -> Result<(), SyncError> {
        self.send(SyncEvent::SetFavorites(ids.into_iter().collect()))
    }

    /// Replaces the region catalog used by deep links.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Stopped`] if the synchronizer task has exited.
    pub fn set_regions(&self, regions: Vec<Region>) -> Result<(), SyncError> {
        self.send(SyncEvent::SetRegions(regions))
    }

    /// Resolves `url` in the background and applies the result.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Stopped`] if the synchronizer task has exited.
    pub fn open_deep_link(&self, url: impl Into<String>) -> Result<(), SyncError> {
        self.send(SyncEvent::OpenDeepLink(url.into()))
    }

    /// The most recently published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ViewportSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver that is notified on every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ViewportSnapshot> {
        self.snapshots.clone()
    }
}

/// The actor behind a [`SyncHandle`].
pub struct ViewportSynchronizer {
    config: SyncConfig,
    api: Arc<dyn LocationApi>,
    surface: Arc<dyn MapSurface>,
    navigator: Arc<dyn Navigator>,
    bounds: BoundsTracker,
    query: QueryState,
    results: ResultStore,
    regions: Arc<[Region]>,
    pending_fetches: VecDeque<PendingFetch>,
    state: SyncState,
    last_deep_link: Option<DeepLinkResolution>,
    events: mpsc::UnboundedReceiver<SyncEvent>,
    closed: bool,
    links: JoinSet<DeepLinkResolution>,
    snapshots: watch::Sender<ViewportSnapshot>,
}

impl ViewportSynchronizer {
    /// Starts the synchronizer on the current tokio runtime.
    ///
    /// `initial_bounds` seeds the active bounds when the map is already
    /// showing something.
    #[must_use]
    pub fn spawn(
        config: SyncConfig,
        api: Arc<dyn LocationApi>,
        surface: Arc<dyn MapSurface>,
        navigator: Arc<dyn Navigator>,
        initial_bounds: Option<BoundingBox>,
    ) -> (SyncHandle, JoinHandle<()>) {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (snapshots, snapshot_rx) = watch::channel(ViewportSnapshot {
            bounds: initial_bounds,
            ..ViewportSnapshot::default()
        });

        let actor = Self {
            config,
            api,
            surface,
            navigator,
            bounds: BoundsTracker::new(initial_bounds),
            query: QueryState::new(),
            results: ResultStore::new(),
            regions: Arc::from(Vec::new()),
            pending_fetches: VecDeque::new(),
            state: SyncState::Idle,
            last_deep_link: None,
            events,
            closed: false,
            links: JoinSet::new(),
            snapshots,
        };

        let handle = SyncHandle {
            events: events_tx,
            snapshots: snapshot_rx,
        };

        (handle, tokio::spawn(actor.run()))
    }

    async fn run(mut self) {
        log::debug!("Viewport synchronizer started");

        loop {
            self.drive().await;

            if self.closed && self.links.is_empty() {
                break;
            }

            tokio::select! {
                event = self.events.recv(), if !self.closed => match event {
                    Some(event) => self.apply(event),
                    None => self.closed = true,
                },
                Some(joined) = self.links.join_next(), if !self.links.is_empty() => {
                    self.link_finished(joined);
                }
            }
        }

        log::debug!("Viewport synchronizer stopped");
    }

    /// Runs queued work until nothing is left.
    async fn drive(&mut self) {
        loop {
            if let Some(request) = self.bounds.begin_next_request() {
                self.process_request(request).await;
            } else if let Some(fetch) = self.pending_fetches.pop_front() {
                self.process_fetch(fetch).await;
            } else {
                break;
            }
        }
        self.set_state(SyncState::Idle);
    }

    fn apply(&mut self, event: SyncEvent) {
        log::trace!("Applying {event:?}");

        match event {
            SyncEvent::RequestBounds { bounds, force } => {
                self.bounds.request_bounds_update(bounds, force);
            }
            SyncEvent::CurrentLocation(point) => {
                match BoundingBox::around(
                    point,
                    self.config.default_lat_span,
                    self.config.default_lon_span,
                ) {
                    Ok(bounds) => self.bounds.request_current_location(bounds),
                    Err(e) => log::warn!("Ignoring current location: {e}"),
                }
            }
            SyncEvent::Gesture => self.bounds.mark_gesture_in_progress(),
            SyncEvent::RefreshCurrentArea => {
                self.bounds.clear_stale();
                self.query.clear_free_text();
                self.queue_fetch(PendingFetch::RefreshArea);
            }
            SyncEvent::SetFreeText(text) => self.query.set_free_text(text),
            SyncEvent::SetFilter(filter) => {
                let first_filter = !self.query.filter_applied();
                self.query.set_filter(filter, self.bounds.active());
                self.queue_requery(first_filter);
            }
            SyncEvent::ClearFilters { reset_bounds_too } => {
                match self.query.clear_filters(reset_bounds_too) {
                    Some(bounds) => self.bounds.request_bounds_update(bounds, true),
                    None => self.queue_requery(false),
                }
            }
            SyncEvent::SetFavorites(ids) => {
                self.query.set_favorites(ids);
                if self.query.query().favorites_only {
                    self.queue_requery(false);
                }
            }
            SyncEvent::SetRegions(regions) => {
                log::debug!("Region catalog updated ({} regions)", regions.len());
                self.regions = regions.into();
            }
            SyncEvent::OpenDeepLink(url) => self.spawn_deep_link(url),
        }

        self.publish();
    }

    /// Active bounds are out of date after a gesture, so the re-query reads
    /// the camera back first.
    fn queue_requery(&mut self, rebase_pre_filter: bool) {
        if self.bounds.results_stale() {
            self.queue_fetch(PendingFetch::RequeryVisible { rebase_pre_filter });
        } else {
            self.queue_fetch(PendingFetch::Requery);
        }
    }

    fn queue_fetch(&mut self, fetch: PendingFetch) {
        if !self.pending_fetches.contains(&fetch) {
            self.pending_fetches.push_back(fetch);
        }
    }

    async fn process_request(&mut self, request: ViewportRequest) {
        self.set_state(SyncState::AwaitingCameraSettle);
        log::debug!("Processing {request:?}");

        if !request.is_immediate() {
            self.wait_on(tokio::time::sleep(self.config.pre_animate_delay()))
                .await;
            if self.bounds.in_flight_superseded() {
                log::debug!("Request for {} superseded", request.bounds());
                self.bounds.abandon_in_flight();
                return;
            }
        }

        if let Err(e) = self.settle_camera(request).await {
            if matches!(e, SyncError::CameraNotReady { .. }) {
                log::warn!("Abandoning request for {}: {e}", request.bounds());
            } else {
                log::debug!("Abandoning request for {}: {e}", request.bounds());
            }
            self.bounds.abandon_in_flight();
            return;
        }

        self.fetch_bounds().await;
    }

    /// Animates to the request's bounds, waits for the camera to come to
    /// rest and records what ended up visible.
    async fn settle_camera(&mut self, request: ViewportRequest) -> Result<(), SyncError> {
        let retried = self.animate_with_retry(request.bounds()).await?;

        if self.surface.has_settle_signal() {
            let surface = Arc::clone(&self.surface);
            let timeout = self.config.settle_timeout();
            let settled = self
                .wait_on(async move { tokio::time::timeout(timeout, surface.settled()).await })
                .await;
            if settled.is_err() {
                log::warn!("Camera did not report settling within {timeout:?}");
            }
        } else {
            self.wait_on(tokio::time::sleep(self.config.settle_delay(retried)))
                .await;
        }

        let visible = self.read_visible_bounds().await?;
        self.bounds.record_visible_bounds(visible);
        self.publish();
        Ok(())
    }

    /// Returns whether any retry was needed.
    async fn animate_with_retry(&mut self, bounds: BoundingBox) -> Result<bool, SyncError> {
        let max_attempts = self.config.max_attempts();

        for attempt in 1..=max_attempts {
            match self.surface.animate_to(&bounds) {
                Ok(()) => return Ok(attempt > 1),
                Err(CameraError::NotReady) => {
                    log::debug!("Camera not ready (attempt {attempt}/{max_attempts})");
                }
            }
            if attempt < max_attempts {
                self.wait_on(tokio::time::sleep(self.config.camera_retry_delay()))
                    .await;
                if self.bounds.in_flight_superseded() {
                    return Err(SyncError::Superseded);
                }
            }
        }

        Err(SyncError::CameraNotReady {
            attempts: max_attempts,
        })
    }

    async fn read_visible_bounds(&mut self) -> Result<BoundingBox, SyncError> {
        let max_attempts = self.config.max_attempts();

        for attempt in 1..=max_attempts {
            let surface = Arc::clone(&self.surface);
            match self
                .wait_on(async move { surface.visible_bounds().await })
                .await
            {
                Ok(bounds) => return Ok(bounds),
                Err(CameraError::NotReady) => {
                    log::debug!("Visible bounds unavailable (attempt {attempt}/{max_attempts})");
                }
            }
            if attempt < max_attempts {
                self.wait_on(tokio::time::sleep(self.config.camera_retry_delay()))
                    .await;
            }
        }

        Err(SyncError::CameraNotReady {
            attempts: max_attempts,
        })
    }

    async fn process_fetch(&mut self, fetch: PendingFetch) {
        match fetch {
            PendingFetch::Requery => self.fetch_bounds().await,
            PendingFetch::RefreshArea => match self.read_visible_bounds().await {
                Ok(visible) => {
                    self.bounds.record_visible_bounds(visible);
                    self.fetch_bounds().await;
                }
                Err(e) => log::warn!("Cannot refresh the current area: {e}"),
            },
            PendingFetch::RequeryVisible { rebase_pre_filter } => {
                match self.read_visible_bounds().await {
                    Ok(visible) => {
                        self.bounds.record_visible_bounds(visible);
                        self.bounds.clear_stale();
                        if rebase_pre_filter {
                            self.query.rebase_pre_filter_bounds(visible);
                        }
                        self.publish();
                        self.fetch_bounds().await;
                    }
                    Err(e) => {
                        log::warn!("Cannot read visible bounds, re-querying last known: {e}");
                        self.fetch_bounds().await;
                    }
                }
            }
            PendingFetch::Region(region) => self.fetch_region(region).await,
        }
    }

    /// Fetches the active bounds with the current query, unless a newer
    /// viewport request is waiting.
    async fn fetch_bounds(&mut self) {
        if self.bounds.has_pending_request() {
            log::debug!("Newer viewport request pending, skipping fetch");
            return;
        }
        let Some(bounds) = self.bounds.active() else {
            log::debug!("No visible bounds yet, nothing to fetch");
            return;
        };

        // This fetch answers any queued re-query or refresh.
        self.pending_fetches
            .retain(|fetch| matches!(fetch, PendingFetch::Region(_)));

        let query = self.query.snapshot();
        let api = Arc::clone(&self.api);
        log::debug!("Fetching locations in {bounds}");
        self.run_fetch(async move { api.locations_in_bounds(&bounds, &query).await })
            .await;
    }

    async fn fetch_region(&mut self, region: Region) {
        let api = Arc::clone(&self.api);
        log::debug!("Loading region {}", region.name);
        self.run_fetch(async move {
            api.region_locations(&region.name, None)
                .await
                .map(FetchOutcome::Locations)
        })
        .await;
    }

    async fn run_fetch<F>(&mut self, fetch: F)
    where
        F: Future<Output = Result<FetchOutcome, ApiError>> + Send,
    {
        self.set_state(SyncState::Fetching);
        let ticket = self.results.begin_fetch();
        self.publish();

        let result = self.wait_on(fetch).await.map(|outcome| match outcome {
            FetchOutcome::Locations(locations) => {
                FetchOutcome::Locations(self.query.retain_matching(locations))
            }
            FetchOutcome::ZoomedOutTooFar => FetchOutcome::ZoomedOutTooFar,
        });

        self.results.complete(ticket, result);
        self.publish();
    }

    /// Awaits `fut` while applying incoming events.
    async fn wait_on<F: Future>(&mut self, fut: F) -> F::Output {
        tokio::pin!(fut);

        loop {
            tokio::select! {
                biased;
                output = &mut fut => return output,
                event = self.events.recv(), if !self.closed => match event {
                    Some(event) => self.apply(event),
                    None => self.closed = true,
                },
                Some(joined) = self.links.join_next(), if !self.links.is_empty() => {
                    self.link_finished(joined);
                }
            }
        }
    }

    fn spawn_deep_link(&mut self, url: String) {
        let resolver = DeepLinkResolver::new(
            Arc::clone(&self.api),
            Arc::clone(&self.regions),
            &self.config,
        );
        self.links.spawn(async move { resolver.resolve(&url).await });
    }

    fn link_finished(&mut self, joined: Result<DeepLinkResolution, JoinError>) {
        match joined {
            Ok(resolution) => self.apply_deep_link(resolution),
            Err(e) => log::error!("Deep link resolution failed: {e}"),
        }
    }

    fn apply_deep_link(&mut self, resolution: DeepLinkResolution) {
        if let Some(issue) = &resolution.issue {
            log::warn!("Deep link: {issue}");
        }
        if let Some(bounds) = resolution.bounds_request {
            self.bounds.request_bounds_update(bounds, true);
        }
        if let Some(region) = &resolution.region_load {
            self.queue_fetch(PendingFetch::Region(region.clone()));
        }

        self.navigator.navigate(resolution.destination);
        self.last_deep_link = Some(resolution);
        self.publish();
    }

    fn set_state(&mut self, state: SyncState) {
        if self.state != state {
            log::debug!("{} -> {state}", self.state);
            self.state = state;
            self.publish();
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(ViewportSnapshot {
            state: self.state,
            bounds: self.bounds.active(),
            query: self.query.snapshot(),
            locations: self.results.locations().to_vec(),
            zoom_exceeded: self.results.zoom_exceeded(),
            fetch_failed: self.results.fetch_failed(),
            last_error: self.results.last_error().map(str::to_string),
            results_stale: self.bounds.results_stale(),
            pending_request: self.bounds.has_pending_request(),
            fetching: self.results.is_fetching(),
            generation: self.results.generation(),
            last_deep_link: self.last_deep_link.clone(),
        });
    }
}
