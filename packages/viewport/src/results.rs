//! The displayed result set and the zoom-exceeded flag.

use venue_map_api::ApiError;
use venue_map_viewport_models::{FetchOutcome, LocationSummary};

/// Generation token handed out when a fetch starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

/// Owner of the displayed locations.
///
/// Only fetch completion writes here. A completion carrying a ticket older
/// than the newest applied one is discarded.
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    locations: Vec<LocationSummary>,
    zoom_exceeded: bool,
    fetch_failed: bool,
    last_error: Option<String>,
    issued: u64,
    applied: u64,
    fetching: bool,
}

impl ResultStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a ticket for a fetch that is about to start.
    pub const fn begin_fetch(&mut self) -> FetchTicket {
        self.issued += 1;
        self.fetching = true;
        FetchTicket(self.issued)
    }

    /// Applies the outcome of the fetch identified by `ticket`.
    ///
    /// Returns `false` when the completion was stale and dropped.
    pub fn complete(
        &mut self,
        ticket: FetchTicket,
        result: Result<FetchOutcome, ApiError>,
    ) -> bool {
        if ticket.0 == self.issued {
            self.fetching = false;
        }
        if ticket.0 <= self.applied {
            log::debug!(
                "Dropping stale fetch #{} (already applied #{})",
                ticket.0,
                self.applied
            );
            return false;
        }
        self.applied = ticket.0;

        match result {
            Ok(FetchOutcome::Locations(locations)) => {
                log::info!("Fetch #{} returned {} location(s)", ticket.0, locations.len());
                self.locations = locations;
                self.zoom_exceeded = false;
                self.fetch_failed = false;
                self.last_error = None;
            }
            Ok(FetchOutcome::ZoomedOutTooFar) => {
                log::info!("Fetch #{}: zoomed out too far", ticket.0);
                self.locations.clear();
                self.zoom_exceeded = true;
                self.fetch_failed = false;
                self.last_error = None;
            }
            Err(e) => {
                log::error!("Fetch #{} failed: {e}", ticket.0);
                self.fetch_failed = true;
                self.last_error = Some(e.to_string());
            }
        }

        true
    }

    /// Locations currently displayed.
    #[must_use]
    pub fn locations(&self) -> &[LocationSummary] {
        &self.locations
    }

    #[must_use]
    pub const fn zoom_exceeded(&self) -> bool {
        self.zoom_exceeded
    }

    #[must_use]
    pub const fn fetch_failed(&self) -> bool {
        self.fetch_failed
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether the newest issued fetch has not completed yet.
    #[must_use]
    pub const fn is_fetching(&self) -> bool {
        self.fetching
    }

    /// Number of completions applied so far.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.applied
    }
}
