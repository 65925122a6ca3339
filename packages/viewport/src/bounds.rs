//! Visible-bounds bookkeeping and pending camera requests.
//!
//! Supersede rules for queued requests:
//!
//! - a new request of either kind removes every queued *normal* request;
//! - forced requests are never removed, and run in arrival order;
//! - a normal request that is already in flight counts as superseded as
//!   soon as anything else is queued.

use std::collections::VecDeque;

use venue_map_viewport_models::{BoundingBox, ViewportRequest};

/// Owner of the active [`BoundingBox`] and the camera request queue.
#[derive(Debug, Clone, Default)]
pub struct BoundsTracker {
    active: Option<BoundingBox>,
    pending: VecDeque<ViewportRequest>,
    in_flight: Option<ViewportRequest>,
    stale: bool,
}

impl BoundsTracker {
    /// Creates a tracker, optionally seeded with already-known bounds.
    #[must_use]
    pub const fn new(active: Option<BoundingBox>) -> Self {
        Self {
            active,
            pending: VecDeque::new(),
            in_flight: None,
            stale: false,
        }
    }

    /// Bounds from the most recent camera read-back.
    #[must_use]
    pub const fn active(&self) -> Option<BoundingBox> {
        self.active
    }

    /// Stores bounds read back from the camera and retires the in-flight
    /// request they answer.
    pub fn record_visible_bounds(&mut self, bounds: BoundingBox) {
        if let Some(request) = self.in_flight.take() {
            log::debug!(
                "Camera settled at {bounds} (requested {})",
                request.bounds()
            );
        }
        self.active = Some(bounds);
    }

    /// Queues a camera move to `bounds`.
    pub fn request_bounds_update(&mut self, bounds: BoundingBox, force: bool) {
        let request = if force {
            ViewportRequest::ForceTriggerBoundsUpdate { bounds }
        } else {
            ViewportRequest::TriggerBoundsUpdate {
                bounds,
                immediate: false,
            }
        };
        self.push(request);
    }

    /// Queues an immediate camera move to the user's current location and
    /// hides the refresh affordance.
    pub fn request_current_location(&mut self, bounds: BoundingBox) {
        self.stale = false;
        self.push(ViewportRequest::TriggerBoundsUpdate {
            bounds,
            immediate: true,
        });
    }

    fn push(&mut self, request: ViewportRequest) {
        let before = self.pending.len();
        self.pending.retain(ViewportRequest::is_forced);
        let dropped = before - self.pending.len();
        if dropped > 0 {
            log::debug!("{dropped} queued viewport request(s) superseded");
        }
        self.pending.push_back(request);
    }

    /// Takes the next queued request and marks it in flight.
    pub fn begin_next_request(&mut self) -> Option<ViewportRequest> {
        let next = self.pending.pop_front()?;
        self.in_flight = Some(next);
        Some(next)
    }

    /// The request currently being applied, if any.
    #[must_use]
    pub const fn in_flight(&self) -> Option<&ViewportRequest> {
        self.in_flight.as_ref()
    }

    /// Whether the in-flight request is normal and something newer is
    /// queued behind it.
    #[must_use]
    pub fn in_flight_superseded(&self) -> bool {
        self.in_flight.is_some_and(|request| !request.is_forced()) && !self.pending.is_empty()
    }

    /// Drops the in-flight request without recording any bounds.
    pub const fn abandon_in_flight(&mut self) -> Option<ViewportRequest> {
        self.in_flight.take()
    }

    /// Whether any request is queued (not counting the in-flight one).
    #[must_use]
    pub fn has_pending_request(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Flags that the user moved the map by hand, so displayed results may
    /// no longer match what is on screen.
    pub const fn mark_gesture_in_progress(&mut self) {
        self.stale = true;
    }

    /// Whether a gesture moved the map since the last explicit refresh.
    #[must_use]
    pub const fn results_stale(&self) -> bool {
        self.stale
    }

    /// Hides the refresh affordance.
    pub const fn clear_stale(&mut self) {
        self.stale = false;
    }
}
