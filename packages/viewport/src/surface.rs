//! The map camera as seen by the synchronizer.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use venue_map_viewport_models::BoundingBox;

/// Errors from the map surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CameraError {
    /// The camera handle is not mounted yet.
    #[error("Camera not ready")]
    NotReady,
}

/// A map view whose camera can be moved and queried.
#[async_trait]
pub trait MapSurface: Send + Sync {
    /// Starts animating the camera so that `bounds` is visible.
    ///
    /// # Errors
    ///
    /// Returns [`CameraError::NotReady`] if the camera is not mounted.
    fn animate_to(&self, bounds: &BoundingBox) -> Result<(), CameraError>;

    /// Reads the bounds currently visible on screen.
    ///
    /// # Errors
    ///
    /// Returns [`CameraError::NotReady`] if the camera is not mounted.
    async fn visible_bounds(&self) -> Result<BoundingBox, CameraError>;

    /// Whether [`Self::settled`] reports the end of camera animations.
    /// Surfaces without one get fixed settle delays instead.
    fn has_settle_signal(&self) -> bool {
        false
    }

    /// Resolves once the camera animation has finished.
    async fn settled(&self) {}
}

/// Number of animations a [`HeadlessSurface`] remembers.
pub const ANIMATION_HISTORY: usize = 64;

#[derive(Debug, Default)]
struct HeadlessState {
    visible: Option<BoundingBox>,
    not_ready_calls: u32,
    animations: VecDeque<BoundingBox>,
}

/// A surface without a screen: the visible bounds are whatever was last
/// animated to (or set by hand to simulate a gesture).
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    state: Mutex<HeadlessState>,
    settle_signal: bool,
}

impl HeadlessSurface {
    #[must_use]
    pub fn new(visible: Option<BoundingBox>) -> Self {
        Self {
            state: Mutex::new(HeadlessState {
                visible,
                ..HeadlessState::default()
            }),
            settle_signal: false,
        }
    }

    /// Fails the first `calls` camera calls with [`CameraError::NotReady`].
    #[must_use]
    pub fn with_mount_delay(self, calls: u32) -> Self {
        self.lock().not_ready_calls = calls;
        self
    }

    /// Reports settling through [`MapSurface::settled`].
    #[must_use]
    pub const fn with_settle_signal(mut self) -> Self {
        self.settle_signal = true;
        self
    }

    /// Moves the camera without an animation request, like a user pan.
    pub fn set_visible(&self, bounds: BoundingBox) {
        self.lock().visible = Some(bounds);
    }

    /// The last [`ANIMATION_HISTORY`] bounds passed to a successful
    /// [`MapSurface::animate_to`], oldest first.
    #[must_use]
    pub fn animations(&self) -> Vec<BoundingBox> {
        self.lock().animations.iter().copied().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MapSurface for HeadlessSurface {
    fn animate_to(&self, bounds: &BoundingBox) -> Result<(), CameraError> {
        let mut state = self.lock();
        if state.not_ready_calls > 0 {
            state.not_ready_calls -= 1;
            return Err(CameraError::NotReady);
        }
        state.visible = Some(*bounds);
        if state.animations.len() == ANIMATION_HISTORY {
            state.animations.pop_front();
        }
        state.animations.push_back(*bounds);
        drop(state);
        Ok(())
    }

    async fn visible_bounds(&self) -> Result<BoundingBox, CameraError> {
        self.lock().visible.ok_or(CameraError::NotReady)
    }

    fn has_settle_signal(&self) -> bool {
        self.settle_signal
    }
}
