//! Filter criteria and free-text search.

use std::collections::BTreeSet;

use venue_map_viewport_models::{BoundingBox, LocationSummary, Query, QueryFilter};

/// Owner of the active [`Query`].
///
/// Also remembers the bounds that were visible when the first filter was
/// applied, so clearing filters can put the map back where it was.
#[derive(Debug, Clone, Default)]
pub struct QueryState {
    query: Query,
    pre_filter_bounds: Option<BoundingBox>,
    favorites: BTreeSet<u64>,
}

impl QueryState {
    /// Creates an empty query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The active query.
    #[must_use]
    pub const fn query(&self) -> &Query {
        &self.query
    }

    /// Owned copy of the active query, for handing to a fetch.
    #[must_use]
    pub fn snapshot(&self) -> Query {
        self.query.clone()
    }

    /// Whether any filter is active.
    #[must_use]
    pub const fn filter_applied(&self) -> bool {
        self.query.filter_applied()
    }

    /// Replaces the free-text search string.
    pub fn set_free_text(&mut self, text: impl Into<String>) {
        self.query.free_text = text.into();
    }

    /// Clears the free-text search string.
    pub fn clear_free_text(&mut self) {
        self.query.free_text.clear();
    }

    /// Applies `filter`. When no filter was active before, `current_bounds`
    /// is remembered as the pre-filter bounds.
    pub fn set_filter(&mut self, filter: QueryFilter, current_bounds: Option<BoundingBox>) {
        if !self.query.filter_applied() {
            self.pre_filter_bounds = current_bounds;
        }
        log::debug!("Filter {filter:?} applied");
        self.query.apply(filter);
    }

    /// Replaces the remembered pre-filter bounds with `bounds`, as long as a
    /// filter is still active.
    pub fn rebase_pre_filter_bounds(&mut self, bounds: BoundingBox) {
        if self.query.filter_applied() {
            self.pre_filter_bounds = Some(bounds);
        }
    }

    /// Resets every optional filter and favorites-only. The free-text search
    /// is kept.
    ///
    /// Returns the pre-filter bounds when `reset_bounds_too` is set and such
    /// bounds were recorded; the caller turns them into a forced camera move.
    pub fn clear_filters(&mut self, reset_bounds_too: bool) -> Option<BoundingBox> {
        let free_text = std::mem::take(&mut self.query.free_text);
        self.query = Query {
            free_text,
            ..Query::default()
        };

        let bounds = self.pre_filter_bounds.take();
        if reset_bounds_too { bounds } else { None }
    }

    /// Replaces the set of favorite location ids.
    pub fn set_favorites(&mut self, ids: impl IntoIterator<Item = u64>) {
        self.favorites = ids.into_iter().collect();
    }

    /// Whether `id` is a favorite.
    #[must_use]
    pub fn is_favorite(&self, id: u64) -> bool {
        self.favorites.contains(&id)
    }

    /// Drops locations excluded by client-side criteria (favorites-only).
    #[must_use]
    pub fn retain_matching(&self, mut locations: Vec<LocationSummary>) -> Vec<LocationSummary> {
        if self.query.favorites_only {
            locations.retain(|location| self.is_favorite(location.id));
        }
        locations
    }
}
