//! Current view storage
//!
//! TigerStyle: One live view, replaced by a single atomic pointer swap.
//!
//! Readers load an `Arc<ClusterView>` without locking and keep it as long as
//! they like; a publish never mutates a view someone else holds.

use crate::view::ClusterView;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Holder of the current `ClusterView`
///
/// The store does not order publications. Callers that reconcile
/// concurrently must serialize themselves (see `ClusterMembership`).
#[derive(Debug)]
pub struct ClusterViewStore {
    current: ArcSwap<ClusterView>,
}

impl ClusterViewStore {
    /// Create a store holding the empty initial view
    pub fn new() -> Self {
        Self::with_view(ClusterView::empty())
    }

    /// Create a store holding the given view
    pub fn with_view(view: ClusterView) -> Self {
        Self {
            current: ArcSwap::from_pointee(view),
        }
    }

    /// The latest fully built view
    pub fn current(&self) -> Arc<ClusterView> {
        self.current.load_full()
    }

    /// Atomically replace the current view
    ///
    /// Returns the published view.
    pub fn publish(&self, view: ClusterView) -> Arc<ClusterView> {
        let view = Arc::new(view);
        self.current.store(Arc::clone(&view));
        view
    }
}

impl Default for ClusterViewStore {
    fn default() -> Self {
        Self::new()
    }
}
