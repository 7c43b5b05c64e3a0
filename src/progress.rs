//! Progress-callback trait for per-item pipeline events.
//!
//! An "item" is whatever the running stage iterates over: a source image in
//! folder digitisation, a section in video generation, a script in a
//! multi-document run. Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`].
//!
//! # Example
//!
//! ```rust
//! use notesmith::{PipelineProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, index: usize, total: usize, label: &str) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{label} ({}/{total}) done, {done} so far", index + 1);
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it works through items.
///
/// Implementations must be `Send + Sync`: sections are processed
/// concurrently, so `on_item_*` may be called from several tasks at once.
/// All methods default to no-ops.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once before any item starts.
    ///
    /// # Arguments
    /// * `total` — number of items that will be attempted
    fn on_run_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when work on an item begins.
    ///
    /// # Arguments
    /// * `index` — 0-based item index
    /// * `total` — number of items in the run
    /// * `label` — human-readable name (file name, `section 3`, ...)
    fn on_item_start(&self, index: usize, total: usize, label: &str) {
        let _ = (index, total, label);
    }

    /// Called when an item finished successfully.
    fn on_item_complete(&self, index: usize, total: usize, label: &str) {
        let _ = (index, total, label);
    }

    /// Called when an item failed or was skipped.
    ///
    /// # Arguments
    /// * `error` — human-readable description
    fn on_item_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every item has been attempted.
    fn on_run_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// Default when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        run_total: AtomicUsize,
        run_success: AtomicUsize,
    }

    impl PipelineProgressCallback for TrackingCallback {
        fn on_run_start(&self, total: usize) {
            self.run_total.store(total, Ordering::SeqCst);
        }

        fn on_item_start(&self, _index: usize, _total: usize, _label: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_complete(&self, _index: usize, _total: usize, _label: &str) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_error(&self, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_run_complete(&self, _total: usize, success_count: usize) {
            self.run_success.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(5);
        cb.on_item_start(0, 5, "section 0");
        cb.on_item_complete(0, 5, "section 0");
        cb.on_item_error(1, 5, "boom");
        cb.on_run_complete(5, 4);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_run_start(3);
        tracker.on_item_start(0, 3, "a.png");
        tracker.on_item_complete(0, 3, "a.png");
        tracker.on_item_start(1, 3, "b.png");
        tracker.on_item_error(1, 3, "unparsable JSON");
        tracker.on_run_complete(3, 1);

        assert_eq!(tracker.run_total.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.run_success.load(Ordering::SeqCst), 1);
    }
}
