//! Progress state, checkpoint constants, and the observer callback trait.
//!
//! Progress is a single percentage in `[0, 100]` plus a status message. Each
//! backend moves it through fixed checkpoints for its phases (see
//! [`checkpoints`]); fine-grained signals (runtime progress, upload bytes)
//! are scaled into the band between two checkpoints.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to observe
//! every change.
//!
//! # Example
//!
//! ```rust
//! use tomp3::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicU8, Ordering}};
//!
//! struct LastPercent(AtomicU8);
//!
//! impl ConversionProgressCallback for LastPercent {
//!     fn on_progress(&self, percent: u8, status: &str) {
//!         self.0.store(percent, Ordering::SeqCst);
//!         eprintln!("{percent:>3}% {status}");
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(LastPercent(AtomicU8::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};

/// Fixed progress checkpoints, in percent.
pub mod checkpoints {
    /// Local: runtime acquisition started.
    pub const RUNTIME_LOADING: u8 = 5;
    /// Local: runtime acquired and cached for the session.
    pub const RUNTIME_READY: u8 = 10;
    /// Local: input written to the runtime's scratch dir; runtime progress
    /// is scaled from here up to [`ENCODE_END`].
    pub const INPUT_STAGED: u8 = 15;
    /// Local: upper bound of scaled runtime progress; also "reading output".
    pub const ENCODE_END: u8 = 95;

    /// Remote: upload byte progress is scaled into `[0, UPLOAD_END]`.
    pub const UPLOAD_END: u8 = 60;
    /// Remote: request body fully sent.
    pub const UPLOAD_DONE: u8 = 65;
    /// Remote: response headers received; the server is (or was) converting.
    pub const HEADERS_RECEIVED: u8 = 85;
    /// Remote: response body is streaming in.
    pub const RECEIVING: u8 = 95;

    /// Result handed to delivery.
    pub const DELIVERING: u8 = 98;
    pub const DONE: u8 = 100;
}

/// Receives progress and lifecycle events from a [`crate::ConverterWidget`].
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once when a conversion attempt starts.
    fn on_conversion_start(&self, file_name: &str, size: u64) {
        let _ = (file_name, size);
    }

    /// Called on every progress or status change.
    ///
    /// # Arguments
    /// * `percent` — always within `[0, 100]`
    /// * `status`  — human-readable status line
    fn on_progress(&self, percent: u8, status: &str) {
        let _ = (percent, status);
    }

    /// Called after the result has been saved.
    fn on_conversion_complete(&self, filename: &str, bytes: usize) {
        let _ = (filename, bytes);
    }

    /// Called when the attempt fails; `message` is the status line shown.
    fn on_conversion_error(&self, message: &str) {
        let _ = message;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

/// Snapshot of the progress bar and status line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressState {
    pub percent: u8,
    pub status: String,
}

/// Clamp an arbitrary value into a displayable percentage.
///
/// NaN maps to 0.
pub fn clamp_percent(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, 100.0).round() as u8
}

/// Scale a `[0, 1]` fraction into the band `[lo, hi]`.
///
/// Out-of-range fractions are clamped first, so the result never leaves
/// the band.
pub fn scale_into(fraction: f64, lo: u8, hi: u8) -> u8 {
    let f = if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    };
    let span = f64::from(hi.saturating_sub(lo));
    clamp_percent(f64::from(lo) + f * span)
}

/// Map upload byte progress into `[0, UPLOAD_END]`.
///
/// Upload percent is rounded first, then scaled by 0.6, matching what a user
/// sees next to the "Uploading… N%" status line.
pub fn upload_percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return checkpoints::UPLOAD_END;
    }
    let pct = (sent as f64 / total as f64 * 100.0).round();
    scale_into(pct / 100.0, 0, checkpoints::UPLOAD_END)
}

/// Shared progress state for one widget.
///
/// Backends report through this; the widget reads [`snapshot`](Self::snapshot)
/// for its status line. During a conversion [`advance`](Self::advance) never
/// moves the percentage backwards; only [`reset`](Self::reset) does.
pub struct ProgressTracker {
    state: Mutex<ProgressState>,
    observer: Option<ProgressCallback>,
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("state", &self.snapshot())
            .field("observer", &self.observer.as_ref().map(|_| "<dyn callback>"))
            .finish()
    }
}

impl ProgressTracker {
    pub fn new(observer: Option<ProgressCallback>) -> Self {
        Self {
            state: Mutex::new(ProgressState::default()),
            observer,
        }
    }

    pub fn snapshot(&self) -> ProgressState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn percent(&self) -> u8 {
        self.snapshot().percent
    }

    pub fn status(&self) -> String {
        self.snapshot().status
    }

    /// Move forward to `percent` (clamped) with a new status line.
    pub fn advance(&self, percent: impl Into<f64>, status: impl Into<String>) {
        let target = clamp_percent(percent.into());
        self.update(|s| {
            s.percent = s.percent.max(target);
            s.status = status.into();
        });
    }

    /// Replace the status line, keeping the percentage.
    pub fn set_status(&self, status: impl Into<String>) {
        self.update(|s| s.status = status.into());
    }

    /// Drop the percentage back to 0 with a new status line.
    pub fn reset(&self, status: impl Into<String>) {
        self.update(|s| {
            s.percent = 0;
            s.status = status.into();
        });
    }

    /// Reset the bar but keep whatever status is showing.
    pub fn reset_percent(&self) {
        self.update(|s| s.percent = 0);
    }

    pub(crate) fn observer(&self) -> Option<&ProgressCallback> {
        self.observer.as_ref()
    }

    fn update(&self, f: impl FnOnce(&mut ProgressState)) {
        let snapshot = {
            let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let before = guard.clone();
            f(&mut guard);
            if *guard == before {
                return;
            }
            guard.clone()
        };
        if let Some(ref cb) = self.observer {
            cb.on_progress(snapshot.percent, &snapshot.status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCallback {
        updates: AtomicUsize,
        last: Mutex<(u8, String)>,
    }

    impl ConversionProgressCallback for CountingCallback {
        fn on_progress(&self, percent: u8, status: &str) {
            self.updates.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = (percent, status.to_string());
        }
    }

    #[test]
    fn clamp_handles_out_of_range_and_nan() {
        assert_eq!(clamp_percent(-5.0), 0);
        assert_eq!(clamp_percent(42.4), 42);
        assert_eq!(clamp_percent(150.0), 100);
        assert_eq!(clamp_percent(f64::NAN), 0);
    }

    #[test]
    fn scale_stays_in_band() {
        assert_eq!(scale_into(0.0, 15, 95), 15);
        assert_eq!(scale_into(0.5, 15, 95), 55);
        assert_eq!(scale_into(1.0, 15, 95), 95);
        assert_eq!(scale_into(3.0, 15, 95), 95);
        assert_eq!(scale_into(-1.0, 15, 95), 15);
    }

    #[test]
    fn upload_overshoot_caps_at_sixty() {
        assert_eq!(upload_percent(0, 100), 0);
        assert_eq!(upload_percent(50, 100), 30);
        assert_eq!(upload_percent(100, 100), 60);
        assert_eq!(upload_percent(150, 100), 60);
        assert_eq!(upload_percent(10, 0), 60);
    }

    #[test]
    fn advance_is_monotonic_until_reset() {
        let t = ProgressTracker::new(None);
        t.advance(40u8, "uploading");
        t.advance(20u8, "late event");
        assert_eq!(t.percent(), 40);
        assert_eq!(t.status(), "late event");

        t.advance(250.0, "overshoot");
        assert_eq!(t.percent(), 100);

        t.reset("failed");
        assert_eq!(t.snapshot(), ProgressState { percent: 0, status: "failed".into() });
    }

    #[test]
    fn observer_sees_changes_only() {
        let cb = Arc::new(CountingCallback {
            updates: AtomicUsize::new(0),
            last: Mutex::new((0, String::new())),
        });
        let t = ProgressTracker::new(Some(cb.clone() as ProgressCallback));
        t.advance(10u8, "loading");
        t.advance(10u8, "loading");
        t.set_status("ready");
        assert_eq!(cb.updates.load(Ordering::SeqCst), 2);
        assert_eq!(*cb.last.lock().unwrap(), (10, "ready".to_string()));
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_conversion_start("song.wav", 1024);
        cb.on_progress(50, "halfway");
        cb.on_conversion_complete("song.mp3", 512);
        cb.on_conversion_error("boom");
    }
}
