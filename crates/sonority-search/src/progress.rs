//! Load progress reporting.

use std::sync::Mutex;

/// Steps of a load, each owning a slice of the overall `[0, 1]` progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    ReadingCache,
    FetchingFeatures,
    Training,
    Indexing,
    WritingCache,
}

impl LoadStage {
    /// Overall progress range covered by the stage.
    pub const fn range(self) -> (f64, f64) {
        match self {
            Self::ReadingCache => (0.0, 0.05),
            Self::FetchingFeatures => (0.05, 0.3),
            Self::Training => (0.3, 0.85),
            Self::Indexing => (0.85, 0.97),
            Self::WritingCache => (0.97, 1.0),
        }
    }
}

/// Forwards progress to a caller-supplied callback, never reporting a value
/// lower than one already reported.
pub struct ProgressReporter<'a> {
    callback: &'a dyn Fn(f64),
    last: Mutex<f64>,
}

impl std::fmt::Debug for ProgressReporter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}

impl<'a> ProgressReporter<'a> {
    pub fn new(callback: &'a dyn Fn(f64)) -> Self {
        Self {
            callback,
            last: Mutex::new(0.0),
        }
    }

    /// Report an overall fraction, clamped to `[0, 1]`.
    pub fn report(&self, fraction: f64) {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        let Ok(mut last) = self.last.lock() else {
            return;
        };
        if fraction > *last {
            *last = fraction;
            drop(last);
            (self.callback)(fraction);
        }
    }

    /// Report `fraction` of `stage`.
    pub fn stage(&self, stage: LoadStage, fraction: f64) {
        let (start, end) = stage.range();
        self.report(start + (end - start) * fraction.clamp(0.0, 1.0));
    }

    /// A callback reporting the progress of a single stage.
    pub fn stage_callback(&self, stage: LoadStage) -> impl Fn(f64) + '_ {
        move |fraction| self.stage(stage, fraction)
    }

    pub fn finish(&self) {
        self.report(1.0);
    }
}
