//! Error-reporting sink for failures that never reach a caller.
//!
//! Hydration, persistence writes, and background fetches run detached from
//! whoever triggered them. Their failures are handed to a [`Reporter`].

use std::sync::Arc;

/// A single-argument sink for background failures.
///
/// Implemented for any `Fn(&dyn std::error::Error)` closure, so tests can
/// collect reports without defining a type.
pub trait Reporter: Send + Sync {
    fn report(&self, error: &dyn std::error::Error);
}

impl<F> Reporter for F
where
    F: Fn(&dyn std::error::Error) + Send + Sync,
{
    fn report(&self, error: &dyn std::error::Error) {
        self(error)
    }
}

/// Default reporter: logs through `tracing` at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, error: &dyn std::error::Error) {
        tracing::error!(error = %error, "background store operation failed");
    }
}

/// Shared reporter handle used by stores.
pub type SharedReporter = Arc<dyn Reporter>;

pub(crate) fn default_reporter() -> SharedReporter {
    Arc::new(TracingReporter)
}
