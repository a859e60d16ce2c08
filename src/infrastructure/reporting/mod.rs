//! Error reporters - sinks for failures caught at the dispatcher and scheduler

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::application::errors::BotError;
use crate::domain::entities::Event;
use crate::domain::traits::ErrorReporter;
use crate::infrastructure::cache::TtlCache;

/// Distinct signatures remembered for deduplication
const DEDUP_CAPACITY: usize = 256;

/// Logs reports through `tracing`, dropping repeats of the same
/// `(source, error)` pair inside the dedup window.
pub struct TracingReporter {
    recent: Mutex<TtlCache<String, ()>>,
    window: Duration,
}

impl TracingReporter {
    pub fn new(window: Duration) -> Self {
        Self {
            recent: Mutex::new(TtlCache::new(DEDUP_CAPACITY, window)),
            window,
        }
    }

    /// True the first time a signature is seen within the window
    fn first_occurrence(&self, signature: String) -> bool {
        if self.window.is_zero() {
            return true;
        }
        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        if recent.contains(&signature) {
            return false;
        }
        recent.set(signature, (), None);
        true
    }
}

impl Default for TracingReporter {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &BotError, source: &str, event: Option<&Event>) {
        if !self.first_occurrence(format!("{}:{}", source, error)) {
            tracing::debug!(source, error = %error, "duplicate error report suppressed");
            return;
        }

        match event {
            Some(event) => tracing::error!(
                source,
                error = %error,
                event_id = %event.id,
                chat_id = event.chat_id,
                sender_id = event.sender_id,
                text = %event.preview(200),
                "handler error"
            ),
            None => tracing::error!(source, error = %error, "background error"),
        }
    }
}

/// A captured report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub source: String,
    pub message: String,
    pub event_id: Option<String>,
}

/// Keeps every report in memory for tests to inspect
#[derive(Debug, Default)]
pub struct CollectingReporter {
    reports: Mutex<Vec<Report>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, error: &BotError, source: &str, event: Option<&Event>) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Report {
                source: source.to_string(),
                message: error.to_string(),
                event_id: event.map(|e| e.id.clone()),
            });
    }
}
