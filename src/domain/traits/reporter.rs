use crate::application::errors::BotError;
use crate::domain::entities::Event;

/// Sink for runtime failures caught by the dispatcher and the scheduler.
///
/// Fire-and-forget: implementations must not block and must not fail.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &BotError, source: &str, event: Option<&Event>);
}
