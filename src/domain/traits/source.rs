use async_trait::async_trait;
use crate::domain::entities::Event;

/// Event source - abstraction for transport adapters feeding the dispatcher
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Wait for the next inbound event; `None` once the source is exhausted.
    async fn next_event(&self) -> Option<Event>;

    /// Deliver a reply produced by a handler
    async fn reply(&self, event: &Event, text: &str);

    fn name(&self) -> &str;
}
