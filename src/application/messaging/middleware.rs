//! Middleware system for message processing pipeline

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::entities::{Event, Handler, HandlerResult, UserId};

/// Context passed through middleware chain
#[derive(Debug, Clone)]
pub struct Context {
    pub event: Event,
    pub chat_id: i64,
    pub user_id: UserId,
    /// Canonical command name once the dispatcher resolved it
    pub command: Option<String>,
    pub args: Vec<String>,
    pub data: HashMap<String, String>,
}

impl Context {
    pub fn new(event: Event) -> Self {
        let chat_id = event.chat_id;
        let user_id = event.sender_id;

        Self {
            event,
            chat_id,
            user_id,
            command: None,
            args: Vec::new(),
            data: HashMap::new(),
        }
    }

    pub fn with_command(mut self, name: impl Into<String>, args: Vec<String>) -> Self {
        self.command = Some(name.into());
        self.args = args;
        self
    }

    /// Get data from context
    pub fn get(&self, key: &str) -> Option<&String> {
        self.data.get(key)
    }

    /// Set data in context
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), value.into());
    }
}

/// Middleware trait - processors that wrap handler execution.
///
/// Call `next.run(ctx)` to continue the chain. Returning without calling it
/// short-circuits: nothing further down runs and the returned value becomes
/// the pipeline result.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn process(&self, ctx: Context, next: Next<'_>) -> HandlerResult;
}

/// Continuation over the remaining middleware and the final handler
#[derive(Clone)]
pub struct Next<'a> {
    remaining: &'a [Arc<dyn Middleware>],
    endpoint: &'a Handler,
}

impl<'a> Next<'a> {
    pub fn new(remaining: &'a [Arc<dyn Middleware>], endpoint: &'a Handler) -> Self {
        Self { remaining, endpoint }
    }

    /// Process remaining middleware, then the handler
    pub async fn run(self, ctx: Context) -> HandlerResult {
        match self.remaining.split_first() {
            Some((first, rest)) => {
                let next = Next::new(rest, self.endpoint);
                first.process(ctx, next).await
            }
            None => (self.endpoint)(ctx).await,
        }
    }
}

/// Ordered middleware list; first added runs outermost
#[derive(Clone, Default)]
pub struct MiddlewarePipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewarePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<M: Middleware + 'static>(&mut self, middleware: M) {
        self.middlewares.push(Arc::new(middleware));
    }

    pub fn add_shared(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Run `ctx` through every middleware and finally `handler`.
    pub async fn process(&self, ctx: Context, handler: &Handler) -> HandlerResult {
        Next::new(&self.middlewares, handler).run(ctx).await
    }
}

/// Rate limit middleware
pub struct RateLimitMiddleware {
    requests: Mutex<HashMap<UserId, Vec<Instant>>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimitMiddleware {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    /// Record a request for `key`; returns the wait time when over the limit.
    fn check_rate_limit(&self, key: UserId) -> Option<Duration> {
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);

        let now = Instant::now();
        let times = requests.entry(key).or_default();

        // Remove old requests outside the window
        times.retain(|&t| now.duration_since(t) < self.window);

        if times.len() >= self.max_requests as usize {
            let retry_after = times
                .first()
                .map(|t| self.window.saturating_sub(now.duration_since(*t)))
                .unwrap_or(self.window);
            return Some(retry_after);
        }

        times.push(now);
        None
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    async fn process(&self, ctx: Context, next: Next<'_>) -> HandlerResult {
        if let Some(retry_after) = self.check_rate_limit(ctx.user_id) {
            tracing::debug!(user = ctx.user_id, ?retry_after, "rate limited");
            return Ok(Some(format!(
                "Rate limited. Please try again in {}s.",
                retry_after.as_secs().max(1)
            )));
        }

        next.run(ctx).await
    }
}

/// Logging middleware for debugging
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn process(&self, ctx: Context, next: Next<'_>) -> HandlerResult {
        let chat_id = ctx.chat_id;
        let command = ctx.command.clone().unwrap_or_default();
        tracing::debug!(chat_id, %command, "[{}] {}", chat_id, ctx.event.preview(50));

        let result = next.run(ctx).await;

        match &result {
            Ok(_) => tracing::debug!(chat_id, %command, "processed OK"),
            Err(e) => tracing::warn!(chat_id, %command, error = %e, "handler failed"),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::handler_fn;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recording {
        name: &'static str,
        log: Log,
        pass_through: bool,
    }

    #[async_trait]
    impl Middleware for Recording {
        async fn process(&self, ctx: Context, next: Next<'_>) -> HandlerResult {
            self.log.lock().unwrap().push(format!("{}:before", self.name));
            if !self.pass_through {
                return Ok(Some(format!("stopped by {}", self.name)));
            }
            let result = next.run(ctx).await;
            self.log.lock().unwrap().push(format!("{}:after", self.name));
            result
        }
    }

    fn recording_handler(log: Log) -> Handler {
        handler_fn(move |_ctx| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push("handler".to_string());
                Ok(Some("done".to_string()))
            }
        })
    }

    fn ctx() -> Context {
        Context::new(Event::new(1, 2, ".ping"))
    }

    #[tokio::test]
    async fn test_first_registered_runs_outermost() {
        let log: Log = Arc::default();
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.add(Recording { name: "a", log: log.clone(), pass_through: true });
        pipeline.add(Recording { name: "b", log: log.clone(), pass_through: true });

        let result = pipeline.process(ctx(), &recording_handler(log.clone())).await;

        assert_eq!(result.unwrap().as_deref(), Some("done"));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:before", "b:before", "handler", "b:after", "a:after"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_downstream() {
        let log: Log = Arc::default();
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.add(Recording { name: "a", log: log.clone(), pass_through: true });
        pipeline.add(Recording { name: "gate", log: log.clone(), pass_through: false });
        pipeline.add(Recording { name: "c", log: log.clone(), pass_through: true });

        let result = pipeline.process(ctx(), &recording_handler(log.clone())).await;

        assert_eq!(result.unwrap().as_deref(), Some("stopped by gate"));
        assert_eq!(*log.lock().unwrap(), vec!["a:before", "gate:before", "a:after"]);
    }

    #[tokio::test]
    async fn test_empty_pipeline_calls_handler() {
        let log: Log = Arc::default();
        let pipeline = MiddlewarePipeline::new();
        assert!(pipeline.is_empty());

        let result = pipeline.process(ctx(), &recording_handler(log.clone())).await;
        assert!(result.is_ok());
        assert_eq!(*log.lock().unwrap(), vec!["handler"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_blocks_after_quota() {
        let log: Log = Arc::default();
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.add(RateLimitMiddleware::new(2, 60));
        let handler = recording_handler(log.clone());

        for _ in 0..2 {
            let reply = pipeline.process(ctx(), &handler).await.unwrap();
            assert_eq!(reply.as_deref(), Some("done"));
        }
        let reply = pipeline.process(ctx(), &handler).await.unwrap();
        assert!(reply.unwrap().starts_with("Rate limited"));
        assert_eq!(log.lock().unwrap().len(), 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        let reply = pipeline.process(ctx(), &handler).await.unwrap();
        assert_eq!(reply.as_deref(), Some("done"));
    }
}
