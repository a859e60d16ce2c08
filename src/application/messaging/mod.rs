//! Message handling - Event-driven message processing

pub mod dispatcher;
pub mod middleware;
pub mod parser;

pub use dispatcher::{Dispatch, Dispatcher};
pub use middleware::{Context, LoggingMiddleware, Middleware, MiddlewarePipeline, Next, RateLimitMiddleware};
pub use parser::{CommandParser, ParsedCommand};
