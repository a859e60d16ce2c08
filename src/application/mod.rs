//! Application layer - The extension runtime kernel
//!
//! This layer contains:
//! - Errors: Kernel and handler error types
//! - Messaging: Command parsing, middleware, dispatching
//! - Services: Command registry and callback permissions
//! - Scheduler: Background interval, daily and one-shot tasks
//! - Kernel: One owned instance of each of the above

pub mod errors;
pub mod kernel;
pub mod messaging;
pub mod scheduler;
pub mod services;
