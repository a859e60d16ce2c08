//! Domain entities - Core business objects with no external dependencies

pub mod command;
pub mod event;

pub use command::{handler_fn, BotCommand, CallbackRoute, Command, Handler, HandlerResult};
pub use event::{Event, UserId};
