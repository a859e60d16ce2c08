//! Domain layer - Core types with no runtime behaviour
//!
//! This layer contains:
//! - Entities: Events and command bindings (Command, BotCommand, CallbackRoute)
//! - Traits: Collaborator interfaces (event source, error reporter, stores)

pub mod entities;
pub mod traits;
