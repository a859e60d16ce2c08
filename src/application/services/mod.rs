//! Application services - Command bindings and callback permissions

pub mod permissions;
pub mod registry;

pub use permissions::CallbackPermissionManager;
pub use registry::{CommandRegistry, SharedRegistry};
