//! Domain traits - Abstractions for infrastructure implementations

pub mod config;
pub mod reporter;
pub mod source;
pub mod store;

pub use config::ConfigProvider;
pub use reporter::ErrorReporter;
pub use source::EventSource;
pub use store::KeyValueStore;
