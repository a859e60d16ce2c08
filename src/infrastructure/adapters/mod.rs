//! Event source adapters

pub mod console;

pub use console::ConsoleSource;
