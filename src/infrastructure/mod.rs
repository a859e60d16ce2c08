//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Cache: Expiring LRU cache
//! - Config: Configuration loading
//! - Storage: Namespaced key/value persistence
//! - Reporting: Error reporters
//! - Adapters: Event sources (console)

pub mod adapters;
pub mod cache;
pub mod config;
pub mod reporting;
pub mod storage;
