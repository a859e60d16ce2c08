use async_trait::async_trait;
use crate::application::errors::StorageError;

/// Store trait - namespaced key/value persistence used by plugins
///
/// Calls may fail; handlers propagate the failure with `?` and the dispatcher
/// boundary reports it.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError>;
    async fn delete(&self, namespace: &str, key: &str) -> Result<(), StorageError>;
}
