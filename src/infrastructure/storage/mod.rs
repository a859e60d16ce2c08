//! In-memory storage implementation

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::application::errors::StorageError;
use crate::domain::traits::KeyValueStore;

/// Namespaced key/value store kept in memory.
///
/// Each plugin writes under its own namespace so keys never collide across
/// plugins. Contents are lost on restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    namespaces: Arc<RwLock<HashMap<String, HashMap<String, String>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorted keys stored under `namespace`
    pub async fn keys(&self, namespace: &str) -> Vec<String> {
        let namespaces = self.namespaces.read().await;
        let mut keys: Vec<String> = namespaces
            .get(namespace)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Drop a whole namespace; returns how many keys it held.
    pub async fn clear_namespace(&self, namespace: &str) -> usize {
        let mut namespaces = self.namespaces.write().await;
        namespaces.remove(namespace).map(|ns| ns.len()).unwrap_or(0)
    }

    /// Typed read of a JSON-encoded value
    pub async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        match self.get(namespace, key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StorageError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: serde::Serialize>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
    ) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.set(namespace, key, &raw).await
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StorageError> {
        let namespaces = self.namespaces.read().await;
        Ok(namespaces.get(namespace).and_then(|ns| ns.get(key)).cloned())
    }

    async fn set(&self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError> {
        let mut namespaces = self.namespaces.write().await;
        namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let mut namespaces = self.namespaces.write().await;
        let removed = namespaces.get_mut(namespace).and_then(|ns| ns.remove(key));
        if removed.is_none() {
            return Err(StorageError::NotFound(format!("{}/{}", namespace, key)));
        }
        if namespaces.get(namespace).is_some_and(HashMap::is_empty) {
            namespaces.remove(namespace);
        }
        Ok(())
    }
}
