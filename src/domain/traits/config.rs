use serde_json::Value;

/// Runtime tunables consulted by plugins.
///
/// The kernel itself never reads from here; it takes its limits as
/// constructor options.
pub trait ConfigProvider: Send + Sync {
    fn get(&self, key: &str, default: Value) -> Value;
    fn set(&self, key: &str, value: Value);
}
