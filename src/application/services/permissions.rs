//! Time-scoped permission grants for callback (inline button) actions

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::domain::entities::UserId;
use crate::infrastructure::cache::deadline_after;

/// Grants keyed by user, then by pattern prefix, valued by expiry
type GrantTable = HashMap<UserId, HashMap<String, Instant>>;

/// Grants temporary, prefix-scoped access to callback data.
///
/// `allow(123, "menu_", 60s)` lets user 123 press any button whose data starts
/// with `menu_` for one minute. Expiry uses the monotonic tokio clock.
#[derive(Debug, Default)]
pub struct CallbackPermissionManager {
    grants: Mutex<GrantTable>,
}

impl CallbackPermissionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, GrantTable> {
        self.grants.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Grant `user_id` access to data starting with `pattern` for `duration`.
    /// Re-granting the same pattern refreshes its expiry.
    pub fn allow(&self, user_id: UserId, pattern: impl Into<String>, duration: Duration) {
        let pattern = pattern.into();
        tracing::debug!(user_id, %pattern, ?duration, "callback permission granted");
        self.table()
            .entry(user_id)
            .or_default()
            .insert(pattern, deadline_after(Instant::now(), duration));
    }

    /// True if a live grant of `user_id` is a prefix of `data`.
    /// Expired grants met during the scan are dropped.
    pub fn is_allowed(&self, user_id: UserId, data: &str) -> bool {
        let now = Instant::now();
        let mut table = self.table();
        let Some(user_grants) = table.get_mut(&user_id) else {
            return false;
        };

        user_grants.retain(|_, expire_at| *expire_at > now);
        let allowed = user_grants.keys().any(|pattern| data.starts_with(pattern.as_str()));

        if user_grants.is_empty() {
            table.remove(&user_id);
        }
        allowed
    }

    /// Revoke the grant for exactly `pattern`
    pub fn prohibit(&self, user_id: UserId, pattern: &str) {
        let mut table = self.table();
        if let Some(user_grants) = table.get_mut(&user_id) {
            user_grants.remove(pattern);
            if user_grants.is_empty() {
                table.remove(&user_id);
            }
        }
    }

    /// Revoke every grant held by `user_id`
    pub fn prohibit_all(&self, user_id: UserId) {
        self.table().remove(&user_id);
    }

    /// Drop expired grants for all users; returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut table = self.table();
        let mut removed = 0;

        table.retain(|_, user_grants| {
            let before = user_grants.len();
            user_grants.retain(|_, expire_at| *expire_at > now);
            removed += before - user_grants.len();
            !user_grants.is_empty()
        });
        removed
    }

    /// Live grants of `user_id` with their remaining time, sorted by pattern
    pub fn user_grants(&self, user_id: UserId) -> Vec<(String, Duration)> {
        let now = Instant::now();
        let table = self.table();
        let mut grants: Vec<(String, Duration)> = table
            .get(&user_id)
            .map(|user_grants| {
                user_grants
                    .iter()
                    .filter(|(_, expire_at)| **expire_at > now)
                    .map(|(pattern, expire_at)| (pattern.clone(), *expire_at - now))
                    .collect()
            })
            .unwrap_or_default();
        grants.sort();
        grants
    }

    /// Time left on the grant for exactly `pattern`, if it is still live
    pub fn remaining(&self, user_id: UserId, pattern: &str) -> Option<Duration> {
        let now = Instant::now();
        let expire_at = *self.table().get(&user_id)?.get(pattern)?;
        (expire_at > now).then(|| expire_at - now)
    }

    pub fn clear_all(&self) {
        self.table().clear();
    }
}
