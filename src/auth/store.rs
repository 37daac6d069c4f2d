use std::collections::HashMap;
use std::sync::Mutex;

pub const ACCESS_TOKEN: &str = "access_token";
pub const REFRESH_TOKEN: &str = "refresh_token";
/// Absolute expiry, epoch milliseconds.
pub const EXPIRES_AT: &str = "token_expires_at";
pub const CODE_VERIFIER: &str = "code_verifier";
pub const NOTIFICATIONS: &str = "notifications_enabled";

/// String-keyed persisted state. `clear` must drop every key in one step.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
    fn clear(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.map
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store poisoned"))
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        self.lock()?.clear();
        Ok(())
    }
}

/// Reads the track-change notification flag; anything but `"true"` is off.
pub fn notifications_enabled(store: &dyn CredentialStore) -> bool {
    matches!(store.get(NOTIFICATIONS), Ok(Some(v)) if v == "true")
}

pub fn set_notifications(store: &dyn CredentialStore, enabled: bool) -> anyhow::Result<()> {
    store.set(NOTIFICATIONS, if enabled { "true" } else { "false" })
}
