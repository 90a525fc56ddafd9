//! Scoped processing lock
//!
//! A short-lived KV key holding a random token. Release is compare-and-delete
//! on that token, so a holder whose lock already expired and was taken by
//! another worker never removes the new holder's key.

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::storage::{KvStore, StorageResult};

pub struct LockGuard {
    store: Arc<dyn KvStore>,
    key: String,
    token: String,
    released: bool,
}

impl LockGuard {
    /// Try once to take the lock. `Ok(None)` means someone else holds it.
    pub async fn acquire(
        store: Arc<dyn KvStore>,
        key: String,
        ttl: Duration,
    ) -> StorageResult<Option<Self>> {
        let token = format!("{:032x}", rand::random::<u128>());
        if !store.set_if_absent(&key, &token, ttl).await? {
            return Ok(None);
        }

        Ok(Some(Self {
            store,
            key,
            token,
            released: false,
        }))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the lock. Returns false if it had already expired or changed hands.
    pub async fn release(mut self) -> StorageResult<bool> {
        self.released = true;
        self.store.delete_if_value(&self.key, &self.token).await
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        // Dropped mid-flight (panic or cancelled future)
        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = store.delete_if_value(&key, &token).await {
                        warn!(key = %key, error = %e, "Failed to release dropped lock");
                    }
                });
            }
            Err(_) => warn!(key = %key, "Lock dropped outside a runtime, left to expire"),
        }
    }
}
