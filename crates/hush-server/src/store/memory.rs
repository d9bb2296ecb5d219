use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};

use super::model::Secret;
use super::SecretStore;

/// Process-local store. Contents are lost on restart.
#[derive(Clone, Default)]
pub struct MemoryStore {
    secrets: Arc<Mutex<HashMap<String, Secret>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Secret>>> {
        self.secrets
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

impl SecretStore for MemoryStore {
    fn find_by_hash(&self, hash: &str) -> Result<Option<Secret>> {
        Ok(self.lock()?.get(hash).cloned())
    }

    fn insert(&self, secret: &Secret) -> Result<()> {
        self.lock()?.insert(secret.hash.clone(), secret.clone());
        Ok(())
    }

    fn update_remaining_views(&self, hash: &str, remaining_views: i64) -> Result<()> {
        if let Some(secret) = self.lock()?.get_mut(hash) {
            secret.remaining_views = remaining_views;
        }
        Ok(())
    }

    fn consume_view(&self, hash: &str) -> Result<Option<i64>> {
        let mut secrets = self.lock()?;
        Ok(match secrets.get_mut(hash) {
            Some(secret) if secret.remaining_views > 0 => {
                secret.remaining_views -= 1;
                Some(secret.remaining_views)
            }
            _ => None,
        })
    }

    fn delete(&self, hash: &str) -> Result<bool> {
        Ok(self.lock()?.remove(hash).is_some())
    }
}
