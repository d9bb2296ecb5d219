use std::sync::Arc;

use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::ids::{HandleGenerator, UuidGenerator};
use crate::store::{Secret, SecretStore, Timestamp};

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// Rejected creation input. The reason is for logs only, never for clients.
    #[error("invalid input: {0}")]
    Invalid(&'static str),
    /// Unknown, expired, or exhausted; callers cannot tell which.
    #[error("secret not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// A creation request after form decoding, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSecret {
    pub secret_text: String,
    pub expire_after_views: i64,
    /// Minutes until expiry; 0 disables time-based expiry.
    pub expire_after: i64,
}

impl NewSecret {
    /// Checks run in a fixed order and stop at the first failure.
    pub fn validate(&self) -> Result<(), SecretError> {
        if self.expire_after_views <= 0 {
            return Err(SecretError::Invalid("expireAfterViews must be positive"));
        }
        if self.expire_after < 0 {
            return Err(SecretError::Invalid("expireAfter must not be negative"));
        }
        if self.secret_text.is_empty() {
            return Err(SecretError::Invalid("secret must not be empty"));
        }
        Ok(())
    }
}

/// Owns the rules for when secrets are created, consumed and removed.
pub struct SecretManager {
    store: Arc<dyn SecretStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn HandleGenerator>,
}

impl SecretManager {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self::with_parts(store, Arc::new(SystemClock), Arc::new(UuidGenerator))
    }

    pub fn with_parts(
        store: Arc<dyn SecretStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn HandleGenerator>,
    ) -> Self {
        Self { store, clock, ids }
    }

    fn now(&self) -> Timestamp {
        Timestamp::from_utc(self.clock.now())
    }

    pub fn create_secret(&self, request: NewSecret) -> Result<Secret, SecretError> {
        request.validate()?;

        let created_at = self.now();
        let expires_at = match request.expire_after {
            0 => None,
            minutes => Some(
                created_at
                    .checked_add_minutes(minutes)
                    .ok_or(SecretError::Invalid("expireAfter out of range"))?,
            ),
        };

        let secret = Secret::new(
            request.secret_text,
            self.ids.generate(),
            request.expire_after_views,
            created_at,
            expires_at,
        );
        self.store.insert(&secret)?;

        info!(
            hash = %secret.hash,
            remaining_views = secret.remaining_views,
            expires_at = ?secret.expires_at.map(|t| t.to_string()),
            "secret created"
        );
        Ok(secret)
    }

    /// Consume one view of the secret behind `hash`.
    ///
    /// The returned secret carries the view count left after this read. An
    /// exhausted or time-expired secret is deleted and reported as not found.
    pub fn read_secret(&self, hash: &str) -> Result<Secret, SecretError> {
        let Some(mut secret) = self.store.find_by_hash(hash)? else {
            return Err(SecretError::NotFound);
        };

        if secret.is_exhausted() {
            self.delete_secret(hash)?;
            debug!(hash = %hash, "removed exhausted secret");
            return Err(SecretError::NotFound);
        }
        if secret.is_expired(self.now()) {
            self.delete_secret(hash)?;
            debug!(hash = %hash, "removed time-expired secret");
            return Err(SecretError::NotFound);
        }

        // A concurrent reader may have taken the last view since the lookup.
        let Some(remaining) = self.store.consume_view(hash)? else {
            debug!(hash = %hash, "lost race for final view");
            return Err(SecretError::NotFound);
        };

        secret.remaining_views = remaining;
        info!(hash = %hash, remaining_views = remaining, "secret read");
        Ok(secret)
    }

    /// Idempotent; deleting an unknown hash is not an error.
    pub fn delete_secret(&self, hash: &str) -> Result<(), SecretError> {
        if self.store.delete(hash)? {
            debug!(hash = %hash, "deleted secret");
        }
        Ok(())
    }
}
