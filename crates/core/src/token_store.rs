//! Cached token snapshot with write-through persistence

use crate::error::{StoreError, StoreResult};
use crate::storage::{KeyValueStore, keys};
use crate::types::{Token, User};
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tracing::debug;

/// Holds the current credential pair for the session.
///
/// Reads are lock-free snapshots of an in-memory cache; every `set` and
/// `clear` writes through to the key-value collaborator before the cache
/// is swapped, so a successful call is durable as well as visible.
pub struct TokenStore {
    cached: ArcSwapOption<Token>,
    backend: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            cached: ArcSwapOption::const_empty(),
            backend,
        }
    }

    /// Non-blocking snapshot of the current token, if any
    pub fn get(&self) -> Option<Token> {
        self.cached.load_full().map(|t| (*t).clone())
    }

    /// Atomically replace the current token.
    ///
    /// Visible to every subsequent [`get`](Self::get) once this returns.
    /// On a backend failure the cache is left untouched.
    pub async fn set(&self, token: Token) -> StoreResult<()> {
        self.backend
            .set(keys::ACCESS_TOKEN, &token.access_token)
            .await?;
        self.backend
            .set(keys::REFRESH_TOKEN, &token.refresh_token)
            .await?;
        self.cached.store(Some(Arc::new(token)));
        Ok(())
    }

    /// Remove the token and the persisted user record together.
    ///
    /// The cache is dropped before the backend writes so readers observe
    /// `Absent` immediately, even if the collaborator is slow.
    pub async fn clear(&self) -> StoreResult<()> {
        self.cached.store(None);
        self.backend.remove(keys::ACCESS_TOKEN).await?;
        self.backend.remove(keys::REFRESH_TOKEN).await?;
        self.backend.remove(keys::USER).await?;
        debug!("token store cleared");
        Ok(())
    }

    /// Persist the logged-in user alongside the tokens
    pub async fn set_user(&self, user: &User) -> StoreResult<()> {
        let encoded = serde_json::to_string(user)
            .map_err(|e| StoreError::corrupt(keys::USER, e.to_string()))?;
        self.backend.set(keys::USER, &encoded).await
    }

    /// Read the persisted user record, if any
    pub async fn get_user(&self) -> StoreResult<Option<User>> {
        match self.backend.get(keys::USER).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::corrupt(keys::USER, e.to_string())),
            None => Ok(None),
        }
    }

    /// Prime the cache from the collaborator, returning the restored token.
    ///
    /// The persisted layout keeps the raw token strings only, so the
    /// restore time stands in for the original issue time.
    pub async fn load(&self) -> StoreResult<Option<Token>> {
        let access = self.backend.get(keys::ACCESS_TOKEN).await?;
        let refresh = self.backend.get(keys::REFRESH_TOKEN).await?;
        match (access, refresh) {
            (Some(access), Some(refresh)) => {
                let token = Token::new(access, refresh);
                self.cached.store(Some(Arc::new(token.clone())));
                Ok(Some(token))
            }
            _ => {
                self.cached.store(None);
                Ok(None)
            }
        }
    }
}
