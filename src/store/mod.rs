//! Credential storage.
//!
//! Pure data access for `User` records keyed by email. Business rules
//! (quota, hashing, tokens) live in the meter and the auth gateway; any
//! backend that honors read-after-write within the process can be plugged
//! in behind [`CredentialStore`].

mod json_file;
mod memory;
mod sqlite;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::{GatewayError, GatewayResult};
use crate::user::User;
use anyhow::{bail, Result};
use std::str::FromStr;
use std::sync::Arc;

pub trait CredentialStore: Send + Sync {
    /// Insert a new user. Fails with `AlreadyExists` if the email or the
    /// API key is already taken.
    fn create(&self, user: User) -> GatewayResult<User>;

    fn find(&self, email: &str) -> GatewayResult<Option<User>>;

    fn find_by_api_key(&self, api_key: &str) -> GatewayResult<Option<User>>;

    /// Overwrite the stored record for `user.email`.
    fn save(&self, user: &User) -> GatewayResult<()>;

    fn count(&self) -> GatewayResult<usize>;
}

impl<S: CredentialStore + ?Sized> CredentialStore for Arc<S> {
    fn create(&self, user: User) -> GatewayResult<User> {
        (**self).create(user)
    }

    fn find(&self, email: &str) -> GatewayResult<Option<User>> {
        (**self).find(email)
    }

    fn find_by_api_key(&self, api_key: &str) -> GatewayResult<Option<User>> {
        (**self).find_by_api_key(api_key)
    }

    fn save(&self, user: &User) -> GatewayResult<()> {
        (**self).save(user)
    }

    fn count(&self) -> GatewayResult<usize> {
        (**self).count()
    }
}

/// Which backend `open_store` builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Json,
    Sqlite,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "json" => Ok(StoreBackend::Json),
            "sqlite" => Ok(StoreBackend::Sqlite),
            other => bail!(
                "Unknown store backend '{}'. Expected memory, json or sqlite",
                other
            ),
        }
    }
}

pub fn open_store(backend: StoreBackend, path: &str) -> Result<Arc<dyn CredentialStore>> {
    let store: Arc<dyn CredentialStore> = match backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Json => Arc::new(JsonFileStore::open(path)?),
        StoreBackend::Sqlite => Arc::new(SqliteStore::new(path)?),
    };
    Ok(store)
}

/// Uniqueness check shared by the map-backed stores.
fn ensure_unique<'a>(
    mut existing: impl Iterator<Item = &'a User>,
    candidate: &User,
) -> GatewayResult<()> {
    if existing.any(|u| u.email == candidate.email || u.api_key == candidate.api_key) {
        return Err(GatewayError::AlreadyExists);
    }
    Ok(())
}
