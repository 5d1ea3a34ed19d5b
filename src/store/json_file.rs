use super::{ensure_unique, CredentialStore};
use crate::error::{GatewayError, GatewayResult};
use crate::user::User;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Users persisted as one JSON object (email -> record).
///
/// Every mutation rewrites the whole file through a temp file and a rename,
/// so a crash mid-write leaves the previous version intact. Suitable for
/// low-volume deployments only.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    users: Mutex<BTreeMap<String, User>>,
}

impl JsonFileStore {
    /// Load the store from `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let users = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read user file {}", path.display()))?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse user file {}", path.display()))?
            }
        } else {
            BTreeMap::new()
        };

        info!("Loaded {} users from {}", users.len(), path.display());

        Ok(Self {
            path,
            users: Mutex::new(users),
        })
    }

    fn persist(&self, users: &BTreeMap<String, User>) -> GatewayResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(GatewayError::storage)?;
            }
        }
        let json = serde_json::to_string_pretty(users).map_err(GatewayError::storage)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(GatewayError::storage)?;
        std::fs::rename(&tmp, &self.path).map_err(GatewayError::storage)?;
        Ok(())
    }

    /// Apply `change` to a copy of the map, persist it, then publish it.
    fn mutate<F>(&self, change: F) -> GatewayResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, User>) -> GatewayResult<()>,
    {
        let mut users = self.users.lock();
        let mut next = users.clone();
        change(&mut next)?;
        self.persist(&next)?;
        *users = next;
        Ok(())
    }
}

impl CredentialStore for JsonFileStore {
    fn create(&self, user: User) -> GatewayResult<User> {
        self.mutate(|users| {
            ensure_unique(users.values(), &user)?;
            users.insert(user.email.clone(), user.clone());
            Ok(())
        })?;
        Ok(user)
    }

    fn find(&self, email: &str) -> GatewayResult<Option<User>> {
        Ok(self.users.lock().get(email).cloned())
    }

    fn find_by_api_key(&self, api_key: &str) -> GatewayResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .values()
            .find(|u| u.api_key == api_key)
            .cloned())
    }

    fn save(&self, user: &User) -> GatewayResult<()> {
        self.mutate(|users| {
            if users
                .values()
                .any(|u| u.email != user.email && u.api_key == user.api_key)
            {
                return Err(GatewayError::AlreadyExists);
            }
            users.insert(user.email.clone(), user.clone());
            Ok(())
        })
    }

    fn count(&self) -> GatewayResult<usize> {
        Ok(self.users.lock().len())
    }
}
