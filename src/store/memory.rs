use super::{ensure_unique, CredentialStore};
use crate::error::{GatewayError, GatewayResult};
use crate::user::User;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, User>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn create(&self, user: User) -> GatewayResult<User> {
        let mut users = self.users.lock();
        ensure_unique(users.values(), &user)?;
        users.insert(user.email.clone(), user.clone());
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
        let mut users = self.users.lock();
        if users
            .values()
            .any(|u| u.email != user.email && u.api_key == user.api_key)
        {
            return Err(GatewayError::AlreadyExists);
        }
        users.insert(user.email.clone(), user.clone());
        Ok(())
    }

    fn count(&self) -> GatewayResult<usize> {
        Ok(self.users.lock().len())
    }
}
