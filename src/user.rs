use crate::error::GatewayError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscription tier. Determines the per-window character quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Pro,
    Enterprise,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Plan::Free),
            "pro" => Ok(Plan::Pro),
            "enterprise" => Ok(Plan::Enterprise),
            other => Err(GatewayError::InvalidPlan(other.to_string())),
        }
    }
}

/// Characters consumed in the current billing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageWindow {
    pub used: u64,
    /// End of the current window.
    pub reset_at: DateTime<Utc>,
}

impl UsageWindow {
    pub fn starting_at(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            used: 0,
            reset_at: now + window,
        }
    }

    /// Zero the counter and open a new window if `now` is past `reset_at`.
    /// Returns true when a reset happened.
    pub fn roll_over_if_expired(&mut self, now: DateTime<Utc>, window: Duration) -> bool {
        if now > self.reset_at {
            self.used = 0;
            self.reset_at = now + window;
            true
        } else {
            false
        }
    }
}

/// A registered account, keyed by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub plan: Plan,
    pub api_key: String,
    pub created_at: DateTime<Utc>,
    pub usage: UsageWindow,
}

/// What a user may see about their own account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub email: String,
    pub name: String,
    pub plan: Plan,
    pub api_key: String,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            email: user.email.clone(),
            name: user.name.clone(),
            plan: user.plan,
            api_key: user.api_key.clone(),
        }
    }
}
