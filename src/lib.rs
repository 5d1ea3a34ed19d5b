//! Usage-metered translation gateway.
//!
//! Accounts with API keys and plan quotas sit in front of a
//! LibreTranslate-compatible engine. Language pairs the engine cannot
//! translate directly are bridged through up to two pivot languages.

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod i18n;
pub mod metrics;
pub mod retry;
pub mod router;
pub mod security;
pub mod server;
pub mod store;
pub mod translator;
pub mod usage;
pub mod user;
