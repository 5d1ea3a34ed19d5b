use super::CredentialStore;
use crate::error::{GatewayError, GatewayResult};
use crate::user::{Plan, UsageWindow, User};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::sync::Arc;

const USER_COLUMNS: &str =
    "email, name, password_hash, plan, api_key, created_at, usage_used, usage_reset_at";

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database and make sure the users table exists
    pub fn new(database_path: &str) -> Result<Self> {
        let conn = Connection::open(database_path)
            .context(format!("Failed to open database at {}", database_path))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                email TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                plan TEXT NOT NULL DEFAULT 'free',
                api_key TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                usage_used INTEGER NOT NULL DEFAULT 0,
                usage_reset_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create users table")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn query_one(&self, sql: &str, key: &str) -> GatewayResult<Option<User>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(sql, params![key], read_row)
            .optional()
            .map_err(GatewayError::storage)?;
        row.map(RawUser::into_user).transpose()
    }
}

/// Row as stored; text columns are parsed after the statement completes.
struct RawUser {
    email: String,
    name: String,
    password_hash: String,
    plan: String,
    api_key: String,
    created_at: String,
    usage_used: i64,
    usage_reset_at: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawUser> {
    Ok(RawUser {
        email: row.get(0)?,
        name: row.get(1)?,
        password_hash: row.get(2)?,
        plan: row.get(3)?,
        api_key: row.get(4)?,
        created_at: row.get(5)?,
        usage_used: row.get(6)?,
        usage_reset_at: row.get(7)?,
    })
}

fn parse_timestamp(value: &str) -> GatewayResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(GatewayError::storage)
}

impl RawUser {
    fn into_user(self) -> GatewayResult<User> {
        let plan: Plan = self
            .plan
            .parse()
            .map_err(|_| GatewayError::Storage(format!("unknown plan '{}'", self.plan)))?;
        Ok(User {
            email: self.email,
            name: self.name,
            password_hash: self.password_hash,
            plan,
            api_key: self.api_key,
            created_at: parse_timestamp(&self.created_at)?,
            usage: UsageWindow {
                used: u64::try_from(self.usage_used).unwrap_or(0),
                reset_at: parse_timestamp(&self.usage_reset_at)?,
            },
        })
    }
}

fn map_write_error(err: rusqlite::Error) -> GatewayError {
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => GatewayError::AlreadyExists,
        _ => GatewayError::storage(err),
    }
}

fn used_as_i64(user: &User) -> i64 {
    i64::try_from(user.usage.used).unwrap_or(i64::MAX)
}

impl CredentialStore for SqliteStore {
    fn create(&self, user: User) -> GatewayResult<User> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                USER_COLUMNS
            ),
            params![
                user.email,
                user.name,
                user.password_hash,
                user.plan.as_str(),
                user.api_key,
                user.created_at.to_rfc3339(),
                used_as_i64(&user),
                user.usage.reset_at.to_rfc3339(),
            ],
        )
        .map_err(map_write_error)?;
        Ok(user)
    }

    fn find(&self, email: &str) -> GatewayResult<Option<User>> {
        self.query_one(
            &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
            email,
        )
    }

    fn find_by_api_key(&self, api_key: &str) -> GatewayResult<Option<User>> {
        self.query_one(
            &format!("SELECT {} FROM users WHERE api_key = ?1", USER_COLUMNS),
            api_key,
        )
    }

    fn save(&self, user: &User) -> GatewayResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(email) DO UPDATE SET
                    name = excluded.name,
                    password_hash = excluded.password_hash,
                    plan = excluded.plan,
                    api_key = excluded.api_key,
                    usage_used = excluded.usage_used,
                    usage_reset_at = excluded.usage_reset_at",
                USER_COLUMNS
            ),
            params![
                user.email,
                user.name,
                user.password_hash,
                user.plan.as_str(),
                user.api_key,
                user.created_at.to_rfc3339(),
                used_as_i64(user),
                user.usage.reset_at.to_rfc3339(),
            ],
        )
        .map_err(map_write_error)?;
        Ok(())
    }

    fn count(&self) -> GatewayResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .map_err(GatewayError::storage)?;
        Ok(count as usize)
    }
}
