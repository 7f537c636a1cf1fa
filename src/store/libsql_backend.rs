//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::model::{ActivityEntry, Credentials, NewAccount, Profile, ProfileUpdate, Session};
use crate::error::DatabaseError;
use crate::leads::{LeadRecord, LeadSource};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self { conn };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self { conn };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn require_profile(&self, id: Uuid, op: &str) -> Result<Profile, DatabaseError> {
        self.get_profile(id).await?.ok_or_else(|| {
            DatabaseError::Query(format!("{op}: row {id} vanished after write"))
        })
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    // Try RFC 3339 first (our canonical write format)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    // Try SQLite datetime() output with fractional seconds
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    // Try SQLite datetime() output without fractional seconds
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_bool(b: Option<bool>) -> libsql::Value {
    match b {
        Some(b) => libsql::Value::Integer(i64::from(b)),
        None => libsql::Value::Null,
    }
}

/// Map a write error, calling out uniqueness violations.
fn write_error(op: &str, e: libsql::Error) -> DatabaseError {
    let message = e.to_string();
    if message.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(format!("{op}: {message}"))
    } else {
        DatabaseError::Query(format!("{op}: {message}"))
    }
}

const USER_COLUMNS: &str = "id, email, cpf, full_name, phone, role, is_active, two_factor_enabled, last_login, created_by, created_at, updated_at";

const LEAD_COLUMNS: &str = "id, source, interest, name, email, phone, message, created_at";

/// Map a libsql Row to a Profile.
///
/// Column order matches USER_COLUMNS.
fn row_to_profile(row: &libsql::Row) -> Result<Profile, libsql::Error> {
    let id_str: String = row.get(0)?;
    let role_str: String = row.get(5)?;
    let last_login_str: Option<String> = row.get(8).ok();
    let created_by_str: Option<String> = row.get(9).ok();
    let created_str: String = row.get(10)?;
    let updated_str: String = row.get(11)?;

    Ok(Profile {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        email: row.get(1)?,
        cpf: row.get(2).ok(),
        full_name: row.get(3)?,
        phone: row.get(4).ok(),
        role: role_str.parse().unwrap_or_default(),
        is_active: row.get::<i64>(6)? != 0,
        two_factor_enabled: row.get::<i64>(7)? != 0,
        last_login: parse_optional_datetime(&last_login_str),
        created_by: created_by_str.and_then(|s| Uuid::parse_str(&s).ok()),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn row_to_session(row: &libsql::Row) -> Result<Session, libsql::Error> {
    let user_id: String = row.get(1)?;
    let created_str: String = row.get(2)?;
    let expires_str: String = row.get(3)?;
    Ok(Session {
        id: row.get(0)?,
        account_id: Uuid::parse_str(&user_id).unwrap_or_else(|_| Uuid::nil()),
        created_at: parse_datetime(&created_str),
        expires_at: parse_datetime(&expires_str),
    })
}

fn row_to_activity(row: &libsql::Row) -> Result<ActivityEntry, libsql::Error> {
    let id_str: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let details_str: String = row.get(3)?;
    let created_str: String = row.get(4)?;
    Ok(ActivityEntry {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        user_id: Uuid::parse_str(&user_id).unwrap_or_else(|_| Uuid::nil()),
        action: row.get(2)?,
        details: serde_json::from_str(&details_str).unwrap_or(serde_json::Value::Null),
        created_at: parse_datetime(&created_str),
    })
}

/// Column order matches LEAD_COLUMNS.
fn row_to_lead(row: &libsql::Row) -> Result<LeadRecord, libsql::Error> {
    let id_str: String = row.get(0)?;
    let source_str: String = row.get(1)?;
    let interest_str: Option<String> = row.get(2).ok();
    let created_str: String = row.get(7)?;
    Ok(LeadRecord {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        source: source_str.parse().unwrap_or(LeadSource::ContactForm),
        interest: interest_str.and_then(|s| s.parse().ok()),
        name: row.get(3).ok(),
        email: row.get(4).ok(),
        phone: row.get(5).ok(),
        message: row.get(6).ok(),
        created_at: parse_datetime(&created_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Accounts ────────────────────────────────────────────────────

    async fn insert_account(&self, account: &NewAccount) -> Result<Profile, DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let meta = &account.metadata;
        let created_by = meta.created_by.map(|id| id.to_string());

        conn.execute(
            &format!(
                "INSERT INTO users ({USER_COLUMNS}, password_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, 0, NULL, ?7, ?8, ?8, ?9)"
            ),
            params![
                account.id.to_string(),
                account.email.as_str(),
                opt_text(meta.cpf.as_deref()),
                meta.full_name.as_str(),
                opt_text(meta.phone.as_deref()),
                meta.role.to_string(),
                opt_text(created_by.as_deref()),
                now,
                account.password_hash.as_str(),
            ],
        )
        .await
        .map_err(|e| write_error("insert_account", e))?;

        debug!(user_id = %account.id, role = %meta.role, "Account inserted into DB");
        self.require_profile(account.id, "insert_account").await
    }

    async fn insert_initial_admin(
        &self,
        account: &NewAccount,
    ) -> Result<Option<Profile>, DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let meta = &account.metadata;

        // The users trigger flips system_initialized within this statement.
        let inserted = conn
            .execute(
                &format!(
                    "INSERT INTO users ({USER_COLUMNS}, password_hash)
                     SELECT ?1, ?2, ?3, ?4, ?5, 'super_admin', 1, 0, NULL, NULL, ?6, ?6, ?7
                     WHERE (SELECT value FROM system_config WHERE key = 'system_initialized') = 'false'"
                ),
                params![
                    account.id.to_string(),
                    account.email.as_str(),
                    opt_text(meta.cpf.as_deref()),
                    meta.full_name.as_str(),
                    opt_text(meta.phone.as_deref()),
                    now,
                    account.password_hash.as_str(),
                ],
            )
            .await
            .map_err(|e| write_error("insert_initial_admin", e))?;

        if inserted == 0 {
            debug!("Initial admin refused: system already initialized");
            return Ok(None);
        }
        info!(user_id = %account.id, "Initial super admin created");
        self.require_profile(account.id, "insert_initial_admin")
            .await
            .map(Some)
    }

    async fn get_credentials(&self, email: &str) -> Result<Option<Credentials>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                "SELECT id, password_hash FROM users WHERE email = ?1 COLLATE NOCASE",
                params![email],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_credentials: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let id_str: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("get_credentials row parse: {e}")))?;
                let password_hash: String = row
                    .get(1)
                    .map_err(|e| DatabaseError::Query(format!("get_credentials row parse: {e}")))?;
                let account_id = Uuid::parse_str(&id_str)
                    .map_err(|e| DatabaseError::Serialization(format!("user id: {e}")))?;
                Ok(Some(Credentials {
                    account_id,
                    password_hash,
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_credentials: {e}"))),
        }
    }

    async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_profile: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let profile = row_to_profile(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_profile row parse: {e}")))?;
                Ok(Some(profile))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_profile: {e}"))),
        }
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, rowid DESC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_profiles: {e}")))?;

        let mut profiles = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_profile(&row) {
                Ok(profile) => profiles.push(profile),
                Err(e) => tracing::warn!("Skipping user row: {e}"),
            }
        }
        Ok(profiles)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<Option<Profile>, DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let role = update.role.map(|r| r.to_string());
        let last_login = update.last_login.map(|t| t.to_rfc3339());

        let count = conn
            .execute(
                "UPDATE users SET
                    full_name = COALESCE(?2, full_name),
                    cpf = COALESCE(?3, cpf),
                    phone = COALESCE(?4, phone),
                    role = COALESCE(?5, role),
                    is_active = COALESCE(?6, is_active),
                    two_factor_enabled = COALESCE(?7, two_factor_enabled),
                    last_login = COALESCE(?8, last_login),
                    updated_at = ?9
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    opt_text(update.full_name.as_deref()),
                    opt_text(update.cpf.as_deref()),
                    opt_text(update.phone.as_deref()),
                    opt_text(role.as_deref()),
                    opt_bool(update.is_active),
                    opt_bool(update.two_factor_enabled),
                    opt_text(last_login.as_deref()),
                    now,
                ],
            )
            .await
            .map_err(|e| write_error("update_profile", e))?;

        if count == 0 {
            return Ok(None);
        }
        debug!(user_id = %id, "Profile updated in DB");
        self.get_profile(id).await
    }

    // ── Activity log ────────────────────────────────────────────────

    async fn append_activity(&self, entry: &ActivityEntry) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let details = serde_json::to_string(&entry.details)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO user_activity_log (id, user_id, action, details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.id.to_string(),
                entry.user_id.to_string(),
                entry.action.as_str(),
                details,
                entry.created_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("append_activity: {e}")))?;
        Ok(())
    }

    async fn list_activity(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ActivityEntry>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                "SELECT id, user_id, action, details, created_at FROM user_activity_log
                 WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
                params![user_id.to_string(), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_activity: {e}")))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_activity(&row) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("Skipping activity row: {e}"),
            }
        }
        Ok(entries)
    }

    // ── System config ───────────────────────────────────────────────

    async fn get_config(&self, key: &str) -> Result<Option<serde_json::Value>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                "SELECT value FROM system_config WHERE key = ?1",
                params![key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_config: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value_str: String = row.get(0).unwrap_or_else(|_| "null".to_string());
                let value: serde_json::Value =
                    serde_json::from_str(&value_str).unwrap_or(serde_json::Value::Null);
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_config: {e}"))),
        }
    }

    async fn set_config(&self, key: &str, value: &serde_json::Value) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let value_str = serde_json::to_string(value)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO system_config (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value_str, now],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("set_config: {e}")))?;

        Ok(())
    }

    // ── Sessions ────────────────────────────────────────────────────

    async fn create_session(&self, session: &Session) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                session.id.as_str(),
                session.account_id.to_string(),
                session.created_at.to_rfc3339(),
                session.expires_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| write_error("create_session", e))?;
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                "SELECT id, user_id, created_at, expires_at FROM sessions WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_session: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let session = row_to_session(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_session row parse: {e}")))?;
                Ok(Some(session))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_session: {e}"))),
        }
    }

    async fn delete_session(&self, id: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let count = conn
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_session: {e}")))?;
        Ok(count > 0)
    }

    async fn delete_expired_sessions(&self) -> Result<u64, DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let count = conn
            .execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_expired_sessions: {e}")))?;
        if count > 0 {
            debug!(count, "Expired sessions removed");
        }
        Ok(count)
    }

    // ── Leads ───────────────────────────────────────────────────────

    async fn insert_lead(&self, lead: &LeadRecord) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let interest = lead.interest.map(|i| i.to_string());

        conn.execute(
            &format!("INSERT INTO leads ({LEAD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                lead.id.to_string(),
                lead.source.to_string(),
                opt_text(interest.as_deref()),
                opt_text(lead.name.as_deref()),
                opt_text(lead.email.as_deref()),
                opt_text(lead.phone.as_deref()),
                opt_text(lead.message.as_deref()),
                lead.created_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| write_error("insert_lead", e))?;

        debug!(lead_id = %lead.id, source = %lead.source, "Lead inserted into DB");
        Ok(())
    }

    async fn list_leads(&self, limit: usize) -> Result<Vec<LeadRecord>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {LEAD_COLUMNS} FROM leads ORDER BY created_at DESC, rowid DESC LIMIT ?1"
                ),
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_leads: {e}")))?;

        let mut leads = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_lead(&row) {
                Ok(lead) => leads.push(lead),
                Err(e) => tracing::warn!("Skipping lead row: {e}"),
            }
        }
        Ok(leads)
    }
}
