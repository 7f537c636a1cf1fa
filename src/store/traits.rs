//! `Database` trait — single async interface for all persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::model::{ActivityEntry, Credentials, NewAccount, Profile, ProfileUpdate, Session};
use crate::error::DatabaseError;
use crate::leads::LeadRecord;

/// Backend-agnostic database trait covering accounts, sessions, system
/// configuration, and leads.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Accounts ────────────────────────────────────────────────────

    /// Create an account and its profile. Fails with `Constraint` if the
    /// email is taken.
    async fn insert_account(&self, account: &NewAccount) -> Result<Profile, DatabaseError>;

    /// Create the first super admin, only while the system is uninitialized.
    ///
    /// The insert and the flag flip happen in one statement. Returns `None`
    /// when the system was already initialized; nothing is written then.
    async fn insert_initial_admin(
        &self,
        account: &NewAccount,
    ) -> Result<Option<Profile>, DatabaseError>;

    /// Look up the password hash for an email (case-insensitive).
    async fn get_credentials(&self, email: &str) -> Result<Option<Credentials>, DatabaseError>;

    async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>, DatabaseError>;

    /// All profiles, newest first.
    async fn list_profiles(&self) -> Result<Vec<Profile>, DatabaseError>;

    /// Apply a partial update. Returns the updated profile, or `None` if the
    /// id is unknown.
    async fn update_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<Option<Profile>, DatabaseError>;

    // ── Activity log ────────────────────────────────────────────────

    async fn append_activity(&self, entry: &ActivityEntry) -> Result<(), DatabaseError>;

    /// Most recent entries for a user, newest first.
    async fn list_activity(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ActivityEntry>, DatabaseError>;

    // ── System config ───────────────────────────────────────────────

    async fn get_config(&self, key: &str) -> Result<Option<serde_json::Value>, DatabaseError>;

    async fn set_config(&self, key: &str, value: &serde_json::Value) -> Result<(), DatabaseError>;

    // ── Sessions ────────────────────────────────────────────────────

    async fn create_session(&self, session: &Session) -> Result<(), DatabaseError>;

    /// Fetch a session by token, expired or not.
    async fn get_session(&self, id: &str) -> Result<Option<Session>, DatabaseError>;

    async fn delete_session(&self, id: &str) -> Result<bool, DatabaseError>;

    /// Remove expired sessions. Returns how many were removed.
    async fn delete_expired_sessions(&self) -> Result<u64, DatabaseError>;

    // ── Leads ───────────────────────────────────────────────────────

    async fn insert_lead(&self, lead: &LeadRecord) -> Result<(), DatabaseError>;

    /// Most recent leads, newest first.
    async fn list_leads(&self, limit: usize) -> Result<Vec<LeadRecord>, DatabaseError>;
}
