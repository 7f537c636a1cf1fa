//! Account, profile, session, and activity-log models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::Role;

/// An authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
}

/// Back-office profile attached to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpf: Option<String>,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub two_factor_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn account(&self) -> Account {
        Account {
            id: self.id,
            email: self.email.clone(),
        }
    }
}

/// A signed-in session. The id is the bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub account_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(account_id: Uuid, ttl: std::time::Duration) -> Self {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(12));
        Self {
            id: Uuid::new_v4().to_string(),
            account_id,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Profile fields supplied when an account is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUpMetadata {
    pub full_name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Uuid>,
}

/// Row to insert for a new account. Carries the password hash, never the
/// password.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub metadata: SignUpMetadata,
}

/// Stored credentials for password sign-in.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub account_id: Uuid,
    pub password_hash: String,
}

/// Partial profile update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub two_factor_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

/// One row of the user activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(user_id: Uuid, action: &str, details: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            action: action.to_string(),
            details,
            created_at: Utc::now(),
        }
    }
}

/// Notification emitted by the identity provider when auth state changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthEvent {
    SignedIn { account_id: Uuid },
    SignedOut { account_id: Uuid },
    ProfileUpdated { account_id: Uuid },
}

impl AuthEvent {
    pub fn account_id(&self) -> Uuid {
        match self {
            Self::SignedIn { account_id }
            | Self::SignedOut { account_id }
            | Self::ProfileUpdated { account_id } => *account_id,
        }
    }
}

/// Settings keys in the `system_config` table.
pub mod config_keys {
    /// Flips to `true` when the first super admin is created.
    pub const SYSTEM_INITIALIZED: &str = "system_initialized";
}
