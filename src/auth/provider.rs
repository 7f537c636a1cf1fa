//! Identity provider: accounts, passwords, sessions, and profile storage.
//!
//! [`IdentityProvider`] is the capability the rest of the crate talks to.
//! [`LocalIdentityProvider`] implements it over the libSQL store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::crypto::{self, BCRYPT_COST};
use super::model::{
    Account, ActivityEntry, AuthEvent, NewAccount, Profile, ProfileUpdate, Session,
    SignUpMetadata, config_keys,
};
use crate::access::{Role, SystemInitialization};
use crate::error::{AuthError, DatabaseError};
use crate::store::Database;

const EVENT_CAPACITY: usize = 64;

/// Authentication and profile operations.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a session token. Expired or unknown tokens yield `None`.
    async fn current_session(&self, token: &str) -> Result<Option<(Account, Session)>, AuthError>;

    /// Auth state change notifications.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    async fn get_profile(&self, account_id: Uuid) -> Result<Profile, AuthError>;

    async fn update_profile(
        &self,
        account_id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<Profile, AuthError>;

    async fn append_activity_log(
        &self,
        account_id: Uuid,
        action: &str,
        details: serde_json::Value,
    ) -> Result<(), AuthError>;

    async fn get_config_flag(&self, key: &str) -> Result<Option<serde_json::Value>, AuthError>;

    async fn set_config_flag(&self, key: &str, value: serde_json::Value) -> Result<(), AuthError>;

    async fn sign_in_with_password(&self, email: &str, password: &str)
    -> Result<Session, AuthError>;

    async fn sign_up_with_metadata(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> Result<Account, AuthError>;

    async fn sign_out(&self, token: &str) -> Result<(), AuthError>;

    /// Create the first super admin. Fails with `AlreadyInitialized` once the
    /// system has one; the flag and the account are written together.
    async fn create_initial_admin(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> Result<Profile, AuthError>;

    /// All profiles, newest first.
    async fn list_profiles(&self) -> Result<Vec<Profile>, AuthError>;

    /// Create an account with any role. Requires the service credential.
    async fn admin_create_user(
        &self,
        service_key: &SecretString,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> Result<Profile, AuthError>;
}

/// Read the system initialization flag. A missing row counts as false.
pub async fn is_system_initialized(provider: &dyn IdentityProvider) -> Result<bool, AuthError> {
    let value = provider
        .get_config_flag(config_keys::SYSTEM_INITIALIZED)
        .await?;
    Ok(matches!(value, Some(serde_json::Value::Bool(true))))
}

/// libSQL-backed identity provider.
pub struct LocalIdentityProvider {
    db: Arc<dyn Database>,
    events: broadcast::Sender<AuthEvent>,
    session_ttl: Duration,
    bcrypt_cost: u32,
    service_role_key: SecretString,
}

impl LocalIdentityProvider {
    pub fn new(db: Arc<dyn Database>, session_ttl: Duration, service_role_key: SecretString) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            db,
            events,
            session_ttl,
            bcrypt_cost: BCRYPT_COST,
            service_role_key,
        }
    }

    /// Override the bcrypt cost (tests use the minimum).
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    fn emit(&self, event: AuthEvent) {
        // No listeners is fine.
        let _ = self.events.send(event);
    }

    async fn new_account(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> Result<NewAccount, AuthError> {
        let password_hash =
            crypto::hash_password_blocking(password.to_string(), self.bcrypt_cost).await?;
        Ok(NewAccount {
            id: Uuid::new_v4(),
            email: email.trim().to_lowercase(),
            password_hash,
            metadata,
        })
    }

    async fn insert(&self, account: NewAccount) -> Result<Profile, AuthError> {
        match self.db.insert_account(&account).await {
            Ok(profile) => Ok(profile),
            Err(DatabaseError::Constraint(_)) => Err(AuthError::EmailTaken(account.email)),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn current_session(&self, token: &str) -> Result<Option<(Account, Session)>, AuthError> {
        let Some(session) = self.db.get_session(token).await? else {
            return Ok(None);
        };
        if session.is_expired() {
            debug!(account_id = %session.account_id, "Session expired");
            self.db.delete_session(token).await?;
            return Ok(None);
        }
        let Some(profile) = self.db.get_profile(session.account_id).await? else {
            warn!(account_id = %session.account_id, "Session for unknown account");
            return Ok(None);
        };
        Ok(Some((profile.account(), session)))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn get_profile(&self, account_id: Uuid) -> Result<Profile, AuthError> {
        self.db
            .get_profile(account_id)
            .await?
            .ok_or_else(|| AuthError::ProfileNotFound(account_id.to_string()))
    }

    async fn update_profile(
        &self,
        account_id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<Profile, AuthError> {
        let profile = self
            .db
            .update_profile(account_id, update)
            .await?
            .ok_or_else(|| AuthError::ProfileNotFound(account_id.to_string()))?;
        self.emit(AuthEvent::ProfileUpdated { account_id });
        Ok(profile)
    }

    async fn append_activity_log(
        &self,
        account_id: Uuid,
        action: &str,
        details: serde_json::Value,
    ) -> Result<(), AuthError> {
        let entry = ActivityEntry::new(account_id, action, details);
        self.db.append_activity(&entry).await?;
        Ok(())
    }

    async fn get_config_flag(&self, key: &str) -> Result<Option<serde_json::Value>, AuthError> {
        Ok(self.db.get_config(key).await?)
    }

    async fn set_config_flag(&self, key: &str, value: serde_json::Value) -> Result<(), AuthError> {
        if key == config_keys::SYSTEM_INITIALIZED {
            // Only account creation moves this flag.
            return Err(AuthError::Forbidden {
                action: format!("alterar {key}"),
            });
        }
        self.db.set_config(key, &value).await?;
        Ok(())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let email = email.trim();
        let Some(creds) = self.db.get_credentials(email).await? else {
            debug!(email = %email, "Sign-in for unknown email");
            return Err(AuthError::InvalidCredentials);
        };
        let verified =
            crypto::verify_password_blocking(password.to_string(), creds.password_hash).await?;
        if !verified {
            debug!(account_id = %creds.account_id, "Sign-in with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let session = Session::new(creds.account_id, self.session_ttl);
        self.db.create_session(&session).await?;
        info!(account_id = %creds.account_id, "User signed in");
        self.emit(AuthEvent::SignedIn {
            account_id: creds.account_id,
        });
        Ok(session)
    }

    async fn sign_up_with_metadata(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> Result<Account, AuthError> {
        let initialization = SystemInitialization::new(is_system_initialized(self).await?);
        if initialization.would_initialize(metadata.role) {
            let profile = self.create_initial_admin(email, password, metadata).await?;
            return Ok(profile.account());
        }

        let account = self.new_account(email, password, metadata).await?;
        let profile = self.insert(account).await?;
        info!(account_id = %profile.id, role = %profile.role, "Account signed up");
        Ok(profile.account())
    }

    async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        let Some(session) = self.db.get_session(token).await? else {
            return Ok(());
        };
        self.db.delete_session(token).await?;
        info!(account_id = %session.account_id, "User signed out");
        self.emit(AuthEvent::SignedOut {
            account_id: session.account_id,
        });
        Ok(())
    }

    async fn create_initial_admin(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> Result<Profile, AuthError> {
        let metadata = SignUpMetadata {
            role: Role::SuperAdmin,
            ..metadata
        };
        let account = self.new_account(email, password, metadata).await?;
        match self.db.insert_initial_admin(&account).await {
            Ok(Some(profile)) => Ok(profile),
            Ok(None) => Err(AuthError::AlreadyInitialized),
            Err(DatabaseError::Constraint(_)) => Err(AuthError::EmailTaken(account.email)),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>, AuthError> {
        Ok(self.db.list_profiles().await?)
    }

    async fn admin_create_user(
        &self,
        service_key: &SecretString,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> Result<Profile, AuthError> {
        if service_key.expose_secret() != self.service_role_key.expose_secret() {
            warn!("Privileged user creation with a bad service key");
            return Err(AuthError::Forbidden {
                action: "criar usuários".into(),
            });
        }
        let account = self.new_account(email, password, metadata).await?;
        self.insert(account).await
    }
}

/// Periodically purge expired sessions.
pub fn spawn_session_sweep(db: Arc<dyn Database>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = db.delete_expired_sessions().await {
                warn!(error = %e, "Session sweep failed");
            }
        }
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::access::Role;
    use crate::store::LibSqlBackend;

    pub(crate) const SERVICE_KEY: &str = "service-role-test-key";

    pub(crate) async fn test_provider() -> LocalIdentityProvider {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        LocalIdentityProvider::new(
            db,
            Duration::from_secs(3600),
            SecretString::from(SERVICE_KEY),
        )
        .with_bcrypt_cost(4)
    }

    pub(crate) fn metadata(name: &str, role: Role) -> SignUpMetadata {
        SignUpMetadata {
            full_name: name.to_string(),
            role,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let provider = test_provider().await;
        let mut events = provider.subscribe();

        let account = provider
            .sign_up_with_metadata(" Ana@Efika.com.br ", "Senha123", metadata("Ana", Role::Corretor))
            .await
            .unwrap();
        assert_eq!(account.email, "ana@efika.com.br");

        let session = provider
            .sign_in_with_password("ana@efika.com.br", "Senha123")
            .await
            .unwrap();
        assert_eq!(session.account_id, account.id);
        assert_eq!(
            events.recv().await.unwrap(),
            AuthEvent::SignedIn { account_id: account.id }
        );

        let (current, _) = provider.current_session(&session.id).await.unwrap().unwrap();
        assert_eq!(current, account);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_alike() {
        let provider = test_provider().await;
        provider
            .sign_up_with_metadata("bruno@efika.com.br", "Senha123", metadata("Bruno", Role::Admin))
            .await
            .unwrap();

        let wrong = provider.sign_in_with_password("bruno@efika.com.br", "senha123").await;
        let unknown = provider.sign_in_with_password("zz@efika.com.br", "Senha123").await;
        assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));
        assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn duplicate_sign_up_is_email_taken() {
        let provider = test_provider().await;
        provider
            .sign_up_with_metadata("c@efika.com.br", "Senha123", metadata("C", Role::Suporte))
            .await
            .unwrap();
        let err = provider
            .sign_up_with_metadata("C@efika.com.br", "Senha123", metadata("C2", Role::Suporte))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailTaken(email) if email == "c@efika.com.br"));
    }

    #[tokio::test]
    async fn sign_out_invalidates_session() {
        let provider = test_provider().await;
        let account = provider
            .sign_up_with_metadata("d@efika.com.br", "Senha123", metadata("D", Role::Admin))
            .await
            .unwrap();
        let session = provider
            .sign_in_with_password("d@efika.com.br", "Senha123")
            .await
            .unwrap();
        let mut events = provider.subscribe();

        provider.sign_out(&session.id).await.unwrap();
        assert!(provider.current_session(&session.id).await.unwrap().is_none());
        assert_eq!(
            events.recv().await.unwrap(),
            AuthEvent::SignedOut { account_id: account.id }
        );
        // Signing out twice is harmless.
        provider.sign_out(&session.id).await.unwrap();
    }

    #[tokio::test]
    async fn expired_session_resolves_to_none() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let provider = LocalIdentityProvider::new(db.clone(), Duration::ZERO, SecretString::from(SERVICE_KEY))
            .with_bcrypt_cost(4);
        provider
            .sign_up_with_metadata("e@efika.com.br", "Senha123", metadata("E", Role::Admin))
            .await
            .unwrap();
        let session = provider
            .sign_in_with_password("e@efika.com.br", "Senha123")
            .await
            .unwrap();

        assert!(provider.current_session(&session.id).await.unwrap().is_none());
        assert!(db.get_session(&session.id).await.unwrap().is_none(), "expired row removed");
    }

    #[tokio::test]
    async fn session_sweep_purges_expired_rows() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let provider = LocalIdentityProvider::new(db.clone(), Duration::ZERO, SecretString::from(SERVICE_KEY))
            .with_bcrypt_cost(4);
        provider
            .sign_up_with_metadata("s@efika.com.br", "Senha123", metadata("S", Role::Admin))
            .await
            .unwrap();
        let session = provider
            .sign_in_with_password("s@efika.com.br", "Senha123")
            .await
            .unwrap();

        let sweep = spawn_session_sweep(db.clone(), Duration::from_millis(10));
        tokio::time::timeout(Duration::from_secs(2), async {
            while db.get_session(&session.id).await.unwrap().is_some() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        sweep.abort();
    }

    #[tokio::test]
    async fn initial_admin_then_already_initialized() {
        let provider = test_provider().await;
        assert!(!is_system_initialized(&provider).await.unwrap());

        let admin = provider
            .create_initial_admin("root@efika.com.br", "Senha123", metadata("Root", Role::SuperAdmin))
            .await
            .unwrap();
        assert_eq!(admin.role, Role::SuperAdmin);
        assert!(is_system_initialized(&provider).await.unwrap());

        let again = provider
            .create_initial_admin("root2@efika.com.br", "Senha123", metadata("Root", Role::SuperAdmin))
            .await;
        assert!(matches!(again, Err(AuthError::AlreadyInitialized)));
    }

    #[tokio::test]
    async fn super_admin_sign_up_initializes_once() {
        let provider = test_provider().await;
        provider
            .sign_up_with_metadata("early@efika.com.br", "Senha123", metadata("Early", Role::Admin))
            .await
            .unwrap();
        assert!(!is_system_initialized(&provider).await.unwrap());

        provider
            .sign_up_with_metadata("boss@efika.com.br", "Senha123", metadata("Boss", Role::SuperAdmin))
            .await
            .unwrap();
        assert!(is_system_initialized(&provider).await.unwrap());

        // Later super admins are ordinary accounts.
        let later = provider
            .sign_up_with_metadata("boss2@efika.com.br", "Senha123", metadata("Boss 2", Role::SuperAdmin))
            .await
            .unwrap();
        assert_eq!(provider.get_profile(later.id).await.unwrap().role, Role::SuperAdmin);
    }

    #[tokio::test]
    async fn initialization_flag_cannot_be_set_directly() {
        let provider = test_provider().await;
        let err = provider
            .set_config_flag(config_keys::SYSTEM_INITIALIZED, serde_json::json!(true))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Forbidden { .. }));
        assert!(!is_system_initialized(&provider).await.unwrap());

        provider
            .set_config_flag("site_banner", serde_json::json!("Promoção"))
            .await
            .unwrap();
        assert_eq!(
            provider.get_config_flag("site_banner").await.unwrap(),
            Some(serde_json::json!("Promoção"))
        );
    }

    #[tokio::test]
    async fn admin_create_user_checks_service_key() {
        let provider = test_provider().await;
        let bad = provider
            .admin_create_user(
                &SecretString::from("nope"),
                "f@efika.com.br",
                "Senha123",
                metadata("F", Role::Corretor),
            )
            .await;
        assert!(matches!(bad, Err(AuthError::Forbidden { .. })));

        let profile = provider
            .admin_create_user(
                &SecretString::from(SERVICE_KEY),
                "f@efika.com.br",
                "Senha123",
                metadata("F", Role::Corretor),
            )
            .await
            .unwrap();
        assert_eq!(profile.role, Role::Corretor);
    }

    #[tokio::test]
    async fn update_profile_emits_event() {
        let provider = test_provider().await;
        let account = provider
            .sign_up_with_metadata("g@efika.com.br", "Senha123", metadata("G", Role::Suporte))
            .await
            .unwrap();
        let mut events = provider.subscribe();

        let profile = provider
            .update_profile(
                account.id,
                &ProfileUpdate {
                    full_name: Some("Gabriela".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(profile.full_name, "Gabriela");
        assert_eq!(
            events.recv().await.unwrap(),
            AuthEvent::ProfileUpdated { account_id: account.id }
        );

        let missing = provider
            .update_profile(Uuid::new_v4(), &ProfileUpdate::default())
            .await;
        assert!(matches!(missing, Err(AuthError::ProfileNotFound(_))));
    }
}
