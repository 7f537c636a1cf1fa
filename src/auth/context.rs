//! AuthContext, the caller's auth state as an explicit, observable object.
//!
//! Holds `{loading, account, session, profile, system_initialized}` in a
//! `watch` channel. Long-lived holders can follow provider events with
//! [`AuthContext::watch_provider`]; per-request holders just `restore`.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::model::{Account, AuthEvent, Profile, ProfileUpdate, Session, SignUpMetadata};
use super::provider::{IdentityProvider, is_system_initialized};
use crate::access::{AuthState, Decision, Destination, RouteGuard, landing_destination};
use crate::error::AuthError;

pub struct AuthContext {
    provider: Arc<dyn IdentityProvider>,
    state: watch::Sender<AuthState>,
}

impl AuthContext {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (state, _rx) = watch::channel(AuthState::loading());
        Self { provider, state }
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn session(&self) -> Option<Session> {
        self.state.borrow().session.clone()
    }

    pub fn profile(&self) -> Option<Profile> {
        self.state.borrow().profile.clone()
    }

    pub fn authorize(&self, guard: &RouteGuard) -> Decision {
        self.state.borrow().authorize(guard)
    }

    /// Where this caller should land.
    pub fn bootstrap_destination(&self) -> Destination {
        let state = self.state.borrow();
        landing_destination(state.system_initialized, state.is_signed_in())
    }

    /// Refresh the initialization flag from the provider.
    pub async fn check_system_initialization(&self) -> Result<bool, AuthError> {
        let initialized = is_system_initialized(self.provider.as_ref()).await?;
        self.state
            .send_modify(|state| state.system_initialized = initialized);
        Ok(initialized)
    }

    /// Resolve a bearer token (if any) into account, session, and profile,
    /// then leave the loading state.
    pub async fn restore(&self, token: Option<&str>) -> Result<(), AuthError> {
        let initialized = is_system_initialized(self.provider.as_ref()).await?;
        let resolved = match token {
            Some(token) => self.provider.current_session(token).await?,
            None => None,
        };
        let profile = match &resolved {
            Some((account, _)) => self.load_profile(account).await?,
            None => None,
        };
        let (account, session) = resolved.unzip();

        self.state.send_replace(AuthState {
            loading: false,
            account,
            session,
            profile,
            system_initialized: initialized,
        });
        Ok(())
    }

    /// Sign in with email and password. On success, stamps the last login
    /// and appends a `login` activity entry. If stamping fails the new
    /// session is revoked before the error is returned.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let session = self.provider.sign_in_with_password(email, password).await?;

        let (profile, initialized) = match self.stamp_login(&session).await {
            Ok(stamped) => stamped,
            Err(e) => {
                if let Err(revoke) = self.provider.sign_out(&session.id).await {
                    warn!(error = %revoke, "Failed to revoke session after a failed sign-in");
                }
                return Err(e);
            }
        };

        self.state.send_replace(AuthState {
            loading: false,
            account: Some(profile.account()),
            session: Some(session.clone()),
            profile: Some(profile),
            system_initialized: initialized,
        });
        Ok(session)
    }

    async fn stamp_login(&self, session: &Session) -> Result<(Profile, bool), AuthError> {
        let now = Utc::now();
        let update = ProfileUpdate {
            last_login: Some(now),
            ..Default::default()
        };
        let profile = self
            .provider
            .update_profile(session.account_id, &update)
            .await?;
        self.provider
            .append_activity_log(
                session.account_id,
                "login",
                serde_json::json!({ "timestamp": now.to_rfc3339() }),
            )
            .await?;
        let initialized = is_system_initialized(self.provider.as_ref()).await?;
        Ok((profile, initialized))
    }

    /// Create an account. Does not sign it in.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> Result<Account, AuthError> {
        let account = self
            .provider
            .sign_up_with_metadata(email, password, metadata)
            .await?;
        self.check_system_initialization().await?;
        Ok(account)
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let session = self.session();
        if let Some(session) = session {
            self.provider.sign_out(&session.id).await?;
        }
        self.clear();
        Ok(())
    }

    /// Update the signed-in user's own profile.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile, AuthError> {
        let account_id = self
            .state
            .borrow()
            .account
            .as_ref()
            .map(|a| a.id)
            .ok_or(AuthError::NotAuthenticated)?;
        let profile = self.provider.update_profile(account_id, &update).await?;
        self.state
            .send_modify(|state| state.profile = Some(profile.clone()));
        Ok(profile)
    }

    /// Apply a provider event if it concerns the current account.
    pub async fn handle_event(&self, event: AuthEvent) -> Result<(), AuthError> {
        let current = self.state.borrow().account.as_ref().map(|a| a.id);
        if current != Some(event.account_id()) {
            return Ok(());
        }
        match event {
            AuthEvent::SignedOut { .. } => {
                debug!("Current account signed out elsewhere");
                self.clear();
            }
            AuthEvent::ProfileUpdated { account_id } | AuthEvent::SignedIn { account_id } => {
                let profile = self.provider.get_profile(account_id).await?;
                self.state.send_modify(|state| state.profile = Some(profile));
            }
        }
        Ok(())
    }

    /// Follow provider events until the provider goes away.
    pub fn watch_provider(self: &Arc<Self>) -> JoinHandle<()> {
        let ctx = Arc::clone(self);
        let mut events = self.provider.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Err(e) = ctx.handle_event(event).await {
                            warn!(error = %e, "Failed to apply auth event");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "Auth context lagged behind provider events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn load_profile(&self, account: &Account) -> Result<Option<Profile>, AuthError> {
        match self.provider.get_profile(account.id).await {
            Ok(profile) => Ok(Some(profile)),
            Err(AuthError::ProfileNotFound(_)) => {
                info!(account_id = %account.id, "Signed-in account has no profile");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn clear(&self) {
        self.state.send_modify(|state| {
            state.loading = false;
            state.account = None;
            state.session = None;
            state.profile = None;
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use secrecy::SecretString;
    use uuid::Uuid;

    use super::*;
    use crate::access::{ADMIN_AREA, Role, USER_MANAGEMENT};
    use crate::auth::provider::LocalIdentityProvider;
    use crate::auth::provider::tests::{metadata, test_provider};
    use crate::error::DatabaseError;

    async fn context_with_user(role: Role) -> (Arc<dyn IdentityProvider>, AuthContext) {
        let provider: Arc<dyn IdentityProvider> = Arc::new(test_provider().await);
        provider
            .create_initial_admin("root@efika.com.br", "Senha123", metadata("Root", Role::SuperAdmin))
            .await
            .unwrap();
        if role != Role::SuperAdmin {
            provider
                .sign_up_with_metadata("user@efika.com.br", "Senha123", metadata("User", role))
                .await
                .unwrap();
        }
        let ctx = AuthContext::new(provider.clone());
        (provider, ctx)
    }

    #[tokio::test]
    async fn starts_loading() {
        let provider: Arc<dyn IdentityProvider> = Arc::new(test_provider().await);
        let ctx = AuthContext::new(provider);
        assert_eq!(ctx.authorize(&ADMIN_AREA), Decision::Loading);
        assert!(ctx.snapshot().loading);
    }

    #[tokio::test]
    async fn restore_without_token_redirects_and_routes_to_setup() {
        let provider: Arc<dyn IdentityProvider> = Arc::new(test_provider().await);
        let ctx = AuthContext::new(provider);
        ctx.restore(None).await.unwrap();
        assert_eq!(ctx.authorize(&ADMIN_AREA), Decision::RedirectToLogin);
        assert_eq!(ctx.bootstrap_destination(), Destination::Setup);
    }

    #[tokio::test]
    async fn sign_in_stamps_last_login_and_logs_activity() {
        let (provider, ctx) = context_with_user(Role::Corretor).await;
        let mut rx = ctx.subscribe();

        ctx.sign_in("user@efika.com.br", "Senha123").await.unwrap();
        assert!(rx.has_changed().unwrap());

        let profile = ctx.profile().unwrap();
        assert!(profile.last_login.is_some());
        assert_eq!(ctx.authorize(&ADMIN_AREA), Decision::Allow);
        assert_eq!(ctx.authorize(&USER_MANAGEMENT), Decision::Denied);
        assert_eq!(ctx.bootstrap_destination(), Destination::Dashboard);

        let stored = provider.get_profile(profile.id).await.unwrap();
        assert_eq!(stored.last_login, profile.last_login);
    }

    #[tokio::test]
    async fn failed_sign_in_leaves_state_unchanged() {
        let (_provider, ctx) = context_with_user(Role::Admin).await;
        ctx.restore(None).await.unwrap();
        let before = ctx.snapshot();

        let err = ctx.sign_in("user@efika.com.br", "errada").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert_eq!(ctx.snapshot(), before);
    }

    /// Delegates to a local provider but refuses activity log writes.
    struct ActivityLogDown {
        inner: LocalIdentityProvider,
        issued: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl IdentityProvider for ActivityLogDown {
        async fn current_session(
            &self,
            token: &str,
        ) -> Result<Option<(Account, Session)>, AuthError> {
            self.inner.current_session(token).await
        }

        fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
            self.inner.subscribe()
        }

        async fn get_profile(&self, account_id: Uuid) -> Result<Profile, AuthError> {
            self.inner.get_profile(account_id).await
        }

        async fn update_profile(
            &self,
            account_id: Uuid,
            update: &ProfileUpdate,
        ) -> Result<Profile, AuthError> {
            self.inner.update_profile(account_id, update).await
        }

        async fn append_activity_log(
            &self,
            _account_id: Uuid,
            _action: &str,
            _details: serde_json::Value,
        ) -> Result<(), AuthError> {
            Err(AuthError::Provider(DatabaseError::Query("activity log unavailable".into())))
        }

        async fn get_config_flag(
            &self,
            key: &str,
        ) -> Result<Option<serde_json::Value>, AuthError> {
            self.inner.get_config_flag(key).await
        }

        async fn set_config_flag(
            &self,
            key: &str,
            value: serde_json::Value,
        ) -> Result<(), AuthError> {
            self.inner.set_config_flag(key, value).await
        }

        async fn sign_in_with_password(
            &self,
            email: &str,
            password: &str,
        ) -> Result<Session, AuthError> {
            let session = self.inner.sign_in_with_password(email, password).await?;
            self.issued.lock().unwrap().push(session.id.clone());
            Ok(session)
        }

        async fn sign_up_with_metadata(
            &self,
            email: &str,
            password: &str,
            metadata: SignUpMetadata,
        ) -> Result<Account, AuthError> {
            self.inner.sign_up_with_metadata(email, password, metadata).await
        }

        async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
            self.inner.sign_out(token).await
        }

        async fn create_initial_admin(
            &self,
            email: &str,
            password: &str,
            metadata: SignUpMetadata,
        ) -> Result<Profile, AuthError> {
            self.inner.create_initial_admin(email, password, metadata).await
        }

        async fn list_profiles(&self) -> Result<Vec<Profile>, AuthError> {
            self.inner.list_profiles().await
        }

        async fn admin_create_user(
            &self,
            service_key: &SecretString,
            email: &str,
            password: &str,
            metadata: SignUpMetadata,
        ) -> Result<Profile, AuthError> {
            self.inner
                .admin_create_user(service_key, email, password, metadata)
                .await
        }
    }

    #[tokio::test]
    async fn failed_login_stamp_revokes_the_session() {
        let provider = Arc::new(ActivityLogDown {
            inner: test_provider().await,
            issued: StdMutex::new(Vec::new()),
        });
        provider
            .create_initial_admin("root@efika.com.br", "Senha123", metadata("Root", Role::SuperAdmin))
            .await
            .unwrap();
        let ctx = AuthContext::new(provider.clone());
        ctx.restore(None).await.unwrap();

        let err = ctx.sign_in("root@efika.com.br", "Senha123").await.unwrap_err();
        assert!(matches!(err, AuthError::Provider(_)));
        assert!(!ctx.snapshot().is_signed_in());

        let issued = provider.issued.lock().unwrap().clone();
        assert_eq!(issued.len(), 1);
        assert!(provider.current_session(&issued[0]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn restore_from_token() {
        let (provider, ctx) = context_with_user(Role::Suporte).await;
        let session = ctx.sign_in("user@efika.com.br", "Senha123").await.unwrap();

        let fresh = AuthContext::new(provider);
        fresh.restore(Some(&session.id)).await.unwrap();
        assert_eq!(fresh.profile().unwrap().role, Role::Suporte);
        assert_eq!(fresh.authorize(&ADMIN_AREA), Decision::Allow);

        let stranger = AuthContext::new(fresh.provider.clone());
        stranger.restore(Some("bogus-token")).await.unwrap();
        assert_eq!(stranger.authorize(&ADMIN_AREA), Decision::RedirectToLogin);
        assert_eq!(stranger.bootstrap_destination(), Destination::Landing);
    }

    #[tokio::test]
    async fn deactivated_user_sees_deactivated_view() {
        let (provider, ctx) = context_with_user(Role::SuperAdmin).await;
        ctx.sign_in("root@efika.com.br", "Senha123").await.unwrap();
        let id = ctx.profile().unwrap().id;
        provider
            .update_profile(
                id,
                &ProfileUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let session = ctx.session().unwrap();
        let fresh = AuthContext::new(provider);
        fresh.restore(Some(&session.id)).await.unwrap();
        assert_eq!(fresh.authorize(&USER_MANAGEMENT), Decision::Deactivated);
    }

    #[tokio::test]
    async fn sign_out_clears_state() {
        let (provider, ctx) = context_with_user(Role::Admin).await;
        let session = ctx.sign_in("user@efika.com.br", "Senha123").await.unwrap();
        ctx.sign_out().await.unwrap();

        assert!(ctx.profile().is_none());
        assert_eq!(ctx.authorize(&ADMIN_AREA), Decision::RedirectToLogin);
        assert!(provider.current_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_own_profile_requires_sign_in() {
        let (_provider, ctx) = context_with_user(Role::Admin).await;
        let update = ProfileUpdate {
            phone: Some("11988887777".into()),
            ..Default::default()
        };
        assert!(matches!(
            ctx.update_profile(update.clone()).await,
            Err(AuthError::NotAuthenticated)
        ));

        ctx.sign_in("user@efika.com.br", "Senha123").await.unwrap();
        let profile = ctx.update_profile(update).await.unwrap();
        assert_eq!(profile.phone.as_deref(), Some("11988887777"));
        assert_eq!(ctx.profile().unwrap().phone.as_deref(), Some("11988887777"));
    }

    #[tokio::test]
    async fn provider_events_refresh_current_account_only() {
        let (provider, ctx) = context_with_user(Role::Corretor).await;
        let ctx = Arc::new(ctx);
        ctx.sign_in("user@efika.com.br", "Senha123").await.unwrap();
        let me = ctx.profile().unwrap().id;
        let mut rx = ctx.subscribe();
        let _ = rx.borrow_and_update();
        let watcher = ctx.watch_provider();

        // Someone else's change does not touch this context.
        let root = provider.list_profiles().await.unwrap()
            .into_iter()
            .find(|p| p.role == Role::SuperAdmin)
            .unwrap();
        provider
            .update_profile(root.id, &ProfileUpdate { full_name: Some("Raiz".into()), ..Default::default() })
            .await
            .unwrap();

        // An admin deactivates this account.
        provider
            .update_profile(me, &ProfileUpdate { is_active: Some(false), ..Default::default() })
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(!ctx.profile().unwrap().is_active);
        assert_eq!(ctx.authorize(&ADMIN_AREA), Decision::Deactivated);
        watcher.abort();
    }
}
