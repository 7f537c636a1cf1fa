//! Back-office user management.

use std::sync::Arc;

use secrecy::SecretString;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::model::{Profile, ProfileUpdate, SignUpMetadata};
use super::provider::IdentityProvider;
use super::setup::digits_only;
use crate::access::Role;
use crate::error::AuthError;

/// Request body for creating a back-office user.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "senha")]
    pub password: Option<String>,
    #[serde(default, alias = "nome_completo")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub cpf: Option<String>,
    #[serde(default, alias = "telefone")]
    pub phone: Option<String>,
}

/// Filters for the user list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

impl UserFilter {
    fn matches(&self, profile: &Profile) -> bool {
        if let Some(role) = self.role {
            if profile.role != role {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(term) => {
                let term = term.to_lowercase();
                profile.full_name.to_lowercase().contains(&term)
                    || profile.email.to_lowercase().contains(&term)
            }
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// User management operations. Holds the service credential for the
/// privileged create and never hands it out.
pub struct UserAdmin {
    provider: Arc<dyn IdentityProvider>,
    service_key: SecretString,
}

impl UserAdmin {
    pub fn new(provider: Arc<dyn IdentityProvider>, service_key: SecretString) -> Self {
        Self {
            provider,
            service_key,
        }
    }

    /// Profiles matching `filter`, newest first.
    pub async fn list_users(&self, filter: &UserFilter) -> Result<Vec<Profile>, AuthError> {
        let profiles = self.provider.list_profiles().await?;
        Ok(profiles.into_iter().filter(|p| filter.matches(p)).collect())
    }

    /// Flip a user's active flag.
    pub async fn toggle_active(&self, caller: &Profile, user_id: Uuid) -> Result<Profile, AuthError> {
        ensure_can_manage(caller)?;
        let current = self.provider.get_profile(user_id).await?;
        let update = ProfileUpdate {
            is_active: Some(!current.is_active),
            ..Default::default()
        };
        let profile = self.provider.update_profile(user_id, &update).await?;
        info!(
            user_id = %user_id,
            by = %caller.id,
            is_active = profile.is_active,
            "User active flag changed"
        );
        Ok(profile)
    }

    /// Create a user with any role on behalf of `caller`.
    pub async fn create_user(
        &self,
        caller: &Profile,
        request: CreateUserRequest,
    ) -> Result<Profile, AuthError> {
        ensure_can_manage(caller)?;

        let (Some(email), Some(password), Some(full_name), Some(role)) = (
            non_blank(request.email.as_deref()),
            request.password.as_deref().filter(|p| !p.is_empty()),
            non_blank(request.full_name.as_deref()),
            request.role,
        ) else {
            return Err(AuthError::MissingFields);
        };

        let metadata = SignUpMetadata {
            full_name: full_name.to_string(),
            role,
            cpf: request.cpf.as_deref().map(digits_only).filter(|v| !v.is_empty()),
            phone: request.phone.as_deref().map(digits_only).filter(|v| !v.is_empty()),
            created_by: Some(caller.id),
        };
        let profile = self
            .provider
            .admin_create_user(&self.service_key, email, password, metadata)
            .await?;
        info!(user_id = %profile.id, role = %profile.role, by = %caller.id, "User created");
        Ok(profile)
    }
}

fn ensure_can_manage(caller: &Profile) -> Result<(), AuthError> {
    if caller.is_active && caller.role.can_manage_users() {
        Ok(())
    } else {
        Err(AuthError::Forbidden {
            action: "gerenciar usuários".into(),
        })
    }
}
