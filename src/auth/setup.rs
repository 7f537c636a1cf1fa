//! First-run setup wizard: validates the form and creates the super admin.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tracing::info;

use super::model::{Profile, SignUpMetadata};
use super::provider::IdentityProvider;
use crate::access::Role;
use crate::error::{Error, ValidationError};
use crate::leads::email_pattern;

const MIN_NAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetupForm {
    #[serde(default, alias = "nome_completo")]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub cpf: String,
    #[serde(default, alias = "telefone")]
    pub phone: Option<String>,
    #[serde(default, alias = "senha")]
    pub password: String,
    #[serde(default, alias = "confirmar_senha")]
    pub password_confirmation: String,
}

fn cpf_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d{3}\.\d{3}\.\d{3}-\d{2}|\d{11})$").expect("static cpf regex"))
}

/// Strip everything but ASCII digits.
pub fn digits_only(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn password_problem(password: &str) -> Option<&'static str> {
    if password.is_empty() {
        return Some("Senha é obrigatória");
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Some("Senha deve ter pelo menos 8 caracteres");
    }
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(has_lower && has_upper && has_digit) {
        return Some("Senha deve conter ao menos uma letra minúscula, uma maiúscula e um número");
    }
    None
}

impl SetupForm {
    /// Check every field, reporting all failures together.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();

        let name = self.full_name.trim();
        if name.is_empty() {
            errors.add("full_name", "Nome completo é obrigatório");
        } else if name.chars().count() < MIN_NAME_LEN {
            errors.add("full_name", "Nome deve ter pelo menos 3 caracteres");
        }

        let email = self.email.trim();
        if email.is_empty() {
            errors.add("email", "E-mail é obrigatório");
        } else if !email_pattern().is_match(email) {
            errors.add("email", "E-mail inválido");
        }

        let cpf = self.cpf.trim();
        if cpf.is_empty() {
            errors.add("cpf", "CPF é obrigatório");
        } else if !cpf_pattern().is_match(cpf) {
            errors.add("cpf", "CPF inválido");
        }

        if let Some(problem) = password_problem(&self.password) {
            errors.add("password", problem);
        }
        if self.password_confirmation != self.password {
            errors.add("password_confirmation", "As senhas não coincidem");
        }

        errors.into_result()
    }

    fn metadata(&self) -> SignUpMetadata {
        SignUpMetadata {
            full_name: self.full_name.trim().to_string(),
            role: Role::SuperAdmin,
            cpf: Some(digits_only(&self.cpf)),
            phone: self
                .phone
                .as_deref()
                .map(digits_only)
                .filter(|p| !p.is_empty()),
            created_by: None,
        }
    }
}

/// Validate the form and create the first super admin.
///
/// Fails with [`AuthError::AlreadyInitialized`](crate::error::AuthError)
/// when the system already has one.
pub async fn complete_setup(
    provider: &dyn IdentityProvider,
    form: &SetupForm,
) -> Result<Profile, Error> {
    form.validate()?;
    let profile = provider
        .create_initial_admin(form.email.trim(), &form.password, form.metadata())
        .await?;
    info!(account_id = %profile.id, "System initialized with first super admin");
    Ok(profile)
}
