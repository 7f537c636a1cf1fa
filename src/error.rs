//! Error types for the Efika site backend.

use std::collections::BTreeMap;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors returned by the identity provider and the flows built on it.
///
/// The display text is what the UI shows, so it is kept user-facing.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Credenciais inválidas")]
    InvalidCredentials,

    #[error("Usuário não autenticado")]
    NotAuthenticated,

    #[error("Perfil não encontrado: {0}")]
    ProfileNotFound(String),

    #[error("E-mail já cadastrado: {0}")]
    EmailTaken(String),

    #[error("Sistema já inicializado")]
    AlreadyInitialized,

    #[error("Permissão insuficiente para {action}")]
    Forbidden { action: String },

    #[error("Campos obrigatórios ausentes.")]
    MissingFields,

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Provider failure: {0}")]
    Provider(#[from] DatabaseError),
}

/// Conversation errors. Only `LeadNotStored` follows a state change.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("Chat session is closed")]
    Closed,

    #[error("Quick reply not offered in step {step}: {option}")]
    QuickReplyUnavailable { step: String, option: String },

    /// The lead sink refused a completed lead; carries its message as is.
    #[error("{0}")]
    LeadNotStored(String),
}

/// Field-level validation failures, reported together.
#[derive(Debug, Clone, Default, thiserror::Error, PartialEq, Eq)]
#[error("Invalid fields: {}", .fields.keys().cloned().collect::<Vec<_>>().join(", "))]
pub struct ValidationError {
    /// Field name → user-facing message.
    pub fields: BTreeMap<String, String>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for `field`. The first message per field wins.
    pub fn add(&mut self, field: &str, message: &str) {
        self.fields
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> std::result::Result<(), ValidationError> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
