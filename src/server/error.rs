//! HTTP error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::access::{Decision, Destination};
use crate::error::{AuthError, DatabaseError, Error, ValidationError};

/// Everything a handler can fail with.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A gate outcome other than `Allow`.
    #[error("Request stopped at the gate: {0:?}")]
    Gate(Decision),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("{0}")]
    BadRequest(String),
}

/// Unwraps the crate error so each kind keeps its own status.
impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::Auth(e) => Self::Auth(e),
            Error::Validation(e) => Self::Validation(e),
            Error::Database(e) => Self::Database(e),
            other => Self::BadRequest(other.to_string()),
        }
    }
}

fn gate_response(decision: Decision) -> Response {
    match decision {
        Decision::RedirectToLogin => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "redirect": Destination::Login.path() })),
        )
            .into_response(),
        Decision::Deactivated => (
            StatusCode::FORBIDDEN,
            Json(json!({
                "view": "account_deactivated",
                "error": "Conta desativada. Entre em contato com o administrador."
            })),
        )
            .into_response(),
        Decision::Denied => (
            StatusCode::FORBIDDEN,
            Json(json!({
                "view": "access_denied",
                "error": "Você não tem permissão para acessar esta página."
            })),
        )
            .into_response(),
        Decision::Loading => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "view": "loading" })),
        )
            .into_response(),
        // Not an error; treated as a server bug if it ever lands here.
        Decision::Allow => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn auth_status(e: &AuthError) -> StatusCode {
    match e {
        AuthError::InvalidCredentials
        | AuthError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        AuthError::ProfileNotFound(_) => StatusCode::NOT_FOUND,
        AuthError::EmailTaken(_) | AuthError::AlreadyInitialized => StatusCode::CONFLICT,
        AuthError::Forbidden { .. } => StatusCode::FORBIDDEN,
        AuthError::MissingFields => StatusCode::BAD_REQUEST,
        AuthError::Hashing(_) | AuthError::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Gate(decision) => gate_response(decision),
            ApiError::Validation(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": "Dados inválidos", "fields": e.fields })),
            )
                .into_response(),
            ApiError::Auth(e) => {
                let status = auth_status(&e);
                if status.is_server_error() {
                    tracing::error!(error = %e, "Identity provider failure");
                }
                (status, Json(json!({ "error": e.to_string() }))).into_response()
            }
            ApiError::Database(e) => {
                tracing::error!(error = %e, "Store failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": e.to_string() })),
                )
                    .into_response()
            }
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
        }
    }
}
