//! REST endpoints: bootstrap, setup, sign-in, admin area, and contact form.

use axum::extract::{Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::AppState;
use super::error::ApiError;
use crate::access::{
    ADMIN_AREA, Decision, Destination, RouteGuard, USER_MANAGEMENT, login_destination,
    setup_destination,
};
use crate::auth::{
    AuthContext, CreateUserRequest, Profile, Session, SetupForm, UserFilter, complete_setup,
};
use crate::leads::{ContactForm, LeadRecord};

const RECENT_LEADS: usize = 5;

/// Token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// A fresh context for this request, restored from its bearer token.
async fn caller(state: &AppState, headers: &HeaderMap) -> Result<AuthContext, ApiError> {
    let ctx = AuthContext::new(state.provider.clone());
    ctx.restore(bearer_token(headers)).await?;
    Ok(ctx)
}

/// Restore the caller and run the gate. Only `Allow` gets through.
async fn guarded(
    state: &AppState,
    headers: &HeaderMap,
    guard: &RouteGuard,
) -> Result<Profile, ApiError> {
    let ctx = caller(state, headers).await?;
    match (ctx.authorize(guard), ctx.profile()) {
        (Decision::Allow, Some(profile)) => Ok(profile),
        (Decision::Allow, None) => Err(ApiError::Gate(Decision::Denied)),
        (decision, _) => {
            info!(path = guard.path, ?decision, "Request stopped at the gate");
            Err(ApiError::Gate(decision))
        }
    }
}

#[derive(Serialize)]
struct DestinationBody {
    destination: Destination,
    path: &'static str,
}

impl From<Destination> for DestinationBody {
    fn from(destination: Destination) -> Self {
        Self {
            destination,
            path: destination.path(),
        }
    }
}

#[derive(Serialize)]
struct SignedInBody {
    token: String,
    expires_at: DateTime<Utc>,
    profile: Option<Profile>,
    redirect: &'static str,
}

impl SignedInBody {
    fn new(session: Session, profile: Option<Profile>) -> Self {
        Self {
            token: session.id,
            expires_at: session.expires_at,
            profile,
            redirect: Destination::Dashboard.path(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default, alias = "senha")]
    pub password: String,
}

// ── Health ──────────────────────────────────────────────────────────────

pub(super) async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "efika-site"
    }))
}

// ── Bootstrap & setup ───────────────────────────────────────────────────

/// GET /api/bootstrap
pub(super) async fn bootstrap(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = caller(&state, &headers).await?;
    Ok(Json(DestinationBody::from(ctx.bootstrap_destination())))
}

/// GET /api/setup: show the wizard, or send to sign-in once initialized.
pub(super) async fn setup_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = caller(&state, &headers).await?;
    let initialized = ctx.snapshot().system_initialized;
    Ok(Json(DestinationBody::from(setup_destination(initialized))))
}

/// POST /api/setup
pub(super) async fn setup(
    State(state): State<AppState>,
    Json(form): Json<SetupForm>,
) -> Result<impl IntoResponse, ApiError> {
    complete_setup(state.provider.as_ref(), &form).await?;
    let ctx = AuthContext::new(state.provider.clone());
    let session = ctx.sign_in(&form.email, &form.password).await?;
    Ok((
        StatusCode::CREATED,
        Json(SignedInBody::new(session, ctx.profile())),
    ))
}

// ── Session ─────────────────────────────────────────────────────────────

/// GET /api/auth/login: show sign-in, or go to the dashboard when signed in.
pub(super) async fn login_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = caller(&state, &headers).await?;
    let present = ctx.snapshot().is_signed_in();
    Ok(Json(DestinationBody::from(login_destination(present))))
}

/// POST /api/auth/login
pub(super) async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = AuthContext::new(state.provider.clone());
    let session = ctx.sign_in(&body.email, &body.password).await?;
    Ok(Json(SignedInBody::new(session, ctx.profile())))
}

/// POST /api/auth/logout
pub(super) async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = caller(&state, &headers).await?;
    ctx.sign_out().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/auth/me
pub(super) async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = caller(&state, &headers).await?;
    let snapshot = ctx.snapshot();
    if !snapshot.is_signed_in() {
        return Err(ApiError::Gate(Decision::RedirectToLogin));
    }
    Ok(Json(snapshot))
}

// ── Admin area ──────────────────────────────────────────────────────────

/// GET /api/admin/dashboard
pub(super) async fn dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let profile = guarded(&state, &headers, &ADMIN_AREA).await?;
    let users = state.db.list_profiles().await?;
    let active = users.iter().filter(|p| p.is_active).count();
    let recent_leads: Vec<LeadRecord> = state.db.list_leads(RECENT_LEADS).await?;

    Ok(Json(json!({
        "profile": profile,
        "stats": {
            "total_users": users.len(),
            "active_users": active,
        },
        "recent_leads": recent_leads,
    })))
}

/// GET /api/admin/users?search=&role=
pub(super) async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<UserFilter>,
) -> Result<impl IntoResponse, ApiError> {
    guarded(&state, &headers, &USER_MANAGEMENT).await?;
    let users = state.admin.list_users(&filter).await?;
    Ok(Json(json!({ "users": users })))
}

/// POST /api/admin/users
pub(super) async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = guarded(&state, &headers, &USER_MANAGEMENT).await?;
    let user = state.admin.create_user(&caller, body).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /api/admin/users/{id}/toggle-active
pub(super) async fn toggle_active(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = guarded(&state, &headers, &USER_MANAGEMENT).await?;
    let user = state.admin.toggle_active(&caller, id).await?;
    Ok(Json(user))
}

// ── Contact form ────────────────────────────────────────────────────────

/// POST /api/contact
pub(super) async fn contact(
    State(state): State<AppState>,
    Json(form): Json<ContactForm>,
) -> Result<impl IntoResponse, ApiError> {
    let lead = form.into_lead()?;
    let id = lead.id;
    state.leads.submit(lead).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": id,
            "message": "Mensagem enviada com sucesso! Entraremos em contato em breve."
        })),
    ))
}
