//! HTTP/WebSocket surface for the site and the back office.

pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use secrecy::SecretString;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::auth::{IdentityProvider, UserAdmin};
use crate::chatbot::{ChatRouteState, Pacing, chat_routes};
use crate::leads::{LeadSink, StoreLeadSink};
use crate::store::Database;

pub use error::ApiError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn IdentityProvider>,
    pub admin: Arc<UserAdmin>,
    pub db: Arc<dyn Database>,
    pub leads: Arc<dyn LeadSink>,
}

impl AppState {
    pub fn new(
        db: Arc<dyn Database>,
        provider: Arc<dyn IdentityProvider>,
        service_role_key: SecretString,
    ) -> Self {
        let admin = Arc::new(UserAdmin::new(provider.clone(), service_role_key));
        let leads: Arc<dyn LeadSink> = Arc::new(StoreLeadSink::new(db.clone()));
        Self {
            provider,
            admin,
            db,
            leads,
        }
    }
}

/// CORS for the browser front end. `None` allows any origin.
pub fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let allow_origin = match origin.map(str::parse::<HeaderValue>) {
        Some(Ok(value)) => AllowOrigin::exact(value),
        Some(Err(e)) => {
            warn!(error = %e, "Invalid CORS origin, allowing any");
            AllowOrigin::any()
        }
        None => AllowOrigin::any(),
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(60 * 60))
}

/// Build the full router: REST API plus the chat WebSocket.
pub fn app_router(state: AppState, pacing: Pacing, cors_origin: Option<&str>) -> Router {
    let chat = chat_routes(ChatRouteState {
        pacing,
        sink: Some(state.leads.clone()),
    });

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/bootstrap", get(routes::bootstrap))
        .route("/api/setup", get(routes::setup_status).post(routes::setup))
        .route(
            "/api/auth/login",
            get(routes::login_status).post(routes::login),
        )
        .route("/api/auth/logout", post(routes::logout))
        .route("/api/auth/me", get(routes::me))
        .route("/api/admin/dashboard", get(routes::dashboard))
        .route(
            "/api/admin/users",
            get(routes::list_users).post(routes::create_user),
        )
        .route(
            "/api/admin/users/{id}/toggle-active",
            post(routes::toggle_active),
        )
        .route("/api/contact", post(routes::contact))
        .with_state(state)
        .merge(chat)
        .layer(cors_layer(cors_origin))
}
