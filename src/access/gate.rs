//! The access gate: decides what a caller sees on a protected route.

use serde::Serialize;

use super::role::Role;
use crate::auth::model::{Account, Profile, Session};

/// Roles a protected route admits. Empty means any signed-in, active user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteGuard {
    pub path: &'static str,
    pub allowed_roles: &'static [Role],
}

impl RouteGuard {
    pub const fn new(path: &'static str, allowed_roles: &'static [Role]) -> Self {
        Self { path, allowed_roles }
    }

    pub fn admits(&self, role: Role) -> bool {
        self.allowed_roles.is_empty() || self.allowed_roles.contains(&role)
    }
}

/// Dashboard and everything under `/admin`.
pub const ADMIN_AREA: RouteGuard = RouteGuard::new(
    "/admin",
    &[Role::SuperAdmin, Role::Admin, Role::Corretor, Role::Suporte],
);

/// User management.
pub const USER_MANAGEMENT: RouteGuard =
    RouteGuard::new("/admin/users", &[Role::SuperAdmin, Role::Admin]);

/// Outcome of [`authorize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Auth state still resolving; evaluate again once it has.
    Loading,
    RedirectToLogin,
    Deactivated,
    Denied,
    Allow,
}

/// Snapshot of who the caller is, as far as the gate cares.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthState {
    pub loading: bool,
    pub account: Option<Account>,
    #[serde(skip)]
    pub session: Option<Session>,
    pub profile: Option<Profile>,
    pub system_initialized: bool,
}

impl AuthState {
    /// Initial state before anything has been resolved.
    pub fn loading() -> Self {
        Self {
            loading: true,
            ..Default::default()
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.account.is_some()
    }

    pub fn authorize(&self, guard: &RouteGuard) -> Decision {
        authorize(
            !self.loading,
            self.account.as_ref(),
            self.profile.as_ref(),
            guard,
        )
    }
}

/// Evaluate the gate. Checks run in a fixed order and the first match wins:
/// loading, then sign-in, then the active flag, then the role.
pub fn authorize(
    auth_loaded: bool,
    account: Option<&Account>,
    profile: Option<&Profile>,
    guard: &RouteGuard,
) -> Decision {
    if !auth_loaded {
        return Decision::Loading;
    }
    let (Some(_), Some(profile)) = (account, profile) else {
        return Decision::RedirectToLogin;
    };
    if !profile.is_active {
        return Decision::Deactivated;
    }
    if !guard.admits(profile.role) {
        return Decision::Denied;
    }
    Decision::Allow
}
