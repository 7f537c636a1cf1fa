//! Where to send a visitor, and the one-way system initialization flag.

use serde::Serialize;

use super::role::Role;

/// A page the UI shell should show or redirect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Landing,
    Setup,
    Login,
    Dashboard,
}

impl Destination {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Landing => "/",
            Self::Setup => "/setup",
            Self::Login => "/login",
            Self::Dashboard => "/admin",
        }
    }
}

/// Entry point for a visitor.
pub fn landing_destination(system_initialized: bool, user_present: bool) -> Destination {
    match (system_initialized, user_present) {
        (false, _) => Destination::Setup,
        (true, true) => Destination::Dashboard,
        (true, false) => Destination::Landing,
    }
}

/// What the setup page does: show the wizard, or send to sign-in once the
/// system has its first administrator.
pub fn setup_destination(system_initialized: bool) -> Destination {
    if system_initialized {
        Destination::Login
    } else {
        Destination::Setup
    }
}

/// What the sign-in page does when someone is already signed in.
pub fn login_destination(user_present: bool) -> Destination {
    if user_present {
        Destination::Dashboard
    } else {
        Destination::Login
    }
}

/// The system initialization flag as a guarded, one-way transition.
///
/// The flag goes from `false` to `true` only when a super admin is created,
/// and never goes back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SystemInitialization {
    initialized: bool,
}

impl SystemInitialization {
    pub fn new(initialized: bool) -> Self {
        Self { initialized }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether creating an account with `role` would flip the flag.
    pub fn would_initialize(&self, role: Role) -> bool {
        !self.initialized && role == Role::SuperAdmin
    }

    /// Record that an account with `role` was created. Returns true if this
    /// call flipped the flag.
    pub fn on_account_created(&mut self, role: Role) -> bool {
        if self.would_initialize(role) {
            self.initialized = true;
            true
        } else {
            false
        }
    }
}
