//! Authentication: identity provider, auth context, setup wizard, and user
//! management.

pub mod admin;
pub mod context;
pub mod crypto;
pub mod model;
pub mod provider;
pub mod setup;

pub use admin::{CreateUserRequest, UserAdmin, UserFilter};
pub use context::AuthContext;
pub use model::{
    Account, ActivityEntry, AuthEvent, Profile, ProfileUpdate, Session, SignUpMetadata,
};
pub use provider::{
    IdentityProvider, LocalIdentityProvider, is_system_initialized, spawn_session_sweep,
};
pub use setup::{SetupForm, complete_setup};
