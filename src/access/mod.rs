//! Roles, the route access gate, and bootstrap routing.

pub mod bootstrap;
pub mod gate;
pub mod role;

pub use bootstrap::{
    Destination, SystemInitialization, landing_destination, login_destination, setup_destination,
};
pub use gate::{ADMIN_AREA, AuthState, Decision, RouteGuard, USER_MANAGEMENT, authorize};
pub use role::Role;
