//! Back-office roles.

use serde::{Deserialize, Serialize};

/// Access level of a back-office account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Corretor,
    Suporte,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::SuperAdmin, Role::Admin, Role::Corretor, Role::Suporte];

    /// Roles allowed to create and manage other accounts.
    pub fn can_manage_users(&self) -> bool {
        matches!(self, Self::SuperAdmin | Self::Admin)
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::Corretor
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::Corretor => "corretor",
            Self::Suporte => "suporte",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "super_admin" => Ok(Self::SuperAdmin),
            "admin" => Ok(Self::Admin),
            "corretor" => Ok(Self::Corretor),
            "suporte" => Ok(Self::Suporte),
            other => Err(format!("unknown role: {other}")),
        }
    }
}
