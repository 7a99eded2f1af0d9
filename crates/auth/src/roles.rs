use core::str::FromStr;

use serde::{Deserialize, Serialize};

use sitedesk_core::DomainError;

/// Fixed role tag carried by every user.
///
/// Roles are a closed set: the navigation policy and the portal rules are
/// written against these variants, so an unknown role can never be granted
/// anything by accident.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Director,
    ProjectManager,
    SiteEngineer,
    Employee,
    Client,
    Supplier,
}

/// The population a role belongs to.
///
/// External constituencies own a route namespace (their portal) that is
/// decided by prefix, independently of the navigation policy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constituency {
    Internal,
    Client,
    Supplier,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Director,
        Role::ProjectManager,
        Role::SiteEngineer,
        Role::Employee,
        Role::Client,
        Role::Supplier,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Director => "Director",
            Role::ProjectManager => "ProjectManager",
            Role::SiteEngineer => "SiteEngineer",
            Role::Employee => "Employee",
            Role::Client => "Client",
            Role::Supplier => "Supplier",
        }
    }

    pub fn constituency(&self) -> Constituency {
        match self {
            Role::Client => Constituency::Client,
            Role::Supplier => Constituency::Supplier,
            Role::Director | Role::ProjectManager | Role::SiteEngineer | Role::Employee => {
                Constituency::Internal
            }
        }
    }
}

impl Constituency {
    pub const EXTERNAL: [Constituency; 2] = [Constituency::Client, Constituency::Supplier];

    /// Route namespace owned by an external constituency.
    pub fn portal_prefix(&self) -> Option<&'static str> {
        match self {
            Constituency::Internal => None,
            Constituency::Client => Some("/client"),
            Constituency::Supplier => Some("/supplier"),
        }
    }

    /// Whether `route` lives inside this constituency's portal namespace.
    ///
    /// `/client` and `/client/...` match; `/clients` does not.
    pub fn owns_route(&self, route: &str) -> bool {
        match self.portal_prefix() {
            None => false,
            Some(prefix) => match route.strip_prefix(prefix) {
                Some(rest) => rest.is_empty() || rest.starts_with('/'),
                None => false,
            },
        }
    }
}

impl core::fmt::Display for Constituency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Constituency::Internal => "internal",
            Constituency::Client => "client",
            Constituency::Supplier => "supplier",
        })
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("unknown role '{s}'")))
    }
}
