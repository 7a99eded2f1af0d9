//! Access policy table: the static tree of navigable resources.
//!
//! Each node independently declares the roles that may open it; a child is
//! never reachable just because its parent is.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Role;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "allowedRoles")]
    pub allowed_roles: BTreeSet<Role>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<AccessNode>,
}

impl AccessNode {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        roles: impl IntoIterator<Item = Role>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            allowed_roles: roles.into_iter().collect(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = AccessNode>) -> Self {
        self.children = children.into_iter().collect();
        self
    }

    pub fn permits(&self, role: Role) -> bool {
        self.allowed_roles.contains(&role)
    }
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("route '{0}' appears more than once in the policy")]
    DuplicatePath(String),

    #[error("route '{0}' must start with '/'")]
    InvalidPath(String),
}

/// Immutable access policy table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessPolicy {
    roots: Vec<AccessNode>,
}

impl AccessPolicy {
    pub fn new(roots: Vec<AccessNode>) -> Self {
        Self { roots }
    }

    /// Load a policy from its JSON description (an array of root nodes).
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        let policy: AccessPolicy = serde_json::from_str(json)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Every path must be absolute and unique across the whole tree.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let mut seen = HashSet::new();
        for node in self.iter() {
            if !node.path.starts_with('/') {
                return Err(PolicyError::InvalidPath(node.path.clone()));
            }
            if !seen.insert(node.path.as_str()) {
                return Err(PolicyError::DuplicatePath(node.path.clone()));
            }
        }
        Ok(())
    }

    pub fn roots(&self) -> &[AccessNode] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Depth-first search for the node whose path equals `path` exactly.
    pub fn find(&self, path: &str) -> Option<&AccessNode> {
        fn walk<'a>(nodes: &'a [AccessNode], path: &str) -> Option<&'a AccessNode> {
            for node in nodes {
                if node.path == path {
                    return Some(node);
                }
                if let Some(found) = walk(&node.children, path) {
                    return Some(found);
                }
            }
            None
        }
        walk(&self.roots, path)
    }

    /// Pre-order, depth-first iteration over every node.
    pub fn iter(&self) -> impl Iterator<Item = &AccessNode> + '_ {
        let mut stack: Vec<&AccessNode> = self.roots.iter().rev().collect();
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

/// The navigation policy of the construction-management application.
pub fn standard_policy() -> AccessPolicy {
    use Role::*;

    let staff = [Director, ProjectManager, SiteEngineer, Employee];

    AccessPolicy::new(vec![
        AccessNode::new("Dashboard", "/dashboard", staff),
        AccessNode::new("Projects", "/projects", staff).with_children([
            AccessNode::new("New project", "/projects/new", [Director, ProjectManager]),
            AccessNode::new("Project reports", "/projects/reports", [Director, ProjectManager]),
        ]),
        AccessNode::new("Tasks", "/tasks", staff).with_children([AccessNode::new(
            "Task board",
            "/tasks/board",
            [ProjectManager, SiteEngineer, Employee],
        )]),
        AccessNode::new("Tenders", "/tenders", [Director, ProjectManager])
            .with_children([AccessNode::new("Bids", "/tenders/bids", [Director, ProjectManager])]),
        AccessNode::new("Inventory", "/inventory", [Director, ProjectManager, SiteEngineer])
            .with_children([AccessNode::new(
                "Stock movements",
                "/inventory/movements",
                [Director, SiteEngineer],
            )]),
        AccessNode::new("Users", "/users", [Director]),
        AccessNode::new("Settings", "/settings", [Director]),
        AccessNode::new("Client portal", "/client/dashboard", [Client])
            .with_children([AccessNode::new("My projects", "/client/projects", [Client])]),
        AccessNode::new("Supplier portal", "/supplier/tenders", [Supplier])
            .with_children([AccessNode::new("My bids", "/supplier/bids", [Supplier])]),
    ])
}
