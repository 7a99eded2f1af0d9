//! Route authorization.
//!
//! The security decision always re-derives from the full, unfiltered policy
//! table plus two fixed rules; the role-pruned tree produced by
//! [`filter_tree_by_role`] is for rendering navigation only.
//!
//! - No IO
//! - No panics
//! - Fail closed: a route no rule matches is denied

use std::collections::BTreeSet;

use serde::Serialize;

use crate::errors::AuthError;
use crate::policy::{AccessNode, AccessPolicy};
use crate::{Constituency, Role};

/// Route every authenticated role may open.
pub const PROFILE_ROUTE: &str = "/profile";

/// Which rule decided an access question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRule {
    /// The shared profile route.
    ProfileRoute,
    /// A portal namespace owned by an external constituency.
    PortalPrefix(Constituency),
    /// An exact node in the policy table.
    PolicyNode,
    /// No rule matched; denied by default.
    NoMatchingNode,
}

/// Detailed, auditable outcome of a route check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub route: String,
    pub role: Role,
    pub granted: bool,
    pub rule: AccessRule,
    pub reason: String,
}

/// Strip query string, fragment and a single trailing slash.
pub fn normalize_route(route: &str) -> &str {
    let end = route.find(['?', '#']).unwrap_or(route.len());
    let path = &route[..end];
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

/// Explain whether `role` may open `route` and which rule decided it.
///
/// Rules, in order:
/// 1. the profile route is open to every role;
/// 2. a portal namespace is open only to its constituency, regardless of the tree;
/// 3. otherwise the exact policy node must list the role (no inheritance);
/// 4. no matching node denies.
pub fn explain_route_access(policy: &AccessPolicy, route: &str, role: Role) -> AccessDecision {
    let path = normalize_route(route);
    let decision = |granted: bool, rule: AccessRule, reason: String| AccessDecision {
        route: path.to_string(),
        role,
        granted,
        rule,
        reason,
    };

    if path == PROFILE_ROUTE {
        return decision(
            true,
            AccessRule::ProfileRoute,
            "the profile page is available to every signed-in role".to_string(),
        );
    }

    if let Some(owner) = Constituency::EXTERNAL.into_iter().find(|c| c.owns_route(path)) {
        let granted = role.constituency() == owner;
        let reason = if granted {
            format!("{role} owns the {owner} portal")
        } else {
            format!(
                "the {owner} portal is reserved for its own accounts; {role} is not one of them"
            )
        };
        return decision(granted, AccessRule::PortalPrefix(owner), reason);
    }

    match policy.find(path) {
        Some(node) if node.permits(role) => decision(
            true,
            AccessRule::PolicyNode,
            format!("'{}' lists {role} among its allowed roles", node.name),
        ),
        Some(node) => decision(
            false,
            AccessRule::PolicyNode,
            format!(
                "'{}' allows only {}",
                node.name,
                node.allowed_roles.iter().map(Role::as_str).collect::<Vec<_>>().join(", ")
            ),
        ),
        None => decision(
            false,
            AccessRule::NoMatchingNode,
            format!("no policy entry exists for '{path}'"),
        ),
    }
}

pub fn is_route_allowed(policy: &AccessPolicy, route: &str, role: Role) -> bool {
    explain_route_access(policy, route, role).granted
}

/// Like [`is_route_allowed`], but a denial is the taxonomy's `permission` error.
pub fn authorize_route(policy: &AccessPolicy, route: &str, role: Role) -> Result<(), AuthError> {
    let decision = explain_route_access(policy, route, role);
    if decision.granted {
        Ok(())
    } else {
        tracing::debug!(route = %decision.route, %role, reason = %decision.reason, "route denied");
        Err(AuthError::permission(&decision.route, role))
    }
}

/// Pruned copy of the policy containing only nodes `role` may open.
///
/// A denied node is dropped together with its subtree: navigation never shows
/// a child without its parent.
pub fn filter_tree_by_role(policy: &AccessPolicy, role: Role) -> AccessPolicy {
    fn prune(nodes: &[AccessNode], role: Role) -> Vec<AccessNode> {
        nodes
            .iter()
            .filter(|node| node.permits(role))
            .map(|node| AccessNode {
                name: node.name.clone(),
                path: node.path.clone(),
                allowed_roles: node.allowed_roles.clone(),
                children: prune(&node.children, role),
            })
            .collect()
    }
    AccessPolicy::new(prune(policy.roots(), role))
}

// ─────────────────────────────────────────────────────────────────────────────
// Route guard
// ─────────────────────────────────────────────────────────────────────────────

/// Result of guarding a route for the current (possibly absent) role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict {
    Allow,
    /// Nobody is signed in.
    RedirectToLogin,
    Deny(AuthError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardOutcome {
    pub verdict: GuardVerdict,
    /// Explicit `required_roles` disagreed with the canonical policy decision.
    pub divergent: bool,
}

/// Per-route wrapper used by routing consumers.
///
/// With `required_roles` set, the decision is made by membership in that set
/// and the canonical policy is consulted only to flag disagreement. Without
/// it, the canonical policy decides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteGuard {
    required_roles: Option<BTreeSet<Role>>,
}

impl RouteGuard {
    pub fn policy_only() -> Self {
        Self::default()
    }

    pub fn requiring(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            required_roles: Some(roles.into_iter().collect()),
        }
    }

    pub fn check(&self, policy: &AccessPolicy, route: &str, role: Option<Role>) -> GuardOutcome {
        let Some(role) = role else {
            return GuardOutcome {
                verdict: GuardVerdict::RedirectToLogin,
                divergent: false,
            };
        };

        let canonical = is_route_allowed(policy, route, role);
        let (granted, divergent) = match &self.required_roles {
            Some(required) => {
                let granted = required.contains(&role);
                (granted, granted != canonical)
            }
            None => (canonical, false),
        };

        if divergent {
            tracing::warn!(
                route = normalize_route(route),
                %role,
                guard_allows = granted,
                policy_allows = canonical,
                "route guard's required roles disagree with the access policy"
            );
        }

        let verdict = if granted {
            GuardVerdict::Allow
        } else {
            GuardVerdict::Deny(AuthError::permission(normalize_route(route), role))
        };
        GuardOutcome { verdict, divergent }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::standard_policy;
    use proptest::prelude::*;

    #[test]
    fn users_page_is_director_only() {
        let policy = standard_policy();
        assert!(!is_route_allowed(&policy, "/users", Role::Employee));
        assert!(is_route_allowed(&policy, "/users", Role::Director));
    }

    #[test]
    fn child_access_is_not_inherited_from_parent() {
        let policy = standard_policy();
        // Employee may open /projects but not its "new" child.
        assert!(is_route_allowed(&policy, "/projects", Role::Employee));
        assert!(!is_route_allowed(&policy, "/projects/new", Role::Employee));
        // ...and a child may be open to a role its parent is not.
        let policy = AccessPolicy::new(vec![
            AccessNode::new("Parent", "/p", [Role::Director])
                .with_children([AccessNode::new("Child", "/p/c", [Role::Employee])]),
        ]);
        assert!(is_route_allowed(&policy, "/p/c", Role::Employee));
        assert!(!is_route_allowed(&policy, "/p", Role::Employee));
    }

    #[test]
    fn profile_route_is_open_to_every_role() {
        let empty = AccessPolicy::default();
        for role in Role::ALL {
            let decision = explain_route_access(&empty, "/profile/", role);
            assert!(decision.granted);
            assert_eq!(decision.rule, AccessRule::ProfileRoute);
        }
    }

    #[test]
    fn portal_prefix_overrides_the_tree() {
        let policy = standard_policy();
        // Not in the tree, but inside the client portal.
        assert!(is_route_allowed(&policy, "/client/invoices/12", Role::Client));
        // In the tree for Client only; Director is still refused by the prefix rule.
        assert!(!is_route_allowed(&policy, "/client/dashboard", Role::Director));
        assert!(!is_route_allowed(&policy, "/supplier/tenders", Role::Client));

        let decision = explain_route_access(&policy, "/supplier/bids", Role::Supplier);
        assert_eq!(decision.rule, AccessRule::PortalPrefix(Constituency::Supplier));
        assert_eq!(decision.reason, "Supplier owns the supplier portal");

        let denied = explain_route_access(&policy, "/client/dashboard", Role::Director);
        assert_eq!(
            denied.reason,
            "the client portal is reserved for its own accounts; Director is not one of them"
        );
    }

    #[test]
    fn route_normalization_ignores_query_fragment_and_trailing_slash() {
        assert_eq!(normalize_route("/tasks/?page=2"), "/tasks");
        assert_eq!(normalize_route("/tasks#top"), "/tasks");
        assert_eq!(normalize_route("/"), "/");
        let policy = standard_policy();
        assert!(is_route_allowed(&policy, "/users/?tab=roles", Role::Director));
    }

    #[test]
    fn unknown_route_explains_fail_closed() {
        let decision = explain_route_access(&standard_policy(), "/payroll", Role::Director);
        assert!(!decision.granted);
        assert_eq!(decision.rule, AccessRule::NoMatchingNode);
    }

    #[test]
    fn authorize_route_raises_permission_error() {
        let err = authorize_route(&standard_policy(), "/settings", Role::SiteEngineer).unwrap_err();
        assert_eq!(err.kind, crate::AuthErrorKind::Permission);
    }

    #[test]
    fn filtered_tree_only_contains_permitted_nodes() {
        let policy = standard_policy();
        let filtered = filter_tree_by_role(&policy, Role::Employee);
        assert!(filtered.iter().all(|node| node.permits(Role::Employee)));
        assert!(filtered.find("/tasks/board").is_some());
        assert!(filtered.find("/projects/new").is_none());
        assert!(filtered.find("/users").is_none());
        // The original table is untouched.
        assert!(policy.find("/users").is_some());
    }

    #[test]
    fn filtered_tree_drops_children_of_denied_parents() {
        let policy = AccessPolicy::new(vec![
            AccessNode::new("Parent", "/p", [Role::Director])
                .with_children([AccessNode::new("Child", "/p/c", [Role::Employee])]),
        ]);
        assert!(filter_tree_by_role(&policy, Role::Employee).is_empty());
    }

    #[test]
    fn guard_without_role_redirects_to_login() {
        let outcome = RouteGuard::policy_only().check(&standard_policy(), "/tasks", None);
        assert_eq!(outcome.verdict, GuardVerdict::RedirectToLogin);
    }

    #[test]
    fn guard_with_required_roles_flags_divergence_from_policy() {
        let policy = standard_policy();
        // Policy says Director only; the wrapper also lets ProjectManager in.
        let guard = RouteGuard::requiring([Role::Director, Role::ProjectManager]);
        let outcome = guard.check(&policy, "/users", Some(Role::ProjectManager));
        assert_eq!(outcome.verdict, GuardVerdict::Allow);
        assert!(outcome.divergent);

        let agreeing = guard.check(&policy, "/users", Some(Role::Director));
        assert_eq!(agreeing.verdict, GuardVerdict::Allow);
        assert!(!agreeing.divergent);
    }

    #[test]
    fn policy_only_guard_denies_with_permission_error() {
        let outcome =
            RouteGuard::policy_only().check(&standard_policy(), "/tenders", Some(Role::Employee));
        match outcome.verdict {
            GuardVerdict::Deny(err) => assert_eq!(err.kind, crate::AuthErrorKind::Permission),
            other => panic!("expected denial, got {other:?}"),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Any route absent from the table (and outside the fixed rules) is denied for every role.
        #[test]
        fn unknown_routes_are_denied(segment in "[a-z]{1,12}", role_idx in 0usize..6) {
            let policy = standard_policy();
            let route = format!("/zz-{segment}");
            prop_assume!(policy.find(&route).is_none());
            prop_assert!(!is_route_allowed(&policy, &route, Role::ALL[role_idx]));
        }
    }
}
