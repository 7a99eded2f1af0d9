use crate::Role;

/// Where signed-out users are sent.
pub const LOGIN_ROUTE: &str = "/login";

/// Home route each role lands on after signing in.
pub fn get_redirect_path(role: Role) -> &'static str {
    match role {
        Role::Director => "/dashboard",
        Role::ProjectManager => "/projects",
        Role::SiteEngineer | Role::Employee => "/tasks",
        Role::Client => "/client/dashboard",
        Role::Supplier => "/supplier/tenders",
    }
}
