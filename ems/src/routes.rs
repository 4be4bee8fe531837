//! Boundary redirect rules applied before any page is served.

use crate::session::Redirect;
use crate::token::CookieSettings;

pub const LOGIN_ROUTE: &str = "/login";
pub const REGISTER_ROUTE: &str = "/register";
pub const DASHBOARD_ROUTE: &str = "/dashboard";
pub const ADMIN_ROUTE: &str = "/admin";

const AUTH_ROUTES: [&str; 2] = [LOGIN_ROUTE, REGISTER_ROUTE];
const PROTECTED_PREFIXES: [&str; 2] = [DASHBOARD_ROUTE, ADMIN_ROUTE];

/// What to do with an incoming navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Continue,
    Redirect(Redirect),
}

pub fn is_auth_route(path: &str) -> bool {
    AUTH_ROUTES.contains(&path)
}

/// `/dashboard`, `/admin` and anything below them.
pub fn is_protected(path: &str) -> bool {
    PROTECTED_PREFIXES.iter().any(|prefix| {
        path.strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}

/// Decides whether a navigation to `path` may proceed.
///
/// Protected pages without a token go to the login page, which gets the
/// original path as `next`. Login and registration pages with a token go to
/// the dashboard.
pub fn gate(path: &str, has_token: bool) -> RouteDecision {
    if !has_token && is_protected(path) {
        let location = format!("{LOGIN_ROUTE}?next={}", urlencoding::encode(path));
        return RouteDecision::Redirect(Redirect::to(location));
    }
    if has_token && is_auth_route(path) {
        return RouteDecision::Redirect(Redirect::dashboard());
    }
    RouteDecision::Continue
}

/// Builds an `Authorization` value from the session cookie in a raw `Cookie`
/// header.
pub fn bearer_from_cookie_header(header: Option<&str>, settings: &CookieSettings) -> Option<String> {
    let token = settings.find_in_header(header?)?;
    Some(format!("Bearer {token}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protected_pages_need_a_token() {
        assert_eq!(
            gate("/dashboard", false),
            RouteDecision::Redirect(Redirect::to("/login?next=%2Fdashboard"))
        );
        assert_eq!(
            gate("/admin/users", false),
            RouteDecision::Redirect(Redirect::to("/login?next=%2Fadmin%2Fusers"))
        );
        assert_eq!(gate("/dashboard", true), RouteDecision::Continue);
    }

    #[test]
    fn auth_pages_bounce_signed_in_users() {
        assert_eq!(
            gate("/login", true),
            RouteDecision::Redirect(Redirect::dashboard())
        );
        assert_eq!(
            gate("/register", true),
            RouteDecision::Redirect(Redirect::dashboard())
        );
        assert_eq!(gate("/login", false), RouteDecision::Continue);
    }

    #[test]
    fn other_paths_pass_through() {
        assert_eq!(gate("/", false), RouteDecision::Continue);
        assert_eq!(gate("/dashboards", false), RouteDecision::Continue);
        assert!(!is_protected("/administrator"));
    }

    #[test]
    fn bearer_from_cookie() {
        let settings = CookieSettings::default();
        assert_eq!(
            bearer_from_cookie_header(Some("a=1; auth_token=xyz"), &settings).as_deref(),
            Some("Bearer xyz")
        );
        assert_eq!(bearer_from_cookie_header(Some("a=1"), &settings), None);
        assert_eq!(bearer_from_cookie_header(None, &settings), None);
    }
}
