//! Navigation authorization.
//!
//! Pages that show account data require a session; everything else is
//! public. Unknown paths fall back to the home page.

use super::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    Login,
    Register,
    Dashboard,
    CreateTicket,
}

impl Route {
    pub fn from_path(path: &str) -> Self {
        match path.trim_matches('/') {
            "login" => Route::Login,
            "register" => Route::Register,
            "dashboard" => Route::Dashboard,
            "create-ticket" | "tickets/new" => Route::CreateTicket,
            _ => Route::Home,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Login => "/login",
            Route::Register => "/register",
            Route::Dashboard => "/dashboard",
            Route::CreateTicket => "/create-ticket",
        }
    }

    pub fn requires_session(&self) -> bool {
        matches!(self, Route::Dashboard | Route::CreateTicket)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Allow,
    Redirect(Route),
}

/// Decide whether `route` may be entered with the current session.
pub fn authorize(route: Route, session: &SessionStore) -> Navigation {
    if !route.requires_session() || session.is_authenticated() {
        Navigation::Allow
    } else {
        Navigation::Redirect(Route::Login)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::tests::sample_user;
    use crate::auth::Session;

    #[test]
    fn test_from_path() {
        assert_eq!(Route::from_path("/dashboard"), Route::Dashboard);
        assert_eq!(Route::from_path("login"), Route::Login);
        assert_eq!(Route::from_path("/create-ticket/"), Route::CreateTicket);
        assert_eq!(Route::from_path("/nowhere"), Route::Home);
        assert_eq!(Route::from_path(""), Route::Home);
    }

    #[test]
    fn test_guarded_routes_redirect_without_session() {
        let store = SessionStore::in_memory();
        assert_eq!(authorize(Route::Home, &store), Navigation::Allow);
        assert_eq!(authorize(Route::Login, &store), Navigation::Allow);
        assert_eq!(
            authorize(Route::Dashboard, &store),
            Navigation::Redirect(Route::Login)
        );
        assert_eq!(
            authorize(Route::CreateTicket, &store),
            Navigation::Redirect(Route::Login)
        );
    }

    #[test]
    fn test_guarded_routes_allow_with_session() {
        let store = SessionStore::in_memory();
        store.establish(Session::new(sample_user())).unwrap();
        assert_eq!(authorize(Route::Dashboard, &store), Navigation::Allow);
        assert_eq!(authorize(Route::CreateTicket, &store), Navigation::Allow);
    }
}
