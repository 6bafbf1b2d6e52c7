//! Route gating.
//!
//! [`decide`] is a pure function of the requested route and whether a token is
//! held. [`Navigator`] wraps it with the session lookup and owns the single
//! pending-redirect slot that forced logouts write into.

use std::sync::{Arc, Mutex, MutexGuard};

use session_store::SessionStore;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Root,
    Login,
    Register,
    Chat,
    Profile,
}

impl Route {
    /// Resolves a location path. Query, fragment, and trailing slashes are ignored.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim()
            .trim_end_matches('/');
        match path {
            "" => Some(Self::Root),
            "/login" => Some(Self::Login),
            "/register" => Some(Self::Register),
            "/chat" => Some(Self::Chat),
            "/profile" => Some(Self::Profile),
            _ => None,
        }
    }

    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Root => "/",
            Self::Login => "/login",
            Self::Register => "/register",
            Self::Chat => "/chat",
            Self::Profile => "/profile",
        }
    }

    /// Whether entering the route requires a token.
    #[must_use]
    pub fn is_protected(self) -> bool {
        matches!(self, Self::Chat | Self::Profile)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    RedirectTo(Route),
}

#[must_use]
pub fn decide(route: Route, authenticated: bool) -> Decision {
    match route {
        Route::Root if authenticated => Decision::RedirectTo(Route::Chat),
        Route::Root => Decision::RedirectTo(Route::Login),
        Route::Login | Route::Register => Decision::Allow,
        Route::Chat | Route::Profile if authenticated => Decision::Allow,
        Route::Chat | Route::Profile => Decision::RedirectTo(Route::Login),
    }
}

/// Like [`decide`], but unknown paths are sent to [`Route::Root`].
#[must_use]
pub fn decide_path(path: &str, authenticated: bool) -> Decision {
    match Route::from_path(path) {
        Some(route) => decide(route, authenticated),
        None => Decision::RedirectTo(Route::Root),
    }
}

#[derive(Debug)]
pub struct Navigator {
    session: Arc<SessionStore>,
    pending_redirect: Mutex<Option<Route>>,
}

impl Navigator {
    #[must_use]
    pub fn new(session: Arc<SessionStore>) -> Self {
        Self {
            session,
            pending_redirect: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn enter(&self, path: &str) -> Decision {
        let decision = decide_path(path, self.session.is_authenticated());
        debug!(path, ?decision, "navigation");
        decision
    }

    pub fn enter_route(&self, route: Route) -> Decision {
        decide(route, self.session.is_authenticated())
    }

    /// Replaces any redirect not yet taken.
    pub fn request_redirect(&self, route: Route) {
        *lock_unpoisoned(&self.pending_redirect) = Some(route);
    }

    #[must_use]
    pub fn pending_redirect(&self) -> Option<Route> {
        *lock_unpoisoned(&self.pending_redirect)
    }

    pub fn take_pending_redirect(&self) -> Option<Route> {
        lock_unpoisoned(&self.pending_redirect).take()
    }

    /// Drops the session after a credential rejection and queues the login redirect.
    pub fn force_logout(&self) {
        let held = self.session.invalidate();
        self.request_redirect(Route::Login);
        warn!(held, "forced logout; redirecting to login");
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_resolve_loosely() {
        assert_eq!(Route::from_path("/"), Some(Route::Root));
        assert_eq!(Route::from_path(""), Some(Route::Root));
        assert_eq!(Route::from_path("/chat/"), Some(Route::Chat));
        assert_eq!(Route::from_path("/login?next=/chat"), Some(Route::Login));
        assert_eq!(Route::from_path("/profile#email"), Some(Route::Profile));
        assert_eq!(Route::from_path("/chats"), None);
    }

    #[test]
    fn route_paths_round_trip() {
        for route in [
            Route::Root,
            Route::Login,
            Route::Register,
            Route::Chat,
            Route::Profile,
        ] {
            assert_eq!(Route::from_path(route.path()), Some(route));
        }
    }
}
