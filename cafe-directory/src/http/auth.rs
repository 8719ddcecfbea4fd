//! Request-scoped identity and the admin-only guard.

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::SignedCookieJar;
use cookie::{Cookie, Key, SameSite};
use tracing::{debug, warn};

use crate::auth::is_admin;
use crate::models::{User, UserSummary};

use super::error::ApiError;
use super::state::AppState;

pub const SESSION_COOKIE: &str = "cafe_session";

/// The user behind the request's session cookie, if any.
#[derive(Debug, Clone, Default)]
pub struct CurrentUser {
    user: Option<User>,
    token: Option<String>,
}

impl CurrentUser {
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn id(&self) -> Option<i64> {
        self.user.as_ref().map(|user| user.id)
    }

    pub fn summary(&self) -> Option<UserSummary> {
        self.user.as_ref().map(UserSummary::from)
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(cached) = parts.extensions.get::<CurrentUser>() {
            return Ok(cached.clone());
        }

        let jar = match SignedCookieJar::<Key>::from_request_parts(parts, state).await {
            Ok(jar) => jar,
            Err(never) => match never {},
        };
        let current = resolve(state, &jar).await?;
        parts.extensions.insert(current.clone());
        Ok(current)
    }
}

async fn resolve(state: &AppState, jar: &SignedCookieJar) -> Result<CurrentUser, ApiError> {
    let Some(token) = jar.get(SESSION_COOKIE).map(|cookie| cookie.value().to_owned()) else {
        return Ok(CurrentUser::default());
    };
    let Some(user_id) = state.sessions.get(&token) else {
        debug!("session cookie does not match a live session");
        return Ok(CurrentUser::default());
    };

    let user = state.with_db(move |db| db.user_by_id(user_id)).await?;
    if user.is_none() {
        warn!(user_id, "session refers to a missing user; dropping it");
        state.sessions.remove(&token);
        return Ok(CurrentUser::default());
    }

    Ok(CurrentUser {
        user,
        token: Some(token),
    })
}

/// Bind a new session to `user` and return the jar carrying its cookie.
/// Any session the request already carried is revoked first.
pub fn login(
    state: &AppState,
    jar: SignedCookieJar,
    current: &CurrentUser,
    user: &User,
) -> SignedCookieJar {
    if let Some(previous) = &current.token {
        debug!(user_id = ?current.id(), "replacing existing session");
        state.sessions.remove(previous);
    }
    let token = state.sessions.create(user.id);
    let mut cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    if let Ok(max_age) = cookie::time::Duration::try_from(state.sessions.ttl()) {
        cookie.set_max_age(max_age);
    }
    jar.add(cookie)
}

pub fn logout(state: &AppState, jar: SignedCookieJar, current: &CurrentUser) -> SignedCookieJar {
    if let Some(token) = &current.token {
        state.sessions.remove(token);
    }
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

/// Route layer that lets only the admin account through.
pub async fn require_admin(
    current: CurrentUser,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if current.user().is_some_and(is_admin) {
        return Ok(next.run(request).await);
    }

    warn!(
        user_id = ?current.id(),
        path = %request.uri().path(),
        "admin-only route refused"
    );
    Err(ApiError::Forbidden)
}
