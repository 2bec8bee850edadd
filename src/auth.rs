//! Session authentication.

use anyhow::anyhow;
use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::header;
use metrics::counter;

use crate::db::Db;
use crate::metrics::AUTH_FAILED;
use crate::models::User;
use crate::{AppState, Error};

/// Name of the session cookie issued by the OAuth callback.
pub const SESSION_COOKIE: &str = "market_session";

/// The user resolved from the request's session cookie.
///
/// Extracting this in a handler makes the route require authentication;
/// requests without a live session are rejected with 401 before the handler
/// body runs.
pub struct AuthenticatedUser(pub User);

impl AuthenticatedUser {
    pub fn user(&self) -> &User {
        &self.0
    }
}

impl std::ops::Deref for AuthenticatedUser {
    type Target = User;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Pull a cookie value out of a `Cookie` header.
fn cookie_value<'h>(header: &'h str, name: &str) -> Option<&'h str> {
    header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name).then_some(v)
    })
}

/// Look up the session token and return the owning user, if the session
/// is still live.
pub async fn resolve_session(db: &Db, token: &str) -> crate::Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT u.id, u.email, u.display_name, u.roles, u.created_at
        FROM sessions s
        JOIN users u ON u.id = s.user_id
        WHERE s.token = ? AND s.expires_at > datetime('now')
        "#,
    )
    .bind(token)
    .fetch_optional(db)
    .await?;

    Ok(user)
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|h| cookie_value(h, SESSION_COOKIE));

        let Some(token) = token else {
            counter!(AUTH_FAILED).increment(1);
            return Err(Error::unauthenticated(anyhow!("not signed in")));
        };

        match resolve_session(&state.db, token).await? {
            Some(user) => Ok(Self(user)),
            None => {
                counter!(AUTH_FAILED).increment(1);
                Err(Error::unauthenticated(anyhow!("session expired or unknown")))
            }
        }
    }
}

impl OptionalFromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> std::result::Result<Option<Self>, Self::Rejection> {
        let token = parts
            .headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|h| cookie_value(h, SESSION_COOKIE));

        // No cookie at all is fine here; the route works anonymously.
        let Some(token) = token else {
            return Ok(None);
        };

        Ok(resolve_session(&state.db, token).await?.map(Self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_value_finds_named_cookie() {
        let h = "theme=dark; market_session=abc123; other=1";
        assert_eq!(cookie_value(h, SESSION_COOKIE), Some("abc123"));
        assert_eq!(cookie_value(h, "theme"), Some("dark"));
        assert_eq!(cookie_value(h, "missing"), None);
    }

    #[test]
    fn cookie_value_ignores_prefix_matches() {
        let h = "market_session_old=zzz; market_session=good";
        assert_eq!(cookie_value(h, SESSION_COOKIE), Some("good"));
    }
}
