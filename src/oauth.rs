//! Sign-in endpoints.
//!
//! Authentication is delegated to an external OAuth provider; this module
//! only drives the authorization-code flow and mints local sessions.

use anyhow::{anyhow, Context as _};
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Router,
};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng as _};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::auth::SESSION_COOKIE;
use crate::config::AppConfig;
use crate::db::Db;
use crate::models::{Role, User};
use crate::{AppState, Error, Result};

/// Cookie carrying the anti-forgery state between /auth/login and /auth/callback.
const STATE_COOKIE: &str = "market_oauth_state";

/// Generate a random alphanumeric token.
fn random_token(len: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Mint a session for the user and return the token to be set as a cookie.
pub async fn create_session(db: &Db, user_id: &str, ttl_secs: i64) -> Result<String> {
    let token = random_token(48);
    let modifier = format!("+{ttl_secs} seconds");

    sqlx::query(
        r#"
        INSERT INTO sessions (token, user_id, expires_at)
            VALUES (?, ?, datetime('now', ?))
        "#,
    )
    .bind(&token)
    .bind(user_id)
    .bind(&modifier)
    .execute(db)
    .await
    .context("failed to create session")?;

    Ok(token)
}

/// Find the user for this email, creating the account on first sign-in.
///
/// The very first account ever created is granted founder and admin so the
/// instance has an operator; everyone else starts as a plain user.
async fn upsert_user(db: &Db, email: &str, display_name: &str) -> Result<User> {
    if let Some(user) = sqlx::query_as::<_, User>(
        "SELECT id, email, display_name, roles, created_at FROM users WHERE email = ?",
    )
    .bind(email)
    .fetch_optional(db)
    .await?
    {
        return Ok(user);
    }

    let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(db)
        .await?;

    let roles = if user_count == 0 {
        info!("bootstrapping first account {email} as founder");
        vec![Role::Founder, Role::Admin]
    } else {
        vec![Role::User]
    };
    let roles_json = serde_json::to_string(&roles).context("failed to encode roles")?;

    let id = Uuid::new_v4().to_string();
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email, display_name, roles)
            VALUES (?, ?, ?, ?)
            RETURNING id, email, display_name, roles, created_at
        "#,
    )
    .bind(&id)
    .bind(email)
    .bind(display_name)
    .bind(&roles_json)
    .fetch_one(db)
    .await
    .context("failed to create user")?;

    Ok(user)
}

fn session_cookie(token: &str, ttl_secs: i64) -> Result<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_secs}"
    ))
    .context("invalid cookie value")
    .map_err(Into::into)
}

/// Start the sign-in flow.
/// - GET `/auth/login`
async fn login(State(config): State<AppConfig>) -> Result<impl IntoResponse> {
    let state = random_token(32);

    let mut url = config.oauth.authorize_url.clone();
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &config.oauth.client_id)
        .append_pair("redirect_uri", config.oauth.redirect_url.as_str())
        .append_pair("scope", "openid email profile")
        .append_pair("state", &state);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&format!(
            "{STATE_COOKIE}={state}; Path=/auth; HttpOnly; SameSite=Lax; Max-Age=600"
        ))
        .context("invalid cookie value")?,
    );

    Ok((headers, Redirect::to(url.as_str())))
}

#[derive(Deserialize, Debug)]
struct CallbackParams {
    code: String,
    state: Option<String>,
}

/// Identity as reported by the provider's userinfo endpoint.
struct ProviderIdentity {
    email: String,
    display_name: String,
}

/// Exchange the authorization code and fetch the caller's identity.
async fn fetch_identity(
    config: &AppConfig,
    client: &reqwest::Client,
    code: &str,
) -> Result<ProviderIdentity> {
    let token: Value = client
        .post(config.oauth.token_url.clone())
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", config.oauth.redirect_url.as_str()),
            ("client_id", &config.oauth.client_id),
            ("client_secret", &config.oauth.client_secret),
        ])
        .send()
        .await
        .context("token exchange request failed")?
        .error_for_status()
        .context("token exchange was refused")?
        .json()
        .await
        .context("token response was not JSON")?;

    let access_token = token
        .get("access_token")
        .and_then(Value::as_str)
        .context("token response missing access_token")?;

    let userinfo: Value = client
        .get(config.oauth.userinfo_url.clone())
        .bearer_auth(access_token)
        .send()
        .await
        .context("userinfo request failed")?
        .error_for_status()
        .context("userinfo request was refused")?
        .json()
        .await
        .context("userinfo response was not JSON")?;

    let email = userinfo
        .get("email")
        .and_then(Value::as_str)
        .context("userinfo missing email")?
        .to_owned();
    let display_name = userinfo
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(&email)
        .to_owned();

    Ok(ProviderIdentity {
        email,
        display_name,
    })
}

/// Provider redirect target.
/// - GET `/auth/callback`
async fn callback(
    State(config): State<AppConfig>,
    State(db): State<Db>,
    State(client): State<reqwest::Client>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<impl IntoResponse> {
    // In test mode the provider round-trip is skipped and the "code" is
    // treated as the email to sign in as. Guarded by the config flag.
    let identity = if config.test {
        ProviderIdentity {
            display_name: params.code.clone(),
            email: params.code.clone(),
        }
    } else {
        let cookie_state = headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|h| {
                h.split(';').find_map(|pair| {
                    let (k, v) = pair.trim().split_once('=')?;
                    (k == STATE_COOKIE).then(|| v.to_owned())
                })
            });

        if params.state.as_deref() != cookie_state.as_deref() || cookie_state.is_none() {
            return Err(Error::unauthenticated(anyhow!("oauth state mismatch")));
        }

        fetch_identity(&config, &client, &params.code).await?
    };

    let user = upsert_user(&db, &identity.email, &identity.display_name).await?;
    let token = create_session(&db, &user.id, config.oauth.session_ttl).await?;

    let mut out = HeaderMap::new();
    out.insert(
        header::SET_COOKIE,
        session_cookie(&token, config.oauth.session_ttl)?,
    );

    Ok((out, Redirect::to("/")))
}

/// End the current session.
/// - POST `/auth/logout`
async fn logout(State(db): State<Db>, headers: HeaderMap) -> Result<impl IntoResponse> {
    let token = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| {
            h.split(';').find_map(|pair| {
                let (k, v) = pair.trim().split_once('=')?;
                (k == SESSION_COOKIE).then(|| v.to_owned())
            })
        });

    if let Some(token) = token {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(&token)
            .execute(&db)
            .await
            .context("failed to delete session")?;
    }

    let mut out = HeaderMap::new();
    out.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&format!(
            "{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"
        ))
        .context("invalid cookie value")?,
    );

    Ok((out, Redirect::to("/")))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", get(login))
        .route("/auth/callback", get(callback))
        .route("/auth/logout", post(logout))
}
