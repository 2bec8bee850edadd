//! User and role management endpoints.

use std::str::FromStr as _;

use anyhow::{anyhow, Context as _};
use axum::{
    extract::{Path, State},
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::require_moderator;
use crate::auth::AuthenticatedUser;
use crate::db::Db;
use crate::models::{Role, User};
use crate::{AppState, Error, Result};

/// Who am I.
/// - GET `/api/users/me`
async fn me(user: AuthenticatedUser) -> Json<Value> {
    Json(json!({ "success": true, "user": user.user() }))
}

/// List all users. Admin only.
/// - GET `/api/users`
async fn list_users(user: AuthenticatedUser, State(db): State<Db>) -> Result<Json<Value>> {
    require_moderator(&user)?;

    let users = sqlx::query_as::<_, User>(
        "SELECT id, email, display_name, roles, created_at FROM users ORDER BY created_at",
    )
    .fetch_all(&db)
    .await?;

    Ok(Json(json!({ "success": true, "users": users })))
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct UpdateRoles {
    roles: Vec<String>,
}

/// Replace a user's role set. Admin only; every role must come from the
/// closed vocabulary.
/// - PATCH `/api/users/{id}/roles`
async fn update_roles(
    actor: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(input): Json<UpdateRoles>,
) -> Result<Json<Value>> {
    require_moderator(&actor)?;

    if input.roles.is_empty() {
        return Err(Error::validation(anyhow!("roles must not be empty")));
    }
    let mut roles = Vec::with_capacity(input.roles.len());
    for raw in &input.roles {
        let role = Role::from_str(raw).map_err(Error::validation)?;
        if !roles.contains(&role) {
            roles.push(role);
        }
    }
    let roles_json = serde_json::to_string(&roles).context("failed to encode roles")?;

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET roles = ?
            WHERE id = ?
            RETURNING id, email, display_name, roles, created_at
        "#,
    )
    .bind(&roles_json)
    .bind(&id)
    .fetch_optional(&db)
    .await?
    .ok_or_else(|| Error::not_found(anyhow!("user not found")))?;

    Ok(Json(json!({ "success": true, "user": user })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(me))
        .route("/users", get(list_users))
        .route("/users/{id}/roles", patch(update_roles))
}
