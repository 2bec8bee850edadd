//! Script marketplace endpoints.

use anyhow::{anyhow, Context as _};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use metrics::counter;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::QueryBuilder;
use uuid::Uuid;

use super::{can_mutate, require_moderator, required};
use crate::auth::AuthenticatedUser;
use crate::db::Db;
use crate::metrics::{
    MODERATION_APPROVED, MODERATION_REJECTED, SUBMISSION_AUTO_APPROVED, SUBMISSION_SCRIPT,
};
use crate::models::{ModerationStatus, Script, SCRIPT_SUBMIT_ROLES};
use crate::{AppState, Error, Result};

const SCRIPT_COLUMNS: &str = "id, title, description, price, cover_url, seller_id, seller_email, \
     status, rejection_reason, review_notes, reviewed_by, reviewed_at, \
     rating_sum, rating_count, created_at, updated_at";

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct CreateScript {
    title: String,
    description: String,
    price: f64,
    cover_url: Option<String>,
}

/// Submit a script for sale.
/// - POST `/api/scripts`
async fn create_script(
    user: AuthenticatedUser,
    State(db): State<Db>,
    Json(input): Json<CreateScript>,
) -> Result<Json<Value>> {
    if !user.has_any(SCRIPT_SUBMIT_ROLES) {
        return Err(Error::forbidden(anyhow!(
            "your roles do not allow submitting scripts"
        )));
    }

    let title = required(&input.title, "title")?;
    let description = required(&input.description, "description")?;
    if !input.price.is_finite() || input.price < 0.0 {
        return Err(Error::validation(anyhow!("price must be non-negative")));
    }

    // Founders and admins skip the moderation queue.
    let status = if user.is_privileged() {
        ModerationStatus::Approved
    } else {
        ModerationStatus::Pending
    };

    let id = Uuid::new_v4().to_string();
    let script = sqlx::query_as::<_, Script>(&format!(
        "INSERT INTO scripts (id, title, description, price, cover_url, seller_id, seller_email, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {SCRIPT_COLUMNS}"
    ))
    .bind(&id)
    .bind(title)
    .bind(description)
    .bind(input.price)
    .bind(&input.cover_url)
    .bind(&user.id)
    .bind(&user.email)
    .bind(status.as_str())
    .fetch_one(&db)
    .await
    .context("failed to insert script")?;

    counter!(SUBMISSION_SCRIPT).increment(1);
    if status == ModerationStatus::Approved {
        counter!(SUBMISSION_AUTO_APPROVED).increment(1);
    }

    Ok(Json(json!({ "success": true, "script": script })))
}

#[derive(Deserialize, Debug, Default)]
struct ListParams {
    /// Return the caller's own submissions regardless of status.
    #[serde(default)]
    mine: bool,
    /// Moderators may filter by status, e.g. to render the review queue.
    status: Option<String>,
}

/// List scripts.
/// - GET `/api/scripts`
async fn list_scripts(
    user: Option<AuthenticatedUser>,
    State(db): State<Db>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>> {
    let scripts = if params.mine {
        let user = user.ok_or_else(|| Error::unauthenticated(anyhow!("not signed in")))?;
        sqlx::query_as::<_, Script>(&format!(
            "SELECT {SCRIPT_COLUMNS} FROM scripts WHERE seller_id = ? ORDER BY created_at DESC"
        ))
        .bind(&user.id)
        .fetch_all(&db)
        .await?
    } else if let Some(status) = params.status.as_deref() {
        let user = user.ok_or_else(|| Error::unauthenticated(anyhow!("not signed in")))?;
        require_moderator(&user)?;
        sqlx::query_as::<_, Script>(&format!(
            "SELECT {SCRIPT_COLUMNS} FROM scripts WHERE status = ? ORDER BY created_at DESC"
        ))
        .bind(status)
        .fetch_all(&db)
        .await?
    } else {
        sqlx::query_as::<_, Script>(&format!(
            "SELECT {SCRIPT_COLUMNS} FROM scripts WHERE status = 'approved' ORDER BY created_at DESC"
        ))
        .fetch_all(&db)
        .await?
    };

    Ok(Json(json!({ "success": true, "scripts": scripts })))
}

async fn fetch_script(db: &Db, id: &str) -> Result<Script> {
    sqlx::query_as::<_, Script>(&format!("SELECT {SCRIPT_COLUMNS} FROM scripts WHERE id = ?"))
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| Error::not_found(anyhow!("script not found")))
}

/// Fetch a single script.
/// - GET `/api/scripts/{id}`
async fn get_script(
    user: Option<AuthenticatedUser>,
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let script = fetch_script(&db, &id).await?;

    // Unapproved scripts are only visible to their owner and to moderators.
    if script.status != ModerationStatus::Approved.as_str() {
        let visible = user
            .as_ref()
            .is_some_and(|u| can_mutate(u, &script.seller_id, &script.seller_email));
        if !visible {
            return Err(Error::not_found(anyhow!("script not found")));
        }
    }

    Ok(Json(json!({ "success": true, "script": script })))
}

/// The set of fields an owner may change on a script. Anything outside this
/// list is rejected rather than silently dropped.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub(super) struct ScriptPatch {
    title: Option<String>,
    description: Option<String>,
    price: Option<f64>,
    cover_url: Option<String>,
}

impl ScriptPatch {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.cover_url.is_none()
    }

    /// Compile the patch into a parameterized UPDATE.
    fn into_query(self, id: &str) -> Result<QueryBuilder<'static, sqlx::Sqlite>> {
        if self.is_empty() {
            return Err(Error::validation(anyhow!("no updatable fields provided")));
        }

        let mut qb = QueryBuilder::new("UPDATE scripts SET updated_at = datetime('now')");
        if let Some(title) = self.title {
            let title = required(&title, "title")?.to_owned();
            qb.push(", title = ").push_bind(title);
        }
        if let Some(description) = self.description {
            let description = required(&description, "description")?.to_owned();
            qb.push(", description = ").push_bind(description);
        }
        if let Some(price) = self.price {
            if !price.is_finite() || price < 0.0 {
                return Err(Error::validation(anyhow!("price must be non-negative")));
            }
            qb.push(", price = ").push_bind(price);
        }
        if let Some(cover_url) = self.cover_url {
            qb.push(", cover_url = ").push_bind(cover_url);
        }
        qb.push(" WHERE id = ").push_bind(id.to_owned());

        Ok(qb)
    }
}

/// Update one of the caller's scripts.
/// - PATCH `/api/scripts/{id}`
async fn update_script(
    user: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(patch): Json<ScriptPatch>,
) -> Result<Json<Value>> {
    let script = fetch_script(&db, &id).await?;
    if !can_mutate(&user, &script.seller_id, &script.seller_email) {
        return Err(Error::forbidden(anyhow!("you do not own this script")));
    }

    patch
        .into_query(&id)?
        .build()
        .execute(&db)
        .await
        .context("failed to update script")?;

    let script = fetch_script(&db, &id).await?;
    Ok(Json(json!({ "success": true, "script": script })))
}

/// Delete one of the caller's scripts.
/// - DELETE `/api/scripts/{id}`
async fn delete_script(
    user: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let script = fetch_script(&db, &id).await?;
    if !can_mutate(&user, &script.seller_id, &script.seller_email) {
        return Err(Error::forbidden(anyhow!("you do not own this script")));
    }

    sqlx::query("DELETE FROM scripts WHERE id = ?")
        .bind(&id)
        .execute(&db)
        .await
        .context("failed to delete script")?;

    Ok(Json(json!({ "success": true })))
}

#[derive(Deserialize, Debug, Default)]
struct ApproveInput {
    notes: Option<String>,
}

/// Approve a pending script.
/// - POST `/api/scripts/{id}/approve`
async fn approve_script(
    user: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(input): Json<ApproveInput>,
) -> Result<Json<Value>> {
    require_moderator(&user)?;
    let notes = input.notes;

    let script = fetch_script(&db, &id).await?;
    if script.status != ModerationStatus::Pending.as_str() {
        return Err(Error::validation(anyhow!(
            "script has already been reviewed (status: {})",
            script.status
        )));
    }

    // Conditional on status so two racing moderators cannot both win.
    let updated = sqlx::query(
        r#"
        UPDATE scripts
            SET status = 'approved', reviewed_by = ?, reviewed_at = datetime('now'),
                review_notes = ?, updated_at = datetime('now')
            WHERE id = ? AND status = 'pending'
        "#,
    )
    .bind(&user.id)
    .bind(&notes)
    .bind(&id)
    .execute(&db)
    .await
    .context("failed to approve script")?;

    if updated.rows_affected() == 0 {
        return Err(Error::validation(anyhow!(
            "script has already been reviewed"
        )));
    }

    counter!(MODERATION_APPROVED).increment(1);
    let script = fetch_script(&db, &id).await?;
    Ok(Json(json!({ "success": true, "script": script })))
}

#[derive(Deserialize, Debug)]
struct RejectInput {
    reason: String,
    notes: Option<String>,
}

/// Reject a pending script. Requires a reason.
/// - POST `/api/scripts/{id}/reject`
async fn reject_script(
    user: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(input): Json<RejectInput>,
) -> Result<Json<Value>> {
    require_moderator(&user)?;
    let reason = required(&input.reason, "reason")?;

    let script = fetch_script(&db, &id).await?;
    if script.status != ModerationStatus::Pending.as_str() {
        return Err(Error::validation(anyhow!(
            "script has already been reviewed (status: {})",
            script.status
        )));
    }

    let updated = sqlx::query(
        r#"
        UPDATE scripts
            SET status = 'rejected', rejection_reason = ?, reviewed_by = ?,
                reviewed_at = datetime('now'), review_notes = ?, updated_at = datetime('now')
            WHERE id = ? AND status = 'pending'
        "#,
    )
    .bind(reason)
    .bind(&user.id)
    .bind(&input.notes)
    .bind(&id)
    .execute(&db)
    .await
    .context("failed to reject script")?;

    if updated.rows_affected() == 0 {
        return Err(Error::validation(anyhow!(
            "script has already been reviewed"
        )));
    }

    counter!(MODERATION_REJECTED).increment(1);
    let script = fetch_script(&db, &id).await?;
    Ok(Json(json!({ "success": true, "script": script })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/scripts", post(create_script).get(list_scripts))
        .route(
            "/scripts/{id}",
            get(get_script)
                .patch(update_script)
                .delete(delete_script),
        )
        .route("/scripts/{id}/approve", post(approve_script))
        .route("/scripts/{id}/reject", post(reject_script))
}
