//! Giveaway endpoints, including the entry flow.

use anyhow::{anyhow, Context as _};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::DateTime;
use metrics::counter;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::QueryBuilder;
use uuid::Uuid;

use super::{can_mutate, is_unique_violation, require_moderator, required};
use crate::auth::AuthenticatedUser;
use crate::db::Db;
use crate::metrics::{
    GIVEAWAY_ENTRIES, MODERATION_APPROVED, MODERATION_REJECTED, SUBMISSION_AUTO_APPROVED,
    SUBMISSION_GIVEAWAY,
};
use crate::models::{
    Giveaway, GiveawayEntry, GiveawayState, ModerationStatus, GIVEAWAY_SUBMIT_ROLES,
};
use crate::{AppState, Error, Result};

const GIVEAWAY_COLUMNS: &str = "id, title, description, total_value, end_date, max_entries, \
     state, status, rejection_reason, review_notes, reviewed_by, reviewed_at, \
     entries_count, creator_id, creator_email, created_at, updated_at";

fn validate_end_date(raw: &str) -> Result<()> {
    DateTime::parse_from_rfc3339(raw)
        .map(|_| ())
        .map_err(|e| Error::validation(anyhow!("end_date must be RFC 3339: {e}")))
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct CreateGiveaway {
    title: String,
    description: String,
    total_value: f64,
    end_date: String,
    max_entries: Option<i64>,
}

/// Submit a giveaway.
/// - POST `/api/giveaways`
async fn create_giveaway(
    user: AuthenticatedUser,
    State(db): State<Db>,
    Json(input): Json<CreateGiveaway>,
) -> Result<Json<Value>> {
    if !user.has_any(GIVEAWAY_SUBMIT_ROLES) {
        return Err(Error::forbidden(anyhow!(
            "your roles do not allow submitting giveaways"
        )));
    }

    let title = required(&input.title, "title")?;
    let description = required(&input.description, "description")?;
    validate_end_date(&input.end_date)?;
    if !input.total_value.is_finite() || input.total_value < 0.0 {
        return Err(Error::validation(anyhow!("total_value must be non-negative")));
    }
    if input.max_entries.is_some_and(|m| m <= 0) {
        return Err(Error::validation(anyhow!("max_entries must be positive")));
    }

    let status = if user.is_privileged() {
        ModerationStatus::Approved
    } else {
        ModerationStatus::Pending
    };

    let id = Uuid::new_v4().to_string();
    let giveaway = sqlx::query_as::<_, Giveaway>(&format!(
        "INSERT INTO giveaways (id, title, description, total_value, end_date, max_entries, \
             state, status, creator_id, creator_email)
            VALUES (?, ?, ?, ?, ?, ?, 'active', ?, ?, ?)
            RETURNING {GIVEAWAY_COLUMNS}"
    ))
    .bind(&id)
    .bind(title)
    .bind(description)
    .bind(input.total_value)
    .bind(&input.end_date)
    .bind(input.max_entries)
    .bind(status.as_str())
    .bind(&user.id)
    .bind(&user.email)
    .fetch_one(&db)
    .await
    .context("failed to insert giveaway")?;

    counter!(SUBMISSION_GIVEAWAY).increment(1);
    if status == ModerationStatus::Approved {
        counter!(SUBMISSION_AUTO_APPROVED).increment(1);
    }

    Ok(Json(json!({ "success": true, "giveaway": giveaway })))
}

#[derive(Deserialize, Debug, Default)]
struct ListParams {
    #[serde(default)]
    mine: bool,
    status: Option<String>,
}

/// List giveaways. The public view shows approved, active ones.
/// - GET `/api/giveaways`
async fn list_giveaways(
    user: Option<AuthenticatedUser>,
    State(db): State<Db>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>> {
    let giveaways = if params.mine {
        let user = user.ok_or_else(|| Error::unauthenticated(anyhow!("not signed in")))?;
        sqlx::query_as::<_, Giveaway>(&format!(
            "SELECT {GIVEAWAY_COLUMNS} FROM giveaways WHERE creator_id = ? ORDER BY created_at DESC"
        ))
        .bind(&user.id)
        .fetch_all(&db)
        .await?
    } else if let Some(status) = params.status.as_deref() {
        let user = user.ok_or_else(|| Error::unauthenticated(anyhow!("not signed in")))?;
        require_moderator(&user)?;
        sqlx::query_as::<_, Giveaway>(&format!(
            "SELECT {GIVEAWAY_COLUMNS} FROM giveaways WHERE status = ? ORDER BY created_at DESC"
        ))
        .bind(status)
        .fetch_all(&db)
        .await?
    } else {
        sqlx::query_as::<_, Giveaway>(&format!(
            "SELECT {GIVEAWAY_COLUMNS} FROM giveaways
                WHERE status = 'approved' AND state = 'active'
                ORDER BY created_at DESC"
        ))
        .fetch_all(&db)
        .await?
    };

    Ok(Json(json!({ "success": true, "giveaways": giveaways })))
}

async fn fetch_giveaway(db: &Db, id: &str) -> Result<Giveaway> {
    sqlx::query_as::<_, Giveaway>(&format!(
        "SELECT {GIVEAWAY_COLUMNS} FROM giveaways WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| Error::not_found(anyhow!("giveaway not found")))
}

/// Fetch a single giveaway.
/// - GET `/api/giveaways/{id}`
async fn get_giveaway(
    user: Option<AuthenticatedUser>,
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let giveaway = fetch_giveaway(&db, &id).await?;

    if giveaway.status != ModerationStatus::Approved.as_str() {
        let visible = user
            .as_ref()
            .is_some_and(|u| can_mutate(u, &giveaway.creator_id, &giveaway.creator_email));
        if !visible {
            return Err(Error::not_found(anyhow!("giveaway not found")));
        }
    }

    Ok(Json(json!({ "success": true, "giveaway": giveaway })))
}

/// The set of fields an owner may change on a giveaway.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub(super) struct GiveawayPatch {
    title: Option<String>,
    description: Option<String>,
    total_value: Option<f64>,
    end_date: Option<String>,
    max_entries: Option<i64>,
    /// Running state; owners use this to end or cancel early.
    state: Option<GiveawayState>,
}

impl GiveawayPatch {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.total_value.is_none()
            && self.end_date.is_none()
            && self.max_entries.is_none()
            && self.state.is_none()
    }

    fn into_query(self, id: &str) -> Result<QueryBuilder<'static, sqlx::Sqlite>> {
        if self.is_empty() {
            return Err(Error::validation(anyhow!("no updatable fields provided")));
        }

        let mut qb = QueryBuilder::new("UPDATE giveaways SET updated_at = datetime('now')");
        if let Some(title) = self.title {
            let title = required(&title, "title")?.to_owned();
            qb.push(", title = ").push_bind(title);
        }
        if let Some(description) = self.description {
            let description = required(&description, "description")?.to_owned();
            qb.push(", description = ").push_bind(description);
        }
        if let Some(total_value) = self.total_value {
            if !total_value.is_finite() || total_value < 0.0 {
                return Err(Error::validation(anyhow!("total_value must be non-negative")));
            }
            qb.push(", total_value = ").push_bind(total_value);
        }
        if let Some(end_date) = self.end_date {
            validate_end_date(&end_date)?;
            qb.push(", end_date = ").push_bind(end_date);
        }
        if let Some(max_entries) = self.max_entries {
            if max_entries <= 0 {
                return Err(Error::validation(anyhow!("max_entries must be positive")));
            }
            qb.push(", max_entries = ").push_bind(max_entries);
        }
        if let Some(state) = self.state {
            qb.push(", state = ").push_bind(state.as_str());
        }
        qb.push(" WHERE id = ").push_bind(id.to_owned());

        Ok(qb)
    }
}

/// Update one of the caller's giveaways.
/// - PATCH `/api/giveaways/{id}`
async fn update_giveaway(
    user: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(patch): Json<GiveawayPatch>,
) -> Result<Json<Value>> {
    let giveaway = fetch_giveaway(&db, &id).await?;
    if !can_mutate(&user, &giveaway.creator_id, &giveaway.creator_email) {
        return Err(Error::forbidden(anyhow!("you do not own this giveaway")));
    }

    patch
        .into_query(&id)?
        .build()
        .execute(&db)
        .await
        .context("failed to update giveaway")?;

    let giveaway = fetch_giveaway(&db, &id).await?;
    Ok(Json(json!({ "success": true, "giveaway": giveaway })))
}

/// Delete one of the caller's giveaways.
/// - DELETE `/api/giveaways/{id}`
async fn delete_giveaway(
    user: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let giveaway = fetch_giveaway(&db, &id).await?;
    if !can_mutate(&user, &giveaway.creator_id, &giveaway.creator_email) {
        return Err(Error::forbidden(anyhow!("you do not own this giveaway")));
    }

    sqlx::query("DELETE FROM giveaways WHERE id = ?")
        .bind(&id)
        .execute(&db)
        .await
        .context("failed to delete giveaway")?;

    Ok(Json(json!({ "success": true })))
}

#[derive(Deserialize, Debug, Default)]
struct EnterInput {
    #[serde(default)]
    points: i64,
}

/// Enter a giveaway. One entry per user.
/// - POST `/api/giveaways/{id}/enter`
async fn enter_giveaway(
    user: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(input): Json<EnterInput>,
) -> Result<Json<Value>> {
    let points = input.points;
    let giveaway = fetch_giveaway(&db, &id).await?;

    if giveaway.status != ModerationStatus::Approved.as_str()
        || giveaway.state != GiveawayState::Active.as_str()
    {
        return Err(Error::validation(anyhow!("giveaway is not open for entries")));
    }

    // The entry INSERT and the denormalized counter bump run in one
    // transaction, so entries_count always matches the entry rows.
    let mut tx = db.begin().await.context("failed to begin transaction")?;

    let open: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT 1 FROM giveaways
            WHERE id = ?
            AND datetime(end_date) > datetime('now')
            AND (max_entries IS NULL OR entries_count < max_entries)
        "#,
    )
    .bind(&id)
    .fetch_optional(&mut *tx)
    .await?;

    if open.is_none() {
        return Err(Error::validation(anyhow!(
            "giveaway has ended or is full"
        )));
    }

    let entry_id = Uuid::new_v4().to_string();
    let inserted = sqlx::query(
        "INSERT INTO giveaway_entries (id, giveaway_id, user_id, points) VALUES (?, ?, ?, ?)",
    )
    .bind(&entry_id)
    .bind(&id)
    .bind(&user.id)
    .bind(points)
    .execute(&mut *tx)
    .await;

    if let Err(err) = inserted {
        if is_unique_violation(&err) {
            return Err(Error::validation(anyhow!(
                "you have already entered this giveaway"
            )));
        }
        return Err(anyhow::Error::new(err)
            .context("failed to insert giveaway entry")
            .into());
    }

    sqlx::query("UPDATE giveaways SET entries_count = entries_count + 1 WHERE id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await
        .context("failed to bump entries_count")?;

    tx.commit().await.context("failed to commit entry")?;

    counter!(GIVEAWAY_ENTRIES).increment(1);
    Ok(Json(json!({ "success": true, "entry_id": entry_id })))
}

/// Withdraw from a giveaway. Decrements the counter in the same transaction.
/// - DELETE `/api/giveaways/{id}/enter`
async fn withdraw_entry(
    user: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let mut tx = db.begin().await.context("failed to begin transaction")?;

    let deleted = sqlx::query("DELETE FROM giveaway_entries WHERE giveaway_id = ? AND user_id = ?")
        .bind(&id)
        .bind(&user.id)
        .execute(&mut *tx)
        .await
        .context("failed to delete giveaway entry")?;

    if deleted.rows_affected() == 0 {
        return Err(Error::not_found(anyhow!("no entry to withdraw")));
    }

    sqlx::query(
        "UPDATE giveaways SET entries_count = MAX(entries_count - 1, 0) WHERE id = ?",
    )
    .bind(&id)
    .execute(&mut *tx)
    .await
    .context("failed to decrement entries_count")?;

    tx.commit().await.context("failed to commit withdrawal")?;

    Ok(Json(json!({ "success": true })))
}

/// List the entries for a giveaway. Owner and moderators only.
/// - GET `/api/giveaways/{id}/entries`
async fn list_entries(
    user: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let giveaway = fetch_giveaway(&db, &id).await?;
    if !can_mutate(&user, &giveaway.creator_id, &giveaway.creator_email) {
        return Err(Error::forbidden(anyhow!(
            "only the giveaway owner may list entries"
        )));
    }

    let entries = sqlx::query_as::<_, GiveawayEntry>(
        r#"
        SELECT id, giveaway_id, user_id, points, created_at
        FROM giveaway_entries WHERE giveaway_id = ? ORDER BY created_at
        "#,
    )
    .bind(&id)
    .fetch_all(&db)
    .await?;

    Ok(Json(json!({ "success": true, "entries": entries })))
}

#[derive(Deserialize, Debug, Default)]
struct ApproveInput {
    notes: Option<String>,
}

/// Approve a pending giveaway.
/// - POST `/api/giveaways/{id}/approve`
async fn approve_giveaway(
    user: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(input): Json<ApproveInput>,
) -> Result<Json<Value>> {
    require_moderator(&user)?;
    let notes = input.notes;

    let giveaway = fetch_giveaway(&db, &id).await?;
    if giveaway.status != ModerationStatus::Pending.as_str() {
        return Err(Error::validation(anyhow!(
            "giveaway has already been reviewed (status: {})",
            giveaway.status
        )));
    }

    let updated = sqlx::query(
        r#"
        UPDATE giveaways
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
    .context("failed to approve giveaway")?;

    if updated.rows_affected() == 0 {
        return Err(Error::validation(anyhow!(
            "giveaway has already been reviewed"
        )));
    }

    counter!(MODERATION_APPROVED).increment(1);
    let giveaway = fetch_giveaway(&db, &id).await?;
    Ok(Json(json!({ "success": true, "giveaway": giveaway })))
}

#[derive(Deserialize, Debug)]
struct RejectInput {
    reason: String,
    notes: Option<String>,
}

/// Reject a pending giveaway. Requires a reason.
/// - POST `/api/giveaways/{id}/reject`
async fn reject_giveaway(
    user: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(input): Json<RejectInput>,
) -> Result<Json<Value>> {
    require_moderator(&user)?;
    let reason = required(&input.reason, "reason")?;

    let giveaway = fetch_giveaway(&db, &id).await?;
    if giveaway.status != ModerationStatus::Pending.as_str() {
        return Err(Error::validation(anyhow!(
            "giveaway has already been reviewed (status: {})",
            giveaway.status
        )));
    }

    let updated = sqlx::query(
        r#"
        UPDATE giveaways
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
    .context("failed to reject giveaway")?;

    if updated.rows_affected() == 0 {
        return Err(Error::validation(anyhow!(
            "giveaway has already been reviewed"
        )));
    }

    counter!(MODERATION_REJECTED).increment(1);
    let giveaway = fetch_giveaway(&db, &id).await?;
    Ok(Json(json!({ "success": true, "giveaway": giveaway })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/giveaways", post(create_giveaway).get(list_giveaways))
        .route(
            "/giveaways/{id}",
            get(get_giveaway)
                .patch(update_giveaway)
                .delete(delete_giveaway),
        )
        .route(
            "/giveaways/{id}/enter",
            post(enter_giveaway).delete(withdraw_entry),
        )
        .route("/giveaways/{id}/entries", get(list_entries))
        .route("/giveaways/{id}/approve", post(approve_giveaway))
        .route("/giveaways/{id}/reject", post(reject_giveaway))
}
