//! Advertisement endpoints.

use std::str::FromStr as _;

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
    MODERATION_APPROVED, MODERATION_REJECTED, SUBMISSION_AD, SUBMISSION_AUTO_APPROVED,
};
use crate::models::{Ad, AdCategory, AdStatus, AD_SUBMIT_ROLES, MODERATOR_ROLES};
use crate::{AppState, Error, Result};

const AD_COLUMNS: &str = "id, title, link, image_url, category, status, priority, \
     rejection_reason, review_notes, reviewed_by, reviewed_at, \
     owner_id, owner_email, created_at, updated_at";

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct CreateAd {
    title: String,
    link: String,
    category: AdCategory,
    image_url: Option<String>,
    /// Ranking weight. Only honored for admin/founder submissions.
    priority: Option<i64>,
}

/// Submit an ad.
/// - POST `/api/ads`
async fn create_ad(
    user: AuthenticatedUser,
    State(db): State<Db>,
    Json(input): Json<CreateAd>,
) -> Result<Json<Value>> {
    if !user.has_any(AD_SUBMIT_ROLES) {
        return Err(Error::forbidden(anyhow!(
            "your roles do not allow submitting ads"
        )));
    }

    let title = required(&input.title, "title")?;
    let link = required(&input.link, "link")?;
    url::Url::parse(link).map_err(|e| Error::validation(anyhow!("link must be a URL: {e}")))?;

    // Approved ads go straight to the active state.
    let status = if user.is_privileged() {
        AdStatus::Active
    } else {
        AdStatus::Pending
    };
    // Priority is a ranking knob for operators, not submitters.
    let priority = if user.is_privileged() {
        input.priority.unwrap_or(0)
    } else {
        0
    };

    let id = Uuid::new_v4().to_string();
    let ad = sqlx::query_as::<_, Ad>(&format!(
        "INSERT INTO ads (id, title, link, image_url, category, status, priority, owner_id, owner_email)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {AD_COLUMNS}"
    ))
    .bind(&id)
    .bind(title)
    .bind(link)
    .bind(&input.image_url)
    .bind(input.category.as_str())
    .bind(status.as_str())
    .bind(priority)
    .bind(&user.id)
    .bind(&user.email)
    .fetch_one(&db)
    .await
    .context("failed to insert ad")?;

    counter!(SUBMISSION_AD).increment(1);
    if status == AdStatus::Active {
        counter!(SUBMISSION_AUTO_APPROVED).increment(1);
    }

    Ok(Json(json!({ "success": true, "ad": ad })))
}

#[derive(Deserialize, Debug, Default)]
struct ListParams {
    #[serde(default)]
    mine: bool,
    status: Option<String>,
    /// Which listing surface to fetch ads for; `both` ads always match.
    category: Option<String>,
}

/// List ads. The public view shows active ads, highest priority first.
/// - GET `/api/ads`
async fn list_ads(
    user: Option<AuthenticatedUser>,
    State(db): State<Db>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>> {
    let ads = if params.mine {
        let user = user.ok_or_else(|| Error::unauthenticated(anyhow!("not signed in")))?;
        sqlx::query_as::<_, Ad>(&format!(
            "SELECT {AD_COLUMNS} FROM ads WHERE owner_id = ? ORDER BY created_at DESC"
        ))
        .bind(&user.id)
        .fetch_all(&db)
        .await?
    } else if let Some(status) = params.status.as_deref() {
        let user = user.ok_or_else(|| Error::unauthenticated(anyhow!("not signed in")))?;
        require_moderator(&user)?;
        sqlx::query_as::<_, Ad>(&format!(
            "SELECT {AD_COLUMNS} FROM ads WHERE status = ? ORDER BY created_at DESC"
        ))
        .bind(status)
        .fetch_all(&db)
        .await?
    } else if let Some(category) = params.category.as_deref() {
        let category = AdCategory::from_str(category).map_err(Error::validation)?;
        sqlx::query_as::<_, Ad>(&format!(
            "SELECT {AD_COLUMNS} FROM ads
                WHERE status = 'active' AND (category = ? OR category = 'both')
                ORDER BY priority DESC, created_at DESC"
        ))
        .bind(category.as_str())
        .fetch_all(&db)
        .await?
    } else {
        sqlx::query_as::<_, Ad>(&format!(
            "SELECT {AD_COLUMNS} FROM ads WHERE status = 'active'
                ORDER BY priority DESC, created_at DESC"
        ))
        .fetch_all(&db)
        .await?
    };

    Ok(Json(json!({ "success": true, "ads": ads })))
}

async fn fetch_ad(db: &Db, id: &str) -> Result<Ad> {
    sqlx::query_as::<_, Ad>(&format!("SELECT {AD_COLUMNS} FROM ads WHERE id = ?"))
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| Error::not_found(anyhow!("ad not found")))
}

/// Fetch a single ad.
/// - GET `/api/ads/{id}`
async fn get_ad(
    user: Option<AuthenticatedUser>,
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let ad = fetch_ad(&db, &id).await?;

    // Match the public listing: anything not active is only visible to the
    // owner and to moderators.
    if ad.status != AdStatus::Active.as_str() {
        let visible = user
            .as_ref()
            .is_some_and(|u| can_mutate(u, &ad.owner_id, &ad.owner_email));
        if !visible {
            return Err(Error::not_found(anyhow!("ad not found")));
        }
    }

    Ok(Json(json!({ "success": true, "ad": ad })))
}

/// The set of fields an owner may change on an ad. Priority is extra-gated
/// to moderators inside the handler.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub(super) struct AdPatch {
    title: Option<String>,
    link: Option<String>,
    image_url: Option<String>,
    category: Option<AdCategory>,
    priority: Option<i64>,
    /// Post-approval lifecycle only; owners may pause (inactive) or
    /// resume (active) an approved ad.
    status: Option<String>,
}

impl AdPatch {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.link.is_none()
            && self.image_url.is_none()
            && self.category.is_none()
            && self.priority.is_none()
            && self.status.is_none()
    }

    fn into_query(self, id: &str) -> Result<QueryBuilder<'static, sqlx::Sqlite>> {
        if self.is_empty() {
            return Err(Error::validation(anyhow!("no updatable fields provided")));
        }

        let mut qb = QueryBuilder::new("UPDATE ads SET updated_at = datetime('now')");
        if let Some(title) = self.title {
            let title = required(&title, "title")?.to_owned();
            qb.push(", title = ").push_bind(title);
        }
        if let Some(link) = self.link {
            let link = required(&link, "link")?.to_owned();
            url::Url::parse(&link)
                .map_err(|e| Error::validation(anyhow!("link must be a URL: {e}")))?;
            qb.push(", link = ").push_bind(link);
        }
        if let Some(image_url) = self.image_url {
            qb.push(", image_url = ").push_bind(image_url);
        }
        if let Some(category) = self.category {
            qb.push(", category = ").push_bind(category.as_str());
        }
        if let Some(priority) = self.priority {
            qb.push(", priority = ").push_bind(priority);
        }
        if let Some(status) = self.status {
            // Owners only toggle between the post-approval states. The
            // moderation states are reachable solely via approve/reject.
            if status != AdStatus::Active.as_str()
                && status != AdStatus::Inactive.as_str()
                && status != AdStatus::Expired.as_str()
            {
                return Err(Error::validation(anyhow!(
                    "status may only be set to active, inactive or expired"
                )));
            }
            qb.push(", status = ").push_bind(status);
        }
        qb.push(" WHERE id = ").push_bind(id.to_owned());

        Ok(qb)
    }
}

/// Update one of the caller's ads.
/// - PATCH `/api/ads/{id}`
async fn update_ad(
    user: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(patch): Json<AdPatch>,
) -> Result<Json<Value>> {
    let ad = fetch_ad(&db, &id).await?;
    if !can_mutate(&user, &ad.owner_id, &ad.owner_email) {
        return Err(Error::forbidden(anyhow!("you do not own this ad")));
    }
    if patch.priority.is_some() && !user.has_any(MODERATOR_ROLES) {
        return Err(Error::forbidden(anyhow!(
            "only admins may change ad priority"
        )));
    }
    // Moderation owns the pending/rejected states; owners cannot leave
    // them by patching.
    if patch.status.is_some()
        && (ad.status == AdStatus::Pending.as_str() || ad.status == AdStatus::Rejected.as_str())
    {
        return Err(Error::validation(anyhow!(
            "ad status is controlled by moderation"
        )));
    }

    patch
        .into_query(&id)?
        .build()
        .execute(&db)
        .await
        .context("failed to update ad")?;

    let ad = fetch_ad(&db, &id).await?;
    Ok(Json(json!({ "success": true, "ad": ad })))
}

/// Delete one of the caller's ads.
/// - DELETE `/api/ads/{id}`
async fn delete_ad(
    user: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let ad = fetch_ad(&db, &id).await?;
    if !can_mutate(&user, &ad.owner_id, &ad.owner_email) {
        return Err(Error::forbidden(anyhow!("you do not own this ad")));
    }

    sqlx::query("DELETE FROM ads WHERE id = ?")
        .bind(&id)
        .execute(&db)
        .await
        .context("failed to delete ad")?;

    Ok(Json(json!({ "success": true })))
}

#[derive(Deserialize, Debug, Default)]
struct ApproveInput {
    notes: Option<String>,
}

/// Approve a pending ad; it becomes active immediately.
/// - POST `/api/ads/{id}/approve`
async fn approve_ad(
    user: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(input): Json<ApproveInput>,
) -> Result<Json<Value>> {
    require_moderator(&user)?;
    let notes = input.notes;

    let ad = fetch_ad(&db, &id).await?;
    if ad.status != AdStatus::Pending.as_str() {
        return Err(Error::validation(anyhow!(
            "ad has already been reviewed (status: {})",
            ad.status
        )));
    }

    let updated = sqlx::query(
        r#"
        UPDATE ads
            SET status = 'active', reviewed_by = ?, reviewed_at = datetime('now'),
                review_notes = ?, updated_at = datetime('now')
            WHERE id = ? AND status = 'pending'
        "#,
    )
    .bind(&user.id)
    .bind(&notes)
    .bind(&id)
    .execute(&db)
    .await
    .context("failed to approve ad")?;

    if updated.rows_affected() == 0 {
        return Err(Error::validation(anyhow!("ad has already been reviewed")));
    }

    counter!(MODERATION_APPROVED).increment(1);
    let ad = fetch_ad(&db, &id).await?;
    Ok(Json(json!({ "success": true, "ad": ad })))
}

#[derive(Deserialize, Debug)]
struct RejectInput {
    reason: String,
    notes: Option<String>,
}

/// Reject a pending ad. Requires a reason.
/// - POST `/api/ads/{id}/reject`
async fn reject_ad(
    user: AuthenticatedUser,
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(input): Json<RejectInput>,
) -> Result<Json<Value>> {
    require_moderator(&user)?;
    let reason = required(&input.reason, "reason")?;

    let ad = fetch_ad(&db, &id).await?;
    if ad.status != AdStatus::Pending.as_str() {
        return Err(Error::validation(anyhow!(
            "ad has already been reviewed (status: {})",
            ad.status
        )));
    }

    let updated = sqlx::query(
        r#"
        UPDATE ads
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
    .context("failed to reject ad")?;

    if updated.rows_affected() == 0 {
        return Err(Error::validation(anyhow!("ad has already been reviewed")));
    }

    counter!(MODERATION_REJECTED).increment(1);
    let ad = fetch_ad(&db, &id).await?;
    Ok(Json(json!({ "success": true, "ad": ad })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ads", post(create_ad).get(list_ads))
        .route("/ads/{id}", get(get_ad).patch(update_ad).delete(delete_ad))
        .route("/ads/{id}/approve", post(approve_ad))
        .route("/ads/{id}/reject", post(reject_ad))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Execute as _;

    #[test]
    fn patch_limits_status_values() {
        let patch = AdPatch {
            status: Some("inactive".into()),
            ..AdPatch::default()
        };
        let mut qb = patch.into_query("a1").unwrap();
        assert!(qb.build().sql().contains("status = ?"));

        let patch = AdPatch {
            status: Some("approved".into()),
            ..AdPatch::default()
        };
        assert!(patch.into_query("a1").is_err());

        let patch = AdPatch {
            status: Some("pending".into()),
            ..AdPatch::default()
        };
        assert!(patch.into_query("a1").is_err());
    }

    #[test]
    fn patch_validates_link() {
        let patch = AdPatch {
            link: Some("not a url".into()),
            ..AdPatch::default()
        };
        assert!(patch.into_query("a1").is_err());

        let patch = AdPatch {
            link: Some("https://example.com/promo".into()),
            ..AdPatch::default()
        };
        assert!(patch.into_query("a1").is_ok());
    }
}
