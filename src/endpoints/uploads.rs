//! File upload endpoint. Files land in the public upload directory and are
//! referenced by generated URL path.

use anyhow::{anyhow, Context as _};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use metrics::counter;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::config::AppConfig;
use crate::metrics::UPLOADS;
use crate::{AppState, Error, Result};

/// Keep only a short alphanumeric extension from the client's file name.
fn sanitized_extension(file_name: &str) -> Option<String> {
    let ext = file_name.rsplit_once('.')?.1;
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Accept a multipart upload and return its public URL.
/// - POST `/api/uploads`
async fn upload(
    _user: AuthenticatedUser,
    State(config): State<AppConfig>,
    mut multipart: Multipart,
) -> Result<Json<Value>> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| Error::validation(anyhow!("invalid multipart body: {e}")))?
        .ok_or_else(|| Error::validation(anyhow!("no file provided")))?;

    let ext = field.file_name().and_then(sanitized_extension);

    let data = field
        .bytes()
        .await
        .map_err(|e| Error::validation(anyhow!("failed to read upload: {e}")))?;

    if data.is_empty() {
        return Err(Error::validation(anyhow!("uploaded file is empty")));
    }
    if data.len() as u64 > config.upload.limit {
        return Err(Error::with_status(
            StatusCode::PAYLOAD_TOO_LARGE,
            anyhow!("upload exceeds the {} byte limit", config.upload.limit),
        ));
    }

    let name = match ext {
        Some(ext) => format!("{}.{ext}", Uuid::new_v4()),
        None => Uuid::new_v4().to_string(),
    };
    let path = config.upload.path.join(&name);

    tokio::fs::write(&path, &data)
        .await
        .context("failed to write uploaded file")?;

    counter!(UPLOADS).increment(1);
    Ok(Json(json!({ "success": true, "url": format!("/uploads/{name}") })))
}

pub fn routes(config: &AppConfig) -> Router<AppState> {
    // The configured per-file limit is enforced in the handler with a 413;
    // the body cap here only needs to admit the multipart framing overhead
    // on top of it.
    let cap = usize::try_from(config.upload.limit)
        .unwrap_or(usize::MAX)
        .saturating_add(64 * 1024);

    Router::new().route("/uploads", post(upload).layer(DefaultBodyLimit::max(cap)))
}
