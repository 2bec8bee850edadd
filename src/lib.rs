//! Marketplace API server.
mod auth;
mod config;
mod db;
mod endpoints;
pub mod error;
mod metrics;
mod models;
mod oauth;
mod serve;

#[cfg(test)]
mod tests;

pub use error::Error;
pub use serve::run;
pub(crate) use serve::{AppState, Result};

/// The index (/) route.
async fn index() -> impl axum::response::IntoResponse {
    r"
                 _       _                 _        _
 ___  ___ _ __(_)_ __ | |_ _ __ ___   __ _ _ __| | _____| |_
/ __|/ __| '__| | '_ \| __| '_ ` _ \ / _` | '__| |/ / _ \ __|
\__ \ (__| |  | | |_) | |_| | | | | | (_| | |  |   <  __/ |_
|___/\___|_|  |_| .__/ \__|_| |_| |_|\__,_|_|  |_|\_\___|\__|
                |_|

This is the scriptmarket API server.

Content routes live under /api/
Sign-in routes live under /auth/
Uploaded files are served from /uploads/
"
}
