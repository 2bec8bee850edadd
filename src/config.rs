use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;
use url::Url;

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    /// Public host name, e.g. `market.example.com`.
    pub host_name: String,
    /// Socket address to listen on. Defaults to `127.0.0.1:8000`.
    pub listen_address: Option<SocketAddr>,
    /// Database connection string, e.g. `sqlite://data/market.db`.
    pub db: String,
    /// Upload storage settings.
    pub upload: UploadConfig,
    /// OAuth provider settings.
    pub oauth: OAuthConfig,
    /// Metric reporting. Optional; metrics are still recorded without it.
    pub metrics: Option<MetricConfig>,
    /// Test mode. Skips the external OAuth provider round-trips.
    #[serde(default)]
    pub test: bool,
}

#[derive(Deserialize, Debug, Clone)]
pub struct UploadConfig {
    /// Directory uploads are written to and served from.
    pub path: PathBuf,
    /// Maximum accepted upload size in bytes.
    pub limit: u64,
}

/// Settings for the external OAuth provider the app delegates sign-in to.
#[derive(Deserialize, Debug, Clone)]
pub struct OAuthConfig {
    pub authorize_url: Url,
    pub token_url: Url,
    pub userinfo_url: Url,
    pub client_id: String,
    pub client_secret: String,
    /// Redirect URI registered with the provider.
    pub redirect_url: Url,
    /// Session lifetime in seconds. Defaults to 7 days.
    #[serde(default = "default_session_ttl")]
    pub session_ttl: i64,
}

const fn default_session_ttl() -> i64 {
    7 * 24 * 60 * 60
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub enum MetricConfig {
    PrometheusPush(PrometheusConfig),
}

#[derive(Deserialize, Debug, Clone)]
pub struct PrometheusConfig {
    pub url: String,
}
