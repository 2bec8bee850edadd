use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context as _;
use axum::{extract::FromRef, routing::get, Router};
use clap::Parser;
use clap_verbosity_flag::{log::LevelFilter, InfoLevel, Verbosity};
use figment::{providers::Format as _, Figment};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

use super::config::AppConfig;
use super::db::{establish_pool, Db};
pub use super::error::Error;

/// The application user agent. Concatenates the package name and version. e.g. `scriptmarket/0.1.0`.
pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// The application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Parser, Debug, Clone)]
/// Command line arguments.
pub struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "default.toml")]
    pub config: PathBuf,
    /// The verbosity level.
    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,
}

#[derive(Clone, FromRef)]
/// The application state, shared across all routes.
pub struct AppState {
    /// The application configuration.
    pub config: AppConfig,
    /// The database connection pool.
    pub db: Db,
    /// The HTTP client used for OAuth provider round-trips.
    pub client: reqwest::Client,
}

/// Build the full application router over the given state.
pub fn router(state: AppState) -> Router {
    let upload_dir = state.config.upload.path.clone();

    Router::new()
        .route("/", get(super::index))
        .merge(super::oauth::routes())
        .nest("/api", super::endpoints::routes(&state.config))
        .nest_service("/uploads", ServeDir::new(upload_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The main application entry point.
pub async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    // Set up trace logging to console and account for the user-provided verbosity flag.
    if args.verbosity.log_level_filter() != LevelFilter::Off {
        let lvl = match args.verbosity.log_level_filter() {
            LevelFilter::Error => tracing::Level::ERROR,
            LevelFilter::Warn => tracing::Level::WARN,
            LevelFilter::Info | LevelFilter::Off => tracing::Level::INFO,
            LevelFilter::Debug => tracing::Level::DEBUG,
            LevelFilter::Trace => tracing::Level::TRACE,
        };
        tracing_subscriber::fmt().with_max_level(lvl).init();
    }

    if !args.config.exists() {
        // Not fatal, because every setting can come from the environment,
        // but the most likely cause is a forgotten mount or typo.
        warn!(
            "configuration file {} does not exist",
            args.config.display()
        );
    }

    // Read and parse the user-provided configuration.
    let config: AppConfig = Figment::new()
        .admerge(figment::providers::Toml::file(args.config))
        .admerge(figment::providers::Env::prefixed("MARKET_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    if config.test {
        warn!("scriptmarket starting up in TEST mode.");
        warn!("Sign-in will not contact the external OAuth provider.");
        warn!(
            "If you want to turn this off, either set `test` to false in the config or define `MARKET_TEST = false`"
        );
    }

    // Initialize metrics reporting.
    super::metrics::setup(config.metrics.as_ref()).context("failed to set up metrics exporter")?;

    // Client used for the OAuth token and userinfo exchanges.
    let client = reqwest::Client::builder()
        .user_agent(APP_USER_AGENT)
        .build()
        .context("failed to build requester client")?;

    tokio::fs::create_dir_all(&config.upload.path)
        .await
        .context("failed to create upload directory")?;

    // Open the database and apply pending migrations.
    let pool = establish_pool(&config.db)
        .await
        .context("failed to establish database connection pool")?;

    let addr = config
        .listen_address
        .unwrap_or(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8000));

    let app = router(AppState {
        config: config.clone(),
        db: pool.clone(),
        client,
    });

    info!("listening on {addr}");
    info!("connect to: http://127.0.0.1:{}", addr.port());

    // Determine whether or not this was the first startup (i.e. no users exist yet).
    // If so, tell the operator how the founder account gets bootstrapped.
    let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&pool)
        .await
        .context("failed to query user count")?;

    #[expect(clippy::print_stdout, reason = "operator-facing startup banner")]
    if user_count == 0 {
        // N.B: This is an operator-facing message, so we're bypassing
        // `tracing` here and logging it directly to console.
        println!("=====================================");
        println!("            FIRST STARTUP            ");
        println!("=====================================");
        println!("No users exist yet. The first account");
        println!("to sign in will be granted the");
        println!("founder and admin roles.");
        println!("=====================================");
    }

    let listener = TcpListener::bind(&addr)
        .await
        .context("failed to bind address")?;

    axum::serve(listener, app.into_make_service())
        .await
        .context("failed to serve app")
}
