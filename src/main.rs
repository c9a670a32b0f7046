use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use clap::Parser;
use course_market::config::Config;
use course_market::utils::init_log;
use course_market::{AppState, api, store};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tower_sessions::cookie::Key;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::SqliteStore;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file (created if missing)
    #[arg(short, long, default_value = "database/market.db")]
    database: PathBuf,
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    #[arg(short, long, default_value = "8080")]
    port: u16,
    /// Directory for rotated log files; stdout when unset
    #[arg(short, long)]
    log_dir: Option<PathBuf>,
    /// Optional TOML config file; command line flags are ignored when set
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(OpenApi)]
#[openapi(paths(
    course_market::api::public::list_courses,
    course_market::api::public::get_course,
    course_market::api::public::course_ratings,
    course_market::api::user::register,
    course_market::api::user::login,
    course_market::api::user::logout,
    course_market::api::user::me,
    course_market::api::user::update_profile,
    course_market::api::user::my_courses,
    course_market::api::user::overall_progress,
    course_market::api::user::complete_lesson,
    course_market::api::user::list_cart,
    course_market::api::user::add_to_cart,
    course_market::api::user::remove_from_cart,
    course_market::api::user::checkout,
    course_market::api::user::rate_course,
    course_market::api::user::delete_rating,
    course_market::api::instructor::my_courses,
    course_market::api::instructor::create_course,
    course_market::api::instructor::update_course,
    course_market::api::instructor::delete_course,
    course_market::api::instructor::set_published,
    course_market::api::instructor::list_lessons,
    course_market::api::instructor::add_lesson,
    course_market::api::instructor::remove_lesson,
    course_market::api::admin::list_users,
    course_market::api::admin::set_role,
    course_market::api::admin::delete_user,
    course_market::api::admin::unpublish_course,
))]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config {
            database: args.database,
            host: args.host,
            port: args.port,
            log_dir: args.log_dir,
        },
    };
    let _guard = init_log(config.log_dir.clone());

    let db = store::connect(&config.database).await?;

    let session_store = SqliteStore::new(db.clone());
    session_store.migrate().await?;
    let secret = dotenvy::var("SESSION_SECRET").context("SESSION_SECRET must be set")?;
    let key = Key::try_from(secret.as_bytes())
        .context("SESSION_SECRET must be at least 64 bytes")?;
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(time::Duration::days(5)))
        .with_signed(key);

    let state = AppState { db };
    let app = Router::new()
        .merge(
            SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .nest(
            "/api",
            Router::new()
                .nest("/public", api::public::routes())
                .nest("/user", api::user::routes())
                .nest("/instructor", api::instructor::routes())
                .nest("/admin", api::admin::routes())
                .layer(session_layer),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(Duration::from_secs(30))),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!("listening on http://{}:{}", config.host, config.port);
    info!(
        "swagger ui at http://{}:{}/swagger-ui/",
        config.host, config.port
    );
    axum::serve(listener, app).await?;
    Ok(())
}
