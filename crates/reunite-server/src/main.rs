mod error;
mod middleware;
mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use reunite_db::Database;
use reunite_gateway::Dispatcher;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reunite=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("REUNITE_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("REUNITE_DB_PATH").unwrap_or_else(|_| "reunite.db".into());
    let host = std::env::var("REUNITE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("REUNITE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let dispatcher = Dispatcher::new();
    let state = AppState {
        db,
        dispatcher,
        jwt_secret,
    };

    let protected_routes = Router::new()
        .merge(routes::conversations::router())
        .merge(routes::chatrooms::router())
        .merge(routes::requests::router())
        .merge(routes::notifications::router())
        .layer(from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state.clone());

    let ws_route = Router::new()
        .route("/gateway", get(routes::gateway::ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .route("/health", get(routes::health))
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Reunite chat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
