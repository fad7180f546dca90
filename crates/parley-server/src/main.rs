mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    http::{HeaderValue, Method, header},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use parley_api::auth::{self, AppState, AppStateInner};
use parley_api::fallback;
use parley_api::messages;
use parley_api::middleware::require_auth;
use parley_api::verifier::JwtCredentials;
use parley_db::{Database, MessageStore};
use parley_gateway::{CredentialVerifier, Registry, connection};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&PathBuf::from(&config.db_path))?);

    // Shared state
    let registry = Registry::new();
    let credentials = Arc::new(JwtCredentials::new(config.jwt_secret.clone(), db.clone()));
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        credentials,
        registry,
    });

    // Routes
    let public_routes = Router::new()
        .route("/api/auth/local", post(auth::login))
        .route("/api/auth/local/register", post(auth::register))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/api/messages", get(messages::recent))
        .route("/gateway/send", post(fallback::send_event))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ))
        .with_state(app_state.clone());

    let gateway_routes = Router::new()
        .route("/gateway", get(ws_upgrade))
        .route("/gateway/sse", get(fallback::sse_events))
        .with_state(app_state.clone());

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(gateway_routes)
        .layer(cors_layer(&config)?)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("parley relay listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// CORS is deployment configuration: an explicit origin allow-list grants
/// credentialed access, `*` falls back to the permissive development layer.
fn cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    if config.permit_any_origin() {
        return Ok(CorsLayer::permissive());
    }

    let origins = config
        .allowed_origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true))
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        let verifier: Arc<dyn CredentialVerifier> = state.credentials.clone();
        let store: Arc<dyn MessageStore> = state.db.clone();
        connection::handle_connection(socket, state.registry.clone(), verifier, store)
    })
}
