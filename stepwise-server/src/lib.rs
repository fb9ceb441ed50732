mod auth;
mod config;
mod context;
mod docs;
mod errors;
mod rooms;
mod schemas;
mod serialized;
mod users;

use std::{
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
};

use axum::routing::get;
use log::{info, warn};
use stepwise_collab::{
    ai::{AiError, HttpAiService},
    files::DiskFileStore,
    Collab, DatabaseError, MemoryDatabase, PgDatabase, SharedDatabase,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use config::*;
pub use context::*;

pub type Router = axum::Router<ServerContext>;

#[derive(Debug, Error)]
pub enum ServerStartError {
    #[error("Could not connect to the database: {0}")]
    Database(#[from] DatabaseError),
    #[error("Could not set up the AI service client: {0}")]
    Ai(#[from] AiError),
    #[error("Could not listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Server stopped unexpectedly: {0}")]
    Serve(std::io::Error),
}

/// Starts the stepwise server
pub async fn run_server(config: ServerConfig) -> Result<(), ServerStartError> {
    let database: SharedDatabase = match &config.database_url {
        Some(url) => {
            info!("Connecting to database...");
            Arc::new(PgDatabase::new(url).await?)
        }
        None => {
            warn!("DATABASE_URL is not set, nothing will be kept after a restart");
            Arc::new(MemoryDatabase::new())
        }
    };

    let files = Arc::new(DiskFileStore::new(config.uploads_dir.clone()));
    let ai = Arc::new(HttpAiService::new(&config.ai_api_url, &config.ai_api_key)?);

    let collab = Collab::new(database, files, ai, config.collab.clone());
    let context = ServerContext {
        collab: Arc::new(collab),
    };

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, config.port).into();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new()
        .nest("/auth", auth::router())
        .nest("/rooms", rooms::router())
        .merge(users::router());

    let root_router = Router::new()
        .nest("/v1", version_one_router)
        .route("/api.json", get(docs::docs))
        .layer(cors)
        .with_state(context);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerStartError::Bind { addr, source })?;

    info!("Listening on {}", addr);

    axum::serve(listener, root_router.into_make_service())
        .await
        .map_err(ServerStartError::Serve)
}

impl ServerStartError {
    pub fn hint(&self) -> &'static str {
        match self {
            ServerStartError::Database(_) => "Make sure the Postgres instance in DATABASE_URL is running and reachable, then try again.",
            ServerStartError::Ai(_) => "Check that AI_API_URL is a valid URL.",
            ServerStartError::Bind { .. } => "Another process may be using the port. Set STEPWISE_SERVER_PORT to use a different one.",
            ServerStartError::Serve(_) => "This error is fatal, and should not happen.",
        }
    }
}
