//! HTTP surface of the question-answering service.

mod error;
mod handlers;
mod router;
mod state;

pub use error::{ApiError, ErrorBody};
pub use handlers::{IngestResponse, NO_FILES_MESSAGE, QueryParams, QueryResponse};
pub use router::{MAX_UPLOAD_BYTES, create_router};
pub use state::AppState;

use crate::config::Config;
use crate::index::HttpIndexService;
use crate::ingest::IngestionPipeline;
use crate::llm::LlmClient;
use crate::query::{QueryEngine, QueryOptions, QueryService};
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Wire the services together and serve until Ctrl-C.
pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let generator = Arc::new(LlmClient::new(config.llm.clone())?);
    let index = Arc::new(HttpIndexService::new(&config.index)?);

    let query = Arc::new(QueryService::new(QueryEngine::new(
        index.clone(),
        generator,
        None,
        QueryOptions::from(config),
    )));
    let ingestion = Arc::new(IngestionPipeline::new(
        config.server.data_dir.clone(),
        index,
        query.clone(),
    ));

    match ingestion.bootstrap().await {
        Ok(Some(version)) => info!(version = %version, "Query engine ready"),
        Ok(None) => {
            warn!("No documents indexed yet; answers have no evidence until the first upload")
        }
        Err(e) => warn!(error = %e, kind = e.kind(), "Could not load an index at start-up"),
    }

    let state = AppState::new(query, ingestion, config.server.chat_page.clone());
    let app = create_router(state);

    let addr = socket_addr(config)?;
    info!("Starting server on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

fn socket_addr(config: &Config) -> anyhow::Result<SocketAddr> {
    let ip = config
        .server
        .host
        .parse::<std::net::IpAddr>()
        .with_context(|| format!("Invalid server host: {}", config.server.host))?;
    Ok(SocketAddr::new(ip, config.server.port))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
