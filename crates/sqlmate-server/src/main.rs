use anyhow::{Context, Result};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sqlmate::configuration::Settings;
use sqlmate::executor::ToolExecutor;
use sqlmate::providers::base::Provider;
use sqlmate::providers::factory;
use sqlmate::session::ToolSession;
use sqlmate::systems::StdioSystem;

mod routes;
mod state;

use state::AppState;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let settings = Settings::new()?;
    let addr = settings.server.socket_addr()?;
    let config = settings.agent.to_config()?;
    let provider: Arc<dyn Provider> =
        factory::get_provider(settings.provider.into_config()?)?.into();

    // Every chat shares this one tool process
    let tool_session = Arc::new(
        ToolSession::initialize(settings.tools.session_params())
            .await
            .with_context(|| format!("could not start {}", settings.tools.command))?,
    );

    let served = serve(addr, provider, tool_session.clone(), config).await;
    tool_session.teardown().await;
    served
}

async fn serve(
    addr: std::net::SocketAddr,
    provider: Arc<dyn Provider>,
    tool_session: Arc<ToolSession>,
    config: sqlmate::agent::AgentConfig,
) -> Result<()> {
    let system = StdioSystem::connect(tool_session).await?;
    let state = AppState::new(provider, ToolExecutor::new(Arc::new(system)), config);

    // Create router with CORS support
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = routes::configure(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
