use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flowcast_server::config::ServerConfig;
use flowcast_server::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flowcast_server=info".into()),
        )
        .init();

    let config = ServerConfig::from_env();
    let addr = config.addr.clone();
    let state = AppState::new(config)?;
    let playbacks = state.playbacks.clone();
    let app = flowcast_server::app_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("flowcast server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
            playbacks.cancel_all();
        })
        .await?;
    Ok(())
}
