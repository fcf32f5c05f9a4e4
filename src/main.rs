use page_insight::{AppState, api::routes::create_router, config::Config, telemetry};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing();

    // Load configuration
    let config = Config::load()?;
    let server_addr = config.server_addr;
    tracing::info!(
        ollama = %config.ollama_base_url,
        coder_model = %config.coder_model,
        page_model = %config.page_model,
        "starting server"
    );

    let app = create_router(AppState::new(config)?);

    let listener = TcpListener::bind(server_addr).await?;
    tracing::info!("Server listening at {}", server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
