use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use car_recognition_rs::{
    config::Config,
    routes::{router, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().context("Invalid configuration")?;
    match &config.recognition_api_url {
        Some(url) => info!("Car recognition API: {}", url),
        None => warn!("CAR_RECOGNITION_API_URL environment variable is not set"),
    }

    let shared_state = Arc::new(AppState::from_config(&config));
    let app = router(shared_state, config.body_limit_bytes);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .context("Server error")?;

    Ok(())
}
