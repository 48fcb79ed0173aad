mod applications;
mod config;
mod error;
mod escrow;
mod gigs;
mod messaging;
mod milestones;
mod payments;
mod processor;
mod reviews;
mod server;
mod storage;
mod subscription;
mod users;
mod webhook;

use tracing_subscriber::fmt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt::init();
    dotenvy::dotenv().ok();

    let config = config::Settings::load()?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = server::create_app(config).await?;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("GigLance server running on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
