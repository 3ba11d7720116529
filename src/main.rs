use log::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mixtape_api::app::Application;
use mixtape_api::{Config, Result};

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Setup logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // Default to info level if RUST_LOG is not set
                "mixtape_api=info,actix_web=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Loading configuration...");
    let config = Config::from_env()?;

    // Create and run application
    let application = Application::new(&config);
    application.run().await
}
