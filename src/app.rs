use crate::{
    config::Config,
    error::Result,
    routes::api_routes,
    services::{Catalog, ModelRegistry, RecommendationService},
};
use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use log::info;
use std::net::TcpListener;
use std::sync::Arc;

pub struct Application {
    port: u16,
    host: String,
    config: Config,
}

impl Application {
    /// Create a new application instance
    pub fn new(config: &Config) -> Self {
        Self {
            port: config.port,
            host: config.host.clone(),
            config: config.clone(),
        }
    }

    /// Build and run the server
    pub async fn run(&self) -> Result<()> {
        // Always bind to 0.0.0.0 for Docker compatibility
        let bind_address = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&bind_address)?;
        info!("Starting server at http://{}:{}", self.host, self.port);

        self.run_with_listener(listener).await
    }

    /// Run the server with a specific TCP listener
    /// This is useful for testing where we want to use a random port
    pub async fn run_with_listener(&self, listener: TcpListener) -> Result<()> {
        // Load the static catalog into memory
        let catalog = Catalog::load(
            &self.config.tracks_csv,
            &self.config.items_csv,
            &self.config.playlists_csv,
        )
        .context("Failed to load catalog")?;

        // Preload every configured model before accepting requests, so the
        // first request never waits on a model download or a table load.
        let registry = Arc::new(ModelRegistry::new(self.config.models.clone()));
        registry
            .warm_up()
            .await
            .context("Failed to preload models")?;

        let recommendation_service =
            web::Data::new(RecommendationService::new(registry, Arc::new(catalog)));
        let config = web::Data::new(self.config.clone());

        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header();

            App::new()
                .wrap(cors)
                .wrap(Logger::default())
                .app_data(recommendation_service.clone())
                .app_data(config.clone())
                .service(api_routes())
        })
        .listen(listener)?
        .run()
        .await?;

        Ok(())
    }
}
