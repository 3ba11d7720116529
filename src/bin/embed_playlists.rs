//! Builds the playlist embedding table the API serves from: encodes every
//! playlist name in `playlists.csv` with the configured model and writes the
//! JSON table to that model's `embeddings_file` path.
//!
//! Usage: `embed-playlists [model_id]` (defaults to the configured default id).

use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use serde_json::json;
use std::env;
use std::fs::File;
use std::io::BufWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mixtape_api::error::ApiError;
use mixtape_api::ml::{Embedder, SentenceEncoder};
use mixtape_api::services::catalog::read_playlists;
use mixtape_api::{Config, Result};

const BATCH_SIZE: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "embed_playlists=info,mixtape_api=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let model_id = env::args()
        .nth(1)
        .unwrap_or_else(|| config.default_model_id.clone());
    let model_config = config
        .models
        .get(&model_id)
        .ok_or_else(|| ApiError::UnknownModel(model_id.clone()))?;

    info!("Building embedding table for model {}", model_id);

    let playlists = read_playlists(&config.playlists_csv)?;
    if playlists.is_empty() {
        return Err(ApiError::CatalogError("no playlists to embed".to_string()));
    }

    let encoder = SentenceEncoder::load(&model_config.encoder).await?;

    let pb = ProgressBar::new(playlists.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar().template("{bar:40.green} {pos}/{len} playlists ({eta})"),
    );

    // File order in, file order out: the map preserves insertion order, so the
    // written table is reproducible for identical inputs.
    let mut table = serde_json::Map::with_capacity(playlists.len());
    for chunk in playlists.chunks(BATCH_SIZE) {
        let names: Vec<String> = chunk.iter().map(|(_, name)| name.clone()).collect();
        let embeddings = encoder.embed_batch(&names).await?;
        for ((pid, _), embedding) in chunk.iter().zip(embeddings) {
            table.insert(pid.clone(), json!({ "embedding": embedding }));
        }
        pb.inc(chunk.len() as u64);
    }
    pb.finish_and_clear();

    let output = &model_config.embeddings_file;
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(output)?;
    serde_json::to_writer(BufWriter::new(file), &table)?;

    info!(
        "Wrote {} playlist embeddings to {}",
        playlists.len(),
        output.display()
    );
    Ok(())
}
