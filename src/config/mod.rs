use dotenv::dotenv;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{ApiError, Result};

/// Where a model's encoder weights come from: a pretrained checkpoint known to
/// rust-bert, or a fine-tuned model directory on disk.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum EncoderConfig {
    Pretrained { pretrained_model: String },
    FineTuned { model_dir: PathBuf },
}

#[derive(Clone, Debug, Deserialize)]
pub struct ModelConfig {
    #[serde(flatten)]
    pub encoder: EncoderConfig,
    pub embeddings_file: PathBuf,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub tracks_csv: PathBuf,
    pub items_csv: PathBuf,
    pub playlists_csv: PathBuf,
    pub default_model_id: String,
    pub models: HashMap<String, ModelConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let csv_dir =
            PathBuf::from(env::var("APP_CSV_DIR").unwrap_or_else(|_| "./csvs".to_string()));
        let data_dir =
            PathBuf::from(env::var("APP_DATA_DIR").unwrap_or_else(|_| "./data".to_string()));

        let models = match env::var("APP_MODELS_FILE") {
            Ok(path) => load_models_file(Path::new(&path))?,
            Err(_) => default_models(&data_dir),
        };

        Ok(Config {
            host: env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            tracks_csv: csv_dir.join("tracks.csv"),
            items_csv: csv_dir.join("items.csv"),
            playlists_csv: csv_dir.join("playlists.csv"),
            default_model_id: env::var("APP_DEFAULT_MODEL_ID").unwrap_or_else(|_| "1".to_string()),
            models,
        })
    }
}

fn default_models(data_dir: &Path) -> HashMap<String, ModelConfig> {
    let mut models = HashMap::new();
    models.insert(
        "1".to_string(),
        ModelConfig {
            encoder: EncoderConfig::Pretrained {
                pretrained_model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            },
            embeddings_file: data_dir.join("playlists_embeddings_pretrained.json"),
        },
    );
    models
}

fn load_models_file(path: &Path) -> Result<HashMap<String, ModelConfig>> {
    let file = File::open(path).map_err(|e| {
        ApiError::InternalError(format!("cannot open models file {}: {}", path.display(), e))
    })?;
    let models: HashMap<String, ModelConfig> = serde_json::from_reader(file)?;
    if models.is_empty() {
        return Err(ApiError::InternalError(format!(
            "models file {} defines no models",
            path.display()
        )));
    }
    Ok(models)
}
