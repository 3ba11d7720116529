use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::ModelConfig;
use crate::error::{ApiError, Result};
use crate::ml::{Embedder, SentenceEncoder};
use crate::services::similarity::{load_embedding_table, SimilarityIndex};

/// Sentence encoded once per freshly loaded model; its vector width is checked
/// against the embedding table before the model becomes visible, and the first
/// real request hits an already warm graph.
const PROBE_TEXT: &str = "This is a warm up sentence.";

/// A fully loaded model: the encoder plus the similarity index built from its
/// playlist embedding table. Created once, kept for the process lifetime.
pub struct ModelInstance {
    pub embedder: Arc<dyn Embedder>,
    pub index: SimilarityIndex,
}

impl ModelInstance {
    pub async fn load(config: &ModelConfig) -> Result<Self> {
        let encoder = SentenceEncoder::load(&config.encoder).await?;
        let entries = load_embedding_table(&config.embeddings_file)?;
        let index = SimilarityIndex::build(entries)?;

        let probe = encoder.embed(PROBE_TEXT).await?;
        if probe.len() != index.dimension() {
            return Err(ApiError::DimensionMismatch {
                expected: index.dimension(),
                got: probe.len(),
            });
        }

        Ok(ModelInstance {
            embedder: Arc::new(encoder),
            index,
        })
    }
}

/// Lazily loads and caches one [`ModelInstance`] per configured model id.
///
/// The cache sits behind one async mutex that stays held across a load, so at
/// most one load runs at a time and no id is ever loaded twice. Instances are
/// never evicted.
pub struct ModelRegistry {
    configs: HashMap<String, ModelConfig>,
    instances: Mutex<HashMap<String, Arc<ModelInstance>>>,
}

impl ModelRegistry {
    pub fn new(configs: HashMap<String, ModelConfig>) -> Self {
        ModelRegistry {
            configs,
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Ids this registry can serve, sorted for stable logs.
    pub fn model_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.configs.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the cached instance for `model_id`, loading it on first use.
    /// Unknown ids fail without touching the cache.
    pub async fn get_or_create(&self, model_id: &str) -> Result<Arc<ModelInstance>> {
        let config = self
            .configs
            .get(model_id)
            .ok_or_else(|| ApiError::UnknownModel(model_id.to_string()))?;

        let mut instances = self.instances.lock().await;
        if let Some(instance) = instances.get(model_id) {
            return Ok(Arc::clone(instance));
        }

        info!("Loading model {} on first use", model_id);
        let instance = Arc::new(ModelInstance::load(config).await?);
        instances.insert(model_id.to_string(), Arc::clone(&instance));
        Ok(instance)
    }

    /// Eagerly loads every configured model so the first request never pays
    /// the load cost. Any failure aborts startup.
    pub async fn warm_up(&self) -> Result<()> {
        for model_id in self.model_ids() {
            info!("Preloading model {}", model_id);
            self.get_or_create(&model_id).await?;
        }
        info!("All models preloaded");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn with_instance(model_id: &str, instance: ModelInstance) -> Self {
        use crate::config::EncoderConfig;

        let config = ModelConfig {
            encoder: EncoderConfig::Pretrained {
                pretrained_model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            },
            embeddings_file: std::path::PathBuf::from("unused.json"),
        };
        let mut configs = HashMap::new();
        configs.insert(model_id.to_string(), config);
        let mut instances = HashMap::new();
        instances.insert(model_id.to_string(), Arc::new(instance));
        ModelRegistry {
            configs,
            instances: Mutex::new(instances),
        }
    }
}
