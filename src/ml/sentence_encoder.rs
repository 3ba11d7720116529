use async_trait::async_trait;
use once_cell::sync::Lazy;
use rust_bert::pipelines::sentence_embeddings::{
    SentenceEmbeddingsBuilder, SentenceEmbeddingsModel, SentenceEmbeddingsModelType,
};
use std::collections::HashMap;
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::config::EncoderConfig;
use crate::error::{ApiError, Result};
use crate::ml::Embedder;

/// Pretrained checkpoints rust-bert can fetch by name. All of them mean-pool
/// token states into a fixed-width sentence vector, matching the pooling used
/// when the playlist embedding tables were built.
static PRETRAINED_MODELS: Lazy<HashMap<&'static str, SentenceEmbeddingsModelType>> =
    Lazy::new(|| {
        HashMap::from([
            (
                "sentence-transformers/all-MiniLM-L6-v2",
                SentenceEmbeddingsModelType::AllMiniLmL6V2,
            ),
            (
                "sentence-transformers/all-MiniLM-L12-v2",
                SentenceEmbeddingsModelType::AllMiniLmL12V2,
            ),
            (
                "sentence-transformers/all-distilroberta-v1",
                SentenceEmbeddingsModelType::AllDistilrobertaV1,
            ),
            (
                "sentence-transformers/bert-base-nli-mean-tokens",
                SentenceEmbeddingsModelType::BertBaseNliMeanTokens,
            ),
            (
                "sentence-transformers/distiluse-base-multilingual-cased",
                SentenceEmbeddingsModelType::DistiluseBaseMultilingualCased,
            ),
            (
                "sentence-transformers/paraphrase-albert-small-v2",
                SentenceEmbeddingsModelType::ParaphraseAlbertSmallV2,
            ),
            (
                "sentence-transformers/sentence-t5-base",
                SentenceEmbeddingsModelType::SentenceT5Base,
            ),
        ])
    });

struct EncodeRequest {
    texts: Vec<String>,
    reply: oneshot::Sender<Result<Vec<Vec<f32>>>>,
}

/// Sentence-transformer encoder running on a dedicated thread.
///
/// The tch-backed model is `Send` but not `Sync`, so the handle owns only a
/// channel sender; requests queue on the worker and run one at a time. The
/// handle itself is cheap to clone and safe to share across actix workers.
#[derive(Clone)]
pub struct SentenceEncoder {
    sender: mpsc::UnboundedSender<EncodeRequest>,
}

impl SentenceEncoder {
    /// Spawns the worker thread and waits until the model finished loading
    /// (rust-bert downloads pretrained checkpoints on first use).
    pub async fn load(encoder: &EncoderConfig) -> Result<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<EncodeRequest>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let encoder = encoder.clone();

        thread::Builder::new()
            .name("sentence-encoder".to_string())
            .spawn(move || {
                let model = match build_model(&encoder) {
                    Ok(model) => {
                        if ready_tx.send(Ok(())).is_err() {
                            return;
                        }
                        model
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                while let Some(request) = receiver.blocking_recv() {
                    let result = model
                        .encode(&request.texts)
                        .map_err(|e| ApiError::ModelInferenceError(e.to_string()));
                    let _ = request.reply.send(result);
                }
            })
            .map_err(|e| {
                ApiError::ModelLoadError(format!("cannot spawn encoder thread: {}", e))
            })?;

        ready_rx.await.map_err(|_| {
            ApiError::ModelLoadError("encoder thread died during startup".to_string())
        })??;

        Ok(SentenceEncoder { sender })
    }

    async fn request(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(EncodeRequest {
                texts,
                reply: reply_tx,
            })
            .map_err(|_| ApiError::ModelInferenceError("encoder thread is gone".to_string()))?;
        reply_rx.await.map_err(|_| {
            ApiError::ModelInferenceError("encoder thread dropped the request".to_string())
        })?
    }
}

#[async_trait]
impl Embedder for SentenceEncoder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request(vec![text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            ApiError::ModelInferenceError("model returned no embedding".to_string())
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts.to_vec()).await
    }
}

fn build_model(encoder: &EncoderConfig) -> Result<SentenceEmbeddingsModel> {
    let model = match encoder {
        EncoderConfig::Pretrained { pretrained_model } => {
            let model_type = pretrained_model_type(pretrained_model)?;
            info!("Loading pretrained sentence model {}", pretrained_model);
            SentenceEmbeddingsBuilder::remote(model_type)
                .with_device(tch::Device::cuda_if_available())
                .create_model()
                .map_err(|e| ApiError::ModelLoadError(e.to_string()))?
        }
        EncoderConfig::FineTuned { model_dir } => {
            info!(
                "Loading fine-tuned sentence model from {}",
                model_dir.display()
            );
            SentenceEmbeddingsBuilder::local(model_dir.clone())
                .with_device(tch::Device::cuda_if_available())
                .create_model()
                .map_err(|e| ApiError::ModelLoadError(e.to_string()))?
        }
    };
    Ok(model)
}

fn pretrained_model_type(name: &str) -> Result<SentenceEmbeddingsModelType> {
    PRETRAINED_MODELS
        .get(name)
        .map(copy_model_type)
        .ok_or_else(|| ApiError::ModelLoadError(format!("unsupported pretrained model: {}", name)))
}

// rust-bert's SentenceEmbeddingsModelType derives neither Clone nor Copy, so
// duplicating a value out of the lookup table needs an explicit match.
fn copy_model_type(model_type: &SentenceEmbeddingsModelType) -> SentenceEmbeddingsModelType {
    use SentenceEmbeddingsModelType::*;
    match model_type {
        DistiluseBaseMultilingualCased => DistiluseBaseMultilingualCased,
        BertBaseNliMeanTokens => BertBaseNliMeanTokens,
        AllMiniLmL12V2 => AllMiniLmL12V2,
        AllMiniLmL6V2 => AllMiniLmL6V2,
        AllDistilrobertaV1 => AllDistilrobertaV1,
        ParaphraseAlbertSmallV2 => ParaphraseAlbertSmallV2,
        SentenceT5Base => SentenceT5Base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_pretrained_names_resolve() {
        assert!(matches!(
            pretrained_model_type("sentence-transformers/all-MiniLM-L6-v2").unwrap(),
            SentenceEmbeddingsModelType::AllMiniLmL6V2
        ));
    }

    #[test]
    fn unknown_pretrained_name_is_a_load_error() {
        let err = pretrained_model_type("sentence-transformers/not-a-model").unwrap_err();
        assert!(matches!(err, ApiError::ModelLoadError(_)));
    }
}
