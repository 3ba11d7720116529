use async_trait::async_trait;

use crate::error::Result;

pub mod sentence_encoder;

pub use sentence_encoder::SentenceEncoder;

/// Text-to-vector capability of a loaded model. Implementations must be
/// deterministic for a fixed model and input text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a single text into a fixed-width vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
