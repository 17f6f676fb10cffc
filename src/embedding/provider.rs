use async_trait::async_trait;

use crate::analysis::AnalysisError;

/// Maps text to fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// backend name (e.g. "hashing", "openai")
    fn name(&self) -> &str;

    /// length of every vector this embedder returns
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AnalysisError>;

    /// embed several texts; backends with a batch endpoint override this
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AnalysisError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}
