use crate::{
    EmbedResponse, EmbeddingProvider, ProviderError, Transcript, TranscriptionProvider,
    VisionProvider, VisionResponse,
};
use std::path::Path;

#[derive(Debug, Default)]
pub struct NoopProvider;

#[async_trait::async_trait]
impl EmbeddingProvider for NoopProvider {
    async fn embed(&self, texts: &[String]) -> Result<EmbedResponse, ProviderError> {
        Ok(EmbedResponse {
            vectors: vec![vec![]; texts.len()],
        })
    }
}

#[async_trait::async_trait]
impl VisionProvider for NoopProvider {
    async fn label_image(
        &self,
        _bytes: &[u8],
        _mime_type: &str,
        _max_results: usize,
    ) -> Result<VisionResponse, ProviderError> {
        Err(ProviderError::NotImplemented)
    }
}

#[async_trait::async_trait]
impl TranscriptionProvider for NoopProvider {
    async fn transcribe(&self, _path: &Path) -> Result<Transcript, ProviderError> {
        Err(ProviderError::NotImplemented)
    }
}
