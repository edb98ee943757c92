//! Provider abstractions for model backends, and the classifier capabilities built on them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub mod audio;
pub mod capability;
pub mod document;
pub mod image;
pub mod noop;
pub mod openai;
pub mod text;
pub mod video;

pub use capability::{
    ClassificationResult, Classifier, ClassifyError, ClassifyRequest, LazyModel, ModelState,
    NOT_CLASSIFIED_LABEL, UNKNOWN_LABEL,
};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("not implemented")]
    NotImplemented,
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub vectors: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisionResponse {
    /// Best first.
    pub predictions: Vec<LabelScore>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
}

#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<EmbedResponse, ProviderError>;
}

#[async_trait::async_trait]
pub trait VisionProvider: Send + Sync {
    async fn label_image(
        &self,
        bytes: &[u8],
        mime_type: &str,
        max_results: usize,
    ) -> Result<VisionResponse, ProviderError>;
}

#[async_trait::async_trait]
pub trait TranscriptionProvider: Send + Sync {
    async fn transcribe(&self, path: &Path) -> Result<Transcript, ProviderError>;
}

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    embeddings: HashMap<String, Arc<dyn EmbeddingProvider>>,
    vision: HashMap<String, Arc<dyn VisionProvider>>,
    transcription: HashMap<String, Arc<dyn TranscriptionProvider>>,
    pub preferred: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_embedding(mut self, name: &str, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embeddings.insert(name.to_string(), provider);
        self
    }

    pub fn with_vision(mut self, name: &str, provider: Arc<dyn VisionProvider>) -> Self {
        self.vision.insert(name.to_string(), provider);
        self
    }

    pub fn with_transcription(
        mut self,
        name: &str,
        provider: Arc<dyn TranscriptionProvider>,
    ) -> Self {
        self.transcription.insert(name.to_string(), provider);
        self
    }

    pub fn set_preferred(mut self, name: &str) -> Self {
        self.preferred = Some(name.to_string());
        self
    }

    fn key(&self, name: Option<&str>) -> Result<String, ProviderError> {
        name.map(str::to_string)
            .or_else(|| self.preferred.clone())
            .ok_or_else(|| ProviderError::UnknownProvider("no provider configured".into()))
    }

    pub fn embedding(
        &self,
        name: Option<&str>,
    ) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
        let key = self.key(name)?;
        self.embeddings
            .get(&key)
            .cloned()
            .ok_or(ProviderError::UnknownProvider(key))
    }

    pub fn vision(&self, name: Option<&str>) -> Result<Arc<dyn VisionProvider>, ProviderError> {
        let key = self.key(name)?;
        self.vision
            .get(&key)
            .cloned()
            .ok_or(ProviderError::UnknownProvider(key))
    }

    pub fn transcription(
        &self,
        name: Option<&str>,
    ) -> Result<Arc<dyn TranscriptionProvider>, ProviderError> {
        let key = self.key(name)?;
        self.transcription
            .get(&key)
            .cloned()
            .ok_or(ProviderError::UnknownProvider(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noop::NoopProvider;

    #[test]
    fn registry_resolves_preferred_provider() {
        let reg = ProviderRegistry::new()
            .with_embedding("noop", Arc::new(NoopProvider))
            .set_preferred("noop");
        assert!(reg.embedding(None).is_ok());
        assert!(reg.vision(None).is_err());
        assert!(matches!(
            reg.embedding(Some("openai")),
            Err(ProviderError::UnknownProvider(name)) if name == "openai"
        ));
    }

    #[test]
    fn empty_registry_has_nothing_preferred() {
        let reg = ProviderRegistry::new();
        assert!(reg.transcription(None).is_err());
    }
}
