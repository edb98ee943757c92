//! The capability contract every content classifier implements.
//!
//! A capability is loaded lazily (at most once) and then asked to classify
//! individual files. Expected failures come back as [`ClassifyError`] values;
//! callers turn them into a sentinel result instead of unwinding.

use crate::ProviderError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

pub const UNKNOWN_LABEL: &str = "unknown";
pub const NOT_CLASSIFIED_LABEL: &str = "not_classified";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: String,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ClassificationResult {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Sentinel for a capability that could not produce a label.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_LABEL, 0.0)
    }

    /// Sentinel for files that never went through a capability.
    pub fn not_classified() -> Self {
        Self::new(NOT_CLASSIFIED_LABEL, 0.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassifyRequest {
    pub path: PathBuf,
    pub mime_type: Option<String>,
    /// Names of folders that already exist for this kind of file (documents only).
    pub existing_folders: Vec<String>,
}

impl ClassifyRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_mime(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_existing_folders(mut self, folders: Vec<String>) -> Self {
        self.existing_folders = folders;
        self
    }
}

#[derive(Debug, Clone, Error)]
pub enum ClassifyError {
    /// The model or its backing service cannot be used at all. Raised at load time.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("unreadable content: {0}")]
    Unreadable(String),
    #[error("unsupported input: {0}")]
    Unsupported(String),
    #[error("provider request failed: {0}")]
    Request(String),
}

impl From<ProviderError> for ClassifyError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::UnknownProvider(name) => ClassifyError::ModelUnavailable(name),
            other => ClassifyError::Request(other.to_string()),
        }
    }
}

#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Loads the backing model. Calls after the first successful load are no-ops.
    async fn load(&self) -> Result<(), ClassifyError>;

    async fn classify(&self, req: &ClassifyRequest) -> Result<ClassificationResult, ClassifyError>;
}

/// Load state of one capability instance.
#[derive(Debug)]
pub enum ModelState<T> {
    Unloaded,
    Ready(Arc<T>),
    Unavailable(String),
}

/// Holds a lazily-loaded model. The loader runs at most once; a failed load is
/// remembered so later calls fail fast with the same reason.
#[derive(Debug)]
pub struct LazyModel<T> {
    state: Mutex<ModelState<T>>,
}

impl<T> Default for LazyModel<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(ModelState::Unloaded),
        }
    }
}

impl<T> LazyModel<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_load<F, Fut>(&self, loader: F) -> Result<Arc<T>, ClassifyError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, ClassifyError>>,
    {
        let mut state = self.state.lock().await;
        match &*state {
            ModelState::Ready(model) => return Ok(model.clone()),
            ModelState::Unavailable(reason) => {
                return Err(ClassifyError::ModelUnavailable(reason.clone()))
            }
            ModelState::Unloaded => {}
        }
        match loader().await {
            Ok(model) => {
                let model = Arc::new(model);
                *state = ModelState::Ready(model.clone());
                Ok(model)
            }
            Err(ClassifyError::ModelUnavailable(reason)) => {
                *state = ModelState::Unavailable(reason.clone());
                Err(ClassifyError::ModelUnavailable(reason))
            }
            // Anything else may be transient; stay unloaded and let the next call retry.
            Err(other) => Err(other),
        }
    }

    pub async fn is_ready(&self) -> bool {
        matches!(&*self.state.lock().await, ModelState::Ready(_))
    }
}
