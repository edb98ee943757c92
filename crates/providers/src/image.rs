//! Image capability: asks a vision provider for the top labels of a picture.

use crate::capability::{ClassificationResult, Classifier, ClassifyError, ClassifyRequest, LazyModel};
use crate::VisionProvider;
use std::sync::Arc;
use tracing::debug;

const MAX_RESULTS: usize = 3;

pub struct ImageClassifier {
    provider: Option<Arc<dyn VisionProvider>>,
    model: LazyModel<Arc<dyn VisionProvider>>,
}

impl ImageClassifier {
    pub fn new(provider: Option<Arc<dyn VisionProvider>>) -> Self {
        Self {
            provider,
            model: LazyModel::new(),
        }
    }

    async fn model(&self) -> Result<Arc<Arc<dyn VisionProvider>>, ClassifyError> {
        let provider = self.provider.clone();
        self.model
            .get_or_load(|| async move {
                provider.ok_or_else(|| {
                    ClassifyError::ModelUnavailable("no vision provider configured".into())
                })
            })
            .await
    }
}

/// `"Golden Retriever"` -> `"golden_retriever"`.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase().replace(' ', "_")
}

#[async_trait::async_trait]
impl Classifier for ImageClassifier {
    fn name(&self) -> &'static str {
        "image"
    }

    async fn load(&self) -> Result<(), ClassifyError> {
        self.model().await.map(|_| ())
    }

    async fn classify(&self, req: &ClassifyRequest) -> Result<ClassificationResult, ClassifyError> {
        let provider = self.model().await?;
        let bytes = tokio::fs::read(&req.path)
            .await
            .map_err(|e| ClassifyError::Unreadable(e.to_string()))?;
        let mime = req.mime_type.as_deref().unwrap_or("image/jpeg");
        let response = provider.label_image(&bytes, mime, MAX_RESULTS).await?;

        let Some(top) = response.predictions.first() else {
            debug!(path = %req.path.display(), "vision provider returned no labels");
            return Ok(ClassificationResult::unknown());
        };
        let all: Vec<serde_json::Value> = response
            .predictions
            .iter()
            .map(|p| serde_json::json!({ "label": p.label, "score": p.score }))
            .collect();
        Ok(ClassificationResult::new(normalize_label(&top.label), top.score)
            .with_metadata(serde_json::json!({ "all_predictions": all })))
    }
}
