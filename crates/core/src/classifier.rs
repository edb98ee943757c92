//! Routes a detected file to exactly one content classifier and absorbs every
//! failure into the `unknown` sentinel.

use crate::config::AppConfig;
use crate::detector::{self, DetectedType};
use crate::resolver::existing_document_folders;
use providers::{ClassificationResult, Classifier, ClassifyError, ClassifyRequest, UNKNOWN_LABEL};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Image,
    Video,
    Audio,
    Document,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Image => "image",
            Capability::Video => "video",
            Capability::Audio => "audio",
            Capability::Document => "document",
        };
        f.write_str(name)
    }
}

/// The classifier instances available to the router. Any slot may be empty.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub image: Option<Arc<dyn Classifier>>,
    pub video: Option<Arc<dyn Classifier>>,
    pub audio: Option<Arc<dyn Classifier>>,
    pub document: Option<Arc<dyn Classifier>>,
}

impl Capabilities {
    fn get(&self, capability: Capability) -> Option<&Arc<dyn Classifier>> {
        match capability {
            Capability::Image => self.image.as_ref(),
            Capability::Video => self.video.as_ref(),
            Capability::Audio => self.audio.as_ref(),
            Capability::Document => self.document.as_ref(),
        }
    }
}

/// Picks the capability for a file. Mime predicates are checked in the order
/// image, video, audio, document; a file in the documents category goes to the
/// document capability even when its mime type says otherwise.
pub fn route(mime_type: &str, category: &str, documents_category: &str) -> Option<Capability> {
    if detector::is_image(mime_type) {
        Some(Capability::Image)
    } else if detector::is_video(mime_type) {
        Some(Capability::Video)
    } else if detector::is_audio(mime_type) {
        Some(Capability::Audio)
    } else if detector::is_document(mime_type) || category == documents_category {
        Some(Capability::Document)
    } else {
        None
    }
}

/// True when a result carries no usable label.
pub fn is_unknown(result: &ClassificationResult) -> bool {
    result.label == UNKNOWN_LABEL
}

pub struct ClassifierRouter {
    capabilities: Capabilities,
    disabled: Mutex<HashSet<Capability>>,
    documents_category: String,
    documents_dir: PathBuf,
}

impl ClassifierRouter {
    pub fn new(config: &AppConfig, capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            disabled: Mutex::new(HashSet::new()),
            documents_category: config.documents_category.clone(),
            documents_dir: config.organized_directory.join(&config.documents_category),
        }
    }

    pub fn is_disabled(&self, capability: Capability) -> bool {
        self.disabled
            .lock()
            .map(|set| set.contains(&capability))
            .unwrap_or(false)
    }

    fn disable(&self, capability: Capability, reason: &str) {
        let newly = self
            .disabled
            .lock()
            .map(|mut set| set.insert(capability))
            .unwrap_or(false);
        if newly {
            warn!(%capability, reason, "classifier unavailable, disabling it for this run");
        }
    }

    /// Never fails: a missing, disabled or failing capability yields `unknown`/0.0.
    pub async fn classify(
        &self,
        path: &Path,
        detected: &DetectedType,
        category: &str,
    ) -> ClassificationResult {
        let Some(capability) = route(&detected.mime_type, category, &self.documents_category)
        else {
            debug!(path = %path.display(), mime = %detected.mime_type, "no classifier for file");
            return ClassificationResult::unknown();
        };
        if self.is_disabled(capability) {
            return ClassificationResult::unknown();
        }
        let Some(classifier) = self.capabilities.get(capability) else {
            return ClassificationResult::unknown();
        };

        match classifier.load().await {
            Ok(()) => {}
            Err(ClassifyError::ModelUnavailable(reason)) => {
                self.disable(capability, &reason);
                return ClassificationResult::unknown();
            }
            Err(e) => {
                warn!(%capability, path = %path.display(), error = %e, "classifier failed to load");
                return ClassificationResult::unknown();
            }
        }

        let mut request = ClassifyRequest::new(path).with_mime(detected.mime_type.clone());
        if capability == Capability::Document {
            request = request.with_existing_folders(existing_document_folders(&self.documents_dir));
        }
        match classifier.classify(&request).await {
            Ok(result) => result,
            Err(ClassifyError::ModelUnavailable(reason)) => {
                self.disable(capability, &reason);
                ClassificationResult::unknown()
            }
            Err(e) => {
                warn!(%capability, path = %path.display(), error = %e, "classification failed");
                ClassificationResult::unknown()
            }
        }
    }
}
