//! Audio capability: transcribes speech and matches the transcript against a
//! small vocabulary of audio types. Recordings without speech get the
//! instrumental label.

use crate::capability::{ClassificationResult, Classifier, ClassifyError, ClassifyRequest, LazyModel};
use crate::text::{cosine, lexical_similarity, preview};
use crate::{EmbeddingProvider, TranscriptionProvider};
use std::sync::Arc;
use tracing::{debug, warn};

const INSTRUMENTAL_CONFIDENCE: f32 = 0.5;
const TRANSCRIPT_SAMPLE_CHARS: usize = 1000;
const TRANSCRIPT_PREVIEW_CHARS: usize = 200;

pub struct AudioSettings {
    pub audio_types: Vec<String>,
    pub instrumental_label: String,
}

struct AudioModel {
    transcriber: Arc<dyn TranscriptionProvider>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    type_vectors: Option<Vec<Vec<f32>>>,
}

pub struct AudioClassifier {
    transcriber: Option<Arc<dyn TranscriptionProvider>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    settings: AudioSettings,
    model: LazyModel<AudioModel>,
}

impl AudioClassifier {
    pub fn new(
        transcriber: Option<Arc<dyn TranscriptionProvider>>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        settings: AudioSettings,
    ) -> Self {
        Self {
            transcriber,
            embedder,
            settings,
            model: LazyModel::new(),
        }
    }

    async fn model(&self) -> Result<Arc<AudioModel>, ClassifyError> {
        self.model
            .get_or_load(|| async {
                let transcriber = self.transcriber.clone().ok_or_else(|| {
                    ClassifyError::ModelUnavailable("no transcription provider configured".into())
                })?;
                if self.settings.audio_types.is_empty() {
                    return Err(ClassifyError::ModelUnavailable("no audio types configured".into()));
                }
                // Type vectors are optional: without them matching falls back to word overlap.
                let type_vectors = match &self.embedder {
                    Some(embedder) => match embedder.embed(&self.settings.audio_types).await {
                        Ok(resp) if usable(&resp.vectors, self.settings.audio_types.len()) => {
                            Some(resp.vectors)
                        }
                        Ok(_) => None,
                        Err(e) => {
                            warn!(error = %e, "audio type embeddings unavailable, using word overlap");
                            None
                        }
                    },
                    None => None,
                };
                Ok(AudioModel {
                    transcriber,
                    embedder: self.embedder.clone(),
                    type_vectors,
                })
            })
            .await
    }

    async fn best_type(&self, model: &AudioModel, transcript: &str) -> (String, f32) {
        let sample = preview(transcript, TRANSCRIPT_SAMPLE_CHARS);
        if let (Some(embedder), Some(types)) = (&model.embedder, &model.type_vectors) {
            match embedder.embed(&[sample.clone()]).await {
                Ok(resp) if usable(&resp.vectors, 1) => {
                    return pick_best(&self.settings.audio_types, |i| cosine(&resp.vectors[0], &types[i]));
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "transcript embedding failed"),
            }
        }
        pick_best(&self.settings.audio_types, |i| {
            lexical_similarity(&sample, &self.settings.audio_types[i].replace('_', " "))
        })
    }
}

fn usable(vectors: &[Vec<f32>], expected: usize) -> bool {
    vectors.len() == expected && vectors.iter().all(|v| !v.is_empty())
}

fn pick_best(types: &[String], score: impl Fn(usize) -> f32) -> (String, f32) {
    let mut best = (0usize, f32::MIN);
    for i in 0..types.len() {
        let s = score(i);
        if s > best.1 {
            best = (i, s);
        }
    }
    (types[best.0].clone(), best.1.max(0.0))
}

#[async_trait::async_trait]
impl Classifier for AudioClassifier {
    fn name(&self) -> &'static str {
        "audio"
    }

    async fn load(&self) -> Result<(), ClassifyError> {
        self.model().await.map(|_| ())
    }

    async fn classify(&self, req: &ClassifyRequest) -> Result<ClassificationResult, ClassifyError> {
        let model = self.model().await?;
        let transcript = model.transcriber.transcribe(&req.path).await?;
        let text = transcript.text.trim();
        if text.is_empty() {
            return Ok(ClassificationResult::new(
                self.settings.instrumental_label.clone(),
                INSTRUMENTAL_CONFIDENCE,
            ));
        }
        let (label, score) = self.best_type(&model, text).await;
        Ok(ClassificationResult::new(label, score).with_metadata(serde_json::json!({
            "transcript_preview": preview(text, TRANSCRIPT_PREVIEW_CHARS),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ProviderError, Transcript};
    use std::path::Path;

    struct FixedTranscript(&'static str);

    #[async_trait::async_trait]
    impl TranscriptionProvider for FixedTranscript {
        async fn transcribe(&self, _path: &Path) -> Result<Transcript, ProviderError> {
            Ok(Transcript { text: self.0.to_string() })
        }
    }

    fn settings() -> AudioSettings {
        AudioSettings {
            audio_types: ["music", "podcast", "lecture", "phone_call", "audiobook"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            instrumental_label: "Music".to_string(),
        }
    }

    #[tokio::test]
    async fn silence_maps_to_instrumental_label() {
        let audio = AudioClassifier::new(Some(Arc::new(FixedTranscript("   "))), None, settings());
        let result = audio.classify(&ClassifyRequest::new("song.mp3")).await.unwrap();
        assert_eq!(result.label, "Music");
        assert_eq!(result.confidence, 0.5);
    }

    #[tokio::test]
    async fn speech_is_matched_to_a_type() {
        let audio = AudioClassifier::new(
            Some(Arc::new(FixedTranscript(
                "Welcome back to the podcast, today on the podcast we talk gardening",
            ))),
            None,
            settings(),
        );
        let result = audio.classify(&ClassifyRequest::new("ep1.mp3")).await.unwrap();
        assert_eq!(result.label, "podcast");
        assert!(result.confidence > 0.0);
        assert!(result.metadata.unwrap()["transcript_preview"]
            .as_str()
            .unwrap()
            .starts_with("Welcome back"));
    }

    #[tokio::test]
    async fn without_transcriber_the_capability_is_unavailable() {
        let audio = AudioClassifier::new(None, None, settings());
        assert!(matches!(audio.load().await, Err(ClassifyError::ModelUnavailable(_))));
    }
}
