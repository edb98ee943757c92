use crate::{
    EmbedResponse, EmbeddingProvider, LabelScore, ProviderError, Transcript,
    TranscriptionProvider, VisionProvider, VisionResponse,
};
use base64::Engine;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub embedding_model: String,
    pub vision_model: String,
    pub transcription_model: String,
}

#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    cfg: Arc<OpenAiConfig>,
}

impl OpenAiProvider {
    pub fn new(cfg: OpenAiConfig) -> Self {
        Self {
            client: Client::new(),
            cfg: Arc::new(cfg),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/v1/{}", self.cfg.base_url.trim_end_matches('/'), endpoint)
    }
}

fn request_failed(e: impl ToString) -> ProviderError {
    ProviderError::RequestFailed(e.to_string())
}

#[derive(Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed(&self, texts: &[String]) -> Result<EmbedResponse, ProviderError> {
        #[derive(serde::Serialize)]
        struct EmbedRequest<'a> {
            model: &'a str,
            input: &'a [String],
        }

        let body = EmbedRequest {
            model: &self.cfg.embedding_model,
            input: texts,
        };

        let resp = self
            .client
            .post(self.url("embeddings"))
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(request_failed)?;

        let parsed: EmbeddingApiResponse = resp.json().await.map_err(request_failed)?;

        Ok(EmbedResponse {
            vectors: parsed.data.into_iter().map(|d| d.embedding).collect(),
        })
    }
}

/// Parses the model's JSON reply; a non-JSON reply becomes a single zero-score label.
pub fn parse_vision_reply(content: &str, max_results: usize) -> VisionResponse {
    #[derive(Deserialize)]
    struct Reply {
        labels: Vec<LabelScore>,
    }

    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let mut predictions = match serde_json::from_str::<Reply>(trimmed) {
        Ok(reply) => reply.labels,
        Err(_) if !trimmed.is_empty() => vec![LabelScore {
            label: trimmed.lines().next().unwrap_or_default().to_string(),
            score: 0.0,
        }],
        Err(_) => Vec::new(),
    };
    for p in &mut predictions {
        p.score = p.score.clamp(0.0, 1.0);
    }
    predictions.retain(|p| !p.label.trim().is_empty());
    predictions.sort_by(|a, b| b.score.total_cmp(&a.score));
    predictions.truncate(max_results);
    VisionResponse { predictions }
}

#[async_trait::async_trait]
impl VisionProvider for OpenAiProvider {
    async fn label_image(
        &self,
        bytes: &[u8],
        mime_type: &str,
        max_results: usize,
    ) -> Result<VisionResponse, ProviderError> {
        #[derive(Deserialize)]
        struct Choice {
            message: ChatMessageResp,
        }
        #[derive(Deserialize)]
        struct ChatMessageResp {
            content: String,
        }
        #[derive(Deserialize)]
        struct ChatApiResponse {
            choices: Vec<Choice>,
        }

        let data_url = format!(
            "data:{};base64,{}",
            mime_type,
            base64::engine::general_purpose::STANDARD.encode(bytes)
        );
        let prompt = format!(
            "Classify the main subject of this image. Reply with JSON only: \
             {{\"labels\": [{{\"label\": \"<short noun phrase>\", \"score\": <0..1>}}]}} \
             with at most {max_results} labels, best first."
        );
        let body = serde_json::json!({
            "model": self.cfg.vision_model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }],
        });

        let resp = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(request_failed)?;

        let parsed: ChatApiResponse = resp.json().await.map_err(request_failed)?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(parse_vision_reply(&content, max_results))
    }
}

#[async_trait::async_trait]
impl TranscriptionProvider for OpenAiProvider {
    async fn transcribe(&self, path: &Path) -> Result<Transcript, ProviderError> {
        let bytes = tokio::fs::read(path).await.map_err(request_failed)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        let form = Form::new()
            .text("model", self.cfg.transcription_model.clone())
            .part("file", Part::bytes(bytes).file_name(file_name));

        let resp = self
            .client
            .post(self.url("audio/transcriptions"))
            .bearer_auth(&self.cfg.api_key)
            .multipart(form)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(request_failed)?;

        resp.json::<Transcript>().await.map_err(request_failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_reply_is_sorted_and_truncated() {
        let reply = r#"```json
{"labels": [{"label": "cat", "score": 0.2}, {"label": "dog", "score": 0.7}, {"label": "fox", "score": 1.4}]}
```"#;
        let parsed = parse_vision_reply(reply, 2);
        let labels: Vec<_> = parsed.predictions.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["fox", "dog"]);
        assert_eq!(parsed.predictions[0].score, 1.0);
    }

    #[test]
    fn plain_reply_becomes_single_label() {
        let parsed = parse_vision_reply("sunset\nwith clouds", 3);
        assert_eq!(parsed.predictions.len(), 1);
        assert_eq!(parsed.predictions[0].label, "sunset");
        assert_eq!(parsed.predictions[0].score, 0.0);
        assert!(parse_vision_reply("  ", 3).predictions.is_empty());
    }

    #[test]
    fn base_url_trailing_slash_is_tolerated() {
        let provider = OpenAiProvider::new(OpenAiConfig {
            api_key: "k".into(),
            base_url: "http://localhost:1234/".into(),
            embedding_model: "e".into(),
            vision_model: "v".into(),
            transcription_model: "t".into(),
        });
        assert_eq!(provider.url("embeddings"), "http://localhost:1234/v1/embeddings");
    }
}
