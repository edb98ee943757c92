//! Document capability: pulls text out of a document, proposes topic
//! keyphrases, and either merges into a semantically close existing folder or
//! proposes a new one.

use crate::capability::{ClassificationResult, Classifier, ClassifyError, ClassifyRequest};
use crate::text::{cosine, extract_keyphrases, lexical_similarity};
use crate::EmbeddingProvider;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

pub const UNREADABLE_LABEL: &str = "Unreadable_Docs";
pub const GENERAL_LABEL: &str = "General_Docs";

const MIN_TEXT_CHARS: usize = 50;
const MAX_TEXT_BYTES: u64 = 15_000;
const CANDIDATES: usize = 3;

pub struct DocumentClassifier {
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    merge_threshold: f32,
}

impl DocumentClassifier {
    pub fn new(embedder: Option<Arc<dyn EmbeddingProvider>>, merge_threshold: f32) -> Self {
        Self {
            embedder,
            merge_threshold,
        }
    }

    /// Best `(folder, score)` pairing any candidate with any existing folder.
    async fn best_existing_folder(
        &self,
        candidates: &[String],
        folders: &[String],
    ) -> Option<(String, f32)> {
        if candidates.is_empty() || folders.is_empty() {
            return None;
        }
        if let Some(embedder) = &self.embedder {
            let mut texts = candidates.to_vec();
            texts.extend(folders.iter().map(|f| f.replace('_', " ")));
            match embedder.embed(&texts).await {
                Ok(resp)
                    if resp.vectors.len() == texts.len()
                        && resp.vectors.iter().all(|v| !v.is_empty()) =>
                {
                    let (cand_vecs, folder_vecs) = resp.vectors.split_at(candidates.len());
                    return best_pair(folders, |c, f| cosine(&cand_vecs[c], &folder_vecs[f]), candidates.len());
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "folder embeddings failed, using word overlap"),
            }
        }
        best_pair(
            folders,
            |c, f| lexical_similarity(&candidates[c], &folders[f].replace('_', " ")),
            candidates.len(),
        )
    }
}

fn best_pair(
    folders: &[String],
    score: impl Fn(usize, usize) -> f32,
    candidates: usize,
) -> Option<(String, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for c in 0..candidates {
        for f in 0..folders.len() {
            let s = score(c, f);
            if best.map_or(true, |(_, b)| s > b) {
                best = Some((f, s));
            }
        }
    }
    best.map(|(f, s)| (folders[f].clone(), s))
}

fn is_texty(path: &Path, mime: &str) -> bool {
    if mime.starts_with("text/")
        || mime.contains("json")
        || (mime.contains("xml") && !mime.contains("officedocument"))
    {
        return true;
    }
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref(),
        Some("txt" | "md" | "markdown" | "rst" | "csv" | "log")
    )
}

async fn read_text_prefix(path: &Path) -> std::io::Result<String> {
    let file = tokio::fs::File::open(path).await?;
    let mut buf = Vec::new();
    file.take(MAX_TEXT_BYTES).read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Extracts leading text from a document. Formats without an extractor yield an empty string.
pub async fn extract_text(path: &Path, mime: &str) -> Result<String, ClassifyError> {
    let unreadable = |e: std::io::Error| ClassifyError::Unreadable(e.to_string());
    if mime == "application/pdf" {
        return pdf_text(path).await;
    }
    if mime.contains("wordprocessingml") {
        return docx_text(path).await;
    }
    if is_texty(path, mime) {
        return read_text_prefix(path).await.map_err(unreadable);
    }
    Ok(String::new())
}

#[cfg(feature = "pdf")]
async fn pdf_text(path: &Path) -> Result<String, ClassifyError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path))
        .await
        .map_err(|e| ClassifyError::Unreadable(e.to_string()))?
        .map_err(|e| ClassifyError::Unreadable(e.to_string()))
}

#[cfg(not(feature = "pdf"))]
async fn pdf_text(_path: &Path) -> Result<String, ClassifyError> {
    Ok(String::new())
}

#[cfg(feature = "office")]
async fn docx_text(path: &Path) -> Result<String, ClassifyError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<String, ClassifyError> {
        use std::io::Read;
        let unreadable = |e: String| ClassifyError::Unreadable(e);
        let file = std::fs::File::open(&path).map_err(|e| unreadable(e.to_string()))?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| unreadable(e.to_string()))?;
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .map_err(|e| unreadable(e.to_string()))?
            .read_to_string(&mut xml)
            .map_err(|e| unreadable(e.to_string()))?;
        Ok(docx_xml_text(&xml))
    })
    .await
    .map_err(|e| ClassifyError::Unreadable(e.to_string()))?
}

#[cfg(not(feature = "office"))]
async fn docx_text(_path: &Path) -> Result<String, ClassifyError> {
    Ok(String::new())
}

/// Text of the first 150 paragraphs of a `word/document.xml` body.
pub fn docx_xml_text(xml: &str) -> String {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    const MAX_PARAGRAPHS: usize = 150;
    let mut reader = Reader::from_str(xml);
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text = true,
            Ok(Event::End(e)) if e.name().as_ref() == b"w:t" => in_text = false,
            Ok(Event::End(e)) if e.name().as_ref() == b"w:p" => {
                paragraphs.push(std::mem::take(&mut current));
                if paragraphs.len() >= MAX_PARAGRAPHS {
                    break;
                }
            }
            Ok(Event::Text(t)) if in_text => {
                if let Ok(text) = t.unescape() {
                    current.push_str(&text);
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    paragraphs.join("\n")
}

#[async_trait::async_trait]
impl Classifier for DocumentClassifier {
    fn name(&self) -> &'static str {
        "document"
    }

    /// Keyphrase extraction runs locally, so there is nothing to fail here.
    async fn load(&self) -> Result<(), ClassifyError> {
        Ok(())
    }

    async fn classify(&self, req: &ClassifyRequest) -> Result<ClassificationResult, ClassifyError> {
        let mime = req.mime_type.as_deref().unwrap_or("application/pdf");
        let text = extract_text(&req.path, mime).await?;
        if text.trim().chars().count() < MIN_TEXT_CHARS {
            return Ok(ClassificationResult::new(UNREADABLE_LABEL, 0.0));
        }

        let keyphrases = extract_keyphrases(&text, CANDIDATES);
        let Some((_, top_score)) = keyphrases.first().cloned() else {
            return Ok(ClassificationResult::new(GENERAL_LABEL, 0.0));
        };
        let candidates: Vec<String> = keyphrases.into_iter().map(|(k, _)| k).collect();
        debug!(path = %req.path.display(), ?candidates, "document topic candidates");

        if let Some((folder, score)) = self
            .best_existing_folder(&candidates, &req.existing_folders)
            .await
        {
            if score > self.merge_threshold {
                info!(folder = %folder, score, "merging document into existing folder");
                return Ok(ClassificationResult::new(folder, score).with_metadata(
                    serde_json::json!({ "candidates": candidates, "merged": true }),
                ));
            }
        }

        Ok(ClassificationResult::new(candidates[0].clone(), top_score)
            .with_metadata(serde_json::json!({ "candidates": candidates, "merged": false })))
    }
}
