use crate::classifier::Capabilities;
use crate::config::AppConfig;
use crate::executor::MoveOutcome;
use crate::indexer::IndexStore;
use crate::organizer::Organizer;
use anyhow::Context;
use providers::audio::{AudioClassifier, AudioSettings};
use providers::document::DocumentClassifier;
use providers::image::ImageClassifier;
use providers::noop::NoopProvider;
use providers::openai::{OpenAiConfig, OpenAiProvider};
use providers::video::{FfmpegSampler, VideoClassifier};
use providers::{Classifier, ProviderRegistry};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com";

/// Per-file line of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub name: String,
    pub outcome: MoveOutcome,
}

impl FileReport {
    fn new(outcome: MoveOutcome) -> Self {
        let name = outcome
            .source()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| outcome.source().display().to_string());
        Self { name, outcome }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub discovered: usize,
    pub organized: usize,
    pub skipped: usize,
    pub failed: usize,
    pub reports: Vec<FileReport>,
}

impl BatchSummary {
    fn push(&mut self, outcome: MoveOutcome) {
        match outcome {
            MoveOutcome::Recorded { .. } => self.organized += 1,
            MoveOutcome::Skipped { .. } => self.skipped += 1,
            MoveOutcome::Failed { .. } => self.failed += 1,
        }
        self.reports.push(FileReport::new(outcome));
    }
}

pub fn build_registry(config: &AppConfig) -> ProviderRegistry {
    let noop = Arc::new(NoopProvider);
    let mut reg = ProviderRegistry::new()
        .with_embedding("noop", noop.clone())
        .with_vision("noop", noop.clone())
        .with_transcription("noop", noop);

    if let Some(key) = std::env::var_os("OPENAI_API_KEY") {
        let base = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_OPENAI_BASE.into());
        let provider = Arc::new(OpenAiProvider::new(OpenAiConfig {
            api_key: key.to_string_lossy().into_owned(),
            base_url: base,
            embedding_model: config.models.embedding_model.clone(),
            vision_model: config.models.vision_model.clone(),
            transcription_model: config.models.transcription_model.clone(),
        }));
        reg = reg
            .with_embedding("openai", provider.clone())
            .with_vision("openai", provider.clone())
            .with_transcription("openai", provider);
    }

    reg.set_preferred(&config.models.provider)
}

/// Wires the four classifier capabilities to whatever the registry provides.
/// A missing provider leaves the capability to report itself unavailable on load.
pub fn build_capabilities(config: &AppConfig, registry: &ProviderRegistry) -> Capabilities {
    let vision = registry.vision(None).ok();
    let embedder = registry.embedding(None).ok();
    let transcriber = registry.transcription(None).ok();
    if vision.is_none() {
        debug!(provider = %config.models.provider, "no vision provider registered");
    }

    let image: Arc<dyn Classifier> = Arc::new(ImageClassifier::new(vision));
    let sampler = Arc::new(FfmpegSampler::new(
        config.models.ffmpeg.clone(),
        config.models.ffprobe.clone(),
    ));
    let video = Arc::new(VideoClassifier::new(sampler, image.clone(), config.models.video_frames));
    let audio = Arc::new(AudioClassifier::new(
        transcriber,
        embedder.clone(),
        AudioSettings {
            audio_types: config.models.audio_types.clone(),
            instrumental_label: config.models.instrumental_label.clone(),
        },
    ));
    let document = Arc::new(DocumentClassifier::new(embedder, config.models.merge_threshold));

    Capabilities {
        image: Some(image),
        video: Some(video),
        audio: Some(audio),
        document: Some(document),
    }
}

/// Creates the output root, opens the index and assembles the engine.
pub async fn build_organizer(config: Arc<AppConfig>) -> anyhow::Result<Organizer> {
    std::fs::create_dir_all(&config.organized_directory).with_context(|| {
        format!(
            "create output directory {}",
            config.organized_directory.display()
        )
    })?;
    let index = IndexStore::open(&config.index_path())
        .await
        .context("open file index")?;
    let registry = build_registry(&config);
    let capabilities = if config.use_ai {
        build_capabilities(&config, &registry)
    } else {
        Capabilities::default()
    };
    Ok(Organizer::new(config, capabilities, Some(index)))
}

/// Sweeps `root` once. Per-file problems end up in the summary, never as an error.
pub async fn run_batch(
    organizer: Arc<Organizer>,
    root: &Path,
    use_ai: bool,
    cancel: CancellationToken,
) -> anyhow::Result<BatchSummary> {
    let files = {
        let organizer = organizer.clone();
        let root = root.to_path_buf();
        tokio::task::spawn_blocking(move || organizer.discover(&root))
            .await
            .context("walk directory")?
    };
    info!(root = %root.display(), files = files.len(), "starting batch");

    let mut summary = BatchSummary {
        discovered: files.len(),
        ..BatchSummary::default()
    };
    let workers = organizer.config().batch.workers.max(1);
    if workers == 1 {
        for path in files {
            let outcome = organizer.organize_file(&path, use_ai, &cancel).await;
            summary.push(outcome);
        }
    } else {
        for outcome in run_pool(organizer, files, use_ai, workers, cancel).await {
            summary.push(outcome);
        }
    }

    info!(
        organized = summary.organized,
        skipped = summary.skipped,
        failed = summary.failed,
        "batch complete"
    );
    Ok(summary)
}

async fn run_pool(
    organizer: Arc<Organizer>,
    files: Vec<PathBuf>,
    use_ai: bool,
    workers: usize,
    cancel: CancellationToken,
) -> Vec<MoveOutcome> {
    let permits = Arc::new(Semaphore::new(workers));
    let mut set = JoinSet::new();
    for (i, path) in files.into_iter().enumerate() {
        let organizer = organizer.clone();
        let permits = permits.clone();
        let cancel = cancel.clone();
        set.spawn(async move {
            let outcome = match permits.acquire_owned().await {
                Ok(_permit) => organizer.organize_file(&path, use_ai, &cancel).await,
                Err(_) => MoveOutcome::Failed {
                    source: path.clone(),
                    reason: "worker pool closed".into(),
                },
            };
            (i, outcome)
        });
    }
    let mut outcomes = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(pair) => outcomes.push(pair),
            Err(e) => warn!(error = %e, "organize task panicked"),
        }
    }
    outcomes.sort_by_key(|(i, _)| *i);
    outcomes.into_iter().map(|(_, o)| o).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_build_reads_pdf_and_office_documents() {
        assert!(cfg!(feature = "pdf"));
        assert!(cfg!(feature = "office"));
    }

    #[test]
    fn every_capability_is_wired() {
        let config = AppConfig::new("/inbox", "/sorted");
        let caps = build_capabilities(&config, &build_registry(&config));
        assert!(caps.image.is_some());
        assert!(caps.video.is_some());
        assert!(caps.audio.is_some());
        assert!(caps.document.is_some());
    }
}
