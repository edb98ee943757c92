use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const INDEX_FILE_NAME: &str = "file_index.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub watch_directory: PathBuf,
    pub organized_directory: PathBuf,
    #[serde(default = "default_true")]
    pub use_ai: bool,
    #[serde(default = "default_threshold")]
    pub confidence_threshold: f32,
    /// Ordered; an extension listed under two categories belongs to the first.
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryConfig>,
    #[serde(default = "default_fallback_category")]
    pub fallback_category: String,
    #[serde(default = "default_documents_category")]
    pub documents_category: String,
    /// Categories whose files are sent to a content classifier.
    #[serde(default = "default_ai_categories")]
    pub ai_categories: Vec<String>,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub models: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_debounce")]
    pub debounce_seconds: f64,
    #[serde(default = "default_true")]
    pub recursive: bool,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Waits between probe attempts, in order. Its length is the retry budget.
    #[serde(default = "default_backoff")]
    pub backoff_ms: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// `openai` or `noop`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,
    #[serde(default = "default_audio_types")]
    pub audio_types: Vec<String>,
    #[serde(default = "default_instrumental_label")]
    pub instrumental_label: String,
    #[serde(default = "default_video_frames")]
    pub video_frames: usize,
    #[serde(default = "default_merge_threshold")]
    pub merge_threshold: f32,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
}

/// Where organized output goes relative to the watched tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout<'a> {
    /// Category folders are created inside the watched directory itself.
    InPlace { root: &'a Path },
    Separate { watch: &'a Path, output: &'a Path },
}

fn default_true() -> bool {
    true
}
fn default_threshold() -> f32 {
    0.5
}
fn default_fallback_category() -> String {
    "Others".to_string()
}
fn default_documents_category() -> String {
    "Documents".to_string()
}
fn default_debounce() -> f64 {
    2.0
}
fn default_backoff() -> Vec<u64> {
    vec![250, 500, 1000, 2000, 4000]
}
fn default_workers() -> usize {
    1
}
fn default_provider() -> String {
    "openai".to_string()
}
fn default_vision_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_transcription_model() -> String {
    "whisper-1".to_string()
}
fn default_instrumental_label() -> String {
    "Music".to_string()
}
fn default_video_frames() -> usize {
    3
}
fn default_merge_threshold() -> f32 {
    0.65
}
fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}
fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_audio_types() -> Vec<String> {
    strings(&["music", "podcast", "lecture", "phone_call", "audiobook"])
}

fn default_ai_categories() -> Vec<String> {
    strings(&["Images", "Videos", "Documents", "Audio"])
}

pub fn default_categories() -> Vec<CategoryConfig> {
    let category = |name: &str, exts: &[&str]| CategoryConfig {
        name: name.to_string(),
        extensions: strings(exts),
    };
    vec![
        category(
            "Images",
            &["jpg", "jpeg", "png", "gif", "bmp", "webp", "heic", "tiff", "svg"],
        ),
        category("Videos", &["mp4", "mov", "avi", "mkv", "webm", "m4v", "wmv"]),
        category(
            "Documents",
            &["pdf", "doc", "docx", "txt", "md", "rtf", "odt", "epub", "mobi"],
        ),
        category("Audio", &["mp3", "wav", "flac", "aac", "ogg", "m4a"]),
        category("Archives", &["zip", "rar", "7z", "tar", "gz"]),
        category("Code", &["rs", "py", "js", "ts", "java", "c", "cpp", "go"]),
    ]
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_seconds: default_debounce(),
            recursive: true,
            ignore_patterns: Vec::new(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff_ms: default_backoff(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            vision_model: default_vision_model(),
            embedding_model: default_embedding_model(),
            transcription_model: default_transcription_model(),
            audio_types: default_audio_types(),
            instrumental_label: default_instrumental_label(),
            video_frames: default_video_frames(),
            merge_threshold: default_merge_threshold(),
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

impl AppConfig {
    /// A configuration with every optional setting at its default.
    pub fn new(watch_directory: impl Into<PathBuf>, organized_directory: impl Into<PathBuf>) -> Self {
        Self {
            watch_directory: watch_directory.into(),
            organized_directory: organized_directory.into(),
            use_ai: true,
            confidence_threshold: default_threshold(),
            categories: default_categories(),
            fallback_category: default_fallback_category(),
            documents_category: default_documents_category(),
            ai_categories: default_ai_categories(),
            watcher: WatcherConfig::default(),
            retry: RetryConfig::default(),
            batch: BatchConfig::default(),
            database: DatabaseConfig::default(),
            models: ModelConfig::default(),
        }
    }

    /// Same settings, organizing `dir` into itself.
    pub fn in_place(&self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            watch_directory: dir.clone(),
            organized_directory: dir,
            ..self.clone()
        }
    }

    pub fn with_ai(&self, use_ai: bool) -> Self {
        Self {
            use_ai,
            ..self.clone()
        }
    }

    pub fn layout(&self) -> Layout<'_> {
        if self.watch_directory == self.organized_directory {
            Layout::InPlace {
                root: &self.organized_directory,
            }
        } else {
            Layout::Separate {
                watch: &self.watch_directory,
                output: &self.organized_directory,
            }
        }
    }

    pub fn index_path(&self) -> PathBuf {
        match &self.database.path {
            Some(p) => PathBuf::from(p),
            None => self.organized_directory.join(INDEX_FILE_NAME),
        }
    }

    pub fn backoff_schedule(&self) -> Vec<Duration> {
        self.retry
            .backoff_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_secs_f64(self.watcher.debounce_seconds.max(0.0))
    }
}

pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(
        config::Environment::with_prefix("ORGANIZER")
            .separator("__")
            .try_parsing(true),
    );
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_values_and_defaults_merge() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("organizer.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
watch_directory = "/data/inbox"
organized_directory = "/data/sorted"
confidence_threshold = 0.7

[[categories]]
name = "Images"
extensions = ["jpg", "png"]

[watcher]
debounce_seconds = 0.5
ignore_patterns = ["*.tmp", "~$*"]
"#
        )
        .unwrap();

        let cfg = load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(cfg.watch_directory, PathBuf::from("/data/inbox"));
        assert!((cfg.confidence_threshold - 0.7).abs() < 1e-6);
        assert_eq!(cfg.categories.len(), 1);
        assert_eq!(cfg.categories[0].name, "Images");
        assert!(cfg.use_ai);
        assert!(cfg.watcher.recursive);
        assert_eq!(cfg.watcher.ignore_patterns, vec!["*.tmp", "~$*"]);
        assert_eq!(cfg.debounce(), Duration::from_millis(500));
        assert_eq!(cfg.backoff_schedule().len(), 5);
        assert_eq!(cfg.index_path(), PathBuf::from("/data/sorted").join(INDEX_FILE_NAME));
    }

    #[test]
    fn in_place_is_a_layout_not_a_mutation() {
        let base = AppConfig::new("/inbox", "/sorted");
        assert!(matches!(base.layout(), Layout::Separate { .. }));

        let here = base.in_place("/downloads");
        assert_eq!(
            here.layout(),
            Layout::InPlace {
                root: Path::new("/downloads")
            }
        );
        assert_eq!(base.watch_directory, PathBuf::from("/inbox"));
    }
}
