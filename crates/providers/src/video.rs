//! Video capability: samples a few representative frames and lets the image
//! capability vote on a label.

use crate::capability::{
    ClassificationResult, Classifier, ClassifyError, ClassifyRequest, LazyModel,
};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, warn};

pub const CORRUPTED_LABEL: &str = "corrupted_video";
pub const UNKNOWN_VIDEO_LABEL: &str = "unknown_video";

/// Extracts still frames from a video file.
#[async_trait::async_trait]
pub trait FrameSampler: Send + Sync {
    /// Checks the sampler's tooling is usable.
    async fn ready(&self) -> Result<(), ClassifyError>;

    /// Duration of the video in seconds.
    async fn duration(&self, video: &Path) -> Result<f64, ClassifyError>;

    /// Writes the frame at `at_secs` to `out` as JPEG. `Ok(false)` when no frame could be read.
    async fn grab(&self, video: &Path, at_secs: f64, out: &Path) -> Result<bool, ClassifyError>;
}

/// Frame timestamps spread evenly from the start to just before the end.
pub fn sample_positions(duration: f64, count: usize) -> Vec<f64> {
    if count == 0 || !duration.is_finite() || duration <= 0.0 {
        return if count == 0 { Vec::new() } else { vec![0.0] };
    }
    let tail = (duration * 0.05).min(0.5);
    let last = (duration - tail).max(0.0);
    if count == 1 {
        return vec![last / 2.0];
    }
    (0..count)
        .map(|i| last * i as f64 / (count - 1) as f64)
        .collect()
}

/// Most frequent label; ties go to the label seen first.
pub fn majority_vote(labels: &[String]) -> Option<(String, usize)> {
    let mut best: Option<(&String, usize)> = None;
    for label in labels {
        let count = labels.iter().filter(|l| *l == label).count();
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((label, count));
        }
    }
    best.map(|(l, c)| (l.clone(), c))
}

pub struct FfmpegSampler {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegSampler {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }
}

#[async_trait::async_trait]
impl FrameSampler for FfmpegSampler {
    async fn ready(&self) -> Result<(), ClassifyError> {
        for bin in [&self.ffmpeg, &self.ffprobe] {
            let status = Command::new(bin)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map_err(|e| ClassifyError::ModelUnavailable(format!("{bin}: {e}")))?;
            if !status.success() {
                return Err(ClassifyError::ModelUnavailable(format!(
                    "{bin} exited with {status}"
                )));
            }
        }
        Ok(())
    }

    async fn duration(&self, video: &Path) -> Result<f64, ClassifyError> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-show_entries", "format=duration", "-of", "csv=p=0"])
            .arg(video)
            .output()
            .await
            .map_err(|e| ClassifyError::Unreadable(e.to_string()))?;
        if !output.status.success() {
            return Err(ClassifyError::Unreadable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<f64>()
            .map_err(|e| ClassifyError::Unreadable(format!("bad duration: {e}")))
    }

    async fn grab(&self, video: &Path, at_secs: f64, out: &Path) -> Result<bool, ClassifyError> {
        let status = Command::new(&self.ffmpeg)
            .args(["-y", "-v", "error", "-ss", &format!("{at_secs:.3}"), "-i"])
            .arg(video)
            .args(["-frames:v", "1"])
            .arg(out)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| ClassifyError::Unreadable(e.to_string()))?;
        Ok(status.success() && out.exists())
    }
}

pub struct VideoClassifier {
    sampler: Arc<dyn FrameSampler>,
    images: Arc<dyn Classifier>,
    frames: usize,
    tooling: LazyModel<()>,
}

impl VideoClassifier {
    pub fn new(sampler: Arc<dyn FrameSampler>, images: Arc<dyn Classifier>, frames: usize) -> Self {
        Self {
            sampler,
            images,
            frames: frames.max(1),
            tooling: LazyModel::new(),
        }
    }
}

#[async_trait::async_trait]
impl Classifier for VideoClassifier {
    fn name(&self) -> &'static str {
        "video"
    }

    async fn load(&self) -> Result<(), ClassifyError> {
        self.images.load().await?;
        let sampler = self.sampler.clone();
        self.tooling
            .get_or_load(|| async move { sampler.ready().await })
            .await
            .map(|_| ())
    }

    async fn classify(&self, req: &ClassifyRequest) -> Result<ClassificationResult, ClassifyError> {
        self.load().await?;
        let duration = match self.sampler.duration(&req.path).await {
            Ok(d) => d,
            Err(e) => {
                debug!(path = %req.path.display(), error = %e, "video could not be opened");
                return Ok(ClassificationResult::new(CORRUPTED_LABEL, 0.0));
            }
        };

        // Frames live in a scratch directory that is removed on drop.
        let scratch = tempfile::tempdir().map_err(|e| ClassifyError::Unreadable(e.to_string()))?;
        let mut labels = Vec::new();
        for (i, at) in sample_positions(duration, self.frames).into_iter().enumerate() {
            let frame = scratch.path().join(format!("frame_{i}.jpg"));
            match self.sampler.grab(&req.path, at, &frame).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    debug!(error = %e, at, "frame grab failed");
                    continue;
                }
            }
            match self
                .images
                .classify(&ClassifyRequest::new(&frame).with_mime("image/jpeg"))
                .await
            {
                Ok(result) => labels.push(result.label),
                Err(e) => warn!(error = %e, at, "frame classification failed"),
            }
        }

        match majority_vote(&labels) {
            Some((label, votes)) => Ok(ClassificationResult::new(
                label,
                votes as f32 / labels.len() as f32,
            )
            .with_metadata(serde_json::json!({ "frame_labels": labels }))),
            None => Ok(ClassificationResult::new(UNKNOWN_VIDEO_LABEL, 0.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn positions_cover_start_middle_and_end() {
        let p = sample_positions(100.0, 3);
        assert_eq!(p.len(), 3);
        assert_eq!(p[0], 0.0);
        assert!((p[1] - 49.75).abs() < 1e-9);
        assert!((p[2] - 99.5).abs() < 1e-9);
        assert_eq!(sample_positions(0.0, 3), vec![0.0]);
        assert!(sample_positions(10.0, 0).is_empty());
    }

    #[test]
    fn vote_prefers_majority_then_first_seen() {
        let labels: Vec<String> = ["cat", "dog", "dog"].iter().map(|s| s.to_string()).collect();
        assert_eq!(majority_vote(&labels), Some(("dog".to_string(), 2)));
        let tie: Vec<String> = ["cat", "dog"].iter().map(|s| s.to_string()).collect();
        assert_eq!(majority_vote(&tie), Some(("cat".to_string(), 1)));
        assert_eq!(majority_vote(&[]), None);
    }

    #[derive(Default)]
    struct ScriptedSampler {
        duration: Option<f64>,
        readiness_checks: AtomicUsize,
        missing_tools: bool,
    }

    #[async_trait::async_trait]
    impl FrameSampler for ScriptedSampler {
        async fn ready(&self) -> Result<(), ClassifyError> {
            self.readiness_checks.fetch_add(1, Ordering::SeqCst);
            if self.missing_tools {
                return Err(ClassifyError::ModelUnavailable("ffmpeg: not found".into()));
            }
            Ok(())
        }
        async fn duration(&self, _video: &Path) -> Result<f64, ClassifyError> {
            self.duration
                .ok_or_else(|| ClassifyError::Unreadable("not a video".into()))
        }
        async fn grab(&self, _video: &Path, at: f64, out: &Path) -> Result<bool, ClassifyError> {
            std::fs::write(out, format!("{at}")).unwrap();
            Ok(true)
        }
    }

    /// Labels frames by the timestamp the sampler wrote into them.
    struct FrameLabeler {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Classifier for FrameLabeler {
        fn name(&self) -> &'static str {
            "image"
        }
        async fn load(&self) -> Result<(), ClassifyError> {
            Ok(())
        }
        async fn classify(
            &self,
            req: &ClassifyRequest,
        ) -> Result<ClassificationResult, ClassifyError> {
            let at: f64 = std::fs::read_to_string(&req.path).unwrap().parse().unwrap();
            self.seen.lock().unwrap().push(req.path.display().to_string());
            let label = if at < 1.0 { "title_card" } else { "beach" };
            Ok(ClassificationResult::new(label, 0.9))
        }
    }

    #[tokio::test]
    async fn majority_of_frames_wins() {
        let labeler = Arc::new(FrameLabeler { seen: Mutex::new(Vec::new()) });
        let video = VideoClassifier::new(
            Arc::new(ScriptedSampler {
                duration: Some(60.0),
                ..Default::default()
            }),
            labeler.clone(),
            3,
        );
        let result = video
            .classify(&ClassifyRequest::new("/videos/holiday.mov"))
            .await
            .unwrap();
        assert_eq!(result.label, "beach");
        assert!((result.confidence - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(labeler.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unopenable_video_is_corrupted() {
        let video = VideoClassifier::new(
            Arc::new(ScriptedSampler::default()),
            Arc::new(FrameLabeler { seen: Mutex::new(Vec::new()) }),
            3,
        );
        let result = video
            .classify(&ClassifyRequest::new("/videos/broken.mp4"))
            .await
            .unwrap();
        assert_eq!(result.label, CORRUPTED_LABEL);
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test]
    async fn tooling_is_checked_once() {
        let sampler = Arc::new(ScriptedSampler {
            duration: Some(10.0),
            ..Default::default()
        });
        let video = VideoClassifier::new(
            sampler.clone(),
            Arc::new(FrameLabeler { seen: Mutex::new(Vec::new()) }),
            1,
        );
        for _ in 0..3 {
            video.load().await.unwrap();
            video
                .classify(&ClassifyRequest::new("/videos/clip.mp4"))
                .await
                .unwrap();
        }
        assert_eq!(sampler.readiness_checks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_tooling_stays_unavailable() {
        let sampler = Arc::new(ScriptedSampler {
            missing_tools: true,
            ..Default::default()
        });
        let video = VideoClassifier::new(
            sampler.clone(),
            Arc::new(FrameLabeler { seen: Mutex::new(Vec::new()) }),
            1,
        );
        for _ in 0..2 {
            let err = video.load().await.unwrap_err();
            assert!(matches!(err, ClassifyError::ModelUnavailable(_)));
        }
        assert_eq!(sampler.readiness_checks.load(Ordering::SeqCst), 1);
    }
}
