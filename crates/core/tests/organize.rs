use organizer_core::classifier::Capabilities;
use organizer_core::config::AppConfig;
use organizer_core::executor::{MoveOutcome, SkipReason};
use organizer_core::indexer::IndexStore;
use organizer_core::pipeline::{run_batch, BatchSummary};
use organizer_core::Organizer;
use providers::{ClassificationResult, Classifier, ClassifyError, ClassifyRequest};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Answers with a label and confidence chosen from the file name.
struct ByName(fn(&str) -> Result<ClassificationResult, ClassifyError>);

#[async_trait::async_trait]
impl Classifier for ByName {
    fn name(&self) -> &'static str {
        "by-name"
    }
    async fn load(&self) -> Result<(), ClassifyError> {
        Ok(())
    }
    async fn classify(&self, req: &ClassifyRequest) -> Result<ClassificationResult, ClassifyError> {
        let name = req
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        (self.0)(&name)
    }
}

fn all(classifier: Arc<dyn Classifier>) -> Capabilities {
    Capabilities {
        image: Some(classifier.clone()),
        video: Some(classifier.clone()),
        audio: Some(classifier.clone()),
        document: Some(classifier),
    }
}

fn write(path: &Path, body: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

async fn organizer(config: AppConfig, caps: Capabilities) -> Arc<Organizer> {
    let index = IndexStore::open(&config.index_path()).await.unwrap();
    Arc::new(Organizer::new(Arc::new(config), caps, Some(index)))
}

async fn batch(org: &Arc<Organizer>, root: &Path, use_ai: bool) -> BatchSummary {
    run_batch(org.clone(), root, use_ai, CancellationToken::new())
        .await
        .unwrap()
}

fn destinations(summary: &BatchSummary) -> Vec<PathBuf> {
    summary
        .reports
        .iter()
        .filter_map(|r| match &r.outcome {
            MoveOutcome::Recorded { destination, .. } => Some(destination.clone()),
            _ => None,
        })
        .collect()
}

fn sample_tree(root: &Path) {
    write(&root.join("report.pdf"), b"Quarterly revenue grew across every region this year.");
    write(&root.join("song.mp3"), b"not really audio");
    write(&root.join("photo.jpg"), &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10]);
    write(&root.join("video.mov"), b"not really a movie");
}

fn scenario(name: &str) -> Result<ClassificationResult, ClassifyError> {
    Ok(match name {
        "report.pdf" => ClassificationResult::new("quarterly revenue", 0.1),
        "song.mp3" => ClassificationResult::new("Music", 0.5),
        "photo.jpg" => ClassificationResult::new("beach", 0.7),
        _ => ClassificationResult::new("cat", 0.2),
    })
}

#[tokio::test]
async fn ai_disabled_uses_category_roots() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    sample_tree(root);
    let org = organizer(AppConfig::new(root, root).with_ai(false), Capabilities::default()).await;

    let summary = batch(&org, root, false).await;
    assert_eq!((summary.discovered, summary.organized), (4, 4));
    assert!(root.join("Documents/report.pdf").is_file());
    assert!(root.join("Audio/song.mp3").is_file());
    assert!(root.join("Images/photo.jpg").is_file());
    assert!(root.join("Videos/video.mov").is_file());
    let index = org.index().unwrap();
    assert_eq!(index.count().await.unwrap(), 4);
    let record = index
        .get(&root.join("Images/photo.jpg"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.label, "not_classified");
}

#[tokio::test]
async fn ai_enabled_applies_threshold_and_document_folders() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    sample_tree(root);
    let org = organizer(AppConfig::new(root, root), all(Arc::new(ByName(scenario)))).await;

    let summary = batch(&org, root, true).await;
    assert_eq!(summary.organized, 4);
    assert!(root.join("Documents/Quarterly Revenue/report.pdf").is_file());
    assert!(root.join("Audio/Music/song.mp3").is_file());
    assert!(root.join("Images/Beach/photo.jpg").is_file());
    assert!(root.join("Videos/video.mov").is_file());

    let doc = org
        .index()
        .unwrap()
        .get(&root.join("Documents/Quarterly Revenue/report.pdf"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.label, "Quarterly Revenue");
    assert_eq!(doc.metadata["destination_existed"], serde_json::json!(false));
    let video = org
        .index()
        .unwrap()
        .get(&root.join("Videos/video.mov"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(video.label, "cat");
}

#[tokio::test]
async fn batch_walks_subdirectories_even_when_watching_flat() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    write(&root.join("sub/deep.txt"), b"nested notes");
    let mut config = AppConfig::new(root, root).with_ai(false);
    config.watcher.recursive = false;
    let org = organizer(config, Capabilities::default()).await;

    let summary = batch(&org, root, false).await;
    assert_eq!((summary.discovered, summary.organized), (1, 1));
    assert!(root.join("Documents/deep.txt").is_file());
}

#[tokio::test]
async fn second_run_discovers_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    sample_tree(root);
    write(&root.join("misc/notes.xyz"), b"odd");
    let org = organizer(AppConfig::new(root, root), all(Arc::new(ByName(scenario)))).await;

    let first = batch(&org, root, true).await;
    assert_eq!(first.discovered, 5);
    assert!(root.join("Others/notes.xyz").is_file());
    let second = batch(&org, root, true).await;
    assert_eq!(second.discovered, 0);
    assert_eq!(second.organized, 0);
}

#[tokio::test]
async fn confidence_threshold_is_inclusive() {
    fn edge(name: &str) -> Result<ClassificationResult, ClassifyError> {
        Ok(match name {
            "at.png" => ClassificationResult::new("dog", 0.5),
            _ => ClassificationResult::new("dog", 0.49),
        })
    }
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    write(&root.join("at.png"), b"png-ish");
    write(&root.join("below.png"), b"png-ish");
    let org = organizer(AppConfig::new(root, root), all(Arc::new(ByName(edge)))).await;

    batch(&org, root, true).await;
    assert!(root.join("Images/Dog/at.png").is_file());
    assert!(root.join("Images/below.png").is_file());
}

#[tokio::test]
async fn same_named_files_are_both_kept() {
    let temp = tempfile::tempdir().unwrap();
    let watch = temp.path().join("inbox");
    let out = temp.path().join("sorted");
    write(&watch.join("a/notes.txt"), b"first copy");
    write(&watch.join("b/notes.txt"), b"second copy");
    let org = organizer(AppConfig::new(&watch, &out), Capabilities::default()).await;

    let summary = batch(&org, &watch, false).await;
    assert_eq!(summary.organized, 2);
    let dests = destinations(&summary);
    assert_eq!(dests[0], out.join("Documents/notes.txt"));
    assert_ne!(dests[0], dests[1]);
    let mut bodies: Vec<String> = dests
        .iter()
        .map(|d| std::fs::read_to_string(d).unwrap())
        .collect();
    bodies.sort();
    assert_eq!(bodies, vec!["first copy", "second copy"]);
}

#[tokio::test]
async fn parallel_workers_keep_same_named_files() {
    let temp = tempfile::tempdir().unwrap();
    let watch = temp.path().join("inbox");
    let out = temp.path().join("sorted");
    for i in 0..6 {
        write(&watch.join(format!("d{i}/same.txt")), format!("copy {i}").as_bytes());
    }
    let mut config = AppConfig::new(&watch, &out);
    config.batch.workers = 4;
    let org = organizer(config, Capabilities::default()).await;

    let summary = batch(&org, &watch, false).await;
    assert_eq!(summary.organized, 6);
    let kept = std::fs::read_dir(out.join("Documents")).unwrap().count();
    assert_eq!(kept, 6);
    assert_eq!(org.index().unwrap().count().await.unwrap(), 6);
}

#[tokio::test]
async fn failing_classifier_still_organizes_into_category_roots() {
    fn broken(_: &str) -> Result<ClassificationResult, ClassifyError> {
        Err(ClassifyError::Unreadable("corrupt".into()))
    }
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    sample_tree(root);
    let org = organizer(AppConfig::new(root, root), all(Arc::new(ByName(broken)))).await;

    let summary = batch(&org, root, true).await;
    assert_eq!((summary.organized, summary.failed), (4, 0));
    assert!(root.join("Documents/report.pdf").is_file());
    assert!(root.join("Audio/song.mp3").is_file());
    assert!(root.join("Images/photo.jpg").is_file());
    assert!(root.join("Videos/video.mov").is_file());
    let record = org
        .index()
        .unwrap()
        .get(&root.join("Documents/report.pdf"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.label, "unknown");
    assert_eq!(record.confidence, 0.0);
}

#[tokio::test]
async fn vanished_file_is_not_indexed() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    let org = organizer(AppConfig::new(root, root), Capabilities::default()).await;
    let ghost = root.join("ghost.txt");

    let outcome = org
        .organize_file(&ghost, false, &CancellationToken::new())
        .await;
    assert!(matches!(outcome, MoveOutcome::Skipped { .. }));
    assert_eq!(org.index().unwrap().count().await.unwrap(), 0);
}

#[tokio::test]
async fn file_that_stays_locked_is_skipped_and_not_indexed() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    // a regular file standing where a directory is expected keeps the path unopenable
    write(&root.join("partial"), b"still copying");
    let stuck = root.join("partial").join("movie.mov");
    let mut config = AppConfig::new(root, root);
    config.retry.backoff_ms = vec![10, 10];
    let org = organizer(config, Capabilities::default()).await;

    let outcome = org
        .organize_file(&stuck, false, &CancellationToken::new())
        .await;
    assert!(matches!(
        outcome,
        MoveOutcome::Skipped {
            reason: SkipReason::Locked,
            ..
        }
    ));
    assert_eq!(org.index().unwrap().count().await.unwrap(), 0);
    assert!(root.join("partial").is_file());
}
