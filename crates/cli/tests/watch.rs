use cli::watch::WatchScheduler;
use organizer_core::classifier::Capabilities;
use organizer_core::config::AppConfig;
use organizer_core::executor::MoveOutcome;
use organizer_core::indexer::IndexStore;
use organizer_core::Organizer;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

async fn organizer(root: &Path) -> Arc<Organizer> {
    let config = AppConfig::new(root, root).with_ai(false);
    let index = IndexStore::open(&config.index_path()).await.unwrap();
    Arc::new(Organizer::new(Arc::new(config), Capabilities::default(), Some(index)))
}

async fn wait_for(path: &Path, timeout: Duration) -> bool {
    let started = Instant::now();
    while started.elapsed() < timeout {
        if path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    path.exists()
}

#[tokio::test]
async fn debounced_create_is_organized() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    let org = organizer(root).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = WatchScheduler::new(org.clone(), false)
        .unwrap()
        .with_debounce(Duration::from_millis(200))
        .with_reporter(tx)
        .start(root)
        .unwrap();

    std::fs::write(root.join("notes.txt"), "meeting notes").unwrap();
    assert!(wait_for(&root.join("Documents/notes.txt"), Duration::from_secs(10)).await);
    let outcome = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, MoveOutcome::Recorded { .. }));

    handle.stop().await.unwrap();
    assert!(!root.join("notes.txt").exists());
    assert_eq!(org.index().unwrap().count().await.unwrap(), 1);
}

#[tokio::test]
async fn stopping_cancels_pending_debounce() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    let handle = WatchScheduler::new(organizer(root).await, false)
        .unwrap()
        .with_debounce(Duration::from_secs(30))
        .start(root)
        .unwrap();

    std::fs::write(root.join("draft.txt"), "half written").unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let started = Instant::now();
    handle.stop().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(root.join("draft.txt").exists());
    assert!(!root.join("Documents/draft.txt").exists());
}

#[tokio::test]
async fn ignored_names_are_left_alone() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    let mut config = AppConfig::new(root, root).with_ai(false);
    config.watcher.ignore_patterns = vec!["*.part".into()];
    let org = Arc::new(Organizer::new(Arc::new(config), Capabilities::default(), None));
    let handle = WatchScheduler::new(org, false)
        .unwrap()
        .with_debounce(Duration::from_millis(100))
        .start(root)
        .unwrap();

    std::fs::write(root.join("movie.mp4.part"), "partial").unwrap();
    std::fs::write(root.join("done.txt"), "complete").unwrap();
    assert!(wait_for(&root.join("Documents/done.txt"), Duration::from_secs(10)).await);
    tokio::time::sleep(Duration::from_millis(400)).await;
    handle.stop().await.unwrap();
    assert!(root.join("movie.mp4.part").exists());
    assert!(!root.join("Others").exists());
}
