//! Continuous mode: filesystem create events, debounced per file, feed the organizer.

use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};
use notify::event::{CreateKind, EventKind, ModifyKind, RenameMode};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use organizer_core::executor::MoveOutcome;
use organizer_core::Organizer;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
enum IgnoreRule {
    Suffix(String),
    Prefix(String),
    Glob(GlobMatcher),
    Substring(String),
}

/// Paths the watcher should not react to.
///
/// `*.tmp` matches file names ending in `.tmp`, `~$*` file names starting with
/// `~$`. Patterns with other glob syntax are matched against the file name;
/// anything else matches as a substring of the full path.
#[derive(Debug, Clone, Default)]
pub struct IgnoreMatcher {
    rules: Vec<IgnoreRule>,
}

fn has_glob_syntax(s: &str) -> bool {
    s.contains(['*', '?', '[', '{'])
}

impl IgnoreMatcher {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut rules = Vec::with_capacity(patterns.len());
        for pattern in patterns.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
            let rule = if let Some(rest) = pattern.strip_prefix('*').filter(|r| !has_glob_syntax(r)) {
                IgnoreRule::Suffix(rest.to_string())
            } else if let Some(rest) = pattern.strip_suffix('*').filter(|r| !has_glob_syntax(r)) {
                IgnoreRule::Prefix(rest.to_string())
            } else if has_glob_syntax(pattern) {
                let glob = Glob::new(pattern)
                    .with_context(|| format!("invalid ignore pattern {pattern:?}"))?;
                IgnoreRule::Glob(glob.compile_matcher())
            } else {
                IgnoreRule::Substring(pattern.to_string())
            };
            rules.push(rule);
        }
        Ok(Self { rules })
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        let full = path.to_string_lossy();
        self.rules.iter().any(|rule| match rule {
            IgnoreRule::Suffix(s) => name.ends_with(s.as_str()),
            IgnoreRule::Prefix(p) => name.starts_with(p.as_str()),
            IgnoreRule::Glob(g) => g.is_match(&*name),
            IgnoreRule::Substring(s) => full.contains(s.as_str()),
        })
    }
}

/// Paths in an event that count as newly created files.
fn created_paths(event: Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_) => event.paths,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.into_iter().last().into_iter().collect()
        }
        _ => Vec::new(),
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

pub struct WatchScheduler {
    organizer: Arc<Organizer>,
    ignore: IgnoreMatcher,
    debounce: Duration,
    use_ai: bool,
    reporter: Option<mpsc::UnboundedSender<MoveOutcome>>,
}

/// A running watcher. Dropping it without `stop` leaves the loop running.
pub struct WatchHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels pending debounce timers, releases the subscription and waits
    /// for moves already under way.
    pub async fn stop(self) -> Result<()> {
        self.cancel.cancel();
        self.task.await.context("watch loop panicked")?;
        Ok(())
    }
}

impl WatchScheduler {
    pub fn new(organizer: Arc<Organizer>, use_ai: bool) -> Result<Self> {
        let config = organizer.config();
        Ok(Self {
            ignore: IgnoreMatcher::new(&config.watcher.ignore_patterns)?,
            debounce: config.debounce(),
            use_ai,
            reporter: None,
            organizer,
        })
    }

    /// Every finished file is also sent to `tx`.
    pub fn with_reporter(mut self, tx: mpsc::UnboundedSender<MoveOutcome>) -> Self {
        self.reporter = Some(tx);
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn start(self, root: &Path) -> Result<WatchHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            notify::Config::default(),
        )
        .context("create filesystem watcher")?;
        let mode = if self.organizer.config().watcher.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(root, mode)
            .with_context(|| format!("watch {}", root.display()))?;
        info!(root = %root.display(), debounce = ?self.debounce, "watching");

        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(watcher, rx, cancel.clone()));
        Ok(WatchHandle { cancel, task })
    }

    fn wants(&self, path: &Path, pending: &HashSet<PathBuf>) -> bool {
        if self.organizer.tree().contains(path) {
            debug!(path = %path.display(), "ignoring organized output");
            return false;
        }
        if is_hidden(path) || self.ignore.is_ignored(path) {
            debug!(path = %path.display(), "ignored by pattern");
            return false;
        }
        if path.is_dir() || pending.contains(path) {
            return false;
        }
        true
    }

    async fn run(
        self,
        watcher: RecommendedWatcher,
        mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
        cancel: CancellationToken,
    ) {
        let mut pending: HashSet<PathBuf> = HashSet::new();
        let mut timers: JoinSet<PathBuf> = JoinSet::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(done) = timers.join_next(), if !timers.is_empty() => {
                    match done {
                        Ok(path) => { pending.remove(&path); }
                        Err(e) => warn!(error = %e, "debounce task failed"),
                    }
                }
                received = rx.recv() => {
                    let Some(res) = received else { break };
                    let event = match res {
                        Ok(event) => event,
                        Err(e) => {
                            warn!(error = %e, "watch error");
                            continue;
                        }
                    };
                    for path in created_paths(event) {
                        if !self.wants(&path, &pending) {
                            continue;
                        }
                        pending.insert(path.clone());
                        timers.spawn(self.debounced(path, cancel.clone()));
                    }
                }
            }
        }

        drop(watcher);
        while let Some(done) = timers.join_next().await {
            if let Err(e) = done {
                warn!(error = %e, "debounce task failed");
            }
        }
        info!("watcher stopped");
    }

    fn debounced(
        &self,
        path: PathBuf,
        cancel: CancellationToken,
    ) -> impl std::future::Future<Output = PathBuf> + Send + 'static {
        let organizer = self.organizer.clone();
        let reporter = self.reporter.clone();
        let debounce = self.debounce;
        let use_ai = self.use_ai;
        async move {
            tokio::select! {
                _ = cancel.cancelled() => return path,
                _ = tokio::time::sleep(debounce) => {}
            }
            if !path.exists() {
                debug!(path = %path.display(), "gone before debounce ended");
                return path;
            }
            let outcome = organizer.organize_file(&path, use_ai, &cancel).await;
            if let Some(tx) = reporter {
                let _ = tx.send(outcome);
            }
            path
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::DataChange;

    fn matcher(patterns: &[&str]) -> IgnoreMatcher {
        let owned: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        IgnoreMatcher::new(&owned).unwrap()
    }

    #[test]
    fn ignore_pattern_forms() {
        let m = matcher(&["*.crdownload", "~$*", "cache", "draft-?.txt"]);
        assert!(m.is_ignored(Path::new("/in/movie.mp4.crdownload")));
        assert!(m.is_ignored(Path::new("/in/~$report.docx")));
        assert!(m.is_ignored(Path::new("/in/cache/a.jpg")));
        assert!(m.is_ignored(Path::new("/in/draft-1.txt")));
        assert!(!m.is_ignored(Path::new("/in/draft-10.txt")));
        assert!(!m.is_ignored(Path::new("/in/report.docx")));
    }

    #[test]
    fn empty_patterns_ignore_nothing() {
        assert!(!matcher(&["", "  "]).is_ignored(Path::new("/in/a.txt")));
    }

    #[test]
    fn creates_and_renames_count() {
        let create = Event::new(EventKind::Create(CreateKind::File)).add_path("/in/a".into());
        assert_eq!(created_paths(create), vec![PathBuf::from("/in/a")]);
        let rename = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path("/in/a.part".into())
            .add_path("/in/a".into());
        assert_eq!(created_paths(rename), vec![PathBuf::from("/in/a")]);
        let write = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path("/in/a".into());
        assert!(created_paths(write).is_empty());
        let folder = Event::new(EventKind::Create(CreateKind::Folder)).add_path("/in/d".into());
        assert!(created_paths(folder).is_empty());
    }
}
