//! One entry point for organizing a single file, shared by batch and watch mode.

use crate::category::CategoryMap;
use crate::classifier::{is_unknown, Capabilities, ClassifierRouter};
use crate::config::AppConfig;
use crate::detector;
use crate::executor::{MoveExecutor, MoveOutcome, SkipReason};
use crate::indexer::IndexStore;
use crate::models::{timestamp, ClassificationResult, DestinationPlan, FileRecord};
use crate::resolver::DestinationResolver;
use crate::scanner::{self, OrganizedTree};
use chrono::{DateTime, Local};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct Organizer {
    config: Arc<AppConfig>,
    categories: CategoryMap,
    tree: OrganizedTree,
    router: ClassifierRouter,
    resolver: DestinationResolver,
    executor: MoveExecutor,
}

impl Organizer {
    pub fn new(config: Arc<AppConfig>, capabilities: Capabilities, index: Option<IndexStore>) -> Self {
        let categories = CategoryMap::from_config(&config);
        Self {
            tree: OrganizedTree::new(&config, &categories),
            router: ClassifierRouter::new(&config, capabilities),
            resolver: DestinationResolver::new(&config),
            executor: MoveExecutor::new(config.backoff_schedule(), index),
            categories,
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn categories(&self) -> &CategoryMap {
        &self.categories
    }

    pub fn tree(&self) -> &OrganizedTree {
        &self.tree
    }

    pub fn index(&self) -> Option<&IndexStore> {
        self.executor.index()
    }

    /// Loose files under `root` waiting to be organized. Batch sweeps always
    /// walk the whole tree; `watcher.recursive` only scopes the watch subscription.
    pub fn discover(&self, root: &Path) -> Vec<PathBuf> {
        scanner::discover(root, &self.tree)
    }

    /// Probes, classifies, moves and records one file. Never fails; the outcome
    /// says what happened.
    pub async fn organize_file(
        &self,
        path: &Path,
        use_ai: bool,
        cancel: &CancellationToken,
    ) -> MoveOutcome {
        let meta = match self.executor.probe(path, cancel).await {
            Ok(meta) => meta,
            Err(reason) => {
                info!(path = %path.display(), %reason, "skipped");
                return MoveOutcome::Skipped {
                    source: path.to_path_buf(),
                    reason,
                };
            }
        };
        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            return MoveOutcome::Skipped {
                source: path.to_path_buf(),
                reason: SkipReason::NotAFile,
            };
        };

        let detected = detector::detect(path);
        let category = self.categories.category_for(path).to_string();
        let classification = if use_ai && self.config.ai_categories.contains(&category) {
            Some(self.router.classify(path, &detected, &category).await)
        } else {
            None
        };
        let usable = classification.as_ref().filter(|r| !is_unknown(r));
        let plan = self.resolver.resolve(&category, &file_name, usable);
        debug!(path = %path.display(), mime = %detected.mime_type, %category, target = %plan.target().display(), "planned");

        if cancel.is_cancelled() {
            return MoveOutcome::Skipped {
                source: path.to_path_buf(),
                reason: SkipReason::Cancelled,
            };
        }

        let created = meta
            .created()
            .or_else(|_| meta.modified())
            .map(DateTime::<Local>::from)
            .unwrap_or_else(|_| Local::now());
        let record = build_record(
            path,
            &detected.mime_type,
            &category,
            meta.len(),
            created,
            classification.as_ref(),
            &plan,
            category == self.config.documents_category,
        );
        self.executor.commit(path, &plan, record).await
    }
}

#[allow(clippy::too_many_arguments)]
fn build_record(
    source: &Path,
    mime_type: &str,
    category: &str,
    size: u64,
    created: DateTime<Local>,
    classification: Option<&ClassificationResult>,
    plan: &DestinationPlan,
    is_document: bool,
) -> FileRecord {
    let fallback = ClassificationResult::not_classified();
    let result = classification.unwrap_or(&fallback);
    let mut metadata = match &result.metadata {
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            let mut map = Map::new();
            map.insert("classifier".into(), other.clone());
            map
        }
        None => Map::new(),
    };
    if is_document && plan.label.is_some() {
        metadata.insert("destination_existed".into(), json!(plan.directory_existed));
        let action = if plan.directory_existed { "merged" } else { "created" };
        metadata.insert("folder_action".into(), json!(action));
    }
    FileRecord {
        file_path: plan.target(),
        original_path: source.to_path_buf(),
        mime_type: mime_type.to_string(),
        category: category.to_string(),
        label: plan.label.clone().unwrap_or_else(|| result.label.clone()),
        confidence: result.confidence,
        size,
        created_date: timestamp(created),
        classified_date: timestamp(Local::now()),
        metadata: if metadata.is_empty() {
            Value::Null
        } else {
            Value::Object(metadata)
        },
    }
}
