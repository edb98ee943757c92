//! Finds the loose files under a root, leaving already-organized output alone.

use crate::category::CategoryMap;
use crate::config::AppConfig;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

const INDEX_COMPANIONS: &[&str] = &["", "-wal", "-shm", "-journal"];

/// Which paths belong to the organizer's own output.
#[derive(Debug, Clone)]
pub struct OrganizedTree {
    watch_root: PathBuf,
    output_root: PathBuf,
    categories: HashSet<String>,
    index_files: HashSet<PathBuf>,
}

impl OrganizedTree {
    pub fn new(config: &AppConfig, categories: &CategoryMap) -> Self {
        let index = config.index_path();
        let index_files = INDEX_COMPANIONS
            .iter()
            .map(|suffix| {
                let mut name = index.as_os_str().to_os_string();
                name.push(suffix);
                PathBuf::from(name)
            })
            .collect();
        Self {
            watch_root: config.watch_directory.clone(),
            output_root: config.organized_directory.clone(),
            categories: categories.name_set(),
            index_files,
        }
    }

    pub fn is_index_file(&self, path: &Path) -> bool {
        self.index_files.contains(path)
    }

    fn first_component_is_category(&self, root: &Path, path: &Path) -> bool {
        let Ok(rel) = path.strip_prefix(root) else {
            return false;
        };
        match rel.components().next() {
            Some(Component::Normal(first)) => first
                .to_str()
                .map(|name| self.categories.contains(name))
                .unwrap_or(false),
            _ => false,
        }
    }

    /// True for the index files, anything under a category folder of either
    /// root, and the whole output root when it is separate from the watch root.
    pub fn contains(&self, path: &Path) -> bool {
        if self.is_index_file(path) {
            return true;
        }
        if self.output_root != self.watch_root && path.starts_with(&self.output_root) {
            return true;
        }
        self.first_component_is_category(&self.watch_root, path)
            || self.first_component_is_category(&self.output_root, path)
    }
}

fn is_hidden(name: &OsStr) -> bool {
    name.to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}

/// Loose files anywhere under `root`, sorted. Hidden entries and the organized
/// tree are skipped; unreadable entries are ignored.
pub fn discover(root: &Path, tree: &OrganizedTree) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || (!is_hidden(e.file_name()) && !tree.contains(e.path()))
        })
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}
