//! Extension -> category lookup.

use crate::config::AppConfig;
use std::collections::{HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct CategoryMap {
    by_extension: HashMap<String, String>,
    names: Vec<String>,
    fallback: String,
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

impl CategoryMap {
    pub fn from_config(config: &AppConfig) -> Self {
        let mut by_extension = HashMap::new();
        let mut names = Vec::new();
        for category in &config.categories {
            for ext in &category.extensions {
                by_extension
                    .entry(normalize_extension(ext))
                    .or_insert_with(|| category.name.clone());
            }
            if !names.contains(&category.name) {
                names.push(category.name.clone());
            }
        }
        if !names.contains(&config.fallback_category) {
            names.push(config.fallback_category.clone());
        }
        Self {
            by_extension,
            names,
            fallback: config.fallback_category.clone(),
        }
    }

    pub fn category_for_extension(&self, ext: &str) -> &str {
        self.by_extension
            .get(&normalize_extension(ext))
            .map(String::as_str)
            .unwrap_or(&self.fallback)
    }

    /// Category of a file by its extension; unmapped or missing extensions get the fallback.
    pub fn category_for(&self, path: &Path) -> &str {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self.category_for_extension(ext),
            None => &self.fallback,
        }
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// All category folder names, the fallback included.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name_set(&self) -> HashSet<String> {
        self.names.iter().cloned().collect()
    }

    pub fn is_category(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}
