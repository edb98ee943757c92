//! Destination policy: which folder a file lands in given its category and
//! classification.

use crate::config::AppConfig;
use crate::models::{ClassificationResult, DestinationPlan};
use std::fs;
use std::path::{Path, PathBuf};

const ILLEGAL: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Python-style title case: a letter is upper-cased when it follows a non-letter.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Makes a label usable as a single folder name. `None` if nothing usable remains.
pub fn sanitize_label(label: &str) -> Option<String> {
    let stripped: String = label
        .chars()
        .filter(|c| !ILLEGAL.contains(c) && !c.is_control())
        .collect();
    let trimmed = stripped.trim().trim_matches('.').trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(title_case(trimmed))
    }
}

/// Names of the topic folders currently under the documents category folder.
pub fn existing_document_folders(documents_dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(documents_dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();
    names
}

#[derive(Debug, Clone)]
pub struct DestinationResolver {
    root: PathBuf,
    documents_category: String,
    threshold: f32,
}

impl DestinationResolver {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            root: config.organized_directory.clone(),
            documents_category: config.documents_category.clone(),
            threshold: config.confidence_threshold,
        }
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.root.join(&self.documents_category)
    }

    /// `classification` is `None` when no content classifier was applied to the file.
    pub fn resolve(
        &self,
        category: &str,
        file_name: &str,
        classification: Option<&ClassificationResult>,
    ) -> DestinationPlan {
        let category_dir = self.root.join(category);
        let label = classification.and_then(|result| {
            let labeled = category == self.documents_category
                || result.confidence >= self.threshold;
            if labeled {
                sanitize_label(&result.label)
            } else {
                None
            }
        });
        let directory = match &label {
            Some(l) => category_dir.join(l),
            None => category_dir,
        };
        DestinationPlan {
            directory_existed: directory.is_dir(),
            directory,
            file_name: file_name.to_string(),
            label,
        }
    }
}
