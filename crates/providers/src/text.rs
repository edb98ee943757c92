//! Small text utilities shared by the audio and document capabilities:
//! keyphrase candidates, token overlap and vector similarity.

use std::collections::{HashMap, HashSet};

const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few",
    "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its",
    "itself", "just", "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of",
    "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own",
    "same", "she", "should", "so", "some", "such", "than", "that", "the", "their", "theirs",
    "them", "themselves", "then", "there", "these", "they", "this", "those", "through", "to",
    "too", "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves", "page", "pages", "may", "must", "shall", "one", "two", "three", "new", "use",
    "used", "using", "many", "much", "well", "like", "get", "got", "make", "made",
];

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Lowercased alphabetic words, with stopwords kept as `None` so phrases never span them.
fn word_stream(text: &str) -> Vec<Option<String>> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let w = w.to_lowercase();
            if w.len() < 3 || is_stopword(&w) || w.chars().all(|c| c.is_ascii_digit()) {
                None
            } else {
                Some(w)
            }
        })
        .collect()
}

/// Extracts up to `top_n` keyphrases of one to three words, scored in `[0, 1]`.
///
/// Phrases are ranked by frequency, favouring longer phrases slightly. Picks are
/// kept diverse: a candidate sharing a word with an earlier pick is skipped.
pub fn extract_keyphrases(text: &str, top_n: usize) -> Vec<(String, f32)> {
    let words = word_stream(text);
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut first_seen = 0usize;
    for n in 1..=3 {
        for window in words.windows(n) {
            if window.iter().any(Option::is_none) {
                continue;
            }
            let phrase = window
                .iter()
                .flatten()
                .cloned()
                .collect::<Vec<_>>()
                .join(" ");
            let entry = counts.entry(phrase).or_insert((0, first_seen));
            entry.0 += 1;
            first_seen += 1;
        }
    }

    let mut scored: Vec<(String, f32, usize)> = counts
        .into_iter()
        .filter(|(phrase, (count, _))| *count > 1 || !phrase.contains(' '))
        .map(|(phrase, (count, order))| {
            let len = phrase.split(' ').count() as f32;
            (phrase, count as f32 * (1.0 + 0.5 * (len - 1.0)), order)
        })
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.2.cmp(&b.2)));

    let max = scored.first().map(|s| s.1).unwrap_or(1.0).max(f32::EPSILON);
    let mut picked: Vec<(String, f32)> = Vec::new();
    let mut used: HashSet<String> = HashSet::new();
    for (phrase, score, _) in scored {
        if picked.len() >= top_n {
            break;
        }
        if phrase.split(' ').any(|w| used.contains(w)) {
            continue;
        }
        used.extend(phrase.split(' ').map(str::to_string));
        picked.push((phrase, score / max));
    }
    picked
}

fn token_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let w = w.to_lowercase();
            match w.strip_suffix('s') {
                Some(stem) if stem.len() > 2 => stem.to_string(),
                _ => w,
            }
        })
        .collect()
}

/// Jaccard overlap of the word sets of `a` and `b` (plural `s` ignored).
pub fn lexical_similarity(a: &str, b: &str) -> f32 {
    let left = token_set(a);
    let right = token_set(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let shared = left.intersection(&right).count() as f32;
    let total = left.union(&right).count() as f32;
    shared / total
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// First `max_chars` characters of `text`, never splitting a code point.
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
