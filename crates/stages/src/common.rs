//! Helpers shared by stage implementations

use std::collections::BTreeSet;

use contracts::{ModelRequest, ModelSettings, StageConfig};

/// Sampling parameters for a stage, stage params over model defaults
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Sampling {
    pub fn resolve(model: &ModelSettings, config: &StageConfig) -> Self {
        Self {
            temperature: config
                .param_f64("temperature")
                .map(|t| t as f32)
                .unwrap_or(model.temperature),
            max_tokens: config
                .param_u64("max_tokens")
                .map(|t| t as u32)
                .unwrap_or(model.max_tokens),
        }
    }

    pub fn apply(&self, request: ModelRequest) -> ModelRequest {
        request.with_sampling(self.temperature, self.max_tokens)
    }
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 4000,
        }
    }
}

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

pub fn normalized_set<'a>(items: impl IntoIterator<Item = &'a String>) -> BTreeSet<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Jaccard similarity of two normalized sets; 0.0 when either is empty
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "is", "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did", "will",
    "would", "could", "should", "may", "might", "can", "this", "that", "these", "those", "i",
    "you", "he", "she", "it", "we", "they",
];

/// Lowercase content words longer than two characters, stopwords removed
pub fn keywords(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.len() > 2 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
