// src/lesson.rs
//! Lesson record shared by every source, plus the local lesson loader.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Where a lesson came from. Serialized with the exact tags the rest of the app expects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SourceTag {
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "secret-knowledge")]
    SecretKnowledge,
    #[serde(rename = "github")]
    GitHub,
    #[serde(rename = "devto")]
    DevTo,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Lesson {
    pub title: String,
    pub category: String,
    pub text: String,
    #[serde(default)]
    pub explain: String,
    #[serde(default, rename = "useCases")]
    pub use_cases: Vec<String>,
    #[serde(default)]
    pub tips: Vec<String>,
    /// `None` = not yet tagged (e.g. freshly read from a lesson file).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceTag>,
}

impl Lesson {
    /// Title and text are both non-blank. Every parser drops lessons that fail this.
    pub fn is_displayable(&self) -> bool {
        !self.title.trim().is_empty() && !self.text.trim().is_empty()
    }
}

/// Cut `s` to at most `max` chars; longer strings keep `max - 3` chars plus `...`.
/// Char-based so a multi-byte code point is never split.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Read a JSON array of lessons from disk.
pub fn load_lessons_from(path: &Path) -> Result<Vec<Lesson>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading lessons from {}", path.display()))?;
    let lessons: Vec<Lesson> = serde_json::from_str(&content)
        .with_context(|| format!("parsing lessons json {}", path.display()))?;
    Ok(lessons)
}

/// Build the fixed local set: the core lesson file is required, the secret-knowledge
/// file is optional (missing is fine, unreadable is logged and skipped).
pub fn load_local_lessons(core: &Path, secret: &Path) -> Result<Vec<Lesson>> {
    let core_lessons = load_lessons_from(core)?;

    let secret_lessons = if secret.exists() {
        match load_lessons_from(secret) {
            Ok(v) => {
                info!(count = v.len(), "loaded secret knowledge lessons");
                v
            }
            Err(e) => {
                warn!(error = ?e, path = %secret.display(), "failed to load secret knowledge lessons");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let mut out = Vec::with_capacity(core_lessons.len() + secret_lessons.len());
    out.extend(tag_all(core_lessons, SourceTag::Local));
    out.extend(tag_all(secret_lessons, SourceTag::SecretKnowledge));
    Ok(out)
}

fn tag_all(lessons: Vec<Lesson>, tag: SourceTag) -> impl Iterator<Item = Lesson> {
    lessons.into_iter().map(move |mut l| {
        l.source = Some(tag);
        l
    })
}
