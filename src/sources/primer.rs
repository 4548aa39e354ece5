// src/sources/primer.rs
//! Parser for primer-style markdown: one lesson per `##` section.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::lesson::{truncate, Lesson, SourceTag};

static RE_SECTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^##\s+(.+)$").unwrap());

/// Navigational sections that carry no lesson content.
const SKIP_TITLE_KEYWORDS: [&str; 4] = ["index", "contribut", "credit", "license"];

const SUMMARY_MAX: usize = 200;
const EXPLAIN_MAX: usize = 300;

pub const CATEGORY: &str = "system-design";

fn is_navigation(title: &str) -> bool {
    let lower = title.to_lowercase();
    SKIP_TITLE_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// First two usable paragraphs of a section body: (summary, explanation).
fn summary_and_explain(body: &str) -> (String, String) {
    let mut usable = body
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty() && !p.starts_with('#') && !p.starts_with('<'));

    let summary = usable
        .next()
        .map(|p| truncate(p, SUMMARY_MAX))
        .unwrap_or_default();
    let explain = usable
        .next()
        .map(|p| truncate(p, EXPLAIN_MAX))
        .unwrap_or_default();
    (summary, explain)
}

pub fn parse_primer_markdown(markdown: &str) -> Vec<Lesson> {
    let headers: Vec<_> = RE_SECTION.captures_iter(markdown).collect();
    let mut lessons = Vec::new();

    for (i, caps) in headers.iter().enumerate() {
        let (Some(whole), Some(title_m)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let title = title_m.as_str().trim();
        if title.is_empty() || is_navigation(title) {
            continue;
        }

        let body_end = headers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(markdown.len());
        let body = markdown[whole.end()..body_end].trim();

        let (summary, explain) = summary_and_explain(body);
        let lesson = Lesson {
            title: title.to_string(),
            category: CATEGORY.to_string(),
            text: summary,
            explain,
            use_cases: vec![
                "Distributed systems".to_string(),
                "Scalable architectures".to_string(),
            ],
            tips: vec![
                "Review trade-offs".to_string(),
                "Consider CAP theorem".to_string(),
            ],
            source: Some(SourceTag::GitHub),
        };
        // No usable paragraph means no summary; drop the section.
        if lesson.is_displayable() {
            lessons.push(lesson);
        }
    }

    lessons
}
