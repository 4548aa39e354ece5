// src/sources/secret_knowledge.rs
//! Parser for the curated "book of secret knowledge" markdown.
//!
//! Sections are `#### Title &nbsp;[...]` headers; each section lists tools as
//! `<a href="URL"><b>NAME</b></a> - DESC` lines. Every tool becomes a lesson,
//! categorized by the section it sits in.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::lesson::{truncate, Lesson, SourceTag};

static RE_SECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^####\s+(.+?)(?:\s+&nbsp;)?\s*\[").unwrap());

static RE_TOOL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<a href="([^"]+)"><b>([^<]+)</b></a>\s*-\s*([^<\n]+)"#).unwrap()
});

const MAX_TOOL_MATCHES: usize = 15;
const MAX_LESSONS_PER_SECTION: usize = 10;
const DESCRIPTION_MAX: usize = 150;

/// Category and study tips assigned to every tool in a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionClass {
    pub category: &'static str,
    pub tips: [&'static str; 3],
}

/// Ordered; the first title fragment contained in the section title wins.
const SECTION_TABLE: [(&str, SectionClass); 6] = [
    (
        "CLI Tools",
        SectionClass {
            category: "devops",
            tips: ["Practice in a safe environment", "Read man pages", "Use --help flag"],
        },
    ),
    (
        "Web Tools",
        SectionClass {
            category: "security",
            tips: ["Bookmark useful tools", "Understand HTTPS/TLS", "Check multiple sources"],
        },
    ),
    (
        "Security",
        SectionClass {
            category: "security",
            tips: ["Stay ethical", "Get permission before testing", "Keep tools updated"],
        },
    ),
    (
        "System Diagnostics",
        SectionClass {
            category: "devops",
            tips: ["Monitor proactively", "Establish baselines", "Use multiple metrics"],
        },
    ),
    (
        "Network",
        SectionClass {
            category: "networking",
            tips: ["Understand OSI model", "Use tcpdump/wireshark", "Check DNS first"],
        },
    ),
    (
        "Databases",
        SectionClass {
            category: "databases",
            tips: ["Index wisely", "EXPLAIN queries", "Monitor slow queries"],
        },
    ),
];

const GENERAL: SectionClass = SectionClass {
    category: "general",
    tips: ["Research before using", "Check documentation", "Start with basics"],
};

/// Ordered keyword → use cases; first keyword found in the description wins.
const USE_CASE_TABLE: [(&str, [&str; 3]); 10] = [
    ("security", ["Security testing", "Vulnerability assessment", "Penetration testing"]),
    ("monitor", ["System monitoring", "Performance tracking", "Resource management"]),
    ("debug", ["Debugging", "Troubleshooting", "Error analysis"]),
    ("test", ["Testing", "Quality assurance", "Validation"]),
    ("network", ["Network analysis", "Traffic monitoring", "Connectivity troubleshooting"]),
    ("database", ["Database management", "Query optimization", "Data analysis"]),
    ("deployment", ["CI/CD", "Deployment automation", "Release management"]),
    ("container", ["Container orchestration", "Microservices", "Cloud native apps"]),
    ("performance", ["Performance optimization", "Benchmarking", "Load testing"]),
    ("encrypt", ["Data encryption", "Secure communication", "Privacy protection"]),
];

pub fn classify_section(title: &str) -> SectionClass {
    SECTION_TABLE
        .iter()
        .find(|(fragment, _)| title.contains(fragment))
        .map(|(_, class)| *class)
        .unwrap_or(GENERAL)
}

/// Up to three use cases derived from keywords in `description`; empty if none match.
pub fn use_cases_from_description(description: &str) -> Vec<String> {
    let lower = description.to_lowercase();
    USE_CASE_TABLE
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, cases)| cases.iter().take(3).map(|c| c.to_string()).collect())
        .unwrap_or_default()
}

fn tool_lessons(section_title: &str, body: &str, class: SectionClass) -> Vec<Lesson> {
    RE_TOOL
        .captures_iter(body)
        .take(MAX_TOOL_MATCHES)
        .filter_map(|caps| {
            let url = caps.get(1)?.as_str();
            let name = caps.get(2)?.as_str().trim();
            let raw_desc = html_escape::decode_html_entities(caps.get(3)?.as_str().trim());
            let description = truncate(raw_desc.trim(), DESCRIPTION_MAX);

            let mut use_cases = use_cases_from_description(&description);
            if use_cases.is_empty() {
                use_cases = vec![
                    format!("Learn {}", class.category),
                    "Improve technical skills".to_string(),
                ];
            }

            Some(Lesson {
                title: name.to_string(),
                category: class.category.to_string(),
                text: description,
                explain: format!(
                    "From The Book of Secret Knowledge: {section_title}. Learn more at {url}"
                ),
                use_cases,
                tips: class.tips.iter().map(|t| t.to_string()).collect(),
                source: Some(SourceTag::SecretKnowledge),
            })
            .filter(Lesson::is_displayable)
        })
        .take(MAX_LESSONS_PER_SECTION)
        .collect()
}

pub fn parse_secret_knowledge_markdown(markdown: &str) -> Vec<Lesson> {
    let headers: Vec<_> = RE_SECTION.captures_iter(markdown).collect();
    let mut lessons = Vec::new();

    for (i, caps) in headers.iter().enumerate() {
        let (Some(whole), Some(title_m)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let title = title_m.as_str().trim();
        let body_end = headers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(markdown.len());
        let body = &markdown[whole.end()..body_end];

        lessons.extend(tool_lessons(title, body, classify_section(title)));
    }

    debug!(count = lessons.len(), "parsed secret knowledge lessons");
    lessons
}
