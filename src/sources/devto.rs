// src/sources/devto.rs
//! Dev.to tagged-article source.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::{info, warn};

use crate::cancel::Cancel;
use crate::config::SourcesConfig;
use crate::lesson::{truncate, Lesson, SourceTag};
use crate::sources::{get_text, timed_parse, LessonSource};
use crate::transport::{RetryPolicy, TransportError};

const TEXT_MAX: usize = 200;

#[derive(Debug, Deserialize)]
pub struct DevToArticle {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub tags: Tags,
}

/// The listing endpoint has shipped tags both as an array and as a comma-separated string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Tags {
    List(Vec<String>),
    Csv(String),
}

impl Default for Tags {
    fn default() -> Self {
        Tags::List(Vec::new())
    }
}

impl Tags {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Tags::List(v) => v.clone(),
            Tags::Csv(s) => s
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Category from the first tag found in the fixed tag table; `general` otherwise.
pub fn categorize(tags: &[String]) -> &'static str {
    for tag in tags {
        let category = match tag.to_lowercase().as_str() {
            "architecture" | "systemdesign" | "microservices" => "system-design",
            "database" | "sql" | "nosql" => "databases",
            "api" | "rest" | "graphql" => "apis",
            "cloud" | "aws" | "azure" | "kubernetes" => "cloud",
            "security" => "security",
            _ => continue,
        };
        return category;
    }
    "general"
}

/// Bullet lines (`-`, `*`, `•`) of a description, 1–99 chars each. Falls back to a
/// generic pair when none are found.
pub fn extract_use_cases(description: &str) -> Vec<String> {
    let found: Vec<String> = description
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with(['-', '*', '•']))
        .map(|line| line.trim_start_matches(['-', '*', '•']).trim())
        .filter(|uc| !uc.is_empty() && uc.len() < 100)
        .map(str::to_string)
        .collect();

    if found.is_empty() {
        return vec![
            "General software engineering".to_string(),
            "System architecture".to_string(),
        ];
    }
    found
}

pub fn article_to_lesson(article: &DevToArticle) -> Option<Lesson> {
    let title = article.title.trim();
    let description = article.description.trim();

    let lesson = Lesson {
        title: title.to_string(),
        category: categorize(&article.tags.to_vec()).to_string(),
        text: truncate(description, TEXT_MAX),
        explain: format!("Read more at: {}", article.url),
        use_cases: extract_use_cases(description),
        tips: vec![
            "Check the full article for details".to_string(),
            "Consider practical applications".to_string(),
        ],
        source: Some(SourceTag::DevTo),
    };
    lesson.is_displayable().then_some(lesson)
}

/// Decode one listing response into lessons.
pub fn parse_devto_articles(json: &str) -> Result<Vec<Lesson>> {
    let articles: Vec<DevToArticle> =
        serde_json::from_str(json).context("decoding dev.to articles")?;
    Ok(articles.iter().filter_map(article_to_lesson).collect())
}

fn devto_error(status: StatusCode, _body: &[u8]) -> TransportError {
    TransportError::upstream("dev.to", status)
}

pub struct DevToSource {
    client: Client,
    policy: RetryPolicy,
    base_url: String,
    tags: Vec<String>,
    per_page: u32,
    top_days: u32,
    pause: Duration,
}

impl DevToSource {
    pub fn new(client: Client, cfg: &SourcesConfig) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
            base_url: cfg.devto_base_url.trim_end_matches('/').to_string(),
            tags: cfg.devto_tags.clone(),
            per_page: cfg.devto_per_page,
            top_days: cfg.devto_top_days,
            pause: Duration::from_millis(cfg.devto_pause_ms),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Listing URL for one tag, query values form-encoded.
    pub fn articles_url(&self, tag: &str) -> Result<Url> {
        let endpoint = format!("{}/api/articles", self.base_url);
        let url = Url::parse_with_params(
            &endpoint,
            [
                ("tag", tag.to_string()),
                ("per_page", self.per_page.to_string()),
                ("top", self.top_days.to_string()),
            ],
        )
        .with_context(|| format!("building dev.to url from {endpoint}"))?;
        Ok(url)
    }

    /// A body that does not decode counts as a failed tag, same as a transport error.
    async fn fetch_tag(&self, cancel: &Cancel, tag: &str) -> Result<Vec<Lesson>> {
        let url = self.articles_url(tag)?;
        let body = get_text(&self.client, &self.policy, cancel, url.as_str(), devto_error).await?;
        timed_parse(|| parse_devto_articles(&body))
    }
}

#[async_trait]
impl LessonSource for DevToSource {
    async fn fetch(&self, cancel: &Cancel) -> Result<Vec<Lesson>> {
        let mut out = Vec::new();
        let mut failed = 0usize;

        for tag in &self.tags {
            match self.fetch_tag(cancel, tag).await {
                Ok(v) => {
                    info!(tag = %tag, lessons = v.len(), "fetched dev.to tag");
                    out.extend(v);
                }
                Err(e) => {
                    warn!(error = ?e, tag = %tag, "dev.to tag failed");
                    failed += 1;
                }
            }

            // Rate limit courtesy pause between tag listings.
            if !cancel.sleep(self.pause).await {
                return Err(anyhow::Error::new(TransportError::Cancelled).context("dev.to fetch"));
            }
        }

        if !self.tags.is_empty() && failed == self.tags.len() {
            return Err(anyhow!("all {failed} dev.to tags failed"));
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "devto"
    }
}
