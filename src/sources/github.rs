// src/sources/github.rs
use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{info, warn};

use crate::cancel::Cancel;
use crate::config::SourcesConfig;
use crate::lesson::Lesson;
use crate::sources::{
    get_text, primer::parse_primer_markdown,
    secret_knowledge::parse_secret_knowledge_markdown, timed_parse, LessonSource,
};
use crate::transport::{RetryPolicy, TransportError};

fn github_error(status: StatusCode, _body: &[u8]) -> TransportError {
    TransportError::upstream("github", status)
}

/// Raw markdown documents hosted on GitHub: the primer and the secret-knowledge book.
/// Pulled one after the other; a failing document is logged and skipped.
pub struct GitHubSource {
    client: Client,
    policy: RetryPolicy,
    primer_url: String,
    secret_knowledge_url: String,
}

impl GitHubSource {
    pub fn new(client: Client, cfg: &SourcesConfig) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
            primer_url: cfg.primer_url.clone(),
            secret_knowledge_url: cfg.secret_knowledge_url.clone(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn fetch_document(
        &self,
        cancel: &Cancel,
        url: &str,
        parse: fn(&str) -> Vec<Lesson>,
    ) -> Result<Vec<Lesson>> {
        let body = get_text(&self.client, &self.policy, cancel, url, github_error).await?;
        Ok(timed_parse(|| parse(&body)))
    }
}

#[async_trait]
impl LessonSource for GitHubSource {
    async fn fetch(&self, cancel: &Cancel) -> Result<Vec<Lesson>> {
        let documents: [(&str, &str, fn(&str) -> Vec<Lesson>); 2] = [
            ("primer", self.primer_url.as_str(), parse_primer_markdown),
            (
                "secret-knowledge",
                self.secret_knowledge_url.as_str(),
                parse_secret_knowledge_markdown,
            ),
        ];

        let mut out = Vec::new();
        let mut last_err = None;
        let mut succeeded = 0usize;

        for (document, url, parse) in documents {
            match self.fetch_document(cancel, url, parse).await {
                Ok(v) => {
                    info!(document, lessons = v.len(), "parsed github document");
                    succeeded += 1;
                    out.extend(v);
                }
                Err(e) => {
                    warn!(error = ?e, document, "github document failed");
                    last_err = Some(e);
                }
            }
        }

        // Only report failure when nothing came through; one good document is enough.
        match (succeeded, last_err) {
            (0, Some(e)) => Err(e.context("all github documents failed")),
            _ => Ok(out),
        }
    }

    fn name(&self) -> &'static str {
        "github"
    }
}
