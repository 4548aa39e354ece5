// src/sources/mod.rs
pub mod devto;
pub mod github;
pub mod primer;
pub mod secret_knowledge;

use anyhow::Result;
use metrics::histogram;
use reqwest::Client;

use crate::cancel::Cancel;
use crate::lesson::Lesson;
use crate::transport::{self, ErrorFormatter, RetryPolicy, TransportError};

pub use devto::DevToSource;
pub use github::GitHubSource;

/// One external feed of lessons. Implementations are stateless between calls;
/// the fetcher owns caching.
#[async_trait::async_trait]
pub trait LessonSource: Send + Sync {
    async fn fetch(&self, cancel: &Cancel) -> Result<Vec<Lesson>>;
    fn name(&self) -> &'static str;
}

/// GET `url` through the retrying transport and read the body as text. The body
/// read races `cancel` just like the send does.
pub(crate) async fn get_text(
    client: &Client,
    policy: &RetryPolicy,
    cancel: &Cancel,
    url: &str,
    format_error: ErrorFormatter,
) -> Result<String> {
    let resp =
        transport::send_with_retry(cancel, policy, || client.get(url), Some(format_error)).await?;
    let body = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(TransportError::Cancelled.into()),
        b = resp.text() => b?,
    };
    Ok(body)
}

/// Run a parser and record how long it took.
pub(crate) fn timed_parse<T, F>(parse: F) -> T
where
    F: FnOnce() -> T,
{
    let t0 = std::time::Instant::now();
    let out = parse();
    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("lesson_parse_ms").record(ms);
    out
}
