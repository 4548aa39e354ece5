// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod cancel;
pub mod catalog;
pub mod config;
pub mod fetcher;
pub mod lesson;
pub mod metrics;
pub mod sources;
pub mod transport;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::cancel::{Cancel, CancelTrigger};
pub use crate::catalog::{CatalogHandle, LessonCatalog};
pub use crate::fetcher::{Fetcher, RefreshMode};
pub use crate::lesson::{Lesson, SourceTag};

use std::sync::Arc;

use crate::config::CatalogConfig;
use crate::sources::{DevToSource, GitHubSource, LessonSource};

/// Production source set: GitHub markdown documents and Dev.to articles,
/// sharing one HTTP client.
pub fn default_sources(cfg: &CatalogConfig) -> anyhow::Result<Vec<Arc<dyn LessonSource>>> {
    let client = transport::build_client(cfg.http_timeout())?;
    Ok(vec![
        Arc::new(GitHubSource::new(client.clone(), &cfg.sources)),
        Arc::new(DevToSource::new(client, &cfg.sources)),
    ])
}
