// src/catalog.rs
//! Category-indexed view of the fetcher's output, rebuilt on a schedule.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::cancel::Cancel;
use crate::fetcher::Fetcher;
use crate::lesson::Lesson;

#[derive(Debug, Clone, Default)]
pub struct LessonCatalog {
    by_category: BTreeMap<String, Vec<Lesson>>,
    total: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CategoryCount {
    pub name: String,
    pub lessons: usize,
}

impl LessonCatalog {
    pub fn build(lessons: Vec<Lesson>) -> Self {
        let total = lessons.len();
        let mut by_category: BTreeMap<String, Vec<Lesson>> = BTreeMap::new();
        for l in lessons {
            by_category.entry(l.category.clone()).or_default().push(l);
        }
        Self { by_category, total }
    }

    /// Sorted category names.
    pub fn categories(&self) -> Vec<&str> {
        self.by_category.keys().map(String::as_str).collect()
    }

    pub fn lessons_in(&self, category: &str) -> &[Lesson] {
        self.by_category
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn find(&self, category: &str, title: &str) -> Option<&Lesson> {
        self.lessons_in(category).iter().find(|l| l.title == title)
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn counts(&self) -> Vec<CategoryCount> {
        self.by_category
            .iter()
            .map(|(name, v)| CategoryCount {
                name: name.clone(),
                lessons: v.len(),
            })
            .collect()
    }
}

/// Shared handle to the current catalog. Readers get an `Arc` snapshot; updates
/// swap the whole catalog.
#[derive(Clone, Default)]
pub struct CatalogHandle {
    inner: Arc<RwLock<Arc<LessonCatalog>>>,
}

impl CatalogHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<LessonCatalog> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, catalog: LessonCatalog) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(catalog);
    }

    /// Rebuild from a fresh (non-blocking) fetcher read.
    pub fn update_from(&self, fetcher: &Fetcher) -> usize {
        let catalog = LessonCatalog::build(fetcher.read());
        let total = catalog.len();
        self.replace(catalog);
        info!(lessons = total, "refreshed lesson map");
        total
    }
}

/// Rebuild the catalog once after `delay`, then every `every`, until `cancel` fires.
pub fn spawn_catalog_refresh(
    fetcher: Fetcher,
    handle: CatalogHandle,
    delay: Duration,
    every: Duration,
    cancel: Cancel,
) -> JoinHandle<()> {
    let period = if every.is_zero() {
        Duration::from_secs(1)
    } else {
        every
    };

    tokio::spawn(async move {
        if !cancel.sleep(delay).await {
            return;
        }
        handle.update_from(&fetcher);

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    handle.update_from(&fetcher);
                }
            }
        }
    })
}
