// src/fetcher.rs
//! Stale-while-revalidate lesson cache.
//!
//! `read` never waits on the network: it hands back local + cached lessons and,
//! when the cache is older than its TTL, spawns one refresh cycle into a task set
//! owned by the fetcher. A refresh fans out to every source concurrently, fans the
//! results back in through a channel, then swaps the cached set and its timestamp
//! together under the write lock.
//!
//! Overlapping refresh cycles are allowed by default. Each cycle recomputes the full
//! external set, so the last one to finish simply wins. `RefreshMode::SingleFlight`
//! turns a trigger that arrives mid-cycle into a no-op instead.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cancel::Cancel;
use crate::lesson::Lesson;
use crate::sources::LessonSource;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "catalog_refresh_triggered_total",
            "Refresh cycles started because a read found the cache stale."
        );
        describe_counter!("catalog_refresh_total", "Completed refresh cycles.");
        describe_counter!(
            "catalog_source_errors_total",
            "Source fetches that failed during a refresh."
        );
        describe_counter!(
            "transport_retries_total",
            "HTTP attempts retried after a transient status."
        );
        describe_gauge!("catalog_cached_lessons", "Externally sourced lessons in cache.");
        describe_histogram!("catalog_refresh_ms", "Refresh cycle time in milliseconds.");
        describe_histogram!("lesson_parse_ms", "Source document parse time in milliseconds.");
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// Every stale read may start a cycle, even while another is running.
    #[default]
    Overlapping,
    /// At most one triggered cycle in flight.
    SingleFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// At least one source answered; cache replaced with what was collected.
    Replaced,
    /// Every source failed; previous lessons kept, timestamp advanced.
    Retained,
    /// Cancelled mid-cycle; nothing touched.
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub outcome: RefreshOutcome,
    pub lessons: usize,
    pub sources_ok: usize,
    pub sources_failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetcherStats {
    pub local_lessons: usize,
    pub cached_lessons: usize,
    pub refreshes_triggered: u64,
    pub refreshes_completed: u64,
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub stale: bool,
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    lessons: Vec<Lesson>,
    /// `None` until the first completed cycle.
    last_fetch: Option<Instant>,
    refreshed_at: Option<DateTime<Utc>>,
}

struct Inner {
    local: Vec<Lesson>,
    cache: RwLock<CacheState>,
    ttl: Duration,
    sources: Vec<Arc<dyn LessonSource>>,
    mode: RefreshMode,
    in_flight: AtomicBool,
    triggered: AtomicU64,
    completed: AtomicU64,
    tasks: Mutex<JoinSet<()>>,
    /// Runtime the fetcher was built on; lets `read` trigger from non-runtime threads.
    runtime: Option<Handle>,
}

/// Cheap cloneable handle; clones share the same cache.
#[derive(Clone)]
pub struct Fetcher {
    inner: Arc<Inner>,
}

/// Releases the single-flight gate even if the refresh task panics.
struct FlightGuard(Arc<Inner>);

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::Release);
    }
}

impl Fetcher {
    pub fn new(local: Vec<Lesson>, ttl: Duration, sources: Vec<Arc<dyn LessonSource>>) -> Self {
        Self::with_mode(local, ttl, sources, RefreshMode::default())
    }

    /// Call from inside the runtime that should run triggered refreshes.
    pub fn with_mode(
        local: Vec<Lesson>,
        ttl: Duration,
        sources: Vec<Arc<dyn LessonSource>>,
        mode: RefreshMode,
    ) -> Self {
        ensure_metrics_described();
        Self {
            inner: Arc::new(Inner {
                local,
                cache: RwLock::new(CacheState::default()),
                ttl,
                sources,
                mode,
                in_flight: AtomicBool::new(false),
                triggered: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                tasks: Mutex::new(JoinSet::new()),
                runtime: Handle::try_current().ok(),
            }),
        }
    }

    /// Local + cached lessons, copied. Starts a background refresh when stale;
    /// never waits for it.
    pub fn read(&self) -> Vec<Lesson> {
        let (stale, cached) = {
            let guard = self.inner.cache.read().unwrap_or_else(PoisonError::into_inner);
            (self.inner.is_stale(&guard), guard.lessons.clone())
        };

        let mut out = Vec::with_capacity(self.inner.local.len() + cached.len());
        out.extend_from_slice(&self.inner.local);
        out.extend(cached);

        if stale {
            self.trigger_refresh();
        }
        out
    }

    /// Local + cached lessons without the staleness check. For startup wiring that
    /// already has a refresh scheduled.
    pub fn peek(&self) -> Vec<Lesson> {
        let guard = self.inner.cache.read().unwrap_or_else(PoisonError::into_inner);
        let mut out = Vec::with_capacity(self.inner.local.len() + guard.lessons.len());
        out.extend_from_slice(&self.inner.local);
        out.extend_from_slice(&guard.lessons);
        out
    }

    /// Spawn one refresh cycle on a never-cancelled signal, so the cycle outlives
    /// whichever caller noticed the cache was stale. Returns whether a cycle started.
    pub fn trigger_refresh(&self) -> bool {
        if self.inner.mode == RefreshMode::SingleFlight
            && self.inner.in_flight.swap(true, Ordering::AcqRel)
        {
            debug!("refresh already in flight, skipping trigger");
            return false;
        }
        let guard = (self.inner.mode == RefreshMode::SingleFlight)
            .then(|| FlightGuard(self.inner.clone()));

        let Some(runtime) = self
            .inner
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
        else {
            warn!("no tokio runtime; cannot refresh lesson cache");
            return false;
        };

        self.inner.triggered.fetch_add(1, Ordering::Relaxed);
        counter!("catalog_refresh_triggered_total").increment(1);

        let inner = self.inner.clone();
        let mut tasks = self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        // Reap finished cycles so the set does not grow without bound.
        while tasks.try_join_next().is_some() {}
        tasks.spawn_on(
            async move {
                let _guard = guard;
                inner.refresh(&Cancel::never()).await;
            },
            &runtime,
        );
        true
    }

    /// Run one refresh cycle inline.
    pub async fn refresh(&self, cancel: &Cancel) -> RefreshReport {
        self.inner.refresh(cancel).await
    }

    /// One immediate refresh, then one per `interval`, until `cancel` fires.
    pub fn spawn_background_refresh(&self, cancel: Cancel, interval: Duration) -> JoinHandle<()> {
        let inner = self.inner.clone();
        let period = if interval.is_zero() {
            Duration::from_secs(1)
        } else {
            interval
        };

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = period.as_secs(), "background lesson refresh started");

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!("stopping background lesson refresh");
                        break;
                    }
                    _ = ticker.tick() => {
                        inner.refresh(&cancel).await;
                    }
                }
            }
        })
    }

    /// Wait for every refresh started by `read`/`trigger_refresh` to finish.
    pub async fn settle(&self) {
        let mut tasks = {
            let mut guard = self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        while tasks.join_next().await.is_some() {}
    }

    pub fn stats(&self) -> FetcherStats {
        let guard = self.inner.cache.read().unwrap_or_else(PoisonError::into_inner);
        FetcherStats {
            local_lessons: self.inner.local.len(),
            cached_lessons: guard.lessons.len(),
            refreshes_triggered: self.inner.triggered.load(Ordering::Relaxed),
            refreshes_completed: self.inner.completed.load(Ordering::Relaxed),
            last_refresh_at: guard.refreshed_at,
            stale: self.inner.is_stale(&guard),
            cache_ttl_secs: self.inner.ttl.as_secs(),
        }
    }
}

impl Inner {
    fn is_stale(&self, state: &CacheState) -> bool {
        match state.last_fetch {
            None => true,
            Some(at) => at.elapsed() > self.ttl,
        }
    }

    async fn refresh(&self, cancel: &Cancel) -> RefreshReport {
        let t0 = Instant::now();
        info!(
            sources = self.sources.len(),
            "refreshing lesson cache from external sources"
        );

        // Fan out: one producer per source. The channel closes once every producer
        // has dropped its sender, which ends the fan-in loop below.
        let (tx, mut rx) = mpsc::channel(self.sources.len().max(1));
        for source in &self.sources {
            let tx = tx.clone();
            let source = Arc::clone(source);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let res = source.fetch(&cancel).await;
                let _ = tx.send((source.name(), res)).await;
            });
        }
        drop(tx);

        let mut collected = Vec::new();
        let mut sources_ok = 0usize;
        let mut sources_failed = 0usize;
        while let Some((name, res)) = rx.recv().await {
            match res {
                Ok(lessons) => {
                    debug!(source = name, lessons = lessons.len(), "source fetched");
                    sources_ok += 1;
                    collected.extend(lessons);
                }
                Err(e) => {
                    warn!(error = ?e, source = name, "error fetching lesson source");
                    counter!("catalog_source_errors_total", "source" => name).increment(1);
                    sources_failed += 1;
                }
            }
        }
        // A producer that panicked never reports; count it as a failure.
        sources_failed += self.sources.len().saturating_sub(sources_ok + sources_failed);

        if cancel.is_cancelled() {
            info!("refresh cancelled; cache left untouched");
            return RefreshReport {
                outcome: RefreshOutcome::Cancelled,
                lessons: 0,
                sources_ok,
                sources_failed,
            };
        }

        let all_failed = sources_ok == 0 && !self.sources.is_empty();
        let cached_now = {
            let mut guard = self.cache.write().unwrap_or_else(PoisonError::into_inner);
            if all_failed {
                guard.last_fetch = Some(Instant::now());
                guard.refreshed_at = Some(Utc::now());
            } else {
                *guard = CacheState {
                    lessons: collected,
                    last_fetch: Some(Instant::now()),
                    refreshed_at: Some(Utc::now()),
                };
            }
            guard.lessons.len()
        };

        self.completed.fetch_add(1, Ordering::Relaxed);
        counter!("catalog_refresh_total").increment(1);
        gauge!("catalog_cached_lessons").set(cached_now as f64);
        histogram!("catalog_refresh_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let outcome = if all_failed {
            warn!(
                cached = cached_now,
                "every lesson source failed; keeping previous cache"
            );
            RefreshOutcome::Retained
        } else {
            info!(
                lessons = cached_now,
                sources_ok, sources_failed, "cache refreshed from external sources"
            );
            RefreshOutcome::Replaced
        };

        RefreshReport {
            outcome,
            lessons: cached_now,
            sources_ok,
            sources_failed,
        }
    }
}
