// src/metrics.rs
//! Prometheus recorder and the `/metrics` route.

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_gauge, gauge};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Millisecond buckets shared by the refresh and parse timings.
const TIMING_BUCKETS_MS: [f64; 10] = [
    1.0, 5.0, 25.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 15_000.0,
];

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the process-wide recorder. Call once, before any fetcher is built,
    /// so series descriptions land on this recorder.
    pub fn init(cache_ttl_secs: u64) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(Matcher::Suffix("_ms".to_string()), &TIMING_BUCKETS_MS)
            .context("prometheus: timing buckets")?
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_gauge!("catalog_cache_ttl_secs", "Configured lesson cache TTL.");
        gauge!("catalog_cache_ttl_secs").set(cache_ttl_secs as f64);

        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Router exposing `/metrics` in the Prometheus text format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
