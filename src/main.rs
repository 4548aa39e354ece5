//! Lesson Catalog: binary entrypoint
//! Composition root: loads config and local lessons, builds the fetcher and the
//! category catalog, starts the refresh schedulers, and serves diagnostics.

use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lesson_catalog::api::{self, AppState};
use lesson_catalog::catalog::{spawn_catalog_refresh, CatalogHandle, LessonCatalog};
use lesson_catalog::config::CatalogConfig;
use lesson_catalog::lesson::load_local_lessons;
use lesson_catalog::metrics::Metrics;
use lesson_catalog::{default_sources, Cancel, Fetcher, RefreshMode};

/// Compact logs by default, JSON when LOG_FORMAT=json. RUST_LOG overrides the filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("lesson_catalog=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = CatalogConfig::load().context("loading catalog config")?;
    let metrics = Metrics::init(cfg.cache_ttl_secs)?;

    let local = load_local_lessons(&cfg.lessons_file, &cfg.secret_lessons_file)
        .with_context(|| format!("load lessons from {}", cfg.lessons_file.display()))?;
    let local_count = local.len();

    let mode = if cfg.single_flight {
        RefreshMode::SingleFlight
    } else {
        RefreshMode::Overlapping
    };
    let fetcher = Fetcher::with_mode(local, cfg.cache_ttl(), default_sources(&cfg)?, mode);

    let (shutdown, cancel) = Cancel::pair();
    let background = fetcher.spawn_background_refresh(cancel.clone(), cfg.background_interval());

    // Seed with the local set; the background loop is already fetching.
    let catalog = CatalogHandle::new();
    catalog.replace(LessonCatalog::build(fetcher.peek()));
    info!(local = local_count, "lesson catalog seeded");

    let map_refresh = spawn_catalog_refresh(
        fetcher.clone(),
        catalog.clone(),
        cfg.catalog_refresh_delay(),
        cfg.catalog_refresh_every(),
        cancel.clone(),
    );

    let app = api::router(AppState {
        fetcher: fetcher.clone(),
        catalog,
    })
    .merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    info!(addr = %cfg.bind_addr, "diagnostics server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = ?e, "ctrl-c handler failed");
            }
        })
        .await
        .context("serving diagnostics")?;

    shutdown.cancel();
    let _ = background.await;
    let _ = map_refresh.await;
    if tokio::time::timeout(Duration::from_secs(10), fetcher.settle())
        .await
        .is_err()
    {
        warn!("triggered refreshes still running at shutdown");
    }
    info!("shutdown complete");
    Ok(())
}
