// tests/metrics.rs
//
// One test per binary: the Prometheus recorder is process-global.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{self, Body};
use http::{Request, StatusCode};
use tower::ServiceExt;

use lesson_catalog::metrics::Metrics;
use lesson_catalog::sources::LessonSource;
use lesson_catalog::{Cancel, Fetcher, Lesson};

struct Static(&'static str, bool);

#[async_trait]
impl LessonSource for Static {
    async fn fetch(&self, _cancel: &Cancel) -> anyhow::Result<Vec<Lesson>> {
        if self.1 {
            Ok(vec![Lesson {
                title: "Queues".into(),
                category: "system-design".into(),
                text: "Decouple producers".into(),
                ..Default::default()
            }])
        } else {
            anyhow::bail!("{} down", self.0)
        }
    }

    fn name(&self) -> &'static str {
        self.0
    }
}

#[tokio::test]
async fn metrics_endpoint_contains_refresh_series() {
    let metrics = Metrics::init(21_600).expect("install recorder");

    let sources: Vec<Arc<dyn LessonSource>> =
        vec![Arc::new(Static("good", true)), Arc::new(Static("bad", false))];
    let fetcher = Fetcher::new(Vec::new(), Duration::from_secs(60), sources);
    fetcher.refresh(&Cancel::never()).await;

    let resp = metrics
        .router()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // axum::body::to_bytes requires an explicit limit
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "catalog_refresh_total",
        "catalog_source_errors_total{source=\"bad\"}",
        "catalog_cached_lessons 1",
        "catalog_cache_ttl_secs 21600",
        "catalog_refresh_ms_bucket",
    ] {
        assert!(
            text.contains(needle),
            "metrics exposition missing '{needle}'\n{text}"
        );
    }
    assert!(!text.contains("source=\"good\""), "{text}");
    assert!(metrics.render().contains("catalog_refresh_total"));
}
