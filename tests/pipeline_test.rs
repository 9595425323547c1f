use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use listing_scraper::app::ports::{InterceptedRequest, PageRenderer, RenderedPage};
use listing_scraper::apis::EventListingsClient;
use listing_scraper::config::Config;
use listing_scraper::infra::CapturedPage;
use listing_scraper::pipeline::{Pipeline, RunRequest};
use listing_scraper::storage::InMemoryEventStore;
use listing_scraper::types::{CanonicalEvent, DataSource, DateWindow};
use listing_scraper::ScraperError;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE_URL: &str = "https://example.com/events/us/washingtondc";

fn listings(ids: &[u32]) -> Value {
    let data: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "id": format!("l{id}"),
                "event": {
                    "id": id.to_string(),
                    "title": format!("Listing title {id}"),
                    "date": "2025-10-31T00:00:00.000",
                    "startTime": "2025-10-31T22:00:00.000",
                    "endTime": "2025-11-01T04:00:00.000",
                    "contentUrl": format!("/events/{id}"),
                    "attending": "2K",
                    "venue": {"id": "5031", "name": "Flash"},
                    "artists": [{"id": "9", "name": "DJ One"}]
                }
            })
        })
        .collect();
    json!({"data": {"eventListings": {"data": data, "totalResults": ids.len()}}})
}

async fn mount_area(server: &MockServer, area_id: u32, ids: &[u32]) {
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({"variables": {"filters": {"areas": {"eq": area_id}}}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(listings(ids)))
        .mount(server)
        .await;
}

fn config(server: &MockServer, output: &TempDir) -> Config {
    let mut config = Config::default();
    config.source.graphql_url = format!("{}/graphql", server.uri());
    config.source.base_url = "https://example.com".to_string();
    config.source.probe_delay_ms = 0;
    config.source.page_delay_ms = 0;
    config.pipeline.requests_per_min = 0;
    config.pipeline.workers = 2;
    config.pipeline.output_dir = output.path().to_string_lossy().to_string();
    config
}

/// Listing page where the intercepted query points at a dead area and the
/// inline script at the real one.
fn listing_page() -> RenderedPage {
    RenderedPage {
        url: PAGE_URL.to_string(),
        requests: vec![InterceptedRequest {
            url: "https://example.com/graphql".to_string(),
            body: Some(json!({"variables": {"filters": {"areas": {"eq": 17}}}}).to_string()),
        }],
        page_state: None,
        inline_scripts: vec!["window.__CONFIG__ = { areaId: 218 };".to_string()],
    }
}

fn detail_lines() -> Vec<String> {
    [
        "Events",
        "Halloween Warehouse Party",
        "Venue",
        "The Hall",
        "123 Main St Washington",
        "Date",
        "Fri, 31 Oct 2025",
        "23:00 - 05:00",
        "Interested",
        "87",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn window() -> DateWindow {
    DateWindow::parse("2025-10-01", "2025-10-31").unwrap()
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, 19).unwrap()
}

fn request() -> RunRequest {
    RunRequest {
        page_url: Some(PAGE_URL.to_string()),
        area_override: None,
        window: window(),
    }
}

fn area_request(area_id: u32) -> RunRequest {
    RunRequest {
        page_url: None,
        area_override: Some(area_id),
        window: window(),
    }
}

/// Detail pages that never finish rendering.
struct HangingRenderer;

#[async_trait]
impl PageRenderer for HangingRenderer {
    async fn render_listing(&self, _url: &str) -> listing_scraper::Result<RenderedPage> {
        Ok(RenderedPage::default())
    }

    async fn render_detail_lines(&self, _url: &str) -> listing_scraper::Result<Vec<String>> {
        std::future::pending().await
    }
}

/// Records how many detail renders are in flight at once.
#[derive(Default)]
struct CountingRenderer {
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl PageRenderer for CountingRenderer {
    async fn render_listing(&self, _url: &str) -> listing_scraper::Result<RenderedPage> {
        Ok(RenderedPage::default())
    }

    async fn render_detail_lines(&self, _url: &str) -> listing_scraper::Result<Vec<String>> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(detail_lines())
    }
}

#[tokio::test]
async fn run_discovers_area_merges_details_and_versions() -> Result<()> {
    let server = MockServer::start().await;
    mount_area(&server, 17, &[]).await;
    mount_area(&server, 218, &[1, 2]).await;
    let output = tempdir()?;

    let renderer = CapturedPage::new(listing_page()).with_detail_lines("https://example.com/events/1", detail_lines());
    let client = Arc::new(EventListingsClient::new(&config(&server, &output).source)?);
    let store = Arc::new(InMemoryEventStore::new());
    let pipeline = Pipeline::new(config(&server, &output), Arc::new(renderer), client)
        .with_store(store.clone())
        .with_today(today());

    let result = pipeline.run(request(), CancellationToken::new()).await?;

    assert_eq!(result.area.area_id, 218);
    assert!(result.area.verified);
    assert_eq!(result.total_events, 2);
    assert_eq!(result.detail_merged, 1);
    assert_eq!(result.error_fallback, 1);
    assert_eq!(result.versions_inserted, 2);

    let merged = &result.events[0];
    assert_eq!(merged.id, "1");
    assert_eq!(merged.data_source, DataSource::DetailMerged);
    assert_eq!(merged.title, "Halloween Warehouse Party");
    assert_eq!(merged.venue_name.as_deref(), Some("The Hall"));
    assert_eq!(merged.address.as_deref(), Some("123 Main St Washington"));
    assert_eq!(merged.start_time.as_deref(), Some("23:00"));
    assert_eq!(merged.attendance, Some(87));
    assert_eq!(merged.artists, vec!["DJ One"]);

    let fallback = &result.events[1];
    assert_eq!(fallback.id, "2");
    assert_eq!(fallback.data_source, DataSource::ErrorFallback);
    assert_eq!(fallback.title, "Listing title 2");
    assert_eq!(fallback.attendance, Some(2000));
    assert!(fallback.error.as_deref().unwrap_or_default().contains("no captured detail page"));

    let file_name = std::path::Path::new(&result.output_file)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    assert!(file_name.starts_with("events_218_2025-10-01_2025-10-31_"));
    let written: Vec<CanonicalEvent> = serde_json::from_str(&std::fs::read_to_string(&result.output_file)?)?;
    assert_eq!(written.len(), 2);

    // same data again: nothing new to version
    let again = pipeline.run(request(), CancellationToken::new()).await?;
    assert_eq!(again.versions_inserted, 0);
    assert_eq!(again.versions_unchanged, 2);
    assert_eq!(store.len(), 2);
    Ok(())
}

#[tokio::test]
async fn page_without_candidates_is_fatal() -> Result<()> {
    let server = MockServer::start().await;
    let output = tempdir()?;
    let renderer = CapturedPage::new(RenderedPage {
        url: PAGE_URL.to_string(),
        ..RenderedPage::default()
    });
    let client = Arc::new(EventListingsClient::new(&config(&server, &output).source)?);
    let pipeline = Pipeline::new(config(&server, &output), Arc::new(renderer), client);

    let err = pipeline.run(request(), CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, ScraperError::NoAreaCandidates { .. }));
    Ok(())
}

#[tokio::test]
async fn unverified_area_is_refused_unless_allowed() -> Result<()> {
    let server = MockServer::start().await;
    mount_area(&server, 17, &[]).await;
    mount_area(&server, 218, &[]).await;
    let output = tempdir()?;

    let client = Arc::new(EventListingsClient::new(&config(&server, &output).source)?);
    let strict = Pipeline::new(
        config(&server, &output),
        Arc::new(CapturedPage::new(listing_page())),
        client.clone(),
    );
    let err = strict.discover_area(PAGE_URL, window()).await.unwrap_err();
    assert!(matches!(err, ScraperError::AreaUnverified { area_id: 17 }));

    let mut lenient_config = config(&server, &output);
    lenient_config.pipeline.allow_unverified_area = true;
    let lenient = Pipeline::new(lenient_config, Arc::new(CapturedPage::new(listing_page())), client);
    let selection = lenient.discover_area(PAGE_URL, window()).await?;
    assert_eq!(selection.area_id, 17);
    assert!(!selection.verified);
    Ok(())
}

#[tokio::test]
async fn area_override_with_skipped_details_is_bulk_only() -> Result<()> {
    let server = MockServer::start().await;
    mount_area(&server, 218, &[1, 2, 3]).await;
    let output = tempdir()?;

    let mut config = config(&server, &output);
    config.pipeline.skip_details = true;
    let client = Arc::new(EventListingsClient::new(&config.source)?);
    let pipeline = Pipeline::new(config, Arc::new(CapturedPage::new(RenderedPage::default())), client)
        .with_today(today());

    let result = pipeline
        .run(
            RunRequest {
                page_url: None,
                area_override: Some(218),
                window: window(),
            },
            CancellationToken::new(),
        )
        .await?;

    assert!(result.area.supplied);
    assert!(!result.area.verified);
    assert_eq!(result.total_events, 3);
    assert_eq!(result.bulk_only, 3);
    let ids: Vec<&str> = result.events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
    assert!(result.events.iter().all(|e| e.attendance == Some(2000)));
    assert_eq!(result.events[0].event_url.as_deref(), Some("https://example.com/events/1"));
    Ok(())
}

#[tokio::test]
async fn cancelled_batch_degrades_to_listing_data() -> Result<()> {
    let server = MockServer::start().await;
    mount_area(&server, 218, &[1, 2]).await;
    let output = tempdir()?;

    let renderer = CapturedPage::new(listing_page()).with_detail_lines("https://example.com/events/1", detail_lines());
    let client = Arc::new(EventListingsClient::new(&config(&server, &output).source)?);
    let pipeline = Pipeline::new(config(&server, &output), Arc::new(renderer), client);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = pipeline
        .run(
            RunRequest {
                page_url: None,
                area_override: Some(218),
                window: window(),
            },
            cancel,
        )
        .await?;

    assert_eq!(result.total_events, 2);
    assert_eq!(result.error_fallback, 2);
    assert!(result.events.iter().all(|e| e.error.as_deref() == Some("cancelled")));
    Ok(())
}

#[tokio::test]
async fn hung_detail_page_times_out_to_listing_data() -> Result<()> {
    let server = MockServer::start().await;
    mount_area(&server, 218, &[1, 2]).await;
    let output = tempdir()?;

    let mut config = config(&server, &output);
    config.pipeline.item_timeout_secs = 1;
    let client = Arc::new(EventListingsClient::new(&config.source)?);
    let pipeline = Pipeline::new(config, Arc::new(HangingRenderer), client).with_today(today());

    let result = pipeline.run(area_request(218), CancellationToken::new()).await?;

    assert_eq!(result.total_events, 2);
    assert_eq!(result.error_fallback, 2);
    let ids: Vec<&str> = result.events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
    assert!(result
        .events
        .iter()
        .all(|e| e.error.as_deref().unwrap_or_default().contains("timed out")));
    assert_eq!(result.events[0].title, "Listing title 1");
    Ok(())
}

#[tokio::test]
async fn detail_renders_never_exceed_worker_count() -> Result<()> {
    let server = MockServer::start().await;
    mount_area(&server, 218, &[1, 2, 3, 4, 5, 6]).await;
    let output = tempdir()?;

    let config = config(&server, &output);
    assert_eq!(config.pipeline.workers, 2);
    let renderer = Arc::new(CountingRenderer::default());
    let client = Arc::new(EventListingsClient::new(&config.source)?);
    let pipeline = Pipeline::new(config, renderer.clone(), client).with_today(today());

    let result = pipeline.run(area_request(218), CancellationToken::new()).await?;

    assert_eq!(result.total_events, 6);
    assert_eq!(result.detail_merged, 6);
    let peak = renderer.peak.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "peak concurrency was {peak}");
    assert_eq!(renderer.current.load(Ordering::SeqCst), 0);
    Ok(())
}
