use anyhow::Result;
use listing_scraper::apis::EventListingsClient;
use listing_scraper::app::ports::{ListingClient, ListingQuery};
use listing_scraper::config::SourceConfig;
use listing_scraper::pipeline::ingestion::BulkListingFetcher;
use listing_scraper::types::DateWindow;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn listings(ids: &[u32], total: u32) -> Value {
    let data: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "id": format!("l{id}"),
                "listingDate": "2025-10-31T00:00:00.000",
                "event": {
                    "id": id.to_string(),
                    "title": format!("Event {id}"),
                    "date": "2025-10-31T00:00:00.000",
                    "startTime": "2025-10-31T22:00:00.000",
                    "contentUrl": format!("/events/{id}"),
                    "attending": "2K",
                    "venue": {"id": "5031", "name": "Flash"},
                    "artists": [{"id": "9", "name": "DJ One"}]
                }
            })
        })
        .collect();
    json!({"data": {"eventListings": {"data": data, "totalResults": total}}})
}

fn source(server: &MockServer) -> SourceConfig {
    SourceConfig {
        graphql_url: format!("{}/graphql", server.uri()),
        ..SourceConfig::default()
    }
}

fn window() -> DateWindow {
    DateWindow::parse("2025-10-01", "2025-10-31").unwrap()
}

fn query(page: u32) -> ListingQuery {
    ListingQuery {
        area_id: 218,
        window: window(),
        page,
        page_size: 2,
        reference_url: Some("https://example.com/events/us/washingtondc".to_string()),
    }
}

#[tokio::test]
async fn client_posts_listing_query_and_maps_entries() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("referer", "https://example.com/events/us/washingtondc"))
        .and(body_partial_json(json!({
            "operationName": "GET_EVENT_LISTINGS",
            "variables": {
                "filters": {"areas": {"eq": 218}, "listingDate": {"gte": "2025-10-01", "lte": "2025-10-31"}},
                "page": 1,
                "pageSize": 2
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(listings(&[1, 2], 3)))
        .expect(1)
        .mount(&server)
        .await;

    let client = EventListingsClient::new(&source(&server))?;
    let page = client.fetch_page(&query(1)).await?.expect("listing page");

    assert_eq!(page.total_results, 3);
    assert_eq!(page.entries.len(), 2);
    assert_eq!(page.entries[0].id, "1");
    assert_eq!(page.entries[0].venue_name.as_deref(), Some("Flash"));
    assert_eq!(page.entries[0].attending.as_deref(), Some("2K"));
    assert_eq!(page.entries[1].content_url.as_deref(), Some("/events/2"));
    Ok(())
}

#[tokio::test]
async fn prefixed_json_body_is_recovered() -> Result<()> {
    let server = MockServer::start().await;
    let body = format!(")]}}'\n{}", listings(&[7], 1));
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let client = EventListingsClient::new(&source(&server))?;
    let page = client.fetch_page(&query(1)).await?.expect("listing page");
    assert_eq!(page.entries[0].id, "7");
    Ok(())
}

#[tokio::test]
async fn non_json_body_is_no_page_and_server_error_is_err() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({"variables": {"page": 1}})))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>blocked</html>"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({"variables": {"page": 2}})))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = EventListingsClient::new(&source(&server))?;
    assert!(client.fetch_page(&query(1)).await?.is_none());
    assert!(client.fetch_page(&query(2)).await.is_err());
    Ok(())
}

#[tokio::test]
async fn fetcher_walks_pages_against_endpoint() -> Result<()> {
    let server = MockServer::start().await;
    for (page, ids) in [(1u32, vec![1u32, 2]), (2, vec![3, 4]), (3, vec![5])] {
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_partial_json(json!({"variables": {"page": page}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(listings(&ids, 5)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = Arc::new(EventListingsClient::new(&source(&server))?);
    let fetcher = BulkListingFetcher::new(client, Duration::ZERO);
    let report = fetcher.fetch_report(218, window(), 2).await;

    let ids: Vec<&str> = report.entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
    assert_eq!(report.pages_requested, 3);
    assert!(report.failed_pages.is_empty());
    Ok(())
}
