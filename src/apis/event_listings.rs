use crate::app::ports::{ListingClient, ListingQuery};
use crate::common::json::parse_lenient;
use crate::config::SourceConfig;
use crate::constants::LISTINGS_OPERATION;
use crate::error::{Result, ScraperError};
use crate::types::{ListingPage, ListingRecord};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, REFERER, USER_AGENT};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

const LISTINGS_QUERY: &str = r#"query GET_EVENT_LISTINGS($filters: FilterInputDtoInput, $filterOptions: FilterOptionsInputDtoInput, $page: Int, $pageSize: Int) {
  eventListings(filters: $filters, filterOptions: $filterOptions, pageSize: $pageSize, page: $page) {
    data {
      id
      listingDate
      event {
        id
        date
        startTime
        endTime
        title
        contentUrl
        flyerFront
        isTicketed
        attending
        venue { id name contentUrl }
        artists { id name }
        images { filename }
      }
    }
    totalResults
  }
}"#;

/// Request body for one page of the bulk event search
pub fn build_request_body(query: &ListingQuery) -> Value {
    json!({
        "operationName": LISTINGS_OPERATION,
        "variables": {
            "filters": {
                "areas": { "eq": query.area_id },
                "listingDate": {
                    "gte": query.window.start_iso(),
                    "lte": query.window.end_iso()
                }
            },
            "filterOptions": { "genre": true },
            "page": query.page,
            "pageSize": query.page_size
        },
        "query": LISTINGS_QUERY
    })
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<ListingsData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingsData {
    event_listings: Option<EventListings>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListings {
    #[serde(default)]
    data: Vec<ListingEntry>,
    #[serde(default)]
    total_results: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingEntry {
    listing_date: Option<String>,
    event: Option<ApiEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    id: Value,
    title: Option<String>,
    date: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    content_url: Option<String>,
    flyer_front: Option<String>,
    is_ticketed: Option<bool>,
    attending: Option<Value>,
    venue: Option<ApiVenue>,
    #[serde(default)]
    artists: Vec<ApiArtist>,
    #[serde(default)]
    images: Vec<ApiImage>,
}

#[derive(Debug, Deserialize)]
struct ApiVenue {
    id: Option<Value>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiImage {
    filename: Option<String>,
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Maps a decoded listing response onto listing records.
///
/// Returns `None` when the payload has no `eventListings` block (GraphQL
/// errors, schema drift), which callers treat as "no page".
pub fn parse_listing_page(body: Value) -> Option<ListingPage> {
    let response: GraphQlResponse = match serde_json::from_value(body) {
        Ok(r) => r,
        Err(e) => {
            debug!("Listing payload did not match the expected shape: {}", e);
            return None;
        }
    };
    for error in &response.errors {
        warn!("Listing endpoint reported error: {}", error.message);
    }
    let listings = response.data?.event_listings?;
    let total_results = listings.total_results;

    let entries = listings
        .data
        .into_iter()
        .filter_map(|entry| {
            let event = entry.event?;
            let id = scalar_to_string(&event.id)?;
            let image_url = non_empty(event.flyer_front)
                .or_else(|| event.images.into_iter().find_map(|i| non_empty(i.filename)));
            let (venue_id, venue_name) = match event.venue {
                Some(v) => (v.id.as_ref().and_then(scalar_to_string), non_empty(v.name)),
                None => (None, None),
            };
            Some(ListingRecord {
                id,
                title: event.title.unwrap_or_default().trim().to_string(),
                date: non_empty(event.date).or(non_empty(entry.listing_date)),
                start_time: non_empty(event.start_time),
                end_time: non_empty(event.end_time),
                venue_name,
                venue_id,
                artists: event
                    .artists
                    .into_iter()
                    .filter_map(|a| non_empty(a.name))
                    .collect(),
                attending: event.attending.as_ref().and_then(scalar_to_string),
                content_url: non_empty(event.content_url),
                is_ticketed: event.is_ticketed.unwrap_or(false),
                image_url,
                total_results,
            })
        })
        .collect();

    Some(ListingPage {
        entries,
        total_results,
    })
}

/// Bulk listing client speaking the site's GraphQL endpoint
pub struct EventListingsClient {
    client: reqwest::Client,
    endpoint: String,
    user_agent: String,
}

impl EventListingsClient {
    pub fn new(source: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(source.timeout())
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            endpoint: source.graphql_url.clone(),
            user_agent: source.user_agent.clone(),
        })
    }
}

#[async_trait]
impl ListingClient for EventListingsClient {
    #[instrument(skip(self, query), fields(area_id = query.area_id, page = query.page))]
    async fn fetch_page(&self, query: &ListingQuery) -> Result<Option<ListingPage>> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json")
            .json(&build_request_body(query));
        if let Some(reference) = &query.reference_url {
            request = request.header(REFERER, reference);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::Api {
                message: format!("listing endpoint returned {}", status.as_u16()),
            });
        }

        let text = response.text().await?;
        match parse_lenient(&text) {
            Some(body) => Ok(parse_listing_page(body)),
            None => {
                warn!("Listing response was not JSON ({} bytes); abandoning page", text.len());
                Ok(None)
            }
        }
    }
}
