use crate::error::Result;
use crate::types::{DateWindow, ListingPage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An outgoing request observed while the listing page rendered
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterceptedRequest {
    pub url: String,
    #[serde(default)]
    pub body: Option<String>,
}

/// Everything the area discovery stage needs from a rendered listing page.
///
/// Produced by a browser session (or a static approximation of one). The same
/// shape is used for capture files written by an external headless browser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderedPage {
    pub url: String,
    #[serde(default)]
    pub requests: Vec<InterceptedRequest>,
    #[serde(default)]
    pub page_state: Option<serde_json::Value>,
    #[serde(default)]
    pub inline_scripts: Vec<String>,
}

#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render_listing(&self, url: &str) -> Result<RenderedPage>;

    /// Visible text of a fully rendered page as trimmed, non-empty lines in document order.
    async fn render_detail_lines(&self, url: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListingQuery {
    pub area_id: u32,
    pub window: DateWindow,
    /// 1-indexed
    pub page: u32,
    pub page_size: u32,
    /// Sent as the Referer so the endpoint sees the page the query belongs to
    pub reference_url: Option<String>,
}

#[async_trait]
pub trait ListingClient: Send + Sync {
    /// `Ok(None)` when the endpoint answered without a usable listing payload.
    async fn fetch_page(&self, query: &ListingQuery) -> Result<Option<ListingPage>>;
}
