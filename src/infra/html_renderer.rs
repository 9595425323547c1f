use crate::app::ports::{PageRenderer, RenderedPage};
use crate::common::json::parse_lenient;
use crate::config::SourceConfig;
use crate::error::{Result, ScraperError};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::header::{ACCEPT, USER_AGENT};
use scraper::{Html, Node, Selector};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

static NEXT_DATA: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script#__NEXT_DATA__").expect("state selector parses"));
static INLINE_SCRIPT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script:not([src])").expect("script selector parses"));

const INVISIBLE: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Static approximation of a browser: fetches the HTML and reads what the
/// server already rendered. Sees no network traffic, so intercepted requests
/// are always empty.
pub struct HtmlPageRenderer {
    client: reqwest::Client,
    user_agent: String,
}

impl HtmlPageRenderer {
    pub fn new(source: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(source.timeout())
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            user_agent: source.user_agent.clone(),
        })
    }

    async fn fetch_html(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::Api {
                message: format!("{} returned {}", url, status.as_u16()),
            });
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl PageRenderer for HtmlPageRenderer {
    #[instrument(skip(self))]
    async fn render_listing(&self, url: &str) -> Result<RenderedPage> {
        let html = self.fetch_html(url).await?;
        Ok(parse_listing_html(url, &html))
    }

    #[instrument(skip(self))]
    async fn render_detail_lines(&self, url: &str) -> Result<Vec<String>> {
        let html = self.fetch_html(url).await?;
        Ok(visible_lines(&html))
    }
}

/// Embedded state and inline scripts of a listing page.
pub fn parse_listing_html(url: &str, html: &str) -> RenderedPage {
    let document = Html::parse_document(html);

    let page_state = document
        .select(&NEXT_DATA)
        .next()
        .and_then(|el| parse_lenient(&el.text().collect::<String>()));

    let inline_scripts: Vec<String> = document
        .select(&INLINE_SCRIPT)
        .filter(|el| el.value().id() != Some("__NEXT_DATA__"))
        .map(|el| el.text().collect::<String>())
        .filter(|text| !text.trim().is_empty())
        .collect();

    debug!(
        url,
        has_state = page_state.is_some(),
        scripts = inline_scripts.len(),
        "Parsed listing page"
    );
    RenderedPage {
        url: url.to_string(),
        requests: Vec::new(),
        page_state,
        inline_scripts,
    }
}

/// Visible text as trimmed, non-empty lines in document order.
pub fn visible_lines(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .tree
        .root()
        .descendants()
        .filter_map(|node| match node.value() {
            Node::Text(text) => {
                let hidden = node.ancestors().any(|a| {
                    a.value()
                        .as_element()
                        .is_some_and(|el| INVISIBLE.contains(&el.name()))
                });
                (!hidden).then(|| text.trim().to_string())
            }
            _ => None,
        })
        .flat_map(|text| {
            text.lines()
                .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct CaptureFile {
    #[serde(flatten)]
    page: RenderedPage,
    #[serde(default)]
    detail_lines: HashMap<String, Vec<String>>,
}

/// Renderer backed by a capture file written by an external headless browser.
///
/// The file is a `RenderedPage` JSON object with an optional `detail_lines`
/// map of detail URL to rendered text lines. Detail URLs missing from the
/// capture go to the fallback renderer when one is set.
pub struct CapturedPage {
    page: RenderedPage,
    detail_lines: HashMap<String, Vec<String>>,
    fallback: Option<Arc<dyn PageRenderer>>,
}

impl CapturedPage {
    pub fn new(page: RenderedPage) -> Self {
        Self {
            page,
            detail_lines: HashMap::new(),
            fallback: None,
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let capture: CaptureFile = serde_json::from_str(&content)?;
        info!(
            "Loaded capture {} ({} requests, {} detail pages)",
            path.display(),
            capture.page.requests.len(),
            capture.detail_lines.len()
        );
        Ok(Self {
            page: capture.page,
            detail_lines: capture.detail_lines,
            fallback: None,
        })
    }

    pub fn with_detail_lines(mut self, url: impl Into<String>, lines: Vec<String>) -> Self {
        self.detail_lines.insert(url.into(), lines);
        self
    }

    pub fn with_fallback(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.fallback = Some(renderer);
        self
    }

    pub fn page_url(&self) -> &str {
        &self.page.url
    }
}

#[async_trait]
impl PageRenderer for CapturedPage {
    async fn render_listing(&self, url: &str) -> Result<RenderedPage> {
        if !self.page.url.is_empty() && self.page.url != url {
            debug!(requested = url, captured = %self.page.url, "Serving captured listing page for a different URL");
        }
        Ok(self.page.clone())
    }

    async fn render_detail_lines(&self, url: &str) -> Result<Vec<String>> {
        if let Some(lines) = self.detail_lines.get(url) {
            return Ok(lines.clone());
        }
        match &self.fallback {
            Some(renderer) => renderer.render_detail_lines(url).await,
            None => Err(ScraperError::Api {
                message: format!("no captured detail page for {url}"),
            }),
        }
    }
}
