//! Heuristic discovery of the site's internal area identifier.
//!
//! Three independent sources are scanned on a rendered listing page. None of
//! them can fail: a malformed body or a missing path just contributes nothing.

use crate::app::ports::{InterceptedRequest, RenderedPage};
use crate::common::json::{as_integer, at_path, parse_lenient};
use crate::constants::{is_valid_area_id, MAX_STATE_DEPTH, QUERY_ENDPOINT_MARKER};
use crate::types::{AreaCodeCandidate, CandidateSource};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

const REQUEST_AREA_PATH: &[&str] = &["variables", "filters", "areas", "eq"];

const STATE_AREA_PATHS: &[&[&str]] = &[
    &["props", "areaId"],
    &["props", "pageProps", "areaId"],
    &["props", "pageProps", "initialArea", "id"],
];

static SCRIPT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"areaId["']?\s*[=:]\s*["']?(\d{1,5})"#,
        r#""area"\s*:\s*"?(\d{1,5})"#,
        r#"areas["']?\s*:\s*\{[^{}]{0,40}?eq["']?\s*:\s*["']?(\d{1,5})"#,
        r#"areaCode["']?\s*[=:]\s*["']?(\d{1,5})"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("area pattern compiles"))
    .collect()
});

/// Collects area candidates from every source, de-duplicated by value.
///
/// Candidates keep the order they were first seen in (requests, then page
/// state, then inline scripts). That order carries no ranking.
pub fn collect_candidates(page: &RenderedPage) -> Vec<AreaCodeCandidate> {
    let mut collector = CandidateSet::default();

    for request in &page.requests {
        for area_id in from_request(request) {
            collector.push(area_id, CandidateSource::InterceptedRequest);
        }
    }
    if let Some(state) = &page.page_state {
        for area_id in from_page_state(state) {
            collector.push(area_id, CandidateSource::EmbeddedState);
        }
    }
    for script in &page.inline_scripts {
        for area_id in from_inline_script(script) {
            collector.push(area_id, CandidateSource::InlineScript);
        }
    }

    debug!(
        "Collected {} area candidates from {}",
        collector.candidates.len(),
        page.url
    );
    collector.candidates
}

#[derive(Default)]
struct CandidateSet {
    seen: HashSet<u32>,
    candidates: Vec<AreaCodeCandidate>,
}

impl CandidateSet {
    fn push(&mut self, value: i64, source: CandidateSource) {
        if !is_valid_area_id(value) {
            return;
        }
        let area_id = value as u32;
        if self.seen.insert(area_id) {
            self.candidates.push(AreaCodeCandidate { area_id, source });
        }
    }
}

/// Source A: `variables.filters.areas.eq` of intercepted listing queries.
pub fn from_request(request: &InterceptedRequest) -> Vec<i64> {
    if !request.url.to_lowercase().contains(QUERY_ENDPOINT_MARKER) {
        return Vec::new();
    }
    let Some(body) = request.body.as_deref().and_then(parse_lenient) else {
        return Vec::new();
    };

    let operations: Vec<&Value> = match &body {
        Value::Array(batch) => batch.iter().collect(),
        single => vec![single],
    };
    operations
        .into_iter()
        .filter_map(|op| at_path(op, REQUEST_AREA_PATH))
        .filter_map(as_integer)
        .filter(|v| is_valid_area_id(*v))
        .collect()
}

/// Source B: keys mentioning "area" anywhere in the embedded state, plus the
/// conventional locations frameworks put a page's area in.
pub fn from_page_state(state: &Value) -> Vec<i64> {
    let mut found = Vec::new();
    for path in STATE_AREA_PATHS {
        if let Some(v) = at_path(state, path).and_then(as_integer) {
            if is_valid_area_id(v) {
                found.push(v);
            }
        }
    }
    walk_state(state, 0, &mut found);
    found
}

fn walk_state(value: &Value, depth: usize, found: &mut Vec<i64>) {
    if depth > MAX_STATE_DEPTH {
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key.to_lowercase().contains("area") {
                    if let Some(v) = as_integer(child) {
                        if is_valid_area_id(v) {
                            found.push(v);
                        }
                    }
                }
                walk_state(child, depth + 1, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk_state(item, depth + 1, found);
            }
        }
        _ => {}
    }
}

/// Source C: regex scan of inline script text.
pub fn from_inline_script(script: &str) -> Vec<i64> {
    SCRIPT_PATTERNS
        .iter()
        .flat_map(|pattern| pattern.captures_iter(script))
        .filter_map(|caps| caps.get(1)?.as_str().parse::<i64>().ok())
        .filter(|v| is_valid_area_id(*v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graphql_request(body: &str) -> InterceptedRequest {
        InterceptedRequest {
            url: "https://example.com/graphql".to_string(),
            body: Some(body.to_string()),
        }
    }

    #[test]
    fn request_body_area_is_emitted() {
        let body = json!({
            "operationName": "GET_EVENT_LISTINGS",
            "variables": {"filters": {"areas": {"eq": 218}}}
        })
        .to_string();
        assert_eq!(from_request(&graphql_request(&body)), vec![218]);
    }

    #[test]
    fn double_encoded_request_body_is_reparsed() {
        let inner = json!({"variables": {"filters": {"areas": {"eq": "34"}}}}).to_string();
        let body = serde_json::to_string(&inner).unwrap();
        assert_eq!(from_request(&graphql_request(&body)), vec![34]);
    }

    #[test]
    fn requests_to_other_endpoints_are_ignored() {
        let request = InterceptedRequest {
            url: "https://example.com/api/track".to_string(),
            body: Some(json!({"variables": {"filters": {"areas": {"eq": 5}}}}).to_string()),
        };
        assert!(from_request(&request).is_empty());
        assert!(from_request(&graphql_request("{broken")).is_empty());
    }

    #[test]
    fn page_state_walk_finds_area_keys_and_conventional_paths() {
        let state = json!({
            "props": {
                "pageProps": {
                    "initialArea": {"id": "218", "name": "Washington DC"},
                    "listing": [{"venue": {"areaCode": 219}}]
                }
            },
            "apollo": {"AreaLookup": 0, "primaryArea": 99999}
        });
        let found = from_page_state(&state);
        assert!(found.contains(&218));
        assert!(found.contains(&219));
        assert!(!found.contains(&0));
        assert!(!found.contains(&99999));
    }

    #[test]
    fn page_state_walk_stops_at_depth_limit() {
        let mut deep = json!({"areaId": 7});
        for _ in 0..(MAX_STATE_DEPTH + 5) {
            deep = json!({"nested": deep});
        }
        assert!(from_page_state(&deep).is_empty());

        let mut shallow = json!({"areaId": 7});
        for _ in 0..5 {
            shallow = json!({"nested": shallow});
        }
        assert_eq!(from_page_state(&shallow), vec![7]);
    }

    #[test]
    fn inline_script_patterns() {
        let script = r#"
            window.cfg = { areaId: 13 };
            fetch("/x?areaId=14");
            var s = {"area":15};
            var q = {areas: {eq: 16}};
            var c = "areaCode=17";
            var big = "areaId=123456";
        "#;
        let mut found = from_inline_script(script);
        found.sort();
        assert_eq!(found, vec![13, 14, 15, 16, 17]);
    }

    #[test]
    fn collected_candidates_are_in_range_and_unique() {
        let page = RenderedPage {
            url: "https://example.com/events/us/washingtondc".to_string(),
            requests: vec![graphql_request(
                &json!({"variables": {"filters": {"areas": {"eq": 218}}}}).to_string(),
            )],
            page_state: Some(json!({"props": {"areaId": 218}, "otherArea": 0, "x": {"area": 4}})),
            inline_scripts: vec!["areaId=218; areaCode=10000; areaId=4; areaId=9999".to_string()],
        };
        let candidates = collect_candidates(&page);
        let ids: Vec<u32> = candidates.iter().map(|c| c.area_id).collect();
        assert_eq!(ids, vec![218, 4, 9999]);
        assert_eq!(candidates[0].source, CandidateSource::InterceptedRequest);
        assert_eq!(candidates[1].source, CandidateSource::EmbeddedState);
        assert_eq!(candidates[2].source, CandidateSource::InlineScript);
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert!(collect_candidates(&RenderedPage::default()).is_empty());
    }
}
