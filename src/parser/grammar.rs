//! The detail page parsing grammar.
//!
//! Rendered detail pages carry no stable markup, only a site-wide convention:
//! a label line ("Venue", "Date", "Lineup", ...) directly precedes its value
//! lines. Everything layout-specific lives in this table so a site redesign is
//! a grammar change, not a control-flow change.

use once_cell::sync::Lazy;
use regex::Regex;

pub const GRAMMAR_VERSION: &str = "2025-10";

static DAY_MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:(?:mon|tue|wed|thu|fri|sat|sun)[a-z]*\.?,?\s+)?\d{1,2}(?:st|nd|rd|th)?\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?,?\s+\d{4}$",
    )
    .expect("date shape compiles")
});

static TIME_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:[a-z]{3,9}\.?,?\s+)?\d{1,2}[:.]\d{2}\s*(?:[ap]m)?\s*[-–—]\s*(?:[a-z]{3,9}\.?,?\s+)?\d{1,2}[:.]\d{2}\s*(?:[ap]m)?$",
    )
    .expect("time shape compiles")
});

static STREET_OR_CITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b\d{1,6}[a-z]?\b.*\b(?:st|street|ave|avenue|rd|road|blvd|boulevard|dr|drive|ln|lane|way|pl|place|ct|court|pkwy|parkway|hwy|highway|sq|square|ter|terrace|nw|ne|sw|se|washington|dc|seattle|new york|brooklyn|london|berlin|chicago|los angeles|baltimore|philadelphia|arlington|alexandria)\b",
    )
    .expect("address shape compiles")
});

static SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\s\-–—•·|/,*+_=~.]+$").expect("separator shape compiles"));

/// Value constraint applied to a candidate line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Any line that is not itself a section label
    Text,
    StreetAddress,
    DayMonthYear,
    TimeRange,
    Integer,
}

impl Shape {
    pub fn accepts(&self, line: &str, grammar: &Grammar) -> bool {
        match self {
            Shape::Text => !grammar.is_label(line),
            Shape::StreetAddress => STREET_OR_CITY.is_match(line),
            Shape::DayMonthYear => DAY_MONTH_YEAR.is_match(line),
            Shape::TimeRange => TIME_RANGE.is_match(line),
            Shape::Integer => parse_integer(line).is_some(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Venue,
    Address,
    Date,
    Time,
    Promoter,
    Admin,
    Cost,
    MinAge,
    Interested,
}

/// Single-line field: the line `offset` positions after the anchor
#[derive(Debug, Clone)]
pub struct WindowRule {
    pub field: Field,
    pub anchors: &'static [&'static str],
    pub offset: usize,
    pub shape: Shape,
}

/// Multi-line field: lines after the anchor until a stop label
#[derive(Debug, Clone)]
pub struct BlockRule {
    pub anchors: &'static [&'static str],
    pub stop_labels: &'static [&'static str],
    pub min_len: usize,
    pub max_len: usize,
    /// Lines longer than this end the block (prose has started)
    pub prose_len: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct TitleRule {
    /// Title is searched for before the first of these anchors
    pub before_anchors: &'static [&'static str],
    pub min_len: usize,
    pub max_len: usize,
    pub nav_labels: &'static [&'static str],
}

#[derive(Debug, Clone)]
pub struct DescriptionRule {
    /// Used when the page has no genre block
    pub fallback_anchors: &'static [&'static str],
    pub end_labels: &'static [&'static str],
    pub long_line: usize,
    pub medium_line: usize,
    pub min_kept_line: usize,
}

#[derive(Debug, Clone)]
pub struct Grammar {
    pub version: &'static str,
    pub title: TitleRule,
    pub windows: Vec<WindowRule>,
    pub lineup: BlockRule,
    pub genres: BlockRule,
    pub description: DescriptionRule,
}

const VENUE: &[&str] = &["venue"];
const DATE: &[&str] = &["date"];
const PROMOTER: &[&str] = &["promoter", "promoters", "promoted by"];
const ADMIN: &[&str] = &["event admin", "admin"];
const COST: &[&str] = &["cost", "price"];
const MIN_AGE: &[&str] = &["min age", "min. age", "minimum age"];
const INTERESTED: &[&str] = &["interested"];
const LINEUP: &[&str] = &["lineup", "line-up", "line up"];
const GENRES: &[&str] = &["genres", "genre"];
const DESCRIPTION: &[&str] = &["description"];

const LINEUP_STOPS: &[&str] = &[
    "share", "genres", "genre", "event admin", "description", "cost", "price", "tickets",
    "ticket", "buy tickets", "min age", "min. age", "minimum age", "promoter", "promoters",
    "interested", "last updated", "producer",
];

const GENRE_STOPS: &[&str] = &[
    "event admin", "last updated", "producer", "cost", "price", "min age", "min. age",
    "minimum age", "share", "lineup", "line-up", "promoter", "promoters", "tickets",
    "buy tickets", "description",
];

const DESCRIPTION_ENDS: &[&str] = &[
    "event admin", "last updated", "producer", "cost", "price", "min age", "min. age",
    "minimum age", "promoter", "promoters", "tickets", "buy tickets", "report this event",
];

const NAV_LABELS: &[&str] = &[
    "events", "clubs", "magazine", "music", "news", "features", "reviews", "podcasts",
    "mixes", "djs", "artists", "festivals", "tickets", "submit event", "search", "log in",
    "login", "sign up", "register", "menu", "home", "back", "save", "share", "follow",
    "account", "guide", "for you", "exchange", "buy tickets", "news & features",
];

impl Default for Grammar {
    fn default() -> Self {
        Self {
            version: GRAMMAR_VERSION,
            title: TitleRule {
                before_anchors: VENUE,
                min_len: 6,
                max_len: 199,
                nav_labels: NAV_LABELS,
            },
            windows: vec![
                WindowRule { field: Field::Venue, anchors: VENUE, offset: 1, shape: Shape::Text },
                WindowRule { field: Field::Address, anchors: VENUE, offset: 2, shape: Shape::StreetAddress },
                WindowRule { field: Field::Date, anchors: DATE, offset: 1, shape: Shape::DayMonthYear },
                WindowRule { field: Field::Time, anchors: DATE, offset: 2, shape: Shape::TimeRange },
                WindowRule { field: Field::Promoter, anchors: PROMOTER, offset: 1, shape: Shape::Text },
                WindowRule { field: Field::Admin, anchors: ADMIN, offset: 1, shape: Shape::Text },
                WindowRule { field: Field::Cost, anchors: COST, offset: 1, shape: Shape::Text },
                WindowRule { field: Field::MinAge, anchors: MIN_AGE, offset: 1, shape: Shape::Text },
                WindowRule { field: Field::Interested, anchors: INTERESTED, offset: 1, shape: Shape::Integer },
            ],
            lineup: BlockRule {
                anchors: LINEUP,
                stop_labels: LINEUP_STOPS,
                min_len: 2,
                max_len: 50,
                prose_len: None,
            },
            genres: BlockRule {
                anchors: GENRES,
                stop_labels: GENRE_STOPS,
                min_len: 5,
                max_len: 30,
                prose_len: Some(200),
            },
            description: DescriptionRule {
                fallback_anchors: DESCRIPTION,
                end_labels: DESCRIPTION_ENDS,
                long_line: 50,
                medium_line: 20,
                min_kept_line: 10,
            },
        }
    }
}

impl Grammar {
    pub fn window(&self, field: Field) -> Option<&WindowRule> {
        self.windows.iter().find(|rule| rule.field == field)
    }

    /// True when the line is any section label this grammar knows about.
    pub fn is_label(&self, line: &str) -> bool {
        let normalized = normalize_label(line);
        self.windows
            .iter()
            .flat_map(|rule| rule.anchors.iter())
            .chain(self.lineup.anchors)
            .chain(self.lineup.stop_labels)
            .chain(self.genres.anchors)
            .chain(self.genres.stop_labels)
            .chain(self.description.fallback_anchors)
            .chain(self.description.end_labels)
            .any(|label| *label == normalized)
    }

    pub fn is_nav_label(&self, line: &str) -> bool {
        let normalized = normalize_label(line);
        self.title.nav_labels.iter().any(|label| *label == normalized)
    }
}

/// Lowercased, whitespace-collapsed label with trailing punctuation removed.
pub fn normalize_label(line: &str) -> String {
    line.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches([':', '.', '-'])
        .trim()
        .to_lowercase()
}

pub fn matches_any(line: &str, labels: &[&str]) -> bool {
    let normalized = normalize_label(line);
    labels.iter().any(|label| *label == normalized)
}

pub fn is_separator(line: &str) -> bool {
    SEPARATOR.is_match(line)
}

/// Plain integer with optional thousands separators, e.g. "1,234".
pub fn parse_integer(line: &str) -> Option<u64> {
    let cleaned: String = line.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() || !cleaned.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    cleaned.parse().ok()
}
