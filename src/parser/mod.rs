//! Anchor-based extraction of detail records from rendered page text.
//!
//! Each field has its own extractor that scans the full line sequence for its
//! anchor, so extractors are independent of each other and of call order.
//! Every miss resolves to `None` (or an empty list); extraction never fails.

pub mod grammar;

use crate::types::DetailRecord;
use grammar::{is_separator, matches_any, parse_integer, BlockRule, Field, Grammar};
use tracing::debug;

pub use grammar::{Shape, GRAMMAR_VERSION};

#[derive(Debug, Clone, Default)]
pub struct DetailPageExtractor {
    grammar: Grammar,
}

impl DetailPageExtractor {
    pub fn new(grammar: Grammar) -> Self {
        Self { grammar }
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// Extracts a detail record from rendered text lines.
    pub fn extract<S: AsRef<str>>(&self, lines: &[S]) -> DetailRecord {
        let lines: Vec<&str> = lines
            .iter()
            .map(|l| l.as_ref().trim())
            .filter(|l| !l.is_empty())
            .collect();

        let record = DetailRecord {
            title: self.title(&lines),
            venue: self.window_field(&lines, Field::Venue),
            address: self.window_field(&lines, Field::Address),
            date: self.window_field(&lines, Field::Date),
            time: self.window_field(&lines, Field::Time),
            promoter: self.window_field(&lines, Field::Promoter),
            interested: self
                .window_field(&lines, Field::Interested)
                .and_then(|v| parse_integer(&v)),
            artists: self.block(&lines, &self.grammar.lineup),
            genres: self.block(&lines, &self.grammar.genres),
            description: self.description(&lines),
            cost: self.window_field(&lines, Field::Cost),
            min_age: self.window_field(&lines, Field::MinAge),
            admin: self.window_field(&lines, Field::Admin),
        };

        debug!(
            grammar = self.grammar.version,
            lines = lines.len(),
            title = record.title.is_some(),
            venue = record.venue.is_some(),
            date = record.date.is_some(),
            artists = record.artists.len(),
            genres = record.genres.len(),
            "Extracted detail record"
        );
        record
    }

    /// Convenience for callers holding the page text as one string.
    pub fn extract_text(&self, text: &str) -> DetailRecord {
        let lines: Vec<&str> = text.lines().collect();
        self.extract(&lines)
    }

    fn title(&self, lines: &[&str]) -> Option<String> {
        let rule = &self.grammar.title;
        let anchor = find_anchor(lines, rule.before_anchors)?;
        lines[..anchor]
            .iter()
            .find(|line| {
                let len = line.chars().count();
                len >= rule.min_len
                    && len <= rule.max_len
                    && !self.grammar.is_nav_label(line)
                    && !self.grammar.is_label(line)
            })
            .map(|line| line.to_string())
    }

    fn window_field(&self, lines: &[&str], field: Field) -> Option<String> {
        let rule = self.grammar.window(field)?;
        let anchor = find_anchor(lines, rule.anchors)?;
        let candidate = lines.get(anchor + rule.offset)?;
        rule.shape
            .accepts(candidate, &self.grammar)
            .then(|| candidate.to_string())
    }

    fn block(&self, lines: &[&str], rule: &BlockRule) -> Vec<String> {
        self.block_span(lines, rule).0
    }

    /// Block values plus the index of the last line taken as a value.
    fn block_span(&self, lines: &[&str], rule: &BlockRule) -> (Vec<String>, Option<usize>) {
        let Some(anchor) = find_anchor(lines, rule.anchors) else {
            return (Vec::new(), None);
        };
        let mut values = Vec::new();
        let mut last = None;
        for (i, line) in lines.iter().enumerate().skip(anchor + 1) {
            let len = line.chars().count();
            if rule.prose_len.is_some_and(|limit| len > limit) || matches_any(line, rule.stop_labels) {
                break;
            }
            if is_separator(line)
                || len < rule.min_len
                || len > rule.max_len
                || self.grammar.is_label(line)
            {
                continue;
            }
            if rule.prose_len.is_some() {
                // genre names never start with a digit
                if line.starts_with(|c: char| c.is_ascii_digit()) {
                    continue;
                }
            } else if line.chars().all(|c| c.is_ascii_digit() || c.is_whitespace()) {
                continue;
            }
            values.push(line.to_string());
            last = Some(i);
        }
        (values, last)
    }

    fn description(&self, lines: &[&str]) -> Option<String> {
        let rule = &self.grammar.description;
        // prose starts after the last genre, never inside the genre block
        let base = match find_anchor(lines, self.grammar.genres.anchors) {
            Some(anchor) => self.block_span(lines, &self.grammar.genres).1.unwrap_or(anchor),
            None => find_anchor(lines, rule.fallback_anchors)?,
        };

        let start = (base + 1..lines.len()).find(|&i| {
            let len = lines[i].chars().count();
            len > rule.long_line || (len > rule.medium_line && !self.grammar.is_label(lines[i]))
        })?;
        let end = (start + 1..lines.len())
            .find(|&i| matches_any(lines[i], rule.end_labels))
            .unwrap_or(lines.len());

        let text = lines[start..end]
            .iter()
            .filter(|line| line.chars().count() > rule.min_kept_line)
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        (!text.is_empty()).then_some(text)
    }
}

fn find_anchor(lines: &[&str], anchors: &[&str]) -> Option<usize> {
    lines.iter().position(|line| matches_any(line, anchors))
}
