use crate::constants::YEAR_ROLLOVER_DAYS;
use crate::types::{CanonicalEvent, DataSource, DetailOutcome, DetailRecord, ListingRecord};
use chrono::{Datelike, NaiveDate, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static CLOCK_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d{1,2})[:.](\d{2})\s*([ap]m)?").expect("clock pattern compiles")
});

const WEEKDAYS: &[&str] = &[
    "mon", "monday", "tue", "tues", "tuesday", "wed", "wednesday", "thu", "thur", "thurs",
    "thursday", "fri", "friday", "sat", "saturday", "sun", "sunday",
];

/// Merges a bulk listing entry with (optionally) its detail record.
///
/// Detail values win when present, listing values fill the gaps. Lists are
/// never unioned: whichever side has a non-empty list supplies all of it.
pub struct RecordReconciler {
    today: NaiveDate,
    base_url: Option<String>,
}

impl Default for RecordReconciler {
    fn default() -> Self {
        Self::new(Utc::now().date_naive())
    }
}

impl RecordReconciler {
    /// `today` anchors year inference for dates rendered without a year.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn reconcile(&self, listing: &ListingRecord, outcome: DetailOutcome) -> CanonicalEvent {
        let (detail, data_source, error) = match outcome {
            DetailOutcome::Extracted(detail) => (detail, DataSource::DetailMerged, None),
            DetailOutcome::Skipped => (DetailRecord::default(), DataSource::BulkOnly, None),
            DetailOutcome::Failed(message) => {
                debug!(id = %listing.id, "Detail failed, building from listing only: {}", message);
                (DetailRecord::default(), DataSource::ErrorFallback, Some(message))
            }
        };

        let (detail_start, detail_end) = detail
            .time
            .as_deref()
            .map(split_time_range)
            .unwrap_or_default();

        let date = detail
            .date
            .as_deref()
            .and_then(|d| normalize_date(d, self.today))
            .or_else(|| {
                listing
                    .date
                    .as_deref()
                    .and_then(|d| normalize_date(d, self.today))
            });

        let title = detail
            .title
            .as_deref()
            .map(clean_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| clean_text(&listing.title));

        let artists = if detail.artists.is_empty() {
            listing.artists.clone()
        } else {
            detail.artists
        };

        let attendance = detail
            .interested
            .or_else(|| listing.attending.as_deref().and_then(parse_attendance));

        CanonicalEvent {
            id: listing.id.clone(),
            title,
            date,
            start_time: detail_start.or_else(|| listing.start_time.as_deref().and_then(clock_of)),
            end_time: detail_end.or_else(|| listing.end_time.as_deref().and_then(clock_of)),
            venue_name: detail.venue.or_else(|| listing.venue_name.clone()),
            venue_id: listing.venue_id.clone(),
            address: detail.address,
            promoter: detail.promoter,
            artists,
            genres: detail.genres,
            attendance,
            cost: detail.cost,
            min_age: detail.min_age,
            admin: detail.admin,
            description: detail.description,
            event_url: listing.content_url.as_deref().map(|u| self.absolute(u)),
            image_url: listing.image_url.clone(),
            is_ticketed: listing.is_ticketed,
            data_source,
            error,
            scraped_at: Utc::now(),
        }
    }

    fn absolute(&self, content_url: &str) -> String {
        match &self.base_url {
            Some(base) if content_url.starts_with('/') => {
                format!("{}{}", base.trim_end_matches('/'), content_url)
            }
            _ => content_url.to_string(),
        }
    }
}

fn clean_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Attendance as rendered by the site: "350", "1,204", "2K", "1.5K+".
pub fn parse_attendance(raw: &str) -> Option<u64> {
    let cleaned: String = raw
        .trim()
        .trim_end_matches('+')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if let Some(thousands) = cleaned.strip_suffix(['k', 'K']) {
        let value: f64 = thousands.parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        return Some((value * 1000.0).round() as u64);
    }
    cleaned.parse().ok()
}

/// Normalizes site date renderings to a calendar date.
///
/// Accepts ISO dates and datetimes, "31 Oct 2025", "Fri, 31st October 2025",
/// "Oct 31, 2025" and year-less "31 Oct". A year-less date takes the year of
/// `today` and rolls into the next year when that would put it more than
/// `YEAR_ROLLOVER_DAYS` in the past.
pub fn normalize_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Some(iso) = raw.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(iso, "%Y-%m-%d") {
            return Some(date);
        }
    }

    let tokens: Vec<String> = raw
        .split(|c: char| c.is_whitespace() || c == ',' || c == '.')
        .filter(|t| !t.is_empty())
        .filter(|t| !WEEKDAYS.contains(&t.to_lowercase().as_str()))
        .map(strip_ordinal)
        .collect();
    let joined = tokens.join(" ");

    for format in ["%d %b %Y", "%b %d %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(&joined, format) {
            return Some(date);
        }
    }

    if tokens.len() == 2 {
        let with_year = format!("{} {}", joined, today.year());
        for format in ["%d %b %Y", "%b %d %Y"] {
            if let Ok(date) = NaiveDate::parse_from_str(&with_year, format) {
                return Some(roll_forward(date, today));
            }
        }
    }
    None
}

fn roll_forward(date: NaiveDate, today: NaiveDate) -> NaiveDate {
    if (today - date).num_days() > YEAR_ROLLOVER_DAYS {
        date.with_year(date.year() + 1).unwrap_or(date)
    } else {
        date
    }
}

fn strip_ordinal(token: &str) -> String {
    let lower = token.to_lowercase();
    for suffix in ["st", "nd", "rd", "th"] {
        if let Some(day) = lower.strip_suffix(suffix) {
            if !day.is_empty() && day.chars().all(|c| c.is_ascii_digit()) {
                return day.to_string();
            }
        }
    }
    token.to_string()
}

/// Splits "22:00 - 02:00" (optionally weekday-qualified or 12-hour) into HH:MM parts.
pub fn split_time_range(raw: &str) -> (Option<String>, Option<String>) {
    let mut times = CLOCK_TIME.captures_iter(raw).filter_map(|caps| {
        let mut hour: u32 = caps.get(1)?.as_str().parse().ok()?;
        let minute: u32 = caps.get(2)?.as_str().parse().ok()?;
        if let Some(meridiem) = caps.get(3) {
            let pm = meridiem.as_str().eq_ignore_ascii_case("pm");
            hour = match (pm, hour) {
                (true, h) if h < 12 => h + 12,
                (false, 12) => 0,
                (_, h) => h,
            };
        }
        NaiveTime::from_hms_opt(hour, minute, 0).map(|t| t.format("%H:%M").to_string())
    });
    (times.next(), times.next())
}

/// Wall-clock part of a listing timestamp such as "2025-10-31T22:00:00.000".
fn clock_of(timestamp: &str) -> Option<String> {
    let time_part = timestamp.split_once('T').map(|(_, t)| t).unwrap_or(timestamp);
    let hhmm = time_part.get(..5)?;
    NaiveTime::parse_from_str(hhmm, "%H:%M")
        .ok()
        .map(|t| t.format("%H:%M").to_string())
}
