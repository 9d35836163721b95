//! The mailing list as it lives in the spreadsheet: one subscriber per row, columns (email, timestamp, ip).
//! Rate limit windows and the duplicate check are derived from the rows on every request.

mod rate_limit;

pub use rate_limit::{RateLimitExceeded, RateLimits, Subject, Window, WindowCounts};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Columns read from and written to the sheet.
pub const COLUMNS: &str = "A:C";

/// A row read back from the sheet. Missing cells are empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberRow {
    pub email: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub ip: String,
}

impl SubscriberRow {
    pub fn from_cells(cells: Vec<String>) -> Self {
        let mut cells = cells.into_iter();
        let email = cells.next().unwrap_or_default();
        let timestamp = cells.next().as_deref().and_then(parse_timestamp);
        let ip = cells.next().unwrap_or_default();

        SubscriberRow {
            email,
            timestamp,
            ip,
        }
    }

    fn email_matches(&self, normalized_email: &str) -> bool {
        normalize(&self.email) == normalized_email
    }

    fn ip_matches(&self, normalized_ip: &str) -> bool {
        normalize(&self.ip) == normalized_ip
    }
}

/// All subscriber rows of the sheet, header row excluded.
#[derive(Debug, Clone, Default)]
pub struct SubscriberRows(Vec<SubscriberRow>);

impl SubscriberRows {
    /// Parses the raw values of the sheet. The first row is the header and gets skipped.
    pub fn from_values(values: Vec<Vec<String>>) -> Self {
        let rows = values
            .into_iter()
            .skip(1)
            .map(SubscriberRow::from_cells)
            .collect();
        SubscriberRows(rows)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubscriberRow> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Case-insensitive, whitespace-trimmed lookup.
    pub fn contains_email(&self, email: &str) -> bool {
        let email = normalize(email);
        self.iter().any(|row| row.email_matches(&email))
    }

    /// Number of rows with a matching ip whose timestamp falls within `window` of `now`.
    pub fn count_ip_within(&self, ip: &str, window: Window, now: DateTime<Utc>) -> usize {
        let ip = normalize(ip);
        self.count_within(window, now, |row| row.ip_matches(&ip))
    }

    /// Number of rows with a matching email whose timestamp falls within `window` of `now`.
    pub fn count_email_within(&self, email: &str, window: Window, now: DateTime<Utc>) -> usize {
        let email = normalize(email);
        self.count_within(window, now, |row| row.email_matches(&email))
    }

    fn count_within<F>(&self, window: Window, now: DateTime<Utc>, matches: F) -> usize
    where
        F: Fn(&SubscriberRow) -> bool,
    {
        let since = now - window.duration();
        self.iter()
            .filter(|row| row.timestamp.is_some_and(|ts| ts >= since))
            .filter(|row| matches(row))
            .count()
    }
}

/// A row about to be appended to the sheet.
#[derive(Debug, Clone)]
pub struct NewSubscriberRow {
    pub email: String,
    pub timestamp: DateTime<Utc>,
    pub ip: String,
}

impl NewSubscriberRow {
    pub fn into_cells(self) -> Vec<String> {
        vec![self.email, format_timestamp(self.timestamp), self.ip]
    }
}

pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// `2025-01-01T12:00:00.000Z`
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Accepts RFC 3339 and the `YYYY-MM-DD HH:MM:SS` form the sheet may render user entered dates in.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }

    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}
