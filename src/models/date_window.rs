use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

use super::Resource;

/// Inclusive, day-granular modification date window.
///
/// Either bound may be absent. The same predicate is applied while crawling
/// and again when a saved manifest is replayed, so a manifest captured without
/// a window (or with another one) is narrowed correctly.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateWindow {
    since: Option<NaiveDate>,
    until: Option<NaiveDate>,
}

impl DateWindow {
    pub fn new(since: Option<NaiveDate>, until: Option<NaiveDate>) -> Result<Self, ConfigError> {
        if let (Some(since), Some(until)) = (since, until) {
            if since > until {
                return Err(ConfigError::InvertedWindow { since, until });
            }
        }
        Ok(Self { since, until })
    }

    /// Window admitting every date
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Parses optional `YYYY-MM-DD` bounds
    pub fn parse(since: Option<&str>, until: Option<&str>) -> Result<Self, ConfigError> {
        let since = since.map(parse_day).transpose()?;
        let until = until.map(parse_day).transpose()?;
        Self::new(since, until)
    }

    pub fn since(&self) -> Option<NaiveDate> {
        self.since
    }

    pub fn until(&self) -> Option<NaiveDate> {
        self.until
    }

    pub fn is_unbounded(&self) -> bool {
        self.since.is_none() && self.until.is_none()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        if matches!(self.since, Some(since) if date < since) {
            return false;
        }
        if matches!(self.until, Some(until) if date > until) {
            return false;
        }
        true
    }

    /// Collections are never excluded, only files are subject to the window
    pub fn admits(&self, resource: &Resource) -> bool {
        resource.is_collection() || self.contains(resource.modified)
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bound = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "*".to_string());
        write!(f, "[{} .. {}]", bound(self.since), bound(self.until))
    }
}

fn parse_day(value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ConfigError::InvalidDate(value.to_string()))
}
