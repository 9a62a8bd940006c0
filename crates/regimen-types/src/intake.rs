use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The four dosing windows the log service understands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Timeslot {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl fmt::Display for Timeslot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeslot::Morning => "morning",
            Timeslot::Afternoon => "afternoon",
            Timeslot::Evening => "evening",
            Timeslot::Night => "night",
        };
        f.write_str(s)
    }
}

impl FromStr for Timeslot {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "morning" => Ok(Timeslot::Morning),
            "afternoon" => Ok(Timeslot::Afternoon),
            "evening" => Ok(Timeslot::Evening),
            "night" => Ok(Timeslot::Night),
            other => Err(KeyParseError::Timeslot(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum KeyParseError {
    #[error("malformed intake key: {0}")]
    Malformed(String),
    #[error("invalid date in intake key: {0}")]
    Date(String),
    #[error("unknown timeslot: {0}")]
    Timeslot(String),
}

/// Identity of a single "taken/not taken" fact.
///
/// Serialized as `YYYY-MM-DD|item|timeslot` when used as an overlay map key;
/// the remote log service is the source of truth for the value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IntakeKey {
    pub date: NaiveDate,
    pub item_id: String,
    pub timeslot: Timeslot,
}

impl IntakeKey {
    pub fn new(date: NaiveDate, item_id: impl Into<String>, timeslot: Timeslot) -> Self {
        Self {
            date,
            item_id: item_id.into(),
            timeslot,
        }
    }

    /// Flat string form used as the overlay/pending map key.
    pub fn storage_key(&self) -> String {
        format!("{}|{}|{}", self.date.format("%Y-%m-%d"), self.item_id, self.timeslot)
    }

    pub fn parse(raw: &str) -> Result<Self, KeyParseError> {
        let mut parts = raw.splitn(3, '|');
        let (Some(date), Some(item_id), Some(timeslot)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(KeyParseError::Malformed(raw.to_string()));
        };
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| KeyParseError::Date(date.to_string()))?;
        Ok(Self {
            date,
            item_id: item_id.to_string(),
            timeslot: timeslot.parse()?,
        })
    }
}

/// One fact inside a weekly snapshot as the log service reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeStatus {
    pub item_id: String,
    pub item_name: String,
    pub timeslot: Timeslot,
    pub taken: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaySnapshot {
    pub date: NaiveDate,
    #[serde(default)]
    pub items: Vec<IntakeStatus>,
}

/// Bulk read returned by the log service for one week.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WeekSnapshot {
    #[serde(rename = "weekData", default)]
    pub week_data: Vec<DaySnapshot>,
}

/// One entry inside a date-scoped batched write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub item_id: String,
    pub timeslot: Timeslot,
    pub taken: bool,
}

/// Batched write request. The log API is date-scoped, one call per date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogWriteRequest {
    pub date: NaiveDate,
    pub entries: Vec<LogEntry>,
}
