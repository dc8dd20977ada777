use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, Weekday};

pub mod fields;

/// Raw document body as stored remotely.
pub type Fields = Map<String, Value>;

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

pub const DEFAULT_STYLE_ID: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(String);

impl PlanId {
    pub fn new<S: Into<String>>(raw: S) -> Self {
        Self(raw.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlanId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for PlanId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Calendar day, serialized as `YYYY-MM-DD`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, SerializeDisplay, DeserializeFromStr,
)]
pub struct PlanDate(Date);

impl PlanDate {
    pub fn new(date: Date) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u8, day: u8) -> Option<Self> {
        let month = time::Month::try_from(month).ok()?;
        Date::from_calendar_date(year, month, day).ok().map(Self)
    }

    pub fn today() -> Self {
        Self(OffsetDateTime::now_utc().date())
    }

    pub fn date(&self) -> Date {
        self.0
    }

    pub fn weekday(&self) -> Weekday {
        self.0.weekday()
    }

    /// Saturates at the calendar bounds supported by `time`.
    pub fn add_days(&self, days: i64) -> Self {
        self.0
            .checked_add(Duration::days(days))
            .map(Self)
            .unwrap_or(*self)
    }

    pub fn days_until(&self, other: PlanDate) -> i64 {
        (other.0 - self.0).whole_days()
    }
}

impl fmt::Display for PlanDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = self.0.format(DATE_FORMAT).map_err(|_| fmt::Error)?;
        f.write_str(&formatted)
    }
}

impl FromStr for PlanDate {
    type Err = time::error::Parse;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Date::parse(s.trim(), DATE_FORMAT).map(Self)
    }
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: PlanDate,
    pub end: PlanDate,
}

impl DateRange {
    pub fn new(start: PlanDate, end: PlanDate) -> Self {
        if end < start {
            Self {
                start: end,
                end: start,
            }
        } else {
            Self { start, end }
        }
    }

    pub fn single(date: PlanDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn contains(&self, date: PlanDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn contains_range(&self, other: &DateRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn len_days(&self) -> i64 {
        self.start.days_until(self.end) + 1
    }

    pub fn days(&self) -> impl Iterator<Item = PlanDate> {
        let start = self.start;
        (0..self.len_days()).map(move |offset| start.add_days(offset))
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRecord {
    pub id: PlanId,
    pub date: PlanDate,
    /// `None` marks the head of the date's sequence.
    pub prev_id: Option<PlanId>,
    pub content: Value,
    pub done: bool,
    pub style_id: String,
    /// Raw remote body at the time of the last snapshot, used to restore a deleted plan.
    #[serde(default)]
    pub snapshot: Fields,
}

impl PlanRecord {
    pub fn is_head(&self) -> bool {
        self.prev_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateLabel {
    pub label_id: PlanId,
    pub content: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateEntry {
    pub date: PlanDate,
    pub label: Option<DateLabel>,
    pub plans: Vec<PlanRecord>,
}

impl DateEntry {
    pub fn empty(date: PlanDate) -> Self {
        Self {
            date,
            label: None,
            plans: Vec::new(),
        }
    }

    pub fn plan_ids(&self) -> Vec<PlanId> {
        self.plans.iter().map(|plan| plan.id.clone()).collect()
    }

    pub fn position_of(&self, id: &PlanId) -> Option<usize> {
        self.plans.iter().position(|plan| &plan.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStyle {
    pub label: String,
    pub color: String,
    pub color_done: String,
}
