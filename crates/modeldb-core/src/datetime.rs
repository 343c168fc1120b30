//! Calendar values in the process-local timezone.
//!
//! Entities stamp `created` / `updated` columns with [`LocalDateTime::now`] and
//! render dates for display with the German formats.

use std::fmt;

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Timelike};

/// Fixed format strings understood by [`LocalDateTime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// `Y-m-d`
    DateSql,
    /// `Y-m-d H:i:s`
    DateTimeSql,
    /// `d.m.Y`
    DateGerman,
    /// `d.m.Y H:i:s`
    DateTimeGerman,
    /// `H:i`
    TimeGerman,
}

impl DateFormat {
    pub const fn pattern(self) -> &'static str {
        match self {
            DateFormat::DateSql => "%Y-%m-%d",
            DateFormat::DateTimeSql => "%Y-%m-%d %H:%M:%S",
            DateFormat::DateGerman => "%d.%m.%Y",
            DateFormat::DateTimeGerman => "%d.%m.%Y %H:%M:%S",
            DateFormat::TimeGerman => "%H:%M",
        }
    }

    const fn has_date(self) -> bool {
        !matches!(self, DateFormat::TimeGerman)
    }

    const fn has_time(self) -> bool {
        matches!(
            self,
            DateFormat::DateTimeSql | DateFormat::DateTimeGerman | DateFormat::TimeGerman
        )
    }
}

/// A timezone-aware instant in the local timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalDateTime(DateTime<Local>);

impl LocalDateTime {
    pub fn now() -> Self {
        Self(Local::now())
    }

    /// Interpret a wall-clock value in the local timezone.
    ///
    /// Ambiguous times resolve to the earlier instant; times skipped by a DST
    /// change yield `None`.
    pub fn from_naive(naive: NaiveDateTime) -> Option<Self> {
        Local.from_local_datetime(&naive).earliest().map(Self)
    }

    /// Parse `text` with one of the fixed formats. Date-only formats start at
    /// midnight.
    pub fn parse(text: &str, format: DateFormat) -> Option<Self> {
        let text = text.trim();
        let naive = match (format.has_date(), format.has_time()) {
            (true, true) => NaiveDateTime::parse_from_str(text, format.pattern()).ok()?,
            (true, false) => NaiveDate::parse_from_str(text, format.pattern())
                .ok()?
                .and_hms_opt(0, 0, 0)?,
            (false, _) => {
                let time = chrono::NaiveTime::parse_from_str(text, format.pattern()).ok()?;
                Local::now().date_naive().and_time(time)
            }
        };
        Self::from_naive(naive)
    }

    pub fn format(&self, format: DateFormat) -> String {
        self.0.format(format.pattern()).to_string()
    }

    pub fn naive(&self) -> NaiveDateTime {
        self.0.naive_local()
    }

    pub fn date(&self) -> NaiveDate {
        self.0.date_naive()
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    pub fn second(&self) -> u32 {
        self.0.second()
    }

    /// ISO 8601 week number.
    pub fn week(&self) -> u32 {
        self.0.iso_week().week()
    }

    pub fn add(&self, delta: TimeDelta) -> Option<Self> {
        self.0.checked_add_signed(delta).map(Self)
    }

    pub fn sub(&self, delta: TimeDelta) -> Option<Self> {
        self.0.checked_sub_signed(delta).map(Self)
    }

    /// Signed distance `self - other`.
    pub fn since(&self, other: &Self) -> TimeDelta {
        self.0.signed_duration_since(other.0)
    }
}

impl fmt::Display for LocalDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(DateFormat::DateTimeSql))
    }
}

impl From<LocalDateTime> for crate::Value {
    fn from(v: LocalDateTime) -> Self {
        crate::Value::DateTime(v.naive())
    }
}
