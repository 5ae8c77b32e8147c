use std::fmt;

use chrono::{
    DateTime, Datelike, Days, FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime, Utc,
};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Format of the date fields on the report screen.
pub const DATE_INPUT_FORMAT: &str = "%Y-%m-%d";

/// Duration selector on the report screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReportPeriod {
    /// The current civil day.
    #[default]
    Today,
    /// The civil day before today.
    Yesterday,
    /// Monday through Sunday of the current week.
    ThisWeek,
    /// Monday through Sunday of the previous week.
    LastWeek,
    /// First through last day of the current month.
    ThisMonth,
    /// First through last day of the previous month.
    LastMonth,
    /// Whatever the operator typed into the date fields.
    Custom,
}

impl ReportPeriod {
    /// Selector values in menu order.
    pub const ALL: [ReportPeriod; 7] = [
        ReportPeriod::Today,
        ReportPeriod::Yesterday,
        ReportPeriod::ThisWeek,
        ReportPeriod::LastWeek,
        ReportPeriod::ThisMonth,
        ReportPeriod::LastMonth,
        ReportPeriod::Custom,
    ];

    /// Label shown in the selector.
    pub fn label(self) -> &'static str {
        match self {
            ReportPeriod::Today => "Today",
            ReportPeriod::Yesterday => "Yesterday",
            ReportPeriod::ThisWeek => "This Week",
            ReportPeriod::LastWeek => "Last Week",
            ReportPeriod::ThisMonth => "This Month",
            ReportPeriod::LastMonth => "Last Month",
            ReportPeriod::Custom => "Custom",
        }
    }

    /// Following selector value, wrapping around.
    pub fn next(self) -> Self {
        let index = Self::ALL.iter().position(|p| *p == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }

    /// Preceding selector value, wrapping around.
    pub fn previous(self) -> Self {
        let index = Self::ALL.iter().position(|p| *p == self).unwrap_or(0);
        Self::ALL[(index + Self::ALL.len() - 1) % Self::ALL.len()]
    }

    /// Inclusive range for this selector relative to `today`.
    ///
    /// `Custom` has no derived range. The calendar-bound variants return
    /// `None` only at the edges of chrono's representable dates.
    pub fn range(self, today: NaiveDate) -> Option<DateRange> {
        match self {
            ReportPeriod::Today => Some(DateRange::single(today)),
            ReportPeriod::Yesterday => yesterday(today),
            ReportPeriod::ThisWeek => this_week(today),
            ReportPeriod::LastWeek => last_week(today),
            ReportPeriod::ThisMonth => this_month(today),
            ReportPeriod::LastMonth => last_month(today),
            ReportPeriod::Custom => None,
        }
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn yesterday(today: NaiveDate) -> Option<DateRange> {
    today.pred_opt().map(DateRange::single)
}

fn week_of(day: NaiveDate) -> Option<DateRange> {
    let monday =
        day.checked_sub_days(Days::new(u64::from(day.weekday().num_days_from_monday())))?;
    let sunday = monday.checked_add_days(Days::new(6))?;
    Some(DateRange {
        from: monday,
        to: sunday,
    })
}

fn this_week(today: NaiveDate) -> Option<DateRange> {
    week_of(today)
}

fn last_week(today: NaiveDate) -> Option<DateRange> {
    week_of(today.checked_sub_days(Days::new(7))?)
}

fn month_of(day: NaiveDate) -> Option<DateRange> {
    let first = day.with_day(1)?;
    let last = first.checked_add_months(Months::new(1))?.pred_opt()?;
    Some(DateRange { from: first, to: last })
}

fn this_month(today: NaiveDate) -> Option<DateRange> {
    month_of(today)
}

fn last_month(today: NaiveDate) -> Option<DateRange> {
    month_of(today.with_day(1)?.pred_opt()?)
}

/// Today's date in the shop's civil calendar.
pub fn shop_today(offset: FixedOffset) -> NaiveDate {
    shop_today_at(Utc::now(), offset)
}

/// The shop's civil date at instant `now`.
pub fn shop_today_at(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Inclusive `[from, to]` span of civil dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First day, from midnight.
    pub from: NaiveDate,
    /// Last day, through 23:59:59.999.
    pub to: NaiveDate,
}

impl DateRange {
    /// Build a range, rejecting `from` after `to`.
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, ValidationError> {
        if from > to {
            return Err(ValidationError::InvertedRange { from, to });
        }
        Ok(Self { from, to })
    }

    /// A range covering exactly one day.
    pub fn single(day: NaiveDate) -> Self {
        Self { from: day, to: day }
    }

    /// Whether `at` falls on or after `from` 00:00 and on or before `to` 23:59:59.999.
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        if at < self.from.and_time(NaiveTime::MIN) {
            return false;
        }
        match self.to.and_hms_milli_opt(23, 59, 59, 999) {
            Some(end) => at <= end,
            None => at.date() <= self.to,
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            self.from.format(DATE_INPUT_FORMAT),
            self.to.format(DATE_INPUT_FORMAT)
        )
    }
}

/// Parse a `YYYY-MM-DD` date field.
pub fn parse_date_input(field: &'static str, input: &str) -> Result<NaiveDate, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    NaiveDate::parse_from_str(trimmed, DATE_INPUT_FORMAT).map_err(|_| {
        ValidationError::InvalidDate {
            field,
            input: input.to_string(),
        }
    })
}
