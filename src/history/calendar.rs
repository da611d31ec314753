//! Calendar conventions of the bucket tree
//!
//! Buckets are named by the decimal value of their calendar field:
//!
//! ```text
//! <root>/<year>/<month 1-12>/<day 1-31>/<entry>
//! ```
//!
//! Months are stored one-based. `stored_month` is the only place that
//! converts from the zero-based calendar month; the writer and the purger
//! both go through it.

use chrono::{Datelike, Days, NaiveDate};

/// Month as it appears in a bucket name
pub fn stored_month<D: Datelike>(date: &D) -> u32 {
    date.month0() + 1
}

/// Calendar granularity of a bucket level, coarsest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarField {
    Year,
    Month,
    Day,
}

impl CalendarField {
    /// Bucket levels below the root, in tree order
    pub const LEVELS: [CalendarField; 3] =
        [CalendarField::Year, CalendarField::Month, CalendarField::Day];

    /// The value a bucket for `date` carries at this level
    pub fn value<D: Datelike>(self, date: &D) -> i64 {
        match self {
            CalendarField::Year => date.year() as i64,
            CalendarField::Month => stored_month(date) as i64,
            CalendarField::Day => date.day() as i64,
        }
    }

    /// Next finer level, `None` below days
    pub fn finer(self) -> Option<CalendarField> {
        match self {
            CalendarField::Year => Some(CalendarField::Month),
            CalendarField::Month => Some(CalendarField::Day),
            CalendarField::Day => None,
        }
    }
}

impl std::fmt::Display for CalendarField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalendarField::Year => write!(f, "year"),
            CalendarField::Month => write!(f, "month"),
            CalendarField::Day => write!(f, "day"),
        }
    }
}

/// Year/month/day bucket of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketPath {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl BucketPath {
    pub fn from_date<D: Datelike>(date: &D) -> Self {
        Self {
            year: date.year(),
            month: stored_month(date),
            day: date.day(),
        }
    }

    /// Bucket names from coarse to fine
    pub fn segments(&self) -> [String; 3] {
        [
            self.year.to_string(),
            self.month.to_string(),
            self.day.to_string(),
        ]
    }
}

/// First day that is kept when retaining `days_to_keep` days before `today`
pub fn cutoff_date(today: NaiveDate, days_to_keep: u32) -> Option<NaiveDate> {
    today.checked_sub_days(Days::new(u64::from(days_to_keep)))
}

/// Numeric value of a bucket name; `None` for anything that is not all digits
pub fn bucket_value(name: &str) -> Option<i64> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}
