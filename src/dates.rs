//! Calendar helpers: dekads, month arithmetic and date parsing.

use std::fmt;

use chrono::{Datelike, Days, Months, NaiveDate};

use crate::error::{Error, Result};

pub const DEKADS_PER_YEAR: u32 = 36;

/// A ten-day period: days 1-10, 11-20 and 21 to month end of each month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dekad {
    year: i32,
    dekad: u32,
}

impl Dekad {
    pub fn new(year: i32, dekad: u32) -> Result<Self> {
        if !(1..=DEKADS_PER_YEAR).contains(&dekad) {
            return Err(Error::InvalidDate(format!(
                "Dekad must be between 1 and {DEKADS_PER_YEAR}, got {dekad}"
            )));
        }
        Ok(Dekad { year, dekad })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        let within_month = match date.day() {
            1..=10 => 1,
            11..=20 => 2,
            _ => 3,
        };
        Dekad {
            year: date.year(),
            dekad: (date.month0()) * 3 + within_month,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn dekad(&self) -> u32 {
        self.dekad
    }

    /// First day of the dekad.
    pub fn start_date(&self) -> NaiveDate {
        let month = (self.dekad - 1) / 3 + 1;
        let day = 10 * ((self.dekad - 1) % 3) + 1;
        // month and day are always valid for 1..=36
        NaiveDate::from_ymd_opt(self.year, month, day).unwrap_or_default()
    }

    /// Last day of the dekad.
    pub fn end_date(&self) -> NaiveDate {
        self.succ().start_date() - Days::new(1)
    }

    pub fn succ(&self) -> Self {
        if self.dekad == DEKADS_PER_YEAR {
            Dekad {
                year: self.year + 1,
                dekad: 1,
            }
        } else {
            Dekad {
                year: self.year,
                dekad: self.dekad + 1,
            }
        }
    }

    /// Every dekad from `start` to `end`, both included.
    pub fn range(start: Dekad, end: Dekad) -> Vec<Dekad> {
        let mut dekads = Vec::new();
        let mut current = start;
        while current <= end {
            dekads.push(current);
            current = current.succ();
        }
        dekads
    }
}

impl fmt::Display for Dekad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.dekad)
    }
}

/// Parses an ISO 8601 `YYYY-MM-DD` date.
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d").map_err(|_| {
        Error::InvalidDate(format!(
            "`{input}`: dates passed as a string must follow ISO8601 format YYYY-MM-DD"
        ))
    })
}

/// Optional bounds of a date range. A missing bound means "as far as the
/// product goes".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        DateRange { start, end }
    }
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn last_of_month(date: NaiveDate) -> NaiveDate {
    first_of_month(date) + Months::new(1) - Days::new(1)
}

/// Every day from `start` to `end`, both included.
pub fn days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|day| *day <= end).collect()
}

/// First day of every month touched by `start..=end`.
pub fn months(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut months = Vec::new();
    let mut current = first_of_month(start);
    while current <= end {
        months.push(current);
        current = current + Months::new(1);
    }
    months
}

/// Every year touched by `start..=end`.
pub fn years(start: NaiveDate, end: NaiveDate) -> Vec<i32> {
    (start.year()..=end.year()).collect()
}

/// Adds a (possibly fractional) number of days to the Unix epoch, as used by
/// CF `days since 1970-01-01` time units.
pub fn from_days_since(origin: NaiveDate, days: f64) -> Option<NaiveDate> {
    origin.checked_add_signed(chrono::Duration::days(days.floor() as i64))
}

/// Months since an origin, snapped to the first of the month. Sources using a
/// 360-day calendar express monthly steps as half months (e.g. 477.5) which
/// would otherwise land mid-month.
pub fn from_months_since(origin: NaiveDate, months: f64) -> Option<NaiveDate> {
    let whole = months.floor();
    let shifted = if whole >= 0.0 {
        first_of_month(origin).checked_add_months(Months::new(whole as u32))?
    } else {
        first_of_month(origin).checked_sub_months(Months::new((-whole) as u32))?
    };
    Some(shifted)
}

/// Julian day number to calendar date. 2440587.5 is 1970-01-01T00:00.
pub fn from_julian_day(julian_day: f64) -> Option<NaiveDate> {
    const UNIX_EPOCH_JD: f64 = 2_440_587.5;
    let origin = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    from_days_since(origin, julian_day - UNIX_EPOCH_JD)
}

/// Days since 1970-01-01, the Arrow `Date32` representation.
pub fn to_date32(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - 719_163
}

pub fn from_date32(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + 719_163)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn should_convert_dekads_to_dates() {
        let dekad = Dekad::new(2020, 1).unwrap();
        assert_eq!(dekad.start_date(), date(2020, 1, 1));
        assert_eq!(dekad.end_date(), date(2020, 1, 10));

        let dekad = Dekad::new(2020, 6).unwrap();
        assert_eq!(dekad.start_date(), date(2020, 2, 21));
        assert_eq!(dekad.end_date(), date(2020, 2, 29));

        let dekad = Dekad::new(2021, 36).unwrap();
        assert_eq!(dekad.end_date(), date(2021, 12, 31));
    }

    #[test]
    fn should_convert_dates_to_dekads() {
        assert_eq!(Dekad::from_date(date(2020, 1, 10)), Dekad::new(2020, 1).unwrap());
        assert_eq!(Dekad::from_date(date(2020, 1, 11)), Dekad::new(2020, 2).unwrap());
        assert_eq!(Dekad::from_date(date(2020, 3, 31)), Dekad::new(2020, 9).unwrap());
        assert_eq!(Dekad::from_date(date(2020, 12, 21)), Dekad::new(2020, 36).unwrap());
    }

    #[test]
    fn should_reject_invalid_dekad() {
        assert!(Dekad::new(2020, 0).is_err());
        assert!(Dekad::new(2020, 37).is_err());
    }

    #[test]
    fn should_range_over_year_boundary() {
        let range = Dekad::range(Dekad::new(2020, 35).unwrap(), Dekad::new(2021, 2).unwrap());

        assert_eq!(range.len(), 4);
        assert_eq!(range[2], Dekad::new(2021, 1).unwrap());
    }

    #[test]
    fn should_list_months_in_range() {
        let months = months(date(2020, 11, 15), date(2021, 2, 1));

        assert_eq!(
            months,
            vec![date(2020, 11, 1), date(2020, 12, 1), date(2021, 1, 1), date(2021, 2, 1)]
        );
        assert_eq!(last_of_month(date(2021, 2, 3)), date(2021, 2, 28));
    }

    #[test]
    fn should_decode_cf_offsets() {
        let origin = date(1960, 1, 1);
        assert_eq!(from_months_since(origin, 745.0), Some(date(2022, 2, 1)));
        assert_eq!(from_months_since(origin, 745.5), Some(date(2022, 2, 1)));
        assert_eq!(from_julian_day(2_440_588.5), Some(date(1970, 1, 2)));
    }

    #[test]
    fn should_convert_date32() {
        assert_eq!(to_date32(date(1970, 1, 1)), 0);
        assert_eq!(from_date32(to_date32(date(2022, 3, 4))), Some(date(2022, 3, 4)));
    }

    #[test]
    fn should_reject_non_iso_dates() {
        assert!(parse_date("2020-01-05").is_ok());
        assert!(matches!(parse_date("05/01/2020"), Err(Error::InvalidDate(_))));
    }
}
