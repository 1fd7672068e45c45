//! Birthday occurrence calculation
//!
//! Maps a birthdate, an IANA timezone and a reference instant to the next
//! 09:00 local delivery instant. Everything here is pure; the current time
//! is always passed in.
//!
//! Calendar policy:
//! - A Feb 29 birthdate occurs on Feb 28 in non-leap years. Job keys and
//!   ledger days are both derived from [`Occurrence::date`], so they follow
//!   the same rule.
//! - A local 09:00 that happens twice (clocks going back) resolves to the
//!   later instant.
//! - A local 09:00 that never happens (clocks going forward) is read with the
//!   offset in force before the transition, which moves it forward by the
//!   length of the gap.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// Local hour at which birthday messages go out
pub const DELIVERY_HOUR: u32 = 9;

/// One concrete birthday occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Occurrence {
    /// Absolute delivery instant
    pub instant: DateTime<Utc>,
    /// Local calendar day the occurrence falls on
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OccurrenceError {
    /// The target year is outside the supported calendar range
    #[error("No occurrence of birthdate {birthdate} can be represented in year {year}")]
    OutOfRange { birthdate: NaiveDate, year: i32 },
}

/// Calendar day of `now` in `tz`
pub fn local_day(tz: Tz, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// The birthdate's month and day in `year`, with Feb 29 falling back to Feb 28
pub fn birthday_in_year(birthdate: NaiveDate, year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, birthdate.month(), birthdate.day()).or_else(|| {
        if birthdate.month() == 2 && birthdate.day() == 29 {
            NaiveDate::from_ymd_opt(year, 2, 28)
        } else {
            None
        }
    })
}

/// The occurrence of `birthdate` in local `year`
pub fn occurrence_in_year(
    birthdate: NaiveDate,
    tz: Tz,
    year: i32,
) -> Result<Occurrence, OccurrenceError> {
    let out_of_range = || OccurrenceError::OutOfRange { birthdate, year };

    let date = birthday_in_year(birthdate, year).ok_or_else(out_of_range)?;
    let local = date.and_hms_opt(DELIVERY_HOUR, 0, 0).ok_or_else(out_of_range)?;
    let instant = resolve_local(tz, local).ok_or_else(out_of_range)?;

    Ok(Occurrence { instant, date })
}

/// The first occurrence strictly after `now`
pub fn next_occurrence(
    birthdate: NaiveDate,
    tz: Tz,
    now: DateTime<Utc>,
) -> Result<Occurrence, OccurrenceError> {
    let year = local_day(tz, now).year();

    let candidate = occurrence_in_year(birthdate, tz, year)?;
    if candidate.instant > now {
        return Ok(candidate);
    }

    let next_year = year.checked_add(1).ok_or(OccurrenceError::OutOfRange { birthdate, year })?;
    occurrence_in_year(birthdate, tz, next_year)
}

/// Resolve a local wall-clock time in `tz` to a single instant
pub fn resolve_local(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, latest) => {
            Some(earliest.max(latest).with_timezone(&Utc))
        }
        LocalResult::None => {
            // Offset in force a day earlier is the one before the gap
            let before = local.checked_sub_signed(Duration::days(1))?;
            let offset = tz.offset_from_utc_datetime(&before).fix();
            let utc = local.checked_sub_signed(Duration::seconds(i64::from(
                offset.local_minus_utc(),
            )))?;
            Some(Utc.from_utc_datetime(&utc))
        }
    }
}
