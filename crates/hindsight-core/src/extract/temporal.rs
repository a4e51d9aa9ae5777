//! Natural-language time-range extraction.
//!
//! Pure and deterministic given a reference `now`: the same query against
//! the same instant always yields the same range. Ranges carry day-boundary
//! semantics (start-of-day to end-of-day) in the timezone of `now`.
//! Non-temporal queries yield `None`.

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Weekday};
use regex::Regex;
use serde::{Deserialize, Serialize};

const HOUR_MS: i64 = 3_600_000;

/// An inclusive time window in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TimeRange {
    /// Window start (inclusive)
    #[serde(default)]
    pub from: Option<i64>,
    /// Window end (inclusive)
    #[serde(default)]
    pub to: Option<i64>,
}

impl TimeRange {
    /// Closed bounds, with open ends widened to the representable extremes
    pub fn bounds(&self) -> (i64, i64) {
        (self.from.unwrap_or(i64::MIN), self.to.unwrap_or(i64::MAX))
    }

    /// Whether an instant falls inside the window
    pub fn contains(&self, instant: i64) -> bool {
        let (from, to) = self.bounds();
        instant >= from && instant <= to
    }

    /// Whether either bound is set
    pub fn is_bounded(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }
}

// ============================================================================
// EXTRACTION
// ============================================================================

/// Extract a time range from a natural-language query.
///
/// Recognised phrases, most specific first: named month + year, "last
/// weekend", "last night", "this morning", "last N days|weeks|months",
/// "a couple of days|weeks ago", "a few days ago", "last <weekday>",
/// last/this/next week, last/next month, last year, yesterday, today,
/// tomorrow.
pub fn extract_time_range<Tz: TimeZone>(query: &str, now: &DateTime<Tz>) -> Option<TimeRange> {
    let q = query.to_lowercase();
    let tz = now.timezone();
    let today = now.date_naive();

    if let Some(caps) = month_year_re().captures(&q) {
        let month = month_number(caps.get(1)?.as_str())?;
        let year: i32 = caps.get(2)?.as_str().parse().ok()?;
        return month_range(&tz, year, month);
    }

    if word_re("last weekend").is_match(&q) {
        let mut diff = today.weekday().num_days_from_monday() as i64 - 5;
        if diff <= 0 {
            diff += 7;
        }
        let mut saturday = today - Duration::days(diff);
        if today.weekday() == Weekday::Sun {
            saturday -= Duration::days(7);
        }
        return Some(day_span(&tz, saturday, saturday + Duration::days(1)));
    }

    if word_re("last night").is_match(&q) {
        let midnight = day_start_ms(&tz, today);
        return Some(TimeRange {
            from: Some(midnight - 6 * HOUR_MS),
            to: Some(midnight + 6 * HOUR_MS - 1),
        });
    }

    if word_re("this morning").is_match(&q) {
        let midnight = day_start_ms(&tz, today);
        return Some(TimeRange {
            from: Some(midnight),
            to: Some(midnight + 12 * HOUR_MS - 1),
        });
    }

    if let Some(caps) = last_n_re().captures(&q) {
        let n: i64 = caps.get(1)?.as_str().parse().ok()?;
        let from_date = match caps.get(2)?.as_str() {
            "day" => today - Duration::days(n),
            "week" => today - Duration::days(n * 7),
            _ => shift_months(today, -n)?,
        };
        return Some(day_span(&tz, from_date, today));
    }

    if let Some(caps) = couple_re().captures(&q) {
        // "a couple of" is fuzzy: a one-unit slack window around two units ago
        let (lo, hi) = match caps.get(1)?.as_str() {
            "day" => (3, 1),
            _ => (21, 7),
        };
        return Some(day_span(
            &tz,
            today - Duration::days(lo),
            today - Duration::days(hi),
        ));
    }

    if word_re("a few days ago").is_match(&q) {
        return Some(day_span(
            &tz,
            today - Duration::days(5),
            today - Duration::days(2),
        ));
    }

    if let Some(caps) = last_weekday_re().captures(&q) {
        let target = weekday_from_name(caps.get(1)?.as_str())?;
        let mut diff =
            today.weekday().num_days_from_monday() as i64 - target.num_days_from_monday() as i64;
        if diff <= 0 {
            diff += 7;
        }
        let date = today - Duration::days(diff);
        return Some(day_span(&tz, date, date));
    }

    let this_monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    if word_re("last week").is_match(&q) {
        return Some(day_span(
            &tz,
            this_monday - Duration::days(7),
            this_monday - Duration::days(1),
        ));
    }
    if word_re("this week").is_match(&q) {
        return Some(day_span(&tz, this_monday, this_monday + Duration::days(6)));
    }
    if word_re("next week").is_match(&q) {
        return Some(day_span(
            &tz,
            this_monday + Duration::days(7),
            this_monday + Duration::days(13),
        ));
    }

    if word_re("last month").is_match(&q) {
        let prev = shift_months(today.with_day(1)?, -1)?;
        return month_range(&tz, prev.year(), prev.month());
    }
    if word_re("next month").is_match(&q) {
        let next = shift_months(today.with_day(1)?, 1)?;
        return month_range(&tz, next.year(), next.month());
    }

    if word_re("last year").is_match(&q) {
        let year = today.year() - 1;
        let from = NaiveDate::from_ymd_opt(year, 1, 1)?;
        let to = NaiveDate::from_ymd_opt(year, 12, 31)?;
        return Some(day_span(&tz, from, to));
    }

    if word_re("yesterday").is_match(&q) {
        let date = today - Duration::days(1);
        return Some(day_span(&tz, date, date));
    }
    if word_re("tomorrow").is_match(&q) {
        let date = today + Duration::days(1);
        return Some(day_span(&tz, date, date));
    }
    if word_re("today").is_match(&q) {
        return Some(day_span(&tz, today, today));
    }

    None
}

// ============================================================================
// HELPERS
// ============================================================================

fn day_start_ms<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> i64 {
    let naive = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt.timestamp_millis(),
        chrono::LocalResult::Ambiguous(dt, _) => dt.timestamp_millis(),
        chrono::LocalResult::None => tz.from_utc_datetime(&naive).timestamp_millis(),
    }
}

fn day_span<Tz: TimeZone>(tz: &Tz, from: NaiveDate, to: NaiveDate) -> TimeRange {
    TimeRange {
        from: Some(day_start_ms(tz, from)),
        to: Some(day_start_ms(tz, to + Duration::days(1)) - 1),
    }
}

fn month_range<Tz: TimeZone>(tz: &Tz, year: i32, month: u32) -> Option<TimeRange> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_first = shift_months(first, 1)?;
    Some(day_span(tz, first, next_first - Duration::days(1)))
}

fn shift_months(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    let total = date.year() as i64 * 12 + date.month0() as i64 + months;
    let year = total.div_euclid(12) as i32;
    let month = total.rem_euclid(12) as u32 + 1;
    let day = date.day();
    // Clamp day into the target month (Jan 31 - 1 month = Dec 31, Mar 31 - 1 = Feb 28/29)
    (1..=day)
        .rev()
        .find_map(|d| NaiveDate::from_ymd_opt(year, month, d))
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sep" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    let weekday = match name {
        "monday" => Weekday::Mon,
        "tuesday" => Weekday::Tue,
        "wednesday" => Weekday::Wed,
        "thursday" => Weekday::Thu,
        "friday" => Weekday::Fri,
        "saturday" => Weekday::Sat,
        "sunday" => Weekday::Sun,
        _ => return None,
    };
    Some(weekday)
}

fn month_year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(?:in\s+)?(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sep|oct|nov|dec)\s+(\d{4})\b",
        )
        .expect("static regex")
    })
}

fn last_n_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\blast\s+(\d+)\s+(day|week|month)s?\b").expect("static regex")
    })
}

fn couple_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\ba\s+couple\s+of\s+(day|week)s?\s+ago\b").expect("static regex")
    })
}

fn last_weekday_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\blast\s+(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b")
            .expect("static regex")
    })
}

fn word_re(phrase: &'static str) -> Regex {
    // Whole-word phrase match; phrases are static and short so compiling on
    // demand keeps the table of OnceLocks from sprawling
    Regex::new(&format!(r"\b{}\b", regex::escape(phrase))).expect("static regex")
}

// ============================================================================
// TESTS
// ============================================================================
