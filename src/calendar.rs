//! Which day's file to ingest.
//!
//! The publisher posts one workbook per business day. A run looks for the
//! file of the previous business day, as seen from a fixed UTC offset.
//! Weekends and Japanese national holidays are never business days;
//! configured extra closures are skipped as well.

use crate::error::{IngestError, Result};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc, Weekday};
use std::collections::{BTreeSet, HashSet};

/// File name published for `day`, e.g. `250724iyakuhinkyoukyu.xlsx`.
pub fn file_name(day: NaiveDate, suffix: &str) -> String {
    format!("{}{suffix}", day.format("%y%m%d"))
}

/// `extra` holds closures on top of the national holidays.
pub fn is_business_day(day: NaiveDate, extra: &HashSet<NaiveDate>) -> bool {
    !matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
        && !extra.contains(&day)
        && !is_national_holiday(day)
}

pub fn is_national_holiday(day: NaiveDate) -> bool {
    national_holidays(day.year()).contains(&day)
}

/// Japanese national holidays of `year`, substitute holidays and
/// in-between citizens' holidays included. Valid from 2000 to 2099.
pub fn national_holidays(year: i32) -> BTreeSet<NaiveDate> {
    let named = named_holidays(year);
    let mut all = named.clone();

    for &holiday in &named {
        if holiday.weekday() != Weekday::Sun {
            continue;
        }
        let mut sub = holiday + Duration::days(1);
        if year >= 2007 {
            while all.contains(&sub) {
                sub += Duration::days(1);
            }
        }
        if sub.year() == year && !all.contains(&sub) {
            all.insert(sub);
        }
    }

    // A weekday squeezed between two named holidays is a holiday too.
    for &holiday in &named {
        let between = holiday + Duration::days(1);
        if named.contains(&(between + Duration::days(1)))
            && !all.contains(&between)
            && between.weekday() != Weekday::Sun
        {
            all.insert(between);
        }
    }
    all
}

fn named_holidays(year: i32) -> BTreeSet<NaiveDate> {
    let mut days = BTreeSet::new();
    let mut add = |d: Option<NaiveDate>| {
        if let Some(d) = d {
            days.insert(d);
        }
    };
    let ymd = NaiveDate::from_ymd_opt;
    let nth_monday = |month: u32, n: u8| NaiveDate::from_weekday_of_month_opt(year, month, Weekday::Mon, n);

    add(ymd(year, 1, 1));
    add(nth_monday(1, 2));
    add(ymd(year, 2, 11));
    if year >= 2020 {
        add(ymd(year, 2, 23));
    }
    add(ymd(year, 3, equinox_day(year, 20.8431)));
    add(ymd(year, 4, 29));
    add(ymd(year, 5, 3));
    add(ymd(year, 5, 4));
    add(ymd(year, 5, 5));
    match year {
        2020 => {
            add(ymd(year, 7, 23));
            add(ymd(year, 7, 24));
            add(ymd(year, 8, 10));
        }
        2021 => {
            add(ymd(year, 7, 22));
            add(ymd(year, 7, 23));
            add(ymd(year, 8, 8));
        }
        _ => {
            if year >= 2003 {
                add(nth_monday(7, 3));
            } else {
                add(ymd(year, 7, 20));
            }
            if year >= 2016 {
                add(ymd(year, 8, 11));
            }
            add(nth_monday(10, 2));
        }
    }
    if year >= 2003 {
        add(nth_monday(9, 3));
    } else {
        add(ymd(year, 9, 15));
    }
    add(ymd(year, 9, equinox_day(year, 23.2488)));
    add(ymd(year, 11, 3));
    add(ymd(year, 11, 23));
    if year < 2019 {
        add(ymd(year, 12, 23));
    }
    if year == 2019 {
        add(ymd(year, 5, 1));
        add(ymd(year, 10, 22));
        add(ymd(year, 4, 30));
        add(ymd(year, 5, 2));
    }
    days
}

/// Day of the month of the vernal (`base` 20.8431) or autumnal
/// (`base` 23.2488) equinox.
fn equinox_day(year: i32, base: f64) -> u32 {
    let y = f64::from(year - 1980);
    (base + 0.242194 * y - (y / 4.0).floor()).floor() as u32
}

/// The last business day strictly before `today`.
pub fn previous_business_day(today: NaiveDate, holidays: &HashSet<NaiveDate>) -> NaiveDate {
    let mut day = today - Duration::days(1);
    while !is_business_day(day, holidays) {
        day -= Duration::days(1);
    }
    day
}

/// Calendar date of `now` at a fixed offset from UTC.
pub fn local_date(now: DateTime<Utc>, utc_offset_hours: i32) -> Result<NaiveDate> {
    let offset = FixedOffset::east_opt(utc_offset_hours * 3600).ok_or_else(|| {
        IngestError::Config(format!("UTC offset out of range: {utc_offset_hours}h"))
    })?;
    Ok(now.with_timezone(&offset).date_naive())
}

/// Date whose file a run started at `now` should ingest.
pub fn target_date(
    now: DateTime<Utc>,
    utc_offset_hours: i32,
    holidays: &HashSet<NaiveDate>,
) -> Result<NaiveDate> {
    Ok(previous_business_day(local_date(now, utc_offset_hours)?, holidays))
}
