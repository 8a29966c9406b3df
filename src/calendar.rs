//! Calendar arithmetic on Unix time: conversion between broken-down dates and
//! seconds since 1970-01-01T00:00:00Z, weekdays, and daylight saving windows.
//!
//! Leap seconds are ignored. Unix time is carried as `u32`, so the usable range
//! ends in 2106; arithmetic wraps instead of panicking past that point.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

pub const SEC_PER_MIN: u32 = 60;
pub const SEC_PER_HOUR: u32 = SEC_PER_MIN * 60;
pub const SEC_PER_DAY: u32 = SEC_PER_HOUR * 24;

// Per-month offsets for the weekday congruence, January first
const DAY_OFFSET: [u8; 12] = [0, 3, 2, 5, 0, 3, 5, 1, 4, 6, 2, 4];
const MONTH_DAYS: [u8; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Broken-down UTC date and time. `weekday` is 0..=6 with 0 = Sunday.
#[derive(defmt::Format, Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub weekday: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DateTime {
    pub fn unix_time(&self) -> u32 {
        unix_time(
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
        )
    }

    pub fn from_unix_time(t: u32) -> Self {
        let second = (t % 60) as u8;
        let t = t / 60;
        let minute = (t % 60) as u8;
        let t = t / 60;
        let hour = (t % 24) as u8;
        let mut days = t / 24;

        // 1970-01-01 was a Thursday
        let weekday = ((days + 4) % 7) as u8;

        let mut year = 1970_u16;
        loop {
            let len = year_length(year);
            if days < len {
                break;
            }
            days -= len;
            year += 1;
        }

        let mut month = 0;
        while month < 11 {
            let len = month_length(year, month as u8 + 1) as u32;
            if days < len {
                break;
            }
            days -= len;
            month += 1;
        }

        Self {
            year,
            month: month as u8 + 1,
            day: days as u8 + 1,
            weekday,
            hour,
            minute,
            second,
        }
    }

    pub fn update_weekday(&mut self) {
        self.weekday = day_of_week(self.year, self.month, self.day);
    }

    /// True when every field is in range for a real date and time from 1970 on.
    pub fn is_valid(&self) -> bool {
        self.year >= 1970 && NaiveDateTime::try_from(*self).is_ok()
    }
}

impl TryFrom<DateTime> for NaiveDateTime {
    type Error = ();

    fn try_from(dt: DateTime) -> Result<Self, Self::Error> {
        let date = NaiveDate::from_ymd_opt(dt.year as i32, dt.month as u32, dt.day as u32)
            .ok_or(())?;
        let time = NaiveTime::from_hms_opt(dt.hour as u32, dt.minute as u32, dt.second as u32)
            .ok_or(())?;
        Ok(NaiveDateTime::new(date, time))
    }
}

pub fn is_leap_year(year: u16) -> bool {
    if year % 400 == 0 {
        true
    } else if year % 100 == 0 {
        false
    } else {
        year % 4 == 0
    }
}

fn year_length(year: u16) -> u32 {
    if is_leap_year(year) {
        366
    } else {
        365
    }
}

fn month_length(year: u16, month: u8) -> u8 {
    match month {
        2 if is_leap_year(year) => 29,
        1..=12 => MONTH_DAYS[month as usize - 1],
        _ => 0,
    }
}

/// Day of the week for a Gregorian date, 0 = Sunday.
///
/// A month outside 1..=12 contributes no offset rather than failing.
pub fn day_of_week(year: u16, month: u8, day: u8) -> u8 {
    let y = year as i32 - (month < 3) as i32;
    let offset = DAY_OFFSET
        .get((month as usize).wrapping_sub(1))
        .copied()
        .unwrap_or(0) as i32;
    (y + y / 4 - y / 100 + y / 400 + offset + day as i32).rem_euclid(7) as u8
}

/// Seconds since the Unix epoch for the given UTC calendar fields.
///
/// Years before 1970 cannot be represented and return 0.
pub fn unix_time(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> u32 {
    if year < 1970 {
        return 0;
    }

    // Shift to a March-based year so the leap day is the last day of the year:
    // 1..12 -> 11, 12, 1..10
    let mut year = year as i64;
    let mut month = month as i64 - 2;
    if month <= 0 {
        month += 12;
        year -= 1;
    }

    let days = year / 4 - year / 100 + year / 400 + 367 * month / 12 + day as i64 + year * 365
        - 719_499;
    let secs = ((days * 24 + hour as i64) * 60 + minute as i64) * 60 + second as i64;
    secs as u32
}

/// One daylight saving transition: the `week`-th `weekday` of `month` at `hour`
/// UTC. A `week` of 0 selects the last such weekday in the month.
#[derive(defmt::Format, Debug, Copy, Clone, PartialEq, Eq)]
pub struct DstRule {
    pub week: u8,
    pub month: u8,
    pub hour: u8,
    pub weekday: u8,
}

/// Start of central European summer time: last Sunday in March, 01:00 UTC
pub const CEST_FROM: DstRule = DstRule {
    week: 0,
    month: 3,
    hour: 1,
    weekday: 0,
};

/// End of central European summer time: last Sunday in October, 01:00 UTC
pub const CEST_TO: DstRule = DstRule {
    week: 0,
    month: 10,
    hour: 1,
    weekday: 0,
};

pub const CET_OFFSET: u32 = SEC_PER_HOUR;
pub const CEST_OFFSET: u32 = 2 * SEC_PER_HOUR;

impl DstRule {
    /// Unix time of this transition in `year`.
    pub fn transition(&self, year: u16) -> u32 {
        let mut year = year;
        let mut month = self.month;
        let mut week = self.week;

        // For the last occurrence, find the first one in the following month
        // and step back a week.
        if week == 0 {
            month = month.wrapping_add(1);
            if month > 12 {
                month = 1;
                year = year.wrapping_add(1);
            }
            week = 1;
        }

        let first = unix_time(year, month, 1, self.hour, 0, 0);
        let to_weekday =
            (self.weekday as i32 - day_of_week(year, month, 1) as i32 + 7).rem_euclid(7) as u32;
        let t = first.wrapping_add((to_weekday + (week as u32 - 1) * 7) * SEC_PER_DAY);

        if self.week == 0 {
            t.wrapping_sub(7 * SEC_PER_DAY)
        } else {
            t
        }
    }
}

/// Local time for `utc`, applying `dst_offset` inside the inclusive window
/// `dst_from..=dst_to` and `std_offset` everywhere else.
pub fn local_time(utc: u32, dst_from: u32, dst_to: u32, std_offset: u32, dst_offset: u32) -> u32 {
    if (dst_from..=dst_to).contains(&utc) {
        utc.wrapping_add(dst_offset)
    } else {
        utc.wrapping_add(std_offset)
    }
}

/// A fixed pair of daylight saving rules with their UTC offsets.
#[derive(defmt::Format, Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimeZone {
    pub dst_from: DstRule,
    pub dst_to: DstRule,
    pub std_offset: u32,
    pub dst_offset: u32,
}

impl TimeZone {
    pub const CENTRAL_EUROPE: Self = Self {
        dst_from: CEST_FROM,
        dst_to: CEST_TO,
        std_offset: CET_OFFSET,
        dst_offset: CEST_OFFSET,
    };

    pub fn local_time(&self, utc: u32) -> u32 {
        let year = DateTime::from_unix_time(utc).year;
        local_time(
            utc,
            self.dst_from.transition(year),
            self.dst_to.transition(year),
            self.std_offset,
            self.dst_offset,
        )
    }

    pub fn is_dst(&self, utc: u32) -> bool {
        self.local_time(utc) == utc.wrapping_add(self.dst_offset)
            && self.dst_offset != self.std_offset
    }
}

/// Absolute difference between two records in seconds.
pub fn drift(a: &DateTime, b: &DateTime) -> u32 {
    a.unix_time().abs_diff(b.unix_time())
}
