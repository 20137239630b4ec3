// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Quiet-hours window check: a configurable wrap-around `[start, end)` in
//! local time (spec 4.M).
use chrono::NaiveTime;
use tinyagi_config::QuietHours;

fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}

/// `true` when `now` falls inside the quiet window. A window where
/// `start > end` wraps past midnight (e.g. `22:00..07:00`).
pub fn in_quiet_hours(now: NaiveTime, quiet_hours: &QuietHours) -> bool {
    let (Some(start), Some(end)) = (parse_hhmm(&quiet_hours.start), parse_hhmm(&quiet_hours.end)) else {
        return false;
    };
    if start <= end {
        now >= start && now < end
    } else {
        now >= start || now < end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qh(start: &str, end: &str) -> QuietHours {
        QuietHours { start: start.into(), end: end.into() }
    }

    #[test]
    fn wraparound_window_covers_late_night() {
        let quiet = qh("22:00", "07:00");
        assert!(in_quiet_hours(NaiveTime::from_hms_opt(23, 0, 0).unwrap(), &quiet));
        assert!(in_quiet_hours(NaiveTime::from_hms_opt(6, 0, 0).unwrap(), &quiet));
    }

    #[test]
    fn wraparound_window_excludes_daytime() {
        let quiet = qh("22:00", "07:00");
        assert!(!in_quiet_hours(NaiveTime::from_hms_opt(10, 0, 0).unwrap(), &quiet));
    }

    #[test]
    fn non_wrapping_window_is_half_open() {
        let quiet = qh("13:00", "14:00");
        assert!(in_quiet_hours(NaiveTime::from_hms_opt(13, 30, 0).unwrap(), &quiet));
        assert!(!in_quiet_hours(NaiveTime::from_hms_opt(14, 0, 0).unwrap(), &quiet));
        assert!(!in_quiet_hours(NaiveTime::from_hms_opt(12, 59, 0).unwrap(), &quiet));
    }

    #[test]
    fn malformed_window_never_quiets() {
        let quiet = qh("not-a-time", "07:00");
        assert!(!in_quiet_hours(NaiveTime::from_hms_opt(23, 0, 0).unwrap(), &quiet));
    }
}
