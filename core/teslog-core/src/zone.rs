//! Display timezone and duration rendering for reports and logs.

use chrono::{FixedOffset, Local, TimeZone, Utc};
use chrono_tz::Tz;

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timezone every timestamp in a report is rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayZone {
    #[default]
    Local,
    Utc,
    Fixed(FixedOffset),
    /// IANA zone such as `America/Los_Angeles`; follows daylight saving.
    Named(Tz),
}

impl DisplayZone {
    /// Accepts `local`, `utc` (or `z`), fixed offsets such as `+05:30`, and
    /// IANA zone names.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "local" => return Some(DisplayZone::Local),
            "utc" | "z" | "gmt" => return Some(DisplayZone::Utc),
            _ => {}
        }
        if let Ok(offset) = trimmed.parse::<FixedOffset>() {
            return Some(DisplayZone::Fixed(offset));
        }
        trimmed.parse::<Tz>().ok().map(DisplayZone::Named)
    }

    pub fn format_ts(&self, ts: i64) -> String {
        let Some(utc) = Utc.timestamp_opt(ts, 0).single() else {
            return ts.to_string();
        };
        match self {
            DisplayZone::Local => utc.with_timezone(&Local).format(TS_FORMAT).to_string(),
            DisplayZone::Utc => utc.format(TS_FORMAT).to_string(),
            DisplayZone::Fixed(offset) => utc.with_timezone(offset).format(TS_FORMAT).to_string(),
            DisplayZone::Named(tz) => utc.with_timezone(tz).format(TS_FORMAT).to_string(),
        }
    }
}

/// Renders a second count the way a timedelta prints: `H:MM:SS`, with a
/// `N day(s), ` prefix once past 24 hours.
pub fn format_duration(secs: i64) -> String {
    let sign = if secs < 0 { "-" } else { "" };
    let total = secs.unsigned_abs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    match days {
        0 => format!("{}{}:{:02}:{:02}", sign, hours, minutes, seconds),
        1 => format!("{}1 day, {}:{:02}:{:02}", sign, hours, minutes, seconds),
        _ => format!(
            "{}{} days, {}:{:02}:{:02}",
            sign, days, hours, minutes, seconds
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_zones() {
        assert_eq!(DisplayZone::parse("local"), Some(DisplayZone::Local));
        assert_eq!(DisplayZone::parse("UTC"), Some(DisplayZone::Utc));
    }

    #[test]
    fn parses_fixed_offsets() {
        let expected = FixedOffset::east_opt(5 * 3600 + 30 * 60).map(DisplayZone::Fixed);
        assert_eq!(DisplayZone::parse("+05:30"), expected);
        let west = FixedOffset::east_opt(-8 * 3600).map(DisplayZone::Fixed);
        assert_eq!(DisplayZone::parse("-08:00"), west);
    }

    #[test]
    fn parses_iana_zones() {
        assert_eq!(
            DisplayZone::parse("America/Los_Angeles"),
            Some(DisplayZone::Named(chrono_tz::America::Los_Angeles))
        );
        assert_eq!(
            DisplayZone::parse("Europe/Berlin"),
            Some(DisplayZone::Named(chrono_tz::Europe::Berlin))
        );
    }

    #[test]
    fn rejects_garbage_zones() {
        assert_eq!(DisplayZone::parse("America/Nowhere"), None);
        assert_eq!(DisplayZone::parse("+25:00"), None);
        assert_eq!(DisplayZone::parse("Mars/Olympus"), None);
    }

    #[test]
    fn formats_in_requested_zone() {
        assert_eq!(DisplayZone::Utc.format_ts(0), "1970-01-01 00:00:00");
        let plus_two = DisplayZone::parse("+02:00").expect("offset");
        assert_eq!(plus_two.format_ts(0), "1970-01-01 02:00:00");
    }

    #[test]
    fn named_zone_follows_daylight_saving() {
        let pacific = DisplayZone::parse("America/Los_Angeles").expect("zone");
        // 12:00 UTC on 2021-01-15 and on 2021-07-15.
        assert_eq!(pacific.format_ts(1_610_712_000), "2021-01-15 04:00:00");
        assert_eq!(pacific.format_ts(1_626_350_400), "2021-07-15 05:00:00");
    }

    #[test]
    fn formats_durations_like_timedelta() {
        assert_eq!(format_duration(0), "0:00:00");
        assert_eq!(format_duration(3725), "1:02:05");
        assert_eq!(format_duration(86_400 + 61), "1 day, 0:01:01");
        assert_eq!(format_duration(2 * 86_400), "2 days, 0:00:00");
        assert_eq!(format_duration(-30), "-0:00:30");
    }
}
