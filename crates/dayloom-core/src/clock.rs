use std::sync::OnceLock;

use regex::Regex;

/// Minutes in one day; also the default fallback that sorts missing times last.
pub const MINUTES_PER_DAY: u32 = 1440;

const AFTERNOON_MARKER: &str = "午後";
const MORNING_MARKER: &str = "午前";

/// Result of parsing a time-of-day string.
///
/// `hour` is `None` when the input was empty or matched none of the
/// accepted notations; `minute` is then `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockTime {
    pub hour: Option<u32>,
    pub minute: u32,
}

impl ClockTime {
    const UNPARSED: Self = Self {
        hour: None,
        minute: 0,
    };

    fn at(hour: u32, minute: u32) -> Self {
        Self {
            hour: Some(hour),
            minute,
        }
    }

    pub fn is_parsed(&self) -> bool {
        self.hour.is_some()
    }

    /// Minutes since midnight, if the time parsed.
    pub fn minutes(&self) -> Option<u32> {
        self.hour.map(|hour| hour * 60 + self.minute)
    }
}

fn twenty_four_hour_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<hour>\d{1,2}):(?P<minute>\d{2})$").ok())
        .as_ref()
}

fn twelve_hour_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<period>am|pm)$").ok()
    })
    .as_ref()
}

fn localized_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<period>午前|午後)?(?P<hour>\d{1,2})時(?:(?P<minute>\d{1,2})分)?$").ok()
    })
    .as_ref()
}

/// Parses a time of day in one of the accepted notations, tried in order:
///
/// 1. 24-hour `H:mm` / `HH:mm`
/// 2. 12-hour `H:mm AM|PM`, case-insensitive
/// 3. localized `(午前|午後)?H時(mm分)?`
///
/// Never fails: unparseable input yields `hour: None`.
pub fn parse_clock_time(text: &str) -> ClockTime {
    let token = text.trim();
    if token.is_empty() {
        return ClockTime::UNPARSED;
    }

    parse_twenty_four_hour(token)
        .or_else(|| parse_twelve_hour(token))
        .or_else(|| parse_localized(token))
        .unwrap_or(ClockTime::UNPARSED)
}

/// Minutes since midnight for `text`, or `fallback` when absent or unparseable.
pub fn to_minutes(text: Option<&str>, fallback: u32) -> u32 {
    text.map(parse_clock_time)
        .and_then(|time| time.minutes())
        .unwrap_or(fallback)
}

/// [`to_minutes`] with the end-of-day fallback.
pub fn minutes_or_end_of_day(text: Option<&str>) -> u32 {
    to_minutes(text, MINUTES_PER_DAY)
}

fn parse_twenty_four_hour(token: &str) -> Option<ClockTime> {
    let caps = twenty_four_hour_re()?.captures(token)?;
    let hour = caps.name("hour")?.as_str().parse::<u32>().ok()?;
    let minute = caps.name("minute")?.as_str().parse::<u32>().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(ClockTime::at(hour, minute))
}

fn parse_twelve_hour(token: &str) -> Option<ClockTime> {
    let caps = twelve_hour_re()?.captures(token)?;
    let raw_hour = caps.name("hour")?.as_str().parse::<u32>().ok()?;
    let minute = caps.name("minute")?.as_str().parse::<u32>().ok()?;
    if raw_hour == 0 || raw_hour > 12 || minute > 59 {
        return None;
    }

    let is_pm = caps
        .name("period")?
        .as_str()
        .eq_ignore_ascii_case("pm");
    let hour = match (is_pm, raw_hour) {
        (false, 12) => 0,
        (false, h) => h,
        (true, 12) => 12,
        (true, h) => h + 12,
    };
    Some(ClockTime::at(hour, minute))
}

fn parse_localized(token: &str) -> Option<ClockTime> {
    let caps = localized_re()?.captures(token)?;
    let mut hour = caps.name("hour")?.as_str().parse::<u32>().ok()?;
    let minute = match caps.name("minute") {
        Some(m) => m.as_str().parse::<u32>().ok()?,
        None => 0,
    };

    match caps.name("period").map(|m| m.as_str()) {
        Some(AFTERNOON_MARKER) if (1..12).contains(&hour) => hour += 12,
        Some(MORNING_MARKER) if hour == 12 => hour = 0,
        _ => {}
    }

    if hour > 23 || minute > 59 {
        return None;
    }
    Some(ClockTime::at(hour, minute))
}

#[cfg(test)]
mod tests {
    use super::{ClockTime, MINUTES_PER_DAY, parse_clock_time, to_minutes};

    #[test]
    fn parses_twenty_four_hour() {
        assert_eq!(parse_clock_time("14:30"), ClockTime::at(14, 30));
        assert_eq!(parse_clock_time("7:05"), ClockTime::at(7, 5));
        assert_eq!(parse_clock_time(" 00:00 "), ClockTime::at(0, 0));
    }

    #[test]
    fn rejects_out_of_range_twenty_four_hour() {
        assert_eq!(parse_clock_time("24:00").hour, None);
        assert_eq!(parse_clock_time("12:60").hour, None);
    }

    #[test]
    fn parses_twelve_hour_with_folding() {
        assert_eq!(parse_clock_time("2:30 PM"), ClockTime::at(14, 30));
        assert_eq!(parse_clock_time("2:30pm"), ClockTime::at(14, 30));
        assert_eq!(parse_clock_time("12:00 am"), ClockTime::at(0, 0));
        assert_eq!(parse_clock_time("12:15 PM"), ClockTime::at(12, 15));
        assert_eq!(parse_clock_time("0:30 PM").hour, None);
        assert_eq!(parse_clock_time("13:00 PM").hour, None);
    }

    #[test]
    fn parses_localized_notation() {
        assert_eq!(parse_clock_time("午後3時"), ClockTime::at(15, 0));
        assert_eq!(parse_clock_time("午後3時15分"), ClockTime::at(15, 15));
        assert_eq!(parse_clock_time("午前9時"), ClockTime::at(9, 0));
        assert_eq!(parse_clock_time("午後12時"), ClockTime::at(12, 0));
        assert_eq!(parse_clock_time("3時"), ClockTime::at(3, 0));
        assert_eq!(parse_clock_time("21時5分"), ClockTime::at(21, 5));
    }

    #[test]
    fn unparseable_input_has_no_hour() {
        for raw in ["", "   ", "noon", "25時", "9:5", "ab:cd"] {
            let parsed = parse_clock_time(raw);
            assert_eq!(parsed.hour, None, "input {raw:?}");
            assert_eq!(parsed.minute, 0);
        }
    }

    #[test]
    fn to_minutes_uses_fallback() {
        assert_eq!(to_minutes(Some("01:30"), MINUTES_PER_DAY), 90);
        assert_eq!(to_minutes(Some("garbage"), MINUTES_PER_DAY), MINUTES_PER_DAY);
        assert_eq!(to_minutes(None, 0), 0);
    }
}
