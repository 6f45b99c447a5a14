use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveDateTime};
use regex::{Captures, Regex};
use std::path::Path;
use std::str::FromStr;

const REQUIRED_GROUPS: [&str; 3] = ["year", "month", "day"];

/// Infers a date from the file stem using a regex with named groups.
///
/// Recognized groups: `year`, `month`, `day` (required), `hour`, `minute`,
/// `second` (default 0) and `microsecond` / `millisecond` (default 0).
///
/// The match is anchored at the start of the stem, but not at its end:
/// append `$` to the pattern to require the whole stem to match.
#[derive(Debug, Clone)]
pub struct RegexParser {
    name: String,
    pattern: Regex,
}

impl RegexParser {
    /// Compile a parser. Fails if the regex is invalid or lacks a required group.
    pub fn new(name: impl Into<String>, regex: &str) -> Result<Self> {
        let name = name.into();
        let pattern = Regex::new(&format!(r"\A(?:{regex})"))
            .with_context(|| format!("Invalid regex for parser '{name}'"))?;

        for group in REQUIRED_GROUPS {
            if !pattern.capture_names().flatten().any(|n| n == group) {
                bail!("Regex for parser '{name}' has no named group '{group}'");
            }
        }

        Ok(Self { name, pattern })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parse(&self, path: &Path) -> Option<NaiveDateTime> {
        log::debug!("Trying {} filename parser", self.name);
        let stem = path.file_stem()?.to_str()?;
        let caps = self.pattern.captures(stem)?;

        let year: i32 = group(&caps, "year")??;
        let month: u32 = group(&caps, "month")??;
        let day: u32 = group(&caps, "day")??;
        let hour: u32 = group(&caps, "hour")?.unwrap_or(0);
        let minute: u32 = group(&caps, "minute")?.unwrap_or(0);
        let second: u32 = group(&caps, "second")?.unwrap_or(0);

        let microsecond = group::<u32>(&caps, "microsecond")?;
        let millisecond = group::<u32>(&caps, "millisecond")?;
        let micros = match (microsecond, millisecond) {
            (Some(us), Some(ms)) => {
                log::debug!(
                    "Parser {} captured both microsecond ({us}) and millisecond ({ms}) in {stem}; using microsecond",
                    self.name
                );
                us
            }
            (Some(us), None) => us,
            (None, Some(ms)) => ms.checked_mul(1000)?,
            (None, None) => 0,
        };

        // EXIF dates are four-digit years
        if !(1..=9999).contains(&year) || micros >= 1_000_000 {
            return None;
        }

        NaiveDate::from_ymd_opt(year, month, day)?.and_hms_micro_opt(hour, minute, second, micros)
    }
}

/// `Some(None)` when the group did not participate, `None` when it did but
/// is not a number.
fn group<T: FromStr>(caps: &Captures, name: &str) -> Option<Option<T>> {
    match caps.name(name) {
        None => Some(None),
        Some(m) => m.as_str().parse().ok().map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    const IOS: &str = r"(?P<year>\d{4})-(?P<month>\d{2})-(?P<day>\d{2}) (?P<hour>\d{2})\.(?P<minute>\d{2})\.(?P<second>\d{2})";

    fn parse(regex: &str, path: &str) -> Option<NaiveDateTime> {
        RegexParser::new("test", regex).unwrap().parse(Path::new(path))
    }

    // ── construction ─────────────────────────────────────────────────

    #[test]
    fn rejects_invalid_regex() {
        assert!(RegexParser::new("broken", r"(?P<year>\d{4}").is_err());
    }

    #[test]
    fn rejects_missing_required_group() {
        let err = RegexParser::new("no-day", r"(?P<year>\d{4})-(?P<month>\d{2})").unwrap_err();
        assert!(err.to_string().contains("'day'"));
    }

    // ── matching ─────────────────────────────────────────────────────

    #[test]
    fn parses_ios_export_name() {
        let date = parse(IOS, "/photos/2015-06-08 07.00.11.jpg").unwrap();
        assert_eq!(date.to_string(), "2015-06-08 07:00:11");
    }

    #[test]
    fn optional_time_defaults_to_midnight() {
        let regex = r"(?P<year>\d{4})-(?P<month>\d{2})-(?P<day>\d{2})";
        let date = parse(regex, "2015-06-08.jpg").unwrap();
        assert_eq!(date.to_string(), "2015-06-08 00:00:00");
    }

    #[test]
    fn optional_group_that_did_not_participate_defaults() {
        let regex = r"(?P<year>\d{4})(?P<month>\d{2})(?P<day>\d{2})(?:_(?P<hour>\d{2}))?";
        let date = parse(regex, "20150608.jpg").unwrap();
        assert_eq!(date.hour(), 0);
    }

    #[test]
    fn matches_stem_not_extension() {
        let regex = r"(?P<year>\d{4})(?P<month>\d{2})(?P<day>\d{2})$";
        assert!(parse(regex, "20150608.jpg").is_some());
    }

    #[test]
    fn anchored_at_start_of_stem() {
        let regex = r"(?P<year>\d{4})-(?P<month>\d{2})-(?P<day>\d{2})";
        assert!(parse(regex, "holiday 2015-06-08.jpg").is_none());
        let anywhere = r".*?(?P<year>\d{4})-(?P<month>\d{2})-(?P<day>\d{2})";
        assert!(parse(anywhere, "holiday 2015-06-08.jpg").is_some());
    }

    #[test]
    fn no_match_returns_none() {
        assert!(parse(IOS, "holiday.jpg").is_none());
    }

    // ── calendar validity ────────────────────────────────────────────

    #[test]
    fn month_thirteen_is_a_non_match() {
        assert!(parse(IOS, "2015-13-08 07.00.11.jpg").is_none());
    }

    #[test]
    fn april_thirty_first_is_a_non_match() {
        assert!(parse(IOS, "2015-04-31 07.00.11.jpg").is_none());
    }

    #[test]
    fn hour_twenty_four_is_a_non_match() {
        assert!(parse(IOS, "2015-04-30 24.00.00.jpg").is_none());
    }

    #[test]
    fn year_zero_is_a_non_match() {
        assert!(parse(IOS, "0000-01-01 00.00.00.jpg").is_none());
    }

    #[test]
    fn leap_day_only_in_leap_years() {
        assert!(parse(IOS, "2016-02-29 12.00.00.jpg").is_some());
        assert!(parse(IOS, "2015-02-29 12.00.00.jpg").is_none());
    }

    #[test]
    fn non_ascii_digits_are_a_non_match() {
        let regex = r"(?P<year>\d{4})-(?P<month>\d{2})-(?P<day>\d{2})";
        assert!(parse(regex, "٢٠١٥-06-08.jpg").is_none());
    }

    // ── sub-second fields ────────────────────────────────────────────

    #[test]
    fn millisecond_is_scaled() {
        let regex = r"PXL_(?P<year>\d{4})(?P<month>\d{2})(?P<day>\d{2})_(?P<hour>\d{2})(?P<minute>\d{2})(?P<second>\d{2})(?P<millisecond>\d{3})";
        let date = parse(regex, "PXL_20230101_123456789.jpg").unwrap();
        assert_eq!(date.nanosecond(), 789_000_000);
    }

    #[test]
    fn microsecond_is_used_verbatim() {
        let regex = r"(?P<year>\d{4})(?P<month>\d{2})(?P<day>\d{2})-(?P<microsecond>\d{6})";
        let date = parse(regex, "20230101-000042.jpg").unwrap();
        assert_eq!(date.nanosecond(), 42_000);
    }

    #[test]
    fn microsecond_preferred_over_millisecond() {
        let regex = r"(?P<year>\d{4})(?P<month>\d{2})(?P<day>\d{2})-(?P<millisecond>\d{3})-(?P<microsecond>\d{6})";
        let date = parse(regex, "20230101-123-000456.jpg").unwrap();
        assert_eq!(date.nanosecond(), 456_000);
    }

    #[test]
    fn sub_second_overflow_is_a_non_match() {
        let regex = r"(?P<year>\d{4})(?P<month>\d{2})(?P<day>\d{2})-(?P<millisecond>\d{4})";
        assert!(parse(regex, "20230101-1000.jpg").is_none());
    }
}
