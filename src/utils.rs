use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use colored::Colorize;
use serde::Deserialize;
use std::fmt::Display;
use std::fs;

pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

// Automation dates the host can represent: 0100-01-01 .. 9999-12-31 23:59:59.
const MIN_OLE_DATE: f64 = -657_434.0;
const MAX_OLE_DATE: f64 = 2_958_466.0;

/// Turns every CRLF, lone CR and lone LF into a single LF, so all three
/// line-ending styles serialize as the same two-character `\n` escape.
pub fn normalize_line_breaks(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Converts an OLE automation date (days since 1899-12-30, fractional part
/// is the time of day) to a calendar time, rounded to the nearest second.
pub fn ole_date_to_datetime(date: f64) -> Option<NaiveDateTime> {
    if !date.is_finite() || date < MIN_OLE_DATE || date >= MAX_OLE_DATE {
        return None;
    }

    // Negative dates count days backwards but the time of day still runs forward.
    let days = date.trunc();
    let seconds = ((date - days).abs() * 86_400.0).round() as i64;

    let time = NaiveDate::from_ymd_opt(1899, 12, 30)?
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::days(days as i64))?
        .checked_add_signed(Duration::seconds(seconds))?;

    // Rounding the last second of 9999-12-31 would spill into year 10000.
    if time.year() > 9999 {
        return None;
    }
    Some(time)
}

pub fn format_timestamp(time: &NaiveDateTime) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

pub fn read_yaml<T>(filename: &str) -> Result<T, Box<dyn std::error::Error>>
where
    T: for<'de> Deserialize<'de>,
{
    let contents = fs::read_to_string(filename)?;
    let yaml_data: T = serde_yaml::from_str(&contents)?;
    Ok(yaml_data)
}

/// Diagnostics on stderr. Silent unless verbose, so a default run writes
/// nothing but the JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reporter {
    verbose: bool,
}

impl Reporter {
    pub fn new(verbose: bool) -> Self {
        Reporter { verbose }
    }

    pub fn info(&self, msg: impl Display) {
        if self.verbose {
            eprintln!("{}", format!("{}", msg).green());
        }
    }

    pub fn warn(&self, msg: impl Display) {
        if self.verbose {
            eprintln!("{}", format!("{}", msg).yellow());
        }
    }

    pub fn error(&self, msg: impl Display) {
        if self.verbose {
            eprintln!("{}", format!("{}", msg).red());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_endings_normalize_identically() {
        let crlf = normalize_line_breaks("a\r\nb");
        let cr = normalize_line_breaks("a\rb");
        let lf = normalize_line_breaks("a\nb");
        assert_eq!(crlf, "a\nb");
        assert_eq!(crlf, cr);
        assert_eq!(cr, lf);
    }

    #[test]
    fn crlf_counts_as_one_break() {
        assert_eq!(normalize_line_breaks("\r\n\r\n"), "\n\n");
        assert_eq!(normalize_line_breaks("\n\r"), "\n\n");
    }

    #[test]
    fn ole_epoch_is_end_of_1899() {
        let time = ole_date_to_datetime(0.0).unwrap();
        assert_eq!(format_timestamp(&time), "1899/12/30 00:00:00");
    }

    #[test]
    fn ole_fraction_is_time_of_day() {
        let time = ole_date_to_datetime(45658.75).unwrap();
        assert_eq!(format_timestamp(&time), "2025/01/01 18:00:00");
    }

    #[test]
    fn ole_rounds_to_nearest_second() {
        // 1.4 seconds past midnight
        let time = ole_date_to_datetime(45658.0 + 1.4 / 86_400.0).unwrap();
        assert_eq!(format_timestamp(&time), "2025/01/01 00:00:01");
    }

    #[test]
    fn negative_ole_dates_keep_forward_time() {
        let time = ole_date_to_datetime(-1.25).unwrap();
        assert_eq!(format_timestamp(&time), "1899/12/29 06:00:00");
    }

    #[test]
    fn ole_dates_outside_host_range_are_rejected() {
        assert!(ole_date_to_datetime(f64::NAN).is_none());
        assert!(ole_date_to_datetime(3_000_000.0).is_none());
        assert!(ole_date_to_datetime(-700_000.0).is_none());
    }

    #[test]
    fn last_representable_second_does_not_round_into_year_10000() {
        let time = ole_date_to_datetime(2_958_465.0 + 86_399.0 / 86_400.0).unwrap();
        assert_eq!(format_timestamp(&time), "9999/12/31 23:59:59");
        assert!(ole_date_to_datetime(2_958_465.0 + 86_399.6 / 86_400.0).is_none());
    }

    #[test]
    fn timestamps_are_zero_padded() {
        let time = NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(4, 5, 6)
            .unwrap();
        assert_eq!(format_timestamp(&time), "2024/03/07 04:05:06");
    }
}
