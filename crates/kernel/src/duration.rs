//! Human-friendly duration literals.
//!
//! Accepted forms:
//!
//! | Literal | Meaning |
//! |---------|---------|
//! | `5`, `2.5` | seconds |
//! | `250ms`, `2s`, `1m30s`, `1.5h`, `2 days` | unit sequences |
//! | `07:30`, `07:30:15`, `24:00` | clock notation (`h:m` or `h:m:s`) |
//!
//! Clock notation doubles as a time-of-day offset from midnight for the
//! `before` / `after` gates.

use std::time::Duration;

use crate::error::KernelError;

/// Parse a duration literal.
///
/// # Errors
///
/// Returns [`KernelError::Duration`] when the text matches none of the
/// accepted forms, or when it denotes a negative or non-finite amount.
pub fn parse_duration(text: &str) -> Result<Duration, KernelError> {
    let trimmed = text.trim();
    let invalid = || KernelError::Duration(text.to_string());

    if trimmed.is_empty() {
        return Err(invalid());
    }
    if trimmed.contains(':') {
        return parse_clock(trimmed).ok_or_else(invalid);
    }
    if let Ok(secs) = trimmed.parse::<f64>() {
        return seconds(secs).ok_or_else(invalid);
    }
    parse_units(trimmed).ok_or_else(invalid)
}

/// Parse an optional duration, where an empty literal means "no duration".
///
/// # Errors
///
/// Same as [`parse_duration`] for non-empty input.
pub fn parse_optional_duration(text: &str) -> Result<Option<Duration>, KernelError> {
    if text.trim().is_empty() {
        Ok(None)
    } else {
        parse_duration(text).map(Some)
    }
}

fn seconds(secs: f64) -> Option<Duration> {
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

fn parse_clock(text: &str) -> Option<Duration> {
    let parts: Vec<&str> = text.split(':').collect();
    let (hours, minutes, secs) = match parts.as_slice() {
        [h, m] => (*h, *m, "0"),
        [h, m, s] => (*h, *m, *s),
        _ => return None,
    };
    let hours: u64 = hours.trim().parse().ok()?;
    let minutes: u64 = minutes.trim().parse().ok()?;
    let secs: u64 = secs.trim().parse().ok()?;
    if minutes >= 60 || secs >= 60 {
        return None;
    }
    Some(Duration::from_secs(hours * 3600 + minutes * 60 + secs))
}

fn parse_units(text: &str) -> Option<Duration> {
    let mut total = 0.0_f64;
    let mut rest = text;

    while !rest.is_empty() {
        rest = rest.trim_start();
        let number_len = rest.find(|c: char| !(c.is_ascii_digit() || c == '.'))?;
        if number_len == 0 {
            return None;
        }
        let number: f64 = rest[..number_len].parse().ok()?;
        rest = rest[number_len..].trim_start();

        let unit_len = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let factor = match &rest[..unit_len] {
            "ms" => 0.001,
            "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
            "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
            "h" | "hr" | "hrs" | "hour" | "hours" => 3600.0,
            "d" | "day" | "days" => 86_400.0,
            _ => return None,
        };
        total += number * factor;
        rest = &rest[unit_len..];
    }

    seconds(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_bare_seconds() {
        assert_eq!(parse_duration("5").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2.5").unwrap(), Duration::from_millis(2500));
    }

    #[test]
    fn should_parse_unit_sequences() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1m 30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("2 days").unwrap(), Duration::from_secs(172_800));
    }

    #[test]
    fn should_parse_clock_notation() {
        assert_eq!(parse_duration("07:30").unwrap(), Duration::from_secs(27_000));
        assert_eq!(parse_duration("00:00:15").unwrap(), Duration::from_secs(15));
        assert_eq!(parse_duration("24:00").unwrap(), Duration::from_secs(86_400));
    }

    #[test]
    fn should_reject_garbage() {
        for text in ["", "   ", "abc", "5 parsecs", "s", "7:75", "1:2:3:4", "-3"] {
            assert!(
                matches!(parse_duration(text), Err(KernelError::Duration(_))),
                "{text:?} should be rejected"
            );
        }
    }

    #[test]
    fn should_treat_empty_optional_as_none() {
        assert_eq!(parse_optional_duration("").unwrap(), None);
        assert_eq!(
            parse_optional_duration("3s").unwrap(),
            Some(Duration::from_secs(3))
        );
    }
}
