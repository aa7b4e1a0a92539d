//! Display helpers for incident form fields.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Human readable span between incident start and resolution, e.g.
/// `1 day 2 hours 5 minutes`. Zero parts are omitted; spans shorter than
/// half a minute render empty. Returns `None` unless `end` is after `start`.
pub fn format_duration(start: NaiveDateTime, end: NaiveDateTime) -> Option<String> {
    let total_ms = (end - start).num_milliseconds();
    if total_ms <= 0 {
        return None;
    }

    let days = total_ms / DAY_MS;
    let hours = (total_ms % DAY_MS) / HOUR_MS;
    let minutes = ((total_ms % HOUR_MS) as f64 / MINUTE_MS as f64).round() as i64;

    let parts: Vec<String> = [(days, "day"), (hours, "hour"), (minutes, "minute")]
        .into_iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, unit)| {
            if count > 1 {
                format!("{count} {unit}s")
            } else {
                format!("{count} {unit}")
            }
        })
        .collect();
    Some(parts.join(" "))
}

/// Combines the form's separate date (`YYYY-MM-DD`) and time (`HH:MM[:SS]`)
/// inputs.
pub fn parse_form_datetime(date: &str, time: &str) -> Option<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    let time = time.trim();
    let time = NaiveTime::parse_from_str(time, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M"))
        .ok()?;
    Some(date.and_time(time))
}

/// Formats a ten digit number as `(AAA) BBB-CCCC`; anything else is
/// returned unchanged.
pub fn format_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() != 10 {
        return raw.to_string();
    }
    format!("({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..])
}

/// State/province codes are stored upper case.
pub fn format_state_code(raw: &str) -> String {
    raw.to_uppercase()
}

/// Drops anything between `<` and `>` so rich-text notes can be checked for
/// real content.
pub fn strip_markup(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    text.replace("&nbsp;", " ")
}

#[cfg(test)]
#[path = "tests/formatting_tests.rs"]
mod tests;
