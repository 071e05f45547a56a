//! Human-readable duration parsing and formatting.
//!
//! Accepts `"1500"`, `"10s"`, `"2 hours"`, `"1.5d"`, `"-3m"` and renders
//! milliseconds back as `"1s"` / `"1 second"`. A year is 365.25 days.

use crate::error::EngineError;

const SECOND: f64 = 1000.0;
const MINUTE: f64 = SECOND * 60.0;
const HOUR: f64 = MINUTE * 60.0;
const DAY: f64 = HOUR * 24.0;
const WEEK: f64 = DAY * 7.0;
const YEAR: f64 = DAY * 365.25;

/// Inputs longer than this are rejected without parsing.
const MAX_INPUT_LEN: usize = 100;

/// Parse a duration string into milliseconds.
///
/// Returns `None` for empty, over-long, or unrecognized input. Fractional and
/// negative values are returned as-is; callers decide whether they are valid.
pub fn parse(input: &str) -> Option<f64> {
    if input.is_empty() || input.len() > MAX_INPUT_LEN {
        return None;
    }

    let number_len = input
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && c == '-')))
        .map_or(input.len(), |(i, _)| i);
    let (number, rest) = input.split_at(number_len);
    let value = parse_number(number)?;

    let unit = rest.trim_start_matches(' ');
    let factor = match unit.to_ascii_lowercase().as_str() {
        "" | "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => SECOND,
        "m" | "min" | "mins" | "minute" | "minutes" => MINUTE,
        "h" | "hr" | "hrs" | "hour" | "hours" => HOUR,
        "d" | "day" | "days" => DAY,
        "w" | "week" | "weeks" => WEEK,
        "y" | "yr" | "yrs" | "year" | "years" => YEAR,
        _ => return None,
    };

    Some(value * factor)
}

/// `-?\d*\.?\d+`: digits are required after the optional decimal point.
fn parse_number(number: &str) -> Option<f64> {
    let unsigned = number.strip_prefix('-').unwrap_or(number);
    let (whole, frac) = match unsigned.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => ("", unsigned),
    };
    let digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if frac.is_empty() || !digits(whole) || !digits(frac) {
        return None;
    }
    number.parse().ok()
}

/// Render milliseconds in short (`"7d"`) or long (`"7 days"`) form.
pub fn format(ms: f64, long: bool) -> String {
    let abs = ms.abs();
    let units: [(f64, &str, &str); 4] = [
        (DAY, "d", "day"),
        (HOUR, "h", "hour"),
        (MINUTE, "m", "minute"),
        (SECOND, "s", "second"),
    ];

    for (size, short, name) in units {
        if abs >= size {
            let rounded = (ms / size).round();
            return if long {
                let plural = if abs >= size * 1.5 { "s" } else { "" };
                format!("{rounded} {name}{plural}")
            } else {
                format!("{rounded}{short}")
            };
        }
    }

    if long { format!("{ms} ms") } else { format!("{ms}ms") }
}

// ---------------------------------------------------------------------------
// Duration
// ---------------------------------------------------------------------------

/// A step delay or timeout as written by user code.
#[derive(Debug, Clone, PartialEq)]
pub enum Duration {
    /// Milliseconds.
    Millis(u64),
    /// A string understood by [`parse`].
    Text(String),
}

impl Duration {
    /// Resolve to whole milliseconds, rejecting unparseable or negative input.
    pub fn as_millis(&self) -> Result<u64, EngineError> {
        match self {
            Duration::Millis(ms) => Ok(*ms),
            Duration::Text(text) => match parse(text) {
                Some(ms) if ms >= 0.0 => Ok(ms.round() as u64),
                _ => Err(EngineError::InvalidDuration(text.clone())),
            },
        }
    }
}

impl From<u64> for Duration {
    fn from(ms: u64) -> Self {
        Duration::Millis(ms)
    }
}

impl From<std::time::Duration> for Duration {
    fn from(d: std::time::Duration) -> Self {
        Duration::Millis(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

impl From<&str> for Duration {
    fn from(text: &str) -> Self {
        Duration::Text(text.to_string())
    }
}

impl From<String> for Duration {
    fn from(text: String) -> Self {
        Duration::Text(text)
    }
}

impl std::fmt::Display for Duration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Duration::Millis(ms) => write!(f, "{}", format(*ms as f64, false)),
            Duration::Text(text) => write!(f, "{text}"),
        }
    }
}
