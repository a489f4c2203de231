#![forbid(unsafe_code)]

//! Parsing for the restricted ISO-8601 durations the platform reports
//! (`PT#H#M#S`). Anything else collapses to zero instead of failing.

use std::sync::LazyLock;

use regex::Regex;

static ISO_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").expect("duration pattern compiles")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDuration {
    pub seconds: u64,
    pub display: String,
}

impl ParsedDuration {
    fn zero() -> Self {
        Self {
            seconds: 0,
            display: "0:00".to_string(),
        }
    }
}

/// Parses `PT1H2M3S`-style input. Malformed input yields `0` / `"0:00"`.
pub fn parse_duration(iso: &str) -> ParsedDuration {
    try_parse_duration(iso).unwrap_or_else(ParsedDuration::zero)
}

/// Same as [`parse_duration`] but reports malformed input as `None`, so
/// callers can tell "zero seconds" apart from "unknown".
pub fn try_parse_duration(iso: &str) -> Option<ParsedDuration> {
    let caps = ISO_DURATION.captures(iso.trim())?;
    let component = |idx: usize| -> Option<Option<u64>> {
        match caps.get(idx) {
            Some(m) => m.as_str().parse::<u64>().ok().map(Some),
            None => Some(None),
        }
    };
    let hours = component(1)?;
    let minutes = component(2)?.unwrap_or(0);
    let seconds = component(3)?.unwrap_or(0);

    let total = hours
        .unwrap_or(0)
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)?;

    let display = match hours {
        Some(h) => format!("{h}:{minutes:02}:{seconds:02}"),
        None => format!("{minutes}:{seconds:02}"),
    };

    Some(ParsedDuration {
        seconds: total,
        display,
    })
}

/// Formats whole seconds back into the normalized `PT#H#M#S` form.
pub fn format_iso(total: u64) -> String {
    if total == 0 {
        return "PT0S".to_string();
    }
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    let mut out = String::from("PT");
    if hours > 0 {
        out.push_str(&format!("{hours}H"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}M"));
    }
    if seconds > 0 {
        out.push_str(&format!("{seconds}S"));
    }
    out
}
