// SYNOID Timecodes
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// "HH:MM:SS.mmm" <-> milliseconds. The player application stores interval
// bounds as these strings, so both the legacy input shape and the legacy
// export go through here.

/// Format milliseconds as `HH:MM:SS.mmm`.
pub fn format_timecode(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let mins = (ms % 3_600_000) / 60_000;
    let secs = (ms % 60_000) / 1000;
    let millis = ms % 1000;

    format!("{:02}:{:02}:{:02}.{:03}", hours, mins, secs, millis)
}

/// Parse `HH:MM:SS.mmm`, `MM:SS.mmm` or `SS.mmm` into milliseconds.
///
/// Returns `None` for anything that isn't a non-negative timecode.
pub fn parse_timecode(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() > 3 {
        return None;
    }

    let (secs_part, rest) = parts.split_last()?;
    let seconds: f64 = secs_part.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }

    let mut whole_units: u64 = 0;
    for part in rest {
        let value: u64 = part.parse().ok()?;
        whole_units = whole_units.checked_mul(60)?.checked_add(value)?;
    }

    let total_ms = whole_units as f64 * 60_000.0 + seconds * 1000.0;
    Some(total_ms.round() as u64)
}
