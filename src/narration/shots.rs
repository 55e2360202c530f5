// SYNOID Shot Records - Analysis Input Normalizer
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// The content-analysis service has handed us results in more than one shape
// over time. Everything is flattened into `ShotRecord`s here so the rest of
// the narration pipeline only ever sees one representation.

use crate::narration::error::{NarrationError, Result};
use crate::narration::timecode::parse_timecode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Shots shorter than this carry no usable information.
pub const MIN_SHOT_MS: u64 = 200;
/// Silent windows shorter than this are too short to narrate.
pub const MIN_SILENT_SHOT_MS: u64 = 3000;
/// Timestamps past one week are treated as corrupt.
pub const MAX_TIMESTAMP_MS: u64 = 7 * 24 * 3_600_000;

const START_KEYS: &[&str] = &["startTimeMs", "startTime", "start_ms", "StartTimeMs", "StartTime"];
const END_KEYS: &[&str] = &["endTimeMs", "endTime", "end_ms", "EndTimeMs", "EndTime"];

/// One analyzed shot of the source video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotRecord {
    pub start_ms: u64,
    pub end_ms: u64,
    pub draft_description: String,
    pub transcript_phrase_count: usize,
}

impl ShotRecord {
    pub fn new(start_ms: u64, end_ms: u64, draft_description: &str, transcript_phrase_count: usize) -> Self {
        Self {
            start_ms,
            end_ms,
            draft_description: draft_description.to_string(),
            transcript_phrase_count,
        }
    }

    /// No dialogue was detected during this shot.
    pub fn is_silent(&self) -> bool {
        self.transcript_phrase_count == 0
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }

    pub fn midpoint_ms(&self) -> f64 {
        self.start_ms as f64 + self.duration_ms() as f64 / 2.0
    }

    fn passes_duration_floor(&self) -> bool {
        let duration = self.duration_ms();
        duration >= MIN_SHOT_MS && (!self.is_silent() || duration >= MIN_SILENT_SHOT_MS)
    }
}

/// Flatten a raw analysis document into time-ordered shot records.
///
/// Accepts the analyzer envelope (`{result: {contents}}` / `{contents}`), a
/// bare array of contents or segments, and the generic field-array shape
/// (`fields.Segments.valueArray[].valueObject`). Shots below the duration
/// floors are dropped after validation.
pub fn normalize_shots(raw: &Value) -> Result<Vec<ShotRecord>> {
    let candidates = collect_candidates(raw);
    if candidates.is_empty() {
        return Err(NarrationError::Validation(
            "analysis contains no shot records".to_string(),
        ));
    }

    let mut shots = Vec::with_capacity(candidates.len());
    for (idx, candidate) in candidates.iter().enumerate() {
        match read_shot(candidate) {
            Some(shot) => {
                debug!(
                    "[NORMALIZE] Shot {}: {}-{} ({} ms) | {} | phrases={}",
                    idx + 1,
                    shot.start_ms,
                    shot.end_ms,
                    shot.duration_ms(),
                    if shot.is_silent() { "SILENT" } else { "SPEECH" },
                    shot.transcript_phrase_count
                );
                shots.push(shot);
            }
            None => warn!("[NORMALIZE] Record {} has no valid time range, skipping", idx + 1),
        }
    }

    if shots.is_empty() {
        return Err(NarrationError::Validation(format!(
            "none of the {} records carry a valid, non-empty time range",
            candidates.len()
        )));
    }

    shots.sort_by_key(|s| (s.start_ms, s.end_ms));

    let total = shots.len();
    shots.retain(ShotRecord::passes_duration_floor);
    info!(
        "[NORMALIZE] {} of {} shots kept after duration filtering",
        shots.len(),
        total
    );

    Ok(shots)
}

fn collect_candidates(raw: &Value) -> Vec<&Value> {
    match raw {
        Value::Array(items) => items.iter().flat_map(expand_content).collect(),
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                return collect_candidates(result);
            }
            if let Some(contents) = map.get("contents") {
                return collect_candidates(contents);
            }
            expand_content(raw)
        }
        _ => Vec::new(),
    }
}

/// A content either is a shot, or wraps a list of them.
fn expand_content(content: &Value) -> Vec<&Value> {
    if let Some(items) = content
        .pointer("/fields/Segments/valueArray")
        .and_then(Value::as_array)
    {
        return items
            .iter()
            .map(|item| item.get("valueObject").unwrap_or(item))
            .collect();
    }

    if read_time(content, START_KEYS).is_none() {
        if let Some(segments) = content.get("segments").and_then(Value::as_array) {
            return segments.iter().collect();
        }
    }

    vec![content]
}

fn read_shot(record: &Value) -> Option<ShotRecord> {
    let start_ms = read_time(record, START_KEYS)?;
    let end_ms = read_time(record, END_KEYS)?;
    if end_ms <= start_ms || end_ms > MAX_TIMESTAMP_MS {
        return None;
    }

    Some(ShotRecord {
        start_ms,
        end_ms,
        draft_description: read_description(record),
        transcript_phrase_count: read_phrase_count(record),
    })
}

/// Typed field values (`{type, valueString|valueNumber|valueInteger}`) are
/// unwrapped; plain values pass through.
fn unwrap_typed(value: &Value) -> &Value {
    if let Value::Object(map) = value {
        for key in ["valueString", "valueNumber", "valueInteger", "valueArray"] {
            if let Some(inner) = map.get(key) {
                return inner;
            }
        }
    }
    value
}

fn read_time(record: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .find_map(|value| value_to_ms(unwrap_typed(value)))
}

/// Numbers are milliseconds. Strings are milliseconds unless they contain
/// a colon, in which case they are timecodes.
fn value_to_ms(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => {
            if let Some(ms) = n.as_u64() {
                return Some(ms);
            }
            n.as_f64()
                .filter(|ms| ms.is_finite() && *ms >= 0.0)
                .map(|ms| ms.round() as u64)
        }
        Value::String(s) if s.contains(':') => parse_timecode(s),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|ms| ms.is_finite() && *ms >= 0.0)
            .map(|ms| ms.round() as u64),
        _ => None,
    }
}

fn read_description(record: &Value) -> String {
    let candidates = [
        record.pointer("/fields/description/valueString"),
        record.pointer("/fields/Description/valueString"),
        record.get("description").map(unwrap_typed),
        record.get("Description").map(unwrap_typed),
    ];

    candidates
        .into_iter()
        .flatten()
        .find_map(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn read_phrase_count(record: &Value) -> usize {
    for key in ["transcriptPhrases", "TranscriptPhrases"] {
        if let Some(phrases) = record.get(key).map(unwrap_typed).and_then(Value::as_array) {
            return phrases.len();
        }
    }

    for key in ["transcriptPhraseCount", "TranscriptPhraseCount"] {
        if let Some(count) = record.get(key).map(unwrap_typed).and_then(Value::as_u64) {
            return count as usize;
        }
    }

    0
}
