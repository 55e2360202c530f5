// SYNOID Narration Intervals - Silence Windows, Attachment, Merge & Split
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Narration may only play where nobody is talking. Silent shots become
// narration windows, speech shots donate their visual context to the closest
// window, and the windows are then merged and re-cut to a speakable length.
// Every stage takes a slice and returns a fresh list.

use crate::narration::shots::ShotRecord;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Merged windows longer than this get re-cut.
pub const MAX_INTERVAL_MS: u64 = 10_000;
/// Size of the chunks a long window is re-cut into.
pub const SPLIT_CHUNK_MS: u64 = 5_000;

/// A time window during which narration can play over silence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrationInterval {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

impl NarrationInterval {
    pub fn new(start_ms: u64, end_ms: u64, text: &str) -> Self {
        Self {
            start_ms,
            end_ms,
            text: text.to_string(),
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }

    fn midpoint_ms(&self) -> f64 {
        self.start_ms as f64 + self.duration_ms() as f64 / 2.0
    }

    /// Whitespace-separated words of the current text.
    pub fn words(&self) -> Vec<&str> {
        self.text.split_whitespace().collect()
    }
}

/// Silent and speech-bearing shots of one analysis run.
#[derive(Debug, Default)]
pub struct ClassifiedShots<'a> {
    pub silent: Vec<&'a ShotRecord>,
    pub speech: Vec<&'a ShotRecord>,
}

/// Split shots into silent ones and speech ones that carry a description.
/// Speech shots without any visual description have nothing to donate.
pub fn classify_shots(shots: &[ShotRecord]) -> ClassifiedShots<'_> {
    let mut classified = ClassifiedShots::default();
    for shot in shots {
        if shot.is_silent() {
            classified.silent.push(shot);
        } else if !shot.draft_description.trim().is_empty() {
            classified.speech.push(shot);
        }
    }
    classified
}

/// One seed interval per silent shot, range and description copied verbatim.
pub fn build_silent_intervals(silent: &[&ShotRecord]) -> Vec<NarrationInterval> {
    silent
        .iter()
        .map(|shot| NarrationInterval::new(shot.start_ms, shot.end_ms, &shot.draft_description))
        .collect()
}

/// Result of folding speech context into the silent windows.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub intervals: Vec<NarrationInterval>,
    /// Speech shots whose description had no window to go to.
    pub dropped: usize,
}

/// Fold each speech shot's description into the nearest silent interval.
///
/// Distance is directional: a window starting at or after the speech end is
/// measured from the speech end, an earlier one back from the speech start.
/// A negative distance means the two overlap, and the midpoint distance is
/// used instead. At equal distance a following window wins over a preceding
/// one, then the earliest window wins.
pub fn attach_speech_context(
    intervals: &[NarrationInterval],
    speech: &[&ShotRecord],
) -> Attachment {
    let mut intervals = intervals.to_vec();
    let mut dropped = 0;

    for shot in speech {
        let description = shot.draft_description.trim();
        let Some(idx) = nearest_interval(&intervals, shot) else {
            warn!(
                "[INTERVALS] No silent window for speech at {}-{}; dropping its visual context",
                shot.start_ms, shot.end_ms
            );
            dropped += 1;
            continue;
        };

        let target = &mut intervals[idx];
        if target.text.contains(description) {
            continue;
        }
        target.text = join_text(&target.text, description);
        debug!(
            "[INTERVALS] Speech {}-{} attached to window {}-{}",
            shot.start_ms, shot.end_ms, target.start_ms, target.end_ms
        );
    }

    Attachment { intervals, dropped }
}

fn nearest_interval(intervals: &[NarrationInterval], speech: &ShotRecord) -> Option<usize> {
    let speech_mid = speech.midpoint_ms();
    let mut best: Option<(f64, u8, usize)> = None;

    for (idx, interval) in intervals.iter().enumerate() {
        let is_after = interval.start_ms >= speech.end_ms;
        let mut distance = if is_after {
            interval.start_ms as f64 - speech.end_ms as f64
        } else {
            speech.start_ms as f64 - interval.end_ms as f64
        };
        if distance < 0.0 {
            distance = (interval.midpoint_ms() - speech_mid).abs();
        }

        let rank = if is_after { 0 } else { 1 };
        let better = match best {
            None => true,
            Some((best_distance, best_rank, _)) => {
                distance < best_distance || (distance == best_distance && rank < best_rank)
            }
        };
        if better {
            best = Some((distance, rank, idx));
        }
    }

    best.map(|(_, _, idx)| idx)
}

fn join_text(existing: &str, addition: &str) -> String {
    let existing = existing.trim();
    let addition = addition.trim();
    match (existing.is_empty(), addition.is_empty()) {
        (true, _) => addition.to_string(),
        (_, true) => existing.to_string(),
        _ => format!("{} {}", existing, addition),
    }
}

/// Merge intervals whose start meets or falls inside the previous one.
/// Input must be sorted by start.
///
/// Exactly adjacent windows join end to end; overlapping or duplicate
/// windows coalesce into one running window. Text identical to the window
/// so far, or to the window just folded in, is not repeated. Running this
/// on its own output is a no-op.
pub fn merge_adjacent(intervals: &[NarrationInterval]) -> Vec<NarrationInterval> {
    let mut merged: Vec<NarrationInterval> = Vec::with_capacity(intervals.len());
    let mut previous_text = "";

    for interval in intervals {
        match merged.last_mut() {
            Some(current) if interval.start_ms <= current.end_ms => {
                if interval.start_ms < current.end_ms {
                    debug!(
                        "[INTERVALS] Window {}-{} overlaps {}-{}, coalescing",
                        interval.start_ms, interval.end_ms, current.start_ms, current.end_ms
                    );
                }
                current.end_ms = current.end_ms.max(interval.end_ms);
                let incoming = interval.text.trim();
                if !incoming.is_empty() && incoming != current.text.trim() && incoming != previous_text {
                    current.text = join_text(&current.text, incoming);
                }
            }
            _ => merged.push(interval.clone()),
        }
        previous_text = interval.text.trim();
    }

    merged
}

/// Re-cut every interval longer than `max_interval_ms` into consecutive
/// chunks of at most `chunk_ms`.
///
/// Words are handed out in order, each chunk taking
/// `ceil(total_words * chunk / total)` from a shared cursor, so the chunks
/// together hold exactly the original word sequence.
pub fn split_long_intervals(
    intervals: &[NarrationInterval],
    max_interval_ms: u64,
    chunk_ms: u64,
) -> Vec<NarrationInterval> {
    let chunk_ms = chunk_ms.max(1);
    let mut result = Vec::with_capacity(intervals.len());

    for interval in intervals {
        let total_ms = interval.duration_ms();
        if total_ms <= max_interval_ms {
            result.push(interval.clone());
            continue;
        }

        let words = interval.words();
        let total_words = words.len() as u64;
        let mut cursor = 0usize;
        let mut chunk_start = interval.start_ms;

        while chunk_start < interval.end_ms {
            let chunk_end = chunk_start.saturating_add(chunk_ms).min(interval.end_ms);
            let chunk_duration = chunk_end - chunk_start;
            let share = (total_words * chunk_duration).div_ceil(total_ms) as usize;

            let take_end = (cursor + share).min(words.len());
            let text = words[cursor..take_end].join(" ");
            cursor = take_end;

            result.push(NarrationInterval {
                start_ms: chunk_start,
                end_ms: chunk_end,
                text,
            });
            chunk_start = chunk_end;
        }

        debug!(
            "[INTERVALS] Split {}-{} ({} words) into {} ms chunks",
            interval.start_ms, interval.end_ms, total_words, chunk_ms
        );
    }

    result
}

/// The full interval construction: classify, seed, attach, merge, split.
#[derive(Debug, Clone)]
pub struct IntervalPlan {
    pub intervals: Vec<NarrationInterval>,
    pub dropped_attachments: usize,
}

pub fn build_intervals(shots: &[ShotRecord], max_interval_ms: u64, chunk_ms: u64) -> IntervalPlan {
    let classified = classify_shots(shots);
    let seeds = build_silent_intervals(&classified.silent);
    let attachment = attach_speech_context(&seeds, &classified.speech);
    let merged = merge_adjacent(&attachment.intervals);
    let intervals = split_long_intervals(&merged, max_interval_ms, chunk_ms);

    info!(
        "[INTERVALS] {} silent / {} speech shots -> {} merged -> {} narration intervals",
        classified.silent.len(),
        classified.speech.len(),
        merged.len(),
        intervals.len()
    );

    IntervalPlan {
        intervals,
        dropped_attachments: attachment.dropped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(start: u64, end: u64, text: &str) -> NarrationInterval {
        NarrationInterval::new(start, end, text)
    }

    #[test]
    fn test_dog_barks_scenario() {
        let shots = vec![
            ShotRecord::new(0, 2000, "", 0),
            ShotRecord::new(2000, 3200, "dog barks", 1),
            ShotRecord::new(3200, 9000, "", 0),
        ];

        let classified = classify_shots(&shots);
        assert_eq!(classified.silent.len(), 2);
        assert_eq!(classified.speech.len(), 1);

        let seeds = build_silent_intervals(&classified.silent);
        let attached = attach_speech_context(&seeds, &classified.speech);
        assert_eq!(attached.dropped, 0);
        assert_eq!(attached.intervals[0].text, "");
        assert_eq!(attached.intervals[1].text, "dog barks");

        let merged = merge_adjacent(&attached.intervals);
        assert_eq!(merged.len(), 2, "0-2000 and 3200-9000 are not adjacent");

        let split = split_long_intervals(&merged, MAX_INTERVAL_MS, SPLIT_CHUNK_MS);
        assert_eq!(split, merged);
    }

    #[test]
    fn test_attachment_prefers_closest_window() {
        let seeds = vec![interval(0, 4000, "before"), interval(20_000, 25_000, "far after")];
        let speech = ShotRecord::new(5000, 6000, "a car passes", 2);

        let attached = attach_speech_context(&seeds, &[&speech]);
        assert_eq!(attached.intervals[0].text, "before a car passes");
        assert_eq!(attached.intervals[1].text, "far after");
    }

    #[test]
    fn test_attachment_overlap_falls_back_to_midpoints() {
        // Both windows overlap the speech shot, so directional distances go negative.
        let seeds = vec![interval(0, 6000, "left"), interval(5000, 12_000, "right")];
        let speech = ShotRecord::new(4000, 7000, "overlap", 1);

        let attached = attach_speech_context(&seeds, &[&speech]);
        // speech mid 5500, left mid 3000 (2500 away), right mid 8500 (3000 away)
        assert_eq!(attached.intervals[0].text, "left overlap");
    }

    #[test]
    fn test_attachment_skips_duplicate_text() {
        let seeds = vec![interval(0, 4000, "A cat sleeps.")];
        let speech = ShotRecord::new(4000, 5000, "A cat sleeps.", 1);

        let once = attach_speech_context(&seeds, &[&speech]);
        let twice = attach_speech_context(&once.intervals, &[&speech]);
        assert_eq!(twice.intervals[0].text, "A cat sleeps.");
    }

    #[test]
    fn test_attachment_without_windows_drops_context() {
        let speech = ShotRecord::new(0, 1000, "lonely", 1);
        let attached = attach_speech_context(&[], &[&speech]);
        assert!(attached.intervals.is_empty());
        assert_eq!(attached.dropped, 1);
    }

    #[test]
    fn test_merge_adjacent_intervals() {
        let intervals = vec![
            interval(0, 3000, "one"),
            interval(3000, 6000, "one"),
            interval(6000, 9000, "two"),
            interval(9500, 12_000, "three"),
        ];

        let merged = merge_adjacent(&intervals);
        assert_eq!(merged, vec![interval(0, 9000, "one two"), interval(9500, 12_000, "three")]);
        assert_eq!(merge_adjacent(&merged), merged);
    }

    #[test]
    fn test_merge_coalesces_overlapping_and_duplicate_windows() {
        let intervals = vec![
            interval(0, 6000, "A"),
            interval(4000, 9000, "B"),
            interval(4000, 9000, "B"),
            interval(5000, 7000, "C"),
            interval(12_000, 15_000, "D"),
        ];

        let merged = merge_adjacent(&intervals);
        assert_eq!(merged, vec![interval(0, 9000, "A B C"), interval(12_000, 15_000, "D")]);
        assert_eq!(merge_adjacent(&merged), merged);
    }

    #[test]
    fn test_split_near_end_of_time_range() {
        let start = u64::MAX - 12_000;
        let long = vec![interval(start, u64::MAX, "far away")];
        let chunks = split_long_intervals(&long, MAX_INTERVAL_MS, SPLIT_CHUNK_MS);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].end_ms, u64::MAX);
        assert!(chunks.windows(2).all(|w| w[0].end_ms == w[1].start_ms));
    }

    #[test]
    fn test_split_thirteen_seconds() {
        let long = vec![interval(0, 13_000, "A B C D E F G H I J")];
        let chunks = split_long_intervals(&long, MAX_INTERVAL_MS, SPLIT_CHUNK_MS);

        assert_eq!(
            chunks,
            vec![
                interval(0, 5000, "A B C D"),
                interval(5000, 10_000, "E F G H"),
                interval(10_000, 13_000, "I J"),
            ]
        );
    }

    #[test]
    fn test_split_leaves_exactly_max_alone() {
        let edge = vec![interval(0, MAX_INTERVAL_MS, "x y z")];
        assert_eq!(split_long_intervals(&edge, MAX_INTERVAL_MS, SPLIT_CHUNK_MS), edge);
    }

    #[test]
    fn test_split_conserves_duration_and_words() {
        let text = "the quick brown fox jumps over the lazy dog while rain falls on the old tin roof";
        for end in [10_001u64, 12_345, 17_000, 31_999, 60_000] {
            let source = interval(1000, 1000 + end, text);
            let chunks = split_long_intervals(&[source.clone()], MAX_INTERVAL_MS, SPLIT_CHUNK_MS);

            let total: u64 = chunks.iter().map(NarrationInterval::duration_ms).sum();
            assert_eq!(total, source.duration_ms());
            assert!(chunks.iter().all(|c| c.duration_ms() <= SPLIT_CHUNK_MS));
            assert!(chunks.windows(2).all(|w| w[0].end_ms == w[1].start_ms));

            let rebuilt: Vec<&str> = chunks.iter().flat_map(|c| c.words()).collect();
            assert_eq!(rebuilt, source.words());
        }
    }

    #[test]
    fn test_build_intervals_is_non_overlapping() {
        let shots = vec![
            ShotRecord::new(0, 4000, "Morning light.", 0),
            ShotRecord::new(4000, 9000, "A kettle boils.", 0),
            ShotRecord::new(9000, 12_000, "She pours tea.", 2),
            ShotRecord::new(12_000, 30_000, "Steam rises over the garden.", 0),
        ];

        let plan = build_intervals(&shots, MAX_INTERVAL_MS, SPLIT_CHUNK_MS);
        assert!(plan
            .intervals
            .windows(2)
            .all(|w| w[0].end_ms <= w[1].start_ms));
        assert!(plan.intervals.iter().all(|i| i.end_ms > i.start_ms));
        assert_eq!(plan.dropped_attachments, 0);
    }
}
