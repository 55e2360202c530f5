// SYNOID Word Budget - Language-Aware Narration Length
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// How many words fit in a silent window depends on how fast the narrator
// speaks the target language. The rates below were tuned by ear, so a new
// language needs its own calibration before it is added here.

use crate::narration::intervals::NarrationInterval;
use crate::narration::prompt::{SYSTEM_AR, SYSTEM_EN, SYSTEM_ES, SYSTEM_FR};
use crate::narration::shots::ShotRecord;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Speaking-rate and tolerance constants for one narration language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageProfile {
    pub code: String,
    pub words_per_second: f64,
    /// Floor on the target, raised for scripts that need more tokens.
    pub min_words: u32,
    /// Accepted distance between target and actual word count.
    pub tolerance: u32,
    /// House-style instruction in this language. English when absent.
    #[serde(default)]
    pub system_instruction: Option<String>,
}

impl LanguageProfile {
    fn new(code: &str, words_per_second: f64, min_words: u32, tolerance: u32, instruction: &str) -> Self {
        Self {
            code: code.to_string(),
            words_per_second,
            min_words,
            tolerance,
            system_instruction: Some(instruction.to_string()),
        }
    }
}

pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Built-in language table.
pub fn default_language_table() -> Vec<LanguageProfile> {
    vec![
        LanguageProfile::new("en-US", 3.0, 3, 2, SYSTEM_EN),
        LanguageProfile::new("ar-SA", 2.5, 8, 4, SYSTEM_AR),
        LanguageProfile::new("ar-EG", 2.5, 8, 4, SYSTEM_AR),
        LanguageProfile::new("es-ES", 3.2, 3, 2, SYSTEM_ES),
        LanguageProfile::new("fr-FR", 2.8, 3, 2, SYSTEM_FR),
    ]
}

/// Find the profile for `code`: exact match, then primary subtag, then the
/// English default.
pub fn lookup_language<'a>(table: &'a [LanguageProfile], code: &str) -> Option<&'a LanguageProfile> {
    if let Some(profile) = table.iter().find(|p| p.code.eq_ignore_ascii_case(code)) {
        return Some(profile);
    }

    let primary = primary_subtag(code);
    if let Some(profile) = table.iter().find(|p| primary_subtag(&p.code).eq_ignore_ascii_case(primary)) {
        warn!("[BUDGET] No profile for '{}', using '{}'", code, profile.code);
        return Some(profile);
    }

    warn!("[BUDGET] Unknown language '{}', falling back to {}", code, DEFAULT_LANGUAGE);
    table.iter().find(|p| p.code == DEFAULT_LANGUAGE).or_else(|| table.first())
}

fn primary_subtag(code: &str) -> &str {
    code.split(['-', '_']).next().unwrap_or(code)
}

/// Positional and context adjustments applied on top of the language table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetPolicy {
    pub base_min_words: u32,
    pub base_max_words: u32,
    /// The first intervals set the scene and get a higher floor.
    pub context_setting_intervals: usize,
    pub context_setting_min_words: u32,
    /// Shots with fewer phrases than this lean on the visuals.
    pub sparse_dialogue_phrases: usize,
    pub sparse_dialogue_min_words: u32,
    /// `max_words` never grows past this, whatever the draft length.
    pub hard_max_words: u32,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            base_min_words: 3,
            base_max_words: 50,
            context_setting_intervals: 3,
            context_setting_min_words: 14,
            sparse_dialogue_phrases: 2,
            sparse_dialogue_min_words: 10,
            hard_max_words: 120,
        }
    }
}

/// Inputs describing one final interval.
#[derive(Debug, Clone, Copy)]
pub struct BudgetInput<'a> {
    pub index: usize,
    pub duration_ms: u64,
    pub draft_text: &'a str,
    /// Phrase count of the input shot with the exact same time range, if any.
    pub origin_phrase_count: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordBudget {
    pub raw: u32,
    pub min_words: u32,
    pub max_words: u32,
    pub target: u32,
    pub tolerance: u32,
}

impl WordBudget {
    pub fn accepts(&self, actual_words: usize) -> bool {
        (actual_words as i64 - self.target as i64).unsigned_abs() <= self.tolerance as u64
    }
}

pub fn compute_word_budget(
    input: BudgetInput<'_>,
    language: &LanguageProfile,
    policy: &BudgetPolicy,
) -> WordBudget {
    let duration_s = input.duration_ms as f64 / 1000.0;
    let raw = (duration_s * language.words_per_second).floor().max(0.0) as u32;

    let mut min_words = policy.base_min_words.max(language.min_words);
    if input.index < policy.context_setting_intervals {
        min_words = min_words.max(policy.context_setting_min_words);
    }
    if let Some(phrases) = input.origin_phrase_count {
        if phrases < policy.sparse_dialogue_phrases {
            min_words = min_words.max(policy.sparse_dialogue_min_words);
        }
    }

    let draft_words = count_words(input.draft_text) as u32;
    let mut max_words = policy.base_max_words;
    if draft_words > max_words {
        max_words = draft_words.min(policy.hard_max_words.max(policy.base_max_words));
    }
    let min_words = min_words.min(max_words);

    WordBudget {
        raw,
        min_words,
        max_words,
        target: raw.clamp(min_words, max_words),
        tolerance: language.tolerance,
    }
}

/// A final interval with its word budget, ready to be rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedInterval {
    #[serde(flatten)]
    pub interval: NarrationInterval,
    pub budget: WordBudget,
}

/// Budget every final interval. The originating shot is the input shot with
/// the exact same time range; merged or split intervals have none.
pub fn plan_budgets(
    intervals: &[NarrationInterval],
    shots: &[ShotRecord],
    language: &LanguageProfile,
    policy: &BudgetPolicy,
) -> Vec<PlannedInterval> {
    intervals
        .iter()
        .enumerate()
        .map(|(index, interval)| {
            let origin_phrase_count = shots
                .iter()
                .find(|s| s.start_ms == interval.start_ms && s.end_ms == interval.end_ms)
                .map(|s| s.transcript_phrase_count);

            let budget = compute_word_budget(
                BudgetInput {
                    index,
                    duration_ms: interval.duration_ms(),
                    draft_text: &interval.text,
                    origin_phrase_count,
                },
                language,
                policy,
            );
            debug!(
                "[BUDGET] Interval {} ({}-{}): raw={} target={} [{}, {}] ±{}",
                index + 1,
                interval.start_ms,
                interval.end_ms,
                budget.raw,
                budget.target,
                budget.min_words,
                budget.max_words,
                budget.tolerance
            );

            PlannedInterval {
                interval: interval.clone(),
                budget,
            }
        })
        .collect()
}

/// Words as the narrator will speak them: whitespace-separated tokens.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}
