// SYNOID Rewrite Orchestrator - Budget-Constrained Narration Rewriting
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Every interval's draft is sent to the rewrite service until the answer
// lands inside its word budget. Intervals are processed strictly in order:
// each request carries the last accepted rewrites, so interval i+1 cannot
// start before interval i has settled.

use crate::narration::budget::{count_words, LanguageProfile, PlannedInterval, WordBudget};
use crate::narration::error::{NarrationError, Result};
use crate::narration::intervals::NarrationInterval;
use crate::narration::prompt::{ChatMessage, RewriteRequest};
use crate::narration::retry::{call_with_transport_retry, TransportRetryPolicy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The external generative text service. One call, no retries; retry
/// policies are layered on top by the orchestrator.
#[async_trait]
pub trait RewriteService: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// The `{text, wordCount}` shape the contract asks for.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RewriteResponse {
    #[serde(alias = "description")]
    pub text: String,
    #[serde(rename = "wordCount")]
    pub claimed_word_count: u64,
}

/// A response reduced to what the orchestrator needs. The word count is
/// always recounted; the model's claim is kept for logging only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRewrite {
    pub text: String,
    pub actual_word_count: usize,
    pub claimed_word_count: Option<u64>,
}

impl ParsedRewrite {
    /// Plain-text fallback was used instead of the JSON contract.
    pub fn is_malformed(&self) -> bool {
        self.claimed_word_count.is_none()
    }
}

/// Contract-shaped JSON is taken at its word even when `text` is empty;
/// anything else is treated as plain narration text.
pub fn parse_rewrite_response(raw: &str) -> ParsedRewrite {
    let trimmed = raw.trim();
    let body = strip_code_fence(trimmed);

    match serde_json::from_str::<RewriteResponse>(body) {
        Ok(response) => {
            let text = response.text.trim().to_string();
            ParsedRewrite {
                actual_word_count: count_words(&text),
                claimed_word_count: Some(response.claimed_word_count),
                text,
            }
        }
        _ => ParsedRewrite {
            text: trimmed.to_string(),
            actual_word_count: count_words(trimmed),
            claimed_word_count: None,
        },
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetRetryPolicy {
    /// Total attempts per interval, first call included.
    pub max_attempts: u32,
}

impl Default for BudgetRetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 7 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RewriteOutcome {
    /// Landed inside the budget tolerance.
    Accepted { attempts: u32 },
    /// Never landed; the last text received is kept.
    Exhausted { attempts: u32 },
    /// The service never produced any text for this interval.
    Skipped { reason: String },
}

impl RewriteOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, RewriteOutcome::Accepted { .. })
    }
}

/// Video-level settings shared by every request of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteContext {
    pub language: String,
    /// Resolved profile for `language`; supplies the house-style instruction.
    pub profile: LanguageProfile,
    pub narration_style: String,
    pub title: String,
    pub context: String,
}

/// A final interval after its rewrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewrittenInterval {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
    pub draft_text: String,
    pub budget: WordBudget,
    pub actual_word_count: usize,
    pub outcome: RewriteOutcome,
}

impl RewrittenInterval {
    pub fn to_interval(&self) -> NarrationInterval {
        NarrationInterval::new(self.start_ms, self.end_ms, &self.text)
    }
}

#[derive(Debug, Clone)]
pub struct RewriteRun {
    /// Rewritten intervals in time order. On cancellation this is the
    /// processed prefix only.
    pub intervals: Vec<RewrittenInterval>,
    pub cancelled: bool,
}

/// Result of settling one interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalRewrite {
    pub text: String,
    pub actual_word_count: usize,
    pub outcome: RewriteOutcome,
}

pub struct RewriteOrchestrator {
    service: Arc<dyn RewriteService>,
    transport: TransportRetryPolicy,
    budget_retry: BudgetRetryPolicy,
    /// How many previous rewrites each request carries.
    history_window: usize,
}

impl RewriteOrchestrator {
    pub fn new(
        service: Arc<dyn RewriteService>,
        transport: TransportRetryPolicy,
        budget_retry: BudgetRetryPolicy,
    ) -> Self {
        Self {
            service,
            transport,
            budget_retry,
            history_window: 3,
        }
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    /// Settle one interval. Only cancellation is returned as an error;
    /// transport failures degrade to the best text seen so far.
    pub async fn rewrite_interval(
        &self,
        request: &RewriteRequest,
        profile: &LanguageProfile,
        budget: &WordBudget,
        cancel: &CancellationToken,
    ) -> Result<IntervalRewrite> {
        let messages = request.to_messages(profile);
        let max_attempts = self.budget_retry.max_attempts.max(1);
        let mut last: Option<ParsedRewrite> = None;

        for attempt in 1..=max_attempts {
            let call = call_with_transport_retry("rewrite", &self.transport, cancel, || {
                self.service.complete(&messages)
            })
            .await;

            let raw = match call {
                Ok(raw) => raw,
                Err(NarrationError::Cancelled) => return Err(NarrationError::Cancelled),
                Err(err) => {
                    warn!("[REWRITE] Giving up on interval after transport failure: {}", err);
                    return Ok(match last {
                        Some(parsed) => IntervalRewrite {
                            text: parsed.text,
                            actual_word_count: parsed.actual_word_count,
                            outcome: RewriteOutcome::Exhausted { attempts: attempt - 1 },
                        },
                        None => IntervalRewrite {
                            text: String::new(),
                            actual_word_count: 0,
                            outcome: RewriteOutcome::Skipped {
                                reason: err.to_string(),
                            },
                        },
                    });
                }
            };

            let parsed = parse_rewrite_response(&raw);
            if parsed.text.is_empty() {
                debug!("[REWRITE] Attempt {}/{}: empty text, retrying", attempt, max_attempts);
                continue;
            }
            if parsed.is_malformed() {
                debug!("[REWRITE] Attempt {}: response not in contract shape, using plain text", attempt);
            }

            if budget.accepts(parsed.actual_word_count) {
                return Ok(IntervalRewrite {
                    text: parsed.text,
                    actual_word_count: parsed.actual_word_count,
                    outcome: RewriteOutcome::Accepted { attempts: attempt },
                });
            }

            debug!(
                "[REWRITE] Attempt {}/{}: {} words (claimed {:?}), target {} ±{}",
                attempt,
                max_attempts,
                parsed.actual_word_count,
                parsed.claimed_word_count,
                budget.target,
                budget.tolerance
            );
            last = Some(parsed);
        }

        Ok(match last {
            Some(parsed) => IntervalRewrite {
                text: parsed.text,
                actual_word_count: parsed.actual_word_count,
                outcome: RewriteOutcome::Exhausted {
                    attempts: max_attempts,
                },
            },
            None => {
                warn!("[REWRITE] No usable text after {} attempt(s)", max_attempts);
                IntervalRewrite {
                    text: String::new(),
                    actual_word_count: 0,
                    outcome: RewriteOutcome::Skipped {
                        reason: format!("no usable text after {} attempt(s)", max_attempts),
                    },
                }
            }
        })
    }

    /// Rewrite all planned intervals in order. `on_progress` is called with
    /// (done, total) after each interval settles.
    pub async fn rewrite_all(
        &self,
        planned: &[PlannedInterval],
        context: &RewriteContext,
        cancel: &CancellationToken,
        on_progress: Option<&(dyn Fn(usize, usize) + Send + Sync)>,
    ) -> RewriteRun {
        let mut history: VecDeque<String> = VecDeque::with_capacity(self.history_window);
        let mut intervals = Vec::with_capacity(planned.len());

        for (idx, item) in planned.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("[REWRITE] Cancelled after {} of {} intervals", idx, planned.len());
                return RewriteRun {
                    intervals,
                    cancelled: true,
                };
            }

            let next_draft_text = planned
                .get(idx + 1)
                .map(|next| next.interval.text.clone())
                .unwrap_or_default();

            let request = RewriteRequest {
                target_word_count: item.budget.target,
                max_words: item.budget.max_words,
                language: context.language.clone(),
                narration_style: context.narration_style.clone(),
                title: context.title.clone(),
                context: context.context.clone(),
                previous_rewrites: history.iter().cloned().collect(),
                draft_text: item.interval.text.clone(),
                next_draft_text,
            };

            let settled = match self.rewrite_interval(&request, &context.profile, &item.budget, cancel).await {
                Ok(settled) => settled,
                Err(_) => {
                    info!("[REWRITE] Cancelled during interval {} of {}", idx + 1, planned.len());
                    return RewriteRun {
                        intervals,
                        cancelled: true,
                    };
                }
            };

            match &settled.outcome {
                RewriteOutcome::Accepted { attempts } => info!(
                    "[REWRITE] Interval {}/{} accepted: {} words (target {}) after {} attempt(s)",
                    idx + 1,
                    planned.len(),
                    settled.actual_word_count,
                    item.budget.target,
                    attempts
                ),
                RewriteOutcome::Exhausted { attempts } => warn!(
                    "[REWRITE] Interval {}/{} missed budget: {} words (target {} ±{}) after {} attempt(s)",
                    idx + 1,
                    planned.len(),
                    settled.actual_word_count,
                    item.budget.target,
                    item.budget.tolerance,
                    attempts
                ),
                RewriteOutcome::Skipped { reason } => {
                    warn!("[REWRITE] Interval {}/{} skipped: {}", idx + 1, planned.len(), reason)
                }
            }

            if !settled.text.is_empty() && self.history_window > 0 {
                if history.len() == self.history_window {
                    history.pop_front();
                }
                history.push_back(settled.text.clone());
            }

            intervals.push(RewrittenInterval {
                start_ms: item.interval.start_ms,
                end_ms: item.interval.end_ms,
                text: settled.text,
                draft_text: item.interval.text.clone(),
                budget: item.budget,
                actual_word_count: settled.actual_word_count,
                outcome: settled.outcome,
            });

            if let Some(report) = on_progress {
                report(idx + 1, planned.len());
            }
        }

        RewriteRun {
            intervals,
            cancelled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narration::budget::{default_language_table, lookup_language};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedService {
        reply: String,
        calls: AtomicU32,
    }

    #[async_trait]
    impl RewriteService for FixedService {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    fn budget(target: u32) -> WordBudget {
        WordBudget {
            raw: target,
            min_words: 3,
            max_words: 50,
            target,
            tolerance: 2,
        }
    }

    fn english() -> LanguageProfile {
        lookup_language(&default_language_table(), "en-US").unwrap().clone()
    }

    fn request() -> RewriteRequest {
        RewriteRequest {
            target_word_count: 5,
            max_words: 50,
            language: "en-US".to_string(),
            narration_style: String::new(),
            title: String::new(),
            context: String::new(),
            previous_rewrites: vec![],
            draft_text: "A dog runs.".to_string(),
            next_draft_text: String::new(),
        }
    }

    #[test]
    fn test_parse_structured_response() {
        let parsed = parse_rewrite_response(r#"{"text": "A dog runs across the yard.", "wordCount": 9}"#);
        assert_eq!(parsed.text, "A dog runs across the yard.");
        assert_eq!(parsed.actual_word_count, 6, "Claimed count must not be trusted");
        assert_eq!(parsed.claimed_word_count, Some(9));
    }

    #[test]
    fn test_parse_legacy_description_key_and_fence() {
        let raw = "```json\n{\"description\": \"Snow falls.\", \"wordCount\": 2}\n```";
        let parsed = parse_rewrite_response(raw);
        assert_eq!(parsed.text, "Snow falls.");
        assert!(!parsed.is_malformed());
    }

    #[test]
    fn test_parse_falls_back_to_plain_text() {
        let parsed = parse_rewrite_response("  Snow falls on the quiet town.  ");
        assert!(parsed.is_malformed());
        assert_eq!(parsed.text, "Snow falls on the quiet town.");
        assert_eq!(parsed.actual_word_count, 6);

        let wrong_shape = parse_rewrite_response(r#"{"text": "Snow", "wordCount": "one"}"#);
        assert!(wrong_shape.is_malformed());
    }

    #[test]
    fn test_parse_empty_contract_text_is_not_narration() {
        let parsed = parse_rewrite_response(r#"{"text": "  ", "wordCount": 0}"#);
        assert!(!parsed.is_malformed());
        assert_eq!(parsed.text, "");
        assert_eq!(parsed.actual_word_count, 0);
    }

    #[tokio::test]
    async fn test_empty_text_replies_end_in_skip() {
        let service = Arc::new(FixedService {
            reply: r#"{"text": "", "wordCount": 0}"#.to_string(),
            calls: AtomicU32::new(0),
        });
        let orchestrator = RewriteOrchestrator::new(
            service.clone(),
            TransportRetryPolicy::default(),
            BudgetRetryPolicy { max_attempts: 4 },
        );

        let settled = orchestrator
            .rewrite_interval(&request(), &english(), &budget(2), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(settled.outcome, RewriteOutcome::Skipped { .. }));
        assert_eq!(settled.text, "");
        assert_eq!(service.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_accepts_within_tolerance_on_first_call() {
        let service = Arc::new(FixedService {
            reply: r#"{"text": "one two three four five six", "wordCount": 6}"#.to_string(),
            calls: AtomicU32::new(0),
        });
        let orchestrator = RewriteOrchestrator::new(
            service.clone(),
            TransportRetryPolicy::default(),
            BudgetRetryPolicy::default(),
        );

        let settled = orchestrator
            .rewrite_interval(&request(), &english(), &budget(5), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(settled.outcome, RewriteOutcome::Accepted { attempts: 1 });
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausts_and_keeps_last_text() {
        let service = Arc::new(FixedService {
            reply: "far too short".to_string(),
            calls: AtomicU32::new(0),
        });
        let orchestrator = RewriteOrchestrator::new(
            service.clone(),
            TransportRetryPolicy::default(),
            BudgetRetryPolicy { max_attempts: 3 },
        );

        let settled = orchestrator
            .rewrite_interval(&request(), &english(), &budget(20), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(settled.outcome, RewriteOutcome::Exhausted { attempts: 3 });
        assert_eq!(settled.text, "far too short");
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
    }
}
