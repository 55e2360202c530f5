// SYNOID Narration Pipeline - Shots In, Timed Narration Out
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Runs one narration job end to end:
//   Normalize -> Build Intervals -> Budget -> Rewrite
// The first three stages are pure and can be run alone (`plan_narration`);
// only the rewrite stage talks to the network.

use crate::narration::budget::{lookup_language, plan_budgets, PlannedInterval};
use crate::narration::config::NarrationConfig;
use crate::narration::error::{NarrationError, Result};
use crate::narration::intervals::{build_intervals, NarrationInterval};
use crate::narration::rewrite::{
    RewriteContext, RewriteOrchestrator, RewriteOutcome, RewriteService, RewrittenInterval,
};
use crate::narration::shots::normalize_shots;
use crate::narration::timecode::format_timecode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Normalize,
    BuildIntervals,
    Budget,
    Rewrite,
}

impl PipelineStage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Normalize => "normalize",
            Self::BuildIntervals => "build_intervals",
            Self::Budget => "budget",
            Self::Rewrite => "rewrite",
        }
    }
}

/// Per-job creative options. Empty strings mean "not provided".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NarrationOptions {
    pub language: Option<String>,
    pub narration_style: String,
    pub title: String,
    pub context: String,
}

/// Output of the pure stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrationPlan {
    pub language: String,
    pub shot_count: usize,
    pub intervals: Vec<PlannedInterval>,
    pub dropped_attachments: usize,
}

/// Normalize, build intervals and assign budgets. No I/O.
pub fn plan_narration(raw: &serde_json::Value, language: &str, config: &NarrationConfig) -> Result<NarrationPlan> {
    let profile = lookup_language(&config.languages, language)
        .ok_or_else(|| NarrationError::Config("language table is empty".to_string()))?;

    let shots = normalize_shots(raw)?;
    let interval_plan = build_intervals(&shots, config.max_interval_ms, config.split_chunk_ms);
    let intervals = plan_budgets(&interval_plan.intervals, &shots, profile, &config.budget);

    Ok(NarrationPlan {
        language: language.to_string(),
        shot_count: shots.len(),
        intervals,
        dropped_attachments: interval_plan.dropped_attachments,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrationReport {
    pub total_intervals: usize,
    pub accepted: usize,
    pub exhausted: usize,
    pub skipped: usize,
    pub dropped_attachments: usize,
    pub cancelled: bool,
    pub warnings: Vec<String>,
}

impl NarrationReport {
    fn build(intervals: &[RewrittenInterval], planned: usize, dropped_attachments: usize, cancelled: bool) -> Self {
        let mut report = NarrationReport {
            total_intervals: planned,
            dropped_attachments,
            cancelled,
            ..Default::default()
        };

        if dropped_attachments > 0 {
            report.warnings.push(format!(
                "{} speech shot(s) had no silent window and their context was dropped",
                dropped_attachments
            ));
        }

        for item in intervals {
            let span = format!("{}-{}", format_timecode(item.start_ms), format_timecode(item.end_ms));
            match &item.outcome {
                RewriteOutcome::Accepted { .. } => report.accepted += 1,
                RewriteOutcome::Exhausted { attempts } => {
                    report.exhausted += 1;
                    report.warnings.push(format!(
                        "{} missed its budget: {} words vs target {} ±{} after {} attempt(s)",
                        span, item.actual_word_count, item.budget.target, item.budget.tolerance, attempts
                    ));
                }
                RewriteOutcome::Skipped { reason } => {
                    report.skipped += 1;
                    report.warnings.push(format!("{} has no narration: {}", span, reason));
                }
            }
        }

        if cancelled {
            report.warnings.push(format!(
                "cancelled after {} of {} intervals",
                intervals.len(),
                planned
            ));
        }
        report
    }
}

/// The shape the player application consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySegment {
    pub start_time: String,
    pub end_time: String,
    pub description: String,
}

impl From<&RewrittenInterval> for LegacySegment {
    fn from(item: &RewrittenInterval) -> Self {
        Self {
            start_time: format_timecode(item.start_ms),
            end_time: format_timecode(item.end_ms),
            description: item.text.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrationResult {
    pub intervals: Vec<RewrittenInterval>,
    pub report: NarrationReport,
}

impl NarrationResult {
    pub fn narration_intervals(&self) -> Vec<NarrationInterval> {
        self.intervals.iter().map(RewrittenInterval::to_interval).collect()
    }

    pub fn legacy_segments(&self) -> Vec<LegacySegment> {
        self.intervals.iter().map(LegacySegment::from).collect()
    }
}

pub type ProgressCallback = Arc<dyn Fn(&str) + Send + Sync>;

pub struct NarrationPipeline {
    config: NarrationConfig,
    orchestrator: RewriteOrchestrator,
    progress_callback: Option<ProgressCallback>,
}

impl NarrationPipeline {
    pub fn new(config: NarrationConfig, service: Arc<dyn RewriteService>) -> Self {
        let orchestrator = RewriteOrchestrator::new(
            service,
            config.transport_retry.clone(),
            config.budget_retry.clone(),
        )
        .with_history_window(config.history_window);

        Self {
            config,
            orchestrator,
            progress_callback: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn config(&self) -> &NarrationConfig {
        &self.config
    }

    fn report_progress(&self, stage: PipelineStage, msg: &str) {
        info!("[PIPELINE] {}: {}", stage.label(), msg);
        if let Some(ref callback) = self.progress_callback {
            callback(&format!("{}: {}", stage.label(), msg));
        }
    }

    /// Run every stage for one job. Validation failures abort the job;
    /// anything that goes wrong inside a single interval is recorded in the
    /// report instead.
    pub async fn run(
        &self,
        raw: &serde_json::Value,
        options: &NarrationOptions,
        cancel: &CancellationToken,
        on_interval: Option<&(dyn Fn(usize, usize) + Send + Sync)>,
    ) -> Result<NarrationResult> {
        let language = options
            .language
            .clone()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| self.config.default_language.clone());

        self.report_progress(PipelineStage::Normalize, "reading shot records");
        let plan = plan_narration(raw, &language, &self.config)?;
        self.report_progress(
            PipelineStage::BuildIntervals,
            &format!("{} shots -> {} intervals", plan.shot_count, plan.intervals.len()),
        );
        self.report_progress(PipelineStage::Budget, &format!("budgets assigned for {}", language));

        let profile = lookup_language(&self.config.languages, &language)
            .cloned()
            .ok_or_else(|| NarrationError::Config("language table is empty".to_string()))?;
        let context = RewriteContext {
            language: language.clone(),
            profile,
            narration_style: options.narration_style.clone(),
            title: options.title.clone(),
            context: options.context.clone(),
        };

        self.report_progress(
            PipelineStage::Rewrite,
            &format!("rewriting {} intervals", plan.intervals.len()),
        );
        let run = self
            .orchestrator
            .rewrite_all(&plan.intervals, &context, cancel, on_interval)
            .await;

        let report = NarrationReport::build(
            &run.intervals,
            plan.intervals.len(),
            plan.dropped_attachments,
            run.cancelled,
        );
        if report.warnings.is_empty() {
            self.report_progress(PipelineStage::Rewrite, "all intervals within budget");
        } else {
            for line in &report.warnings {
                warn!("[PIPELINE] {}", line);
            }
        }

        Ok(NarrationResult {
            intervals: run.intervals,
            report,
        })
    }
}
