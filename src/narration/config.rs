// SYNOID Narration Config
// Copyright (c) 2026 Xing_The_Creator | SYNOID

use crate::narration::budget::{default_language_table, BudgetPolicy, LanguageProfile, DEFAULT_LANGUAGE};
use crate::narration::error::{NarrationError, Result};
use crate::narration::intervals::{MAX_INTERVAL_MS, SPLIT_CHUNK_MS};
use crate::narration::llm_client::{AuthStyle, EndpointConfig};
use crate::narration::retry::TransportRetryPolicy;
use crate::narration::rewrite::BudgetRetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub const CONFIG_FILE: &str = "narration_config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    pub endpoint: EndpointConfig,
    /// Used when a job does not name its language.
    pub default_language: String,
    pub languages: Vec<LanguageProfile>,
    pub budget: BudgetPolicy,
    pub max_interval_ms: u64,
    pub split_chunk_ms: u64,
    pub transport_retry: TransportRetryPolicy,
    pub budget_retry: BudgetRetryPolicy,
    /// Previous rewrites carried into each request.
    pub history_window: usize,
    pub server_port: u16,
    /// Finished jobs kept for lookup; the oldest are dropped first.
    pub max_finished_jobs: usize,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            default_language: DEFAULT_LANGUAGE.to_string(),
            languages: default_language_table(),
            budget: BudgetPolicy::default(),
            max_interval_ms: MAX_INTERVAL_MS,
            split_chunk_ms: SPLIT_CHUNK_MS,
            transport_retry: TransportRetryPolicy::default(),
            budget_retry: BudgetRetryPolicy::default(),
            history_window: 3,
            server_port: 3000,
            max_finished_jobs: 100,
        }
    }
}

impl NarrationConfig {
    /// `narration_config.json` from the working directory if present, then
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let path = Path::new(CONFIG_FILE);
        let config = if path.exists() {
            Self::from_file(path)?
        } else {
            info!("[CONFIG] No {} found, using defaults", CONFIG_FILE);
            Self::default()
        };
        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| NarrationError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| NarrationError::Config(format!("invalid {}: {}", path.display(), e)))?;
        info!("[CONFIG] Loaded narration config from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    /// Apply `SYNOID_API_URL`, `SYNOID_API_KEY`, `SYNOID_MODEL` and
    /// `SYNOID_AUTH_STYLE` from `lookup`.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SYNOID_API_URL").filter(|v| !v.is_empty()) {
            self.endpoint.api_url = url;
        }
        if let Some(key) = lookup("SYNOID_API_KEY").filter(|v| !v.is_empty()) {
            self.endpoint.api_key = Some(key);
        }
        if let Some(model) = lookup("SYNOID_MODEL") {
            self.endpoint.model = if model.is_empty() { None } else { Some(model) };
        }
        if let Some(style) = lookup("SYNOID_AUTH_STYLE") {
            match AuthStyle::parse(&style) {
                Some(parsed) => self.endpoint.auth_style = parsed,
                None => warn!("[CONFIG] Ignoring unknown SYNOID_AUTH_STYLE '{}'", style),
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.languages.is_empty() {
            return Err(NarrationError::Config("language table is empty".to_string()));
        }
        if self.split_chunk_ms == 0 || self.split_chunk_ms > self.max_interval_ms {
            return Err(NarrationError::Config(format!(
                "split_chunk_ms must be in 1..={} (got {})",
                self.max_interval_ms, self.split_chunk_ms
            )));
        }
        if self.budget.base_min_words > self.budget.base_max_words {
            return Err(NarrationError::Config(
                "budget.base_min_words exceeds budget.base_max_words".to_string(),
            ));
        }
        Ok(())
    }
}
