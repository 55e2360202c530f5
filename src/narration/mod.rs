// SYNOID Narration Modules
// Copyright (c) 2026 Xing_The_Creator | SYNOID

pub mod budget;
pub mod config;
pub mod error;
pub mod intervals;
pub mod llm_client;
pub mod pipeline;
pub mod prompt;
pub mod queue;
pub mod retry;
pub mod rewrite;
pub mod shots;
pub mod timecode;

pub use config::NarrationConfig;
pub use error::{NarrationError, Result};
pub use pipeline::{plan_narration, NarrationOptions, NarrationPipeline, NarrationResult};
pub use rewrite::RewriteService;
