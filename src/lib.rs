// SYNOID Narrator Library
// Copyright (c) 2026 Xing_The_Creator | SYNOID

pub mod narration;
pub mod server;
