// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Allowlisted-command extraction, sanitization, and permission-gated
//! execution for the `tooling` route (spec 4.H).
pub mod error;
pub mod exec;
pub mod extract;

pub use error::{Result, ToolingError};
pub use exec::{execute, ExecOutcome, ExecutionResult};
pub use extract::{extract_candidate_command, sanitize, tokenize};

use tinyagi_config::ToolsConfig;
use tinyagi_repository::Repository;

/// End-to-end tooling-executor entry point: extract, sanitize, and
/// execute a candidate command found in an agent's output (spec 4.H).
pub async fn run(repo: &Repository, run_id: &str, user_id: &str, candidate_output: &str, config: &ToolsConfig) -> Result<ExecOutcome> {
    let command = extract_candidate_command(candidate_output, &config.allowlist).ok_or(ToolingError::NoCandidate)?;
    let argv = sanitize(&command, &config.allowlist)?;
    execute(repo, run_id, user_id, &argv, config.timeout_secs, config.output_cap_bytes).await
}
