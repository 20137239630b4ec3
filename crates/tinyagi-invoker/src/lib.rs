// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Launches the opaque agent-model-runner binaries named in an
//! `AgentDef` as subprocesses (argv only, no shell) and normalizes their
//! two supported output styles into a single response string.
mod family_a;
mod family_b;

pub mod error;
pub mod workspace;

use std::path::Path;

use tinyagi_config::{AgentDef, AgentFamily};

pub use error::{InvokerError, Result};
pub use workspace::{ensure_workspace, write_teammate_context};

/// Invoke `agent` with `message`, ensuring its workspace directory exists
/// first and dispatching to the driver matching its configured family
/// (spec 4.D).
pub async fn invoke(base_workspace_dir: &Path, agent_id: &str, agent: &AgentDef, message: &str, resume: bool, teammate_context: Option<&str>) -> Result<String> {
    let workspace = ensure_workspace(base_workspace_dir, agent_id, agent.workspace.as_deref())?;
    if let Some(context) = teammate_context {
        write_teammate_context(&workspace, context)?;
    }

    tracing::debug!(agent_id, binary = %agent.binary, family = ?agent.family, resume, "invoking agent");

    match agent.family {
        AgentFamily::OneShot => family_a::invoke(agent, message, resume, &workspace).await,
        AgentFamily::Framed => family_b::invoke(agent, message, resume, &workspace).await,
    }
}
