// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! One-shot + conversation-continuation invocation style: the binary is
//! run once per turn with `--model <name> [--continue] -p <message>` and
//! the response is the full stdout text.
use std::path::Path;
use std::process::Stdio;

use tinyagi_config::AgentDef;
use tokio::process::Command;

use crate::error::{InvokerError, Result};

const MODEL_UNAVAILABLE_NEEDLES: [&str; 3] = ["does not exist", "do not have access", "invalid model"];

fn looks_like_model_unavailable(text: &str) -> bool {
    let lower = text.to_lowercase();
    MODEL_UNAVAILABLE_NEEDLES.iter().any(|n| lower.contains(n))
}

async fn run(agent: &AgentDef, model: &str, message: &str, resume: bool, workspace: &Path) -> Result<String> {
    let mut cmd = Command::new(&agent.binary);
    cmd.args(&agent.args)
        .arg("--model")
        .arg(model)
        .current_dir(workspace)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if resume {
        cmd.arg("--continue");
    }
    cmd.arg("-p").arg(message);

    let output = cmd.output().await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            InvokerError::BinaryMissing { binary: agent.binary.clone() }
        } else {
            InvokerError::Io(e)
        }
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
        if looks_like_model_unavailable(&stderr) || looks_like_model_unavailable(&stdout) {
            return Err(InvokerError::ModelUnavailable { model: model.to_string() });
        }
        return Err(InvokerError::Subprocess(format!(
            "{} exited with {:?}: {}",
            agent.binary,
            output.status.code(),
            stderr.trim()
        )));
    }
    Ok(stdout)
}

/// Invoke a Family A agent, retrying once on `fallback_model` if the
/// primary model is reported unavailable.
pub async fn invoke(agent: &AgentDef, message: &str, resume: bool, workspace: &Path) -> Result<String> {
    let primary = agent.model.as_deref().unwrap_or("default");
    match run(agent, primary, message, resume, workspace).await {
        Err(InvokerError::ModelUnavailable { model }) => match &agent.fallback_model {
            Some(fallback) => run(agent, fallback, message, resume, workspace).await,
            None => Err(InvokerError::ModelUnavailable { model }),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_known_model_unavailable_phrases() {
        assert!(looks_like_model_unavailable("Error: model does not exist"));
        assert!(looks_like_model_unavailable("you do not have access to this model"));
        assert!(looks_like_model_unavailable("invalid model specified"));
        assert!(!looks_like_model_unavailable("connection refused"));
    }

    #[tokio::test]
    async fn missing_binary_surfaces_binary_missing() {
        let agent = AgentDef {
            binary: "definitely-not-a-real-binary-xyz".into(),
            family: tinyagi_config::AgentFamily::OneShot,
            args: vec![],
            model: Some("gpt-4o-mini".into()),
            fallback_model: None,
            workspace: None,
        };
        let dir = tempfile::TempDir::new().unwrap();
        let err = invoke(&agent, "hello", false, dir.path()).await.unwrap_err();
        assert!(matches!(err, InvokerError::BinaryMissing { .. }));
    }

    #[tokio::test]
    async fn echo_binary_returns_trimmed_stdout() {
        let agent = AgentDef {
            binary: "echo".into(),
            family: tinyagi_config::AgentFamily::OneShot,
            args: vec!["hello-from-agent".into()],
            model: Some("gpt-4o-mini".into()),
            fallback_model: None,
            workspace: None,
        };
        let dir = tempfile::TempDir::new().unwrap();
        let out = invoke(&agent, "ignored", false, dir.path()).await.unwrap();
        assert!(out.contains("hello-from-agent"));
    }
}
