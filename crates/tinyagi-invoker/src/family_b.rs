// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Framed newline-delimited JSON event stream invocation style: the
//! binary is run with an exec verb and `--json`, and each stdout line is
//! a structured frame. The last `agent_message` frame's text wins; a
//! final `error` frame fails the turn.
use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tinyagi_config::AgentDef;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::error::{InvokerError, Result};

const MODEL_UNAVAILABLE_NEEDLES: [&str; 3] = ["does not exist", "do not have access", "invalid model"];
const NO_PRIOR_SESSION_NEEDLES: [&str; 2] = ["no prior session", "no conversation to resume"];

#[derive(Debug, Deserialize)]
struct InnerMsg {
    #[serde(rename = "type")]
    msg_type: Option<String>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    top_type: Option<String>,
    msg: Option<InnerMsg>,
    text: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl Frame {
    fn frame_type(&self) -> Option<&str> {
        self.msg.as_ref().and_then(|m| m.msg_type.as_deref()).or(self.top_type.as_deref())
    }

    fn frame_text(&self) -> Option<String> {
        self.msg
            .as_ref()
            .and_then(|m| m.text.clone())
            .or_else(|| self.text.clone())
            .or_else(|| self.message.clone())
    }
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    let lower = text.to_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

/// Parse the newline-delimited frame stream, returning the winning
/// `agent_message` text or the terminal error.
fn reduce_frames(stdout: &str) -> Result<String> {
    let mut last_agent_message: Option<String> = None;
    let mut terminal_error: Option<String> = None;

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let frame: Frame = match serde_json::from_str(line) {
            Ok(f) => f,
            Err(_) => {
                tracing::debug!(%line, "skipping unparsable frame");
                continue;
            }
        };
        match frame.frame_type() {
            Some("agent_message") => last_agent_message = frame.frame_text(),
            Some("error") => terminal_error = Some(frame.frame_text().unwrap_or_else(|| "unknown error".to_string())),
            _ => {}
        }
        if let Some(err) = &frame.error {
            terminal_error = Some(err.clone());
        }
    }

    if let Some(err) = terminal_error {
        if contains_any(&err, &NO_PRIOR_SESSION_NEEDLES) {
            return Err(InvokerError::NoPriorSession);
        }
        if contains_any(&err, &MODEL_UNAVAILABLE_NEEDLES) {
            return Err(InvokerError::ModelUnavailable { model: "unspecified".into() });
        }
        return Err(InvokerError::Subprocess(err));
    }

    last_agent_message.ok_or_else(|| InvokerError::Subprocess("no agent_message frame received".into()))
}

async fn run(agent: &AgentDef, model: Option<&str>, message: &str, resume: bool, workspace: &Path) -> Result<String> {
    let mut cmd = Command::new(&agent.binary);
    cmd.args(&agent.args).current_dir(workspace).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

    if resume {
        cmd.arg("resume").arg("--last");
    } else {
        cmd.arg("exec");
        if let Some(m) = model {
            cmd.arg("--model").arg(m);
        }
    }
    cmd.arg("--json").arg(message);

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            InvokerError::BinaryMissing { binary: agent.binary.clone() }
        } else {
            InvokerError::Io(e)
        }
    })?;

    let stdout = child.stdout.take().expect("stdout piped");
    let mut reader = BufReader::new(stdout);
    let mut buf = String::new();
    tokio::io::AsyncReadExt::read_to_string(&mut reader, &mut buf).await.map_err(InvokerError::Io)?;

    let status = child.wait().await.map_err(InvokerError::Io)?;
    let reduced = reduce_frames(&buf);
    if reduced.is_err() && !status.success() && buf.trim().is_empty() {
        return Err(InvokerError::Subprocess(format!("{} exited with {:?} and no output", agent.binary, status.code())));
    }
    reduced
}

/// Invoke a Family B agent. Resume is retried as a fresh session if the
/// subprocess reports no prior session exists; model is retried against
/// `fallback_model` once if the primary model is reported unavailable.
pub async fn invoke(agent: &AgentDef, message: &str, resume: bool, workspace: &Path) -> Result<String> {
    let primary = agent.model.as_deref();
    let attempt = if resume {
        match run(agent, primary, message, true, workspace).await {
            Err(InvokerError::NoPriorSession) => run(agent, primary, message, false, workspace).await,
            other => other,
        }
    } else {
        run(agent, primary, message, false, workspace).await
    };

    match attempt {
        Err(InvokerError::ModelUnavailable { .. }) => match &agent.fallback_model {
            Some(fallback) => run(agent, Some(fallback.as_str()), message, false, workspace).await,
            None => Err(InvokerError::ModelUnavailable { model: primary.unwrap_or("default").to_string() }),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_frames_picks_last_agent_message() {
        let stream = "{\"type\":\"agent_message\",\"text\":\"first\"}\n{\"type\":\"agent_message\",\"text\":\"second\"}\n";
        assert_eq!(reduce_frames(stream).unwrap(), "second");
    }

    #[test]
    fn reduce_frames_honors_legacy_msg_wrapper() {
        let stream = "{\"msg\":{\"type\":\"agent_message\",\"text\":\"wrapped\"}}\n";
        assert_eq!(reduce_frames(stream).unwrap(), "wrapped");
    }

    #[test]
    fn reduce_frames_fails_on_terminal_error() {
        let stream = "{\"type\":\"agent_message\",\"text\":\"partial\"}\n{\"type\":\"error\",\"text\":\"boom\"}\n";
        let err = reduce_frames(stream).unwrap_err();
        assert!(matches!(err, InvokerError::Subprocess(_)));
    }

    #[test]
    fn reduce_frames_detects_no_prior_session() {
        let stream = "{\"type\":\"error\",\"text\":\"no prior session to resume\"}\n";
        assert!(matches!(reduce_frames(stream).unwrap_err(), InvokerError::NoPriorSession));
    }

    #[test]
    fn reduce_frames_skips_unparsable_lines() {
        let stream = "not json\n{\"type\":\"agent_message\",\"text\":\"ok\"}\n";
        assert_eq!(reduce_frames(stream).unwrap(), "ok");
    }

    #[test]
    fn reduce_frames_errors_when_no_agent_message_seen() {
        let stream = "{\"type\":\"tool_use\",\"text\":\"irrelevant\"}\n";
        assert!(reduce_frames(stream).is_err());
    }

    #[tokio::test]
    async fn missing_binary_surfaces_binary_missing() {
        let agent = AgentDef {
            binary: "definitely-not-a-real-binary-xyz".into(),
            family: tinyagi_config::AgentFamily::Framed,
            args: vec![],
            model: Some("gpt-4o-mini".into()),
            fallback_model: None,
            workspace: None,
        };
        let dir = tempfile::TempDir::new().unwrap();
        let err = invoke(&agent, "hello", false, dir.path()).await.unwrap_err();
        assert!(matches!(err, InvokerError::BinaryMissing { .. }));
    }
}
