// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! In-channel operator commands (spec §6): slash commands detected in an
//! incoming message and routed straight to the repository/config, never
//! reaching an agent.
use tinyagi_config::{Autonomy, Settings};
use tinyagi_repository::{PermissionStatus, Repository};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Status,
    Approve(String),
    Deny(String),
    Permissions,
    Memory(Option<String>),
    Autonomy(Option<Autonomy>),
    Agent,
    Team,
    Reset(Vec<String>),
}

/// Parse a leading `/command` out of a message. Not a command when the
/// message does not start with `/` or the keyword is unrecognized.
pub fn parse(text: &str) -> Option<OperatorCommand> {
    let trimmed = text.trim();
    let rest = trimmed.strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let keyword = parts.next()?.to_lowercase();
    let args: Vec<&str> = parts.collect();

    match keyword.as_str() {
        "status" => Some(OperatorCommand::Status),
        "approve" => args.first().map(|id| OperatorCommand::Approve(id.to_string())),
        "deny" => args.first().map(|id| OperatorCommand::Deny(id.to_string())),
        "permissions" => Some(OperatorCommand::Permissions),
        "memory" => Some(OperatorCommand::Memory(args.first().map(|s| s.to_string()))),
        "autonomy" => Some(OperatorCommand::Autonomy(match args.first() {
            None => None,
            Some(&"low") => Some(Autonomy::Low),
            Some(&"normal") => Some(Autonomy::Normal),
            Some(&"strict") => Some(Autonomy::Strict),
            Some(_) => return None,
        })),
        "agent" => Some(OperatorCommand::Agent),
        "team" => Some(OperatorCommand::Team),
        "reset" => Some(OperatorCommand::Reset(args.iter().map(|s| s.trim_start_matches('@').to_string()).collect())),
        _ => None,
    }
}

/// Resolve a pending approval request by trying the generic permission
/// table first, falling back to a browser-specific approval row.
fn resolve_approval(repo: &Repository, request_id: &str, approved: bool) -> anyhow::Result<String> {
    let status = if approved { PermissionStatus::Active } else { PermissionStatus::Revoked };
    if repo.get_permission(request_id)?.is_some() {
        repo.set_permission_status(request_id, status)?;
        return Ok(format!("Request {request_id} {}.", if approved { "approved" } else { "denied" }));
    }
    repo.resolve_browser_approval(request_id, approved)?;
    Ok(format!("Browser approval {request_id} {}.", if approved { "approved" } else { "denied" }))
}

pub fn handle(cmd: &OperatorCommand, repo: &Repository, settings_path: &std::path::Path, user_id: &str) -> anyhow::Result<String> {
    match cmd {
        OperatorCommand::Status => {
            let settings = Settings::load(settings_path);
            let enabled = settings.harness_enabled.unwrap_or(true);
            let autonomy = settings.autonomy.unwrap_or_default();
            let loss_rate = repo.response_loss_rate()?;
            Ok(format!("harness: {}\nautonomy: {autonomy}\nresponse_loss_rate: {loss_rate:.4}", if enabled { "enabled" } else { "disabled" }))
        }
        OperatorCommand::Approve(id) => resolve_approval(repo, id, true),
        OperatorCommand::Deny(id) => resolve_approval(repo, id, false),
        OperatorCommand::Permissions => {
            let perms = repo.list_permissions(Some(user_id))?;
            if perms.is_empty() {
                return Ok("No permission requests on file.".to_string());
            }
            Ok(perms.iter().map(|p| format!("{} {} {} — {:?}", p.permission_id, p.subject, p.action, p.status)).collect::<Vec<_>>().join("\n"))
        }
        OperatorCommand::Memory(topic) => {
            let records = repo.list_memory_records(user_id)?;
            let filtered: Vec<_> = match topic {
                Some(t) => records.into_iter().filter(|r| r.key.contains(t.as_str())).collect(),
                None => records,
            };
            if filtered.is_empty() {
                return Ok("Nothing remembered yet.".to_string());
            }
            Ok(filtered.iter().map(|r| format!("- {}: {}", r.key, r.value)).collect::<Vec<_>>().join("\n"))
        }
        OperatorCommand::Autonomy(new_level) => {
            let mut settings = Settings::load(settings_path);
            if let Some(level) = new_level {
                settings.autonomy = Some(*level);
                settings.save(settings_path)?;
                Ok(format!("Autonomy set to {level}."))
            } else {
                Ok(format!("Autonomy is currently {}.", settings.autonomy.unwrap_or_default()))
            }
        }
        OperatorCommand::Agent => {
            let runs = repo.list_runs()?;
            Ok(match runs.first() {
                Some(run) => format!("Most recently assigned agent: {}", run.assigned_agent),
                None => "No runs recorded yet.".to_string(),
            })
        }
        OperatorCommand::Team => {
            let runs = repo.list_runs()?;
            let open: Vec<_> = runs.iter().filter(|r| r.conversation_id.is_some()).collect();
            Ok(format!("{} team conversation branch(es) on file.", open.len()))
        }
        OperatorCommand::Reset(agent_ids) => {
            if agent_ids.is_empty() {
                return Ok("Usage: /reset @agentId [...]".to_string());
            }
            for agent_id in agent_ids {
                repo.increment_metric(&format!("agent_reset_requested:{agent_id}"), 1.0, serde_json::json!({"requestedBy": user_id})).ok();
            }
            Ok(format!("Reset requested for: {}", agent_ids.join(", ")))
        }
    }
}
