// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use tinyagi_config::Autonomy;

#[derive(Parser, Debug)]
#[command(name = "tinyagi", about = "Always-on multi-channel agent harness", version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to a config file, overriding auto-discovery.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace).
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the queue processor and proactive scheduler until killed. Default when no subcommand is given.
    Serve,
    /// Print the effective configuration and exit.
    ShowConfig,
    /// Generate a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
    /// Harness enable/disable and autonomy controls.
    Harness {
        #[command(subcommand)]
        command: HarnessCommands,
    },
    /// Inspect recorded task runs.
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Inspect, forget, or summarize remembered facts.
    Memory {
        #[command(subcommand)]
        command: MemoryCommands,
    },
    /// Browser sessions, tabs, approvals, and replay.
    Browser {
        #[command(subcommand)]
        command: BrowserCommands,
    },
    /// Permission requests.
    Permission {
        #[command(subcommand)]
        command: PermissionCommands,
    },
    /// Allowlisted tool registry.
    Tools {
        #[command(subcommand)]
        command: ToolsCommands,
    },
    /// Learned skills: draft, activate, disable, roll back.
    Skills {
        #[command(subcommand)]
        command: SkillsCommands,
    },
    /// Print accumulated operational metrics.
    Metrics,
}

#[derive(Subcommand, Debug)]
pub enum HarnessCommands {
    /// Show whether the harness is enabled and the current autonomy level.
    Status,
    /// Enable autonomous harness dispatch.
    Enable,
    /// Disable the harness; messages fall back to plain agent invocation.
    Disable,
    /// Show or set the autonomy level (low | normal | strict).
    Autonomy {
        #[arg(value_enum)]
        level: Option<Autonomy>,
    },
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// List recorded task runs, most recent first.
    List,
    /// Show one run's full detail, including its event trail.
    Show { run_id: String },
}

#[derive(Subcommand, Debug)]
pub enum MemoryCommands {
    /// Show remembered facts, optionally scoped to one user and/or topic.
    Show {
        user_id: Option<String>,
        topic: Option<String>,
    },
    /// Delete remembered facts matching a topic substring.
    Forget { user_id: String, topic: String },
    /// Generate (or re-generate) the daily memory summary for a date (default: today, UTC).
    Summarize { date: Option<String> },
}

#[derive(Subcommand, Debug)]
pub enum BrowserCommands {
    /// List attached browser sessions.
    Sessions,
    /// List tabs, optionally filtered to one run.
    Tabs { run_id: Option<String> },
    /// Attach to (or launch) a browser debugger session per the configured provider.
    Attach,
    /// Approve a pending browser action.
    Approve { request_id: String },
    /// Deny a pending browser action.
    Deny { request_id: String },
    /// List pending/resolved browser approvals, optionally scoped to one user.
    Approvals { user_id: Option<String> },
    /// Replay a prior run's browser trace under a fresh run id.
    Replay { run_id: String, user_id: Option<String> },
}

#[derive(Subcommand, Debug)]
pub enum PermissionCommands {
    /// List permission requests, optionally scoped to one user.
    List { user_id: Option<String> },
    /// Grant a permission directly, bypassing the request/approve flow.
    Grant {
        user_id: String,
        subject: String,
        action: String,
        resource: Option<String>,
    },
    /// Revoke an active permission.
    Revoke { permission_id: String },
}

#[derive(Subcommand, Debug)]
pub enum ToolsCommands {
    /// List the tool registry.
    List,
    /// Register a new tool (pending trust review).
    Register { name: String, source: String },
    /// Approve a pending tool, marking it trusted.
    Approve { name: String, user_id: Option<String> },
    /// Block a tool, regardless of its prior trust status.
    Block { name: String, user_id: Option<String> },
}

#[derive(Subcommand, Debug)]
pub enum SkillsCommands {
    /// List learned skills.
    List,
    /// Show one skill's detail and version history.
    Show { skill_id: String },
    /// Draft a new skill by hand.
    Draft { name: String, prompt: String },
    /// Activate a skill.
    Activate { skill_id: String },
    /// Disable a skill.
    Disable { skill_id: String },
    /// Roll back a skill to an earlier version (default: the previous one).
    Rollback { skill_id: String, version: Option<u32> },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "tinyagi", &mut std::io::stdout());
}
