// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;
mod intent;
mod operator;
mod processor;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use cli::{BrowserCommands, Cli, Commands, HarnessCommands, MemoryCommands, PermissionCommands, SkillsCommands, TaskCommands, ToolsCommands};
use tinyagi_config::{Settings, StateHome};
use tinyagi_queue::Spooler;
use tinyagi_repository::{Repository, TrustClass};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = &cli.command {
        cli::print_completions(*shell);
        return Ok(());
    }

    let state_home = StateHome::resolve()?;
    state_home.ensure_layout()?;
    let _log_guard = init_logging(cli.verbose, &state_home);

    let mut config = tinyagi_config::load(cli.config.as_deref())?;
    Settings::load(&state_home.settings_path()).apply(&mut config);

    if let Some(Commands::ShowConfig) = &cli.command {
        println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
        return Ok(());
    }

    let repo = Arc::new(Repository::open(&state_home.harness_db_path())?);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_serve(repo, config, state_home).await,
        Commands::ShowConfig | Commands::Completions { .. } => unreachable!("handled above"),
        Commands::Harness { command } => run_harness_command(&repo, &state_home, command),
        Commands::Task { command } => run_task_command(&repo, command),
        Commands::Memory { command } => run_memory_command(&repo, &state_home, command).await,
        Commands::Browser { command } => run_browser_command(&repo, &config, &state_home, command).await,
        Commands::Permission { command } => run_permission_command(&repo, command),
        Commands::Tools { command } => run_tools_command(&repo, command),
        Commands::Skills { command } => run_skills_command(&repo, &state_home, command),
        Commands::Metrics => run_metrics_command(&repo),
    }
}

async fn run_serve(repo: Arc<Repository>, config: tinyagi_config::Config, state_home: StateHome) -> anyhow::Result<()> {
    let spooler = Spooler::new(state_home.clone());
    spooler.ensure_dirs()?;
    let base_workspace_dir = state_home.root().join("workspaces");
    std::fs::create_dir_all(&base_workspace_dir)?;

    let harness_config = config.harness.clone();
    let scheduler_spooler = Spooler::new(state_home.clone());
    let scheduler_repo = repo.clone();
    let scheduler_state_home = state_home.clone();
    let scheduler_task = tokio::spawn(async move {
        let scheduler = tinyagi_scheduler::Scheduler::new(scheduler_repo.as_ref(), &scheduler_state_home, scheduler_spooler, harness_config);
        scheduler.run_forever().await
    });

    let processor = processor::QueueProcessor::new(repo, config, spooler, state_home, base_workspace_dir);
    let processor_task = tokio::spawn(processor.run_forever());

    tokio::select! {
        result = processor_task => result.context("queue processor task panicked")?,
        result = scheduler_task => result.context("scheduler task panicked")?.map_err(anyhow::Error::from),
    }
}

fn run_harness_command(repo: &Repository, state_home: &StateHome, command: HarnessCommands) -> anyhow::Result<()> {
    let settings_path = state_home.settings_path();
    let mut settings = Settings::load(&settings_path);
    match command {
        HarnessCommands::Status => {
            println!("harness: {}", if settings.harness_enabled.unwrap_or(true) { "enabled" } else { "disabled" });
            println!("autonomy: {}", settings.autonomy.unwrap_or_default());
            println!("response_loss_rate: {:.4}", repo.response_loss_rate()?);
        }
        HarnessCommands::Enable => {
            settings.harness_enabled = Some(true);
            settings.save(&settings_path)?;
            println!("Harness enabled.");
        }
        HarnessCommands::Disable => {
            settings.harness_enabled = Some(false);
            settings.save(&settings_path)?;
            println!("Harness disabled.");
        }
        HarnessCommands::Autonomy { level } => match level {
            Some(level) => {
                settings.autonomy = Some(level);
                settings.save(&settings_path)?;
                println!("Autonomy set to {level}.");
            }
            None => println!("Autonomy is currently {}.", settings.autonomy.unwrap_or_default()),
        },
    }
    Ok(())
}

fn run_task_command(repo: &Repository, command: TaskCommands) -> anyhow::Result<()> {
    match command {
        TaskCommands::List => {
            for run in repo.list_runs()? {
                println!("{}  {:?}  {}  {}", run.run_id, run.status, run.assigned_agent, run.objective);
            }
        }
        TaskCommands::Show { run_id } => {
            let run = repo.get_run(&run_id)?.ok_or_else(|| anyhow::anyhow!("no such run: {run_id}"))?;
            println!("{run:#?}");
            for event in repo.list_events(&run_id)? {
                println!("  [{}] {} {}", event.created_at, event.kind, event.payload);
            }
        }
    }
    Ok(())
}

async fn run_memory_command(repo: &Repository, state_home: &StateHome, command: MemoryCommands) -> anyhow::Result<()> {
    match command {
        MemoryCommands::Show { user_id, topic } => {
            let Some(user_id) = user_id else {
                println!("Usage: tinyagi memory show <userId> [topic]");
                return Ok(());
            };
            let records = repo.list_memory_records(&user_id)?;
            let filtered: Vec<_> = match &topic {
                Some(t) => records.into_iter().filter(|r| r.key.contains(t.as_str())).collect(),
                None => records,
            };
            for record in filtered {
                println!("{}: {} (confidence {:.2})", record.key, record.value, record.confidence);
            }
        }
        MemoryCommands::Forget { user_id, topic } => {
            let n = repo.delete_memory_topic(&user_id, &topic)?;
            println!("Removed {n} record(s).");
        }
        MemoryCommands::Summarize { date } => {
            let date = date.unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%d").to_string());
            let summary = tinyagi_memory::generate_daily_summary(repo, &state_home.memory_raw_dir(), &state_home.memory_daily_dir(), &date)?;
            println!("{summary}");
        }
    }
    Ok(())
}

async fn run_browser_command(repo: &Repository, config: &tinyagi_config::Config, state_home: &StateHome, command: BrowserCommands) -> anyhow::Result<()> {
    match command {
        BrowserCommands::Sessions => {
            for session in repo.list_browser_sessions()? {
                println!("{}  {}:{}", session.session_id, session.host, session.port);
            }
        }
        BrowserCommands::Tabs { run_id } => {
            for tab in repo.list_tabs(run_id.as_deref())? {
                println!("{}  run={}  {:?}", tab.tab_id, tab.run_id, tab.status);
            }
        }
        BrowserCommands::Attach => {
            let mut capability = tinyagi_browser::acquire(&config.harness.browser).await?;
            let page = capability.read_state().await?;
            println!("Attached to browser debugger. Current page: {}", if page.url.is_empty() { "(blank)" } else { &page.url });
        }
        BrowserCommands::Approve { request_id } => {
            repo.resolve_browser_approval(&request_id, true)?;
            println!("Approved {request_id}.");
        }
        BrowserCommands::Deny { request_id } => {
            repo.resolve_browser_approval(&request_id, false)?;
            println!("Denied {request_id}.");
        }
        BrowserCommands::Approvals { user_id } => {
            for approval in repo.list_browser_approvals(user_id.as_deref())? {
                println!("{}  {:?}", approval.approval_id, approval.status);
            }
        }
        BrowserCommands::Replay { run_id, user_id } => {
            let user_id = user_id.unwrap_or_else(|| "cli".to_string());
            let mut capability = tinyagi_browser::acquire(&config.harness.browser).await?;
            let replay_run_id = format!("replay_{}", uuid::Uuid::new_v4());
            let base_url = capability.read_state().await.map(|s| s.url).unwrap_or_default();
            match tinyagi_browser::replay_browser_run(repo, capability.as_mut(), &run_id, &replay_run_id, &user_id, &base_url, state_home.root(), &config.harness.browser).await {
                Ok(outcome) => println!("Replay finished: {outcome:?}"),
                Err(err) if err.to_string().contains("no replayable steps found") => {
                    println!("No replayable browser trace found for run {run_id}.");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
    Ok(())
}

fn run_permission_command(repo: &Repository, command: PermissionCommands) -> anyhow::Result<()> {
    match command {
        PermissionCommands::List { user_id } => {
            for perm in repo.list_permissions(user_id.as_deref())? {
                println!("{}  {} {}  {:?}", perm.permission_id, perm.subject, perm.action, perm.status);
            }
        }
        PermissionCommands::Grant { user_id, subject, action, resource } => {
            let id = repo.grant_permission(&user_id, &subject, &action, resource.as_deref())?;
            println!("Granted {id}.");
        }
        PermissionCommands::Revoke { permission_id } => {
            repo.revoke_permission(&permission_id)?;
            println!("Revoked {permission_id}.");
        }
    }
    Ok(())
}

fn run_tools_command(repo: &Repository, command: ToolsCommands) -> anyhow::Result<()> {
    match command {
        ToolsCommands::List => {
            for tool in repo.list_tools()? {
                println!("{}  {}  {:?}", tool.name, tool.source, tool.status);
            }
        }
        ToolsCommands::Register { name, source } => {
            let id = repo.register_tool_if_new(&name, &source, TrustClass::Unknown)?;
            println!("Registered {id}.");
        }
        ToolsCommands::Approve { name, user_id } => {
            repo.set_tool_status(&name, tinyagi_repository::ToolStatus::Approved)?;
            println!("Approved {name}{}.", user_id.map(|u| format!(" for {u}")).unwrap_or_default());
        }
        ToolsCommands::Block { name, user_id } => {
            repo.set_tool_status(&name, tinyagi_repository::ToolStatus::Blocked)?;
            println!("Blocked {name}{}.", user_id.map(|u| format!(" for {u}")).unwrap_or_default());
        }
    }
    Ok(())
}

fn run_skills_command(repo: &Repository, state_home: &StateHome, command: SkillsCommands) -> anyhow::Result<()> {
    let skills_dir = state_home.skills_dir();
    match command {
        SkillsCommands::List => {
            for skill in tinyagi_skills::list_skills(repo)? {
                println!("{}  {}  {:?}", skill.skill_id, skill.name, skill.status);
            }
        }
        SkillsCommands::Show { skill_id } => {
            let skill = tinyagi_skills::get_skill(repo, &skill_id)?.ok_or_else(|| anyhow::anyhow!("no such skill: {skill_id}"))?;
            println!("{skill:#?}");
            for version in tinyagi_skills::list_skill_versions(repo, &skill_id)? {
                println!("  v{} ({})", version.version, version.created_at);
            }
        }
        SkillsCommands::Draft { name, prompt } => {
            let id = tinyagi_skills::draft_skill(repo, &skills_dir, &name, &prompt)?;
            println!("Drafted {id}.");
        }
        SkillsCommands::Activate { skill_id } => {
            tinyagi_skills::activate_skill(repo, &skill_id)?;
            println!("Activated {skill_id}.");
        }
        SkillsCommands::Disable { skill_id } => {
            tinyagi_skills::disable_skill(repo, &skill_id)?;
            println!("Disabled {skill_id}.");
        }
        SkillsCommands::Rollback { skill_id, version } => {
            let v = tinyagi_skills::rollback_skill(repo, &skills_dir, &skill_id, version)?;
            println!("Rolled back {skill_id} to v{v}.");
        }
    }
    Ok(())
}

fn run_metrics_command(repo: &Repository) -> anyhow::Result<()> {
    for (name, value) in repo.all_metrics()? {
        println!("{name}: {value}");
    }
    println!("response_loss_rate: {:.4}", repo.response_loss_rate()?);
    Ok(())
}

/// Logs to stderr for interactive use and to a daily-rotating file under
/// `logs/` so a detached `serve` process stays diagnosable. The returned
/// guard must stay alive for the process lifetime or the file writer is
/// dropped and buffered lines are lost.
fn init_logging(verbosity: u8, state_home: &StateHome) -> WorkerGuard {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::daily(state_home.logs_dir(), "tinyagi.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(fmt::layer().with_target(false).with_ansi(false).with_writer(non_blocking))
        .try_init();

    guard
}
