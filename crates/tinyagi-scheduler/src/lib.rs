// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Proactive scheduler (spec 4.M): a 60-second tick that flushes the
//! quiet-hours deferred outbox, enqueues the daily digest, and nudges
//! blocked runs with outreach reminders.
pub mod deferred;
pub mod digest;
mod error;
pub mod outreach;
pub mod quiet_hours;
pub mod state;

pub use error::{Result, SchedulerError};
pub use state::ProactiveState;

use chrono::{Local, TimeZone, Utc};
use tinyagi_config::HarnessConfig;
use tinyagi_queue::Spooler;
use tinyagi_repository::Repository;
use tracing::{info, instrument};

const OUTREACH_MIN_AGE_MILLIS: i64 = 10 * 60 * 1000;
const DIGEST_LOOKBACK_MILLIS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub flushed_deferred: usize,
    pub digests_enqueued: usize,
    pub outreach_sent: usize,
}

pub struct Scheduler<'a> {
    repo: &'a Repository,
    spooler: Spooler,
    memory_raw_dir: std::path::PathBuf,
    memory_daily_dir: std::path::PathBuf,
    deferred_path: std::path::PathBuf,
    state_path: std::path::PathBuf,
    harness_config: HarnessConfig,
}

impl<'a> Scheduler<'a> {
    pub fn new(repo: &'a Repository, home: &tinyagi_config::StateHome, spooler: Spooler, harness_config: HarnessConfig) -> Self {
        Self {
            repo,
            spooler,
            memory_raw_dir: home.memory_raw_dir(),
            memory_daily_dir: home.memory_daily_dir(),
            deferred_path: home.proactive_deferred_path(),
            state_path: home.proactive_state_path(),
            harness_config,
        }
    }

    /// Run one tick at `now_millis`, mutating and persisting `state`.
    #[instrument(skip(self, state))]
    pub fn tick(&self, state: &mut ProactiveState, now_millis: i64) -> Result<TickReport> {
        let now_local = Local.timestamp_millis_opt(now_millis).single().unwrap_or_else(Local::now);
        let quiet = quiet_hours::in_quiet_hours(now_local.time(), &self.harness_config.quiet_hours);

        let flushed_deferred = if quiet {
            0
        } else {
            deferred::flush_deferred(&self.deferred_path, &self.spooler)?
        };

        let today = Utc
            .timestamp_millis_opt(now_millis)
            .single()
            .unwrap_or_else(Utc::now)
            .format("%Y-%m-%d")
            .to_string();
        let since_millis = now_millis - DIGEST_LOOKBACK_MILLIS;
        let digests_enqueued = digest::run_daily_digest(
            self.repo,
            &self.memory_raw_dir,
            &self.memory_daily_dir,
            &self.spooler,
            state,
            &self.state_path,
            &today,
            since_millis,
            now_millis,
        )?;

        let outreach_sent = outreach::run_outreach_pass(self.repo, &self.spooler, OUTREACH_MIN_AGE_MILLIS, now_millis)?;

        let report = TickReport { flushed_deferred, digests_enqueued, outreach_sent };
        if report.flushed_deferred > 0 || report.digests_enqueued > 0 || report.outreach_sent > 0 {
            info!(?report, "proactive scheduler tick");
        }
        Ok(report)
    }

    /// Run `tick` every 60 seconds until the process is killed. `state` is
    /// loaded once from disk and persisted by the digest step as it changes.
    pub async fn run_forever(&self) -> Result<()> {
        let mut state = ProactiveState::load(&self.state_path);
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            let now_millis = Utc::now().timestamp_millis();
            if let Err(err) = self.tick(&mut state, now_millis) {
                tracing::warn!(error = %err, "proactive scheduler tick failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tinyagi_config::StateHome;
    use tinyagi_repository::{RiskLevel, TaskStatus};

    fn harness_config_with_quiet(start: &str, end: &str) -> HarnessConfig {
        HarnessConfig {
            enabled: true,
            autonomy: Default::default(),
            quiet_hours: tinyagi_config::QuietHours { start: start.into(), end: end.into() },
            digest_time: "08:00".into(),
            browser: Default::default(),
        }
    }

    #[test]
    fn tick_flushes_deferred_outside_quiet_hours() {
        let dir = TempDir::new().unwrap();
        let home = StateHome::at(dir.path());
        let spooler = Spooler::new(home.clone());
        spooler.ensure_dirs().unwrap();
        let repo = Repository::open_in_memory().unwrap();

        let env = tinyagi_queue::MessageEnvelope {
            channel: "whatsapp".into(),
            sender: "alice".into(),
            sender_id: Some("u1".into()),
            message: "later".into(),
            timestamp: 1,
            message_id: "m1".into(),
            agent: None,
            files: None,
            conversation_id: None,
            from_agent: None,
            original_message: None,
        };
        deferred::append_deferred(&home.proactive_deferred_path(), &env).unwrap();

        let scheduler = Scheduler::new(&repo, &home, spooler, harness_config_with_quiet("22:00", "07:00"));
        let mut state = ProactiveState::default();

        // Noon UTC, well outside the 22:00-07:00 quiet window.
        let noon = chrono::Utc.with_ymd_and_hms(2026, 7, 26, 12, 0, 0).unwrap().timestamp_millis();
        let report = scheduler.tick(&mut state, noon).unwrap();
        assert_eq!(report.flushed_deferred, 1);
    }

    #[test]
    fn tick_skips_flush_during_quiet_hours() {
        let dir = TempDir::new().unwrap();
        let home = StateHome::at(dir.path());
        let spooler = Spooler::new(home.clone());
        spooler.ensure_dirs().unwrap();
        let repo = Repository::open_in_memory().unwrap();

        let env = tinyagi_queue::MessageEnvelope {
            channel: "whatsapp".into(),
            sender: "alice".into(),
            sender_id: Some("u1".into()),
            message: "later".into(),
            timestamp: 1,
            message_id: "m1".into(),
            agent: None,
            files: None,
            conversation_id: None,
            from_agent: None,
            original_message: None,
        };
        deferred::append_deferred(&home.proactive_deferred_path(), &env).unwrap();

        let scheduler = Scheduler::new(&repo, &home, spooler, harness_config_with_quiet("00:00", "23:59"));
        let mut state = ProactiveState::default();

        let midnight_ish = chrono::Utc.with_ymd_and_hms(2026, 7, 26, 1, 0, 0).unwrap().timestamp_millis();
        let report = scheduler.tick(&mut state, midnight_ish).unwrap();
        assert_eq!(report.flushed_deferred, 0);
    }

    #[test]
    fn tick_runs_digest_and_skips_fresh_blocked_run() {
        let dir = TempDir::new().unwrap();
        let home = StateHome::at(dir.path());
        let spooler = Spooler::new(home.clone());
        spooler.ensure_dirs().unwrap();
        let repo = Repository::open_in_memory().unwrap();
        repo.create_run("r1", "t", "whatsapp", "alice", Some("u1"), None, None, "deploy it", RiskLevel::Low, "default").unwrap();
        repo.finalize_run("r1", TaskStatus::NeedsInput, None).unwrap();

        let scheduler = Scheduler::new(&repo, &home, spooler, harness_config_with_quiet("22:00", "07:00"));
        let mut state = ProactiveState::default();

        let noon = chrono::Utc.with_ymd_and_hms(2026, 7, 26, 12, 0, 0).unwrap().timestamp_millis();
        let report = scheduler.tick(&mut state, noon).unwrap();
        assert_eq!(report.digests_enqueued, 1);
        // The run just transitioned to needs_input, so it's younger than the
        // 10-minute outreach threshold and must not get a reminder yet.
        assert_eq!(report.outreach_sent, 0);
    }
}
