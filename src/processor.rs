// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Queue processor: the 1-second poll loop over `incoming/`, one
//! sequential pipeline per agent, harness dispatch, and team-conversation
//! aggregation (spec 4.N).
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use regex::Regex;
use tinyagi_config::{Config, StateHome};
use tinyagi_queue::{MessageEnvelope, Spooler};
use tinyagi_repository::Repository;
use tinyagi_team::{Conversation, RouteTarget};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::intent::{classify_intent, should_ack, Intent};
use crate::operator;

const MAX_RESPONSE_CHARS: usize = 4000;
const COMPLETION_PREFIXES: [&str; 4] = ["done", "here's what happened", "completed", "finished"];

struct PipelineHandle {
    tx: mpsc::UnboundedSender<PathBuf>,
    pending: Arc<AtomicUsize>,
}

pub struct QueueProcessor {
    repo: Arc<Repository>,
    config: Config,
    spooler: Spooler,
    state_home: StateHome,
    base_workspace_dir: PathBuf,
    pipelines: Mutex<HashMap<String, PipelineHandle>>,
    queued_files: Mutex<HashSet<PathBuf>>,
    conversations: Mutex<HashMap<String, Conversation>>,
}

impl QueueProcessor {
    pub fn new(repo: Arc<Repository>, config: Config, spooler: Spooler, state_home: StateHome, base_workspace_dir: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            repo,
            config,
            spooler,
            state_home,
            base_workspace_dir,
            pipelines: Mutex::new(HashMap::new()),
            queued_files: Mutex::new(HashSet::new()),
            conversations: Mutex::new(HashMap::new()),
        })
    }

    /// 1 s tick: list `incoming/`, route each unseen file to its agent's
    /// pipeline, forever.
    pub async fn run_forever(self: Arc<Self>) -> anyhow::Result<()> {
        let recovered = self.spooler.recover()?;
        if recovered > 0 {
            info!(count = recovered, "recovered in-flight messages on startup");
        }
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            interval.tick().await;
            if let Err(err) = self.tick().await {
                warn!(error = %err, "queue processor tick failed");
            }
        }
    }

    async fn tick(self: &Arc<Self>) -> anyhow::Result<()> {
        let files = self.spooler.list_incoming()?;
        for path in files {
            let mut queued = self.queued_files.lock().await;
            if queued.contains(&path) {
                continue;
            }
            let agent_id = match self.spooler.read_envelope(&path) {
                Ok(envelope) => self.peek_agent_id(&envelope),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable queue file this tick");
                    continue;
                }
            };
            queued.insert(path.clone());
            drop(queued);
            self.dispatch(agent_id, path).await;
        }
        Ok(())
    }

    fn peek_agent_id(&self, envelope: &MessageEnvelope) -> String {
        if let Some(agent) = &envelope.agent {
            return agent.clone();
        }
        match tinyagi_team::parse_route(&envelope.message, &self.config) {
            Some(RouteTarget::Agent(id)) => id,
            _ => default_agent_id(&self.config),
        }
    }

    /// Hand `path` to `agent_id`'s sequential chain, spawning the chain's
    /// worker task if this is its first message.
    async fn dispatch(self: &Arc<Self>, agent_id: String, path: PathBuf) {
        let mut pipelines = self.pipelines.lock().await;
        let handle = pipelines.entry(agent_id.clone()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            let pending = Arc::new(AtomicUsize::new(0));
            tokio::spawn(self.clone().run_pipeline(agent_id.clone(), rx));
            PipelineHandle { tx, pending }
        });
        handle.pending.fetch_add(1, Ordering::SeqCst);
        let _ = handle.tx.send(path);
    }

    /// One agent's sequential worker: processes messages strictly in the
    /// order they arrived, then self-removes from the pipeline map once
    /// drained so idle agents don't keep a task alive forever.
    async fn run_pipeline(self: Arc<Self>, agent_id: String, mut rx: mpsc::UnboundedReceiver<PathBuf>) {
        while let Some(path) = rx.recv().await {
            if let Err(err) = self.process_one(&path).await {
                error!(path = %path.display(), error = %err, "queue message processing failed; releasing back to incoming");
                let _ = self.spooler.release_back_to_incoming(&path);
            }
            self.queued_files.lock().await.remove(&path);

            let mut pipelines = self.pipelines.lock().await;
            if let Some(handle) = pipelines.get(&agent_id) {
                if handle.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                    pipelines.remove(&agent_id);
                }
            }
        }
    }

    async fn process_one(self: &Arc<Self>, incoming_path: &Path) -> anyhow::Result<()> {
        let processing_path = self.spooler.claim(incoming_path)?;
        let envelope = self.spooler.read_envelope(&processing_path)?;
        let now_millis = tinyagi_repository::now_millis();

        if !envelope.is_internal() && !envelope.is_heartbeat() {
            if let Some(cmd) = operator::parse(&envelope.message) {
                let user_id = envelope.sender_id.as_deref().unwrap_or(&envelope.sender);
                let reply = operator::handle(&cmd, &self.repo, &self.state_home.settings_path(), user_id)
                    .unwrap_or_else(|err| format!("Could not process that command: {err}"));
                self.write_plain_reply(&envelope, reply, now_millis)?;
                self.spooler.delete_processing(&processing_path)?;
                return Ok(());
            }
        }

        if envelope.is_heartbeat() {
            self.spooler.delete_processing(&processing_path)?;
            return Ok(());
        }

        let agent_id = self.peek_agent_id(&envelope);
        if matches!(tinyagi_team::parse_route(&envelope.message, &self.config), Some(RouteTarget::Ambiguous)) && !envelope.is_internal() {
            self.write_plain_reply(&envelope, "That mention is ambiguous between more than one agent or team; please address exactly one.".to_string(), now_millis)?;
            self.spooler.delete_processing(&processing_path)?;
            return Ok(());
        }

        if self.config.harness.enabled && !envelope.is_internal() {
            if let Some(sender_id) = &envelope.sender_id {
                let superseded = self.repo.supersede_needs_input(&envelope.channel, sender_id, now_millis)?;
                if !superseded.is_empty() {
                    debug!(count = superseded.len(), "superseded stale needs_input runs for new message");
                }
            }
        }

        let team = tinyagi_team::find_team_for_agent(&agent_id, &self.config).map(|(id, team)| (id.to_string(), team.members.clone()));
        let conversation_id = if envelope.is_internal() {
            envelope.conversation_id.clone()
        } else if team.is_some() {
            Some(format!("conv_{}", Uuid::new_v4()))
        } else {
            None
        };

        let mut objective = envelope.message.clone();
        if let (true, Some(conv_id)) = (envelope.is_internal(), &conversation_id) {
            let conversations = self.conversations.lock().await;
            if let Some(conv) = conversations.get(conv_id) {
                let siblings = conv.pending.saturating_sub(1);
                if siblings > 0 {
                    objective = format!("{objective}\n\n[{siblings} other teammate response(s) are still being processed…]");
                }
            }
        }

        let intent = classify_intent(&objective);
        if should_ack(intent, false, envelope.sender_id.as_deref()) {
            self.send_ack(&envelope, now_millis)?;
        }

        let user_id = envelope.sender_id.clone().unwrap_or_else(|| envelope.sender.clone());
        let response_text = self.invoke(&envelope, &agent_id, &objective, conversation_id.as_deref(), now_millis).await;

        match team {
            Some((team_id, members)) => {
                self.process_team_branch(&envelope, &team_id, &members, &agent_id, conversation_id.expect("team branch always has a conversation id"), response_text, now_millis).await?;
            }
            None => {
                self.process_non_team(&envelope, response_text, now_millis)?;
            }
        }

        let _ = user_id;
        self.spooler.delete_processing(&processing_path)?;
        Ok(())
    }

    async fn invoke(&self, envelope: &MessageEnvelope, agent_id: &str, objective: &str, conversation_id: Option<&str>, now_millis: i64) -> String {
        let user_id = envelope.sender_id.clone().unwrap_or_else(|| envelope.sender.clone());
        if self.config.harness.enabled {
            let request = tinyagi_harness::RunRequest {
                message_id: &envelope.message_id,
                task_id: &envelope.message_id,
                channel: &envelope.channel,
                sender: &envelope.sender,
                sender_id: envelope.sender_id.as_deref(),
                conversation_id,
                branch_key: envelope.from_agent.as_deref(),
                from_agent: envelope.from_agent.as_deref(),
                user_id: &user_id,
                objective,
                agent_id,
            };
            match tinyagi_harness::run(
                &self.repo,
                &self.config,
                &self.base_workspace_dir,
                &self.state_home.skills_dir(),
                &self.state_home.memory_raw_dir(),
                self.state_home.root(),
                request,
                now_millis,
            )
            .await
            {
                Ok(result) => result.result_text.unwrap_or_default(),
                Err(err) => {
                    error!(error = %err, "harness run returned an error despite its no-propagate contract");
                    "Something went wrong while processing this request.".to_string()
                }
            }
        } else {
            let Some(agent) = self.config.agents.get(agent_id).or_else(|| self.config.agents.get("default")) else {
                return "No agent is configured to handle this request.".to_string();
            };
            match tinyagi_invoker::invoke(&self.base_workspace_dir, agent_id, agent, objective, false, None).await {
                Ok(text) => text,
                Err(err) => format!("The assigned agent could not complete this request: {err}"),
            }
        }
    }

    fn send_ack(&self, envelope: &MessageEnvelope, now_millis: i64) -> anyhow::Result<()> {
        let ack = MessageEnvelope {
            channel: envelope.channel.clone(),
            sender: envelope.sender.clone(),
            sender_id: envelope.sender_id.clone(),
            message: "On it — working on that now.".to_string(),
            timestamp: now_millis,
            message_id: format!("ack_{}", Uuid::new_v4()),
            agent: None,
            files: None,
            conversation_id: None,
            from_agent: None,
            original_message: Some(envelope.message.clone()),
        };
        self.spooler.write_outgoing(&ack)?;
        Ok(())
    }

    fn write_plain_reply(&self, envelope: &MessageEnvelope, text: String, now_millis: i64) -> anyhow::Result<()> {
        let reply = MessageEnvelope {
            channel: envelope.channel.clone(),
            sender: envelope.sender.clone(),
            sender_id: envelope.sender_id.clone(),
            message: text,
            timestamp: now_millis,
            message_id: format!("{}_reply", envelope.message_id),
            agent: None,
            files: envelope.files.clone(),
            conversation_id: None,
            from_agent: None,
            original_message: Some(envelope.message.clone()),
        };
        self.spooler.write_outgoing(&reply)?;
        Ok(())
    }

    /// Non-team post-processing (spec 4.N step 8): completion prefix,
    /// `[send_file:]` extraction, long-response spill, write + unlink.
    fn process_non_team(&self, envelope: &MessageEnvelope, response_text: String, now_millis: i64) -> anyhow::Result<()> {
        let intent = classify_intent(&envelope.message);
        let (stripped, mut files) = extract_send_file_tags(&response_text);

        let decorated = if intent != Intent::Question && !starts_with_completion_indicator(&stripped) {
            format!("Done! Here's what happened:\n\n{stripped}")
        } else {
            stripped
        };

        let final_text = if decorated.chars().count() > MAX_RESPONSE_CHARS {
            let spill_path = self.state_home.files_dir().join(format!("{}.md", envelope.message_id));
            std::fs::create_dir_all(self.state_home.files_dir())?;
            std::fs::write(&spill_path, &decorated)?;
            files.push(spill_path.to_string_lossy().to_string());
            let truncated: String = decorated.chars().take(MAX_RESPONSE_CHARS).collect();
            format!("{truncated}\n\n…(full response attached)")
        } else {
            decorated
        };

        let outgoing = MessageEnvelope {
            channel: envelope.channel.clone(),
            sender: envelope.sender.clone(),
            sender_id: envelope.sender_id.clone(),
            message: final_text,
            timestamp: now_millis,
            message_id: envelope.message_id.clone(),
            agent: None,
            files: if files.is_empty() { None } else { Some(files) },
            conversation_id: None,
            from_agent: None,
            original_message: Some(envelope.message.clone()),
        };
        self.spooler.write_outgoing(&outgoing)?;
        self.repo.increment_metric("messages_delivered_count", 1.0, serde_json::json!({"channel": envelope.channel}))?;
        Ok(())
    }

    /// Team post-processing (spec 4.N step 9): conversation lookup/create,
    /// mention extraction, re-enqueue, aggregate once `pending == 0`.
    #[allow(clippy::too_many_arguments)]
    async fn process_team_branch(
        &self,
        envelope: &MessageEnvelope,
        team_id: &str,
        members: &[String],
        branch_agent_id: &str,
        conversation_id: String,
        response_text: String,
        now_millis: i64,
    ) -> anyhow::Result<()> {
        let mut conversations = self.conversations.lock().await;
        let conv = conversations.entry(conversation_id.clone()).or_insert_with(|| {
            Conversation::new(team_id.to_string(), envelope.channel.clone(), envelope.sender.clone(), envelope.sender_id.clone(), envelope.message.clone())
        });

        conv.record_branch_response(branch_agent_id, response_text.clone());

        let mentions = tinyagi_team::extract_teammate_mentions(&response_text, branch_agent_id, members);
        for mention in mentions {
            if !conv.can_enqueue_mention() {
                warn!(team = team_id, agent = mention.agent_id, "dropping teammate handoff: conversation reached maxMessages");
                continue;
            }
            conv.record_mention_enqueued(&mention.agent_id);
            let internal = MessageEnvelope {
                channel: envelope.channel.clone(),
                sender: envelope.sender.clone(),
                sender_id: envelope.sender_id.clone(),
                message: mention.text,
                timestamp: now_millis,
                message_id: format!("internal_{}", Uuid::new_v4()),
                agent: Some(mention.agent_id.clone()),
                files: None,
                conversation_id: Some(conversation_id.clone()),
                from_agent: Some(branch_agent_id.to_string()),
                original_message: None,
            };
            self.spooler.write_internal(&internal, &conversation_id, &mention.agent_id, now_millis)?;
        }

        if conv.is_closed() {
            let conv = conversations.remove(&conversation_id).expect("just confirmed closed");
            drop(conversations);

            let aggregated = conv.aggregate();
            let utc_date = chrono::Utc::now().format("%Y-%m-%d").to_string();
            tinyagi_team::append_chat_entry(&self.state_home.chats_dir(team_id), &utc_date, &conv.sender, &conv.original_message, &aggregated)?;

            let outgoing = MessageEnvelope {
                channel: conv.channel.clone(),
                sender: conv.sender.clone(),
                sender_id: conv.sender_id.clone(),
                message: aggregated,
                timestamp: now_millis,
                message_id: envelope.message_id.clone(),
                agent: None,
                files: None,
                conversation_id: None,
                from_agent: None,
                original_message: Some(conv.original_message.clone()),
            };
            self.spooler.write_outgoing(&outgoing)?;
            self.repo.increment_metric("messages_delivered_count", 1.0, serde_json::json!({"channel": envelope.channel}))?;
        }
        Ok(())
    }
}

fn default_agent_id(config: &Config) -> String {
    if config.agents.contains_key("default") {
        "default".to_string()
    } else {
        config.agents.keys().next().cloned().unwrap_or_else(|| "default".to_string())
    }
}

fn starts_with_completion_indicator(text: &str) -> bool {
    let lower = text.trim_start().to_lowercase();
    COMPLETION_PREFIXES.iter().any(|p| lower.starts_with(p))
}

fn send_file_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[send_file:\s*([^\]]+)\]").unwrap())
}

/// Strip every `[send_file: <path>]` tag out of `text`, returning the
/// cleaned text and the extracted paths in order of appearance.
fn extract_send_file_tags(text: &str) -> (String, Vec<String>) {
    let mut files = Vec::new();
    for cap in send_file_regex().captures_iter(text) {
        files.push(cap[1].trim().to_string());
    }
    let cleaned = send_file_regex().replace_all(text, "").trim().to_string();
    (cleaned, files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_send_file_tags_pulls_paths_and_strips_text() {
        let (cleaned, files) = extract_send_file_tags("Here is your report.\n[send_file: /tmp/report.csv]");
        assert_eq!(files, vec!["/tmp/report.csv".to_string()]);
        assert!(!cleaned.contains("send_file"));
        assert!(cleaned.starts_with("Here is your report."));
    }

    #[test]
    fn extract_send_file_tags_handles_no_tags() {
        let (cleaned, files) = extract_send_file_tags("plain response");
        assert!(files.is_empty());
        assert_eq!(cleaned, "plain response");
    }

    #[test]
    fn starts_with_completion_indicator_matches_known_prefixes() {
        assert!(starts_with_completion_indicator("Done! All set."));
        assert!(starts_with_completion_indicator("  completed the task"));
        assert!(!starts_with_completion_indicator("I think we should..."));
    }

    #[test]
    fn default_agent_id_prefers_literal_default() {
        let mut config = Config::default();
        config.agents.insert("default".into(), tinyagi_config::AgentDef { binary: "echo".into(), family: tinyagi_config::AgentFamily::OneShot, args: vec![], model: None, fallback_model: None, workspace: None });
        config.agents.insert("alpha".into(), tinyagi_config::AgentDef { binary: "echo".into(), family: tinyagi_config::AgentFamily::OneShot, args: vec![], model: None, fallback_model: None, workspace: None });
        assert_eq!(default_agent_id(&config), "default");
    }

    #[test]
    fn default_agent_id_falls_back_to_first_configured_agent() {
        let mut config = Config::default();
        config.agents.insert("alpha".into(), tinyagi_config::AgentDef { binary: "echo".into(), family: tinyagi_config::AgentFamily::OneShot, args: vec![], model: None, fallback_model: None, workspace: None });
        assert_eq!(default_agent_id(&config), "alpha");
    }

    /// A `sh -c` fixture agent: ignores every positional arg the invoker
    /// appends (`--model ... -p <message>`) and always prints `reply_text`.
    fn fixture_agent(reply_text: &str) -> tinyagi_config::AgentDef {
        tinyagi_config::AgentDef {
            binary: "sh".into(),
            family: tinyagi_config::AgentFamily::OneShot,
            args: vec!["-c".into(), format!("echo {reply_text}")],
            model: None,
            fallback_model: None,
            workspace: None,
        }
    }

    fn write_incoming(spooler: &Spooler, envelope: &MessageEnvelope) {
        let path = spooler.home().queue_incoming().join(tinyagi_queue::incoming_filename(&envelope.channel, &envelope.message_id));
        std::fs::write(path, serde_json::to_vec(envelope).unwrap()).unwrap();
    }

    fn bare_envelope(channel: &str, message_id: &str, message: &str) -> MessageEnvelope {
        MessageEnvelope {
            channel: channel.to_string(),
            sender: "alice".to_string(),
            sender_id: Some("u1".to_string()),
            message: message.to_string(),
            timestamp: 0,
            message_id: message_id.to_string(),
            agent: None,
            files: None,
            conversation_id: None,
            from_agent: None,
            original_message: None,
        }
    }

    /// S1: a single queued message, harness disabled, is picked up within
    /// one tick and produces exactly one outgoing reply with `processing/`
    /// left empty afterwards.
    #[tokio::test]
    async fn single_message_round_trips_to_outgoing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let state_home = StateHome::at(tmp.path());
        let spooler = Spooler::new(state_home.clone());
        spooler.ensure_dirs().unwrap();

        let mut config = Config::default();
        config.agents.insert("default".into(), fixture_agent("hello-from-fixture"));

        write_incoming(&spooler, &bare_envelope("whatsapp", "m1", "hi there"));

        let processor = QueueProcessor::new(Arc::new(Repository::open_in_memory().unwrap()), config, spooler, state_home.clone(), tmp.path().join("workspaces"));
        processor.tick().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        let outgoing: Vec<_> = std::fs::read_dir(state_home.queue_outgoing()).unwrap().collect();
        assert_eq!(outgoing.len(), 1, "expected exactly one outgoing reply");
        let processing: Vec<_> = std::fs::read_dir(state_home.queue_processing()).unwrap().collect();
        assert!(processing.is_empty(), "processing/ must be empty once delivered");
    }

    /// S2: messages for two distinct agents are dispatched concurrently,
    /// each landing in its own pipeline and both eventually delivered.
    #[tokio::test]
    async fn two_agents_process_independently() {
        let tmp = tempfile::TempDir::new().unwrap();
        let state_home = StateHome::at(tmp.path());
        let spooler = Spooler::new(state_home.clone());
        spooler.ensure_dirs().unwrap();

        let mut config = Config::default();
        config.agents.insert("alpha".into(), fixture_agent("from-alpha"));
        config.agents.insert("beta".into(), fixture_agent("from-beta"));

        let mut a = bare_envelope("whatsapp", "ma", "hi alpha");
        a.agent = Some("alpha".into());
        let mut b = bare_envelope("whatsapp", "mb", "hi beta");
        b.agent = Some("beta".into());
        write_incoming(&spooler, &a);
        write_incoming(&spooler, &b);

        let processor = QueueProcessor::new(Arc::new(Repository::open_in_memory().unwrap()), config, spooler, state_home.clone(), tmp.path().join("workspaces"));
        processor.tick().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        let outgoing: Vec<_> = std::fs::read_dir(state_home.queue_outgoing()).unwrap().collect();
        assert_eq!(outgoing.len(), 2, "both agents' replies must be delivered");
    }
}
