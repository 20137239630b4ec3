// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Serde default helper — returns `true`.
///
/// Used for config fields that should be enabled unless the user explicitly
/// sets them to `false`.  `#[serde(default)]` on a `bool` always falls back
/// to `bool::default()` (i.e. `false`), so a named function is required.
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Default model, used only by the memory service's optional context
    /// summarizer prompt — never to drive the agent invoker, which treats
    /// agent CLIs as opaque subprocesses.
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub harness: HarnessConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    /// agentId -> definition. The id `"default"` is used when a message
    /// cannot be routed to a more specific agent.
    #[serde(default)]
    pub agents: HashMap<String, AgentDef>,
    /// teamId -> definition.
    #[serde(default)]
    pub teams: HashMap<String, TeamDef>,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider identifier. Common values: "openai" | "anthropic" | "google"
    /// | "azure" | "aws" | "groq" | "openrouter" | "ollama" | "mistral" |
    /// "deepseek" | "mock"
    pub provider: String,
    pub name: String,
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            name: "gpt-4o-mini".into(),
            api_key_env: None,
            base_url: None,
            max_tokens: Some(1024),
            temperature: Some(0.2),
        }
    }
}

// ─── Harness ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum, Default)]
#[serde(rename_all = "lowercase")]
pub enum Autonomy {
    Low,
    #[default]
    Normal,
    Strict,
}

impl std::fmt::Display for Autonomy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Autonomy::Low => write!(f, "low"),
            Autonomy::Normal => write!(f, "normal"),
            Autonomy::Strict => write!(f, "strict"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuietHours {
    /// Local time "HH:MM", inclusive start of the quiet window.
    pub start: String,
    /// Local time "HH:MM", exclusive end of the quiet window.
    /// `start > end` denotes a window that wraps past midnight (e.g. 22:00..07:00).
    pub end: String,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            start: "22:00".into(),
            end: "07:00".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BrowserProvider {
    #[default]
    Auto,
    Cdp,
    Broker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub provider: BrowserProvider,
    pub profile_path: Option<String>,
    pub profile_directory: Option<String>,
    pub debugger_url: Option<String>,
    #[serde(default = "BrowserConfig::default_debugger_ports")]
    pub debugger_ports: (u16, u16),
    pub mcp_channel: Option<String>,
    #[serde(default)]
    pub open_domain_access: bool,
    #[serde(default = "default_true")]
    pub hard_stop_payments: bool,
    /// When set, browser-route runs are forced onto this agentId regardless
    /// of the normal routing decision.
    pub use_claude_chrome: Option<String>,
}

impl BrowserConfig {
    fn default_debugger_ports() -> (u16, u16) {
        (9222, 9621)
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: BrowserProvider::Auto,
            profile_path: None,
            profile_directory: None,
            debugger_url: None,
            debugger_ports: Self::default_debugger_ports(),
            mcp_channel: None,
            open_domain_access: false,
            hard_stop_payments: true,
            use_claude_chrome: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub autonomy: Autonomy,
    #[serde(default)]
    pub quiet_hours: QuietHours,
    #[serde(default = "HarnessConfig::default_digest_time")]
    pub digest_time: String,
    #[serde(default)]
    pub browser: BrowserConfig,
}

impl HarnessConfig {
    fn default_digest_time() -> String {
        "08:00".into()
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            autonomy: Autonomy::default(),
            quiet_hours: QuietHours::default(),
            digest_time: Self::default_digest_time(),
            browser: BrowserConfig::default(),
        }
    }
}

// ─── Channels ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsappConfig {
    #[serde(default)]
    pub self_command_only: bool,
    #[serde(default = "WhatsappConfig::default_prefix")]
    pub self_command_prefix: String,
    #[serde(default)]
    pub require_self_chat: bool,
}

impl WhatsappConfig {
    fn default_prefix() -> String {
        "/".into()
    }
}

impl Default for WhatsappConfig {
    fn default() -> Self {
        Self {
            self_command_only: false,
            self_command_prefix: Self::default_prefix(),
            require_self_chat: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub whatsapp: WhatsappConfig,
}

// ─── Agents / teams ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentFamily {
    /// One-shot invocation plus a conversation-continuation flag.
    OneShot,
    /// Framed newline-delimited JSON event stream.
    Framed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDef {
    /// Executable name or absolute path, launched with argv only (no shell).
    pub binary: String,
    pub family: AgentFamily,
    #[serde(default)]
    pub args: Vec<String>,
    /// Model name forwarded via `--model` (OneShot) or provider default (Framed).
    pub model: Option<String>,
    /// Fallback model tried once after the primary reports the model is
    /// unavailable ("does not exist" / "no access" / "invalid model").
    pub fallback_model: Option<String>,
    /// Per-agent workspace directory, created on first invocation if missing.
    pub workspace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamDef {
    pub leader: String,
    pub members: Vec<String>,
}

// ─── Tooling executor ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "ToolsConfig::default_allowlist")]
    pub allowlist: Vec<String>,
    #[serde(default = "ToolsConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "ToolsConfig::default_output_cap_bytes")]
    pub output_cap_bytes: usize,
}

impl ToolsConfig {
    fn default_allowlist() -> Vec<String> {
        ["npm", "npx", "pip", "pip3", "brew", "git", "docker", "pnpm", "yarn"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
    fn default_timeout_secs() -> u64 {
        120
    }
    fn default_output_cap_bytes() -> usize {
        24 * 1024
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            allowlist: Self::default_allowlist(),
            timeout_secs: Self::default_timeout_secs(),
            output_cap_bytes: Self::default_output_cap_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_model_provider_is_openai() {
        let c = Config::default();
        assert_eq!(c.model.provider, "openai");
    }

    #[test]
    fn config_default_harness_enabled() {
        let c = Config::default();
        assert!(c.harness.enabled);
    }

    #[test]
    fn config_default_autonomy_is_normal() {
        let c = Config::default();
        assert_eq!(c.harness.autonomy, Autonomy::Normal);
    }

    #[test]
    fn autonomy_display() {
        assert_eq!(Autonomy::Low.to_string(), "low");
        assert_eq!(Autonomy::Normal.to_string(), "normal");
        assert_eq!(Autonomy::Strict.to_string(), "strict");
    }

    #[test]
    fn config_default_quiet_hours_wraps_overnight() {
        let c = Config::default();
        assert_eq!(c.harness.quiet_hours.start, "22:00");
        assert_eq!(c.harness.quiet_hours.end, "07:00");
    }

    #[test]
    fn config_default_digest_time() {
        let c = Config::default();
        assert_eq!(c.harness.digest_time, "08:00");
    }

    #[test]
    fn config_default_browser_disabled() {
        let c = Config::default();
        assert!(!c.harness.browser.enabled);
    }

    #[test]
    fn config_default_browser_hard_stop_payments_true() {
        let c = Config::default();
        assert!(c.harness.browser.hard_stop_payments);
    }

    #[test]
    fn config_default_browser_debugger_port_range() {
        let c = Config::default();
        assert_eq!(c.harness.browser.debugger_ports, (9222, 9621));
    }

    #[test]
    fn config_default_tools_allowlist_contains_npm() {
        let c = Config::default();
        assert!(c.tools.allowlist.iter().any(|t| t == "npm"));
    }

    #[test]
    fn config_default_tools_timeout_120s() {
        let c = Config::default();
        assert_eq!(c.tools.timeout_secs, 120);
    }

    #[test]
    fn config_default_agents_and_teams_empty() {
        let c = Config::default();
        assert!(c.agents.is_empty());
        assert!(c.teams.is_empty());
    }

    #[test]
    fn agent_def_yaml_round_trip() {
        let yaml = r#"
agents:
  alpha:
    binary: claude
    family: framed
    args: ["--json"]
    model: claude-sonnet
"#;
        let c: Config = serde_yaml::from_str(yaml).unwrap();
        let a = c.agents.get("alpha").unwrap();
        assert_eq!(a.binary, "claude");
        assert_eq!(a.family, AgentFamily::Framed);
        assert_eq!(a.args, vec!["--json".to_string()]);
    }

    #[test]
    fn team_def_yaml_round_trip() {
        let yaml = r#"
teams:
  eng:
    leader: alpha
    members: [alpha, beta]
"#;
        let c: Config = serde_yaml::from_str(yaml).unwrap();
        let t = c.teams.get("eng").unwrap();
        assert_eq!(t.leader, "alpha");
        assert_eq!(t.members.len(), 2);
    }

    #[test]
    fn config_serialises_to_valid_yaml() {
        let c = Config::default();
        let yaml_str = serde_yaml::to_string(&c).unwrap();
        assert!(yaml_str.contains("harness"));
        assert!(yaml_str.contains("autonomy"));
    }

    #[test]
    fn config_partial_yaml_fills_in_defaults() {
        let yaml_str = "harness:\n  enabled: false\n";
        let c: Config = serde_yaml::from_str(yaml_str).unwrap();
        assert!(!c.harness.enabled);
        assert_eq!(c.harness.autonomy, Autonomy::Normal);
    }

    #[test]
    fn whatsapp_config_defaults() {
        let c = Config::default();
        assert!(!c.channels.whatsapp.self_command_only);
        assert_eq!(c.channels.whatsapp.self_command_prefix, "/");
    }
}
