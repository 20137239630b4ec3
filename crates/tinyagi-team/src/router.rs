// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use regex::Regex;
use std::sync::OnceLock;
use tinyagi_config::Config;

/// Outcome of parsing a leading `@agent`/`@team` mention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    Agent(String),
    /// Several distinct agents were mentioned at once; the easter-egg path
    /// returns this unchanged to the sender rather than guessing (spec 4.C).
    Ambiguous,
}

/// One teammate handoff extracted from a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeammateMention {
    pub agent_id: String,
    pub text: String,
}

fn mention_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@([A-Za-z0-9_-]+)").unwrap())
}

fn handoff_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Non-greedy across newlines: `[\s\S]*?` rather than `.*?`, since `.`
    // does not match `\n` by default.
    RE.get_or_init(|| Regex::new(r"\[@([A-Za-z0-9_-]+):\s*([\s\S]*?)\]").unwrap())
}

/// True if byte offset `idx` in `text` falls inside a `[...]` bracket span.
fn inside_brackets(text: &str, idx: usize) -> bool {
    let mut depth = 0i32;
    for (i, c) in text.char_indices() {
        if i >= idx {
            break;
        }
        match c {
            '[' => depth += 1,
            ']' => depth -= 1,
            _ => {}
        }
    }
    depth > 0
}

/// Resolve an `@ident` token to an agentId: a team name resolves to its
/// leader, an agent name resolves to itself.
fn resolve_ident(ident: &str, config: &Config) -> Option<String> {
    if let Some(team) = config.teams.get(ident) {
        return Some(team.leader.clone());
    }
    if config.agents.contains_key(ident) {
        return Some(ident.to_string());
    }
    None
}

/// Parse every top-level `@ident` mention in `message` (ignoring ones
/// nested inside `[...]`) and resolve to a route decision. Returns `None`
/// when no mention resolves to a known agent or team (fall through to
/// pre-routed field / default agent).
pub fn parse_route(message: &str, config: &Config) -> Option<RouteTarget> {
    let mut resolved = Vec::new();
    for cap in mention_regex().captures_iter(message) {
        let m = cap.get(0).unwrap();
        if inside_brackets(message, m.start()) {
            continue;
        }
        if let Some(agent_id) = resolve_ident(&cap[1], config) {
            if !resolved.contains(&agent_id) {
                resolved.push(agent_id);
            }
        }
    }
    match resolved.len() {
        0 => None,
        1 => Some(RouteTarget::Agent(resolved.into_iter().next().unwrap())),
        _ => Some(RouteTarget::Ambiguous),
    }
}

/// Extract `[@teammate: free text]` handoffs from a branch's response,
/// dropping any mention that re-targets `sender_agent` or an agent outside
/// `team_members`.
pub fn extract_teammate_mentions(response: &str, sender_agent: &str, team_members: &[String]) -> Vec<TeammateMention> {
    handoff_regex()
        .captures_iter(response)
        .filter_map(|cap| {
            let agent_id = cap[1].to_string();
            if agent_id == sender_agent {
                return None;
            }
            if !team_members.iter().any(|m| m == &agent_id) {
                return None;
            }
            Some(TeammateMention { agent_id, text: cap[2].trim().to_string() })
        })
        .collect()
}

/// The team containing `agent_id` as leader, else the first team that
/// lists it as a member (spec 4.C).
pub fn find_team_for_agent<'a>(agent_id: &str, config: &'a Config) -> Option<(&'a str, &'a tinyagi_config::TeamDef)> {
    if let Some((id, team)) = config.teams.iter().find(|(_, t)| t.leader == agent_id) {
        return Some((id.as_str(), team));
    }
    config
        .teams
        .iter()
        .find(|(_, t)| t.members.iter().any(|m| m == agent_id))
        .map(|(id, t)| (id.as_str(), t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinyagi_config::{AgentDef, AgentFamily, TeamDef};

    fn config_with(agents: &[&str], teams: &[(&str, &str, &[&str])]) -> Config {
        let mut cfg = Config::default();
        for a in agents {
            cfg.agents.insert(
                a.to_string(),
                AgentDef { binary: "echo".into(), family: AgentFamily::OneShot, args: vec![], model: None, fallback_model: None, workspace: None },
            );
        }
        for (id, leader, members) in teams {
            cfg.teams.insert(
                id.to_string(),
                TeamDef { leader: leader.to_string(), members: members.iter().map(|m| m.to_string()).collect() },
            );
        }
        cfg
    }

    #[test]
    fn single_agent_mention_routes_directly() {
        let cfg = config_with(&["alpha", "beta"], &[]);
        assert_eq!(parse_route("@alpha do the thing", &cfg), Some(RouteTarget::Agent("alpha".into())));
    }

    #[test]
    fn team_mention_routes_to_leader() {
        let cfg = config_with(&["alpha", "beta"], &[("eng", "alpha", &["alpha", "beta"])]);
        assert_eq!(parse_route("@eng ship it", &cfg), Some(RouteTarget::Agent("alpha".into())));
    }

    #[test]
    fn multiple_distinct_agents_is_ambiguous() {
        let cfg = config_with(&["alpha", "beta"], &[]);
        assert_eq!(parse_route("@alpha and @beta please", &cfg), Some(RouteTarget::Ambiguous));
    }

    #[test]
    fn mention_inside_brackets_is_ignored() {
        let cfg = config_with(&["alpha", "beta"], &[]);
        assert_eq!(parse_route("see [@beta: ignored] @alpha go", &cfg), Some(RouteTarget::Agent("alpha".into())));
    }

    #[test]
    fn unknown_mention_resolves_to_none() {
        let cfg = config_with(&["alpha"], &[]);
        assert_eq!(parse_route("@nobody hello", &cfg), None);
    }

    #[test]
    fn extract_teammate_mentions_parses_multiple_handoffs() {
        let members = vec!["alpha".to_string(), "beta".to_string()];
        let response = "Done.\n[@beta: please review the PR]\nsome text\n[@alpha: thanks]";
        let mentions = extract_teammate_mentions(response, "alpha", &members);
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].agent_id, "beta");
        assert_eq!(mentions[0].text, "please review the PR");
    }

    #[test]
    fn extract_teammate_mentions_rejects_self_mention() {
        let members = vec!["alpha".to_string()];
        let response = "[@alpha: talking to myself]";
        assert!(extract_teammate_mentions(response, "alpha", &members).is_empty());
    }

    #[test]
    fn extract_teammate_mentions_rejects_non_team_agent() {
        let members = vec!["alpha".to_string(), "beta".to_string()];
        let response = "[@gamma: not on this team]";
        assert!(extract_teammate_mentions(response, "alpha", &members).is_empty());
    }

    #[test]
    fn find_team_for_agent_prefers_leader_match() {
        let cfg = config_with(&["alpha", "beta"], &[("eng", "alpha", &["alpha", "beta"])]);
        let (id, _) = find_team_for_agent("alpha", &cfg).unwrap();
        assert_eq!(id, "eng");
    }

    #[test]
    fn find_team_for_agent_falls_back_to_member_match() {
        let cfg = config_with(&["alpha", "beta"], &[("eng", "alpha", &["alpha", "beta"])]);
        let (id, _) = find_team_for_agent("beta", &cfg).unwrap();
        assert_eq!(id, "eng");
    }
}
