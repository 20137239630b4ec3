// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Implements `Display`, `FromStr`, and rusqlite `ToSql`/`FromSql` for a
/// fieldless enum backed by its lowercase-snake variant name. Every durable
/// enum column stores the `Display` string, not an integer discriminant, so
/// the on-disk rows stay readable with a plain `sqlite3` shell.
macro_rules! sql_enum {
    ($name:ident { $($variant:ident => $str:literal),+ $(,)? }) => {
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let s = match self {
                    $(Self::$variant => $str,)+
                };
                write!(f, "{s}")
            }
        }

        impl FromStr for $name {
            type Err = String;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($str => Ok(Self::$variant),)+
                    other => Err(format!(concat!(stringify!($name), ": unknown value {:?}"), other)),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.to_string()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                Self::from_str(s).map_err(|e| FromSqlError::Other(e.into()))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}
sql_enum!(RiskLevel {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

impl RiskLevel {
    /// Iteration budget for the loop engine (spec 4.F).
    pub fn budget(self) -> u32 {
        match self {
            RiskLevel::Low => 1,
            RiskLevel::Medium => 3,
            RiskLevel::High | RiskLevel::Critical => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
    Agent,
    Tooling,
    Browser,
    Memory,
}
sql_enum!(Route {
    Agent => "agent",
    Tooling => "tooling",
    Browser => "browser",
    Memory => "memory",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Queued,
    InProgress,
    NeedsInput,
    NeedsRevision,
    Verified,
    Rejected,
    AwaitingApproval,
    Sent,
    Failed,
}
sql_enum!(TaskStatus {
    Queued => "queued",
    InProgress => "in_progress",
    NeedsInput => "needs_input",
    NeedsRevision => "needs_revision",
    Verified => "verified",
    Rejected => "rejected",
    AwaitingApproval => "awaiting_approval",
    Sent => "sent",
    Failed => "failed",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerifierOutcome {
    Pass,
    MinorFix,
    CriticalFail,
    Abstain,
}
sql_enum!(VerifierOutcome {
    Pass => "pass",
    MinorFix => "minor_fix",
    CriticalFail => "critical_fail",
    Abstain => "abstain",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRun {
    pub run_id: String,
    pub task_id: String,
    pub channel: String,
    pub sender: String,
    pub sender_id: Option<String>,
    pub conversation_id: Option<String>,
    pub branch_key: Option<String>,
    pub objective: String,
    pub risk_level: RiskLevel,
    pub status: TaskStatus,
    pub assigned_agent: String,
    pub loop_iteration: u32,
    pub max_iterations: u32,
    pub verifier_outcome: Option<VerifierOutcome>,
    pub result_text: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub event_id: String,
    pub run_id: String,
    pub kind: String,
    pub payload: serde_json::Value,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStep {
    pub step_id: String,
    pub run_id: String,
    pub iteration: u32,
    pub kind: String,
    pub payload: serde_json::Value,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryCategory {
    Preferences,
    Projects,
    Workflows,
    Contacts,
    TaskStates,
    ConfirmedFacts,
}
sql_enum!(MemoryCategory {
    Preferences => "preferences",
    Projects => "projects",
    Workflows => "workflows",
    Contacts => "contacts",
    TaskStates => "task_states",
    ConfirmedFacts => "confirmed_facts",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub record_id: String,
    pub user_id: String,
    pub category: MemoryCategory,
    pub key: String,
    pub value: String,
    pub confidence: f64,
    pub source_run_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    Active,
    Revoked,
    Pending,
}
sql_enum!(PermissionStatus {
    Active => "active",
    Revoked => "revoked",
    Pending => "pending",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub permission_id: String,
    pub user_id: String,
    pub subject: String,
    pub action: String,
    pub resource: Option<String>,
    pub status: PermissionStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustClass {
    Curated,
    Mainstream,
    Unknown,
}
sql_enum!(TrustClass {
    Curated => "curated",
    Mainstream => "mainstream",
    Unknown => "unknown",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolStatus {
    Approved,
    Blocked,
    Pending,
}
sql_enum!(ToolStatus {
    Approved => "approved",
    Blocked => "blocked",
    Pending => "pending",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRegistryRow {
    pub tool_id: String,
    pub name: String,
    pub source: String,
    pub trust_class: TrustClass,
    pub status: ToolStatus,
    pub metadata: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TabStatus {
    Active,
    Error,
    Released,
}
sql_enum!(TabStatus {
    Active => "active",
    Error => "error",
    Released => "released",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSession {
    pub session_id: String,
    pub host: String,
    pub port: u16,
    pub profile_path: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserTab {
    pub tab_id: String,
    pub session_id: String,
    pub run_id: String,
    pub status: TabStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserAction {
    pub action_id: String,
    pub run_id: String,
    pub tab_id: String,
    pub step_index: u32,
    pub kind: String,
    pub selector: Option<String>,
    pub value: Option<String>,
    pub risk: RiskLevel,
    pub requires_approval: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
}
sql_enum!(ApprovalStatus {
    Pending => "pending",
    Approved => "approved",
    Denied => "denied",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserApproval {
    pub approval_id: String,
    pub action_id: String,
    pub user_id: String,
    pub status: ApprovalStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserAudit {
    pub audit_id: String,
    pub action_id: String,
    pub before_screenshot: Option<String>,
    pub after_screenshot: Option<String>,
    pub selector_trace: serde_json::Value,
    pub outcome: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelPendingMessage {
    pub message_id: String,
    pub channel: String,
    pub sender: String,
    pub sender_id: Option<String>,
    pub chat_ref: String,
    pub reply_ref: Option<String>,
    pub expires_at: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricEvent {
    pub event_id: String,
    pub name: String,
    pub delta: f64,
    pub metadata: serde_json::Value,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkillStatus {
    Draft,
    Active,
    Disabled,
}
sql_enum!(SkillStatus {
    Draft => "draft",
    Active => "active",
    Disabled => "disabled",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub skill_id: String,
    pub name: String,
    pub status: SkillStatus,
    pub current_content_path: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillVersion {
    pub skill_id: String,
    pub version: u32,
    pub content_path: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySummary {
    pub summary_date: String,
    pub content_path: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_round_trips_through_display_and_from_str() {
        for (lvl, s) in [
            (RiskLevel::Low, "low"),
            (RiskLevel::Medium, "medium"),
            (RiskLevel::High, "high"),
            (RiskLevel::Critical, "critical"),
        ] {
            assert_eq!(lvl.to_string(), s);
            assert_eq!(RiskLevel::from_str(s).unwrap(), lvl);
        }
    }

    #[test]
    fn risk_level_budget_matches_spec() {
        assert_eq!(RiskLevel::Low.budget(), 1);
        assert_eq!(RiskLevel::Medium.budget(), 3);
        assert_eq!(RiskLevel::High.budget(), 5);
        assert_eq!(RiskLevel::Critical.budget(), 5);
    }

    #[test]
    fn task_status_unknown_value_is_error() {
        assert!(TaskStatus::from_str("bogus").is_err());
    }

    #[test]
    fn route_display_values() {
        assert_eq!(Route::Browser.to_string(), "browser");
        assert_eq!(Route::Tooling.to_string(), "tooling");
        assert_eq!(Route::Memory.to_string(), "memory");
        assert_eq!(Route::Agent.to_string(), "agent");
    }
}

