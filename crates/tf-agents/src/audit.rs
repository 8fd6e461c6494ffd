//! Audit trail wording and read-side views.
//!
//! Entries are append-only and never read back by the engines.

use tf_core::types::{AgentLog, AgentName, LogEntry, Progress, User};
use uuid::Uuid;

/// Fallback text when no member of the chosen team exists.
pub const NO_MEMBER_ACTION: &str = "No members available in team. Task unassigned.";

/// Display name for a member, or `User <id>` when no user record exists.
pub fn display_name(member_id: Uuid, users: &[User]) -> String {
    users
        .iter()
        .find(|u| u.id == member_id)
        .map(|u| u.name.clone())
        .unwrap_or_else(|| format!("User {member_id}"))
}

pub fn team_selected(team_name: &str, reasoning: &str) -> LogEntry {
    LogEntry::new(
        AgentName::Rag,
        format!("Selected Team {team_name}. Reason: {reasoning}"),
    )
}

pub fn auto_assigned(member_name: &str, workload: u32) -> LogEntry {
    LogEntry::new(
        AgentName::Assignment,
        format!("Auto-assigned to {member_name} (Current Workload: {workload})"),
    )
}

pub fn unassigned() -> LogEntry {
    LogEntry::new(AgentName::Assignment, NO_MEMBER_ACTION)
}

pub fn progress_updated(progress: Progress) -> LogEntry {
    LogEntry::new(
        AgentName::Progress,
        format!("User updated progress to {progress}"),
    )
}

pub fn flagged(suggestion: &str) -> LogEntry {
    LogEntry::new(AgentName::Reassignment, format!("FLAGGED: {suggestion}"))
}

pub fn reassigned(member_name: &str) -> LogEntry {
    LogEntry::new(
        AgentName::Reassignment,
        format!("Re-assigned task to {member_name} to relieve load."),
    )
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// A newest-first snapshot of the audit trail.
#[derive(Debug, Clone, Default)]
pub struct AuditView {
    logs: Vec<AgentLog>,
}

impl AuditView {
    /// Wrap logs already ordered newest first, as the store returns them.
    pub fn new(logs: Vec<AgentLog>) -> Self {
        Self { logs }
    }

    pub fn all(&self) -> &[AgentLog] {
        &self.logs
    }

    pub fn for_task(&self, task_id: Uuid) -> Vec<&AgentLog> {
        self.logs.iter().filter(|l| l.task_id == task_id).collect()
    }

    pub fn for_agent(&self, agent: AgentName) -> Vec<&AgentLog> {
        self.logs.iter().filter(|l| l.agent_name == agent).collect()
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}
