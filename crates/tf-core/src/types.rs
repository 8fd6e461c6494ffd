use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    TeamLead,
    Member,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::TeamLead => write!(f, "team_lead"),
            Role::Member => write!(f, "member"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "team_lead" => Ok(Role::TeamLead),
            "member" => Ok(Role::Member),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub avatar: String,
    pub created_at: DateTime<Utc>,
}

/// Fields for a user that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub avatar: String,
}

impl NewUser {
    /// Build a user with the generated avatar URI for `name`.
    pub fn new(name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        let name = name.into();
        let avatar = default_avatar(&name);
        Self {
            name,
            email: email.into(),
            role,
            avatar,
        }
    }
}

/// Avatar URI derived from a display name (whitespace stripped from the seed).
pub fn default_avatar(name: &str) -> String {
    let seed: String = name.chars().filter(|c| !c.is_whitespace()).collect();
    format!("https://api.dicebear.com/7.x/avataaars/svg?seed={seed}")
}

// ---------------------------------------------------------------------------
// Team
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    /// Ordered matching vocabulary handed to the classification oracle.
    pub skills: Vec<String>,
    pub lead_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTeam {
    pub name: String,
    pub skills: Vec<String>,
}

/// Partial update for a team. `None` leaves a field untouched; for `lead_id`
/// `Some(None)` clears the lead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamPatch {
    pub name: Option<String>,
    pub skills: Option<Vec<String>>,
    pub lead_id: Option<Option<Uuid>>,
}

// ---------------------------------------------------------------------------
// TeamMembership
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMembership {
    pub id: Uuid,
    pub team_id: Uuid,
    pub member_id: Uuid,
    /// Count of the member's non-completed tasks. Always overwritten by the
    /// workload calculator; any stored value is only a seed.
    pub workload: u32,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Progress / TaskStatus
// ---------------------------------------------------------------------------

/// Completion percentage, guaranteed to lie in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Progress(u8);

impl Progress {
    pub const ZERO: Progress = Progress(0);
    pub const COMPLETE: Progress = Progress(100);

    /// Returns `None` when `value` is outside `0..=100`.
    pub fn new(value: i64) -> Option<Self> {
        if (0..=100).contains(&value) {
            Some(Progress(value as u8))
        } else {
            None
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Progress {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Progress::new(value).ok_or_else(|| format!("progress {value} is outside 0..=100"))
    }
}

impl From<Progress> for u8 {
    fn from(p: Progress) -> u8 {
        p.0
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    /// 0 is `Pending`, 100 is `Completed`, anything between is `InProgress`.
    pub fn from_progress(progress: Progress) -> Self {
        match progress.value() {
            0 => TaskStatus::Pending,
            100 => TaskStatus::Completed,
            _ => TaskStatus::InProgress,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "Pending"),
            TaskStatus::InProgress => write!(f, "InProgress"),
            TaskStatus::Completed => write!(f, "Completed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A unit of work. The status is never stored; it is always read through
/// [`Task::status`] so it cannot drift from `progress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub assigned_team_id: Option<Uuid>,
    /// `None` when no eligible member existed at assignment time.
    pub assigned_member_id: Option<Uuid>,
    pub progress: Progress,
    pub deadline: NaiveDate,
    pub overload_flag: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_progress(self.progress)
    }

    pub fn is_active(&self) -> bool {
        self.status() != TaskStatus::Completed
    }

    /// Apply a patch in place, bumping `updated_at`.
    pub fn apply(&mut self, patch: &TaskPatch, now: DateTime<Utc>) {
        if let Some(progress) = patch.progress {
            self.progress = progress;
        }
        if let Some(member) = patch.assigned_member_id {
            self.assigned_member_id = member;
        }
        if let Some(flag) = patch.overload_flag {
            self.overload_flag = flag;
        }
        self.updated_at = now;
    }
}

/// Fields of a freshly assigned task. Progress starts at zero and the
/// overload flag starts cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub deadline: NaiveDate,
    pub assigned_team_id: Option<Uuid>,
    pub assigned_member_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    pub progress: Option<Progress>,
    pub assigned_member_id: Option<Option<Uuid>>,
    pub overload_flag: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.progress.is_none() && self.assigned_member_id.is_none() && self.overload_flag.is_none()
    }
}

// ---------------------------------------------------------------------------
// AgentLog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentName {
    #[serde(rename = "RAG")]
    Rag,
    Assignment,
    Progress,
    Reassignment,
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentName::Rag => write!(f, "RAG"),
            AgentName::Assignment => write!(f, "Assignment"),
            AgentName::Progress => write!(f, "Progress"),
            AgentName::Reassignment => write!(f, "Reassignment"),
        }
    }
}

impl std::str::FromStr for AgentName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RAG" => Ok(AgentName::Rag),
            "Assignment" => Ok(AgentName::Assignment),
            "Progress" => Ok(AgentName::Progress),
            "Reassignment" => Ok(AgentName::Reassignment),
            other => Err(format!("unknown agent: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentLog {
    pub id: Uuid,
    pub task_id: Uuid,
    pub agent_name: AgentName,
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

/// An audit entry not yet bound to a stored task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub agent_name: AgentName,
    pub action: String,
}

impl LogEntry {
    pub fn new(agent_name: AgentName, action: impl Into<String>) -> Self {
        Self {
            agent_name,
            action: action.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
