//! Entity store contract and an in-memory implementation.
//!
//! The store owns the canonical copies of every entity. Lists come back in
//! insertion order, except [`EntityStore::list_logs`] which is newest first.
//! Operations that create or change a task take the audit entries describing
//! the change so a backend can commit both together or not at all.

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::{
    AgentLog, LogEntry, NewTask, NewTeam, NewUser, Progress, Role, Task, TaskPatch, Team,
    TeamMembership, TeamPatch, User,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<tokio_rusqlite::Error> for StoreError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// EntityStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait EntityStore: Send + Sync {
    // --- users ---
    async fn list_users(&self) -> StoreResult<Vec<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    /// Fails with [`StoreError::Conflict`] when the email is already taken.
    async fn create_user(&self, new: NewUser) -> StoreResult<User>;
    async fn update_user_role(&self, id: Uuid, role: Role) -> StoreResult<User>;

    // --- teams ---
    async fn list_teams(&self) -> StoreResult<Vec<Team>>;
    async fn create_team(&self, new: NewTeam) -> StoreResult<Team>;
    async fn update_team(&self, id: Uuid, patch: TeamPatch) -> StoreResult<Team>;

    // --- memberships ---
    async fn list_memberships(&self) -> StoreResult<Vec<TeamMembership>>;
    /// Fails with `NotFound` for an unknown team and `Conflict` when the
    /// `(team_id, member_id)` pair already exists.
    async fn create_membership(&self, team_id: Uuid, member_id: Uuid)
        -> StoreResult<TeamMembership>;
    /// Persist recomputed workloads, matched by membership id.
    async fn save_workloads(&self, memberships: &[TeamMembership]) -> StoreResult<()>;

    // --- tasks ---
    async fn list_tasks(&self) -> StoreResult<Vec<Task>>;
    async fn get_task(&self, id: Uuid) -> StoreResult<Option<Task>>;
    /// Insert a task together with its audit entries.
    async fn create_task(
        &self,
        new: NewTask,
        logs: Vec<LogEntry>,
    ) -> StoreResult<(Task, Vec<AgentLog>)>;
    /// Patch a task and append its audit entries in one step.
    async fn update_task(
        &self,
        id: Uuid,
        patch: TaskPatch,
        logs: Vec<LogEntry>,
    ) -> StoreResult<(Task, Vec<AgentLog>)>;

    // --- audit ---
    async fn append_log(&self, task_id: Uuid, entry: LogEntry) -> StoreResult<AgentLog>;
    /// Newest first.
    async fn list_logs(&self) -> StoreResult<Vec<AgentLog>>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryState {
    users: Vec<User>,
    teams: Vec<Team>,
    memberships: Vec<TeamMembership>,
    tasks: Vec<Task>,
    /// Append order; reversed on read.
    logs: Vec<AgentLog>,
}

impl MemoryState {
    fn bind_logs(&mut self, task_id: Uuid, entries: Vec<LogEntry>) -> Vec<AgentLog> {
        let now = Utc::now();
        let logs: Vec<AgentLog> = entries
            .into_iter()
            .map(|e| AgentLog {
                id: Uuid::new_v4(),
                task_id,
                agent_name: e.agent_name,
                action: e.action,
                timestamp: now,
            })
            .collect();
        self.logs.extend(logs.iter().cloned());
        logs
    }
}

/// Process-local store used for tests, demos, and the `memory` backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(self.state.read().await.users.clone())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.iter().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let mut state = self.state.write().await;
        if state.users.iter().any(|u| u.email == new.email) {
            return Err(StoreError::Conflict(format!(
                "user with email {} already exists",
                new.email
            )));
        }
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            role: new.role,
            avatar: new.avatar,
            created_at: Utc::now(),
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn update_user_role(&self, id: Uuid, role: Role) -> StoreResult<User> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(StoreError::NotFound { entity: "user", id })?;
        user.role = role;
        Ok(user.clone())
    }

    async fn list_teams(&self) -> StoreResult<Vec<Team>> {
        Ok(self.state.read().await.teams.clone())
    }

    async fn create_team(&self, new: NewTeam) -> StoreResult<Team> {
        let team = Team {
            id: Uuid::new_v4(),
            name: new.name,
            skills: new.skills,
            lead_id: None,
            created_at: Utc::now(),
        };
        self.state.write().await.teams.push(team.clone());
        Ok(team)
    }

    async fn update_team(&self, id: Uuid, patch: TeamPatch) -> StoreResult<Team> {
        let mut state = self.state.write().await;
        let team = state
            .teams
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StoreError::NotFound { entity: "team", id })?;
        if let Some(name) = patch.name {
            team.name = name;
        }
        if let Some(skills) = patch.skills {
            team.skills = skills;
        }
        if let Some(lead) = patch.lead_id {
            team.lead_id = lead;
        }
        Ok(team.clone())
    }

    async fn list_memberships(&self) -> StoreResult<Vec<TeamMembership>> {
        Ok(self.state.read().await.memberships.clone())
    }

    async fn create_membership(
        &self,
        team_id: Uuid,
        member_id: Uuid,
    ) -> StoreResult<TeamMembership> {
        let mut state = self.state.write().await;
        if !state.teams.iter().any(|t| t.id == team_id) {
            return Err(StoreError::NotFound {
                entity: "team",
                id: team_id,
            });
        }
        if state
            .memberships
            .iter()
            .any(|m| m.team_id == team_id && m.member_id == member_id)
        {
            return Err(StoreError::Conflict(format!(
                "member {member_id} already belongs to team {team_id}"
            )));
        }
        let membership = TeamMembership {
            id: Uuid::new_v4(),
            team_id,
            member_id,
            workload: 0,
            created_at: Utc::now(),
        };
        state.memberships.push(membership.clone());
        Ok(membership)
    }

    async fn save_workloads(&self, memberships: &[TeamMembership]) -> StoreResult<()> {
        let mut state = self.state.write().await;
        for updated in memberships {
            if let Some(m) = state.memberships.iter_mut().find(|m| m.id == updated.id) {
                m.workload = updated.workload;
            }
        }
        Ok(())
    }

    async fn list_tasks(&self) -> StoreResult<Vec<Task>> {
        Ok(self.state.read().await.tasks.clone())
    }

    async fn get_task(&self, id: Uuid) -> StoreResult<Option<Task>> {
        let state = self.state.read().await;
        Ok(state.tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn create_task(
        &self,
        new: NewTask,
        logs: Vec<LogEntry>,
    ) -> StoreResult<(Task, Vec<AgentLog>)> {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            assigned_team_id: new.assigned_team_id,
            assigned_member_id: new.assigned_member_id,
            progress: Progress::ZERO,
            deadline: new.deadline,
            overload_flag: false,
            created_at: now,
            updated_at: now,
        };
        let mut state = self.state.write().await;
        state.tasks.push(task.clone());
        let logs = state.bind_logs(task.id, logs);
        Ok((task, logs))
    }

    async fn update_task(
        &self,
        id: Uuid,
        patch: TaskPatch,
        logs: Vec<LogEntry>,
    ) -> StoreResult<(Task, Vec<AgentLog>)> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StoreError::NotFound { entity: "task", id })?;
        task.apply(&patch, Utc::now());
        let task = task.clone();
        let logs = state.bind_logs(id, logs);
        Ok((task, logs))
    }

    async fn append_log(&self, task_id: Uuid, entry: LogEntry) -> StoreResult<AgentLog> {
        let mut state = self.state.write().await;
        let mut logs = state.bind_logs(task_id, vec![entry]);
        logs.pop()
            .ok_or_else(|| StoreError::Backend("log entry was not recorded".into()))
    }

    async fn list_logs(&self) -> StoreResult<Vec<AgentLog>> {
        let state = self.state.read().await;
        Ok(state.logs.iter().rev().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
