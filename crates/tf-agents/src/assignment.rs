//! Team and member selection for a new task.

use chrono::NaiveDate;
use tf_core::types::{LogEntry, NewTask, Team, TeamMembership, User};
use tf_intelligence::oracle::{
    fallback_classification, Classification, ClassificationRequest, OracleError, TeamProfile,
};
use tracing::warn;
use uuid::Uuid;

use crate::audit;
use crate::{EngineError, Result};

/// Caller-supplied fields of a task to create.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub deadline: NaiveDate,
}

impl TaskDraft {
    /// Reject a draft before any oracle call. `teams` must be non-empty.
    pub fn validate(&self, teams: &[Team]) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(EngineError::Validation("task title must not be empty".into()));
        }
        if teams.is_empty() {
            return Err(EngineError::Validation(
                "cannot create a task without any teams".into(),
            ));
        }
        Ok(())
    }

    pub fn classification_request(&self, teams: &[Team]) -> ClassificationRequest {
        ClassificationRequest {
            title: self.title.clone(),
            description: self.description.clone(),
            teams: teams.iter().map(TeamProfile::from).collect(),
        }
    }
}

/// Which team won and whether the oracle or the fallback chose it.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamDecision {
    pub classification: Classification,
    pub used_fallback: bool,
}

/// Turn an oracle outcome into a team choice against the current team list.
///
/// Errors and replies naming a team that no longer exists both resolve to
/// the first team. Returns `None` only when `teams` is empty.
pub fn resolve_team(
    outcome: std::result::Result<Classification, OracleError>,
    teams: &[Team],
) -> Option<TeamDecision> {
    match outcome {
        Ok(c) if teams.iter().any(|t| t.id == c.team_id) => Some(TeamDecision {
            classification: c,
            used_fallback: false,
        }),
        Ok(c) => {
            warn!(team_id = %c.team_id, "classifier picked an unknown team, using default team");
            fallback_decision(teams)
        }
        Err(e) => {
            warn!(error = %e, "classification unavailable, using default team");
            fallback_decision(teams)
        }
    }
}

fn fallback_decision(teams: &[Team]) -> Option<TeamDecision> {
    let profiles: Vec<TeamProfile> = teams.iter().take(1).map(TeamProfile::from).collect();
    fallback_classification(&profiles).map(|classification| TeamDecision {
        classification,
        used_fallback: true,
    })
}

/// Lowest-workload membership of `team_id`. Ties go to the earliest
/// inserted membership.
pub fn pick_member(team_id: Uuid, memberships: &[TeamMembership]) -> Option<&TeamMembership> {
    let mut candidates: Vec<&TeamMembership> =
        memberships.iter().filter(|m| m.team_id == team_id).collect();
    // Stable: equal workloads keep insertion order.
    candidates.sort_by_key(|m| m.workload);
    candidates.into_iter().next()
}

/// The task to persist and its two audit entries.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentPlan {
    pub task: NewTask,
    pub logs: Vec<LogEntry>,
}

/// Build the task for `draft` in the decided team.
///
/// `memberships` must carry freshly recomputed workloads.
pub fn plan(
    draft: &TaskDraft,
    decision: &TeamDecision,
    teams: &[Team],
    memberships: &[TeamMembership],
    users: &[User],
) -> AssignmentPlan {
    let team_id = decision.classification.team_id;
    let team_name = teams
        .iter()
        .find(|t| t.id == team_id)
        .map(|t| t.name.as_str())
        .unwrap_or_default();

    let mut logs = vec![audit::team_selected(
        team_name,
        &decision.classification.reasoning,
    )];

    let member = pick_member(team_id, memberships);
    match member {
        Some(m) => logs.push(audit::auto_assigned(
            &audit::display_name(m.member_id, users),
            m.workload,
        )),
        None => logs.push(audit::unassigned()),
    }

    AssignmentPlan {
        task: NewTask {
            title: draft.title.clone(),
            description: draft.description.clone(),
            deadline: draft.deadline,
            assigned_team_id: Some(team_id),
            assigned_member_id: member.map(|m| m.member_id),
        },
        logs,
    }
}
