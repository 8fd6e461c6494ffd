//! Overload flagging and relief reassignment for a single task.

use chrono::{DateTime, NaiveDate, Utc};
use tf_core::types::{LogEntry, Task, TaskPatch, TeamMembership, User};
use tf_intelligence::oracle::{HealthAssessment, HealthRequest};
use uuid::Uuid;

use crate::audit;

const SECONDS_PER_DAY: i64 = 86_400;

/// Whole days from `now` until the start (00:00 UTC) of `deadline`, rounded
/// up. Negative once the deadline has passed.
pub fn days_until_deadline(deadline: NaiveDate, now: DateTime<Utc>) -> i64 {
    let due = deadline.and_time(chrono::NaiveTime::MIN).and_utc();
    let secs = (due - now).num_seconds();
    let whole = secs.div_euclid(SECONDS_PER_DAY);
    if secs.rem_euclid(SECONDS_PER_DAY) > 0 {
        whole + 1
    } else {
        whole
    }
}

pub fn health_request(task: &Task, now: DateTime<Utc>) -> HealthRequest {
    HealthRequest {
        title: task.title.clone(),
        progress: task.progress,
        days_until_deadline: days_until_deadline(task.deadline, now),
    }
}

/// The assignee's membership: the one in the task's team if present,
/// otherwise the member's first membership.
pub fn assignee_membership<'a>(
    task: &Task,
    memberships: &'a [TeamMembership],
) -> Option<&'a TeamMembership> {
    let member = task.assigned_member_id?;
    memberships
        .iter()
        .find(|m| m.member_id == member && Some(m.team_id) == task.assigned_team_id)
        .or_else(|| memberships.iter().find(|m| m.member_id == member))
}

/// First teammate, in membership order, whose workload is strictly below the
/// current assignee's. This is the first match, not the least loaded one.
pub fn relief_teammate<'a>(
    current: &TeamMembership,
    memberships: &'a [TeamMembership],
) -> Option<&'a TeamMembership> {
    memberships.iter().find(|m| {
        m.team_id == current.team_id
            && m.member_id != current.member_id
            && m.workload < current.workload
    })
}

/// What a health check does to one task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Flagged and left with its assignee.
    Flagged,
    /// Moved to `to`; the flag is cleared in the same update.
    Reassigned { from: Option<Uuid>, to: Uuid },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub outcome: Outcome,
    pub patch: TaskPatch,
    /// `FLAGGED` first, then the reassignment note if any.
    pub logs: Vec<LogEntry>,
}

/// Decide the flag transition for `task`.
///
/// Returns `None` when the assessment does not flag the task or the task is
/// already flagged. `memberships` must carry current workloads.
pub fn decide(
    task: &Task,
    assessment: &HealthAssessment,
    memberships: &[TeamMembership],
    users: &[User],
) -> Option<Decision> {
    if !assessment.flag_overload || task.overload_flag {
        return None;
    }

    let mut logs = vec![audit::flagged(&assessment.suggestion)];

    let relief = assignee_membership(task, memberships)
        .and_then(|current| relief_teammate(current, memberships));

    let decision = match relief {
        Some(teammate) => {
            logs.push(audit::reassigned(&audit::display_name(
                teammate.member_id,
                users,
            )));
            Decision {
                outcome: Outcome::Reassigned {
                    from: task.assigned_member_id,
                    to: teammate.member_id,
                },
                patch: TaskPatch {
                    assigned_member_id: Some(Some(teammate.member_id)),
                    overload_flag: Some(false),
                    ..Default::default()
                },
                logs,
            }
        }
        None => Decision {
            outcome: Outcome::Flagged,
            patch: TaskPatch {
                overload_flag: Some(true),
                ..Default::default()
            },
            logs,
        },
    };
    Some(decision)
}
