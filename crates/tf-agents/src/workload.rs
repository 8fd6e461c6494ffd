//! Workload is derived, never stored on its own authority.

use std::collections::HashMap;

use tf_core::types::{Task, TeamMembership};
use uuid::Uuid;

/// Count of non-completed tasks per assignee.
pub fn active_counts(tasks: &[Task]) -> HashMap<Uuid, u32> {
    let mut counts = HashMap::new();
    for task in tasks.iter().filter(|t| t.is_active()) {
        if let Some(member) = task.assigned_member_id {
            *counts.entry(member).or_insert(0) += 1;
        }
    }
    counts
}

/// Return `memberships` with every `workload` overwritten by the number of
/// the member's non-completed tasks. Order is preserved.
///
/// Workload is per member, not per team: a member in two teams carries the
/// same count in both memberships.
pub fn recompute(tasks: &[Task], memberships: &[TeamMembership]) -> Vec<TeamMembership> {
    let counts = active_counts(tasks);
    memberships
        .iter()
        .map(|m| TeamMembership {
            workload: counts.get(&m.member_id).copied().unwrap_or(0),
            ..m.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use tf_core::types::Progress;

    fn task(member: Option<Uuid>, progress: i64) -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            title: "t".into(),
            description: String::new(),
            assigned_team_id: None,
            assigned_member_id: member,
            progress: Progress::new(progress).unwrap(),
            deadline: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            overload_flag: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn membership(team: Uuid, member: Uuid, seed: u32) -> TeamMembership {
        TeamMembership {
            id: Uuid::new_v4(),
            team_id: team,
            member_id: member,
            workload: seed,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn counts_only_active_tasks() {
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let team = Uuid::new_v4();
        let tasks = vec![
            task(Some(alice), 0),
            task(Some(alice), 40),
            task(Some(alice), 100),
            task(Some(bob), 100),
            task(None, 0),
        ];
        let out = recompute(&tasks, &[membership(team, alice, 9), membership(team, bob, 9)]);
        assert_eq!(out[0].workload, 2);
        assert_eq!(out[1].workload, 0);
    }

    #[test]
    fn recompute_is_idempotent() {
        let alice = Uuid::new_v4();
        let tasks = vec![task(Some(alice), 10), task(Some(alice), 99)];
        let memberships = vec![
            membership(Uuid::new_v4(), alice, 0),
            membership(Uuid::new_v4(), alice, 5),
        ];
        let once = recompute(&tasks, &memberships);
        let twice = recompute(&tasks, &once);
        assert_eq!(once, twice);
        assert!(once.iter().all(|m| m.workload == 2));
    }
}
