//! Stock organisation used by demos and `seed_demo_data = true`.

use tracing::info;

use crate::store::{EntityStore, StoreResult};
use crate::types::{NewTeam, NewUser, Role, TeamPatch};

struct SeedTeam {
    name: &'static str,
    skills: &'static [&'static str],
    /// Index into [`SEED_USERS`].
    lead: Option<usize>,
}

const SEED_TEAMS: &[SeedTeam] = &[
    SeedTeam {
        name: "Frontend",
        skills: &["React", "Vue", "CSS", "Tailwind", "UI/UX"],
        lead: Some(1),
    },
    SeedTeam {
        name: "Backend",
        skills: &["Node.js", "Python", "FastAPI", "SQL", "Microservices"],
        lead: Some(2),
    },
    SeedTeam {
        name: "Cloud",
        skills: &["AWS", "Docker", "Kubernetes", "Terraform", "CI/CD"],
        lead: None,
    },
    SeedTeam {
        name: "Cybersecurity",
        skills: &["Penetration Testing", "Auditing", "SecOps", "Compliance"],
        lead: None,
    },
    SeedTeam {
        name: "HR",
        skills: &["Recruiting", "Culture", "Payroll", "Onboarding"],
        lead: None,
    },
];

const SEED_USERS: &[(&str, &str, Role)] = &[
    ("Alice Admin", "admin@corp.com", Role::Admin),
    ("Bob Frontend Lead", "bob@corp.com", Role::TeamLead),
    ("Charlie Backend Lead", "charlie@corp.com", Role::TeamLead),
];

/// Populate an empty store. Returns `false` without touching anything when
/// teams already exist.
pub async fn seed_demo_data(store: &dyn EntityStore) -> StoreResult<bool> {
    if !store.list_teams().await?.is_empty() {
        return Ok(false);
    }

    let mut users = Vec::with_capacity(SEED_USERS.len());
    for (name, email, role) in SEED_USERS {
        let user = match store.find_user_by_email(email).await? {
            Some(existing) => existing,
            None => store.create_user(NewUser::new(*name, *email, *role)).await?,
        };
        users.push(user);
    }

    for seed in SEED_TEAMS {
        let team = store
            .create_team(NewTeam {
                name: seed.name.to_string(),
                skills: seed.skills.iter().map(|s| s.to_string()).collect(),
            })
            .await?;
        if let Some(lead) = seed.lead.and_then(|idx| users.get(idx)) {
            store
                .update_team(
                    team.id,
                    TeamPatch {
                        lead_id: Some(Some(lead.id)),
                        ..Default::default()
                    },
                )
                .await?;
            store.create_membership(team.id, lead.id).await?;
        }
    }

    info!(
        teams = SEED_TEAMS.len(),
        users = SEED_USERS.len(),
        "seeded demo organisation"
    );
    Ok(true)
}
