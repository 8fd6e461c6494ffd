//! Teams, users and memberships.

use tf_core::store::{EntityStore, StoreError};
use tf_core::types::{NewTeam, NewUser, Role, Team, TeamMembership, TeamPatch, User};
use tracing::info;
use uuid::Uuid;

use crate::{EngineError, Result};

fn require_non_blank(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(EngineError::Validation(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

async fn require_team(store: &dyn EntityStore, id: Uuid) -> Result<Team> {
    store
        .list_teams()
        .await?
        .into_iter()
        .find(|t| t.id == id)
        .ok_or(EngineError::NotFound { entity: "team", id })
}

async fn require_user(store: &dyn EntityStore, id: Uuid) -> Result<User> {
    store
        .list_users()
        .await?
        .into_iter()
        .find(|u| u.id == id)
        .ok_or(EngineError::NotFound { entity: "user", id })
}

/// New teams start without a lead.
pub async fn create_team(store: &dyn EntityStore, name: &str, skills: Vec<String>) -> Result<Team> {
    require_non_blank("team name", name)?;
    let skills = skills
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let team = store
        .create_team(NewTeam {
            name: name.trim().to_string(),
            skills,
        })
        .await?;
    info!(team_id = %team.id, name = %team.name, "team created");
    Ok(team)
}

pub async fn update_team(store: &dyn EntityStore, id: Uuid, patch: TeamPatch) -> Result<Team> {
    if let Some(name) = &patch.name {
        require_non_blank("team name", name)?;
    }
    if let Some(Some(lead)) = patch.lead_id {
        require_user(store, lead).await?;
    }
    Ok(store.update_team(id, patch).await?)
}

/// Set or clear a team's lead without touching its skills.
pub async fn set_team_lead(
    store: &dyn EntityStore,
    team_id: Uuid,
    lead_id: Option<Uuid>,
) -> Result<Team> {
    update_team(
        store,
        team_id,
        TeamPatch {
            lead_id: Some(lead_id),
            ..Default::default()
        },
    )
    .await
}

/// Add `member_id` to `team_id`. An existing pair is returned unchanged.
pub async fn add_member(
    store: &dyn EntityStore,
    team_id: Uuid,
    member_id: Uuid,
) -> Result<TeamMembership> {
    require_user(store, member_id).await?;
    if let Some(existing) = store
        .list_memberships()
        .await?
        .into_iter()
        .find(|m| m.team_id == team_id && m.member_id == member_id)
    {
        return Ok(existing);
    }
    match store.create_membership(team_id, member_id).await {
        Ok(m) => {
            info!(team_id = %team_id, member_id = %member_id, "member added to team");
            Ok(m)
        }
        Err(StoreError::Conflict(msg)) => Err(EngineError::Validation(msg)),
        Err(e) => Err(e.into()),
    }
}

/// Look a user up by email.
pub async fn login(store: &dyn EntityStore, email: &str) -> Result<Option<User>> {
    Ok(store.find_user_by_email(email.trim()).await?)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signup {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub team_id: Option<Uuid>,
}

/// Create the user, or merge into the existing one with the same email
/// (its role is corrected to the requested one). With a team, a team lead
/// becomes that team's lead and every role gets a membership.
pub async fn signup(store: &dyn EntityStore, request: Signup) -> Result<User> {
    require_non_blank("name", &request.name)?;
    require_non_blank("email", &request.email)?;

    let team = match request.team_id {
        Some(id) => Some(require_team(store, id).await?),
        None => None,
    };

    let email = request.email.trim();
    let user = match store.find_user_by_email(email).await? {
        Some(existing) if existing.role != request.role => {
            info!(user_id = %existing.id, role = %request.role, "correcting role on signup");
            store.update_user_role(existing.id, request.role).await?
        }
        Some(existing) => existing,
        None => {
            let user = store
                .create_user(NewUser::new(request.name.trim(), email, request.role))
                .await?;
            info!(user_id = %user.id, role = %user.role, "user signed up");
            user
        }
    };

    if let Some(team) = team {
        if user.role == Role::TeamLead {
            set_team_lead(store, team.id, Some(user.id)).await?;
        }
        add_member(store, team.id, user.id).await?;
    }

    Ok(user)
}
