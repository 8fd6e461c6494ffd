use serde_json::json;
use tf_agents::audit::display_name;
use tf_agents::Dispatcher;

use super::{find_team, print_json};

/// Run the `teams` subcommand.
pub async fn list(dispatcher: &Dispatcher, json: bool) -> anyhow::Result<()> {
    let snapshot = dispatcher.snapshot().await?;
    if json {
        return print_json(&snapshot.teams);
    }

    if snapshot.teams.is_empty() {
        println!("No teams yet. Create one with `tf create-team <name> --skills a,b`.");
        return Ok(());
    }
    for team in &snapshot.teams {
        let lead = team
            .lead_id
            .map(|id| display_name(id, &snapshot.users))
            .unwrap_or_else(|| "-".into());
        println!("{}  {}", team.id, team.name);
        println!("    lead:   {lead}");
        println!("    skills: {}", team.skills.join(", "));
    }
    Ok(())
}

/// Run the `create-team` subcommand.
pub async fn create(
    dispatcher: &Dispatcher,
    name: &str,
    skills: &str,
    json: bool,
) -> anyhow::Result<()> {
    let skills = skills.split(',').map(str::to_string).collect();
    let team = dispatcher.create_team(name, skills).await?;
    if json {
        return print_json(&team);
    }
    println!("Created team {} ({})", team.name, team.id);
    Ok(())
}

/// Run the `members` subcommand.
pub async fn members(dispatcher: &Dispatcher, team: Option<&str>, json: bool) -> anyhow::Result<()> {
    let snapshot = dispatcher.snapshot().await?;
    let only = team.map(|key| find_team(&snapshot.teams, key)).transpose()?;

    let rows: Vec<_> = snapshot
        .memberships
        .iter()
        .filter(|m| only.map_or(true, |t| t.id == m.team_id))
        .map(|m| {
            let team_name = snapshot
                .teams
                .iter()
                .find(|t| t.id == m.team_id)
                .map(|t| t.name.clone())
                .unwrap_or_default();
            (team_name, display_name(m.member_id, &snapshot.users), m)
        })
        .collect();

    if json {
        let out: Vec<_> = rows
            .iter()
            .map(|(team, member, m)| {
                json!({
                    "team": team,
                    "teamId": m.team_id,
                    "member": member,
                    "memberId": m.member_id,
                    "workload": m.workload,
                })
            })
            .collect();
        return print_json(&out);
    }

    if rows.is_empty() {
        println!("No members.");
    }
    for (team, member, m) in rows {
        println!("{team:<16} {member:<28} workload {}", m.workload);
    }
    Ok(())
}
