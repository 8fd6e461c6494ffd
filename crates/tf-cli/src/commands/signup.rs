use anyhow::anyhow;
use tf_agents::Dispatcher;
use tf_core::types::Role;

use super::{find_team, print_json};

/// Run the `signup` subcommand.
pub async fn run(
    dispatcher: &Dispatcher,
    name: &str,
    email: &str,
    role: &str,
    team: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let role: Role = role.parse().map_err(|e: String| anyhow!(e))?;
    let team_id = match team {
        Some(key) => {
            let snapshot = dispatcher.snapshot().await?;
            Some(find_team(&snapshot.teams, key)?.id)
        }
        None => None,
    };

    let user = dispatcher.signup(name, email, role, team_id).await?;
    if json {
        return print_json(&user);
    }
    println!("{} <{}> signed up as {} ({})", user.name, user.email, user.role, user.id);
    Ok(())
}
