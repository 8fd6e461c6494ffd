use anyhow::anyhow;
use tf_agents::Dispatcher;
use tf_core::types::{AgentLog, AgentName};

use super::{parse_id, print_json};

/// Run the `logs` subcommand.
pub async fn run(
    dispatcher: &Dispatcher,
    task: Option<&str>,
    agent: Option<&str>,
    limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    let task_id = task.map(|raw| parse_id("task", raw)).transpose()?;
    let agent: Option<AgentName> = agent
        .map(|raw| raw.parse().map_err(|e: String| anyhow!(e)))
        .transpose()?;

    let view = dispatcher.audit().await?;
    let entries: Vec<&AgentLog> = view
        .all()
        .iter()
        .filter(|l| task_id.map_or(true, |id| l.task_id == id))
        .filter(|l| agent.map_or(true, |a| l.agent_name == a))
        .take(limit)
        .collect();

    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No log entries.");
    }
    for log in entries {
        println!(
            "{}  {:<12} {}  {}",
            log.timestamp.format("%Y-%m-%d %H:%M:%S"),
            log.agent_name.to_string(),
            log.task_id,
            log.action
        );
    }
    Ok(())
}
