use anyhow::Context;
use chrono::{NaiveDate, Utc};
use tf_agents::audit::display_name;
use tf_agents::{CreateTaskRequest, Dispatcher};
use tokio_util::sync::CancellationToken;

use super::{parse_id, print_json};

/// Run the `create-task` subcommand.
pub async fn create(
    dispatcher: &Dispatcher,
    title: String,
    description: String,
    deadline: &str,
    json: bool,
) -> anyhow::Result<()> {
    let deadline = NaiveDate::parse_from_str(deadline.trim(), "%Y-%m-%d")
        .with_context(|| format!("deadline {deadline:?} is not a YYYY-MM-DD date"))?;

    let created = dispatcher
        .create_task(CreateTaskRequest {
            title,
            description,
            deadline,
        })
        .await?;
    if json {
        return print_json(&created);
    }

    println!("Created task {} ({})", created.task.title, created.task.id);
    for log in &created.logs {
        println!("  [{}] {}", log.agent_name, log.action);
    }
    Ok(())
}

/// Run the `tasks` subcommand.
pub async fn list(dispatcher: &Dispatcher, json: bool) -> anyhow::Result<()> {
    let snapshot = dispatcher.snapshot().await?;
    if json {
        return print_json(&snapshot.tasks);
    }

    if snapshot.tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }
    for task in &snapshot.tasks {
        let assignee = task
            .assigned_member_id
            .map(|id| display_name(id, &snapshot.users))
            .unwrap_or_else(|| "unassigned".into());
        let flag = if task.overload_flag { "  [OVERLOAD]" } else { "" };
        println!(
            "{}  {:<32} {:>4}  {:<10} due {}  {}{}",
            task.id,
            task.title,
            task.progress.to_string(),
            task.status().to_string(),
            task.deadline,
            assignee,
            flag
        );
    }
    Ok(())
}

/// Run the `progress` subcommand.
pub async fn progress(
    dispatcher: &Dispatcher,
    task_id: &str,
    percent: i64,
    json: bool,
) -> anyhow::Result<()> {
    let id = parse_id("task", task_id)?;
    let task = dispatcher.update_progress(id, percent).await?;
    if json {
        return print_json(&task);
    }
    println!("{} is now {} ({})", task.title, task.progress, task.status());
    Ok(())
}

/// Run the `health-check` subcommand. Ctrl-C stops the scan after the task
/// being checked.
pub async fn health_check(dispatcher: &Dispatcher, json: bool) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let report = dispatcher.run_health_check(Utc::now(), &cancel).await;
    watcher.abort();
    let report = report?;

    if json {
        return print_json(&report);
    }

    println!(
        "Scanned {} task(s): {} flagged, {} reassigned{}",
        report.scanned,
        report.flagged.len(),
        report.reassigned.len(),
        if report.cancelled { " (cancelled)" } else { "" }
    );
    if report.fallbacks > 0 {
        println!("  {} assessment(s) used the deadline rule", report.fallbacks);
    }
    for log in &report.logs {
        println!("  [{}] {} {}", log.agent_name, log.task_id, log.action);
    }
    Ok(())
}
