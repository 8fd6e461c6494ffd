pub mod logs;
pub mod signup;
pub mod tasks;
pub mod teams;

use std::sync::Arc;

use anyhow::Context;
use tf_agents::dispatcher::DispatcherConfig;
use tf_agents::Dispatcher;
use tf_core::config::Config;
use tf_core::seed::seed_demo_data;
use tf_core::sqlite_store::SqliteStore;
use tf_core::store::{EntityStore, MemoryStore};
use tf_core::types::Team;
use tf_intelligence::build_oracles;
use tracing::warn;
use uuid::Uuid;

/// Open the configured store, seed it if asked, and wire the oracles.
pub async fn build_dispatcher(config: &Config) -> anyhow::Result<Dispatcher> {
    let store: Arc<dyn EntityStore> = match config.store.backend.as_str() {
        "memory" => {
            warn!("memory store selected, data will not persist after this command");
            Arc::new(MemoryStore::new())
        }
        _ => {
            let path = config.store.resolved_sqlite_path();
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("creating {}", dir.display()))?;
            }
            Arc::new(
                SqliteStore::new(&path)
                    .await
                    .with_context(|| format!("opening sqlite store at {}", path.display()))?,
            )
        }
    };

    if config.store.seed_demo_data && seed_demo_data(store.as_ref()).await? {
        tracing::info!("demo organisation loaded");
    }

    Ok(Dispatcher::new(store, build_oracles(&config.oracle)).with_config(DispatcherConfig {
        max_scan_tasks: config.health.max_scan_tasks,
    }))
}

pub fn parse_id(kind: &str, raw: &str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(raw.trim()).with_context(|| format!("{raw:?} is not a valid {kind} id"))
}

/// Find a team by id or (case-insensitive) name.
pub fn find_team<'a>(teams: &'a [Team], key: &str) -> anyhow::Result<&'a Team> {
    let key = key.trim();
    if let Ok(id) = Uuid::parse_str(key) {
        if let Some(team) = teams.iter().find(|t| t.id == id) {
            return Ok(team);
        }
    }
    teams
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(key))
        .with_context(|| format!("no team named {key:?}"))
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
