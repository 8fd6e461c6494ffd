mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tf_core::config::Config;
use tf_telemetry::LoggingConfig;

/// teamforge CLI -- route tasks to teams and keep workloads balanced.
#[derive(Parser)]
#[command(name = "tf", version, about)]
struct Cli {
    /// Config file (default: ~/.teamforge/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List teams with their skills and leads.
    Teams,

    /// Create a team.
    CreateTeam {
        name: String,
        /// Comma-separated skills.
        #[arg(short, long, default_value = "")]
        skills: String,
    },

    /// Show team members and their current workload.
    Members {
        /// Only this team (name or id).
        #[arg(short, long)]
        team: Option<String>,
    },

    /// Register a user, optionally joining a team.
    Signup {
        name: String,
        email: String,
        /// admin, team_lead or member.
        #[arg(short, long, default_value = "member")]
        role: String,
        /// Team name or id to join.
        #[arg(short, long)]
        team: Option<String>,
    },

    /// Create a task and let the engine assign it.
    CreateTask {
        title: String,
        /// Deadline as YYYY-MM-DD.
        #[arg(short, long)]
        deadline: String,
        #[arg(long, default_value = "")]
        description: String,
    },

    /// List tasks.
    Tasks,

    /// Set a task's progress (0-100).
    Progress { task_id: String, percent: i64 },

    /// Scan open tasks, flag those at risk and rebalance.
    HealthCheck,

    /// Show the audit trail, newest first.
    Logs {
        /// Only entries for this task id.
        #[arg(long)]
        task: Option<String>,
        /// Only entries from this agent (RAG, Assignment, Progress, Reassignment).
        #[arg(long)]
        agent: Option<String>,
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path.clone())?,
        None => Config::load()?,
    };
    tf_telemetry::init_logging(
        &config.general.project_name,
        &LoggingConfig::new(&config.general.log_level, &config.general.log_format),
    );

    let dispatcher = commands::build_dispatcher(&config).await?;
    let json = cli.json;

    match cli.command {
        Commands::Teams => commands::teams::list(&dispatcher, json).await?,
        Commands::CreateTeam { name, skills } => {
            commands::teams::create(&dispatcher, &name, &skills, json).await?
        }
        Commands::Members { team } => {
            commands::teams::members(&dispatcher, team.as_deref(), json).await?
        }
        Commands::Signup {
            name,
            email,
            role,
            team,
        } => commands::signup::run(&dispatcher, &name, &email, &role, team.as_deref(), json).await?,
        Commands::CreateTask {
            title,
            deadline,
            description,
        } => commands::tasks::create(&dispatcher, title, description, &deadline, json).await?,
        Commands::Tasks => commands::tasks::list(&dispatcher, json).await?,
        Commands::Progress { task_id, percent } => {
            commands::tasks::progress(&dispatcher, &task_id, percent, json).await?
        }
        Commands::HealthCheck => commands::tasks::health_check(&dispatcher, json).await?,
        Commands::Logs { task, agent, limit } => {
            commands::logs::run(&dispatcher, task.as_deref(), agent.as_deref(), limit, json)
                .await?
        }
    }

    Ok(())
}
