use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use tokio_rusqlite::Connection;
use uuid::Uuid;

use crate::store::{EntityStore, StoreError, StoreResult};
use crate::types::{
    AgentLog, LogEntry, NewTask, NewTeam, NewUser, Progress, Role, Task, TaskPatch,
    Team, TeamMembership, TeamPatch, User,
};

/// Async SQLite-backed entity store.
///
/// Every table carries an autoincrement `seq` column that fixes the canonical
/// insertion order used by all list operations.
pub struct SqliteStore {
    conn: Connection,
}

// ---------------------------------------------------------------------------
// helpers – column <-> SQLite text
// ---------------------------------------------------------------------------

fn conversion_err(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn uuid_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_err(idx, e))
}

fn opt_uuid_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| Uuid::parse_str(&s).map_err(|e| conversion_err(idx, e)))
        .transpose()
}

fn time_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn parsed_col<T: FromStr<Err = String>>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_err(idx, e))
}

const DATE_FORMAT: &str = "%Y-%m-%d";

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: parsed_col(row, 3)?,
        avatar: row.get(4)?,
        created_at: time_col(row, 5)?,
    })
}

fn row_to_team(row: &rusqlite::Row<'_>) -> rusqlite::Result<Team> {
    let skills_raw: String = row.get(2)?;
    Ok(Team {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        skills: serde_json::from_str(&skills_raw).map_err(|e| conversion_err(2, e))?,
        lead_id: opt_uuid_col(row, 3)?,
        created_at: time_col(row, 4)?,
    })
}

fn row_to_membership(row: &rusqlite::Row<'_>) -> rusqlite::Result<TeamMembership> {
    Ok(TeamMembership {
        id: uuid_col(row, 0)?,
        team_id: uuid_col(row, 1)?,
        member_id: uuid_col(row, 2)?,
        workload: row.get(3)?,
        created_at: time_col(row, 4)?,
    })
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let progress_raw: i64 = row.get(5)?;
    let deadline_raw: String = row.get(6)?;
    Ok(Task {
        id: uuid_col(row, 0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        assigned_team_id: opt_uuid_col(row, 3)?,
        assigned_member_id: opt_uuid_col(row, 4)?,
        progress: Progress::try_from(progress_raw).map_err(|e| conversion_err(5, e))?,
        deadline: NaiveDate::parse_from_str(&deadline_raw, DATE_FORMAT)
            .map_err(|e| conversion_err(6, e))?,
        overload_flag: row.get(7)?,
        created_at: time_col(row, 8)?,
        updated_at: time_col(row, 9)?,
    })
}

fn row_to_log(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentLog> {
    Ok(AgentLog {
        id: uuid_col(row, 0)?,
        task_id: uuid_col(row, 1)?,
        agent_name: parsed_col(row, 2)?,
        action: row.get(3)?,
        timestamp: time_col(row, 4)?,
    })
}

const USER_COLUMNS: &str = "id, name, email, role, avatar, created_at";
const TEAM_COLUMNS: &str = "id, name, skills, lead_id, created_at";
const MEMBERSHIP_COLUMNS: &str = "id, team_id, member_id, workload, created_at";
const TASK_COLUMNS: &str = "id, title, description, assigned_team_id, assigned_member_id,
    progress, deadline, overload_flag, created_at, updated_at";
const LOG_COLUMNS: &str = "id, task_id, agent_name, action, timestamp";

fn select_task(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<Task>> {
    let mut stmt = conn.prepare(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"))?;
    let mut rows = stmt.query(rusqlite::params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_task(row)?)),
        None => Ok(None),
    }
}

fn insert_logs(
    tx: &rusqlite::Transaction<'_>,
    task_id: Uuid,
    entries: Vec<LogEntry>,
) -> rusqlite::Result<Vec<AgentLog>> {
    let now = Utc::now();
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let log = AgentLog {
            id: Uuid::new_v4(),
            task_id,
            agent_name: entry.agent_name,
            action: entry.action,
            timestamp: now,
        };
        tx.execute(
            "INSERT INTO agent_logs (id, task_id, agent_name, action, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                log.id.to_string(),
                log.task_id.to_string(),
                log.agent_name.to_string(),
                log.action,
                log.timestamp.to_rfc3339(),
            ],
        )?;
        out.push(log);
    }
    Ok(out)
}

fn list_rows<T>(
    conn: &rusqlite::Connection,
    sql: &str,
    map: fn(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(map(row)?);
    }
    Ok(out)
}

impl SqliteStore {
    /// Open (or create) a database at the given file path.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, tokio_rusqlite::Error> {
        let conn = Connection::open(path.as_ref()).await?;
        let db = Self { conn };
        db.init_schema().await?;
        Ok(db)
    }

    /// Create a purely in-memory database (useful for tests).
    pub async fn new_in_memory() -> Result<Self, tokio_rusqlite::Error> {
        let conn = Connection::open_in_memory().await?;
        let db = Self { conn };
        db.init_schema().await?;
        Ok(db)
    }

    // -----------------------------------------------------------------------
    // Schema
    // -----------------------------------------------------------------------

    async fn init_schema(&self) -> Result<(), tokio_rusqlite::Error> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA foreign_keys=ON;
                    PRAGMA busy_timeout=5000;

                    CREATE TABLE IF NOT EXISTS users (
                        seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                        id          TEXT NOT NULL UNIQUE,
                        name        TEXT NOT NULL,
                        email       TEXT NOT NULL UNIQUE,
                        role        TEXT NOT NULL,
                        avatar      TEXT NOT NULL,
                        created_at  TEXT NOT NULL
                    );

                    CREATE TABLE IF NOT EXISTS teams (
                        seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                        id          TEXT NOT NULL UNIQUE,
                        name        TEXT NOT NULL,
                        skills      TEXT NOT NULL,
                        lead_id     TEXT,
                        created_at  TEXT NOT NULL
                    );

                    CREATE TABLE IF NOT EXISTS memberships (
                        seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                        id          TEXT NOT NULL UNIQUE,
                        team_id     TEXT NOT NULL REFERENCES teams(id),
                        member_id   TEXT NOT NULL,
                        workload    INTEGER NOT NULL DEFAULT 0,
                        created_at  TEXT NOT NULL,
                        UNIQUE (team_id, member_id)
                    );

                    CREATE TABLE IF NOT EXISTS tasks (
                        seq                 INTEGER PRIMARY KEY AUTOINCREMENT,
                        id                  TEXT NOT NULL UNIQUE,
                        title               TEXT NOT NULL,
                        description         TEXT NOT NULL,
                        assigned_team_id    TEXT,
                        assigned_member_id  TEXT,
                        progress            INTEGER NOT NULL DEFAULT 0,
                        deadline            TEXT NOT NULL,
                        overload_flag       INTEGER NOT NULL DEFAULT 0,
                        created_at          TEXT NOT NULL,
                        updated_at          TEXT NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_tasks_member ON tasks(assigned_member_id);

                    CREATE TABLE IF NOT EXISTS agent_logs (
                        seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                        id          TEXT NOT NULL UNIQUE,
                        task_id     TEXT NOT NULL,
                        agent_name  TEXT NOT NULL,
                        action      TEXT NOT NULL,
                        timestamp   TEXT NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_agent_logs_task ON agent_logs(task_id);
                    ",
                )?;
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl EntityStore for SqliteStore {
    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY seq");
        Ok(self
            .conn
            .call(move |conn| Ok(list_rows(conn, &sql, row_to_user)?))
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = email.to_string();
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"))?;
                let mut rows = stmt.query(rusqlite::params![email])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_user(row)?)),
                    None => Ok(None),
                }
            })
            .await?)
    }

    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            role: new.role,
            avatar: new.avatar,
            created_at: Utc::now(),
        };
        let row = user.clone();
        let inserted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "INSERT INTO users (id, name, email, role, avatar, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(email) DO NOTHING",
                    rusqlite::params![
                        row.id.to_string(),
                        row.name,
                        row.email,
                        row.role.to_string(),
                        row.avatar,
                        row.created_at.to_rfc3339(),
                    ],
                )?;
                Ok(changed == 1)
            })
            .await?;
        if !inserted {
            return Err(StoreError::Conflict(format!(
                "user with email {} already exists",
                user.email
            )));
        }
        Ok(user)
    }

    async fn update_user_role(&self, id: Uuid, role: Role) -> StoreResult<User> {
        let id_str = id.to_string();
        let updated = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE users SET role = ?1 WHERE id = ?2",
                    rusqlite::params![role.to_string(), id_str],
                )?;
                let mut stmt =
                    conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?;
                let mut rows = stmt.query(rusqlite::params![id_str])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_user(row)?)),
                    None => Ok(None),
                }
            })
            .await?;
        updated.ok_or(StoreError::NotFound { entity: "user", id })
    }

    // -----------------------------------------------------------------------
    // Teams
    // -----------------------------------------------------------------------

    async fn list_teams(&self) -> StoreResult<Vec<Team>> {
        let sql = format!("SELECT {TEAM_COLUMNS} FROM teams ORDER BY seq");
        Ok(self
            .conn
            .call(move |conn| Ok(list_rows(conn, &sql, row_to_team)?))
            .await?)
    }

    async fn create_team(&self, new: NewTeam) -> StoreResult<Team> {
        let team = Team {
            id: Uuid::new_v4(),
            name: new.name,
            skills: new.skills,
            lead_id: None,
            created_at: Utc::now(),
        };
        let skills = serde_json::to_string(&team.skills)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let row = team.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO teams (id, name, skills, lead_id, created_at)
                     VALUES (?1, ?2, ?3, NULL, ?4)",
                    rusqlite::params![
                        row.id.to_string(),
                        row.name,
                        skills,
                        row.created_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(team)
    }

    async fn update_team(&self, id: Uuid, patch: TeamPatch) -> StoreResult<Team> {
        let id_str = id.to_string();
        let updated = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let current = {
                    let mut stmt =
                        tx.prepare(&format!("SELECT {TEAM_COLUMNS} FROM teams WHERE id = ?1"))?;
                    let mut rows = stmt.query(rusqlite::params![id_str])?;
                    match rows.next()? {
                        Some(row) => row_to_team(row)?,
                        None => return Ok(None),
                    }
                };
                let mut team = current;
                if let Some(name) = patch.name {
                    team.name = name;
                }
                if let Some(skills) = patch.skills {
                    team.skills = skills;
                }
                if let Some(lead) = patch.lead_id {
                    team.lead_id = lead;
                }
                let skills =
                    serde_json::to_string(&team.skills).map_err(|e| conversion_err(2, e))?;
                tx.execute(
                    "UPDATE teams SET name = ?1, skills = ?2, lead_id = ?3 WHERE id = ?4",
                    rusqlite::params![
                        team.name,
                        skills,
                        team.lead_id.map(|u| u.to_string()),
                        id_str,
                    ],
                )?;
                tx.commit()?;
                Ok(Some(team))
            })
            .await?;
        updated.ok_or(StoreError::NotFound { entity: "team", id })
    }

    // -----------------------------------------------------------------------
    // Memberships
    // -----------------------------------------------------------------------

    async fn list_memberships(&self) -> StoreResult<Vec<TeamMembership>> {
        let sql = format!("SELECT {MEMBERSHIP_COLUMNS} FROM memberships ORDER BY seq");
        Ok(self
            .conn
            .call(move |conn| Ok(list_rows(conn, &sql, row_to_membership)?))
            .await?)
    }

    async fn create_membership(
        &self,
        team_id: Uuid,
        member_id: Uuid,
    ) -> StoreResult<TeamMembership> {
        let membership = TeamMembership {
            id: Uuid::new_v4(),
            team_id,
            member_id,
            workload: 0,
            created_at: Utc::now(),
        };
        let row = membership.clone();
        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let team_exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM teams WHERE id = ?1)",
                    rusqlite::params![row.team_id.to_string()],
                    |r| r.get(0),
                )?;
                if !team_exists {
                    return Ok(Err(StoreError::NotFound {
                        entity: "team",
                        id: row.team_id,
                    }));
                }
                let changed = tx.execute(
                    "INSERT INTO memberships (id, team_id, member_id, workload, created_at)
                     VALUES (?1, ?2, ?3, 0, ?4)
                     ON CONFLICT(team_id, member_id) DO NOTHING",
                    rusqlite::params![
                        row.id.to_string(),
                        row.team_id.to_string(),
                        row.member_id.to_string(),
                        row.created_at.to_rfc3339(),
                    ],
                )?;
                tx.commit()?;
                if changed == 0 {
                    return Ok(Err(StoreError::Conflict(format!(
                        "member {} already belongs to team {}",
                        row.member_id, row.team_id
                    ))));
                }
                Ok(Ok(()))
            })
            .await?;
        outcome?;
        Ok(membership)
    }

    async fn save_workloads(&self, memberships: &[TeamMembership]) -> StoreResult<()> {
        let rows: Vec<(String, u32)> = memberships
            .iter()
            .map(|m| (m.id.to_string(), m.workload))
            .collect();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt =
                        tx.prepare("UPDATE memberships SET workload = ?1 WHERE id = ?2")?;
                    for (id, workload) in &rows {
                        stmt.execute(rusqlite::params![workload, id])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    async fn list_tasks(&self) -> StoreResult<Vec<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY seq");
        Ok(self
            .conn
            .call(move |conn| Ok(list_rows(conn, &sql, row_to_task)?))
            .await?)
    }

    async fn get_task(&self, id: Uuid) -> StoreResult<Option<Task>> {
        let id_str = id.to_string();
        Ok(self
            .conn
            .call(move |conn| Ok(select_task(conn, &id_str)?))
            .await?)
    }

    async fn create_task(
        &self,
        new: NewTask,
        logs: Vec<LogEntry>,
    ) -> StoreResult<(Task, Vec<AgentLog>)> {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            assigned_team_id: new.assigned_team_id,
            assigned_member_id: new.assigned_member_id,
            progress: Progress::ZERO,
            deadline: new.deadline,
            overload_flag: false,
            created_at: now,
            updated_at: now,
        };
        let row = task.clone();
        let logs = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO tasks (id, title, description, assigned_team_id,
                        assigned_member_id, progress, deadline, overload_flag,
                        created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    rusqlite::params![
                        row.id.to_string(),
                        row.title,
                        row.description,
                        row.assigned_team_id.map(|u| u.to_string()),
                        row.assigned_member_id.map(|u| u.to_string()),
                        row.progress.value(),
                        row.deadline.format(DATE_FORMAT).to_string(),
                        row.overload_flag,
                        row.created_at.to_rfc3339(),
                        row.updated_at.to_rfc3339(),
                    ],
                )?;
                let logs = insert_logs(&tx, row.id, logs)?;
                tx.commit()?;
                Ok(logs)
            })
            .await?;
        Ok((task, logs))
    }

    async fn update_task(
        &self,
        id: Uuid,
        patch: TaskPatch,
        logs: Vec<LogEntry>,
    ) -> StoreResult<(Task, Vec<AgentLog>)> {
        let id_str = id.to_string();
        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let Some(mut task) = select_task(&tx, &id_str)? else {
                    return Ok(None);
                };
                task.apply(&patch, Utc::now());
                tx.execute(
                    "UPDATE tasks SET progress = ?1, assigned_member_id = ?2,
                        overload_flag = ?3, updated_at = ?4
                     WHERE id = ?5",
                    rusqlite::params![
                        task.progress.value(),
                        task.assigned_member_id.map(|u| u.to_string()),
                        task.overload_flag,
                        task.updated_at.to_rfc3339(),
                        id_str,
                    ],
                )?;
                let logs = insert_logs(&tx, task.id, logs)?;
                tx.commit()?;
                Ok(Some((task, logs)))
            })
            .await?;
        outcome.ok_or(StoreError::NotFound { entity: "task", id })
    }

    // -----------------------------------------------------------------------
    // Audit
    // -----------------------------------------------------------------------

    async fn append_log(&self, task_id: Uuid, entry: LogEntry) -> StoreResult<AgentLog> {
        let mut logs = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let logs = insert_logs(&tx, task_id, vec![entry])?;
                tx.commit()?;
                Ok(logs)
            })
            .await?;
        logs.pop()
            .ok_or_else(|| StoreError::Backend("log entry was not recorded".into()))
    }

    async fn list_logs(&self) -> StoreResult<Vec<AgentLog>> {
        let sql = format!("SELECT {LOG_COLUMNS} FROM agent_logs ORDER BY seq DESC");
        Ok(self
            .conn
            .call(move |conn| Ok(list_rows(conn, &sql, row_to_log)?))
            .await?)
    }
}
