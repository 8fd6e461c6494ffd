//! Dispatcher -- runs engine operations one at a time against the store.
//!
//! Every mutating operation takes the single write lock, so ranking by
//! workload always sees the effect of the previous operation. Classification
//! happens before the lock is taken; the health-check scan holds the lock for
//! its whole duration, oracle calls included, so a scan never observes a
//! half-applied task creation.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tf_core::store::EntityStore;
use tf_core::types::{AgentLog, Role, Task, Team, TeamMembership, TeamPatch, User};
use tf_intelligence::oracle::fallback_assessment;
use tf_intelligence::OracleSet;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assignment::{self, TaskDraft};
use crate::audit::AuditView;
use crate::directory::{self, Signup};
use crate::rebalance::{self, Outcome};
use crate::{progress, workload};
use crate::{EngineError, Result};

// ---------------------------------------------------------------------------
// Request / result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: String,
    pub deadline: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedTask {
    pub task: Task,
    /// RAG entry, then Assignment entry.
    pub logs: Vec<AgentLog>,
    /// True when the default team was used instead of the classifier's pick.
    pub used_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reassignment {
    pub task_id: Uuid,
    pub from: Option<Uuid>,
    pub to: Uuid,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckReport {
    /// Tasks the health oracle (or its fallback) was consulted for.
    pub scanned: usize,
    /// Newly flagged tasks that kept their assignee.
    pub flagged: Vec<Uuid>,
    pub reassigned: Vec<Reassignment>,
    /// Assessments that came from the deadline rule after an oracle failure.
    pub fallbacks: usize,
    /// The scan stopped early on the cancellation signal.
    pub cancelled: bool,
    /// Tasks changed by this scan, in scan order.
    pub updated: Vec<Task>,
    /// Entries written by this scan, in write order.
    pub logs: Vec<AgentLog>,
}

/// Current state with workloads freshly derived from the task set.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub users: Vec<User>,
    pub teams: Vec<Team>,
    pub memberships: Vec<TeamMembership>,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    /// Stop a scan after this many tasks; 0 means no limit.
    pub max_scan_tasks: usize,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher {
    store: Arc<dyn EntityStore>,
    oracles: OracleSet,
    config: DispatcherConfig,
    write_lock: Mutex<()>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn EntityStore>, oracles: OracleSet) -> Self {
        Self {
            store,
            oracles,
            config: DispatcherConfig::default(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    pub async fn create_task(&self, request: CreateTaskRequest) -> Result<CreatedTask> {
        self.create_task_cancellable(request, None).await
    }

    /// Classify, pick the least loaded member and persist the task with its
    /// two audit entries. A cancelled or timed-out classification resolves
    /// to the default team.
    pub async fn create_task_cancellable(
        &self,
        request: CreateTaskRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<CreatedTask> {
        let draft = TaskDraft {
            title: request.title.trim().to_string(),
            description: request.description,
            deadline: request.deadline,
        };

        let teams = self.store.list_teams().await?;
        draft.validate(&teams)?;

        let classification_request = draft.classification_request(&teams);
        let classifier = &self.oracles.classifier;
        let outcome = self
            .oracles
            .classifier_guard
            .call(cancel, || classifier.classify(&classification_request))
            .await;

        let _write = self.write_lock.lock().await;

        // Re-read under the lock; the oracle answered against the earlier list.
        let teams = self.store.list_teams().await?;
        let decision = assignment::resolve_team(outcome, &teams).ok_or_else(|| {
            EngineError::Validation("cannot create a task without any teams".into())
        })?;

        let tasks = self.store.list_tasks().await?;
        let memberships = workload::recompute(&tasks, &self.store.list_memberships().await?);
        let users = self.store.list_users().await?;

        let plan = assignment::plan(&draft, &decision, &teams, &memberships, &users);
        let (task, logs) = self.store.create_task(plan.task, plan.logs).await?;

        info!(
            task_id = %task.id,
            team_id = ?task.assigned_team_id,
            member_id = ?task.assigned_member_id,
            fallback = decision.used_fallback,
            "task created"
        );

        self.persist_workloads().await;

        Ok(CreatedTask {
            task,
            logs,
            used_fallback: decision.used_fallback,
        })
    }

    /// Set a task's progress. Completing a task frees its assignee's
    /// workload on the next ranking read.
    pub async fn update_progress(&self, task_id: Uuid, value: i64) -> Result<Task> {
        let progress = progress::parse_progress(value)?;

        let _write = self.write_lock.lock().await;

        if self.store.get_task(task_id).await?.is_none() {
            return Err(EngineError::NotFound {
                entity: "task",
                id: task_id,
            });
        }

        let (patch, entry) = progress::plan(progress);
        let (task, _) = self.store.update_task(task_id, patch, vec![entry]).await?;
        info!(task_id = %task.id, progress = %task.progress, status = %task.status(), "progress updated");

        self.persist_workloads().await;
        Ok(task)
    }

    /// Scan every non-completed task in task-list order, flag those at risk
    /// and move them to a less loaded teammate where one exists.
    ///
    /// A failing or cancelled health oracle falls back to the deadline rule
    /// for that task. Once `cancel` fires, the scan stops after the task in
    /// progress.
    pub async fn run_health_check(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<HealthCheckReport> {
        let _write = self.write_lock.lock().await;

        let mut tasks = self.store.list_tasks().await?;
        let users = self.store.list_users().await?;
        let mut memberships = workload::recompute(&tasks, &self.store.list_memberships().await?);

        let active: Vec<Uuid> = tasks.iter().filter(|t| t.is_active()).map(|t| t.id).collect();
        let mut report = HealthCheckReport::default();
        let health = &self.oracles.health;

        for task_id in active {
            if cancel.is_cancelled() {
                info!(scanned = report.scanned, "health check cancelled");
                report.cancelled = true;
                break;
            }
            if self.config.max_scan_tasks > 0 && report.scanned >= self.config.max_scan_tasks {
                debug!(limit = self.config.max_scan_tasks, "scan limit reached");
                break;
            }
            let Some(idx) = tasks.iter().position(|t| t.id == task_id) else {
                continue;
            };

            let request = rebalance::health_request(&tasks[idx], now);
            let assessment = match self
                .oracles
                .health_guard
                .call(Some(cancel), || health.assess(&request))
                .await
            {
                Ok(a) => a,
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "health oracle unavailable, using deadline rule");
                    report.fallbacks += 1;
                    fallback_assessment(request.progress, request.days_until_deadline)
                }
            };
            report.scanned += 1;

            let Some(decision) = rebalance::decide(&tasks[idx], &assessment, &memberships, &users)
            else {
                debug!(task_id = %task_id, days = request.days_until_deadline, "no flag transition");
                continue;
            };

            let (updated, logs) = self
                .store
                .update_task(task_id, decision.patch, decision.logs)
                .await?;

            match decision.outcome {
                Outcome::Flagged => {
                    info!(task_id = %task_id, "task flagged, no teammate with lower workload");
                    report.flagged.push(task_id);
                }
                Outcome::Reassigned { from, to } => {
                    info!(task_id = %task_id, from = ?from, to = %to, "task reassigned to relieve load");
                    report.reassigned.push(Reassignment { task_id, from, to });
                }
            }

            tasks[idx] = updated.clone();
            memberships = workload::recompute(&tasks, &memberships);
            report.updated.push(updated);
            report.logs.extend(logs);
        }

        self.persist_workloads().await;
        Ok(report)
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.store.list_tasks().await?)
    }

    // -----------------------------------------------------------------------
    // Directory
    // -----------------------------------------------------------------------

    pub async fn create_team(&self, name: &str, skills: Vec<String>) -> Result<Team> {
        let _write = self.write_lock.lock().await;
        directory::create_team(self.store.as_ref(), name, skills).await
    }

    pub async fn update_team(&self, id: Uuid, patch: TeamPatch) -> Result<Team> {
        let _write = self.write_lock.lock().await;
        directory::update_team(self.store.as_ref(), id, patch).await
    }

    pub async fn set_team_lead(&self, team_id: Uuid, lead_id: Option<Uuid>) -> Result<Team> {
        let _write = self.write_lock.lock().await;
        directory::set_team_lead(self.store.as_ref(), team_id, lead_id).await
    }

    pub async fn add_member(&self, team_id: Uuid, member_id: Uuid) -> Result<TeamMembership> {
        let _write = self.write_lock.lock().await;
        let membership = directory::add_member(self.store.as_ref(), team_id, member_id).await?;
        self.persist_workloads().await;
        Ok(membership)
    }

    pub async fn login(&self, email: &str) -> Result<Option<User>> {
        directory::login(self.store.as_ref(), email).await
    }

    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        role: Role,
        team_id: Option<Uuid>,
    ) -> Result<User> {
        let _write = self.write_lock.lock().await;
        let user = directory::signup(
            self.store.as_ref(),
            Signup {
                name: name.to_string(),
                email: email.to_string(),
                role,
                team_id,
            },
        )
        .await?;
        self.persist_workloads().await;
        Ok(user)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn snapshot(&self) -> Result<Snapshot> {
        let tasks = self.store.list_tasks().await?;
        let memberships = workload::recompute(&tasks, &self.store.list_memberships().await?);
        Ok(Snapshot {
            users: self.store.list_users().await?,
            teams: self.store.list_teams().await?,
            memberships,
            tasks,
        })
    }

    pub async fn audit(&self) -> Result<AuditView> {
        Ok(AuditView::new(self.store.list_logs().await?))
    }

    /// Write derived workloads back to the store. Callers hold the write
    /// lock. Workloads are recomputed before every ranking read, so a failed
    /// save is logged and otherwise ignored.
    async fn persist_workloads(&self) {
        let result = async {
            let tasks = self.store.list_tasks().await?;
            let memberships = self.store.list_memberships().await?;
            self.store
                .save_workloads(&workload::recompute(&tasks, &memberships))
                .await
        }
        .await;
        if let Err(e) = result {
            warn!(error = %e, "failed to persist recomputed workloads");
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("oracles", &self.oracles)
            .field("config", &self.config)
            .finish()
    }
}
