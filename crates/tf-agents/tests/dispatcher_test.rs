//! End-to-end engine behaviour through the dispatcher: assignment,
//! progress, health checks and persistence failures.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use tf_agents::{CreateTaskRequest, Dispatcher, EngineError};
use tf_core::store::{EntityStore, MemoryStore, StoreError, StoreResult};
use tf_core::types::{
    AgentLog, AgentName, LogEntry, NewTask, NewTeam, NewUser, Role, Task, TaskPatch, TaskStatus,
    Team, TeamMembership, TeamPatch, User,
};
use tf_intelligence::oracle::FALLBACK_REASONING;
use tf_intelligence::{
    Classification, ClassificationOracle, ClassificationRequest, GuardConfig, HealthAssessment,
    HealthOracle, HealthRequest, OracleError, OracleSet,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// ===========================================================================
// Oracle doubles
// ===========================================================================

/// Picks the team whose name is given, or fails.
struct NamedTeamClassifier {
    team_name: Option<String>,
    calls: AtomicUsize,
}

impl NamedTeamClassifier {
    fn picking(name: &str) -> Self {
        Self {
            team_name: Some(name.into()),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            team_name: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ClassificationOracle for NamedTeamClassifier {
    fn name(&self) -> &str {
        "named-team"
    }

    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<Classification, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = self
            .team_name
            .as_deref()
            .ok_or_else(|| OracleError::Unavailable("offline".into()))?;
        let team = request
            .teams
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| OracleError::Unavailable("no such team".into()))?;
        Ok(Classification {
            team_id: team.id,
            reasoning: format!("matches {}", team.skills.join(", ")),
        })
    }
}

struct ScriptedHealth {
    reply: Option<HealthAssessment>,
    calls: AtomicUsize,
    /// Cancel this token on the first call.
    cancel_on_call: Option<CancellationToken>,
}

impl ScriptedHealth {
    fn replying(flag: bool, suggestion: &str) -> Self {
        Self {
            reply: Some(HealthAssessment {
                flag_overload: flag,
                suggestion: suggestion.into(),
            }),
            calls: AtomicUsize::new(0),
            cancel_on_call: None,
        }
    }

    fn failing() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
            cancel_on_call: None,
        }
    }
}

#[async_trait]
impl HealthOracle for ScriptedHealth {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn assess(&self, _request: &HealthRequest) -> Result<HealthAssessment, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.cancel_on_call {
            token.cancel();
        }
        self.reply
            .clone()
            .ok_or_else(|| OracleError::Unavailable("offline".into()))
    }
}

// ===========================================================================
// Store double
// ===========================================================================

/// Memory store whose task writes can be switched off.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_task_writes: AtomicBool,
}

#[async_trait]
impl EntityStore for FlakyStore {
    async fn list_users(&self) -> StoreResult<Vec<User>> {
        self.inner.list_users().await
    }
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.inner.find_user_by_email(email).await
    }
    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        self.inner.create_user(new).await
    }
    async fn update_user_role(&self, id: Uuid, role: Role) -> StoreResult<User> {
        self.inner.update_user_role(id, role).await
    }
    async fn list_teams(&self) -> StoreResult<Vec<Team>> {
        self.inner.list_teams().await
    }
    async fn create_team(&self, new: NewTeam) -> StoreResult<Team> {
        self.inner.create_team(new).await
    }
    async fn update_team(&self, id: Uuid, patch: TeamPatch) -> StoreResult<Team> {
        self.inner.update_team(id, patch).await
    }
    async fn list_memberships(&self) -> StoreResult<Vec<TeamMembership>> {
        self.inner.list_memberships().await
    }
    async fn create_membership(
        &self,
        team_id: Uuid,
        member_id: Uuid,
    ) -> StoreResult<TeamMembership> {
        self.inner.create_membership(team_id, member_id).await
    }
    async fn save_workloads(&self, memberships: &[TeamMembership]) -> StoreResult<()> {
        self.inner.save_workloads(memberships).await
    }
    async fn list_tasks(&self) -> StoreResult<Vec<Task>> {
        self.inner.list_tasks().await
    }
    async fn get_task(&self, id: Uuid) -> StoreResult<Option<Task>> {
        self.inner.get_task(id).await
    }
    async fn create_task(
        &self,
        new: NewTask,
        logs: Vec<LogEntry>,
    ) -> StoreResult<(Task, Vec<AgentLog>)> {
        if self.fail_task_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".into()));
        }
        self.inner.create_task(new, logs).await
    }
    async fn update_task(
        &self,
        id: Uuid,
        patch: TaskPatch,
        logs: Vec<LogEntry>,
    ) -> StoreResult<(Task, Vec<AgentLog>)> {
        if self.fail_task_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".into()));
        }
        self.inner.update_task(id, patch, logs).await
    }
    async fn append_log(&self, task_id: Uuid, entry: LogEntry) -> StoreResult<AgentLog> {
        self.inner.append_log(task_id, entry).await
    }
    async fn list_logs(&self) -> StoreResult<Vec<AgentLog>> {
        self.inner.list_logs().await
    }
}

// ===========================================================================
// Fixtures
// ===========================================================================

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
}

fn in_days(days: i64) -> NaiveDate {
    (now() + Duration::days(days)).date_naive()
}

fn request(title: &str, deadline: NaiveDate) -> CreateTaskRequest {
    CreateTaskRequest {
        title: title.into(),
        description: format!("{title} description"),
        deadline,
    }
}

fn oracles(classifier: NamedTeamClassifier, health: ScriptedHealth) -> OracleSet {
    OracleSet::new(Arc::new(classifier), Arc::new(health), GuardConfig::default())
}

struct Org {
    frontend: Team,
    backend: Team,
    alice: User,
    bob: User,
    carol: User,
}

/// Frontend: alice, bob. Backend: carol.
async fn seed(store: &dyn EntityStore) -> Org {
    let frontend = store
        .create_team(NewTeam {
            name: "Frontend".into(),
            skills: vec!["React".into()],
        })
        .await
        .unwrap();
    let backend = store
        .create_team(NewTeam {
            name: "Backend".into(),
            skills: vec!["SQL".into()],
        })
        .await
        .unwrap();
    let alice = store
        .create_user(NewUser::new("Alice", "alice@corp.com", Role::Member))
        .await
        .unwrap();
    let bob = store
        .create_user(NewUser::new("Bob", "bob@corp.com", Role::Member))
        .await
        .unwrap();
    let carol = store
        .create_user(NewUser::new("Carol", "carol@corp.com", Role::Member))
        .await
        .unwrap();
    store.create_membership(frontend.id, alice.id).await.unwrap();
    store.create_membership(frontend.id, bob.id).await.unwrap();
    store.create_membership(backend.id, carol.id).await.unwrap();
    Org {
        frontend,
        backend,
        alice,
        bob,
        carol,
    }
}

fn workload_of(memberships: &[TeamMembership], team: Uuid, member: Uuid) -> u32 {
    memberships
        .iter()
        .find(|m| m.team_id == team && m.member_id == member)
        .map(|m| m.workload)
        .unwrap()
}

// ===========================================================================
// Assignment
// ===========================================================================

#[tokio::test]
async fn healthy_oracle_assigns_lowest_workload_member() {
    let store = Arc::new(MemoryStore::new());
    let org = seed(store.as_ref()).await;
    let dispatcher = Dispatcher::new(
        store.clone(),
        oracles(NamedTeamClassifier::picking("Frontend"), ScriptedHealth::failing()),
    );

    let first = dispatcher.create_task(request("Fix login bug", in_days(5))).await.unwrap();
    assert_eq!(first.task.assigned_team_id, Some(org.frontend.id));
    assert_eq!(first.task.assigned_member_id, Some(org.alice.id));
    assert_eq!(first.task.status(), TaskStatus::Pending);
    assert!(!first.task.overload_flag);
    assert!(!first.used_fallback);
    assert_eq!(first.logs.len(), 2);
    assert_eq!(first.logs[0].agent_name, AgentName::Rag);
    assert_eq!(
        first.logs[0].action,
        "Selected Team Frontend. Reason: matches React"
    );
    assert_eq!(first.logs[1].agent_name, AgentName::Assignment);
    assert_eq!(
        first.logs[1].action,
        "Auto-assigned to Alice (Current Workload: 0)"
    );

    // Alice now carries one task, so Bob is next.
    let second = dispatcher.create_task(request("Style navbar", in_days(5))).await.unwrap();
    assert_eq!(second.task.assigned_member_id, Some(org.bob.id));

    // Tie at one each goes back to the earliest membership.
    let third = dispatcher.create_task(request("Dark mode", in_days(5))).await.unwrap();
    assert_eq!(third.task.assigned_member_id, Some(org.alice.id));
    assert_eq!(
        third.logs[1].action,
        "Auto-assigned to Alice (Current Workload: 1)"
    );
}

#[tokio::test]
async fn oracle_failure_falls_back_to_first_team() {
    let store = Arc::new(MemoryStore::new());
    let org = seed(store.as_ref()).await;
    let dispatcher = Dispatcher::new(
        store.clone(),
        oracles(NamedTeamClassifier::failing(), ScriptedHealth::failing()),
    );

    for title in ["Tune SQL indexes", "Write onboarding docs"] {
        let created = dispatcher.create_task(request(title, in_days(3))).await.unwrap();
        assert!(created.used_fallback);
        assert_eq!(created.task.assigned_team_id, Some(org.frontend.id));
        assert_eq!(
            created.logs[0].action,
            format!("Selected Team Frontend. Reason: {FALLBACK_REASONING}")
        );
    }
}

#[tokio::test]
async fn failing_health_oracle_does_not_disable_classification() {
    let store = Arc::new(MemoryStore::new());
    let org = seed(store.as_ref()).await;
    let dispatcher = Dispatcher::new(
        store.clone(),
        oracles(NamedTeamClassifier::picking("Backend"), ScriptedHealth::failing()),
    );

    for title in ["Index orders", "Vacuum tables", "Rotate keys"] {
        let created = dispatcher.create_task(request(title, in_days(1))).await.unwrap();
        assert!(!created.used_fallback);
    }
    let report = dispatcher
        .run_health_check(now(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.fallbacks, 3);

    let after = dispatcher.create_task(request("Shard users", in_days(6))).await.unwrap();
    assert!(!after.used_fallback);
    assert_eq!(after.task.assigned_team_id, Some(org.backend.id));
    assert_eq!(after.logs[0].action, "Selected Team Backend. Reason: matches SQL");
}

#[tokio::test]
async fn team_without_members_leaves_task_unassigned() {
    let store = Arc::new(MemoryStore::new());
    seed(store.as_ref()).await;
    store
        .create_team(NewTeam {
            name: "HR".into(),
            skills: vec!["Recruiting".into()],
        })
        .await
        .unwrap();
    let dispatcher = Dispatcher::new(
        store.clone(),
        oracles(NamedTeamClassifier::picking("HR"), ScriptedHealth::failing()),
    );

    let created = dispatcher.create_task(request("Hire SRE", in_days(9))).await.unwrap();
    assert_eq!(created.task.assigned_member_id, None);
    assert_eq!(
        created.logs[1].action,
        "No members available in team. Task unassigned."
    );
}

#[tokio::test]
async fn no_teams_is_rejected_before_the_oracle() {
    let store = Arc::new(MemoryStore::new());
    let classifier = Arc::new(NamedTeamClassifier::picking("Frontend"));
    let dispatcher = Dispatcher::new(
        store.clone(),
        OracleSet::new(
            classifier.clone(),
            Arc::new(ScriptedHealth::failing()),
            GuardConfig::default(),
        ),
    );

    let err = dispatcher.create_task(request("Orphan", in_days(1))).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    assert!(store.list_tasks().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_task_write_leaves_no_trace() {
    let store = Arc::new(FlakyStore::default());
    let org = seed(store.as_ref()).await;
    let dispatcher = Dispatcher::new(
        store.clone(),
        oracles(NamedTeamClassifier::picking("Frontend"), ScriptedHealth::failing()),
    );

    store.fail_task_writes.store(true, Ordering::SeqCst);
    let err = dispatcher.create_task(request("Doomed", in_days(2))).await.unwrap_err();
    assert!(matches!(err, EngineError::Persistence(_)));

    assert!(store.list_tasks().await.unwrap().is_empty());
    assert!(store.list_logs().await.unwrap().is_empty());
    let memberships = store.list_memberships().await.unwrap();
    assert_eq!(workload_of(&memberships, org.frontend.id, org.alice.id), 0);
}

// ===========================================================================
// Progress
// ===========================================================================

#[tokio::test]
async fn completing_a_task_frees_workload() {
    let store = Arc::new(MemoryStore::new());
    let org = seed(store.as_ref()).await;
    let dispatcher = Dispatcher::new(
        store.clone(),
        oracles(NamedTeamClassifier::picking("Backend"), ScriptedHealth::failing()),
    );

    let created = dispatcher.create_task(request("Migrate DB", in_days(4))).await.unwrap();
    let snapshot = dispatcher.snapshot().await.unwrap();
    assert_eq!(workload_of(&snapshot.memberships, org.backend.id, org.carol.id), 1);

    let done = dispatcher.update_progress(created.task.id, 100).await.unwrap();
    assert_eq!(done.status(), TaskStatus::Completed);

    let snapshot = dispatcher.snapshot().await.unwrap();
    assert_eq!(workload_of(&snapshot.memberships, org.backend.id, org.carol.id), 0);
    let stored = store.list_memberships().await.unwrap();
    assert_eq!(workload_of(&stored, org.backend.id, org.carol.id), 0);

    let audit = dispatcher.audit().await.unwrap();
    let history = audit.for_task(created.task.id);
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].agent_name, AgentName::Progress);
    assert_eq!(history[0].action, "User updated progress to 100%");
}

#[tokio::test]
async fn progress_validation_and_unknown_task() {
    let store = Arc::new(MemoryStore::new());
    seed(store.as_ref()).await;
    let dispatcher = Dispatcher::new(store.clone(), OracleSet::fallback());

    let created = dispatcher.create_task(request("Task", in_days(4))).await.unwrap();
    assert!(matches!(
        dispatcher.update_progress(created.task.id, 101).await,
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        dispatcher.update_progress(Uuid::new_v4(), 50).await,
        Err(EngineError::NotFound { entity: "task", .. })
    ));
    assert_eq!(store.list_logs().await.unwrap().len(), 2);
}

// ===========================================================================
// Health check
// ===========================================================================

#[tokio::test]
async fn overloaded_task_moves_to_lighter_teammate() {
    let store = Arc::new(MemoryStore::new());
    let org = seed(store.as_ref()).await;
    let dispatcher = Dispatcher::new(
        store.clone(),
        oracles(NamedTeamClassifier::picking("Frontend"), ScriptedHealth::failing()),
    );

    // alice: urgent + later; bob: later. alice carries 2, bob 1.
    let urgent = dispatcher.create_task(request("Hotfix", in_days(1))).await.unwrap();
    dispatcher.create_task(request("Refactor", in_days(30))).await.unwrap();
    dispatcher.create_task(request("Docs", in_days(30))).await.unwrap();
    dispatcher.update_progress(urgent.task.id, 10).await.unwrap();
    assert_eq!(urgent.task.assigned_member_id, Some(org.alice.id));

    let report = dispatcher
        .run_health_check(now(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.scanned, 3);
    assert_eq!(report.fallbacks, 3);
    assert_eq!(report.reassigned.len(), 1);
    assert_eq!(report.reassigned[0].task_id, urgent.task.id);
    assert_eq!(report.reassigned[0].to, org.bob.id);

    let task = store.get_task(urgent.task.id).await.unwrap().unwrap();
    assert_eq!(task.assigned_member_id, Some(org.bob.id));
    assert!(!task.overload_flag);

    assert_eq!(report.logs.len(), 2);
    assert_eq!(
        report.logs[0].action,
        "FLAGGED: Deadline imminent with low progress."
    );
    assert_eq!(
        report.logs[1].action,
        "Re-assigned task to Bob to relieve load."
    );

    let snapshot = dispatcher.snapshot().await.unwrap();
    assert_eq!(workload_of(&snapshot.memberships, org.frontend.id, org.alice.id), 1);
    assert_eq!(workload_of(&snapshot.memberships, org.frontend.id, org.bob.id), 2);
}

#[tokio::test]
async fn sole_member_task_stays_flagged_and_is_not_reflagged() {
    let store = Arc::new(MemoryStore::new());
    let org = seed(store.as_ref()).await;
    let dispatcher = Dispatcher::new(
        store.clone(),
        oracles(
            NamedTeamClassifier::picking("Backend"),
            ScriptedHealth::replying(true, "Scope is too large."),
        ),
    );

    let created = dispatcher.create_task(request("Schema", in_days(20))).await.unwrap();

    let report = dispatcher
        .run_health_check(now(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.flagged, vec![created.task.id]);
    assert_eq!(report.logs.len(), 1);
    assert_eq!(report.logs[0].action, "FLAGGED: Scope is too large.");

    let task = store.get_task(created.task.id).await.unwrap().unwrap();
    assert!(task.overload_flag);
    assert_eq!(task.assigned_member_id, Some(org.carol.id));

    let again = dispatcher
        .run_health_check(now(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(again.flagged.is_empty());
    assert!(again.logs.is_empty());
}

#[tokio::test]
async fn completed_and_healthy_tasks_produce_no_logs() {
    let store = Arc::new(MemoryStore::new());
    seed(store.as_ref()).await;
    let health = Arc::new(ScriptedHealth::replying(false, "System nominal."));
    let dispatcher = Dispatcher::new(
        store.clone(),
        OracleSet::new(
            Arc::new(NamedTeamClassifier::picking("Frontend")),
            health.clone(),
            GuardConfig::default(),
        ),
    );

    let done = dispatcher.create_task(request("Done", in_days(1))).await.unwrap();
    dispatcher.update_progress(done.task.id, 100).await.unwrap();
    dispatcher.create_task(request("Fine", in_days(1))).await.unwrap();
    let before = store.list_logs().await.unwrap().len();

    let report = dispatcher
        .run_health_check(now(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(health.calls.load(Ordering::SeqCst), 1);
    assert!(report.updated.is_empty());
    assert_eq!(store.list_logs().await.unwrap().len(), before);
}

#[tokio::test]
async fn cancellation_stops_after_current_task() {
    let store = Arc::new(MemoryStore::new());
    seed(store.as_ref()).await;
    let token = CancellationToken::new();
    let health = Arc::new(ScriptedHealth {
        reply: Some(HealthAssessment {
            flag_overload: false,
            suggestion: String::new(),
        }),
        calls: AtomicUsize::new(0),
        cancel_on_call: Some(token.clone()),
    });
    let dispatcher = Dispatcher::new(
        store.clone(),
        OracleSet::new(
            Arc::new(NamedTeamClassifier::picking("Frontend")),
            health.clone(),
            GuardConfig::default(),
        ),
    );
    for title in ["a", "b", "c"] {
        dispatcher.create_task(request(title, in_days(1))).await.unwrap();
    }

    let report = dispatcher.run_health_check(now(), &token).await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.scanned, 1);
    assert_eq!(health.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scan_limit_bounds_oracle_calls() {
    let store = Arc::new(MemoryStore::new());
    seed(store.as_ref()).await;
    let health = Arc::new(ScriptedHealth::replying(false, "ok"));
    let dispatcher = Dispatcher::new(
        store.clone(),
        OracleSet::new(
            Arc::new(NamedTeamClassifier::picking("Frontend")),
            health.clone(),
            GuardConfig::default(),
        ),
    )
    .with_config(tf_agents::dispatcher::DispatcherConfig { max_scan_tasks: 2 });
    for title in ["a", "b", "c"] {
        dispatcher.create_task(request(title, in_days(10))).await.unwrap();
    }

    let report = dispatcher
        .run_health_check(now(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.scanned, 2);
    assert!(!report.cancelled);
}
