//! Oracle behaviour as seen by a caller: guarded calls, fallbacks, and
//! factory wiring.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tf_core::types::Progress;
use tf_intelligence::{
    fallback_assessment, fallback_classification, ClassificationOracle, ClassificationRequest,
    GuardConfig, GuardState, HealthOracle, HealthRequest, LlmClassificationOracle, LlmConfig,
    LlmError, LlmMockProvider, OracleError, OracleGuard, TeamProfile,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn teams() -> Vec<TeamProfile> {
    ["Frontend", "Backend", "Cloud"]
        .iter()
        .map(|name| TeamProfile {
            id: Uuid::new_v4(),
            name: name.to_string(),
            skills: vec![format!("{name} skill")],
        })
        .collect()
}

struct StallingHealth;

#[async_trait]
impl HealthOracle for StallingHealth {
    fn name(&self) -> &str {
        "stalling"
    }

    async fn assess(
        &self,
        _request: &HealthRequest,
    ) -> Result<tf_intelligence::HealthAssessment, OracleError> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Err(OracleError::Unavailable("never reached".into()))
    }
}

// ===========================================================================
// Classification through the guard
// ===========================================================================

#[tokio::test]
async fn test_provider_failure_resolves_to_first_team() {
    let teams = teams();
    let provider = Arc::new(LlmMockProvider::new().with_error(LlmError::RateLimited {
        retry_after_secs: Some(30),
    }));
    let oracle = LlmClassificationOracle::new(provider, LlmConfig::default());
    let guard = OracleGuard::default();
    let request = ClassificationRequest {
        title: "Fix login bug".into(),
        description: "React form".into(),
        teams: teams.clone(),
    };

    let resolved = match guard.call(None, || oracle.classify(&request)).await {
        Ok(c) => c,
        Err(_) => fallback_classification(&request.teams).unwrap(),
    };
    assert_eq!(resolved.team_id, teams[0].id);
    assert_eq!(resolved.reasoning, tf_intelligence::FALLBACK_REASONING);
}

#[tokio::test]
async fn test_garbage_reply_counts_as_failure() {
    let provider = Arc::new(LlmMockProvider::new().with_content("I think Backend."));
    let oracle = LlmClassificationOracle::new(provider, LlmConfig::default());
    let guard = OracleGuard::default();
    let request = ClassificationRequest {
        title: "t".into(),
        description: "d".into(),
        teams: teams(),
    };

    let out = guard.call(None, || oracle.classify(&request)).await;
    assert!(matches!(out, Err(OracleError::Unparseable(_))));
    assert_eq!(guard.failure_count().await, 1);
}

// ===========================================================================
// Health through the guard
// ===========================================================================

#[tokio::test]
async fn test_timeout_falls_back_to_deadline_rule() {
    let guard = OracleGuard::new(GuardConfig {
        call_timeout: Duration::from_millis(20),
        ..Default::default()
    });
    let request = HealthRequest {
        title: "Ship release".into(),
        progress: Progress::new(10).unwrap(),
        days_until_deadline: 1,
    };

    let oracle = StallingHealth;
    let out = guard.call(None, || oracle.assess(&request)).await;
    assert!(matches!(out, Err(OracleError::Timeout(_))));

    let assessment = fallback_assessment(request.progress, request.days_until_deadline);
    assert!(assessment.flag_overload);
}

#[tokio::test]
async fn test_cancelled_scan_does_not_trip_guard() {
    let guard = OracleGuard::new(GuardConfig {
        failure_threshold: 1,
        ..Default::default()
    });
    let token = CancellationToken::new();
    token.cancel();
    let request = HealthRequest {
        title: "t".into(),
        progress: Progress::ZERO,
        days_until_deadline: 0,
    };

    let oracle = StallingHealth;
    let out = guard.call(Some(&token), || oracle.assess(&request)).await;
    assert!(matches!(out, Err(OracleError::Cancelled)));
    assert_eq!(guard.state().await, GuardState::Closed);
}
