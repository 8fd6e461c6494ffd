//! Classification and health oracles.
//!
//! Both oracles are advisory. The engines call whichever implementation was
//! injected at construction time and, on any [`OracleError`], substitute the
//! deterministic rule from [`fallback_classification`] or
//! [`fallback_assessment`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use tf_core::types::{Progress, Team};

use crate::llm::{LlmConfig, LlmError, LlmMessage, LlmProvider};

/// Reasoning recorded when the default team is chosen without an oracle.
pub const FALLBACK_REASONING: &str =
    "Fallback: classification advisor unavailable, default team selected.";

pub const FALLBACK_FLAGGED_SUGGESTION: &str = "Deadline imminent with low progress.";
pub const FALLBACK_NOMINAL_SUGGESTION: &str = "System nominal.";

/// Days-to-deadline below which the fallback rule considers a task urgent.
pub const URGENT_DAYS: i64 = 2;
/// Progress below which the fallback rule considers a task behind.
pub const LOW_PROGRESS: u8 = 50;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Every variant means "oracle unavailable" to the engines.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),
    #[error("oracle call cancelled")]
    Cancelled,
    #[error("unparseable oracle reply: {0}")]
    Unparseable(String),
    #[error("oracle chose team {0} which is not in the candidate list")]
    UnknownTeam(Uuid),
    #[error(transparent)]
    Provider(#[from] LlmError),
}

// ---------------------------------------------------------------------------
// Requests / replies
// ---------------------------------------------------------------------------

/// The slice of a team the classifier gets to see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamProfile {
    pub id: Uuid,
    pub name: String,
    pub skills: Vec<String>,
}

impl From<&Team> for TeamProfile {
    fn from(team: &Team) -> Self {
        Self {
            id: team.id,
            name: team.name.clone(),
            skills: team.skills.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub title: String,
    pub description: String,
    /// Candidate teams in canonical order.
    pub teams: Vec<TeamProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub team_id: Uuid,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRequest {
    pub title: String,
    pub progress: Progress,
    /// Negative once the deadline has passed.
    pub days_until_deadline: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthAssessment {
    pub flag_overload: bool,
    pub suggestion: String,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ClassificationOracle: Send + Sync {
    /// Short label used in tracing output.
    fn name(&self) -> &str;

    async fn classify(&self, request: &ClassificationRequest)
        -> Result<Classification, OracleError>;
}

#[async_trait]
pub trait HealthOracle: Send + Sync {
    fn name(&self) -> &str;

    async fn assess(&self, request: &HealthRequest) -> Result<HealthAssessment, OracleError>;
}

// ---------------------------------------------------------------------------
// Deterministic fallbacks
// ---------------------------------------------------------------------------

/// First team in canonical order with the fixed reasoning, or `None` when
/// there are no teams at all.
pub fn fallback_classification(teams: &[TeamProfile]) -> Option<Classification> {
    teams.first().map(|team| Classification {
        team_id: team.id,
        reasoning: FALLBACK_REASONING.to_string(),
    })
}

/// Flag a task with under two days left and less than half done.
pub fn fallback_assessment(progress: Progress, days_until_deadline: i64) -> HealthAssessment {
    if days_until_deadline < URGENT_DAYS && progress.value() < LOW_PROGRESS {
        HealthAssessment {
            flag_overload: true,
            suggestion: FALLBACK_FLAGGED_SUGGESTION.to_string(),
        }
    } else {
        HealthAssessment {
            flag_overload: false,
            suggestion: FALLBACK_NOMINAL_SUGGESTION.to_string(),
        }
    }
}

/// Classifier used when no advisor is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTeamClassifier;

#[async_trait]
impl ClassificationOracle for DefaultTeamClassifier {
    fn name(&self) -> &str {
        "default-team"
    }

    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<Classification, OracleError> {
        fallback_classification(&request.teams)
            .ok_or_else(|| OracleError::Unavailable("no candidate teams".into()))
    }
}

/// Health advisor used when no advisor is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeadlineRuleHealth;

#[async_trait]
impl HealthOracle for DeadlineRuleHealth {
    fn name(&self) -> &str {
        "deadline-rule"
    }

    async fn assess(&self, request: &HealthRequest) -> Result<HealthAssessment, OracleError> {
        Ok(fallback_assessment(
            request.progress,
            request.days_until_deadline,
        ))
    }
}

// ---------------------------------------------------------------------------
// LLM-backed oracles
// ---------------------------------------------------------------------------

const CLASSIFY_SYSTEM_PROMPT: &str = "You are a task assignment agent for a software company. \
Pick the single team whose skills best fit the task. \
Reply with a JSON object only.";

const HEALTH_SYSTEM_PROMPT: &str = "You monitor the health of tasks for a software company. \
Reply with a JSON object only.";

/// Classifies through a hosted model. Team listing in the prompt follows the
/// canonical order so identical inputs yield identical prompts.
pub struct LlmClassificationOracle {
    provider: Arc<dyn LlmProvider>,
    config: LlmConfig,
}

impl LlmClassificationOracle {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmConfig) -> Self {
        Self { provider, config }
    }

    pub fn build_prompt(request: &ClassificationRequest) -> String {
        let teams = request
            .teams
            .iter()
            .map(|t| format!("ID: {}, Name: {}, Skills: {}", t.id, t.name, t.skills.join(", ")))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Analyze the following task and assign it to the most appropriate team based on their skills.\n\n\
             Task Title: \"{}\"\n\
             Task Description: \"{}\"\n\n\
             Available Teams:\n{}\n\n\
             Return a JSON object with \"teamId\" (the team's ID exactly as listed) and a short \"reasoning\" (string).",
            request.title, request.description, teams
        )
    }
}

#[async_trait]
impl ClassificationOracle for LlmClassificationOracle {
    fn name(&self) -> &str {
        "llm-classifier"
    }

    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<Classification, OracleError> {
        if request.teams.is_empty() {
            return Err(OracleError::Unavailable("no candidate teams".into()));
        }

        let mut config = self.config.clone();
        config.system_prompt = Some(CLASSIFY_SYSTEM_PROMPT.to_string());
        let messages = [LlmMessage::user(Self::build_prompt(request))];

        let response = self.provider.complete(&messages, &config).await?;
        debug!(
            model = %response.model,
            output_tokens = response.output_tokens,
            "classification reply received"
        );

        let reply: Classification = parse_json_reply(&response.content)?;
        if !request.teams.iter().any(|t| t.id == reply.team_id) {
            return Err(OracleError::UnknownTeam(reply.team_id));
        }
        Ok(reply)
    }
}

pub struct LlmHealthOracle {
    provider: Arc<dyn LlmProvider>,
    config: LlmConfig,
}

impl LlmHealthOracle {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmConfig) -> Self {
        Self { provider, config }
    }

    pub fn build_prompt(request: &HealthRequest) -> String {
        format!(
            "Analyze the health of this task.\n\
             Title: \"{}\"\n\
             Progress: {}\n\
             Days until deadline: {}\n\n\
             If progress is low (< {LOW_PROGRESS}%) and the deadline is close (< {URGENT_DAYS} days), flag as overload.\n\
             Return JSON: {{ \"flagOverload\": boolean, \"suggestion\": string }}",
            request.title, request.progress, request.days_until_deadline
        )
    }
}

#[async_trait]
impl HealthOracle for LlmHealthOracle {
    fn name(&self) -> &str {
        "llm-health"
    }

    async fn assess(&self, request: &HealthRequest) -> Result<HealthAssessment, OracleError> {
        let mut config = self.config.clone();
        config.system_prompt = Some(HEALTH_SYSTEM_PROMPT.to_string());
        let messages = [LlmMessage::user(Self::build_prompt(request))];

        let response = self.provider.complete(&messages, &config).await?;
        parse_json_reply(&response.content)
    }
}

/// Parse the first JSON object in `text`. Models sometimes wrap their reply
/// in a code fence or a sentence.
fn parse_json_reply<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, OracleError> {
    let start = text.find('{');
    let end = text.rfind('}');
    let body = match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => return Err(OracleError::Unparseable(truncate(text))),
    };
    serde_json::from_str(body).map_err(|e| OracleError::Unparseable(e.to_string()))
}

fn truncate(text: &str) -> String {
    const MAX: usize = 120;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX).collect();
        format!("{cut}...")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockProvider;

    fn profiles() -> Vec<TeamProfile> {
        vec![
            TeamProfile {
                id: Uuid::new_v4(),
                name: "Frontend".into(),
                skills: vec!["React".into(), "CSS".into()],
            },
            TeamProfile {
                id: Uuid::new_v4(),
                name: "Backend".into(),
                skills: vec!["SQL".into()],
            },
        ]
    }

    fn progress(p: i64) -> Progress {
        Progress::new(p).unwrap()
    }

    #[test]
    fn fallback_rule_boundaries() {
        assert!(fallback_assessment(progress(49), 1).flag_overload);
        assert!(fallback_assessment(progress(0), -3).flag_overload);
        assert!(!fallback_assessment(progress(50), 1).flag_overload);
        assert!(!fallback_assessment(progress(10), 2).flag_overload);
        assert_eq!(
            fallback_assessment(progress(80), 10).suggestion,
            FALLBACK_NOMINAL_SUGGESTION
        );
    }

    #[test]
    fn fallback_classification_picks_first_team() {
        let teams = profiles();
        let c = fallback_classification(&teams).unwrap();
        assert_eq!(c.team_id, teams[0].id);
        assert_eq!(c.reasoning, FALLBACK_REASONING);
        assert!(fallback_classification(&[]).is_none());
    }

    #[test]
    fn parse_tolerates_code_fences() {
        let id = Uuid::new_v4();
        let text = format!("```json\n{{\"teamId\": \"{id}\", \"reasoning\": \"fits\"}}\n```");
        let c: Classification = parse_json_reply(&text).unwrap();
        assert_eq!(c.team_id, id);
        assert_eq!(c.reasoning, "fits");

        assert!(matches!(
            parse_json_reply::<Classification>("no json here"),
            Err(OracleError::Unparseable(_))
        ));
    }

    #[tokio::test]
    async fn llm_classifier_accepts_listed_team() {
        let teams = profiles();
        let reply = format!(
            "{{\"teamId\": \"{}\", \"reasoning\": \"matches SQL\"}}",
            teams[1].id
        );
        let provider = Arc::new(MockProvider::new().with_content(reply));
        let oracle = LlmClassificationOracle::new(provider.clone(), LlmConfig::default());
        let request = ClassificationRequest {
            title: "Add index".into(),
            description: "Slow SQL query".into(),
            teams: teams.clone(),
        };

        let c = oracle.classify(&request).await.unwrap();
        assert_eq!(c.team_id, teams[1].id);

        let captured = provider.captured_requests();
        assert_eq!(captured.len(), 1);
        let prompt = &captured[0].0[0].content;
        assert!(prompt.contains("Name: Frontend, Skills: React, CSS"));
        assert!(prompt.contains(&teams[1].id.to_string()));
    }

    #[tokio::test]
    async fn llm_classifier_rejects_unknown_team() {
        let stray = Uuid::new_v4();
        let provider = Arc::new(
            MockProvider::new()
                .with_content(format!("{{\"teamId\": \"{stray}\", \"reasoning\": \"?\"}}")),
        );
        let oracle = LlmClassificationOracle::new(provider, LlmConfig::default());
        let request = ClassificationRequest {
            title: "t".into(),
            description: "d".into(),
            teams: profiles(),
        };
        let err = oracle.classify(&request).await.unwrap_err();
        assert!(matches!(err, OracleError::UnknownTeam(id) if id == stray));
    }

    #[tokio::test]
    async fn llm_health_maps_provider_errors() {
        let provider = Arc::new(MockProvider::new().with_error(LlmError::Timeout));
        let oracle = LlmHealthOracle::new(provider, LlmConfig::default());
        let request = HealthRequest {
            title: "t".into(),
            progress: progress(10),
            days_until_deadline: 1,
        };
        assert!(matches!(
            oracle.assess(&request).await,
            Err(OracleError::Provider(LlmError::Timeout))
        ));
    }

    #[tokio::test]
    async fn llm_health_parses_reply() {
        let provider = Arc::new(MockProvider::new().with_content(
            r#"{"flagOverload": true, "suggestion": "Split the task."}"#,
        ));
        let oracle = LlmHealthOracle::new(provider, LlmConfig::default());
        let request = HealthRequest {
            title: "t".into(),
            progress: progress(30),
            days_until_deadline: 5,
        };
        let a = oracle.assess(&request).await.unwrap();
        assert!(a.flag_overload);
        assert_eq!(a.suggestion, "Split the task.");
    }

    #[tokio::test]
    async fn default_implementations_follow_rules() {
        let teams = profiles();
        let c = DefaultTeamClassifier
            .classify(&ClassificationRequest {
                title: "x".into(),
                description: "y".into(),
                teams: teams.clone(),
            })
            .await
            .unwrap();
        assert_eq!(c.team_id, teams[0].id);

        let a = DeadlineRuleHealth
            .assess(&HealthRequest {
                title: "x".into(),
                progress: progress(20),
                days_until_deadline: 0,
            })
            .await
            .unwrap();
        assert!(a.flag_overload);
        assert_eq!(a.suggestion, FALLBACK_FLAGGED_SUGGESTION);
    }
}
