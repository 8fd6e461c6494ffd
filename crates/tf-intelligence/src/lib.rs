//! Advisors consulted by the assignment and rebalancing engines.
//!
//! The engines only ever see the two oracle traits. Whether an oracle is
//! backed by a hosted model or by the deterministic fallback rules is decided
//! once, in [`oracle_factory`], when the application is wired together.

pub mod guard;
pub mod llm;
pub mod oracle;
pub mod oracle_factory;

pub use guard::{GuardConfig, GuardState, OracleGuard};
pub use llm::{
    AnthropicProvider, GeminiProvider, LlmConfig, LlmError, LlmMessage, LlmProvider, LlmResponse,
    LlmRole, MockProvider as LlmMockProvider, OpenAiProvider,
};
pub use oracle::{
    fallback_assessment, fallback_classification, Classification, ClassificationOracle,
    ClassificationRequest, DeadlineRuleHealth, DefaultTeamClassifier, HealthAssessment,
    HealthOracle, HealthRequest, LlmClassificationOracle, LlmHealthOracle, OracleError,
    TeamProfile, FALLBACK_REASONING,
};
pub use oracle_factory::{build_oracles, build_oracles_with_key, OracleSet};
