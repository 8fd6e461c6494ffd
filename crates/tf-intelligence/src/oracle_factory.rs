//! Resolve an [`OracleConfig`] into concrete oracle implementations.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use tf_core::config::{CredentialProvider, OracleConfig};

use crate::guard::{GuardConfig, OracleGuard};
use crate::llm::{AnthropicProvider, GeminiProvider, LlmConfig, LlmProvider, OpenAiProvider};
use crate::oracle::{
    ClassificationOracle, DeadlineRuleHealth, DefaultTeamClassifier, HealthOracle,
    LlmClassificationOracle, LlmHealthOracle,
};

/// The oracles an engine is constructed with. Each oracle runs under its own
/// guard so failures of one never trip the other.
#[derive(Clone)]
pub struct OracleSet {
    pub classifier: Arc<dyn ClassificationOracle>,
    pub health: Arc<dyn HealthOracle>,
    pub classifier_guard: OracleGuard,
    pub health_guard: OracleGuard,
}

impl OracleSet {
    /// Deterministic rules only. No network access.
    pub fn fallback() -> Self {
        Self::new(
            Arc::new(DefaultTeamClassifier),
            Arc::new(DeadlineRuleHealth),
            GuardConfig::default(),
        )
    }

    pub fn new(
        classifier: Arc<dyn ClassificationOracle>,
        health: Arc<dyn HealthOracle>,
        guard_config: GuardConfig,
    ) -> Self {
        Self {
            classifier,
            health,
            classifier_guard: OracleGuard::new(guard_config.clone()),
            health_guard: OracleGuard::new(guard_config),
        }
    }
}

impl std::fmt::Debug for OracleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleSet")
            .field("classifier", &self.classifier.name())
            .field("health", &self.health.name())
            .finish()
    }
}

/// Build oracles from config, reading the API key from the environment.
pub fn build_oracles(cfg: &OracleConfig) -> OracleSet {
    build_oracles_with_key(cfg, CredentialProvider::oracle_api_key(cfg))
}

/// Build oracles from config with an already-resolved API key.
///
/// Falls back to the deterministic rules when the provider is `"none"` or no
/// key is available.
pub fn build_oracles_with_key(cfg: &OracleConfig, api_key: Option<String>) -> OracleSet {
    let guard_config =
        GuardConfig::default().with_call_timeout(Duration::from_secs(cfg.timeout_secs));
    let rules = || {
        OracleSet::new(
            Arc::new(DefaultTeamClassifier),
            Arc::new(DeadlineRuleHealth),
            guard_config.clone(),
        )
    };

    if cfg.provider == "none" {
        info!("no oracle provider configured, using deterministic rules");
        return rules();
    }

    let Some(key) = api_key else {
        warn!(
            provider = %cfg.provider,
            env = %cfg.api_key_env,
            "oracle API key not set, using deterministic rules"
        );
        return rules();
    };

    let provider: Arc<dyn LlmProvider> = match cfg.provider.as_str() {
        "anthropic" => {
            let p = AnthropicProvider::new(key);
            Arc::new(match &cfg.base_url {
                Some(url) => p.with_base_url(url),
                None => p,
            })
        }
        "openai" => {
            let p = OpenAiProvider::new(key);
            Arc::new(match &cfg.base_url {
                Some(url) => p.with_base_url(url),
                None => p,
            })
        }
        "gemini" => {
            let p = GeminiProvider::new(key);
            Arc::new(match &cfg.base_url {
                Some(url) => p.with_base_url(url),
                None => p,
            })
        }
        other => {
            warn!(provider = %other, "unknown oracle provider, using deterministic rules");
            return rules();
        }
    };

    let llm_config = LlmConfig {
        model: cfg.model.clone(),
        max_tokens: cfg.max_tokens,
        temperature: cfg.temperature,
        system_prompt: None,
    };

    info!(provider = %cfg.provider, model = %cfg.model, "oracles backed by hosted model");
    OracleSet::new(
        Arc::new(LlmClassificationOracle::new(
            provider.clone(),
            llm_config.clone(),
        )),
        Arc::new(LlmHealthOracle::new(provider, llm_config)),
        guard_config,
    )
}
