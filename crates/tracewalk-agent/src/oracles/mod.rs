//! Oracle collaborators backed by a chat-completion model.

pub mod decision;
pub mod execution;
pub mod judge;
pub mod matcher;

pub use decision::{parse_choice, LlmDecisionOracle};
pub use execution::LlmExecutionOracle;
pub use judge::LlmStepJudge;
pub use matcher::LlmStepMatcher;

use std::sync::Arc;

use tracewalk_core::config::{ModelConfig, OracleKind};
use tracewalk_core::error::{Result, TracewalkError};
use tracewalk_core::traits::LlmClient;
use tracewalk_core::types::ChatMessage;

/// A model plus the config to call it with, tagged with the oracle it serves.
#[derive(Clone)]
pub struct OracleModel {
    llm: Arc<dyn LlmClient>,
    config: ModelConfig,
    kind: OracleKind,
}

impl OracleModel {
    pub fn new(llm: Arc<dyn LlmClient>, config: ModelConfig, kind: OracleKind) -> Self {
        Self { llm, config, kind }
    }

    /// Ask the model and return its whole reply.
    ///
    /// Client failures surface as `OracleUnavailable` for this oracle.
    pub async fn ask(&self, messages: Vec<ChatMessage>) -> Result<String> {
        tracewalk_llm::complete_text(self.llm.as_ref(), &self.config, messages)
            .await
            .map_err(|e| match e {
                TracewalkError::LlmRequest(msg) | TracewalkError::LlmStream(msg) => {
                    TracewalkError::unavailable(self.kind.name(), msg)
                }
                other => other,
            })
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

/// Extract JSON from a response that may contain markdown code fences.
pub(crate) fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracewalk_test_utils::{model_config, ScriptedLlm};

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json(r#"{"id": 1}"#), r#"{"id": 1}"#);
        assert_eq!(extract_json("```json\n{\"id\": 2}\n```"), r#"{"id": 2}"#);
        assert_eq!(extract_json("```\n{\"id\": 3}\n```"), r#"{"id": 3}"#);
        assert_eq!(extract_json(r#"Sure: {"id": 4} done"#), r#"{"id": 4}"#);
        assert_eq!(extract_json("  no json  "), "no json");
    }

    #[tokio::test]
    async fn test_ask_maps_client_errors() {
        let llm = ScriptedLlm::new(vec![Err(TracewalkError::LlmRequest("HTTP 500".into()))]);
        let model = OracleModel::new(Arc::new(llm), model_config(), OracleKind::Execution);

        let err = model.ask(vec![ChatMessage::user("x")]).await.unwrap_err();
        assert!(matches!(
            err,
            TracewalkError::OracleUnavailable { ref oracle, .. } if oracle == "execution"
        ));
    }
}
