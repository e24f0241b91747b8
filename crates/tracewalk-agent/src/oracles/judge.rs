use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::{debug, warn};

use tracewalk_core::error::Result;
use tracewalk_core::traits::EvaluationOracle;
use tracewalk_core::types::{ChatMessage, StepVerdict};

use super::{extract_json, OracleModel};

const SYSTEM_PROMPT: &str = "You are an agent that evaluates the success or failure of a given \
task based on its outcome. Please respond with a structured JSON object that includes 'success' \
(yes/no) and 'feedback' (optional) as keys.";

/// Evaluation oracle that asks a model whether a step's result is acceptable.
pub struct LlmStepJudge {
    model: OracleModel,
}

impl LlmStepJudge {
    pub fn new(model: OracleModel) -> Self {
        Self { model }
    }
}

fn build_prompt(step: &str, result: &str) -> String {
    format!(
        "Step: '{}'\nResult: '{}'\nDetermine if this step was successful or not, and provide \
         feedback if necessary.",
        step, result
    )
}

#[derive(Deserialize)]
struct JudgeResponse {
    success: serde_json::Value,
    #[serde(default)]
    feedback: Option<String>,
}

/// Parse a verdict from model response text.
///
/// `success` may be a boolean or a yes/no/true/false string. A reply that
/// does not fit this shape counts as a failed attempt, so the step is
/// retried with feedback explaining why.
fn parse_verdict(response: &str) -> StepVerdict {
    let parsed = match serde_json::from_str::<JudgeResponse>(extract_json(response)) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, response = %response, "Failed to parse judge response");
            return StepVerdict::failed(format!(
                "The evaluation could not be read ({}). Make the result explicit and complete.",
                e
            ));
        }
    };

    let success = match &parsed.success {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::String(s) => match s.trim().to_lowercase().as_str() {
            "yes" | "true" | "y" => Some(true),
            "no" | "false" | "n" => Some(false),
            _ => None,
        },
        _ => None,
    };

    match success {
        Some(success) => StepVerdict {
            success,
            feedback: parsed.feedback.filter(|f| !f.trim().is_empty()),
        },
        None => {
            warn!(success = %parsed.success, "Unknown success value from judge");
            StepVerdict::failed(format!(
                "The evaluation returned an unrecognised verdict ({}).",
                parsed.success
            ))
        }
    }
}

impl EvaluationOracle for LlmStepJudge {
    fn judge<'a>(&'a self, step: &'a str, result: &'a str) -> BoxFuture<'a, Result<StepVerdict>> {
        Box::pin(async move {
            let messages = vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(build_prompt(step, result)),
            ];
            let response = self.model.ask(messages).await?;
            let verdict = parse_verdict(&response);
            debug!(step, success = verdict.success, "Judge verdict");
            Ok(verdict)
        })
    }
}
