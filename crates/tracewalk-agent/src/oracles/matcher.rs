use futures::future::BoxFuture;

use tracewalk_core::error::Result;
use tracewalk_core::traits::StepMatcher;
use tracewalk_core::types::{ChatMessage, StepMatch};

use super::OracleModel;

const SYSTEM_PROMPT: &str = "You are verifying whether two steps from different action traces \
describe the same action. Answer strictly in the requested format.";

/// Step matcher that asks a model whether two labels name the same action.
pub struct LlmStepMatcher {
    model: OracleModel,
}

impl LlmStepMatcher {
    pub fn new(model: OracleModel) -> Self {
        Self { model }
    }
}

fn build_prompt(first: &str, second: &str) -> String {
    format!(
        "You are trying to figure out whether two steps in two different action traces are the \
         same.\nThe first step is: {}\nThe second step is: {}\n\nRespond in exactly this \
         format:\n\nCorrectness: [True/False]\nReason: [Why the steps are or are not the same]",
        first, second
    )
}

/// Read `Correctness:`/`Reason:` lines; without a `Correctness:` line the
/// reply matches if it mentions "true" anywhere.
fn parse_match(response: &str) -> StepMatch {
    let field = |name: &str| {
        response.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    };

    let same = match field("correctness") {
        Some(value) => value.to_lowercase().contains("true"),
        None => response.to_lowercase().contains("true"),
    };

    StepMatch {
        same,
        reason: field("reason").unwrap_or_else(|| response.trim().to_string()),
    }
}

impl StepMatcher for LlmStepMatcher {
    fn same_step<'a>(&'a self, first: &'a str, second: &'a str) -> BoxFuture<'a, Result<StepMatch>> {
        Box::pin(async move {
            let messages = vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(build_prompt(first, second)),
            ];
            let response = self.model.ask(messages).await?;
            Ok(parse_match(&response))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use tracewalk_core::config::OracleKind;
    use tracewalk_test_utils::{model_config, ScriptedLlm};

    #[test]
    fn test_parse_structured_reply() {
        let reply = "Correctness: True\nReason: Both read the problem.";
        let m = parse_match(reply);
        assert!(m.same);
        assert_eq!(m.reason, "Both read the problem.");

        let m = parse_match("correctness: false\nreason: different quantities");
        assert!(!m.same);
        assert_eq!(m.reason, "different quantities");
    }

    #[test]
    fn test_parse_loose_reply() {
        let m = parse_match("That is true, they match.");
        assert!(m.same);
        assert_eq!(m.reason, "That is true, they match.");
        assert!(!parse_match("No.").same);
    }

    #[test]
    fn test_reason_mentioning_true_does_not_flip_verdict() {
        let m = parse_match("Correctness: False\nReason: it is true that both mention apples");
        assert!(!m.same);
    }

    #[tokio::test]
    async fn test_same_step_via_model() {
        let llm = ScriptedLlm::new(vec![Ok("Correctness: True\nReason: same".into())]);
        let calls = llm.calls();
        let matcher = LlmStepMatcher::new(OracleModel::new(
            Arc::new(llm),
            model_config(),
            OracleKind::Matcher,
        ));

        let m = matcher
            .same_step("Read the problem statement", "Read the problem")
            .await
            .unwrap();
        assert!(m.same);
        let prompt = &calls.lock().unwrap()[0][1].content;
        assert!(prompt.contains("The first step is: Read the problem statement"));
        assert!(prompt.contains("The second step is: Read the problem"));
    }
}
