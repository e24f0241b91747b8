use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use tracewalk_core::error::{Result, TracewalkError};
use tracewalk_core::traits::DecisionOracle;
use tracewalk_core::types::{ChatMessage, Choice, Node, NodeId};

use super::{extract_json, OracleModel};

const SYSTEM_PROMPT: &str = "You navigate an action graph. At each step you pick exactly one \
of the offered next actions, the one that best moves toward completing the user's query.";

/// Decision oracle that asks a model to pick the next node.
pub struct LlmDecisionOracle {
    model: OracleModel,
}

impl LlmDecisionOracle {
    pub fn new(model: OracleModel) -> Self {
        Self { model }
    }
}

fn build_prompt(current: &Node, candidates: &[Node], query: &str) -> String {
    let options = candidates
        .iter()
        .map(|n| format!("- id {}: {}", n.id, n.text()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Query: {}

Current action (id {}): {}

Possible next actions:
{}

Respond with ONLY valid JSON:
{{"id": <id of the chosen next action>, "reason": "brief explanation"}}"#,
        query,
        current.id,
        current.text(),
        options,
    )
}

#[derive(Deserialize)]
struct ChoiceResponse {
    id: serde_json::Value,
    #[serde(default)]
    reason: Option<String>,
}

/// Read a node choice out of a model response.
///
/// Accepts the requested JSON object (with an integer or integer-string
/// `id`), optionally inside a code fence; a JSON reply whose `id` is not
/// an integer is refused. Free text that is not such an object but ends
/// in an integer ("I'd go with node 3.") is accepted as naming that id.
pub fn parse_choice(response: &str) -> Result<Choice> {
    if let Ok(parsed) = serde_json::from_str::<ChoiceResponse>(extract_json(response)) {
        let id = match &parsed.id {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        return match id {
            Some(id) => Ok(Choice {
                id: NodeId(id),
                reason: parsed.reason,
            }),
            None => Err(TracewalkError::parse(
                "decision",
                format!("id {} is not an integer node id", parsed.id),
            )),
        };
    }

    trailing_integer(response)
        .map(Choice::new)
        .ok_or_else(|| TracewalkError::parse("decision", format!("no node id in {:?}", response)))
}

fn trailing_integer(text: &str) -> Option<i64> {
    let body = text.trim_end_matches(|c: char| !c.is_ascii_digit());
    let digits_from = body.len() - body.chars().rev().take_while(char::is_ascii_digit).count();
    let digits = &body[digits_from..];
    if digits.is_empty() {
        return None;
    }
    let negative = body[..digits_from].ends_with('-');
    let value: i64 = digits.parse().ok()?;
    Some(if negative { -value } else { value })
}

impl DecisionOracle for LlmDecisionOracle {
    fn choose_next<'a>(
        &'a self,
        current: &'a Node,
        candidates: &'a [Node],
        query: &'a str,
    ) -> BoxFuture<'a, Result<Choice>> {
        Box::pin(async move {
            let messages = vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(build_prompt(current, candidates, query)),
            ];
            let response = self.model.ask(messages).await?;
            debug!(node_id = %current.id, response = %response, "Decision oracle replied");
            parse_choice(&response)
        })
    }
}
