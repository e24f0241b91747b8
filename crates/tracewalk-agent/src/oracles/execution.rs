use futures::future::BoxFuture;

use tracewalk_core::error::Result;
use tracewalk_core::traits::ExecutionOracle;
use tracewalk_core::types::ChatMessage;

use super::OracleModel;

const SYSTEM_PROMPT: &str = "You are an assistant executing sequential tasks.";

/// Execution oracle that has a model carry out one step at a time.
pub struct LlmExecutionOracle {
    model: OracleModel,
}

impl LlmExecutionOracle {
    pub fn new(model: OracleModel) -> Self {
        Self { model }
    }
}

fn build_prompt(instruction: &str, state: &str) -> String {
    format!("Current state:\n{}\n\nNext step:\n{}", state, instruction)
}

impl ExecutionOracle for LlmExecutionOracle {
    fn run<'a>(&'a self, instruction: &'a str, state: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let messages = vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(build_prompt(instruction, state)),
            ];
            let reply = self.model.ask(messages).await?;
            Ok(reply.trim().to_string())
        })
    }
}
