use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// Streaming chat-completion client.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}

/// Picks the next node during a path walk.
///
/// `candidates` are the neighbors of `current` in edge-insertion order,
/// repeated once per parallel edge. Implementations return a structured
/// choice; a response that cannot be turned into one should fail with
/// `OracleParse`.
pub trait DecisionOracle: Send + Sync + 'static {
    fn choose_next<'a>(
        &'a self,
        current: &'a Node,
        candidates: &'a [Node],
        query: &'a str,
    ) -> BoxFuture<'a, Result<Choice>>;
}

/// Produces a free-text result for one instruction given the accumulated state.
pub trait ExecutionOracle: Send + Sync + 'static {
    fn run<'a>(&'a self, instruction: &'a str, state: &'a str) -> BoxFuture<'a, Result<String>>;
}

/// Judges whether a step's result counts as success.
///
/// A "no" verdict is `Ok` with `success: false`; `Err` is reserved for
/// transport failures, which the executor never retries.
pub trait EvaluationOracle: Send + Sync + 'static {
    fn judge<'a>(&'a self, step: &'a str, result: &'a str) -> BoxFuture<'a, Result<StepVerdict>>;
}

/// Decides whether two step labels from different traces name the same action.
pub trait StepMatcher: Send + Sync + 'static {
    fn same_step<'a>(&'a self, first: &'a str, second: &'a str) -> BoxFuture<'a, Result<StepMatch>>;
}
