//! Scripted collaborators and fixtures shared by the tracewalk test suites.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::stream::BoxStream;

use tracewalk_core::config::ModelConfig;
use tracewalk_core::error::{Result, TracewalkError};
use tracewalk_core::traits::*;
use tracewalk_core::types::*;

pub type CallLog<T> = Arc<Mutex<Vec<T>>>;

/// A minimal OpenAI-flavoured model config.
pub fn model_config() -> ModelConfig {
    ModelConfig {
        provider: "openai".into(),
        model_id: "test-model".into(),
        api_key: None,
        base_url: None,
        max_tokens: 256,
        temperature: 0.0,
        extra_headers: HashMap::new(),
        retry: None,
    }
}

/// Turn string-slice literals into owned action sequences.
pub fn sequences(raw: &[&[&str]]) -> Vec<Vec<String>> {
    raw.iter()
        .map(|seq| seq.iter().map(|s| s.to_string()).collect())
        .collect()
}

/// LLM client that replays scripted responses, one per request.
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<String>>>,
    calls: CallLog<Vec<ChatMessage>>,
}

impl ScriptedLlm {
    pub fn new(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Arc::default(),
        }
    }

    /// Every message list received, in request order.
    pub fn calls(&self) -> CallLog<Vec<ChatMessage>> {
        Arc::clone(&self.calls)
    }
}

impl LlmClient for ScriptedLlm {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        self.calls.lock().unwrap().push(messages);
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TracewalkError::LlmRequest("script exhausted".into())));

        Box::pin(async move {
            let text = next?;
            // Split in two so consumers must concatenate deltas.
            let mid = text.char_indices().nth(text.chars().count() / 2).map_or(0, |(i, _)| i);
            let deltas = vec![
                Ok(StreamDelta::TextDelta(text[..mid].to_string())),
                Ok(StreamDelta::TextDelta(text[mid..].to_string())),
                Ok(StreamDelta::Stop(StopReason::EndTurn)),
            ];
            Ok(Box::pin(futures::stream::iter(deltas)) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}

/// A decision recorded by [`ScriptedDecisions`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionCall {
    pub current: NodeId,
    pub candidates: Vec<NodeId>,
    pub query: String,
}

/// Decision oracle that answers from a fixed script.
pub struct ScriptedDecisions {
    answers: Mutex<VecDeque<Result<Choice>>>,
    calls: CallLog<DecisionCall>,
}

impl ScriptedDecisions {
    pub fn new(answers: Vec<Result<Choice>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            calls: Arc::default(),
        }
    }

    /// Convenience: answer with these ids in order.
    pub fn ids(ids: &[i64]) -> Self {
        Self::new(ids.iter().map(|id| Ok(Choice::new(*id))).collect())
    }

    pub fn calls(&self) -> CallLog<DecisionCall> {
        Arc::clone(&self.calls)
    }
}

impl DecisionOracle for ScriptedDecisions {
    fn choose_next<'a>(
        &'a self,
        current: &'a Node,
        candidates: &'a [Node],
        query: &'a str,
    ) -> BoxFuture<'a, Result<Choice>> {
        self.calls.lock().unwrap().push(DecisionCall {
            current: current.id,
            candidates: candidates.iter().map(|n| n.id).collect(),
            query: query.to_string(),
        });
        let answer = self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TracewalkError::parse("decision", "script exhausted")));
        Box::pin(async move { answer })
    }
}

/// Decision oracle that always takes the candidate at a fixed position
/// (clamped to the last one).
pub struct PickNth(pub usize);

impl DecisionOracle for PickNth {
    fn choose_next<'a>(
        &'a self,
        _current: &'a Node,
        candidates: &'a [Node],
        _query: &'a str,
    ) -> BoxFuture<'a, Result<Choice>> {
        let pick = candidates
            .get(self.0.min(candidates.len().saturating_sub(1)))
            .map(|n| Choice::new(n.id))
            .ok_or_else(|| TracewalkError::parse("decision", "no candidates"));
        Box::pin(async move { pick })
    }
}

/// An execution call recorded by [`EchoExecution`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionCall {
    pub instruction: String,
    pub state: String,
}

/// Execution oracle that answers `done: <instruction>`, numbering repeats
/// so each attempt's result is distinguishable.
#[derive(Default)]
pub struct EchoExecution {
    calls: CallLog<ExecutionCall>,
}

impl EchoExecution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> CallLog<ExecutionCall> {
        Arc::clone(&self.calls)
    }
}

impl ExecutionOracle for EchoExecution {
    fn run<'a>(&'a self, instruction: &'a str, state: &'a str) -> BoxFuture<'a, Result<String>> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(ExecutionCall {
            instruction: instruction.to_string(),
            state: state.to_string(),
        });
        let result = format!("done: {} (call {})", instruction, calls.len());
        Box::pin(async move { Ok(result) })
    }
}

/// Evaluation oracle with per-step scripted verdicts. Steps without a
/// remaining script entry pass.
#[derive(Default)]
pub struct ScriptedJudge {
    verdicts: Mutex<HashMap<String, VecDeque<StepVerdict>>>,
    calls: CallLog<(String, String)>,
}

impl ScriptedJudge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue verdicts for one step, consumed attempt by attempt.
    pub fn script(self, step: &str, verdicts: Vec<StepVerdict>) -> Self {
        self.verdicts
            .lock()
            .unwrap()
            .insert(step.to_string(), verdicts.into());
        self
    }

    /// Every `(step, result)` judged, in call order.
    pub fn calls(&self) -> CallLog<(String, String)> {
        Arc::clone(&self.calls)
    }
}

impl EvaluationOracle for ScriptedJudge {
    fn judge<'a>(&'a self, step: &'a str, result: &'a str) -> BoxFuture<'a, Result<StepVerdict>> {
        self.calls
            .lock()
            .unwrap()
            .push((step.to_string(), result.to_string()));
        let verdict = self
            .verdicts
            .lock()
            .unwrap()
            .get_mut(step)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(StepVerdict::passed);
        Box::pin(async move { Ok(verdict) })
    }
}

/// Collaborator whose every call fails at the transport level.
pub struct Unreachable;

fn unreachable_error(oracle: &str) -> TracewalkError {
    TracewalkError::unavailable(oracle, "connection refused")
}

impl DecisionOracle for Unreachable {
    fn choose_next<'a>(&'a self, _: &'a Node, _: &'a [Node], _: &'a str) -> BoxFuture<'a, Result<Choice>> {
        Box::pin(async { Err(unreachable_error("decision")) })
    }
}

impl ExecutionOracle for Unreachable {
    fn run<'a>(&'a self, _: &'a str, _: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async { Err(unreachable_error("execution")) })
    }
}

impl EvaluationOracle for Unreachable {
    fn judge<'a>(&'a self, _: &'a str, _: &'a str) -> BoxFuture<'a, Result<StepVerdict>> {
        Box::pin(async { Err(unreachable_error("evaluation")) })
    }
}

/// Collaborator that never answers.
pub struct Silent;

impl ExecutionOracle for Silent {
    fn run<'a>(&'a self, _: &'a str, _: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(futures::future::pending())
    }
}

impl DecisionOracle for Silent {
    fn choose_next<'a>(&'a self, _: &'a Node, _: &'a [Node], _: &'a str) -> BoxFuture<'a, Result<Choice>> {
        Box::pin(futures::future::pending())
    }
}
