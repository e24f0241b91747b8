use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use tracewalk_core::config::ExecutorConfig;
use tracewalk_core::error::{Result, TracewalkError};
use tracewalk_core::traits::{EvaluationOracle, ExecutionOracle};
use tracewalk_core::types::RunId;

use crate::deadline;

const NO_FEEDBACK: &str = "No feedback provided.";

/// Append-only text carried from step to step.
///
/// Seeded with the initial state; each successful step appends one
/// `Step:`/`Result:` record. Failed attempts never touch it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionState {
    text: String,
}

impl ExecutionState {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            text: initial.into(),
        }
    }

    pub fn record(&mut self, step: &str, result: &str) {
        self.text.push_str(&format!("\n\nStep: {}\nResult: {}", step, result));
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// One successfully executed step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub step: String,
    pub result: String,
    /// Attempts it took, the successful one included.
    pub attempts: u32,
}

/// Successful results keyed by step label, in first-execution order.
///
/// Recording a label that is already present replaces its entry in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StepResults {
    records: Vec<StepRecord>,
}

impl StepResults {
    pub fn insert(&mut self, record: StepRecord) {
        match self.records.iter_mut().find(|r| r.step == record.step) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    pub fn get(&self, step: &str) -> Option<&str> {
        self.records
            .iter()
            .find(|r| r.step == step)
            .map(|r| r.result.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub run_id: RunId,
    pub results: StepResults,
    pub final_state: String,
}

/// Runs a trace step by step, retrying each step with the evaluator's
/// feedback until it is judged successful.
///
/// A "no" verdict is retried after a fixed pause, up to the configured
/// attempt limit. Oracle errors (transport failures, timeouts) abort the
/// run immediately and are never retried here.
pub struct StepExecutor {
    execution: Arc<dyn ExecutionOracle>,
    evaluation: Arc<dyn EvaluationOracle>,
    config: ExecutorConfig,
}

impl StepExecutor {
    pub fn new(
        execution: Arc<dyn ExecutionOracle>,
        evaluation: Arc<dyn EvaluationOracle>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            execution,
            evaluation,
            config,
        }
    }

    pub async fn execute(&self, steps: &[String], initial_state: &str) -> Result<ExecutionReport> {
        let run_id = RunId::new();
        let mut state = ExecutionState::new(initial_state);
        let mut results = StepResults::default();

        info!(run_id = %run_id, steps = steps.len(), "Starting step trace");

        for (index, step) in steps.iter().enumerate() {
            info!(run_id = %run_id, index, step = %step, "Executing step");
            let record = self.run_step(step, &state).await?;
            state.record(&record.step, &record.result);
            info!(run_id = %run_id, step = %step, attempts = record.attempts, "Step succeeded");
            results.insert(record);
        }

        info!(run_id = %run_id, completed = results.len(), "Step trace finished");
        Ok(ExecutionReport {
            run_id,
            results,
            final_state: state.into_string(),
        })
    }

    async fn run_step(&self, step: &str, state: &ExecutionState) -> Result<StepRecord> {
        let timeout = self.config.oracle_timeout();
        let mut feedback: Option<String> = None;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let input = instruction(step, feedback.as_deref());
            debug!(step, attempt = attempts, input = %input, "Sending step to execution oracle");

            let result = deadline::within(
                "execution",
                timeout,
                self.execution.run(&input, state.as_str()),
            )
            .await?;

            let verdict =
                deadline::within("evaluation", timeout, self.evaluation.judge(step, &result))
                    .await?;

            if verdict.success {
                return Ok(StepRecord {
                    step: step.to_string(),
                    result,
                    attempts,
                });
            }

            let reason = verdict.feedback.unwrap_or_else(|| NO_FEEDBACK.to_string());
            warn!(step, attempt = attempts, feedback = %reason, "Step judged unsuccessful");

            if self.config.attempt_limit().is_some_and(|limit| attempts >= limit) {
                return Err(TracewalkError::RetryExhausted {
                    step: step.to_string(),
                    attempts,
                    feedback: reason,
                });
            }

            feedback = Some(reason);
            tokio::time::sleep(self.config.retry_backoff()).await;
        }
    }
}

/// Text sent to the execution oracle; retries carry the last feedback.
fn instruction(step: &str, feedback: Option<&str>) -> String {
    match feedback {
        Some(feedback) => format!("{} (Retry with feedback: {})", step, feedback),
        None => step.to_string(),
    }
}
