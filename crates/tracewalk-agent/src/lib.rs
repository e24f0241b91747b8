mod deadline;

pub mod executor;
pub mod graph;
pub mod oracles;

pub use executor::{ExecutionReport, ExecutionState, StepExecutor, StepRecord, StepResults};
pub use graph::{
    initialize_graph, ActionGraph, GeneratedPath, PathGenerator, PathOutcome, Rejection,
    SequenceIngester,
};
pub use oracles::{LlmDecisionOracle, LlmExecutionOracle, LlmStepJudge, LlmStepMatcher, OracleModel};
