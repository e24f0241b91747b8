//! Action graph: example action sequences folded into one directed graph
//! between a start and an end node, and an oracle-guided walk across it.
//!
//! `SequenceIngester` builds the graph once; `PathGenerator` only reads it,
//! so a finished graph can be shared by any number of walks.

pub mod action_graph;
pub mod ingest;
pub mod path;

pub use action_graph::ActionGraph;
pub use ingest::{initialize_graph, LabelIndex, SequenceIngester};
pub use path::{GeneratedPath, PathGenerator, PathOutcome, Rejection};
