//! # cryo-dflow
//!
//! Dataflow analysis over the cryo IR. An iterative fixpoint walks a
//! function's basic blocks and computes, for every term, an abstract value
//! (a per-bit tri-state integer), the memory location a memory access
//! resolves to, the set of definitions reaching each read, and use lists.

pub mod abstract_value;
pub mod analyzer;
pub mod context;
pub mod dataflow;
pub mod error;
pub mod hooks;
pub mod reaching;
pub mod value;

pub use abstract_value::{AbstractValue, SizedValue};
pub use analyzer::{AnalyzerOptions, DataflowAnalyzer};
pub use context::SimulationContext;
pub use dataflow::Dataflow;
pub use error::AnalysisError;
pub use hooks::ConventionHooks;
pub use reaching::ReachingDefinitions;
pub use value::{Product, StackOffset, Value};
