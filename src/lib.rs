//! Common subexpression embedding for the expression forests of dynamical-system models.
//!
//! This crate is the optimization core of a code generator. It takes one expression per
//! model state, finds subexpressions that repeat across the whole model and factors them
//! into reusable prototype functions ("embeddings"). Calls of the same embedding that
//! make up whole equations are batched into index tables so generated code can evaluate
//! them in a single loop.
//!
//! # Features
//!
//! - Canonical expression trees: commutative operands are sorted, data leaves share a
//!   placeholder label
//! - Two collectors: grouping by canonical serialization, and bottom-up DAG minimization
//!   of the whole forest
//! - Argument inference with merging of positions that always hold the same data
//! - Greedy conflict resolution between overlapping embeddings
//! - Deduplicated index tables for batched calls
//! - An [evalexpr](https://github.com/ISibboI/evalexpr) based front end for textual
//!   equations
//!
//! # Example
//!
//! ```rust
//! use forest_cse::prelude::*;
//!
//! // Two states computed by the same call with different data
//! let (_, equations) = parse_system(&["x = h(a, 0.5)", "y = h(b, 0.5)"]).unwrap();
//!
//! let generation = Generator::new(Options::default())
//!     .unwrap()
//!     .run(&equations)
//!     .unwrap();
//!
//! // One embedding with `a` / `b` as its only argument, batched into one loop
//! assert_eq!(generation.result().len(), 1);
//! assert_eq!(generation.loops().len(), 1);
//! ```

pub use generator::{Generation, Generator, Options};

pub mod prelude {
    pub use crate::collector::{Collector, CollectorResult, SizePolicy};
    pub use crate::convert::{flatten_expression, parse_system};
    pub use crate::embedding::Embedding;
    pub use crate::generator::{CollectorKind, Equation, FilterKind, Generation, Generator, Options};
    pub use crate::instruction::Instruction;
    pub use crate::tree::Forest;
    pub use crate::types::{NodeId, StateId};
}

/// Collector trait, size policy and collection result
pub mod collector;
/// Collector strategies
pub mod collectors {
    pub mod default;
    pub mod graph;
}
/// Conversion from textual expressions to instruction sequences
pub mod convert;
/// Prototype subexpressions, their instances and arguments
pub mod embedding;
/// Error types for the various failure modes
pub mod errors;
/// Conflict resolution between embeddings
pub mod filter;
/// Generation pipeline and its options
pub mod generator;
/// Instruction set of flattened expressions
pub mod instruction;
/// Canonical instruction labels and the per-run context
pub mod label;
/// Index loops over batched calls
pub mod loops;
/// Node positions relative to an ancestor
pub mod path;
/// Storage slot registry
pub mod table;
/// Expression trees and the forest arena
pub mod tree;
/// Ids and dimensions
pub mod types;
