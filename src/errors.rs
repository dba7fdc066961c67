//! Error types for the forest-cse crate.
//!
//! The core distinguishes three kinds of failure:
//!
//! - structural contract violations (`TreeError`, `EmbeddingError`): malformed input or a
//!   caller bug; the generation run aborts immediately
//! - unsupported configuration (`ConfigError`): reported before any work is done
//! - storage bookkeeping misuse (`TableError`, `LoopError`) after a table or loop was frozen
//!
//! `ConvertError` covers the evalexpr front end and `GenerateError` wraps everything a
//! full [`Generator`](crate::generator::Generator) run can fail with.

use evalexpr::{DefaultNumericTypes, EvalexprError};
use thiserror::Error;

use crate::types::{EmbeddingId, NodeId, StateId};

/// Errors raised while building a tree from a postfix instruction sequence.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    /// An instruction needs more operands than the stack currently holds
    #[error("stack underflow in {state} at {position}: needs {needed}, has {available}")]
    StackUnderflow {
        state: StateId,
        position: usize,
        needed: usize,
        available: usize,
    },
    /// The sequence did not reduce to exactly one expression
    #[error("unbalanced instruction sequence for {state}: {remaining} values left")]
    Unbalanced { state: StateId, remaining: usize },
    /// Two equations were given for the same state
    #[error("state {state} has more than one equation")]
    DuplicateState { state: StateId },
}

/// Errors raised when instances are added to an embedding.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    /// The node was handed to `add` without being wrapped as an instance of this embedding
    #[error("node {node} is not an instance of embedding {embedding}")]
    NotAnInstance {
        embedding: EmbeddingId,
        node: NodeId,
    },
    /// The node is already claimed by another embedding
    #[error("node {node} is already embedded by {other}")]
    AlreadyEmbedded { node: NodeId, other: EmbeddingId },
}

/// Configuration errors, reported before any partial work is produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The selected filter strategy exists but is not implemented
    #[error("the {0} filter is not supported")]
    UnsupportedFilter(String),
    /// A strategy name that matches no known collector
    #[error("unknown collector: {0}")]
    UnknownCollector(String),
    /// A strategy name that matches no known filter
    #[error("unknown filter: {0}")]
    UnknownFilter(String),
}

/// Errors raised by the data table registry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    /// A new key was inserted after the table was locked
    #[error("data table {table} is locked, cannot insert {key}")]
    Locked { table: String, key: String },
}

/// Errors raised while filling or closing an index loop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoopError {
    /// Rows cannot be added once the loop has been closed
    #[error("loop over {0} is already closed")]
    Closed(EmbeddingId),
    /// An argument path did not resolve to a storable leaf in the occurrence
    #[error("argument {path} of {embedding} does not resolve to a data item in node {node}")]
    UnresolvedArgument {
        embedding: EmbeddingId,
        node: NodeId,
        path: String,
    },
    /// Storage registration failed
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Errors that can occur when flattening evalexpr expressions into instruction sequences.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Error when parsing the expression string with evalexpr
    #[error("Failed to build Evalexpr AST")]
    Parse(#[from] EvalexprError<DefaultNumericTypes>),
    /// Error when encountering an operator that has no instruction counterpart
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),
    /// Error when a constant value is not numeric
    #[error("Expected numeric constant: {0}")]
    ConstOperator(String),
    /// Error when the root node does not have exactly one child
    #[error("Expected single child for root node: {0}")]
    RootNode(String),
    /// Error when an equation is not of the form `state = expression`
    #[error("Malformed equation: {0}")]
    Equation(String),
    /// Error when two equations assign the same state
    #[error("Duplicate state: {0}")]
    DuplicateState(String),
}

/// Top-level errors of a generation run.
///
/// A run either completes or aborts as a whole with one of these.
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("Failed to build expression tree")]
    Tree(#[from] TreeError),
    #[error("Failed to embed instance")]
    Embedding(#[from] EmbeddingError),
    #[error("Invalid configuration")]
    Config(#[from] ConfigError),
    #[error("Failed to register data item")]
    Table(#[from] TableError),
    #[error("Failed to build index loop")]
    Loop(#[from] LoopError),
    #[error("Failed to convert expression")]
    Convert(#[from] ConvertError),
}
