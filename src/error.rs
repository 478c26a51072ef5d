//! Error types for tree reading and array materialization.

use sqlparser::parser::ParserError;
use std::any::Any;
use std::io;
use thiserror::Error;

/// Every failure a materialization call can report.
///
/// All variants are `Send`, so worker tasks hand them to the consumer
/// thread through the completion channel without losing any detail.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(
        "symbol {symbol:?} is recursively defined with aliases ({}) in file {file_path} at {object_path}",
        .chain.join(" -> ")
    )]
    CyclicAlias {
        symbol: String,
        chain: Vec<String>,
        file_path: String,
        object_path: String,
    },

    #[error("a branch cannot be loaded with multiple interpretations: {branch:?} as {first} and {second}")]
    ConflictingInterpretation {
        branch: String,
        first: String,
        second: String,
    },

    #[error(
        "basket {basket_num} in branch {branch} has the wrong number of entries \
         (expected {expected}, obtained {actual}) when interpreted as {interpretation} in file {file_path}"
    )]
    EntryCountMismatch {
        basket_num: usize,
        branch: String,
        expected: u64,
        actual: u64,
        interpretation: String,
        file_path: String,
    },

    #[error(
        "{name:?} not found in {object_path} of file {file_path}; closest names: [{}]",
        .suggestions.join(", ")
    )]
    MissingName {
        name: String,
        suggestions: Vec<String>,
        file_path: String,
        object_path: String,
    },

    #[error(
        "entries in normal baskets ({normal}) plus embedded baskets ({embedded}) of branch {branch} \
         don't add up to expected number of entries ({expected}) in file {file_path}"
    )]
    InvalidEntryOffsets {
        branch: String,
        normal: u64,
        embedded: u64,
        expected: u64,
        file_path: String,
    },

    #[error("branch {branch} has {num_baskets} baskets; cannot access basket {basket_num}")]
    BasketOutOfRange {
        branch: String,
        basket_num: usize,
        num_baskets: usize,
    },

    #[error("failed to decompress basket {basket_num} of branch {branch}: {reason}")]
    Decompression {
        branch: String,
        basket_num: usize,
        reason: String,
    },

    #[error("malformed basket {basket_num} of branch {branch}: {reason}")]
    MalformedBasket {
        branch: String,
        basket_num: usize,
        reason: String,
    },

    #[error("failed to deserialize {context}: {source}")]
    Deserialization {
        context: String,
        #[source]
        source: bincode::Error,
    },

    #[error("failed to parse expression {expression:?}: {source}")]
    Parse {
        expression: String,
        #[source]
        source: ParserError,
    },

    #[error("cannot evaluate expression {expression:?}: {reason}")]
    Expression { expression: String, reason: String },

    #[error("invalid name filter {pattern:?}: {source}")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("number of entries or memory size string with units (such as '100 MB') required, not {value:?}")]
    InvalidStepSize { value: String },

    #[error("{interpretation} does not support {operation}")]
    UnsupportedInterpretation {
        interpretation: String,
        operation: &'static str,
    },

    #[error("arrays cannot be combined: {reason}")]
    ArrayMismatch { reason: String },

    #[error("{stage} task panicked: {message}")]
    TaskPanicked { stage: &'static str, message: String },

    #[error("completion channel closed before all branches were assembled")]
    PipelineDisconnected,
}

impl ReadError {
    pub fn expression(expression: impl Into<String>, reason: impl Into<String>) -> ReadError {
        ReadError::Expression {
            expression: expression.into(),
            reason: reason.into(),
        }
    }

    pub fn mismatch(reason: impl Into<String>) -> ReadError {
        ReadError::ArrayMismatch {
            reason: reason.into(),
        }
    }

    /// Turns the payload of a caught panic into a reportable error.
    pub(crate) fn from_panic(stage: &'static str, panic: Box<dyn Any + Send>) -> ReadError {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        ReadError::TaskPanicked { stage, message }
    }
}

pub type Result<T> = std::result::Result<T, ReadError>;
