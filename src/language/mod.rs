//! Pluggable expression languages for computed expressions and cuts.

pub mod sql;
mod vector;

pub use sql::SqlLanguage;

use crate::array::Array;
use crate::error::Result;
use crate::pipeline::ExpressionContext;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Names a language needs to resolve symbols against.
#[derive(Clone, Copy, Debug)]
pub struct Scope<'a> {
    /// Every branch name in the tree.
    pub keys: &'a BTreeSet<String>,
    pub aliases: &'a HashMap<String, String>,
    pub file_path: &'a str,
    pub object_path: &'a str,
}

pub trait Language: Send + Sync + fmt::Debug {
    /// Expression text that refers to `name` even when it is not an identifier.
    fn getter_of(&self, name: &str) -> String;

    /// Branch names and aliases referenced by `expression`, in first-use order.
    fn free_symbols(&self, expression: &str, scope: Scope<'_>) -> Result<Vec<String>>;

    /// Evaluates every context, in order, over `arrays` (keyed by branch cache
    /// key). When a cut context is present its mask is applied to the primary
    /// outputs. Constant expressions are broadcast to `num_entries`. Returns
    /// arrays keyed by expression.
    fn compute_expressions(
        &self,
        arrays: &HashMap<String, Array>,
        contexts: &[ExpressionContext],
        num_entries: usize,
        scope: Scope<'_>,
    ) -> Result<HashMap<String, Array>>;
}
