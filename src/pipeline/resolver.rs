//! Turns requested expressions into branch dependencies.

use crate::array::Array;
use crate::branch::{Branch, BranchIndex};
use crate::cache::BranchCache;
use crate::error::{ReadError, Result};
use crate::helpers::name_filter::NameFilter;
use crate::interpretation::Interpretation;
use crate::language::{Language, Scope};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// One requested or derived expression and the branches it needs.
#[derive(Clone, Debug)]
pub struct ExpressionContext {
    pub expression: String,
    /// Requested by the caller, as opposed to reached through an alias.
    pub is_primary: bool,
    pub is_cut: bool,
    pub is_jagged: bool,
    /// The branch this expression names directly, if any.
    pub branch: Option<Arc<Branch>>,
    /// Branches read to compute the expression, in resolution order.
    pub branches: Vec<Arc<Branch>>,
    pub rename: Option<String>,
}

impl ExpressionContext {
    pub fn is_branch(&self) -> bool {
        self.branch.is_some()
    }

    /// Name of the expression in the output.
    pub fn output_name(&self) -> &str {
        self.rename.as_deref().unwrap_or(&self.expression)
    }
}

/// A requested expression, optionally with an interpretation override and an
/// output name.
#[derive(Clone, Debug)]
pub struct ExpressionSpec {
    pub expression: String,
    pub interpretation: Option<Arc<dyn Interpretation>>,
    pub rename: Option<String>,
}

impl ExpressionSpec {
    pub fn new(expression: impl Into<String>) -> Self {
        ExpressionSpec {
            expression: expression.into(),
            interpretation: None,
            rename: None,
        }
    }

    pub fn interpretation(mut self, interpretation: Arc<dyn Interpretation>) -> Self {
        self.interpretation = Some(interpretation);
        self
    }

    pub fn rename(mut self, rename: impl Into<String>) -> Self {
        self.rename = Some(rename.into());
        self
    }
}

impl From<&str> for ExpressionSpec {
    fn from(expression: &str) -> Self {
        ExpressionSpec::new(expression)
    }
}

impl From<String> for ExpressionSpec {
    fn from(expression: String) -> Self {
        ExpressionSpec::new(expression)
    }
}

impl From<(&str, Arc<dyn Interpretation>)> for ExpressionSpec {
    fn from((expression, interpretation): (&str, Arc<dyn Interpretation>)) -> Self {
        ExpressionSpec::new(expression).interpretation(interpretation)
    }
}

/// What to read: every visible branch, or a list of expressions.
#[derive(Clone, Debug, Default)]
pub enum Expressions {
    #[default]
    All,
    Names(Vec<ExpressionSpec>),
}

impl<S: Into<ExpressionSpec>> FromIterator<S> for Expressions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Expressions::Names(iter.into_iter().map(Into::into).collect())
    }
}

/// Output of resolution: the ordered contexts plus the work left for the pipeline.
#[derive(Debug, Default)]
pub struct Resolution {
    pub contexts: Vec<ExpressionContext>,
    /// Branches still to read, deduplicated by cache key, in first-use order.
    pub to_read: Vec<(Arc<Branch>, Arc<dyn Interpretation>)>,
    /// Interpretation chosen for every branch seen, by branch cache key.
    pub interpretations: HashMap<String, Arc<dyn Interpretation>>,
    /// Arrays served from the cache, by branch cache key.
    pub arrays: HashMap<String, Array>,
}

impl Resolution {
    /// Every distinct branch the contexts depend on, grouped branches included.
    pub fn branches(&self) -> Vec<Arc<Branch>> {
        let mut out: Vec<Arc<Branch>> = Vec::new();
        for branch in self.contexts.iter().flat_map(|c| c.branches.iter()) {
            if !out.iter().any(|b| b.cache_key() == branch.cache_key()) {
                out.push(Arc::clone(branch));
            }
        }
        out
    }
}

pub struct ExpressionResolver<'a> {
    index: &'a BranchIndex,
    language: &'a dyn Language,
    scope: Scope<'a>,
    cache: Option<BranchCache<'a>>,
    resolution: Resolution,
}

impl<'a> ExpressionResolver<'a> {
    pub fn new(
        index: &'a BranchIndex,
        language: &'a dyn Language,
        scope: Scope<'a>,
        cache: Option<BranchCache<'a>>,
    ) -> Self {
        ExpressionResolver {
            index,
            language,
            scope,
            cache,
            resolution: Resolution::default(),
        }
    }

    /// Resolves every expression, then the cut. Fails before any I/O on
    /// unknown names, cyclic aliases or conflicting interpretations.
    pub fn resolve(
        mut self,
        expressions: &Expressions,
        cut: Option<&str>,
        filter_name: Option<&NameFilter>,
    ) -> Result<Resolution> {
        match expressions {
            Expressions::All => {
                for branch in self.index.recursive() {
                    let interpretation = branch.interpretation();
                    if interpretation.is_unknown() || interpretation.as_grouped().is_some() {
                        continue;
                    }
                    if filter_name.is_some_and(|filter| !filter.matches(branch.name())) {
                        continue;
                    }
                    let name = branch.name().to_string();
                    self.resolve_branch(&branch, &name, None, true, false, None)?;
                }
            }
            Expressions::Names(specs) => {
                for spec in specs {
                    self.resolve_expression(
                        &spec.expression,
                        spec.interpretation.clone(),
                        Vec::new(),
                        false,
                        spec.rename.clone(),
                    )?;
                }
            }
        }

        if let Some(cut) = cut {
            self.resolve_expression(cut, None, Vec::new(), true, None)?;
        }

        debug!(
            contexts = self.resolution.contexts.len(),
            to_read = self.resolution.to_read.len(),
            cache_hits = self.resolution.arrays.len(),
            "resolved expressions"
        );
        Ok(self.resolution)
    }

    /// `path` holds the aliases being expanded above this expression.
    fn resolve_expression(
        &mut self,
        expression: &str,
        interpretation: Option<Arc<dyn Interpretation>>,
        path: Vec<String>,
        is_cut: bool,
        rename: Option<String>,
    ) -> Result<(Vec<Arc<Branch>>, bool)> {
        let is_primary = path.is_empty();

        if let Some(branch) = self.index.get(expression).cloned() {
            return self.resolve_branch(&branch, expression, interpretation, is_primary, is_cut, rename);
        }
        if interpretation.is_some() {
            return Err(ReadError::expression(
                expression,
                "an interpretation can only be given for a branch",
            ));
        }

        let to_compute = self
            .scope
            .aliases
            .get(expression)
            .map_or(expression, String::as_str);
        let symbols = self.language.free_symbols(to_compute, self.scope)?;
        trace!(expression, ?symbols, "expanding");

        let mut here = path;
        here.push(expression.to_string());

        let mut branches: Vec<Arc<Branch>> = Vec::new();
        let mut is_jagged = false;
        for symbol in symbols {
            if here.contains(&symbol) {
                let mut chain = here.clone();
                chain.push(symbol.clone());
                return Err(ReadError::CyclicAlias {
                    symbol,
                    chain,
                    file_path: self.scope.file_path.to_string(),
                    object_path: self.scope.object_path.to_string(),
                });
            }
            let (child_branches, child_jagged) =
                self.resolve_expression(&symbol, None, here.clone(), false, None)?;
            is_jagged |= child_jagged;
            for branch in child_branches {
                if !branches.iter().any(|b| b.cache_key() == branch.cache_key()) {
                    branches.push(branch);
                }
            }
        }

        self.push_context(ExpressionContext {
            expression: expression.to_string(),
            is_primary,
            is_cut,
            is_jagged,
            branch: None,
            branches: branches.clone(),
            rename,
        });
        Ok((branches, is_jagged))
    }

    fn resolve_branch(
        &mut self,
        branch: &Arc<Branch>,
        expression: &str,
        interpretation: Option<Arc<dyn Interpretation>>,
        is_primary: bool,
        is_cut: bool,
        rename: Option<String>,
    ) -> Result<(Vec<Arc<Branch>>, bool)> {
        let interpretation = interpretation.unwrap_or_else(|| Arc::clone(branch.interpretation()));
        let key = branch.cache_key().to_string();

        if let Some(existing) = self.resolution.interpretations.get(&key) {
            if existing.cache_key() != interpretation.cache_key() {
                return Err(ReadError::ConflictingInterpretation {
                    branch: branch.object_path().to_string(),
                    first: existing.cache_key(),
                    second: interpretation.cache_key(),
                });
            }
        }
        let first_visit = !self.resolution.interpretations.contains_key(&key);
        self.resolution
            .interpretations
            .insert(key.clone(), Arc::clone(&interpretation));

        let cached = if first_visit {
            self.cache
                .as_ref()
                .and_then(|cache| cache.get(branch, interpretation.as_ref()))
        } else {
            None
        };
        if let Some(array) = cached {
            trace!(branch = %branch.object_path(), "served from cache");
            self.resolution.arrays.insert(key.clone(), array);
        }
        let is_cached = self.resolution.arrays.contains_key(&key);

        let mut branches = Vec::new();
        if let Some(grouped) = interpretation.as_grouped() {
            // a cached record needs none of its sub-branches
            if !is_cached {
                for (name, sub_interpretation) in grouped.subbranches() {
                    let child = branch.child(name).cloned().ok_or_else(|| ReadError::MissingName {
                        name: name.clone(),
                        suggestions: branch.branches().iter().map(|b| b.name().to_string()).collect(),
                        file_path: self.scope.file_path.to_string(),
                        object_path: branch.object_path().to_string(),
                    })?;
                    let (child_branches, _) = self.resolve_branch(
                        &child,
                        name,
                        Some(Arc::clone(sub_interpretation)),
                        false,
                        false,
                        None,
                    )?;
                    branches.extend(child_branches);
                }
            }
        } else if first_visit && !is_cached {
            self.resolution
                .to_read
                .push((Arc::clone(branch), Arc::clone(&interpretation)));
        }
        branches.push(Arc::clone(branch));

        let is_jagged = interpretation.is_jagged();
        self.push_context(ExpressionContext {
            expression: expression.to_string(),
            is_primary,
            is_cut,
            is_jagged,
            branch: Some(Arc::clone(branch)),
            branches: branches.clone(),
            rename,
        });
        Ok((branches, is_jagged))
    }

    /// Derived contexts are recorded once per expression; requested ones always.
    fn push_context(&mut self, context: ExpressionContext) {
        let derived = !context.is_primary && !context.is_cut;
        if derived
            && self
                .resolution
                .contexts
                .iter()
                .any(|c| c.expression == context.expression)
        {
            return;
        }
        self.resolution.contexts.push(context);
    }
}
