//! Folds grouped branches, evaluates expressions and shapes the output.

use super::resolver::ExpressionContext;
use crate::array::Array;
use crate::error::{ReadError, Result};
use crate::interpretation::{ArrayGroup, Columns, How, Interpretation, Library};
use crate::language::{Language, Scope};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

pub struct ResultAssembler<'a> {
    library: &'a dyn Library,
    language: &'a dyn Language,
}

impl<'a> ResultAssembler<'a> {
    pub fn new(library: &'a dyn Library, language: &'a dyn Language) -> Self {
        ResultAssembler { library, language }
    }

    /// Builds the record array of every grouped branch from its sub-branch
    /// arrays, in place in `arrays` (keyed by branch cache key).
    ///
    /// Contexts are visited in resolution order, so nested groups are built
    /// before the groups that contain them.
    pub fn fix_asgrouped(
        &self,
        arrays: &mut HashMap<String, Array>,
        contexts: &[ExpressionContext],
        interpretations: &HashMap<String, Arc<dyn Interpretation>>,
    ) -> Result<()> {
        for context in contexts {
            let Some(branch) = &context.branch else {
                continue;
            };
            let Some(grouped) = interpretations
                .get(branch.cache_key())
                .and_then(|interpretation| interpretation.as_grouped())
            else {
                continue;
            };
            // cached, or already built for an earlier context
            if arrays.contains_key(branch.cache_key()) {
                continue;
            }

            let mut fields = Vec::with_capacity(grouped.subbranches().len());
            for (name, _) in grouped.subbranches() {
                let child = branch.child(name).ok_or_else(|| {
                    ReadError::mismatch(format!("{} has no sub-branch {name}", branch.object_path()))
                })?;
                let array = arrays.get(child.cache_key()).ok_or_else(|| {
                    ReadError::mismatch(format!("sub-branch {} was not read", child.object_path()))
                })?;
                fields.push((field_name(branch.name(), name), array.clone()));
            }

            let record = match self.library.group(fields, How::Record)?.into_columns() {
                Columns::Record(record) => record,
                _ => return Err(ReadError::mismatch("library did not build a record")),
            };
            trace!(branch = %branch.object_path(), "grouped");
            arrays.insert(branch.cache_key().to_string(), record);
        }
        Ok(())
    }

    /// Evaluates every context and groups the requested outputs.
    pub fn assemble(
        &self,
        mut arrays: HashMap<String, Array>,
        contexts: &[ExpressionContext],
        interpretations: &HashMap<String, Arc<dyn Interpretation>>,
        num_entries: usize,
        scope: Scope<'_>,
        how: How,
    ) -> Result<ArrayGroup> {
        self.fix_asgrouped(&mut arrays, contexts, interpretations)?;
        let computed = self
            .language
            .compute_expressions(&arrays, contexts, num_entries, scope)?;

        let mut fields = Vec::new();
        for context in contexts.iter().filter(|c| c.is_primary && !c.is_cut) {
            let array = computed
                .get(&context.expression)
                .cloned()
                .ok_or_else(|| ReadError::expression(&context.expression, "was not computed"))?;
            fields.push((context.output_name().to_string(), array));
        }
        self.library.group(fields, how)
    }
}

/// `p4.x` under `p4` becomes the field `x`.
fn field_name(parent: &str, name: &str) -> String {
    name.strip_prefix(parent)
        .and_then(|rest| rest.strip_prefix('.').or_else(|| rest.strip_prefix('/')))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_drop_parent_prefix() {
        assert_eq!(field_name("p4", "p4.x"), "x");
        assert_eq!(field_name("p4", "p4/y"), "y");
        assert_eq!(field_name("p4", "px"), "px");
        assert_eq!(field_name("p4", "p4"), "p4");
    }
}
