//! A tree handle: the entry point for materializing branches and expressions.

use crate::array::Array;
use crate::basket::Basket;
use crate::branch::{Branch, BranchIndex, BranchMeta};
use crate::cache::{ArrayCache, BranchCache};
use crate::config::{ArraysRequest, CacheChoice, ReaderOptions};
use crate::entry_range::{entries_to_ranges_or_baskets, regularize_entries_start_stop, RangeOrBasket};
use crate::error::{ReadError, Result};
use crate::helpers::edit_distance::closest_names;
use crate::helpers::name_filter::NameFilter;
use crate::interpretation::{ArrayGroup, Columns, How, Library};
use crate::language::{Language, Scope};
use crate::pipeline::{
    memory_size, num_entries_for, regularize_step_size, BranchRequest, ChunkPipeline,
    ExpressionResolver, Resolution, ResultAssembler, StepSize,
};
use crate::pool::Executor;
use crate::source::Source;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// Tree metadata as handed over by the container parser.
#[derive(Clone, Debug, Default)]
pub struct TreeMeta {
    pub object_path: String,
    pub num_entries: u64,
    pub branches: Vec<BranchMeta>,
    pub aliases: HashMap<String, String>,
}

/// Where one iteration step sits in its tree and in the global entry space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    file_path: String,
    object_path: String,
    tree_entry_start: u64,
    tree_entry_stop: u64,
    global_offset: u64,
}

impl Report {
    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn object_path(&self) -> &str {
        &self.object_path
    }

    pub fn tree_entry_start(&self) -> u64 {
        self.tree_entry_start
    }

    pub fn tree_entry_stop(&self) -> u64 {
        self.tree_entry_stop
    }

    /// Entries of all trees before this one.
    pub fn global_offset(&self) -> u64 {
        self.global_offset
    }

    pub fn global_entry_start(&self) -> u64 {
        self.global_offset + self.tree_entry_start
    }

    pub fn global_entry_stop(&self) -> u64 {
        self.global_offset + self.tree_entry_stop
    }

    pub fn num_entries(&self) -> u64 {
        self.tree_entry_stop - self.tree_entry_start
    }

    pub fn to_global(&self, global_offset: u64) -> Report {
        Report {
            global_offset,
            ..self.clone()
        }
    }
}

/// Per-call settings after the request has been merged with the tree defaults.
struct CallSettings {
    entry_start: u64,
    entry_stop: u64,
    aliases: HashMap<String, String>,
    filter: Option<NameFilter>,
    cache: Option<Arc<dyn ArrayCache>>,
    decompression: Arc<dyn Executor>,
    interpretation: Arc<dyn Executor>,
    how: How,
}

#[derive(Debug)]
pub struct Tree {
    object_path: String,
    num_entries: u64,
    cache_key: String,
    index: BranchIndex,
    aliases: HashMap<String, String>,
    source: Arc<dyn Source>,
    decompression: Arc<dyn Executor>,
    interpretation: Arc<dyn Executor>,
    array_cache: Option<Arc<dyn ArrayCache>>,
    step_size: StepSize,
    how: How,
    library: Arc<dyn Library>,
    language: Arc<dyn Language>,
}

impl Tree {
    /// Builds the branch index, validating every branch's basket layout.
    pub fn open(meta: TreeMeta, source: Arc<dyn Source>, options: &ReaderOptions) -> Result<Tree> {
        let cache_key = generate_tree_key();
        let file_path = source.file_path().to_string();
        let top = meta
            .branches
            .into_iter()
            .map(|branch| Branch::from_meta(branch, &cache_key, &meta.object_path, &file_path))
            .collect::<Result<Vec<_>>>()?;
        let index = BranchIndex::new(top);
        debug!(
            object_path = %meta.object_path,
            file_path = %file_path,
            num_entries = meta.num_entries,
            branches = index.keys().len(),
            "opened tree"
        );

        Ok(Tree {
            object_path: meta.object_path,
            num_entries: meta.num_entries,
            cache_key,
            index,
            aliases: meta.aliases,
            source,
            decompression: options.decompression_executor(),
            interpretation: options.interpretation_executor(),
            array_cache: options.build_cache()?,
            step_size: options.step_size.clone(),
            how: options.how,
            library: Arc::clone(&options.library),
            language: Arc::clone(&options.language),
        })
    }

    pub fn object_path(&self) -> &str {
        &self.object_path
    }

    pub fn file_path(&self) -> &str {
        self.source.file_path()
    }

    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Unique per opened tree; prefixes every branch cache key.
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn aliases(&self) -> &HashMap<String, String> {
        &self.aliases
    }

    pub fn array_cache(&self) -> Option<&Arc<dyn ArrayCache>> {
        self.array_cache.as_ref()
    }

    pub fn library(&self) -> &Arc<dyn Library> {
        &self.library
    }

    /// Top-level branches.
    pub fn branches(&self) -> &[Arc<Branch>] {
        self.index.top()
    }

    /// Names of all branches, nested ones included, depth first.
    pub fn keys(&self) -> Vec<String> {
        self.index
            .recursive()
            .iter()
            .map(|branch| branch.name().to_string())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Branch>> {
        self.index.get(name)
    }

    /// Like [`Tree::get`], but an unknown name lists the closest ones.
    pub fn branch(&self, name: &str) -> Result<&Arc<Branch>> {
        self.index.get(name).ok_or_else(|| ReadError::MissingName {
            name: name.to_string(),
            suggestions: closest_names(name, self.index.keys().iter().map(String::as_str), 10),
            file_path: self.file_path().to_string(),
            object_path: self.object_path.clone(),
        })
    }

    /// Materializes the requested expressions over the request's entry window.
    pub fn arrays(&self, request: &ArraysRequest) -> Result<ArrayGroup> {
        let settings = self.settings(request)?;
        let scope = self.scope(&settings.aliases);
        let branch_cache = settings.cache.as_deref().map(|cache| BranchCache {
            cache,
            tree: &self.cache_key,
            entry_start: settings.entry_start,
            entry_stop: settings.entry_stop,
            library: self.library.name(),
        });

        let resolution = ExpressionResolver::new(
            &self.index,
            self.language.as_ref(),
            scope,
            branch_cache,
        )
        .resolve(
            &request.expressions,
            request.cut.as_deref(),
            settings.filter.as_ref(),
        )?;

        let Resolution {
            contexts,
            to_read,
            interpretations,
            arrays: hits,
        } = resolution;
        let requests = to_read
            .iter()
            .map(|(branch, interpretation)| {
                Ok(BranchRequest {
                    branch: Arc::clone(branch),
                    interpretation: Arc::clone(interpretation),
                    selectors: entries_to_ranges_or_baskets(
                        branch,
                        settings.entry_start,
                        settings.entry_stop,
                    )?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let pipeline = ChunkPipeline::new(
            self.source.as_ref(),
            Arc::clone(&settings.decompression),
            Arc::clone(&settings.interpretation),
        );
        let output = pipeline.run(requests, settings.entry_start, settings.entry_stop, None)?;

        let hit_keys: HashSet<String> = hits.keys().cloned().collect();
        let mut arrays = hits;
        arrays.extend(output.arrays);

        let assembler = ResultAssembler::new(self.library.as_ref(), self.language.as_ref());
        assembler.fix_asgrouped(&mut arrays, &contexts, &interpretations)?;

        if let Some(cache) = branch_cache {
            // only what the caller asked for, and only once everything succeeded
            for context in contexts.iter().filter(|c| c.is_primary && !c.is_cut) {
                let Some(branch) = &context.branch else {
                    continue;
                };
                let key = branch.cache_key();
                if hit_keys.contains(key) {
                    continue;
                }
                if let (Some(interpretation), Some(array)) = (interpretations.get(key), arrays.get(key)) {
                    trace!(branch = %branch.object_path(), "caching");
                    cache.set(branch, interpretation.as_ref(), array.clone());
                }
            }
        }

        let num_entries = (settings.entry_stop - settings.entry_start) as usize;
        let group = assembler.assemble(
            arrays,
            &contexts,
            &interpretations,
            num_entries,
            scope,
            settings.how,
        )?;
        Ok(group.starting_at(settings.entry_start))
    }

    /// One branch, or one expression, as a single array.
    pub fn branch_array(
        &self,
        expression: &str,
        entry_start: Option<i64>,
        entry_stop: Option<i64>,
    ) -> Result<Array> {
        let mut request = ArraysRequest::new().expression(expression).how(How::Tuple);
        request.entry_start = entry_start;
        request.entry_stop = entry_stop;
        match self.arrays(&request)?.into_columns() {
            Columns::Tuple(mut arrays) if arrays.len() == 1 => Ok(arrays.remove(0)),
            _ => Err(ReadError::mismatch(format!("{expression} did not yield one array"))),
        }
    }

    /// Streams the request's entry window in steps of `step_size` entries,
    /// or of roughly `step_size` compressed bytes.
    pub fn iterate(
        &self,
        request: &ArraysRequest,
        step_size: impl Into<StepSize>,
    ) -> Result<TreeIterator<'_>> {
        let settings = self.settings(request)?;
        let resolution = ExpressionResolver::new(
            &self.index,
            self.language.as_ref(),
            self.scope(&settings.aliases),
            None,
        )
        .resolve(
            &request.expressions,
            request.cut.as_deref(),
            settings.filter.as_ref(),
        )?;

        let branches: Vec<Arc<Branch>> = resolution
            .to_read
            .iter()
            .map(|(branch, _)| Arc::clone(branch))
            .collect();
        let step = regularize_step_size(
            &step_size.into(),
            &branches,
            settings.entry_start,
            settings.entry_stop,
        )?;
        debug!(
            step,
            entry_start = settings.entry_start,
            entry_stop = settings.entry_stop,
            "iterating"
        );

        Ok(TreeIterator {
            tree: self,
            next_start: settings.entry_start,
            settings,
            resolution,
            step,
            retained: HashMap::new(),
            global_offset: 0,
            finished: false,
        })
    }

    /// Iterates with the step size the tree was opened with.
    pub fn iterate_default(&self, request: &ArraysRequest) -> Result<TreeIterator<'_>> {
        self.iterate(request, self.step_size.clone())
    }

    /// Entries per step for a memory budget such as `"10 MB"`, over the
    /// branches the request would read.
    pub fn num_entries_for(&self, memory: &str, request: &ArraysRequest) -> Result<u64> {
        let target = memory_size(memory)?;
        let (entry_start, entry_stop, resolution) = self.resolve_uncached(request)?;
        let branches: Vec<Arc<Branch>> = resolution
            .to_read
            .iter()
            .map(|(branch, _)| Arc::clone(branch))
            .collect();
        num_entries_for(target, &branches, entry_start, entry_stop)
    }

    /// Basket boundaries shared by every branch the request would read.
    pub fn common_entry_offsets(&self, request: &ArraysRequest) -> Result<Vec<u64>> {
        let (_, _, resolution) = self.resolve_uncached(request)?;
        let mut common: Option<BTreeSet<u64>> = None;
        for (branch, _) in &resolution.to_read {
            let offsets: BTreeSet<u64> = branch.entry_offsets().iter().copied().collect();
            common = Some(match common {
                None => offsets,
                Some(previous) => previous.intersection(&offsets).copied().collect(),
            });
        }
        Ok(common.map(|set| set.into_iter().collect()).unwrap_or_default())
    }

    fn resolve_uncached(&self, request: &ArraysRequest) -> Result<(u64, u64, Resolution)> {
        let settings = self.settings(request)?;
        let resolution = ExpressionResolver::new(
            &self.index,
            self.language.as_ref(),
            self.scope(&settings.aliases),
            None,
        )
        .resolve(
            &request.expressions,
            request.cut.as_deref(),
            settings.filter.as_ref(),
        )?;
        Ok((settings.entry_start, settings.entry_stop, resolution))
    }

    fn settings(&self, request: &ArraysRequest) -> Result<CallSettings> {
        let (entry_start, entry_stop) =
            regularize_entries_start_stop(self.num_entries, request.entry_start, request.entry_stop);

        let mut aliases = self.aliases.clone();
        aliases.extend(request.aliases.clone());

        let filter = request
            .filter_name
            .as_deref()
            .map(NameFilter::new)
            .transpose()?;

        let cache = match &request.array_cache {
            CacheChoice::Inherit => self.array_cache.clone(),
            CacheChoice::Disabled => None,
            CacheChoice::Use(cache) => Some(Arc::clone(cache)),
        };

        Ok(CallSettings {
            entry_start,
            entry_stop,
            aliases,
            filter,
            cache,
            decompression: request
                .decompression_executor
                .clone()
                .unwrap_or_else(|| Arc::clone(&self.decompression)),
            interpretation: request
                .interpretation_executor
                .clone()
                .unwrap_or_else(|| Arc::clone(&self.interpretation)),
            how: request.how.unwrap_or(self.how),
        })
    }

    fn scope<'a>(&'a self, aliases: &'a HashMap<String, String>) -> Scope<'a> {
        Scope {
            keys: self.index.keys(),
            aliases,
            file_path: self.source.file_path(),
            object_path: &self.object_path,
        }
    }
}

/// Steps of one tree's entry window. Baskets that straddle a step boundary
/// are decoded once and handed to the next step.
pub struct TreeIterator<'t> {
    tree: &'t Tree,
    settings: CallSettings,
    resolution: Resolution,
    step: u64,
    next_start: u64,
    retained: HashMap<(String, usize), Arc<Basket>>,
    global_offset: u64,
    finished: bool,
}

impl<'t> TreeIterator<'t> {
    pub(crate) fn with_global_offset(mut self, global_offset: u64) -> Self {
        self.global_offset = global_offset;
        self
    }

    /// Entries per step.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Baskets currently carried over to the next step.
    pub fn num_retained(&self) -> usize {
        self.retained.len()
    }

    fn next_step(&mut self, sub_start: u64, sub_stop: u64) -> Result<(ArrayGroup, Report)> {
        let tree = self.tree;
        let mut requests = Vec::with_capacity(self.resolution.to_read.len());
        for (branch, interpretation) in &self.resolution.to_read {
            let selectors = entries_to_ranges_or_baskets(branch, sub_start, sub_stop)?
                .into_iter()
                .map(|(basket_num, selector)| {
                    let key = (branch.cache_key().to_string(), basket_num);
                    match self.retained.get(&key) {
                        Some(basket) => (basket_num, RangeOrBasket::Basket(Arc::clone(basket))),
                        None => (basket_num, selector),
                    }
                })
                .collect();
            requests.push(BranchRequest {
                branch: Arc::clone(branch),
                interpretation: Arc::clone(interpretation),
                selectors,
            });
        }

        let pipeline = ChunkPipeline::new(
            tree.source.as_ref(),
            Arc::clone(&self.settings.decompression),
            Arc::clone(&self.settings.interpretation),
        );
        let output = pipeline.run(requests, sub_start, sub_stop, Some(sub_stop))?;

        self.retained = output
            .baskets
            .into_iter()
            .map(|basket| ((basket.branch().to_string(), basket.basket_num()), basket))
            .collect();

        let assembler = ResultAssembler::new(tree.library.as_ref(), tree.language.as_ref());
        let group = assembler.assemble(
            output.arrays,
            &self.resolution.contexts,
            &self.resolution.interpretations,
            (sub_stop - sub_start) as usize,
            tree.scope(&self.settings.aliases),
            self.settings.how,
        )?;
        let group = tree
            .library
            .global_index(group.starting_at(sub_start), self.global_offset);

        let report = Report {
            file_path: tree.file_path().to_string(),
            object_path: tree.object_path.clone(),
            tree_entry_start: sub_start,
            tree_entry_stop: sub_stop,
            global_offset: self.global_offset,
        };
        trace!(
            entry_start = sub_start,
            entry_stop = sub_stop,
            retained = self.retained.len(),
            "step"
        );
        Ok((group, report))
    }
}

impl Iterator for TreeIterator<'_> {
    type Item = Result<(ArrayGroup, Report)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.next_start >= self.settings.entry_stop {
            return None;
        }
        let sub_start = self.next_start;
        let sub_stop = sub_start.saturating_add(self.step).min(self.settings.entry_stop);
        self.next_start = sub_stop;

        let result = self.next_step(sub_start, sub_stop);
        if result.is_err() {
            self.finished = true;
            self.retained.clear();
        }
        Some(result)
    }
}

fn generate_tree_key() -> String {
    let mut rng = rand::thread_rng();
    (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_global_bounds_follow_offset() {
        let report = Report {
            file_path: "a.tree".to_string(),
            object_path: "/events".to_string(),
            tree_entry_start: 10,
            tree_entry_stop: 25,
            global_offset: 0,
        };
        assert_eq!(report.global_entry_start(), 10);
        let shifted = report.to_global(100);
        assert_eq!(shifted.global_entry_start(), 110);
        assert_eq!(shifted.global_entry_stop(), 125);
        assert_eq!(shifted.num_entries(), 15);
        assert_eq!(shifted.tree_entry_start(), 10);
    }

    #[test]
    fn tree_keys_are_unique() {
        assert_ne!(generate_tree_key(), generate_tree_key());
        assert_eq!(generate_tree_key().len(), 16);
    }
}
