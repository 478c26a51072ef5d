use crate::cache::{ArrayCache, LruArrayCache};
use crate::error::Result;
use crate::interpretation::{ArrayLibrary, How, Library};
use crate::language::{Language, SqlLanguage};
use crate::pipeline::{memory_size, ExpressionSpec, Expressions, StepSize};
use crate::pool::{Executor, ThreadPool, TrivialExecutor};
use std::collections::HashMap;
use std::sync::Arc;

/// Array cache attached to a tree when it is opened.
#[derive(Clone, Debug)]
pub enum CacheSetting {
    Disabled,
    /// An LRU cache bounded to this many bytes.
    Limit(u64),
    /// An LRU cache bounded by a size such as `"100 MB"`.
    MemorySize(String),
    /// A caller-owned cache, possibly shared between trees.
    Shared(Arc<dyn ArrayCache>),
}

impl Default for CacheSetting {
    fn default() -> Self {
        CacheSetting::MemorySize("100 MB".to_string())
    }
}

/// Per-call cache choice.
#[derive(Clone, Debug, Default)]
pub enum CacheChoice {
    /// Use the tree's cache.
    #[default]
    Inherit,
    Disabled,
    Use(Arc<dyn ArrayCache>),
}

/// Options fixed when a tree is opened.
#[derive(Clone, Debug)]
pub struct ReaderOptions {
    pub(crate) decompression_workers: usize,
    pub(crate) interpretation_workers: usize,
    pub(crate) array_cache: CacheSetting,
    pub(crate) step_size: StepSize,
    pub(crate) how: How,
    pub(crate) library: Arc<dyn Library>,
    pub(crate) language: Arc<dyn Language>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions::new()
    }
}

impl ReaderOptions {
    pub fn new() -> Self {
        ReaderOptions {
            decompression_workers: 0,
            interpretation_workers: 0,
            array_cache: CacheSetting::default(),
            step_size: StepSize::default(),
            how: How::default(),
            library: Arc::new(ArrayLibrary),
            language: Arc::new(SqlLanguage::new()),
        }
    }

    /// Worker threads for decompression. Zero runs tasks on the calling thread.
    pub fn decompression_workers(mut self, workers: usize) -> Self {
        self.decompression_workers = workers;
        self
    }

    /// Worker threads for interpretation. Zero runs tasks on the calling thread.
    pub fn interpretation_workers(mut self, workers: usize) -> Self {
        self.interpretation_workers = workers;
        self
    }

    pub fn array_cache(mut self, setting: CacheSetting) -> Self {
        self.array_cache = setting;
        self
    }

    pub fn step_size(mut self, step_size: impl Into<StepSize>) -> Self {
        self.step_size = step_size.into();
        self
    }

    pub fn how(mut self, how: How) -> Self {
        self.how = how;
        self
    }

    pub fn library(mut self, library: Arc<dyn Library>) -> Self {
        self.library = library;
        self
    }

    pub fn language(mut self, language: Arc<dyn Language>) -> Self {
        self.language = language;
        self
    }

    pub(crate) fn build_cache(&self) -> Result<Option<Arc<dyn ArrayCache>>> {
        Ok(match &self.array_cache {
            CacheSetting::Disabled => None,
            CacheSetting::Limit(bytes) => Some(Arc::new(LruArrayCache::new(*bytes as usize))),
            CacheSetting::MemorySize(text) => {
                Some(Arc::new(LruArrayCache::new(memory_size(text)? as usize)))
            }
            CacheSetting::Shared(cache) => Some(Arc::clone(cache)),
        })
    }

    pub(crate) fn decompression_executor(&self) -> Arc<dyn Executor> {
        executor_for(self.decompression_workers)
    }

    pub(crate) fn interpretation_executor(&self) -> Arc<dyn Executor> {
        executor_for(self.interpretation_workers)
    }
}

fn executor_for(workers: usize) -> Arc<dyn Executor> {
    if workers == 0 {
        Arc::new(TrivialExecutor)
    } else {
        Arc::new(ThreadPool::new(workers))
    }
}

/// Everything one `arrays` or `iterate` call needs besides the tree.
#[derive(Clone, Debug, Default)]
pub struct ArraysRequest {
    pub(crate) expressions: Expressions,
    pub(crate) cut: Option<String>,
    pub(crate) filter_name: Option<String>,
    pub(crate) aliases: HashMap<String, String>,
    pub(crate) entry_start: Option<i64>,
    pub(crate) entry_stop: Option<i64>,
    pub(crate) decompression_executor: Option<Arc<dyn Executor>>,
    pub(crate) interpretation_executor: Option<Arc<dyn Executor>>,
    pub(crate) array_cache: CacheChoice,
    pub(crate) how: Option<How>,
}

impl ArraysRequest {
    /// Every branch with a known, non-grouped interpretation.
    pub fn new() -> Self {
        ArraysRequest::default()
    }

    pub fn expressions<I, S>(mut self, expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ExpressionSpec>,
    {
        self.expressions = expressions.into_iter().collect();
        self
    }

    pub fn expression(mut self, spec: impl Into<ExpressionSpec>) -> Self {
        match &mut self.expressions {
            Expressions::All => self.expressions = Expressions::Names(vec![spec.into()]),
            Expressions::Names(specs) => specs.push(spec.into()),
        }
        self
    }

    pub fn cut(mut self, cut: impl Into<String>) -> Self {
        self.cut = Some(cut.into());
        self
    }

    /// Restricts the all-branches selection to names matching a glob or `/regex/`.
    pub fn filter_name(mut self, pattern: impl Into<String>) -> Self {
        self.filter_name = Some(pattern.into());
        self
    }

    /// Adds an alias for this call, shadowing a tree alias of the same name.
    pub fn alias(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.aliases.insert(name.into(), expression.into());
        self
    }

    pub fn entry_start(mut self, entry_start: i64) -> Self {
        self.entry_start = Some(entry_start);
        self
    }

    pub fn entry_stop(mut self, entry_stop: i64) -> Self {
        self.entry_stop = Some(entry_stop);
        self
    }

    pub fn decompression_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.decompression_executor = Some(executor);
        self
    }

    pub fn interpretation_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.interpretation_executor = Some(executor);
        self
    }

    pub fn array_cache(mut self, cache: Arc<dyn ArrayCache>) -> Self {
        self.array_cache = CacheChoice::Use(cache);
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.array_cache = CacheChoice::Disabled;
        self
    }

    pub fn how(mut self, how: How) -> Self {
        self.how = Some(how);
        self
    }

    pub fn cut_expression(&self) -> Option<&str> {
        self.cut.as_deref()
    }
}
