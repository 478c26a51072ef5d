//! Two-stage fetch, decompress and interpret pipeline over one completion channel.

use crate::array::Array;
use crate::basket::basket_io::decode_basket;
use crate::basket::Basket;
use crate::branch::Branch;
use crate::entry_range::RangeOrBasket;
use crate::error::{ReadError, Result};
use crate::interpretation::Interpretation;
use crate::pool::Executor;
use crate::source::{Chunk, Source};
use crossbeam::channel::{unbounded, Sender};
use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

/// Everything that travels back to the consumer thread.
#[derive(Debug)]
pub enum Notification {
    /// Raw bytes of one basket, ready for decompression.
    Chunk(Chunk),
    /// A decompressed basket, ready for interpretation.
    Basket(Arc<Basket>),
    /// The last fragment of a branch arrived and its final array was built.
    Assembled { branch: String, array: Array },
    /// A fragment was stored; nothing else to do.
    Done,
    Failed(ReadError),
}

/// The baskets of one branch selected for the current entry window.
#[derive(Debug, Clone)]
pub struct BranchRequest {
    pub branch: Arc<Branch>,
    pub interpretation: Arc<dyn Interpretation>,
    pub selectors: Vec<(usize, RangeOrBasket)>,
}

/// Final arrays keyed by branch cache key, plus the baskets kept for a
/// following window.
#[derive(Debug, Default)]
pub struct PipelineOutput {
    pub arrays: HashMap<String, Array>,
    pub baskets: Vec<Arc<Basket>>,
}

struct Assembly {
    branch: Arc<Branch>,
    interpretation: Arc<dyn Interpretation>,
    expected: usize,
    fragments: Mutex<BTreeMap<usize, Array>>,
}

impl Assembly {
    /// Decodes one basket and, if it was the last one missing, builds the final array.
    fn interpret(&self, basket: &Basket, entry_start: u64, entry_stop: u64) -> Result<Option<Array>> {
        let array = self.interpretation.basket_array(
            basket.data(),
            basket.byte_offsets(),
            basket,
            &self.branch,
            basket.key_len(),
        )?;
        if array.len() as u64 != basket.num_entries() {
            return Err(ReadError::EntryCountMismatch {
                basket_num: basket.basket_num(),
                branch: self.branch.object_path().to_string(),
                expected: basket.num_entries(),
                actual: array.len() as u64,
                interpretation: self.interpretation.cache_key(),
                file_path: self.branch.file_path().to_string(),
            });
        }

        let fragments = {
            let mut fragments = self
                .fragments
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            fragments.insert(basket.basket_num(), array);
            if fragments.len() < self.expected {
                return Ok(None);
            }
            std::mem::take(&mut *fragments)
        };

        let array = self.interpretation.final_array(
            &fragments,
            entry_start,
            entry_stop,
            self.branch.entry_offsets(),
            Some(&self.branch),
        )?;
        Ok(Some(array))
    }
}

/// Fetches, decompresses and interprets baskets for a set of branches,
/// decoding each selected basket exactly once.
pub struct ChunkPipeline<'a> {
    source: &'a dyn Source,
    decompression: Arc<dyn Executor>,
    interpretation: Arc<dyn Executor>,
}

impl<'a> ChunkPipeline<'a> {
    pub fn new(
        source: &'a dyn Source,
        decompression: Arc<dyn Executor>,
        interpretation: Arc<dyn Executor>,
    ) -> Self {
        ChunkPipeline {
            source,
            decompression,
            interpretation,
        }
    }

    /// Runs until every requested branch has a final array, or returns the
    /// first error any stage reports.
    ///
    /// Baskets whose last entry lies beyond `retain_after` are handed back in
    /// [`PipelineOutput::baskets`]; with `None` nothing is kept.
    pub fn run(
        &self,
        requests: Vec<BranchRequest>,
        entry_start: u64,
        entry_stop: u64,
        retain_after: Option<u64>,
    ) -> Result<PipelineOutput> {
        let mut output = PipelineOutput::default();
        let mut assemblies: HashMap<String, Arc<Assembly>> = HashMap::new();
        let mut range_owners: HashMap<(u64, u64), (Arc<Branch>, usize)> = HashMap::new();
        let mut ranges = Vec::new();
        let mut embedded = Vec::new();

        for request in requests {
            let key = request.branch.cache_key().to_string();
            if assemblies.contains_key(&key) || output.arrays.contains_key(&key) {
                continue;
            }

            let selectors: BTreeMap<usize, RangeOrBasket> = request.selectors.into_iter().collect();
            if selectors.is_empty() {
                let array = request.interpretation.final_array(
                    &BTreeMap::new(),
                    entry_start,
                    entry_stop,
                    request.branch.entry_offsets(),
                    Some(&request.branch),
                )?;
                output.arrays.insert(key, array);
                continue;
            }

            for (basket_num, selector) in &selectors {
                match selector {
                    RangeOrBasket::Range(start, stop) => {
                        range_owners.insert((*start, *stop), (Arc::clone(&request.branch), *basket_num));
                        ranges.push((*start, *stop));
                    }
                    RangeOrBasket::Basket(basket) => embedded.push(Arc::clone(basket)),
                }
            }
            assemblies.insert(
                key,
                Arc::new(Assembly {
                    branch: request.branch,
                    interpretation: request.interpretation,
                    expected: selectors.len(),
                    fragments: Mutex::new(BTreeMap::new()),
                }),
            );
        }

        let pending = assemblies.len();
        debug!(
            branches = pending,
            ranges = ranges.len(),
            embedded = embedded.len(),
            "starting pipeline"
        );
        if pending == 0 {
            return Ok(output);
        }

        let (sender, receiver) = unbounded::<Notification>();
        if !ranges.is_empty() {
            self.source.chunks(&ranges, &sender);
        }
        for basket in embedded {
            sender
                .send(Notification::Basket(basket))
                .map_err(|_| ReadError::PipelineDisconnected)?;
        }

        let mut assembled = 0;
        while assembled < pending {
            let notification = receiver
                .recv()
                .map_err(|_| ReadError::PipelineDisconnected)?;
            match notification {
                Notification::Chunk(chunk) => {
                    let (branch, basket_num) = range_owners
                        .get(&(chunk.start, chunk.stop))
                        .cloned()
                        .ok_or_else(|| {
                            ReadError::mismatch(format!(
                                "source returned unrequested range {}..{}",
                                chunk.start, chunk.stop
                            ))
                        })?;
                    self.submit_decompression(chunk, branch, basket_num, &sender);
                }
                Notification::Basket(basket) => {
                    let assembly = assemblies.get(basket.branch()).cloned().ok_or_else(|| {
                        ReadError::mismatch(format!(
                            "basket {} belongs to unrequested branch {}",
                            basket.basket_num(),
                            basket.branch()
                        ))
                    })?;
                    if retain_after.is_some_and(|after| basket.entry_start_stop().1 > after) {
                        output.baskets.push(Arc::clone(&basket));
                    }
                    self.submit_interpretation(assembly, basket, entry_start, entry_stop, &sender);
                }
                Notification::Assembled { branch, array } => {
                    trace!(%branch, entries = array.len(), "assembled");
                    output.arrays.insert(branch, array);
                    assembled += 1;
                }
                Notification::Done => {}
                Notification::Failed(err) => {
                    debug!(error = %err, "pipeline failed");
                    return Err(err);
                }
            }
        }
        Ok(output)
    }

    fn submit_decompression(
        &self,
        chunk: Chunk,
        branch: Arc<Branch>,
        basket_num: usize,
        sender: &Sender<Notification>,
    ) {
        let sender = sender.clone();
        self.decompression.submit(Box::new(move || {
            let result = catch_unwind(AssertUnwindSafe(|| decode_basket(&chunk, &branch, basket_num)));
            let notification = match result {
                Ok(Ok(basket)) => Notification::Basket(Arc::new(basket)),
                Ok(Err(err)) => Notification::Failed(err),
                Err(panic) => Notification::Failed(ReadError::from_panic("decompression", panic)),
            };
            // a closed channel means the call already failed
            let _ = sender.send(notification);
        }));
    }

    fn submit_interpretation(
        &self,
        assembly: Arc<Assembly>,
        basket: Arc<Basket>,
        entry_start: u64,
        entry_stop: u64,
        sender: &Sender<Notification>,
    ) {
        let sender = sender.clone();
        self.interpretation.submit(Box::new(move || {
            let result = catch_unwind(AssertUnwindSafe(|| {
                assembly.interpret(&basket, entry_start, entry_stop)
            }));
            let notification = match result {
                Ok(Ok(Some(array))) => Notification::Assembled {
                    branch: assembly.branch.cache_key().to_string(),
                    array,
                },
                Ok(Ok(None)) => Notification::Done,
                Ok(Err(err)) => Notification::Failed(err),
                Err(panic) => Notification::Failed(ReadError::from_panic("interpretation", panic)),
            };
            let _ = sender.send(notification);
        }));
    }
}
