use crate::basket::Basket;
use crate::error::{ReadError, Result};
use crate::interpretation::Interpretation;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Where the bytes of one basket can be found.
#[derive(Clone, Debug)]
pub enum BasketLocation {
    /// A compressed block in the source at `[seek, seek + bytes)`.
    Free { seek: u64, bytes: u64 },
    /// A basket already deserialized with the branch metadata.
    Embedded(Arc<Basket>),
}

/// Branch metadata as handed over by the container parser.
#[derive(Clone, Debug)]
pub struct BranchMeta {
    pub name: String,
    pub typename: String,
    pub num_entries: u64,
    /// Entry boundaries of the normal baskets: one more than their count, or empty.
    pub basket_entry: Vec<u64>,
    pub basket_seek: Vec<u64>,
    pub basket_bytes: Vec<u64>,
    pub embedded_baskets: Vec<Basket>,
    pub interpretation: Arc<dyn Interpretation>,
    pub branches: Vec<BranchMeta>,
}

impl BranchMeta {
    pub fn new(name: impl Into<String>, interpretation: Arc<dyn Interpretation>) -> Self {
        BranchMeta {
            name: name.into(),
            typename: interpretation.typename(),
            num_entries: 0,
            basket_entry: Vec::new(),
            basket_seek: Vec::new(),
            basket_bytes: Vec::new(),
            embedded_baskets: Vec::new(),
            interpretation,
            branches: Vec::new(),
        }
    }
}

/// A named column of a tree.
#[derive(Debug)]
pub struct Branch {
    name: String,
    object_path: String,
    cache_key: String,
    file_path: String,
    typename: String,
    num_entries: u64,
    entry_offsets: Vec<u64>,
    baskets: Vec<BasketLocation>,
    interpretation: Arc<dyn Interpretation>,
    branches: Vec<Arc<Branch>>,
}

impl Branch {
    pub(crate) fn from_meta(
        meta: BranchMeta,
        tree_key: &str,
        parent_path: &str,
        file_path: &str,
    ) -> Result<Arc<Branch>> {
        let object_path = format!("{parent_path}/{}", meta.name);
        let cache_key = format!("{tree_key}:{object_path}");

        let num_normal = meta.basket_seek.len();
        if meta.basket_bytes.len() != num_normal
            || (num_normal > 0 && meta.basket_entry.len() < num_normal + 1)
        {
            return Err(ReadError::MalformedBasket {
                branch: object_path,
                basket_num: 0,
                reason: format!(
                    "{num_normal} seeks, {} sizes and {} entry boundaries do not line up",
                    meta.basket_bytes.len(),
                    meta.basket_entry.len()
                ),
            });
        }

        let mut entry_offsets = if num_normal == 0 {
            vec![0]
        } else {
            meta.basket_entry[..=num_normal].to_vec()
        };
        let num_entries_normal = entry_offsets.last().copied().unwrap_or(0);

        let mut baskets: Vec<BasketLocation> = meta
            .basket_seek
            .iter()
            .zip(&meta.basket_bytes)
            .map(|(&seek, &bytes)| BasketLocation::Free { seek, bytes })
            .collect();

        let mut embedded_entries = 0;
        for basket in meta.embedded_baskets {
            let entry_start = entry_offsets.last().copied().unwrap_or(0);
            let basket = basket.placed(&cache_key, baskets.len(), entry_start);
            embedded_entries += basket.num_entries();
            entry_offsets.push(entry_start + basket.num_entries());
            baskets.push(BasketLocation::Embedded(Arc::new(basket)));
        }

        let monotonic = entry_offsets[0] == 0 && entry_offsets.windows(2).all(|w| w[0] <= w[1]);
        let total = entry_offsets.last().copied().unwrap_or(0);
        let is_grouped = meta.interpretation.as_grouped().is_some();
        if !monotonic || (total != meta.num_entries && !is_grouped) {
            return Err(ReadError::InvalidEntryOffsets {
                branch: object_path,
                normal: num_entries_normal,
                embedded: embedded_entries,
                expected: meta.num_entries,
                file_path: file_path.to_string(),
            });
        }

        let branches = meta
            .branches
            .into_iter()
            .map(|child| Branch::from_meta(child, tree_key, &object_path, file_path))
            .collect::<Result<Vec<_>>>()?;

        Ok(Arc::new(Branch {
            name: meta.name,
            object_path,
            cache_key,
            file_path: file_path.to_string(),
            typename: meta.typename,
            num_entries: meta.num_entries,
            entry_offsets,
            baskets,
            interpretation: meta.interpretation,
            branches,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn object_path(&self) -> &str {
        &self.object_path
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn typename(&self) -> &str {
        &self.typename
    }

    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Starting entry of every basket plus the total entry count.
    pub fn entry_offsets(&self) -> &[u64] {
        &self.entry_offsets
    }

    pub fn num_baskets(&self) -> usize {
        self.baskets.len()
    }

    pub fn interpretation(&self) -> &Arc<dyn Interpretation> {
        &self.interpretation
    }

    pub fn branches(&self) -> &[Arc<Branch>] {
        &self.branches
    }

    pub fn child(&self, name: &str) -> Option<&Arc<Branch>> {
        self.branches.iter().find(|branch| branch.name == name)
    }

    pub fn basket_location(&self, basket_num: usize) -> Result<&BasketLocation> {
        self.baskets.get(basket_num).ok_or_else(|| self.out_of_range(basket_num))
    }

    pub fn basket_entry_start_stop(&self, basket_num: usize) -> Result<(u64, u64)> {
        if basket_num >= self.baskets.len() {
            return Err(self.out_of_range(basket_num));
        }
        Ok((
            self.entry_offsets[basket_num],
            self.entry_offsets[basket_num + 1],
        ))
    }

    pub fn basket_compressed_bytes(&self, basket_num: usize) -> Result<u64> {
        Ok(match self.basket_location(basket_num)? {
            BasketLocation::Free { bytes, .. } => {
                bytes.saturating_sub(crate::basket::basket_io::BASKET_KEY_SIZE as u64)
            }
            BasketLocation::Embedded(basket) => basket.compressed_bytes(),
        })
    }

    /// This branch followed by all of its descendants, depth first.
    pub fn descendants(self: &Arc<Self>) -> Vec<Arc<Branch>> {
        let mut out = vec![Arc::clone(self)];
        for child in &self.branches {
            out.extend(child.descendants());
        }
        out
    }

    fn out_of_range(&self, basket_num: usize) -> ReadError {
        ReadError::BasketOutOfRange {
            branch: self.object_path.clone(),
            basket_num,
            num_baskets: self.baskets.len(),
        }
    }
}

/// Every branch of a tree, top-level and nested, reachable by name.
#[derive(Debug, Default)]
pub struct BranchIndex {
    top: Vec<Arc<Branch>>,
    by_name: HashMap<String, Arc<Branch>>,
    keys: BTreeSet<String>,
}

impl BranchIndex {
    pub fn new(top: Vec<Arc<Branch>>) -> Self {
        let mut by_name = HashMap::new();
        let mut keys = BTreeSet::new();
        for branch in top.iter().flat_map(|branch| branch.descendants()) {
            keys.insert(branch.name().to_string());
            // the first branch of a name wins, matching depth-first search order
            by_name.entry(branch.name().to_string()).or_insert(branch);
        }
        BranchIndex { top, by_name, keys }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Branch>> {
        self.by_name.get(name)
    }

    pub fn keys(&self) -> &BTreeSet<String> {
        &self.keys
    }

    pub fn top(&self) -> &[Arc<Branch>] {
        &self.top
    }

    /// All branches, depth first in declaration order.
    pub fn recursive(&self) -> Vec<Arc<Branch>> {
        self.top.iter().flat_map(|branch| branch.descendants()).collect()
    }
}
