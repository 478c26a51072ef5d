//! Writes trees in the layout the decoder reads, for tests and demos.

use crate::array::Array;
use crate::basket::basket_io::encode_basket;
use crate::basket::Basket;
use crate::branch::BranchMeta;
use crate::config::ReaderOptions;
use crate::error::{ReadError, Result};
use crate::helpers::compressor::Compression;
use crate::interpretation::{
    AsDtype, AsGrouped, AsJagged, AsStrings, Dtype, Interpretation, UnknownInterpretation,
};
use crate::source::{FileSource, MemorySource};
use crate::tree::{Tree, TreeMeta};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

enum ColumnKind {
    Leaf(Array),
    /// Stored like a leaf but with no known interpretation.
    Opaque { data: Array, typename: String },
    Grouped(Vec<(String, Array)>),
}

struct Column {
    name: String,
    kind: ColumnKind,
}

/// Builds a tree column by column, then lays every column out in baskets.
///
/// All columns share the same basket boundaries. The last
/// `embedded_baskets` baskets of every branch are kept with the branch
/// metadata instead of being written to the byte buffer.
pub struct TreeWriter {
    object_path: String,
    file_path: String,
    basket_size: u64,
    entry_boundaries: Option<Vec<u64>>,
    embedded_baskets: usize,
    header_bytes: usize,
    compression: Compression,
    columns: Vec<Column>,
    aliases: HashMap<String, String>,
}

impl TreeWriter {
    pub fn new(object_path: impl Into<String>) -> Self {
        TreeWriter {
            object_path: object_path.into(),
            file_path: "memory.tree".to_string(),
            basket_size: 100,
            entry_boundaries: None,
            embedded_baskets: 0,
            header_bytes: 0,
            compression: Compression::default(),
            columns: Vec::new(),
            aliases: HashMap::new(),
        }
    }

    /// Name reported for in-memory sources.
    pub fn file_path(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = file_path.into();
        self
    }

    /// Entries per basket.
    pub fn basket_size(mut self, entries: u64) -> Self {
        self.basket_size = entries;
        self
    }

    /// Explicit basket boundaries, starting at 0 and ending at the entry count.
    pub fn entry_boundaries(mut self, boundaries: Vec<u64>) -> Self {
        self.entry_boundaries = Some(boundaries);
        self
    }

    pub fn embedded_baskets(mut self, count: usize) -> Self {
        self.embedded_baskets = count;
        self
    }

    /// Per-entry header in jagged and string baskets.
    pub fn header_bytes(mut self, header_bytes: usize) -> Self {
        self.header_bytes = header_bytes;
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// A column of numbers, strings, or jagged numbers.
    pub fn column(mut self, name: impl Into<String>, data: Array) -> Self {
        self.columns.push(Column {
            name: name.into(),
            kind: ColumnKind::Leaf(data),
        });
        self
    }

    pub fn opaque(mut self, name: impl Into<String>, typename: impl Into<String>, data: Array) -> Self {
        self.columns.push(Column {
            name: name.into(),
            kind: ColumnKind::Opaque {
                data,
                typename: typename.into(),
            },
        });
        self
    }

    /// A struct-like branch whose fields are stored in sub-branches.
    pub fn grouped(mut self, name: impl Into<String>, fields: Vec<(String, Array)>) -> Self {
        self.columns.push(Column {
            name: name.into(),
            kind: ColumnKind::Grouped(fields),
        });
        self
    }

    pub fn alias(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.aliases.insert(name.into(), expression.into());
        self
    }

    /// Tree metadata and the byte buffer its free baskets point into.
    pub fn build(&self) -> Result<(TreeMeta, Vec<u8>)> {
        let num_entries = self.num_entries()?;
        let boundaries = self.boundaries(num_entries)?;
        let mut bytes = Vec::new();
        let mut branches = Vec::with_capacity(self.columns.len());

        for column in &self.columns {
            let meta = match &column.kind {
                ColumnKind::Leaf(data) => {
                    let interpretation = self.interpretation_for(data)?;
                    self.write_branch(&column.name, data, interpretation, &boundaries, &mut bytes)?
                }
                ColumnKind::Opaque { data, typename } => self.write_branch(
                    &column.name,
                    data,
                    Arc::new(UnknownInterpretation::new(typename.clone())),
                    &boundaries,
                    &mut bytes,
                )?,
                ColumnKind::Grouped(fields) => {
                    let mut children = Vec::with_capacity(fields.len());
                    for (name, data) in fields {
                        let interpretation = self.interpretation_for(data)?;
                        children.push(self.write_branch(name, data, interpretation, &boundaries, &mut bytes)?);
                    }
                    let subbranches = children
                        .iter()
                        .map(|child| (child.name.clone(), Arc::clone(&child.interpretation)))
                        .collect();
                    let mut meta = BranchMeta::new(column.name.clone(), Arc::new(AsGrouped::new(subbranches)));
                    meta.num_entries = num_entries;
                    meta.branches = children;
                    meta
                }
            };
            branches.push(meta);
        }

        debug!(
            object_path = %self.object_path,
            num_entries,
            baskets = boundaries.len().saturating_sub(1),
            bytes = bytes.len(),
            "wrote tree"
        );
        let meta = TreeMeta {
            object_path: self.object_path.clone(),
            num_entries,
            branches,
            aliases: self.aliases.clone(),
        };
        Ok((meta, bytes))
    }

    /// Opens the tree over an in-memory source.
    pub fn open(&self, options: &ReaderOptions) -> Result<Tree> {
        let (meta, bytes) = self.build()?;
        Tree::open(meta, Arc::new(MemorySource::new(self.file_path.clone(), bytes)), options)
    }

    /// Writes the basket bytes to `path` and opens the tree over them.
    pub fn write_to(&self, path: impl AsRef<Path>, workers: usize, options: &ReaderOptions) -> Result<Tree> {
        let (meta, bytes) = self.build()?;
        std::fs::write(path.as_ref(), bytes)?;
        Tree::open(meta, Arc::new(FileSource::open(path, workers)?), options)
    }

    fn num_entries(&self) -> Result<u64> {
        let mut lengths = self.columns.iter().flat_map(|column| match &column.kind {
            ColumnKind::Leaf(data) | ColumnKind::Opaque { data, .. } => vec![data.len()],
            ColumnKind::Grouped(fields) => fields.iter().map(|(_, data)| data.len()).collect(),
        });
        let first = lengths.next().unwrap_or(0);
        if lengths.any(|len| len != first) {
            return Err(ReadError::mismatch("columns have different lengths"));
        }
        Ok(first as u64)
    }

    fn boundaries(&self, num_entries: u64) -> Result<Vec<u64>> {
        if let Some(boundaries) = &self.entry_boundaries {
            let valid = boundaries.first() == Some(&0)
                && boundaries.last() == Some(&num_entries)
                && boundaries.windows(2).all(|w| w[0] <= w[1]);
            if !valid {
                return Err(ReadError::mismatch(format!(
                    "basket boundaries {boundaries:?} do not cover {num_entries} entries"
                )));
            }
            return Ok(boundaries.clone());
        }
        if self.basket_size == 0 {
            return Err(ReadError::mismatch("basket size must be positive"));
        }
        let mut boundaries: Vec<u64> = (0..num_entries).step_by(self.basket_size as usize).collect();
        boundaries.push(num_entries);
        Ok(boundaries)
    }

    fn interpretation_for(&self, data: &Array) -> Result<Arc<dyn Interpretation>> {
        Ok(match data {
            Array::Strings(_) => Arc::new(AsStrings::new().with_header_bytes(self.header_bytes)),
            Array::Jagged(jagged) => {
                let content = dtype_of(jagged.content())?;
                Arc::new(AsJagged::new(content).with_header_bytes(self.header_bytes))
            }
            flat => Arc::new(AsDtype::new(dtype_of(flat)?)),
        })
    }

    fn write_branch(
        &self,
        name: &str,
        data: &Array,
        interpretation: Arc<dyn Interpretation>,
        boundaries: &[u64],
        bytes: &mut Vec<u8>,
    ) -> Result<BranchMeta> {
        let mut meta = BranchMeta::new(name, interpretation);
        meta.num_entries = data.len() as u64;

        let num_baskets = boundaries.len().saturating_sub(1);
        let num_free = num_baskets.saturating_sub(self.embedded_baskets);
        for (basket_num, pair) in boundaries.windows(2).enumerate() {
            let (start, stop) = (pair[0], pair[1]);
            let (payload, offsets) = self.encode_entries(&data.slice(start as usize, stop as usize))?;
            if basket_num < num_free {
                let encoded = encode_basket(&payload, offsets.as_deref(), stop - start, self.compression)?;
                meta.basket_seek.push(bytes.len() as u64);
                meta.basket_bytes.push(encoded.len() as u64);
                bytes.extend_from_slice(&encoded);
            } else {
                let size = payload.len() as u64;
                meta.embedded_baskets
                    .push(Basket::embedded(stop - start, payload, offsets, size));
            }
        }
        if num_free > 0 {
            meta.basket_entry = boundaries[..=num_free].to_vec();
        }
        Ok(meta)
    }

    /// Payload bytes plus, for variable-length data, entry boundaries within them.
    fn encode_entries(&self, data: &Array) -> Result<(Vec<u8>, Option<Vec<u32>>)> {
        match data {
            Array::Strings(values) => {
                let mut payload = Vec::new();
                let mut offsets = vec![0u32];
                for value in values {
                    payload.resize(payload.len() + self.header_bytes, 0);
                    AsStrings::encode_into(value, &mut payload);
                    offsets.push(payload.len() as u32);
                }
                Ok((payload, Some(offsets)))
            }
            Array::Jagged(jagged) => {
                let dtype = dtype_of(jagged.content())?;
                let mut payload = Vec::new();
                let mut offsets = vec![0u32];
                for index in 0..jagged.len() {
                    payload.resize(payload.len() + self.header_bytes, 0);
                    let items = dtype
                        .encode(&jagged.entry(index))
                        .ok_or_else(|| ReadError::mismatch("jagged content changed type"))?;
                    payload.extend_from_slice(&items);
                    offsets.push(payload.len() as u32);
                }
                Ok((payload, Some(offsets)))
            }
            flat => {
                let dtype = dtype_of(flat)?;
                let payload = dtype
                    .encode(flat)
                    .ok_or_else(|| ReadError::mismatch("column changed type"))?;
                Ok((payload, None))
            }
        }
    }
}

fn dtype_of(data: &Array) -> Result<Dtype> {
    match data {
        Array::Bool(_) => Ok(Dtype::Bool),
        Array::Int32(_) => Ok(Dtype::Int32),
        Array::Int64(_) => Ok(Dtype::Int64),
        Array::Float32(_) => Ok(Dtype::Float32),
        Array::Float64(_) => Ok(Dtype::Float64),
        other => Err(ReadError::mismatch(format!(
            "cannot store {} as fixed-width items",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_and_embedded_baskets_cover_every_entry() {
        let (meta, bytes) = TreeWriter::new("/events")
            .basket_size(4)
            .embedded_baskets(1)
            .column("n", Array::Int32((0..10).collect()))
            .build()
            .unwrap();
        let branch = &meta.branches[0];
        assert_eq!(meta.num_entries, 10);
        assert_eq!(branch.basket_entry, vec![0, 4, 8]);
        assert_eq!(branch.basket_seek.len(), 2);
        assert_eq!(branch.embedded_baskets.len(), 1);
        assert_eq!(branch.embedded_baskets[0].num_entries(), 2);
        assert_eq!(bytes.len() as u64, branch.basket_bytes.iter().sum::<u64>());
    }

    #[test]
    fn mismatched_columns_are_rejected() {
        let writer = TreeWriter::new("/events")
            .column("a", Array::Int32(vec![1, 2]))
            .column("b", Array::Int32(vec![1]));
        assert!(writer.build().is_err());
    }

    #[test]
    fn explicit_boundaries_must_cover_entries() {
        let writer = TreeWriter::new("/events")
            .entry_boundaries(vec![0, 5])
            .column("a", Array::Int32(vec![1, 2]));
        assert!(writer.build().is_err());
    }
}
