//! Decoding strategies that turn basket bytes into array fragments and
//! fragments into a branch's final array.

pub mod grouped;
pub mod jagged;
pub mod library;
pub mod numerical;
pub mod strings;

pub use grouped::{AsGrouped, UnknownInterpretation};
pub use jagged::AsJagged;
pub use library::{ArrayGroup, ArrayLibrary, Columns, How, Library};
pub use numerical::{AsDtype, Dtype};
pub use strings::AsStrings;

use crate::array::Array;
use crate::basket::Basket;
use crate::branch::Branch;
use crate::error::{ReadError, Result};
use std::collections::BTreeMap;
use std::fmt;

pub trait Interpretation: Send + Sync + fmt::Debug {
    /// Distinguishes decoding strategies for the same raw bytes.
    fn cache_key(&self) -> String;

    /// C-like name of the decoded type.
    fn typename(&self) -> String;

    fn is_jagged(&self) -> bool {
        false
    }

    fn as_grouped(&self) -> Option<&AsGrouped> {
        None
    }

    /// True when no decoding strategy is known for the branch.
    fn is_unknown(&self) -> bool {
        false
    }

    /// Decodes one basket. `byte_offsets` are counted from the start of the
    /// basket key, so `key_len` is subtracted to index into `data`.
    fn basket_array(
        &self,
        data: &[u8],
        byte_offsets: Option<&[u32]>,
        basket: &Basket,
        branch: &Branch,
        key_len: usize,
    ) -> Result<Array>;

    /// Combines the fragments of every basket overlapping
    /// `[entry_start, entry_stop)` into exactly that window.
    fn final_array(
        &self,
        fragments: &BTreeMap<usize, Array>,
        entry_start: u64,
        entry_stop: u64,
        entry_offsets: &[u64],
        branch: Option<&Branch>,
    ) -> Result<Array>;
}

/// Slices and joins per-basket fragments to cover `[entry_start, entry_stop)`.
///
/// `empty` is returned when no basket contributes entries.
pub(crate) fn assemble_window(
    fragments: &BTreeMap<usize, Array>,
    entry_start: u64,
    entry_stop: u64,
    entry_offsets: &[u64],
    empty: Array,
) -> Result<Array> {
    let mut parts = Vec::new();
    for (basket_num, pair) in entry_offsets.windows(2).enumerate() {
        let (start, stop) = (pair[0], pair[1]);
        let (local_start, local_stop) = if start <= entry_start && entry_stop <= stop {
            (entry_start - start, entry_stop - start)
        } else if start <= entry_start && entry_start < stop {
            (entry_start - start, stop - start)
        } else if start < entry_stop && entry_stop <= stop {
            (0, entry_stop - start)
        } else if entry_start <= start && stop <= entry_stop {
            (0, stop - start)
        } else {
            continue;
        };
        if local_start == local_stop {
            continue;
        }
        let fragment = fragments.get(&basket_num).ok_or_else(|| {
            ReadError::mismatch(format!(
                "basket {basket_num} is needed for entries {entry_start}..{entry_stop} but was not decoded"
            ))
        })?;
        parts.push(fragment.slice(local_start as usize, local_stop as usize));
    }

    if parts.is_empty() {
        return Ok(empty);
    }
    let array = Array::concat(&parts)?;
    if array.len() as u64 != entry_stop - entry_start {
        return Err(ReadError::mismatch(format!(
            "assembled {} entries for window {entry_start}..{entry_stop}",
            array.len()
        )));
    }
    Ok(array)
}

/// `byte_offsets` shifted back to index into the basket payload.
pub(crate) fn local_offsets(
    byte_offsets: &[u32],
    key_len: usize,
    data_len: usize,
    branch: &Branch,
    basket: &Basket,
) -> Result<Vec<usize>> {
    let malformed = |reason: String| ReadError::MalformedBasket {
        branch: branch.object_path().to_string(),
        basket_num: basket.basket_num(),
        reason,
    };
    let offsets = byte_offsets
        .iter()
        .map(|&offset| {
            (offset as usize)
                .checked_sub(key_len)
                .ok_or_else(|| malformed(format!("offset {offset} points into the key")))
        })
        .collect::<Result<Vec<usize>>>()?;
    if offsets.windows(2).any(|w| w[0] > w[1]) || offsets.last().is_some_and(|&o| o > data_len) {
        return Err(malformed("byte offsets are not ordered within the payload".to_string()));
    }
    Ok(offsets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragments() -> BTreeMap<usize, Array> {
        let mut map = BTreeMap::new();
        map.insert(0, Array::Int64((0..100).collect()));
        map.insert(1, Array::Int64((100..250).collect()));
        map.insert(2, Array::Int64((250..400).collect()));
        map
    }

    #[test]
    fn window_spans_three_baskets() {
        let offsets = [0, 100, 250, 400];
        let array = assemble_window(&fragments(), 90, 260, &offsets, Array::Int64(vec![])).unwrap();
        assert_eq!(array, Array::Int64((90..260).collect()));
    }

    #[test]
    fn window_inside_one_basket() {
        let offsets = [0, 100, 250, 400];
        let mut only = fragments();
        only.remove(&0);
        only.remove(&2);
        let array = assemble_window(&only, 120, 130, &offsets, Array::Int64(vec![])).unwrap();
        assert_eq!(array, Array::Int64((120..130).collect()));
    }

    #[test]
    fn empty_window_returns_empty() {
        let offsets = [0, 100, 250, 400];
        let array =
            assemble_window(&BTreeMap::new(), 100, 100, &offsets, Array::Int64(vec![])).unwrap();
        assert!(array.is_empty());
    }
}
