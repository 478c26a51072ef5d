use super::{assemble_window, local_offsets, Dtype, Interpretation};
use crate::array::{Array, JaggedArray};
use crate::basket::Basket;
use crate::branch::Branch;
use crate::error::{ReadError, Result};
use std::collections::BTreeMap;

/// A variable number of fixed-width items per entry, each entry optionally
/// preceded by `header_bytes` of per-entry header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AsJagged {
    content: Dtype,
    header_bytes: usize,
}

impl AsJagged {
    pub fn new(content: Dtype) -> Self {
        AsJagged {
            content,
            header_bytes: 0,
        }
    }

    pub fn with_header_bytes(mut self, header_bytes: usize) -> Self {
        self.header_bytes = header_bytes;
        self
    }

    pub fn content(&self) -> Dtype {
        self.content
    }

    pub fn header_bytes(&self) -> usize {
        self.header_bytes
    }
}

impl Interpretation for AsJagged {
    fn cache_key(&self) -> String {
        format!(
            "AsJagged({},header_bytes={})",
            self.content.code(),
            self.header_bytes
        )
    }

    fn typename(&self) -> String {
        format!("{}[]", self.content.typename())
    }

    fn is_jagged(&self) -> bool {
        true
    }

    fn basket_array(
        &self,
        data: &[u8],
        byte_offsets: Option<&[u32]>,
        basket: &Basket,
        branch: &Branch,
        key_len: usize,
    ) -> Result<Array> {
        let malformed = |reason: String| ReadError::MalformedBasket {
            branch: branch.object_path().to_string(),
            basket_num: basket.basket_num(),
            reason,
        };
        let byte_offsets = byte_offsets
            .ok_or_else(|| malformed("jagged basket has no byte offsets".to_string()))?;
        let entries = local_offsets(byte_offsets, key_len, data.len(), branch, basket)?;

        let itemsize = self.content.itemsize();
        let mut offsets = Vec::with_capacity(entries.len());
        let mut content = Vec::with_capacity(data.len());
        offsets.push(0);
        for pair in entries.windows(2) {
            let entry = &data[pair[0]..pair[1]];
            let items = entry.get(self.header_bytes..).unwrap_or(&[]);
            if items.len() % itemsize != 0 {
                return Err(malformed(format!(
                    "entry of {} bytes is not a multiple of the {itemsize}-byte item size",
                    items.len()
                )));
            }
            content.extend_from_slice(items);
            offsets.push(content.len() / itemsize);
        }

        let content = self.content.decode(&content);
        Ok(Array::Jagged(JaggedArray::new(offsets, content)?))
    }

    fn final_array(
        &self,
        fragments: &BTreeMap<usize, Array>,
        entry_start: u64,
        entry_stop: u64,
        entry_offsets: &[u64],
        _branch: Option<&Branch>,
    ) -> Result<Array> {
        let empty = Array::Jagged(JaggedArray::new(vec![0], self.content.empty())?);
        assemble_window(fragments, entry_start, entry_stop, entry_offsets, empty)
    }
}
