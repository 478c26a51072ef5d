pub mod basket_io;

/// One decompressed block of a branch covering entries `[entry_start, entry_stop)`.
///
/// Baskets live only for the duration of one materialization call, or across
/// consecutive iteration steps when their entries straddle a step boundary.
#[derive(Clone, Debug, PartialEq)]
pub struct Basket {
    branch: String,
    basket_num: usize,
    entry_start: u64,
    entry_stop: u64,
    key_len: usize,
    compressed_bytes: u64,
    data: Vec<u8>,
    byte_offsets: Option<Vec<u32>>,
}

impl Basket {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        branch: String,
        basket_num: usize,
        entry_start: u64,
        entry_stop: u64,
        key_len: usize,
        compressed_bytes: u64,
        data: Vec<u8>,
        byte_offsets: Option<Vec<u32>>,
    ) -> Self {
        Basket {
            branch,
            basket_num,
            entry_start,
            entry_stop,
            key_len,
            compressed_bytes,
            data,
            byte_offsets,
        }
    }

    /// A basket that was stored inside the branch metadata instead of the free store.
    ///
    /// Its branch, number and entry range are assigned when the tree is opened.
    pub fn embedded(
        num_entries: u64,
        data: Vec<u8>,
        byte_offsets: Option<Vec<u32>>,
        compressed_bytes: u64,
    ) -> Self {
        Basket {
            branch: String::new(),
            basket_num: 0,
            entry_start: 0,
            entry_stop: num_entries,
            key_len: 0,
            compressed_bytes,
            data,
            byte_offsets,
        }
    }

    pub(crate) fn placed(mut self, branch: &str, basket_num: usize, entry_start: u64) -> Self {
        let num_entries = self.num_entries();
        self.branch = branch.to_string();
        self.basket_num = basket_num;
        self.entry_start = entry_start;
        self.entry_stop = entry_start + num_entries;
        self
    }

    /// Cache key of the owning branch.
    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn basket_num(&self) -> usize {
        self.basket_num
    }

    pub fn num_entries(&self) -> u64 {
        self.entry_stop - self.entry_start
    }

    pub fn entry_start_stop(&self) -> (u64, u64) {
        (self.entry_start, self.entry_stop)
    }

    pub fn key_len(&self) -> usize {
        self.key_len
    }

    pub fn compressed_bytes(&self) -> u64 {
        self.compressed_bytes
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Entry boundaries within `data`, present for variable-length branches.
    pub fn byte_offsets(&self) -> Option<&[u32]> {
        self.byte_offsets.as_deref()
    }
}
