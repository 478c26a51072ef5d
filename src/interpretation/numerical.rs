use super::{assemble_window, Interpretation};
use crate::array::Array;
use crate::basket::Basket;
use crate::branch::Branch;
use crate::error::{ReadError, Result};
use std::collections::BTreeMap;

/// Fixed-width big-endian item types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dtype {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl Dtype {
    pub fn itemsize(self) -> usize {
        match self {
            Dtype::Bool => 1,
            Dtype::Int32 | Dtype::Float32 => 4,
            Dtype::Int64 | Dtype::Float64 => 8,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Dtype::Bool => "?",
            Dtype::Int32 => ">i4",
            Dtype::Int64 => ">i8",
            Dtype::Float32 => ">f4",
            Dtype::Float64 => ">f8",
        }
    }

    pub fn typename(self) -> &'static str {
        match self {
            Dtype::Bool => "bool",
            Dtype::Int32 => "int32_t",
            Dtype::Int64 => "int64_t",
            Dtype::Float32 => "float",
            Dtype::Float64 => "double",
        }
    }

    pub fn empty(self) -> Array {
        match self {
            Dtype::Bool => Array::Bool(Vec::new()),
            Dtype::Int32 => Array::Int32(Vec::new()),
            Dtype::Int64 => Array::Int64(Vec::new()),
            Dtype::Float32 => Array::Float32(Vec::new()),
            Dtype::Float64 => Array::Float64(Vec::new()),
        }
    }

    /// Decodes a whole number of items; the caller checks the length.
    pub fn decode(self, bytes: &[u8]) -> Array {
        let items = bytes.chunks_exact(self.itemsize());
        match self {
            Dtype::Bool => Array::Bool(items.map(|b| b[0] != 0).collect()),
            Dtype::Int32 => Array::Int32(
                items
                    .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
                    .collect(),
            ),
            Dtype::Int64 => Array::Int64(
                items
                    .map(|b| i64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                    .collect(),
            ),
            Dtype::Float32 => Array::Float32(
                items
                    .map(|b| f32::from_be_bytes([b[0], b[1], b[2], b[3]]))
                    .collect(),
            ),
            Dtype::Float64 => Array::Float64(
                items
                    .map(|b| f64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                    .collect(),
            ),
        }
    }

    /// Serializes an array of this type; `None` if the array holds another type.
    pub fn encode(self, array: &Array) -> Option<Vec<u8>> {
        let bytes = match (self, array) {
            (Dtype::Bool, Array::Bool(v)) => v.iter().map(|b| u8::from(*b)).collect(),
            (Dtype::Int32, Array::Int32(v)) => v.iter().flat_map(|x| x.to_be_bytes()).collect(),
            (Dtype::Int64, Array::Int64(v)) => v.iter().flat_map(|x| x.to_be_bytes()).collect(),
            (Dtype::Float32, Array::Float32(v)) => v.iter().flat_map(|x| x.to_be_bytes()).collect(),
            (Dtype::Float64, Array::Float64(v)) => v.iter().flat_map(|x| x.to_be_bytes()).collect(),
            _ => return None,
        };
        Some(bytes)
    }
}

/// One fixed-width value per entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AsDtype {
    dtype: Dtype,
}

impl AsDtype {
    pub fn new(dtype: Dtype) -> Self {
        AsDtype { dtype }
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }
}

impl Interpretation for AsDtype {
    fn cache_key(&self) -> String {
        format!("AsDtype({})", self.dtype.code())
    }

    fn typename(&self) -> String {
        self.dtype.typename().to_string()
    }

    fn basket_array(
        &self,
        data: &[u8],
        _byte_offsets: Option<&[u32]>,
        basket: &Basket,
        branch: &Branch,
        _key_len: usize,
    ) -> Result<Array> {
        let itemsize = self.dtype.itemsize();
        if data.len() % itemsize != 0 {
            return Err(ReadError::MalformedBasket {
                branch: branch.object_path().to_string(),
                basket_num: basket.basket_num(),
                reason: format!(
                    "{} bytes is not a multiple of the {itemsize}-byte item size",
                    data.len()
                ),
            });
        }
        Ok(self.dtype.decode(data))
    }

    fn final_array(
        &self,
        fragments: &BTreeMap<usize, Array>,
        entry_start: u64,
        entry_stop: u64,
        entry_offsets: &[u64],
        _branch: Option<&Branch>,
    ) -> Result<Array> {
        assemble_window(
            fragments,
            entry_start,
            entry_stop,
            entry_offsets,
            self.dtype.empty(),
        )
    }
}
