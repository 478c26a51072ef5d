use super::Interpretation;
use crate::array::Array;
use crate::basket::Basket;
use crate::branch::Branch;
use crate::error::{ReadError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A struct-like value synthesized from the sub-branches of one branch.
///
/// Grouped branches hold no data of their own; their sub-branches are read
/// and combined into a record array after the pipeline has run.
#[derive(Clone, Debug)]
pub struct AsGrouped {
    subbranches: Vec<(String, Arc<dyn Interpretation>)>,
}

impl AsGrouped {
    pub fn new(subbranches: Vec<(String, Arc<dyn Interpretation>)>) -> Self {
        AsGrouped { subbranches }
    }

    pub fn subbranches(&self) -> &[(String, Arc<dyn Interpretation>)] {
        &self.subbranches
    }

    fn unsupported(&self, operation: &'static str) -> ReadError {
        ReadError::UnsupportedInterpretation {
            interpretation: self.cache_key(),
            operation,
        }
    }
}

impl Interpretation for AsGrouped {
    fn cache_key(&self) -> String {
        let fields: Vec<String> = self
            .subbranches
            .iter()
            .map(|(name, interpretation)| format!("{name}:{}", interpretation.cache_key()))
            .collect();
        format!("AsGrouped({})", fields.join(","))
    }

    fn typename(&self) -> String {
        let fields: Vec<String> = self
            .subbranches
            .iter()
            .map(|(name, interpretation)| format!("{} {name}", interpretation.typename()))
            .collect();
        format!("struct {{{}}}", fields.join("; "))
    }

    fn as_grouped(&self) -> Option<&AsGrouped> {
        Some(self)
    }

    fn basket_array(
        &self,
        _data: &[u8],
        _byte_offsets: Option<&[u32]>,
        _basket: &Basket,
        _branch: &Branch,
        _key_len: usize,
    ) -> Result<Array> {
        Err(self.unsupported("basket_array"))
    }

    fn final_array(
        &self,
        _fragments: &BTreeMap<usize, Array>,
        _entry_start: u64,
        _entry_stop: u64,
        _entry_offsets: &[u64],
        _branch: Option<&Branch>,
    ) -> Result<Array> {
        Err(self.unsupported("final_array"))
    }
}

/// Stands in for branches whose type has no decoding strategy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownInterpretation {
    typename: String,
}

impl UnknownInterpretation {
    pub fn new(typename: impl Into<String>) -> Self {
        UnknownInterpretation {
            typename: typename.into(),
        }
    }
}

impl Interpretation for UnknownInterpretation {
    fn cache_key(&self) -> String {
        format!("UnknownInterpretation({})", self.typename)
    }

    fn typename(&self) -> String {
        self.typename.clone()
    }

    fn is_unknown(&self) -> bool {
        true
    }

    fn basket_array(
        &self,
        _data: &[u8],
        _byte_offsets: Option<&[u32]>,
        _basket: &Basket,
        _branch: &Branch,
        _key_len: usize,
    ) -> Result<Array> {
        Err(ReadError::UnsupportedInterpretation {
            interpretation: self.cache_key(),
            operation: "basket_array",
        })
    }

    fn final_array(
        &self,
        _fragments: &BTreeMap<usize, Array>,
        _entry_start: u64,
        _entry_stop: u64,
        _entry_offsets: &[u64],
        _branch: Option<&Branch>,
    ) -> Result<Array> {
        Err(ReadError::UnsupportedInterpretation {
            interpretation: self.cache_key(),
            operation: "final_array",
        })
    }
}
