use super::{assemble_window, local_offsets, Interpretation};
use crate::array::Array;
use crate::basket::Basket;
use crate::branch::Branch;
use crate::error::{ReadError, Result};
use std::collections::BTreeMap;

/// Length-prefixed strings: one length byte, or 255 followed by a big-endian
/// `u32` length for long strings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AsStrings {
    header_bytes: usize,
}

impl AsStrings {
    pub fn new() -> Self {
        AsStrings { header_bytes: 0 }
    }

    pub fn with_header_bytes(mut self, header_bytes: usize) -> Self {
        self.header_bytes = header_bytes;
        self
    }

    /// Appends the length-prefixed form of `value` to `out`.
    pub fn encode_into(value: &str, out: &mut Vec<u8>) {
        let len = value.len();
        if len < 255 {
            out.push(len as u8);
        } else {
            out.push(255);
            out.extend_from_slice(&(len as u32).to_be_bytes());
        }
        out.extend_from_slice(value.as_bytes());
    }
}

fn read_string(bytes: &[u8], cursor: &mut usize) -> std::result::Result<String, String> {
    let first = *bytes
        .get(*cursor)
        .ok_or_else(|| format!("missing length byte at {cursor}"))?;
    *cursor += 1;
    let len = if first == 255 {
        let raw = bytes
            .get(*cursor..*cursor + 4)
            .ok_or_else(|| format!("truncated long length at {cursor}"))?;
        *cursor += 4;
        u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize
    } else {
        first as usize
    };
    let raw = bytes
        .get(*cursor..*cursor + len)
        .ok_or_else(|| format!("string of {len} bytes overruns the basket at {cursor}"))?;
    *cursor += len;
    String::from_utf8(raw.to_vec()).map_err(|err| err.to_string())
}

impl Interpretation for AsStrings {
    fn cache_key(&self) -> String {
        format!("AsStrings(header_bytes={})", self.header_bytes)
    }

    fn typename(&self) -> String {
        "char*".to_string()
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

        let mut out = Vec::with_capacity(basket.num_entries() as usize);
        match byte_offsets {
            Some(byte_offsets) => {
                let entries = local_offsets(byte_offsets, key_len, data.len(), branch, basket)?;
                for pair in entries.windows(2) {
                    let mut cursor = self.header_bytes;
                    out.push(read_string(&data[pair[0]..pair[1]], &mut cursor).map_err(malformed)?);
                }
            }
            // without offsets the strings are packed back to back
            None => {
                let mut cursor = 0;
                while cursor < data.len() {
                    cursor += self.header_bytes;
                    out.push(read_string(data, &mut cursor).map_err(malformed)?);
                }
            }
        }
        Ok(Array::Strings(out))
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
            Array::Strings(Vec::new()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_strings_use_four_byte_length() {
        let long = "x".repeat(300);
        let mut bytes = Vec::new();
        AsStrings::encode_into("hi", &mut bytes);
        AsStrings::encode_into(&long, &mut bytes);
        assert_eq!(bytes[0], 2);
        assert_eq!(bytes[3], 255);

        let mut cursor = 0;
        assert_eq!(read_string(&bytes, &mut cursor).unwrap(), "hi");
        assert_eq!(read_string(&bytes, &mut cursor).unwrap(), long);
        assert_eq!(cursor, bytes.len());
    }

    #[test]
    fn truncated_string_is_an_error() {
        let mut cursor = 0;
        assert!(read_string(&[5, b'a', b'b'], &mut cursor).is_err());
    }
}
