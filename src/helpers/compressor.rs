use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use serde::{Deserialize, Serialize};

/// Block compression applied to a basket body.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    None,
    #[default]
    Lz4,
}

/*
thin wrapper over the codec; baskets record which one they were written with
*/
#[derive(Clone, Copy, Debug, Default)]
pub struct Compressor {}

impl Compressor {
    pub fn new() -> Self {
        Compressor {}
    }

    pub fn compress(&self, compression: Compression, payload: &[u8]) -> Vec<u8> {
        match compression {
            Compression::None => payload.to_vec(),
            Compression::Lz4 => compress_prepend_size(payload),
        }
    }

    /// Returns the uncompressed body, or a description of why it could not be produced.
    pub fn decompress(
        &self,
        compression: Compression,
        body: &[u8],
        expected_len: usize,
    ) -> Result<Vec<u8>, String> {
        let bytes = match compression {
            Compression::None => body.to_vec(),
            Compression::Lz4 => {
                if body.is_empty() {
                    Vec::new()
                } else {
                    decompress_size_prepended(body).map_err(|err| err.to_string())?
                }
            }
        };
        if bytes.len() != expected_len {
            return Err(format!(
                "uncompressed size {} does not match declared size {expected_len}",
                bytes.len()
            ));
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lz4_round_trip_preserves_payload() {
        let compressor = Compressor::new();
        let payload: Vec<u8> = (0..4096u32).flat_map(|v| (v % 17).to_be_bytes()).collect();
        let body = compressor.compress(Compression::Lz4, &payload);
        assert!(body.len() < payload.len());
        let restored = compressor
            .decompress(Compression::Lz4, &body, payload.len())
            .unwrap();
        assert_eq!(restored, payload);
    }

    #[test]
    fn declared_size_mismatch_is_reported() {
        let compressor = Compressor::new();
        let body = compressor.compress(Compression::None, &[1, 2, 3]);
        let err = compressor
            .decompress(Compression::None, &body, 4)
            .unwrap_err();
        assert!(err.contains("does not match"));
    }

    #[test]
    fn truncated_lz4_body_fails() {
        let compressor = Compressor::new();
        let body = compressor.compress(Compression::Lz4, &[7u8; 256]);
        assert!(compressor
            .decompress(Compression::Lz4, &body[..body.len() / 2], 256)
            .is_err());
    }
}
