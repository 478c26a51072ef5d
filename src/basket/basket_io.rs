use super::Basket;
use crate::branch::Branch;
use crate::error::{ReadError, Result};
use crate::helpers::compressor::{Compression, Compressor};
use crate::source::Chunk;
use serde::{Deserialize, Serialize};

/// Size of the fixed key that precedes every basket body in the source.
pub const BASKET_KEY_SIZE: usize = 64;

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct BasketKey {
    num_entries: u32,
    border: u32,
    has_offsets: bool,
    compression: Compression,
    uncompressed_bytes: u32,
}

/// Lays out one basket as `[key padded to BASKET_KEY_SIZE][compressed body]`.
///
/// The body is the entry payload followed, for variable-length branches, by
/// `num_entries + 1` little-endian `u32` entry boundaries. `byte_offsets` are
/// given relative to the payload and stored relative to the start of the key.
pub fn encode_basket(
    data: &[u8],
    byte_offsets: Option<&[u32]>,
    num_entries: u64,
    compression: Compression,
) -> Result<Vec<u8>> {
    let mut body = Vec::with_capacity(data.len() + byte_offsets.map_or(0, |o| o.len() * 4));
    body.extend_from_slice(data);
    if let Some(offsets) = byte_offsets {
        for offset in offsets {
            body.extend_from_slice(&(offset + BASKET_KEY_SIZE as u32).to_le_bytes());
        }
    }

    let key = BasketKey {
        num_entries: num_entries as u32,
        border: data.len() as u32,
        has_offsets: byte_offsets.is_some(),
        compression,
        uncompressed_bytes: body.len() as u32,
    };
    let key_bytes = bincode::serialize(&key).map_err(|source| ReadError::Deserialization {
        context: "basket key".to_string(),
        source,
    })?;

    // Pad to exact size
    let mut out = vec![0u8; BASKET_KEY_SIZE];
    out[..key_bytes.len()].copy_from_slice(&key_bytes);
    out.extend_from_slice(&Compressor::new().compress(compression, &body));
    Ok(out)
}

/// Decompresses a fetched chunk into the basket `basket_num` of `branch`.
pub(crate) fn decode_basket(chunk: &Chunk, branch: &Branch, basket_num: usize) -> Result<Basket> {
    let malformed = |reason: String| ReadError::MalformedBasket {
        branch: branch.object_path().to_string(),
        basket_num,
        reason,
    };

    if chunk.data.len() < BASKET_KEY_SIZE {
        return Err(malformed(format!(
            "chunk of {} bytes is shorter than the {BASKET_KEY_SIZE}-byte key",
            chunk.data.len()
        )));
    }
    let key: BasketKey = bincode::deserialize(&chunk.data[..BASKET_KEY_SIZE]).map_err(|source| {
        ReadError::Deserialization {
            context: format!("key of basket {basket_num} in {}", branch.object_path()),
            source,
        }
    })?;

    let (entry_start, entry_stop) = branch.basket_entry_start_stop(basket_num)?;
    if u64::from(key.num_entries) != entry_stop - entry_start {
        return Err(malformed(format!(
            "key declares {} entries but the branch expects {}",
            key.num_entries,
            entry_stop - entry_start
        )));
    }

    let body = Compressor::new()
        .decompress(
            key.compression,
            &chunk.data[BASKET_KEY_SIZE..],
            key.uncompressed_bytes as usize,
        )
        .map_err(|reason| ReadError::Decompression {
            branch: branch.object_path().to_string(),
            basket_num,
            reason,
        })?;

    let border = key.border as usize;
    if border > body.len() {
        return Err(malformed(format!(
            "border {border} exceeds body of {} bytes",
            body.len()
        )));
    }
    let byte_offsets = if key.has_offsets {
        let raw = &body[border..];
        let expected = (key.num_entries as usize + 1) * 4;
        if raw.len() != expected {
            return Err(malformed(format!(
                "offsets occupy {} bytes, expected {expected}",
                raw.len()
            )));
        }
        let offsets: Vec<u32> = raw
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        if offsets.last().copied().unwrap_or(0) as usize > border + BASKET_KEY_SIZE {
            return Err(malformed("offsets point past the payload".to_string()));
        }
        Some(offsets)
    } else {
        None
    };

    let mut data = body;
    data.truncate(border);

    Ok(Basket::new(
        branch.cache_key().to_string(),
        basket_num,
        entry_start,
        entry_stop,
        BASKET_KEY_SIZE,
        (chunk.stop - chunk.start).saturating_sub(BASKET_KEY_SIZE as u64),
        data,
        byte_offsets,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_fits_in_fixed_prefix() {
        let key = BasketKey {
            num_entries: u32::MAX,
            border: u32::MAX,
            has_offsets: true,
            compression: Compression::Lz4,
            uncompressed_bytes: u32::MAX,
        };
        let bytes = bincode::serialize(&key).unwrap();
        assert!(bytes.len() <= BASKET_KEY_SIZE);
    }

    #[test]
    fn encoded_basket_starts_with_key() {
        let encoded = encode_basket(&[0, 0, 0, 1], None, 1, Compression::None).unwrap();
        assert_eq!(encoded.len(), BASKET_KEY_SIZE + 4);
        let key: BasketKey = bincode::deserialize(&encoded[..BASKET_KEY_SIZE]).unwrap();
        assert_eq!(key.num_entries, 1);
        assert_eq!(key.border, 4);
        assert!(!key.has_offsets);
    }
}
