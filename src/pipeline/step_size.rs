//! Converts memory budgets into entry counts for streaming iteration.

use crate::branch::Branch;
use crate::error::{ReadError, Result};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::sync::Arc;
use tracing::debug;

/// Granularity of one iteration step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepSize {
    Entries(u64),
    /// A size with units, such as `"100 MB"` or `"1.5 GiB"`.
    MemorySize(String),
}

impl Default for StepSize {
    fn default() -> Self {
        StepSize::MemorySize("100 MB".to_string())
    }
}

impl From<u64> for StepSize {
    fn from(entries: u64) -> Self {
        StepSize::Entries(entries)
    }
}

impl From<&str> for StepSize {
    fn from(size: &str) -> Self {
        StepSize::MemorySize(size.to_string())
    }
}

impl From<String> for StepSize {
    fn from(size: String) -> Self {
        StepSize::MemorySize(size)
    }
}

static MEMORY_SIZE: Lazy<Option<Regex>> = Lazy::new(|| {
    RegexBuilder::new(r"^\s*([+-]?(\d+(\.\d*)?|\.\d+)(e[+-]?\d+)?)\s*([kmgtpezy]?i?b)\s*$")
        .case_insensitive(true)
        .build()
        .ok()
});

/// Parses `"<number> <unit>"` into bytes. Units are `B`, `kB` to `YB` in
/// powers of 1000 and `KiB` to `YiB` in powers of 1024, in any case.
pub fn memory_size(text: &str) -> Result<u64> {
    let invalid = || ReadError::InvalidStepSize {
        value: text.to_string(),
    };
    let pattern = MEMORY_SIZE.as_ref().ok_or_else(invalid)?;
    let captures = pattern.captures(text).ok_or_else(invalid)?;

    let target: f64 = captures[1].parse().map_err(|_| invalid())?;
    let unit = captures[5].to_ascii_uppercase();
    let (base, power): (f64, i32) = match unit.as_str() {
        "B" => (1.0, 0),
        "IB" => return Err(invalid()),
        _ => {
            let base = if unit.ends_with("IB") { 1024.0 } else { 1000.0 };
            let power = match &unit[..1] {
                "K" => 1,
                "M" => 2,
                "G" => 3,
                "T" => 4,
                "P" => 5,
                "E" => 6,
                "Z" => 7,
                _ => 8,
            };
            (base, power)
        }
    };

    let bytes = target * base.powi(power);
    if !bytes.is_finite() || bytes < 0.0 {
        return Err(invalid());
    }
    Ok(bytes as u64)
}

/// Number of entries whose compressed baskets, summed over `branches`,
/// come closest to `target_bytes`. Never less than 1.
pub fn num_entries_for(
    target_bytes: u64,
    branches: &[Arc<Branch>],
    entry_start: u64,
    entry_stop: u64,
) -> Result<u64> {
    let mut total_bytes = 0u64;
    for branch in branches {
        for (basket_num, pair) in branch.entry_offsets().windows(2).enumerate() {
            if entry_start < pair[1] && pair[0] <= entry_stop {
                total_bytes += branch.basket_compressed_bytes(basket_num)?;
            }
        }
    }

    let total_entries = entry_stop.saturating_sub(entry_start);
    let num_entries = if total_bytes == 0 {
        0
    } else {
        (target_bytes as f64 * total_entries as f64 / total_bytes as f64).round() as u64
    };
    debug!(target_bytes, total_bytes, total_entries, num_entries, "estimated step size");
    Ok(num_entries.max(1))
}

/// Entries per step for either kind of step size.
pub fn regularize_step_size(
    step_size: &StepSize,
    branches: &[Arc<Branch>],
    entry_start: u64,
    entry_stop: u64,
) -> Result<u64> {
    match step_size {
        StepSize::Entries(0) => Err(ReadError::InvalidStepSize {
            value: "0".to_string(),
        }),
        StepSize::Entries(entries) => Ok(*entries),
        StepSize::MemorySize(text) => {
            num_entries_for(memory_size(text)?, branches, entry_start, entry_stop)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_and_binary_units() {
        assert_eq!(memory_size("100 MB").unwrap(), 100_000_000);
        assert_eq!(memory_size("1 kb").unwrap(), 1000);
        assert_eq!(memory_size("2KiB").unwrap(), 2048);
        assert_eq!(memory_size(" 1.5 gib ").unwrap(), 1_610_612_736);
        assert_eq!(memory_size("12 B").unwrap(), 12);
        assert_eq!(memory_size("1e3 B").unwrap(), 1000);
    }

    #[test]
    fn rejects_strings_without_units() {
        for text in ["100", "MB", "ten MB", "5 XB", "5 iB", "-1 kB"] {
            assert!(
                matches!(memory_size(text), Err(ReadError::InvalidStepSize { .. })),
                "{text}"
            );
        }
    }

    #[test]
    fn unit_pattern_is_compiled_once() {
        let first = MEMORY_SIZE.as_ref().map(|re| re as *const Regex);
        assert!(first.is_some());
        for _ in 0..3 {
            memory_size("3 MiB").unwrap();
        }
        assert_eq!(MEMORY_SIZE.as_ref().map(|re| re as *const Regex), first);
    }

    #[test]
    fn zero_entries_is_invalid() {
        assert!(regularize_step_size(&StepSize::Entries(0), &[], 0, 10).is_err());
        assert_eq!(regularize_step_size(&StepSize::Entries(7), &[], 0, 10).unwrap(), 7);
    }

    #[test]
    fn no_bytes_means_one_entry() {
        assert_eq!(num_entries_for(1_000_000, &[], 0, 100).unwrap(), 1);
    }
}
