//! Bin count resolution and the sample-to-bin mapping.
//!
//! Every histogram array in a run has exactly [`BinCount`] entries. The
//! count is always one of [`BinCount::CANONICAL`]; arbitrary requests are
//! coerced rather than rejected so the pipeline is always runnable.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of histogram bins for one pipeline run.
///
/// Always a power of two in `8..=256`, which the tree-based scans rely
/// on. Construct via [`resolve`](Self::resolve) or
/// [`parse`](Self::parse); both coerce instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "i64", into = "u32")]
pub struct BinCount(u32);

impl BinCount {
    /// The canonical bin counts, ascending.
    pub const CANONICAL: [u32; 6] = [8, 16, 32, 64, 128, 256];

    /// Smallest canonical bin count.
    pub const MIN: Self = Self(8);

    /// Largest canonical bin count (one bin per 8-bit intensity).
    pub const MAX: Self = Self(256);

    /// Coerce a requested bin count to the canonical set.
    ///
    /// Requests below 8 (including zero and negatives) become 8, requests
    /// above 256 become 256, and everything in between rounds up to the
    /// next canonical value.
    #[must_use]
    pub fn resolve(requested: i64) -> Self {
        Self::CANONICAL
            .iter()
            .copied()
            .find(|&bins| i64::from(bins) >= requested)
            .map_or(Self::MAX, Self)
    }

    /// Coerce a textual bin-count request.
    ///
    /// Anything that does not parse as an integer falls back to
    /// [`BinCount::MIN`].
    #[must_use]
    pub fn parse(requested: &str) -> Self {
        match requested.trim().parse::<i64>() {
            Ok(value) => Self::resolve(value),
            Err(_) => {
                tracing::warn!(requested, "unparseable bin count, using {}", Self::MIN);
                Self::MIN
            }
        }
    }

    /// The bin count as an integer.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The bin count as an array length.
    #[must_use]
    pub const fn len(self) -> usize {
        self.0 as usize
    }

    /// Always `false`; present for symmetry with [`len`](Self::len).
    #[must_use]
    pub const fn is_empty(self) -> bool {
        false
    }

    /// Number of tree levels a work-efficient scan walks (`log2(bins)`).
    #[must_use]
    pub const fn levels(self) -> u32 {
        self.0.trailing_zeros()
    }
}

impl Default for BinCount {
    fn default() -> Self {
        Self::MAX
    }
}

impl From<i64> for BinCount {
    fn from(requested: i64) -> Self {
        Self::resolve(requested)
    }
}

impl From<BinCount> for u32 {
    fn from(bins: BinCount) -> Self {
        bins.0
    }
}

impl fmt::Display for BinCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Map an 8-bit sample to its bin: `floor(sample * bins / 256)`.
///
/// The result is clamped to `bins - 1` so the boundary sample 255 can
/// never index past the end, whatever `bins` is.
#[must_use]
pub const fn bin_index(sample: u8, bins: u32) -> usize {
    let bin = (sample as u32 * bins) >> 8;
    if bin >= bins {
        bins.saturating_sub(1) as usize
    } else {
        bin as usize
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn resolve_table() {
        let cases = [
            (0, 8),
            (5, 8),
            (8, 8),
            (9, 16),
            (16, 16),
            (17, 32),
            (100, 128),
            (128, 128),
            (129, 256),
            (256, 256),
            (300, 256),
            (-1, 8),
            (i64::MIN, 8),
            (i64::MAX, 256),
        ];
        for (requested, expected) in cases {
            assert_eq!(
                BinCount::resolve(requested).get(),
                expected,
                "resolve({requested})",
            );
        }
    }

    #[test]
    fn parse_numeric_text() {
        assert_eq!(BinCount::parse("64").get(), 64);
        assert_eq!(BinCount::parse(" 65 ").get(), 128);
        assert_eq!(BinCount::parse("-3").get(), 8);
    }

    #[test]
    fn parse_garbage_defaults_to_min() {
        assert_eq!(BinCount::parse("lots"), BinCount::MIN);
        assert_eq!(BinCount::parse(""), BinCount::MIN);
        assert_eq!(BinCount::parse("12.5"), BinCount::MIN);
    }

    #[test]
    fn every_canonical_value_is_a_power_of_two() {
        for bins in BinCount::CANONICAL {
            assert!(bins.is_power_of_two());
            assert_eq!(BinCount::resolve(i64::from(bins)).get(), bins);
        }
    }

    #[test]
    fn levels_is_log2() {
        assert_eq!(BinCount::resolve(8).levels(), 3);
        assert_eq!(BinCount::resolve(256).levels(), 8);
    }

    #[test]
    fn bin_index_downscales() {
        assert_eq!(bin_index(0, 8), 0);
        assert_eq!(bin_index(31, 8), 0);
        assert_eq!(bin_index(32, 8), 1);
        assert_eq!(bin_index(255, 8), 7);
        assert_eq!(bin_index(255, 256), 255);
        assert_eq!(bin_index(128, 256), 128);
    }

    #[test]
    fn bin_index_clamps_for_non_canonical_counts() {
        // Not reachable through BinCount, but the kernel helper must
        // stay in bounds for any positive count.
        assert!(bin_index(255, 3) < 3);
        assert_eq!(bin_index(255, 1), 0);
    }

    #[test]
    fn serde_coerces_on_deserialize() {
        let bins: BinCount = serde_json::from_str("100").unwrap();
        assert_eq!(bins.get(), 128);
        let bins: BinCount = serde_json::from_str("-7").unwrap();
        assert_eq!(bins.get(), 8);
        assert_eq!(serde_json::to_string(&BinCount::MAX).unwrap(), "256");
    }
}
