//! Property-based tests for the device stages.
//!
//! Random intensity planes are pushed through every histogram strategy
//! and scan algorithm; the invariants below must hold for all of them.

#![allow(clippy::unwrap_used)]

use proptest::collection::vec as prop_vec;
use proptest::prelude::*;

use histeq_pipeline::{
    BinCount, CumulativeHistogram, EqualizationResult, EqualizeConfig, Histogram,
    HistogramStrategy, HostDevice, ScanAlgorithm, ScanConvention, SourceImage, equalize_source,
};
use image::GrayImage;

fn arb_bins() -> impl Strategy<Value = BinCount> {
    prop::sample::select(BinCount::CANONICAL.to_vec()).prop_map(|b| BinCount::resolve(i64::from(b)))
}

fn arb_config() -> impl Strategy<Value = EqualizeConfig> {
    (
        arb_bins(),
        prop::sample::select(HistogramStrategy::ALL.to_vec()),
        prop::sample::select(ScanAlgorithm::ALL.to_vec()),
    )
        .prop_map(|(bins, histogram, scan)| EqualizeConfig {
            bins,
            histogram,
            scan,
        })
}

/// A plane with width in `1..=64` and up to 48 rows.
fn arb_plane() -> impl Strategy<Value = GrayImage> {
    (1u32..=64, 0u32..=48).prop_flat_map(|(width, height)| {
        prop_vec(any::<u8>(), (width * height) as usize)
            .prop_map(move |samples| GrayImage::from_raw(width, height, samples).unwrap())
    })
}

fn run(plane: &GrayImage, config: &EqualizeConfig) -> EqualizationResult {
    equalize_source(HostDevice::new(), SourceImage::from_luma(plane.clone()), config).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn histogram_counts_every_sample(plane in arb_plane(), config in arb_config()) {
        let result = run(&plane, &config);
        prop_assert_eq!(result.histogram.len(), config.bins.len());
        prop_assert_eq!(result.histogram.total(), plane.as_raw().len() as u64);
        prop_assert_eq!(&result.histogram, &Histogram::from_samples(plane.as_raw(), config.bins));
    }

    #[test]
    fn scan_matches_its_convention(plane in arb_plane(), config in arb_config()) {
        let result = run(&plane, &config);
        let cumulative = &result.cumulative;
        let counts = result.histogram.counts();
        let values = cumulative.values();

        prop_assert!(cumulative.is_monotonic());
        prop_assert_eq!(cumulative.total(&result.histogram), plane.as_raw().len() as u64);
        match cumulative.convention() {
            ScanConvention::Inclusive => {
                prop_assert_eq!(u64::from(*values.last().unwrap()), result.histogram.total());
                for i in 1..values.len() {
                    prop_assert_eq!(values[i], values[i - 1] + counts[i]);
                }
            }
            ScanConvention::Exclusive => {
                prop_assert_eq!(values[0], 0);
                for i in 1..values.len() {
                    prop_assert_eq!(values[i], values[i - 1] + counts[i - 1]);
                }
            }
        }
    }

    #[test]
    fn scan_algorithms_agree(plane in arb_plane(), bins in arb_bins()) {
        let expected = CumulativeHistogram::from_histogram(
            &Histogram::from_samples(plane.as_raw(), bins),
            ScanConvention::Inclusive,
        );
        for scan in ScanAlgorithm::ALL {
            let config = EqualizeConfig { bins, scan, ..EqualizeConfig::default() };
            let result = run(&plane, &config);
            prop_assert_eq!(result.cumulative.to_inclusive(&result.histogram), expected.clone());
        }
    }

    #[test]
    fn histogram_strategies_agree(plane in arb_plane(), bins in arb_bins()) {
        let [naive, grouped] = HistogramStrategy::ALL.map(|histogram| {
            run(&plane, &EqualizeConfig { bins, histogram, ..EqualizeConfig::default() }).histogram
        });
        prop_assert_eq!(naive, grouped);
    }

    #[test]
    fn lookup_table_is_monotonic_and_bounded(plane in arb_plane(), config in arb_config()) {
        let result = run(&plane, &config);
        prop_assert!(result.lut.is_monotonic());
        prop_assert!(result.lut.levels().iter().all(|&level| level <= 255));
        let inclusive = result.cumulative.convention() == ScanConvention::Inclusive;
        if inclusive && !plane.as_raw().is_empty() {
            prop_assert_eq!(*result.lut.levels().last().unwrap(), 255);
        }
    }

    #[test]
    fn equalization_preserves_intensity_order(plane in arb_plane(), config in arb_config()) {
        let result = run(&plane, &config);
        prop_assert_eq!(result.equalized.dimensions(), plane.dimensions());
        let mut pairs: Vec<(u8, u8)> = plane
            .pixels()
            .zip(result.equalized.pixels())
            .map(|(a, b)| (a.0[0], b.0[0]))
            .collect();
        pairs.sort_unstable();
        prop_assert!(pairs.windows(2).all(|w| w[0].1 <= w[1].1));
    }
}
