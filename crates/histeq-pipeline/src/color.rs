//! RGB <-> YCbCr conversion for colour sources.
//!
//! Only the luma plane is equalized; chroma passes through unchanged.
//! The transform is the BT.601 studio-swing integer approximation
//! (Y in 16..=235, Cb/Cr centred on 128), with C-style truncating
//! division.

use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::types::ChromaPlanes;

fn clamp_u8(value: i32) -> u8 {
    u8::try_from(value.clamp(0, 255)).unwrap_or(u8::MAX)
}

/// Convert one RGB pixel to `[Y, Cb, Cr]`.
#[must_use]
pub fn rgb_to_ycbcr([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (i32::from(r), i32::from(g), i32::from(b));
    let y = (66 * r + 129 * g + 25 * b + 128) / 256 + 16;
    let cb = (-38 * r - 74 * g + 112 * b + 128) / 256 + 128;
    let cr = (112 * r - 94 * g - 18 * b + 128) / 256 + 128;
    [clamp_u8(y), clamp_u8(cb), clamp_u8(cr)]
}

/// Convert one `[Y, Cb, Cr]` pixel back to RGB.
#[must_use]
pub fn ycbcr_to_rgb([y, cb, cr]: [u8; 3]) -> [u8; 3] {
    let y = i32::from(y) - 16;
    let cb = i32::from(cb) - 128;
    let cr = i32::from(cr) - 128;
    let r = (298 * y + 409 * cr + 128) / 256;
    let g = (298 * y - 100 * cb - 208 * cr + 128) / 256;
    let b = (298 * y + 516 * cb + 128) / 256;
    [clamp_u8(r), clamp_u8(g), clamp_u8(b)]
}

/// Split an RGB image into its luma plane and chroma planes.
#[must_use]
pub fn split_ycbcr(rgb: &RgbImage) -> (GrayImage, ChromaPlanes) {
    let (width, height) = rgb.dimensions();
    let mut luma = GrayImage::new(width, height);
    let mut cb = GrayImage::new(width, height);
    let mut cr = GrayImage::new(width, height);
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let [py, pcb, pcr] = rgb_to_ycbcr(pixel.0);
        luma.put_pixel(x, y, Luma([py]));
        cb.put_pixel(x, y, Luma([pcb]));
        cr.put_pixel(x, y, Luma([pcr]));
    }
    (luma, ChromaPlanes { cb, cr })
}

/// Recombine a luma plane with chroma planes into an RGB image.
///
/// The planes must share dimensions; pixels outside the chroma planes
/// are treated as neutral chroma.
#[must_use]
pub fn merge_ycbcr(luma: &GrayImage, chroma: &ChromaPlanes) -> RgbImage {
    RgbImage::from_fn(luma.width(), luma.height(), |x, y| {
        let py = luma.get_pixel(x, y).0[0];
        let pcb = chroma.cb.get_pixel_checked(x, y).map_or(128, |p| p.0[0]);
        let pcr = chroma.cr.get_pixel_checked(x, y).map_or(128, |p| p.0[0]);
        Rgb(ycbcr_to_rgb([py, pcb, pcr]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_channel_error(a: [u8; 3], b: [u8; 3]) -> u8 {
        a.iter().zip(b).map(|(&x, y)| x.abs_diff(y)).max().unwrap_or(0)
    }

    #[test]
    fn reference_points() {
        assert_eq!(rgb_to_ycbcr([0, 0, 0]), [16, 128, 128]);
        assert_eq!(rgb_to_ycbcr([255, 255, 255]), [235, 128, 128]);
        assert_eq!(rgb_to_ycbcr([255, 0, 0]), [82, 91, 240]);
        assert_eq!(ycbcr_to_rgb([16, 128, 128]), [0, 0, 0]);
        assert_eq!(ycbcr_to_rgb([235, 128, 128]), [255, 255, 255]);
    }

    #[test]
    fn greys_round_trip_within_one_level() {
        for v in 0..=255u8 {
            let back = ycbcr_to_rgb(rgb_to_ycbcr([v, v, v]));
            assert!(max_channel_error(back, [v, v, v]) <= 1, "grey {v} -> {back:?}");
        }
    }

    #[test]
    fn colours_round_trip_within_quantisation_error() {
        for r in (0..=255u8).step_by(15) {
            for g in (0..=255u8).step_by(15) {
                for b in (0..=255u8).step_by(15) {
                    let back = ycbcr_to_rgb(rgb_to_ycbcr([r, g, b]));
                    assert!(
                        max_channel_error(back, [r, g, b]) <= 6,
                        "{:?} -> {back:?}",
                        [r, g, b],
                    );
                }
            }
        }
    }

    #[test]
    fn split_then_merge_preserves_dimensions_and_colour() {
        let rgb = RgbImage::from_fn(5, 3, |x, y| Rgb([(x * 50) as u8, (y * 80) as u8, 100]));
        let (luma, chroma) = split_ycbcr(&rgb);
        assert_eq!(luma.dimensions(), (5, 3));
        assert_eq!(chroma.cb.dimensions(), (5, 3));
        let merged = merge_ycbcr(&luma, &chroma);
        for (a, b) in rgb.pixels().zip(merged.pixels()) {
            assert!(max_channel_error(a.0, b.0) <= 6);
        }
    }

    #[test]
    fn brighter_luma_brightens_every_channel() {
        let rgb = RgbImage::from_pixel(1, 1, Rgb([90, 120, 60]));
        let (mut luma, chroma) = split_ycbcr(&rgb);
        luma.get_pixel_mut(0, 0).0[0] += 40;
        let out = merge_ycbcr(&luma, &chroma).get_pixel(0, 0).0;
        assert!(out[0] > 90 && out[1] > 120 && out[2] > 60);
    }
}
