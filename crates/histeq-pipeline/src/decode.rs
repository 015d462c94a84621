//! Image decoding into an 8-bit intensity plane.
//!
//! Accepts raw image bytes (whatever the `image` crate can decode) and
//! produces a [`SourceImage`]. Samples are widened to 16 bits first; if
//! any exceeds 255 the whole image is divided down by 257, otherwise the
//! values are kept as they are. Colour sources are split into YCbCr and
//! only Y is handed to the pipeline.

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

use crate::color::split_ycbcr;
use crate::types::{PipelineError, SourceImage};

/// Divisor mapping the 16-bit range onto the 8-bit range exactly.
const WIDE_TO_NARROW: u16 = 257;

/// Decode raw image bytes into a [`SourceImage`].
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<SourceImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    let source = prepare(&img);
    tracing::debug!(
        width = source.luma.width(),
        height = source.luma.height(),
        channels = source.channels,
        bit_depth = source.bit_depth,
        colour = source.chroma.is_some(),
        "decoded source image",
    );
    Ok(source)
}

/// Reduce an already decoded image to its intensity plane (plus chroma
/// for colour images). Alpha is discarded.
#[must_use]
pub fn prepare(img: &DynamicImage) -> SourceImage {
    let color = img.color();
    let channels = color.channel_count();
    let bit_depth = u8::try_from(color.bits_per_pixel() / u16::from(channels.max(1))).unwrap_or(8);

    if color.has_color() {
        let wide = img.to_rgb16();
        let scale = narrowing_divisor(wide.as_raw());
        let rgb = RgbImage::from_fn(wide.width(), wide.height(), |x, y| {
            Rgb(wide.get_pixel(x, y).0.map(|v| narrow(v, scale)))
        });
        let (luma, chroma) = split_ycbcr(&rgb);
        SourceImage {
            luma,
            chroma: Some(chroma),
            channels,
            bit_depth,
        }
    } else {
        let wide = img.to_luma16();
        let scale = narrowing_divisor(wide.as_raw());
        let luma = GrayImage::from_fn(wide.width(), wide.height(), |x, y| {
            Luma([narrow(wide.get_pixel(x, y).0[0], scale)])
        });
        SourceImage {
            luma,
            chroma: None,
            channels,
            bit_depth,
        }
    }
}

fn narrowing_divisor(samples: &[u16]) -> u16 {
    if samples.iter().any(|&v| v > u16::from(u8::MAX)) {
        WIDE_TO_NARROW
    } else {
        1
    }
}

fn narrow(sample: u16, divisor: u16) -> u8 {
    u8::try_from(sample / divisor).unwrap_or(u8::MAX)
}
