//! Back-projection: rewrite every sample through the lookup table.

use image::GrayImage;

use crate::bins::{BinCount, bin_index};
use crate::device::{BufferId, ComputeDevice, DeviceError, KernelArg, KernelLaunch};
use crate::kernels::Kernel;
use crate::normalize::LookupTable;
use crate::profiling::StageProfiler;

/// Enqueue `back_project`: `output[k] = lut[bin(input[k])]`, one work
/// item per sample.
///
/// # Errors
///
/// Returns a [`DeviceError`] if the launch is rejected.
pub fn enqueue<D: ComputeDevice + ?Sized>(
    device: &mut D,
    input: BufferId,
    output: BufferId,
    lut: BufferId,
    samples: usize,
    bins: BinCount,
    profiler: &mut StageProfiler,
) -> Result<(), DeviceError> {
    profiler.observe(device.enqueue_kernel(&KernelLaunch {
        kernel: Kernel::BackProject,
        args: &[
            KernelArg::Buffer(input),
            KernelArg::Buffer(output),
            KernelArg::Buffer(lut),
            KernelArg::Scalar(bins.get()),
        ],
        global: samples,
        local: None,
    })?);
    Ok(())
}

/// Apply `lut` to `image` on the host.
#[must_use]
pub fn apply(image: &GrayImage, lut: &LookupTable, bins: BinCount) -> GrayImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        pixel.0[0] = lut.level(bin_index(pixel.0[0], bins.get()));
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::device::{BufferDesc, ElementType, HostDevice, MemAccess};

    #[test]
    fn device_matches_host_application() {
        let bins = BinCount::resolve(32);
        let lut = LookupTable::new((0..32).map(|i| i * 8).collect());
        let image = GrayImage::from_fn(17, 5, |x, y| image::Luma([((x * 15 + y * 3) % 256) as u8]));

        let mut device = HostDevice::new();
        device.build_program().unwrap();
        let samples = image.as_raw().len();
        let desc = |label: &'static str, element, len| BufferDesc {
            label,
            access: MemAccess::ReadWrite,
            element,
            len,
        };
        let input = device.create_buffer(&desc("input", ElementType::U8, samples)).unwrap();
        let output = device.create_buffer(&desc("output", ElementType::U8, samples)).unwrap();
        let table = device.create_buffer(&desc("lut", ElementType::U32, bins.len())).unwrap();
        device.write_u8(input, image.as_raw()).unwrap();
        device.write_u32(table, lut.levels()).unwrap();

        let mut profiler = StageProfiler::new("Back-projection");
        enqueue(&mut device, input, output, table, samples, bins, &mut profiler).unwrap();
        let mut out = vec![0; samples];
        device.read_u8(output, &mut out).unwrap();

        assert_eq!(out, apply(&image, &lut, bins).into_raw());
    }

    #[test]
    fn identity_table_at_full_resolution_is_identity() {
        let bins = BinCount::MAX;
        let lut = LookupTable::new((0..256).collect());
        let image = GrayImage::from_fn(16, 16, |x, y| image::Luma([(y * 16 + x) as u8]));
        assert_eq!(apply(&image, &lut, bins), image);
    }
}
