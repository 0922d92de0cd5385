// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image preprocessing for the Moondream2 vision encoder
//!
//! The image is squashed (never cropped) to one of four canvas sizes made of
//! 378×378 crops, picked by aspect ratio. Small images always use a single
//! crop.

use candle_core::{DType, Device, Tensor};
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};

/// Side of one SigLIP crop
pub const CROP_SIZE: u32 = 378;

/// Canvas sizes as `(height, width)`
pub const SUPPORTED_SIZES: [(u32, u32); 4] = [(378, 378), (378, 756), (756, 378), (756, 756)];

/// Images whose longest side is below this use a single crop
const MULTI_CROP_MIN_DIM: u32 = 512;

/// Per-channel normalization mean
pub const MEAN: [f32; 3] = [0.5, 0.5, 0.5];

/// Per-channel normalization std
pub const STD: [f32; 3] = [0.5, 0.5, 0.5];

/// Canvas `(width, height)` for an image of the given size
pub fn select_input_size(width: u32, height: u32) -> (u32, u32) {
    if width.max(height) < MULTI_CROP_MIN_DIM {
        return (CROP_SIZE, CROP_SIZE);
    }

    let aspect_ratio = width as f64 / height as f64;
    let key = |&(h, w): &(u32, u32)| {
        (
            (w as f64 / h as f64 - aspect_ratio).abs(),
            h.abs_diff(width) + w.abs_diff(height),
        )
    };
    let (h, w) = SUPPORTED_SIZES
        .iter()
        .copied()
        .min_by(|a, b| {
            key(a)
                .partial_cmp(&key(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or((CROP_SIZE, CROP_SIZE));
    (w, h)
}

/// Resize to the selected canvas with bicubic filtering and convert to RGB
pub fn resize_for_encoder(image: &DynamicImage) -> RgbImage {
    let (width, height) = select_input_size(image.width(), image.height());
    image
        .resize_exact(width, height, FilterType::CatmullRom)
        .to_rgb8()
}

/// Preprocess an image for the Moondream2 encoder
///
/// Steps:
/// 1. Resize to the selected canvas, keeping the whole image
/// 2. Convert HWC bytes to a CHW tensor
/// 3. Normalize: (pixel/255 - mean) / std
///
/// Returns a `[3, H, W]` tensor of `dtype` on `device`, with `H` and `W`
/// multiples of [`CROP_SIZE`].
pub fn preprocess_for_moondream(
    image: &DynamicImage,
    device: &Device,
    dtype: DType,
) -> candle_core::Result<Tensor> {
    let rgb = resize_for_encoder(image);
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);

    let pixels = Tensor::from_vec(rgb.into_raw(), (height, width, 3), &Device::Cpu)?
        .permute((2, 0, 1))?
        .to_dtype(DType::F32)?
        .affine(1.0 / 255.0, 0.0)?;

    let mean = Tensor::new(&MEAN, &Device::Cpu)?.reshape((3, 1, 1))?;
    let std = Tensor::new(&STD, &Device::Cpu)?.reshape((3, 1, 1))?;

    pixels
        .broadcast_sub(&mean)?
        .broadcast_div(&std)?
        .to_device(device)?
        .to_dtype(dtype)
}
