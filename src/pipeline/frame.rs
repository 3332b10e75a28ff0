use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use image::RgbaImage;

use crate::types::{CameraFrame, Resolution};

/// Mirrors a camera frame horizontally and scales it to `target`.
pub fn prepare_capture_frame(frame: &CameraFrame, target: Resolution) -> Result<RgbaImage> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len || expected_len == 0 {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }

    let mut image = if (frame.width, frame.height) == (target.width, target.height) {
        RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone())
            .ok_or_else(|| anyhow!("failed to build RGBA image from frame"))?
    } else {
        resize_rgba(&frame.rgba, frame.width, frame.height, target)?
    };
    image::imageops::flip_horizontal_in_place(&mut image);
    Ok(image)
}

fn resize_rgba(rgba: &[u8], width: u32, height: u32, target: Resolution) -> Result<RgbaImage> {
    let src_image = fir::images::Image::from_vec_u8(width, height, rgba.to_vec(), fir::PixelType::U8x4)?;
    let mut dst_image = fir::images::Image::new(target.width, target.height, fir::PixelType::U8x4);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;

    RgbaImage::from_raw(target.width, target.height, dst_image.into_vec())
        .ok_or_else(|| anyhow!("resized buffer does not match {}x{}", target.width, target.height))
}

/// Wraps a prepared image back into a frame for the detector.
pub fn to_camera_frame(image: &RgbaImage, source: &CameraFrame) -> CameraFrame {
    CameraFrame {
        rgba: image.as_raw().clone(),
        width: image.width(),
        height: image.height(),
        timestamp: source.timestamp,
    }
}
