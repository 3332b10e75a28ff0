use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::{CameraFrame, NUM_LANDMARKS};

/// Handpose estimator input edge length.
pub const INPUT_SIZE: u32 = 224;
/// Palm detector input edge length.
pub const PALM_INPUT_SIZE: u32 = 192;

#[derive(Clone, Debug)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

/// Maps handpose crop coordinates back onto the source frame.
#[derive(Clone, Debug)]
pub struct CropTransform {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
    pub output_size: u32,
    pub orig_w: u32,
    pub orig_h: u32,
}

fn check_frame(frame: &CameraFrame) -> Result<()> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }
    Ok(())
}

/// Letterboxes the frame into a `target_size` square NHWC tensor in [0,1].
pub fn letterbox_tensor(frame: &CameraFrame, target_size: u32) -> Result<(Array4<f32>, LetterboxInfo)> {
    check_frame(frame)?;

    let scale = target_size as f32 / (frame.width.max(frame.height) as f32);
    let new_w = ((frame.width as f32 * scale).round() as u32).clamp(1, target_size);
    let new_h = ((frame.height as f32 * scale).round() as u32).clamp(1, target_size);

    let src = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src, &mut dst, Some(&options))
        .context("fast resize failed")?;
    let resized = dst.into_vec();

    let side = target_size as usize;
    let pad_x = (side - new_w as usize) / 2;
    let pad_y = (side - new_h as usize) / 2;

    // Padding stays black; only the resized region is filled.
    let mut data = vec![0f32; side * side * 3];
    data.par_chunks_mut(side * 3)
        .enumerate()
        .skip(pad_y)
        .take(new_h as usize)
        .for_each(|(row, out)| {
            let src_row = &resized[(row - pad_y) * new_w as usize * 4..][..new_w as usize * 4];
            for (col, px) in src_row.chunks_exact(4).enumerate() {
                let o = (pad_x + col) * 3;
                out[o] = px[0] as f32 / 255.0;
                out[o + 1] = px[1] as f32 / 255.0;
                out[o + 2] = px[2] as f32 / 255.0;
            }
        });

    let input = Array4::from_shape_vec((1, side, side, 3), data)
        .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    let letterbox = LetterboxInfo {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    Ok((input, letterbox))
}

/// Samples a rotated square around `center` into an `output_size` NHWC tensor.
pub fn rotated_crop_tensor(
    frame: &CameraFrame,
    center: (f32, f32),
    side: f32,
    angle: f32,
    output_size: u32,
) -> Result<(Array4<f32>, CropTransform)> {
    check_frame(frame)?;

    let transform = CropTransform {
        center,
        side,
        angle,
        output_size,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    let size = output_size as usize;
    let mut data = vec![0f32; size * size * 3];
    data.par_chunks_mut(size * 3).enumerate().for_each(|(y, row)| {
        for x in 0..size {
            let (sx, sy) = transform.to_source(x as f32 + 0.5, y as f32 + 0.5);
            row[x * 3..x * 3 + 3].copy_from_slice(&sample_rgb(frame, sx, sy));
        }
    });

    let array = Array4::from_shape_vec((1, size, size, 3), data)
        .map_err(|err| anyhow!("failed to build rotated crop tensor: {err}"))?;

    Ok((array, transform))
}

pub fn decode_landmarks(flat: &[f32]) -> Result<Vec<[f32; 3]>> {
    if flat.len() < NUM_LANDMARKS * 3 {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            NUM_LANDMARKS * 3
        ));
    }

    Ok(flat
        .chunks_exact(3)
        .take(NUM_LANDMARKS)
        .map(|c| [c[0], c[1], c[2]])
        .collect())
}

impl CropTransform {
    /// Crop pixel position → unclamped source pixel position.
    fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.output_size as f32 / 2.0;
        let scale = self.side / self.output_size as f32;
        let dx = (x - half) * scale;
        let dy = (y - half) * scale;
        let (sin, cos) = self.angle.sin_cos();
        (
            self.center.0 + dx * cos - dy * sin,
            self.center.1 + dx * sin + dy * cos,
        )
    }

    /// Crop-space landmark → normalized source-frame landmark.
    ///
    /// `x`/`y` are clamped to the frame; `z` is scaled like `x` and expressed
    /// relative to the frame width.
    pub fn normalize(&self, [x, y, z]: [f32; 3]) -> [f32; 3] {
        let (sx, sy) = self.to_source(x, y);
        let w = self.orig_w.max(1) as f32;
        let h = self.orig_h.max(1) as f32;
        let scale = self.side / self.output_size as f32;
        [
            (sx / w).clamp(0.0, 1.0),
            (sy / h).clamp(0.0, 1.0),
            z * scale / w,
        ]
    }
}

fn sample_rgb(frame: &CameraFrame, x: f32, y: f32) -> [f32; 3] {
    if !x.is_finite() || !y.is_finite() {
        return [0.0; 3];
    }
    // Pixel centers sit at +0.5.
    let x = x - 0.5;
    let y = y - 0.5;
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let (w, h) = (frame.width as i64, frame.height as i64);
    let fetch = |cx: f32, cy: f32| -> [f32; 3] {
        let (ix, iy) = (cx as i64, cy as i64);
        if ix < 0 || iy < 0 || ix >= w || iy >= h {
            return [0.0; 3];
        }
        let idx = ((iy * w + ix) as usize) * 4;
        match frame.rgba.get(idx..idx + 3) {
            Some(px) => [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ],
            None => [0.0; 3],
        }
    };

    let c00 = fetch(x0, y0);
    let c10 = fetch(x0 + 1.0, y0);
    let c01 = fetch(x0, y0 + 1.0);
    let c11 = fetch(x0 + 1.0, y0 + 1.0);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    std::array::from_fn(|c| lerp(lerp(c00[c], c10[c], fx), lerp(c01[c], c11[c], fx), fy))
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> CameraFrame {
        CameraFrame {
            rgba: [rgb[0], rgb[1], rgb[2], 255].repeat((width * height) as usize),
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn letterbox_pads_the_short_side() {
        let frame = solid_frame(64, 32, [255, 255, 255]);
        let (input, info) = letterbox_tensor(&frame, 32).unwrap();
        assert_eq!(input.shape(), &[1, 32, 32, 3]);
        assert_eq!(info.pad_x, 0.0);
        assert_eq!(info.pad_y, 8.0);
        assert_eq!(input[[0, 0, 0, 0]], 0.0);
        assert!((input[[0, 16, 16, 0]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn identity_crop_normalizes_to_frame_space() {
        let transform = CropTransform {
            center: (50.0, 25.0),
            side: 100.0,
            angle: 0.0,
            output_size: 100,
            orig_w: 100,
            orig_h: 50,
        };
        let [x, y, z] = transform.normalize([50.0, 50.0, 10.0]);
        assert!((x - 0.5).abs() < 1e-6);
        assert!((y - 0.5).abs() < 1e-6);
        assert!((z - 0.1).abs() < 1e-6);

        let [x, y, _] = transform.normalize([-500.0, 900.0, 0.0]);
        assert_eq!((x, y), (0.0, 1.0));
    }

    #[test]
    fn crop_samples_source_colors() {
        let frame = solid_frame(16, 16, [0, 255, 0]);
        let (crop, _) = rotated_crop_tensor(&frame, (8.0, 8.0), 8.0, 0.3, 4).unwrap();
        assert!((crop[[0, 2, 2, 1]] - 1.0).abs() < 1e-4);
        assert_eq!(crop[[0, 2, 2, 0]], 0.0);
    }

    #[test]
    fn decode_requires_63_values() {
        assert!(decode_landmarks(&[0.0; 62]).is_err());
        let decoded = decode_landmarks(&(0..63).map(|v| v as f32).collect::<Vec<_>>()).unwrap();
        assert_eq!(decoded.len(), NUM_LANDMARKS);
        assert_eq!(decoded[20], [60.0, 61.0, 62.0]);
    }
}
