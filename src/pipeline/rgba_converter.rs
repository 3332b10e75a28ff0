//! Camera pixel formats to tightly packed RGBA8.

use std::convert::TryFrom;

use anyhow::{Result, anyhow};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelLayout {
    Nv12,
    Yuyv,
    Mjpeg,
    Rgb,
    Bgr,
    Gray,
}

#[derive(Debug)]
pub struct RgbaFrame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[cfg(feature = "camera-nokhwa")]
pub fn convert_camera_frame(frame: &nokhwa::Buffer) -> Result<RgbaFrame> {
    use nokhwa::utils::FrameFormat;

    let resolution = frame.resolution();
    let layout = match frame.source_frame_format() {
        FrameFormat::NV12 => PixelLayout::Nv12,
        FrameFormat::YUYV => PixelLayout::Yuyv,
        FrameFormat::MJPEG => PixelLayout::Mjpeg,
        FrameFormat::RAWRGB => PixelLayout::Rgb,
        FrameFormat::RAWBGR => PixelLayout::Bgr,
        FrameFormat::GRAY => PixelLayout::Gray,
    };
    convert(
        frame.buffer(),
        resolution.width_x,
        resolution.height_y,
        layout,
    )
}

pub fn convert(data: &[u8], width: u32, height: u32, layout: PixelLayout) -> Result<RgbaFrame> {
    let (rgba, width, height) = match layout {
        PixelLayout::Nv12 => (nv12_to_rgba(data, width, height)?, width, height),
        PixelLayout::Yuyv => (yuyv_to_rgba(data, width, height)?, width, height),
        // MJPEG carries its own dimensions; trust the bitstream over the driver.
        PixelLayout::Mjpeg => mjpeg_to_rgba(data)?,
        PixelLayout::Rgb => (packed_to_rgba(data, width, height, 3, false)?, width, height),
        PixelLayout::Bgr => (packed_to_rgba(data, width, height, 3, true)?, width, height),
        PixelLayout::Gray => (packed_to_rgba(data, width, height, 1, false)?, width, height),
    };

    Ok(RgbaFrame {
        rgba,
        width,
        height,
    })
}

fn check_len(label: &str, data: &[u8], expected: usize) -> Result<()> {
    if data.len() < expected {
        return Err(anyhow!(
            "{label} buffer too small: got {}, expected {expected}",
            data.len()
        ));
    }
    Ok(())
}

fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let y_plane_len = width as usize * height as usize;
    let uv_plane_len = y_plane_len / 2;
    check_len("NV12", data, y_plane_len + uv_plane_len)?;

    let mut rgba = vec![0u8; y_plane_len * 4];
    let image = YuvBiPlanarImage {
        y_plane: &data[..y_plane_len],
        y_stride: width,
        uv_plane: &data[y_plane_len..y_plane_len + uv_plane_len],
        uv_stride: width,
        width,
        height,
    };

    yuv_nv12_to_rgba(
        &image,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12→RGBA failed: {err:?}"))?;

    Ok(rgba)
}

fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    check_len("YUYV", data, width as usize * height as usize * 2)?;

    let mut rgba = vec![0u8; width as usize * height as usize * 4];
    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };

    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV422→RGBA failed: {err:?}"))?;

    Ok(rgba)
}

fn mjpeg_to_rgba(data: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;

    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("MJPEG decoder reported no image info"))?;
    let width = u32::from(info.width);
    let height = u32::from(info.height);
    let expected_len = usize::try_from(width)
        .and_then(|w| usize::try_from(height).map(|h| w * h * 4))
        .map_err(|_| anyhow!("MJPEG dimensions do not fit usize"))?;
    check_len("MJPEG", &rgba, expected_len)?;

    Ok((rgba, width, height))
}

/// Expands 1- or 3-channel packed pixels to RGBA.
fn packed_to_rgba(
    data: &[u8],
    width: u32,
    height: u32,
    channels: usize,
    swap_rb: bool,
) -> Result<Vec<u8>> {
    let pixels = width as usize * height as usize;
    let label = match (channels, swap_rb) {
        (1, _) => "GRAY",
        (_, true) => "BGR",
        _ => "RGB",
    };
    check_len(label, data, pixels * channels)?;

    let mut rgba = vec![0u8; pixels * 4];
    rgba.par_chunks_mut(4)
        .zip(data[..pixels * channels].par_chunks_exact(channels))
        .for_each(|(dst, src)| {
            let (r, g, b) = match (src, swap_rb) {
                ([v], _) => (*v, *v, *v),
                ([b, g, r], true) => (*r, *g, *b),
                ([r, g, b], false) => (*r, *g, *b),
                _ => (0, 0, 0),
            };
            dst.copy_from_slice(&[r, g, b, 255]);
        });

    Ok(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgr_swaps_red_and_blue() {
        let frame = convert(&[10, 20, 30, 40, 50, 60], 2, 1, PixelLayout::Bgr).unwrap();
        assert_eq!(frame.rgba, [30, 20, 10, 255, 60, 50, 40, 255]);
    }

    #[test]
    fn gray_is_replicated_across_channels() {
        let frame = convert(&[7, 200], 1, 2, PixelLayout::Gray).unwrap();
        assert_eq!(frame.rgba, [7, 7, 7, 255, 200, 200, 200, 255]);
        assert_eq!((frame.width, frame.height), (1, 2));
    }

    #[test]
    fn short_buffers_are_rejected() {
        let err = convert(&[1, 2, 3], 2, 2, PixelLayout::Rgb).unwrap_err();
        assert!(err.to_string().contains("RGB buffer too small"));
        assert!(convert(&[0; 4], 2, 2, PixelLayout::Nv12).is_err());
        assert!(convert(&[0; 4], 2, 2, PixelLayout::Yuyv).is_err());
    }

    #[test]
    fn garbage_jpeg_fails() {
        assert!(convert(&[0xde, 0xad, 0xbe, 0xef], 4, 4, PixelLayout::Mjpeg).is_err());
    }
}
