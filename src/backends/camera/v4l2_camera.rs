// SPDX-License-Identifier: GPL-3.0-only

//! Direct V4L2 capture for the station camera
//!
//! Uses the v4l crate with memory-mapped buffers. Frames are copied out of
//! the driver buffer and converted to packed RGB before they are handed to
//! the preview loop, so no driver memory outlives one `capture_array` call.

use super::types::*;
use super::{Camera, v4l2_controls};
use crate::errors::CameraError;
use image::RgbImage;
use std::time::Duration;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Number of mmap buffers queued with the driver
const BUFFER_COUNT: u32 = 4;

/// Longest wait for a single frame before the capture counts as failed
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(2);

/// Format the driver actually agreed to
#[derive(Debug, Clone, Copy)]
struct NegotiatedFormat {
    resolution: Resolution,
    pixel_format: PixelFormat,
    stride: usize,
}

/// Camera backed by a V4L2 video node
pub struct V4l2Camera {
    device_path: String,
    device: Option<Device>,
    stream: Option<MmapStream<'static>>,
    format: Option<NegotiatedFormat>,
    closed: bool,
}

impl V4l2Camera {
    /// Open the video node without touching its format
    pub fn open(device_path: &str) -> CameraResult<Self> {
        let device = Device::with_path(device_path)
            .map_err(|e| CameraError::OpenFailed(format!("{}: {}", device_path, e)))?;

        info!(device_path, "Opened V4L2 camera");

        Ok(Self {
            device_path: device_path.to_string(),
            device: Some(device),
            stream: None,
            format: None,
            closed: false,
        })
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    fn device(&self) -> CameraResult<&Device> {
        if self.closed {
            return Err(CameraError::Closed);
        }
        self.device.as_ref().ok_or(CameraError::Closed)
    }
}

impl Camera for V4l2Camera {
    fn configure(&mut self, resolution: Resolution, format: PixelFormat) -> CameraResult<()> {
        let device = self.device()?;

        let mut requested = device
            .format()
            .map_err(|e| CameraError::ConfigureFailed(format!("Failed to query format: {}", e)))?;
        requested.width = resolution.width;
        requested.height = resolution.height;
        requested.fourcc = FourCC::new(&format.fourcc());

        let actual = device
            .set_format(&requested)
            .map_err(|e| CameraError::ConfigureFailed(format!("Failed to set format: {}", e)))?;

        let pixel_format = PixelFormat::from_fourcc(&actual.fourcc.repr).ok_or_else(|| {
            CameraError::UnsupportedFormat(String::from_utf8_lossy(&actual.fourcc.repr).to_string())
        })?;

        if pixel_format != format {
            warn!(
                requested = %format,
                actual = %pixel_format,
                "Driver picked a different pixel format, converting in software"
            );
        }

        let negotiated = Resolution::new(actual.width, actual.height);
        if negotiated != resolution {
            warn!(
                requested = %resolution,
                actual = %negotiated,
                "Driver adjusted the capture resolution"
            );
        }

        let stride = if actual.stride > 0 {
            actual.stride as usize
        } else {
            actual.width as usize * pixel_format.bytes_per_pixel().unwrap_or(0)
        };

        info!(resolution = %negotiated, format = %pixel_format, stride, "Camera configured");

        self.format = Some(NegotiatedFormat {
            resolution: negotiated,
            pixel_format,
            stride,
        });
        Ok(())
    }

    fn start(&mut self) -> CameraResult<()> {
        if self.format.is_none() {
            return Err(CameraError::NotConfigured);
        }
        if self.stream.is_some() {
            return Ok(());
        }

        let device = self.device()?;
        let mut stream = MmapStream::with_buffers(device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| {
                CameraError::StartFailed(format!("Failed to create buffer stream: {}", e))
            })?;
        stream.set_timeout(CAPTURE_TIMEOUT);

        self.stream = Some(stream);
        info!(device_path = %self.device_path, "Camera streaming started");
        Ok(())
    }

    fn set_controls(&mut self, controls: &CameraControls) -> CameraResult<()> {
        self.device()?;
        v4l2_controls::apply_autofocus(&self.device_path, controls)
    }

    fn capture_array(&mut self) -> CameraResult<RawFrame> {
        let format = self.format.ok_or(CameraError::NotConfigured)?;
        let stream = self.stream.as_mut().ok_or(CameraError::NotStarted)?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        let used = match meta.bytesused as usize {
            0 => buf.len(),
            n => n.min(buf.len()),
        };

        let image = convert_to_rgb(
            &buf[..used],
            format.resolution,
            format.stride,
            format.pixel_format,
        )?;

        Ok(RawFrame::new(image, meta.sequence))
    }

    fn stop(&mut self) {
        if self.stream.take().is_some() {
            debug!(device_path = %self.device_path, "Camera streaming stopped");
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.stop();
        self.device = None;
        self.closed = true;
        info!(device_path = %self.device_path, "Camera closed");
    }
}

impl Drop for V4l2Camera {
    fn drop(&mut self) {
        self.close();
    }
}

/// Enumerate V4L2 nodes that can capture video
pub fn enumerate_devices() -> Vec<DeviceInfo> {
    let mut devices: Vec<DeviceInfo> = v4l::context::enum_devices()
        .into_iter()
        .filter_map(|node| {
            let path = node.path().to_string_lossy().to_string();
            let device = Device::with_path(&path).ok()?;
            let caps = device.query_caps().ok()?;
            if !caps
                .capabilities
                .contains(v4l::capability::Flags::VIDEO_CAPTURE)
            {
                debug!(path, "Skipping non-capture node");
                return None;
            }
            Some(DeviceInfo {
                card: caps.card,
                driver: caps.driver,
                path,
            })
        })
        .collect();
    devices.sort_by(|a, b| a.path.cmp(&b.path));
    devices
}

/// Pixel formats the driver advertises, as FourCC strings
pub fn supported_formats(device_path: &str) -> Vec<String> {
    let Ok(device) = Device::with_path(device_path) else {
        return Vec::new();
    };
    device
        .enum_formats()
        .map(|formats| {
            formats
                .iter()
                .map(|f| {
                    let code = String::from_utf8_lossy(&f.fourcc.repr).to_string();
                    match PixelFormat::from_fourcc(&f.fourcc.repr) {
                        Some(_) => code,
                        None => format!("{} (unsupported)", code),
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Convert a driver buffer to packed RGB
pub fn convert_to_rgb(
    data: &[u8],
    resolution: Resolution,
    stride: usize,
    format: PixelFormat,
) -> CameraResult<RgbImage> {
    let width = resolution.width as usize;
    let height = resolution.height as usize;

    if format == PixelFormat::Mjpeg {
        let decoded = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
            .map_err(|e| CameraError::CaptureFailed(format!("MJPEG decode failed: {}", e)))?
            .to_rgb8();
        return Ok(decoded);
    }

    let bpp = format.bytes_per_pixel().unwrap_or(3);
    let row_bytes = width * bpp;
    let stride = stride.max(row_bytes);

    if height > 0 && data.len() < stride * (height - 1) + row_bytes {
        return Err(CameraError::CaptureFailed(format!(
            "Short buffer: {} bytes for {} {}",
            data.len(),
            resolution,
            format
        )));
    }

    let mut rgb = Vec::with_capacity(width * height * 3);

    for y in 0..height {
        let row = &data[y * stride..y * stride + row_bytes];
        match format {
            PixelFormat::Rgb24 => rgb.extend_from_slice(row),
            PixelFormat::Bgr24 => {
                for px in row.chunks_exact(3) {
                    rgb.extend_from_slice(&[px[2], px[1], px[0]]);
                }
            }
            PixelFormat::Yuyv => {
                // Y0 U Y1 V: two pixels share chroma
                for pair in row.chunks_exact(4) {
                    let (u, v) = (pair[1], pair[3]);
                    let (r, g, b) = yuv_to_rgb(pair[0], u, v);
                    rgb.extend_from_slice(&[r, g, b]);
                    let (r, g, b) = yuv_to_rgb(pair[2], u, v);
                    rgb.extend_from_slice(&[r, g, b]);
                }
            }
            PixelFormat::Mjpeg => unreachable!("handled above"),
        }
    }

    RgbImage::from_raw(resolution.width, resolution.height, rgb).ok_or_else(|| {
        CameraError::CaptureFailed(format!("Frame data does not match {}", resolution))
    })
}

/// Convert YUV (BT.601) to RGB
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;

    let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
    let g = (y - 0.344136 * u - 0.714136 * v).clamp(0.0, 255.0) as u8;
    let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;

    (r, g, b)
}
