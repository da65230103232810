// This is free and unencumbered software released into the public domain.

use bytes::Bytes;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Yuv420,
    Jpeg,
    Rgba8,
}

/// A decoded image buffer handed back from a capture session or a
/// virtual display. The payload is reference-counted so it can be
/// forwarded to the host without copying.
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub pixel_format: PixelFormat,
    /// Presentation timestamp in nanoseconds, when the platform
    /// reports one.
    pub timestamp_ns: Option<i64>,
}

impl Frame {
    pub fn new(data: Bytes, width: u32, height: u32, stride: u32, pixel_format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            stride,
            pixel_format,
            timestamp_ns: None,
        }
    }
}

/// Opaque identifier for a frame-sink surface a capture session can
/// draw into. Assigned by the provider when a reader is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameTarget(pub u64);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// Inclusive target frame-rate range for the repeating request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FpsRange {
    pub min: i32,
    pub max: i32,
}

impl FpsRange {
    pub fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }
}
