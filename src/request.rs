// This is free and unencumbered software released into the public domain.

use crate::frame::{FpsRange, FrameTarget, Rect};
use crate::platform::API_LEVEL_R;

/// Base template a capture request is derived from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestTemplate {
    Preview,
    Record,
    StillCapture,
}

/// Auto-exposure control mode. Flash behavior rides on this control:
/// "flash off" is plain auto-exposure, not exposure off.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AeMode {
    Off,
    On,
    OnAutoFlash,
    OnAlwaysFlash,
    OnAutoFlashRedeye,
    OnExternalFlash,
}

/// Auto-focus control mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AfMode {
    Off,
    Auto,
    Macro,
    ContinuousVideo,
    ContinuousPicture,
    Edof,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AfTrigger {
    #[default]
    Idle,
    Start,
    Cancel,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrecaptureTrigger {
    #[default]
    Idle,
    Start,
    Cancel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureIntent {
    Preview,
    StillCapture,
    VideoRecord,
}

/// Zoom is expressed differently depending on the platform version:
/// either a crop rectangle over the active sensor array, or a direct
/// ratio control.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ZoomControl {
    CropRegion(Rect),
    Ratio(f32),
}

/// A capture configuration. Mutable on our side, snapshot-submitted to
/// the platform; the platform resubmits repeating requests unchanged
/// until replaced.
#[derive(Clone, Debug)]
pub struct CaptureRequest {
    pub template: RequestTemplate,
    pub targets: Vec<FrameTarget>,
    pub ae_mode: AeMode,
    /// Torch rides on the flash control of the request, independent of
    /// the AE mode.
    pub torch_on: bool,
    pub af_mode: AfMode,
    pub af_trigger: AfTrigger,
    pub precapture_trigger: PrecaptureTrigger,
    pub capture_intent: CaptureIntent,
    pub zoom: Option<ZoomControl>,
    pub fps_range: Option<FpsRange>,
}

impl CaptureRequest {
    pub fn new(template: RequestTemplate) -> Self {
        Self {
            template,
            targets: Vec::new(),
            ae_mode: AeMode::On,
            torch_on: false,
            af_mode: AfMode::Off,
            af_trigger: AfTrigger::Idle,
            precapture_trigger: PrecaptureTrigger::Idle,
            capture_intent: match template {
                RequestTemplate::StillCapture => CaptureIntent::StillCapture,
                _ => CaptureIntent::Preview,
            },
            zoom: None,
            fps_range: None,
        }
    }

    pub fn add_target(&mut self, target: FrameTarget) {
        if !self.targets.contains(&target) {
            self.targets.push(target);
        }
    }

    /// Apply a zoom factor in the representation the platform version
    /// understands.
    pub fn apply_zoom(&mut self, api_level: u32, active_array: Rect, zoom_factor: f32) {
        if api_level < API_LEVEL_R {
            self.zoom = Some(ZoomControl::CropRegion(scaler_crop_region(
                active_array,
                zoom_factor,
            )));
        } else {
            self.zoom = Some(ZoomControl::Ratio(zoom_factor));
        }
    }
}

/// Crop rectangle over the active sensor array equivalent to the given
/// zoom factor: the array shrunk by the inverse ratio, centered.
pub fn scaler_crop_region(active_array: Rect, zoom_factor: f32) -> Rect {
    let zoom_ratio = if zoom_factor != 0.0 {
        1.0 / zoom_factor
    } else {
        1.0
    };

    let width = active_array.width();
    let height = active_array.height();
    let cropped_width = width - (width as f32 * zoom_ratio) as i32;
    let cropped_height = height - (height as f32 * zoom_ratio) as i32;
    Rect::new(
        cropped_width / 2,
        cropped_height / 2,
        width - cropped_width / 2,
        height - cropped_height / 2,
    )
}
