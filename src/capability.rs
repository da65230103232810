// This is free and unencumbered software released into the public domain.

use crate::controls::FlashMode;
use crate::frame::{FpsRange, PixelFormat, Rect, Size};
use crate::platform::{CameraProvider, API_LEVEL_R};
use crate::request::{AeMode, AfMode};
use derive_more::Display;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, Weak};

/// Which way the lens points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LensFacing {
    #[default]
    Front,
    Back,
    External,
}

/// Static characteristics of one capture device, fetched once per
/// device lifetime and cached by identifier.
#[derive(Clone, Debug, Default)]
pub struct CameraCharacteristics {
    pub sensor_orientation: i32,
    pub lens_facing: LensFacing,
    pub fps_ranges: Vec<FpsRange>,
    /// Reported on API >= 30 only.
    pub zoom_ratio_range: Option<(f32, f32)>,
    pub max_digital_zoom: f32,
    pub active_array: Rect,
    pub af_modes: Vec<AfMode>,
    pub ae_modes: Vec<AeMode>,
    /// `None` when setting focus distance is not supported at all;
    /// `Some(0.0)` signals a fixed-focus lens.
    pub min_focus_distance: Option<f32>,
    pub flash_available: bool,
    pub stream_sizes: Vec<(PixelFormat, Size)>,
}

/// Host-facing focus mode names. Only modes the binding actually
/// implements appear here.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum FocusMode {
    #[display("FocusModeAuto")]
    Auto,
    #[display("FocusModeManual")]
    Manual,
}

/// 4K resolution; stream configurations above this pixel count are
/// filtered out of size queries.
pub const MAX_STREAM_PIXELS: u64 = 3840 * 2160;

/// Sentinel for scalar queries the device does not support.
pub const UNSUPPORTED: f32 = -1.0;

/// Capability queries over cached per-device characteristics.
///
/// The cache holds weak references: a record stays cached only while
/// some other part of the binding still holds it, and dead entries are
/// swept on the next insert.
pub struct DeviceManager {
    provider: Arc<dyn CameraProvider>,
    cache: Mutex<HashMap<String, Weak<CameraCharacteristics>>>,
}

impl DeviceManager {
    pub fn new(provider: Arc<dyn CameraProvider>) -> Self {
        Self {
            provider,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn camera_ids(&self) -> Vec<String> {
        self.provider.camera_ids()
    }

    pub fn characteristics(&self, camera_id: &str) -> Option<Arc<CameraCharacteristics>> {
        let Ok(mut cache) = self.cache.lock() else {
            return None;
        };

        if let Some(record) = cache.get(camera_id).and_then(Weak::upgrade) {
            return Some(record);
        }

        let record = Arc::new(self.provider.characteristics(camera_id)?);
        cache.retain(|_, entry| entry.strong_count() > 0);
        cache.insert(camera_id.to_owned(), Arc::downgrade(&record));
        Some(record)
    }

    pub fn sensor_orientation(&self, camera_id: &str) -> i32 {
        self.characteristics(camera_id)
            .map(|c| c.sensor_orientation)
            .unwrap_or(0)
    }

    pub fn lens_facing(&self, camera_id: &str) -> LensFacing {
        self.characteristics(camera_id)
            .map(|c| c.lens_facing)
            .unwrap_or_default()
    }

    pub fn fps_ranges(&self, camera_id: &str) -> Vec<FpsRange> {
        self.characteristics(camera_id)
            .map(|c| c.fps_ranges.clone())
            .unwrap_or_default()
    }

    /// Minimum and maximum zoom factor. `(1.0, 1.0)` when nothing is
    /// known. The zoom-ratio range only exists on API >= 30; when it
    /// is absent or degenerate the maximum digital zoom applies.
    pub fn zoom_range(&self, camera_id: &str) -> (f32, f32) {
        let mut range = (1.0_f32, 1.0_f32);
        let Some(characteristics) = self.characteristics(camera_id) else {
            return range;
        };

        if self.provider.api_level() >= API_LEVEL_R {
            if let Some((lower, upper)) = characteristics.zoom_ratio_range {
                range = (lower, upper);
            }
        }

        if range.1 == 1.0 {
            range.1 = characteristics.max_digital_zoom;
        }
        range
    }

    pub fn active_array_size(&self, camera_id: &str) -> Rect {
        self.characteristics(camera_id)
            .map(|c| c.active_array)
            .unwrap_or_default()
    }

    /// Output sizes for one pixel format, capped at 4K by pixel count.
    pub fn stream_configuration_sizes(&self, camera_id: &str, format: PixelFormat) -> Vec<Size> {
        let Some(characteristics) = self.characteristics(camera_id) else {
            return Vec::new();
        };

        characteristics
            .stream_sizes
            .iter()
            .filter(|(f, size)| *f == format && size.pixels() <= MAX_STREAM_PIXELS)
            .map(|(_, size)| *size)
            .collect()
    }

    /// All AF modes the physical device exposes, implemented or not.
    pub fn all_available_af_modes(&self, camera_id: &str) -> Vec<AfMode> {
        if camera_id.is_empty() {
            return Vec::new();
        }
        self.characteristics(camera_id)
            .map(|c| c.af_modes.clone())
            .unwrap_or_default()
    }

    /// An AF mode is supported only when the device reports it AND the
    /// binding has a working implementation for it: continuous-picture
    /// always, off only on lenses whose focus distance can actually be
    /// adjusted.
    pub fn is_af_mode_supported(&self, camera_id: &str, af_mode: AfMode) -> bool {
        if camera_id.is_empty() {
            return false;
        }

        let available = self.all_available_af_modes(camera_id).contains(&af_mode);
        if !available {
            return false;
        }

        match af_mode {
            AfMode::ContinuousPicture => true,
            AfMode::Off => self.is_manual_focus_distance_supported(camera_id),
            _ => false,
        }
    }

    pub fn supported_focus_modes(&self, camera_id: &str) -> Vec<FocusMode> {
        let mut modes = Vec::new();
        if self.is_af_mode_supported(camera_id, AfMode::ContinuousPicture) {
            modes.push(FocusMode::Auto);
        }
        if self.is_af_mode_supported(camera_id, AfMode::Off)
            && self.is_manual_focus_distance_supported(camera_id)
        {
            modes.push(FocusMode::Manual);
        }
        modes
    }

    pub fn supported_flash_modes(&self, camera_id: &str) -> Vec<&'static str> {
        let Some(characteristics) = self.characteristics(camera_id) else {
            return Vec::new();
        };

        characteristics
            .ae_modes
            .iter()
            .map(|mode| FlashMode::name_for_ae_mode(*mode))
            .collect()
    }

    /// Minimum focus distance in diopters. `0.0` signals a fixed-focus
    /// lens, [`UNSUPPORTED`] a device with no focus distance control.
    pub fn min_focus_distance(&self, camera_id: &str) -> f32 {
        self.characteristics(camera_id)
            .and_then(|c| c.min_focus_distance)
            .unwrap_or(UNSUPPORTED)
    }

    pub fn is_manual_focus_distance_supported(&self, camera_id: &str) -> bool {
        self.min_focus_distance(camera_id) > 0.0
    }

    pub fn is_torch_mode_supported(&self, camera_id: &str) -> bool {
        self.characteristics(camera_id)
            .map(|c| c.flash_available)
            .unwrap_or(false)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodecKind {
    Decoder,
    Encoder,
}

/// One entry from the platform codec list.
#[derive(Clone, Debug)]
pub struct CodecInfo {
    pub name: String,
    pub is_encoder: bool,
    /// MIME types, e.g. `video/avc`.
    pub mime_types: Vec<String>,
}

/// Platform codec enumeration.
pub trait CodecProvider: Send + Sync {
    fn codec_infos(&self) -> Vec<CodecInfo>;
}

/// Software codecs carry the `omx.google.` or `c2.android.` vendor
/// prefixes; names outside the `omx.`/`c2.` namespaces are software
/// implementations as well.
pub fn is_software_codec(codec_name: &str) -> bool {
    let name = codec_name.to_lowercase();
    name.starts_with("omx.google.")
        || name.starts_with("c2.android.")
        || !(name.starts_with("omx.") || name.starts_with("c2."))
}

/// Video subtype names (the part after `video/`) of all hardware
/// codecs of the requested kind.
pub fn hw_video_codecs(provider: &dyn CodecProvider, kind: CodecKind) -> Vec<String> {
    let mut codecs = BTreeSet::new();
    for info in provider.codec_infos() {
        let matches_kind = match kind {
            CodecKind::Encoder => info.is_encoder,
            CodecKind::Decoder => !info.is_encoder,
        };
        if !matches_kind || is_software_codec(&info.name) {
            continue;
        }
        for mime in &info.mime_types {
            if let Some(subtype) = mime.strip_prefix("video/") {
                codecs.insert(subtype.to_owned());
            }
        }
    }
    codecs.into_iter().collect()
}
