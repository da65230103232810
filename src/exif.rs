// This is free and unencumbered software released into the public domain.

use crate::error::CaptureError;
use crate::platform::CaptureMetadata;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Exposure metadata snapshot taken from the total capture result of
/// a still photo, held until the host asks for it to be written out.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ExifData {
    pub exposure_time_ns: Option<i64>,
    pub sensitivity_iso: Option<i32>,
    pub focal_length_mm: Option<f32>,
    pub aperture_f_number: Option<f32>,
    pub timestamp_ns: Option<i64>,
}

impl ExifData {
    pub fn from_capture_result(result: &CaptureMetadata) -> Self {
        Self {
            exposure_time_ns: result.exposure_time_ns,
            sensitivity_iso: result.sensitivity_iso,
            focal_length_mm: result.focal_length_mm,
            aperture_f_number: result.aperture_f_number,
            timestamp_ns: result.timestamp_ns,
        }
    }

    /// Write the snapshot as a JSON document at `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CaptureError> {
        let file =
            File::create(path.as_ref()).map_err(|e| CaptureError::platform("creating exif file", e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| CaptureError::platform("serializing exif data", e))?;
        writer
            .flush()
            .map_err(|e| CaptureError::platform("writing exif file", e))
    }
}
