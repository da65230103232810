// This is free and unencumbered software released into the public domain.

//! Seam between the coordination logic and the OS capture stack.
//!
//! A host embeds this crate by implementing [`CameraProvider`] (and,
//! for screen capture, `screen::ProjectionProvider`) over whatever
//! platform surface it has. The coordinators never touch the OS
//! directly; they only hold these trait objects. Callback objects the
//! platform would normally deliver through subclassed state/capture
//! callbacks are flattened into the observer traits below and invoked
//! as plain function calls.

use crate::capability::CameraCharacteristics;
use crate::error::CaptureError;
use crate::frame::{Frame, FrameTarget, PixelFormat};
use crate::handler::Handler;
use crate::request::CaptureRequest;
use std::sync::Arc;

/// Auto-focus scan state reported with each capture result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AfState {
    Inactive,
    PassiveScan,
    PassiveFocused,
    ActiveScan,
    FocusedLocked,
    NotFocusedLocked,
    PassiveUnfocused,
}

/// Auto-exposure convergence state reported with each capture result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AeState {
    Inactive,
    Searching,
    Converged,
    Locked,
    FlashRequired,
    Precapture,
}

/// Metadata attached to a (possibly partial) capture result.
///
/// Fields the device does not report stay `None`; the photo-capture
/// routine treats absent AF/AE state as "no convergence reporting on
/// this device".
#[derive(Clone, Copy, Debug, Default)]
pub struct CaptureMetadata {
    pub af_state: Option<AfState>,
    pub ae_state: Option<AeState>,
    pub exposure_time_ns: Option<i64>,
    pub sensitivity_iso: Option<i32>,
    pub focal_length_mm: Option<f32>,
    pub aperture_f_number: Option<f32>,
    pub timestamp_ns: Option<i64>,
}

/// Device open/disconnect/error signals, one channel each.
pub trait DeviceStateObserver: Send + Sync {
    fn on_opened(&self, device: Box<dyn CameraDevice>);
    fn on_disconnected(&self);
    fn on_error(&self, error_code: i32);
}

/// Session configure/active/closed signals.
pub trait SessionStateObserver: Send + Sync {
    fn on_configured(&self, session: Box<dyn CameraSession>);
    fn on_configure_failed(&self);
    fn on_active(&self);
    fn on_closed(&self);
}

/// Per-request capture-result delivery. For a given session the
/// platform invokes these strictly in submission order, on the
/// background handler the request was submitted with.
pub trait CaptureResultObserver: Send + Sync {
    fn on_capture_progressed(&self, result: &CaptureMetadata) {
        let _ = result;
    }
    fn on_capture_completed(&self, result: &CaptureMetadata) {
        let _ = result;
    }
    fn on_capture_failed(&self, reason: i32, frame_number: i64) {
        let _ = (reason, frame_number);
    }
}

/// Listener invoked whenever a reader has a frame ready to acquire.
pub type FrameListener = Arc<dyn Fn() + Send + Sync>;

/// A bounded queue-backed frame sink. At most `max_images` frames may
/// be in flight at once; acquiring past that bound fails with
/// [`CaptureError::ReaderStalled`] until the consumer releases one.
pub trait FrameReader: Send + Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn format(&self) -> PixelFormat;

    /// The sink surface this reader exposes to capture sessions.
    fn target(&self) -> FrameTarget;

    fn set_frame_listener(&self, listener: Option<FrameListener>, handler: &Handler);

    /// Acquire the most recent frame, dropping any older ones.
    /// `Ok(None)` means the queue was empty.
    fn acquire_latest_frame(&self) -> Result<Option<Frame>, CaptureError>;
}

/// An open capture device. At most one live session at a time.
pub trait CameraDevice: Send {
    fn create_capture_session(
        &mut self,
        targets: &[FrameTarget],
        observer: Arc<dyn SessionStateObserver>,
        handler: &Handler,
    ) -> Result<(), CaptureError>;

    fn close(&mut self);
}

/// A configured capture session bound to a set of frame targets.
pub trait CameraSession: Send {
    /// Replace the repeating request. The platform resubmits it until
    /// it is replaced again or the session is closed.
    fn set_repeating_request(
        &mut self,
        request: &CaptureRequest,
        observer: Arc<dyn CaptureResultObserver>,
    ) -> Result<(), CaptureError>;

    /// Submit a single capture alongside the repeating request.
    fn capture(
        &mut self,
        request: &CaptureRequest,
        observer: Arc<dyn CaptureResultObserver>,
    ) -> Result<(), CaptureError>;

    fn close(&mut self);
}

/// The capability provider: static device characteristics plus the
/// ability to open devices and allocate frame readers.
pub trait CameraProvider: Send + Sync {
    fn camera_ids(&self) -> Vec<String>;

    /// Static characteristics for one device, or `None` when the
    /// identifier is unknown or the query was denied.
    fn characteristics(&self, camera_id: &str) -> Option<CameraCharacteristics>;

    /// Platform API level; decides the zoom control mapping.
    fn api_level(&self) -> u32;

    /// Open a device asynchronously. Success, disconnect, and error
    /// are signaled through `observer` on `handler`.
    fn open_camera(
        &self,
        camera_id: &str,
        observer: Arc<dyn DeviceStateObserver>,
        handler: &Handler,
    ) -> Result<(), CaptureError>;

    fn new_frame_reader(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        max_images: usize,
    ) -> Result<Arc<dyn FrameReader>, CaptureError>;
}

/// First API level with the direct zoom-ratio control. Older devices
/// zoom by cropping the active sensor rectangle instead.
pub const API_LEVEL_R: u32 = 30;
