// This is free and unencumbered software released into the public domain.

use crate::frame::Frame;

/// Callback surface a native host registers with a [`crate::Camera`].
///
/// Events for one device/session arrive in order; nothing is ordered
/// across different devices. All methods default to no-ops so a host
/// only implements the channels it consumes.
pub trait CameraEventHandler: Send + Sync {
    fn on_camera_opened(&self, camera_id: &str) {
        let _ = camera_id;
    }
    fn on_camera_disconnect(&self, camera_id: &str) {
        let _ = camera_id;
    }
    fn on_camera_error(&self, camera_id: &str, error_code: i32) {
        let _ = (camera_id, error_code);
    }
    fn on_capture_session_configured(&self, camera_id: &str) {
        let _ = camera_id;
    }
    fn on_capture_session_configure_failed(&self, camera_id: &str) {
        let _ = camera_id;
    }
    fn on_session_active(&self, camera_id: &str) {
        let _ = camera_id;
    }
    fn on_session_closed(&self, camera_id: &str) {
        let _ = camera_id;
    }
    fn on_capture_session_failed(&self, camera_id: &str, reason: i32, frame_number: i64) {
        let _ = (camera_id, reason, frame_number);
    }
    fn on_frame_available(&self, camera_id: &str, frame: Frame) {
        let _ = (camera_id, frame);
    }
    fn on_photo_available(&self, camera_id: &str, frame: Frame) {
        let _ = (camera_id, frame);
    }
}

/// Callback surface for screen capture, keyed by the caller-supplied
/// numeric session id.
pub trait ScreenEventHandler: Send + Sync {
    fn on_screen_frame_available(&self, frame: Frame, session_id: i64) {
        let _ = (frame, session_id);
    }
    fn on_error_update(&self, message: &str, session_id: i64) {
        let _ = (message, session_id);
    }
}
