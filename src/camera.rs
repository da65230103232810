// This is free and unencumbered software released into the public domain.

use crate::capability::DeviceManager;
use crate::controls::{ControlState, FlashMode};
use crate::error::CaptureError;
use crate::events::CameraEventHandler;
use crate::exif::ExifData;
use crate::frame::{FpsRange, FrameTarget, PixelFormat};
use crate::handler::{BackgroundThread, Handler};
use crate::photo::{advance, PhotoAction, PhotoCaptureState};
use crate::platform::{
    CameraDevice, CameraProvider, CameraSession, CaptureMetadata, CaptureResultObserver,
    DeviceStateObserver, FrameReader, SessionStateObserver,
};
use crate::request::{AfMode, AfTrigger, CaptureIntent, CaptureRequest, PrecaptureTrigger, RequestTemplate};
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, warn};

/// Bound on frames a reader may hold in flight at once.
pub const MAX_IN_FLIGHT_FRAMES: usize = 12;

/// Backoff before retrying a stalled frame acquisition once.
pub const FRAME_RETRY_DELAY: Duration = Duration::from_millis(500);

struct CameraState {
    controls: ControlState,
    camera_id: String,
    device: Option<Box<dyn CameraDevice>>,
    session: Option<Box<dyn CameraSession>>,
    preview_request: Option<CaptureRequest>,
    targets: Vec<FrameTarget>,
    preview_reader: Option<Arc<dyn FrameReader>>,
    photo_reader: Option<Arc<dyn FrameReader>>,
    fps_range: Option<FpsRange>,
    exif: Option<ExifData>,
}

struct CameraInner {
    provider: Arc<dyn CameraProvider>,
    manager: DeviceManager,
    events: Arc<dyn CameraEventHandler>,
    handler: Handler,
    // Everything shared between the host thread and the background
    // capture-processing thread lives under this one lock.
    state: Mutex<CameraState>,
    // The photo-capture routine state. Mutated from the background
    // thread and, for the initial trigger, from `take_photo()`; the
    // host externally serializes those, so this intentionally stays
    // outside the state lock.
    photo_state: AtomicU8,
}

/// Owns a capture device, its active session, and the repeating
/// preview request; runs the still-photo capture routine. Constructed
/// over a host-supplied [`CameraProvider`] and event handler.
pub struct Camera {
    inner: Arc<CameraInner>,
    background: Mutex<BackgroundThread>,
}

impl Camera {
    pub fn new(provider: Arc<dyn CameraProvider>, events: Arc<dyn CameraEventHandler>) -> Self {
        let background = BackgroundThread::start("camera-background");
        let inner = Arc::new(CameraInner {
            manager: DeviceManager::new(Arc::clone(&provider)),
            provider,
            events,
            handler: background.handler(),
            state: Mutex::new(CameraState {
                controls: ControlState::default(),
                camera_id: String::new(),
                device: None,
                session: None,
                preview_request: None,
                targets: Vec::new(),
                preview_reader: None,
                photo_reader: None,
                fps_range: None,
                exif: None,
            }),
            photo_state: AtomicU8::new(PhotoCaptureState::Preview.as_u8()),
        });
        Self {
            inner,
            background: Mutex::new(background),
        }
    }

    /// Capability queries for this camera stack.
    pub fn device_manager(&self) -> &DeviceManager {
        &self.inner.manager
    }

    /// Open a device asynchronously; success, disconnect, and error
    /// arrive through the event handler.
    pub fn open(&self, camera_id: &str) -> bool {
        self.inner.open(camera_id)
    }

    /// Allocate the preview and still-photo frame readers and record
    /// the requested frame-rate bounds for the repeating request.
    pub fn prepare_camera(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        min_fps: i32,
        max_fps: i32,
    ) {
        self.inner.add_image_readers(width, height, format);
        self.inner.set_frame_rate(min_fps, max_fps);
    }

    /// Register an additional frame-sink surface for the session.
    pub fn add_target(&self, target: FrameTarget) -> bool {
        if let Ok(mut state) = self.inner.state.lock() {
            if state.targets.contains(&target) {
                return true;
            }
            state.targets.push(target);
            return true;
        }
        false
    }

    pub fn remove_target(&self, target: FrameTarget) -> bool {
        if let Ok(mut state) = self.inner.state.lock() {
            if let Some(index) = state.targets.iter().position(|t| *t == target) {
                state.targets.remove(index);
                return true;
            }
        }
        false
    }

    pub fn clear_targets(&self) {
        if let Ok(mut state) = self.inner.state.lock() {
            state.targets.clear();
        }
    }

    /// Create a capture session over the registered targets. Fails if
    /// no device is open.
    pub fn create_session(&self) -> bool {
        self.inner.create_session()
    }

    /// Build the repeating preview request from the current control
    /// values and start repeating capture.
    pub fn start(&self, template: RequestTemplate) -> bool {
        self.inner.start(template)
    }

    /// Close the session and the device and forget the target list.
    /// Safe to call any number of times.
    pub fn stop_and_close(&self) {
        self.inner.stop_and_close();
    }

    /// Begin a still-photo capture. With continuous autofocus active
    /// this starts the focus/exposure calibration routine on the
    /// repeating request; otherwise the photo is captured immediately.
    ///
    /// Calls must be serialized by the host; the routine state is not
    /// guarded against concurrent triggers.
    pub fn take_photo(&self) {
        self.inner.take_photo();
    }

    /// Write the metadata of the most recent still capture to `path`.
    pub fn save_exif_to_file(&self, path: impl AsRef<Path>) -> bool {
        self.inner.save_exif_to_file(path.as_ref())
    }

    /// Apply a zoom factor. Before `start()` the value is only
    /// recorded and applied when the preview request is built.
    pub fn zoom_to(&self, factor: f32) {
        self.inner.zoom_to(factor);
    }

    /// Set the flash mode by host-facing name. Unknown names are
    /// reported and ignored.
    pub fn set_flash_mode(&self, mode_name: &str) {
        self.inner.set_flash_mode(mode_name);
    }

    pub fn set_torch_mode(&self, torch_on: bool) {
        self.inner.set_torch_mode(torch_on);
    }

    /// Restore the control properties to their default values.
    pub fn reset_control_properties(&self) {
        if let Ok(mut state) = self.inner.state.lock() {
            state.controls.reset_controls();
        }
    }

    /// Stop the background processing context. Bounded; pending
    /// callbacks are drained first.
    pub fn stop_background_thread(&self) {
        if let Ok(mut background) = self.background.lock() {
            background.quit_safely();
        }
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        self.stop_and_close();
        self.stop_background_thread();
    }
}

impl CameraInner {
    fn photo_state(&self) -> PhotoCaptureState {
        PhotoCaptureState::from_u8(self.photo_state.load(Ordering::Relaxed))
    }

    fn set_photo_state(&self, state: PhotoCaptureState) {
        self.photo_state.store(state.as_u8(), Ordering::Relaxed);
    }

    fn open(self: &Arc<Self>, camera_id: &str) -> bool {
        if let Ok(mut state) = self.state.lock() {
            state.camera_id = camera_id.to_owned();
        }

        let observer: Arc<dyn DeviceStateObserver> = Arc::new(DeviceObserver(Arc::clone(self)));
        match self
            .provider
            .open_camera(camera_id, observer, &self.handler)
        {
            Ok(()) => true,
            Err(e) => {
                warn!(camera_id, error = %e, "failed to open camera");
                false
            },
        }
    }

    fn add_image_readers(self: &Arc<Self>, width: u32, height: u32, format: PixelFormat) {
        let (preview_reader, photo_reader) = {
            let preview = self
                .provider
                .new_frame_reader(width, height, format, MAX_IN_FLIGHT_FRAMES);
            let photo = self
                .provider
                .new_frame_reader(width, height, format, MAX_IN_FLIGHT_FRAMES);
            match (preview, photo) {
                (Ok(p), Ok(c)) => (p, c),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(error = %e, "failed to allocate frame readers");
                    return;
                },
            }
        };

        let weak = Arc::downgrade(self);
        let reader = Arc::downgrade(&preview_reader);
        preview_reader.set_frame_listener(
            Some(Arc::new(move || {
                if let (Some(inner), Some(reader)) = (weak.upgrade(), reader.upgrade()) {
                    inner.handle_preview_frame(&reader);
                }
            })),
            &self.handler,
        );

        let weak = Arc::downgrade(self);
        let reader = Arc::downgrade(&photo_reader);
        photo_reader.set_frame_listener(
            Some(Arc::new(move || {
                if let (Some(inner), Some(reader)) = (weak.upgrade(), reader.upgrade()) {
                    inner.handle_photo_frame(&reader);
                }
            })),
            &self.handler,
        );

        if let Ok(mut state) = self.state.lock() {
            if let Some(old) = state.preview_reader.take() {
                let target = old.target();
                state.targets.retain(|t| *t != target);
            }
            if let Some(old) = state.photo_reader.take() {
                let target = old.target();
                state.targets.retain(|t| *t != target);
            }

            let preview_target = preview_reader.target();
            let photo_target = photo_reader.target();
            state.preview_reader = Some(preview_reader);
            state.photo_reader = Some(photo_reader);
            if !state.targets.contains(&preview_target) {
                state.targets.push(preview_target);
            }
            if !state.targets.contains(&photo_target) {
                state.targets.push(photo_target);
            }
        }
    }

    fn set_frame_rate(&self, min_fps: i32, max_fps: i32) {
        if let Ok(mut state) = self.state.lock() {
            state.fps_range = if min_fps <= 0 || max_fps <= 0 {
                None
            } else {
                Some(FpsRange::new(min_fps, max_fps))
            };
        }
    }

    fn create_session(self: &Arc<Self>) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };

        let observer: Arc<dyn SessionStateObserver> = Arc::new(SessionObserver(Arc::clone(self)));
        let targets = state.targets.clone();
        let handler = self.handler.clone();
        let Some(device) = state.device.as_mut() else {
            return false;
        };
        match device.create_capture_session(&targets, observer, &handler) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to create a capture session");
                false
            },
        }
    }

    fn start(self: &Arc<Self>, template: RequestTemplate) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if state.device.is_none() || state.session.is_none() {
            return false;
        }
        let Some(preview_reader) = state.preview_reader.clone() else {
            warn!("no frame readers prepared, cannot start preview");
            return false;
        };

        let mut request = CaptureRequest::new(template);
        request.add_target(preview_reader.target());

        state.controls.af_mode = AfMode::Off;
        for mode in self.manager.all_available_af_modes(&state.camera_id) {
            if mode == AfMode::ContinuousPicture {
                state.controls.af_mode = mode;
                break;
            }
        }

        request.ae_mode = state.controls.flash_mode.to_ae_mode();
        request.torch_on = state.controls.torch_on;
        request.af_trigger = AfTrigger::Idle;
        request.af_mode = state.controls.af_mode;
        request.capture_intent = CaptureIntent::VideoRecord;
        if state.controls.zoom_factor != 1.0 {
            let active = self.manager.active_array_size(&state.camera_id);
            request.apply_zoom(self.provider.api_level(), active, state.controls.zoom_factor);
        }
        request.fps_range = state.fps_range;

        let observer = self.preview_observer();
        let Some(session) = state.session.as_mut() else {
            return false;
        };
        match session.set_repeating_request(&request, observer) {
            Ok(()) => {
                state.preview_request = Some(request);
                state.controls.started = true;
                true
            },
            Err(e) => {
                warn!(error = %e, "failed to start preview");
                false
            },
        }
    }

    fn stop_and_close(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if let Some(mut session) = state.session.take() {
            session.close();
        }
        if let Some(mut device) = state.device.take() {
            device.close();
        }
        state.camera_id.clear();
        state.targets.clear();
        state.preview_request = None;
        state.controls.reset_controls();
        state.controls.started = false;
        self.set_photo_state(PhotoCaptureState::Preview);
    }

    fn preview_observer(self: &Arc<Self>) -> Arc<dyn CaptureResultObserver> {
        Arc::new(PreviewObserver(Arc::clone(self)))
    }

    fn take_photo(self: &Arc<Self>) {
        let af_mode = match self.state.lock() {
            Ok(state) => state.controls.af_mode,
            Err(_) => return,
        };

        if af_mode != AfMode::ContinuousPicture {
            self.capture_photo();
            return;
        }

        let observer = self.preview_observer();
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let Some(mut request) = state.preview_request.clone() else {
            warn!("take_photo called before start");
            return;
        };
        request.af_trigger = AfTrigger::Start;
        state.preview_request = Some(request.clone());
        let Some(session) = state.session.as_mut() else {
            warn!("take_photo called without a session");
            return;
        };
        self.set_photo_state(PhotoCaptureState::WaitingFocusLock);
        if let Err(e) = session.capture(&request, observer) {
            warn!(error = %e, "cannot get access to the camera");
        }
    }

    /// Finalize a still photo with a single capture call. Reached from
    /// `take_photo()` when no focus routine is needed, or from the
    /// capture-result processing on the background thread.
    fn capture_photo(self: &Arc<Self>) {
        let observer: Arc<dyn CaptureResultObserver> =
            Arc::new(StillPhotoObserver(Arc::clone(self)));
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        let Some(photo_reader) = state.photo_reader.clone() else {
            warn!("no photo reader prepared, dropping still capture");
            return;
        };

        let mut request = CaptureRequest::new(RequestTemplate::StillCapture);
        request.add_target(photo_reader.target());
        request.ae_mode = state.controls.flash_mode.to_ae_mode();
        if state.controls.zoom_factor != 1.0 {
            let active = self.manager.active_array_size(&state.camera_id);
            request.apply_zoom(self.provider.api_level(), active, state.controls.zoom_factor);
        }

        let Some(session) = state.session.as_mut() else {
            // The session is always closed before being cleared, and
            // closing flushes pending callbacks, so this path should
            // be unreachable. Degrade the capture instead of crashing
            // the host if it happens anyway.
            error!("still capture submitted with no active session; this should not happen");
            return;
        };
        if let Err(e) = session.capture(&request, observer) {
            warn!(error = %e, "failed to submit still capture");
        }
    }

    /// Dispatch one capture result through the photo-capture routine.
    fn process_capture_result(self: &Arc<Self>, result: &CaptureMetadata) {
        let current = self.photo_state();
        let (next, action) = advance(current, result.af_state, result.ae_state);

        match action {
            PhotoAction::None => {
                self.set_photo_state(next);
            },
            PhotoAction::CapturePhoto => {
                self.set_photo_state(next);
                self.capture_photo();
            },
            PhotoAction::TriggerPrecapture => {
                let observer = self.preview_observer();
                let Ok(mut state) = self.state.lock() else {
                    return;
                };
                let Some(mut request) = state.preview_request.clone() else {
                    return;
                };
                request.precapture_trigger = PrecaptureTrigger::Start;
                state.preview_request = Some(request.clone());
                self.set_photo_state(next);
                if let Some(session) = state.session.as_mut() {
                    if let Err(e) = session.capture(&request, observer) {
                        warn!(error = %e, "cannot get access to the camera");
                    }
                }
            },
        }
    }

    /// Reset the capture triggers and hand the session back to plain
    /// preview once the still capture completed.
    fn finalize_still_capture(self: &Arc<Self>, result: &CaptureMetadata) {
        let exif = ExifData::from_capture_result(result);
        let observer = self.preview_observer();

        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.exif = Some(exif);

        let Some(mut request) = state.preview_request.clone() else {
            return;
        };
        request.af_trigger = AfTrigger::Idle;
        request.precapture_trigger = PrecaptureTrigger::Idle;
        state.preview_request = Some(request.clone());
        self.set_photo_state(PhotoCaptureState::Preview);

        let Some(session) = state.session.as_mut() else {
            error!("finalizing still photo capture with no active session; this should not happen");
            return;
        };
        if let Err(e) = session.set_repeating_request(&request, observer) {
            error!(error = %e, "failed to restore preview after still capture");
        }
    }

    fn camera_id(&self) -> String {
        self.state
            .lock()
            .map(|state| state.camera_id.clone())
            .unwrap_or_default()
    }

    fn handle_preview_frame(self: &Arc<Self>, reader: &Arc<dyn FrameReader>) {
        let camera_id = self.camera_id();
        match reader.acquire_latest_frame() {
            Ok(Some(frame)) => self.events.on_frame_available(&camera_id, frame),
            Ok(None) => {},
            Err(e) => {
                // The consumer is holding frames for too long. Give it
                // a little more time, then restart the session if that
                // did not help.
                error!(error = %e, "image processing taking too long, waiting 500ms more");
                std::thread::sleep(FRAME_RETRY_DELAY);
                match reader.acquire_latest_frame() {
                    Ok(Some(frame)) => self.events.on_frame_available(&camera_id, frame),
                    Ok(None) => {},
                    Err(e2) => {
                        error!(error = %e2, "will not wait anymore, restarting camera session");
                        self.restart_session(reader);
                    },
                }
            },
        }
    }

    fn restart_session(self: &Arc<Self>, reader: &Arc<dyn FrameReader>) {
        // stop_and_close clears the id, so remember it first.
        let camera_id = self.camera_id();
        let (width, height, format) = (reader.width(), reader.height(), reader.format());
        self.stop_and_close();
        self.add_image_readers(width, height, format);
        self.open(&camera_id);
    }

    fn handle_photo_frame(self: &Arc<Self>, reader: &Arc<dyn FrameReader>) {
        let camera_id = self.camera_id();
        match reader.acquire_latest_frame() {
            Ok(Some(frame)) => self.events.on_photo_available(&camera_id, frame),
            Ok(None) => {},
            Err(e) => warn!(error = %e, "photo frame cannot be acquired"),
        }
    }

    fn zoom_to(self: &Arc<Self>, factor: f32) {
        let observer = self.preview_observer();
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.controls.zoom_factor = factor;

        if !state.controls.started {
            // Capture has not begun; the zoom is applied at start().
            return;
        }

        let Some(mut request) = state.preview_request.clone() else {
            return;
        };
        let active = self.manager.active_array_size(&state.camera_id);
        request.apply_zoom(self.provider.api_level(), active, factor);
        state.preview_request = Some(request.clone());

        if let Some(session) = state.session.as_mut() {
            if let Err(e) = session.set_repeating_request(&request, observer) {
                warn!(error = %e, "failed to set zoom");
            }
        }
    }

    fn set_flash_mode(self: &Arc<Self>, mode_name: &str) {
        let Some(flash_mode) = FlashMode::from_name(mode_name) else {
            warn!(mode = mode_name, "unknown flash mode");
            return;
        };

        let observer = self.preview_observer();
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.controls.flash_mode = flash_mode;

        if !state.controls.started {
            return;
        }

        let Some(mut request) = state.preview_request.clone() else {
            return;
        };
        request.ae_mode = flash_mode.to_ae_mode();
        state.preview_request = Some(request.clone());

        if let Some(session) = state.session.as_mut() {
            if let Err(e) = session.set_repeating_request(&request, observer) {
                warn!(error = %e, "failed to set flash mode");
            }
        }
    }

    fn set_torch_mode(self: &Arc<Self>, torch_on: bool) {
        let observer = self.preview_observer();
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.controls.torch_on = torch_on;

        if !state.controls.started {
            return;
        }

        let Some(mut request) = state.preview_request.clone() else {
            return;
        };
        request.torch_on = torch_on;
        state.preview_request = Some(request.clone());

        if let Some(session) = state.session.as_mut() {
            if let Err(e) = session.set_repeating_request(&request, observer) {
                warn!(error = %e, "failed to set torch mode");
            }
        }
    }

    fn save_exif_to_file(&self, path: &Path) -> bool {
        let exif = match self.state.lock() {
            Ok(state) => state.exif.clone(),
            Err(_) => None,
        };
        match exif {
            Some(exif) => match exif.save(path) {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "failed to save exif data");
                    false
                },
            },
            None => {
                error!(path = %path.display(), "no exif data that could be saved");
                false
            },
        }
    }
}

struct DeviceObserver(Arc<CameraInner>);

impl DeviceStateObserver for DeviceObserver {
    fn on_opened(&self, device: Box<dyn CameraDevice>) {
        let camera_id = {
            let Ok(mut state) = self.0.state.lock() else {
                return;
            };
            if let Some(mut old) = state.device.take() {
                old.close();
            }
            state.device = Some(device);
            state.camera_id.clone()
        };
        self.0.events.on_camera_opened(&camera_id);
    }

    fn on_disconnected(&self) {
        let camera_id = {
            let Ok(mut state) = self.0.state.lock() else {
                return;
            };
            if let Some(mut device) = state.device.take() {
                device.close();
            }
            state.camera_id.clone()
        };
        self.0.events.on_camera_disconnect(&camera_id);
    }

    fn on_error(&self, error_code: i32) {
        let camera_id = {
            let Ok(mut state) = self.0.state.lock() else {
                return;
            };
            if let Some(mut device) = state.device.take() {
                device.close();
            }
            state.camera_id.clone()
        };
        self.0.events.on_camera_error(&camera_id, error_code);
    }
}

struct SessionObserver(Arc<CameraInner>);

impl SessionStateObserver for SessionObserver {
    fn on_configured(&self, session: Box<dyn CameraSession>) {
        let camera_id = {
            let Ok(mut state) = self.0.state.lock() else {
                return;
            };
            state.session = Some(session);
            state.camera_id.clone()
        };
        self.0.events.on_capture_session_configured(&camera_id);
    }

    fn on_configure_failed(&self) {
        let camera_id = self.0.camera_id();
        self.0.events.on_capture_session_configure_failed(&camera_id);
    }

    fn on_active(&self) {
        let camera_id = self.0.camera_id();
        self.0.events.on_session_active(&camera_id);
    }

    fn on_closed(&self) {
        let camera_id = self.0.camera_id();
        self.0.events.on_session_closed(&camera_id);
    }
}

/// Drives the photo-capture routine from the results of the repeating
/// preview request and the calibration captures riding on it.
struct PreviewObserver(Arc<CameraInner>);

impl CaptureResultObserver for PreviewObserver {
    fn on_capture_progressed(&self, result: &CaptureMetadata) {
        self.0.process_capture_result(result);
    }

    fn on_capture_completed(&self, result: &CaptureMetadata) {
        self.0.process_capture_result(result);
    }

    fn on_capture_failed(&self, reason: i32, frame_number: i64) {
        let camera_id = self.0.camera_id();
        self.0
            .events
            .on_capture_session_failed(&camera_id, reason, frame_number);
    }
}

/// Finalizes a single still capture: records the capture metadata and
/// puts the session back into plain preview.
struct StillPhotoObserver(Arc<CameraInner>);

impl CaptureResultObserver for StillPhotoObserver {
    fn on_capture_completed(&self, result: &CaptureMetadata) {
        self.0.finalize_still_capture(result);
    }
}
