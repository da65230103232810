// This is free and unencumbered software released into the public domain.

//! Display-mirroring capture over a consent-gated projection.
//!
//! The host obtains capture consent through its own UI flow and hands
//! the outcome here as a [`ConsentGrant`]. The service turns that into
//! a projection, mirrors the display into an RGBA frame reader, and
//! forwards frames to the registered [`ScreenEventHandler`]. All
//! failures are reported through the same handler as error strings
//! keyed by the session id; nothing here panics the host.

use crate::camera::MAX_IN_FLIGHT_FRAMES;
use crate::error::CaptureError;
use crate::events::ScreenEventHandler;
use crate::frame::{FrameTarget, PixelFormat, Size};
use crate::handler::{BackgroundThread, Handler};
use crate::platform::FrameReader;
use scopeguard::{guard, ScopeGuard};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Result code the consent activity reports on approval.
pub const RESULT_OK: i32 = -1;

/// Outcome of the host's screen-capture consent prompt.
#[derive(Clone, Copy, Debug)]
pub struct ConsentGrant {
    pub result_code: i32,
}

impl ConsentGrant {
    pub fn granted() -> Self {
        Self {
            result_code: RESULT_OK,
        }
    }

    pub fn is_granted(&self) -> bool {
        self.result_code == RESULT_OK
    }
}

/// A virtual display mirroring the screen into a frame target.
pub trait VirtualDisplay: Send {
    fn release(&mut self);
}

/// A live projection obtained from user consent.
pub trait Projection: Send {
    fn create_virtual_display(
        &mut self,
        name: &str,
        width: u32,
        height: u32,
        target: FrameTarget,
    ) -> Result<Box<dyn VirtualDisplay>, CaptureError>;

    /// Register the revocation callback; the platform fires it on
    /// `handler` when the user withdraws consent.
    fn set_stop_observer(&mut self, observer: Arc<dyn Fn() + Send + Sync>, handler: &Handler);

    fn stop(&mut self);
}

/// Host seam for screen capture: display geometry, projections, and
/// frame readers.
pub trait ProjectionProvider: Send + Sync {
    /// Pixel size of the display to mirror, `None` when it cannot be
    /// queried.
    fn screen_size(&self) -> Option<Size>;

    fn acquire_projection(
        &self,
        grant: &ConsentGrant,
    ) -> Result<Box<dyn Projection>, CaptureError>;

    fn new_frame_reader(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        max_images: usize,
    ) -> Result<Arc<dyn FrameReader>, CaptureError>;
}

/// Size of the display to mirror, `0x0` when the platform cannot tell.
pub fn screen_capture_size(provider: &dyn ProjectionProvider) -> Size {
    match provider.screen_size() {
        Some(size) => size,
        None => {
            warn!("could not query the screen size");
            Size::new(0, 0)
        },
    }
}

#[derive(Default)]
struct ServiceState {
    projection: Option<Box<dyn Projection>>,
    display: Option<Box<dyn VirtualDisplay>>,
    reader: Option<Arc<dyn FrameReader>>,
    // A session is one-shot: once stopped it stays stopped, even if
    // the host asks to start again.
    stopped: bool,
}

/// One screen-capture session. Start validates its inputs, builds the
/// projection and virtual display, and streams frames until stopped or
/// until the user revokes consent.
pub struct ScreenCaptureService {
    provider: Arc<dyn ProjectionProvider>,
    events: Arc<dyn ScreenEventHandler>,
    session_id: i64,
    handler: Handler,
    state: Mutex<ServiceState>,
    background: Mutex<BackgroundThread>,
}

impl ScreenCaptureService {
    pub fn new(
        provider: Arc<dyn ProjectionProvider>,
        events: Arc<dyn ScreenEventHandler>,
        session_id: i64,
    ) -> Arc<Self> {
        let background = BackgroundThread::start("screen-capture");
        Arc::new(Self {
            provider,
            events,
            session_id,
            handler: background.handler(),
            state: Mutex::new(ServiceState::default()),
            background: Mutex::new(background),
        })
    }

    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    /// Begin mirroring the display. All failures are reported through
    /// the event handler before `false` is returned.
    pub fn start(self: &Arc<Self>, grant: &ConsentGrant, width: u32, height: u32) -> bool {
        if self.session_id < 0 {
            self.report_error("invalid screen capture session id");
            return false;
        }
        if width == 0 || height == 0 {
            self.report_error("invalid screen capture size");
            return false;
        }
        if !grant.is_granted() {
            self.report_error("screen capture consent was not granted");
            return false;
        }

        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if state.stopped {
            self.report_error("screen capture session is already stopped");
            return false;
        }
        if state.projection.is_some() {
            // Already capturing; the running session stands.
            return true;
        }

        let projection = match self.provider.acquire_projection(grant) {
            Ok(projection) => projection,
            Err(e) => {
                self.report_error(&format!("failed to acquire a screen projection: {e}"));
                return false;
            },
        };
        // Stop the projection if anything below fails.
        let mut projection = guard(projection, |mut projection| projection.stop());

        let reader = match self.provider.new_frame_reader(
            width,
            height,
            PixelFormat::Rgba8,
            MAX_IN_FLIGHT_FRAMES,
        ) {
            Ok(reader) => reader,
            Err(e) => {
                self.report_error(&format!("failed to allocate a screen frame reader: {e}"));
                return false;
            },
        };

        let weak = Arc::downgrade(self);
        let frame_source = Arc::downgrade(&reader);
        reader.set_frame_listener(
            Some(Arc::new(move || {
                if let (Some(service), Some(reader)) = (weak.upgrade(), frame_source.upgrade()) {
                    service.handle_frame(&reader);
                }
            })),
            &self.handler,
        );

        // Consent can be withdrawn at any time; treat it as a stop.
        let weak = Arc::downgrade(self);
        projection.set_stop_observer(
            Arc::new(move || {
                if let Some(service) = weak.upgrade() {
                    service.stop();
                }
            }),
            &self.handler,
        );

        let display = match projection.create_virtual_display(
            "droidcap-screen-capture",
            width,
            height,
            reader.target(),
        ) {
            Ok(display) => display,
            Err(e) => {
                self.report_error(&format!("failed to create a virtual display: {e}"));
                return false;
            },
        };

        state.projection = Some(ScopeGuard::into_inner(projection));
        state.display = Some(display);
        state.reader = Some(reader);
        true
    }

    /// Tear the session down. Safe to call any number of times and
    /// from the revocation callback. The session cannot be started
    /// again afterwards.
    pub fn stop(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.stopped = true;
        if let Some(mut display) = state.display.take() {
            display.release();
        }
        if let Some(mut projection) = state.projection.take() {
            projection.stop();
        }
        if let Some(reader) = state.reader.take() {
            reader.set_frame_listener(None, &self.handler);
        }
    }

    fn handle_frame(&self, reader: &Arc<dyn FrameReader>) {
        match reader.acquire_latest_frame() {
            Ok(Some(frame)) => self.events.on_screen_frame_available(frame, self.session_id),
            Ok(None) => warn!(session_id = self.session_id, "null frame acquired, skipping it"),
            Err(e) => self.report_error(&format!("failed to acquire a screen frame: {e}")),
        }
    }

    fn report_error(&self, message: &str) {
        warn!(session_id = self.session_id, message, "screen capture error");
        self.events.on_error_update(message, self.session_id);
    }
}

impl Drop for ScreenCaptureService {
    fn drop(&mut self) {
        self.stop();
        if let Ok(mut background) = self.background.lock() {
            background.quit_safely();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::platform::FrameListener;
    use bytes::Bytes;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Core {
        projections: usize,
        displays: Vec<(String, u32, u32, FrameTarget)>,
        displays_released: usize,
        projections_stopped: usize,
        stop_observer: Option<Arc<dyn Fn() + Send + Sync>>,
        readers: Vec<Arc<MockReader>>,
        fail_projection: bool,
        fail_display: bool,
    }

    struct MockProvider {
        core: Arc<Mutex<Core>>,
        screen: Option<Size>,
    }

    impl ProjectionProvider for MockProvider {
        fn screen_size(&self) -> Option<Size> {
            self.screen
        }

        fn acquire_projection(
            &self,
            grant: &ConsentGrant,
        ) -> Result<Box<dyn Projection>, CaptureError> {
            assert!(grant.is_granted());
            let mut core = self.core.lock().unwrap();
            if core.fail_projection {
                return Err(CaptureError::NoProjection);
            }
            core.projections += 1;
            Ok(Box::new(MockProjection {
                core: Arc::clone(&self.core),
            }))
        }

        fn new_frame_reader(
            &self,
            width: u32,
            height: u32,
            format: PixelFormat,
            max_images: usize,
        ) -> Result<Arc<dyn FrameReader>, CaptureError> {
            assert_eq!(format, PixelFormat::Rgba8);
            assert_eq!(max_images, MAX_IN_FLIGHT_FRAMES);
            let mut core = self.core.lock().unwrap();
            let reader = Arc::new(MockReader {
                target: FrameTarget(core.readers.len() as u64 + 1),
                width,
                height,
                frames: Mutex::new(VecDeque::new()),
                listener: Mutex::new(None),
            });
            core.readers.push(Arc::clone(&reader));
            Ok(reader)
        }
    }

    struct MockProjection {
        core: Arc<Mutex<Core>>,
    }

    impl Projection for MockProjection {
        fn create_virtual_display(
            &mut self,
            name: &str,
            width: u32,
            height: u32,
            target: FrameTarget,
        ) -> Result<Box<dyn VirtualDisplay>, CaptureError> {
            let mut core = self.core.lock().unwrap();
            if core.fail_display {
                return Err(CaptureError::unsupported("no virtual displays"));
            }
            core.displays.push((name.to_owned(), width, height, target));
            Ok(Box::new(MockDisplay {
                core: Arc::clone(&self.core),
            }))
        }

        fn set_stop_observer(
            &mut self,
            observer: Arc<dyn Fn() + Send + Sync>,
            _handler: &Handler,
        ) {
            self.core.lock().unwrap().stop_observer = Some(observer);
        }

        fn stop(&mut self) {
            self.core.lock().unwrap().projections_stopped += 1;
        }
    }

    struct MockDisplay {
        core: Arc<Mutex<Core>>,
    }

    impl VirtualDisplay for MockDisplay {
        fn release(&mut self) {
            self.core.lock().unwrap().displays_released += 1;
        }
    }

    struct MockReader {
        target: FrameTarget,
        width: u32,
        height: u32,
        frames: Mutex<VecDeque<Result<Option<Frame>, CaptureError>>>,
        listener: Mutex<Option<FrameListener>>,
    }

    impl FrameReader for MockReader {
        fn width(&self) -> u32 {
            self.width
        }
        fn height(&self) -> u32 {
            self.height
        }
        fn format(&self) -> PixelFormat {
            PixelFormat::Rgba8
        }
        fn target(&self) -> FrameTarget {
            self.target
        }
        fn set_frame_listener(&self, listener: Option<FrameListener>, _handler: &Handler) {
            *self.listener.lock().unwrap() = listener;
        }
        fn acquire_latest_frame(&self) -> Result<Option<Frame>, CaptureError> {
            self.frames.lock().unwrap().pop_front().unwrap_or(Ok(None))
        }
    }

    #[derive(Default)]
    struct TestEvents {
        frames: Mutex<Vec<(Frame, i64)>>,
        errors: Mutex<Vec<(String, i64)>>,
    }

    impl ScreenEventHandler for TestEvents {
        fn on_screen_frame_available(&self, frame: Frame, session_id: i64) {
            self.frames.lock().unwrap().push((frame, session_id));
        }
        fn on_error_update(&self, message: &str, session_id: i64) {
            self.errors.lock().unwrap().push((message.into(), session_id));
        }
    }

    fn make_service(
        session_id: i64,
    ) -> (Arc<ScreenCaptureService>, Arc<Mutex<Core>>, Arc<TestEvents>) {
        let core = Arc::new(Mutex::new(Core::default()));
        let provider = Arc::new(MockProvider {
            core: Arc::clone(&core),
            screen: Some(Size::new(1080, 2400)),
        });
        let events = Arc::new(TestEvents::default());
        let service = ScreenCaptureService::new(
            provider,
            Arc::clone(&events) as Arc<dyn ScreenEventHandler>,
            session_id,
        );
        (service, core, events)
    }

    #[test]
    fn start_creates_projection_and_display() {
        let (service, core, events) = make_service(7);
        assert!(service.start(&ConsentGrant::granted(), 1080, 2400));

        let core = core.lock().unwrap();
        assert_eq!(core.projections, 1);
        assert_eq!(core.displays.len(), 1);
        let (name, width, height, target) = &core.displays[0];
        assert_eq!(name, "droidcap-screen-capture");
        assert_eq!((*width, *height), (1080, 2400));
        assert_eq!(*target, core.readers[0].target);
        assert!(events.errors.lock().unwrap().is_empty());
    }

    #[test]
    fn invalid_inputs_are_reported_not_panicked() {
        let (service, core, events) = make_service(-1);
        assert!(!service.start(&ConsentGrant::granted(), 1080, 2400));

        let (service, _core2, events2) = make_service(7);
        assert!(!service.start(&ConsentGrant::granted(), 0, 2400));
        assert!(!service.start(&ConsentGrant { result_code: 0 }, 1080, 2400));

        assert_eq!(events.errors.lock().unwrap()[0].1, -1);
        let errors = events2.errors.lock().unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].0.contains("size"));
        assert!(errors[1].0.contains("consent"));
        assert_eq!(core.lock().unwrap().projections, 0);
    }

    #[test]
    fn projection_failure_is_reported() {
        let (service, core, events) = make_service(7);
        core.lock().unwrap().fail_projection = true;
        assert!(!service.start(&ConsentGrant::granted(), 1080, 2400));
        assert_eq!(events.errors.lock().unwrap().len(), 1);
    }

    #[test]
    fn display_failure_stops_the_projection() {
        let (service, core, events) = make_service(7);
        core.lock().unwrap().fail_display = true;
        assert!(!service.start(&ConsentGrant::granted(), 1080, 2400));

        let core = core.lock().unwrap();
        assert_eq!(core.projections_stopped, 1);
        assert_eq!(events.errors.lock().unwrap().len(), 1);
    }

    #[test]
    fn stop_is_idempotent() {
        let (service, core, _events) = make_service(7);
        assert!(service.start(&ConsentGrant::granted(), 1080, 2400));

        service.stop();
        service.stop();

        let core = core.lock().unwrap();
        assert_eq!(core.displays_released, 1);
        assert_eq!(core.projections_stopped, 1);
    }

    #[test]
    fn second_start_keeps_the_running_session() {
        let (service, core, _events) = make_service(7);
        assert!(service.start(&ConsentGrant::granted(), 1080, 2400));
        assert!(service.start(&ConsentGrant::granted(), 1080, 2400));
        assert_eq!(core.lock().unwrap().projections, 1);
    }

    #[test]
    fn stopped_session_refuses_to_start_again() {
        let (service, core, events) = make_service(7);
        assert!(service.start(&ConsentGrant::granted(), 1080, 2400));
        service.stop();

        assert!(!service.start(&ConsentGrant::granted(), 1080, 2400));

        assert_eq!(core.lock().unwrap().projections, 1);
        let errors = events.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].0.contains("stopped"));
    }

    #[test]
    fn revoked_session_cannot_be_restarted() {
        let (service, core, _events) = make_service(7);
        assert!(service.start(&ConsentGrant::granted(), 1080, 2400));

        let observer = core.lock().unwrap().stop_observer.clone().unwrap();
        observer();

        assert!(!service.start(&ConsentGrant::granted(), 1080, 2400));
        assert_eq!(core.lock().unwrap().projections, 1);
    }

    #[test]
    fn revoked_consent_stops_the_session() {
        let (service, core, _events) = make_service(7);
        assert!(service.start(&ConsentGrant::granted(), 1080, 2400));

        let observer = core.lock().unwrap().stop_observer.clone().unwrap();
        observer();

        let core = core.lock().unwrap();
        assert_eq!(core.displays_released, 1);
        assert_eq!(core.projections_stopped, 1);
        drop(service);
    }

    #[test]
    fn frames_and_stalls_are_forwarded() {
        let (service, core, events) = make_service(7);
        assert!(service.start(&ConsentGrant::granted(), 1080, 2400));

        let reader = Arc::clone(&core.lock().unwrap().readers[0]);
        {
            let mut frames = reader.frames.lock().unwrap();
            frames.push_back(Ok(Some(Frame::new(
                Bytes::from(vec![0u8; 16]),
                1080,
                2400,
                1080 * 4,
                PixelFormat::Rgba8,
            ))));
            frames.push_back(Err(CaptureError::ReaderStalled));
        }

        let listener = reader.listener.lock().unwrap().clone().unwrap();
        listener();
        listener();

        assert_eq!(events.frames.lock().unwrap().len(), 1);
        assert_eq!(events.frames.lock().unwrap()[0].1, 7);
        assert_eq!(events.errors.lock().unwrap().len(), 1);
    }

    #[test]
    fn screen_size_falls_back_to_zero() {
        let core = Arc::new(Mutex::new(Core::default()));
        let provider = MockProvider {
            core,
            screen: None,
        };
        assert_eq!(screen_capture_size(&provider), Size::new(0, 0));

        let core = Arc::new(Mutex::new(Core::default()));
        let provider = MockProvider {
            core,
            screen: Some(Size::new(720, 1280)),
        };
        assert_eq!(screen_capture_size(&provider), Size::new(720, 1280));
    }
}
