// This is free and unencumbered software released into the public domain.

use super::service::{ConsentGrant, ScreenCaptureService};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tracing::warn;

/// How long [`ScreenGrabber::stop`] waits for an in-flight service
/// connection before giving up.
pub const BIND_WAIT: Duration = Duration::from_millis(1000);

/// Host seam for binding the capture service. Binding is asynchronous:
/// the callback fires on an arbitrary thread once the connection is
/// live.
pub trait ServiceConnector: Send + Sync {
    fn bind(&self, on_connected: Box<dyn FnOnce(Arc<ScreenCaptureService>) + Send>) -> bool;
    fn unbind(&self);
}

/// Front door for screen capture: binds the capture service, starts
/// the session once the connection lands, and stops both on request.
///
/// Stopping races the asynchronous bind, so it waits a bounded time
/// for the connection before reporting failure.
pub struct ScreenGrabber {
    connector: Arc<dyn ServiceConnector>,
    connection: Arc<(Mutex<Option<Arc<ScreenCaptureService>>>, Condvar)>,
}

impl ScreenGrabber {
    pub fn new(connector: Arc<dyn ServiceConnector>) -> Self {
        Self {
            connector,
            connection: Arc::new((Mutex::new(None), Condvar::new())),
        }
    }

    /// Bind the capture service and start capturing at the given size
    /// once connected. Returns whether the bind was initiated; start
    /// failures after connection are reported through the service's
    /// event handler.
    pub fn start(&self, grant: ConsentGrant, width: u32, height: u32) -> bool {
        let connection = Arc::clone(&self.connection);
        self.connector.bind(Box::new(move |service| {
            service.start(&grant, width, height);
            let (slot, connected) = &*connection;
            if let Ok(mut guard) = slot.lock() {
                *guard = Some(service);
            }
            connected.notify_all();
        }))
    }

    /// Stop capturing and release the service. A no-op returning false
    /// when the service never connected.
    pub fn stop(&self) -> bool {
        let (slot, connected) = &*self.connection;
        let Ok(guard) = slot.lock() else {
            return false;
        };
        let Ok(mut guard) = connected.wait_timeout_while(guard, BIND_WAIT, |s| s.is_none()) else {
            return false;
        };

        let Some(service) = guard.0.take() else {
            warn!("cannot stop screen capture, the service never connected");
            return false;
        };
        drop(guard);

        service.stop();
        self.connector.unbind();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureError;
    use crate::events::ScreenEventHandler;
    use crate::frame::{PixelFormat, Size};
    use crate::platform::FrameReader;
    use crate::screen::service::{Projection, ProjectionProvider};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullProvider;

    impl ProjectionProvider for NullProvider {
        fn screen_size(&self) -> Option<Size> {
            None
        }
        fn acquire_projection(
            &self,
            _grant: &ConsentGrant,
        ) -> Result<Box<dyn Projection>, CaptureError> {
            Err(CaptureError::NoProjection)
        }
        fn new_frame_reader(
            &self,
            _width: u32,
            _height: u32,
            _format: PixelFormat,
            _max_images: usize,
        ) -> Result<Arc<dyn FrameReader>, CaptureError> {
            Err(CaptureError::NoProjection)
        }
    }

    struct NullEvents;
    impl ScreenEventHandler for NullEvents {}

    fn make_service() -> Arc<ScreenCaptureService> {
        ScreenCaptureService::new(Arc::new(NullProvider), Arc::new(NullEvents), 1)
    }

    struct TestConnector {
        pending: Mutex<Option<Box<dyn FnOnce(Arc<ScreenCaptureService>) + Send>>>,
        unbinds: AtomicUsize,
    }

    impl TestConnector {
        fn new() -> Self {
            Self {
                pending: Mutex::new(None),
                unbinds: AtomicUsize::new(0),
            }
        }

        fn connect(&self, service: Arc<ScreenCaptureService>) {
            let callback = self.pending.lock().unwrap().take().unwrap();
            callback(service);
        }
    }

    impl ServiceConnector for TestConnector {
        fn bind(&self, on_connected: Box<dyn FnOnce(Arc<ScreenCaptureService>) + Send>) -> bool {
            *self.pending.lock().unwrap() = Some(on_connected);
            true
        }

        fn unbind(&self) {
            self.unbinds.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn stop_after_connection_releases_the_service() {
        let connector = Arc::new(TestConnector::new());
        let grabber = ScreenGrabber::new(Arc::clone(&connector) as Arc<dyn ServiceConnector>);

        assert!(grabber.start(ConsentGrant::granted(), 1080, 2400));
        connector.connect(make_service());

        assert!(grabber.stop());
        assert_eq!(connector.unbinds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_waits_for_a_connection_in_flight() {
        let connector = Arc::new(TestConnector::new());
        let grabber = Arc::new(ScreenGrabber::new(
            Arc::clone(&connector) as Arc<dyn ServiceConnector>
        ));

        assert!(grabber.start(ConsentGrant::granted(), 1080, 2400));

        let late = {
            let connector = Arc::clone(&connector);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                connector.connect(make_service());
            })
        };

        assert!(grabber.stop());
        late.join().unwrap();
    }

    #[test]
    fn stop_without_a_connection_fails() {
        let connector = Arc::new(TestConnector::new());
        let grabber = ScreenGrabber::new(connector as Arc<dyn ServiceConnector>);
        assert!(!grabber.stop());
    }
}
