// This is free and unencumbered software released into the public domain.

use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::warn;

/// How long teardown waits for the background thread to drain and
/// exit before detaching it.
pub const JOIN_WAIT: Duration = Duration::from_millis(1000);

enum Job {
    Run(Box<dyn FnOnce() + Send>),
    Quit,
}

/// Posting handle for a [`BackgroundThread`]. Cheap to clone and hand
/// to providers so they can deliver callbacks in submission order.
#[derive(Clone)]
pub struct Handler {
    tx: Sender<Job>,
}

impl Handler {
    /// Queue a job. Returns false once the thread has quit.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.tx.send(Job::Run(Box::new(job))).is_ok()
    }
}

/// One dedicated background processing context per active session.
/// Jobs run strictly in posting order. Quitting drains what was
/// already queued, then joins with a bounded wait.
pub struct BackgroundThread {
    tx: Sender<Job>,
    done_rx: Receiver<()>,
    join: Option<JoinHandle<()>>,
}

impl BackgroundThread {
    pub fn start(name: &str) -> Self {
        let (tx, rx) = channel::<Job>();
        let (done_tx, done_rx) = channel::<()>();

        let join = std::thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                // Keep the sender alive until the loop exits so quit
                // can observe the disconnect as "finished".
                let _done = done_tx;
                while let Ok(job) = rx.recv() {
                    match job {
                        Job::Run(run) => run(),
                        Job::Quit => break,
                    }
                }
            })
            .ok();

        Self { tx, done_rx, join }
    }

    pub fn handler(&self) -> Handler {
        Handler {
            tx: self.tx.clone(),
        }
    }

    /// Process everything already queued, then stop. Bounded: if the
    /// thread is still busy after [`JOIN_WAIT`] it is detached rather
    /// than blocking teardown.
    pub fn quit_safely(&mut self) {
        let Some(join) = self.join.take() else {
            return;
        };

        let _ = self.tx.send(Job::Quit);
        match self.done_rx.recv_timeout(JOIN_WAIT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = join.join();
            },
            Err(RecvTimeoutError::Timeout) => {
                warn!("background thread did not quit in time, detaching");
            },
        }
    }
}

impl Drop for BackgroundThread {
    fn drop(&mut self) {
        self.quit_safely();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn posted_jobs_run_in_order_before_quit() {
        let mut background = BackgroundThread::start("test-handler");
        let handler = background.handler();

        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        for i in 0..8 {
            let log = Arc::clone(&log);
            assert!(handler.post(move || log.lock().unwrap().push(i)));
        }

        background.quit_safely();
        assert_eq!(*log.lock().unwrap(), (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn post_after_quit_fails() {
        let mut background = BackgroundThread::start("test-handler");
        let handler = background.handler();
        background.quit_safely();
        drop(background);

        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = Arc::clone(&ran);
        assert!(!handler.post(move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn quit_twice_is_harmless() {
        let mut background = BackgroundThread::start("test-handler");
        background.quit_safely();
        background.quit_safely();
    }
}
