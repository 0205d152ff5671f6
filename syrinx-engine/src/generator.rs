//! The generator: free-running producer thread.
//!
//! Lifecycle per cycle: block on the request word, snapshot cursor and
//! frequency exactly once, synthesize one kernel into the segment the render
//! head just vacated, fold in the painted envelope, clear the request, wait
//! again. The only generator-private state is whatever the backend keeps
//! between kernels (oscillator phase).
//!
//! The thread leaves the loop on the distinguished shutdown request or on a
//! backend failure; in the failure case it raises the failed flag so the
//! render head degrades to silence instead of waiting on a stall it cannot
//! distinguish from slowness.

use std::io;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::backend::SynthBackend;
use crate::error::BackendError;
use crate::ring::{EnvelopeChannel, KernelRing};
use crate::state::{SharedState, REQUEST_RENDER, REQUEST_SHUTDOWN};

/// Host → generator control messages.
#[derive(Debug)]
pub(crate) enum ToGenerator {
    /// First (and only expected) message: session parameters.
    Bootstrap { sample_rate: u32 },
}

/// Generator → host notifications.
#[derive(Debug)]
pub(crate) enum FromGenerator {
    /// Backend is live and the shared buffers are being served.
    BuffersLive,
    /// Bootstrap or mid-session backend failure; the generator has stopped.
    BackendFailed(BackendError),
}

/// Deferred backend construction; runs on the generator thread, where a
/// compute device would want to live.
pub type BackendFactory =
    Box<dyn FnOnce() -> Result<Box<dyn SynthBackend>, BackendError> + Send>;

/// Shared handles the generator works against.
pub(crate) struct GeneratorLink {
    pub state: Arc<SharedState>,
    pub ring: Arc<KernelRing>,
    pub envelope: Arc<EnvelopeChannel>,
}

pub(crate) fn spawn(
    link: GeneratorLink,
    factory: BackendFactory,
    control_rx: Receiver<ToGenerator>,
    msg_tx: Sender<FromGenerator>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("syrinx-generator".into())
        .spawn(move || run(link, factory, control_rx, msg_tx))
}

fn run(
    link: GeneratorLink,
    factory: BackendFactory,
    control_rx: Receiver<ToGenerator>,
    msg_tx: Sender<FromGenerator>,
) {
    // Phase 1: wait for the bootstrap message. Anything else at this point is
    // out of protocol: logged and ignored, never fatal.
    let sample_rate = match control_rx.recv() {
        Ok(ToGenerator::Bootstrap { sample_rate }) => sample_rate as f32,
        Err(_) => {
            log::debug!("generator: host hung up before bootstrap");
            return;
        }
    };

    let mut backend = match factory() {
        Ok(b) => b,
        Err(e) => {
            log::error!("generator: backend bootstrap failed: {e}");
            let _ = msg_tx.send(FromGenerator::BackendFailed(e));
            return;
        }
    };

    log::debug!("generator: backend '{}' live at {sample_rate} Hz", backend.label());
    let _ = msg_tx.send(FromGenerator::BuffersLive);

    let kernel_count = link.ring.kernel_count();
    loop {
        match link.state.wait_for_request() {
            REQUEST_SHUTDOWN => {
                log::debug!("generator: shutdown request, exiting");
                break;
            }
            REQUEST_RENDER => {
                // Late control traffic is out of protocol once running.
                while let Ok(msg) = control_rx.try_recv() {
                    log::warn!("generator: ignoring unexpected control message: {msg:?}");
                }

                // One snapshot per cycle; re-reading mid-computation could
                // tear the cursor/frequency pair across a boundary.
                let cursor = link.state.cursor() as usize % kernel_count;
                let frequency = link.state.frequency();
                let target = (cursor + kernel_count - 1) % kernel_count;

                // SAFETY: `target` is the segment the render head vacated
                // when it published `cursor`, and the single-outstanding-
                // request protocol keeps it ours until we clear the request.
                let segment = unsafe { link.ring.segment_mut(target) };

                match backend.render(frequency, sample_rate, segment) {
                    Ok(()) => {
                        link.envelope.apply(segment);
                        link.state.clear_request();
                    }
                    Err(e) => {
                        log::error!("generator: backend failed, stopping: {e}");
                        link.state.mark_generator_failed();
                        let _ = msg_tx.send(FromGenerator::BackendFailed(e));
                        break;
                    }
                }
            }
            other => {
                log::warn!("generator: unknown request word {other}, resetting to idle");
                link.state.reset_request();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use std::sync::mpsc;
    use std::time::Duration;

    fn test_link(kernel_len: usize, kernel_count: usize) -> GeneratorLink {
        GeneratorLink {
            state: Arc::new(SharedState::new(440.0)),
            ring: Arc::new(KernelRing::new(kernel_len, kernel_count)),
            envelope: Arc::new(EnvelopeChannel::new(kernel_len)),
        }
    }

    #[test]
    fn fills_the_vacated_segment_and_clears_the_request() {
        let link = test_link(64, 4);
        let state = Arc::clone(&link.state);
        let ring = Arc::clone(&link.ring);

        let (ctl_tx, ctl_rx) = mpsc::channel();
        let (msg_tx, msg_rx) = mpsc::channel();
        let factory: BackendFactory = Box::new(|| Ok(Box::new(CpuBackend::sine())));
        let handle = spawn(
            GeneratorLink { state: Arc::clone(&state), ring: Arc::clone(&ring), envelope: link.envelope },
            factory, ctl_rx, msg_tx,
        ).unwrap();

        ctl_tx.send(ToGenerator::Bootstrap { sample_rate: 48000 }).unwrap();
        assert!(matches!(
            msg_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            FromGenerator::BuffersLive
        ));

        // Drain of kernel 0 finished; cursor moves to 1 and kernel 0 is the
        // refill target.
        state.publish_cursor(1);
        state.signal_render();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while state.request() != crate::state::REQUEST_IDLE {
            assert!(std::time::Instant::now() < deadline, "request never cleared");
            std::thread::sleep(Duration::from_millis(1));
        }

        let mut seg = vec![0.0f32; 64];
        ring.copy_kernel(0, &mut seg);
        assert!(seg.iter().any(|&s| s != 0.0), "segment 0 untouched");
        // Segment 1 (the one being drained) must be untouched.
        ring.copy_kernel(1, &mut seg);
        assert!(seg.iter().all(|&s| s == 0.0), "segment 1 overwritten");

        state.request_shutdown();
        handle.join().unwrap();
    }

    #[test]
    fn bootstrap_failure_is_fatal_and_reported() {
        let link = test_link(64, 4);
        let (ctl_tx, ctl_rx) = mpsc::channel();
        let (msg_tx, msg_rx) = mpsc::channel();
        let factory: BackendFactory =
            Box::new(|| Err(BackendError::Unavailable("no device".into())));
        let handle = spawn(link, factory, ctl_rx, msg_tx).unwrap();

        ctl_tx.send(ToGenerator::Bootstrap { sample_rate: 48000 }).unwrap();
        assert!(matches!(
            msg_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            FromGenerator::BackendFailed(BackendError::Unavailable(_))
        ));
        handle.join().unwrap();
    }

    #[test]
    fn shutdown_releases_an_idle_generator() {
        let link = test_link(64, 4);
        let state = Arc::clone(&link.state);
        let (ctl_tx, ctl_rx) = mpsc::channel();
        let (msg_tx, msg_rx) = mpsc::channel();
        let factory: BackendFactory = Box::new(|| Ok(Box::new(CpuBackend::sine())));
        let handle = spawn(link, factory, ctl_rx, msg_tx).unwrap();

        ctl_tx.send(ToGenerator::Bootstrap { sample_rate: 48000 }).unwrap();
        let _ = msg_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        state.request_shutdown();
        handle.join().unwrap();
    }
}
