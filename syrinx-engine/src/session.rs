//! The handshake coordinator: allocates every shared buffer, brings the
//! generator up, and only reports ready once both sides hold live handles.
//!
//! Two-phase bring-up:
//!
//! 1. the coordinator spawns the generator and sends it the bootstrap
//!    message `{ sample_rate }`;
//! 2. the generator constructs its backend (fallibly: no backend, no
//!    session) and answers "buffers live";
//! 3. the coordinator attaches the consumer by constructing the render head
//!    over the same handles, which is the consumer-ready acknowledgment.
//!
//! Teardown releases the generator from its wait with the distinguished
//! shutdown value and joins the thread; the shared block is dropped as one
//! unit when the last handle goes away.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use syrinx_core::envelopes::GateEnv;

use crate::backend::{self, BackendKind};
use crate::error::{BackendError, SessionError};
use crate::generator::{self, BackendFactory, FromGenerator, GeneratorLink, ToGenerator};
use crate::render::{Controls, RenderHead};
use crate::ring::{EnvelopeChannel, KernelRing};
use crate::state::SharedState;
use crate::tap::WaveformTap;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Session geometry and bootstrap parameters. The kernel count doubles as
/// the generator's lag bound: it may run `kernel_count - 1` kernels behind
/// before stale audio goes out.
#[derive(Copy, Clone, Debug)]
pub struct SessionConfig {
    pub sample_rate: u32,
    pub kernel_length: usize,
    pub kernel_count: usize,
    pub backend: BackendKind,
    pub frequency_hz: f32,
    pub gate_attack_ms: f32,
    pub gate_release_ms: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            kernel_length: 1024,
            kernel_count: 4,
            backend: BackendKind::CpuSine,
            frequency_hz: 440.0,
            gate_attack_ms: 5.0,
            gate_release_ms: 50.0,
        }
    }
}

impl SessionConfig {
    fn validate(&self) -> Result<(), SessionError> {
        if self.sample_rate == 0 {
            return Err(SessionError::InvalidConfig("sample_rate must be nonzero".into()));
        }
        if self.kernel_length == 0 {
            return Err(SessionError::InvalidConfig("kernel_length must be nonzero".into()));
        }
        if self.kernel_count < 2 {
            return Err(SessionError::InvalidConfig(
                "kernel_count must be at least 2 (one draining, one refilling)".into(),
            ));
        }
        Ok(())
    }
}

/// A live synthesis session: owns the generator thread and the shared block.
///
/// Dropping the session shuts the generator down. The render head returned by
/// [`Session::initialize`] stays valid for the session's lifetime and emits
/// silence afterwards only via its own failure path; tear the host stream
/// down first.
pub struct Session {
    state: Arc<SharedState>,
    ring: Arc<KernelRing>,
    controls: Arc<Controls>,
    generator: Option<JoinHandle<()>>,
    msg_rx: Receiver<FromGenerator>,
}

impl Session {
    /// Bring up a session with one of the built-in backends.
    pub fn initialize(config: SessionConfig) -> Result<(Session, RenderHead), SessionError> {
        let kind = config.backend;
        let kernel_len = config.kernel_length;
        Self::initialize_with_backend(config, Box::new(move || backend::create(kind, kernel_len)))
    }

    /// Bring up a session with a custom backend factory. The factory runs on
    /// the generator thread, where a compute device would want to live.
    pub fn initialize_with_backend(
        config: SessionConfig,
        factory: BackendFactory,
    ) -> Result<(Session, RenderHead), SessionError> {
        config.validate()?;

        let state = Arc::new(SharedState::new(config.frequency_hz));
        let ring = Arc::new(KernelRing::new(config.kernel_length, config.kernel_count));
        let envelope = Arc::new(EnvelopeChannel::new(config.kernel_length));
        let controls = Arc::new(Controls::new(config.frequency_hz));

        let (ctl_tx, ctl_rx) = mpsc::channel();
        let (msg_tx, msg_rx) = mpsc::channel();

        let link = GeneratorLink {
            state: Arc::clone(&state),
            ring: Arc::clone(&ring),
            envelope: Arc::clone(&envelope),
        };
        let generator = generator::spawn(link, factory, ctl_rx, msg_tx)?;

        // Phase 1: bootstrap. The channel cannot be closed yet; the thread
        // was just spawned and holds the receiver.
        let _ = ctl_tx.send(ToGenerator::Bootstrap { sample_rate: config.sample_rate });

        // Phase 2: wait for the generator's acknowledgment (or its refusal).
        match msg_rx.recv_timeout(HANDSHAKE_TIMEOUT) {
            Ok(FromGenerator::BuffersLive) => {}
            Ok(FromGenerator::BackendFailed(e)) => {
                let _ = generator.join();
                return Err(SessionError::Backend(e));
            }
            Err(RecvTimeoutError::Timeout) => {
                state.request_shutdown();
                let _ = generator.join();
                return Err(SessionError::HandshakeTimeout);
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = generator.join();
                return Err(SessionError::GeneratorGone);
            }
        }
        log::info!(
            "session live: {} Hz, {} x {}-sample kernels, backend {:?}",
            config.sample_rate, config.kernel_count, config.kernel_length, config.backend
        );

        // Phase 3: consumer attachment. Constructing the head over the live
        // handles is the consumer-ready step; from here the host may start
        // its callback clock.
        let head = RenderHead::new(
            Arc::clone(&state),
            Arc::clone(&ring),
            envelope,
            Arc::clone(&controls),
            GateEnv::new(config.gate_attack_ms, config.gate_release_ms, config.sample_rate as f32),
        );

        Ok((
            Session { state, ring, controls, generator: Some(generator), msg_rx },
            head,
        ))
    }

    /// Parameter entry points (frequency, gate). Cloneable, cheap, callable
    /// from any thread.
    pub fn controls(&self) -> Arc<Controls> {
        Arc::clone(&self.controls)
    }

    /// Read-only waveform tap over the same handles.
    pub fn tap(&self) -> WaveformTap {
        WaveformTap::new(Arc::clone(&self.state), Arc::clone(&self.ring))
    }

    /// Kernel boundaries that found the previous request unconsumed.
    pub fn overruns(&self) -> u32 {
        self.state.overruns()
    }

    /// Render requests issued so far.
    pub fn signals(&self) -> u32 {
        self.state.signals()
    }

    /// True once the generator has reported a mid-session backend failure.
    pub fn generator_failed(&self) -> bool {
        self.state.generator_failed()
    }

    /// Retrieve a pending failure notification, if the generator sent one.
    pub fn take_failure(&self) -> Option<BackendError> {
        loop {
            match self.msg_rx.try_recv() {
                Ok(FromGenerator::BackendFailed(e)) => return Some(e),
                Ok(other) => {
                    log::warn!("session: ignoring unexpected generator message: {other:?}");
                }
                Err(_) => return None,
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.state.request_shutdown();
        if let Some(generator) = self.generator.take() {
            let _ = generator.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use std::time::Instant;

    #[test]
    fn config_validation_rejects_degenerate_rings() {
        let bad = SessionConfig { kernel_count: 1, ..SessionConfig::default() };
        assert!(matches!(
            Session::initialize(bad),
            Err(SessionError::InvalidConfig(_))
        ));
        let bad = SessionConfig { kernel_length: 0, ..SessionConfig::default() };
        assert!(matches!(
            Session::initialize(bad),
            Err(SessionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn backend_bootstrap_failure_aborts_the_handshake() {
        let err = Session::initialize_with_backend(
            SessionConfig::default(),
            Box::new(|| Err(BackendError::Unavailable("no compute device".into()))),
        );
        assert!(matches!(
            err,
            Err(SessionError::Backend(BackendError::Unavailable(_)))
        ));
    }

    #[test]
    fn full_protocol_round_trip_produces_audio() {
        let config = SessionConfig {
            kernel_length: 256,
            kernel_count: 4,
            ..SessionConfig::default()
        };
        let (session, mut head) = Session::initialize(config).unwrap();
        let mut out = vec![0.0f32; 128];

        // Drive quanta until the generator's first kernel lands in the ring;
        // the first signal goes out at the first boundary, so fresh audio is
        // audible from the second lap at the latest.
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut heard = false;
        while Instant::now() < deadline {
            head.process(&mut out);
            if out.iter().any(|&s| s.abs() > 1e-3) {
                heard = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(heard, "generator never filled a kernel");
        assert!(session.signals() >= 1);
        assert!(session.take_failure().is_none());
    }

    #[test]
    fn teardown_joins_a_waiting_generator() {
        let (session, _head) = Session::initialize(SessionConfig::default()).unwrap();
        // Never signaled: the generator is parked in its wait. Dropping must
        // release and join it rather than hang.
        drop(session);
    }

    #[test]
    fn offload_backend_completes_the_same_handshake() {
        let config = SessionConfig {
            backend: BackendKind::Offload,
            kernel_length: 256,
            ..SessionConfig::default()
        };
        let (session, mut head) = Session::initialize(config).unwrap();
        let mut out = vec![0.0f32; 128];
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut heard = false;
        while Instant::now() < deadline {
            head.process(&mut out);
            if out.iter().any(|&s| s.abs() > 1e-3) {
                heard = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(heard, "offloaded generator never filled a kernel");
        drop(session);
    }
}
