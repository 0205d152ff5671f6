//! The render head: hard-realtime consumer driven by the host audio clock.
//!
//! `process` runs once per quantum inside the host's output callback. It
//! never blocks, never allocates, and never takes a lock: it drains the ring,
//! publishes the control-rate frequency, paints the amplitude side-channel,
//! and, only when the drain crosses a kernel boundary, advances the cursor
//! and signals the generator.
//!
//! If the generator has failed, or simply never responds, the head keeps
//! returning valid output every invocation: silence in the failed case,
//! last-known (possibly stale) ring contents otherwise. Falling behind is a
//! counted, audible degradation, not a crash.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use syrinx_core::envelopes::GateEnv;

use crate::ring::{EnvelopeChannel, KernelRing};
use crate::state::{SharedState, REQUEST_IDLE};

/// External parameter entry points. Plain atomic writes, no round trip: the
/// render head forwards the latest values into the shared state block on its
/// own clock.
pub struct Controls {
    freq_bits: AtomicU32,
    gate: AtomicBool,
}

impl Controls {
    pub(crate) fn new(freq_hz: f32) -> Self {
        Self {
            freq_bits: AtomicU32::new(freq_hz.max(0.0).to_bits()),
            gate: AtomicBool::new(true),
        }
    }

    pub fn set_frequency(&self, hz: f32) {
        self.freq_bits.store(hz.max(0.0).to_bits(), Ordering::Relaxed);
    }

    pub fn frequency(&self) -> f32 {
        f32::from_bits(self.freq_bits.load(Ordering::Relaxed))
    }

    pub fn gate_on(&self) {
        self.gate.store(true, Ordering::Relaxed);
    }

    pub fn gate_off(&self) {
        self.gate.store(false, Ordering::Relaxed);
    }

    pub fn gate(&self) -> bool {
        self.gate.load(Ordering::Relaxed)
    }
}

/// Consumer endpoint of a session. One per session; owns the read position.
pub struct RenderHead {
    state: Arc<SharedState>,
    ring: Arc<KernelRing>,
    envelope: Arc<EnvelopeChannel>,
    controls: Arc<Controls>,
    gate_env: GateEnv,
    /// Absolute ring position, `0..kernel_len * kernel_count`.
    read_pos: usize,
}

impl RenderHead {
    pub(crate) fn new(
        state: Arc<SharedState>,
        ring: Arc<KernelRing>,
        envelope: Arc<EnvelopeChannel>,
        controls: Arc<Controls>,
        gate_env: GateEnv,
    ) -> Self {
        Self { state, ring, envelope, controls, gate_env, read_pos: 0 }
    }

    /// Produce one quantum of mono samples. Bounded work, no suspension
    /// points; safe to call from a device callback of any quantum size.
    pub fn process(&mut self, out: &mut [f32]) {
        if self.state.generator_failed() {
            out.fill(0.0);
            return;
        }

        // Control-rate parameter hand-off, once per quantum.
        self.state.set_frequency(self.controls.frequency());
        self.gate_env.set_gate(self.controls.gate());

        let kernel_len = self.ring.kernel_len();
        let ring_len = self.ring.len();

        let mut done = 0;
        while done < out.len() {
            let within = self.read_pos % kernel_len;
            let n = (out.len() - done).min(kernel_len - within);

            self.ring.copy_from(self.read_pos, &mut out[done..done + n]);

            // Paint this quantum's envelope at the matching window offset.
            let gate_env = &mut self.gate_env;
            self.envelope.paint(within, n, || gate_env.next());

            self.read_pos = (self.read_pos + n) % ring_len;
            done += n;

            if self.read_pos % kernel_len == 0 {
                self.kernel_boundary(kernel_len);
            }
        }
    }

    /// Crossed into a new kernel: publish the cursor, then either signal the
    /// generator or, if the previous request is still outstanding, count an
    /// overrun. Double-signaling would hand the generator a torn view of the
    /// cursor; the stale kernel is the accepted degradation instead.
    fn kernel_boundary(&mut self, kernel_len: usize) {
        let cursor = (self.read_pos / kernel_len) as u32;
        self.state.publish_cursor(cursor);

        if self.state.request() == REQUEST_IDLE {
            self.state.signal_render();
        } else {
            self.state.count_overrun();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::REQUEST_RENDER;

    fn test_head(kernel_len: usize, kernel_count: usize) -> (RenderHead, Arc<SharedState>, Arc<Controls>, Arc<EnvelopeChannel>) {
        let state = Arc::new(SharedState::new(440.0));
        let ring = Arc::new(KernelRing::new(kernel_len, kernel_count));
        let envelope = Arc::new(EnvelopeChannel::new(kernel_len));
        let controls = Arc::new(Controls::new(440.0));
        let head = RenderHead::new(
            Arc::clone(&state),
            ring,
            Arc::clone(&envelope),
            Arc::clone(&controls),
            GateEnv::new(5.0, 50.0, 48000.0),
        );
        (head, state, controls, envelope)
    }

    #[test]
    fn eight_quanta_cross_one_boundary() {
        // kernel_len=1024, kernel_count=4, quantum=128: the observed session
        // geometry. Exactly one signal per 8 invocations, cursor +1 (mod 4).
        let (mut head, state, _, _) = test_head(1024, 4);
        let mut out = vec![0.0f32; 128];

        for _ in 0..7 {
            head.process(&mut out);
        }
        assert_eq!(state.signals(), 0);
        assert_eq!(state.cursor(), 0);

        head.process(&mut out);
        assert_eq!(state.signals(), 1);
        assert_eq!(state.cursor(), 1);
        assert_eq!(state.request(), REQUEST_RENDER);
    }

    #[test]
    fn cursor_wraps_modulo_kernel_count() {
        let (mut head, state, _, _) = test_head(256, 4);
        let mut out = vec![0.0f32; 128];
        // Four full kernels = one lap; request is cleared between boundaries
        // so every boundary signals.
        for _ in 0..8 {
            head.process(&mut out);
            state.clear_request();
        }
        assert_eq!(state.cursor(), 0);
        assert_eq!(state.signals(), 4);
    }

    #[test]
    fn stalled_producer_counts_overruns_instead_of_double_signaling() {
        let (mut head, state, _, _) = test_head(1024, 4);
        let mut out = vec![0.0f32; 128];

        // Nobody ever clears the request. 24 invocations cross three
        // boundaries: the first signals, the other two must not.
        for _ in 0..24 {
            head.process(&mut out);
        }
        assert_eq!(state.signals(), 1, "re-signaled an unconsumed request");
        assert_eq!(state.overruns(), 2);
        assert_eq!(state.request(), REQUEST_RENDER);
    }

    #[test]
    fn unfilled_ring_drains_as_silence_never_garbage() {
        let (mut head, _, _, _) = test_head(1024, 4);
        let mut out = vec![1.0f32; 128];
        // A full lap of the untouched ring.
        for _ in 0..32 {
            head.process(&mut out);
            assert!(out.iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn generator_failure_degrades_to_silence() {
        let (mut head, state, _, _) = test_head(64, 4);
        state.mark_generator_failed();
        let mut out = vec![1.0f32; 128];
        head.process(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        // And no protocol traffic while failed.
        assert_eq!(state.signals(), 0);
    }

    #[test]
    fn frequency_flows_into_the_state_block_every_quantum() {
        let (mut head, state, controls, _) = test_head(1024, 4);
        let mut out = vec![0.0f32; 128];
        controls.set_frequency(880.0);
        head.process(&mut out);
        assert_eq!(state.frequency(), 880.0);
    }

    #[test]
    fn envelope_window_is_painted_at_the_drain_offset() {
        let (mut head, _, controls, envelope) = test_head(1024, 4);
        controls.gate_off();
        let mut out = vec![0.0f32; 128];
        head.process(&mut out);

        // Gate never opened: the first quantum's window must be painted at
        // (or decaying towards) zero, while the rest keeps the unity default.
        let mut probe = vec![1.0f32; 1024];
        envelope.apply(&mut probe);
        assert!(probe[..128].iter().all(|&g| g < 1.0e-3));
        assert!(probe[128..].iter().all(|&g| g == 1.0));
    }

    #[test]
    fn odd_quantum_sizes_cross_boundaries_mid_call() {
        let (mut head, state, _, _) = test_head(128, 4);
        // 96-sample quanta against 128-sample kernels: boundary lands inside
        // every third call.
        let mut out = vec![0.0f32; 96];
        for _ in 0..4 {
            head.process(&mut out);
            state.clear_request();
        }
        // 384 samples drained = 3 kernels.
        assert_eq!(state.cursor(), 3);
        assert_eq!(state.signals(), 3);
    }
}
