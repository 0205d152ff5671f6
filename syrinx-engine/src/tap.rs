//! Read-only waveform tap for visualizers.
//!
//! The tap polls the cursor once per snapshot and copies the segment the
//! render head is draining: fully written, stable for an entire kernel
//! period, and never the generator's write target (which is one segment
//! behind the cursor). It needs no handshake beyond holding the same
//! handles, runs on whatever schedule the display uses, and tolerates the
//! generator writing elsewhere concurrently.

use std::sync::Arc;

use crate::ring::KernelRing;
use crate::state::SharedState;

#[derive(Clone)]
pub struct WaveformTap {
    state: Arc<SharedState>,
    ring: Arc<KernelRing>,
}

impl WaveformTap {
    pub(crate) fn new(state: Arc<SharedState>, ring: Arc<KernelRing>) -> Self {
        Self { state, ring }
    }

    /// Samples per snapshot.
    pub fn kernel_len(&self) -> usize {
        self.ring.kernel_len()
    }

    /// Copy the newest stable kernel into `out`; returns the number of
    /// samples written (`min(out.len(), kernel_len)`).
    pub fn snapshot(&self, out: &mut [f32]) -> usize {
        let cursor = self.state.cursor() as usize % self.ring.kernel_count();
        self.ring.copy_kernel(cursor, out)
    }

    /// Peak absolute amplitude of the newest stable kernel, for cheap meters.
    pub fn peak(&self, scratch: &mut [f32]) -> f32 {
        let n = self.snapshot(scratch);
        scratch[..n].iter().fold(0.0f32, |m, &s| m.max(s.abs()))
    }
}
