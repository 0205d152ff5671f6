//! Gate envelope for the amplitude side-channel.
//!
//! The render head runs one of these at audio rate and paints the result into
//! the shared envelope buffer, one value per output sample. The generator
//! multiplies the painted values into the next kernel it synthesizes, so the
//! envelope reaches the ear one kernel lap late, acceptable for a gate and
//! exactly the staleness the ring protocol already tolerates for frequency.
//!
//! Shape: exponential (RC-like) rise towards 1 while the gate is held,
//! exponential fall towards 0 once released. No heap, `no_std` friendly.

use crate::dsp::one_pole_coeff_ms;

/// Exponential gate envelope.
///
/// Attack and release are ms time constants (RC style). The envelope opens
/// while the gate is on and falls to silence when it is off.
#[derive(Copy, Clone, Debug)]
pub struct GateEnv {
    atk_ms: f32,
    rel_ms: f32,
    sr:     f32,
    env:    f32,
    gate:   bool,
    a_a:    f32,
    a_r:    f32,
}

impl GateEnv {
    #[inline]
    pub fn new(atk_ms: f32, rel_ms: f32, sr: f32) -> Self {
        let mut s = Self {
            atk_ms, rel_ms, sr,
            env: 0.0, gate: false,
            a_a: 0.0, a_r: 0.0,
        };
        s.recalc();
        s
    }

    #[inline] pub fn set_sr(&mut self, sr: f32) { self.sr = sr.max(1.0); self.recalc(); }

    #[inline]
    pub fn set_params(&mut self, atk_ms: f32, rel_ms: f32) {
        self.atk_ms = atk_ms.max(0.0);
        self.rel_ms = rel_ms.max(0.0);
        self.recalc();
    }

    #[inline] fn recalc(&mut self) {
        self.a_a = one_pole_coeff_ms(self.atk_ms, self.sr);
        self.a_r = one_pole_coeff_ms(self.rel_ms, self.sr);
    }

    /// Gate state is level-triggered; calling this every block is fine.
    #[inline] pub fn set_gate(&mut self, on: bool) { self.gate = on; }

    #[inline]
    pub fn next(&mut self) -> f32 {
        if self.gate {
            self.env += (1.0 - self.env) * (1.0 - self.a_a);
            if self.env > 0.9999 { self.env = 1.0; }
        } else {
            self.env += (0.0 - self.env) * (1.0 - self.a_r);
            if self.env < 1e-5 { self.env = 0.0; }
        }
        self.env
    }

    #[inline] pub fn value(&self) -> f32 { self.env }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_opens_and_closes() {
        let sr = 48000.0;
        let mut e = GateEnv::new(5.0, 50.0, sr);
        e.set_gate(true);
        for _ in 0..(sr as usize / 10) { e.next(); }
        assert!(e.value() > 0.95, "open value={}", e.value());
        e.set_gate(false);
        for _ in 0..(sr as usize / 2) { e.next(); }
        assert!(e.value() < 0.01, "closed value={}", e.value());
    }

    #[test]
    fn instant_attack_snaps_open() {
        let mut e = GateEnv::new(0.0, 50.0, 48000.0);
        e.set_gate(true);
        assert!(e.next() > 0.999);
    }

    #[test]
    fn envelope_is_monotonic_within_a_segment() {
        let mut e = GateEnv::new(10.0, 100.0, 48000.0);
        e.set_gate(true);
        let mut prev = 0.0;
        for _ in 0..1000 {
            let v = e.next();
            assert!(v >= prev);
            prev = v;
        }
    }
}
