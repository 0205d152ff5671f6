//! Math backend selection, phase accumulation, and kernel fill routines.
//!
//! Design goals:
//! - `no_std` ready (guarded by the crate feature `no-std`)
//! - Math backend selection that works in both `std` and `no_std` contexts
//! - Optional `fast-math` approximation for the kernel fill hot path
//! - Phase continuity across kernel boundaries is a hard contract: two
//!   consecutive fills at a constant frequency must join to better than 1e-5
//!   against the ideal sine
//!
//! Conventions:
//! - A "kernel" is whatever slice the caller hands in; these routines do not
//!   know (or care) about the ring layout above them.
//! - All functions are `#[inline]` where useful to help the optimizer.

#![allow(clippy::excessive_precision)]

use core::f32::consts::PI;

use cfg_if::cfg_if;

// ----------------------------- Math backend selection -----------------------------

cfg_if! {
    // micromath preferred if explicitly requested (works in no_std)
    if #[cfg(feature = "micromath")] {
        use micromath::F32Ext as _;
        #[inline] fn m_sin(x: f32) -> f32 { x.sin() }
        #[inline] fn m_exp(x: f32) -> f32 { x.exp() }
    // libm (C math) in no_std
    } else if #[cfg(feature = "no-std")] {
        #[inline] fn m_sin(x: f32) -> f32 { libm::sinf(x) }
        #[inline] fn m_exp(x: f32) -> f32 { libm::expf(x) }
    // std backend
    } else {
        #[inline] fn m_sin(x: f32) -> f32 { x.sin() }
        #[inline] fn m_exp(x: f32) -> f32 { x.exp() }
    }
}

// --------------------------------- Constants -------------------------------------

/// 2π (commonly useful)
pub const TAU: f32 = 2.0 * PI;

/// 2π at `f64` precision, for phase bookkeeping.
pub const TAU64: f64 = core::f64::consts::TAU;

// --------------------------------- Utilities -------------------------------------

#[inline]
pub fn clamp(x: f32, lo: f32, hi: f32) -> f32 {
    if x < lo { lo } else if x > hi { hi } else { x }
}

/// One-pole smoothing coefficient for a time constant `t_ms` (milliseconds).
///
/// The discrete one-pole form: `y[n] += (x[n] - y[n]) * (1 - a)`
/// where `a = exp(-1/(tau * sr))` for first-order lag with time constant `tau`.
#[inline]
pub fn one_pole_coeff_ms(t_ms: f32, sr: f32) -> f32 {
    if t_ms <= 0.0 { return 0.0; }
    let tau = t_ms * 0.001;
    m_exp(-1.0 / (tau * sr))
}

// ------------------------------ Phase accumulator ---------------------------------

/// Free-running oscillator phase, kept in radians at `f64` precision.
///
/// `f32` accumulation drifts past the kernel-boundary tolerance after a few
/// thousand samples; `f64` keeps the error orders of magnitude below it. The
/// accumulator only ever resets at construction, never between kernels.
#[derive(Copy, Clone, Debug, Default)]
pub struct Phase {
    radians: f64,
}

impl Phase {
    #[inline]
    pub fn new() -> Self {
        Self { radians: 0.0 }
    }

    /// Per-sample phase increment for `freq_hz` at sample rate `sr`.
    #[inline]
    pub fn increment(freq_hz: f32, sr: f32) -> f64 {
        TAU64 * f64::from(freq_hz) / f64::from(sr.max(1.0))
    }

    /// Current phase, reduced for the `f32` sine evaluators.
    #[inline]
    pub fn radians(&self) -> f32 {
        self.radians as f32
    }

    /// Advance by one sample. `inc` must be below 2π (i.e. `freq < sr`).
    #[inline]
    pub fn advance(&mut self, inc: f64) {
        self.radians += inc;
        if self.radians >= TAU64 {
            self.radians -= TAU64;
        }
    }
}

// --------------------------------- Kernel fill ------------------------------------

/// Sine evaluator for the fill loop.
///
/// With `fast-math`: 5th-order odd polynomial after range reduction, max abs
/// error ~1e-3: fine for musical noise beds, NOT for the boundary-continuity
/// contract. Without it: exact `sin`.
#[inline]
fn sine(x: f32) -> f32 {
    cfg_if! {
        if #[cfg(feature = "fast-math")] {
            let mut xr = x;
            let k = (xr / TAU).round();
            xr -= k * TAU;

            // sin(x) ≈ x * (a + b x^2 + c x^4)
            let x2 = xr * xr;
            xr * (0.999_979_313_3 + x2 * (-0.166_624_432_0 + x2 * 0.008_308_978_98))
        } else {
            m_sin(x)
        }
    }
}

/// Fill `out` with a sine at `freq_hz`, advancing `phase` by one sample per
/// element. Calling this for consecutive kernels with the same frequency
/// produces a stream with no seam at the boundary.
#[inline]
pub fn fill_sine(out: &mut [f32], phase: &mut Phase, freq_hz: f32, sr: f32) {
    let inc = Phase::increment(freq_hz, sr);
    for y in out.iter_mut() {
        *y = sine(phase.radians());
        phase.advance(inc);
    }
}

// --------------------------------- Tests (std only) ------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_orders_bounds() {
        assert_eq!(clamp(-2.0, -1.0, 1.0), -1.0);
        assert_eq!(clamp(2.0, -1.0, 1.0), 1.0);
        assert_eq!(clamp(0.25, -1.0, 1.0), 0.25);
    }

    #[test]
    fn one_pole_coeff_in_unit_range() {
        for ms in [0.0, 1.0, 5.0, 50.0, 500.0] {
            let a = one_pole_coeff_ms(ms, 48000.0);
            assert!((0.0..1.0).contains(&a), "ms={ms} a={a}");
        }
    }

    #[test]
    fn sine_fill_tracks_ideal_phase() {
        let sr = 48000.0;
        let freq = 440.0;
        let mut phase = Phase::new();
        let mut kernel = vec![0.0f32; 1024];
        fill_sine(&mut kernel, &mut phase, freq, sr);

        for (n, &s) in kernel.iter().enumerate() {
            let expected = (TAU64 * f64::from(freq) * n as f64 / f64::from(sr)).sin() as f32;
            assert!((s - expected).abs() < 1e-5, "n={n} s={s} expected={expected}");
        }
    }

    #[test]
    fn consecutive_kernels_join_without_seam() {
        let sr = 48000.0;
        let freq = 440.0;
        let mut phase = Phase::new();
        let mut a = vec![0.0f32; 1024];
        let mut b = vec![0.0f32; 1024];
        fill_sine(&mut a, &mut phase, freq, sr);
        fill_sine(&mut b, &mut phase, freq, sr);

        // Last sample of kernel A and first sample of kernel B against the
        // ideal stream positions 1023 and 1024.
        for (n, s) in [(1023usize, a[1023]), (1024usize, b[0])] {
            let expected = (TAU64 * f64::from(freq) * n as f64 / f64::from(sr)).sin() as f32;
            assert!((s - expected).abs() < 1e-5, "n={n} s={s} expected={expected}");
        }
    }

    #[test]
    fn long_run_phase_stays_bounded() {
        let sr = 48000.0;
        let mut phase = Phase::new();
        let mut kernel = vec![0.0f32; 1024];
        for _ in 0..200 {
            fill_sine(&mut kernel, &mut phase, 440.0, sr);
        }
        // f32 rounding may land exactly on 2π; anything beyond that means the
        // accumulator stopped wrapping.
        assert!(phase.radians() >= 0.0 && f64::from(phase.radians()) <= TAU64 + 1e-6);
    }
}
