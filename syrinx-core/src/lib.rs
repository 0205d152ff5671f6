#![cfg_attr(not(feature = "std"), no_std)]
//! Syrinx Core — no_std-ready DSP primitives for the kernel-ring engine.
//!
//! Features
//! - `std`      : (default) use the Rust standard library
//! - `no-std`   : build with `#![no_std]` and use `libm`/`micromath` math backends
//! - `fast-math`: enable polynomial approximations for the kernel fill hot path
//!
//! Modules
//! - [`dsp`]       : math backend, phase accumulator, kernel fill routines
//! - [`envelopes`] : gate envelope used to paint the amplitude side-channel
//!
//! Design
//! - No heap allocations; everything ticks sample-by-sample or fills a
//!   caller-provided kernel slice
//! - Phase state is `f64` internally so consecutive kernels join without an
//!   audible (or measurable) seam; outputs stay `f32`
//! - Friendly to embedded / real-time targets

pub mod dsp;
pub mod envelopes;

/// Commonly used types/functions for convenience:
pub mod prelude {
    pub use crate::dsp::{clamp, fill_sine, one_pole_coeff_ms, Phase, TAU};
    pub use crate::envelopes::GateEnv;
}
