//! C ABI wrapper for the Syrinx engine.
//!
//! Exposes a small set of functions to create/destroy a synthesis session,
//! render interleaved f32 samples, and drive the two live parameters
//! (frequency, gate).
//!
//! ABI notes
//! - All functions are `extern "C"` and `#[no_mangle]`.
//! - Opaque handle type: `SyrinxSession` (heap-allocated; you own/delete it).
//! - Render path produces **mono** internally and duplicates to N channels.
//!
//! Threading
//! - `syrinx_render_interleaved_f32` must always be called from the same
//!   (audio) thread; the parameter setters may be called from any thread.

use std::sync::Arc;

use syrinx_engine::{Controls, RenderHead, Session, SessionConfig};

/// Opaque session wrapper we hand to C.
///
/// Owns the engine session (generator thread included) and the render head.
/// The mono scratch buffer grows to the largest frame count seen, then stays
/// put, so steady-state rendering does not allocate.
pub struct SyrinxSession {
    session: Session,
    head: RenderHead,
    controls: Arc<Controls>,
    mono: Vec<f32>,
}

impl SyrinxSession {
    fn new(sample_rate: u32) -> Option<Self> {
        let config = SessionConfig { sample_rate, ..SessionConfig::default() };
        let (session, head) = Session::initialize(config).ok()?;
        let controls = session.controls();
        Some(Self { session, head, controls, mono: Vec::new() })
    }
}

// --- Creation / destruction -------------------------------------------------------

/// Create a new session with the default CPU sine backend.
/// Returns a non-null pointer on success, or null if the handshake failed.
#[no_mangle]
pub extern "C" fn syrinx_create(sample_rate: u32) -> *mut SyrinxSession {
    match SyrinxSession::new(sample_rate) {
        Some(s) => Box::into_raw(Box::new(s)),
        None => std::ptr::null_mut(),
    }
}

/// Destroy a session previously returned by `syrinx_create`. Tears the
/// generator thread down before returning.
#[no_mangle]
pub extern "C" fn syrinx_destroy(session: *mut SyrinxSession) {
    if !session.is_null() {
        unsafe { drop(Box::from_raw(session)); }
    }
}

// --- Rendering -------------------------------------------------------------------

/// Render `frames` of audio into an interleaved f32 buffer with `channels`
/// channels. The engine is mono; the sample is duplicated to all channels.
///
/// Returns the number of frames rendered (0 on error).
#[no_mangle]
pub extern "C" fn syrinx_render_interleaved_f32(
    session: *mut SyrinxSession,
    out_interleaved: *mut f32,
    frames: u32,
    channels: u32,
) -> u32 {
    if session.is_null() || out_interleaved.is_null() || frames == 0 || channels == 0 {
        return 0;
    }
    let s = unsafe { &mut *session };
    let out = unsafe {
        std::slice::from_raw_parts_mut(out_interleaved, (frames as usize) * (channels as usize))
    };

    let n = frames as usize;
    if s.mono.len() < n {
        s.mono.resize(n, 0.0);
    }
    s.head.process(&mut s.mono[..n]);

    let ch = channels as usize;
    let mut idx = 0usize;
    for &v in &s.mono[..n] {
        for _c in 0..ch {
            out[idx] = v;
            idx += 1;
        }
    }
    frames
}

// --- Parameter helpers ------------------------------------------------------------

/// Set the requested oscillator frequency in Hz. Non-finite values are
/// ignored; negatives clamp to zero.
#[no_mangle]
pub extern "C" fn syrinx_set_frequency(session: *mut SyrinxSession, hz: f32) {
    if session.is_null() || !hz.is_finite() { return; }
    let s = unsafe { &*session };
    s.controls.set_frequency(hz);
}

/// Open the amplitude gate.
#[no_mangle]
pub extern "C" fn syrinx_gate_on(session: *mut SyrinxSession) {
    if session.is_null() { return; }
    let s = unsafe { &*session };
    s.controls.gate_on();
}

/// Close the amplitude gate.
#[no_mangle]
pub extern "C" fn syrinx_gate_off(session: *mut SyrinxSession) {
    if session.is_null() { return; }
    let s = unsafe { &*session };
    s.controls.gate_off();
}

/// Number of kernel boundaries where the generator had not yet consumed the
/// previous request (stale audio went out). 0 if the handle is null.
#[no_mangle]
pub extern "C" fn syrinx_overruns(session: *const SyrinxSession) -> u32 {
    if session.is_null() { return 0; }
    let s = unsafe { &*session };
    s.session.overruns()
}
