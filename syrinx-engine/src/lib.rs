//! Syrinx Engine — kernel-ring rendezvous between a realtime render head and
//! a free-running generator.
//!
//! Crate layout:
//! - [`state`]     : shared state block (atomic slots + wake primitive)
//! - [`ring`]      : sample ring and amplitude side-channel
//! - [`backend`]   : pluggable synthesis backends (CPU-direct, offloaded)
//! - [`render`]    : the consumer (host-clock-driven, never blocks)
//! - [`session`]   : handshake coordinator and session lifetime
//! - [`tap`]       : read-only waveform tap for visualizers
//! - [`error`]     : error taxonomy (`thiserror`)
//!
//! The engine deliberately keeps the realtime path free of locks and heap
//! work: the render head and the generator share a fixed block of atomic
//! words and a preallocated ring, and meet only at kernel boundaries through
//! a one-shot request flag. Falling behind degrades to counted, audibly
//! stale kernels, never to blocking the host callback.

pub mod backend;
pub mod error;
mod generator;
pub mod render;
pub mod ring;
pub mod session;
pub mod state;
pub mod tap;

// Re-export the session-facing surface for downstream hosts.
pub use backend::{BackendKind, SynthBackend};
pub use generator::BackendFactory;
pub use error::{BackendError, SessionError};
pub use render::{Controls, RenderHead};
pub use session::{Session, SessionConfig};
pub use tap::WaveformTap;
