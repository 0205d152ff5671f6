//! Engine error types.

use thiserror::Error;

/// Errors raised by a synthesis backend.
///
/// `Unavailable` is a bootstrap failure and aborts the handshake; the other
/// variants occur mid-session, stop the generator, and leave the render head
/// emitting silence.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend could not be brought up (no worker, no device).
    #[error("synthesis backend unavailable: {0}")]
    Unavailable(String),

    /// A kernel render failed.
    #[error("kernel render failed: {0}")]
    Render(String),

    /// The offload worker disappeared mid-session (device lost).
    #[error("synthesis worker disconnected")]
    WorkerGone,
}

/// Errors raised while bringing up or tearing down a session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Rejected configuration (zero-length kernel, too few kernels, ...).
    #[error("invalid session config: {0}")]
    InvalidConfig(String),

    /// The generator thread could not be spawned.
    #[error("failed to spawn generator thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The generator reported a backend failure during the handshake.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The generator never acknowledged the bootstrap message.
    #[error("generator handshake timed out")]
    HandshakeTimeout,

    /// The generator exited before acknowledging the bootstrap message.
    #[error("generator exited during handshake")]
    GeneratorGone,
}
