//! Synthesis backends: the interchangeable strategy behind the generator's
//! compute step.
//!
//! The ring protocol does not care how a kernel gets filled. A backend is
//! anything that can produce `kernel_len` phase-continuous samples on demand:
//!
//! - [`CpuBackend`] renders directly on the generator thread (sine or the
//!   classic white-noise kernel);
//! - [`OffloadBackend`] submits the kernel to its own worker, awaits
//!   completion, and copies the result into the shared region; this is the
//!   shape of a GPU compute pass, and the latency the ring's multi-kernel
//!   depth is sized to absorb.
//!
//! Backends are constructed on the generator thread during the handshake and
//! construction can fail; the session then aborts instead of falling back,
//! because the render head has no other data path.

use std::str::FromStr;
use std::sync::mpsc;
use std::thread;

use rand::Rng;
use syrinx_core::dsp::{fill_sine, Phase};

use crate::error::BackendError;

/// Backend selection, decided at bootstrap.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// Direct sine synthesis on the generator thread.
    CpuSine,
    /// Direct white-noise kernels on the generator thread.
    CpuNoise,
    /// Sine synthesis delegated to a dedicated compute worker.
    Offload,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu-sine" | "sine" => Ok(Self::CpuSine),
            "cpu-noise" | "noise" => Ok(Self::CpuNoise),
            "offload" => Ok(Self::Offload),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

/// Anything that can fill one kernel.
///
/// Implementations own whatever private state survives between kernels (for
/// the built-in backends that is exactly the oscillator phase, which must
/// never reset mid-session).
pub trait SynthBackend: Send {
    fn label(&self) -> &'static str;

    /// Synthesize `out.len()` samples at `frequency`/`sample_rate`. The
    /// slice is the ring segment itself; on `Err` its contents are
    /// unspecified and the generator stops producing.
    fn render(&mut self, frequency: f32, sample_rate: f32, out: &mut [f32])
        -> Result<(), BackendError>;
}

/// Construct the backend for `kind`. Runs on the generator thread.
pub fn create(kind: BackendKind, kernel_len: usize) -> Result<Box<dyn SynthBackend>, BackendError> {
    match kind {
        BackendKind::CpuSine => Ok(Box::new(CpuBackend::sine())),
        BackendKind::CpuNoise => Ok(Box::new(CpuBackend::noise())),
        BackendKind::Offload => Ok(Box::new(OffloadBackend::create(kernel_len)?)),
    }
}

// ------------------------------- CPU backend --------------------------------------

enum CpuWave {
    Sine,
    Noise,
}

/// Direct synthesis on the calling thread.
pub struct CpuBackend {
    wave: CpuWave,
    phase: Phase,
}

impl CpuBackend {
    pub fn sine() -> Self {
        Self { wave: CpuWave::Sine, phase: Phase::new() }
    }

    pub fn noise() -> Self {
        Self { wave: CpuWave::Noise, phase: Phase::new() }
    }
}

impl SynthBackend for CpuBackend {
    fn label(&self) -> &'static str {
        match self.wave {
            CpuWave::Sine => "cpu-sine",
            CpuWave::Noise => "cpu-noise",
        }
    }

    fn render(&mut self, frequency: f32, sample_rate: f32, out: &mut [f32])
        -> Result<(), BackendError>
    {
        match self.wave {
            CpuWave::Sine => {
                let f = frequency.clamp(0.0, 0.5 * sample_rate);
                fill_sine(out, &mut self.phase, f, sample_rate);
            }
            CpuWave::Noise => {
                let mut rng = rand::thread_rng();
                for y in out.iter_mut() {
                    *y = rng.gen::<f32>() - 0.5;
                }
            }
        }
        Ok(())
    }
}

// ----------------------------- Offloaded backend ----------------------------------

struct Job {
    frequency: f32,
    sample_rate: f32,
    buf: Vec<f32>,
}

/// Kernel synthesis on a dedicated compute worker.
///
/// `render` submits the job, blocks until the worker hands the filled buffer
/// back, and copies it into the shared region. Two buffers ping-pong over the
/// channels, so nothing allocates after construction. If the worker dies the
/// next render reports `WorkerGone`, the mid-session "device lost" path.
pub struct OffloadBackend {
    job_tx: Option<mpsc::SyncSender<Job>>,
    done_rx: mpsc::Receiver<Vec<f32>>,
    spare: Option<Vec<f32>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl OffloadBackend {
    pub fn create(kernel_len: usize) -> Result<Self, BackendError> {
        let (job_tx, job_rx) = mpsc::sync_channel::<Job>(1);
        let (done_tx, done_rx) = mpsc::channel::<Vec<f32>>();

        let worker = thread::Builder::new()
            .name("syrinx-offload".into())
            .spawn(move || {
                let mut phase = Phase::new();
                while let Ok(mut job) = job_rx.recv() {
                    let f = job.frequency.clamp(0.0, 0.5 * job.sample_rate);
                    fill_sine(&mut job.buf, &mut phase, f, job.sample_rate);
                    if done_tx.send(job.buf).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        Ok(Self {
            job_tx: Some(job_tx),
            done_rx,
            spare: Some(vec![0.0; kernel_len]),
            worker: Some(worker),
        })
    }
}

impl SynthBackend for OffloadBackend {
    fn label(&self) -> &'static str {
        "offload"
    }

    fn render(&mut self, frequency: f32, sample_rate: f32, out: &mut [f32])
        -> Result<(), BackendError>
    {
        let mut buf = self.spare.take().unwrap_or_default();
        buf.resize(out.len(), 0.0);

        let tx = self.job_tx.as_ref().ok_or(BackendError::WorkerGone)?;
        tx.send(Job { frequency, sample_rate, buf })
            .map_err(|_| BackendError::WorkerGone)?;

        // Await completion; this is the latency the ring depth absorbs.
        let buf = self.done_rx.recv().map_err(|_| BackendError::WorkerGone)?;
        out.copy_from_slice(&buf[..out.len()]);
        self.spare = Some(buf);
        Ok(())
    }
}

impl Drop for OffloadBackend {
    fn drop(&mut self) {
        // Hang up first so the worker's recv loop ends, then reap it.
        self.job_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
