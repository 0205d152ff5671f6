//! Syrinx CLI — real-time player for the kernel-ring engine.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::error::Error;
use std::time::{Duration, Instant};
use syrinx_engine::{BackendKind, RenderHead, Session, SessionConfig};

#[derive(Debug, Default)]
struct Args {
    list_devices: bool,
    device_name: Option<String>,
    sample_rate: Option<u32>,
    channels: Option<u16>,
    duration_sec: Option<u64>,
    freq: Option<f32>,
    gain: Option<f32>,
    backend: Option<String>,
    kernel_length: Option<usize>,
    kernel_count: Option<usize>,
    pulse_sec: Option<f32>,
}

fn parse_args() -> Args {
    let mut a = Args::default();
    for s in std::env::args().skip(1) {
        if s == "--list-devices" { a.list_devices = true; continue; }
        if let Some(rest) = s.strip_prefix("--device=")        { a.device_name   = Some(rest.to_string()); continue; }
        if let Some(rest) = s.strip_prefix("--sample-rate=")   { a.sample_rate   = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--channels=")      { a.channels      = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--duration=")      { a.duration_sec  = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--freq=")          { a.freq          = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--gain=")          { a.gain          = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--backend=")       { a.backend       = Some(rest.to_string()); continue; }
        if let Some(rest) = s.strip_prefix("--kernel-length=") { a.kernel_length = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--kernel-count=")  { a.kernel_count  = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--pulse=")         { a.pulse_sec     = rest.parse().ok();      continue; }
        log::warn!("unknown arg: {s}");
    }
    a
}

fn list_output_devices() -> Result<(), Box<dyn Error>> {
    let host = cpal::default_host();
    println!("Available output devices:");
    for dev in host.output_devices()? {
        println!("- {}", dev.name()?);
    }
    Ok(())
}

fn pick_device(args: &Args) -> Result<cpal::Device, Box<dyn Error>> {
    let host = cpal::default_host();
    if let Some(name) = &args.device_name {
        for d in host.output_devices()? {
            if d.name()? == *name { return Ok(d); }
        }
        return Err(format!("requested device not found: {name}").into());
    }
    host.default_output_device()
        .ok_or_else(|| "no default output device".into())
}

fn choose_config(
    device: &cpal::Device,
    req_sr: Option<u32>,
) -> Result<cpal::SupportedStreamConfig, Box<dyn Error>> {
    // If nothing requested, default is already concrete.
    let Some(sr) = req_sr else {
        return Ok(device.default_output_config()?);
    };

    // Prefer an f32 range containing the requested rate; fall back to any
    // range containing it, then to the device default.
    let ranges: Vec<_> = device.supported_output_configs()?.collect();
    let containing = |r: &&cpal::SupportedStreamConfigRange| {
        (r.min_sample_rate().0..=r.max_sample_rate().0).contains(&sr)
    };
    let picked = ranges
        .iter()
        .filter(|r| r.sample_format() == cpal::SampleFormat::F32)
        .find(containing)
        .or_else(|| ranges.iter().find(containing));

    match picked {
        Some(range) => Ok(range.clone().with_sample_rate(cpal::SampleRate(sr))),
        None => {
            log::warn!("device does not support {sr} Hz, using its default config");
            Ok(device.default_output_config()?)
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    cfg: &cpal::StreamConfig,
    mut head: RenderHead,
    gain: f32,
    err_fn: impl Fn(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, Box<dyn Error>>
where
    T: cpal::Sample + cpal::FromSample<f32> + cpal::SizedSample + Send + 'static,
{
    let channels = cfg.channels as usize;
    // Mono scratch the head renders into; frames beyond this are processed in
    // blocks, so no allocation happens inside the callback.
    let mut mono = vec![0.0f32; 4096];

    let stream = device.build_output_stream(
        cfg,
        move |output: &mut [T], _| {
            let total = output.len() / channels;
            let mut frames = output.chunks_mut(channels);
            let mut done = 0;
            while done < total {
                let n = (total - done).min(mono.len());
                head.process(&mut mono[..n]);
                for &s in &mono[..n] {
                    let Some(frame) = frames.next() else { return };
                    let v: T = T::from_sample((s * gain).clamp(-1.0, 1.0));
                    for ch in frame.iter_mut() { *ch = v; }
                }
                done += n;
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = parse_args();

    if args.list_devices {
        list_output_devices()?;
        return Ok(());
    }

    println!("syrinx-cli — kernel-ring synthesis player\n");

    let device  = pick_device(&args)?;
    let sup_cfg = choose_config(&device, args.sample_rate)?;
    let sample_format = sup_cfg.sample_format();
    let mut cfg = sup_cfg.config();
    if let Some(ch) = args.channels { cfg.channels = ch; }

    let backend = match args.backend.as_deref() {
        Some(s) => s.parse::<BackendKind>()?,
        None => BackendKind::CpuSine,
    };
    let config = SessionConfig {
        sample_rate: cfg.sample_rate.0,
        backend,
        frequency_hz: args.freq.unwrap_or(440.0),
        kernel_length: args.kernel_length.unwrap_or(1024),
        kernel_count: args.kernel_count.unwrap_or(4),
        ..SessionConfig::default()
    };
    let gain = args.gain.unwrap_or(0.35);

    println!("Using device: {}", device.name()?);
    println!("Stream config: {:?} (sample_format: {:?})", cfg, sample_format);
    println!(
        "Backend: {:?}  | Kernels: {} x {}  | Freq: {:.1} Hz  | Gain: {:.2}",
        config.backend, config.kernel_count, config.kernel_length, config.frequency_hz, gain
    );
    if let Some(d) = args.duration_sec { println!("Auto-stop after {d} seconds"); }
    println!("Press Ctrl+C to stop…\n");

    // Fail-fast: no backend, no session, no stream.
    let (session, head) = Session::initialize(config)?;
    let controls = session.controls();
    let tap = session.tap();

    let err_fn = |e: cpal::StreamError| log::error!("stream error: {e}");
    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &cfg, head, gain, err_fn)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &cfg, head, gain, err_fn)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &cfg, head, gain, err_fn)?,
        other => return Err(format!("unsupported device sample format: {other:?}").into()),
    };

    stream.play()?;

    // Host-side loop: meter via the read-only tap, optional gate pulsing,
    // overrun reporting, duration handling.
    let started = Instant::now();
    let mut scratch = vec![0.0f32; tap.kernel_len()];
    let mut last_report = Instant::now();
    let mut gate_open = true;
    let mut last_pulse = Instant::now();

    loop {
        std::thread::sleep(Duration::from_millis(100));

        if let Some(d) = args.duration_sec {
            if started.elapsed() >= Duration::from_secs(d) {
                return Ok(());
            }
        }

        if let Some(p) = args.pulse_sec {
            if last_pulse.elapsed() >= Duration::from_secs_f32(p.max(0.05)) {
                gate_open = !gate_open;
                if gate_open { controls.gate_on() } else { controls.gate_off() }
                last_pulse = Instant::now();
            }
        }

        if let Some(e) = session.take_failure() {
            log::error!("generator stopped: {e}; output is silent");
        }

        if last_report.elapsed() >= Duration::from_millis(500) {
            log::info!(
                "peak ~ {:.3} | signals {} | overruns {}",
                tap.peak(&mut scratch),
                session.signals(),
                session.overruns()
            );
            last_report = Instant::now();
        }
    }
}
