//! BPM extraction (§4.3).
//!
//! Two paths, tried in this order:
//! 1. A `...<digits>[.<digits>]bpm...` hint in the filename — cheap and, per
//!    the design, deliberately preferred over decoding.
//! 2. Demux the MP4 container with `symphonia`, decode up to ~30s of the
//!    default audio track to mono f32 samples, and run the onset-detection
//!    beat-finder below.
//!
//! Any failure in step 2 (unsupported codec, corrupt container, no audio
//! track) yields BPM 0.0 — "unknown", never a match-ranking input.

use std::path::Path;
use symphonia::core::audio::AudioBufferRef;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

const MAX_DECODE_SECONDS: f64 = 30.0;
const FRAME_SIZE: usize = 1024;
const MIN_BPM: f64 = 60.0;
const MAX_BPM: f64 = 200.0;

/// Filename BPM hint: `...<digits>[.<digits>]bpm...`, case-insensitive.
pub fn bpm_from_filename(filename: &str) -> Option<f64> {
    let lower = filename.to_lowercase();
    let bpm_pos = lower.find("bpm")?;
    let prefix = &lower[..bpm_pos];
    let digits_end = prefix.len();
    let mut digits_start = digits_end;
    let mut seen_dot = false;
    let bytes = prefix.as_bytes();
    let mut i = digits_end;
    while i > 0 {
        let c = bytes[i - 1];
        if c.is_ascii_digit() {
            digits_start = i - 1;
            i -= 1;
        } else if c == b'.' && !seen_dot && i > 1 && bytes[i - 2].is_ascii_digit() {
            seen_dot = true;
            digits_start = i - 1;
            i -= 1;
        } else {
            break;
        }
    }
    if digits_start == digits_end {
        return None;
    }
    prefix[digits_start..digits_end].parse::<f64>().ok()
}

/// Decode up to `MAX_DECODE_SECONDS` of audio into mono f32 samples.
fn decode_mono(path: &Path) -> Option<(Vec<f32>, u32)> {
    let file = std::fs::File::open(path).ok()?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .ok()?;
    let mut format = probed.format;

    let track = format.default_track()?;
    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate?;
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .ok()?;

    let max_samples = (MAX_DECODE_SECONDS * sample_rate as f64) as usize;
    let mut mono = Vec::with_capacity(max_samples.min(sample_rate as usize * 30));

    while mono.len() < max_samples {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(_) => break,
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(_) => continue,
        };
        append_mono(&decoded, channels, &mut mono);
    }

    // Drop the format reader and decoder explicitly before returning so
    // container buffers are released as soon as possible.
    drop(decoder);
    drop(format);

    if mono.is_empty() {
        None
    } else {
        Some((mono, sample_rate))
    }
}

fn append_mono(buf: &AudioBufferRef, channels: usize, out: &mut Vec<f32>) {
    match buf {
        AudioBufferRef::F32(b) => push_planes(b.planes().planes(), channels, out),
        AudioBufferRef::S32(b) => {
            let planes: Vec<Vec<f32>> = b
                .planes()
                .planes()
                .iter()
                .map(|p| p.iter().map(|&s| s as f32 / i32::MAX as f32).collect())
                .collect();
            let refs: Vec<&[f32]> = planes.iter().map(|p| p.as_slice()).collect();
            push_planes(&refs, channels, out);
        }
        AudioBufferRef::S16(b) => {
            let planes: Vec<Vec<f32>> = b
                .planes()
                .planes()
                .iter()
                .map(|p| p.iter().map(|&s| s as f32 / i16::MAX as f32).collect())
                .collect();
            let refs: Vec<&[f32]> = planes.iter().map(|p| p.as_slice()).collect();
            push_planes(&refs, channels, out);
        }
        _ => {}
    }
}

fn push_planes(planes: &[&[f32]], channels: usize, out: &mut Vec<f32>) {
    if planes.is_empty() {
        return;
    }
    let frames = planes[0].len();
    if channels <= 1 || planes.len() == 1 {
        out.extend_from_slice(planes[0]);
        return;
    }
    for i in 0..frames {
        let sum: f32 = planes.iter().map(|p| p[i]).sum();
        out.push(sum / planes.len() as f32);
    }
}

/// Onset-detection beat-finder: per-frame RMS energy, positive-only
/// spectral flux, autocorrelation across BPM-range lags.
fn estimate_bpm(mono: &[f32], sample_rate: u32) -> Option<f64> {
    if mono.len() < FRAME_SIZE * 4 {
        return None;
    }

    let energies: Vec<f32> = mono
        .chunks(FRAME_SIZE)
        .map(|frame| {
            let sum_sq: f32 = frame.iter().map(|s| s * s).sum();
            (sum_sq / frame.len() as f32).sqrt()
        })
        .collect();

    // Positive-only spectral flux: onset envelope rises only on energy
    // increases (percussive onsets), ignoring decays.
    let onset: Vec<f32> = std::iter::once(0.0)
        .chain(energies.windows(2).map(|w| (w[1] - w[0]).max(0.0)))
        .collect();

    let frame_rate = sample_rate as f64 / FRAME_SIZE as f64;
    let min_lag = (60.0 * frame_rate / MAX_BPM).round() as usize;
    let max_lag = (60.0 * frame_rate / MIN_BPM).round() as usize;
    if max_lag >= onset.len() || min_lag == 0 {
        return None;
    }

    let mean = onset.iter().sum::<f32>() / onset.len() as f32;
    let centered: Vec<f32> = onset.iter().map(|v| v - mean).collect();

    let corr_at = |lag: usize| -> f32 {
        (0..(centered.len() - lag)).map(|i| centered[i] * centered[i + lag]).sum()
    };

    let mut best_lag = min_lag;
    let mut best_corr = f32::MIN;
    for lag in min_lag..=max_lag {
        let corr = corr_at(lag);
        if corr > best_corr {
            best_corr = corr;
            best_lag = lag;
        }
    }

    // Autocorrelation peaks at integer multiples of the true beat period as
    // readily as at the period itself. Prefer the fastest submultiple whose
    // correlation is still a substantial fraction of the peak, to avoid
    // reporting half (or a third) of the real tempo.
    for divisor in [4, 3, 2] {
        let candidate = best_lag / divisor;
        if candidate < min_lag {
            continue;
        }
        if corr_at(candidate) >= 0.4 * best_corr {
            best_lag = candidate;
            break;
        }
    }

    let bpm = 60.0 * frame_rate / best_lag as f64;
    Some(fold_into_range(bpm))
}

/// Fold a BPM outside `[MIN_BPM, MAX_BPM]` back in by repeated doubling or
/// halving.
fn fold_into_range(mut bpm: f64) -> f64 {
    while bpm < MIN_BPM && bpm > 0.0 {
        bpm *= 2.0;
    }
    while bpm > MAX_BPM {
        bpm /= 2.0;
    }
    (bpm * 10.0).round() / 10.0
}

/// Extract the BPM for a video file. Returns 0.0 on any failure.
pub fn extract_bpm(path: &Path, filename: &str) -> f64 {
    if let Some(hinted) = bpm_from_filename(filename) {
        debug!("bpm hint from filename {}: {}", filename, hinted);
        return hinted;
    }

    let Some((mono, sample_rate)) = decode_mono(path) else {
        debug!("bpm decode failed for {}", path.display());
        return 0.0;
    };

    estimate_bpm(&mono, sample_rate).unwrap_or(0.0)
}
