//! Audio renderers: BPM pulse trains and the wind soundscape.
//!
//! Both write a 16-bit PCM WAV intermediate through `hound`. The timing
//! constants below are fixed; changing any of them changes every artifact.

use crate::error::Pdf2MediaError;
use crate::pipeline::envelope::{BpmEnvelope, WindEnvelope};
use crate::pipeline::{RenderContext, PROGRESS_STRIDE, TARGET_SECS};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;
use tracing::{debug, info, warn};

/// BPM pulse-train sample rate.
pub const BPM_RATE: u32 = 3000;
pub const BPM_CHANNELS: u16 = 2;
pub const BPM_AMPLITUDE: i16 = 32000;
pub const BPM_GAIN_DB: f64 = 10.0;
/// Samples (not frames) in a finished BPM render.
pub const BPM_TARGET_SAMPLES: usize = (TARGET_SECS * BPM_RATE) as usize * BPM_CHANNELS as usize;

pub const WIND_RATE: u32 = 44100;
/// Every day gets the same slot.
pub const WIND_DAY_SECS: u32 = 30;
pub const WIND_GAIN_DB: f64 = 3.0;
/// Loop samples are divided by this before scaling by intensity.
pub const WIND_SCALE: f32 = 15.0;

/// Linear amplitude factor for `db` decibels.
pub fn db_to_gain(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

fn saturate(v: f64) -> i16 {
    v.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

fn wav_error(path: &Path, e: hound::Error) -> Pdf2MediaError {
    match e {
        hound::Error::IoError(io) => Pdf2MediaError::write(path, io),
        other => Pdf2MediaError::render(path, other),
    }
}

/// Write interleaved 16-bit samples as a WAV file.
pub fn write_wav(path: &Path, channels: u16, sample_rate: u32, samples: &[i16]) -> Result<(), Pdf2MediaError> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).map_err(|e| wav_error(path, e))?;
    {
        let mut w = writer.get_i16_writer(samples.len() as u32);
        for &s in samples {
            w.write_sample(s);
        }
        w.flush().map_err(|e| wav_error(path, e))?;
    }
    writer.finalize().map_err(|e| wav_error(path, e))
}

// ── BPM ──────────────────────────────────────────────────────────────────

/// Samples one beat at `bpm` occupies: `(60 / bpm * 2) * rate`.
pub fn beat_samples(bpm: u32) -> usize {
    ((60.0 / bpm as f64 * 2.0) * BPM_RATE as f64) as usize
}

/// Render the pulse train as one interleaved sample stream.
///
/// Every pulse is one silent stereo frame followed by [`beat_samples`]
/// samples at full amplitude. An underrunning render is padded with beats
/// at the last non-zero rate; the result is then cut to exactly
/// [`BPM_TARGET_SAMPLES`] and boosted by [`BPM_GAIN_DB`].
pub fn bpm_samples(env: &BpmEnvelope, ctx: &RenderContext<'_>) -> Result<Vec<i16>, Pdf2MediaError> {
    let mut out: Vec<i16> = Vec::with_capacity(BPM_TARGET_SAMPLES + BPM_RATE as usize);
    let total = env.values.len();

    for (i, &bpm) in env.values.iter().enumerate() {
        ctx.step(i, total)?;
        if out.len() >= BPM_TARGET_SAMPLES {
            // Everything past the target is cut anyway.
            break;
        }
        if bpm == 0 {
            continue;
        }
        let beat = beat_samples(bpm);
        for _ in 0..env.pulse_count(bpm) {
            out.extend_from_slice(&[0, 0]);
            out.resize(out.len() + beat, BPM_AMPLITUDE);
        }
    }

    if out.len() < BPM_TARGET_SAMPLES {
        if let Some(last) = env.last_rate() {
            let frames = out.len() / BPM_CHANNELS as usize;
            let remaining_secs = (TARGET_SECS as f64) - frames as f64 / BPM_RATE as f64;
            let beats = (remaining_secs * last as f64 / 60.0) as usize;
            debug!("BPM render short by {:.2}s, padding {} beats at {}", remaining_secs, beats, last);
            out.resize(out.len() + beats * beat_samples(last), BPM_AMPLITUDE);
        }
    }

    out.truncate(BPM_TARGET_SAMPLES);
    // Keep whole stereo frames.
    out.truncate(out.len() - out.len() % BPM_CHANNELS as usize);

    let gain = db_to_gain(BPM_GAIN_DB);
    for s in out.iter_mut() {
        *s = saturate(*s as f64 * gain);
    }
    ctx.step(total, total)?;
    Ok(out)
}

/// Render the BPM envelope into a WAV intermediate at `path`.
pub fn render_bpm(env: &BpmEnvelope, path: &Path, ctx: &RenderContext<'_>) -> Result<(), Pdf2MediaError> {
    let samples = bpm_samples(env, ctx)?;
    info!(
        "BPM render: {} values → {:.1}s",
        env.values.len(),
        samples.len() as f64 / (BPM_RATE as f64 * BPM_CHANNELS as f64)
    );
    write_wav(path, BPM_CHANNELS, BPM_RATE, &samples)
}

// ── Wind ─────────────────────────────────────────────────────────────────

/// The ambient loop, decoded to normalised interleaved floats.
#[derive(Debug, Clone)]
pub struct WindLoop {
    pub channels: u16,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl WindLoop {
    /// Decode the loop at `path`.
    pub fn load(path: &Path) -> Result<Self, Pdf2MediaError> {
        if !path.exists() {
            return Err(Pdf2MediaError::AssetMissing {
                path: path.to_path_buf(),
            });
        }
        let invalid = |e: hound::Error| Pdf2MediaError::AssetInvalid {
            path: path.to_path_buf(),
            detail: e.to_string(),
        };

        let mut reader = WavReader::open(path).map_err(invalid)?;
        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>().map_err(invalid)?,
            SampleFormat::Int => {
                let full_scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / full_scale))
                    .collect::<Result<_, _>>()
                    .map_err(invalid)?
            }
        };

        let frames = samples.len() / spec.channels.max(1) as usize;
        if frames == 0 {
            return Err(Pdf2MediaError::AssetInvalid {
                path: path.to_path_buf(),
                detail: "loop contains no samples".into(),
            });
        }
        if spec.sample_rate != WIND_RATE {
            warn!(
                "Wind loop is {} Hz, rendering at {} Hz without resampling",
                spec.sample_rate, WIND_RATE
            );
        }
        debug!("Wind loop: {} frames x {} ch", frames, spec.channels);
        Ok(Self {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            samples,
        })
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }
}

/// Interpolated intensity `t` seconds into a day.
///
/// The day is split into `checkpoints.len()` equal sub-intervals; intensity
/// moves linearly from one checkpoint to the next and holds at the last.
pub fn wind_intensity(checkpoints: &[f32], t: f32) -> f32 {
    let n = checkpoints.len();
    if n == 0 {
        return 0.0;
    }
    let interval = WIND_DAY_SECS as f32 / n as f32;
    let idx = ((t / interval) as usize).min(n - 1);
    let next = (idx + 1).min(n - 1);
    let frac = (t - idx as f32 * interval) / interval;
    checkpoints[idx] + (checkpoints[next] - checkpoints[idx]) * frac
}

/// Render the wind envelope into a WAV intermediate at `path`.
///
/// Samples are streamed to disk; a full 24-day render never sits in memory.
/// Every day restarts at the first frame of the loop.
pub fn render_wind(
    env: &WindEnvelope,
    wind: &WindLoop,
    path: &Path,
    ctx: &RenderContext<'_>,
) -> Result<(), Pdf2MediaError> {
    let channels = wind.channels.max(1);
    let spec = WavSpec {
        channels,
        sample_rate: WIND_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).map_err(|e| wav_error(path, e))?;

    let day_frames = (WIND_RATE * WIND_DAY_SECS) as usize;
    let total = day_frames * env.days.len();
    let loop_frames = wind.frames();
    let gain = db_to_gain(WIND_GAIN_DB) as f32;
    let full_scale = i16::MAX as f32;

    let mut global = 0usize;
    for day in &env.days {
        for i in 0..day_frames {
            if global % PROGRESS_STRIDE == 0 {
                ctx.step(global, total)?;
            }
            let intensity = wind_intensity(day, i as f32 / WIND_RATE as f32);
            let base = (i % loop_frames) * channels as usize;
            for ch in 0..channels as usize {
                let value = if intensity <= 1.0 {
                    0.0
                } else {
                    wind.samples[base + ch] * intensity / WIND_SCALE
                };
                let sample = saturate((value * gain * full_scale) as f64);
                writer.write_sample(sample).map_err(|e| wav_error(path, e))?;
            }
            global += 1;
        }
    }

    writer.finalize().map_err(|e| wav_error(path, e))?;
    ctx.step(total, total)?;
    info!("Wind render: {} days → {}s", env.days.len(), env.days.len() as u32 * WIND_DAY_SECS);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::CancelToken;

    fn ctx(cancel: &CancelToken) -> RenderContext<'_> {
        RenderContext::new("t", cancel, None)
    }

    #[test]
    fn bpm_render_is_exactly_twelve_minutes() {
        let cancel = CancelToken::new();
        for values in [vec![120, 80], vec![60], vec![200, 40, 90, 0, 150], vec![999]] {
            let env = BpmEnvelope { values: values.clone() };
            let s = bpm_samples(&env, &ctx(&cancel)).unwrap();
            // Short renders are padded in whole beats; allow one beat of slack.
            let slack = beat_samples(env.last_rate().unwrap());
            assert!(s.len() <= BPM_TARGET_SAMPLES, "{values:?}");
            assert!(s.len() + slack >= BPM_TARGET_SAMPLES, "{values:?}: {}", s.len());
            assert_eq!(s.len() % 2, 0);
        }
    }

    #[test]
    fn bpm_underrun_is_padded_at_last_rate() {
        let cancel = CancelToken::new();
        // One pulse of 1 bpm would be 360000 samples, far short of 12 minutes
        // only if the pulse count were tiny; force that with many zeros.
        let mut values = vec![0u32; 99];
        values.push(60);
        let env = BpmEnvelope { values };
        assert_eq!(env.pulse_count(60), 7);
        let s = bpm_samples(&env, &ctx(&cancel)).unwrap();
        assert!(s.len() + beat_samples(60) >= BPM_TARGET_SAMPLES);
        // Padding is pure amplitude after gain.
        assert_eq!(*s.last().unwrap(), i16::MAX);
    }

    #[test]
    fn bpm_pulse_starts_with_silent_frame_and_saturates() {
        let cancel = CancelToken::new();
        let env = BpmEnvelope { values: vec![120] };
        let s = bpm_samples(&env, &ctx(&cancel)).unwrap();
        assert_eq!(&s[..2], &[0, 0]);
        assert_eq!(s[2], i16::MAX);
        assert_eq!(s[2 + beat_samples(120)], 0);
    }

    #[test]
    fn bpm_render_honours_cancellation() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let env = BpmEnvelope { values: vec![120] };
        assert!(matches!(bpm_samples(&env, &ctx(&cancel)), Err(Pdf2MediaError::Cancelled)));
    }

    #[test]
    fn wind_intensity_interpolates_and_holds() {
        let day = [0.0, 10.0, 4.0];
        assert_eq!(wind_intensity(&day, 0.0), 0.0);
        assert!((wind_intensity(&day, 5.0) - 5.0).abs() < 1e-4);
        assert!((wind_intensity(&day, 15.0) - 7.0).abs() < 1e-4);
        assert_eq!(wind_intensity(&day, 25.0), 4.0);
        assert_eq!(wind_intensity(&[3.0], 29.9), 3.0);
    }

    fn write_loop(path: &Path, channels: u16) {
        let spec = WavSpec {
            channels,
            sample_rate: WIND_RATE,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut w = WavWriter::create(path, spec).unwrap();
        for i in 0..441 * channels as i32 {
            w.write_sample(((i % 200) * 100 - 10000) as i16).unwrap();
        }
        w.finalize().unwrap();
    }

    #[test]
    fn wind_render_is_silent_at_or_below_one() {
        let tmp = tempfile::tempdir().unwrap();
        let loop_path = tmp.path().join("loop.wav");
        write_loop(&loop_path, 2);
        let wind = WindLoop::load(&loop_path).unwrap();
        assert_eq!(wind.frames(), 441);

        let env = WindEnvelope { days: vec![vec![1.0], vec![15.0]] };
        let out = tmp.path().join("wind.wav");
        let cancel = CancelToken::new();
        render_wind(&env, &wind, &out, &ctx(&cancel)).unwrap();

        let mut reader = WavReader::open(&out).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, WIND_RATE);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        let day = (WIND_RATE * WIND_DAY_SECS) as usize * 2;
        assert_eq!(samples.len(), day * 2);
        assert!(samples[..day].iter().all(|&s| s == 0));
        assert!(samples[day..].iter().any(|&s| s != 0));
    }

    #[test]
    fn wind_loop_restarts_each_day() {
        // 997 frames does not divide a 30 s day, so a loop position carried
        // over from day one would start day two mid-ramp.
        let channels = 2u16;
        let samples: Vec<f32> = (0..997)
            .flat_map(|f| {
                let v = f as f32 / 997.0 - 0.5;
                [v, -v]
            })
            .collect();
        let wind = WindLoop {
            channels,
            sample_rate: WIND_RATE,
            samples,
        };
        assert_ne!((WIND_RATE * WIND_DAY_SECS) as usize % wind.frames(), 0);

        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("wind.wav");
        let env = WindEnvelope { days: vec![vec![15.0], vec![15.0]] };
        let cancel = CancelToken::new();
        render_wind(&env, &wind, &out, &ctx(&cancel)).unwrap();

        let samples: Vec<i16> = WavReader::open(&out)
            .unwrap()
            .samples::<i16>()
            .map(|s| s.unwrap())
            .collect();
        let day = (WIND_RATE * WIND_DAY_SECS) as usize * channels as usize;
        assert_eq!(samples.len(), day * 2);
        assert_ne!(samples[0], 0);
        assert_eq!(&samples[0..3], &samples[day..day + 3]);
    }

    #[test]
    fn missing_loop_is_asset_error() {
        let err = WindLoop::load(Path::new("/nope/Wind_Loop.wav")).unwrap_err();
        assert!(matches!(err, Pdf2MediaError::AssetMissing { .. }));
    }

    #[test]
    fn gain_helpers() {
        assert!((db_to_gain(3.0) - 1.4125).abs() < 1e-3);
        assert_eq!(saturate(40000.0), i16::MAX);
        assert_eq!(saturate(-40000.0), i16::MIN);
    }
}
