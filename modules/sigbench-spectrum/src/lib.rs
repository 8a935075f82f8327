//! Frequency mixer demo module.
//!
//! Reads the first channel of a WAV file, multiplies it with a cosine whose
//! frequency is set by the second parameter (0..=100 maps onto 0..=0.6 of the
//! sample rate) and plots input and mixed signal in the time and frequency
//! domain. The first parameter is not used. With a playback handle, the mixed
//! signal is written out as a WAV preview on a background thread.

use std::env;
use std::f32::consts::PI;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use sigbench_module_sdk::prelude::*;

/// Highest mixing frequency as a fraction of the sample rate.
const MAX_MIX_FRACTION: f32 = 0.6;
/// Series longer than this are thinned out before plotting.
const MAX_PLOT_POINTS: usize = 4096;

/// Mono samples in -1.0..=1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct Audio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Audio {
    /// Read a WAV file, keeping only the first channel.
    pub fn read_wav(path: &Path) -> Result<Self> {
        let is_wav = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);
        if !is_wav {
            bail!("{} is not a WAV file", path.display());
        }
        let reader = hound::WavReader::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let spec = reader.spec();
        let channels = usize::from(spec.channels.max(1));
        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<_, _>>()
                .context("corrupt WAV data")?,
            hound::SampleFormat::Int => {
                let full_scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|sample| sample.map(|s| s as f32 / full_scale))
                    .collect::<Result<_, _>>()
                    .context("corrupt WAV data")?
            }
        };
        let samples: Vec<f32> = interleaved.into_iter().step_by(channels).collect();
        if samples.is_empty() {
            bail!("{} contains no samples", path.display());
        }
        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }

    pub fn write_wav(&self, path: &Path) -> Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("failed to create {}", path.display()))?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    fn times(&self) -> Vec<f32> {
        let rate = self.sample_rate as f32;
        (0..self.samples.len()).map(|i| i as f32 / rate).collect()
    }
}

pub fn mix_frequency(param2: u8, sample_rate: u32) -> f32 {
    f32::from(param2.min(PARAM_MAX)) / f32::from(PARAM_MAX) * MAX_MIX_FRACTION * sample_rate as f32
}

/// Multiply `audio` with a cosine of `frequency` Hz.
pub fn mix(audio: &Audio, frequency: f32) -> Audio {
    let rate = audio.sample_rate as f32;
    let samples = audio
        .samples
        .iter()
        .enumerate()
        .map(|(i, sample)| sample * (2.0 * PI * frequency * i as f32 / rate).cos())
        .collect();
    Audio {
        samples,
        sample_rate: audio.sample_rate,
    }
}

/// Magnitude spectrum normalised by the length, zero frequency in the middle.
pub fn centered_spectrum(samples: &[f32]) -> Vec<f32> {
    let n = samples.len();
    if n == 0 {
        return Vec::new();
    }
    let fft = FftPlanner::<f32>::new().plan_fft_forward(n);
    let mut buffer: Vec<Complex<f32>> = samples.iter().map(|&s| Complex::new(s, 0.0)).collect();
    fft.process(&mut buffer);
    let mut magnitudes: Vec<f32> = buffer.iter().map(|c| c.norm() / n as f32).collect();
    magnitudes.rotate_right(n / 2);
    magnitudes
}

/// `n` evenly spaced frequencies from `-rate/2` to `rate/2`.
pub fn frequency_axis(n: usize, sample_rate: u32) -> Vec<f32> {
    let half = sample_rate as f32 / 2.0;
    match n {
        0 => Vec::new(),
        1 => vec![-half],
        _ => {
            let step = 2.0 * half / (n - 1) as f32;
            (0..n).map(|i| -half + i as f32 * step).collect()
        }
    }
}

fn thin(values: &[f32]) -> impl Iterator<Item = f32> + '_ {
    let stride = values.len().div_ceil(MAX_PLOT_POINTS).max(1);
    values.iter().copied().step_by(stride)
}

fn plot(target: &mut Figure, label: &str, x: &str, xs: &[f32], ys: &[f32]) {
    target
        .add_panel(label)
        .with_axes(x, "amplitude")
        .plot(label, thin(xs), thin(ys));
}

fn preview_path(data_file: &str) -> PathBuf {
    let stem = Path::new(data_file)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("signal");
    env::temp_dir().join(format!("sigbench-mixed-{stem}.wav"))
}

#[derive(Debug, Default)]
pub struct SpectrumModule;

impl ProcessingModule for SpectrumModule {
    fn run(
        &self,
        _param1: u8,
        param2: u8,
        target: &mut Figure,
        data_file: &str,
        playback: Option<&PlaybackHandle>,
    ) -> Result<()> {
        let input = Audio::read_wav(Path::new(data_file))?;
        let frequency = mix_frequency(param2, input.sample_rate);
        let mixed = mix(&input, frequency);

        let times = input.times();
        let freqs = frequency_axis(input.samples.len(), input.sample_rate);
        target.clear();
        target.set_title(format!("mixing frequency: {frequency:.2} Hz"));
        plot(target, "input (time)", "time [s]", &times, &input.samples);
        plot(
            target,
            "input (spectrum)",
            "frequency [Hz]",
            &freqs,
            &centered_spectrum(&input.samples),
        );
        plot(target, "mixed (time)", "time [s]", &times, &mixed.samples);
        plot(
            target,
            "mixed (spectrum)",
            "frequency [Hz]",
            &freqs,
            &centered_spectrum(&mixed.samples),
        );

        if let Some(playback) = playback {
            let path = preview_path(data_file);
            playback.spawn(path.display().to_string(), move || mixed.write_wav(&path));
        }
        Ok(())
    }
}

declare_sigbench_module!(SpectrumModule);
