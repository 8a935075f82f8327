//! Noisy sine demo module.
//!
//! Synthesises 500 samples of a sine at 500 Hz sample rate. The first
//! parameter sets the tone frequency (1..=67 Hz), the second the amplitude of
//! uniform noise added to it (0..=10). The data file is ignored. The module
//! estimates the tone frequency from the spectrum and compares zero padding
//! with repeating the signal as ways of refining the frequency grid.

use std::f32::consts::PI;

use anyhow::Result;
use rand::Rng;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use sigbench_module_sdk::prelude::*;

pub const SAMPLES: usize = 500;
pub const SAMPLE_INTERVAL: f32 = 0.002;
/// Padding and repetition both stretch the signal to this many times its
/// length.
const REFINEMENT: usize = 10;

pub fn tone_frequency(param1: u8) -> f32 {
    1.0 + 66.0 * f32::from(param1.min(PARAM_MAX)) / f32::from(PARAM_MAX)
}

pub fn noise_amplitude(param2: u8) -> f32 {
    10.0 * f32::from(param2.min(PARAM_MAX)) / f32::from(PARAM_MAX)
}

pub fn synthesize(frequency: f32, noise: f32, rng: &mut impl Rng) -> Vec<f32> {
    (0..SAMPLES)
        .map(|i| {
            let t = i as f32 * SAMPLE_INTERVAL;
            let jitter = if noise > 0.0 {
                rng.gen_range(-noise..noise)
            } else {
                0.0
            };
            (2.0 * PI * frequency * t).sin() + jitter
        })
        .collect()
}

/// Positive half of the magnitude spectrum with matching frequencies.
pub fn half_spectrum(signal: &[f32]) -> (Vec<f32>, Vec<f32>) {
    let n = signal.len();
    if n == 0 {
        return (Vec::new(), Vec::new());
    }
    let fft = FftPlanner::<f32>::new().plan_fft_forward(n);
    let mut buffer: Vec<Complex<f32>> = signal.iter().map(|&s| Complex::new(s, 0.0)).collect();
    fft.process(&mut buffer);
    let resolution = 1.0 / (n as f32 * SAMPLE_INTERVAL);
    let half = n / 2;
    let freqs = (0..half).map(|k| k as f32 * resolution).collect();
    let magnitudes = buffer[..half].iter().map(|c| c.norm()).collect();
    (freqs, magnitudes)
}

/// Frequency of the strongest bin.
pub fn estimate_frequency(freqs: &[f32], magnitudes: &[f32]) -> f32 {
    magnitudes
        .iter()
        .zip(freqs)
        .fold((f32::MIN, 0.0), |best, (&m, &f)| if m > best.0 { (m, f) } else { best })
        .1
}

#[derive(Debug, Default)]
pub struct ToneModule;

impl ProcessingModule for ToneModule {
    fn run(
        &self,
        param1: u8,
        param2: u8,
        target: &mut Figure,
        _data_file: &str,
        _playback: Option<&PlaybackHandle>,
    ) -> Result<()> {
        let frequency = tone_frequency(param1);
        let noise = noise_amplitude(param2);
        let signal = synthesize(frequency, noise, &mut rand::thread_rng());

        let (freqs, spectrum) = half_spectrum(&signal);
        let estimated = estimate_frequency(&freqs, &spectrum);

        let mut padded = signal.clone();
        padded.resize(SAMPLES * REFINEMENT, 0.0);
        let (padded_freqs, padded_spectrum) = half_spectrum(&padded);
        let repeated = signal.repeat(REFINEMENT);
        let (repeated_freqs, repeated_spectrum) = half_spectrum(&repeated);

        target.clear();
        target.set_title(format!(
            "f = {frequency:.1} Hz, estimated = {estimated:.1} Hz, noise = ±{noise:.1}"
        ));
        let times = (0..SAMPLES).map(|i| i as f32 * SAMPLE_INTERVAL);
        target
            .add_panel("noisy sine")
            .with_axes("time [s]", "amplitude")
            .plot("signal", times, signal);
        target
            .add_panel("spectrum")
            .with_axes("frequency [Hz]", "magnitude")
            .plot("original", freqs, spectrum);
        target
            .add_panel("refined spectra")
            .with_axes("frequency [Hz]", "magnitude")
            .plot("zero padding", padded_freqs, padded_spectrum)
            .plot("repeated", repeated_freqs, repeated_spectrum);
        Ok(())
    }
}

declare_sigbench_module!(ToneModule);

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn parameters_map_to_documented_ranges() {
        assert_eq!(tone_frequency(0), 1.0);
        assert_eq!(tone_frequency(100), 67.0);
        assert_eq!(noise_amplitude(0), 0.0);
        assert_eq!(noise_amplitude(100), 10.0);
    }

    #[test]
    fn noiseless_tone_is_estimated_exactly() {
        let mut rng = StdRng::seed_from_u64(7);
        let signal = synthesize(tone_frequency(50), 0.0, &mut rng);
        let (freqs, spectrum) = half_spectrum(&signal);
        assert_eq!(freqs.len(), SAMPLES / 2);
        assert_eq!(estimate_frequency(&freqs, &spectrum), 34.0);
    }

    #[test]
    fn noise_stays_within_amplitude() {
        let mut rng = StdRng::seed_from_u64(11);
        let signal = synthesize(1.0, 2.0, &mut rng);
        assert!(signal.iter().all(|s| s.abs() <= 3.0));
    }

    #[test]
    fn run_repaints_three_panels() {
        let mut figure = Figure::new();
        figure.add_panel("stale");
        ToneModule
            .run(10, 0, &mut figure, "", None)
            .unwrap();
        let labels: Vec<_> = figure.panels().iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["noisy sine", "spectrum", "refined spectra"]);
        assert_eq!(figure.panels()[2].series.len(), 2);
        assert_eq!(figure.panels()[2].series[0].points.len(), SAMPLES * REFINEMENT / 2);
        assert!(figure.title().unwrap().starts_with("f = 7.6 Hz, estimated = 8.0 Hz"));
    }
}
