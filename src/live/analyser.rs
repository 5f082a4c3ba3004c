use std::collections::VecDeque;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

pub const DEFAULT_FFT_SIZE: usize = 2048;
pub const DEFAULT_SMOOTHING: f32 = 0.8;
pub const DEFAULT_MIN_DB: f32 = -100.0;
pub const DEFAULT_MAX_DB: f32 = -30.0;

/// Per-frame magnitude source for the live spectrum sampler.
pub trait FrequencyDataSource {
    /// Length of the magnitude array (half the transform size).
    fn frequency_bin_count(&self) -> usize;
    fn sample_rate(&self) -> u32;
    fn byte_frequency_data(&mut self, out: &mut [u8]);
}

/// Per-frame time-domain source for the stereo analyzer.
pub trait TimeDomainSource {
    fn window_len(&self) -> usize;
    fn time_domain_data(&self, out: &mut [f32]);
}

#[derive(Clone, Copy, Debug)]
pub struct AnalyserOptions {
    pub fft_size: usize,
    pub smoothing: f32,
    pub min_db: f32,
    pub max_db: f32,
}

impl Default for AnalyserOptions {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            smoothing: DEFAULT_SMOOTHING,
            min_db: DEFAULT_MIN_DB,
            max_db: DEFAULT_MAX_DB,
        }
    }
}

pub struct Analyser {
    options: AnalyserOptions,
    sample_rate: u32,
    history: VecDeque<f32>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl Analyser {
    pub fn new(sample_rate: u32, options: AnalyserOptions) -> Self {
        let fft_size = options.fft_size.max(32).next_power_of_two();
        let options = AnalyserOptions {
            fft_size,
            smoothing: options.smoothing.clamp(0.0, 1.0),
            ..options
        };
        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);
        Self {
            options,
            sample_rate,
            history: std::iter::repeat(0.0).take(fft_size).collect(),
            window: blackman_window(fft_size),
            smoothed: vec![0.0; fft_size / 2],
            fft,
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
        }
    }

    /// Appends freshly played samples, keeping only the newest `fft_size`.
    pub fn push(&mut self, samples: &[f32]) {
        let n = self.options.fft_size;
        let tail = if samples.len() > n {
            &samples[samples.len() - n..]
        } else {
            samples
        };
        let overflow = (self.history.len() + tail.len()).saturating_sub(n);
        self.history.drain(..overflow);
        self.history.extend(tail.iter().copied());
    }

    /// Clears history and smoothing, e.g. after a seek.
    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(|s| *s = 0.0);
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
    }

    fn update_spectrum(&mut self) {
        let n = self.options.fft_size;
        for (i, (slot, &s)) in self.scratch.iter_mut().zip(self.history.iter()).enumerate() {
            *slot = Complex::new(s * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let tau = self.options.smoothing;
        for (k, prev) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.scratch[k].norm() / n as f32;
            let next = tau * *prev + (1.0 - tau) * magnitude;
            *prev = if next.is_finite() { next } else { 0.0 };
        }
    }
}

impl FrequencyDataSource for Analyser {
    fn frequency_bin_count(&self) -> usize {
        self.options.fft_size / 2
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn byte_frequency_data(&mut self, out: &mut [u8]) {
        self.update_spectrum();
        let range = (self.options.max_db - self.options.min_db).max(f32::EPSILON);
        for (dst, &mag) in out.iter_mut().zip(self.smoothed.iter()) {
            *dst = if mag > 0.0 {
                let db = 20.0 * mag.log10();
                (255.0 * (db - self.options.min_db) / range).clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }
    }
}

impl TimeDomainSource for Analyser {
    fn window_len(&self) -> usize {
        self.options.fft_size
    }

    fn time_domain_data(&self, out: &mut [f32]) {
        for (dst, &s) in out.iter_mut().zip(self.history.iter()) {
            *dst = s;
        }
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    let a0 = 0.42;
    let a1 = 0.5;
    let a2 = 0.08;
    let two_pi = 2.0 * std::f32::consts::PI;
    (0..size)
        .map(|i| {
            let x = i as f32 / size as f32;
            a0 - a1 * (two_pi * x).cos() + a2 * (2.0 * two_pi * x).cos()
        })
        .collect()
}
