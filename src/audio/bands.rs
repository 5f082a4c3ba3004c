use std::ops::RangeInclusive;
use std::sync::Arc;

use rayon::prelude::*;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::Deserialize;

use super::features::FrequencyMetrics;
use super::goertzel;
use super::metrics;
use super::source::{AudioLoader, AudioSource};
use super::spectrum::{log_frequency, Spectrum, MAX_FREQ};

pub const BAND_COUNT: usize = 64;
pub const DEFAULT_FRAME_SIZE: usize = 2048;
pub const DEFAULT_MAX_FRAMES: usize = 50;

const FLOOR_DB: f32 = -60.0;
const CEILING_DB: f32 = 0.0;

/// How per-bin magnitudes are obtained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Estimator {
    /// One Goertzel recurrence per bin in each band's range.
    #[default]
    Goertzel,
    /// One full transform per frame, then the same bin aggregation.
    Fft,
}

/// Band edges `(low, high)` in Hz. Band `b` starts at the spectrum's own
/// `f(b)`, so every sample rate lands on the same 20 Hz..20 kHz grid.
pub fn band_edges() -> Vec<(f32, f32)> {
    (0..BAND_COUNT)
        .map(|b| {
            let high = if b + 1 == BAND_COUNT {
                MAX_FREQ
            } else {
                log_frequency(b + 1, BAND_COUNT)
            };
            (log_frequency(b, BAND_COUNT), high)
        })
        .collect()
}

/// Bin range per band, cut at Nyquist. Bands starting at or above Nyquist
/// have no bins and stay at the floor.
fn band_bins(frame_size: usize, sample_rate: u32) -> Vec<Option<RangeInclusive<usize>>> {
    let nyquist = sample_rate as f32 / 2.0;
    band_edges()
        .into_iter()
        .map(|(low, high)| {
            (low < nyquist).then(|| bin_range(low, high.min(nyquist), frame_size, sample_rate))
        })
        .collect()
}

/// Inclusive DFT bin range `[floor(low*N/sr), ceil(high*N/sr)]`, clamped to Nyquist.
pub fn bin_range(low: f32, high: f32, frame_size: usize, sample_rate: u32) -> RangeInclusive<usize> {
    let sr = sample_rate.max(1) as f32;
    let nyquist_bin = frame_size / 2;
    let start = ((low * frame_size as f32 / sr).floor() as usize).min(nyquist_bin);
    let end = ((high * frame_size as f32 / sr).ceil() as usize).clamp(start, nyquist_bin);
    start..=end
}

pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos()))
        .collect()
}

/// `20*log10(v)` clamped to -60..0 dB, then scaled linearly into 0..=255.
/// Zero or negative energy maps to the floor.
pub fn to_byte_level(value: f32) -> f32 {
    let db = if value > 0.0 {
        (20.0 * value.log10()).clamp(FLOOR_DB, CEILING_DB)
    } else {
        FLOOR_DB
    };
    (db - FLOOR_DB) / (CEILING_DB - FLOOR_DB) * 255.0
}

pub struct BandDecomposer {
    frame_size: usize,
    estimator: Estimator,
    window: Vec<f32>,
    /// Scales bin magnitudes so a full-scale sine on a bin centre reads 1.0.
    norm: f32,
    fft: Arc<dyn Fft<f32>>,
}

impl BandDecomposer {
    pub fn new(frame_size: usize, estimator: Estimator) -> Self {
        let frame_size = frame_size.max(2);
        let window = hann_window(frame_size);
        let norm = (window.iter().sum::<f32>() / 2.0).max(f32::EPSILON);
        let fft = FftPlanner::<f32>::new().plan_fft_forward(frame_size);
        Self {
            frame_size,
            estimator,
            window,
            norm,
            fft,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Linear (normalized) magnitude per band for one frame. Short frames are
    /// zero-padded to the frame size.
    pub fn frame_bands(&self, frame: &[f32], sample_rate: u32) -> Vec<f32> {
        let windowed: Vec<f32> = (0..self.frame_size)
            .map(|i| frame.get(i).copied().unwrap_or(0.0) * self.window[i])
            .collect();

        let ranges = band_bins(self.frame_size, sample_rate);
        let average = |range: &RangeInclusive<usize>, bin: &dyn Fn(usize) -> f32| {
            let count = range.clone().count() as f32;
            range.clone().map(bin).sum::<f32>() / count / self.norm
        };

        match self.estimator {
            Estimator::Goertzel => ranges
                .iter()
                .map(|range| {
                    range
                        .as_ref()
                        .map_or(0.0, |r| average(r, &|k| goertzel::magnitude(&windowed, k)))
                })
                .collect(),
            Estimator::Fft => {
                let mut buffer: Vec<Complex<f32>> =
                    windowed.iter().map(|&s| Complex::new(s, 0.0)).collect();
                self.fft.process(&mut buffer);
                ranges
                    .iter()
                    .map(|range| range.as_ref().map_or(0.0, |r| average(r, &|k| buffer[k].norm())))
                    .collect()
            }
        }
    }

    /// Start offsets of up to `max_frames` frames strided evenly over the track.
    pub fn frame_offsets(&self, total_samples: usize, max_frames: usize) -> Vec<usize> {
        if total_samples <= self.frame_size {
            return vec![0];
        }
        let count = (total_samples / self.frame_size).clamp(1, max_frames.max(1));
        if count == 1 {
            return vec![0];
        }
        let span = total_samples - self.frame_size;
        (0..count).map(|i| i * span / (count - 1)).collect()
    }

    /// Average spectrum of a mono buffer in the 0..=255 domain.
    pub fn average_spectrum(&self, mono: &[f32], sample_rate: u32, max_frames: usize) -> Spectrum {
        let offsets = self.frame_offsets(mono.len(), max_frames);
        log::debug!(
            "Band decomposition: {} frames of {} samples ({:?})",
            offsets.len(),
            self.frame_size,
            self.estimator
        );

        let per_frame: Vec<Vec<f32>> = offsets
            .par_iter()
            .map(|&start| {
                let end = (start + self.frame_size).min(mono.len());
                self.frame_bands(&mono[start..end], sample_rate)
            })
            .collect();

        let frames = per_frame.len().max(1) as f32;
        let levels: Vec<f32> = (0..BAND_COUNT)
            .map(|b| per_frame.iter().map(|f| f[b]).sum::<f32>() / frames)
            .map(to_byte_level)
            .collect();

        Spectrum::from_byte_levels(levels)
    }
}

/// Spectrum plus the metrics derived from it for one source.
#[derive(Clone, Debug)]
pub struct SpectrumReport {
    pub spectrum: Spectrum,
    pub metrics: FrequencyMetrics,
    pub placeholder: bool,
}

/// Loads `source` and computes its average spectrum and metrics. Failures to
/// fetch or decode fall back to a flat placeholder spectrum.
pub fn spectrum_for_source(
    loader: &AudioLoader,
    decomposer: &BandDecomposer,
    source: &AudioSource,
    max_frames: usize,
) -> SpectrumReport {
    let (spectrum, placeholder) = match loader.load(source) {
        Ok(audio) => (
            decomposer.average_spectrum(&audio.mono(), audio.sample_rate, max_frames),
            false,
        ),
        Err(err) => {
            log::warn!("Spectrum for {} unavailable, using placeholder: {}", source, err);
            (Spectrum::placeholder(BAND_COUNT), true)
        }
    };
    let metrics = metrics::calculate(&spectrum);
    SpectrumReport {
        spectrum,
        metrics,
        placeholder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(len: usize, freq: f32, sr: u32, amp: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amp * (2.0 * PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    #[test]
    fn band_edges_follow_spectrum_grid() {
        let edges = band_edges();
        assert_eq!(edges.len(), BAND_COUNT);
        assert_eq!(edges[0].0, crate::audio::spectrum::MIN_FREQ);
        assert_eq!(edges[BAND_COUNT - 1].1, MAX_FREQ);
        for (b, pair) in edges.windows(2).enumerate() {
            assert_eq!(pair[0].0, log_frequency(b, BAND_COUNT));
            assert!((pair[0].1 - pair[1].0).abs() < 1e-3);
            assert!(pair[0].0 < pair[0].1);
        }
    }

    #[test]
    fn bin_ranges_cover_up_to_nyquist() {
        for sr in [8000u32, 22050, 44100, 96000] {
            let n = 2048;
            let ranges: Vec<_> = band_bins(n, sr).into_iter().flatten().collect();
            for pair in ranges.windows(2) {
                assert!(pair[0].end() >= pair[1].start());
            }
            let top = (MAX_FREQ.min(sr as f32 / 2.0) * n as f32 / sr as f32).ceil() as usize;
            assert_eq!(*ranges.last().unwrap().end(), top.min(n / 2));
        }
    }

    #[test]
    fn byte_levels_floor_and_ceiling() {
        assert_eq!(to_byte_level(0.0), 0.0);
        assert_eq!(to_byte_level(1e-9), 0.0);
        assert_eq!(to_byte_level(1.0), 255.0);
        assert_eq!(to_byte_level(4.0), 255.0);
        assert!((to_byte_level(0.031_622_776) - 127.5).abs() < 1e-2); // -30 dB
        assert_eq!(to_byte_level(0.0001), 0.0); // -80 dB
        assert!(to_byte_level(f32::NAN).is_finite());
    }

    #[test]
    fn bands_are_non_negative() {
        let decomposer = BandDecomposer::new(1024, Estimator::Goertzel);
        let frame = sine(1024, 440.0, 44100, 0.7);
        let bands = decomposer.frame_bands(&frame, 44100);
        assert_eq!(bands.len(), BAND_COUNT);
        assert!(bands.iter().all(|&b| b >= 0.0 && b.is_finite()));
    }

    #[test]
    fn goertzel_and_fft_agree() {
        let sr = 44100;
        let frame: Vec<f32> = sine(1024, 440.0, sr, 0.5)
            .iter()
            .zip(sine(1024, 5000.0, sr, 0.2))
            .map(|(a, b)| a + b)
            .collect();
        let g = BandDecomposer::new(1024, Estimator::Goertzel).frame_bands(&frame, sr);
        let f = BandDecomposer::new(1024, Estimator::Fft).frame_bands(&frame, sr);
        for (a, b) in g.iter().zip(&f) {
            assert!((a - b).abs() < 1e-3 + 1e-3 * a.abs(), "{a} vs {b}");
        }
    }

    #[test]
    fn one_kilohertz_tone_peaks_near_one_kilohertz() {
        let sr = 44100;
        let decomposer = BandDecomposer::new(DEFAULT_FRAME_SIZE, Estimator::Goertzel);
        let samples = sine(sr as usize, 1000.0, sr, 0.9);
        let spectrum = decomposer.average_spectrum(&samples, sr, 8);
        assert_eq!(spectrum.len(), BAND_COUNT);

        let m = metrics::calculate(&spectrum);
        assert!(m.peak_frequency > 850.0 && m.peak_frequency < 1150.0, "{}", m.peak_frequency);
    }

    #[test]
    fn tone_reads_the_same_at_any_sample_rate() {
        for sr in [22050u32, 32000, 44100, 48000] {
            let decomposer = BandDecomposer::new(DEFAULT_FRAME_SIZE, Estimator::Goertzel);
            let samples = sine(sr as usize, 1000.0, sr, 0.9);
            let spectrum = decomposer.average_spectrum(&samples, sr, 8);
            let m = metrics::calculate(&spectrum);
            assert!(
                (m.peak_frequency - log_frequency(36, BAND_COUNT)).abs() < 1.0,
                "sr {sr}: peak {}",
                m.peak_frequency
            );
        }
    }

    #[test]
    fn bands_above_nyquist_stay_at_floor() {
        let sr = 22050;
        let frame: Vec<f32> = sine(2048, 440.0, sr, 0.5)
            .iter()
            .zip(sine(2048, 9000.0, sr, 0.5))
            .map(|(a, b)| a + b)
            .collect();
        let edges = band_edges();
        for estimator in [Estimator::Goertzel, Estimator::Fft] {
            let bands = BandDecomposer::new(2048, estimator).frame_bands(&frame, sr);
            let above: Vec<usize> = (0..BAND_COUNT).filter(|&b| edges[b].0 >= 11025.0).collect();
            assert!(!above.is_empty());
            assert!(above.iter().all(|&b| bands[b] == 0.0));
        }
    }

    #[test]
    fn silence_maps_to_floor() {
        let decomposer = BandDecomposer::new(512, Estimator::Fft);
        let spectrum = decomposer.average_spectrum(&vec![0.0; 10_000], 44100, 10);
        assert!(spectrum.raw().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn frame_offsets_are_bounded_and_strided() {
        let decomposer = BandDecomposer::new(1000, Estimator::Fft);
        let offsets = decomposer.frame_offsets(1_000_000, DEFAULT_MAX_FRAMES);
        assert_eq!(offsets.len(), DEFAULT_MAX_FRAMES);
        assert_eq!(offsets[0], 0);
        assert_eq!(*offsets.last().unwrap(), 1_000_000 - 1000);

        assert_eq!(decomposer.frame_offsets(500, 50), vec![0]);
        assert_eq!(decomposer.frame_offsets(3500, 50).len(), 3);
    }
}
