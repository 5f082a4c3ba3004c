use crate::audio::spectrum::{log_frequency, Spectrum, MAX_FREQ, MIN_FREQ};

use super::analyser::FrequencyDataSource;

/// Copies the live magnitude array once per frame while playback runs.
///
/// No history is kept: the buffer always holds the latest frame.
pub struct LiveSpectrumSampler {
    frame: Vec<u8>,
    sample_rate: u32,
    frames_sampled: u64,
}

impl LiveSpectrumSampler {
    pub fn new() -> Self {
        Self {
            frame: Vec::new(),
            sample_rate: 0,
            frames_sampled: 0,
        }
    }

    /// Pulls the current frame from `source` if `playing`. Returns whether a
    /// new frame was copied.
    pub fn sample<S: FrequencyDataSource + ?Sized>(&mut self, source: &mut S, playing: bool) -> bool {
        if !playing {
            return false;
        }
        let bins = source.frequency_bin_count();
        if self.frame.len() != bins {
            self.frame = vec![0; bins];
        }
        self.sample_rate = source.sample_rate();
        source.byte_frequency_data(&mut self.frame);
        self.frames_sampled += 1;
        true
    }

    #[cfg(test)]
    pub fn current(&self) -> &[u8] {
        &self.frame
    }

    pub fn frames_sampled(&self) -> u64 {
        self.frames_sampled
    }

    fn bin_hz(&self) -> f32 {
        // bins = fft_size / 2, so one bin spans sr / fft_size
        if self.frame.is_empty() {
            return 0.0;
        }
        self.sample_rate as f32 / (2 * self.frame.len()) as f32
    }

    /// Indices of bins whose centre lies within 20 Hz..=20 kHz.
    pub fn audible_bins(&self) -> std::ops::Range<usize> {
        let hz = self.bin_hz();
        if hz <= 0.0 {
            return 0..0;
        }
        let start = (MIN_FREQ / hz).ceil() as usize;
        let end = ((MAX_FREQ / hz).floor() as usize + 1).min(self.frame.len());
        start.min(end)..end
    }

    /// Resamples the current linear-bin frame onto a `points`-long
    /// log-frequency spectrum. Bins outside 20 Hz..20 kHz never contribute.
    pub fn log_spectrum(&self, points: usize) -> Spectrum {
        let hz = self.bin_hz();
        let audible = self.audible_bins();
        if points == 0 || audible.is_empty() {
            return Spectrum::from_bytes(&vec![0; points]);
        }

        let levels: Vec<f32> = (0..points)
            .map(|i| {
                let lo = log_frequency(i, points) / hz;
                let hi = log_frequency(i + 1, points) / hz;
                let first = (lo.round() as usize).max(audible.start);
                let last = (hi.round() as usize).min(audible.end);
                if first >= audible.end {
                    return 0.0;
                }
                if last <= first {
                    return self.frame[first] as f32;
                }
                let slice = &self.frame[first..last];
                slice.iter().map(|&b| b as f32).sum::<f32>() / slice.len() as f32
            })
            .collect();

        Spectrum::from_byte_levels(levels)
    }
}

impl Default for LiveSpectrumSampler {
    fn default() -> Self {
        Self::new()
    }
}
