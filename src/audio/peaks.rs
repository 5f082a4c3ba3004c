use super::decode::DecodedAudio;
use super::source::{AudioLoader, AudioSource};

pub const DEFAULT_BAR_COUNT: usize = 200;

/// Bar height used for every bar when the source could not be decoded.
pub const PLACEHOLDER_LEVEL: f32 = 0.3;

/// Normalization floor so silence never divides by zero.
const PEAK_FLOOR: f32 = 0.01;

/// Display waveform: one normalized peak per bar, in [0, 1].
#[derive(Clone, Debug, PartialEq)]
pub struct WaveformPeaks {
    bars: Vec<f32>,
    placeholder: bool,
}

impl WaveformPeaks {
    pub fn placeholder(count: usize) -> Self {
        Self {
            bars: vec![PLACEHOLDER_LEVEL; count],
            placeholder: true,
        }
    }

    pub fn bars(&self) -> &[f32] {
        &self.bars
    }

    /// True when this is the stand-in for a failed decode.
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }
}

/// Mixes to mono, splits into `count` equal segments (the remainder is
/// dropped) and keeps the absolute peak of each, normalized by the loudest bar.
pub fn extract_peaks(audio: &DecodedAudio, count: usize) -> WaveformPeaks {
    let mono = audio.mono();
    let count = count.max(1);
    let segment = mono.len() / count;

    let mut bars: Vec<f32> = if segment == 0 {
        // Fewer samples than bars: each bar takes at most one sample.
        (0..count)
            .map(|i| mono.get(i).map_or(0.0, |s| s.abs()))
            .collect()
    } else {
        mono.chunks_exact(segment)
            .take(count)
            .map(|chunk| chunk.iter().fold(0.0f32, |m, s| m.max(s.abs())))
            .collect()
    };

    let max_peak = bars.iter().copied().fold(0.0f32, f32::max).max(PEAK_FLOOR);
    for bar in &mut bars {
        *bar = (*bar / max_peak).clamp(0.0, 1.0);
    }

    WaveformPeaks {
        bars,
        placeholder: false,
    }
}

/// Loads `source` and extracts peaks. Fetch or decode failures degrade to the
/// flat placeholder instead of surfacing an error.
pub fn peaks_for_source(loader: &AudioLoader, source: &AudioSource, count: usize) -> WaveformPeaks {
    match loader.load(source) {
        Ok(audio) => extract_peaks(&audio, count),
        Err(err) => {
            log::warn!("Waveform for {} unavailable, using placeholder: {}", source, err);
            WaveformPeaks::placeholder(count.max(1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn mono(samples: Vec<f32>) -> DecodedAudio {
        DecodedAudio {
            channels: vec![samples],
            sample_rate: 44100,
        }
    }

    fn sine(len: usize, freq: f32, amp: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amp * (2.0 * std::f32::consts::PI * freq * i as f32 / 44100.0).sin())
            .collect()
    }

    #[test]
    fn output_has_requested_length_and_unit_max() {
        let audio = mono(sine(44100, 3.0, 0.4));
        let peaks = extract_peaks(&audio, DEFAULT_BAR_COUNT);

        assert_eq!(peaks.bars().len(), DEFAULT_BAR_COUNT);
        assert!(peaks.bars().iter().all(|&b| (0.0..=1.0).contains(&b)));
        let max = peaks.bars().iter().copied().fold(0.0f32, f32::max);
        assert_eq!(max, 1.0);
        assert!(!peaks.is_placeholder());
    }

    #[test]
    fn silence_normalizes_to_zero_bars() {
        let peaks = extract_peaks(&mono(vec![0.0; 10_000]), 200);
        assert_eq!(peaks.bars().len(), 200);
        assert!(peaks.bars().iter().all(|&b| b == 0.0));
        assert!(!peaks.is_placeholder());
    }

    #[test]
    fn remainder_samples_are_truncated() {
        // 10 samples, 3 bars: segments of 3, the final sample (the loudest) is dropped.
        let audio = mono(vec![0.1, 0.2, 0.1, 0.4, 0.0, 0.0, 0.2, 0.2, 0.2, 0.9]);
        let peaks = extract_peaks(&audio, 3);
        assert_eq!(peaks.bars(), &[0.5, 1.0, 0.5]);
    }

    #[test]
    fn channels_are_averaged_before_peaking() {
        let audio = DecodedAudio {
            channels: vec![vec![1.0, 1.0, 0.5, 0.5], vec![-1.0, -1.0, 0.5, 0.5]],
            sample_rate: 44100,
        };
        let peaks = extract_peaks(&audio, 2);
        // Left and right cancel in the first half.
        assert_eq!(peaks.bars(), &[0.0, 1.0]);
    }

    #[test]
    fn extraction_is_deterministic() {
        let audio = mono(sine(30_000, 7.0, 0.8));
        let a = extract_peaks(&audio, 200);
        let b = extract_peaks(&audio, 200);
        let bits = |p: &WaveformPeaks| p.bars().iter().map(|b| b.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn unreadable_source_yields_placeholder() {
        let loader = AudioLoader::new();
        let source = AudioSource::File(PathBuf::from("/nonexistent/mixscope/mix.wav"));
        let peaks = peaks_for_source(&loader, &source, 200);
        assert!(peaks.is_placeholder());
        assert_eq!(peaks.bars().len(), 200);
        assert!(peaks.bars().iter().all(|&b| b == PLACEHOLDER_LEVEL));
    }
}
