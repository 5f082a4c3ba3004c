use super::features::{BandEnergies, FrequencyMetrics, BANDS};
use super::spectrum::{Spectrum, MAX_FREQ};

const ROLLOFF_FRACTION: f32 = 0.85;
/// Linear magnitude ratio of -10 dB.
const BANDWIDTH_THRESHOLD: f32 = 0.316;
const BRIGHTNESS_REFERENCE_HZ: f32 = 5000.0;

/// Derives the full metric set from a spectrum.
///
/// Degenerate input (empty or silent spectra) never errors: every ratio with
/// a zero denominator comes out as 0, and the rolloff falls back to 20 kHz.
pub fn calculate(spectrum: &Spectrum) -> FrequencyMetrics {
    let values = spectrum.normalized();
    let n = values.len();
    if n == 0 {
        return FrequencyMetrics {
            spectral_rolloff: MAX_FREQ,
            ..Default::default()
        };
    }

    let freqs: Vec<f32> = (0..n).map(|i| spectrum.frequency_at(i)).collect();
    let total: f32 = values.iter().sum();
    let mean = total / n as f32;

    let bands = band_energies(&values, &freqs);

    let spectral_centroid = if total > 0.0 {
        freqs.iter().zip(&values).map(|(f, v)| f * v).sum::<f32>() / total
    } else {
        0.0
    };

    let spectral_rolloff = rolloff(&values, &freqs, total);

    // First occurrence wins on ties.
    let (peak_index, peak_value) = values
        .iter()
        .enumerate()
        .fold((0, f32::MIN), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) });
    let peak_frequency = freqs[peak_index];

    let bandwidth = if peak_value > 0.0 {
        let threshold = peak_value * BANDWIDTH_THRESHOLD;
        let first = values.iter().position(|&v| v >= threshold);
        let last = values.iter().rposition(|&v| v >= threshold);
        match (first, last) {
            (Some(a), Some(b)) => freqs[b] - freqs[a],
            _ => 0.0,
        }
    } else {
        0.0
    };

    let dynamic_range = if mean > 0.0 { peak_value / mean } else { 0.0 };

    let low = bands.sub_bass + bands.bass + bands.low_mids;
    let high = bands.mids + bands.high_mids + bands.highs;
    let low_high_ratio = if high > 0.0 { low / high } else { 0.0 };

    FrequencyMetrics {
        bands,
        spectral_centroid,
        spectral_rolloff,
        peak_frequency,
        bandwidth,
        total_energy: mean,
        dynamic_range,
        low_high_ratio,
        bass_presence: (2.0 * (bands.sub_bass + bands.bass)).min(1.0),
        brightness_score: (spectral_centroid / BRIGHTNESS_REFERENCE_HZ).min(1.0),
    }
}

fn band_energies(values: &[f32], freqs: &[f32]) -> BandEnergies {
    let mut out = [0.0f32; 6];
    for (slot, &(_, low, high)) in out.iter_mut().zip(BANDS.iter()) {
        let (sum, count) = values
            .iter()
            .zip(freqs)
            .filter(|(_, &f)| f >= low && f < high)
            .fold((0.0f32, 0usize), |(s, c), (v, _)| (s + v, c + 1));
        *slot = if count > 0 { sum / count as f32 } else { 0.0 };
    }
    BandEnergies::from_array(out)
}

fn rolloff(values: &[f32], freqs: &[f32], total: f32) -> f32 {
    if total <= 0.0 {
        return MAX_FREQ;
    }
    let target = total * ROLLOFF_FRACTION;
    let mut cumulative = 0.0f32;
    for (v, f) in values.iter().zip(freqs) {
        cumulative += v;
        if cumulative >= target {
            return *f;
        }
    }
    MAX_FREQ
}
