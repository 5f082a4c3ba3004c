use std::fmt::Write;

use crate::audio::features::{FrequencyMetrics, BANDS};
use crate::audio::peaks::WaveformPeaks;
use crate::audio::spectrum::Spectrum;
use crate::jobs::kinds::{AudioMetrics, StemMetrics};
use crate::live::stereo::CorrelationState;

const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Vectorscope points plotted per frame; the rest are skipped evenly.
pub const DEFAULT_VECTORSCOPE_POINTS: usize = 512;

fn level_char(value: f32) -> char {
    let v = value.clamp(0.0, 1.0);
    LEVELS[((v * (LEVELS.len() - 1) as f32).round() as usize).min(LEVELS.len() - 1)]
}

/// Resamples `values` to `width` columns, keeping the max of each group.
fn columns(values: &[f32], width: usize) -> Vec<f32> {
    if values.is_empty() || width == 0 {
        return Vec::new();
    }
    (0..width)
        .map(|c| {
            let start = c * values.len() / width;
            let end = ((c + 1) * values.len() / width).max(start + 1).min(values.len());
            values[start..end].iter().copied().fold(0.0f32, f32::max)
        })
        .collect()
}

/// One line of block characters for 0..1 values, one per column.
pub fn level_line(values: &[f32], width: usize) -> String {
    columns(values, width).into_iter().map(level_char).collect()
}

pub fn waveform_line(peaks: &WaveformPeaks, width: usize) -> String {
    level_line(peaks.bars(), width)
}

/// Vertical bar chart of a spectrum, top row first.
pub fn spectrum_rows(spectrum: &Spectrum, width: usize, height: usize) -> Vec<String> {
    if spectrum.is_empty() {
        return Vec::new();
    }
    let cols = columns(&spectrum.normalized(), width);
    (0..height)
        .rev()
        .map(|row| {
            cols.iter()
                .map(|&v| {
                    let fill = v * height as f32 - row as f32;
                    if fill >= 1.0 {
                        '█'
                    } else if fill > 0.0 {
                        level_char(fill)
                    } else {
                        ' '
                    }
                })
                .collect()
        })
        .collect()
}

/// Plots up to `max_points` evenly spaced vectorscope points on a `size` x
/// `size` grid. Points are expected in roughly -2..2 on both axes; anything
/// outside is clipped to the border.
pub fn vectorscope(points: &[(f32, f32)], size: usize, max_points: usize) -> Vec<String> {
    let size = size.max(3);
    let mut grid = vec![vec![' '; size]; size];
    let mid = size / 2;
    for (i, row) in grid.iter_mut().enumerate() {
        row[mid] = if i == mid { '+' } else { '·' };
    }
    for cell in grid[mid].iter_mut() {
        if *cell == ' ' {
            *cell = '·';
        }
    }

    let scale = (size - 1) as f32 / 4.0;
    let step = points.len().div_ceil(max_points.max(1)).max(1);
    for &(x, y) in points.iter().step_by(step) {
        let col = ((x + 2.0) * scale).round().clamp(0.0, (size - 1) as f32) as usize;
        let row = ((y + 2.0) * scale).round().clamp(0.0, (size - 1) as f32) as usize;
        grid[row][col] = '*';
    }
    grid.into_iter().map(|r| r.into_iter().collect()).collect()
}

/// Horizontal -1..+1 meter with a marker at the correlation value.
pub fn correlation_meter(state: &CorrelationState, width: usize) -> String {
    let width = width.max(3);
    let pos = ((state.correlation.clamp(-1.0, 1.0) + 1.0) / 2.0 * (width - 1) as f32).round() as usize;
    let bar: String = (0..width)
        .map(|i| if i == pos { '|' } else { '-' })
        .collect();
    format!(
        "-1 [{bar}] +1  corr {:+.2}  width {:>3.0}%",
        state.correlation,
        state.width * 100.0
    )
}

pub fn metrics_table(metrics: &FrequencyMetrics) -> String {
    let mut out = String::new();
    let bands = metrics.bands.as_array();
    for ((name, low, high), value) in BANDS.iter().zip(bands) {
        let _ = writeln!(out, "  {name:<10} {low:>6.0}-{high:<6.0} Hz  {value:.3}");
    }
    let rows = scalar_rows(metrics);
    for (label, value) in rows {
        let _ = writeln!(out, "  {label:<18} {value}");
    }
    out
}

/// Side-by-side metrics for a mix and its reference, with the difference.
pub fn comparison_table(mix: &FrequencyMetrics, reference: &FrequencyMetrics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "  {:<18} {:>10} {:>10} {:>10}", "", "mix", "reference", "delta");
    let pairs = [
        ("centroid Hz", mix.spectral_centroid, reference.spectral_centroid),
        ("rolloff Hz", mix.spectral_rolloff, reference.spectral_rolloff),
        ("peak Hz", mix.peak_frequency, reference.peak_frequency),
        ("bandwidth Hz", mix.bandwidth, reference.bandwidth),
        ("energy", mix.total_energy, reference.total_energy),
        ("dynamic range", mix.dynamic_range, reference.dynamic_range),
        ("low/high", mix.low_high_ratio, reference.low_high_ratio),
        ("bass presence", mix.bass_presence, reference.bass_presence),
        ("brightness", mix.brightness_score, reference.brightness_score),
    ];
    for (label, a, b) in pairs {
        let _ = writeln!(out, "  {label:<18} {a:>10.2} {b:>10.2} {:>+10.2}", a - b);
    }
    out
}

/// Server-side loudness, rhythm and tonal metrics for mix and reference.
pub fn server_metrics_table(mix: &AudioMetrics, reference: &AudioMetrics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "  {:<18} {:>10} {:>10}", "", "mix", "reference");
    let pairs = [
        ("integrated LUFS", mix.integrated_lufs, reference.integrated_lufs),
        ("loudness range LU", mix.loudness_range, reference.loudness_range),
        ("true peak dBTP", mix.true_peak, reference.true_peak),
        ("dyn. complexity", mix.dynamic_complexity, reference.dynamic_complexity),
        ("bpm", mix.bpm, reference.bpm),
        ("danceability", mix.danceability, reference.danceability),
        ("centroid Hz", mix.spectral_centroid, reference.spectral_centroid),
        ("rolloff Hz", mix.spectral_rolloff, reference.spectral_rolloff),
        ("flux", mix.spectral_flux, reference.spectral_flux),
    ];
    for (label, a, b) in pairs {
        let _ = writeln!(out, "  {label:<18} {a:>10.2} {b:>10.2}");
    }
    let key = |m: &AudioMetrics| format!("{} {}", m.key, m.scale).trim().to_string();
    let _ = writeln!(out, "  {:<18} {:>10} {:>10}", "key", key(mix), key(reference));
    out
}

/// One line per stem as the server measured it.
pub fn stem_metrics_line(name: &str, metrics: &StemMetrics) -> String {
    format!(
        "{name:<8} {:>7.1} LUFS  centroid {:>6.0} Hz  rolloff {:>6.0} Hz",
        metrics.integrated_lufs, metrics.spectral_centroid, metrics.spectral_rolloff
    )
}

fn scalar_rows(m: &FrequencyMetrics) -> Vec<(&'static str, String)> {
    vec![
        ("centroid", format!("{:.0} Hz", m.spectral_centroid)),
        ("rolloff", format!("{:.0} Hz", m.spectral_rolloff)),
        ("peak", format!("{:.0} Hz", m.peak_frequency)),
        ("bandwidth", format!("{:.0} Hz", m.bandwidth)),
        ("total energy", format!("{:.3}", m.total_energy)),
        ("dynamic range", format!("{:.2}", m.dynamic_range)),
        ("low/high ratio", format!("{:.2}", m.low_high_ratio)),
        ("bass presence", format!("{:.2}", m.bass_presence)),
        ("brightness", format!("{:.2}", m.brightness_score)),
    ]
}
