use serde::Serialize;

/// Sums below this are treated as silence.
const EPSILON: f32 = 1e-9;

pub const DEFAULT_THROTTLE: u32 = 10;

/// Latest published correlation (-1..1) and width (0..1).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct CorrelationState {
    pub correlation: f32,
    pub width: f32,
}

/// Measures one window and, in the same loop, writes one vectorscope point
/// `(l - r, -(l + r))` per sample pair into `points` (cleared first).
pub fn measure(left: &[f32], right: &[f32], points: &mut Vec<(f32, f32)>) -> CorrelationState {
    let len = left.len().min(right.len());
    points.clear();

    let mut mid = 0.0f32;
    let mut side = 0.0f32;
    let mut sum_ll = 0.0f32;
    let mut sum_rr = 0.0f32;
    let mut sum_lr = 0.0f32;

    for i in 0..len {
        let l = left[i];
        let r = right[i];
        mid += (l + r).abs();
        side += (l - r).abs();
        sum_ll += l * l;
        sum_rr += r * r;
        sum_lr += l * r;
        points.push((l - r, -(l + r)));
    }

    let correlation = if sum_ll > EPSILON && sum_rr > EPSILON {
        (sum_lr / (sum_ll * sum_rr).sqrt()).clamp(-1.0, 1.0)
    } else {
        0.0
    };
    let width = if mid + side > EPSILON {
        side / (mid + side)
    } else {
        0.0
    };

    CorrelationState { correlation, width }
}

/// Frame-driven analyzer: measures every frame, publishes every `throttle`th.
pub struct StereoAnalyzer {
    throttle: u32,
    frame: u64,
    state: CorrelationState,
    points: Vec<(f32, f32)>,
}

impl StereoAnalyzer {
    pub fn new(throttle: u32) -> Self {
        Self {
            throttle: throttle.max(1),
            frame: 0,
            state: CorrelationState::default(),
            points: Vec::new(),
        }
    }

    /// Processes one frame. Returns true when the published state changed.
    pub fn process(&mut self, left: &[f32], right: &[f32]) -> bool {
        let measured = measure(left, right, &mut self.points);
        let publish = self.frame % self.throttle as u64 == 0;
        self.frame += 1;
        if publish {
            self.state = measured;
        }
        publish
    }

    pub fn state(&self) -> CorrelationState {
        self.state
    }

    /// Vectorscope points from the most recent frame.
    pub fn points(&self) -> &[(f32, f32)] {
        &self.points
    }

    pub fn reset(&mut self) {
        self.frame = 0;
        self.state = CorrelationState::default();
        self.points.clear();
    }
}

impl Default for StereoAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize) -> Vec<f32> {
        (0..len).map(|i| (i as f32 * 0.05).sin() * 0.7).collect()
    }

    /// Deterministic white noise in -1..1.
    fn noise(len: usize, mut seed: u64) -> Vec<f32> {
        (0..len)
            .map(|_| {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((seed >> 33) as f32 / (1u64 << 31) as f32) * 2.0 - 1.0
            })
            .collect()
    }

    #[test]
    fn identical_channels_are_mono() {
        let s = sine(2048);
        let m = measure(&s, &s, &mut Vec::new());
        assert!((m.correlation - 1.0).abs() < 1e-4);
        assert!(m.width.abs() < 1e-6);
    }

    #[test]
    fn inverted_channels_are_anti_correlated() {
        let l = sine(2048);
        let r: Vec<f32> = l.iter().map(|s| -s).collect();
        let m = measure(&l, &r, &mut Vec::new());
        assert!((m.correlation + 1.0).abs() < 1e-4);
        assert!((m.width - 1.0).abs() < 1e-6);
    }

    #[test]
    fn uncorrelated_noise_stays_low() {
        let l = noise(65536, 1);
        let r = noise(65536, 99);
        let m = measure(&l, &r, &mut Vec::new());
        assert!(m.correlation.abs() < 0.1, "{}", m.correlation);
        assert!(m.width > 0.3 && m.width < 0.7);
    }

    #[test]
    fn silence_is_neutral() {
        let z = vec![0.0; 256];
        let m = measure(&z, &z, &mut Vec::new());
        assert_eq!(m.correlation, 0.0);
        assert_eq!(m.width, 0.0);
    }

    #[test]
    fn vectorscope_has_one_rotated_point_per_sample() {
        let l = vec![0.5, 0.25, 0.0, 1.0];
        let r = vec![0.5, 0.0, 0.25, -1.0];
        let mut points = Vec::new();
        measure(&l, &r, &mut points);
        assert_eq!(points, vec![(0.0, -1.0), (0.25, -0.25), (-0.25, -0.25), (2.0, 0.0)]);

        measure(&sine(1000), &sine(1000), &mut points);
        assert_eq!(points.len(), 1000);
    }

    #[test]
    fn state_updates_are_throttled() {
        let mut analyzer = StereoAnalyzer::new(10);
        let s = sine(512);
        let inv: Vec<f32> = s.iter().map(|x| -x).collect();

        assert!(analyzer.process(&s, &s)); // frame 0 publishes
        assert!((analyzer.state().correlation - 1.0).abs() < 1e-4);

        // Frames 1..=9 are measured but not published.
        for _ in 1..10 {
            assert!(!analyzer.process(&s, &inv));
        }
        assert!((analyzer.state().correlation - 1.0).abs() < 1e-4);
        assert!(!analyzer.points().is_empty());

        assert!(analyzer.process(&s, &inv)); // frame 10
        assert!((analyzer.state().correlation + 1.0).abs() < 1e-4);
    }
}
