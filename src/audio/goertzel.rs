use std::f32::consts::PI;

/// Magnitude of DFT bin `k` of `frame`, equal to `|X[k]|` of a full transform
/// of the same length.
pub fn magnitude(frame: &[f32], k: usize) -> f32 {
    let n = frame.len();
    if n == 0 {
        return 0.0;
    }
    let omega = 2.0 * PI * k as f32 / n as f32;
    let (sin, cos) = omega.sin_cos();
    let coeff = 2.0 * cos;

    let mut s1 = 0.0f32;
    let mut s2 = 0.0f32;
    for &x in frame {
        let s0 = x + coeff * s1 - s2;
        s2 = s1;
        s1 = s0;
    }

    let real = s1 - s2 * cos;
    let imag = s2 * sin;
    (real * real + imag * imag).sqrt()
}
