pub const MIN_FREQ: f32 = 20.0;
pub const MAX_FREQ: f32 = 20_000.0;

/// Value domain the magnitudes were produced in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpectrumScale {
    /// Fixed-point 0..=255, as produced by byte analysers and the band decomposer.
    Byte,
    /// Already normalized to 0..=1.
    Unit,
}

/// Index `i` of an `N`-point spectrum sits at `20 * 1000^(i / N)` Hz.
#[derive(Clone, Debug, PartialEq)]
pub struct Spectrum {
    values: Vec<f32>,
    scale: SpectrumScale,
}

impl Spectrum {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            values: bytes.iter().map(|&b| b as f32).collect(),
            scale: SpectrumScale::Byte,
        }
    }

    /// Byte-domain values held as floats; clamped into 0..=255.
    pub fn from_byte_levels(levels: Vec<f32>) -> Self {
        Self {
            values: levels.into_iter().map(|v| v.clamp(0.0, 255.0)).collect(),
            scale: SpectrumScale::Byte,
        }
    }

    pub fn from_unit(values: Vec<f32>) -> Self {
        Self {
            values: values.into_iter().map(|v| v.clamp(0.0, 1.0)).collect(),
            scale: SpectrumScale::Unit,
        }
    }

    /// Flat stand-in used when the source audio is unavailable.
    pub fn placeholder(len: usize) -> Self {
        Self::from_unit(vec![super::peaks::PLACEHOLDER_LEVEL; len])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[cfg(test)]
    pub fn scale(&self) -> SpectrumScale {
        self.scale
    }

    #[cfg(test)]
    pub fn raw(&self) -> &[f32] {
        &self.values
    }

    /// Magnitudes mapped into 0..=1 regardless of the source scale.
    pub fn normalized(&self) -> Vec<f32> {
        match self.scale {
            SpectrumScale::Byte => self.values.iter().map(|v| v / 255.0).collect(),
            SpectrumScale::Unit => self.values.clone(),
        }
    }

    pub fn frequency_at(&self, index: usize) -> f32 {
        log_frequency(index, self.values.len())
    }
}

/// `f(i) = 20 * 1000^(i / n)`.
pub fn log_frequency(index: usize, n: usize) -> f32 {
    if n == 0 {
        return MIN_FREQ;
    }
    MIN_FREQ * 1000f32.powf(index as f32 / n as f32)
}
