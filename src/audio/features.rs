use serde::Serialize;

/// Average normalized magnitude per named band.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BandEnergies {
    pub sub_bass: f32,  // 20-60 Hz
    pub bass: f32,      // 60-250 Hz
    pub low_mids: f32,  // 250-500 Hz
    pub mids: f32,      // 500-2000 Hz
    pub high_mids: f32, // 2-6 kHz
    pub highs: f32,     // 6-20 kHz
}

/// Named band edges in Hz, in reporting order.
pub const BANDS: [(&str, f32, f32); 6] = [
    ("subBass", 20.0, 60.0),
    ("bass", 60.0, 250.0),
    ("lowMids", 250.0, 500.0),
    ("mids", 500.0, 2000.0),
    ("highMids", 2000.0, 6000.0),
    ("highs", 6000.0, 20000.0),
];

impl BandEnergies {
    pub fn from_array(values: [f32; 6]) -> Self {
        Self {
            sub_bass: values[0],
            bass: values[1],
            low_mids: values[2],
            mids: values[3],
            high_mids: values[4],
            highs: values[5],
        }
    }

    pub fn as_array(&self) -> [f32; 6] {
        [
            self.sub_bass,
            self.bass,
            self.low_mids,
            self.mids,
            self.high_mids,
            self.highs,
        ]
    }
}

/// Descriptive metrics derived from one spectrum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrequencyMetrics {
    pub bands: BandEnergies,
    /// Hz
    pub spectral_centroid: f32,
    /// Hz, 85% cumulative energy point
    pub spectral_rolloff: f32,
    /// Hz
    pub peak_frequency: f32,
    /// Hz, width of the region within -10 dB of the peak
    pub bandwidth: f32,
    /// Mean normalized magnitude
    pub total_energy: f32,
    /// Peak / mean
    pub dynamic_range: f32,
    pub low_high_ratio: f32,
    /// 0.0-1.0
    pub bass_presence: f32,
    /// 0.0-1.0
    pub brightness_score: f32,
}
