use super::bands::SpectrumReport;
use super::peaks::WaveformPeaks;
use super::source::AudioSource;

/// Identifies the computation a result belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    source: AudioSource,
}

impl Ticket {
    pub fn source(&self) -> &AudioSource {
        &self.source
    }
}

/// Every `select` bumps the generation; results computed for an older one are dropped.
#[derive(Default)]
pub struct VisualSession {
    generation: u64,
    source: Option<AudioSource>,
    peaks: Option<WaveformPeaks>,
    spectrum: Option<SpectrumReport>,
}

impl VisualSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches to `source`, discarding anything computed for the previous one.
    pub fn select(&mut self, source: AudioSource) -> Ticket {
        self.generation += 1;
        self.peaks = None;
        self.spectrum = None;
        self.source = Some(source.clone());
        Ticket {
            generation: self.generation,
            source,
        }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.generation == self.generation
    }

    /// Returns false (and drops `peaks`) if the ticket is stale.
    pub fn apply_peaks(&mut self, ticket: &Ticket, peaks: WaveformPeaks) -> bool {
        if !self.is_current(ticket) {
            log::debug!("Discarding stale waveform for {}", ticket.source);
            return false;
        }
        self.peaks = Some(peaks);
        true
    }

    pub fn apply_spectrum(&mut self, ticket: &Ticket, report: SpectrumReport) -> bool {
        if !self.is_current(ticket) {
            log::debug!("Discarding stale spectrum for {}", ticket.source);
            return false;
        }
        self.spectrum = Some(report);
        true
    }

    pub fn source(&self) -> Option<&AudioSource> {
        self.source.as_ref()
    }

    pub fn peaks(&self) -> Option<&WaveformPeaks> {
        self.peaks.as_ref()
    }

    pub fn spectrum(&self) -> Option<&SpectrumReport> {
        self.spectrum.as_ref()
    }
}
