use crate::audio::features::FrequencyMetrics;
use crate::audio::metrics;
use crate::audio::spectrum::Spectrum;

use super::analyser::TimeDomainSource;
use super::frame_loop::LoopControl;
use super::playback::Playback;
use super::sampler::LiveSpectrumSampler;
use super::stereo::{CorrelationState, StereoAnalyzer};

/// Everything a redraw needs, computed by the last tick.
#[derive(Clone, Debug)]
pub struct LiveSnapshot {
    pub frame: u64,
    /// Frames the spectrum sampler has copied so far.
    pub sampled: u64,
    pub position_secs: f32,
    pub playing: bool,
    pub stereo: CorrelationState,
    pub points: Vec<(f32, f32)>,
    pub spectrum: Spectrum,
    pub metrics: FrequencyMetrics,
}

/// Binds the live sampler and stereo analyzer to one playback element.
pub struct LiveMonitor {
    playback: Playback,
    sampler: LiveSpectrumSampler,
    stereo: StereoAnalyzer,
    frames_per_tick: usize,
    spectrum_points: usize,
    left: Vec<f32>,
    right: Vec<f32>,
    latest: LiveSnapshot,
}

impl LiveMonitor {
    pub fn new(mut playback: Playback, fps: u32, spectrum_points: usize, stereo: StereoAnalyzer) -> Self {
        let frames_per_tick = (playback.sample_rate() as f32 / fps.max(1) as f32).round().max(1.0) as usize;
        let window = playback.stereo_taps().left.window_len();
        playback.analyser();
        Self {
            playback,
            sampler: LiveSpectrumSampler::new(),
            stereo,
            frames_per_tick,
            spectrum_points,
            left: vec![0.0; window],
            right: vec![0.0; window],
            latest: LiveSnapshot {
                frame: 0,
                sampled: 0,
                position_secs: 0.0,
                playing: false,
                stereo: CorrelationState::default(),
                points: Vec::new(),
                spectrum: Spectrum::from_bytes(&vec![0; spectrum_points]),
                metrics: FrequencyMetrics::default(),
            },
        }
    }

    pub fn playback_mut(&mut self) -> &mut Playback {
        &mut self.playback
    }

    /// One animation frame: advance playback, sample, measure, publish.
    /// Returns `Stop` once playback is no longer running.
    pub fn tick(&mut self, frame: u64) -> LoopControl {
        let playing = self.playback.is_playing();
        if !playing {
            self.latest.playing = false;
            return LoopControl::Stop;
        }

        self.playback.advance(self.frames_per_tick);
        self.sampler.sample(self.playback.analyser(), playing);

        let taps = self.playback.stereo_taps();
        taps.left.time_domain_data(&mut self.left);
        taps.right.time_domain_data(&mut self.right);
        self.stereo.process(&self.left, &self.right);

        let spectrum = self.sampler.log_spectrum(self.spectrum_points);
        self.latest = LiveSnapshot {
            frame,
            sampled: self.sampler.frames_sampled(),
            position_secs: self.playback.position_secs(),
            playing: self.playback.is_playing(),
            stereo: self.stereo.state(),
            points: self.stereo.points().to_vec(),
            metrics: metrics::calculate(&spectrum),
            spectrum,
        };

        if self.playback.is_playing() {
            LoopControl::Continue
        } else {
            LoopControl::Stop
        }
    }

    pub fn snapshot(&self) -> &LiveSnapshot {
        &self.latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode::DecodedAudio;
    use crate::live::analyser::AnalyserOptions;
    use crate::live::frame_loop::FrameLoop;
    use std::sync::Arc;

    #[test]
    fn runs_until_playback_ends() {
        let sr = 8000;
        let tone: Vec<f32> = (0..sr as usize)
            .map(|i| (2.0 * std::f32::consts::PI * 500.0 * i as f32 / sr as f32).sin() * 0.5)
            .collect();
        let audio = DecodedAudio {
            channels: vec![tone.clone(), tone],
            sample_rate: sr,
        };
        let mut playback = Playback::new(
            Arc::new(audio),
            AnalyserOptions {
                fft_size: 512,
                ..Default::default()
            },
        );
        playback.play();
        let mut monitor = LiveMonitor::new(playback, 50, 64, StereoAnalyzer::new(10));

        let frames = FrameLoop::new(50, false).run(|f| monitor.tick(f));

        // One second of audio at 50 frames per second.
        assert_eq!(frames, 50);
        let snap = monitor.snapshot();
        assert_eq!(snap.sampled, 50);
        assert!(!snap.playing);
        assert!((snap.stereo.correlation - 1.0).abs() < 1e-3);
        assert!(snap.stereo.width < 1e-3);
        assert_eq!(snap.spectrum.len(), 64);
        assert!(snap.metrics.peak_frequency > 300.0 && snap.metrics.peak_frequency < 800.0);
    }

    #[test]
    fn paused_playback_stops_immediately() {
        let audio = DecodedAudio {
            channels: vec![vec![0.0; 1000]],
            sample_rate: 1000,
        };
        let playback = Playback::new(Arc::new(audio), AnalyserOptions::default());
        let mut monitor = LiveMonitor::new(playback, 10, 16, StereoAnalyzer::default());
        assert_eq!(monitor.tick(0), LoopControl::Stop);
    }
}
