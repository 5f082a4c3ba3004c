use std::sync::Arc;

use crate::audio::decode::DecodedAudio;

use super::analyser::{Analyser, AnalyserOptions};

pub struct StereoTaps {
    pub left: Analyser,
    pub right: Analyser,
}

pub struct Playback {
    audio: Arc<DecodedAudio>,
    position: usize,
    playing: bool,
    options: AnalyserOptions,
    analyser: Option<Analyser>,
    stereo: Option<StereoTaps>,
}

impl Playback {
    pub fn new(audio: Arc<DecodedAudio>, options: AnalyserOptions) -> Self {
        Self {
            audio,
            position: 0,
            playing: false,
            options,
            analyser: None,
            stereo: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.audio.sample_rate
    }

    pub fn play(&mut self) {
        if self.position < self.audio.frames() {
            self.playing = true;
        }
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn position_secs(&self) -> f32 {
        self.position as f32 / self.audio.sample_rate.max(1) as f32
    }

    #[cfg(test)]
    pub fn is_analyser_connected(&self) -> bool {
        self.analyser.is_some()
    }

    /// Mono analyser, connected on first use. Later calls return the same node.
    pub fn analyser(&mut self) -> &mut Analyser {
        let sample_rate = self.audio.sample_rate;
        let options = self.options;
        self.analyser.get_or_insert_with(|| {
            log::debug!("Connecting analyser (fft_size={})", options.fft_size);
            Analyser::new(sample_rate, options)
        })
    }

    /// Left/right analyser pair, connected on first use.
    pub fn stereo_taps(&mut self) -> &mut StereoTaps {
        let sample_rate = self.audio.sample_rate;
        let options = self.options;
        self.stereo.get_or_insert_with(|| {
            log::debug!("Connecting stereo analysers");
            StereoTaps {
                left: Analyser::new(sample_rate, options),
                right: Analyser::new(sample_rate, options),
            }
        })
    }

    /// Moves the play head forward by up to `frames` and feeds connected
    /// analysers. Stops at the end of the audio. Returns frames played.
    pub fn advance(&mut self, frames: usize) -> usize {
        if !self.playing {
            return 0;
        }
        let total = self.audio.frames();
        let end = (self.position + frames).min(total);
        let start = self.position;

        if let Some(analyser) = self.analyser.as_mut() {
            let n = self.audio.channels.len().max(1) as f32;
            let mono: Vec<f32> = (start..end)
                .map(|i| self.audio.channels.iter().map(|c| c[i]).sum::<f32>() / n)
                .collect();
            analyser.push(&mono);
        }

        if let (Some(taps), Some((left, right))) = (self.stereo.as_mut(), self.audio.stereo_pair()) {
            taps.left.push(&left[start..end]);
            taps.right.push(&right[start..end]);
        }

        self.position = end;
        if self.position >= total {
            self.playing = false;
        }
        end - start
    }

    pub fn seek(&mut self, secs: f32) {
        let frame = (secs.max(0.0) * self.audio.sample_rate as f32) as usize;
        self.position = frame.min(self.audio.frames());
        if let Some(a) = self.analyser.as_mut() {
            a.reset();
        }
        if let Some(t) = self.stereo.as_mut() {
            t.left.reset();
            t.right.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::analyser::TimeDomainSource;

    fn playback(frames: usize) -> Playback {
        let audio = DecodedAudio {
            channels: vec![vec![0.5; frames], vec![-0.5; frames]],
            sample_rate: 1000,
        };
        Playback::new(
            Arc::new(audio),
            AnalyserOptions {
                fft_size: 32,
                ..Default::default()
            },
        )
    }

    #[test]
    fn analyser_connects_once() {
        let mut p = playback(100);
        assert!(!p.is_analyser_connected());
        p.play();
        p.analyser();
        p.advance(40);
        // A second lookup must return the node that already saw audio.
        let mut out = vec![1.0; 32];
        p.analyser().time_domain_data(&mut out);
        assert!(out.iter().all(|&s| s == 0.0)); // mono of +0.5/-0.5
        assert!(p.is_analyser_connected());
    }

    #[test]
    fn stops_at_end() {
        let mut p = playback(100);
        p.play();
        assert_eq!(p.advance(60), 60);
        assert_eq!(p.advance(60), 40);
        assert!(!p.is_playing());
        assert_eq!(p.advance(60), 0);
    }

    #[test]
    fn paused_playback_does_not_move() {
        let mut p = playback(100);
        assert_eq!(p.advance(10), 0);
        assert_eq!(p.position_secs(), 0.0);
    }

    #[test]
    fn stereo_taps_receive_each_side() {
        let mut p = playback(100);
        p.stereo_taps();
        p.play();
        p.advance(50);
        let taps = p.stereo_taps();
        let mut l = vec![0.0; 32];
        let mut r = vec![0.0; 32];
        taps.left.time_domain_data(&mut l);
        taps.right.time_domain_data(&mut r);
        assert!(l.iter().all(|&s| s == 0.5));
        assert!(r.iter().all(|&s| s == -0.5));
    }
}
