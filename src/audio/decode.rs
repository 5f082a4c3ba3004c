use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::source::SourceError;

/// Decoded audio kept per channel (planar), as handed out by the decoder.
#[derive(Clone, Debug)]
pub struct DecodedAudio {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Length in frames of the shortest channel.
    pub fn frames(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    pub fn duration(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f32 / self.sample_rate as f32
    }

    /// Averages all channels into one mono buffer.
    pub fn mono(&self) -> Vec<f32> {
        let frames = self.frames();
        match self.channels.len() {
            0 => Vec::new(),
            1 => self.channels[0][..frames].to_vec(),
            n => (0..frames)
                .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / n as f32)
                .collect(),
        }
    }

    /// Left/right pair. Mono material is duplicated onto both sides.
    pub fn stereo_pair(&self) -> Option<(&[f32], &[f32])> {
        let frames = self.frames();
        match self.channels.len() {
            0 => None,
            1 => Some((&self.channels[0][..frames], &self.channels[0][..frames])),
            _ => Some((&self.channels[0][..frames], &self.channels[1][..frames])),
        }
    }
}

/// Decodes a complete in-memory container. `extension` is only a probe hint.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<DecodedAudio, SourceError> {
    decode_source(Box::new(Cursor::new(bytes)), extension)
}

pub fn decode_source(
    source: Box<dyn MediaSource>,
    extension: Option<&str>,
) -> Result<DecodedAudio, SourceError> {
    let mss = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| SourceError::Decode(format!("failed to probe format: {e}")))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| SourceError::Decode("no audio tracks found".into()))?;

    let track_id = track.id;
    let channel_count = track.codec_params.channels.map_or(1, |c| c.count()).max(1);
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| SourceError::Decode("unknown sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| SourceError::Decode(format!("failed to create decoder: {e}")))?;

    let mut channels: Vec<Vec<f32>> = vec![Vec::new(); channel_count];

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(SourceError::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(SourceError::Decode(e.to_string())),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        // De-interleave
        for frame in sample_buf.samples().chunks(channel_count) {
            for (ch, &s) in frame.iter().enumerate() {
                channels[ch].push(s);
            }
        }
    }

    let audio = DecodedAudio {
        channels,
        sample_rate,
    };

    log::debug!(
        "Decoded audio: {} frames x {} channels, {}Hz, {:.1}s",
        audio.frames(),
        audio.channel_count(),
        sample_rate,
        audio.duration()
    );

    Ok(audio)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a 16-bit PCM WAV file from interleaved samples.
    pub(crate) fn wav_bytes(interleaved: &[f32], channels: u16, sample_rate: u32) -> Vec<u8> {
        let data_len = (interleaved.len() * 2) as u32;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
        out.extend_from_slice(&(channels * 2).to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for &s in interleaved {
            let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    #[test]
    fn decodes_stereo_wav_into_planar_channels() {
        let interleaved: Vec<f32> = (0..400)
            .flat_map(|i| {
                let l = if i % 2 == 0 { 0.5 } else { -0.5 };
                [l, 0.25]
            })
            .collect();
        let audio = decode_bytes(wav_bytes(&interleaved, 2, 8000), Some("wav")).unwrap();

        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.channel_count(), 2);
        assert_eq!(audio.frames(), 400);
        assert!((audio.channels[0][0] - 0.5).abs() < 1e-3);
        assert!((audio.channels[0][1] + 0.5).abs() < 1e-3);
        assert!((audio.channels[1][7] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let result = decode_bytes(b"definitely not audio".to_vec(), None);
        assert!(matches!(result, Err(SourceError::Decode(_))));
    }

    #[test]
    fn mono_averages_channels() {
        let audio = DecodedAudio {
            channels: vec![vec![1.0, 0.0, -1.0], vec![0.0, 0.0, 1.0]],
            sample_rate: 44100,
        };
        assert_eq!(audio.mono(), vec![0.5, 0.0, 0.0]);
    }
}
