use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use super::decode::{decode_bytes, DecodedAudio};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode audio: {0}")]
    Decode(String),
}

/// Where a piece of audio lives: a local file or an HTTP(S) URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AudioSource {
    File(PathBuf),
    Url(String),
}

impl AudioSource {
    pub fn parse(input: &str) -> Self {
        if input.starts_with("http://") || input.starts_with("https://") {
            AudioSource::Url(input.to_string())
        } else {
            AudioSource::File(PathBuf::from(input))
        }
    }

    fn extension(&self) -> Option<String> {
        let path = match self {
            AudioSource::File(p) => p.clone(),
            AudioSource::Url(u) => {
                let trimmed = u.split(['?', '#']).next().unwrap_or(u);
                PathBuf::from(trimmed)
            }
        };
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

impl fmt::Display for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioSource::File(p) => write!(f, "{}", p.display()),
            AudioSource::Url(u) => f.write_str(u),
        }
    }
}

impl From<&Path> for AudioSource {
    fn from(path: &Path) -> Self {
        AudioSource::File(path.to_path_buf())
    }
}

/// Fetches and decodes audio sources one at a time.
///
/// The HTTP client is shared across loads. Decoder state is created per call
/// and dropped before `load` returns, so nothing accumulates between files.
pub struct AudioLoader {
    http: reqwest::blocking::Client,
}

impl AudioLoader {
    pub fn new() -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self { http }
    }

    pub fn load(&self, source: &AudioSource) -> Result<DecodedAudio, SourceError> {
        let bytes = self.fetch(source)?;
        let ext = source.extension();
        log::debug!("Decoding {} ({} bytes)", source, bytes.len());
        decode_bytes(bytes, ext.as_deref())
    }

    fn fetch(&self, source: &AudioSource) -> Result<Vec<u8>, SourceError> {
        match source {
            AudioSource::File(path) => std::fs::read(path).map_err(|e| SourceError::Read {
                path: path.clone(),
                source: e,
            }),
            AudioSource::Url(url) => {
                let fail = |reason: String| SourceError::Fetch {
                    url: url.clone(),
                    reason,
                };
                let response = self
                    .http
                    .get(url)
                    .send()
                    .map_err(|e| fail(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(fail(format!("HTTP {}", response.status())));
                }
                let body = response.bytes().map_err(|e| fail(e.to_string()))?;
                Ok(body.to_vec())
            }
        }
    }
}

impl Default for AudioLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_urls_and_paths() {
        assert_eq!(
            AudioSource::parse("http://localhost:4000/uploads/a.wav"),
            AudioSource::Url("http://localhost:4000/uploads/a.wav".into())
        );
        assert_eq!(
            AudioSource::parse("mixes/final.flac"),
            AudioSource::File(PathBuf::from("mixes/final.flac"))
        );
    }

    #[test]
    fn extension_ignores_query_string() {
        let src = AudioSource::parse("https://cdn.example.com/stems/vocals.WAV?sig=abc");
        assert_eq!(src.extension().as_deref(), Some("wav"));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let loader = AudioLoader::new();
        let err = loader
            .load(&AudioSource::File(PathBuf::from("/nonexistent/mixscope/none.wav")))
            .unwrap_err();
        assert!(matches!(err, SourceError::Read { .. }));
    }
}
