use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::machine::{JobKind, Transition};

/// Opaque server-issued job identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

/// Server-side metrics for one track.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioMetrics {
    // Loudness & dynamics
    pub integrated_lufs: f32,
    pub loudness_range: f32,
    pub true_peak: f32,
    pub dynamic_complexity: f32,

    // Rhythm
    pub bpm: f32,
    pub beat_confidence: f32,
    pub danceability: f32,

    // Tonal
    pub key: String,
    pub scale: String,
    pub tuning_frequency: f32,

    // Spectral
    pub spectral_centroid: f32,
    pub spectral_rolloff: f32,
    pub spectral_flux: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub mix: AudioMetrics,
    pub reference: AudioMetrics,
}

/// Completed payload of the primary job.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub metrics: ComparisonResult,
    pub analysis_text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data")]
pub enum AnalysisEvent {
    Queued,
    Processing(String),
    Completed(ComparisonResult, String),
    Failed(String),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StemMetrics {
    pub file_path: String,
    pub integrated_lufs: f32,
    pub spectral_centroid: f32,
    pub spectral_rolloff: f32,
}

/// Completed payload of the stem job: stem name to metrics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StemAnalysisResult {
    pub stems: BTreeMap<String, StemMetrics>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data")]
pub enum StemEvent {
    Queued,
    Separating { progress: u8, stage: String },
    Analyzing { stem: String },
    Completed(StemAnalysisResult),
    Failed(String),
}

/// Full mix-vs-reference comparison.
pub struct AnalysisJob;

impl JobKind for AnalysisJob {
    type Event = AnalysisEvent;
    type Payload = AnalysisResult;

    const NAME: &'static str = "analysis";
    const KEEPS_LOG: bool = true;

    fn stream_path(job_id: &JobId) -> String {
        format!("/api/jobs/{job_id}")
    }

    fn transition(event: AnalysisEvent) -> Transition<AnalysisResult> {
        match event {
            AnalysisEvent::Queued => Transition::Waiting,
            AnalysisEvent::Processing(stage) => Transition::Progress {
                stage,
                percent: None,
            },
            AnalysisEvent::Completed(metrics, analysis_text) => Transition::Complete(AnalysisResult {
                metrics,
                analysis_text,
            }),
            AnalysisEvent::Failed(reason) => Transition::Fail(reason),
        }
    }
}

/// Stem separation followed by per-stem analysis.
pub struct StemJob;

impl JobKind for StemJob {
    type Event = StemEvent;
    type Payload = StemAnalysisResult;

    const NAME: &'static str = "stems";
    const KEEPS_LOG: bool = false;

    fn stream_path(job_id: &JobId) -> String {
        format!("/api/stems/{job_id}")
    }

    fn transition(event: StemEvent) -> Transition<StemAnalysisResult> {
        match event {
            StemEvent::Queued => Transition::Waiting,
            StemEvent::Separating { progress, stage } => Transition::Progress {
                stage,
                percent: Some(progress),
            },
            StemEvent::Analyzing { stem } => Transition::Progress {
                stage: format!("Analyzing {stem}"),
                percent: None,
            },
            StemEvent::Completed(result) => Transition::Complete(result),
            StemEvent::Failed(reason) => Transition::Fail(reason),
        }
    }
}
