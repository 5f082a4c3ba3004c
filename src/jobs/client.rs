use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::kinds::JobId;
use super::machine::JobKind;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("cannot attach {path}: {source}")]
    Upload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Server(String),
    #[error("unexpected response: {0}")]
    Body(String),
}

/// Job identifiers handed out by the server. Either may be absent depending
/// on the endpoint (stem-only re-analysis issues no primary job).
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct JobTicket {
    #[serde(default)]
    pub job_id: Option<JobId>,
    #[serde(default)]
    pub stem_job_id: Option<JobId>,
}

/// A stored analysis for a mix version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub metrics: serde_json::Value,
    pub ai_report: String,
    pub created_at: String,
}

#[derive(Clone, Debug)]
pub struct Submission<'a> {
    pub mix: &'a Path,
    pub reference: &'a Path,
    pub project_id: Option<&'a str>,
    pub version_name: Option<&'a str>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StemRole {
    Mix,
    Reference,
}

impl fmt::Display for StemRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StemRole::Mix => "mix",
            StemRole::Reference => "reference",
        })
    }
}

pub struct ApiClient {
    base_url: String,
    http: reqwest::blocking::Client,
    /// Shared by the feed readers; its timeout is the per-read poll interval.
    stream_http: reqwest::blocking::Client,
}

impl ApiClient {
    /// `feed_poll` bounds how long a feed reader blocks on a quiet stream
    /// before checking whether it was closed.
    pub fn new(base_url: &str, feed_poll: Duration) -> Result<Self, ApiError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        let stream_http = super::stream::feed_client(feed_poll)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            stream_http,
        })
    }

    pub fn stream_client(&self) -> reqwest::blocking::Client {
        self.stream_http.clone()
    }

    /// Uploads a mix and a reference; the server starts both jobs.
    pub fn submit_analysis(&self, submission: &Submission<'_>) -> Result<JobTicket, ApiError> {
        let attach = |form: reqwest::blocking::multipart::Form, name: &'static str, path: &Path| {
            form.file(name, path).map_err(|source| ApiError::Upload {
                path: path.to_path_buf(),
                source,
            })
        };
        let mut form = reqwest::blocking::multipart::Form::new();
        form = attach(form, "mix", submission.mix)?;
        form = attach(form, "reference", submission.reference)?;
        if let Some(project_id) = submission.project_id {
            form = form.text("project_id", project_id.to_string());
        }
        if let Some(version_name) = submission.version_name {
            form = form.text("version_name", version_name.to_string());
        }

        log::info!(
            "Uploading {} and {}",
            submission.mix.display(),
            submission.reference.display()
        );
        let body = self
            .http
            .post(self.url("/api/analyze"))
            .multipart(form)
            .send()?
            .text()?;
        parse_response(&body)
    }

    /// Re-runs both jobs on the files stored for `version_id`.
    pub fn reanalyze(&self, version_id: &str) -> Result<JobTicket, ApiError> {
        self.post_empty(&format!("/api/versions/{version_id}/reanalyze"))
    }

    /// Re-runs only stem separation for `version_id`.
    pub fn reanalyze_stems(&self, version_id: &str) -> Result<JobTicket, ApiError> {
        self.post_empty(&format!("/api/versions/{version_id}/reanalyze-stems"))
    }

    /// Latest stored analysis, or `None` when the version has none.
    pub fn fetch_analysis(&self, version_id: &str) -> Result<Option<AnalysisRecord>, ApiError> {
        let body = self
            .http
            .get(self.url(&format!("/api/analyses/version/{version_id}")))
            .send()?
            .text()?;
        parse_response(&body)
    }

    pub fn stream_url<K: JobKind>(&self, job_id: &JobId) -> String {
        self.url(&K::stream_path(job_id))
    }

    /// Where the server publishes a separated stem.
    pub fn stem_audio_url(&self, stem_job_id: &JobId, role: StemRole, stem: &str) -> String {
        self.url(&format!("/uploads/stems/{stem_job_id}/{role}/{stem}.wav"))
    }

    fn post_empty(&self, path: &str) -> Result<JobTicket, ApiError> {
        let body = self.http.post(self.url(path)).send()?.text()?;
        parse_response(&body)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// The server reports failures as `{"error": ".."}` with a success status,
/// so the body is checked before it is decoded.
fn parse_response<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ApiError::Body(e.to_string()))?;
    if let Some(message) = value.get("error").and_then(|e| e.as_str()) {
        return Err(ApiError::Server(message.to_string()));
    }
    serde_json::from_value(value).map_err(|e| ApiError::Body(e.to_string()))
}
