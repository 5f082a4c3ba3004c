use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::jobs::kinds::{AnalysisResult, StemAnalysisResult};
use crate::jobs::machine::JobProgress;
use crate::jobs::session::SessionObserver;

/// Terminal progress for a comparison: a spinner that echoes each stage of
/// the primary job and a percent bar for stem separation.
pub struct CliObserver {
    _multi: MultiProgress,
    analysis: Option<ProgressBar>,
    stems: Option<ProgressBar>,
    logged: usize,
}

impl CliObserver {
    pub fn new(with_analysis: bool, with_stems: bool) -> Self {
        let multi = MultiProgress::new();

        let analysis = with_analysis.then(|| {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(
                ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] analysis: {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.enable_steady_tick(Duration::from_millis(120));
            pb.set_message("connecting");
            pb
        });

        let stems = with_stems.then(|| {
            let pb = multi.add(ProgressBar::new(100));
            pb.set_style(
                ProgressStyle::with_template("  stems [{bar:40.cyan/blue}] {pos:>3}% {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );
            pb.set_message("connecting");
            pb
        });

        Self {
            _multi: multi,
            analysis,
            stems,
            logged: 0,
        }
    }

    /// Leaves unfinished bars on screen with their last message.
    pub fn abandon(&self) {
        for pb in self.analysis.iter().chain(self.stems.iter()) {
            if !pb.is_finished() {
                pb.abandon_with_message("gave up waiting");
            }
        }
    }
}

impl SessionObserver for CliObserver {
    fn on_analysis(&mut self, progress: &JobProgress<AnalysisResult>, log: &[String]) {
        let Some(pb) = &self.analysis else { return };
        // Echo only the log lines not printed yet.
        for line in &log[self.logged.min(log.len())..] {
            pb.println(format!("  > {line}"));
        }
        self.logged = log.len();

        match progress {
            JobProgress::Idle | JobProgress::Connecting => pb.set_message("queued"),
            JobProgress::Processing { stage, .. } => pb.set_message(stage.clone()),
            JobProgress::Completed(_) => pb.finish_with_message("done"),
            JobProgress::Failed(reason) => pb.abandon_with_message(format!("failed: {reason}")),
        }
    }

    fn on_stems(&mut self, progress: &JobProgress<StemAnalysisResult>) {
        let Some(pb) = &self.stems else { return };
        match progress {
            JobProgress::Idle | JobProgress::Connecting => pb.set_message("queued"),
            JobProgress::Processing { stage, percent } => {
                pb.set_position(u64::from(*percent));
                pb.set_message(stage.clone());
            }
            JobProgress::Completed(result) => {
                pb.set_position(100);
                pb.finish_with_message(format!("{} stems", result.stems.len()));
            }
            JobProgress::Failed(reason) => pb.abandon_with_message(format!("failed: {reason}")),
        }
    }
}
