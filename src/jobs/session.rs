use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use super::client::ApiClient;
use super::kinds::{
    AnalysisEvent, AnalysisJob, AnalysisResult, JobId, StemAnalysisResult, StemEvent, StemJob,
};
use super::machine::{Applied, JobKind, JobMachine, JobProgress};
use super::stream::{self, StreamMessage, StreamOptions};

/// Everything the feed readers can deliver, tagged with the slot and the id
/// of the job whose feed produced it.
#[derive(Debug)]
pub enum SessionEvent {
    Analysis(JobId, StreamMessage<AnalysisEvent>),
    Stems(JobId, StreamMessage<StemEvent>),
}

/// Observer for progress changes. Implement this for UI, logging, etc.
pub trait SessionObserver {
    fn on_analysis(&mut self, _progress: &JobProgress<AnalysisResult>, _log: &[String]) {}
    fn on_stems(&mut self, _progress: &JobProgress<StemAnalysisResult>) {}
}

pub struct NoOpObserver;

impl SessionObserver for NoOpObserver {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Every job reached a terminal state.
    Finished,
    /// No status event arrived for the idle timeout; jobs were left as they were.
    GaveUp,
}

pub struct ComparisonSession {
    analysis: Option<JobMachine<AnalysisJob>>,
    stems: Option<JobMachine<StemJob>>,
    tx: Sender<SessionEvent>,
    rx: Receiver<SessionEvent>,
    idle_timeout: Duration,
}

impl ComparisonSession {
    pub fn new(idle_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            analysis: None,
            stems: None,
            tx,
            rx,
            idle_timeout,
        }
    }

    /// Installs the primary job, closing whatever job held the slot before.
    pub fn set_analysis(&mut self, machine: JobMachine<AnalysisJob>) {
        if let Some(mut old) = self.analysis.replace(machine) {
            old.close();
        }
    }

    /// Installs the stem job, closing whatever job held the slot before.
    pub fn set_stems(&mut self, machine: JobMachine<StemJob>) {
        if let Some(mut old) = self.stems.replace(machine) {
            old.close();
        }
    }

    pub fn analysis(&self) -> Option<&JobMachine<AnalysisJob>> {
        self.analysis.as_ref()
    }

    pub fn stems(&self) -> Option<&JobMachine<StemJob>> {
        self.stems.as_ref()
    }

    /// Opens one feed per installed job.
    pub fn connect(&mut self, client: &ApiClient, options: &StreamOptions) -> Result<()> {
        if let Some(machine) = self.analysis.as_mut() {
            let id = machine.job_id();
            let handle = stream::open::<AnalysisJob, _, _>(
                client.stream_client(),
                client.stream_url::<AnalysisJob>(&id),
                options.clone(),
                self.tx.clone(),
                move |message| SessionEvent::Analysis(id.clone(), message),
            )
            .context("Failed to start analysis feed")?;
            machine.attach(Box::new(handle));
        }
        if let Some(machine) = self.stems.as_mut() {
            let id = machine.job_id();
            let handle = stream::open::<StemJob, _, _>(
                client.stream_client(),
                client.stream_url::<StemJob>(&id),
                options.clone(),
                self.tx.clone(),
                move |message| SessionEvent::Stems(id.clone(), message),
            )
            .context("Failed to start stem feed")?;
            machine.attach(Box::new(handle));
        }
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.analysis.as_ref().map_or(true, |m| m.is_terminal())
            && self.stems.as_ref().map_or(true, |m| m.is_terminal())
    }

    /// Routes one delivered message to the machine currently in its slot.
    /// Messages from a job that no longer holds the slot are dropped.
    /// Returns true when a status event reached a current job.
    pub fn handle(&mut self, event: SessionEvent, observer: &mut impl SessionObserver) -> bool {
        match event {
            SessionEvent::Analysis(id, message) => {
                let Some(machine) = self.analysis.as_mut().filter(|m| m.job_id() == id) else {
                    log::debug!("[analysis] dropping message from replaced job {id}");
                    return false;
                };
                let status = matches!(message, StreamMessage::Event(_));
                if deliver(machine, message) != Applied::Ignored {
                    observer.on_analysis(&machine.progress(), machine.log());
                }
                status
            }
            SessionEvent::Stems(id, message) => {
                let Some(machine) = self.stems.as_mut().filter(|m| m.job_id() == id) else {
                    log::debug!("[stems] dropping message from replaced job {id}");
                    return false;
                };
                let status = matches!(message, StreamMessage::Event(_));
                if deliver(machine, message) != Applied::Ignored {
                    observer.on_stems(&machine.progress());
                }
                status
            }
        }
    }

    /// Pumps messages until every job is terminal or no status event arrives
    /// for the idle timeout. Transport errors do not extend the wait. Giving
    /// up tears the feeds down but leaves the machines at their last known
    /// state.
    pub fn run(&mut self, observer: &mut impl SessionObserver) -> Outcome {
        let mut deadline = Instant::now() + self.idle_timeout;
        while !self.is_finished() {
            let wait = deadline.saturating_duration_since(Instant::now());
            if wait.is_zero() {
                return self.give_up();
            }
            match self.rx.recv_timeout(wait) {
                Ok(event) => {
                    if self.handle(event, observer) {
                        deadline = Instant::now() + self.idle_timeout;
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return self.give_up();
                }
            }
        }
        self.teardown();
        Outcome::Finished
    }

    fn give_up(&mut self) -> Outcome {
        log::warn!(
            "No job status for {}s; giving up",
            self.idle_timeout.as_secs()
        );
        self.teardown();
        Outcome::GaveUp
    }

    /// Closes every feed. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if let Some(m) = self.analysis.as_mut() {
            m.close();
        }
        if let Some(m) = self.stems.as_mut() {
            m.close();
        }
    }
}

impl Drop for ComparisonSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn deliver<K: JobKind>(machine: &mut JobMachine<K>, message: StreamMessage<K::Event>) -> Applied {
    match message {
        StreamMessage::Event(event) => machine.apply(event),
        StreamMessage::TransportError(err) => {
            machine.transport_error(&err);
            Applied::Ignored
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::client::JobTicket;
    use crate::jobs::kinds::{AudioMetrics, ComparisonResult, JobId, StemMetrics};
    use crate::jobs::machine::tests::CountingConnection;
    use crate::jobs::stream::StreamError;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[derive(Default)]
    struct Recorder {
        stages: Vec<String>,
        stem_percents: Vec<u8>,
    }

    impl SessionObserver for Recorder {
        fn on_analysis(&mut self, progress: &JobProgress<AnalysisResult>, _log: &[String]) {
            if let JobProgress::Processing { stage, .. } = progress {
                self.stages.push(stage.clone());
            }
        }

        fn on_stems(&mut self, progress: &JobProgress<StemAnalysisResult>) {
            if let JobProgress::Processing { percent, .. } = progress {
                self.stem_percents.push(*percent);
            }
        }
    }

    /// Fresh machines for every id in the ticket.
    fn from_ticket(ticket: &JobTicket, idle_timeout: Duration) -> ComparisonSession {
        let mut session = ComparisonSession::new(idle_timeout);
        if let Some(id) = &ticket.job_id {
            session.set_analysis(JobMachine::new(id.clone()));
        }
        if let Some(id) = &ticket.stem_job_id {
            session.set_stems(JobMachine::new(id.clone()));
        }
        session
    }

    fn ticket() -> JobTicket {
        JobTicket {
            job_id: Some(JobId::from("J1")),
            stem_job_id: Some(JobId::from("S1")),
        }
    }

    fn stem_payload() -> StemAnalysisResult {
        let stems: BTreeMap<String, StemMetrics> = ["drums", "bass", "vocals", "other"]
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    StemMetrics {
                        file_path: format!("uploads/stems/S1/mix/{name}.wav"),
                        ..Default::default()
                    },
                )
            })
            .collect();
        StemAnalysisResult { stems }
    }

    #[test]
    fn both_jobs_complete_end_to_end() {
        let mut session = from_ticket(&ticket(), Duration::from_secs(5));
        let completions = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&completions);
        session.set_analysis(
            JobMachine::<AnalysisJob>::new("J1".into()).on_complete(move |r: &AnalysisResult| {
                sink.lock().unwrap().push(r.analysis_text.clone())
            }),
        );

        let metrics = ComparisonResult {
            mix: AudioMetrics {
                integrated_lufs: -9.5,
                ..Default::default()
            },
            reference: AudioMetrics {
                integrated_lufs: -8.1,
                ..Default::default()
            },
        };

        // Two feeds delivering concurrently from their own threads.
        let tx = session.tx.clone();
        let primary = {
            let metrics = metrics.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                for event in [
                    AnalysisEvent::Processing("Measuring loudness".into()),
                    AnalysisEvent::Processing("Running AI report".into()),
                    AnalysisEvent::Completed(metrics, "## Report...".into()),
                ] {
                    tx.send(SessionEvent::Analysis("J1".into(), StreamMessage::Event(event))).unwrap();
                }
            })
        };
        let stems = thread::spawn(move || {
            for event in [
                StemEvent::Separating {
                    progress: 40,
                    stage: "drums".into(),
                },
                StemEvent::Analyzing { stem: "vocals".into() },
                StemEvent::Completed(stem_payload()),
            ] {
                tx.send(SessionEvent::Stems("S1".into(), StreamMessage::Event(event))).unwrap();
            }
        });
        primary.join().unwrap();
        stems.join().unwrap();

        let mut recorder = Recorder::default();
        assert_eq!(session.run(&mut recorder), Outcome::Finished);

        let analysis = session.analysis().unwrap();
        assert_eq!(
            analysis.progress(),
            JobProgress::Completed(AnalysisResult {
                metrics,
                analysis_text: "## Report...".into(),
            })
        );
        assert_eq!(analysis.log(), &["Measuring loudness", "Running AI report"]);
        assert_eq!(*completions.lock().unwrap(), vec!["## Report...".to_string()]);

        match session.stems().unwrap().progress() {
            JobProgress::Completed(result) => {
                let names: Vec<&str> = result.stems.keys().map(String::as_str).collect();
                assert_eq!(names, vec!["bass", "drums", "other", "vocals"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(recorder.stages, vec!["Measuring loudness", "Running AI report"]);
        assert_eq!(recorder.stem_percents, vec![40, 40]);
    }

    #[test]
    fn transport_errors_hold_state_until_giving_up() {
        let mut session = from_ticket(
            &JobTicket {
                job_id: Some(JobId::from("J2")),
                stem_job_id: None,
            },
            Duration::from_millis(50),
        );
        let closes = Arc::new(AtomicUsize::new(0));
        let mut machine = JobMachine::<AnalysisJob>::new("J2".into());
        machine.attach(Box::new(CountingConnection(Arc::clone(&closes))));
        session.set_analysis(machine);

        let tx = session.tx.clone();
        tx.send(SessionEvent::Analysis(
            "J2".into(),
            StreamMessage::Event(AnalysisEvent::Processing("Measuring loudness".into())),
        ))
        .unwrap();
        tx.send(SessionEvent::Analysis(
            "J2".into(),
            StreamMessage::TransportError(StreamError::Ended),
        ))
        .unwrap();

        assert_eq!(session.run(&mut NoOpObserver), Outcome::GaveUp);
        assert_eq!(
            session.analysis().unwrap().progress(),
            JobProgress::Processing {
                stage: "Measuring loudness".into(),
                percent: 0
            }
        );
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        session.teardown();
        drop(session);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn replacing_a_job_closes_the_old_feed() {
        let mut session = ComparisonSession::new(Duration::from_secs(1));
        let closes = Arc::new(AtomicUsize::new(0));
        let mut old = JobMachine::<StemJob>::new("S1".into());
        old.attach(Box::new(CountingConnection(Arc::clone(&closes))));
        session.set_stems(old);

        session.set_stems(JobMachine::new("S2".into()));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(session.stems().unwrap().job_id(), JobId::from("S2"));
    }

    #[test]
    fn stem_only_ticket_finishes_without_primary_job() {
        let mut session = from_ticket(
            &JobTicket {
                job_id: None,
                stem_job_id: Some(JobId::from("S3")),
            },
            Duration::from_secs(5),
        );
        session
            .tx
            .send(SessionEvent::Stems(
                "S3".into(),
                StreamMessage::Event(StemEvent::Failed("Demucs crashed".into())),
            ))
            .unwrap();
        assert_eq!(session.run(&mut NoOpObserver), Outcome::Finished);
        assert!(session.analysis().is_none());
        assert_eq!(
            session.stems().unwrap().progress(),
            JobProgress::Failed("Demucs crashed".into())
        );
    }

    #[test]
    fn queued_messages_from_a_replaced_job_are_dropped() {
        let mut session = ComparisonSession::new(Duration::from_millis(200));
        session.set_analysis(JobMachine::new("J_OLD".into()));
        session
            .tx
            .send(SessionEvent::Analysis(
                "J_OLD".into(),
                StreamMessage::Event(AnalysisEvent::Completed(
                    ComparisonResult::default(),
                    "old report".into(),
                )),
            ))
            .unwrap();

        session.set_analysis(JobMachine::new("J_NEW".into()));
        session
            .tx
            .send(SessionEvent::Analysis(
                "J_NEW".into(),
                StreamMessage::Event(AnalysisEvent::Processing("Measuring loudness".into())),
            ))
            .unwrap();

        assert_eq!(session.run(&mut NoOpObserver), Outcome::GaveUp);
        let machine = session.analysis().unwrap();
        assert_eq!(machine.job_id(), JobId::from("J_NEW"));
        assert_eq!(
            machine.progress(),
            JobProgress::Processing {
                stage: "Measuring loudness".into(),
                percent: 0
            }
        );
    }

    #[test]
    fn transport_errors_do_not_postpone_giving_up() {
        let mut session = ComparisonSession::new(Duration::from_millis(200));
        session.set_analysis(JobMachine::new("J4".into()));

        // A feed that keeps failing to connect, much faster than the timeout.
        let tx = session.tx.clone();
        thread::spawn(move || {
            for _ in 0..100 {
                let message = SessionEvent::Analysis(
                    "J4".into(),
                    StreamMessage::TransportError(StreamError::Connect("refused".into())),
                );
                if tx.send(message).is_err() {
                    break;
                }
                thread::sleep(Duration::from_millis(20));
            }
        });

        let started = std::time::Instant::now();
        assert_eq!(session.run(&mut NoOpObserver), Outcome::GaveUp);
        assert!(started.elapsed() < Duration::from_secs(1), "{:?}", started.elapsed());
        assert_eq!(session.analysis().unwrap().progress(), JobProgress::Idle);
    }
}
