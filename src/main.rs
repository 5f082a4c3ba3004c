mod audio;
mod cli;
mod config;
mod jobs;
mod live;
mod progress;
mod render;

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use audio::bands::{spectrum_for_source, BandDecomposer, Estimator};
use audio::peaks::peaks_for_source;
use audio::session::VisualSession;
use audio::source::{AudioLoader, AudioSource};
use cli::{Cli, Command};
use config::Config;
use jobs::client::{ApiClient, JobTicket, StemRole, Submission};
use jobs::kinds::{AnalysisJob, AnalysisResult, ComparisonResult, JobId, StemAnalysisResult, StemJob};
use jobs::machine::{JobMachine, JobProgress};
use jobs::session::{ComparisonSession, Outcome};
use jobs::stream::StreamOptions;
use live::analyser::AnalyserOptions;
use live::frame_loop::{FrameLoop, LoopControl};
use live::monitor::LiveMonitor;
use live::playback::Playback;
use live::stereo::StereoAnalyzer;
use progress::CliObserver;
use render::terminal;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    let cfg = match config::discover(cli.config.as_deref()) {
        Some(path) => match config::load_config(&path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            None => {
                log::warn!("Failed to load config from {}", path.display());
                Config::default()
            }
        },
        None => Config::default(),
    };
    // Merge: config values apply only when CLI is at its default
    if cli.server == config::DEFAULT_BASE_URL {
        cli.server = cfg.server.base_url.clone();
    }

    match cli.command {
        Command::Peaks { source, mut bars, width } => {
            if bars == 200 { bars = cfg.analysis.peak_bars; }
            run_peaks(&source, bars, width)
        }
        Command::Spectrum { source, mut estimator, mut max_frames } => {
            if estimator == Estimator::Goertzel { estimator = cfg.analysis.estimator; }
            if max_frames == 50 { max_frames = cfg.analysis.max_frames; }
            run_spectrum(&source, &cfg, estimator, max_frames)
        }
        Command::Compare { mix, reference, project, version_name, no_stems } => {
            let client = ApiClient::new(&cli.server, Duration::from_millis(cfg.server.feed_poll_ms))?;
            let ticket = client
                .submit_analysis(&Submission {
                    mix: &mix,
                    reference: &reference,
                    project_id: project.as_deref(),
                    version_name: version_name.as_deref(),
                })
                .context("Failed to submit analysis")?;
            let ticket = if no_stems {
                JobTicket { stem_job_id: None, ..ticket }
            } else {
                ticket
            };
            follow(&client, &cfg, &ticket)
        }
        Command::Reanalyze { version_id, stems_only } => {
            let client = ApiClient::new(&cli.server, Duration::from_millis(cfg.server.feed_poll_ms))?;
            let ticket = if stems_only {
                client.reanalyze_stems(&version_id)
            } else {
                client.reanalyze(&version_id)
            }
            .with_context(|| format!("Failed to re-analyze version {version_id}"))?;
            follow(&client, &cfg, &ticket)
        }
        Command::Show { version_id, json } => {
            let client = ApiClient::new(&cli.server, Duration::from_millis(cfg.server.feed_poll_ms))?;
            run_show(&client, &version_id, json)
        }
        Command::Monitor { file, seconds, start, mut fps, no_realtime } => {
            if fps == 60 { fps = cfg.live.fps; }
            run_monitor(file, &cfg, seconds, start, fps, !no_realtime)
        }
    }
}

fn run_peaks(source: &str, bars: usize, width: usize) -> Result<()> {
    let loader = AudioLoader::new();
    let mut visuals = VisualSession::new();
    let ticket = visuals.select(AudioSource::parse(source));
    let peaks = peaks_for_source(&loader, ticket.source(), bars);
    visuals.apply_peaks(&ticket, peaks);

    if let Some(peaks) = visuals.peaks() {
        log::debug!("{} bars", peaks.bars().len());
        let tag = if peaks.is_placeholder() { " (unavailable)" } else { "" };
        println!("{}{}", ticket.source(), tag);
        println!("{}", terminal::waveform_line(peaks, width));
    }
    Ok(())
}

fn run_spectrum(source: &str, cfg: &Config, estimator: Estimator, max_frames: usize) -> Result<()> {
    let loader = AudioLoader::new();
    let decomposer = BandDecomposer::new(cfg.analysis.frame_size, estimator);
    log::debug!("Frame size {}", decomposer.frame_size());
    let mut visuals = VisualSession::new();
    let ticket = visuals.select(AudioSource::parse(source));
    let report = spectrum_for_source(&loader, &decomposer, ticket.source(), max_frames);
    visuals.apply_spectrum(&ticket, report);

    if let Some(report) = visuals.spectrum() {
        let tag = if report.placeholder { " (unavailable)" } else { "" };
        println!("{}{} [{:?}]", ticket.source(), tag, estimator);
        for row in terminal::spectrum_rows(&report.spectrum, report.spectrum.len(), 8) {
            println!("  {row}");
        }
        print!("{}", terminal::metrics_table(&report.metrics));
    }
    Ok(())
}

/// Follows every job in `ticket` to the end, then prints what came back.
fn follow(client: &ApiClient, cfg: &Config, ticket: &JobTicket) -> Result<()> {
    if ticket.job_id.is_none() && ticket.stem_job_id.is_none() {
        anyhow::bail!("Server returned no job to follow");
    }

    let mut session = ComparisonSession::new(Duration::from_secs(cfg.server.idle_timeout_secs));
    if let Some(id) = &ticket.job_id {
        log::info!("Analysis job {id}");
        session.set_analysis(
            JobMachine::<AnalysisJob>::new(id.clone())
                .on_complete(|r| log::info!("Report ready ({} chars)", r.analysis_text.len()))
                .on_failure(|reason| log::error!("Analysis failed: {reason}")),
        );
    }
    if let Some(id) = &ticket.stem_job_id {
        log::info!("Stem job {id}");
        session.set_stems(
            JobMachine::<StemJob>::new(id.clone())
                .on_complete(|r| log::info!("{} stems separated", r.stems.len()))
                .on_failure(|reason| log::error!("Stem separation failed: {reason}")),
        );
    }

    let options = StreamOptions {
        reconnect_delay: Duration::from_millis(cfg.server.reconnect_delay_ms),
    };
    session.connect(client, &options)?;

    let mut observer = CliObserver::new(ticket.job_id.is_some(), ticket.stem_job_id.is_some());
    if session.run(&mut observer) == Outcome::GaveUp {
        observer.abandon();
    }

    let mut failures = Vec::new();
    if let Some(machine) = session.analysis() {
        match machine.progress() {
            JobProgress::Completed(result) => print_analysis(&result),
            JobProgress::Failed(reason) => failures.push(format!("analysis: {reason}")),
            other => log::warn!("Analysis still {}", describe(&other)),
        }
    }
    if let Some(machine) = session.stems() {
        // Job id and payload come from one snapshot.
        let snapshot = machine.watch().get();
        match snapshot.progress {
            JobProgress::Completed(result) => {
                compare_stems(client, cfg, &snapshot.job_id, &result);
            }
            JobProgress::Failed(reason) => failures.push(format!("stems: {reason}")),
            other => log::warn!("Stem separation still {}", describe(&other)),
        }
    }

    if !failures.is_empty() {
        anyhow::bail!("Job failed ({})", failures.join("; "));
    }
    Ok(())
}

fn describe<P>(progress: &JobProgress<P>) -> String {
    match progress {
        JobProgress::Idle => "idle".into(),
        JobProgress::Connecting => "queued".into(),
        JobProgress::Processing { stage, percent } => format!("at '{stage}' ({percent}%)"),
        JobProgress::Completed(_) => "completed".into(),
        JobProgress::Failed(reason) => format!("failed: {reason}"),
    }
}

fn print_analysis(result: &AnalysisResult) {
    println!();
    print!(
        "{}",
        terminal::server_metrics_table(&result.metrics.mix, &result.metrics.reference)
    );
    println!();
    println!("{}", result.analysis_text);
}

/// Local view of one stem: waveform and spectrum, computed for one source.
fn stem_view(
    loader: &AudioLoader,
    decomposer: &BandDecomposer,
    source: AudioSource,
    bars: usize,
    max_frames: usize,
) -> VisualSession {
    let mut visuals = VisualSession::new();
    let ticket = visuals.select(source);
    let peaks = peaks_for_source(loader, ticket.source(), bars);
    let report = spectrum_for_source(loader, decomposer, ticket.source(), max_frames);
    visuals.apply_peaks(&ticket, peaks);
    visuals.apply_spectrum(&ticket, report);
    visuals
}

fn compare_stems(client: &ApiClient, cfg: &Config, stem_job_id: &JobId, result: &StemAnalysisResult) {
    let loader = AudioLoader::new();
    let decomposer = BandDecomposer::new(cfg.analysis.frame_size, cfg.analysis.estimator);
    let bars = cfg.analysis.peak_bars;
    let max_frames = cfg.analysis.max_frames;

    let names: Vec<&String> = result.stems.keys().collect();
    let views: Vec<(&String, VisualSession, VisualSession)> = names
        .par_iter()
        .map(|name| {
            let url = |role| AudioSource::Url(client.stem_audio_url(stem_job_id, role, name));
            let mix = stem_view(&loader, &decomposer, url(StemRole::Mix), bars, max_frames);
            let reference = stem_view(&loader, &decomposer, url(StemRole::Reference), bars, max_frames);
            (*name, mix, reference)
        })
        .collect();

    for (name, mix, reference) in &views {
        println!();
        println!("{}", terminal::stem_metrics_line(name, &result.stems[*name]));
        for (label, view) in [("mix", mix), ("ref", reference)] {
            if let Some(peaks) = view.peaks() {
                println!("  {label:<4} {}", terminal::waveform_line(peaks, 80));
            }
        }
        if let (Some(m), Some(r)) = (mix.spectrum(), reference.spectrum()) {
            if m.placeholder || r.placeholder {
                log::warn!("Stem {name} audio unavailable; spectra are placeholders");
            }
            print!("{}", terminal::comparison_table(&m.metrics, &r.metrics));
        }
    }
}

fn run_show(client: &ApiClient, version_id: &str, json: bool) -> Result<()> {
    let Some(record) = client
        .fetch_analysis(version_id)
        .with_context(|| format!("Failed to fetch analysis for version {version_id}"))?
    else {
        println!("No analysis stored for version {version_id}");
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!("Analysis {} ({})", record.id, record.created_at);
    match serde_json::from_value::<ComparisonResult>(record.metrics.clone()) {
        Ok(metrics) => print!("{}", terminal::server_metrics_table(&metrics.mix, &metrics.reference)),
        Err(e) => log::warn!("Stored metrics have an unexpected shape: {e}"),
    }
    println!();
    println!("{}", record.ai_report);
    Ok(())
}

fn run_monitor(
    file: PathBuf,
    cfg: &Config,
    seconds: Option<f32>,
    start: f32,
    fps: u32,
    realtime: bool,
) -> Result<()> {
    let source = AudioSource::File(file);
    let audio = AudioLoader::new()
        .load(&source)
        .with_context(|| format!("Failed to load {source}"))?;
    log::info!(
        "{}: {:.1}s, {} channel(s), {} Hz",
        source,
        audio.duration(),
        audio.channel_count(),
        audio.sample_rate
    );

    let options = AnalyserOptions {
        fft_size: cfg.live.fft_size,
        smoothing: cfg.live.smoothing,
        ..Default::default()
    };
    let mut playback = Playback::new(Arc::new(audio), options);
    playback.seek(start);
    playback.play();

    let stereo = StereoAnalyzer::new(cfg.live.stereo_throttle);
    let mut monitor = LiveMonitor::new(playback, fps, cfg.live.spectrum_points, stereo);
    let stop_at = seconds.map(|s| start + s.max(0.0));

    let frame_loop = FrameLoop::new(fps, realtime);
    let handle = frame_loop.handle();
    let redraw_every = u64::from((fps / 15).max(1));
    let mut stderr = std::io::stderr();

    let frames = frame_loop.run(|frame| {
        let control = monitor.tick(frame);
        let snap = monitor.snapshot();

        if frame % redraw_every == 0 || control == LoopControl::Stop {
            let line = format!(
                "\r{:>6.1}s {} {}",
                snap.position_secs,
                terminal::level_line(&snap.spectrum.normalized(), 32),
                terminal::correlation_meter(&snap.stereo, 21),
            );
            if stderr.write_all(line.as_bytes()).and_then(|_| stderr.flush()).is_err() {
                handle.cancel();
            }
        }

        if let Some(limit) = stop_at {
            if snap.position_secs >= limit {
                monitor.playback_mut().pause();
            }
        }
        control
    });
    eprintln!();

    let snap = monitor.snapshot();
    log::info!(
        "Ran {} frames ({} sampled), stopped at {:.1}s",
        frames,
        snap.sampled,
        snap.position_secs
    );
    println!("{}", terminal::correlation_meter(&snap.stereo, 41));
    for row in terminal::vectorscope(&snap.points, 21, cfg.live.vectorscope_points) {
        println!("  {row}");
    }
    print!("{}", terminal::metrics_table(&snap.metrics));
    Ok(())
}
