use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::audio::bands::Estimator;
use crate::config::DEFAULT_BASE_URL;

#[derive(Parser, Debug)]
#[command(name = "mixscope", about = "Compare a mix against a reference track")]
pub struct Cli {
    /// Config file (defaults to ./mixscope.toml or the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Analysis server base URL
    #[arg(long, global = true, default_value = DEFAULT_BASE_URL)]
    pub server: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Waveform overview of a file or URL
    Peaks {
        /// Audio file path or http(s) URL
        source: String,

        /// Number of bars
        #[arg(long, default_value_t = 200)]
        bars: usize,

        /// Terminal columns to draw
        #[arg(long, default_value_t = 100)]
        width: usize,
    },

    /// Average spectrum and frequency metrics of a file or URL
    Spectrum {
        /// Audio file path or http(s) URL
        source: String,

        /// Per-bin magnitude estimator
        #[arg(long, value_enum, default_value_t = Estimator::Goertzel)]
        estimator: Estimator,

        /// Upper bound on analysed frames
        #[arg(long, default_value_t = 50)]
        max_frames: usize,
    },

    /// Upload a mix and a reference and follow the analysis
    Compare {
        mix: PathBuf,
        reference: PathBuf,

        /// Project to file the version under
        #[arg(long)]
        project: Option<String>,

        /// Version label
        #[arg(long)]
        version_name: Option<String>,

        /// Skip following stem separation
        #[arg(long)]
        no_stems: bool,
    },

    /// Re-run the analysis of a stored version
    Reanalyze {
        version_id: String,

        /// Only re-run stem separation
        #[arg(long)]
        stems_only: bool,
    },

    /// Print the stored analysis of a version
    Show {
        version_id: String,

        /// Print the raw record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Simulated playback with live spectrum and stereo metering
    Monitor {
        file: PathBuf,

        /// Stop after this many seconds of audio
        #[arg(long)]
        seconds: Option<f32>,

        /// Start position in seconds
        #[arg(long, default_value_t = 0.0)]
        start: f32,

        /// Frames per second
        #[arg(long, default_value_t = 60)]
        fps: u32,

        /// Run frames back to back instead of at wall-clock pace
        #[arg(long)]
        no_realtime: bool,
    },
}
