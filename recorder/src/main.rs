use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use sarcore::prelude::CaptureConfiguration;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::RecorderConfig;
use workflow::runner::Recorder;

mod workflow;

/// Conventional status for a run ended by SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Continuously record SAR data with hackrf_transfer",
    after_help = "Ctrl+C stops after the current segment is kept or discarded; press it again to abort at once."
)]
struct Args {
    /// Duration to capture, in seconds
    #[arg(long, short = 'd', default_value_t = 15)]
    duration: u64,
    /// Specific HackRF serial number to use
    #[arg(long)]
    serial_num: Option<String>,
    /// Center frequency to record, in MHz
    #[arg(long, short = 'f', default_value_t = 5405.5)]
    center_freq_mhz: f64,
    /// Directory path to place output files
    #[arg(long, default_value = "sar-recordings")]
    out_path: PathBuf,
    /// Directory path to place temporary files (e.g. a ramdisk)
    #[arg(long)]
    tmp_path: Option<PathBuf>,
    /// In continuous mode, the minimum recorded peak power to keep
    #[arg(long, default_value_t = -29.0, allow_negative_numbers = true)]
    squelch_dbfs: f64,
    /// Minimum peak dBFS above average for us to keep a recording
    #[arg(long, default_value_t = 1.1)]
    delta_dbfs: f64,
    /// Capture one segment, keep it, and exit
    #[arg(long, default_value_t = false)]
    single_shot: bool,
    /// Stop after this many continuous segments
    #[arg(long)]
    max_segments: Option<usize>,
    /// Seconds past the capture duration before a stuck capture is killed
    #[arg(long, default_value_t = 30)]
    watchdog_grace_secs: u64,
    /// Capture tool to run
    #[arg(long, default_value = "hackrf_transfer")]
    program: String,
    /// Load the recorder config from YAML instead of flags
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn capture_config(&self) -> CaptureConfiguration {
        CaptureConfiguration {
            center_freq_mhz: self.center_freq_mhz,
            duration_secs: self.duration,
            serial: self.serial_num.clone(),
            squelch_dbfs: self.squelch_dbfs,
            min_peak_gap_dbfs: self.delta_dbfs,
            output_dir: self.out_path.clone(),
            temp_dir: self.tmp_path.clone().unwrap_or_else(|| self.out_path.clone()),
            program: self.program.clone(),
            watchdog_grace_secs: self.watchdog_grace_secs,
            ..Default::default()
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = if let Some(path) = &args.config {
        RecorderConfig::load(path)?
    } else {
        RecorderConfig::from_args(args.capture_config(), args.single_shot, args.max_segments)
    };
    config.validate()?;

    let capture = &config.capture;
    println!(
        "Ctr Freq: {} MHz | BW : {} MHz | duration: {} s",
        capture.center_freq_mhz,
        capture.sample_rate_hz as f64 / 1e6,
        capture.duration_secs
    );
    if !config.single_shot {
        println!(
            "Squelch: {} dbFS | Peak Delta : {} dbFS",
            capture.squelch_dbfs, capture.min_peak_gap_dbfs
        );
    }

    let stop = Arc::new(AtomicBool::new(false));
    if !config.single_shot {
        watch_for_interrupt(stop.clone())?;
    }

    let recorder = Recorder::new(config);
    let summary = recorder.execute(&stop)?;
    println!("Recording finished -> {}", summary);

    Ok(())
}

/// What one Ctrl+C asks for, given whether a stop was already requested.
#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    /// Finish the current segment, then end the run.
    Graceful,
    /// A stop was already pending; give up on the current segment.
    Abort,
}

fn on_interrupt(stop: &AtomicBool) -> Interrupt {
    if stop.swap(true, Ordering::SeqCst) {
        Interrupt::Abort
    } else {
        Interrupt::Graceful
    }
}

/// Raises `stop` on the first Ctrl+C so the current segment finishes; a second Ctrl+C exits.
fn watch_for_interrupt(stop: Arc<AtomicBool>) -> anyhow::Result<()> {
    let runtime = TokioBuilder::new_current_thread()
        .enable_all()
        .build()
        .context("creating runtime for signal handling")?;
    thread::spawn(move || {
        runtime.block_on(async {
            while signal::ctrl_c().await.is_ok() {
                match on_interrupt(&stop) {
                    Interrupt::Graceful => {
                        info!("Ctrl+C received, stopping after the current segment (again to abort)")
                    }
                    Interrupt::Abort => {
                        warn!("second Ctrl+C, aborting the current segment");
                        process::exit(INTERRUPTED_EXIT_CODE);
                    }
                }
            }
        });
    });
    Ok(())
}
