//! Runs the capture tool to completion while folding its status stream into power statistics.
//!
//! The tool only guarantees its data file is flushed once its output is closed, so the
//! stream is drained before the exit status is read.

use crate::capture::command::CaptureCommand;
use crate::power::PowerAccumulator;
use crate::prelude::{CaptureConfiguration, CaptureError, CaptureOutcome, CaptureResult};
use crate::telemetry::TelemetryParser;
use log::{debug, info, trace, warn};
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

const WAIT_POLL: Duration = Duration::from_millis(50);

pub struct CaptureRunner {
    parser: TelemetryParser,
    banner_lines: usize,
    watchdog: Option<Duration>,
}

impl CaptureRunner {
    /// `banner_lines` leading lines are skipped before telemetry parsing starts.
    pub fn new(banner_lines: usize, watchdog: Option<Duration>) -> Self {
        Self {
            parser: TelemetryParser::new(),
            banner_lines,
            watchdog,
        }
    }

    pub fn from_config(config: &CaptureConfiguration) -> Self {
        Self::new(config.banner_lines, Some(config.watchdog()))
    }

    pub fn run(&self, command: &CaptureCommand, data_path: &Path) -> CaptureResult<CaptureOutcome> {
        info!("START: {} -r {}", command, data_path.display());
        let deadline = self
            .watchdog
            .and_then(|limit| Instant::now().checked_add(limit));
        let mut process = CaptureProcess::spawn(command, data_path)?;

        let mut accumulator = PowerAccumulator::new();
        let mut lines_seen = 0;
        let mut stream_error = None;
        let mut expired = false;

        loop {
            match process.next_event(deadline) {
                StreamEvent::Line(line) => {
                    lines_seen += 1;
                    if lines_seen <= self.banner_lines {
                        debug!("banner: {}", line);
                        continue;
                    }
                    match self.parser.parse(&line) {
                        Some(record) => {
                            debug!(
                                "power {:.1} dBfs after {:.3} s, {} overruns",
                                record.average_power_dbfs,
                                record.elapsed_seconds,
                                record.overrun_count
                            );
                            accumulator.observe(&record);
                        }
                        None => trace!("ignoring status line: {}", line),
                    }
                }
                StreamEvent::Failed(err) => {
                    warn!("status stream read failed: {}", err);
                    stream_error.get_or_insert(err);
                }
                StreamEvent::Closed => break,
                StreamEvent::TimedOut => {
                    expired = true;
                    break;
                }
            }
        }

        let status = if expired {
            process.kill()?;
            None
        } else {
            process.wait_until(deadline)?
        };
        if let Some(err) = stream_error {
            return Err(CaptureError::Stream(err));
        }

        let timed_out = match status {
            Some(_) => None,
            None => self.watchdog,
        };
        let outcome = CaptureOutcome {
            exit_code: status.and_then(|s| s.code()),
            timed_out,
            stats: accumulator.into_stats(),
            lines_seen,
        };

        if let Some(limit) = outcome.timed_out {
            warn!("{} killed after {:?} watchdog", command.program(), limit);
        } else if outcome.exit_code != Some(0) {
            warn!(
                "{} failed with result code: {:?}",
                command.program(),
                outcome.exit_code
            );
        } else if let Some(avg) = outcome.stats.average_power_dbfs() {
            info!(
                "max_power: {:.3} avg_power: {:.3} (dBFS)",
                outcome.stats.max_power_dbfs, avg
            );
        }

        Ok(outcome)
    }
}

enum StreamEvent {
    Line(String),
    Failed(io::Error),
    Closed,
    TimedOut,
}

/// Child process plus its merged stdout/stderr lines.
///
/// Dropping an unreaped process kills and reaps it.
struct CaptureProcess {
    child: Child,
    lines: Receiver<io::Result<String>>,
    reaped: bool,
}

impl CaptureProcess {
    fn spawn(command: &CaptureCommand, data_path: &Path) -> CaptureResult<Self> {
        let mut cmd = command.to_command(data_path);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(|source| CaptureError::Spawn {
            program: command.program().to_string(),
            source,
        })?;

        let (tx, lines) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, tx);
        }

        Ok(Self {
            child,
            lines,
            reaped: false,
        })
    }

    fn next_event(&self, deadline: Option<Instant>) -> StreamEvent {
        let received = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match self.lines.recv_timeout(remaining) {
                    Ok(received) => received,
                    Err(RecvTimeoutError::Timeout) => return StreamEvent::TimedOut,
                    Err(RecvTimeoutError::Disconnected) => return StreamEvent::Closed,
                }
            }
            None => match self.lines.recv() {
                Ok(received) => received,
                Err(_) => return StreamEvent::Closed,
            },
        };
        match received {
            Ok(line) => StreamEvent::Line(line),
            Err(err) => StreamEvent::Failed(err),
        }
    }

    /// Waits for exit; `None` means the deadline passed and the process was killed.
    fn wait_until(&mut self, deadline: Option<Instant>) -> CaptureResult<Option<ExitStatus>> {
        let Some(deadline) = deadline else {
            let status = self.child.wait().map_err(CaptureError::Stream)?;
            self.reaped = true;
            return Ok(Some(status));
        };
        loop {
            if let Some(status) = self.child.try_wait().map_err(CaptureError::Stream)? {
                self.reaped = true;
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                self.kill()?;
                return Ok(None);
            }
            thread::sleep(WAIT_POLL);
        }
    }

    fn kill(&mut self) -> CaptureResult<()> {
        // Fails only if the process already exited; the wait below reaps it either way.
        let _ = self.child.kill();
        self.child.wait().map_err(CaptureError::Stream)?;
        self.reaped = true;
        Ok(())
    }
}

impl Drop for CaptureProcess {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn forward_lines<R>(source: R, tx: Sender<io::Result<String>>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(source);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(&['\r', '\n'][..])
                        .to_string();
                    if tx.send(Ok(line)).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    let _ = tx.send(Err(err));
                    break;
                }
            }
        }
    });
}
