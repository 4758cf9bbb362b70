use crate::prelude::CaptureConfiguration;
use std::fmt;
use std::path::Path;
use std::process::Command;

/// Invocation of the capture tool, minus the per-segment output path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureCommand {
    program: String,
    args: Vec<String>,
}

impl CaptureCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `hackrf_transfer` options for the configured run; `-B` turns on power reporting.
    pub fn hackrf_transfer(config: &CaptureConfiguration) -> Self {
        let mut args = Vec::new();
        if let Some(serial) = &config.serial {
            args.push("-d".to_string());
            args.push(serial.clone());
        }
        let options = [
            ("-f", config.center_freq_hz().to_string()),
            ("-a", u8::from(config.amp_enabled).to_string()),
            ("-l", config.if_gain_db.to_string()),
            ("-g", config.baseband_gain_db.to_string()),
            ("-b", config.filter_bandwidth_hz().to_string()),
            ("-s", config.sample_rate_hz.to_string()),
            ("-n", config.sample_count().to_string()),
        ];
        for (flag, value) in options {
            args.push(flag.to_string());
            args.push(value);
        }
        args.push("-B".to_string());

        Self::new(config.program.clone(), args)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Process ready to record into `data_path`.
    pub fn to_command(&self, data_path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg("-r").arg(data_path);
        cmd
    }
}

impl fmt::Display for CaptureCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}
