use regex::Regex;

/// Numeric tokens in one status line of the capture tool.
const TELEMETRY_FIELDS: usize = 7;

/// One status line reported by the capture tool while it records.
///
/// `8.1 MiB / 1.000 sec =  8.1 MiB/second, average power -2.0 dBfs, 14272 bytes free in buffer, 0 overruns, longest 0 bytes`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryRecord {
    pub throughput: f64,
    pub elapsed_seconds: f64,
    pub throughput_repeat: f64,
    pub average_power_dbfs: f64,
    pub buffer_free_bytes: u64,
    pub overrun_count: u64,
    pub longest_overrun_bytes: u64,
}

/// Extracts [`TelemetryRecord`]s from status text.
///
/// Each parser owns its compiled pattern, so separate runs never share state.
#[derive(Debug, Clone)]
pub struct TelemetryParser {
    numeric: Regex,
}

impl TelemetryParser {
    pub fn new() -> Self {
        let numeric =
            Regex::new(r"[-+]?(?:\d*\.\d+|\d+)").expect("numeric token regex should compile");
        Self { numeric }
    }

    /// Returns `None` for anything that is not a telemetry line, such as banner text.
    pub fn parse(&self, line: &str) -> Option<TelemetryRecord> {
        let tokens: Vec<&str> = self.numeric.find_iter(line).map(|m| m.as_str()).collect();
        if tokens.len() != TELEMETRY_FIELDS {
            return None;
        }

        Some(TelemetryRecord {
            throughput: tokens[0].parse().ok()?,
            elapsed_seconds: tokens[1].parse().ok()?,
            throughput_repeat: tokens[2].parse().ok()?,
            average_power_dbfs: tokens[3].parse().ok()?,
            buffer_free_bytes: counter(tokens[4]),
            overrun_count: counter(tokens[5]),
            longest_overrun_bytes: counter(tokens[6]),
        })
    }
}

/// Buffer and overrun figures are informational; odd values clamp instead of dropping the line.
fn counter(token: &str) -> u64 {
    token.parse::<f64>().map_or(0, |value| value as u64)
}

impl Default for TelemetryParser {
    fn default() -> Self {
        Self::new()
    }
}
