//! SigMF sidecar describing a retained segment.

use crate::power::PowerSummary;
use crate::prelude::CaptureConfiguration;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const SIGMF_VERSION: &str = "1.0.0";
/// Interleaved signed 8-bit I/Q, as written by `hackrf_transfer`.
pub const DATATYPE: &str = "ci8";
pub const SIGNAL_LABEL: &str = "SAR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigmfMetadata {
    pub global: GlobalInfo,
    pub captures: Vec<CaptureInfo>,
    pub annotations: Vec<AnnotationInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalInfo {
    #[serde(rename = "core:datatype")]
    pub datatype: String,
    #[serde(rename = "core:sample_rate")]
    pub sample_rate: u64,
    #[serde(rename = "core:hw")]
    pub hw: String,
    #[serde(rename = "core:author")]
    pub author: String,
    #[serde(rename = "core:version")]
    pub version: String,
    #[serde(rename = "core:description")]
    pub description: String,
    #[serde(rename = "core:recorder")]
    pub recorder: String,
    #[serde(rename = "antenna:type")]
    pub antenna_type: String,
    #[serde(rename = "hrf_sar:sdr")]
    pub sdr: String,
    #[serde(rename = "hrf_sar:sdr_sn", skip_serializing_if = "Option::is_none")]
    pub sdr_serial: Option<String>,
    #[serde(rename = "hrf_sar:lna")]
    pub lna: String,
    #[serde(rename = "hrf_sar:lna_pwr")]
    pub lna_power: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureInfo {
    #[serde(rename = "core:sample_start")]
    pub sample_start: u64,
    #[serde(rename = "core:frequency")]
    pub frequency: u64,
    #[serde(rename = "core:datetime")]
    pub datetime: String,
    #[serde(rename = "hrf_sar:if_gain_db")]
    pub if_gain_db: u32,
    #[serde(rename = "hrf_sar:bb_gain_db")]
    pub bb_gain_db: u32,
    #[serde(rename = "hrf_sar:sdr_rx_amp_enabled")]
    pub rx_amp_enabled: u8,
    #[serde(rename = "hrf_sar:recorder_command")]
    pub recorder_command: String,
    #[serde(rename = "hrf_sar:max_power_dbfs")]
    pub max_power_dbfs: f64,
    #[serde(rename = "hrf_sar:avg_power_dbfs")]
    pub avg_power_dbfs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationInfo {
    #[serde(rename = "core:sample_start")]
    pub sample_start: u64,
    #[serde(rename = "core:sample_count")]
    pub sample_count: u64,
    #[serde(rename = "core:freq_lower_edge")]
    pub freq_lower_edge: u64,
    #[serde(rename = "core:freq_upper_edge")]
    pub freq_upper_edge: u64,
    #[serde(rename = "core:label")]
    pub label: String,
}

impl SigmfMetadata {
    pub fn with_capture_time(mut self, at: DateTime<Utc>) -> Self {
        let stamp = at.to_rfc3339_opts(SecondsFormat::Micros, true);
        for capture in &mut self.captures {
            capture.datetime = stamp.clone();
        }
        self
    }

    pub fn with_power(mut self, summary: &PowerSummary) -> Self {
        for capture in &mut self.captures {
            capture.max_power_dbfs = summary.max_power_dbfs;
            capture.avg_power_dbfs = summary.average_power_dbfs;
        }
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Run-wide metadata built once; each segment receives a filled-in copy.
#[derive(Debug, Clone)]
pub struct MetadataTemplate {
    base: SigmfMetadata,
}

impl MetadataTemplate {
    pub fn new(config: &CaptureConfiguration, command_line: &str) -> Self {
        let hw = &config.hardware;
        let band = config.band();
        let base = SigmfMetadata {
            global: GlobalInfo {
                datatype: DATATYPE.into(),
                sample_rate: config.sample_rate_hz,
                hw: hw.hardware.clone(),
                author: hw.author.clone(),
                version: SIGMF_VERSION.into(),
                description: format!("SAR recorded using {}", config.program),
                recorder: config.program.clone(),
                antenna_type: hw.antenna_type.clone(),
                sdr: hw.sdr.clone(),
                sdr_serial: config.serial.clone(),
                lna: hw.lna.clone(),
                lna_power: hw.lna_power.clone(),
            },
            captures: vec![CaptureInfo {
                sample_start: 0,
                frequency: config.center_freq_hz(),
                datetime: String::new(),
                if_gain_db: config.if_gain_db,
                bb_gain_db: config.baseband_gain_db,
                rx_amp_enabled: u8::from(config.amp_enabled),
                recorder_command: command_line.to_string(),
                max_power_dbfs: 0.0,
                avg_power_dbfs: 0.0,
            }],
            annotations: vec![AnnotationInfo {
                sample_start: 0,
                sample_count: config.sample_count(),
                freq_lower_edge: band.lower_edge_hz,
                freq_upper_edge: band.upper_edge_hz,
                label: SIGNAL_LABEL.into(),
            }],
        };
        Self { base }
    }

    pub fn for_segment(&self, captured_at: DateTime<Utc>, summary: &PowerSummary) -> SigmfMetadata {
        self.base
            .clone()
            .with_capture_time(captured_at)
            .with_power(summary)
    }
}
