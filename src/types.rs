use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use thiserror::Error;

/// A single channel as exported by the acquisition software.
///
/// Holds the raw sample timestamps and values for one port, together with the
/// stored inter-sample interval. Streams are validated on construction and are
/// immutable afterwards.
#[derive(Debug, Clone)]
pub struct ChannelStream {
    label: String,
    times: Vec<f64>,
    values: Vec<f64>,
    interval: f64,
}

impl ChannelStream {
    /// Builds a stream, rejecting mismatched lengths and unusable intervals.
    ///
    /// # Examples
    ///
    /// ```
    /// use smr_export::ChannelStream;
    ///
    /// let stream = ChannelStream::new("Port1", vec![0.0, 0.5], vec![1.0, 2.0], 0.5).unwrap();
    /// assert_eq!(stream.sample_rate(), 2.0);
    /// ```
    pub fn new(
        label: impl Into<String>,
        times: Vec<f64>,
        values: Vec<f64>,
        interval: f64,
    ) -> Result<Self> {
        let label = label.into();
        if times.len() != values.len() {
            return Err(ExportError::LengthMismatch {
                channel: label,
                times: times.len(),
                values: values.len(),
            });
        }
        if !interval.is_finite() || interval <= 0.0 {
            return Err(ExportError::InvalidInterval {
                channel: label,
                interval,
            });
        }
        Ok(Self {
            label,
            times,
            values,
            interval,
        })
    }

    /// Port label this stream was read from
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Sample timestamps (seconds)
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Sample values
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Stored inter-sample interval (seconds)
    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Sampling rate in Hz, the reciprocal of the stored interval.
    pub fn sample_rate(&self) -> f64 {
        1.0 / self.interval
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// A contiguous, gap-free slice of one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Epoch {
    /// Sample timestamps inside the epoch (seconds)
    pub times: Vec<f64>,
    /// Sample values, same length as `times`
    pub values: Vec<f64>,
    /// Sampling rate of the channel the epoch came from (Hz)
    pub sample_rate: f64,
}

impl Epoch {
    /// Timestamp of the first sample.
    pub fn start(&self) -> f64 {
        self.times.first().copied().unwrap_or(0.0)
    }

    /// Timestamp of the last sample.
    pub fn end(&self) -> f64 {
        self.times.last().copied().unwrap_or(0.0)
    }

    /// Difference between the last and the first timestamp.
    pub fn duration(&self) -> f64 {
        self.end() - self.start()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// One aligned block of recording: the epoch each channel contributed at a
/// shared epoch index.
///
/// Channels that produced fewer epochs than their peers are simply absent from
/// the later indices, so `channels` may hold fewer keys than were requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiChannelRecording {
    /// Epoch per channel label
    pub channels: BTreeMap<String, Epoch>,
    /// Source file the epochs were read from
    pub file_origin: Option<String>,
}

impl MultiChannelRecording {
    /// Duration of the recording, taken from the longest contributing epoch.
    pub fn duration(&self) -> f64 {
        self.channels
            .values()
            .map(Epoch::duration)
            .fold(0.0, f64::max)
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    /// Lays the recording out as a samples x channels matrix in the given
    /// channel order.
    ///
    /// Every channel in `order` must be present and all of them must hold the
    /// same number of samples.
    pub fn to_data(&self, index: usize, order: &[String]) -> Result<Array2<f64>> {
        let mut columns = Vec::with_capacity(order.len());
        for ch in order {
            let epoch = self.channels.get(ch).ok_or_else(|| ExportError::RecordingShape {
                index,
                reason: format!("channel {} has no epoch at this index", ch),
            })?;
            columns.push(&epoch.values);
        }

        let n_samples = columns.first().map(|c| c.len()).unwrap_or(0);
        if let Some((ch, col)) = order
            .iter()
            .zip(&columns)
            .find(|(_, col)| col.len() != n_samples)
        {
            return Err(ExportError::RecordingShape {
                index,
                reason: format!(
                    "channel {} has {} samples, expected {}",
                    ch,
                    col.len(),
                    n_samples
                ),
            });
        }

        Ok(Array2::from_shape_fn((n_samples, order.len()), |(i, j)| {
            columns[j][i]
        }))
    }
}

/// How well the channels of one recording agree in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Alignment {
    /// Every channel contributed an epoch with matching bounds
    Aligned,
    /// Some channels contributed nothing to this window
    Partial { missing: Vec<String> },
    /// Some channels overlap this window but disagree on its bounds
    Mismatched { channels: Vec<String> },
}

/// A recording produced by temporal-window alignment, tagged with its status.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedRecording {
    pub recording: MultiChannelRecording,
    pub alignment: Alignment,
}

/// One line of the export catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    /// Identifier of the exported source file
    pub source: String,
    /// Length of the file (seconds)
    pub duration: f64,
    /// Size of the file (Mb)
    pub size_mb: f64,
    /// Number of recorded channels
    pub n_chan: usize,
}

/// Metadata written alongside an export as `<name>_info.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportInfo {
    pub name: String,
    pub source: String,
    pub duration: f64,
    pub mb: f64,
    pub n_chan: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
}

/// Error types for segmentation, probe mapping and export.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Malformed catalog line {line} ({reason}): {content}")]
    Parse {
        line: usize,
        content: String,
        reason: String,
    },

    #[error("Channel {channel} has {times} timestamps but {values} values")]
    LengthMismatch {
        channel: String,
        times: usize,
        values: usize,
    },

    #[error("Channel {channel} has unusable sample interval {interval}")]
    InvalidInterval { channel: String, interval: f64 },

    #[error("Channel {channel} not found in {origin}")]
    ChannelNotFound { channel: String, origin: String },

    #[error("Port {0} has no site in the port map")]
    UnknownPort(String),

    #[error("Port {0} listed more than once")]
    DuplicatePort(String),

    #[error("Port {port} maps to site {site}, outside 1..={max}")]
    SiteOutOfRange { port: String, site: usize, max: usize },

    #[error("Site {site} is wired to both {first} and {second}")]
    DuplicateSite {
        site: usize,
        first: String,
        second: String,
    },

    #[error("Site {site} is not part of probe {probe}")]
    SiteNotOnProbe { site: usize, probe: String },

    #[error("Unrecognized probe: {0}")]
    UnknownProbe(String),

    #[error("Channel {channel} produced {found} epochs, expected {expected}")]
    EpochCountMismatch {
        channel: String,
        expected: usize,
        found: usize,
    },

    #[error("Recording {index} cannot be written: {reason}")]
    RecordingShape { index: usize, reason: String },

    #[error("Template placeholder ${name} could not be resolved")]
    Template { name: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ExportError>;
