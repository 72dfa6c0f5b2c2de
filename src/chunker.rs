//! Splits a channel into gap-free epochs.
//!
//! Boundaries come from the timestamps alone: whenever two consecutive samples
//! are further apart than the continuity threshold, a new epoch starts. Values
//! are cut along the same boundaries.

use crate::config::ConversionConfig;
use crate::types::*;

/// A borrowed view of one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochSlice<'a> {
    pub times: &'a [f64],
    pub values: &'a [f64],
}

impl<'a> EpochSlice<'a> {
    pub fn start(&self) -> f64 {
        self.times[0]
    }

    pub fn end(&self) -> f64 {
        self.times[self.times.len() - 1]
    }

    pub fn duration(&self) -> f64 {
        self.end() - self.start()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Copies the slice into an owned epoch.
    pub fn to_epoch(&self, sample_rate: f64) -> Epoch {
        Epoch {
            times: self.times.to_vec(),
            values: self.values.to_vec(),
            sample_rate,
        }
    }
}

/// Lazy iterator over the epochs of one channel.
///
/// Cloning restarts from the current position, so a fresh clone of a freshly
/// built `Chunks` walks the whole channel again.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    times: &'a [f64],
    values: &'a [f64],
    threshold: f64,
    pos: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = EpochSlice<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.times.len() {
            return None;
        }

        let start = self.pos;
        let mut end = start + 1;
        while end < self.times.len() && self.times[end] - self.times[end - 1] <= self.threshold {
            end += 1;
        }
        self.pos = end;

        Some(EpochSlice {
            times: &self.times[start..end],
            values: &self.values[start..end],
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.times.len() - self.pos;
        ((remaining > 0) as usize, Some(remaining))
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}

/// Chunks `times`/`values` into epochs separated by gaps above `threshold`.
///
/// An empty channel yields no epochs. Mismatched lengths are rejected before
/// any epoch is produced.
///
/// # Examples
///
/// ```
/// use smr_export::chunker::chunkit;
///
/// let times = [0.0, 1.0, 2.0, 10.0, 11.0];
/// let values = [5.0, 6.0, 7.0, 8.0, 9.0];
/// let epochs: Vec<_> = chunkit("ch", &times, &values, 1.5).unwrap().collect();
/// assert_eq!(epochs.len(), 2);
/// assert_eq!(epochs[1].values, &[8.0, 9.0]);
/// ```
pub fn chunkit<'a>(
    channel: &str,
    times: &'a [f64],
    values: &'a [f64],
    threshold: f64,
) -> Result<Chunks<'a>> {
    if times.len() != values.len() {
        return Err(ExportError::LengthMismatch {
            channel: channel.to_string(),
            times: times.len(),
            values: values.len(),
        });
    }
    if !threshold.is_finite() || threshold <= 0.0 {
        return Err(ExportError::InvalidInterval {
            channel: channel.to_string(),
            interval: threshold,
        });
    }

    Ok(Chunks {
        times,
        values,
        threshold,
        pos: 0,
    })
}

/// Chunks a stream using the threshold derived from the config.
pub fn chunk_stream<'a>(stream: &'a ChannelStream, config: &ConversionConfig) -> Result<Chunks<'a>> {
    let threshold = config.gap_threshold(stream.interval());
    chunkit(stream.label(), stream.times(), stream.values(), threshold)
}
