use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::Array2;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::aligner::{align_positional, align_temporal};
use crate::chunker::chunk_stream;
use crate::config::{AlignmentPolicy, ConversionConfig};
use crate::types::*;

// File names inside each channel directory of an export
const TIMES_FILE: &str = "times";
const VALUES_FILE: &str = "values";
const INTERVAL_FILE: &str = "interval";

const READ_BUFFER_SIZE: usize = 65536;

/// A channel-keyed source of raw streams, such as one exported file.
pub trait SourceContainer {
    /// Identifier stamped on every recording read from this container.
    fn origin(&self) -> &str;

    /// Reads the stream stored under `label`.
    fn read_channel(&mut self, label: &str) -> Result<ChannelStream>;
}

/// Streams held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryContainer {
    origin: String,
    channels: HashMap<String, ChannelStream>,
}

impl MemoryContainer {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            channels: HashMap::new(),
        }
    }

    pub fn insert(&mut self, stream: ChannelStream) {
        self.channels.insert(stream.label().to_string(), stream);
    }
}

impl SourceContainer for MemoryContainer {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn read_channel(&mut self, label: &str) -> Result<ChannelStream> {
        self.channels
            .get(label)
            .cloned()
            .ok_or_else(|| ExportError::ChannelNotFound {
                channel: label.to_string(),
                origin: self.origin.clone(),
            })
    }
}

/// An export on disk: one directory per channel, each holding `times`,
/// `values` and `interval` as little-endian `f64` arrays.
#[derive(Debug, Clone)]
pub struct ExportDirectory {
    root: PathBuf,
    origin: String,
}

impl ExportDirectory {
    /// Opens an export rooted at `root`.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(ExportError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not an export directory", root.display()),
            )));
        }
        Ok(Self {
            origin: root.display().to_string(),
            root,
        })
    }

    /// Writes `stream` into the export rooted at `root`.
    pub fn write_channel(root: &Path, stream: &ChannelStream) -> Result<()> {
        let dir = root.join(stream.label());
        fs::create_dir_all(&dir)?;
        write_f64_array(&dir.join(TIMES_FILE), stream.times())?;
        write_f64_array(&dir.join(VALUES_FILE), stream.values())?;
        write_f64_array(&dir.join(INTERVAL_FILE), &[stream.interval()])?;
        Ok(())
    }
}

impl SourceContainer for ExportDirectory {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn read_channel(&mut self, label: &str) -> Result<ChannelStream> {
        let dir = self.root.join(label);
        if !dir.is_dir() {
            return Err(ExportError::ChannelNotFound {
                channel: label.to_string(),
                origin: self.origin.clone(),
            });
        }

        let times = read_f64_array(&dir.join(TIMES_FILE))?;
        let values = read_f64_array(&dir.join(VALUES_FILE))?;
        let interval = read_f64_array(&dir.join(INTERVAL_FILE))?
            .first()
            .copied()
            .unwrap_or(f64::NAN);

        ChannelStream::new(label, times, values, interval)
    }
}

fn read_f64_array(path: &Path) -> Result<Vec<f64>> {
    let file = File::open(path)?;
    let n_bytes = file.metadata()?.len() as usize;
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

    let mut values = vec![0.0; n_bytes / 8];
    reader.read_f64_into::<LittleEndian>(&mut values)?;
    Ok(values)
}

fn write_f64_array(path: &Path, values: &[f64]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for &v in values {
        writer.write_f64::<LittleEndian>(v)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a dataset written by [`crate::writer::save_recording`].
pub fn read_dataset<P: AsRef<Path>>(path: P) -> Result<Array2<f64>> {
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, File::open(path.as_ref())?);
    let rows = reader.read_u64::<LittleEndian>()? as usize;
    let cols = reader.read_u64::<LittleEndian>()? as usize;

    let mut values = vec![0.0; rows * cols];
    reader.read_f64_into::<LittleEndian>(&mut values)?;

    let mut trailing = Vec::new();
    reader.read_to_end(&mut trailing)?;
    if !trailing.is_empty() {
        return Err(ExportError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{} bytes past the end of the dataset", trailing.len()),
        )));
    }

    Array2::from_shape_vec((rows, cols), values).map_err(|e| {
        ExportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}

/// Reads, chunks and aligns `chans` from `container`.
///
/// Channels are processed in the order given. Under positional alignment a
/// recording missing some channels is tagged [`Alignment::Partial`] rather
/// than rejected, unless the policy is strict.
pub fn read_recordings<C: SourceContainer + ?Sized>(
    container: &mut C,
    chans: &[String],
    config: &ConversionConfig,
) -> Result<Vec<AlignedRecording>> {
    let mut chunked = Vec::with_capacity(chans.len());
    for ch in chans {
        let stream = container.read_channel(ch)?;
        let fs = stream.sample_rate();
        let epochs: Vec<Epoch> = chunk_stream(&stream, config)?
            .map(|e| e.to_epoch(fs))
            .collect();
        log::debug!("{}: {} samples in {} epochs", ch, stream.len(), epochs.len());
        if epochs.is_empty() {
            log::warn!("Channel {} is empty and contributes to no recording", ch);
        }
        chunked.push((ch.clone(), epochs));
    }

    match config.alignment {
        AlignmentPolicy::Positional { strict } => {
            let recordings = align_positional(chunked, strict)?;
            Ok(recordings
                .into_iter()
                .map(|recording| {
                    let missing: Vec<String> = chans
                        .iter()
                        .filter(|ch| !recording.contains(ch))
                        .cloned()
                        .collect();
                    let alignment = if missing.is_empty() {
                        Alignment::Aligned
                    } else {
                        Alignment::Partial { missing }
                    };
                    AlignedRecording {
                        recording,
                        alignment,
                    }
                })
                .collect())
        }
        AlignmentPolicy::Temporal { tolerance_seconds } => {
            Ok(align_temporal(chunked, tolerance_seconds))
        }
    }
}

/// Reads recordings from one container and stamps them with its origin.
pub fn load_recordings<C: SourceContainer + ?Sized>(
    container: &mut C,
    chans: &[String],
    config: &ConversionConfig,
) -> Result<Vec<AlignedRecording>> {
    let mut recordings = read_recordings(container, chans, config)?;
    for r in &mut recordings {
        r.recording.file_origin = Some(container.origin().to_string());
    }
    Ok(recordings)
}

/// Opens the export at `path`, reads all of `chans` and releases it.
pub fn load_export<P: AsRef<Path>>(
    path: P,
    chans: &[String],
    config: &ConversionConfig,
) -> Result<Vec<AlignedRecording>> {
    let tic = Instant::now();
    log::info!("Loading {}", path.as_ref().display());

    let recordings = {
        let mut export = ExportDirectory::open(path.as_ref())?;
        load_recordings(&mut export, chans, config)?
    };

    log::info!(
        "Done! {} recordings in {:.1} seconds",
        recordings.len(),
        tic.elapsed().as_secs_f64()
    );
    Ok(recordings)
}
