//! Turns per-channel exports from an acquisition system into aligned
//! multi-channel recordings and probe channel maps for spike sorting.
//!
//! Each exported channel is a stream of timestamps and values. Streams are cut
//! into gap-free epochs, epochs are merged across channels into recordings,
//! and the acquisition ports are mapped onto probe sites with geometry.

pub mod aligner;
pub mod catalog;
pub mod chunker;
pub mod config;
pub mod probe;
pub mod reader;
pub mod types;
pub mod writer;

use std::path::Path;

// Re-export types
pub use config::{AlignmentPolicy, ConversionConfig};
pub use probe::{ChannelGroup, ChannelGroups, ProbeLayout, SiteTable};
pub use reader::{ExportDirectory, MemoryContainer, SourceContainer};
pub use types::*;

/// Loads the export at `path` and returns its recordings.
///
/// # Examples
///
/// ```no_run
/// use smr_export::{load, ConversionConfig};
///
/// let chans = vec!["Port1".to_string(), "Port2".to_string()];
/// let result = load("path/to/export", &chans, &ConversionConfig::default());
/// match result {
///     Ok(recordings) => println!("{} recordings", recordings.len()),
///     Err(e) => println!("Error loading export: {}", e),
/// }
/// ```
pub fn load<P: AsRef<Path>>(
    path: P,
    chans: &[String],
    config: &ConversionConfig,
) -> Result<Vec<AlignedRecording>> {
    reader::load_export(path, chans, config)
}
