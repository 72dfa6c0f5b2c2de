//! Merges per-channel epoch sequences into multi-channel recordings.

use std::collections::BTreeSet;

use crate::types::*;

/// Groups epochs into recordings by the position they were produced in.
///
/// Channels are consumed in the given order. The i-th epoch of every channel
/// lands in recording i, which is created by the first channel to reach that
/// index. No timestamps are compared across channels.
///
/// A channel that produces fewer epochs than its peers is absent from the
/// trailing recordings. In non-strict mode that is only logged; with `strict`
/// set it is reported as [`ExportError::EpochCountMismatch`].
pub fn align_positional<I, S, E>(channels: I, strict: bool) -> Result<Vec<MultiChannelRecording>>
where
    I: IntoIterator<Item = (S, E)>,
    S: Into<String>,
    E: IntoIterator<Item = Epoch>,
{
    let mut recordings: Vec<MultiChannelRecording> = Vec::new();
    let mut counts: Vec<(String, usize)> = Vec::new();

    for (label, epochs) in channels {
        let label = label.into();
        let mut produced = 0;
        for (ii, epoch) in epochs.into_iter().enumerate() {
            match recordings.get_mut(ii) {
                Some(rec) => {
                    rec.channels.insert(label.clone(), epoch);
                }
                None => {
                    log::info!(" rec {} ({:.2} seconds long)", ii, epoch.duration());
                    let mut rec = MultiChannelRecording::default();
                    rec.channels.insert(label.clone(), epoch);
                    recordings.push(rec);
                }
            }
            produced = ii + 1;
        }
        log::info!("  {}", label);
        counts.push((label, produced));
    }

    let expected = recordings.len();
    for (label, found) in &counts {
        if *found == expected {
            continue;
        }
        if strict {
            return Err(ExportError::EpochCountMismatch {
                channel: label.clone(),
                expected,
                found: *found,
            });
        }
        log::warn!(
            "Channel {} produced {} of {} epochs; later recordings will not include it",
            label,
            found,
            expected
        );
    }

    Ok(recordings)
}

struct Window {
    start: f64,
    end: f64,
    recording: MultiChannelRecording,
    mismatched: Vec<String>,
}

impl Window {
    fn matches(&self, epoch: &Epoch, tolerance: f64) -> bool {
        (self.start - epoch.start()).abs() <= tolerance && (self.end - epoch.end()).abs() <= tolerance
    }

    fn overlaps(&self, epoch: &Epoch, tolerance: f64) -> bool {
        epoch.start() <= self.end + tolerance && epoch.end() >= self.start - tolerance
    }
}

/// Groups epochs into recordings by matching their time bounds.
///
/// An epoch joins an existing window when both its start and end fall within
/// `tolerance` of the window's. An epoch that only overlaps a window joins it
/// but marks that window as mismatched. Anything else opens a new window.
/// Recordings come back ordered by start time, each tagged with how
/// completely the channels agree on it.
pub fn align_temporal<I, S, E>(channels: I, tolerance: f64) -> Vec<AlignedRecording>
where
    I: IntoIterator<Item = (S, E)>,
    S: Into<String>,
    E: IntoIterator<Item = Epoch>,
{
    let mut windows: Vec<Window> = Vec::new();
    let mut labels: Vec<String> = Vec::new();

    for (label, epochs) in channels {
        let label = label.into();
        for epoch in epochs {
            let open = |w: &Window| !w.recording.contains(&label);
            let exact = windows
                .iter()
                .position(|w| open(w) && w.matches(&epoch, tolerance));
            let overlapping = windows
                .iter()
                .position(|w| open(w) && w.overlaps(&epoch, tolerance));

            if let Some(i) = exact {
                windows[i].recording.channels.insert(label.clone(), epoch);
            } else if let Some(i) = overlapping {
                let w = &mut windows[i];
                log::warn!(
                    "Channel {} epoch {:.3}-{:.3}s disagrees with window {:.3}-{:.3}s",
                    label,
                    epoch.start(),
                    epoch.end(),
                    w.start,
                    w.end
                );
                w.mismatched.push(label.clone());
                w.recording.channels.insert(label.clone(), epoch);
            } else {
                let mut recording = MultiChannelRecording::default();
                let (start, end) = (epoch.start(), epoch.end());
                recording.channels.insert(label.clone(), epoch);
                windows.push(Window {
                    start,
                    end,
                    recording,
                    mismatched: Vec::new(),
                });
            }
        }
        log::info!("  {}", label);
        labels.push(label);
    }

    windows.sort_by(|a, b| a.start.total_cmp(&b.start));

    windows
        .into_iter()
        .enumerate()
        .map(|(ii, w)| {
            let present: BTreeSet<&str> = w.recording.channels.keys().map(String::as_str).collect();
            let missing: Vec<String> = labels
                .iter()
                .filter(|l| !present.contains(l.as_str()))
                .cloned()
                .collect();

            let alignment = if !w.mismatched.is_empty() {
                Alignment::Mismatched {
                    channels: w.mismatched,
                }
            } else if !missing.is_empty() {
                Alignment::Partial { missing }
            } else {
                Alignment::Aligned
            };
            log::info!(
                " rec {} ({:.2} seconds long, {:?})",
                ii,
                w.end - w.start,
                alignment
            );

            AlignedRecording {
                recording: w.recording,
                alignment,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch(start: f64, duration: f64) -> Epoch {
        let n = (duration * 10.0).round() as usize + 1;
        let times: Vec<f64> = (0..n).map(|i| start + i as f64 * 0.1).collect();
        Epoch {
            values: vec![0.0; times.len()],
            times,
            sample_rate: 10.0,
        }
    }

    #[test]
    fn test_positional_matching_counts() {
        let channels = vec![
            ("X", vec![epoch(0.0, 10.0), epoch(20.0, 5.0)]),
            ("Y", vec![epoch(0.0, 10.0), epoch(20.0, 5.0)]),
        ];
        let recs = align_positional(channels, true).unwrap();

        assert_eq!(recs.len(), 2);
        for (rec, expected) in recs.iter().zip([10.0, 5.0]) {
            assert!(rec.contains("X") && rec.contains("Y"));
            assert!((rec.duration() - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_positional_short_channel_is_permissive() {
        let channels = vec![
            ("X", vec![epoch(0.0, 1.0), epoch(5.0, 1.0), epoch(9.0, 1.0)]),
            ("Y", vec![epoch(0.0, 1.0)]),
            ("Z", vec![]),
        ];
        let recs = align_positional(channels, false).unwrap();

        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0].channels.len(), 2);
        assert_eq!(recs[1].channels.len(), 1);
        assert!(recs.iter().all(|r| !r.contains("Z")));
    }

    #[test]
    fn test_positional_strict_reports_short_channel() {
        let channels = vec![
            ("X", vec![epoch(0.0, 1.0), epoch(5.0, 1.0)]),
            ("Y", vec![epoch(0.0, 1.0)]),
        ];
        let err = align_positional(channels, true).unwrap_err();
        match err {
            ExportError::EpochCountMismatch {
                channel,
                expected,
                found,
            } => {
                assert_eq!(channel, "Y");
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_temporal_aligned_and_partial() {
        let channels = vec![
            ("X", vec![epoch(0.0, 10.0), epoch(20.0, 5.0)]),
            // Y skipped the first window entirely
            ("Y", vec![epoch(20.0, 5.0)]),
        ];
        let recs = align_temporal(channels, 0.05);

        assert_eq!(recs.len(), 2);
        assert_eq!(
            recs[0].alignment,
            Alignment::Partial {
                missing: vec!["Y".to_string()]
            }
        );
        assert_eq!(recs[1].alignment, Alignment::Aligned);
        assert!(recs[1].recording.contains("Y"));
    }

    #[test]
    fn test_temporal_flags_mismatched_bounds() {
        let channels = vec![("X", vec![epoch(0.0, 10.0)]), ("Y", vec![epoch(2.0, 10.0)])];
        let recs = align_temporal(channels, 0.05);

        assert_eq!(recs.len(), 1);
        assert_eq!(
            recs[0].alignment,
            Alignment::Mismatched {
                channels: vec!["Y".to_string()]
            }
        );
    }
}
