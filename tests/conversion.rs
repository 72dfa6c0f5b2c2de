use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Cursor;
use std::path::Path;

use smr_export::catalog::read_catalog;
use smr_export::reader::read_dataset;
use smr_export::writer::{
    save_chanlist, save_info, save_parameters, save_probe, save_recordings, PARAMS_TEMPLATE,
};
use smr_export::{
    load, Alignment, AlignmentPolicy, ChannelStream, ConversionConfig, ExportDirectory,
    ExportError, ExportInfo,
};

const DT: f64 = 0.001;

/// Writes a channel recorded in two blocks: 10 s, a pause, then 5 s.
fn write_two_block_channel(root: &Path, label: &str, offset: f64) {
    let first = (0..=10_000).map(|i| i as f64 * DT);
    let second = (0..=5_000).map(|i| 30.0 + i as f64 * DT);
    let times: Vec<f64> = first.chain(second).collect();
    let values: Vec<f64> = times.iter().map(|t| (t * 7.0).sin() + offset).collect();
    let stream = ChannelStream::new(label, times, values, DT).unwrap();
    ExportDirectory::write_channel(root, &stream).unwrap();
}

fn ports() -> Vec<String> {
    ["Port1", "Port2", "Port3"].iter().map(|s| s.to_string()).collect()
}

fn port_map() -> HashMap<String, usize> {
    [("Port1", 1), ("Port2", 3), ("Port3", 5)]
        .iter()
        .map(|(p, s)| (p.to_string(), *s))
        .collect()
}

#[test]
fn test_export_to_recordings_and_probe() {
    let export = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    for (i, port) in ports().iter().enumerate() {
        write_two_block_channel(export.path(), port, i as f64);
    }

    let config = ConversionConfig {
        alignment: AlignmentPolicy::Positional { strict: true },
        ..ConversionConfig::default()
    };
    let recordings = load(export.path(), &ports(), &config).unwrap();

    assert_eq!(recordings.len(), 2);
    for (rec, expected) in recordings.iter().zip([10.0, 5.0]) {
        assert_eq!(rec.alignment, Alignment::Aligned);
        assert_eq!(rec.recording.channels.len(), 3);
        assert!((rec.recording.duration() - expected).abs() < 1e-6);
        assert!(rec.recording.file_origin.is_some());
    }

    let paths = save_recordings(dest.path(), &recordings, &ports()).unwrap();
    assert!(paths[1].ends_with("recordings/1/data"));
    let data = read_dataset(&paths[0]).unwrap();
    assert_eq!(data.shape(), &[10_001, 3]);
    // Column order follows the port order
    assert!((data[[0, 2]] - 2.0).abs() < 1e-12);

    let chanlist = save_chanlist(dest.path(), &ports(), &port_map()).unwrap();
    assert_eq!(
        fs::read_to_string(chanlist).unwrap(),
        "0,Port1,1\n1,Port2,3\n2,Port3,5\n"
    );

    let groups = save_probe("A1x16-5mm-50-177", &ports(), &port_map(), 32, dest.path()).unwrap();
    assert_eq!(groups[&0].channels(), vec![0, 1, 2]);
    let prb = fs::read_to_string(dest.path().join("A1x16-5mm-50-177.prb")).unwrap();
    assert!(prb.starts_with("channel_groups = {0: {'channels': [0, 1, 2],"));
    assert!(prb.contains("'graph': [(0, 1), (1, 2)]"));
}

#[test]
fn test_short_channel_fails_only_when_strict() {
    let export = tempfile::tempdir().unwrap();
    write_two_block_channel(export.path(), "Port1", 0.0);
    let times: Vec<f64> = (0..=10_000).map(|i| i as f64 * DT).collect();
    let values = vec![0.0; times.len()];
    let short = ChannelStream::new("Port2", times, values, DT).unwrap();
    ExportDirectory::write_channel(export.path(), &short).unwrap();
    let chans = vec!["Port1".to_string(), "Port2".to_string()];

    let lenient = load(export.path(), &chans, &ConversionConfig::default()).unwrap();
    assert_eq!(lenient.len(), 2);
    assert_eq!(
        lenient[1].alignment,
        Alignment::Partial {
            missing: vec!["Port2".to_string()]
        }
    );

    let strict = ConversionConfig {
        alignment: AlignmentPolicy::Positional { strict: true },
        ..ConversionConfig::default()
    };
    assert!(matches!(
        load(export.path(), &chans, &strict),
        Err(ExportError::EpochCountMismatch { .. })
    ));

    // A partial recording cannot be written as a full matrix
    let dest = tempfile::tempdir().unwrap();
    assert!(matches!(
        save_recordings(dest.path(), &lenient, &chans),
        Err(ExportError::RecordingShape { index: 1, .. })
    ));
}

#[test]
fn test_catalog_info_and_parameters() {
    let dest = tempfile::tempdir().unwrap();
    let entries = read_catalog(Cursor::new("\"rec001.smrx\",120.5,0,45.2,0,16\n")).unwrap();
    let mut info = ExportInfo::from_entry(&entries[0]);
    info.probe = Some("A1x16-5mm-50-177".to_string());

    let path = save_info(dest.path(), &info).unwrap();
    assert!(path.ends_with("rec001_info.json"));
    let json = fs::read_to_string(&path).unwrap();
    assert!(json.starts_with("{\n    \"duration\": 120.5,\n    \"mb\": 45.2,"));
    let back: ExportInfo = serde_json::from_str(&json).unwrap();
    assert_eq!(back, info);

    let templates = tempfile::tempdir().unwrap();
    fs::write(
        templates.path().join(PARAMS_TEMPLATE),
        "experiment_name = '$name'\nprb_file = '${probe}'\n",
    )
    .unwrap();
    let mut params = BTreeMap::new();
    params.insert("name".to_string(), info.name.clone());
    params.insert("probe".to_string(), "A1x16-5mm-50-177.prb".to_string());

    let prm = save_parameters(&params, templates.path(), dest.path()).unwrap();
    assert_eq!(
        fs::read_to_string(prm).unwrap(),
        "experiment_name = 'rec001'\nprb_file = 'A1x16-5mm-50-177.prb'\n"
    );

    params.remove("probe");
    assert!(matches!(
        save_parameters(&params, templates.path(), dest.path()),
        Err(ExportError::Template { .. })
    ));
}
