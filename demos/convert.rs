use smr_export::catalog::load_catalog;
use smr_export::writer::{save_chanlist, save_info, save_probe, save_recordings};
use smr_export::{load, ChannelStream, ConversionConfig, ExportDirectory, ExportInfo};
use std::collections::HashMap;
use std::env;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

const PROBE: &str = "A1x16-5mm-50-177";

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let work = env::temp_dir().join("smr_export_demo");
    let export = work.join("rec001");
    let dest = work.join("out");
    fs::create_dir_all(&export)?;
    fs::create_dir_all(&dest)?;

    // Eight ports wired onto every other site of a 16-site probe
    let chans: Vec<String> = (1..=8).map(|i| format!("Port{}", i)).collect();
    let port_map: HashMap<String, usize> = chans
        .iter()
        .enumerate()
        .map(|(i, p)| (p.clone(), 2 * i + 1))
        .collect();

    // Two blocks per channel: 2 s of signal, a pause, then 1 s more
    let dt = 1.0 / 1000.0;
    for (i, port) in chans.iter().enumerate() {
        let times: Vec<f64> = (0..2000)
            .map(|n| n as f64 * dt)
            .chain((0..1000).map(|n| 5.0 + n as f64 * dt))
            .collect();
        let values = times.iter().map(|t| (t * (i + 1) as f64).sin()).collect();
        ExportDirectory::write_channel(&export, &ChannelStream::new(port.as_str(), times, values, dt)?)?;
    }

    let catalog = work.join("catalog.txt");
    fs::write(&catalog, "\"rec001.smrx\",8.0,0,0.2,0,8\n")?;
    let entries = load_catalog(&catalog)?;

    let config = match env::args().nth(1).map(PathBuf::from) {
        Some(path) => ConversionConfig::from_json_file(path)?,
        None => ConversionConfig::default(),
    };

    let recordings = load(&export, &chans, &config)?;
    println!("Recordings: {}", recordings.len());
    for (i, rec) in recordings.iter().enumerate() {
        println!(
            "  {}: {:.2} s, {} channels, {:?}",
            i,
            rec.recording.duration(),
            rec.recording.channels.len(),
            rec.alignment
        );
    }

    save_recordings(&dest, &recordings, &chans)?;
    save_chanlist(&dest, &chans, &port_map)?;
    let groups = save_probe(PROBE, &chans, &port_map, config.max_chans, &dest)?;
    for (id, group) in &groups {
        println!("Group {}: channels {:?}", id, group.channels());
    }

    let mut info = ExportInfo::from_entry(&entries[0]);
    info.probe = Some(PROBE.to_string());
    info.ports = chans.clone();
    save_info(&dest, &info)?;

    println!("\nOutput written to {}", dest.display());
    Ok(())
}
