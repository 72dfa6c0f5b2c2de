use byteorder::{LittleEndian, WriteBytesExt};
use ndarray::Array2;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::probe::{layout_for, map_probe, ChannelGroups};
use crate::types::*;

/// Name of the channel list written next to the recordings.
pub const CHANLIST_FILE: &str = "indx_port_site.txt";

/// Name of the parameters template inside the template directory.
pub const PARAMS_TEMPLATE: &str = "params.template";

/// Writes one recording as `recordings/<index>/data` under `dest`.
///
/// The dataset is stored little-endian: row count and column count as `u64`,
/// followed by the `f64` samples in row-major order.
pub fn save_recording(dest: &Path, data: &Array2<f64>, index: usize) -> Result<PathBuf> {
    let dir = dest.join("recordings").join(index.to_string());
    fs::create_dir_all(&dir)?;
    let path = dir.join("data");

    log::info!(" saving recordings/{}/data...", index);
    let mut writer = BufWriter::with_capacity(65536, File::create(&path)?);
    writer.write_u64::<LittleEndian>(data.nrows() as u64)?;
    writer.write_u64::<LittleEndian>(data.ncols() as u64)?;
    for &value in data.iter() {
        writer.write_f64::<LittleEndian>(value)?;
    }
    writer.flush()?;
    log::info!(" saved!");

    Ok(path)
}

/// Writes every recording in order, laying out channels as in `chans`.
///
/// Fails on the first recording that is not complete across `chans`.
pub fn save_recordings(
    dest: &Path,
    recordings: &[AlignedRecording],
    chans: &[String],
) -> Result<Vec<PathBuf>> {
    recordings
        .iter()
        .enumerate()
        .map(|(index, r)| {
            let data = r.recording.to_data(index, chans)?;
            save_recording(dest, &data, index)
        })
        .collect()
}

/// Writes `index,port,site` for every logical channel.
pub fn save_chanlist(
    dir: &Path,
    chans: &[String],
    port_map: &HashMap<String, usize>,
) -> Result<PathBuf> {
    let path = dir.join(CHANLIST_FILE);
    let mut f = BufWriter::new(File::create(&path)?);
    for (ch, port) in chans.iter().enumerate() {
        let site = port_map
            .get(port)
            .ok_or_else(|| ExportError::UnknownPort(port.clone()))?;
        writeln!(f, "{},{},{}", ch, port, site)?;
    }
    f.flush()?;
    log::info!("chans saved to {}", path.display());
    Ok(path)
}

/// Renders channel groups as the Python literal a `.prb` file expects.
pub fn format_channel_groups(groups: &ChannelGroups) -> String {
    let rendered: Vec<String> = groups
        .iter()
        .map(|(id, group)| {
            let channels: Vec<String> = group.channels().iter().map(|c| c.to_string()).collect();
            let geometry: Vec<String> = group
                .members
                .iter()
                .filter_map(|m| match (m.channel, m.position) {
                    (Some(ch), Some([x, y])) => Some(format!("{}: ({:?}, {:?})", ch, x, y)),
                    _ => None,
                })
                .collect();
            let graph: Vec<String> = group
                .graph
                .iter()
                .map(|(a, b)| format!("({}, {})", a, b))
                .collect();
            format!(
                "{}: {{'channels': [{}],\n     'geometry': {{{}}},\n     'graph': [{}]}}",
                id,
                channels.join(", "),
                geometry.join(", "),
                graph.join(", ")
            )
        })
        .collect();
    format!("{{{}}}", rendered.join(",\n "))
}

/// Maps the ports onto `probe` and writes `<probe>.prb` into `export`.
pub fn save_probe(
    probe: &str,
    chans: &[String],
    port_map: &HashMap<String, usize>,
    max_chans: usize,
    export: &Path,
) -> Result<ChannelGroups> {
    let layout = layout_for(probe)?;
    let groups = map_probe(layout.as_ref(), chans, port_map, max_chans)?;

    let path = export.join(format!("{}.prb", probe));
    fs::write(&path, format!("channel_groups = {}\n", format_channel_groups(&groups)))?;
    log::info!("probe saved to {}", path.display());
    Ok(groups)
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_ident_char(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

/// Replaces `$name` and `${name}` with values from `params`; `$$` is a
/// literal dollar sign.
///
/// A name with no value, or a `$` that starts no placeholder, is an error.
pub fn substitute(template: &str, params: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if after.starts_with('$') {
            out.push('$');
            rest = &after[1..];
            continue;
        } else if let Some(braced) = after.strip_prefix('{') {
            let end = braced.find('}').ok_or_else(|| ExportError::Template {
                name: braced.chars().take_while(|&c| is_ident_char(c)).collect(),
            })?;
            (&braced[..end], end + 2)
        } else {
            let end = after
                .char_indices()
                .find(|&(_, c)| !is_ident_char(c))
                .map(|(i, _)| i)
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        if !name.starts_with(is_ident_start) || !name.chars().all(is_ident_char) {
            return Err(ExportError::Template {
                name: name.to_string(),
            });
        }
        let value = params.get(name).ok_or_else(|| ExportError::Template {
            name: name.to_string(),
        })?;
        out.push_str(value);
        rest = &after[consumed..];
    }
    out.push_str(rest);

    Ok(out)
}

/// Fills `params.template` from `template_dir` and writes `params.prm`.
pub fn save_parameters(
    params: &BTreeMap<String, String>,
    template_dir: &Path,
    export: &Path,
) -> Result<PathBuf> {
    let template = fs::read_to_string(template_dir.join(PARAMS_TEMPLATE))?;
    let path = export.join("params.prm");
    fs::write(&path, substitute(&template, params)?)?;
    Ok(path)
}

/// Writes `info` as `<name>_info.json` with sorted keys and 4-space indent.
pub fn save_info(path: &Path, info: &ExportInfo) -> Result<PathBuf> {
    // Going through Value sorts the keys
    let value = serde_json::to_value(info)?;
    let out = path.join(format!("{}_info.json", info.name));

    let mut writer = BufWriter::new(File::create(&out)?);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut writer, formatter);
    value.serialize(&mut ser)?;
    writer.flush()?;

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ChannelGroup, GroupMember};

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_substitute() {
        let p = params(&[("experiment_name", "rec001"), ("probe_file", "A1x16.prb")]);
        let out = substitute("name = '$experiment_name'\nprb = '${probe_file}' # $$5", &p).unwrap();
        assert_eq!(out, "name = 'rec001'\nprb = 'A1x16.prb' # $5");
    }

    #[test]
    fn test_substitute_unresolved_is_fatal() {
        let err = substitute("x = $missing", &params(&[])).unwrap_err();
        assert!(matches!(err, ExportError::Template { name } if name == "missing"));
        assert!(substitute("x = ${open", &params(&[("open", "1")])).is_err());
        assert!(substitute("cost $ 5", &params(&[])).is_err());
    }

    #[test]
    fn test_format_channel_groups() {
        let mut groups = ChannelGroups::new();
        groups.insert(
            0,
            ChannelGroup {
                members: vec![
                    GroupMember {
                        channel: Some(0),
                        site: 1,
                        position: Some([0.0, 0.0]),
                    },
                    GroupMember {
                        channel: Some(1),
                        site: 2,
                        position: Some([0.0, 12.5]),
                    },
                ],
                graph: vec![(0, 1)],
            },
        );

        assert_eq!(
            format_channel_groups(&groups),
            "{0: {'channels': [0, 1],\n     'geometry': {0: (0.0, 0.0), 1: (0.0, 12.5)},\n     'graph': [(0, 1)]}}"
        );
    }
}
