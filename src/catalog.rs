use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::types::*;

const CATALOG_FIELDS: usize = 6;

/// Parses one catalog line: `"<source>",<duration>,_,<size_mb>,_,<n_chan>`.
///
/// `line_no` is only used to report where a malformed line came from.
///
/// # Examples
///
/// ```
/// use smr_export::catalog::parse_catalog_line;
///
/// let entry = parse_catalog_line(r#""rec001",120.5,0,45.2,0,16"#, 1).unwrap();
/// assert_eq!(entry.source, "rec001");
/// assert_eq!(entry.n_chan, 16);
/// ```
pub fn parse_catalog_line(line: &str, line_no: usize) -> Result<CatalogEntry> {
    let fail = |reason: String| ExportError::Parse {
        line: line_no,
        content: line.to_string(),
        reason,
    };

    let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
    if fields.len() != CATALOG_FIELDS {
        return Err(fail(format!(
            "expected {} fields, found {}",
            CATALOG_FIELDS,
            fields.len()
        )));
    }

    let source = fields[0].trim_matches('"').to_string();
    if source.is_empty() {
        return Err(fail("empty source identifier".to_string()));
    }
    let duration: f64 = fields[1]
        .parse()
        .map_err(|_| fail(format!("invalid duration {:?}", fields[1])))?;
    let size_mb: f64 = fields[3]
        .parse()
        .map_err(|_| fail(format!("invalid size {:?}", fields[3])))?;
    let n_chan: usize = fields[5]
        .parse()
        .map_err(|_| fail(format!("invalid channel count {:?}", fields[5])))?;

    Ok(CatalogEntry {
        source,
        duration,
        size_mb,
        n_chan,
    })
}

/// Reads every entry from a catalog. Blank lines are skipped; the first
/// malformed line aborts the read.
pub fn read_catalog<R: BufRead>(reader: R) -> Result<Vec<CatalogEntry>> {
    let mut entries = Vec::new();
    for (ii, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(parse_catalog_line(&line, ii + 1)?);
    }
    Ok(entries)
}

/// Opens and reads the catalog file at `path`.
pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<Vec<CatalogEntry>> {
    let file = File::open(path.as_ref())?;
    let entries = read_catalog(BufReader::new(file))?;
    log::info!(
        "Read {} exports from {}",
        entries.len(),
        path.as_ref().display()
    );
    Ok(entries)
}

impl ExportInfo {
    /// Export metadata for a catalog entry. The export name is the source
    /// identifier without its extension.
    pub fn from_entry(entry: &CatalogEntry) -> Self {
        let name = Path::new(&entry.source)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&entry.source)
            .to_string();
        ExportInfo {
            name,
            source: entry.source.clone(),
            duration: entry.duration,
            mb: entry.size_mb,
            n_chan: entry.n_chan,
            probe: None,
            ports: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_catalog_line() {
        let entry = parse_catalog_line("\"rec001\",120.5,0,45.2,0,16\n", 1).unwrap();
        assert_eq!(
            entry,
            CatalogEntry {
                source: "rec001".to_string(),
                duration: 120.5,
                size_mb: 45.2,
                n_chan: 16,
            }
        );
    }

    #[test]
    fn test_wrong_field_count() {
        let err = parse_catalog_line("\"rec001\",120.5,0,45.2", 7).unwrap_err();
        match err {
            ExportError::Parse { line, content, .. } => {
                assert_eq!(line, 7);
                assert_eq!(content, "\"rec001\",120.5,0,45.2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_numeric_field() {
        assert!(parse_catalog_line("\"rec001\",abc,0,45.2,0,16", 1).is_err());
        assert!(parse_catalog_line("\"rec001\",1.0,0,45.2,0,16.5", 1).is_err());
    }

    #[test]
    fn test_read_catalog_reports_line_number() {
        let text = "\"a.smrx\",1.0,0,2.0,0,4\n\n\"b\",1.0,0,x,0,4\n";
        let err = read_catalog(Cursor::new(text)).unwrap_err();
        assert!(matches!(err, ExportError::Parse { line: 3, .. }));

        let entries = read_catalog(Cursor::new("\"a.smrx\",1.0,0,2.0,0,4\n\n")).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(ExportInfo::from_entry(&entries[0]).name, "a");
    }
}
