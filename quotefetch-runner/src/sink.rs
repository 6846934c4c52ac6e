//! Sinks — JSON, CSV, and append-only text artifacts.
//!
//! Every writer creates missing parent directories first. JSON output is
//! pretty-printed with non-ASCII text kept as-is.

use quotefetch_core::{PipelineError, Record, Result};
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Write `records` as a pretty JSON array, replacing any existing file.
pub fn write_json(records: &[Record], path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let json = to_pretty_json(&records).map_err(|e| PipelineError::io(path, e))?;
    fs::write(path, json).map_err(|e| PipelineError::io(path, e))?;
    tracing::info!(path = %path.display(), records = records.len(), "wrote JSON");
    Ok(())
}

/// Write `records` as CSV with the header taken from the first record's keys.
///
/// An empty record set is a `Schema` error: there is no header to derive, and
/// an empty file would hide an upstream failure.
pub fn write_csv(records: &[Record], path: &Path) -> Result<()> {
    let first = records.first().ok_or_else(|| {
        PipelineError::Schema(format!(
            "no records to write to {}: cannot derive a CSV header",
            path.display()
        ))
    })?;
    let header: Vec<&str> = first.keys().map(String::as_str).collect();

    ensure_parent(path)?;
    let mut wtr = csv::Writer::from_path(path).map_err(|e| PipelineError::io(path, e))?;
    wtr.write_record(&header)
        .map_err(|e| PipelineError::io(path, e))?;
    for record in records {
        let row: Vec<String> = header
            .iter()
            .map(|key| record.get(*key).map(cell).unwrap_or_default())
            .collect();
        wtr.write_record(&row).map_err(|e| PipelineError::io(path, e))?;
    }
    wtr.flush().map_err(|e| PipelineError::io(path, e))?;
    tracing::info!(path = %path.display(), records = records.len(), "wrote CSV");
    Ok(())
}

/// Append a delimited block of pretty JSON records to a text file.
///
/// Repeated runs accumulate in the same file; nothing is overwritten.
pub fn append_text(records: &[Record], path: &Path, header: &str) -> Result<()> {
    ensure_parent(path)?;
    let block = render_text_block(records, header).map_err(|e| PipelineError::io(path, e))?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| PipelineError::io(path, e))?;
    file.write_all(block.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| PipelineError::io(path, e))?;
    tracing::info!(path = %path.display(), records = records.len(), "appended text");
    Ok(())
}

/// The text appended by [`append_text`]: a delimiter line, then each record
/// as pretty JSON followed by a blank line.
pub fn render_text_block(records: &[Record], header: &str) -> serde_json::Result<String> {
    let mut out = format!("==== {header} ====\n");
    for record in records {
        out.push_str(&to_pretty_json(record)?);
        out.push_str("\n\n");
    }
    Ok(out)
}

/// Render a CSV cell: strings verbatim, null empty, everything else as JSON.
pub fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    // serde_json only ever emits UTF-8.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))
        }
        _ => Ok(()),
    }
}
