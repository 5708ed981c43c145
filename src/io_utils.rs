//! JSON input/output helpers shared by the commands.
//!
//! The `-` path convention routes through stdin/stdout.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::classify::FlatMap;

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if is_dash(path) {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Reading JSON from stdin")?;
        return serde_json::from_str(&buf).context("Parsing JSON from stdin");
    }
    let file = File::open(path).with_context(|| format!("Opening {path:?}"))?;
    serde_json::from_reader(BufReader::new(file)).with_context(|| format!("Parsing JSON in {path:?}"))
}

/// Reads a submission, which must be a single JSON object.
pub fn read_flat_map(path: &Path) -> Result<FlatMap> {
    match read_json::<Value>(path)? {
        Value::Object(map) => Ok(map),
        other => Err(anyhow!(
            "Submission {path:?} must be a JSON object, found {}",
            json_kind(&other)
        )),
    }
}

/// Writes pretty JSON to `path`, or stdout when absent or `-`.
pub fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    match path {
        Some(path) if !is_dash(path) => {
            let file = File::create(path).with_context(|| format!("Creating {path:?}"))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)
                .with_context(|| format!("Writing JSON to {path:?}"))?;
            writeln!(writer)?;
            writer.flush()?;
        }
        _ => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            serde_json::to_writer_pretty(&mut handle, value).context("Writing JSON to stdout")?;
            writeln!(handle)?;
        }
    }
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn read_flat_map_rejects_arrays() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("submission.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        let err = read_flat_map(&path).unwrap_err();
        assert!(err.to_string().contains("found an array"));
    }

    #[test]
    fn write_then_read_preserves_key_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json");
        let mut map = FlatMap::new();
        map.insert("zeta".to_string(), Value::from(1));
        map.insert("alpha".to_string(), Value::from(2));
        write_json(Some(&path), &map).unwrap();
        let loaded = read_flat_map(&path).unwrap();
        assert_eq!(loaded.keys().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
    }
}
