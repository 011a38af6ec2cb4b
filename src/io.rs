//! JSON and JSONL file access.
//!
//! Readers report physical line numbers (blank lines are skipped but still
//! counted) so validation messages point at the right place in the file.
//! Writers create missing parent directories and always end the file with a
//! newline, so rewriting unchanged data yields identical bytes.

use serde::de::{DeserializeOwned, Error as _};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |source| Error::Io { path: path.to_path_buf(), source }
}

fn json_err(path: &Path, line: usize) -> impl FnOnce(serde_json::Error) -> Error + '_ {
    move |source| Error::Json { path: path.to_path_buf(), line, source }
}

/// Read a single JSON document.
pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(io_err(path))?;
    serde_json::from_str(&raw).map_err(|source| {
        let line = source.line();
        Error::Json { path: path.to_path_buf(), line, source }
    })
}

/// Read a JSONL file as untyped values, paired with their 1-based line
/// numbers. Lines that are not JSON at all abort the read.
pub fn read_jsonl_values(path: impl AsRef<Path>) -> Result<Vec<(usize, serde_json::Value)>> {
    let path = path.as_ref();
    let file = fs::File::open(path).map_err(io_err(path))?;
    let mut rows = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(io_err(path))?;
        if line.trim().is_empty() {
            continue;
        }
        let value = serde_json::from_str(&line).map_err(json_err(path, i + 1))?;
        rows.push((i + 1, value));
    }
    Ok(rows)
}

/// Read a JSONL file into typed records.
pub fn read_jsonl<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    let path = path.as_ref();
    read_jsonl_values(path)?
        .into_iter()
        .map(|(line, value)| serde_json::from_value(value).map_err(json_err(path, line)))
        .collect()
}

fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent).map_err(io_err(parent)),
        _ => Ok(()),
    }
}

/// Write `value` as pretty-printed JSON.
pub fn write_json<T: Serialize + ?Sized>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let path = path.as_ref();
    create_parent(path)?;
    let mut raw = serde_json::to_string_pretty(value).map_err(json_err(path, 1))?;
    raw.push('\n');
    fs::write(path, raw).map_err(io_err(path))
}

/// Write one compact JSON record per line.
pub fn write_jsonl<T: Serialize>(path: impl AsRef<Path>, rows: &[T]) -> Result<()> {
    let path = path.as_ref();
    create_parent(path)?;
    let file = fs::File::create(path).map_err(io_err(path))?;
    let mut out = BufWriter::new(file);
    for (i, row) in rows.iter().enumerate() {
        serde_json::to_writer(&mut out, row).map_err(json_err(path, i + 1))?;
        out.write_all(b"\n").map_err(io_err(path))?;
    }
    out.flush().map_err(io_err(path))
}

// --- Flag sets --------------------------------------------------------------

/// Serialize a bitflags set as the list of its flag names.
pub(crate) fn serialize_flags<F, S>(flags: &F, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    F: bitflags::Flags,
    S: Serializer,
{
    let mut seq = serializer.serialize_seq(None)?;
    for (name, _) in flags.iter_names() {
        seq.serialize_element(name)?;
    }
    seq.end()
}

/// Inverse of [`serialize_flags`]; names are matched case-insensitively.
pub(crate) fn deserialize_flags<'de, F, D>(deserializer: D) -> std::result::Result<F, D::Error>
where
    F: bitflags::Flags,
    D: Deserializer<'de>,
{
    let names = Vec::<String>::deserialize(deserializer)?;
    let mut flags = F::empty();
    for name in &names {
        let flag = F::from_name(&name.to_uppercase()).ok_or_else(|| D::Error::custom(format!("unknown flag `{name}`")))?;
        flags.insert(flag);
    }
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("goldweave-io-{}-{name}", std::process::id()))
    }

    #[test]
    fn jsonl_roundtrip_keeps_line_numbers() {
        let path = scratch("lines.jsonl");
        fs::write(&path, "{\"a\":1}\n\n  \n{\"a\":2}\n").unwrap();
        let rows = read_jsonl_values(&path).unwrap();
        assert_eq!(rows.iter().map(|(l, _)| *l).collect::<Vec<_>>(), vec![1, 4]);

        let out = scratch("nested/out.jsonl");
        write_jsonl(&out, &[serde_json::json!({"a": 1}), serde_json::json!({"a": 2})]).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "{\"a\":1}\n{\"a\":2}\n");
        let _ = fs::remove_file(&path);
        let _ = fs::remove_dir_all(scratch("nested"));
    }

    #[test]
    fn malformed_line_is_reported_with_its_number() {
        let path = scratch("bad.jsonl");
        fs::write(&path, "{\"a\":1}\n{oops\n").unwrap();
        match read_jsonl_values(&path) {
            Err(Error::Json { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {other:?}"),
        }
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(read_json::<serde_json::Value>(scratch("absent.json")), Err(Error::Io { .. })));
    }
}
