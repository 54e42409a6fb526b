// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Append-only JSON Lines files shared by the file-backed stores.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use tracing::warn;

/// Appends one record as a single line, creating parent directories as needed.
pub fn append<T: Serialize>(path: &Path, record: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut line = serde_json::to_vec(record).map_err(io::Error::other)?;
    line.push(b'\n');
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&line)?;
    file.flush()
}

/// Reads every parseable line. A missing file reads as empty; a torn last
/// line from a crash mid-append is skipped with a warning.
pub fn read_all<T: DeserializeOwned>(path: &Path) -> io::Result<Vec<T>> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(path = %path.display(), line = index + 1, error = %e, "Skipping unreadable JSONL line"),
        }
    }
    Ok(records)
}

/// Writes `bytes` to a sibling temp file and renames it over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Line {
        n: u32,
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("log.jsonl");
        append(&path, &Line { n: 1 }).unwrap();
        append(&path, &Line { n: 2 }).unwrap();
        let lines: Vec<Line> = read_all(&path).unwrap();
        assert_eq!(lines, vec![Line { n: 1 }, Line { n: 2 }]);
    }

    #[test]
    fn test_missing_file_and_torn_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        assert!(read_all::<Line>(&path).unwrap().is_empty());

        fs::write(&path, "{\"n\":1}\n{\"n\":").unwrap();
        let lines: Vec<Line> = read_all(&path).unwrap();
        assert_eq!(lines, vec![Line { n: 1 }]);
    }
}
