//! Trace readers feeding the simulation world.
//!
//! A traces directory holds two files per host: `idleness-<host>` with the
//! user's activity periods and `fs-<host>` with the file operations issued
//! on that host. Each file becomes one lazily-pulled
//! [`EventSource`](beefsim_kernel::EventSource).

mod activity;
mod filesystem;

use std::cell::Cell;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub use activity::ActivityTraceSource;
pub use filesystem::FileSystemTraceSource;

use crate::error::TraceError;

/// File name prefix of activity traces.
pub const ACTIVITY_PREFIX: &str = "idleness-";
/// File name prefix of file-system traces.
pub const FILESYSTEM_PREFIX: &str = "fs-";

/// Path of the activity trace of `host` in `dir`.
pub fn activity_trace(dir: &Path, host: &str) -> PathBuf {
    dir.join(format!("{ACTIVITY_PREFIX}{host}"))
}

/// Path of the file-system trace of `host` in `dir`.
pub fn filesystem_trace(dir: &Path, host: &str) -> PathBuf {
    dir.join(format!("{FILESYSTEM_PREFIX}{host}"))
}

/// Hosts of `dir` that have both an activity and a file-system trace, sorted by name.
pub fn discover_hosts(dir: &Path) -> Result<Vec<String>, TraceError> {
    let io_error = |source| TraceError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut with_activity = BTreeSet::new();
    let mut with_filesystem = BTreeSet::new();
    for entry in std::fs::read_dir(dir).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(host) = name.strip_prefix(ACTIVITY_PREFIX) {
            with_activity.insert(host.to_string());
        } else if let Some(host) = name.strip_prefix(FILESYSTEM_PREFIX) {
            with_filesystem.insert(host.to_string());
        }
    }

    Ok(with_activity
        .intersection(&with_filesystem)
        .cloned()
        .collect())
}

/// Shared count of trace lines skipped as malformed.
#[derive(Debug, Clone, Default)]
pub struct MalformedLines(Rc<Cell<u64>>);

impl MalformedLines {
    /// Lines skipped so far.
    pub fn get(&self) -> u64 {
        self.0.get()
    }

    fn increment(&self) {
        self.0.set(self.0.get() + 1);
    }
}

/// Line reader that remembers where it is, for error reporting.
#[derive(Debug)]
struct TraceLines<R> {
    path: PathBuf,
    reader: R,
    line: usize,
}

impl TraceLines<BufReader<File>> {
    fn open(path: &Path) -> Result<Self, TraceError> {
        let file = File::open(path).map_err(|source| TraceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(path, BufReader::new(file)))
    }
}

impl<R: BufRead> TraceLines<R> {
    fn new(path: impl Into<PathBuf>, reader: R) -> Self {
        Self {
            path: path.into(),
            reader,
            line: 0,
        }
    }

    /// Next line without its terminator, `None` at end of file.
    fn next_line(&mut self) -> Result<Option<String>, TraceError> {
        let mut buffer = String::new();
        let read = self
            .reader
            .read_line(&mut buffer)
            .map_err(|source| TraceError::Io {
                path: self.path.clone(),
                source,
            })?;
        if read == 0 {
            return Ok(None);
        }
        self.line += 1;
        let len = buffer.trim_end_matches(['\n', '\r']).len();
        buffer.truncate(len);
        Ok(Some(buffer))
    }

    fn malformed(&self, reason: impl Into<String>) -> TraceError {
        TraceError::Malformed {
            path: self.path.clone(),
            line: self.line,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn hosts_need_both_traces() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "idleness-jurupoca",
            "fs-jurupoca",
            "idleness-cherne",
            "fs-cherne",
            "idleness-only",
            "fs-lonely",
            "README",
        ] {
            fs::write(dir.path().join(name), "").unwrap();
        }

        let hosts = discover_hosts(dir.path()).unwrap();
        assert_eq!(hosts, vec!["cherne".to_string(), "jurupoca".to_string()]);
        assert_eq!(
            activity_trace(dir.path(), "cherne"),
            dir.path().join("idleness-cherne")
        );
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_hosts(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, TraceError::Io { .. }));
    }

    #[test]
    fn lines_are_numbered_and_stripped() {
        let mut lines = TraceLines::new("t", "a\r\n\nb".as_bytes());
        assert_eq!(lines.next_line().unwrap().as_deref(), Some("a"));
        assert_eq!(lines.next_line().unwrap().as_deref(), Some(""));
        assert_eq!(lines.next_line().unwrap().as_deref(), Some("b"));
        assert_eq!(lines.line, 3);
        assert_eq!(lines.next_line().unwrap(), None);
        assert_eq!(lines.malformed("bad").to_string(), "t:3: bad");
    }
}
