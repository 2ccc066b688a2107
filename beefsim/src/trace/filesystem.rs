use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use beefsim_kernel::{EventSource, Instant, SimulationResult};

use super::{MalformedLines, TraceLines};
use crate::error::TraceError;
use crate::events::{Close, Read, SimEvent, Unlink, Write};
use crate::machine::HostId;

/// Reads the file operations a host issued.
///
/// ```text
/// read   <begin_us>-<elapsed_us> <path...> <length>
/// write  <begin_us>-<elapsed_us> <path...> <bytes> <file_size>
/// close  <begin_us>-<elapsed_us> <path...>
/// unlink <begin_us>-<elapsed_us> <path...>
/// ```
///
/// Paths may contain spaces. Blank lines, `#` comments and unknown operations
/// are skipped; malformed lines are skipped with a warning. Operations
/// recorded before the simulation start are dropped.
#[derive(Debug)]
pub struct FileSystemTraceSource<R> {
    client: HostId,
    lines: TraceLines<R>,
    malformed: MalformedLines,
    start: Instant,
}

impl FileSystemTraceSource<BufReader<File>> {
    /// Opens the file-system trace at `path` for the client on `client`.
    pub fn open(path: &Path, client: HostId) -> Result<Self, TraceError> {
        Ok(Self {
            client,
            lines: TraceLines::open(path)?,
            malformed: MalformedLines::default(),
            start: Instant::GENESIS,
        })
    }
}

impl<R: BufRead> FileSystemTraceSource<R> {
    /// Reads a file-system trace from `reader`; `path` is only used in warnings.
    pub fn new(path: impl Into<PathBuf>, reader: R, client: HostId) -> Self {
        Self {
            client,
            lines: TraceLines::new(path, reader),
            malformed: MalformedLines::default(),
            start: Instant::GENESIS,
        }
    }

    /// Drops operations recorded before `start`.
    pub fn starting_at(mut self, start: Instant) -> Self {
        self.start = start;
        self
    }

    /// Handle on the count of lines this source skipped as malformed.
    pub fn malformed_lines(&self) -> MalformedLines {
        self.malformed.clone()
    }

    fn parse(&self, line: &str) -> Result<Option<(Instant, SimEvent)>, String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((operation, args)) = tokens.split_first() else {
            return Ok(None);
        };
        let client = self.client;

        let event = match *operation {
            "read" => {
                let [timing, path @ .., length] = args else {
                    return Err("read needs timing, path and length".to_string());
                };
                let (begin, duration) = parse_timing(timing)?;
                let event = SimEvent::Read(Read {
                    client,
                    path: join_path(path)?,
                    bytes: parse_number(length, "length")?,
                    duration,
                    delayable: true,
                });
                (begin, event)
            }
            "write" => {
                let [timing, path @ .., bytes, file_size] = args else {
                    return Err("write needs timing, path, bytes and file size".to_string());
                };
                let (begin, duration) = parse_timing(timing)?;
                let event = SimEvent::Write(Write {
                    client,
                    path: join_path(path)?,
                    bytes: parse_number(bytes, "bytes")?,
                    file_size: parse_number(file_size, "file size")?,
                    duration,
                    delayable: true,
                });
                (begin, event)
            }
            "close" | "unlink" => {
                let [timing, path @ ..] = args else {
                    return Err(format!("{operation} needs timing and path"));
                };
                let (begin, _) = parse_timing(timing)?;
                let path = join_path(path)?;
                let event = if *operation == "close" {
                    SimEvent::Close(Close { client, path })
                } else {
                    SimEvent::Unlink(Unlink { client, path })
                };
                (begin, event)
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

impl<R: BufRead> EventSource<SimEvent> for FileSystemTraceSource<R> {
    fn next_event(&mut self) -> SimulationResult<Option<(Instant, SimEvent)>> {
        while let Some(line) = self.lines.next_line()? {
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            match self.parse(&line) {
                Ok(Some((at, _))) if at < self.start => continue,
                Ok(Some(event)) => return Ok(Some(event)),
                Ok(None) => continue,
                Err(reason) => {
                    let err = self.lines.malformed(reason);
                    self.malformed.increment();
                    tracing::warn!(client = %self.client, %err, "skipping malformed trace line");
                }
            }
        }
        Ok(None)
    }
}

fn parse_timing(token: &str) -> Result<(Instant, Duration), String> {
    let (begin, elapsed) = token
        .split_once('-')
        .ok_or_else(|| format!("timing '{token}' is not <begin>-<elapsed>"))?;
    let begin = parse_number(begin, "begin")?;
    let elapsed = parse_number(elapsed, "elapsed time")?;
    Ok((Instant::from_micros(begin), Duration::from_micros(elapsed)))
}

fn parse_number(token: &str, what: &str) -> Result<u64, String> {
    token
        .parse()
        .map_err(|err| format!("bad {what} '{token}': {err}"))
}

fn join_path(tokens: &[&str]) -> Result<String, String> {
    if tokens.is_empty() {
        return Err("missing path".to_string());
    }
    Ok(tokens.join(" "))
}
