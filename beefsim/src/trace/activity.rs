use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use beefsim_kernel::{EventSource, Instant, SimulationResult};

use super::TraceLines;
use crate::error::TraceError;
use crate::events::{SimEvent, UserActivity, UserIdleness};
use crate::machine::HostId;

/// Reads `<idleness|activity>\t<start_secs>\t<duration_secs>` lines.
///
/// Construction advances to the simulation start: periods that end before it
/// are skipped and the first remaining one is re-anchored to begin exactly at
/// the start. Malformed lines are fatal, since skipping one would break the
/// machine's timeline.
#[derive(Debug)]
pub struct ActivityTraceSource<R> {
    host: HostId,
    lines: TraceLines<R>,
    first: Option<SimEvent>,
    start: Instant,
}

impl ActivityTraceSource<BufReader<File>> {
    /// Opens the activity trace at `path` for `host`.
    pub fn open(path: &Path, host: HostId, start: Instant) -> Result<Self, TraceError> {
        Self::from_lines(TraceLines::open(path)?, host, start)
    }
}

impl<R: BufRead> ActivityTraceSource<R> {
    /// Reads an activity trace from `reader`; `path` is only used in errors.
    pub fn new(
        path: impl Into<PathBuf>,
        reader: R,
        host: HostId,
        start: Instant,
    ) -> Result<Self, TraceError> {
        Self::from_lines(TraceLines::new(path, reader), host, start)
    }

    fn from_lines(lines: TraceLines<R>, host: HostId, start: Instant) -> Result<Self, TraceError> {
        let mut source = Self {
            host,
            lines,
            first: None,
            start,
        };
        source.first = source.advance_to_start()?;
        Ok(source)
    }

    fn advance_to_start(&mut self) -> Result<Option<SimEvent>, TraceError> {
        loop {
            let Some((begin, event)) = self.parse_next()? else {
                tracing::warn!(host = %self.host, start = %self.start, "activity trace ends before the simulation start");
                return Ok(None);
            };
            let duration = lasting(&event);
            if begin + duration < self.start {
                continue;
            }
            let remaining = (begin + duration) - self.start;
            return Ok(Some(self.period(is_activity(&event), remaining)));
        }
    }

    fn parse_next(&mut self) -> Result<Option<(Instant, SimEvent)>, TraceError> {
        let line = loop {
            match self.lines.next_line()? {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => break line,
            }
        };

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let [kind, begin, duration] = tokens[..] else {
            return Err(self
                .lines
                .malformed(format!("expected 3 fields, found {}", tokens.len())));
        };
        let begin = begin
            .parse::<u64>()
            .map_err(|err| self.lines.malformed(format!("bad start '{begin}': {err}")))?;
        let duration = duration
            .parse::<u64>()
            .map_err(|err| self.lines.malformed(format!("bad duration '{duration}': {err}")))?;
        let activity = match kind {
            "activity" => true,
            "idleness" => false,
            other => {
                return Err(self
                    .lines
                    .malformed(format!("'{other}' is neither activity nor idleness")))
            }
        };

        let begin = Instant::from_secs(begin);
        let duration = Duration::from_secs(duration);
        if begin.checked_add(duration).is_none() {
            return Err(self.lines.malformed("period ends past the end of time"));
        }

        let event = SimEvent::from(Period {
            host: self.host,
            activity,
            duration,
        });
        Ok(Some((begin, event)))
    }

    fn period(&self, activity: bool, duration: Duration) -> SimEvent {
        SimEvent::from(Period {
            host: self.host,
            activity,
            duration,
        })
    }
}

impl<R: BufRead> EventSource<SimEvent> for ActivityTraceSource<R> {
    fn next_event(&mut self) -> SimulationResult<Option<(Instant, SimEvent)>> {
        if let Some(first) = self.first.take() {
            return Ok(Some((self.start, first)));
        }
        Ok(self.parse_next()?)
    }
}

struct Period {
    host: HostId,
    activity: bool,
    duration: Duration,
}

impl From<Period> for SimEvent {
    fn from(period: Period) -> Self {
        let Period {
            host,
            activity,
            duration,
        } = period;
        if activity {
            SimEvent::UserActivity(UserActivity {
                host,
                duration,
                delayable: true,
            })
        } else {
            SimEvent::UserIdleness(UserIdleness {
                host,
                duration,
                delayable: true,
            })
        }
    }
}

fn is_activity(event: &SimEvent) -> bool {
    matches!(event, SimEvent::UserActivity(_))
}

fn lasting(event: &SimEvent) -> Duration {
    event.lasting().map_or(Duration::ZERO, |l| l.duration())
}
