//! Domain events dispatched by the simulation world.
//!
//! Trace readers produce [`UserActivity`], [`UserIdleness`], [`Read`],
//! [`Write`], [`Close`] and [`Unlink`]. Machines schedule [`Sleep`],
//! [`WakeOnLan`] and their own activity/idleness continuations; the metadata
//! server schedules [`UpdateFileReplicas`].

use std::fmt;
use std::time::Duration;

use crate::machine::HostId;

/// Capability of events that describe a period rather than a point in time.
pub trait Lasting {
    /// Length of the period starting at the event's instant.
    fn duration(&self) -> Duration;
}

/// The user starts using the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserActivity {
    /// Target machine.
    pub host: HostId,
    /// Length of the activity period.
    pub duration: Duration,
    /// Whether the machine's accumulated delay shifts this event.
    pub delayable: bool,
}

/// The user leaves the machine alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdleness {
    /// Target machine.
    pub host: HostId,
    /// Length of the idle period.
    pub duration: Duration,
    /// Whether the machine's accumulated delay shifts this event.
    pub delayable: bool,
}

/// Self-scheduled sleep step (idle timeout or end of the going-to-sleep transition).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sleep {
    /// Target machine.
    pub host: HostId,
    /// Length of the requested period.
    pub duration: Duration,
}

/// Out-of-band wake-up signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeOnLan {
    /// Target machine.
    pub host: HostId,
}

/// A client reads from a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Read {
    /// Host running the client.
    pub client: HostId,
    /// File path.
    pub path: String,
    /// Bytes transferred.
    pub bytes: u64,
    /// Time spent in the call.
    pub duration: Duration,
    /// False for reads re-submitted after a wake-on-LAN.
    pub delayable: bool,
}

/// A client appends to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Write {
    /// Host running the client.
    pub client: HostId,
    /// File path.
    pub path: String,
    /// Bytes transferred.
    pub bytes: u64,
    /// File size reported by the trace after the call.
    pub file_size: u64,
    /// Time spent in the call.
    pub duration: Duration,
    /// False for writes re-submitted after a wake-on-LAN.
    pub delayable: bool,
}

/// A client closes a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Close {
    /// Host running the client.
    pub client: HostId,
    /// File path.
    pub path: String,
}

/// A client removes a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unlink {
    /// Host running the client.
    pub client: HostId,
    /// File path.
    pub path: String,
}

/// Debounced replica resynchronization for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateFileReplicas {
    /// File path.
    pub path: String,
}

/// Periodic sample of the cluster's aggregate free space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleFreeSpace {
    /// Sampling period; the event re-schedules itself.
    pub every: Duration,
}

/// Every event the simulation world can carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    /// See [`UserActivity`].
    UserActivity(UserActivity),
    /// See [`UserIdleness`].
    UserIdleness(UserIdleness),
    /// See [`Sleep`].
    Sleep(Sleep),
    /// See [`WakeOnLan`].
    WakeOnLan(WakeOnLan),
    /// See [`Read`].
    Read(Read),
    /// See [`Write`].
    Write(Write),
    /// See [`Close`].
    Close(Close),
    /// See [`Unlink`].
    Unlink(Unlink),
    /// See [`UpdateFileReplicas`].
    UpdateFileReplicas(UpdateFileReplicas),
    /// See [`SampleFreeSpace`].
    SampleFreeSpace(SampleFreeSpace),
}

impl Lasting for UserActivity {
    fn duration(&self) -> Duration {
        self.duration
    }
}

impl Lasting for UserIdleness {
    fn duration(&self) -> Duration {
        self.duration
    }
}

impl Lasting for Sleep {
    fn duration(&self) -> Duration {
        self.duration
    }
}

impl Lasting for Read {
    fn duration(&self) -> Duration {
        self.duration
    }
}

impl Lasting for Write {
    fn duration(&self) -> Duration {
        self.duration
    }
}

impl SimEvent {
    /// Machine whose accumulated delay shifts this event, if it is delayable.
    pub fn delay_target(&self) -> Option<HostId> {
        match self {
            SimEvent::UserActivity(e) if e.delayable => Some(e.host),
            SimEvent::UserIdleness(e) if e.delayable => Some(e.host),
            SimEvent::Read(e) if e.delayable => Some(e.client),
            SimEvent::Write(e) if e.delayable => Some(e.client),
            SimEvent::Close(e) => Some(e.client),
            SimEvent::Unlink(e) => Some(e.client),
            _ => None,
        }
    }

    /// Host the event acts on: the machine for power events, the client for
    /// file-system operations.
    pub fn host(&self) -> Option<HostId> {
        match self {
            SimEvent::UserActivity(UserActivity { host, .. })
            | SimEvent::UserIdleness(UserIdleness { host, .. })
            | SimEvent::Sleep(Sleep { host, .. })
            | SimEvent::WakeOnLan(WakeOnLan { host }) => Some(*host),
            SimEvent::Read(Read { client, .. })
            | SimEvent::Write(Write { client, .. })
            | SimEvent::Close(Close { client, .. })
            | SimEvent::Unlink(Unlink { client, .. }) => Some(*client),
            SimEvent::UpdateFileReplicas(_) | SimEvent::SampleFreeSpace(_) => None,
        }
    }

    /// The period this event describes, for events that carry one.
    pub fn lasting(&self) -> Option<&dyn Lasting> {
        match self {
            SimEvent::UserActivity(e) => Some(e),
            SimEvent::UserIdleness(e) => Some(e),
            SimEvent::Sleep(e) => Some(e),
            SimEvent::Read(e) => Some(e),
            SimEvent::Write(e) => Some(e),
            _ => None,
        }
    }

    /// Short lowercase name used in logs and counters.
    pub fn kind(&self) -> &'static str {
        match self {
            SimEvent::UserActivity(_) => "activity",
            SimEvent::UserIdleness(_) => "idleness",
            SimEvent::Sleep(_) => "sleep",
            SimEvent::WakeOnLan(_) => "wakeOnLan",
            SimEvent::Read(_) => "read",
            SimEvent::Write(_) => "write",
            SimEvent::Close(_) => "close",
            SimEvent::Unlink(_) => "unlink",
            SimEvent::UpdateFileReplicas(_) => "updateFileReplicas",
            SimEvent::SampleFreeSpace(_) => "sampleFreeSpace",
        }
    }
}

impl fmt::Display for SimEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind();
        match self {
            SimEvent::UserActivity(UserActivity { host, duration, .. })
            | SimEvent::UserIdleness(UserIdleness { host, duration, .. })
            | SimEvent::Sleep(Sleep { host, duration }) => {
                write!(f, "{kind}\t{duration:?}\t{host}")
            }
            SimEvent::WakeOnLan(WakeOnLan { host }) => write!(f, "{kind}\t{host}"),
            SimEvent::Read(e) => write!(f, "{kind}\t{}\t{}\t{}", e.path, e.bytes, e.client),
            SimEvent::Write(e) => write!(
                f,
                "{kind}\t{}\t{}\t{}\t{}",
                e.path, e.bytes, e.file_size, e.client
            ),
            SimEvent::Close(Close { client, path }) | SimEvent::Unlink(Unlink { client, path }) => {
                write!(f, "{kind}\t{path}\t{client}")
            }
            SimEvent::UpdateFileReplicas(e) => write!(f, "{kind}\t{}", e.path),
            SimEvent::SampleFreeSpace(e) => write!(f, "{kind}\t{:?}", e.every),
        }
    }
}
