use beefsim_kernel::Interval;

use crate::machine::{HostId, Machine};

/// Storage service running on one machine.
#[derive(Debug)]
pub struct DataServer {
    machine: Machine,
    capacity: u64,
    used: u64,
    read_intervals: Vec<Interval>,
    write_intervals: Vec<Interval>,
}

impl DataServer {
    /// Creates an empty data server with `capacity` bytes of disk.
    pub fn new(machine: Machine, capacity: u64) -> Self {
        Self {
            machine,
            capacity,
            used: 0,
            read_intervals: Vec::new(),
            write_intervals: Vec::new(),
        }
    }

    /// Host index, shared with the machine.
    pub fn id(&self) -> HostId {
        self.machine.id()
    }

    /// The hosting machine.
    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    /// Mutable access to the hosting machine.
    pub fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }

    /// Disk capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes reserved by primaries and replicas.
    pub fn used(&self) -> u64 {
        self.used
    }

    /// `capacity - used`. `used` never exceeds `capacity`.
    pub fn free_space(&self) -> u64 {
        self.capacity - self.used
    }

    /// Reserves `bytes` if they fit. Nothing is reserved otherwise.
    pub(crate) fn use_disk(&mut self, bytes: u64) -> bool {
        if bytes > self.free_space() {
            return false;
        }
        self.used += bytes;
        true
    }

    pub(crate) fn clean_disk(&mut self, bytes: u64) {
        self.used = self.used.saturating_sub(bytes);
    }

    /// Logs a period during which this server served a read as primary.
    pub fn record_read(&mut self, interval: Interval) {
        self.read_intervals.push(interval);
    }

    /// Logs a period during which this server served a write as primary.
    pub fn record_write(&mut self, interval: Interval) {
        self.write_intervals.push(interval);
    }

    /// Periods spent serving reads.
    pub fn read_intervals(&self) -> &[Interval] {
        &self.read_intervals
    }

    /// Periods spent serving writes.
    pub fn write_intervals(&self) -> &[Interval] {
        &self.write_intervals
    }
}
