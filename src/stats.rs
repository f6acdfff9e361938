//! Statistics values: per-interval samples from statistics mode and cumulative counters.

use std::convert::TryInto;

use chrono::{DateTime, Local};

use crate::{packet::PacketHeader, Diagnostic, Error};

const SAMPLE_LEN: usize = 16;

/// One statistics-mode record: traffic accepted by the kernel filter during an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatisticsSample {
    timestamp: DateTime<Local>,
    accepted_packets: u64,
    accepted_bytes: u64,
}

impl StatisticsSample {
    pub fn new(timestamp: DateTime<Local>, accepted_packets: u64, accepted_bytes: u64) -> Self {
        StatisticsSample {
            timestamp,
            accepted_packets,
            accepted_bytes,
        }
    }

    /// Decodes a record: packets then bytes, both 64-bit in host byte order.
    pub(crate) fn from_record(header: &PacketHeader, data: &[u8]) -> Result<Self, Error> {
        if data.len() < SAMPLE_LEN {
            return Err(Error::Read(Diagnostic::new(
                format!(
                    "statistics record is {} bytes, expected {}",
                    data.len(),
                    SAMPLE_LEN
                ),
                None,
            )));
        }
        let counter = |at: usize| {
            let bytes: [u8; 8] = data[at..at + 8].try_into().unwrap_or_default();
            u64::from_ne_bytes(bytes)
        };
        Ok(StatisticsSample {
            timestamp: header.timestamp(),
            accepted_packets: counter(0),
            accepted_bytes: counter(8),
        })
    }

    /// End of the sampling interval, in local time.
    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn accepted_packets(&self) -> u64 {
        self.accepted_packets
    }

    pub fn accepted_bytes(&self) -> u64 {
        self.accepted_bytes
    }
}

/// Counters accumulated by the engine since the session was opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CumulativeStatistics {
    /// Packets received by the interface.
    pub received: u32,
    /// Packets dropped because the driver ran out of buffer space.
    pub dropped_by_driver: u32,
    /// Packets dropped by the interface.
    pub dropped_by_interface: u32,
    /// Packets that reached the application; 0 when the engine does not report it.
    pub captured: u32,
}
