use std::{fmt, ops::Deref};

use chrono::{DateTime, Local};

use crate::{linktype::Linktype, timestamp, Error};

/// A packet as delivered by the engine, borrowed from the engine's buffer.
///
/// The view is only valid until the session's next receive call. Use
/// [`Packet::to_owned`] to keep it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet<'a> {
    /// The packet header provided by pcap, including the timeval, captured length, and packet
    /// length
    pub header: &'a PacketHeader,
    /// The captured packet data
    pub data: &'a [u8],
    /// The link-layer type of the session that captured the packet
    pub linktype: Linktype,
}

impl<'a> Packet<'a> {
    #[doc(hidden)]
    pub fn new(header: &'a PacketHeader, data: &'a [u8], linktype: Linktype) -> Packet<'a> {
        Packet {
            header,
            data,
            linktype,
        }
    }

    /// The capture time in local time.
    pub fn timestamp(&self) -> DateTime<Local> {
        self.header.timestamp()
    }

    /// Copies the view into an owned packet.
    pub fn to_owned(&self) -> CapturedPacket {
        CapturedPacket {
            data: self.data.to_vec(),
            timestamp: self.timestamp(),
            linktype: self.linktype,
        }
    }
}

impl Deref for Packet<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data
    }
}

#[repr(C)]
#[derive(Copy, Clone)]
/// Represents a packet header provided by pcap, including the timeval, caplen and len.
pub struct PacketHeader {
    /// The time when the packet was captured
    pub ts: libc::timeval,
    /// The number of bytes of the packet that are available from the capture
    pub caplen: u32,
    /// The length of the packet, in bytes (which might be more than the number of bytes available
    /// from the capture, if the length of the packet is larger than the maximum number of bytes to
    /// capture)
    pub len: u32,
}

impl PacketHeader {
    /// Builds the header the engine expects for outgoing bytes: both lengths are the byte
    /// count and the timestamp is in UTC.
    pub fn outgoing(timestamp: &DateTime<Local>, len: usize) -> Result<PacketHeader, Error> {
        let len = u32::try_from(len)
            .map_err(|_| Error::InvalidArgument(format!("packet of {} bytes is too long", len)))?;
        Ok(PacketHeader {
            ts: timestamp::to_timeval(timestamp)?,
            caplen: len,
            len,
        })
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        timestamp::to_local(self.ts.tv_sec as i64, self.ts.tv_usec as i64)
    }
}

impl fmt::Debug for PacketHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PacketHeader {{ ts: {}.{:06}, caplen: {}, len: {} }}",
            self.ts.tv_sec, self.ts.tv_usec, self.caplen, self.len
        )
    }
}

impl PartialEq for PacketHeader {
    fn eq(&self, rhs: &PacketHeader) -> bool {
        self.ts.tv_sec == rhs.ts.tv_sec
            && self.ts.tv_usec == rhs.ts.tv_usec
            && self.caplen == rhs.caplen
            && self.len == rhs.len
    }
}

impl Eq for PacketHeader {}

/// An owned packet: bytes, local capture time and link-layer type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPacket {
    pub data: Vec<u8>,
    pub timestamp: DateTime<Local>,
    pub linktype: Linktype,
}

impl CapturedPacket {
    pub fn new<D: Into<Vec<u8>>>(
        data: D,
        timestamp: DateTime<Local>,
        linktype: Linktype,
    ) -> CapturedPacket {
        CapturedPacket {
            data: data.into(),
            timestamp,
            linktype,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The header used when this packet is sent or dumped.
    pub fn header(&self) -> Result<PacketHeader, Error> {
        PacketHeader::outgoing(&self.timestamp, self.data.len())
    }
}

impl Deref for CapturedPacket {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}
