//! Send batches: packets queued in userland and transmitted with one call.
//!
//! Sending packets one by one costs a user-to-kernel transition per packet. A [`SendBatch`]
//! collects them in a fixed-size native buffer instead and
//! [`CaptureSession::transmit`](crate::CaptureSession::transmit) hands the whole buffer to
//! the driver at once. Send queues are a WinPcap/Npcap extension; elsewhere creating a batch
//! fails with [`Error::NotSupported`].

use std::{mem, ptr::NonNull, sync::Arc};

use libc::c_uint;

use crate::{
    packet::{CapturedPacket, Packet, PacketHeader},
    raw::{self, Engine},
    Diagnostic, Error,
};

/// Whether a transmission follows the packets' timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendSync {
    /// Ignore timestamps; send packets as quickly as possible.
    Off = 0,

    /// Use the time difference between packets as the delay between transmissions.
    ///
    /// # Notes
    /// The driver may implement the delay as a busy-wait loop.
    On = 1,
}

impl From<bool> for SendSync {
    fn from(synchronized: bool) -> SendSync {
        if synchronized {
            SendSync::On
        } else {
            SendSync::Off
        }
    }
}

/// A fixed-capacity batch of packets for [`CaptureSession::transmit`](crate::CaptureSession::transmit).
///
/// Every packet takes its bytes plus a packet header of [`SendBatch::HEADER_LEN`] bytes.
/// The capacity never grows.
///
/// ```no_run
/// use pcap_session::{CaptureSession, CapturedPacket, LiveOptions, Linktype, SendBatch, SendSync};
///
/// let mut session = CaptureSession::open_live("eth0", &LiveOptions::default()).unwrap();
/// let mut batch = SendBatch::new(64 * 1024).unwrap();
/// for _ in 0..10 {
///     let packet = CapturedPacket::new(vec![0u8; 60], chrono::Local::now(), Linktype::ETHERNET);
///     batch.enqueue(&packet).unwrap();
/// }
/// session.transmit(&batch, SendSync::Off).unwrap();
/// ```
pub struct SendBatch {
    engine: Arc<dyn Engine>,
    queue: NonNull<raw::pcap_send_queue>,
    packet_count: usize,
}

// The queue is owned by the batch and only touched through `&self`/`&mut self`.
unsafe impl Send for SendBatch {}

impl SendBatch {
    /// Bytes of bookkeeping the native queue stores in front of every packet.
    pub const HEADER_LEN: usize = mem::size_of::<raw::pcap_pkthdr>();

    /// Allocates a batch that holds `capacity` bytes of headers and packet data.
    pub fn new(capacity: u32) -> Result<SendBatch, Error> {
        SendBatch::with_engine(raw::engine()?, capacity)
    }

    pub(crate) fn with_engine(engine: Arc<dyn Engine>, capacity: u32) -> Result<SendBatch, Error> {
        let queue = engine
            .pcap_sendqueue_alloc(capacity as c_uint)
            .ok_or_else(|| Error::NotSupported("send queues".to_string()))?;
        let queue = NonNull::new(queue).ok_or_else(|| {
            Error::Transmit(Diagnostic::new(
                format!("Unable to allocate a send queue of {} bytes", capacity),
                None,
            ))
        })?;
        debug!("allocated send batch of {} bytes", capacity);
        Ok(SendBatch {
            engine,
            queue,
            packet_count: 0,
        })
    }

    fn native(&self) -> &raw::pcap_send_queue {
        unsafe { self.queue.as_ref() }
    }

    pub(crate) fn as_ptr(&self) -> *mut raw::pcap_send_queue {
        self.queue.as_ptr()
    }

    /// Total room in bytes.
    pub fn capacity(&self) -> usize {
        self.native().maxlen as usize
    }

    /// Bytes used, headers included.
    pub fn len(&self) -> usize {
        self.native().len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of packets enqueued.
    pub fn packet_count(&self) -> usize {
        self.packet_count
    }

    /// Appends a packet; its timestamp paces synchronized transmissions.
    ///
    /// Fails with [`Error::CapacityExceeded`] when the packet does not fit, leaving the
    /// batch as it was.
    pub fn enqueue(&mut self, packet: &CapturedPacket) -> Result<(), Error> {
        let header = packet.header()?;
        self.enqueue_raw(&header, &packet.data)
    }

    /// Appends a received packet as it was captured, header included.
    pub fn enqueue_packet(&mut self, packet: &Packet<'_>) -> Result<(), Error> {
        self.enqueue_raw(packet.header, packet.data)
    }

    fn enqueue_raw(&mut self, header: &PacketHeader, data: &[u8]) -> Result<(), Error> {
        if (header.caplen as usize) > data.len() {
            return Err(Error::InvalidArgument(format!(
                "captured length {} exceeds the {} bytes given",
                header.caplen,
                data.len()
            )));
        }
        let needed = SendBatch::HEADER_LEN + header.caplen as usize;
        let available = self.capacity() - self.len();
        if needed > available {
            return Err(Error::CapacityExceeded { needed, available });
        }

        let status = self
            .engine
            .pcap_sendqueue_queue(
                self.as_ptr(),
                header as *const PacketHeader as *const raw::pcap_pkthdr,
                data.as_ptr(),
            )
            .ok_or_else(|| Error::NotSupported("send queues".to_string()))?;
        if status != 0 {
            return Err(Error::CapacityExceeded { needed, available });
        }

        self.packet_count += 1;
        debug!(
            "send batch: {} packets, {}% of {} bytes used",
            self.packet_count,
            self.len() * 100 / self.capacity().max(1),
            self.capacity()
        );
        Ok(())
    }
}

impl Drop for SendBatch {
    fn drop(&mut self) {
        self.engine.pcap_sendqueue_destroy(self.queue.as_ptr());
    }
}
