use libc::c_int;

use super::{CaptureSession, Source};
use crate::{
    sendqueue::{SendBatch, SendSync},
    Error,
};

impl CaptureSession {
    /// Sends raw bytes, link-layer header included, on the interface.
    ///
    /// An empty buffer is not sent at all.
    pub fn send_packet(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.is_empty() {
            return Ok(());
        }
        let len = c_int::try_from(data.len()).map_err(|_| {
            Error::InvalidArgument(format!("packet of {} bytes is too long", data.len()))
        })?;
        match self
            .engine()
            .pcap_sendpacket(self.as_ptr(), data.as_ptr(), len)
        {
            0 => Ok(()),
            _ => Err(Error::Transmit(self.diagnostic("Failed writing to device"))),
        }
    }

    /// Sends every packet of `batch` in one call.
    ///
    /// Anything short of the whole batch is an [`Error::Transmit`]. The batch keeps its
    /// contents and can be transmitted again.
    pub fn transmit(&mut self, batch: &SendBatch, sync: SendSync) -> Result<(), Error> {
        if self.source == Source::Offline {
            return Err(Error::NotSupported(
                "transmitting on an offline session".to_string(),
            ));
        }
        let expected = batch.len();
        let sent = self
            .engine()
            .pcap_sendqueue_transmit(self.as_ptr(), batch.as_ptr(), sync as c_int)
            .ok_or_else(|| Error::NotSupported("send queues".to_string()))?;
        if (sent as usize) < expected {
            return Err(Error::Transmit(self.diagnostic(format!(
                "Failed transmitting packets: {} of {} bytes sent",
                sent, expected
            ))));
        }
        debug!(
            "{}: transmitted {} packets ({} bytes, sync {:?})",
            self.name,
            batch.packet_count(),
            expected,
            sync
        );
        Ok(())
    }
}
