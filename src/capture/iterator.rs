use std::collections::VecDeque;

use super::{receive::ReceiveResult, CaptureSession};
use crate::{packet::CapturedPacket, Error};

/// Packets of a session as an [`Iterator`], read one engine buffer at a time.
///
/// Created by [`CaptureSession::packets`]. Iteration ends when the requested count is
/// reached or a batch read ends with anything other than [`ReceiveResult::Ok`];
/// [`PacketIter::result`] tells which. Because whole buffers are read ahead, a break
/// requested while iterating takes effect only after the packets already read are yielded.
pub struct PacketIter<'s> {
    session: &'s mut CaptureSession,
    remaining: Option<usize>,
    buffered: VecDeque<CapturedPacket>,
    result: Option<ReceiveResult>,
    failure: Option<Error>,
    failed: bool,
}

impl<'s> PacketIter<'s> {
    pub(crate) fn new(session: &'s mut CaptureSession, count: Option<usize>) -> PacketIter<'s> {
        PacketIter {
            session,
            remaining: count,
            buffered: VecDeque::new(),
            result: None,
            failure: None,
            failed: false,
        }
    }

    /// How iteration ended: `None` while it can still read, or after an error.
    pub fn result(&self) -> Option<ReceiveResult> {
        self.result
    }

    /// Returns a mutable reference to the inner session.
    pub fn session_mut(&mut self) -> &mut CaptureSession {
        &mut *self.session
    }

    fn fill(&mut self) {
        let buffered = &mut self.buffered;
        match self
            .session
            .receive_batch(self.remaining, |packet| buffered.push_back(packet.to_owned()))
        {
            Ok((delivered, result)) => {
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining = remaining.saturating_sub(delivered);
                }
                if result != ReceiveResult::Ok {
                    self.result = Some(result);
                } else if self.remaining == Some(0) {
                    self.result = Some(ReceiveResult::Ok);
                }
            }
            Err(e) => {
                self.failure = Some(e);
                self.failed = true;
            }
        }
    }
}

impl Iterator for PacketIter<'_> {
    type Item = Result<CapturedPacket, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(packet) = self.buffered.pop_front() {
                return Some(Ok(packet));
            }
            if self.failed {
                return self.failure.take().map(Err);
            }
            if self.result.is_some() {
                return None;
            }
            if self.remaining == Some(0) {
                self.result = Some(ReceiveResult::Ok);
                return None;
            }
            self.fill();
        }
    }
}

impl CaptureSession {
    /// Iterates over up to `count` packets (`None` for no limit), copying each one out of
    /// the engine's buffer.
    ///
    /// ```no_run
    /// use pcap_session::CaptureSession;
    ///
    /// let mut session = CaptureSession::from_file("trace.pcap").unwrap();
    /// for packet in session.packets(Some(100)) {
    ///     let packet = packet.unwrap();
    ///     println!("{} bytes at {}", packet.len(), packet.timestamp);
    /// }
    /// ```
    pub fn packets(&mut self, count: Option<usize>) -> PacketIter<'_> {
        PacketIter::new(self, count)
    }
}
