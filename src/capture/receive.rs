//! Receiving from a session: one unit at a time, one buffer at a time, or a fixed count.
//!
//! Packets are handed out as [`Packet`] views into the engine's buffer. In
//! [`Mode::Statistics`] the same operations return [`StatisticsSample`]s instead.

use std::{
    any::Any,
    panic::{catch_unwind, resume_unwind, AssertUnwindSafe},
    ptr, slice,
    sync::{Arc, Weak},
};

use libc::{c_int, c_uchar};

use super::{CaptureSession, Mode, PcapHandle, Source};
use crate::{
    packet::{Packet, PacketHeader},
    raw,
    stats::StatisticsSample,
    Error,
};

/// How a receive call ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveResult {
    /// The requested items were delivered.
    Ok,
    /// The read timeout elapsed with nothing to deliver (live sessions only).
    Timeout,
    /// The capture file has no more packets.
    Eof,
    /// A break request stopped the call.
    BreakLoop,
}

// Lets the engine call a Rust closure: `callback` is passed as the `pcap_handler` and a pointer
// to the `HandlerFn` as its user argument.
struct HandlerFn<F> {
    func: F,
    delivered: usize,
    panic_payload: Option<Box<dyn Any + Send>>,
    handle: Arc<PcapHandle>,
}

impl<F> HandlerFn<F>
where
    F: FnMut(&PacketHeader, &[u8]),
{
    fn new(handle: Arc<PcapHandle>, func: F) -> HandlerFn<F> {
        HandlerFn {
            func,
            delivered: 0,
            panic_payload: None,
            handle,
        }
    }

    extern "C" fn callback(
        slf: *mut c_uchar,
        header: *const raw::pcap_pkthdr,
        packet: *const c_uchar,
    ) {
        unsafe {
            let slf = &mut *(slf as *mut Self);
            if slf.panic_payload.is_some() {
                return;
            }
            let header = &*(header as *const PacketHeader);
            let data = bytes(packet, header.caplen);
            slf.delivered += 1;

            // A panic must not unwind through the engine. Catch it, stop the loop and resume it
            // once the engine has returned.
            let func = &mut slf.func;
            if let Err(e) = catch_unwind(AssertUnwindSafe(|| func(header, data))) {
                slf.panic_payload = Some(e);
                slf.handle.engine().pcap_breakloop(slf.handle.as_ptr());
            }
        }
    }

    fn user(&mut self) -> *mut c_uchar {
        self as *mut Self as *mut c_uchar
    }

    /// Number of items delivered, re-raising a panic from the closure.
    fn finish(self) -> usize {
        if let Some(e) = self.panic_payload {
            resume_unwind(e);
        }
        self.delivered
    }
}

unsafe fn bytes<'a>(data: *const c_uchar, caplen: u32) -> &'a [u8] {
    if data.is_null() || caplen == 0 {
        &[]
    } else {
        slice::from_raw_parts(data, caplen as usize)
    }
}

fn count_arg(count: usize) -> Result<c_int, Error> {
    c_int::try_from(count)
        .map_err(|_| Error::InvalidArgument(format!("cannot request {} items at once", count)))
}

impl CaptureSession {
    fn expect_mode(&self, expected: Mode) -> Result<(), Error> {
        if self.mode == expected {
            Ok(())
        } else {
            Err(Error::WrongMode {
                expected,
                actual: self.mode,
            })
        }
    }

    fn next_ex(&mut self) -> Result<(ReceiveResult, Option<(&PacketHeader, &[u8])>), Error> {
        let mut header: *mut raw::pcap_pkthdr = ptr::null_mut();
        let mut data: *const c_uchar = ptr::null();
        match self
            .engine()
            .pcap_next_ex(self.as_ptr(), &mut header, &mut data)
        {
            1 => unsafe {
                let header = &*(header as *const PacketHeader);
                Ok((ReceiveResult::Ok, Some((header, bytes(data, header.caplen)))))
            },
            0 => Ok((ReceiveResult::Timeout, None)),
            -2 => Ok((ReceiveResult::Eof, None)),
            _ => Err(Error::Read(self.diagnostic("Failed reading from device"))),
        }
    }

    fn dispatch<F>(&mut self, max: Option<usize>, func: F) -> Result<(usize, ReceiveResult), Error>
    where
        F: FnMut(&PacketHeader, &[u8]),
    {
        let cnt = match max {
            // pcap_dispatch would read a whole buffer for 0; read nothing instead.
            Some(0) => return Ok((0, ReceiveResult::Ok)),
            Some(max) => count_arg(max)?,
            None => -1,
        };

        let mut handler = HandlerFn::new(self.handle.clone(), func);
        let callback: raw::pcap_handler = Some(HandlerFn::<F>::callback);
        let status = self
            .engine()
            .pcap_dispatch(self.as_ptr(), cnt, callback, handler.user());
        let delivered = handler.finish();

        match status {
            raw::PCAP_ERROR_BREAK => Ok((delivered, ReceiveResult::BreakLoop)),
            status if status < 0 => {
                Err(Error::Read(self.diagnostic("Failed reading from device")))
            }
            0 if self.source == Source::Offline => Ok((delivered, ReceiveResult::Eof)),
            _ => Ok((delivered, ReceiveResult::Ok)),
        }
    }

    fn run_loop<F>(&mut self, count: Option<usize>, func: F) -> Result<ReceiveResult, Error>
    where
        F: FnMut(&PacketHeader, &[u8]),
    {
        let cnt = match count {
            // pcap_loop would run forever for 0.
            Some(0) => return Ok(ReceiveResult::Ok),
            Some(count) => count_arg(count)?,
            None => -1,
        };

        let mut handler = HandlerFn::new(self.handle.clone(), func);
        let callback: raw::pcap_handler = Some(HandlerFn::<F>::callback);
        let status = self
            .engine()
            .pcap_loop(self.as_ptr(), cnt, callback, handler.user());
        let delivered = handler.finish();

        match status {
            raw::PCAP_ERROR_BREAK => Ok(ReceiveResult::BreakLoop),
            0 if count != Some(delivered) => Ok(ReceiveResult::Eof),
            0 => Ok(ReceiveResult::Ok),
            _ => Err(Error::Read(self.diagnostic("Failed reading from device"))),
        }
    }

    /// Reads one packet.
    ///
    /// The packet borrows the engine's buffer and is valid until the next receive call.
    /// Needs [`Mode::Capture`].
    pub fn receive_packet(&mut self) -> Result<(ReceiveResult, Option<Packet<'_>>), Error> {
        self.expect_mode(Mode::Capture)?;
        let linktype = self.linktype();
        let (result, unit) = self.next_ex()?;
        Ok((
            result,
            unit.map(|(header, data)| Packet::new(header, data, linktype)),
        ))
    }

    /// Delivers the packets of at most one engine buffer to `handler`, in arrival order.
    ///
    /// `max` caps the count; `None` takes everything available. Returns how many packets
    /// were delivered. Zero with [`ReceiveResult::Ok`] is normal on a live session (nothing
    /// arrived, or everything was filtered out); zero on a capture file is
    /// [`ReceiveResult::Eof`]. A break requested before the first packet gives
    /// [`ReceiveResult::BreakLoop`]; one requested later lets the call return normally and
    /// makes the next call return `BreakLoop`.
    pub fn receive_batch<F>(
        &mut self,
        max: Option<usize>,
        mut handler: F,
    ) -> Result<(usize, ReceiveResult), Error>
    where
        F: FnMut(Packet<'_>),
    {
        self.expect_mode(Mode::Capture)?;
        let linktype = self.linktype();
        self.dispatch(max, |header, data| {
            handler(Packet::new(header, data, linktype))
        })
    }

    /// Delivers packets to `handler` until `count` have been delivered (`None` runs until
    /// stopped).
    ///
    /// Read timeouts do not end the call. It ends early with [`ReceiveResult::Eof`] when a
    /// capture file runs out and with [`ReceiveResult::BreakLoop`] on a break request; at
    /// most one more packet is delivered after the request.
    pub fn receive_exactly<F>(
        &mut self,
        count: Option<usize>,
        mut handler: F,
    ) -> Result<ReceiveResult, Error>
    where
        F: FnMut(Packet<'_>),
    {
        self.expect_mode(Mode::Capture)?;
        let linktype = self.linktype();
        self.run_loop(count, |header, data| {
            handler(Packet::new(header, data, linktype))
        })
    }

    /// Reads one statistics sample. Needs [`Mode::Statistics`].
    pub fn receive_statistics(
        &mut self,
    ) -> Result<(ReceiveResult, Option<StatisticsSample>), Error> {
        self.expect_mode(Mode::Statistics)?;
        let (result, unit) = self.next_ex()?;
        let sample = unit
            .map(|(header, data)| StatisticsSample::from_record(header, data))
            .transpose()?;
        Ok((result, sample))
    }

    /// [`receive_batch`](Self::receive_batch) for statistics samples.
    pub fn receive_statistics_batch<F>(
        &mut self,
        max: Option<usize>,
        mut handler: F,
    ) -> Result<(usize, ReceiveResult), Error>
    where
        F: FnMut(StatisticsSample),
    {
        self.expect_mode(Mode::Statistics)?;
        let mut malformed = None;
        let received = self.dispatch(max, |header, data| {
            match StatisticsSample::from_record(header, data) {
                Ok(sample) => handler(sample),
                Err(e) => {
                    malformed.get_or_insert(e);
                }
            }
        })?;
        malformed.map_or(Ok(received), Err)
    }

    /// [`receive_exactly`](Self::receive_exactly) for statistics samples.
    pub fn receive_statistics_exactly<F>(
        &mut self,
        count: Option<usize>,
        mut handler: F,
    ) -> Result<ReceiveResult, Error>
    where
        F: FnMut(StatisticsSample),
    {
        self.expect_mode(Mode::Statistics)?;
        let mut malformed = None;
        let result = self.run_loop(count, |header, data| {
            match StatisticsSample::from_record(header, data) {
                Ok(sample) => handler(sample),
                Err(e) => {
                    malformed.get_or_insert(e);
                }
            }
        })?;
        malformed.map_or(Ok(result), Err)
    }

    /// Asks the running or next batch/loop receive call to stop early.
    pub fn request_break(&self) {
        self.engine().pcap_breakloop(self.as_ptr());
    }

    /// A handle other threads can use to stop this session's receive calls.
    ///
    /// ```no_run
    /// use pcap_session::{CaptureSession, LiveOptions};
    ///
    /// let mut session = CaptureSession::open_live("eth0", &LiveOptions::default()).unwrap();
    /// let breaker = session.break_handle();
    ///
    /// std::thread::spawn(move || {
    ///     std::thread::sleep(std::time::Duration::from_secs(1));
    ///     breaker.request_break();
    /// });
    ///
    /// session.receive_exactly(None, |packet| println!("{:?}", packet)).unwrap();
    /// ```
    pub fn break_handle(&self) -> BreakHandle {
        BreakHandle {
            handle: Arc::downgrade(self.handle()),
        }
    }
}

/// Stops a session's receive calls from any thread.
///
/// Requests are level-triggered: the flag stays set until a receive call reports
/// [`ReceiveResult::BreakLoop`]. See <https://www.tcpdump.org/manpages/pcap_breakloop.3pcap.html>
/// for how each platform wakes a blocked read.
#[derive(Clone)]
pub struct BreakHandle {
    handle: Weak<PcapHandle>,
}

unsafe impl Send for BreakHandle {}
unsafe impl Sync for BreakHandle {}

impl BreakHandle {
    /// Calls `pcap_breakloop` on the session. Does nothing once the session is closed.
    ///
    /// Signal handlers should defer this call to a thread: the session may be closing
    /// concurrently.
    pub fn request_break(&self) {
        if let Some(handle) = self.handle.upgrade() {
            handle.engine().pcap_breakloop(handle.as_ptr());
        }
    }
}
