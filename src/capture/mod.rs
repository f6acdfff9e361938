pub mod iterator;
pub mod options;
pub mod receive;
mod transmit;

use std::{
    ffi::CString,
    net::Ipv4Addr,
    path::Path,
    ptr::{self, NonNull},
    sync::Arc,
    time::Duration,
};

use libc::{c_int, c_uint};

use crate::{
    cstr_to_string,
    filter::FilterProgram,
    linktype::Linktype,
    path_to_cstring,
    raw::{self, Engine},
    savefile::DumpWriter,
    stats::CumulativeStatistics,
    with_errbuf, Diagnostic, Error,
};

use self::options::{LiveOptions, OpenFlags};

/// What the engine hands back from a session.
///
/// The numeric values are the ones `pcap_setmode` takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Packets are delivered to the application.
    Capture = 0x00,
    /// Only traffic counters are delivered, computed in the kernel.
    Statistics = 0x01,
    /// Kernel monitoring.
    KernelMonitor = 0x02,
    /// Packets are dumped by the kernel without reaching the application.
    KernelDump = 0x10,
}

/// Where a session's traffic comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Live,
    Offline,
}

/// Which packets the driver passes up when sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMethod {
    /// Every packet.
    None,
    /// One packet out of every `n`.
    OneEveryN(u32),
    /// The first packet after each interval elapses.
    FirstAfterInterval(Duration),
}

impl SamplingMethod {
    fn to_native(self) -> Result<raw::pcap_samp, Error> {
        let (method, value) = match self {
            SamplingMethod::None => (0, 0),
            SamplingMethod::OneEveryN(0) => {
                return Err(Error::InvalidArgument(
                    "sampling count must be positive".to_string(),
                ))
            }
            SamplingMethod::OneEveryN(n) => (1, n as u128),
            SamplingMethod::FirstAfterInterval(interval) => (2, interval.as_millis()),
        };
        let value = c_int::try_from(value).map_err(|_| {
            Error::InvalidArgument(format!("sampling value {} is out of range", value))
        })?;
        Ok(raw::pcap_samp { method, value })
    }
}

/// An open native handle. Closes itself when dropped.
pub(crate) struct PcapHandle {
    engine: Arc<dyn Engine>,
    handle: NonNull<raw::pcap_t>,
}

impl PcapHandle {
    pub(crate) fn new(engine: Arc<dyn Engine>, handle: NonNull<raw::pcap_t>) -> PcapHandle {
        PcapHandle { engine, handle }
    }

    /// A handle that reads nothing, used to compile filters and write dump files.
    pub(crate) fn open_dead(
        engine: Arc<dyn Engine>,
        linktype: Linktype,
        snaplen: i32,
    ) -> Result<PcapHandle, Error> {
        let handle = NonNull::new(engine.pcap_open_dead(linktype.0, snaplen)).ok_or_else(|| {
            Error::Configuration(Diagnostic::new(
                format!("Unable to open a dead handle for {}", linktype),
                None,
            ))
        })?;
        Ok(PcapHandle::new(engine, handle))
    }

    pub(crate) fn as_ptr(&self) -> *mut raw::pcap_t {
        self.handle.as_ptr()
    }

    pub(crate) fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Pairs `summary` with the handle's last native error.
    pub(crate) fn diagnostic<S: Into<String>>(&self, summary: S) -> Diagnostic {
        let native = unsafe { cstr_to_string(self.engine.pcap_geterr(self.as_ptr())) };
        Diagnostic::new(summary, native)
    }
}

// `PcapHandle` owns the `pcap_t` for its whole lifetime. Only `pcap_breakloop` may be called on it
// from another thread; the wrapping types enforce that.
unsafe impl Send for PcapHandle {}

impl Drop for PcapHandle {
    fn drop(&mut self) {
        trace!("closing pcap handle {:p}", self.handle);
        self.engine.pcap_close(self.handle.as_ptr());
    }
}

/// A capture session over one native handle, opened from a live interface or a file.
///
/// The session receives packets ([`receive`](receive) operations), sends them, installs
/// filters and reports statistics. Receive operations and setters take `&mut self`, so the
/// mode can never change while a receive call is running. A session is closed when it is
/// dropped or passed to [`close`](CaptureSession::close).
///
/// ```no_run
/// use pcap_session::{CaptureSession, ReceiveResult};
///
/// let mut session = CaptureSession::from_file("trace.pcap").unwrap();
/// loop {
///     match session.receive_packet().unwrap() {
///         (ReceiveResult::Ok, Some(packet)) => println!("{} bytes", packet.len()),
///         (ReceiveResult::Eof, _) => break,
///         _ => {}
///     }
/// }
/// ```
pub struct CaptureSession {
    handle: Arc<PcapHandle>,
    name: String,
    source: Source,
    mode: Mode,
    netmask: Option<Ipv4Addr>,
}

// `CaptureSession` is not Sync: the engine does not promise concurrent access to one handle.
unsafe impl Send for CaptureSession {}

impl CaptureSession {
    #[allow(clippy::arc_with_non_send_sync)]
    fn from_handle(
        handle: PcapHandle,
        name: String,
        source: Source,
        netmask: Option<Ipv4Addr>,
    ) -> CaptureSession {
        debug!("opened {:?} session on {}", source, name);
        CaptureSession {
            handle: Arc::new(handle),
            name,
            source,
            mode: Mode::Capture,
            netmask,
        }
    }

    /// Opens a live interface, or a remote source where the engine supports it.
    pub fn open_live(source: &str, options: &LiveOptions) -> Result<CaptureSession, Error> {
        CaptureSession::open_live_with(raw::engine()?, source, options)
    }

    pub(crate) fn open_live_with(
        engine: Arc<dyn Engine>,
        source: &str,
        options: &LiveOptions,
    ) -> Result<CaptureSession, Error> {
        let name = CString::new(source)?;
        let open_error = |message: Option<String>| Error::DeviceOpen {
            device: source.to_string(),
            message: message.unwrap_or_else(|| "unknown error".to_string()),
        };
        let mut auth = options.auth.as_ref().map(|a| a.to_native()).transpose()?;

        let handle = with_errbuf(|err| {
            let auth_ptr = auth.as_mut().map_or(ptr::null_mut(), |a| a.as_mut_ptr());
            let opened = engine.pcap_open(
                name.as_ptr(),
                options.snaplen,
                options.flags.bits(),
                options.read_timeout,
                auth_ptr,
                err,
            );
            match opened {
                Some(handle) => NonNull::new(handle)
                    .map(|handle| PcapHandle::new(engine.clone(), handle))
                    .ok_or_else(|| open_error(unsafe { cstr_to_string(err) })),
                None if options.auth.is_some() => Err(Error::NotSupported(
                    "remote authentication with this pcap library".to_string(),
                )),
                None => {
                    let handle = NonNull::new(engine.pcap_create(name.as_ptr(), err))
                        .ok_or_else(|| open_error(unsafe { cstr_to_string(err) }))?;
                    activate(PcapHandle::new(engine.clone(), handle), source, options)
                }
            }
        })?;

        Ok(CaptureSession::from_handle(
            handle,
            source.to_string(),
            Source::Live,
            options.netmask,
        ))
    }

    /// Opens a capture file for reading.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<CaptureSession, Error> {
        CaptureSession::from_file_with(raw::engine()?, path.as_ref())
    }

    pub(crate) fn from_file_with(
        engine: Arc<dyn Engine>,
        path: &Path,
    ) -> Result<CaptureSession, Error> {
        let display = path.display().to_string();
        let name = path_to_cstring(path)?;

        let handle = with_errbuf(|err| {
            NonNull::new(engine.pcap_open_offline(name.as_ptr(), err))
                .map(|handle| PcapHandle::new(engine.clone(), handle))
                .ok_or_else(|| Error::DeviceOpen {
                    device: display.clone(),
                    message: unsafe { cstr_to_string(err) }
                        .unwrap_or_else(|| "unknown error".to_string()),
                })
        })?;

        Ok(CaptureSession::from_handle(
            handle,
            display,
            Source::Offline,
            None,
        ))
    }

    #[cfg(test)]
    pub(crate) fn from_raw(
        engine: Arc<dyn Engine>,
        handle: NonNull<raw::pcap_t>,
        source: Source,
        netmask: Option<Ipv4Addr>,
    ) -> CaptureSession {
        CaptureSession::from_handle(
            PcapHandle::new(engine, handle),
            "test".to_string(),
            source,
            netmask,
        )
    }

    pub(crate) fn handle(&self) -> &Arc<PcapHandle> {
        &self.handle
    }

    pub(crate) fn engine(&self) -> &dyn Engine {
        &**self.handle.engine()
    }

    fn as_ptr(&self) -> *mut raw::pcap_t {
        self.handle.as_ptr()
    }

    pub(crate) fn diagnostic<S: Into<String>>(&self, summary: S) -> Diagnostic {
        self.handle.diagnostic(summary)
    }

    fn check_config<S: Into<String>>(&self, status: c_int, summary: S) -> Result<(), Error> {
        if status == 0 {
            Ok(())
        } else {
            Err(Error::Configuration(self.diagnostic(summary)))
        }
    }

    /// The interface name or file path the session was opened on.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> Source {
        self.source
    }

    /// The netmask used when compiling filters for this session, if known.
    pub fn netmask(&self) -> Option<Ipv4Addr> {
        self.netmask
    }

    pub fn snapshot_length(&self) -> i32 {
        self.engine().pcap_snapshot(self.as_ptr())
    }

    pub fn linktype(&self) -> Linktype {
        Linktype(self.engine().pcap_datalink(self.as_ptr()))
    }

    pub fn set_linktype(&mut self, linktype: Linktype) -> Result<(), Error> {
        let status = self.engine().pcap_set_datalink(self.as_ptr(), linktype.0);
        self.check_config(status, format!("Failed setting datalink {}", linktype))
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switches between capture, statistics and the kernel modes.
    ///
    /// Engines without `pcap_setmode` only support [`Mode::Capture`].
    pub fn set_mode(&mut self, mode: Mode) -> Result<(), Error> {
        match self.engine().pcap_setmode(self.as_ptr(), mode as c_int) {
            Some(0) => {}
            Some(_) => {
                return Err(Error::Configuration(
                    self.diagnostic(format!("Failed setting {:?} mode", mode)),
                ))
            }
            None if mode == Mode::Capture => {}
            None => return Err(Error::NotSupported(format!("{:?} mode", mode))),
        }
        debug!("{}: mode {:?} -> {:?}", self.name, self.mode, mode);
        self.mode = mode;
        Ok(())
    }

    pub fn is_nonblocking(&self) -> Result<bool, Error> {
        with_errbuf(|err| match self.engine().pcap_getnonblock(self.as_ptr(), err) {
            raw::PCAP_ERROR => Err(Error::Configuration(Diagnostic::new(
                "Failed getting nonblocking mode",
                unsafe { cstr_to_string(err) },
            ))),
            status => Ok(status != 0),
        })
    }

    /// In nonblocking mode receive calls return at once when nothing is buffered.
    pub fn set_nonblocking(&mut self, nonblocking: bool) -> Result<(), Error> {
        with_errbuf(|err| {
            match self
                .engine()
                .pcap_setnonblock(self.as_ptr(), nonblocking as c_int, err)
            {
                raw::PCAP_ERROR => Err(Error::Configuration(Diagnostic::new(
                    format!("Failed setting nonblocking mode to {}", nonblocking),
                    unsafe { cstr_to_string(err) },
                ))),
                _ => Ok(()),
            }
        })
    }

    /// Sets the size of the kernel buffer that holds packets until they are read.
    ///
    /// The driver reallocates the buffer, so packets not yet read are lost.
    pub fn set_kernel_buffer_size(&mut self, bytes: i32) -> Result<(), Error> {
        match self.engine().pcap_setbuff(self.as_ptr(), bytes) {
            Some(status) => {
                self.check_config(status, format!("Failed setting kernel buffer size to {}", bytes))
            }
            None => Err(Error::NotSupported("setting the kernel buffer size".to_string())),
        }
    }

    /// Sets how much data the kernel buffers before waking a blocked read.
    pub fn set_kernel_min_to_copy(&mut self, bytes: i32) -> Result<(), Error> {
        match self.engine().pcap_setmintocopy(self.as_ptr(), bytes) {
            Some(status) => self.check_config(
                status,
                format!("Failed setting kernel minimum to copy to {}", bytes),
            ),
            None => Err(Error::NotSupported(
                "setting the kernel minimum to copy".to_string(),
            )),
        }
    }

    /// Thins the packet stream. The engine only applies this to capture started after the
    /// call; while packets are already flowing it is silently ignored.
    pub fn set_sampling_method(&mut self, method: SamplingMethod) -> Result<(), Error> {
        let native = method.to_native()?;
        match self.engine().pcap_setsampling(self.as_ptr()) {
            Some(samp) if !samp.is_null() => {
                unsafe { *samp = native };
                Ok(())
            }
            Some(_) => Err(Error::Configuration(
                self.diagnostic(format!("Failed setting sampling method {:?}", method)),
            )),
            None => Err(Error::NotSupported("packet sampling".to_string())),
        }
    }

    /// Major and minor version of the file format, for offline sessions.
    pub fn file_version(&self) -> Result<(i32, i32), Error> {
        if self.source != Source::Offline {
            return Err(Error::NotSupported(
                "file version on a live session".to_string(),
            ));
        }
        let engine = self.engine();
        Ok((
            engine.pcap_major_version(self.as_ptr()),
            engine.pcap_minor_version(self.as_ptr()),
        ))
    }

    /// Whether an offline file was written in this host's byte order.
    pub fn is_host_byte_order(&self) -> Result<bool, Error> {
        if self.source != Source::Offline {
            return Err(Error::NotSupported(
                "file byte order on a live session".to_string(),
            ));
        }
        Ok(self.engine().pcap_is_swapped(self.as_ptr()) == 0)
    }

    /// Counters the engine accumulated since the session was opened.
    pub fn total_statistics(&self) -> Result<CumulativeStatistics, Error> {
        if self.source == Source::Offline {
            return Err(Error::NotSupported(
                "statistics on an offline session".to_string(),
            ));
        }
        let engine = self.engine();
        let mut size: c_int = 0;
        match engine.pcap_stats_ex(self.as_ptr(), &mut size) {
            Some(stats) if stats.is_null() => Err(Error::Read(
                self.diagnostic("Failed getting total statistics"),
            )),
            Some(stats) => {
                // Read as counters: the extended structure only guarantees what `size` covers.
                let counters = stats as *const c_uint;
                let counter_len = std::mem::size_of::<c_uint>() as c_int;
                unsafe {
                    Ok(CumulativeStatistics {
                        received: *counters,
                        dropped_by_driver: *counters.add(1),
                        dropped_by_interface: *counters.add(2),
                        captured: if size >= 4 * counter_len {
                            *counters.add(3)
                        } else {
                            0
                        },
                    })
                }
            }
            None => {
                let mut stats = raw::pcap_stat::default();
                if engine.pcap_stats(self.as_ptr(), &mut stats) == raw::PCAP_ERROR {
                    return Err(Error::Read(
                        self.diagnostic("Failed getting total statistics"),
                    ));
                }
                Ok(CumulativeStatistics {
                    received: stats.ps_recv,
                    dropped_by_driver: stats.ps_drop,
                    dropped_by_interface: stats.ps_ifdrop,
                    captured: 0,
                })
            }
        }
    }

    /// Compiles `expression` for this session's link type, snapshot length and netmask.
    pub fn create_filter(&self, expression: &str) -> Result<FilterProgram, Error> {
        FilterProgram::compile_for(self, expression)
    }

    /// Installs a compiled filter. The program can be dropped afterwards.
    pub fn set_filter(&mut self, program: &FilterProgram) -> Result<(), Error> {
        program.apply(self)
    }

    /// Compiles, installs and releases a filter in one step.
    pub fn set_filter_expression(&mut self, expression: &str) -> Result<(), Error> {
        let program = self.create_filter(expression)?;
        self.set_filter(&program)
    }

    /// Opens a dump file with this session's link type and snapshot length.
    pub fn open_dump<P: AsRef<Path>>(&self, path: P) -> Result<DumpWriter, Error> {
        DumpWriter::open(&self.handle, path.as_ref())
    }

    /// Closes the session. Dropping it has the same effect.
    pub fn close(self) {
        debug!("closing session on {}", self.name);
    }
}

// Brings a handle from `pcap_create` to an active state.
fn activate(handle: PcapHandle, source: &str, options: &LiveOptions) -> Result<PcapHandle, Error> {
    let engine = handle.engine().clone();
    let p = handle.as_ptr();
    let check = |status: c_int, what: &str| {
        if status == 0 {
            Ok(())
        } else {
            Err(Error::DeviceOpen {
                device: source.to_string(),
                message: handle.diagnostic(format!("failed {}", what)).to_string(),
            })
        }
    };

    check(engine.pcap_set_snaplen(p, options.snaplen), "setting snapshot length")?;
    check(
        engine.pcap_set_promisc(p, options.flags.contains(OpenFlags::PROMISCUOUS) as c_int),
        "setting promiscuous mode",
    )?;
    check(engine.pcap_set_timeout(p, options.read_timeout), "setting read timeout")?;
    if options.flags.contains(OpenFlags::MAX_RESPONSIVENESS) {
        match engine.pcap_set_immediate_mode(p, 1) {
            Some(status) => check(status, "setting immediate mode")?,
            None => warn!("{}: immediate mode is not supported, ignoring", source),
        }
    }
    let ignored = options.flags
        & (OpenFlags::DATATX_UDP | OpenFlags::NOCAPTURE_RPCAP | OpenFlags::NOCAPTURE_LOCAL);
    if !ignored.is_empty() {
        warn!("{}: open flags {:?} need pcap_open, ignoring", source, ignored);
    }

    match engine.pcap_activate(p) {
        0 => {}
        status if status > 0 => {
            warn!("{}: {}", source, handle.diagnostic(format!("activated with warning {}", status)))
        }
        status => {
            return Err(Error::DeviceOpen {
                device: source.to_string(),
                message: handle
                    .diagnostic(format!("activation failed with {}", status))
                    .to_string(),
            })
        }
    }
    Ok(handle)
}
