//! Compiled BPF filter programs.

use std::{ffi::CString, fmt, net::Ipv4Addr, slice, sync::Arc};

use libc::c_uint;

use crate::{
    capture::{CaptureSession, PcapHandle},
    linktype::Linktype,
    packet::{Packet, PacketHeader},
    raw::{self, Engine},
    Error,
};

/// One instruction of a compiled program.
#[repr(transparent)]
pub struct BpfInstruction(raw::bpf_insn);

impl fmt::Display for BpfInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.0.code, self.0.jt, self.0.jf, self.0.k
        )
    }
}

/// A filter expression compiled for one link type and snapshot length.
///
/// A program can be installed on any number of sessions with
/// [`CaptureSession::set_filter`] and outlives them; installing copies it. It can also be
/// run against packets in memory with [`test`](FilterProgram::test), from several threads
/// at once.
///
/// ```no_run
/// use pcap_session::{FilterProgram, Linktype};
///
/// let filter = FilterProgram::compile("tcp port 80", Linktype::ETHERNET, 65536, None).unwrap();
/// let (matched, retained) = filter.test_bytes(&[0u8; 60]);
/// assert!(!matched && retained == 0);
/// ```
pub struct FilterProgram {
    engine: Arc<dyn Engine>,
    program: raw::bpf_program,
    expression: String,
}

// The program is only read after compilation; `pcap_offline_filter` does not modify it.
unsafe impl Send for FilterProgram {}
unsafe impl Sync for FilterProgram {}

fn native_netmask(netmask: Option<Ipv4Addr>) -> c_uint {
    netmask.map_or(raw::PCAP_NETMASK_UNKNOWN, |mask| {
        c_uint::from_ne_bytes(mask.octets())
    })
}

impl FilterProgram {
    /// Compiles `expression` without a session.
    ///
    /// `netmask` is the IPv4 netmask of the network the filter will see; without it,
    /// expressions that test for broadcast addresses fail to compile.
    pub fn compile(
        expression: &str,
        linktype: Linktype,
        snaplen: i32,
        netmask: Option<Ipv4Addr>,
    ) -> Result<FilterProgram, Error> {
        FilterProgram::compile_with(raw::engine()?, expression, linktype, snaplen, netmask)
    }

    pub(crate) fn compile_with(
        engine: Arc<dyn Engine>,
        expression: &str,
        linktype: Linktype,
        snaplen: i32,
        netmask: Option<Ipv4Addr>,
    ) -> Result<FilterProgram, Error> {
        // Closed when it goes out of scope, on every path out of here.
        let dead = PcapHandle::open_dead(engine, linktype, snaplen)?;
        FilterProgram::compile_on(&dead, expression, netmask)
    }

    /// Compiles `expression` with the link type, snapshot length and netmask of `session`.
    pub fn compile_for(session: &CaptureSession, expression: &str) -> Result<FilterProgram, Error> {
        FilterProgram::compile_on(session.handle(), expression, session.netmask())
    }

    fn compile_on(
        handle: &PcapHandle,
        expression: &str,
        netmask: Option<Ipv4Addr>,
    ) -> Result<FilterProgram, Error> {
        let cexpression = CString::new(expression)?;
        let engine = handle.engine().clone();
        let mut program = raw::bpf_program {
            bf_len: 0,
            bf_insns: std::ptr::null_mut(),
        };
        let status = engine.pcap_compile(
            handle.as_ptr(),
            &mut program,
            cexpression.as_ptr(),
            1,
            native_netmask(netmask),
        );
        if status == raw::PCAP_ERROR {
            let diagnostic = handle.diagnostic("Unable to compile filter");
            return Err(Error::FilterSyntax {
                expression: expression.to_string(),
                message: diagnostic
                    .native()
                    .unwrap_or_else(|| diagnostic.summary())
                    .to_string(),
            });
        }
        debug!(
            "compiled filter {:?} into {} instructions",
            expression, program.bf_len
        );
        Ok(FilterProgram {
            engine,
            program,
            expression: expression.to_string(),
        })
    }

    /// The expression this program was compiled from.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn instructions(&self) -> &[BpfInstruction] {
        if self.program.bf_insns.is_null() {
            return &[];
        }
        unsafe {
            slice::from_raw_parts(
                self.program.bf_insns as *const BpfInstruction,
                self.program.bf_len as usize,
            )
        }
    }

    /// Installs the program on `session`.
    pub fn apply(&self, session: &mut CaptureSession) -> Result<(), Error> {
        // pcap_setfilter copies the program; the pointer is not written through.
        let program = &self.program as *const raw::bpf_program as *mut raw::bpf_program;
        if session.engine().pcap_setfilter(session.handle().as_ptr(), program) != 0 {
            return Err(Error::Configuration(session.diagnostic(format!(
                "Failed setting filter {:?}",
                self.expression
            ))));
        }
        debug!("{}: filter {:?} installed", session.name(), self.expression);
        Ok(())
    }

    /// Runs the program on a received packet.
    ///
    /// Returns whether it matched and how many bytes the filter would keep (0 when it did not
    /// match).
    pub fn test(&self, packet: &Packet<'_>) -> (bool, u32) {
        let mut header = *packet.header;
        header.caplen = header.caplen.min(packet.data.len() as u32);
        self.run(&header, packet.data)
    }

    /// Runs the program on raw bytes, taken as a whole packet.
    pub fn test_bytes(&self, data: &[u8]) -> (bool, u32) {
        let header = PacketHeader {
            ts: libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
            caplen: data.len() as u32,
            len: data.len() as u32,
        };
        self.run(&header, data)
    }

    /// Whether the program accepts `data`.
    pub fn matches(&self, data: &[u8]) -> bool {
        self.test_bytes(data).0
    }

    fn run(&self, header: &PacketHeader, data: &[u8]) -> (bool, u32) {
        let retained = self.engine.pcap_offline_filter(
            &self.program,
            header as *const PacketHeader as *const raw::pcap_pkthdr,
            data.as_ptr(),
        );
        (retained > 0, retained.max(0) as u32)
    }
}

impl fmt::Debug for FilterProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterProgram")
            .field("expression", &self.expression)
            .field("instructions", &self.program.bf_len)
            .finish()
    }
}

impl Drop for FilterProgram {
    fn drop(&mut self) {
        self.engine.pcap_freecode(&mut self.program);
    }
}
