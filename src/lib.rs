//! Capture sessions over the native pcap engine (libpcap, WinPcap or Npcap).
//!
//! A [`CaptureSession`] owns one native handle, opened from a live interface or from a
//! capture file. It receives packets one at a time, in batches, or in a loop that runs
//! until a count is reached, and it can be stopped from another thread with a
//! [`BreakHandle`]. Sessions also install BPF filters ([`FilterProgram`]), send single
//! packets, transmit [`SendBatch`]es and, in statistics mode, return kernel counters
//! instead of packets.
//!
//! The engine is loaded at run time. Set `LIBPCAP_LIBDIR` to look in a specific
//! directory first.
//!
//! ```no_run
//! use pcap_session::{CaptureSession, LiveOptions, ReceiveResult};
//!
//! let mut session = CaptureSession::open_live("eth0", &LiveOptions::default()).unwrap();
//! session.set_filter_expression("tcp port 443").unwrap();
//!
//! let result = session
//!     .receive_exactly(Some(10), |packet| println!("{:?}", packet.header))
//!     .unwrap();
//! assert_eq!(result, ReceiveResult::Ok);
//! ```
//!
//! Read timeouts are honored by the engine on a per buffer fill basis. Some platforms do
//! not support them at all, in which case a receive call on a quiet live interface blocks
//! until traffic arrives or the session is broken.
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
extern crate log;

use std::{
    ffi::{CStr, CString},
    path::Path,
};

use libc::c_char;

mod raw;

pub mod capture;
pub mod device;
mod error;
pub mod filter;
pub mod linktype;
pub mod packet;
pub mod savefile;
pub mod sendqueue;
pub mod stats;
pub mod timestamp;

pub use capture::{
    iterator::PacketIter,
    options::{LiveOptions, OpenFlags, RemoteAuth},
    receive::{BreakHandle, ReceiveResult},
    CaptureSession, Mode, SamplingMethod, Source,
};
pub use device::{Address, ConnectionStatus, Device, DeviceFlags, IfFlags};
pub use error::{Diagnostic, Error};
pub use filter::{BpfInstruction, FilterProgram};
pub use linktype::Linktype;
pub use packet::{CapturedPacket, Packet, PacketHeader};
pub use savefile::DumpWriter;
pub use sendqueue::{SendBatch, SendSync};
pub use stats::{CumulativeStatistics, StatisticsSample};

const PCAP_ERRBUF_SIZE: usize = 256;

/// Returns the version string of the loaded engine.
pub fn lib_version() -> Result<String, Error> {
    let engine = raw::engine()?;
    Ok(unsafe { cstr_to_string(engine.pcap_lib_version()) }.unwrap_or_default())
}

/// Runs `func` with a zeroed error buffer the engine can write into.
fn with_errbuf<T, F>(func: F) -> Result<T, Error>
where
    F: FnOnce(*mut c_char) -> Result<T, Error>,
{
    let mut errbuf = [0 as c_char; PCAP_ERRBUF_SIZE];
    func(errbuf.as_mut_ptr())
}

/// Copies a C string out of the engine. Null pointers give `None`.
///
/// # Safety
///
/// `ptr` must be null or point to a nul terminated string.
/// The C form of a file name. Unix engines take the raw bytes, so any path works there.
#[cfg(unix)]
fn path_to_cstring(path: &Path) -> Result<CString, Error> {
    use std::os::unix::ffi::OsStrExt;
    Ok(CString::new(path.as_os_str().as_bytes())?)
}

#[cfg(not(unix))]
fn path_to_cstring(path: &Path) -> Result<CString, Error> {
    let name = path.to_str().ok_or_else(|| {
        Error::InvalidArgument(format!("path {} is not valid UTF-8", path.display()))
    })?;
    Ok(CString::new(name)?)
}

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}
