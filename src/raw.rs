#![allow(non_camel_case_types)]
#![allow(dead_code)]

//! C types of the native engine and the [`Engine`] seam every native call goes through.

use std::sync::Arc;

use libc::{c_char, c_int, c_long, c_uchar, c_uint, c_ushort};
use once_cell::sync::OnceCell;

use crate::Error;

mod library;
#[cfg(test)]
pub mod testmod;

pub use library::Library;

pub const PCAP_IF_LOOPBACK: u32 = 0x0000_0001;
pub const PCAP_IF_UP: u32 = 0x0000_0002;
pub const PCAP_IF_RUNNING: u32 = 0x0000_0004;
pub const PCAP_IF_WIRELESS: u32 = 0x0000_0008;
pub const PCAP_IF_CONNECTION_STATUS: u32 = 0x0000_0030;
pub const PCAP_IF_CONNECTION_STATUS_UNKNOWN: u32 = 0x0000_0000;
pub const PCAP_IF_CONNECTION_STATUS_CONNECTED: u32 = 0x0000_0010;
pub const PCAP_IF_CONNECTION_STATUS_DISCONNECTED: u32 = 0x0000_0020;
pub const PCAP_IF_CONNECTION_STATUS_NOT_APPLICABLE: u32 = 0x0000_0030;

pub const PCAP_NETMASK_UNKNOWN: c_uint = 0xffff_ffff;

pub const PCAP_ERROR: c_int = -1;
pub const PCAP_ERROR_BREAK: c_int = -2;

pub const RPCAP_RMTAUTH_NULL: c_int = 0;
pub const RPCAP_RMTAUTH_PWD: c_int = 1;

/// Opaque native capture handle.
pub enum pcap_t {}

/// Opaque native dump file handle.
pub enum pcap_dumper_t {}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct bpf_insn {
    pub code: c_ushort,
    pub jt: c_uchar,
    pub jf: c_uchar,
    pub k: u32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct bpf_program {
    pub bf_len: c_uint,
    pub bf_insns: *mut bpf_insn,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct pcap_pkthdr {
    pub ts: libc::timeval,
    pub caplen: u32,
    pub len: u32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct pcap_stat {
    pub ps_recv: c_uint,
    pub ps_drop: c_uint,
    pub ps_ifdrop: c_uint,
    #[cfg(windows)]
    pub ps_capt: c_uint,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct pcap_if_t {
    pub next: *mut pcap_if_t,
    pub name: *mut c_char,
    pub description: *mut c_char,
    pub addresses: *mut pcap_addr_t,
    pub flags: u32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct pcap_addr_t {
    pub next: *mut pcap_addr_t,
    pub addr: *mut libc::sockaddr,
    pub netmask: *mut libc::sockaddr,
    pub broadaddr: *mut libc::sockaddr,
    pub dstaddr: *mut libc::sockaddr,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct pcap_send_queue {
    pub maxlen: c_uint,
    pub len: c_uint,
    pub buffer: *mut c_char,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct pcap_rmtauth {
    pub type_: c_int,
    pub username: *mut c_char,
    pub password: *mut c_char,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct pcap_samp {
    pub method: c_int,
    pub value: c_int,
}

pub type pcap_handler =
    Option<unsafe extern "C" fn(arg1: *mut c_uchar, arg2: *const pcap_pkthdr, arg3: *const c_uchar)>;

/// The native engine, one method per C entry point.
///
/// Pointer arguments are forwarded untouched; callers guarantee they are valid for the
/// call. Entry points that only some engines export (the WinPcap extensions) return
/// `None` when the loaded engine lacks them.
#[cfg_attr(test, mockall::automock)]
pub trait Engine: Send + Sync {
    fn pcap_lib_version(&self) -> *const c_char;

    fn pcap_create(&self, source: *const c_char, errbuf: *mut c_char) -> *mut pcap_t;
    fn pcap_set_snaplen(&self, p: *mut pcap_t, snaplen: c_int) -> c_int;
    fn pcap_set_promisc(&self, p: *mut pcap_t, promisc: c_int) -> c_int;
    fn pcap_set_timeout(&self, p: *mut pcap_t, ms: c_int) -> c_int;
    fn pcap_set_immediate_mode(&self, _p: *mut pcap_t, _immediate: c_int) -> Option<c_int> {
        None
    }
    fn pcap_activate(&self, p: *mut pcap_t) -> c_int;

    fn pcap_open(
        &self,
        _source: *const c_char,
        _snaplen: c_int,
        _flags: c_int,
        _read_timeout: c_int,
        _auth: *mut pcap_rmtauth,
        _errbuf: *mut c_char,
    ) -> Option<*mut pcap_t> {
        None
    }
    fn pcap_open_offline(&self, fname: *const c_char, errbuf: *mut c_char) -> *mut pcap_t;
    fn pcap_open_dead(&self, linktype: c_int, snaplen: c_int) -> *mut pcap_t;
    fn pcap_close(&self, p: *mut pcap_t);
    fn pcap_geterr(&self, p: *mut pcap_t) -> *mut c_char;

    fn pcap_datalink(&self, p: *mut pcap_t) -> c_int;
    fn pcap_set_datalink(&self, p: *mut pcap_t, dlt: c_int) -> c_int;
    fn pcap_datalink_name_to_val(&self, name: *const c_char) -> c_int;
    fn pcap_datalink_val_to_name(&self, dlt: c_int) -> *const c_char;
    fn pcap_datalink_val_to_description(&self, dlt: c_int) -> *const c_char;
    fn pcap_snapshot(&self, p: *mut pcap_t) -> c_int;
    fn pcap_major_version(&self, p: *mut pcap_t) -> c_int;
    fn pcap_minor_version(&self, p: *mut pcap_t) -> c_int;
    fn pcap_is_swapped(&self, p: *mut pcap_t) -> c_int;
    fn pcap_getnonblock(&self, p: *mut pcap_t, errbuf: *mut c_char) -> c_int;
    fn pcap_setnonblock(&self, p: *mut pcap_t, nonblock: c_int, errbuf: *mut c_char) -> c_int;

    fn pcap_next_ex(
        &self,
        p: *mut pcap_t,
        header: *mut *mut pcap_pkthdr,
        data: *mut *const c_uchar,
    ) -> c_int;
    fn pcap_dispatch(
        &self,
        p: *mut pcap_t,
        cnt: c_int,
        callback: pcap_handler,
        user: *mut c_uchar,
    ) -> c_int;
    fn pcap_loop(&self, p: *mut pcap_t, cnt: c_int, callback: pcap_handler, user: *mut c_uchar)
        -> c_int;
    fn pcap_breakloop(&self, p: *mut pcap_t);
    fn pcap_sendpacket(&self, p: *mut pcap_t, buf: *const c_uchar, size: c_int) -> c_int;

    fn pcap_compile(
        &self,
        p: *mut pcap_t,
        fp: *mut bpf_program,
        expression: *const c_char,
        optimize: c_int,
        netmask: c_uint,
    ) -> c_int;
    fn pcap_setfilter(&self, p: *mut pcap_t, fp: *mut bpf_program) -> c_int;
    fn pcap_freecode(&self, fp: *mut bpf_program);
    fn pcap_offline_filter(
        &self,
        fp: *const bpf_program,
        header: *const pcap_pkthdr,
        data: *const c_uchar,
    ) -> c_int;

    fn pcap_stats(&self, p: *mut pcap_t, ps: *mut pcap_stat) -> c_int;
    fn pcap_stats_ex(&self, _p: *mut pcap_t, _size: *mut c_int) -> Option<*mut pcap_stat> {
        None
    }
    fn pcap_setmode(&self, _p: *mut pcap_t, _mode: c_int) -> Option<c_int> {
        None
    }
    fn pcap_setbuff(&self, _p: *mut pcap_t, _dim: c_int) -> Option<c_int> {
        None
    }
    fn pcap_setmintocopy(&self, _p: *mut pcap_t, _size: c_int) -> Option<c_int> {
        None
    }
    fn pcap_setsampling(&self, _p: *mut pcap_t) -> Option<*mut pcap_samp> {
        None
    }

    fn pcap_sendqueue_alloc(&self, _memsize: c_uint) -> Option<*mut pcap_send_queue> {
        None
    }
    fn pcap_sendqueue_destroy(&self, _queue: *mut pcap_send_queue) {}
    fn pcap_sendqueue_queue(
        &self,
        _queue: *mut pcap_send_queue,
        _header: *const pcap_pkthdr,
        _data: *const c_uchar,
    ) -> Option<c_int> {
        None
    }
    fn pcap_sendqueue_transmit(
        &self,
        _p: *mut pcap_t,
        _queue: *mut pcap_send_queue,
        _sync: c_int,
    ) -> Option<c_uint> {
        None
    }

    fn pcap_dump_open(&self, p: *mut pcap_t, fname: *const c_char) -> *mut pcap_dumper_t;
    fn pcap_dump(&self, user: *mut c_uchar, header: *const pcap_pkthdr, data: *const c_uchar);
    fn pcap_dump_flush(&self, p: *mut pcap_dumper_t) -> c_int;
    fn pcap_dump_ftell(&self, p: *mut pcap_dumper_t) -> c_long;
    fn pcap_dump_close(&self, p: *mut pcap_dumper_t);

    fn pcap_findalldevs(&self, alldevs: *mut *mut pcap_if_t, errbuf: *mut c_char) -> c_int;
    fn pcap_freealldevs(&self, alldevs: *mut pcap_if_t);
}

static ENGINE: OnceCell<Arc<dyn Engine>> = OnceCell::new();

/// The process-wide engine, loaded on first use.
pub fn engine() -> Result<Arc<dyn Engine>, Error> {
    ENGINE
        .get_or_try_init(|| {
            let library = Library::load()?;
            Ok::<_, Error>(Arc::new(library) as Arc<dyn Engine>)
        })
        .map(Arc::clone)
}
