use std::{env, path::PathBuf};

use libc::{c_char, c_int, c_long, c_uchar, c_uint};

use super::{
    bpf_program, pcap_dumper_t, pcap_handler, pcap_if_t, pcap_pkthdr, pcap_rmtauth, pcap_samp,
    pcap_send_queue, pcap_stat, pcap_t, Engine,
};
use crate::Error;

#[cfg(windows)]
const LIBRARY_NAMES: &[&str] = &["wpcap.dll"];
#[cfg(target_os = "macos")]
const LIBRARY_NAMES: &[&str] = &["libpcap.A.dylib", "libpcap.dylib"];
#[cfg(not(any(windows, target_os = "macos")))]
const LIBRARY_NAMES: &[&str] = &["libpcap.so.1", "libpcap.so.0.8", "libpcap.so"];

/// Resolves a symbol every supported engine exports.
///
/// # Safety
///
/// `T` must be the C signature of `name`.
unsafe fn required<T: Copy>(lib: &libloading::Library, name: &str) -> Result<T, Error> {
    let symbol = format!("{}\0", name);
    lib.get::<T>(symbol.as_bytes())
        .map(|sym| *sym)
        .map_err(|e| Error::LibraryLoad(format!("missing symbol {}: {}", name, e)))
}

/// Resolves a symbol only some engines export.
///
/// # Safety
///
/// `T` must be the C signature of `name`.
unsafe fn optional<T: Copy>(lib: &libloading::Library, name: &str) -> Option<T> {
    let symbol = format!("{}\0", name);
    let found = lib.get::<T>(symbol.as_bytes()).map(|sym| *sym).ok();
    if found.is_none() {
        debug!("pcap library does not export {}", name);
    }
    found
}

/// Candidate paths, in order: `LIBPCAP_LIBDIR` first, then the loader's search path.
fn candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(libdir) = env::var("LIBPCAP_LIBDIR") {
        for name in LIBRARY_NAMES {
            paths.push(PathBuf::from(&libdir).join(name));
        }
    }
    for name in LIBRARY_NAMES {
        paths.push(PathBuf::from(name));
    }
    paths
}

// Each entry names a C symbol, which is also the `Engine` method forwarding to it. Optional
// symbols surface as `None` from their method; `optional_void` ones are skipped instead.
macro_rules! symbol_table {
    (
        required { $(fn $req:ident($($rarg:ident: $rty:ty),*) $(-> $rret:ty)?;)* }
        optional { $(fn $opt:ident($($oarg:ident: $oty:ty),*) -> $oret:ty;)* }
        optional_void { $(fn $void:ident($($varg:ident: $vty:ty),*);)* }
    ) => {
        /// The engine backed by a dynamically loaded libpcap, WinPcap or Npcap.
        pub struct Library {
            $($req: unsafe extern "C" fn($($rty),*) $(-> $rret)?,)*
            $($opt: Option<unsafe extern "C" fn($($oty),*) -> $oret>,)*
            $($void: Option<unsafe extern "C" fn($($vty),*)>,)*
            // Keeps the symbols above mapped.
            _library: libloading::Library,
        }

        impl Library {
            unsafe fn resolve(lib: libloading::Library) -> Result<Library, Error> {
                Ok(Library {
                    $($req: required(&lib, stringify!($req))?,)*
                    $($opt: optional(&lib, stringify!($opt)),)*
                    $($void: optional(&lib, stringify!($void)),)*
                    _library: lib,
                })
            }
        }

        impl Engine for Library {
            $(
                fn $req(&self, $($rarg: $rty),*) $(-> $rret)? {
                    unsafe { (self.$req)($($rarg),*) }
                }
            )*
            $(
                fn $opt(&self, $($oarg: $oty),*) -> Option<$oret> {
                    self.$opt.map(|f| unsafe { f($($oarg),*) })
                }
            )*
            $(
                fn $void(&self, $($varg: $vty),*) {
                    if let Some(f) = self.$void {
                        unsafe { f($($varg),*) }
                    }
                }
            )*
        }
    };
}

symbol_table! {
    required {
        fn pcap_lib_version() -> *const c_char;
        fn pcap_create(source: *const c_char, errbuf: *mut c_char) -> *mut pcap_t;
        fn pcap_set_snaplen(p: *mut pcap_t, snaplen: c_int) -> c_int;
        fn pcap_set_promisc(p: *mut pcap_t, promisc: c_int) -> c_int;
        fn pcap_set_timeout(p: *mut pcap_t, ms: c_int) -> c_int;
        fn pcap_activate(p: *mut pcap_t) -> c_int;
        fn pcap_open_offline(fname: *const c_char, errbuf: *mut c_char) -> *mut pcap_t;
        fn pcap_open_dead(linktype: c_int, snaplen: c_int) -> *mut pcap_t;
        fn pcap_close(p: *mut pcap_t);
        fn pcap_geterr(p: *mut pcap_t) -> *mut c_char;
        fn pcap_datalink(p: *mut pcap_t) -> c_int;
        fn pcap_set_datalink(p: *mut pcap_t, dlt: c_int) -> c_int;
        fn pcap_datalink_name_to_val(name: *const c_char) -> c_int;
        fn pcap_datalink_val_to_name(dlt: c_int) -> *const c_char;
        fn pcap_datalink_val_to_description(dlt: c_int) -> *const c_char;
        fn pcap_snapshot(p: *mut pcap_t) -> c_int;
        fn pcap_major_version(p: *mut pcap_t) -> c_int;
        fn pcap_minor_version(p: *mut pcap_t) -> c_int;
        fn pcap_is_swapped(p: *mut pcap_t) -> c_int;
        fn pcap_getnonblock(p: *mut pcap_t, errbuf: *mut c_char) -> c_int;
        fn pcap_setnonblock(p: *mut pcap_t, nonblock: c_int, errbuf: *mut c_char) -> c_int;
        fn pcap_next_ex(
            p: *mut pcap_t,
            header: *mut *mut pcap_pkthdr,
            data: *mut *const c_uchar
        ) -> c_int;
        fn pcap_dispatch(
            p: *mut pcap_t,
            cnt: c_int,
            callback: pcap_handler,
            user: *mut c_uchar
        ) -> c_int;
        fn pcap_loop(p: *mut pcap_t, cnt: c_int, callback: pcap_handler, user: *mut c_uchar)
            -> c_int;
        fn pcap_breakloop(p: *mut pcap_t);
        fn pcap_sendpacket(p: *mut pcap_t, buf: *const c_uchar, size: c_int) -> c_int;
        fn pcap_compile(
            p: *mut pcap_t,
            fp: *mut bpf_program,
            expression: *const c_char,
            optimize: c_int,
            netmask: c_uint
        ) -> c_int;
        fn pcap_setfilter(p: *mut pcap_t, fp: *mut bpf_program) -> c_int;
        fn pcap_freecode(fp: *mut bpf_program);
        fn pcap_offline_filter(
            fp: *const bpf_program,
            header: *const pcap_pkthdr,
            data: *const c_uchar
        ) -> c_int;
        fn pcap_stats(p: *mut pcap_t, ps: *mut pcap_stat) -> c_int;
        fn pcap_dump_open(p: *mut pcap_t, fname: *const c_char) -> *mut pcap_dumper_t;
        fn pcap_dump(user: *mut c_uchar, header: *const pcap_pkthdr, data: *const c_uchar);
        fn pcap_dump_flush(p: *mut pcap_dumper_t) -> c_int;
        fn pcap_dump_ftell(p: *mut pcap_dumper_t) -> c_long;
        fn pcap_dump_close(p: *mut pcap_dumper_t);
        fn pcap_findalldevs(alldevs: *mut *mut pcap_if_t, errbuf: *mut c_char) -> c_int;
        fn pcap_freealldevs(alldevs: *mut pcap_if_t);
    }
    optional {
        fn pcap_set_immediate_mode(p: *mut pcap_t, immediate: c_int) -> c_int;
        fn pcap_open(
            source: *const c_char,
            snaplen: c_int,
            flags: c_int,
            read_timeout: c_int,
            auth: *mut pcap_rmtauth,
            errbuf: *mut c_char
        ) -> *mut pcap_t;
        fn pcap_stats_ex(p: *mut pcap_t, size: *mut c_int) -> *mut pcap_stat;
        fn pcap_setmode(p: *mut pcap_t, mode: c_int) -> c_int;
        fn pcap_setbuff(p: *mut pcap_t, dim: c_int) -> c_int;
        fn pcap_setmintocopy(p: *mut pcap_t, size: c_int) -> c_int;
        fn pcap_setsampling(p: *mut pcap_t) -> *mut pcap_samp;
        fn pcap_sendqueue_alloc(memsize: c_uint) -> *mut pcap_send_queue;
        fn pcap_sendqueue_queue(
            queue: *mut pcap_send_queue,
            header: *const pcap_pkthdr,
            data: *const c_uchar
        ) -> c_int;
        fn pcap_sendqueue_transmit(p: *mut pcap_t, queue: *mut pcap_send_queue, sync: c_int)
            -> c_uint;
    }
    optional_void {
        fn pcap_sendqueue_destroy(queue: *mut pcap_send_queue);
    }
}

impl Library {
    /// Loads the first engine library found.
    pub fn load() -> Result<Library, Error> {
        let mut failures = Vec::new();
        for path in candidates() {
            match unsafe { libloading::Library::new(&path) } {
                Ok(lib) => {
                    debug!("loaded pcap library from {}", path.display());
                    return unsafe { Library::resolve(lib) };
                }
                Err(e) => failures.push(format!("{}: {}", path.display(), e)),
            }
        }
        Err(Error::LibraryLoad(failures.join("; ")))
    }
}

// The resolved entry points are plain C functions; thread safety of individual handles is
// the caller's concern.
unsafe impl Send for Library {}
unsafe impl Sync for Library {}
