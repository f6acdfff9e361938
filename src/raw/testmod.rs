//! Test doubles for the native engine: helpers for the mock and a stateful simulator.

use std::{
    collections::{HashMap, VecDeque},
    ffi::{CStr, CString},
    mem, ptr, slice,
    sync::{Arc, Mutex, MutexGuard},
};

use libc::{c_char, c_int, c_long, c_uchar, c_uint};

use super::*;
use crate::packet::PacketHeader;

pub fn as_pcap_t<T>(value: &mut T) -> *mut pcap_t {
    value as *mut T as *mut pcap_t
}

static GETERR: &[u8] = b"simulated native error\0";

/// Error text handed out by mocked `pcap_geterr` calls.
pub fn geterr_ptr() -> *mut c_char {
    GETERR.as_ptr() as *mut c_char
}

pub const GETERR_TEXT: &str = "simulated native error";

const STRIDE: usize = 16;
const BASE_SECONDS: i64 = 1_600_000_000;
const FILE_HEADER_LEN: c_long = 24;
const RECORD_HEADER_LEN: c_long = 16;

/// Live traffic as the simulator delivers it: packets separated by empty buffer fills.
#[derive(Debug, Clone)]
pub enum Traffic {
    Packet(Vec<u8>),
    Timeout,
}

#[derive(Clone)]
struct Record {
    header: pcap_pkthdr,
    data: Vec<u8>,
}

impl Record {
    fn numbered(index: usize, data: Vec<u8>, snaplen: c_int) -> Record {
        let caplen = data.len().min(snaplen as usize);
        Record {
            header: pcap_pkthdr {
                ts: libc::timeval {
                    tv_sec: (BASE_SECONDS + index as i64) as _,
                    tv_usec: ((index * 1000) % 1_000_000) as _,
                },
                caplen: caplen as u32,
                len: data.len() as u32,
            },
            data: data[..caplen].to_vec(),
        }
    }
}

struct SimFile {
    linktype: c_int,
    records: Vec<Record>,
    // Written on a machine of the other byte order.
    swapped: bool,
}

struct SimDevice {
    linktype: c_int,
    traffic: Vec<Traffic>,
}

struct SimDump {
    path: String,
    linktype: c_int,
    records: Vec<Record>,
    position: c_long,
}

struct SimHandle {
    offline: bool,
    missing_device: bool,
    linktype: c_int,
    snaplen: c_int,
    // `None` is an empty buffer fill.
    queue: VecDeque<Option<Record>>,
    break_loop: bool,
    error: CString,
    filter: Option<bpf_insn>,
    current: Option<Box<Record>>,
    nonblock: bool,
    sampling: Box<pcap_samp>,
    received: c_uint,
    swapped: bool,
}

impl SimHandle {
    fn new(offline: bool, linktype: c_int, snaplen: c_int) -> SimHandle {
        SimHandle {
            offline,
            missing_device: false,
            linktype,
            snaplen,
            queue: VecDeque::new(),
            break_loop: false,
            error: CString::default(),
            filter: None,
            current: None,
            nonblock: false,
            sampling: Box::default(),
            received: 0,
            swapped: false,
        }
    }

    fn set_error(&mut self, text: &str) {
        self.error = CString::new(text).unwrap();
    }

    fn load(&mut self, traffic: &[Traffic]) {
        let mut index = 0;
        for unit in traffic {
            match unit {
                Traffic::Packet(data) => {
                    self.queue
                        .push_back(Some(Record::numbered(index, data.clone(), self.snaplen)));
                    index += 1;
                }
                Traffic::Timeout => self.queue.push_back(None),
            }
        }
    }

    // Pops the next unit that passes the installed filter.
    fn next_unit(&mut self) -> Option<Option<Record>> {
        loop {
            match self.queue.pop_front() {
                Some(Some(record)) => {
                    self.received += 1;
                    if self.filter.map_or(true, |insn| matches(&insn, &record.data)) {
                        return Some(Some(record));
                    }
                }
                other => return other,
            }
        }
    }
}

fn matches(insn: &bpf_insn, data: &[u8]) -> bool {
    insn.code == 0 || (data.len() > 23 && data[12..14] == [0x08, 0x00] && data[23] as u16 == insn.code)
}

#[derive(Default)]
struct SimState {
    next_id: usize,
    handles: HashMap<usize, SimHandle>,
    files: HashMap<String, SimFile>,
    devices: HashMap<String, SimDevice>,
    dumps: HashMap<usize, SimDump>,
    opened: usize,
    closed: usize,
    compiled: usize,
    freed: usize,
    queues_allocated: usize,
    queues_destroyed: usize,
    native_reads: usize,
    sent: Vec<Vec<u8>>,
    transmitted: Vec<(c_uint, c_int)>,
    transmit_shortfall: c_uint,
    fail_setters: bool,
    fail_reads: bool,
    panic_on_compile: bool,
    last_netmask: Option<c_uint>,
    last_open: Option<(String, c_int, c_int, c_int)>,
    last_auth: Option<(c_int, String, String)>,
    settings: HashMap<&'static str, c_int>,
    stats_ex_size: Option<c_int>,
    stats_ex: [c_uint; 8],
}

impl SimState {
    fn add_handle(&mut self, handle: SimHandle) -> *mut pcap_t {
        self.next_id += 1;
        self.opened += 1;
        self.handles.insert(self.next_id, handle);
        (self.next_id * STRIDE) as *mut pcap_t
    }

    fn handle(&mut self, p: *mut pcap_t) -> &mut SimHandle {
        self.handles
            .get_mut(&(p as usize / STRIDE))
            .expect("call on an unknown or closed handle")
    }

    fn dump(&mut self, p: *mut pcap_dumper_t) -> &mut SimDump {
        self.dumps
            .get_mut(&(p as usize / STRIDE))
            .expect("call on an unknown or closed dumper")
    }
}

/// An in-memory engine with libpcap's receive, break and filter semantics.
///
/// `new` behaves like WinPcap/Npcap (all extensions present); `libpcap` like a plain
/// libpcap without them.
pub struct Simulator {
    extensions: bool,
    state: Mutex<SimState>,
}

unsafe fn write_errbuf(errbuf: *mut c_char, text: &str) {
    let len = text.len().min(crate::PCAP_ERRBUF_SIZE - 1);
    ptr::copy_nonoverlapping(text.as_ptr() as *const c_char, errbuf, len);
    *errbuf.add(len) = 0;
}

unsafe fn to_string(ptr: *const c_char) -> String {
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

impl Simulator {
    pub fn new() -> Arc<Simulator> {
        Arc::new(Simulator {
            extensions: true,
            state: Mutex::default(),
        })
    }

    pub fn libpcap() -> Arc<Simulator> {
        Arc::new(Simulator {
            extensions: false,
            state: Mutex::default(),
        })
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_device(&self, name: &str, linktype: i32, traffic: Vec<Traffic>) {
        self.state()
            .devices
            .insert(name.to_string(), SimDevice { linktype, traffic });
    }

    pub fn add_file(&self, path: &str, linktype: i32, packets: Vec<Vec<u8>>) {
        let records = packets
            .into_iter()
            .enumerate()
            .map(|(index, data)| Record::numbered(index, data, 65535))
            .collect();
        self.state()
            .files
            .insert(
                path.to_string(),
                SimFile {
                    linktype,
                    records,
                    swapped: false,
                },
            );
    }

    pub fn set_file_swapped(&self, path: &str, swapped: bool) {
        if let Some(file) = self.state().files.get_mut(path) {
            file.swapped = swapped;
        }
    }

    /// Records of a file written through a dumper, or added with `add_file`.
    pub fn file_packets(&self, path: &str) -> Vec<(PacketHeader, Vec<u8>)> {
        self.state()
            .files
            .get(path)
            .map(|file| {
                file.records
                    .iter()
                    .map(|r| {
                        let header = PacketHeader {
                            ts: r.header.ts,
                            caplen: r.header.caplen,
                            len: r.header.len,
                        };
                        (header, r.data.clone())
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn file_linktype(&self, path: &str) -> Option<i32> {
        self.state().files.get(path).map(|f| f.linktype)
    }

    pub fn open_handles(&self) -> usize {
        self.state().handles.len()
    }

    pub fn opened_handles(&self) -> usize {
        self.state().opened
    }

    pub fn closed_handles(&self) -> usize {
        self.state().closed
    }

    pub fn compiled_programs(&self) -> usize {
        self.state().compiled
    }

    pub fn freed_programs(&self) -> usize {
        self.state().freed
    }

    pub fn live_queues(&self) -> usize {
        let state = self.state();
        state.queues_allocated - state.queues_destroyed
    }

    pub fn open_dumps(&self) -> usize {
        self.state().dumps.len()
    }

    pub fn native_reads(&self) -> usize {
        self.state().native_reads
    }

    pub fn sent_packets(&self) -> Vec<Vec<u8>> {
        self.state().sent.clone()
    }

    pub fn transmitted(&self) -> Vec<(c_uint, c_int)> {
        self.state().transmitted.clone()
    }

    pub fn set_transmit_shortfall(&self, bytes: c_uint) {
        self.state().transmit_shortfall = bytes;
    }

    pub fn set_fail_setters(&self, fail: bool) {
        self.state().fail_setters = fail;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.state().fail_reads = fail;
    }

    pub fn set_panic_on_compile(&self, panic: bool) {
        self.state().panic_on_compile = panic;
    }

    pub fn set_stats_ex_size(&self, size: Option<c_int>) {
        self.state().stats_ex_size = size;
    }

    pub fn last_netmask(&self) -> Option<c_uint> {
        self.state().last_netmask
    }

    pub fn last_open(&self) -> Option<(String, c_int, c_int, c_int)> {
        self.state().last_open.clone()
    }

    pub fn last_auth(&self) -> Option<(c_int, String, String)> {
        self.state().last_auth.clone()
    }

    /// The last value passed to the named setter.
    pub fn setting(&self, name: &str) -> Option<c_int> {
        self.state().settings.get(name).copied()
    }

    pub fn sampling(&self, p: *mut pcap_t) -> pcap_samp {
        *self.state().handle(p).sampling
    }

    fn record_setting(&self, name: &'static str, p: *mut pcap_t, value: c_int) -> c_int {
        let mut state = self.state();
        if state.fail_setters {
            state.handle(p).set_error(&format!("{} rejected", name));
            return PCAP_ERROR;
        }
        state.settings.insert(name, value);
        0
    }

    // One buffer fill: libpcap's read_op for live handles, pcap_offline_read for files.
    fn read(&self, p: *mut pcap_t, cnt: c_int, callback: pcap_handler, user: *mut c_uchar) -> c_int {
        let callback = match callback {
            Some(callback) => callback,
            None => return PCAP_ERROR,
        };
        let mut n = 0;
        loop {
            let record = {
                let mut state = self.state();
                let fail_reads = state.fail_reads;
                let handle = state.handle(p);
                if handle.break_loop {
                    if n == 0 {
                        handle.break_loop = false;
                        return PCAP_ERROR_BREAK;
                    }
                    return n;
                }
                if fail_reads {
                    handle.set_error("read failed");
                    return PCAP_ERROR;
                }
                match handle.next_unit() {
                    Some(Some(record)) => Box::new(record),
                    Some(None) => return n,
                    None if handle.offline || n > 0 => return n,
                    None => {
                        handle.set_error("simulated traffic exhausted");
                        return PCAP_ERROR;
                    }
                }
            };
            unsafe { callback(user, &record.header, record.data.as_ptr()) };
            n += 1;
            if cnt > 0 && n >= cnt {
                return n;
            }
        }
    }
}

impl Engine for Simulator {
    fn pcap_lib_version(&self) -> *const c_char {
        b"libpcap simulator 1.0\0".as_ptr() as *const c_char
    }

    fn pcap_create(&self, source: *const c_char, _errbuf: *mut c_char) -> *mut pcap_t {
        let name = unsafe { to_string(source) };
        let mut state = self.state();
        let mut handle = SimHandle::new(false, 1, 65535);
        match state.devices.get(&name) {
            Some(device) => {
                handle.linktype = device.linktype;
                let traffic = device.traffic.clone();
                handle.load(&traffic);
            }
            None => handle.missing_device = true,
        }
        state.add_handle(handle)
    }

    fn pcap_set_snaplen(&self, p: *mut pcap_t, snaplen: c_int) -> c_int {
        self.state().handle(p).snaplen = snaplen;
        self.record_setting("pcap_set_snaplen", p, snaplen)
    }

    fn pcap_set_promisc(&self, p: *mut pcap_t, promisc: c_int) -> c_int {
        self.record_setting("pcap_set_promisc", p, promisc)
    }

    fn pcap_set_timeout(&self, p: *mut pcap_t, ms: c_int) -> c_int {
        self.record_setting("pcap_set_timeout", p, ms)
    }

    fn pcap_set_immediate_mode(&self, p: *mut pcap_t, immediate: c_int) -> Option<c_int> {
        Some(self.record_setting("pcap_set_immediate_mode", p, immediate))
    }

    fn pcap_activate(&self, p: *mut pcap_t) -> c_int {
        let mut state = self.state();
        let handle = state.handle(p);
        if handle.missing_device {
            handle.set_error("No such device exists");
            return -5;
        }
        // Apply the snapshot length set before activation.
        let snaplen = handle.snaplen;
        for record in handle.queue.iter_mut().flatten() {
            let caplen = record.data.len().min(snaplen as usize);
            record.data.truncate(caplen);
            record.header.caplen = caplen as u32;
        }
        0
    }

    fn pcap_open(
        &self,
        source: *const c_char,
        snaplen: c_int,
        flags: c_int,
        read_timeout: c_int,
        auth: *mut pcap_rmtauth,
        errbuf: *mut c_char,
    ) -> Option<*mut pcap_t> {
        if !self.extensions {
            return None;
        }
        let name = unsafe { to_string(source) };
        let mut state = self.state();
        state.last_open = Some((name.clone(), snaplen, flags, read_timeout));
        state.last_auth = if auth.is_null() {
            None
        } else {
            unsafe {
                let auth = &*auth;
                let text = |ptr: *mut c_char| {
                    if ptr.is_null() {
                        String::new()
                    } else {
                        to_string(ptr)
                    }
                };
                Some((auth.type_, text(auth.username), text(auth.password)))
            }
        };
        let (linktype, traffic) = match state.devices.get(&name) {
            Some(device) => (device.linktype, device.traffic.clone()),
            None => {
                unsafe { write_errbuf(errbuf, "Error opening adapter: no such device") };
                return Some(ptr::null_mut());
            }
        };
        let mut handle = SimHandle::new(false, linktype, snaplen);
        handle.load(&traffic);
        Some(state.add_handle(handle))
    }

    fn pcap_open_offline(&self, fname: *const c_char, errbuf: *mut c_char) -> *mut pcap_t {
        let name = unsafe { to_string(fname) };
        let mut state = self.state();
        let (linktype, records, swapped) = match state.files.get(&name) {
            Some(file) => (file.linktype, file.records.clone(), file.swapped),
            None => {
                unsafe { write_errbuf(errbuf, &format!("{}: No such file or directory", name)) };
                return ptr::null_mut();
            }
        };
        let mut handle = SimHandle::new(true, linktype, 65535);
        handle.queue = records.into_iter().map(Some).collect();
        handle.swapped = swapped;
        state.add_handle(handle)
    }

    fn pcap_open_dead(&self, linktype: c_int, snaplen: c_int) -> *mut pcap_t {
        self.state().add_handle(SimHandle::new(true, linktype, snaplen))
    }

    fn pcap_close(&self, p: *mut pcap_t) {
        let mut state = self.state();
        state
            .handles
            .remove(&(p as usize / STRIDE))
            .expect("closing an unknown or already closed handle");
        state.closed += 1;
    }

    fn pcap_geterr(&self, p: *mut pcap_t) -> *mut c_char {
        self.state().handle(p).error.as_ptr() as *mut c_char
    }

    fn pcap_datalink(&self, p: *mut pcap_t) -> c_int {
        self.state().handle(p).linktype
    }

    fn pcap_set_datalink(&self, p: *mut pcap_t, dlt: c_int) -> c_int {
        let result = self.record_setting("pcap_set_datalink", p, dlt);
        if result == 0 {
            self.state().handle(p).linktype = dlt;
        }
        result
    }

    fn pcap_datalink_name_to_val(&self, name: *const c_char) -> c_int {
        match unsafe { to_string(name) }.to_ascii_uppercase().as_str() {
            "EN10MB" => 1,
            "RAW" => 101,
            _ => -1,
        }
    }

    fn pcap_datalink_val_to_name(&self, dlt: c_int) -> *const c_char {
        match dlt {
            1 => b"EN10MB\0".as_ptr() as *const c_char,
            101 => b"RAW\0".as_ptr() as *const c_char,
            _ => ptr::null(),
        }
    }

    fn pcap_datalink_val_to_description(&self, dlt: c_int) -> *const c_char {
        match dlt {
            1 => b"Ethernet\0".as_ptr() as *const c_char,
            101 => b"Raw IP\0".as_ptr() as *const c_char,
            _ => ptr::null(),
        }
    }

    fn pcap_snapshot(&self, p: *mut pcap_t) -> c_int {
        self.state().handle(p).snaplen
    }

    fn pcap_major_version(&self, _p: *mut pcap_t) -> c_int {
        2
    }

    fn pcap_minor_version(&self, _p: *mut pcap_t) -> c_int {
        4
    }

    fn pcap_is_swapped(&self, p: *mut pcap_t) -> c_int {
        self.state().handle(p).swapped as c_int
    }

    fn pcap_getnonblock(&self, p: *mut pcap_t, _errbuf: *mut c_char) -> c_int {
        self.state().handle(p).nonblock as c_int
    }

    fn pcap_setnonblock(&self, p: *mut pcap_t, nonblock: c_int, errbuf: *mut c_char) -> c_int {
        let mut state = self.state();
        if state.fail_setters {
            unsafe { write_errbuf(errbuf, "nonblocking mode rejected") };
            return PCAP_ERROR;
        }
        state.handle(p).nonblock = nonblock != 0;
        0
    }

    fn pcap_next_ex(
        &self,
        p: *mut pcap_t,
        header: *mut *mut pcap_pkthdr,
        data: *mut *const c_uchar,
    ) -> c_int {
        let mut state = self.state();
        state.native_reads += 1;
        let fail_reads = state.fail_reads;
        let handle = state.handle(p);
        if fail_reads {
            handle.set_error("read failed");
            return PCAP_ERROR;
        }
        match handle.next_unit() {
            Some(Some(record)) => {
                let current = handle.current.insert(Box::new(record));
                unsafe {
                    *header = &mut current.header;
                    *data = current.data.as_ptr();
                }
                1
            }
            Some(None) => 0,
            None if handle.offline => -2,
            None => 0,
        }
    }

    fn pcap_dispatch(
        &self,
        p: *mut pcap_t,
        cnt: c_int,
        callback: pcap_handler,
        user: *mut c_uchar,
    ) -> c_int {
        self.state().native_reads += 1;
        self.read(p, cnt, callback, user)
    }

    fn pcap_loop(
        &self,
        p: *mut pcap_t,
        cnt: c_int,
        callback: pcap_handler,
        user: *mut c_uchar,
    ) -> c_int {
        let offline = {
            let mut state = self.state();
            state.native_reads += 1;
            state.handle(p).offline
        };
        let mut remaining = cnt;
        loop {
            let n = if offline {
                self.read(p, remaining, callback, user)
            } else {
                loop {
                    let n = self.read(p, remaining, callback, user);
                    if n != 0 {
                        break n;
                    }
                }
            };
            if n <= 0 {
                return n;
            }
            if cnt > 0 {
                remaining -= n;
                if remaining <= 0 {
                    return 0;
                }
            }
        }
    }

    fn pcap_breakloop(&self, p: *mut pcap_t) {
        if let Some(handle) = self.state().handles.get_mut(&(p as usize / STRIDE)) {
            handle.break_loop = true;
        }
    }

    fn pcap_sendpacket(&self, p: *mut pcap_t, buf: *const c_uchar, size: c_int) -> c_int {
        let mut state = self.state();
        let fail = state.fail_setters;
        let handle = state.handle(p);
        if handle.offline {
            handle.set_error("cannot send packets on a savefile");
            return PCAP_ERROR;
        }
        if fail {
            handle.set_error("send failed");
            return PCAP_ERROR;
        }
        let data = unsafe { slice::from_raw_parts(buf, size as usize) }.to_vec();
        state.sent.push(data);
        0
    }

    fn pcap_compile(
        &self,
        p: *mut pcap_t,
        fp: *mut bpf_program,
        expression: *const c_char,
        _optimize: c_int,
        netmask: c_uint,
    ) -> c_int {
        let expression = unsafe { to_string(expression) };
        let mut state = self.state();
        state.last_netmask = Some(netmask);
        if state.panic_on_compile {
            drop(state);
            panic!("compiler blew up");
        }
        let handle = state.handle(p);
        if expression.contains("invalid") {
            handle.set_error(&format!("syntax error in filter expression: {}", expression));
            return PCAP_ERROR;
        }
        let code = match expression.trim() {
            "tcp" => 6,
            "udp" => 17,
            _ => 0,
        };
        let insn = Box::new(bpf_insn {
            code,
            jt: 0,
            jf: 0,
            k: handle.snaplen as u32,
        });
        unsafe {
            (*fp).bf_len = 1;
            (*fp).bf_insns = Box::into_raw(insn);
        }
        state.compiled += 1;
        0
    }

    fn pcap_setfilter(&self, p: *mut pcap_t, fp: *mut bpf_program) -> c_int {
        let mut state = self.state();
        let fail = state.fail_setters;
        let handle = state.handle(p);
        if fail {
            handle.set_error("setfilter rejected");
            return PCAP_ERROR;
        }
        handle.filter = Some(unsafe { *(*fp).bf_insns });
        0
    }

    fn pcap_freecode(&self, fp: *mut bpf_program) {
        unsafe {
            if !(*fp).bf_insns.is_null() {
                drop(Box::from_raw((*fp).bf_insns));
                (*fp).bf_insns = ptr::null_mut();
                (*fp).bf_len = 0;
                self.state().freed += 1;
            }
        }
    }

    fn pcap_offline_filter(
        &self,
        fp: *const bpf_program,
        header: *const pcap_pkthdr,
        data: *const c_uchar,
    ) -> c_int {
        unsafe {
            let insn = *(*fp).bf_insns;
            let data = slice::from_raw_parts(data, (*header).caplen as usize);
            if matches(&insn, data) {
                insn.k as c_int
            } else {
                0
            }
        }
    }

    fn pcap_stats(&self, p: *mut pcap_t, ps: *mut pcap_stat) -> c_int {
        let mut state = self.state();
        let handle = state.handle(p);
        unsafe {
            (*ps).ps_recv = handle.received;
            (*ps).ps_drop = 1;
            (*ps).ps_ifdrop = 2;
        }
        0
    }

    fn pcap_stats_ex(&self, p: *mut pcap_t, size: *mut c_int) -> Option<*mut pcap_stat> {
        if !self.extensions {
            return None;
        }
        let mut state = self.state();
        let reported = match state.stats_ex_size {
            Some(reported) => reported,
            None => return Some(ptr::null_mut()),
        };
        let received = state.handle(p).received;
        state.stats_ex = [received, 1, 2, 42, 0, 0, 0, 0];
        unsafe { *size = reported };
        Some(state.stats_ex.as_mut_ptr() as *mut pcap_stat)
    }

    fn pcap_setmode(&self, p: *mut pcap_t, mode: c_int) -> Option<c_int> {
        if !self.extensions {
            return None;
        }
        Some(self.record_setting("pcap_setmode", p, mode))
    }

    fn pcap_setbuff(&self, p: *mut pcap_t, dim: c_int) -> Option<c_int> {
        if !self.extensions {
            return None;
        }
        Some(self.record_setting("pcap_setbuff", p, dim))
    }

    fn pcap_setmintocopy(&self, p: *mut pcap_t, size: c_int) -> Option<c_int> {
        if !self.extensions {
            return None;
        }
        Some(self.record_setting("pcap_setmintocopy", p, size))
    }

    fn pcap_setsampling(&self, p: *mut pcap_t) -> Option<*mut pcap_samp> {
        if !self.extensions {
            return None;
        }
        Some(&mut *self.state().handle(p).sampling as *mut pcap_samp)
    }

    fn pcap_sendqueue_alloc(&self, memsize: c_uint) -> Option<*mut pcap_send_queue> {
        if !self.extensions {
            return None;
        }
        let buffer = vec![0u8; memsize as usize].into_boxed_slice();
        let queue = Box::new(pcap_send_queue {
            maxlen: memsize,
            len: 0,
            buffer: Box::into_raw(buffer) as *mut c_char,
        });
        self.state().queues_allocated += 1;
        Some(Box::into_raw(queue))
    }

    fn pcap_sendqueue_destroy(&self, queue: *mut pcap_send_queue) {
        if queue.is_null() {
            return;
        }
        unsafe {
            let queue = Box::from_raw(queue);
            let buffer = ptr::slice_from_raw_parts_mut(queue.buffer as *mut u8, queue.maxlen as usize);
            drop(Box::from_raw(buffer));
        }
        self.state().queues_destroyed += 1;
    }

    fn pcap_sendqueue_queue(
        &self,
        queue: *mut pcap_send_queue,
        header: *const pcap_pkthdr,
        data: *const c_uchar,
    ) -> Option<c_int> {
        if !self.extensions {
            return None;
        }
        let header_len = mem::size_of::<pcap_pkthdr>();
        unsafe {
            let queue = &mut *queue;
            let caplen = (*header).caplen as usize;
            if queue.len as usize + header_len + caplen > queue.maxlen as usize {
                return Some(PCAP_ERROR);
            }
            let at = (queue.buffer as *mut u8).add(queue.len as usize);
            ptr::copy_nonoverlapping(header as *const u8, at, header_len);
            ptr::copy_nonoverlapping(data, at.add(header_len), caplen);
            queue.len += (header_len + caplen) as c_uint;
        }
        Some(0)
    }

    fn pcap_sendqueue_transmit(
        &self,
        p: *mut pcap_t,
        queue: *mut pcap_send_queue,
        sync: c_int,
    ) -> Option<c_uint> {
        if !self.extensions {
            return None;
        }
        let len = unsafe { (*queue).len };
        let mut state = self.state();
        let sent = len - state.transmit_shortfall.min(len);
        if sent < len {
            state.handle(p).set_error("transmit interrupted");
        }
        state.transmitted.push((sent, sync));
        Some(sent)
    }

    fn pcap_dump_open(&self, p: *mut pcap_t, fname: *const c_char) -> *mut pcap_dumper_t {
        let path = unsafe { to_string(fname) };
        let mut state = self.state();
        let handle = state.handle(p);
        if path.contains("unwritable") {
            handle.set_error(&format!("{}: Permission denied", path));
            return ptr::null_mut();
        }
        let linktype = handle.linktype;
        state.next_id += 1;
        let id = state.next_id;
        state.dumps.insert(
            id,
            SimDump {
                path,
                linktype,
                records: Vec::new(),
                position: FILE_HEADER_LEN,
            },
        );
        (id * STRIDE) as *mut pcap_dumper_t
    }

    fn pcap_dump(&self, user: *mut c_uchar, header: *const pcap_pkthdr, data: *const c_uchar) {
        let mut state = self.state();
        let dump = state.dump(user as *mut pcap_dumper_t);
        unsafe {
            let header = *header;
            let data = slice::from_raw_parts(data, header.caplen as usize).to_vec();
            dump.position += RECORD_HEADER_LEN + header.caplen as c_long;
            dump.records.push(Record { header, data });
        }
    }

    fn pcap_dump_flush(&self, p: *mut pcap_dumper_t) -> c_int {
        self.state().dump(p);
        0
    }

    fn pcap_dump_ftell(&self, p: *mut pcap_dumper_t) -> c_long {
        self.state().dump(p).position
    }

    fn pcap_dump_close(&self, p: *mut pcap_dumper_t) {
        let mut state = self.state();
        let dump = state
            .dumps
            .remove(&(p as usize / STRIDE))
            .expect("closing an unknown or already closed dumper");
        state.files.insert(
            dump.path,
            SimFile {
                linktype: dump.linktype,
                records: dump.records,
                swapped: false,
            },
        );
    }

    fn pcap_findalldevs(&self, alldevs: *mut *mut pcap_if_t, _errbuf: *mut c_char) -> c_int {
        unsafe { *alldevs = ptr::null_mut() };
        0
    }

    fn pcap_freealldevs(&self, _alldevs: *mut pcap_if_t) {}
}
