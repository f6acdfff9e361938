//! Interfaces reported by `pcap_findalldevs`.

use std::{
    net::{IpAddr, Ipv4Addr},
    ptr,
    sync::Arc,
};

use bitflags::bitflags;

#[cfg(windows)]
use windows_sys::Win32::Networking::WinSock;

use crate::{
    capture::{options::LiveOptions, CaptureSession},
    cstr_to_string,
    raw::{self, Engine},
    with_errbuf, Error,
};

bitflags! {
    /// Interface flags.
    pub struct IfFlags: u32 {
        const LOOPBACK = raw::PCAP_IF_LOOPBACK;
        const UP = raw::PCAP_IF_UP;
        const RUNNING = raw::PCAP_IF_RUNNING;
        /// Any wireless medium: IrDA, IEEE 802.15.4 and IEEE 802.11 among others.
        const WIRELESS = raw::PCAP_IF_WIRELESS;
    }
}

/// Whether the adapter is connected; for wireless interfaces, associated with a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Unknown,
    Connected,
    Disconnected,
    /// The notion does not apply, as for a loopback device.
    NotApplicable,
}

impl From<u32> for ConnectionStatus {
    fn from(flags: u32) -> Self {
        match flags & raw::PCAP_IF_CONNECTION_STATUS {
            raw::PCAP_IF_CONNECTION_STATUS_CONNECTED => ConnectionStatus::Connected,
            raw::PCAP_IF_CONNECTION_STATUS_DISCONNECTED => ConnectionStatus::Disconnected,
            raw::PCAP_IF_CONNECTION_STATUS_NOT_APPLICABLE => ConnectionStatus::NotApplicable,
            _ => ConnectionStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFlags {
    pub if_flags: IfFlags,
    pub connection_status: ConnectionStatus,
}

impl From<u32> for DeviceFlags {
    fn from(flags: u32) -> Self {
        DeviceFlags {
            if_flags: IfFlags::from_bits_truncate(flags),
            connection_status: flags.into(),
        }
    }
}

impl DeviceFlags {
    pub fn empty() -> Self {
        DeviceFlags::from(0)
    }

    pub fn is_loopback(&self) -> bool {
        self.if_flags.contains(IfFlags::LOOPBACK)
    }

    pub fn is_up(&self) -> bool {
        self.if_flags.contains(IfFlags::UP)
    }

    pub fn is_running(&self) -> bool {
        self.if_flags.contains(IfFlags::RUNNING)
    }

    pub fn is_wireless(&self) -> bool {
        self.if_flags.contains(IfFlags::WIRELESS)
    }
}

/// One address entry of an interface, in the engine's order.
///
/// `addr` is `None` for families other than IPv4 and IPv6; the entry is kept so that
/// positions match the engine's list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub addr: Option<IpAddr>,
    pub netmask: Option<IpAddr>,
    pub broadcast_addr: Option<IpAddr>,
    /// Destination of a point-to-point link.
    pub dst_addr: Option<IpAddr>,
}

impl Address {
    unsafe fn new_vec(mut ptr: *const raw::pcap_addr_t) -> Vec<Address> {
        let mut vec = Vec::new();
        while !ptr.is_null() {
            vec.push(Address::new(&*ptr));
            ptr = (*ptr).next;
        }
        vec
    }

    unsafe fn new(addr: &raw::pcap_addr_t) -> Address {
        Address {
            addr: convert_sockaddr(addr.addr),
            netmask: convert_sockaddr(addr.netmask),
            broadcast_addr: convert_sockaddr(addr.broadaddr),
            dst_addr: convert_sockaddr(addr.dstaddr),
        }
    }
}

#[cfg(not(windows))]
unsafe fn convert_sockaddr(ptr: *const libc::sockaddr) -> Option<IpAddr> {
    if ptr.is_null() {
        return None;
    }

    match (*ptr).sa_family as i32 {
        libc::AF_INET => {
            let sin = &*(ptr as *const libc::sockaddr_in);
            Some(IpAddr::V4(u32::from_be(sin.sin_addr.s_addr).into()))
        }
        libc::AF_INET6 => {
            let sin6 = &*(ptr as *const libc::sockaddr_in6);
            Some(IpAddr::V6(sin6.sin6_addr.s6_addr.into()))
        }
        _ => None,
    }
}

#[cfg(windows)]
unsafe fn convert_sockaddr(ptr: *const libc::sockaddr) -> Option<IpAddr> {
    if ptr.is_null() {
        return None;
    }

    match (*ptr).sa_family as u32 {
        WinSock::AF_INET => {
            let sin = &*(ptr as *const WinSock::SOCKADDR_IN);
            Some(IpAddr::from(sin.sin_addr.S_un.S_addr.to_ne_bytes()))
        }
        WinSock::AF_INET6 => {
            let sin6 = &*(ptr as *const WinSock::SOCKADDR_IN6);
            Some(IpAddr::from(sin6.sin6_addr.u.Byte))
        }
        _ => None,
    }
}

/// A capture device: its name, description, addresses and flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub name: String,
    pub description: Option<String>,
    pub addresses: Vec<Address>,
    pub flags: DeviceFlags,
}

impl Device {
    /// All devices the engine can capture on.
    pub fn list() -> Result<Vec<Device>, Error> {
        Device::list_with(&*raw::engine()?)
    }

    pub(crate) fn list_with(engine: &dyn Engine) -> Result<Vec<Device>, Error> {
        let all_devs = with_errbuf(|err| {
            let mut all_devs: *mut raw::pcap_if_t = ptr::null_mut();
            if engine.pcap_findalldevs(&mut all_devs, err) != 0 {
                return Err(Error::DeviceOpen {
                    device: "device list".to_string(),
                    message: unsafe { cstr_to_string(err) }
                        .unwrap_or_else(|| "unknown error".to_string()),
                });
            }
            Ok(all_devs)
        })?;

        let mut devices = Vec::new();
        let mut dev = all_devs;
        let result = unsafe {
            loop {
                if dev.is_null() {
                    break Ok(());
                }
                match Device::from_native(&*dev) {
                    Ok(device) => devices.push(device),
                    Err(e) => break Err(e),
                }
                dev = (*dev).next;
            }
        };
        if !all_devs.is_null() {
            engine.pcap_freealldevs(all_devs);
        }
        result.map(|_| devices)
    }

    unsafe fn from_native(dev: &raw::pcap_if_t) -> Result<Device, Error> {
        Ok(Device {
            name: cstr_to_string(dev.name)
                .ok_or_else(|| Error::InvalidArgument("device without a name".to_string()))?,
            description: cstr_to_string(dev.description),
            addresses: Address::new_vec(dev.addresses),
            flags: DeviceFlags::from(dev.flags),
        })
    }

    /// The netmask filters compiled for this device use: the netmask of the first address,
    /// if that address is IPv4.
    pub fn netmask(&self) -> Option<Ipv4Addr> {
        match self.addresses.first()?.netmask? {
            IpAddr::V4(mask) => Some(mask),
            IpAddr::V6(_) => None,
        }
    }

    /// Opens a live session on this device. The session's netmask is
    /// [`Device::netmask`], whatever `options` says.
    pub fn open(&self, options: &LiveOptions) -> Result<CaptureSession, Error> {
        self.open_with(raw::engine()?, options)
    }

    pub(crate) fn open_with(
        &self,
        engine: Arc<dyn Engine>,
        options: &LiveOptions,
    ) -> Result<CaptureSession, Error> {
        let options = options.clone().netmask(self.netmask());
        CaptureSession::open_live_with(engine, &self.name, &options)
    }
}

impl From<&str> for Device {
    fn from(name: &str) -> Self {
        Device {
            name: name.to_string(),
            description: None,
            addresses: Vec::new(),
            flags: DeviceFlags::empty(),
        }
    }
}
