use std::{ffi::CString, fmt, net::Ipv4Addr, ptr};

use bitflags::bitflags;

use crate::{raw, Error};

bitflags! {
    /// Attributes passed to `pcap_open` when a live session is opened.
    pub struct OpenFlags: i32 {
        /// Capture all traffic, not just traffic addressed to this host.
        const PROMISCUOUS = 0x0000_0001;
        /// Remote sources send captured packets over UDP instead of TCP.
        const DATATX_UDP = 0x0000_0002;
        /// Remote sources do not capture their own RPCAP traffic.
        const NOCAPTURE_RPCAP = 0x0000_0004;
        /// Do not capture packets this host transmits.
        const NOCAPTURE_LOCAL = 0x0000_0008;
        /// Deliver packets as soon as they arrive instead of batching them.
        const MAX_RESPONSIVENESS = 0x0000_0010;
    }
}

/// Username and password for a remote (rpcap) source.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteAuth {
    pub username: String,
    pub password: String,
}

impl RemoteAuth {
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> RemoteAuth {
        RemoteAuth {
            username: username.into(),
            password: password.into(),
        }
    }

    pub(crate) fn to_native(&self) -> Result<NativeAuth, Error> {
        let username = CString::new(self.username.as_str())?;
        let password = CString::new(self.password.as_str())?;
        let type_ = if self.username.is_empty() {
            raw::RPCAP_RMTAUTH_NULL
        } else {
            raw::RPCAP_RMTAUTH_PWD
        };
        let auth = raw::pcap_rmtauth {
            type_,
            username: username.as_ptr() as *mut _,
            password: password.as_ptr() as *mut _,
        };
        Ok(NativeAuth {
            auth,
            _username: username,
            _password: password,
        })
    }
}

impl fmt::Debug for RemoteAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteAuth")
            .field("username", &self.username)
            .field("password", &"<hidden>")
            .finish()
    }
}

/// `pcap_rmtauth` with the strings it points into.
pub(crate) struct NativeAuth {
    auth: raw::pcap_rmtauth,
    _username: CString,
    _password: CString,
}

impl NativeAuth {
    pub(crate) fn as_mut_ptr(&mut self) -> *mut raw::pcap_rmtauth {
        ptr::addr_of_mut!(self.auth)
    }
}

/// How a live session is opened.
///
/// Defaults: 65536 byte snapshot, promiscuous, 1000 ms read timeout, no authentication
/// and no netmask.
///
/// ```
/// use pcap_session::{LiveOptions, OpenFlags};
///
/// let options = LiveOptions::default()
///     .snaplen(128)
///     .flags(OpenFlags::PROMISCUOUS | OpenFlags::MAX_RESPONSIVENESS)
///     .timeout(100);
/// assert_eq!(options.read_timeout, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveOptions {
    pub snaplen: i32,
    pub flags: OpenFlags,
    /// Read timeout in milliseconds.
    pub read_timeout: i32,
    pub auth: Option<RemoteAuth>,
    /// Netmask used when compiling filters; broadcast tests need it.
    pub netmask: Option<Ipv4Addr>,
}

impl Default for LiveOptions {
    fn default() -> Self {
        LiveOptions {
            snaplen: 65536,
            flags: OpenFlags::PROMISCUOUS,
            read_timeout: 1000,
            auth: None,
            netmask: None,
        }
    }
}

impl LiveOptions {
    /// Set the snaplen size (the maximum length of a packet captured into the buffer).
    pub fn snaplen(mut self, to: i32) -> LiveOptions {
        self.snaplen = to;
        self
    }

    pub fn flags(mut self, flags: OpenFlags) -> LiveOptions {
        self.flags = flags;
        self
    }

    /// Set promiscuous mode on or off, leaving the other flags alone.
    pub fn promisc(mut self, to: bool) -> LiveOptions {
        self.flags.set(OpenFlags::PROMISCUOUS, to);
        self
    }

    /// Set the read timeout in milliseconds.
    pub fn timeout(mut self, ms: i32) -> LiveOptions {
        self.read_timeout = ms;
        self
    }

    pub fn auth(mut self, auth: RemoteAuth) -> LiveOptions {
        self.auth = Some(auth);
        self
    }

    pub fn netmask(mut self, netmask: Option<Ipv4Addr>) -> LiveOptions {
        self.netmask = netmask;
        self
    }
}
