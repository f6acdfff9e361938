use std::{ffi::CString, fmt};

use crate::{
    cstr_to_string,
    raw::{self, Engine},
    Error,
};

/// A data link type (DLT) as understood by the engine.
///
/// `Linktype(1)` is Ethernet. The full registry is at
/// <http://www.tcpdump.org/linktypes.html>; the constants below cover the common ones.
/// ```rust
/// use pcap_session::Linktype;
///
/// assert_eq!(Linktype::ETHERNET, Linktype(1));
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct Linktype(pub i32);

impl Linktype {
    pub const NULL: Self = Self(0);
    pub const ETHERNET: Self = Self(1);
    pub const IEEE802_5: Self = Self(6);
    pub const PPP: Self = Self(9);
    pub const FDDI: Self = Self(10);
    pub const RAW: Self = Self(101);
    pub const IEEE802_11: Self = Self(105);
    pub const LOOP: Self = Self(108);
    pub const LINUX_SLL: Self = Self(113);
    pub const IEEE802_11_RADIOTAP: Self = Self(127);
    pub const IPV4: Self = Self(228);
    pub const IPV6: Self = Self(229);
    pub const LINUX_SLL2: Self = Self(276);

    /// The engine's short name, such as `EN10MB`.
    pub fn get_name(&self) -> Result<String, Error> {
        self.name_with(&*raw::engine()?)
    }

    /// The engine's description, such as `Ethernet`.
    pub fn get_description(&self) -> Result<String, Error> {
        self.description_with(&*raw::engine()?)
    }

    /// Looks up a link type by its short name.
    pub fn from_name(name: &str) -> Result<Linktype, Error> {
        Linktype::from_name_with(&*raw::engine()?, name)
    }

    pub(crate) fn name_with(&self, engine: &dyn Engine) -> Result<String, Error> {
        unsafe { cstr_to_string(engine.pcap_datalink_val_to_name(self.0)) }
            .ok_or_else(|| self.unknown())
    }

    pub(crate) fn description_with(&self, engine: &dyn Engine) -> Result<String, Error> {
        unsafe { cstr_to_string(engine.pcap_datalink_val_to_description(self.0)) }
            .ok_or_else(|| self.unknown())
    }

    pub(crate) fn from_name_with(engine: &dyn Engine, name: &str) -> Result<Linktype, Error> {
        let cname = CString::new(name)?;
        match engine.pcap_datalink_name_to_val(cname.as_ptr()) {
            -1 => Err(Error::InvalidArgument(format!(
                "unknown link-layer type name {:?}",
                name
            ))),
            val => Ok(Linktype(val)),
        }
    }

    fn unknown(&self) -> Error {
        Error::InvalidArgument(format!("unknown link-layer type {}", self.0))
    }
}

impl fmt::Display for Linktype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DLT {}", self.0)
    }
}
