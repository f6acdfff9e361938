//! Writing capture files that [`CaptureSession::from_file`](crate::CaptureSession::from_file)
//! can read back.

use std::{
    path::{Path, PathBuf},
    ptr::NonNull,
    sync::Arc,
};

use libc::c_uchar;

use crate::{
    capture::PcapHandle,
    linktype::Linktype,
    packet::{CapturedPacket, Packet, PacketHeader},
    path_to_cstring,
    raw::{self, Engine},
    Diagnostic, Error,
};

/// An open dump file. The file is completed and closed when the writer is dropped.
pub struct DumpWriter {
    engine: Arc<dyn Engine>,
    handle: NonNull<raw::pcap_dumper_t>,
    path: PathBuf,
}

// A DumpWriter owns its `pcap_dumper_t *` for its whole lifetime. libpcap does not promise
// thread-safe access to one dumper, so it is not Sync.
unsafe impl Send for DumpWriter {}

fn errno_diagnostic(summary: String) -> Diagnostic {
    Diagnostic::new(summary, Some(errno::errno().to_string()))
}

impl DumpWriter {
    /// Opens `path` for writing with the link type and snapshot length of `source`.
    pub(crate) fn open(source: &PcapHandle, path: &Path) -> Result<DumpWriter, Error> {
        let display = path.display().to_string();
        let name = path_to_cstring(path)?;

        let engine = source.engine().clone();
        let handle = NonNull::new(engine.pcap_dump_open(source.as_ptr(), name.as_ptr()))
            .ok_or_else(|| {
                Error::DumpFile(source.diagnostic(format!("Unable to open dump file {}", display)))
            })?;
        debug!("opened dump file {}", display);
        Ok(DumpWriter {
            engine,
            handle,
            path: path.to_path_buf(),
        })
    }

    /// Writes `packets` to a new file at `path`, without a session.
    pub fn dump<'a, P, I>(path: P, linktype: Linktype, snaplen: i32, packets: I) -> Result<(), Error>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = &'a CapturedPacket>,
    {
        DumpWriter::dump_with(raw::engine()?, path.as_ref(), linktype, snaplen, packets)
    }

    pub(crate) fn dump_with<'a, I>(
        engine: Arc<dyn Engine>,
        path: &Path,
        linktype: Linktype,
        snaplen: i32,
        packets: I,
    ) -> Result<(), Error>
    where
        I: IntoIterator<Item = &'a CapturedPacket>,
    {
        let dead = PcapHandle::open_dead(engine, linktype, snaplen)?;
        let mut writer = DumpWriter::open(&dead, path)?;
        for packet in packets {
            writer.write(packet)?;
        }
        writer.flush()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dump_raw(&mut self, header: &PacketHeader, data: &[u8]) {
        self.engine.pcap_dump(
            self.handle.as_ptr() as *mut c_uchar,
            header as *const PacketHeader as *const raw::pcap_pkthdr,
            data.as_ptr(),
        );
    }

    /// Writes an owned packet. Its timestamp is stored in UTC and both lengths are the
    /// byte count.
    pub fn write(&mut self, packet: &CapturedPacket) -> Result<(), Error> {
        let header = packet.header()?;
        self.dump_raw(&header, &packet.data);
        Ok(())
    }

    /// Writes a received packet with the header it was captured with.
    pub fn write_packet(&mut self, packet: &Packet<'_>) {
        let mut header = *packet.header;
        header.caplen = header.caplen.min(packet.data.len() as u32);
        self.dump_raw(&header, packet.data);
    }

    /// Flushes all the packets that haven't been written to the file.
    pub fn flush(&mut self) -> Result<(), Error> {
        if self.engine.pcap_dump_flush(self.handle.as_ptr()) != 0 {
            return Err(Error::DumpFile(errno_diagnostic(format!(
                "Failed flushing {}",
                self.path.display()
            ))));
        }
        Ok(())
    }

    /// Current size of the file in bytes, counting buffered data.
    pub fn position(&self) -> Result<u64, Error> {
        let position = self.engine.pcap_dump_ftell(self.handle.as_ptr());
        u64::try_from(position).map_err(|_| {
            Error::DumpFile(errno_diagnostic(format!(
                "Failed getting the position in {}",
                self.path.display()
            )))
        })
    }
}

impl Drop for DumpWriter {
    fn drop(&mut self) {
        trace!("closing dump file {}", self.path.display());
        self.engine.pcap_dump_close(self.handle.as_ptr());
    }
}
