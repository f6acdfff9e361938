use pcap_session::{CaptureSession, DumpWriter, Linktype, ReceiveResult};

use crate::{at, mixed_traffic, TraceFile};

#[test]
fn test_copy_a_file() {
    require_engine!();
    let packets = mixed_traffic(4);
    let trace = TraceFile::new(&packets);
    let mut session = trace.open();

    let dir = tempfile::tempdir().unwrap();
    let copy = dir.path().join("copy.pcap");
    {
        let mut writer = session.open_dump(&copy).unwrap();
        assert_eq!(writer.position().unwrap(), 24);
        let result = session
            .receive_exactly(None, |p| writer.write_packet(&p))
            .unwrap();
        assert_eq!(result, ReceiveResult::Eof);
        writer.flush().unwrap();
    }

    let mut copied = Vec::new();
    CaptureSession::from_file(&copy)
        .unwrap()
        .receive_exactly(None, |p| copied.push(p.to_owned()))
        .unwrap();
    assert_eq!(copied, packets);
}

#[test]
fn test_timestamps_survive() {
    require_engine!();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ts.pcap");
    let when = at(1_234_567_890, 999_999);
    let packet = pcap_session::CapturedPacket::new(vec![0u8; 14], when, Linktype::ETHERNET);
    DumpWriter::dump(&path, Linktype::ETHERNET, 65535, [&packet]).unwrap();

    let mut session = CaptureSession::from_file(&path).unwrap();
    let (_, read) = session.receive_packet().unwrap();
    let read = read.unwrap();
    assert_eq!(read.timestamp(), when);
    assert_eq!(read.header.len, 14);
    assert_eq!(read.header.caplen, 14);
}

#[cfg(unix)]
#[test]
fn test_non_utf8_file_name() {
    use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

    require_engine!();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(OsStr::from_bytes(b"trace-\xe9.pcap"));
    let packets = mixed_traffic(2);
    DumpWriter::dump(&path, Linktype::ETHERNET, 65535, &packets).unwrap();

    let mut read = Vec::new();
    CaptureSession::from_file(&path)
        .unwrap()
        .receive_exactly(None, |p| read.push(p.to_owned()))
        .unwrap();
    assert_eq!(read, packets);
}
