//! Prints the packets of a capture file that match a filter.
use pcap_session::CaptureSession;
use std::{env, process};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("Usage: {} <file> [filter]", args[0]);
        process::exit(1);
    }

    let mut session = CaptureSession::from_file(&args[1]).unwrap();
    let (major, minor) = session.file_version().unwrap();
    println!(
        "{}: format {}.{}, link type {:?}",
        session.name(),
        major,
        minor,
        session.linktype()
    );
    if let Some(filter) = args.get(2) {
        session.set_filter_expression(filter).unwrap();
    }

    let mut packets = session.packets(None);
    for packet in packets.by_ref() {
        let packet = packet.unwrap();
        println!("{} {} bytes", packet.timestamp, packet.len());
    }
    println!("stopped with {:?}", packets.result());
}
