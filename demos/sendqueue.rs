use chrono::Local;
use pcap_session::{CaptureSession, CapturedPacket, Linktype, LiveOptions, SendBatch, SendSync};

const NUM_PACKETS: usize = 32;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        println!("{} <device>\n", args[0]);

        println!("Devices:");
        for dev in pcap_session::Device::list().unwrap() {
            println!("{}", dev.name);
        }
        return;
    }

    let mut session = CaptureSession::open_live(&args[1], &LiveOptions::default()).unwrap();

    // 1MB send queue.
    let mut batch = match SendBatch::new(1024 * 1024) {
        Ok(batch) => batch,
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    };

    // Broadcast frames from 01:02:03:04:05:06 with ethertype 0x5555.
    let mut pktbuf = [0u8; 14 + 256];
    pktbuf[0..6].copy_from_slice(&[0xff; 6]);
    pktbuf[6..12].copy_from_slice(&[1, 2, 3, 4, 5, 6]);
    pktbuf[12..14].copy_from_slice(&0x5555u16.to_be_bytes());

    for idx in 0..NUM_PACKETS {
        // Make the payload contain the packet index, u32 big-endian encoded.
        pktbuf[14..18].copy_from_slice(&(idx as u32).to_be_bytes());
        let packet = CapturedPacket::new(&pktbuf[..], Local::now(), Linktype::ETHERNET);
        batch.enqueue(&packet).unwrap();
    }

    session.transmit(&batch, SendSync::Off).unwrap();
    println!("sent {} packets, {} bytes", batch.packet_count(), batch.len());
}
