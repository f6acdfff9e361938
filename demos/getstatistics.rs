use pcap_session::{Device, LiveOptions, Mode};

fn main() {
    // first device with an address
    let device = Device::list()
        .unwrap()
        .into_iter()
        .find(|d| !d.addresses.is_empty())
        .expect("no device available");
    println!("Using device {}", device.name);

    let mut session = device.open(&LiveOptions::default().timeout(1000)).unwrap();

    // Kernel-side counters need the WinPcap/Npcap statistics mode.
    match session.set_mode(Mode::Statistics) {
        Ok(()) => {
            for _ in 0..5 {
                if let (_, Some(sample)) = session.receive_statistics().unwrap() {
                    println!(
                        "{}: {} packets, {} bytes",
                        sample.timestamp(),
                        sample.accepted_packets(),
                        sample.accepted_bytes()
                    );
                }
            }
        }
        Err(e) => {
            println!("statistics mode unavailable: {}", e);
            session.receive_exactly(Some(10), |_| {}).unwrap();
        }
    }

    let stats = session.total_statistics().unwrap();
    println!(
        "Received: {}, dropped: {}, if_dropped: {}",
        stats.received, stats.dropped_by_driver, stats.dropped_by_interface
    );
}
