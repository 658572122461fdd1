//! Minimal example: write a short synthetic run, then read it back serially
//! and by index.
//!
//! Run: cargo run --example write_and_read

use bankfile::{synthetic, BankFileReader, BankFileWriter, SyntheticRunConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = SyntheticRunConfig {
        num_packets: 10,
        num_channels: 32,
        num_samples: 16,
        ..SyntheticRunConfig::default()
    };

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("demo.vbf");

    let mut writer = BankFileWriter::create(&path, cfg.run_number, &cfg.config_mask())?;
    for i in 0..cfg.num_packets {
        writer.write_packet(i, &synthetic::build_packet(&cfg, i)?)?;
    }
    let report = writer.finalize()?;
    println!(
        "wrote {} packets, {} bytes, sha256 {}",
        report.num_packets,
        report.bytes_written,
        report.checksum_hex()
    );

    let mut reader = BankFileReader::open(&path)?;
    println!("run {} telescopes {}", reader.run_number(), reader.config_mask());
    for packet in reader.packets() {
        let packet = packet?;
        let ae = packet.array_event()?;
        println!(
            "  event {:?}: {} telescopes, sane: {}",
            ae.event_number(),
            ae.num_events(),
            ae.is_sane()
        );
    }

    let packet = reader.read_packet(7)?;
    if let Some(ev) = packet.array_event()?.event_by_node_number(1) {
        println!("packet 7 node 1: {} channels hit", ev.num_channels());
    }
    Ok(())
}
