//! Reader tests: trailer index, scan fallback for unfinished files, checksum and corruption handling.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use bankfile::format::HEADER_LEN;
use bankfile::{synthetic, BankFileReader, BankFileWriter, ErrorKind, SyntheticRunConfig};

fn small_config() -> SyntheticRunConfig {
    SyntheticRunConfig {
        num_packets: 6,
        num_samples: 16,
        num_channels: 40,
        ..SyntheticRunConfig::default()
    }
}

/// Write `n` packets; finalize only when asked.
fn write_run(path: &Path, n: u32, finalize: bool) {
    let cfg = small_config();
    let mut writer = BankFileWriter::create(path, cfg.run_number, &cfg.config_mask()).unwrap();
    for i in 0..n {
        writer.write_packet(i, &synthetic::build_packet(&cfg, i).unwrap()).unwrap();
    }
    if finalize {
        writer.finalize().unwrap();
    }
}

#[test]
fn random_access_in_any_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("random.vbf");
    write_run(&path, 6, true);

    let mut reader = BankFileReader::open(&path).unwrap();
    assert!(reader.is_finalized());
    for i in [4, 1, 5, 0, 3, 2] {
        let packet = reader.read_packet(i).unwrap();
        let ae = packet.array_event().unwrap();
        assert_eq!(ae.trigger().unwrap().event_number(), i);
        assert_eq!(ae.run_number(), Some(400));
    }
    assert!(reader.has_packet(5));
    assert!(!reader.has_packet(6));
}

/// A writer dropped without finalize leaves a file the reader rebuilds by scanning.
#[test]
fn unfinished_file_is_scanned() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("unfinished.vbf");
    write_run(&path, 4, false);

    let mut reader = BankFileReader::open(&path).unwrap();
    assert!(!reader.is_finalized());
    assert_eq!(reader.num_packets(), 4);
    assert_eq!(reader.stored_checksum(), None);
    assert!(!reader.verify_checksum().unwrap());

    let events: Vec<u32> = reader
        .packets()
        .map(|p| p.unwrap().array_event().unwrap().event_number().unwrap())
        .collect();
    assert_eq!(events, vec![0, 1, 2, 3]);
}

/// A half-written last packet is ignored by the scan.
#[test]
fn truncated_tail_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("truncated.vbf");
    write_run(&path, 3, false);

    let full = std::fs::metadata(&path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(full - 10).unwrap();
    drop(file);

    let mut reader = BankFileReader::open(&path).unwrap();
    assert_eq!(reader.num_packets(), 2);
    assert_eq!(reader.packets().filter(|p| p.is_ok()).count(), 2);
}

/// A finalized file whose trailer was cut off falls back to scanning.
#[test]
fn damaged_trailer_falls_back_to_scan() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trailer.vbf");
    write_run(&path, 3, true);

    let full = std::fs::metadata(&path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(full - 1).unwrap();
    drop(file);

    let reader = BankFileReader::open(&path).unwrap();
    assert!(!reader.is_finalized());
    assert_eq!(reader.num_packets(), 3);
}

/// A complete packet with an out-of-sequence index cannot be scanned past.
#[test]
fn non_dense_index_during_scan_is_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dense.vbf");
    write_run(&path, 1, false);

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"VPCK").unwrap();
    file.write_all(&5u32.to_le_bytes()).unwrap();
    file.write_all(&1u32.to_le_bytes()).unwrap();
    file.write_all(&[0]).unwrap();
    drop(file);

    let err = BankFileReader::open(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corruption);
}

#[test]
fn flipped_byte_fails_checksum() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flip.vbf");
    write_run(&path, 2, true);

    let mut bytes = std::fs::read(&path).unwrap();
    // The run number in the header: still a valid file, wrong digest.
    bytes[8] ^= 0x01;
    std::fs::write(&path, &bytes).unwrap();

    let mut reader = BankFileReader::open(&path).unwrap();
    assert!(reader.is_finalized());
    let err = reader.verify_checksum().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corruption);
    // Reads still work after the verification pass moved the cursor.
    reader.read_packet(1).unwrap();
}

#[test]
fn bad_magic_is_corruption() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[b'X'; HEADER_LEN]).unwrap();
    file.flush().unwrap();

    let err = BankFileReader::open(file.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corruption);
    assert!(err.message().contains("magic"));
}

#[test]
fn short_header_is_corruption() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"VBKF").unwrap();
    file.flush().unwrap();

    let err = BankFileReader::open(file.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corruption);
}

#[test]
fn missing_file_is_file_io() {
    let dir = tempfile::tempdir().unwrap();
    let err = BankFileReader::open(dir.path().join("absent.vbf")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileIo);
}
