//! Open arbitrary bytes as a bank file and read every packet. Errors are
//! fine; panics are not.

#![no_main]

use std::io::Write;

use bankfile::BankFileReader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(mut file) = tempfile::NamedTempFile::new() else {
        return;
    };
    if file.write_all(data).and_then(|()| file.flush()).is_err() {
        return;
    }
    let Ok(mut reader) = BankFileReader::open(file.path()) else {
        return;
    };
    for packet in reader.packets() {
        if packet.is_err() {
            break;
        }
    }
    let _ = reader.verify_checksum();
});
