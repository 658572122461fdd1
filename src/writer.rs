//! Bank file writer: sequential packet append, then finalize with index and checksum.
//!
//! The whole-file SHA-256 is fed as bytes are written, so finalize never has
//! to read the file back.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config_mask::ConfigMask;
use crate::error::{Diagnostic, Result, ResultExt};
use crate::format::{frame_packet, FileHeader, Footer, IndexEntry, CHECKSUM_LEN};
use crate::packet::Packet;

/// Summary returned by [`BankFileWriter::finalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeReport {
    pub num_packets: u32,
    /// Total file size including the trailer.
    pub bytes_written: u64,
    pub checksum: [u8; CHECKSUM_LEN],
}

impl FinalizeReport {
    /// Lowercase hex rendering of the checksum.
    #[must_use]
    pub fn checksum_hex(&self) -> String {
        self.checksum.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Exclusive writer for one bank file.
pub struct BankFileWriter {
    path: PathBuf,
    out: BufWriter<File>,
    hasher: Sha256,
    offset: u64,
    index: Vec<IndexEntry>,
    next_index: u32,
    run_number: u32,
    poisoned: bool,
}

impl BankFileWriter {
    /// Create (truncating) `path` and write the header.
    pub fn create<P: AsRef<Path>>(path: P, run_number: u32, config_mask: &ConfigMask) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .map_err(|e| Diagnostic::from(e).with_comment(format!("creating {}", path.display())))?;
        let mut writer = Self {
            path,
            out: BufWriter::new(file),
            hasher: Sha256::new(),
            offset: 0,
            index: Vec::new(),
            next_index: 0,
            run_number,
            poisoned: false,
        };
        let header = FileHeader::new(run_number, *config_mask).encode();
        writer.append(&header)?;
        info!(
            path = %writer.path.display(),
            run = run_number,
            telescopes = %config_mask,
            "created bank file"
        );
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_number(&self) -> u32 {
        self.run_number
    }

    /// Smallest index the next `write_packet` may use.
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    /// Bytes written so far, header included.
    pub fn bytes_written(&self) -> u64 {
        self.offset
    }

    /// Append `packet` at `index`. Indices skipped since the last call are
    /// written as empty packets.
    pub fn write_packet(&mut self, index: u32, packet: &Packet) -> Result<()> {
        self.check_usable()?;
        if index == u32::MAX {
            return Err(Diagnostic::index_out_of_bounds("packet index u32::MAX is reserved"));
        }
        if index < self.next_index {
            return Err(Diagnostic::index_out_of_bounds(format!(
                "packet index {index} already written (next is {})",
                self.next_index
            )));
        }
        // Serialize before touching the file so an incomplete record leaves
        // the file as it was.
        let body = packet
            .encode_body()
            .with_comment(|| format!("while writing packet {index}"))?;
        let frame = frame_packet(index, &body)?;

        if index > self.next_index {
            debug!(from = self.next_index, to = index, "filling skipped packet indices");
            let empty = Packet::new().encode_body()?;
            while self.next_index < index {
                let gap = frame_packet(self.next_index, &empty)?;
                self.append_packet(self.next_index, &gap)?;
            }
        }
        self.append_packet(index, &frame)?;
        debug!(index, len = frame.len(), banks = packet.len(), "wrote packet");
        Ok(())
    }

    /// Append `packet` at [`next_index`](Self::next_index).
    pub fn write_next_packet(&mut self, packet: &Packet) -> Result<()> {
        self.write_packet(self.next_index, packet)
    }

    /// Append an empty packet at [`next_index`](Self::next_index).
    pub fn write_empty_packet(&mut self) -> Result<()> {
        self.write_next_packet(&Packet::new())
    }

    /// Write the index trailer and checksum. The file is complete and
    /// random-access safe only once this returns `Ok`.
    pub fn finalize(mut self) -> Result<FinalizeReport> {
        self.check_usable()?;
        let index_offset = self.offset;
        let count = self.index.len() as u32;
        let mut trailer = Vec::with_capacity(self.index.len() * IndexEntry::ENTRY_SIZE);
        for entry in &self.index {
            entry.encode_into(&mut trailer);
        }
        trailer.extend_from_slice(&Footer::encode_prefix(count, index_offset));
        self.append(&trailer).comment("while writing index trailer")?;

        let mut checksum = [0u8; CHECKSUM_LEN];
        checksum.copy_from_slice(&self.hasher.clone().finalize());
        self.raw_write(&checksum)?;
        self.offset += CHECKSUM_LEN as u64;

        let file = self
            .out
            .into_inner()
            .map_err(|e| Diagnostic::from(e.into_error()).with_comment("flushing bank file"))?;
        file.sync_all()
            .map_err(|e| Diagnostic::from(e).with_comment("syncing bank file"))?;

        let report = FinalizeReport {
            num_packets: count,
            bytes_written: self.offset,
            checksum,
        };
        info!(
            path = %self.path.display(),
            packets = report.num_packets,
            bytes = report.bytes_written,
            checksum = %report.checksum_hex(),
            "finalized bank file"
        );
        Ok(report)
    }

    #[track_caller]
    fn check_usable(&self) -> Result<()> {
        if self.poisoned {
            Err(Diagnostic::file_io(format!(
                "{} is unusable after an earlier write failure",
                self.path.display()
            )))
        } else {
            Ok(())
        }
    }

    fn append_packet(&mut self, index: u32, frame: &[u8]) -> Result<()> {
        let entry = IndexEntry::for_frame(index, self.offset, frame.len() as u64).ok_or_else(|| {
            Diagnostic::usage(format!("packet {index} is {} bytes, too large to index", frame.len()))
        })?;
        self.append(frame)
            .with_comment(|| format!("while appending packet {index}"))?;
        self.index.push(entry);
        self.next_index = index + 1;
        Ok(())
    }

    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.raw_write(bytes)?;
        self.hasher.update(bytes);
        self.offset += bytes.len() as u64;
        Ok(())
    }

    fn raw_write(&mut self, bytes: &[u8]) -> Result<()> {
        if let Err(e) = self.out.write_all(bytes) {
            self.poisoned = true;
            return Err(Diagnostic::from(e).with_comment(format!("writing {}", self.path.display())));
        }
        Ok(())
    }
}

impl std::fmt::Debug for BankFileWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BankFileWriter")
            .field("path", &self.path)
            .field("run_number", &self.run_number)
            .field("next_index", &self.next_index)
            .field("offset", &self.offset)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}
