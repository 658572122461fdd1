//! Bank file reader: open, load the trailer index (or rebuild it by scanning
//! an unfinished file), and read packets by index.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config_mask::ConfigMask;
use crate::error::{Diagnostic, Result, ResultExt};
use crate::format::{
    FileHeader, Footer, IndexEntry, PacketFrame, CHECKSUM_LEN, FOOTER_LEN, HEADER_LEN,
    PACKET_FRAME_LEN,
};
use crate::packet::Packet;
use crate::wire::ByteReader;

/// Random-access reader over one bank file.
pub struct BankFileReader {
    path: PathBuf,
    reader: BufReader<File>,
    header: FileHeader,
    /// Entry `i` describes packet `i`.
    index: Vec<IndexEntry>,
    stored_checksum: Option<[u8; CHECKSUM_LEN]>,
    file_size: u64,
    /// Stream offset after the last read; `None` when unknown.
    position: Option<u64>,
}

impl BankFileReader {
    /// Open `path` read-only and load its packet index.
    ///
    /// Files without a valid trailer (never finalized, or cut short) are
    /// scanned front to back to rebuild the index; such a reader reports
    /// `is_finalized() == false`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .map_err(|e| Diagnostic::from(e).with_comment(format!("opening {}", path.display())))?;
        let file_size = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut header_buf = [0u8; HEADER_LEN];
        reader
            .read_exact(&mut header_buf)
            .with_comment(|| format!("reading header of {}", path.display()))?;
        let header = FileHeader::decode(&header_buf)
            .with_comment(|| format!("reading header of {}", path.display()))?;

        let mut this = Self {
            path,
            reader,
            header,
            index: Vec::new(),
            stored_checksum: None,
            file_size,
            position: Some(HEADER_LEN as u64),
        };

        match this.load_trailer()? {
            Some((index, checksum)) => {
                this.index = index;
                this.stored_checksum = Some(checksum);
            }
            None => {
                warn!(
                    path = %this.path.display(),
                    "no valid index trailer, scanning packets sequentially"
                );
                this.index = this.scan()?;
            }
        }
        info!(
            path = %this.path.display(),
            run = this.header.run_number,
            packets = this.index.len(),
            finalized = this.is_finalized(),
            "opened bank file"
        );
        Ok(this)
    }

    /// Footer and index table, or `None` when either is missing or does not
    /// describe this file.
    fn load_trailer(&mut self) -> Result<Option<(Vec<IndexEntry>, [u8; CHECKSUM_LEN])>> {
        let min = (HEADER_LEN + FOOTER_LEN) as u64;
        if self.file_size < min {
            return Ok(None);
        }
        let mut footer_buf = [0u8; FOOTER_LEN];
        self.seek_to(self.file_size - FOOTER_LEN as u64)?;
        self.reader.read_exact(&mut footer_buf)?;
        self.position = None;
        let Some(footer) = Footer::parse(&footer_buf) else {
            return Ok(None);
        };

        let table_len = u64::from(footer.count) * IndexEntry::ENTRY_SIZE as u64;
        let trailer_end = footer
            .index_offset
            .checked_add(table_len + FOOTER_LEN as u64);
        if footer.index_offset < HEADER_LEN as u64 || trailer_end != Some(self.file_size) {
            debug!(
                index_offset = footer.index_offset,
                count = footer.count,
                "footer does not match file size"
            );
            return Ok(None);
        }

        self.seek_to(footer.index_offset)?;
        let mut table = vec![0u8; table_len as usize];
        self.reader.read_exact(&mut table)?;
        let mut r = ByteReader::new(&table, "index table");
        let mut entries = Vec::with_capacity(footer.count as usize);
        for i in 0..footer.count {
            let entry = IndexEntry::decode(&mut r)?;
            let in_bounds = entry.offset >= HEADER_LEN as u64
                && entry.length as usize >= PACKET_FRAME_LEN
                && entry
                    .offset
                    .checked_add(u64::from(entry.length))
                    .is_some_and(|end| end <= footer.index_offset);
            if entry.index != i || !in_bounds {
                debug!(slot = i, index = entry.index, "index entry inconsistent");
                return Ok(None);
            }
            entries.push(entry);
        }
        self.position = None;
        Ok(Some((entries, footer.checksum)))
    }

    /// Rebuild the index by walking packet frames from the header on.
    fn scan(&mut self) -> Result<Vec<IndexEntry>> {
        let mut entries = Vec::new();
        let mut pos = HEADER_LEN as u64;
        self.seek_to(pos)?;
        loop {
            if pos == self.file_size {
                break;
            }
            if pos + PACKET_FRAME_LEN as u64 > self.file_size {
                warn!(offset = pos, "ignoring truncated tail");
                break;
            }
            let mut frame_buf = [0u8; PACKET_FRAME_LEN];
            self.reader.read_exact(&mut frame_buf)?;
            let Some(frame) = PacketFrame::parse(&frame_buf) else {
                warn!(offset = pos, "ignoring non-packet data at end of file");
                break;
            };
            let length = PACKET_FRAME_LEN as u64 + u64::from(frame.body_len);
            if pos + length > self.file_size {
                warn!(offset = pos, index = frame.index, "ignoring truncated packet");
                break;
            }
            if frame.index as usize != entries.len() {
                return Err(Diagnostic::corruption(format!(
                    "packet at offset {pos} has index {}, expected {}",
                    frame.index,
                    entries.len()
                )));
            }
            let entry = IndexEntry::for_frame(frame.index, pos, length).ok_or_else(|| {
                Diagnostic::corruption(format!(
                    "packet {} at offset {pos} is {length} bytes, too large to index",
                    frame.index
                ))
            })?;
            entries.push(entry);
            self.reader.seek_relative(i64::from(frame.body_len))?;
            pos += length;
        }
        self.position = None;
        Ok(entries)
    }

    fn seek_to(&mut self, offset: u64) -> Result<()> {
        if self.position != Some(offset) {
            self.position = None;
            self.reader.seek(SeekFrom::Start(offset))?;
        }
        self.position = Some(offset);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn run_number(&self) -> u32 {
        self.header.run_number
    }

    pub fn config_mask(&self) -> &ConfigMask {
        &self.header.config_mask
    }

    pub fn format_version(&self) -> u16 {
        self.header.version
    }

    /// True when the index came from a finalize trailer rather than a scan.
    pub fn is_finalized(&self) -> bool {
        self.stored_checksum.is_some()
    }

    pub fn num_packets(&self) -> u32 {
        self.index.len() as u32
    }

    pub fn has_packet(&self, index: u32) -> bool {
        (index as usize) < self.index.len()
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn stored_checksum(&self) -> Option<&[u8; CHECKSUM_LEN]> {
        self.stored_checksum.as_ref()
    }

    /// Read packet `index`. Consecutive reads in index order do not seek.
    pub fn read_packet(&mut self, index: u32) -> Result<Packet> {
        let entry = *self.index.get(index as usize).ok_or_else(|| {
            Diagnostic::index_out_of_bounds(format!(
                "packet index {index} out of range (file has {} packets)",
                self.index.len()
            ))
        })?;
        self.read_entry(entry)
            .with_comment(|| format!("while reading packet {index} of {}", self.path.display()))
    }

    fn read_entry(&mut self, entry: IndexEntry) -> Result<Packet> {
        self.seek_to(entry.offset)?;
        self.position = None;
        let mut buf = vec![0u8; entry.length as usize];
        self.reader.read_exact(&mut buf)?;
        self.position = Some(entry.offset + u64::from(entry.length));

        let (frame_buf, body) = buf.split_at(PACKET_FRAME_LEN);
        let frame_buf: &[u8; PACKET_FRAME_LEN] = frame_buf
            .try_into()
            .map_err(|_| Diagnostic::corruption("short packet frame"))?;
        let frame = PacketFrame::parse(frame_buf).ok_or_else(|| {
            Diagnostic::corruption(format!("no packet magic at offset {}", entry.offset))
        })?;
        if frame.index != entry.index || frame.body_len as usize != body.len() {
            return Err(Diagnostic::corruption(format!(
                "packet frame (index {}, {} bytes) disagrees with index entry (index {}, {} bytes)",
                frame.index,
                frame.body_len,
                entry.index,
                body.len()
            )));
        }
        let mut packet = Packet::decode_body(body)?;
        packet.set_origin(self.header.run_number, entry.index);
        debug!(index = entry.index, banks = packet.len(), "read packet");
        Ok(packet)
    }

    /// Serial iterator over every packet in index order.
    pub fn packets(&mut self) -> Packets<'_> {
        Packets {
            reader: self,
            next: 0,
        }
    }

    /// Recompute the whole-file SHA-256 and compare it with the trailer.
    ///
    /// `Ok(false)` when the file has no trailer; `Corruption` on mismatch.
    pub fn verify_checksum(&mut self) -> Result<bool> {
        let Some(stored) = self.stored_checksum else {
            return Ok(false);
        };
        self.seek_to(0)?;
        self.position = None;
        let mut hasher = Sha256::new();
        let mut to_read = self.file_size - CHECKSUM_LEN as u64;
        let mut buf = [0u8; 8192];
        while to_read > 0 {
            let n = to_read.min(buf.len() as u64) as usize;
            self.reader.read_exact(&mut buf[..n])?;
            hasher.update(&buf[..n]);
            to_read -= n as u64;
        }
        let computed = hasher.finalize();
        if computed.as_slice() != &stored[..] {
            return Err(Diagnostic::corruption(format!(
                "checksum mismatch in {}",
                self.path.display()
            )));
        }
        Ok(true)
    }
}

impl std::fmt::Debug for BankFileReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BankFileReader")
            .field("path", &self.path)
            .field("header", &self.header)
            .field("num_packets", &self.index.len())
            .field("finalized", &self.is_finalized())
            .finish()
    }
}

/// Iterator returned by [`BankFileReader::packets`]. Stops after the first error.
pub struct Packets<'a> {
    reader: &'a mut BankFileReader,
    next: u32,
}

impl Iterator for Packets<'_> {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.reader.num_packets() {
            return None;
        }
        let result = self.reader.read_packet(self.next);
        self.next = if result.is_ok() {
            self.next + 1
        } else {
            self.reader.num_packets()
        };
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.reader.num_packets() - self.next) as usize;
        (left, Some(left))
    }
}
