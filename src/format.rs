//! Bank file binary layout: header, packet frame, trailer index and footer.
//!
//! All multi-byte fields are little-endian.
//!
//! ```text
//! header   VBKF | u16 version | u16 reserved | u32 run | 32-byte config mask
//! packet   VPCK | u32 index | u32 body length | body
//! trailer  index entries (u32 index, u64 offset, u32 length) ...
//! footer   u32 count | u64 index offset | VIDX | SHA-256 of all preceding bytes
//! ```

use crate::config_mask::{ConfigMask, CONFIG_MASK_LEN};
use crate::error::{Diagnostic, Result};
use crate::wire::{ByteReader, WriteLeExt};

/// Magic bytes at the start of every bank file: "VBKF".
pub const FILE_MAGIC: [u8; 4] = *b"VBKF";

/// Format version written by the writer; readers reject newer versions.
pub const FORMAT_VERSION: u16 = 1;

/// Magic bytes opening every packet frame: "VPCK".
pub const PACKET_MAGIC: [u8; 4] = *b"VPCK";

/// Magic bytes in the footer: "VIDX".
pub const INDEX_MAGIC: [u8; 4] = *b"VIDX";

/// Length of the SHA-256 digest closing the file.
pub const CHECKSUM_LEN: usize = 32;

pub const HEADER_LEN: usize = 4 + 2 + 2 + 4 + CONFIG_MASK_LEN;

/// Packet frame before the body: magic, index, body length.
pub const PACKET_FRAME_LEN: usize = 4 + 4 + 4;

/// Footer: count + index offset + magic + digest.
pub const FOOTER_LEN: usize = 4 + 8 + 4 + CHECKSUM_LEN;

/// Parsed file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u16,
    pub run_number: u32,
    pub config_mask: ConfigMask,
}

impl FileHeader {
    #[must_use]
    pub fn new(run_number: u32, config_mask: ConfigMask) -> Self {
        Self {
            version: FORMAT_VERSION,
            run_number,
            config_mask,
        }
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.put_bytes(&FILE_MAGIC);
        out.put_u16_le(self.version);
        out.put_u16_le(0);
        out.put_u32_le(self.run_number);
        self.config_mask.encode_into(&mut out);
        out
    }

    pub(crate) fn decode(buf: &[u8; HEADER_LEN]) -> Result<Self> {
        let mut r = ByteReader::new(buf, "file header");
        if r.take(4)? != FILE_MAGIC {
            return Err(Diagnostic::corruption("invalid magic: expected VBKF"));
        }
        let version = r.u16_le()?;
        if version > FORMAT_VERSION {
            return Err(Diagnostic::corruption(format!(
                "unsupported format version {version} (supported: {FORMAT_VERSION})"
            )));
        }
        r.u16_le()?;
        let run_number = r.u32_le()?;
        let config_mask = ConfigMask::decode(&mut r)?;
        Ok(Self {
            version,
            run_number,
            config_mask,
        })
    }
}

/// One trailer entry: packet index to (offset, length) of its whole frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub index: u32,
    pub offset: u64,
    pub length: u32,
}

impl IndexEntry {
    /// Size of one entry in the file: index (4) + offset (8) + length (4).
    pub const ENTRY_SIZE: usize = 4 + 8 + 4;

    /// Entry for a frame of `frame_len` bytes, or `None` when the length does
    /// not fit the entry's u32 field.
    pub(crate) fn for_frame(index: u32, offset: u64, frame_len: u64) -> Option<Self> {
        Some(Self {
            index,
            offset,
            length: u32::try_from(frame_len).ok()?,
        })
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        out.put_u32_le(self.index);
        out.put_u64_le(self.offset);
        out.put_u32_le(self.length);
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            index: r.u32_le()?,
            offset: r.u64_le()?,
            length: r.u32_le()?,
        })
    }
}

/// Frame a packet body: magic, index, length, body.
pub(crate) fn frame_packet(index: u32, body: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(body.len())
        .map_err(|_| Diagnostic::usage(format!("packet {index} exceeds 4 GiB")))?;
    let mut out = Vec::with_capacity(PACKET_FRAME_LEN + body.len());
    out.put_bytes(&PACKET_MAGIC);
    out.put_u32_le(index);
    out.put_u32_le(len);
    out.put_bytes(body);
    Ok(out)
}

/// Parsed packet frame prefix.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PacketFrame {
    pub index: u32,
    pub body_len: u32,
}

impl PacketFrame {
    /// `None` when the bytes do not start with the packet magic.
    pub(crate) fn parse(buf: &[u8; PACKET_FRAME_LEN]) -> Option<Self> {
        if buf[..4] != PACKET_MAGIC {
            return None;
        }
        let mut r = ByteReader::new(&buf[4..], "packet frame");
        Some(Self {
            index: r.u32_le().ok()?,
            body_len: r.u32_le().ok()?,
        })
    }
}

/// Parsed footer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Footer {
    pub count: u32,
    pub index_offset: u64,
    pub checksum: [u8; CHECKSUM_LEN],
}

impl Footer {
    pub(crate) fn encode_prefix(count: u32, index_offset: u64) -> Vec<u8> {
        let mut out = Vec::with_capacity(FOOTER_LEN - CHECKSUM_LEN);
        out.put_u32_le(count);
        out.put_u64_le(index_offset);
        out.put_bytes(&INDEX_MAGIC);
        out
    }

    /// `None` when the footer magic is absent.
    pub(crate) fn parse(buf: &[u8; FOOTER_LEN]) -> Option<Self> {
        let mut r = ByteReader::new(buf, "footer");
        let count = r.u32_le().ok()?;
        let index_offset = r.u64_le().ok()?;
        if r.take(4).ok()? != INDEX_MAGIC {
            return None;
        }
        let mut checksum = [0u8; CHECKSUM_LEN];
        checksum.copy_from_slice(r.take(CHECKSUM_LEN).ok()?);
        Some(Self {
            count,
            index_offset,
            checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip_and_bad_magic() {
        let header = FileHeader::new(7, ConfigMask::parse("0,3").unwrap());
        let bytes = header.encode();
        assert_eq!(bytes.len(), HEADER_LEN);
        let arr: [u8; HEADER_LEN] = bytes.as_slice().try_into().unwrap();
        assert_eq!(FileHeader::decode(&arr).unwrap(), header);

        let mut bad = arr;
        bad[0] = b'X';
        assert!(FileHeader::decode(&bad).is_err());
    }

    #[test]
    fn newer_version_rejected() {
        let mut arr: [u8; HEADER_LEN] =
            FileHeader::new(1, ConfigMask::new()).encode().as_slice().try_into().unwrap();
        arr[4] = 9;
        let err = FileHeader::decode(&arr).unwrap_err();
        assert!(err.message().contains("unsupported"));
    }

    #[test]
    fn frame_length_must_fit_entry() {
        let max = IndexEntry::for_frame(2, 44, u64::from(u32::MAX)).unwrap();
        assert_eq!(max.length, u32::MAX);
        assert!(IndexEntry::for_frame(2, 44, u64::from(u32::MAX) + 1).is_none());
        // Largest body plus its frame prefix no longer fits.
        let biggest = u64::from(u32::MAX) + PACKET_FRAME_LEN as u64;
        assert!(IndexEntry::for_frame(2, 44, biggest).is_none());
    }

    #[test]
    fn footer_requires_magic() {
        let mut buf = Footer::encode_prefix(3, 1234);
        buf.extend_from_slice(&[0xAB; CHECKSUM_LEN]);
        let arr: [u8; FOOTER_LEN] = buf.as_slice().try_into().unwrap();
        let footer = Footer::parse(&arr).unwrap();
        assert_eq!(footer.count, 3);
        assert_eq!(footer.index_offset, 1234);
        let mut broken = arr;
        broken[12] = 0;
        assert!(Footer::parse(&broken).is_none());
    }
}
