//! `FileRecord` — fixed 256-byte on-disk metadata entry for one blob.
//!
//! # On-disk layout (256 bytes, all numeric fields little-endian)
//!
//! ```text
//! Offset  Len  Field    Semantics
//!    0     16  uuid     opaque stable blob identifier
//!   16      8  start    ciphertext start offset, LE i64
//!   24      8  end      ciphertext end offset (exclusive), LE i64
//!   32     32  key      symmetric key for this blob's body
//!   64     16  iv       initialization vector for this blob's body
//!   80      4  crc      CRC-32 of plaintext, LE u32
//!   84     16  md5      MD5 of plaintext
//!  100     32  sha256   SHA-256 of plaintext
//!  132      8  ctime    creation time, epoch-ms, LE i64
//!  140      2  flags    bit0 BUSY, bit1 DELETED, bit2 NOT_READY
//!  142    114  zero     zero-padded reserved
//! ```
//!
//! Reserved bytes are always written as zero and always ignored on parse.
//! There is no per-record version field — the 256-byte layout is the only
//! one this crate supports (see DESIGN.md for the 128-byte legacy variant
//! this crate deliberately does not read).

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// Fixed on-disk size of one `FileRecord`.
pub const RECORD_SIZE: usize = 256;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RecordError {
    #[error("record start {start} >= end {end}")]
    StartNotBeforeEnd { start: i64, end: i64 },
    #[error("buffer too short for a record: got {0} bytes, need {RECORD_SIZE}")]
    BufferTooShort(usize),
}

/// Bit-field flags for a `FileRecord`. A single u16; `BUSY` and
/// `NOT_READY` are reserved for future concurrency control and are never
/// set by this crate's own code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordFlags(pub u16);

impl RecordFlags {
    pub const BUSY: u16 = 1 << 0;
    pub const DELETED: u16 = 1 << 1;
    pub const NOT_READY: u16 = 1 << 2;

    #[inline]
    pub fn empty() -> Self {
        RecordFlags(0)
    }

    #[inline]
    pub fn is_normal(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn is_set(self, bit: u16) -> bool {
        self.0 & bit != 0
    }

    #[inline]
    pub fn set(&mut self, bit: u16) {
        self.0 |= bit;
    }

    #[inline]
    pub fn clear(&mut self, bit: u16) {
        self.0 &= !bit;
    }

    /// Flip `bit`. Calling this twice with the same `bit` is a no-op —
    /// `toggle` is its own inverse.
    #[inline]
    pub fn toggle(&mut self, bit: u16) {
        self.0 ^= bit;
    }

    #[inline]
    pub fn is_deleted(self) -> bool {
        self.is_set(Self::DELETED)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub uuid: Uuid,
    pub start: i64,
    pub end: i64,
    pub key: [u8; 32],
    pub iv: [u8; 16],
    pub crc: u32,
    pub md5: [u8; 16],
    pub sha256: [u8; 32],
    pub ctime: i64,
    pub flags: RecordFlags,
}

impl FileRecord {
    /// Construct a record, validating `start < end`.
    pub fn new(
        uuid: Uuid,
        start: i64,
        end: i64,
        key: [u8; 32],
        iv: [u8; 16],
        crc: u32,
        md5: [u8; 16],
        sha256: [u8; 32],
        ctime: i64,
    ) -> Result<Self, RecordError> {
        if start >= end {
            return Err(RecordError::StartNotBeforeEnd { start, end });
        }
        Ok(Self {
            uuid,
            start,
            end,
            key,
            iv,
            crc,
            md5,
            sha256,
            ctime,
            flags: RecordFlags::empty(),
        })
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.flags.is_deleted()
    }

    /// Serialize into the fixed 256-byte on-disk image. Reserved bytes are
    /// written as zero.
    pub fn to_binary(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];

        buf[0..16].copy_from_slice(self.uuid.as_bytes());
        LittleEndian::write_i64(&mut buf[16..24], self.start);
        LittleEndian::write_i64(&mut buf[24..32], self.end);
        buf[32..64].copy_from_slice(&self.key);
        buf[64..80].copy_from_slice(&self.iv);
        LittleEndian::write_u32(&mut buf[80..84], self.crc);
        buf[84..100].copy_from_slice(&self.md5);
        buf[100..132].copy_from_slice(&self.sha256);
        LittleEndian::write_i64(&mut buf[132..140], self.ctime);
        LittleEndian::write_u16(&mut buf[140..142], self.flags.0);
        // buf[142..256] stays zero — reserved.

        buf
    }

    /// Parse one 256-byte record image. `InvalidRecord` on `start >= end`.
    /// Reserved bytes are ignored.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, RecordError> {
        if buf.len() < RECORD_SIZE {
            return Err(RecordError::BufferTooShort(buf.len()));
        }

        let uuid = Uuid::from_bytes(buf[0..16].try_into().unwrap());
        let start = LittleEndian::read_i64(&buf[16..24]);
        let end = LittleEndian::read_i64(&buf[24..32]);
        if start >= end {
            return Err(RecordError::StartNotBeforeEnd { start, end });
        }
        let key: [u8; 32] = buf[32..64].try_into().unwrap();
        let iv: [u8; 16] = buf[64..80].try_into().unwrap();
        let crc = LittleEndian::read_u32(&buf[80..84]);
        let md5: [u8; 16] = buf[84..100].try_into().unwrap();
        let sha256: [u8; 32] = buf[100..132].try_into().unwrap();
        let ctime = LittleEndian::read_i64(&buf[132..140]);
        let flags = RecordFlags(LittleEndian::read_u16(&buf[140..142]));

        Ok(Self {
            uuid,
            start,
            end,
            key,
            iv,
            crc,
            md5,
            sha256,
            ctime,
            flags,
        })
    }

    /// Parse `len(buf) / RECORD_SIZE` contiguous records. A trailing
    /// partial buffer (`len(buf) % RECORD_SIZE != 0`) is ignored, with a
    /// warning — it never aborts the parse of the records that do fit.
    pub fn many(buf: &[u8]) -> Result<Vec<FileRecord>, RecordError> {
        let n = buf.len() / RECORD_SIZE;
        let remainder = buf.len() % RECORD_SIZE;
        if remainder != 0 {
            warn!(
                remainder,
                "FileRecord::many: trailing {} byte(s) do not form a complete record — ignoring",
                remainder
            );
        }

        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let start = i * RECORD_SIZE;
            out.push(FileRecord::from_bytes(&buf[start..start + RECORD_SIZE])?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> FileRecord {
        FileRecord::new(
            Uuid::new_v4(),
            520,
            1000,
            [7u8; 32],
            [9u8; 16],
            0xdead_beef,
            [1u8; 16],
            [2u8; 32],
            1_700_000_000_000,
        )
        .unwrap()
    }

    #[test]
    fn round_trip_single_record() {
        let r = sample_record();
        let bin = r.to_binary();
        assert_eq!(bin.len(), RECORD_SIZE);
        let back = FileRecord::from_bytes(&bin).unwrap();
        assert_eq!(r, back);
    }

    #[test]
    fn round_trip_many() {
        let records: Vec<FileRecord> = (0..5)
            .map(|i| {
                FileRecord::new(
                    Uuid::new_v4(),
                    520 + i * 100,
                    520 + i * 100 + 50,
                    [i as u8; 32],
                    [i as u8; 16],
                    i as u32,
                    [i as u8; 16],
                    [i as u8; 32],
                    1_700_000_000_000 + i,
                )
                .unwrap()
            })
            .collect();

        let mut buf = Vec::new();
        for r in &records {
            buf.extend_from_slice(&r.to_binary());
        }

        let parsed = FileRecord::many(&buf).unwrap();
        assert_eq!(parsed, records);
    }

    #[test]
    fn many_ignores_trailing_partial_buffer() {
        let r = sample_record();
        let mut buf = r.to_binary().to_vec();
        buf.extend_from_slice(&[0xAAu8; 37]); // trailing partial garbage

        let parsed = FileRecord::many(&buf).unwrap();
        assert_eq!(parsed, vec![r]);
    }

    #[test]
    fn empty_buffer_yields_empty_sequence() {
        assert_eq!(FileRecord::many(&[]).unwrap(), Vec::new());
    }

    #[test]
    fn invalid_record_start_ge_end() {
        let err = FileRecord::new(
            Uuid::new_v4(),
            10,
            5,
            [0u8; 32],
            [0u8; 16],
            0,
            [0u8; 16],
            [0u8; 32],
            0,
        )
        .unwrap_err();
        assert_eq!(
            err,
            RecordError::StartNotBeforeEnd { start: 10, end: 5 }
        );
    }

    #[test]
    fn flags_normal_and_toggle_is_its_own_inverse() {
        let mut flags = RecordFlags::empty();
        assert!(flags.is_normal());

        flags.toggle(RecordFlags::DELETED);
        assert!(!flags.is_normal());
        assert!(flags.is_deleted());

        flags.toggle(RecordFlags::DELETED);
        assert!(flags.is_normal());
        assert!(!flags.is_deleted());
    }

    #[test]
    fn setting_deleted_implies_not_normal() {
        let mut flags = RecordFlags::empty();
        flags.set(RecordFlags::DELETED);
        assert!(!flags.is_normal());
    }
}
