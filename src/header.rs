//! `Header` — fixed 520-byte file prologue carrying the RSA-sealed TOC info.
//!
//! # On-disk layout (520 bytes)
//!
//! ```text
//! Offset  Len  Field           Semantics
//!    0     5   magic           ASCII "BULK#"
//!    5     3   version         ASCII hex nibbles, e.g. "0.1" — major nibble
//!                               (byte 5) must be '0' for this crate to open
//!                               the file; minor/patch are informational
//!    8   512   tocInfoCipher   RSA-4096-OAEP ciphertext of a 256-byte
//!                               plaintext block (see `TocInfo`)
//! ```
//!
//! `TocInfo` (the 256-byte plaintext sealed inside `tocInfoCipher`):
//!
//! ```text
//! Offset  Len  Field     Semantics
//!    0    32   tocKey    AES-256 key protecting the table of contents
//!   32    16   tocIv     IV for the table-of-contents cipher
//!   48     8   tocStart  LE i64 byte offset where the TOC begins
//!   56   200   random    padding, freshly randomized on every write
//! ```

use byteorder::{ByteOrder, LittleEndian};
use rand::RngCore;
use thiserror::Error;
use tracing::debug;

use crate::crypto::{self, CryptoError};
use rsa::{RsaPrivateKey, RsaPublicKey};

pub const HEADER_SIZE: usize = 520;
pub const MAGIC: &[u8; 5] = b"BULK#";
const TOC_INFO_SIZE: usize = 256;
const TOC_INFO_CIPHER_SIZE: usize = 512;

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("bad magic bytes — not a bulkstore file")]
    InvalidMagic,
    #[error("unsupported format version (major nibble {0:?})")]
    UnsupportedVersion(u8),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The decrypted contents of the header's TOC-info block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocInfo {
    pub toc_key: [u8; 32],
    pub toc_iv: [u8; 16],
    pub toc_start: i64,
}

impl TocInfo {
    fn to_binary(&self) -> [u8; TOC_INFO_SIZE] {
        let mut buf = [0u8; TOC_INFO_SIZE];
        buf[0..32].copy_from_slice(&self.toc_key);
        buf[32..48].copy_from_slice(&self.toc_iv);
        LittleEndian::write_i64(&mut buf[48..56], self.toc_start);
        rand::thread_rng().fill_bytes(&mut buf[56..256]);
        buf
    }

    fn from_bytes(buf: &[u8]) -> Self {
        let toc_key: [u8; 32] = buf[0..32].try_into().unwrap();
        let toc_iv: [u8; 16] = buf[32..48].try_into().unwrap();
        let toc_start = LittleEndian::read_i64(&buf[48..56]);
        Self {
            toc_key,
            toc_iv,
            toc_start,
        }
    }
}

/// Version triple written into bytes 5..8 as ASCII hex nibbles. Only the
/// major nibble is load-bearing — this crate accepts any file whose major
/// nibble is `'0'`, per spec.md §4.1 (a permissive choice, not tightened;
/// see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl FormatVersion {
    pub const CURRENT: FormatVersion = FormatVersion {
        major: 0,
        minor: 1,
        patch: 0,
    };

    fn to_ascii(self) -> [u8; 3] {
        [
            Self::nibble_to_ascii(self.major),
            Self::nibble_to_ascii(self.minor),
            Self::nibble_to_ascii(self.patch),
        ]
    }

    fn from_ascii(buf: &[u8]) -> Result<Self, HeaderError> {
        let major = Self::ascii_to_nibble(buf[0])?;
        let minor = Self::ascii_to_nibble(buf[1])?;
        let patch = Self::ascii_to_nibble(buf[2])?;
        if major != 0 {
            return Err(HeaderError::UnsupportedVersion(major));
        }
        Ok(Self {
            major,
            minor,
            patch,
        })
    }

    fn nibble_to_ascii(n: u8) -> u8 {
        char::from_digit(n as u32 & 0xF, 16)
            .expect("nibble is always 0..=15")
            .to_ascii_lowercase() as u8
    }

    fn ascii_to_nibble(c: u8) -> Result<u8, HeaderError> {
        (c as char)
            .to_digit(16)
            .map(|d| d as u8)
            .ok_or(HeaderError::UnsupportedVersion(c))
    }
}

/// The 520-byte file prologue.
#[derive(Debug, Clone)]
pub struct Header {
    pub version: FormatVersion,
    pub toc_info: TocInfo,
}

impl Header {
    pub fn new(toc_key: [u8; 32], toc_iv: [u8; 16], toc_start: i64) -> Self {
        Self {
            version: FormatVersion::CURRENT,
            toc_info: TocInfo {
                toc_key,
                toc_iv,
                toc_start,
            },
        }
    }

    /// Serialize, sealing the TOC-info block under `public_key` with
    /// RSA-OAEP. The padding bytes of `TocInfo` are freshly randomized on
    /// every call, so two serializations of the same header differ in
    /// their ciphertext.
    pub fn to_binary(&self, public_key: &RsaPublicKey) -> Result<[u8; HEADER_SIZE], HeaderError> {
        let plaintext = self.toc_info.to_binary();
        let cipher = crypto::rsa_encrypt(public_key, &plaintext)?;
        debug_assert_eq!(cipher.len(), TOC_INFO_CIPHER_SIZE);

        let mut buf = [0u8; HEADER_SIZE];
        buf[0..5].copy_from_slice(MAGIC);
        buf[5..8].copy_from_slice(&self.version.to_ascii());
        buf[8..8 + TOC_INFO_CIPHER_SIZE].copy_from_slice(&cipher);
        Ok(buf)
    }

    /// Parse and unseal a header image. Requires the matching RSA private
    /// key and its PEM passphrase to decrypt the TOC-info block.
    pub fn from_bytes(
        buf: &[u8],
        private_key: &RsaPrivateKey,
    ) -> Result<Self, HeaderError> {
        if buf.len() < HEADER_SIZE {
            return Err(HeaderError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "header buffer shorter than 520 bytes",
            )));
        }
        if &buf[0..5] != MAGIC {
            return Err(HeaderError::InvalidMagic);
        }
        let version = FormatVersion::from_ascii(&buf[5..8])?;
        let cipher = &buf[8..8 + TOC_INFO_CIPHER_SIZE];
        let plaintext = crypto::rsa_decrypt(private_key, cipher)?;
        debug!(len = plaintext.len(), "header: TOC-info block unsealed");
        let toc_info = TocInfo::from_bytes(&plaintext);

        Ok(Self { version, toc_info })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{gen_key, load_private_key, load_public_key};

    fn keypair() -> (RsaPrivateKey, RsaPublicKey) {
        let (priv_pem, pub_pem) = gen_key("test-passphrase").unwrap();
        (
            load_private_key(&priv_pem, "test-passphrase").unwrap(),
            load_public_key(&pub_pem).unwrap(),
        )
    }

    #[test]
    fn round_trip() {
        let (private_key, public_key) = keypair();
        let header = Header::new([7u8; 32], [9u8; 16], 1_048_576);

        let bin = header.to_binary(&public_key).unwrap();
        assert_eq!(bin.len(), HEADER_SIZE);
        assert_eq!(&bin[0..5], MAGIC);

        let back = Header::from_bytes(&bin, &private_key).unwrap();
        assert_eq!(back.toc_info.toc_key, [7u8; 32]);
        assert_eq!(back.toc_info.toc_iv, [9u8; 16]);
        assert_eq!(back.toc_info.toc_start, 1_048_576);
    }

    #[test]
    fn two_serializations_differ_in_ciphertext() {
        let (_private_key, public_key) = keypair();
        let header = Header::new([1u8; 32], [2u8; 16], 520);
        let a = header.to_binary(&public_key).unwrap();
        let b = header.to_binary(&public_key).unwrap();
        assert_ne!(a[8..], b[8..]);
    }

    #[test]
    fn rejects_bad_magic() {
        let (private_key, public_key) = keypair();
        let header = Header::new([0u8; 32], [0u8; 16], 520);
        let mut bin = header.to_binary(&public_key).unwrap();
        bin[0] = b'X';
        assert!(matches!(
            Header::from_bytes(&bin, &private_key),
            Err(HeaderError::InvalidMagic)
        ));
    }

    #[test]
    fn rejects_wrong_private_key() {
        let (_private_key, public_key) = keypair();
        let (other_private_key, _other_public_key) = keypair();
        let header = Header::new([3u8; 32], [4u8; 16], 520);
        let bin = header.to_binary(&public_key).unwrap();
        assert!(Header::from_bytes(&bin, &other_private_key).is_err());
    }
}
