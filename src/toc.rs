//! Table of contents — the encrypted, concatenated sequence of `FileRecord`s
//! occupying the `[tocStart, fileSize)` region of the file.
//!
//! The TOC is AES-256-CBC encrypted (PKCS#7 padded) under the key/IV carried
//! in the header's TOC-info block. It has no length prefix of its own: the
//! plaintext's length is always a multiple of `RECORD_SIZE` because
//! `FileRecord::to_binary` emits fixed-size images and padding/unpadding is
//! handled entirely by the cipher.

use tracing::instrument;

use crate::crypto::{self, CryptoError};
use crate::record::{FileRecord, RecordError};

/// The table of contents is just a `Vec<FileRecord>` with the two
/// binary-codec operations spec.md §4.1 names for it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TableOfContents {
    pub records: Vec<FileRecord>,
}

impl TableOfContents {
    pub fn new(records: Vec<FileRecord>) -> Self {
        Self { records }
    }

    /// Encrypt the concatenation of every record's 256-byte image.
    #[instrument(skip_all, fields(records = self.records.len()))]
    pub fn to_binary(&self, key: &[u8; 32], iv: &[u8; 16]) -> Vec<u8> {
        let mut plaintext = Vec::with_capacity(self.records.len() * crate::record::RECORD_SIZE);
        for record in &self.records {
            plaintext.extend_from_slice(&record.to_binary());
        }
        crypto::aes256_cbc_encrypt(key, iv, &plaintext)
    }

    /// Decrypt and parse a TOC ciphertext produced by [`to_binary`].
    #[instrument(skip_all, fields(cipher_len = ciphertext.len()))]
    pub fn from_bytes(
        ciphertext: &[u8],
        key: &[u8; 32],
        iv: &[u8; 16],
    ) -> Result<Self, TocError> {
        let plaintext = crypto::aes256_cbc_decrypt(key, iv, ciphertext)?;
        let records = FileRecord::many(&plaintext)?;
        Ok(Self { records })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TocError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Record(#[from] RecordError),
}
