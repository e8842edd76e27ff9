//! Error taxonomy for the storage engine.
//!
//! One variant per semantic failure kind the controller can surface; see
//! `storage.rs` for where each is raised. Propagation is always a plain
//! `Result` — there is no callback-plus-return pattern anywhere in this
//! crate.

use std::io;
use thiserror::Error;

use crate::backend::BackendError;
use crate::crypto::CryptoError;
use crate::header::HeaderError;
use crate::record::RecordError;
use crate::toc::TocError;

#[derive(Error, Debug)]
pub enum StorageError {
    /// Any operation attempted after `close()`. Non-recoverable for the
    /// instance; open a fresh `BulkStorage` instead.
    #[error("storage is closed")]
    StorageClosed,

    /// Underlying file operation failed. For `add`, this is always preceded
    /// by a best-effort truncation back to the reserved offset.
    #[error("I/O failure: {0}")]
    IoFailure(#[from] io::Error),

    /// RSA or AES operation failed — wrong key, corrupt ciphertext, unpad
    /// error.
    #[error("cryptographic failure: {0}")]
    CryptoFailure(#[from] CryptoError),

    /// Magic mismatch or unsupported major version at `open`.
    #[error("incompatible file: {0}")]
    IncompatibleFile(String),

    /// `add` terminated before the encryptor emitted a final chunk (source
    /// error, stream closed early). File state is rolled back to pre-`add`.
    #[error("write aborted: {0}")]
    WriteAborted(String),

    /// `start >= end`, or a key/IV buffer was the wrong length, while
    /// parsing a record.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Reserved for features described but intentionally unimplemented by
    /// an embedding collaborator. Never constructed by this crate itself —
    /// `purge` (the one operation spec.md flagged as optional) is fully
    /// implemented here.
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl From<HeaderError> for StorageError {
    fn from(e: HeaderError) -> Self {
        match e {
            HeaderError::InvalidMagic | HeaderError::UnsupportedVersion(_) => {
                StorageError::IncompatibleFile(e.to_string())
            }
            HeaderError::Crypto(c) => StorageError::CryptoFailure(c),
            HeaderError::Io(e) => StorageError::IoFailure(e),
        }
    }
}

impl From<RecordError> for StorageError {
    fn from(e: RecordError) -> Self {
        StorageError::InvalidRecord(e.to_string())
    }
}

impl From<TocError> for StorageError {
    fn from(e: TocError) -> Self {
        match e {
            TocError::Crypto(c) => StorageError::CryptoFailure(c),
            TocError::Record(r) => StorageError::InvalidRecord(r.to_string()),
        }
    }
}

impl From<BackendError> for StorageError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Io(e) => StorageError::IoFailure(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
