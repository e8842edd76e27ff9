//! `BulkStorage` — the controller tying the binary codec, crypto primitives,
//! and file backend into the single-file encrypted container described in
//! the crate's module docs.
//!
//! Every mutating operation takes `&mut self`; Rust's borrow checker is the
//! "one-slot writer gate" spec.md §5 asks for — a caller cannot issue a
//! second mutating call while one is in flight without first regaining
//! exclusive access to the `BulkStorage` value. Sharing one instance across
//! concurrent tasks is done by wrapping it in `Arc<tokio::sync::Mutex<..>>`
//! at the call site (see `queue.rs` for a collaborator that does exactly
//! this with per-task timeouts).

use std::path::Path;

use md5::Md5;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::backend::FileBackend;
use crate::crypto::{self, KdfParams};
use crate::error::{Result, StorageError};
use crate::header::{Header, HEADER_SIZE};
use crate::record::FileRecord;
use crate::toc::TableOfContents;

/// Create-time configuration. Mirrors the teacher's options-struct
/// convention: a small, `Copy`-friendly bag of knobs with sane defaults.
#[derive(Debug, Clone, Copy)]
pub struct StorageOptions {
    /// PBKDF2 iteration count used to derive the TOC key at `create` time.
    pub pbkdf2_iterations: u32,
    /// Length in bytes of the random passphrase fed into PBKDF2.
    pub passphrase_len: usize,
    /// Buffer size used when pumping an `add` source stream.
    pub chunk_size: usize,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: crypto::DEFAULT_PBKDF2_ITERATIONS,
            passphrase_len: 64,
            chunk_size: 64 * 1024,
        }
    }
}

/// The controller. Owns the file handle and the in-memory record table.
pub struct BulkStorage {
    backend: FileBackend,
    records: Vec<FileRecord>,
    toc_key: [u8; 32],
    toc_iv: [u8; 16],
    toc_start: i64,
    closed: bool,
    options: StorageOptions,
}

impl BulkStorage {
    /// Create a fresh container at `path`, writing a header sealed under
    /// `public_key` and an empty TOC. Truncates any existing file at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn create(
        path: impl AsRef<Path>,
        public_key: &RsaPublicKey,
        options: StorageOptions,
    ) -> Result<Self> {
        let mut backend = FileBackend::create(path).await?;

        let passphrase = crypto::random_passphrase(options.passphrase_len);
        let salt = crypto::random_salt();
        let toc_key = crypto::derive_key_pbkdf2(
            &passphrase,
            &salt,
            KdfParams {
                iterations: options.pbkdf2_iterations,
            },
        );
        let toc_iv = crypto::random_iv();
        let toc_start = HEADER_SIZE as i64;

        let header = Header::new(toc_key, toc_iv, toc_start);
        let header_bin = header.to_binary(public_key).map_err(StorageError::from)?;
        backend.write_at(0, &header_bin).await?;

        let empty_toc = TableOfContents::new(Vec::new());
        let toc_cipher = empty_toc.to_binary(&toc_key, &toc_iv);
        backend.write_at(toc_start as u64, &toc_cipher).await?;

        debug!(toc_start, "created fresh bulkstore container");
        Ok(Self {
            backend,
            records: Vec::new(),
            toc_key,
            toc_iv,
            toc_start,
            closed: false,
            options,
        })
    }

    /// Create with default options.
    pub async fn create_default(path: impl AsRef<Path>, public_key: &RsaPublicKey) -> Result<Self> {
        Self::create(path, public_key, StorageOptions::default()).await
    }

    /// Open an existing container. `private_key_pem` is the PKCS#8 PEM
    /// private key protecting the header's TOC-info block; `passphrase`
    /// unlocks it. The file is truncated to `tocStart` after the TOC is
    /// read into memory, so subsequent `add`s overwrite the persisted TOC.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(
        path: impl AsRef<Path>,
        private_key_pem: &str,
        passphrase: &str,
    ) -> Result<Self> {
        let private_key =
            crypto::load_private_key(private_key_pem, passphrase).map_err(StorageError::from)?;

        let mut backend = FileBackend::open(path).await?;
        let header_bin = backend.read_at(0, HEADER_SIZE).await?;
        let header = Header::from_bytes(&header_bin, &private_key).map_err(StorageError::from)?;

        let toc_start = header.toc_info.toc_start;
        let file_size = backend.size().await?;
        let toc_cipher = backend.read_range(toc_start as u64, file_size).await?;
        let toc = TableOfContents::from_bytes(
            &toc_cipher,
            &header.toc_info.toc_key,
            &header.toc_info.toc_iv,
        )
        .map_err(StorageError::from)?;

        backend.truncate_to(toc_start as u64).await?;

        info!(records = toc.records.len(), toc_start, "opened bulkstore container");
        Ok(Self {
            backend,
            records: toc.records,
            toc_key: header.toc_info.toc_key,
            toc_iv: header.toc_info.toc_iv,
            toc_start,
            closed: false,
            options: StorageOptions::default(),
        })
    }

    /// Generate a fresh RSA-4096 keypair (PKCS#8-encrypted PEM private key,
    /// SPKI PEM public key). The class-level `genKey` helper from spec.md §6.
    pub fn gen_key(passphrase: &str) -> Result<(zeroize::Zeroizing<String>, String)> {
        crypto::gen_key(passphrase).map_err(StorageError::from)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(StorageError::StorageClosed);
        }
        Ok(())
    }

    /// Consume `reader` to completion, encrypting it into a fresh blob
    /// region starting at the current tail. Hashes the plaintext with
    /// CRC-32, MD5, and SHA-256 as it streams through.
    ///
    /// On any read error, the file is truncated back to the reserved
    /// `start` offset and `WriteAborted` is returned — `records` and
    /// `toc_start` are left exactly as they were before the call.
    #[instrument(skip_all)]
    pub async fn add<R>(&mut self, mut reader: R) -> Result<FileRecord>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        self.ensure_open()?;

        let start = self.toc_start;
        let key = crypto::random_key();
        let iv = crypto::random_iv();
        let uuid = Uuid::new_v4();

        let mut crc_hasher = crc32fast::Hasher::new();
        let mut md5_hasher = Md5::new();
        let mut sha_hasher = Sha256::new();
        let mut plaintext = Vec::new();
        let mut chunk = vec![0u8; self.options.chunk_size.max(1)];

        loop {
            let n = match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    self.backend.truncate_to(start as u64).await.ok();
                    warn!(error = %e, "add: source stream failed, rolled back to pre-add offset");
                    return Err(StorageError::WriteAborted(e.to_string()));
                }
            };
            crc_hasher.update(&chunk[..n]);
            md5_hasher.update(&chunk[..n]);
            sha_hasher.update(&chunk[..n]);
            plaintext.extend_from_slice(&chunk[..n]);
        }

        let ciphertext = crypto::aes256_cbc_encrypt(&key, &iv, &plaintext);
        if let Err(e) = self.backend.write_at(start as u64, &ciphertext).await {
            self.backend.truncate_to(start as u64).await.ok();
            return Err(StorageError::WriteAborted(e.to_string()));
        }

        let end = start + ciphertext.len() as i64;
        let crc = crc_hasher.finalize();
        let md5: [u8; 16] = md5_hasher.finalize().into();
        let sha256: [u8; 32] = sha_hasher.finalize().into();
        let ctime = chrono::Utc::now().timestamp_millis();

        let record = FileRecord::new(uuid, start, end, key, iv, crc, md5, sha256, ctime)?;
        self.records.push(record.clone());
        self.toc_start = end;

        debug!(%uuid, start, end, "add: blob committed");
        Ok(record)
    }

    /// Look up a live (non-deleted) record by UUID and return its
    /// decrypted plaintext, or `None` if the UUID is absent or deleted.
    #[instrument(skip(self))]
    pub async fn get(&mut self, uuid: Uuid) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;

        let record = match self.records.iter().find(|r| r.uuid == uuid && !r.is_deleted()) {
            Some(r) => r.clone(),
            None => return Ok(None),
        };

        let ciphertext = self
            .backend
            .read_range(record.start as u64, record.end as u64)
            .await?;
        let plaintext = crypto::aes256_cbc_decrypt(&record.key, &record.iv, &ciphertext)
            .map_err(StorageError::from)?;
        Ok(Some(plaintext))
    }

    /// Remove a record. Returns `false` if the UUID is absent or already
    /// deleted. If the record occupies the tail of the file, it is
    /// physically removed and the file truncated (tail optimization);
    /// otherwise it is flagged `DELETED` in place.
    #[instrument(skip(self))]
    pub async fn delete(&mut self, uuid: Uuid) -> Result<bool> {
        self.ensure_open()?;

        let index = match self
            .records
            .iter()
            .position(|r| r.uuid == uuid && !r.is_deleted())
        {
            Some(i) => i,
            None => return Ok(false),
        };

        let is_tail = self.records[index].end == self.toc_start;
        if is_tail {
            let record = self.records.remove(index);
            self.backend.truncate_to(record.start as u64).await?;
            self.toc_start = record.start;
            debug!(%uuid, "delete: tail-optimized, record removed and file truncated");
        } else {
            self.records[index].flags.set(crate::record::RecordFlags::DELETED);
            debug!(%uuid, "delete: flagged DELETED in place");
        }
        Ok(true)
    }

    /// Persist the in-memory record table: truncate to the tail,
    /// write the encrypted TOC, then overwrite the header (re-sealed under
    /// `public_key`).
    #[instrument(skip_all)]
    pub async fn sync(&mut self, public_key: &RsaPublicKey) -> Result<()> {
        self.ensure_open()?;

        self.backend.truncate_to(self.toc_start as u64).await?;

        let toc = TableOfContents::new(self.records.clone());
        let toc_cipher = toc.to_binary(&self.toc_key, &self.toc_iv);
        self.backend
            .write_at(self.toc_start as u64, &toc_cipher)
            .await?;

        let header = Header::new(self.toc_key, self.toc_iv, self.toc_start);
        let header_bin = header.to_binary(public_key).map_err(StorageError::from)?;
        self.backend.write_at(0, &header_bin).await?;
        self.backend.sync().await?;

        info!(toc_start = self.toc_start, records = self.records.len(), "synced");
        Ok(())
    }

    /// Release the file handle. Idempotent from the caller's perspective
    /// only in the sense that `is_closed` reports the state accurately;
    /// a second `close()` call fails with `StorageClosed`.
    pub async fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;
        debug!("storage closed");
        Ok(())
    }

    /// Compact the file: remove `DELETED` records and reclaim their space
    /// by copying each subsequent live record's ciphertext (raw bytes,
    /// same key/IV) back to fill the hole, then truncate to the new tail.
    #[instrument(skip_all)]
    pub async fn purge(&mut self) -> Result<()> {
        self.ensure_open()?;

        let mut write_cursor = HEADER_SIZE as i64;
        let mut compacted = Vec::with_capacity(self.records.len());

        for record in std::mem::take(&mut self.records) {
            if record.is_deleted() {
                continue;
            }
            let len = record.end - record.start;
            if record.start != write_cursor {
                let bytes = self
                    .backend
                    .read_range(record.start as u64, record.end as u64)
                    .await?;
                self.backend.write_at(write_cursor as u64, &bytes).await?;
            }
            let mut moved = record;
            moved.start = write_cursor;
            moved.end = write_cursor + len;
            write_cursor += len;
            compacted.push(moved);
        }

        self.records = compacted;
        self.toc_start = write_cursor;
        self.backend.truncate_to(write_cursor as u64).await?;

        info!(new_tail = write_cursor, "purge complete");
        Ok(())
    }

    /// Read-only snapshot of the live and deleted record table, in
    /// insertion order.
    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
