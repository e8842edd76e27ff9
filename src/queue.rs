//! Optional asynchronous I/O-queue collaborator.
//!
//! Wraps a shared `BulkStorage` behind `Arc<tokio::sync::Mutex<..>>` and
//! annotates each submitted operation with a task kind and a per-task
//! timeout. The core engine (`storage.rs`) works without this collaborator;
//! this exists for callers that want cooperative scheduling and deadline
//! enforcement across concurrent tasks sharing one container.

use std::sync::Arc;
use std::time::Duration;

use rsa::RsaPublicKey;
use tokio::sync::Mutex;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::error::StorageError;
use crate::record::FileRecord;
use crate::storage::BulkStorage;

/// The kind of operation a queued task performs. The concurrency policy
/// (multiple reads vs. single writer vs. exclusive critical section) is
/// enforced by the shared `Mutex` itself — every task kind here takes the
/// same lock, since `BulkStorage` has no separate read/write lock split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Read,
    Append,
    Write,
    Critical,
}

#[derive(thiserror::Error, Debug)]
pub enum QueueError {
    #[error("task of kind {kind:?} timed out after {timeout:?}")]
    Timeout { kind: TaskKind, timeout: Duration },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A handle shareable across tasks. Cloning is cheap — it clones the `Arc`,
/// not the storage.
#[derive(Clone)]
pub struct IoQueue {
    storage: Arc<Mutex<BulkStorage>>,
}

impl IoQueue {
    pub fn new(storage: BulkStorage) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
        }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, uuid: Uuid, timeout: Duration) -> Result<Option<Vec<u8>>, QueueError> {
        let fut = async {
            let mut guard = self.storage.lock().await;
            guard.get(uuid).await.map_err(QueueError::from)
        };
        Self::with_timeout(TaskKind::Read, timeout, fut).await
    }

    #[instrument(skip(self, reader))]
    pub async fn add<R>(&self, reader: R, timeout: Duration) -> Result<FileRecord, QueueError>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let fut = async {
            let mut guard = self.storage.lock().await;
            guard.add(reader).await.map_err(QueueError::from)
        };
        Self::with_timeout(TaskKind::Append, timeout, fut).await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, uuid: Uuid, timeout: Duration) -> Result<bool, QueueError> {
        let fut = async {
            let mut guard = self.storage.lock().await;
            guard.delete(uuid).await.map_err(QueueError::from)
        };
        Self::with_timeout(TaskKind::Write, timeout, fut).await
    }

    /// `sync` and `purge` are `Critical`: every other task kind still
    /// contends on the same mutex, but the distinction documents intent
    /// for callers building their own admission policy around `TaskKind`.
    #[instrument(skip(self, public_key))]
    pub async fn sync(&self, public_key: &RsaPublicKey, timeout: Duration) -> Result<(), QueueError> {
        let fut = async {
            let mut guard = self.storage.lock().await;
            guard.sync(public_key).await.map_err(QueueError::from)
        };
        Self::with_timeout(TaskKind::Critical, timeout, fut).await
    }

    #[instrument(skip(self))]
    pub async fn purge(&self, timeout: Duration) -> Result<(), QueueError> {
        let fut = async {
            let mut guard = self.storage.lock().await;
            guard.purge().await.map_err(QueueError::from)
        };
        Self::with_timeout(TaskKind::Critical, timeout, fut).await
    }

    async fn with_timeout<T>(
        kind: TaskKind,
        timeout: Duration,
        fut: impl std::future::Future<Output = Result<T, QueueError>>,
    ) -> Result<T, QueueError> {
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(?kind, ?timeout, "queued task timed out");
                Err(QueueError::Timeout { kind, timeout })
            }
        }
    }
}
