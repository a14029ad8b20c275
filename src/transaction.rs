//! TransactionBatcher - accumulate writes and commit them in store-sized chunks.
//!
//! ## Example
//!
//! ```ignore
//! store
//!     .batch(10)
//!     .add(put_anchor)
//!     .add(put_listing)
//!     .commit()
//!     .await?;
//! ```
//!
//! Each chunk is one atomic `transact_write`. Chunks run in order and the
//! first failure stops the commit; chunks already written stay written.

use tracing::{debug, warn};

use crate::store::{StoreClient, StoreError, WriteOp};

/// What a successful commit wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitSummary {
    pub operations: usize,
    pub chunks: usize,
}

/// Builder accumulating write operations for chunked transactional commit.
pub struct TransactionBatcher<'a, S: ?Sized> {
    store: &'a S,
    chunk_size: usize,
    ops: Vec<WriteOp>,
}

impl<'a, S: StoreClient + ?Sized> TransactionBatcher<'a, S> {
    /// `chunk_size` is clamped to `1..=store.max_transaction_items()`.
    pub fn new(store: &'a S, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.clamp(1, store.max_transaction_items().max(1));
        Self {
            store,
            chunk_size,
            ops: vec![],
        }
    }

    pub fn add(mut self, op: WriteOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub fn extend(&mut self, ops: impl IntoIterator<Item = WriteOp>) {
        self.ops.extend(ops);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_count(&self) -> usize {
        self.ops.len().div_ceil(self.chunk_size)
    }

    /// Commits every chunk in order, stopping at the first error.
    ///
    /// The error is returned exactly as the store raised it.
    pub async fn commit(self) -> Result<CommitSummary, StoreError> {
        let operations = self.ops.len();
        let total = self.chunk_count();
        let mut remaining = self.ops;
        let mut chunks = 0;

        while !remaining.is_empty() {
            let rest = remaining.split_off(self.chunk_size.min(remaining.len()));
            let chunk = std::mem::replace(&mut remaining, rest);
            debug!(chunk = chunks, of = total, operations = chunk.len(), "committing transaction chunk");

            if let Err(error) = self.store.transact_write(chunk).await {
                if chunks > 0 {
                    warn!(
                        failed_chunk = chunks,
                        of = total,
                        error = %error,
                        "transaction chunk failed after earlier chunks committed"
                    );
                }
                return Err(error);
            }
            chunks += 1;
        }

        Ok(CommitSummary { operations, chunks })
    }
}

/// Extension trait to start a batch from any store client.
pub trait BatchExt: StoreClient {
    fn batch(&self, chunk_size: usize) -> TransactionBatcher<'_, Self> {
        TransactionBatcher::new(self, chunk_size)
    }
}

impl<S: StoreClient + ?Sized> BatchExt for S {}
