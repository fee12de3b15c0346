//! Persistence port for B2B transactions.
//! Adapters live in `crate::adapters`.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Transaction, TransactionStatus};

#[derive(Error, Debug)]
pub enum RepositoryError {
    /// A unique constraint (reference or a conversation id) rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                RepositoryError::Conflict(db_err.message().to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Atomically inserts a new record, failing with `Conflict` if the reference or either
    /// conversation id is already taken.
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction>;

    async fn find_by_reference(&self, reference: &str) -> RepositoryResult<Option<Transaction>>;

    /// Moves the most recently created record matching both conversation ids to `status`,
    /// but only while it is still `PENDING`. Returns the updated record, or `None` when nothing
    /// matched or the match was already final.
    async fn finalize_pending(
        &self,
        conversation_id: &str,
        originator_conversation_id: &str,
        status: TransactionStatus,
    ) -> RepositoryResult<Option<Transaction>>;

    async fn ping(&self) -> RepositoryResult<()>;
}
