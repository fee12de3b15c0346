use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{Transaction, TransactionStatus};
use crate::ports::{RepositoryError, RepositoryResult, TransactionRepository};

/// A thread-safe in-memory transaction store.
///
/// Every write takes the lock exclusively, so the uniqueness checks in `insert` and the
/// pending guard in `finalize_pending` are atomic with respect to each other. Used by tests
/// and local runs without a database.
#[derive(Default, Clone)]
pub struct InMemoryTransactionRepository {
    transactions: Arc<RwLock<Vec<Transaction>>>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Transaction> {
        self.transactions.read().await.clone()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let mut transactions = self.transactions.write().await;

        if let Some(existing) = transactions.iter().find(|t| {
            t.reference == tx.reference
                || t.originator_conversation_id == tx.originator_conversation_id
                || t.conversation_id == tx.conversation_id
        }) {
            return Err(RepositoryError::Conflict(format!(
                "transaction {} already holds reference or conversation ids",
                existing.id
            )));
        }

        transactions.push(tx.clone());
        Ok(tx.clone())
    }

    async fn find_by_reference(&self, reference: &str) -> RepositoryResult<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.iter().find(|t| t.reference == reference).cloned())
    }

    async fn finalize_pending(
        &self,
        conversation_id: &str,
        originator_conversation_id: &str,
        status: TransactionStatus,
    ) -> RepositoryResult<Option<Transaction>> {
        let mut transactions = self.transactions.write().await;

        let latest = transactions
            .iter_mut()
            .filter(|t| {
                t.conversation_id == conversation_id
                    && t.originator_conversation_id == originator_conversation_id
            })
            .max_by_key(|t| t.created_at);

        match latest {
            Some(tx) if !tx.status.is_terminal() => {
                tx.status = status;
                tx.updated_at = Utc::now();
                Ok(Some(tx.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }
}
