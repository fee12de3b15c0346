//! Postgres implementation of TransactionRepository.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Transaction, TransactionStatus};
use crate::ports::{RepositoryError, RepositoryResult, TransactionRepository};

const COLUMNS: &str = "id, reference, amount, originator_conversation_id, conversation_id, \
                       status, created_at, updated_at";

/// Postgres-backed transaction repository.
#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO b2b_transactions (
                id, reference, amount, originator_conversation_id, conversation_id,
                status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(tx.id)
        .bind(&tx.reference)
        .bind(tx.amount)
        .bind(&tx.originator_conversation_id)
        .bind(&tx.conversation_id)
        .bind(tx.status.as_str())
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        row.into_domain()
    }

    async fn find_by_reference(&self, reference: &str) -> RepositoryResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM b2b_transactions WHERE reference = $1",
            COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn finalize_pending(
        &self,
        conversation_id: &str,
        originator_conversation_id: &str,
        status: TransactionStatus,
    ) -> RepositoryResult<Option<Transaction>> {
        // Single statement: the status guard in the WHERE clause is the compare-and-set.
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            UPDATE b2b_transactions
            SET status = $1, updated_at = NOW()
            WHERE id = (
                SELECT id FROM b2b_transactions
                WHERE conversation_id = $2 AND originator_conversation_id = $3
                ORDER BY created_at DESC
                LIMIT 1
            )
            AND status = 'PENDING'
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(status.as_str())
        .bind(conversation_id)
        .bind(originator_conversation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(())
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    reference: String,
    amount: i64,
    originator_conversation_id: String,
    conversation_id: String,
    status: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<Transaction> {
        let status = self
            .status
            .parse::<TransactionStatus>()
            .map_err(RepositoryError::Database)?;

        Ok(Transaction {
            id: self.id,
            reference: self.reference,
            amount: self.amount,
            originator_conversation_id: self.originator_conversation_id,
            conversation_id: self.conversation_id,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
