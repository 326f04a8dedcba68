use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::{Fingerprint, IdempotencyLedger, LedgerError, LedgerState, Reservation};

/// Re-reads tolerated when a conflicting entry vanishes between the insert
/// and the follow-up select (it was released concurrently).
const MAX_RESERVE_ROUNDS: u32 = 3;

/// Ledger backed by the `idempotency_ledger` table. The primary key on
/// `fingerprint` makes `INSERT .. ON CONFLICT DO NOTHING` the atomic reserve.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyLedger for PgLedger {
    async fn reserve(
        &self,
        fingerprint: &Fingerprint,
        record_id: Uuid,
    ) -> Result<Reservation, LedgerError> {
        for _ in 0..MAX_RESERVE_ROUNDS {
            let inserted: Option<Uuid> = sqlx::query_scalar(
                r#"
                INSERT INTO idempotency_ledger (fingerprint, kind, record_id, state)
                VALUES ($1, $2, $3, 'in_flight')
                ON CONFLICT (fingerprint) DO NOTHING
                RETURNING record_id
                "#,
            )
            .bind(fingerprint.as_str())
            .bind(fingerprint.kind())
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?;

            if inserted.is_some() {
                debug!("Reserved {fingerprint} for record {record_id}");
                return Ok(Reservation::Acquired);
            }

            let existing: Option<(Uuid, String)> = sqlx::query_as(
                "SELECT record_id, state FROM idempotency_ledger WHERE fingerprint = $1",
            )
            .bind(fingerprint.as_str())
            .fetch_optional(&self.pool)
            .await?;

            if let Some((record_id, state)) = existing {
                return Ok(Reservation::AlreadyExists {
                    record_id,
                    state: state.parse()?,
                });
            }
        }

        Err(LedgerError::Contended(fingerprint.to_string()))
    }

    async fn finish(
        &self,
        fingerprint: &Fingerprint,
        state: LedgerState,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            UPDATE idempotency_ledger
            SET state = $2, updated_at = now()
            WHERE fingerprint = $1 AND state = 'in_flight'
            "#,
        )
        .bind(fingerprint.as_str())
        .bind(state.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn release(&self, fingerprint: &Fingerprint) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            "DELETE FROM idempotency_ledger WHERE fingerprint = $1 AND state <> 'completed'",
        )
        .bind(fingerprint.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn release_failed(
        &self,
        fingerprint: &Fingerprint,
        record_id: Uuid,
    ) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"
            DELETE FROM idempotency_ledger
            WHERE fingerprint = $1 AND state = 'failed' AND record_id = $2
            "#,
        )
        .bind(fingerprint.as_str())
        .bind(record_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
