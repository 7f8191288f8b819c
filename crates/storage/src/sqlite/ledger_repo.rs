use practice_core::model::UserId;
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, i64_to_u64, ser, user_id_to_i64};
use crate::repository::{LedgerCredit, StorageError, XpLedger};

#[async_trait::async_trait]
impl XpLedger for SqliteRepository {
    async fn credit(&self, credit: &LedgerCredit) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r"
            INSERT INTO xp_ledger (user_id, amount, idempotency_key, credited_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(idempotency_key) DO NOTHING
            ",
        )
        .bind(user_id_to_i64(credit.user)?)
        .bind(i64::from(credit.amount))
        .bind(credit.key.as_str())
        .bind(credit.at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(result.rows_affected() == 1)
    }

    async fn balance(&self, user: UserId) -> Result<u64, StorageError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount), 0) AS total FROM xp_ledger WHERE user_id = ?1",
        )
        .bind(user_id_to_i64(user)?)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        i64_to_u64("balance", row.try_get("total").map_err(ser)?)
    }
}
