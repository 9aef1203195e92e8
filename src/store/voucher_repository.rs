use crate::store::error::StoreError;
use crate::store::repository::VoucherStore;
use crate::store::voucher::{NewVoucher, Voucher, VoucherState};
use async_trait::async_trait;
use sqlx::{types::BigDecimal, FromRow, PgPool};
use uuid::Uuid;

/// Postgres-backed voucher store. Every transition is a single conditional
/// UPDATE, so the state check and the write are atomic inside the database.
pub struct PgVoucherStore {
    pool: PgPool,
}

impl PgVoucherStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn transition(
        &self,
        code: &str,
        from: VoucherState,
        to: VoucherState,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE vouchers SET state = $3, updated_at = NOW()
             WHERE code = $1 AND state = $2",
        )
        .bind(code)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl VoucherStore for PgVoucherStore {
    async fn insert_pending(&self, new: NewVoucher) -> Result<Voucher, StoreError> {
        let row = sqlx::query_as::<_, VoucherRow>(
            "INSERT INTO vouchers (code, state, phone_number, amount, plan)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, code, state, phone_number, amount, plan,
                       payment_reference, created_at, updated_at",
        )
        .bind(&new.code)
        .bind(VoucherState::Pending.as_str())
        .bind(&new.phone_number)
        .bind(&new.amount)
        .bind(&new.plan)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if StoreError::is_unique_violation(&e) {
                StoreError::DuplicateCode {
                    code: new.code.clone(),
                }
            } else {
                StoreError::from_sqlx(e)
            }
        })?;

        row.try_into()
    }

    async fn activate_by_code(&self, code: &str) -> Result<bool, StoreError> {
        self.transition(code, VoucherState::Pending, VoucherState::Active)
            .await
    }

    async fn reject_by_code(&self, code: &str) -> Result<bool, StoreError> {
        self.transition(code, VoucherState::Pending, VoucherState::Rejected)
            .await
    }

    async fn redeem_by_code(&self, code: &str) -> Result<bool, StoreError> {
        self.transition(code, VoucherState::Active, VoucherState::Redeemed)
            .await
    }

    async fn claim_unused_active(&self) -> Result<Option<Voucher>, StoreError> {
        // SKIP LOCKED keeps two concurrent claimers from ever selecting the
        // same row; the loser moves on to the next active voucher or None.
        let row = sqlx::query_as::<_, VoucherRow>(
            "UPDATE vouchers SET state = 'redeemed', updated_at = NOW()
             WHERE id = (
                 SELECT id FROM vouchers WHERE state = 'active'
                 ORDER BY created_at ASC
                 FOR UPDATE SKIP LOCKED
                 LIMIT 1
             )
             RETURNING id, code, state, phone_number, amount, plan,
                       payment_reference, created_at, updated_at",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        row.map(Voucher::try_from).transpose()
    }

    async fn set_payment_reference(
        &self,
        code: &str,
        reference: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE vouchers SET payment_reference = $2, updated_at = NOW()
             WHERE code = $1",
        )
        .bind(code)
        .bind(reference)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Voucher>, StoreError> {
        let row = sqlx::query_as::<_, VoucherRow>(
            "SELECT id, code, state, phone_number, amount, plan,
                    payment_reference, created_at, updated_at
             FROM vouchers WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        row.map(Voucher::try_from).transpose()
    }
}

#[derive(Debug, Clone, FromRow)]
struct VoucherRow {
    id: Uuid,
    code: String,
    state: String,
    phone_number: String,
    amount: BigDecimal,
    plan: serde_json::Value,
    payment_reference: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<VoucherRow> for Voucher {
    type Error = StoreError;

    fn try_from(row: VoucherRow) -> Result<Self, Self::Error> {
        Ok(Voucher {
            id: row.id,
            code: row.code,
            state: row.state.parse()?,
            phone_number: row.phone_number,
            amount: row.amount,
            plan: row.plan,
            payment_reference: row.payment_reference,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
