use crate::store::error::StoreError;
use crate::store::voucher::{NewVoucher, Voucher};
use async_trait::async_trait;

/// Contract every voucher store must satisfy. Each operation is atomic with
/// respect to concurrent callers: the state checks and the transition happen
/// in one step, so racing redemptions or duplicate callback deliveries can
/// never double-activate or double-redeem a voucher.
#[async_trait]
pub trait VoucherStore: Send + Sync {
    /// Inserts a new `Pending` voucher. Fails with
    /// [`StoreError::DuplicateCode`] when the code already exists.
    async fn insert_pending(&self, new: NewVoucher) -> Result<Voucher, StoreError>;

    /// Transitions a `Pending` voucher to `Active`. Returns `false` when no
    /// matching `Pending` voucher exists, which makes duplicate or late
    /// confirmation deliveries a no-op.
    async fn activate_by_code(&self, code: &str) -> Result<bool, StoreError>;

    /// Transitions a `Pending` voucher to `Rejected`. Same no-op rule as
    /// activation.
    async fn reject_by_code(&self, code: &str) -> Result<bool, StoreError>;

    /// Transitions an `Active` voucher to `Redeemed`. Returns `false` when
    /// the voucher does not exist, is not `Active`, or was already redeemed.
    async fn redeem_by_code(&self, code: &str) -> Result<bool, StoreError>;

    /// Atomically selects one `Active` voucher and marks it `Redeemed`,
    /// returning the claimed record. `None` when no `Active` voucher exists.
    /// Two concurrent callers can never claim the same voucher.
    async fn claim_unused_active(&self) -> Result<Option<Voucher>, StoreError>;

    /// Records the provider-assigned reference from the push acknowledgment.
    /// Audit only; callback correlation uses the voucher code.
    async fn set_payment_reference(&self, code: &str, reference: &str)
        -> Result<bool, StoreError>;

    /// Read-only lookup.
    async fn find_by_code(&self, code: &str) -> Result<Option<Voucher>, StoreError>;
}
