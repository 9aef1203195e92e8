use crate::store::error::StoreError;
use crate::store::repository::VoucherStore;
use crate::store::voucher::{NewVoucher, Voucher, VoucherState};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-process voucher store for tests and database-less runs. One mutex
/// guards the whole map, so each operation sees and writes a consistent
/// snapshot and the atomicity contract holds trivially.
#[derive(Default)]
pub struct MemoryVoucherStore {
    vouchers: Mutex<HashMap<String, Voucher>>,
}

impl MemoryVoucherStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn transition(
        &self,
        code: &str,
        from: VoucherState,
        to: VoucherState,
    ) -> Result<bool, StoreError> {
        let mut vouchers = self.vouchers.lock().await;
        match vouchers.get_mut(code) {
            Some(voucher) if voucher.state == from => {
                voucher.state = to;
                voucher.updated_at = chrono::Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl VoucherStore for MemoryVoucherStore {
    async fn insert_pending(&self, new: NewVoucher) -> Result<Voucher, StoreError> {
        let mut vouchers = self.vouchers.lock().await;
        if vouchers.contains_key(&new.code) {
            return Err(StoreError::DuplicateCode { code: new.code });
        }

        let now = chrono::Utc::now();
        let voucher = Voucher {
            id: Uuid::new_v4(),
            code: new.code.clone(),
            state: VoucherState::Pending,
            phone_number: new.phone_number,
            amount: new.amount,
            plan: new.plan,
            payment_reference: None,
            created_at: now,
            updated_at: now,
        };
        vouchers.insert(new.code, voucher.clone());
        Ok(voucher)
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
        let mut vouchers = self.vouchers.lock().await;
        let claimed_code = vouchers
            .values()
            .filter(|v| v.state == VoucherState::Active)
            .min_by_key(|v| v.created_at)
            .map(|v| v.code.clone());

        match claimed_code {
            Some(code) => {
                let voucher = vouchers
                    .get_mut(&code)
                    .expect("voucher disappeared under lock");
                voucher.state = VoucherState::Redeemed;
                voucher.updated_at = chrono::Utc::now();
                Ok(Some(voucher.clone()))
            }
            None => Ok(None),
        }
    }

    async fn set_payment_reference(
        &self,
        code: &str,
        reference: &str,
    ) -> Result<bool, StoreError> {
        let mut vouchers = self.vouchers.lock().await;
        match vouchers.get_mut(code) {
            Some(voucher) => {
                voucher.payment_reference = Some(reference.to_string());
                voucher.updated_at = chrono::Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Voucher>, StoreError> {
        let vouchers = self.vouchers.lock().await;
        Ok(vouchers.get(code).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use serde_json::json;

    fn new_voucher(code: &str) -> NewVoucher {
        NewVoucher {
            code: code.to_string(),
            phone_number: "254712345678".to_string(),
            amount: BigDecimal::from(50),
            plan: json!({"data": "1GB", "duration": "1 Hour"}),
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_code() {
        let store = MemoryVoucherStore::new();
        store.insert_pending(new_voucher("AB12CD34")).await.unwrap();
        let err = store
            .insert_pending(new_voucher("AB12CD34"))
            .await
            .expect_err("duplicate must fail");
        assert!(matches!(err, StoreError::DuplicateCode { .. }));
    }

    #[tokio::test]
    async fn activate_is_idempotent() {
        let store = MemoryVoucherStore::new();
        store.insert_pending(new_voucher("AB12CD34")).await.unwrap();

        assert!(store.activate_by_code("AB12CD34").await.unwrap());
        assert!(!store.activate_by_code("AB12CD34").await.unwrap());

        let voucher = store.find_by_code("AB12CD34").await.unwrap().unwrap();
        assert_eq!(voucher.state, VoucherState::Active);
    }

    #[tokio::test]
    async fn redeem_succeeds_at_most_once() {
        let store = MemoryVoucherStore::new();
        store.insert_pending(new_voucher("AB12CD34")).await.unwrap();
        store.activate_by_code("AB12CD34").await.unwrap();

        assert!(store.redeem_by_code("AB12CD34").await.unwrap());
        assert!(!store.redeem_by_code("AB12CD34").await.unwrap());
    }

    #[tokio::test]
    async fn redeem_requires_active_state() {
        let store = MemoryVoucherStore::new();
        store.insert_pending(new_voucher("AB12CD34")).await.unwrap();

        // Still pending: not redeemable.
        assert!(!store.redeem_by_code("AB12CD34").await.unwrap());
        // Unknown code: not redeemable.
        assert!(!store.redeem_by_code("ZZ99YY88").await.unwrap());
    }

    #[tokio::test]
    async fn rejected_voucher_cannot_be_activated() {
        let store = MemoryVoucherStore::new();
        store.insert_pending(new_voucher("AB12CD34")).await.unwrap();
        store.reject_by_code("AB12CD34").await.unwrap();

        assert!(!store.activate_by_code("AB12CD34").await.unwrap());
        let voucher = store.find_by_code("AB12CD34").await.unwrap().unwrap();
        assert_eq!(voucher.state, VoucherState::Rejected);
    }

    #[tokio::test]
    async fn claim_takes_one_active_voucher_and_redeems_it() {
        let store = MemoryVoucherStore::new();
        store.insert_pending(new_voucher("AB12CD34")).await.unwrap();
        store.activate_by_code("AB12CD34").await.unwrap();

        let claimed = store.claim_unused_active().await.unwrap().unwrap();
        assert_eq!(claimed.code, "AB12CD34");
        assert_eq!(claimed.state, VoucherState::Redeemed);

        assert!(store.claim_unused_active().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_returns_none_without_active_vouchers() {
        let store = MemoryVoucherStore::new();
        store.insert_pending(new_voucher("AB12CD34")).await.unwrap();
        assert!(store.claim_unused_active().await.unwrap().is_none());
    }
}
