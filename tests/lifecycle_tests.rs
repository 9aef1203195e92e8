use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tokio::sync::Mutex;

use netpass_backend::error::ErrorCode;
use netpass_backend::payments::error::{PaymentError, PaymentResult};
use netpass_backend::payments::gateway::PaymentGateway;
use netpass_backend::payments::types::{PushAck, PushRequest};
use netpass_backend::services::voucher_lifecycle::{
    ConfirmationOutcome, LifecycleConfig, RedemptionMode, VoucherLifecycle,
};
use netpass_backend::store::error::StoreError;
use netpass_backend::store::memory::MemoryVoucherStore;
use netpass_backend::store::repository::VoucherStore;
use netpass_backend::store::voucher::{NewVoucher, Voucher, VoucherState};

/// Gateway stub: records pushes instead of contacting the provider.
struct StubGateway {
    fail_push: bool,
    pushes: Mutex<Vec<PushRequest>>,
}

impl StubGateway {
    fn accepting() -> Self {
        Self {
            fail_push: false,
            pushes: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            fail_push: true,
            pushes: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn request_push(&self, request: PushRequest) -> PaymentResult<PushAck> {
        self.pushes.lock().await.push(request.clone());
        if self.fail_push {
            return Err(PaymentError::PushFailed {
                message: "provider rejected the request".to_string(),
                provider_payload: None,
            });
        }
        Ok(PushAck {
            merchant_request_id: "merchant_1".to_string(),
            checkout_request_id: "checkout_1".to_string(),
            response_description: Some("Accepted for processing".to_string()),
        })
    }
}

fn lifecycle_with(
    store: Arc<dyn VoucherStore>,
    gateway: Arc<dyn PaymentGateway>,
    mode: RedemptionMode,
) -> VoucherLifecycle {
    VoucherLifecycle::new(
        store,
        gateway,
        LifecycleConfig {
            redemption_mode: mode,
            ..LifecycleConfig::default()
        },
    )
}

fn success_callback(code: &str, amount: i64) -> JsonValue {
    json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "merchant_1",
                "CheckoutRequestID": "checkout_1",
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        {"Name": "Amount", "Value": amount},
                        {"Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV"},
                        {"Name": "AccountReference", "Value": code},
                        {"Name": "PhoneNumber", "Value": 254712345678_i64}
                    ]
                }
            }
        }
    })
}

fn failure_callback(code: &str) -> JsonValue {
    json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "merchant_1",
                "CheckoutRequestID": "checkout_1",
                "ResultCode": 1032,
                "ResultDesc": "Request cancelled by user",
                "AccountReference": code
            }
        }
    })
}

fn plan() -> JsonValue {
    json!({"data": "1GB", "duration": "1 Hour"})
}

#[tokio::test]
async fn purchase_confirm_redeem_round_trip() {
    let store = Arc::new(MemoryVoucherStore::new());
    let gateway = Arc::new(StubGateway::accepting());
    let lifecycle = lifecycle_with(
        store.clone(),
        gateway.clone(),
        RedemptionMode::ExplicitCode,
    );

    let receipt = lifecycle
        .initiate_purchase("0712345678", BigDecimal::from(50), plan())
        .await
        .expect("purchase should succeed");
    let code = receipt.voucher_code.clone();

    // The push carried the normalized phone and the voucher code as reference.
    let pushes = gateway.pushes.lock().await;
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].phone_number, "254712345678");
    assert_eq!(pushes[0].reference, code);
    drop(pushes);

    // Not yet usable: the voucher is still pending.
    let voucher = store.find_by_code(&code).await.unwrap().unwrap();
    assert_eq!(voucher.state, VoucherState::Pending);
    assert_eq!(voucher.phone_number, "254712345678");
    assert_eq!(
        voucher.payment_reference.as_deref(),
        Some("checkout_1"),
        "provider ack reference should be recorded"
    );

    let outcome = lifecycle
        .confirm_payment(&success_callback(&code, 50))
        .await
        .expect("confirmation should succeed");
    assert_eq!(outcome, ConfirmationOutcome::Activated);

    let voucher = store.find_by_code(&code).await.unwrap().unwrap();
    assert_eq!(voucher.state, VoucherState::Active);

    // Redeemable exactly once.
    let grant = lifecycle.redeem(Some(&code)).await.expect("first redeem");
    assert_eq!(grant.voucher_code, code);

    let err = lifecycle
        .redeem(Some(&code))
        .await
        .expect_err("second redeem must fail");
    assert_eq!(err.error_code(), ErrorCode::InvalidOrUsedCode);

    let voucher = store.find_by_code(&code).await.unwrap().unwrap();
    assert_eq!(voucher.state, VoucherState::Redeemed);
}

#[tokio::test]
async fn failure_callback_rejects_the_voucher() {
    let store = Arc::new(MemoryVoucherStore::new());
    let gateway = Arc::new(StubGateway::accepting());
    let lifecycle = lifecycle_with(
        store.clone(),
        gateway.clone(),
        RedemptionMode::ExplicitCode,
    );

    let receipt = lifecycle
        .initiate_purchase("0712345678", BigDecimal::from(50), plan())
        .await
        .unwrap();
    let code = receipt.voucher_code;

    let outcome = lifecycle
        .confirm_payment(&failure_callback(&code))
        .await
        .unwrap();
    assert_eq!(outcome, ConfirmationOutcome::Rejected);

    let voucher = store.find_by_code(&code).await.unwrap().unwrap();
    assert_eq!(voucher.state, VoucherState::Rejected);

    // A rejected voucher is never redeemable.
    let err = lifecycle.redeem(Some(&code)).await.expect_err("must fail");
    assert_eq!(err.error_code(), ErrorCode::InvalidOrUsedCode);
}

#[tokio::test]
async fn duplicate_success_callback_is_a_noop() {
    let store = Arc::new(MemoryVoucherStore::new());
    let gateway = Arc::new(StubGateway::accepting());
    let lifecycle = lifecycle_with(
        store.clone(),
        gateway.clone(),
        RedemptionMode::ExplicitCode,
    );

    let code = lifecycle
        .initiate_purchase("0712345678", BigDecimal::from(50), plan())
        .await
        .unwrap()
        .voucher_code;

    let first = lifecycle
        .confirm_payment(&success_callback(&code, 50))
        .await
        .unwrap();
    assert_eq!(first, ConfirmationOutcome::Activated);

    let second = lifecycle
        .confirm_payment(&success_callback(&code, 50))
        .await
        .unwrap();
    assert_eq!(second, ConfirmationOutcome::Ignored);

    let voucher = store.find_by_code(&code).await.unwrap().unwrap();
    assert_eq!(voucher.state, VoucherState::Active);
}

#[tokio::test]
async fn late_failure_callback_cannot_downgrade_an_active_voucher() {
    let store = Arc::new(MemoryVoucherStore::new());
    let gateway = Arc::new(StubGateway::accepting());
    let lifecycle = lifecycle_with(
        store.clone(),
        gateway.clone(),
        RedemptionMode::ExplicitCode,
    );

    let code = lifecycle
        .initiate_purchase("0712345678", BigDecimal::from(50), plan())
        .await
        .unwrap()
        .voucher_code;

    lifecycle
        .confirm_payment(&success_callback(&code, 50))
        .await
        .unwrap();

    let outcome = lifecycle
        .confirm_payment(&failure_callback(&code))
        .await
        .unwrap();
    assert_eq!(outcome, ConfirmationOutcome::Ignored);

    let voucher = store.find_by_code(&code).await.unwrap().unwrap();
    assert_eq!(voucher.state, VoucherState::Active);
}

#[tokio::test]
async fn callback_for_unknown_reference_is_absorbed() {
    let store = Arc::new(MemoryVoucherStore::new());
    let gateway = Arc::new(StubGateway::accepting());
    let lifecycle = lifecycle_with(store, gateway, RedemptionMode::ExplicitCode);

    let outcome = lifecycle
        .confirm_payment(&success_callback("ZZ99YY88", 50))
        .await
        .expect("unknown reference must not raise");
    assert_eq!(outcome, ConfirmationOutcome::Ignored);
}

#[tokio::test]
async fn malformed_callback_is_an_error_without_state_change() {
    let store = Arc::new(MemoryVoucherStore::new());
    let gateway = Arc::new(StubGateway::accepting());
    let lifecycle = lifecycle_with(
        store.clone(),
        gateway.clone(),
        RedemptionMode::ExplicitCode,
    );

    let code = lifecycle
        .initiate_purchase("0712345678", BigDecimal::from(50), plan())
        .await
        .unwrap()
        .voucher_code;

    let err = lifecycle
        .confirm_payment(&json!({"Body": {"stkCallback": {"ResultDesc": "no code"}}}))
        .await
        .expect_err("missing fields must be rejected");
    assert_eq!(err.error_code(), ErrorCode::MalformedCallbackPayload);

    let voucher = store.find_by_code(&code).await.unwrap().unwrap();
    assert_eq!(voucher.state, VoucherState::Pending);
}

#[tokio::test]
async fn push_failure_rejects_voucher_and_surfaces_the_error() {
    let store = Arc::new(MemoryVoucherStore::new());
    let gateway = Arc::new(StubGateway::failing());
    let lifecycle = lifecycle_with(
        store.clone(),
        gateway.clone(),
        RedemptionMode::ExplicitCode,
    );

    let err = lifecycle
        .initiate_purchase("0712345678", BigDecimal::from(50), plan())
        .await
        .expect_err("push failure must surface");
    assert_eq!(err.error_code(), ErrorCode::PaymentPushFailed);

    // The voucher is kept for audit, marked rejected.
    let pushes = gateway.pushes.lock().await;
    assert_eq!(pushes.len(), 1);
    let code = &pushes[0].reference;
    let voucher = store.find_by_code(code).await.unwrap().unwrap();
    assert_eq!(voucher.state, VoucherState::Rejected);
}

#[tokio::test]
async fn invalid_phone_fails_before_any_state_is_written() {
    let store = Arc::new(MemoryVoucherStore::new());
    let gateway = Arc::new(StubGateway::accepting());
    let lifecycle = lifecycle_with(
        store.clone(),
        gateway.clone(),
        RedemptionMode::ExplicitCode,
    );

    let err = lifecycle
        .initiate_purchase("1712345678", BigDecimal::from(50), plan())
        .await
        .expect_err("invalid phone must fail");
    assert_eq!(err.error_code(), ErrorCode::InvalidPhoneFormat);

    assert!(gateway.pushes.lock().await.is_empty());
}

#[tokio::test]
async fn non_positive_amount_is_rejected_upfront() {
    let store = Arc::new(MemoryVoucherStore::new());
    let gateway = Arc::new(StubGateway::accepting());
    let lifecycle = lifecycle_with(
        store.clone(),
        gateway.clone(),
        RedemptionMode::ExplicitCode,
    );

    let err = lifecycle
        .initiate_purchase("0712345678", BigDecimal::from(0), plan())
        .await
        .expect_err("zero amount must fail");
    assert_eq!(err.error_code(), ErrorCode::InvalidAmount);
    assert!(gateway.pushes.lock().await.is_empty());
}

#[tokio::test]
async fn redeeming_a_never_issued_code_fails() {
    let store = Arc::new(MemoryVoucherStore::new());
    let gateway = Arc::new(StubGateway::accepting());
    let lifecycle = lifecycle_with(store, gateway, RedemptionMode::ExplicitCode);

    let err = lifecycle
        .redeem(Some("ZZ99YY88"))
        .await
        .expect_err("must fail");
    assert_eq!(err.error_code(), ErrorCode::InvalidOrUsedCode);
}

#[tokio::test]
async fn explicit_mode_requires_a_code() {
    let store = Arc::new(MemoryVoucherStore::new());
    let gateway = Arc::new(StubGateway::accepting());
    let lifecycle = lifecycle_with(store, gateway, RedemptionMode::ExplicitCode);

    let err = lifecycle.redeem(None).await.expect_err("must fail");
    assert_eq!(err.error_code(), ErrorCode::MissingField);
}

#[tokio::test]
async fn auto_assign_claims_an_active_voucher_and_reveals_its_code() {
    let store = Arc::new(MemoryVoucherStore::new());
    let gateway = Arc::new(StubGateway::accepting());
    let lifecycle = lifecycle_with(store.clone(), gateway.clone(), RedemptionMode::AutoAssign);

    let code = lifecycle
        .initiate_purchase("0712345678", BigDecimal::from(50), plan())
        .await
        .unwrap()
        .voucher_code;
    lifecycle
        .confirm_payment(&success_callback(&code, 50))
        .await
        .unwrap();

    let grant = lifecycle.redeem(None).await.expect("claim should succeed");
    assert_eq!(grant.voucher_code, code);

    let err = lifecycle.redeem(None).await.expect_err("nothing left");
    assert_eq!(err.error_code(), ErrorCode::NoVoucherAvailable);
}

#[tokio::test]
async fn racing_explicit_redemptions_grant_exactly_once() {
    let store = Arc::new(MemoryVoucherStore::new());
    let gateway = Arc::new(StubGateway::accepting());
    let lifecycle = Arc::new(lifecycle_with(
        store.clone(),
        gateway.clone(),
        RedemptionMode::ExplicitCode,
    ));

    let code = lifecycle
        .initiate_purchase("0712345678", BigDecimal::from(50), plan())
        .await
        .unwrap()
        .voucher_code;
    lifecycle
        .confirm_payment(&success_callback(&code, 50))
        .await
        .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let lifecycle = lifecycle.clone();
            let code = code.clone();
            tokio::spawn(async move { lifecycle.redeem(Some(&code)).await })
        })
        .collect();

    let results = futures::future::join_all(tasks).await;
    let granted = results
        .into_iter()
        .map(|r| r.expect("task should not panic"))
        .filter(|r| r.is_ok())
        .count();
    assert_eq!(granted, 1, "exactly one racing redemption may win");
}

#[tokio::test]
async fn racing_auto_assign_redemptions_grant_exactly_once() {
    let store = Arc::new(MemoryVoucherStore::new());
    let gateway = Arc::new(StubGateway::accepting());
    let lifecycle = Arc::new(lifecycle_with(
        store.clone(),
        gateway.clone(),
        RedemptionMode::AutoAssign,
    ));

    let code = lifecycle
        .initiate_purchase("0712345678", BigDecimal::from(50), plan())
        .await
        .unwrap()
        .voucher_code;
    lifecycle
        .confirm_payment(&success_callback(&code, 50))
        .await
        .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move { lifecycle.redeem(None).await })
        })
        .collect();

    let results = futures::future::join_all(tasks).await;
    let granted: Vec<_> = results
        .into_iter()
        .map(|r| r.expect("task should not panic"))
        .filter_map(|r| r.ok())
        .collect();
    assert_eq!(granted.len(), 1, "one active voucher, one winner");
    assert_eq!(granted[0].voucher_code, code);
}

/// Store wrapper whose inserts always collide, to drive the bounded
/// code-retry path to exhaustion.
struct AlwaysCollidingStore {
    inner: MemoryVoucherStore,
    inserts: Mutex<u32>,
}

#[async_trait]
impl VoucherStore for AlwaysCollidingStore {
    async fn insert_pending(&self, new: NewVoucher) -> Result<Voucher, StoreError> {
        *self.inserts.lock().await += 1;
        Err(StoreError::DuplicateCode { code: new.code })
    }

    async fn activate_by_code(&self, code: &str) -> Result<bool, StoreError> {
        self.inner.activate_by_code(code).await
    }

    async fn reject_by_code(&self, code: &str) -> Result<bool, StoreError> {
        self.inner.reject_by_code(code).await
    }

    async fn redeem_by_code(&self, code: &str) -> Result<bool, StoreError> {
        self.inner.redeem_by_code(code).await
    }

    async fn claim_unused_active(&self) -> Result<Option<Voucher>, StoreError> {
        self.inner.claim_unused_active().await
    }

    async fn set_payment_reference(
        &self,
        code: &str,
        reference: &str,
    ) -> Result<bool, StoreError> {
        self.inner.set_payment_reference(code, reference).await
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Voucher>, StoreError> {
        self.inner.find_by_code(code).await
    }
}

#[tokio::test]
async fn code_collisions_exhaust_after_bounded_retries() {
    let store = Arc::new(AlwaysCollidingStore {
        inner: MemoryVoucherStore::new(),
        inserts: Mutex::new(0),
    });
    let gateway = Arc::new(StubGateway::accepting());
    let lifecycle = VoucherLifecycle::new(
        store.clone(),
        gateway.clone(),
        LifecycleConfig {
            max_code_attempts: 3,
            ..LifecycleConfig::default()
        },
    );

    let err = lifecycle
        .initiate_purchase("0712345678", BigDecimal::from(50), plan())
        .await
        .expect_err("collisions must exhaust");
    assert_eq!(err.error_code(), ErrorCode::CodeGenerationExhausted);
    assert_eq!(*store.inserts.lock().await, 3);
    assert!(
        gateway.pushes.lock().await.is_empty(),
        "no push without a persisted voucher"
    );
}
