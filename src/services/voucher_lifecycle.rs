//! Voucher lifecycle service.
//!
//! Owns the state machine from purchase initiation through payment
//! confirmation and redemption. Portal requests and provider callbacks run
//! on independent request lifetimes with no ordering guarantee, so every
//! transition is delegated to the store's atomic operations; this service
//! holds no locks of its own.

use bigdecimal::BigDecimal;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{AppError, AppErrorKind, DomainError, ValidationError};
use crate::payments::gateway::PaymentGateway;
use crate::payments::phone::normalize_phone_number;
use crate::payments::types::{CallbackPayload, PushRequest};
use crate::store::error::StoreError;
use crate::store::repository::VoucherStore;
use crate::store::voucher::{NewVoucher, Voucher};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// How the portal hands out vouchers at redemption time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionMode {
    /// The visitor types the code they received at purchase time.
    ExplicitCode,
    /// The portal claims any active voucher and reveals its code.
    AutoAssign,
}

impl FromStr for RedemptionMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "explicit_code" | "explicit" => Ok(RedemptionMode::ExplicitCode),
            "auto_assign" | "auto" => Ok(RedemptionMode::AutoAssign),
            other => Err(format!("unsupported redemption mode: {}", other)),
        }
    }
}

/// Configuration for the lifecycle service
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Voucher code length in characters
    pub code_length: usize,
    /// How many fresh codes to try when inserts collide
    pub max_code_attempts: u32,
    pub redemption_mode: RedemptionMode,
    /// Free-text line shown on the subscriber's payment prompt
    pub push_description: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            code_length: 8,
            max_code_attempts: 5,
            redemption_mode: RedemptionMode::ExplicitCode,
            push_description: "Voucher Purchase".to_string(),
        }
    }
}

impl LifecycleConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            code_length: std::env::var("VOUCHER_CODE_LENGTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.code_length),
            max_code_attempts: std::env::var("VOUCHER_MAX_CODE_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_code_attempts),
            redemption_mode: std::env::var("VOUCHER_REDEMPTION_MODE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.redemption_mode),
            push_description: std::env::var("VOUCHER_PUSH_DESCRIPTION")
                .unwrap_or(defaults.push_description),
        }
    }
}

/// Receipt returned to the buyer. The voucher is still `Pending`; it only
/// becomes usable once the provider confirms the payment.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseReceipt {
    pub voucher_code: String,
    pub provider_reference: Option<String>,
}

/// A granted redemption.
#[derive(Debug, Clone, Serialize)]
pub struct RedemptionGrant {
    pub voucher_code: String,
}

/// What a confirmation callback did to voucher state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Activated,
    Rejected,
    /// Duplicate, late or unknown reference; nothing changed.
    Ignored,
}

pub struct VoucherLifecycle {
    store: Arc<dyn VoucherStore>,
    gateway: Arc<dyn PaymentGateway>,
    config: LifecycleConfig,
}

impl VoucherLifecycle {
    pub fn new(
        store: Arc<dyn VoucherStore>,
        gateway: Arc<dyn PaymentGateway>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    /// Initiates a purchase: validates input, persists a `Pending` voucher
    /// and submits the payment push with the voucher code as the correlation
    /// reference. A synchronous push failure leaves the voucher behind as
    /// `Rejected` for audit and surfaces the failure to the caller.
    pub async fn initiate_purchase(
        &self,
        raw_phone: &str,
        amount: BigDecimal,
        plan: JsonValue,
    ) -> Result<PurchaseReceipt, AppError> {
        let phone_number = normalize_phone_number(raw_phone)?;
        if amount <= BigDecimal::from(0) {
            return Err(AppError::new(AppErrorKind::Validation(
                ValidationError::InvalidAmount {
                    amount: amount.to_string(),
                    reason: "amount must be greater than zero".to_string(),
                },
            )));
        }

        let voucher = self.insert_with_fresh_code(&phone_number, &amount, plan).await?;

        let push = PushRequest {
            phone_number: phone_number.clone(),
            amount,
            reference: voucher.code.clone(),
            description: self.config.push_description.clone(),
        };

        match self.gateway.request_push(push).await {
            Ok(ack) => {
                if let Err(e) = self
                    .store
                    .set_payment_reference(&voucher.code, &ack.checkout_request_id)
                    .await
                {
                    warn!(code = %voucher.code, error = %e, "failed to record provider reference");
                }
                info!(
                    code = %voucher.code,
                    phone = %phone_number,
                    "purchase initiated, awaiting payment confirmation"
                );
                Ok(PurchaseReceipt {
                    voucher_code: voucher.code,
                    provider_reference: Some(ack.checkout_request_id),
                })
            }
            Err(push_err) => {
                warn!(code = %voucher.code, error = %push_err, "payment push failed, rejecting voucher");
                if let Err(store_err) = self.store.reject_by_code(&voucher.code).await {
                    warn!(code = %voucher.code, error = %store_err, "failed to reject voucher after push failure");
                }
                Err(push_err.into())
            }
        }
    }

    /// Applies a payment-confirmation callback. Duplicate deliveries and
    /// unknown or stale references are benign no-ops: the provider retries
    /// callbacks and may outlive our interest in a voucher.
    pub async fn confirm_payment(
        &self,
        payload: &JsonValue,
    ) -> Result<ConfirmationOutcome, AppError> {
        let callback = CallbackPayload::from_json(payload)?;

        if callback.is_success() {
            if self.store.activate_by_code(&callback.reference).await? {
                info!(
                    code = %callback.reference,
                    receipt = callback.receipt.as_deref().unwrap_or("-"),
                    "payment confirmed, voucher activated"
                );
                Ok(ConfirmationOutcome::Activated)
            } else {
                info!(code = %callback.reference, "confirmation for non-pending voucher, ignoring");
                Ok(ConfirmationOutcome::Ignored)
            }
        } else if self.store.reject_by_code(&callback.reference).await? {
            info!(
                code = %callback.reference,
                result_code = callback.result_code,
                result_desc = callback.result_desc.as_deref().unwrap_or("-"),
                "payment failed, voucher rejected"
            );
            Ok(ConfirmationOutcome::Rejected)
        } else {
            info!(code = %callback.reference, "failure callback for non-pending voucher, ignoring");
            Ok(ConfirmationOutcome::Ignored)
        }
    }

    /// Redeems a voucher under the configured mode. Exactly-once semantics
    /// under racing requests come from the store's atomic transitions.
    pub async fn redeem(&self, code: Option<&str>) -> Result<RedemptionGrant, AppError> {
        match self.config.redemption_mode {
            RedemptionMode::ExplicitCode => {
                let code = code
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| {
                        AppError::new(AppErrorKind::Validation(ValidationError::MissingField {
                            field: "code".to_string(),
                        }))
                    })?;

                if self.store.redeem_by_code(code).await? {
                    info!(code = %code, "voucher redeemed");
                    Ok(RedemptionGrant {
                        voucher_code: code.to_string(),
                    })
                } else {
                    Err(AppError::new(AppErrorKind::Domain(
                        DomainError::InvalidOrUsedCode,
                    )))
                }
            }
            RedemptionMode::AutoAssign => match self.store.claim_unused_active().await? {
                Some(voucher) => {
                    info!(code = %voucher.code, "voucher claimed");
                    Ok(RedemptionGrant {
                        voucher_code: voucher.code,
                    })
                }
                None => Err(AppError::new(AppErrorKind::Domain(
                    DomainError::NoVoucherAvailable,
                ))),
            },
        }
    }

    async fn insert_with_fresh_code(
        &self,
        phone_number: &str,
        amount: &BigDecimal,
        plan: JsonValue,
    ) -> Result<Voucher, AppError> {
        for _ in 0..self.config.max_code_attempts {
            let code = generate_code(self.config.code_length);
            match self
                .store
                .insert_pending(NewVoucher {
                    code,
                    phone_number: phone_number.to_string(),
                    amount: amount.clone(),
                    plan: plan.clone(),
                })
                .await
            {
                Ok(voucher) => return Ok(voucher),
                Err(StoreError::DuplicateCode { code }) => {
                    warn!(code = %code, "voucher code collision, retrying with a fresh code");
                    continue;
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(AppError::new(AppErrorKind::Domain(
            DomainError::CodeGenerationExhausted {
                attempts: self.config.max_code_attempts,
            },
        )))
    }
}

/// Draws each character independently and uniformly from the 36-character
/// uppercase alphanumeric alphabet.
pub fn generate_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}
