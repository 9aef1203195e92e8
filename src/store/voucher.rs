use crate::store::error::StoreError;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;
use uuid::Uuid;

/// Voucher lifecycle state. `Pending → {Active, Rejected}`,
/// `Active → Redeemed`; `Rejected` and `Redeemed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherState {
    Pending,
    Active,
    Redeemed,
    Rejected,
}

impl VoucherState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoucherState::Pending => "pending",
            VoucherState::Active => "active",
            VoucherState::Redeemed => "redeemed",
            VoucherState::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for VoucherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VoucherState {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(VoucherState::Pending),
            "active" => Ok(VoucherState::Active),
            "redeemed" => Ok(VoucherState::Redeemed),
            "rejected" => Ok(VoucherState::Rejected),
            other => Err(StoreError::corrupt(format!(
                "unknown voucher state: {}",
                other
            ))),
        }
    }
}

/// A voucher record. Never physically deleted; terminal-state rows are kept
/// for audit.
#[derive(Debug, Clone, Serialize)]
pub struct Voucher {
    pub id: Uuid,
    pub code: String,
    pub state: VoucherState,
    pub phone_number: String,
    pub amount: BigDecimal,
    pub plan: JsonValue,
    pub payment_reference: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Fields supplied when a purchase is initiated. The store assigns id and
/// timestamps and sets the state to `Pending`.
#[derive(Debug, Clone)]
pub struct NewVoucher {
    pub code: String,
    pub phone_number: String,
    pub amount: BigDecimal,
    pub plan: JsonValue,
}
