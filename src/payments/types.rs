use bigdecimal::{BigDecimal, FromPrimitive};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

use crate::payments::error::{PaymentError, PaymentResult};

/// Request for a payment push to a subscriber's handset. `phone_number`
/// must already be normalized and `reference` is the voucher code the
/// confirmation callback has to echo back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub phone_number: String,
    pub amount: BigDecimal,
    pub reference: String,
    pub description: String,
}

impl PushRequest {
    pub fn validate(&self) -> PaymentResult<()> {
        if self.amount <= BigDecimal::from(0) {
            return Err(PaymentError::Validation {
                message: "amount must be greater than zero".to_string(),
                field: Some("amount".to_string()),
            });
        }
        if self.reference.trim().is_empty() {
            return Err(PaymentError::Validation {
                message: "reference is required".to_string(),
                field: Some("reference".to_string()),
            });
        }
        Ok(())
    }
}

/// Provider acknowledgment that the push was accepted for processing.
/// This is NOT a payment outcome; the outcome arrives on the callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushAck {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub response_description: Option<String>,
}

/// Bearer credential from the provider identity endpoint. Daraja returns
/// `expires_in` as a string.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessCredential {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<String>,
}

/// A payment-confirmation callback reduced to the fields the lifecycle
/// manager needs. `reference` is the voucher code echoed back from the
/// push's AccountReference; metadata items are matched by name, never by
/// positional index.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackPayload {
    pub result_code: i64,
    pub result_desc: Option<String>,
    pub reference: String,
    pub amount: Option<BigDecimal>,
    pub receipt: Option<String>,
}

impl CallbackPayload {
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }

    /// Parses a provider callback body. Accepts both the Daraja envelope
    /// (`Body.stkCallback`) and a flat object carrying the same fields.
    pub fn from_json(payload: &JsonValue) -> PaymentResult<Self> {
        let callback = payload
            .get("Body")
            .and_then(|b| b.get("stkCallback"))
            .unwrap_or(payload);

        let result_code = callback
            .get("ResultCode")
            .and_then(json_as_i64)
            .ok_or_else(|| PaymentError::MalformedCallback {
                reason: "missing ResultCode".to_string(),
            })?;

        let result_desc = callback
            .get("ResultDesc")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string());

        let reference = callback
            .get("AccountReference")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| metadata_item_str(callback, "AccountReference"))
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| PaymentError::MalformedCallback {
                reason: "missing AccountReference".to_string(),
            })?;

        let amount = metadata_item(callback, "Amount").and_then(json_as_decimal);
        let receipt = metadata_item_str(callback, "MpesaReceiptNumber");

        Ok(Self {
            result_code,
            result_desc,
            reference,
            amount,
            receipt,
        })
    }
}

/// Looks up a `CallbackMetadata.Item` entry by its `Name` field.
fn metadata_item<'a>(callback: &'a JsonValue, name: &str) -> Option<&'a JsonValue> {
    callback
        .get("CallbackMetadata")
        .and_then(|m| m.get("Item"))
        .and_then(|items| items.as_array())
        .and_then(|items| {
            items
                .iter()
                .find(|item| item.get("Name").and_then(|n| n.as_str()) == Some(name))
        })
        .and_then(|item| item.get("Value"))
}

fn metadata_item_str(callback: &JsonValue, name: &str) -> Option<String> {
    metadata_item(callback, name)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
}

fn json_as_i64(value: &JsonValue) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse::<i64>().ok()))
}

fn json_as_decimal(value: &JsonValue) -> Option<BigDecimal> {
    match value {
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(BigDecimal::from(i))
            } else {
                n.as_f64().and_then(BigDecimal::from_f64)
            }
        }
        JsonValue::String(s) => BigDecimal::from_str(s).ok(),
        _ => None,
    }
}
