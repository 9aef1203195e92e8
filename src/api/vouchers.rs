use axum::{extract::State, http::StatusCode, Json};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

use crate::api::ApiState;
use crate::error::{AppError, AppErrorKind, ValidationError};
use crate::middleware::error::get_request_id_from_headers;

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub phone_number: String,
    /// Accepted as a JSON number or a numeric string.
    pub amount: JsonValue,
    #[serde(default)]
    pub plan: JsonValue,
}

#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub success: bool,
    pub voucher_code: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct RedeemRequest {
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    pub success: bool,
    pub granted: bool,
    pub voucher_code: String,
}

/// POST /api/vouchers/purchase
pub async fn purchase_voucher(
    State(state): State<ApiState>,
    headers: axum::http::HeaderMap,
    Json(payload): Json<PurchaseRequest>,
) -> Result<(StatusCode, Json<PurchaseResponse>), AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let with_request_id = |e: AppError| match &request_id {
        Some(id) => e.with_request_id(id.clone()),
        None => e,
    };

    let amount = parse_amount(&payload.amount).map_err(with_request_id)?;

    let receipt = state
        .lifecycle
        .initiate_purchase(&payload.phone_number, amount, payload.plan)
        .await
        .map_err(with_request_id)?;

    Ok((
        StatusCode::CREATED,
        Json(PurchaseResponse {
            success: true,
            voucher_code: receipt.voucher_code,
        }),
    ))
}

/// POST /api/vouchers/redeem
pub async fn redeem_voucher(
    State(state): State<ApiState>,
    headers: axum::http::HeaderMap,
    Json(payload): Json<RedeemRequest>,
) -> Result<Json<RedeemResponse>, AppError> {
    let request_id = get_request_id_from_headers(&headers);

    let grant = state
        .lifecycle
        .redeem(payload.code.as_deref())
        .await
        .map_err(|e| match &request_id {
            Some(id) => e.with_request_id(id.clone()),
            None => e,
        })?;

    Ok(Json(RedeemResponse {
        success: true,
        granted: true,
        voucher_code: grant.voucher_code,
    }))
}

fn parse_amount(value: &JsonValue) -> Result<BigDecimal, AppError> {
    let parsed = match value {
        JsonValue::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        JsonValue::String(s) => BigDecimal::from_str(s.trim()).ok(),
        _ => None,
    };

    parsed.ok_or_else(|| {
        AppError::new(AppErrorKind::Validation(ValidationError::InvalidAmount {
            amount: value.to_string(),
            reason: "amount must be a number".to_string(),
        }))
    })
}
