use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::Value as JsonValue;
use tracing::{error, info, warn};

use crate::api::ApiState;
use crate::error::{AppErrorKind, ValidationError};
use crate::services::voucher_lifecycle::ConfirmationOutcome;

/// POST /callbacks/mpesa
///
/// The provider retries undelivered callbacks, so everything that parses as
/// JSON is acknowledged with the provider's expected envelope no matter what
/// it did to voucher state. Only a structurally invalid body earns a 400.
pub async fn handle_mpesa_callback(
    State(state): State<ApiState>,
    body: String,
) -> impl IntoResponse {
    let payload: JsonValue = match serde_json::from_str(&body) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "Invalid JSON in payment callback");
            return (StatusCode::BAD_REQUEST, "Invalid JSON").into_response();
        }
    };

    match state.lifecycle.confirm_payment(&payload).await {
        Ok(ConfirmationOutcome::Activated) => {
            info!("payment confirmation applied, voucher activated");
        }
        Ok(ConfirmationOutcome::Rejected) => {
            info!("payment failure applied, voucher rejected");
        }
        Ok(ConfirmationOutcome::Ignored) => {
            info!("payment callback ignored (duplicate or unknown reference)");
        }
        Err(e) => match &e.kind {
            AppErrorKind::Validation(ValidationError::MalformedCallbackPayload { reason }) => {
                warn!(reason = %reason, "malformed payment callback payload, acknowledging anyway");
            }
            _ => {
                error!(error = %e, "payment callback processing failed, acknowledging anyway");
            }
        },
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({"ResultCode": 0, "ResultDesc": "Accepted"})),
    )
        .into_response()
}
