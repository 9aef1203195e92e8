use serde_json::Value as JsonValue;
use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Invalid phone number format: {phone}")]
    InvalidPhoneFormat { phone: String },

    #[error("Upstream auth error: {message}")]
    UpstreamAuth { message: String },

    #[error("Payment push failed: {message}")]
    PushFailed {
        message: String,
        provider_payload: Option<JsonValue>,
    },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Malformed callback payload: {reason}")]
    MalformedCallback { reason: String },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },
}

impl PaymentError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::InvalidPhoneFormat { .. } => false,
            PaymentError::UpstreamAuth { .. } => true,
            PaymentError::PushFailed { .. } => false,
            PaymentError::Network { .. } => true,
            PaymentError::MalformedCallback { .. } => false,
            PaymentError::Validation { .. } => false,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::InvalidPhoneFormat { .. } => 400,
            PaymentError::UpstreamAuth { .. } => 502,
            PaymentError::PushFailed { .. } => 502,
            PaymentError::Network { .. } => 503,
            PaymentError::MalformedCallback { .. } => 400,
            PaymentError::Validation { .. } => 400,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PaymentError::InvalidPhoneFormat { .. } => "Invalid phone number format".to_string(),
            PaymentError::UpstreamAuth { .. } => {
                "Could not authenticate with the payment provider".to_string()
            }
            PaymentError::PushFailed { .. } => {
                "Failed to initiate the payment request".to_string()
            }
            PaymentError::Network { .. } => {
                "Payment provider is temporarily unavailable".to_string()
            }
            PaymentError::MalformedCallback { .. } => {
                "Callback payload is missing required fields".to_string()
            }
            PaymentError::Validation { message, .. } => message.clone(),
        }
    }
}
