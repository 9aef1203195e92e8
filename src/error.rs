//! Unified error handling for the voucher gateway.
//!
//! Layer-local errors (`payments::PaymentError`, `store::StoreError`) convert
//! into one `AppError` with stable error codes, HTTP status mapping and
//! user-facing messages.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::payments::error::PaymentError;
use crate::store::error::StoreError;

/// Machine-readable error codes for client handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors
    #[serde(rename = "INVALID_OR_USED_CODE")]
    InvalidOrUsedCode,
    #[serde(rename = "NO_VOUCHER_AVAILABLE")]
    NoVoucherAvailable,
    #[serde(rename = "CODE_GENERATION_EXHAUSTED")]
    CodeGenerationExhausted,
    #[serde(rename = "DUPLICATE_CODE")]
    DuplicateCode,

    // Validation errors
    #[serde(rename = "INVALID_PHONE_FORMAT")]
    InvalidPhoneFormat,
    #[serde(rename = "INVALID_AMOUNT")]
    InvalidAmount,
    #[serde(rename = "MISSING_FIELD")]
    MissingField,
    #[serde(rename = "MALFORMED_CALLBACK_PAYLOAD")]
    MalformedCallbackPayload,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,

    // External errors
    #[serde(rename = "PAYMENT_PUSH_FAILED")]
    PaymentPushFailed,
    #[serde(rename = "UPSTREAM_AUTH_ERROR")]
    UpstreamAuthError,

    // Infrastructure errors
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

/// Voucher-domain business errors
#[derive(Debug, Clone)]
pub enum DomainError {
    /// The code does not exist, is not active, or was already redeemed.
    /// Callers never learn which.
    InvalidOrUsedCode,
    /// Auto-assign redemption found no active voucher to hand out
    NoVoucherAvailable,
    /// Code generation kept colliding with existing vouchers
    CodeGenerationExhausted { attempts: u32 },
    /// A voucher code was inserted twice
    DuplicateCode { code: String },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    InvalidPhoneFormat { phone: String },
    InvalidAmount { amount: String, reason: String },
    MissingField { field: String },
    MalformedCallbackPayload { reason: String },
    InvalidField { field: String, message: String },
}

/// Infrastructure-level errors
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String },
    Configuration { message: String },
}

/// Payment-provider errors
#[derive(Debug, Clone)]
pub enum ExternalError {
    PaymentPush { message: String, is_retryable: bool },
    UpstreamAuth { message: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Validation(ValidationError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InvalidOrUsedCode => 400,
                DomainError::NoVoucherAvailable => 404,
                DomainError::CodeGenerationExhausted { .. } => 500,
                DomainError::DuplicateCode { .. } => 409,
            },
            AppErrorKind::Validation(_) => 400,
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentPush { .. } => 502,
                ExternalError::UpstreamAuth { .. } => 502,
            },
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InvalidOrUsedCode => ErrorCode::InvalidOrUsedCode,
                DomainError::NoVoucherAvailable => ErrorCode::NoVoucherAvailable,
                DomainError::CodeGenerationExhausted { .. } => ErrorCode::CodeGenerationExhausted,
                DomainError::DuplicateCode { .. } => ErrorCode::DuplicateCode,
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidPhoneFormat { .. } => ErrorCode::InvalidPhoneFormat,
                ValidationError::InvalidAmount { .. } => ErrorCode::InvalidAmount,
                ValidationError::MissingField { .. } => ErrorCode::MissingField,
                ValidationError::MalformedCallbackPayload { .. } => {
                    ErrorCode::MalformedCallbackPayload
                }
                ValidationError::InvalidField { .. } => ErrorCode::ValidationError,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentPush { .. } => ErrorCode::PaymentPushFailed,
                ExternalError::UpstreamAuth { .. } => ErrorCode::UpstreamAuthError,
            },
        }
    }

    /// Get user-friendly error message. Redemption failures deliberately do
    /// not reveal whether a code never existed or was already used.
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InvalidOrUsedCode => {
                    "Invalid or already used voucher code".to_string()
                }
                DomainError::NoVoucherAvailable => {
                    "No voucher is currently available".to_string()
                }
                DomainError::CodeGenerationExhausted { .. } => {
                    "Could not allocate a voucher code. Please try again".to_string()
                }
                DomainError::DuplicateCode { .. } => {
                    "A voucher with this code already exists".to_string()
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidPhoneFormat { .. } => {
                    "Invalid phone number format".to_string()
                }
                ValidationError::InvalidAmount { reason, .. } => {
                    format!("Invalid amount: {}", reason)
                }
                ValidationError::MissingField { field } => format!("{} is required", field),
                ValidationError::MalformedCallbackPayload { .. } => {
                    "Callback payload is missing required fields".to_string()
                }
                ValidationError::InvalidField { message, .. } => message.clone(),
            },
            AppErrorKind::Infrastructure(_) => {
                "An internal error occurred. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentPush { .. } => {
                    "Failed to initiate the payment request".to_string()
                }
                ExternalError::UpstreamAuth { .. } => {
                    "Payment provider is temporarily unavailable".to_string()
                }
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(DomainError::CodeGenerationExhausted { .. }) => true,
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Validation(_) => false,
            AppErrorKind::Infrastructure(InfrastructureError::Database { .. }) => true,
            AppErrorKind::Infrastructure(_) => false,
            AppErrorKind::External(ExternalError::PaymentPush { is_retryable, .. }) => {
                *is_retryable
            }
            AppErrorKind::External(ExternalError::UpstreamAuth { .. }) => true,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AppErrorKind::Domain(err) => write!(f, "domain error: {:?}", err),
            AppErrorKind::Validation(err) => write!(f, "validation error: {:?}", err),
            AppErrorKind::Infrastructure(err) => write!(f, "infrastructure error: {:?}", err),
            AppErrorKind::External(err) => write!(f, "external error: {:?}", err),
        }?;
        if let Some(context) = &self.context {
            write!(f, " ({})", context)?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        let kind = match err {
            PaymentError::InvalidPhoneFormat { phone } => {
                AppErrorKind::Validation(ValidationError::InvalidPhoneFormat { phone })
            }
            PaymentError::UpstreamAuth { message } => {
                AppErrorKind::External(ExternalError::UpstreamAuth { message })
            }
            PaymentError::PushFailed { message, .. } => {
                AppErrorKind::External(ExternalError::PaymentPush {
                    message,
                    is_retryable: false,
                })
            }
            PaymentError::Network { message } => {
                AppErrorKind::External(ExternalError::PaymentPush {
                    message,
                    is_retryable: true,
                })
            }
            PaymentError::MalformedCallback { reason } => {
                AppErrorKind::Validation(ValidationError::MalformedCallbackPayload { reason })
            }
            PaymentError::Validation { message, field } => {
                AppErrorKind::Validation(ValidationError::InvalidField {
                    field: field.unwrap_or_else(|| "request".to_string()),
                    message,
                })
            }
        };
        AppError::new(kind)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let kind = match err {
            StoreError::DuplicateCode { code } => {
                AppErrorKind::Domain(DomainError::DuplicateCode { code })
            }
            StoreError::Database { message } => {
                AppErrorKind::Infrastructure(InfrastructureError::Database { message })
            }
        };
        AppError::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            AppError::new(AppErrorKind::Domain(DomainError::InvalidOrUsedCode)).status_code(),
            400
        );
        assert_eq!(
            AppError::new(AppErrorKind::Domain(DomainError::NoVoucherAvailable)).status_code(),
            404
        );
        assert_eq!(
            AppError::new(AppErrorKind::External(ExternalError::PaymentPush {
                message: "declined".to_string(),
                is_retryable: false,
            }))
            .status_code(),
            502
        );
    }

    #[test]
    fn redemption_failure_message_does_not_reveal_state() {
        let err = AppError::new(AppErrorKind::Domain(DomainError::InvalidOrUsedCode));
        assert_eq!(err.user_message(), "Invalid or already used voucher code");
    }

    #[test]
    fn payment_errors_convert_with_matching_codes() {
        let err: AppError = PaymentError::InvalidPhoneFormat {
            phone: "12345".to_string(),
        }
        .into();
        assert_eq!(err.error_code(), ErrorCode::InvalidPhoneFormat);

        let err: AppError = PaymentError::PushFailed {
            message: "rejected".to_string(),
            provider_payload: None,
        }
        .into();
        assert_eq!(err.error_code(), ErrorCode::PaymentPushFailed);
    }

    #[test]
    fn store_errors_convert_with_matching_codes() {
        let err: AppError = StoreError::DuplicateCode {
            code: "AB12CD34".to_string(),
        }
        .into();
        assert_eq!(err.error_code(), ErrorCode::DuplicateCode);
        assert_eq!(err.status_code(), 409);
    }
}
