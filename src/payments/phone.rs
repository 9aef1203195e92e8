use crate::payments::error::{PaymentError, PaymentResult};

/// Normalizes a Kenyan subscriber number to the `254XXXXXXXXX` form Daraja
/// expects. Accepted inputs: local (`07...`), plus-prefixed (`+254...`) or
/// already normalized (`254...`). The same normalization is applied before
/// the push and before the number is stored.
pub fn normalize_phone_number(raw: &str) -> PaymentResult<String> {
    let trimmed = raw.trim();
    let without_plus = trimmed.strip_prefix('+').unwrap_or(trimmed);

    let normalized = if let Some(rest) = without_plus.strip_prefix('0') {
        format!("254{}", rest)
    } else if without_plus.starts_with("254") {
        without_plus.to_string()
    } else {
        return Err(PaymentError::InvalidPhoneFormat {
            phone: raw.to_string(),
        });
    };

    if normalized.len() != 12 || !normalized.chars().all(|c| c.is_ascii_digit()) {
        return Err(PaymentError::InvalidPhoneFormat {
            phone: raw.to_string(),
        });
    }

    Ok(normalized)
}
