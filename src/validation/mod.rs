use bigdecimal::BigDecimal;
use std::fmt;

pub const SUPPORTED_CURRENCIES: &[&str] = &["USD", "CAD"];
pub const IDEMPOTENCY_KEY_MAX_LEN: usize = 255;
pub const REASON_MAX_LEN: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_positive_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    Ok(())
}

pub fn validate_currency(currency: &str) -> ValidationResult {
    let currency = sanitize_string(currency);
    if SUPPORTED_CURRENCIES
        .iter()
        .all(|candidate| currency != *candidate)
    {
        return Err(ValidationError::new(
            "currency",
            format!("must be one of: {}", SUPPORTED_CURRENCIES.join(", ")),
        ));
    }

    Ok(())
}

pub fn validate_idempotency_key(key: &str) -> ValidationResult {
    if key.trim().is_empty() {
        return Err(ValidationError::new(
            "idempotency_key",
            "must not be empty",
        ));
    }

    if key.len() > IDEMPOTENCY_KEY_MAX_LEN {
        return Err(ValidationError::new(
            "idempotency_key",
            format!("must be at most {} characters", IDEMPOTENCY_KEY_MAX_LEN),
        ));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}
