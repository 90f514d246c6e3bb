use thiserror::Error;

/// Rejected input, caught before anything reaches the database.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    #[error("{field} exceeds maximum length of {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("{field} must be a finite, non-negative amount")]
    InvalidAmount { field: &'static str },

    #[error("{field} must be less than {max}")]
    TooLarge { field: &'static str, max: f64 },

    #[error("{left} and {right} must have the same length ({left_len} vs {right_len})")]
    LengthMismatch {
        left: &'static str,
        right: &'static str,
        left_len: usize,
        right_len: usize,
    },
}

pub(crate) fn require_text(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

/// Money columns are `NUMERIC(10,2)`: eight integer digits after rounding to cents.
pub const AMOUNT_LIMIT: f64 = 100_000_000.0;

pub(crate) fn require_amount(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ValidationError::InvalidAmount { field });
    }
    if (value * 100.0).round() >= AMOUNT_LIMIT * 100.0 {
        return Err(ValidationError::TooLarge { field, max: AMOUNT_LIMIT });
    }
    Ok(())
}

pub(crate) fn require_id(field: &'static str, value: i32) -> Result<(), ValidationError> {
    if value <= 0 {
        return Err(ValidationError::NotPositive { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ValidationError::LengthMismatch {
            left: "product_ids",
            right: "quantities",
            left_len: 2,
            right_len: 1,
        };
        assert_eq!(
            err.to_string(),
            "product_ids and quantities must have the same length (2 vs 1)"
        );
    }

    #[test]
    fn whitespace_is_empty() {
        assert_eq!(
            require_text("contact", "   ", 20),
            Err(ValidationError::Empty { field: "contact" })
        );
    }

    #[test]
    fn length_counts_characters() {
        assert!(require_text("location", "Zürich", 6).is_ok());
        assert_eq!(
            require_text("location", "Zürich!", 6),
            Err(ValidationError::TooLong { field: "location", max: 6 })
        );
    }

    #[test]
    fn amounts_fit_two_decimal_column() {
        assert!(require_amount("price", 0.0).is_ok());
        assert!(require_amount("price", 99_999_999.99).is_ok());
        assert_eq!(
            require_amount("price", 99_999_999.996),
            Err(ValidationError::TooLarge { field: "price", max: AMOUNT_LIMIT })
        );
        assert_eq!(
            require_amount("price", -0.01),
            Err(ValidationError::InvalidAmount { field: "price" })
        );
        assert_eq!(
            ValidationError::TooLarge { field: "price", max: AMOUNT_LIMIT }.to_string(),
            "price must be less than 100000000"
        );
    }

    #[test]
    fn ids_must_be_positive() {
        assert!(require_id("order_id", 1).is_ok());
        assert!(require_id("order_id", 0).is_err());
        assert!(require_id("order_id", -4).is_err());
    }
}
