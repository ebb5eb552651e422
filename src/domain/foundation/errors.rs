//! Error types for the domain layer.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use thiserror::Error;

/// Errors that occur during value object construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Field '{field}' cannot be empty")]
    EmptyField { field: String },

    #[error("Field '{field}' must be between {min} and {max}, got {actual}")]
    OutOfRange {
        field: String,
        min: i64,
        max: i64,
        actual: i64,
    },

    #[error("Field '{field}' has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    #[error("Cannot transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

impl ValidationError {
    /// Creates an empty field validation error.
    pub fn empty_field(field: impl Into<String>) -> Self {
        ValidationError::EmptyField { field: field.into() }
    }

    /// Creates an out of range validation error.
    pub fn out_of_range(field: impl Into<String>, min: i64, max: i64, actual: i64) -> Self {
        ValidationError::OutOfRange {
            field: field.into(),
            min,
            max,
            actual,
        }
    }

    /// Creates an invalid format validation error.
    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid state transition error.
    pub fn invalid_transition(from: impl fmt::Debug, to: impl fmt::Debug) -> Self {
        ValidationError::InvalidTransition {
            from: format!("{:?}", from),
            to: format!("{:?}", to),
        }
    }
}

/// Broad error classes used to pick a response (or a retry decision).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed input, rejected before touching external systems.
    Validation,
    NotFound,
    /// Lost a race or broke a business rule on current state.
    Conflict,
    /// Store, cache or provider unreachable.
    Unavailable,
    /// Invalid signature, revoked token, bad credentials.
    Security,
    RateLimited,
    Internal,
}

/// Error codes organized by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Validation errors
    ValidationFailed,
    EmptyField,
    OutOfRange,
    InvalidFormat,

    // Not found errors
    SubscriptionNotFound,
    GracePeriodNotFound,
    DunningNotFound,
    WinbackOfferNotFound,
    TaskNotFound,
    NotFound,

    // State errors
    InvalidStateTransition,
    ConcurrencyConflict,
    DuplicateEntity,

    // Security errors
    Unauthorized,
    Forbidden,
    TokenRevoked,
    InvalidSignature,

    RateLimited,

    // Infrastructure errors
    DatabaseError,
    CacheError,
    ExternalUnavailable,
    InternalError,
}

impl ErrorCode {
    /// Returns the category this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        use ErrorCode::*;
        match self {
            ValidationFailed | EmptyField | OutOfRange | InvalidFormat => {
                ErrorCategory::Validation
            }
            SubscriptionNotFound | GracePeriodNotFound | DunningNotFound
            | WinbackOfferNotFound | TaskNotFound | NotFound => ErrorCategory::NotFound,
            InvalidStateTransition | ConcurrencyConflict | DuplicateEntity => {
                ErrorCategory::Conflict
            }
            Unauthorized | Forbidden | TokenRevoked | InvalidSignature => ErrorCategory::Security,
            RateLimited => ErrorCategory::RateLimited,
            DatabaseError | CacheError | ExternalUnavailable => ErrorCategory::Unavailable,
            InternalError => ErrorCategory::Internal,
        }
    }

    /// HTTP status code for this error on the request path.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::Unauthorized | ErrorCode::TokenRevoked | ErrorCode::InvalidSignature => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::InternalError => 500,
            _ => match self.category() {
                ErrorCategory::Validation => 400,
                ErrorCategory::NotFound => 404,
                ErrorCategory::Conflict => 409,
                ErrorCategory::Unavailable => 503,
                ErrorCategory::Security => 401,
                ErrorCategory::RateLimited => 429,
                ErrorCategory::Internal => 500,
            },
        }
    }

    /// Returns true if a retry of the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorCode::ConcurrencyConflict
                | ErrorCode::DatabaseError
                | ErrorCode::CacheError
                | ErrorCode::ExternalUnavailable
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::EmptyField => "EMPTY_FIELD",
            ErrorCode::OutOfRange => "OUT_OF_RANGE",
            ErrorCode::InvalidFormat => "INVALID_FORMAT",
            ErrorCode::SubscriptionNotFound => "SUBSCRIPTION_NOT_FOUND",
            ErrorCode::GracePeriodNotFound => "GRACE_PERIOD_NOT_FOUND",
            ErrorCode::DunningNotFound => "DUNNING_NOT_FOUND",
            ErrorCode::WinbackOfferNotFound => "WINBACK_OFFER_NOT_FOUND",
            ErrorCode::TaskNotFound => "TASK_NOT_FOUND",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            ErrorCode::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            ErrorCode::DuplicateEntity => "DUPLICATE_ENTITY",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::TokenRevoked => "TOKEN_REVOKED",
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::CacheError => "CACHE_ERROR",
            ErrorCode::ExternalUnavailable => "EXTERNAL_UNAVAILABLE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Standard domain error with code, message, and optional details.
#[derive(Debug, Clone)]
pub struct DomainError {
    pub code: ErrorCode,
    pub message: String,
    pub details: HashMap<String, String>,
}

impl DomainError {
    /// Creates a new domain error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: HashMap::new(),
        }
    }

    /// Creates a validation error for a specific field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::ValidationFailed,
            message: message.into(),
            details: HashMap::new(),
        }
        .with_detail("field", field.into())
    }

    /// Creates a database error (store unreachable or query failed).
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Creates an optimistic-lock conflict for the named entity.
    pub fn conflict(entity: impl Into<String>) -> Self {
        let entity = entity.into();
        Self::new(
            ErrorCode::ConcurrencyConflict,
            format!("{} was modified concurrently", entity),
        )
        .with_detail("entity", entity)
    }

    /// Adds a detail to the error.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for DomainError {}

impl From<ValidationError> for DomainError {
    fn from(err: ValidationError) -> Self {
        let code = match &err {
            ValidationError::EmptyField { .. } => ErrorCode::EmptyField,
            ValidationError::OutOfRange { .. } => ErrorCode::OutOfRange,
            ValidationError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            ValidationError::InvalidTransition { .. } => ErrorCode::InvalidStateTransition,
        };
        DomainError::new(code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_empty_field_displays_correctly() {
        let err = ValidationError::empty_field("user_id");
        assert_eq!(format!("{}", err), "Field 'user_id' cannot be empty");
    }

    #[test]
    fn validation_error_out_of_range_displays_correctly() {
        let err = ValidationError::out_of_range("duration_days", 1, 30, 45);
        assert_eq!(
            format!("{}", err),
            "Field 'duration_days' must be between 1 and 30, got 45"
        );
    }

    #[test]
    fn validation_error_invalid_transition_uses_debug_names() {
        #[derive(Debug)]
        enum S {
            Active,
            Expired,
        }
        let err = ValidationError::invalid_transition(S::Expired, S::Active);
        assert_eq!(format!("{}", err), "Cannot transition from Expired to Active");
    }

    #[test]
    fn domain_error_displays_code_and_message() {
        let err = DomainError::new(ErrorCode::SubscriptionNotFound, "Subscription not found");
        assert_eq!(
            format!("{}", err),
            "[SUBSCRIPTION_NOT_FOUND] Subscription not found"
        );
    }

    #[test]
    fn domain_error_with_detail_adds_detail() {
        let err = DomainError::new(ErrorCode::ValidationFailed, "Validation failed")
            .with_detail("field", "receipt")
            .with_detail("reason", "empty");

        assert_eq!(err.details.get("field"), Some(&"receipt".to_string()));
        assert_eq!(err.details.get("reason"), Some(&"empty".to_string()));
    }

    #[test]
    fn conflict_is_transient_and_maps_to_409() {
        let err = DomainError::conflict("subscription");
        assert_eq!(err.code, ErrorCode::ConcurrencyConflict);
        assert!(err.code.is_transient());
        assert_eq!(err.code.http_status(), 409);
    }

    #[test]
    fn security_codes_map_to_401_or_403() {
        assert_eq!(ErrorCode::TokenRevoked.http_status(), 401);
        assert_eq!(ErrorCode::InvalidSignature.http_status(), 401);
        assert_eq!(ErrorCode::Forbidden.http_status(), 403);
    }

    #[test]
    fn infrastructure_codes_map_to_503() {
        assert_eq!(ErrorCode::DatabaseError.http_status(), 503);
        assert_eq!(ErrorCode::CacheError.http_status(), 503);
        assert_eq!(ErrorCode::ExternalUnavailable.http_status(), 503);
    }

    #[test]
    fn validation_error_converts_to_matching_code() {
        let err: DomainError = ValidationError::empty_field("x").into();
        assert_eq!(err.code, ErrorCode::EmptyField);
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn error_code_display_formats_correctly() {
        assert_eq!(format!("{}", ErrorCode::TokenRevoked), "TOKEN_REVOKED");
        assert_eq!(format!("{}", ErrorCode::InternalError), "INTERNAL_ERROR");
    }
}
