//! # Error Types
//!
//! Domain-specific error types for tesoro-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tesoro-core errors (this file)                                        │
//! │  ├── CoreError        - Ledger rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tesoro-db errors (separate crate)                                     │
//! │  ├── DbError          - Storage operation failures                     │
//! │  └── LedgerError      - Core ∪ Db, what services return                │
//! │                                                                         │
//! │  Every CoreError classifies into one of four kinds:                    │
//! │  Validation | Conflict | Precondition | NotFound                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (check number, user id, etc.)
//! 3. Errors are enum variants, never String
//! 4. A business error never partially commits - the enclosing unit of
//!    work rolls back before the error reaches the caller

use thiserror::Error;

use crate::types::{CheckStatus, CheckType};

// =============================================================================
// Error Kind (taxonomy)
// =============================================================================

/// Coarse classification used by callers to pick a response: retry,
/// surface to the user, 404, etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input: non-positive amount, bad instrument mix.
    Validation,
    /// State clash: duplicate check, second open session, check in motion.
    Conflict,
    /// Operation needs state that isn't there: no open session.
    Precondition,
    /// Unknown id.
    NotFound,
}

// =============================================================================
// Core Error
// =============================================================================

/// Ledger business rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The user already has an open till session.
    ///
    /// ## When This Occurs
    /// - `open` called twice without an intervening `close`
    /// - Two terminals racing for the same cashier (the partial unique
    ///   index catches what the pre-check misses)
    #[error("user {user_id} already has an open till session")]
    SessionAlreadyOpen { user_id: String },

    /// A cash operation needs an open session and there is none.
    #[error("user {user_id} has no open till session")]
    NoOpenSession { user_id: String },

    /// Till session not found.
    #[error("till session not found: {0}")]
    SessionNotFound(String),

    /// A check with the same (number, bank) already exists in the tenant.
    #[error("check {number} on {bank} already exists")]
    DuplicateCheck { number: String, bank: String },

    /// Check not found.
    #[error("check not found: {0}")]
    CheckNotFound(String),

    /// A settlement referenced a check that is already in motion.
    ///
    /// ## When This Occurs
    /// - `settle` names a third-party check whose status is not Pending;
    ///   a check already deposited, used or bounced cannot be redirected
    #[error("check {check_id} is {status:?}, only pending checks can be used")]
    CheckNotPending {
        check_id: String,
        status: CheckStatus,
    },

    /// A settlement instrument slot that only takes third-party checks
    /// got something else.
    ///
    /// ## When This Occurs
    /// - `settle` names an own check or e-check in
    ///   `third_party_check_ids`; endorsing it would credit the provider
    ///   a second time on top of its issuance posting
    #[error("check {check_id} is {check_type:?}, only third-party checks can be endorsed")]
    CheckNotThirdParty {
        check_id: String,
        check_type: CheckType,
    },

    /// A status patch that the lifecycle graph forbids.
    #[error("check status cannot change from {from:?} to {to:?}")]
    InvalidStatusTransition { from: CheckStatus, to: CheckStatus },

    /// A settlement with nothing in it.
    #[error("settlement total must be positive, got {total_cents} cents")]
    EmptySettlement { total_cents: i64 },

    /// Payment order not found.
    #[error("payment order not found: {0}")]
    OrderNotFound(String),

    /// Validation error (wraps ValidationError).
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Classifies the error into the four-way taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::SessionAlreadyOpen { .. }
            | CoreError::DuplicateCheck { .. }
            | CoreError::CheckNotPending { .. }
            | CoreError::CheckNotThirdParty { .. }
            | CoreError::InvalidStatusTransition { .. } => ErrorKind::Conflict,

            CoreError::NoOpenSession { .. } => ErrorKind::Precondition,

            CoreError::SessionNotFound(_)
            | CoreError::CheckNotFound(_)
            | CoreError::OrderNotFound(_) => ErrorKind::NotFound,

            CoreError::EmptySettlement { .. } | CoreError::Validation(_) => ErrorKind::Validation,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, raised before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (bad date, malformed number).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A movement pointing at both a client and a provider.
    #[error("movement must target a client or a provider, not both")]
    AmbiguousParty,

    /// A movement pointing at nobody.
    #[error("movement must target exactly one client or provider")]
    MissingParty,

    /// issue_date after payment_date.
    #[error("check issue date must not be after its payment date")]
    DatesOutOfOrder,
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::CheckNotPending {
            check_id: "abc".to_string(),
            status: CheckStatus::Deposited,
        };
        assert_eq!(
            err.to_string(),
            "check abc is Deposited, only pending checks can be used"
        );

        let err = CoreError::SessionAlreadyOpen {
            user_id: "u-7".to_string(),
        };
        assert_eq!(err.to_string(), "user u-7 already has an open till session");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            CoreError::SessionAlreadyOpen { user_id: "u".into() }.kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            CoreError::NoOpenSession { user_id: "u".into() }.kind(),
            ErrorKind::Precondition
        );
        assert_eq!(
            CoreError::CheckNotFound("x".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CoreError::EmptySettlement { total_cents: 0 }.kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            CoreError::DuplicateCheck {
                number: "1".into(),
                bank: "b".into()
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            CoreError::CheckNotThirdParty {
                check_id: "c".into(),
                check_type: CheckType::Own
            }
            .kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::MustBePositive {
            field: "amount".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.kind(), ErrorKind::Validation);
    }
}
