//! # tesoro-core: Pure Business Logic for the Tesoro Settlement Core
//!
//! This crate is the **heart** of Tesoro. It contains the ledger domain
//! as pure types and rules with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tesoro Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        Consumers (sales, purchases, expenses, HTTP layer)       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tesoro-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌────────────┐  │   │
//! │  │   │   types   │  │   money   │  │ validation│  │collaborators│ │   │
//! │  │   │  Session  │  │   Money   │  │   rules   │  │ codec/stock │ │   │
//! │  │   │  Check    │  │  (cents)  │  │  checks   │  │   seams     │ │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tesoro-db (Storage Layer)                    │   │
//! │  │       SQLite ledgers, transactions, settlement orchestration    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (CashSession, AccountMovement, Check, PaymentOrder)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Typed domain errors + the four-way taxonomy
//! - [`validation`] - Ledger rule validation
//! - [`collaborators`] - Contracts for external collaborators (codec, stock)
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in cents (i64) to avoid float errors
//! 4. **Explicit Errors**: All errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod collaborators;
pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use tesoro_core::Money` instead of
// `use tesoro_core::money::Money`

pub use collaborators::{CodecError, RequestContext, StockAdjuster, TabularCodec};
pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Grace window for `hide_finalized` check views.
///
/// ## Business Reason
/// Finalized checks stay visible for a while so a cashier can still see
/// what cleared last month; anything due longer ago than this drops out
/// of "active" views.
pub const FINALIZED_GRACE_DAYS: i64 = 35;

/// Look-ahead window for "own checks I will have to cover soon".
pub const UPCOMING_OWN_WINDOW_DAYS: i64 = 7;

/// Due-date window for deposited third-party checks worth chasing.
pub const INCOMING_DEPOSIT_WINDOW_DAYS: i64 = 3;
