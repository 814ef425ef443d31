//! # Repository Layer
//!
//! Each repository owns one slice of the settlement domain and holds a
//! clone of the shared `SqlitePool`. Mutating operations come in pairs:
//! a root method that opens and commits its own transaction, and an
//! `_in` variant that joins a caller-supplied `&mut SqliteConnection`
//! so composite operations (settlements, check auto-postings) commit
//! atomically.

pub mod account;
pub mod check;
pub mod settlement;
pub mod till;

pub use account::AccountLedger;
pub use check::CheckRegistry;
pub use settlement::Settlements;
pub use till::TillLedger;
