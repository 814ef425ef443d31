//! # tesoro-db: Storage Layer for the Tesoro Settlement Core
//!
//! SQLite persistence for the treasury domain defined in `tesoro-core`,
//! async throughout via sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tesoro Data Flow                                 │
//! │                                                                         │
//! │  Caller (API handler, desktop command, batch job)                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tesoro-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌──────────────────┐   ┌─────────────┐  │   │
//! │  │   │   Database    │    │   Repositories   │   │ Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │  till / account  │   │ (embedded)  │  │   │
//! │  │   │               │    │  check /         │   │             │  │   │
//! │  │   │ SqlitePool    │◄───│  settlement      │   │ 001_init.sql│  │   │
//! │  │   │ WAL, FKs on   │    │                  │   │             │  │   │
//! │  │   └───────────────┘    └──────────────────┘   └─────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │                     SQLite Database (one file per deployment)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Storage and ledger error types
//! - [`repository`] - The four domain repositories
//! - [`codec`] - CSV implementation of the tabular codec
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tesoro_db::{Database, DbConfig};
//! use tesoro_core::Party;
//!
//! let db = Database::new(DbConfig::new("path/to/tesoro.sqlite")).await?;
//!
//! let session = db.till().open(&ctx, 50_000, None).await?;
//! let balance = db.accounts().balance("t1", &Party::Provider("p9".into())).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod codec;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use codec::CsvCodec;
pub use error::{DbError, DbResult, LedgerError, LedgerResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::account::AccountLedger;
pub use repository::check::CheckRegistry;
pub use repository::settlement::Settlements;
pub use repository::till::TillLedger;

// =============================================================================
// Test Utilities
// =============================================================================
