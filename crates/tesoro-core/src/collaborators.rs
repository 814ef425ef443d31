//! Contracts for external collaborators.
//!
//! The settlement core does not own any wire protocol or file format.
//! These traits pin down what it needs from the outside world; the
//! implementations live in outer crates (tesoro-db ships a CSV codec,
//! the stock collaborator belongs to the purchasing module).

use thiserror::Error;

/// Errors from a tabular codec implementation.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("decode failed: {0}")]
    Decode(String),
}

/// A spreadsheet-ish codec: rows of cells in, bytes out, and back.
///
/// Used only by check import/export. Failures inside a single row are the
/// importer's problem (counted, not raised); this trait only fails when
/// the whole buffer is unreadable.
pub trait TabularCodec: Send + Sync {
    /// Encodes rows (first row = header) into a byte buffer.
    fn encode(&self, rows: &[Vec<String>]) -> Result<Vec<u8>, CodecError>;

    /// Decodes a byte buffer into rows, header included.
    fn decode(&self, bytes: &[u8]) -> Result<Vec<Vec<String>>, CodecError>;
}

/// Stock/pricing collaborator invoked by purchase-receipt flows.
///
/// The ledger core never implements this; it is listed here because
/// purchase receipts thread the same unit of work through quantity
/// adjustments and cost recomputation.
pub trait StockAdjuster: Send + Sync {
    /// Adjusts the stock quantity of a product in a branch.
    fn adjust_stock(&self, product_id: &str, qty: i64, tenant_id: &str, branch_id: &str);

    /// Recomputes product cost/price after a purchase receipt.
    fn update_costs(&self, product_id: &str, cost_cents: i64, price_cents: i64, tenant_id: &str);
}

/// Identity context resolved upstream (auth is out of scope here).
///
/// Every ledger call carries one of these; the core trusts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub tenant_id: String,
    pub user_id: String,
    pub branch_id: String,
}

impl RequestContext {
    pub fn new(
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        branch_id: impl Into<String>,
    ) -> Self {
        RequestContext {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            branch_id: branch_id.into(),
        }
    }
}
