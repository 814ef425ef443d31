//! # Domain Types
//!
//! Core domain types for the Tesoro settlement ledgers.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────┐   ┌──────────────────┐     │
//! │  │  CashSession    │   │ AccountMovement  │   │      Check       │     │
//! │  │  ─────────────  │   │  ──────────────  │   │  ──────────────  │     │
//! │  │  one per open   │   │  append-only     │   │  lifecycle state │     │
//! │  │  till, owns     │   │  signed ledger   │   │  machine, unique │     │
//! │  │  CashLeg rows   │   │  per Party       │   │  (number, bank)  │     │
//! │  └─────────────────┘   └──────────────────┘   └──────────────────┘     │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────┐                            │
//! │  │  PaymentOrder   │   │      Party       │                            │
//! │  │  ─────────────  │   │  ──────────────  │                            │
//! │  │  one settlement │   │  Client(id) XOR  │                            │
//! │  │  header, owns N │   │  Provider(id)    │                            │
//! │  │  movements      │   │  (type-level)    │                            │
//! │  └─────────────────┘   └──────────────────┘                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID where one exists: (number, bank) for checks,
//!   per-tenant `order_number` for payment orders

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Party (client XOR provider)
// =============================================================================

/// The counterparty of a current-account movement.
///
/// The storage layer keeps two nullable foreign keys (`client_id`,
/// `provider_id`); in the domain the "exactly one is set" invariant is a
/// type-level guarantee. [`Party::from_ids`] is the validated boundary for
/// data arriving in the two-column shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Party {
    Client(String),
    Provider(String),
}

impl Party {
    /// Builds a Party from the nullable-column shape.
    ///
    /// Rejects rows where both or neither id is set - a movement that
    /// points at two entities (or none) is meaningless.
    pub fn from_ids(
        client_id: Option<String>,
        provider_id: Option<String>,
    ) -> Result<Party, ValidationError> {
        match (client_id, provider_id) {
            (Some(c), None) => Ok(Party::Client(c)),
            (None, Some(p)) => Ok(Party::Provider(p)),
            (Some(_), Some(_)) => Err(ValidationError::AmbiguousParty),
            (None, None) => Err(ValidationError::MissingParty),
        }
    }

    /// The client id, if this party is a client.
    pub fn client_id(&self) -> Option<&str> {
        match self {
            Party::Client(id) => Some(id),
            Party::Provider(_) => None,
        }
    }

    /// The provider id, if this party is a provider.
    pub fn provider_id(&self) -> Option<&str> {
        match self {
            Party::Client(_) => None,
            Party::Provider(id) => Some(id),
        }
    }

    pub fn is_client(&self) -> bool {
        matches!(self, Party::Client(_))
    }

    /// The raw entity id regardless of side.
    pub fn entity_id(&self) -> &str {
        match self {
            Party::Client(id) | Party::Provider(id) => id,
        }
    }
}

// =============================================================================
// Till: CashSession + CashLeg
// =============================================================================

/// The status of a till session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session is active and accepting legs.
    Open,
    /// Session was reconciled and closed. Terminal - never reopens.
    Closed,
}

/// A cashier's open-to-close working period.
///
/// `current_cents` is a cache over the leg ledger: it is recomputed in the
/// same transaction as every leg insert and never updated independently.
/// The legs are the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashSession {
    pub id: String,
    pub tenant_id: String,
    pub branch_id: String,
    /// Owner of the session. At most one open session per user.
    pub user_id: String,
    pub status: SessionStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Starting float declared at open.
    pub opening_cents: i64,
    /// opening + Σ(IN legs) − Σ(OUT legs). Cached, see struct docs.
    pub current_cents: i64,
    /// Counted cash declared at close. Null while open.
    pub closing_cents: Option<i64>,
    /// closing − current at close time. Negative = shortage.
    pub difference_cents: Option<i64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CashSession {
    #[inline]
    pub fn opening(&self) -> Money {
        Money::from_cents(self.opening_cents)
    }

    #[inline]
    pub fn current(&self) -> Money {
        Money::from_cents(self.current_cents)
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }
}

/// Direction of a cash movement inside a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum LegDirection {
    /// Cash into the drawer.
    In,
    /// Cash out of the drawer.
    Out,
}

/// What a cash leg was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum CashConcept {
    /// The starting float, written atomically with `open`.
    Opening,
    Sale,
    Expense,
    Withdrawal,
    ProviderPayment,
    Adjustment,
    Closing,
    Refund,
    Other,
}

/// A single signed cash movement inside a till session.
/// Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashLeg {
    pub id: String,
    pub session_id: String,
    pub direction: LegDirection,
    pub concept: CashConcept,
    /// Always > 0; the sign lives in `direction`.
    pub amount_cents: i64,
    pub description: String,
    /// Optional link to the operation that caused this leg (sale id, etc.).
    pub reference: Option<String>,
    /// Who recorded the movement.
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl CashLeg {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    /// The amount with the direction applied (IN positive, OUT negative).
    #[inline]
    pub fn signed_amount(&self) -> Money {
        self.amount().signed(self.direction == LegDirection::In)
    }
}

/// Input for recording a cash leg. Ids and timestamps are assigned by
/// the till ledger; the session is resolved from the acting user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCashLeg {
    pub direction: LegDirection,
    pub concept: CashConcept,
    pub amount_cents: i64,
    pub description: String,
    pub reference: Option<String>,
}

/// Answer to "does this user have a till open right now?".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum TillStatus {
    Closed,
    Open {
        session_id: String,
        opened_at: DateTime<Utc>,
        opening_cents: i64,
        current_cents: i64,
        leg_count: i64,
    },
}

// =============================================================================
// Current account: AccountMovement
// =============================================================================

/// Direction of a current-account movement relative to the entity's debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum MovementDirection {
    /// Increases what the entity owes (or what we owe the provider).
    Debit,
    /// Decreases the debt.
    Credit,
}

/// What originated a current-account movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum MovementConcept {
    Sale,
    Purchase,
    Payment,
    Check,
    Adjustment,
    /// Opening balance when an entity is first put on the ledger.
    Initial,
}

/// One append-only row in an entity's current account.
///
/// Never mutated or deleted after creation; corrections are new
/// `Adjustment` movements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountMovement {
    pub id: String,
    pub tenant_id: String,
    pub direction: MovementDirection,
    pub concept: MovementConcept,
    /// Always > 0; the sign lives in `direction`.
    pub amount_cents: i64,
    pub party: Party,
    /// Set when the movement was produced by a check posting.
    pub check_id: Option<String>,
    /// Set when the movement is a settlement leg of a payment order.
    pub payment_order_id: Option<String>,
    pub reference: Option<String>,
    pub movement_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl AccountMovement {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    /// The amount with the direction applied (debit positive).
    #[inline]
    pub fn signed_amount(&self) -> Money {
        self.amount()
            .signed(self.direction == MovementDirection::Debit)
    }
}

/// Input for posting a new movement. Ids and timestamps are assigned by
/// the ledger.
#[derive(Debug, Clone)]
pub struct NewAccountMovement {
    pub direction: MovementDirection,
    pub concept: MovementConcept,
    pub amount_cents: i64,
    pub party: Party,
    pub check_id: Option<String>,
    pub payment_order_id: Option<String>,
    pub reference: Option<String>,
    pub movement_date: NaiveDate,
}

impl NewAccountMovement {
    /// Shorthand for the common "credit the party for this amount" case.
    pub fn credit(party: Party, concept: MovementConcept, amount_cents: i64) -> Self {
        NewAccountMovement {
            direction: MovementDirection::Credit,
            concept,
            amount_cents,
            party,
            check_id: None,
            payment_order_id: None,
            reference: None,
            movement_date: Utc::now().date_naive(),
        }
    }

    /// Shorthand for the "debit the party" case.
    pub fn debit(party: Party, concept: MovementConcept, amount_cents: i64) -> Self {
        NewAccountMovement {
            direction: MovementDirection::Debit,
            concept,
            amount_cents,
            party,
            check_id: None,
            payment_order_id: None,
            reference: None,
            movement_date: Utc::now().date_naive(),
        }
    }
}

// =============================================================================
// Checks
// =============================================================================

/// Kind of financial instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    /// Issued by us, to pay a provider or as an informal loan.
    Own,
    /// Received from somebody else, usually a client paying down debt.
    ThirdParty,
    /// Electronic check (treated as own-issued for lifecycle purposes).
    Echeck,
}

/// Lifecycle state of a check.
///
/// ## Transition graph
/// ```text
///            ┌──────────► Deposited ───► Paid
///            │                │
///  Pending ──┼──► Used ───────┼────────► Rejected
///            │      │         │
///            ├──► Lent ───────┘   Paid / Rejected / Void: terminal
///            ├──► Paid
///            ├──► Rejected
///            └──► Void
/// ```
/// A bounced check that gets re-presented is recorded as a new check; no
/// state ever reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// In the drawer (third-party) or signed but not yet cleared (own).
    Pending,
    /// Taken to the bank, waiting to clear.
    Deposited,
    /// Funds moved. Terminal.
    Paid,
    /// Handed to a provider as a settlement instrument.
    Used,
    /// Handed over informally (personal loan), tracked by recipient name.
    Lent,
    /// Bounced. Terminal.
    Rejected,
    /// Annulled before circulating. Terminal.
    Void,
}

impl CheckStatus {
    /// Whether the check has left the "active" part of its life.
    #[inline]
    pub const fn is_finalized(&self) -> bool {
        matches!(self, CheckStatus::Paid | CheckStatus::Rejected | CheckStatus::Void)
    }

    /// Validated transition table. Self-transitions are allowed so a patch
    /// that doesn't change status stays idempotent.
    pub fn can_transition_to(&self, next: CheckStatus) -> bool {
        use CheckStatus::*;

        if *self == next {
            return true;
        }

        match self {
            Pending => matches!(next, Deposited | Used | Lent | Paid | Rejected | Void),
            Deposited => matches!(next, Paid | Rejected),
            Used => matches!(next, Paid | Rejected),
            Lent => matches!(next, Paid | Rejected),
            Paid | Rejected | Void => false,
        }
    }
}

/// A deferred-payment instrument: paper check or e-check.
///
/// Unique per `(number, bank)` within a tenant. After creation, lifecycle
/// status and the provider/recipient association are the only fields that
/// change hands; the face data is frozen.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Check {
    pub id: String,
    pub tenant_id: String,
    pub number: String,
    pub bank: String,
    pub amount_cents: i64,
    pub issue_date: NaiveDate,
    pub payment_date: NaiveDate,
    pub check_type: CheckType,
    pub status: CheckStatus,
    /// Who signed a third-party check (name / tax id).
    pub drawer_name: Option<String>,
    pub drawer_tax_id: Option<String>,
    /// Client who handed the check over, for third-party checks.
    pub client_id: Option<String>,
    /// Provider the check was issued to / handed to.
    pub provider_id: Option<String>,
    /// Free-text recipient for own checks given as informal loans.
    pub recipient_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Check {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

/// Input for registering a check. Ids, status (Pending) and timestamps are
/// assigned by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCheck {
    pub number: String,
    pub bank: String,
    pub amount_cents: i64,
    pub issue_date: NaiveDate,
    pub payment_date: NaiveDate,
    pub check_type: CheckType,
    pub drawer_name: Option<String>,
    pub drawer_tax_id: Option<String>,
    pub client_id: Option<String>,
    pub provider_id: Option<String>,
    pub recipient_name: Option<String>,
}

/// Field-merge patch for `CheckRegistry::update`. `None` leaves a field
/// untouched; status changes are validated against the transition table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckPatch {
    pub status: Option<CheckStatus>,
    pub payment_date: Option<NaiveDate>,
    pub drawer_name: Option<String>,
    pub drawer_tax_id: Option<String>,
    pub client_id: Option<String>,
    pub provider_id: Option<String>,
    pub recipient_name: Option<String>,
}

/// Search filters for the checks view.
#[derive(Debug, Clone, Default)]
pub struct CheckFilters {
    /// Matches number, bank or drawer name (substring).
    pub search: Option<String>,
    pub status: Option<CheckStatus>,
    pub check_type: Option<CheckType>,
    pub provider_id: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Hide Paid/Rejected/Void, plus anything due more than the grace
    /// window ago - keeps stale rows out of "active" views without hiding
    /// recently-closed ones.
    pub hide_finalized: bool,
    pub page: u32,
    pub page_size: u32,
}

// =============================================================================
// Payment orders & settlement input
// =============================================================================

/// Header of one provider settlement. Immutable once created; the linked
/// movements carry the detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PaymentOrder {
    pub id: String,
    pub tenant_id: String,
    pub provider_id: String,
    /// Per-tenant incrementing business number.
    pub order_number: i64,
    pub order_date: NaiveDate,
    /// Must equal the sum of the linked movements.
    pub total_cents: i64,
    pub observation: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PaymentOrder {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A new own check to issue as part of a settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnCheckDraft {
    pub number: String,
    pub bank: String,
    pub amount_cents: i64,
    pub issue_date: NaiveDate,
    pub payment_date: NaiveDate,
}

/// The instrument mix of one settlement.
///
/// Third-party check amounts are not carried here - they belong to the
/// referenced checks and are read inside the settlement transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettlementInstruments {
    pub cash_cents: Option<i64>,
    pub transfer_cents: Option<i64>,
    pub transfer_reference: Option<String>,
    pub third_party_check_ids: Vec<String>,
    pub own_checks_to_issue: Vec<OwnCheckDraft>,
}

impl SettlementInstruments {
    /// The portion of the total known without touching storage:
    /// cash + transfer + own drafts.
    pub fn declared_cents(&self) -> i64 {
        self.cash_cents.unwrap_or(0)
            + self.transfer_cents.unwrap_or(0)
            + self
                .own_checks_to_issue
                .iter()
                .map(|c| c.amount_cents)
                .sum::<i64>()
    }

    /// True when nothing at all was supplied.
    pub fn is_empty(&self) -> bool {
        self.cash_cents.unwrap_or(0) == 0
            && self.transfer_cents.unwrap_or(0) == 0
            && self.third_party_check_ids.is_empty()
            && self.own_checks_to_issue.is_empty()
    }
}

// =============================================================================
// Pagination
// =============================================================================

/// One page of results plus the unpaged total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
}

/// Outcome of a best-effort spreadsheet import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub created: u32,
    pub errors: u32,
}

// =============================================================================
// Unit Tests
// =============================================================================
