//! # Check Registry
//!
//! Registration, lifecycle and querying of deferred-payment instruments.
//!
//! ## Responsibilities
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         CheckRegistry                               │
//! │                                                                     │
//! │  create ──► validate ──► duplicate guard ──► INSERT ──► auto-post   │
//! │                          (tenant,number,bank)           CREDIT to   │
//! │                                                         the party   │
//! │                                                                     │
//! │  update ──► transition table gate ──► field-merge UPDATE            │
//! │                                                                     │
//! │  find / upcoming_own_payments / incoming_third_party: read views    │
//! │  export / import: spreadsheet round trips via a TabularCodec        │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The auto-posting rule: registering a check that already names its
//! counterpart entity immediately CREDITs that entity's account - an own
//! check handed to a provider pays down what we owe them, a third-party
//! check received from a client pays down what the client owes us. Both
//! writes share one unit of work.

use chrono::{Duration, NaiveDate, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, LedgerResult};
use crate::repository::account::AccountLedger;
use tesoro_core::validation::validate_new_check;
use tesoro_core::{
    Check, CheckFilters, CheckPatch, CheckStatus, CheckType, CoreError, ImportSummary, Money,
    MovementConcept, NewAccountMovement, NewCheck, Page, Party, TabularCodec,
    FINALIZED_GRACE_DAYS, INCOMING_DEPOSIT_WINDOW_DAYS, UPCOMING_OWN_WINDOW_DAYS,
};

/// Registry of checks and e-checks for all tenants.
#[derive(Debug, Clone)]
pub struct CheckRegistry {
    pool: SqlitePool,
    accounts: AccountLedger,
}

impl CheckRegistry {
    /// Creates a new CheckRegistry.
    pub fn new(pool: SqlitePool) -> Self {
        let accounts = AccountLedger::new(pool.clone());
        CheckRegistry { pool, accounts }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers a check in its own transaction.
    pub async fn create(&self, tenant_id: &str, new_check: NewCheck) -> LedgerResult<Check> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let check = self.create_in(&mut tx, tenant_id, new_check, None).await?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(check)
    }

    /// Registers a check inside the caller's unit of work.
    ///
    /// When the new check names a counterpart entity, a CREDIT movement is
    /// posted to that entity's account in the same unit of work,
    /// `payment_order_id` (if any) linking it to the settlement that issued
    /// the check.
    ///
    /// ## Errors
    /// - Validation for empty number/bank, non-positive amount, or
    ///   issue date after payment date
    /// - Conflict when `(number, bank)` already exists for this tenant
    pub async fn create_in(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        new_check: NewCheck,
        payment_order_id: Option<String>,
    ) -> LedgerResult<Check> {
        validate_new_check(&new_check).map_err(CoreError::Validation)?;

        // Friendly duplicate check first; the unique index backstops races.
        let existing: Option<String> = sqlx::query_scalar(
            "SELECT id FROM checks WHERE tenant_id = ?1 AND number = ?2 AND bank = ?3",
        )
        .bind(tenant_id)
        .bind(&new_check.number)
        .bind(&new_check.bank)
        .fetch_optional(&mut *conn)
        .await
        .map_err(DbError::from)?;

        if existing.is_some() {
            return Err(CoreError::DuplicateCheck {
                number: new_check.number,
                bank: new_check.bank,
            }
            .into());
        }

        let now = Utc::now();
        let check = Check {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            number: new_check.number,
            bank: new_check.bank,
            amount_cents: new_check.amount_cents,
            issue_date: new_check.issue_date,
            payment_date: new_check.payment_date,
            check_type: new_check.check_type,
            status: CheckStatus::Pending,
            drawer_name: new_check.drawer_name,
            drawer_tax_id: new_check.drawer_tax_id,
            client_id: new_check.client_id,
            provider_id: new_check.provider_id,
            recipient_name: new_check.recipient_name,
            created_at: now,
            updated_at: now,
        };

        debug!(
            id = %check.id,
            number = %check.number,
            bank = %check.bank,
            amount_cents = check.amount_cents,
            check_type = ?check.check_type,
            "Registering check"
        );

        let insert = sqlx::query(
            r#"
            INSERT INTO checks (
                id, tenant_id, number, bank, amount_cents,
                issue_date, payment_date, check_type, status,
                drawer_name, drawer_tax_id, client_id, provider_id,
                recipient_name, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
        )
        .bind(&check.id)
        .bind(&check.tenant_id)
        .bind(&check.number)
        .bind(&check.bank)
        .bind(check.amount_cents)
        .bind(check.issue_date)
        .bind(check.payment_date)
        .bind(check.check_type)
        .bind(check.status)
        .bind(&check.drawer_name)
        .bind(&check.drawer_tax_id)
        .bind(&check.client_id)
        .bind(&check.provider_id)
        .bind(&check.recipient_name)
        .bind(check.created_at)
        .bind(check.updated_at)
        .execute(&mut *conn)
        .await;

        if let Err(e) = insert {
            let db_err = DbError::from(e);
            if db_err.is_unique_violation_on("checks.") {
                return Err(CoreError::DuplicateCheck {
                    number: check.number,
                    bank: check.bank,
                }
                .into());
            }
            return Err(db_err.into());
        }

        if let Some(party) = auto_posting_party(&check) {
            let movement = NewAccountMovement {
                check_id: Some(check.id.clone()),
                payment_order_id,
                movement_date: check.issue_date,
                ..NewAccountMovement::credit(party, MovementConcept::Check, check.amount_cents)
            };
            self.accounts.post_in(conn, tenant_id, movement).await?;
        }

        Ok(check)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Fetches a single check.
    pub async fn get(&self, tenant_id: &str, check_id: &str) -> LedgerResult<Check> {
        sqlx::query_as::<_, Check>("SELECT * FROM checks WHERE tenant_id = ?1 AND id = ?2")
            .bind(tenant_id)
            .bind(check_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?
            .ok_or_else(|| CoreError::CheckNotFound(check_id.to_string()).into())
    }

    /// Applies a field-merge patch to a check.
    ///
    /// Face data (number, bank, amount, dates of issue) is frozen after
    /// registration; the patch touches lifecycle status, the due date and
    /// the entity associations. Status changes run through the transition
    /// table.
    pub async fn update(
        &self,
        tenant_id: &str,
        check_id: &str,
        patch: CheckPatch,
    ) -> LedgerResult<Check> {
        let mut check = self.get(tenant_id, check_id).await?;
        let read_status = check.status;

        if let Some(next) = patch.status {
            if !check.status.can_transition_to(next) {
                return Err(CoreError::InvalidStatusTransition {
                    from: check.status,
                    to: next,
                }
                .into());
            }
            if next != check.status {
                info!(id = %check.id, from = ?check.status, to = ?next, "Check status change");
            }
            check.status = next;
        }

        if let Some(date) = patch.payment_date {
            check.payment_date = date;
        }
        if let Some(name) = patch.drawer_name {
            check.drawer_name = Some(name);
        }
        if let Some(tax_id) = patch.drawer_tax_id {
            check.drawer_tax_id = Some(tax_id);
        }
        if let Some(client) = patch.client_id {
            check.client_id = Some(client);
        }
        if let Some(provider) = patch.provider_id {
            check.provider_id = Some(provider);
        }
        if let Some(recipient) = patch.recipient_name {
            check.recipient_name = Some(recipient);
        }
        check.updated_at = Utc::now();

        // Guarded write: only lands if the status is still the one the
        // transition was validated against.
        let updated = sqlx::query(
            r#"
            UPDATE checks
            SET status = ?1, payment_date = ?2, drawer_name = ?3, drawer_tax_id = ?4,
                client_id = ?5, provider_id = ?6, recipient_name = ?7, updated_at = ?8
            WHERE tenant_id = ?9 AND id = ?10 AND status = ?11
            "#,
        )
        .bind(check.status)
        .bind(check.payment_date)
        .bind(&check.drawer_name)
        .bind(&check.drawer_tax_id)
        .bind(&check.client_id)
        .bind(&check.provider_id)
        .bind(&check.recipient_name)
        .bind(check.updated_at)
        .bind(tenant_id)
        .bind(check_id)
        .bind(read_status)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        if updated.rows_affected() == 0 {
            // Another writer changed the status between the read and this
            // write; report the transition against what is there now.
            let current = self.get(tenant_id, check_id).await?;
            return Err(CoreError::InvalidStatusTransition {
                from: current.status,
                to: check.status,
            }
            .into());
        }

        Ok(check)
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Filtered, paged check listing ordered by due date.
    pub async fn find(
        &self,
        tenant_id: &str,
        filters: &CheckFilters,
    ) -> LedgerResult<Page<Check>> {
        let page_size = filters.page_size.clamp(1, 500);
        let offset = i64::from(filters.page.saturating_sub(1)) * i64::from(page_size);

        let mut count_qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM checks WHERE tenant_id = ");
        count_qb.push_bind(tenant_id);
        push_filters(&mut count_qb, filters);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::from)?;

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM checks WHERE tenant_id = ");
        qb.push_bind(tenant_id);
        push_filters(&mut qb, filters);
        qb.push(" ORDER BY payment_date ASC, created_at ASC LIMIT ");
        qb.push_bind(page_size as i64);
        qb.push(" OFFSET ");
        qb.push_bind(offset);

        let data = qb
            .build_query_as::<Check>()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)?;

        Ok(Page { data, total })
    }

    /// Own checks (and e-checks) coming due within the next week that have
    /// not cleared yet. The treasury needs funds in the account before
    /// these hit.
    pub async fn upcoming_own_payments(&self, tenant_id: &str) -> LedgerResult<Vec<Check>> {
        let horizon = Utc::now().date_naive() + Duration::days(UPCOMING_OWN_WINDOW_DAYS);

        sqlx::query_as::<_, Check>(
            r#"
            SELECT * FROM checks
            WHERE tenant_id = ?1
              AND check_type IN ('own', 'echeck')
              AND status IN ('pending', 'deposited')
              AND payment_date < ?2
            ORDER BY payment_date ASC
            "#,
        )
        .bind(tenant_id)
        .bind(horizon)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DbError::from(e).into())
    }

    /// Third-party checks to watch: deposited ones about to clear, plus
    /// everything still sitting in the drawer.
    pub async fn incoming_third_party(&self, tenant_id: &str) -> LedgerResult<Vec<Check>> {
        let horizon = Utc::now().date_naive() + Duration::days(INCOMING_DEPOSIT_WINDOW_DAYS);

        sqlx::query_as::<_, Check>(
            r#"
            SELECT * FROM checks
            WHERE tenant_id = ?1
              AND check_type = 'third_party'
              AND (
                    (status = 'deposited' AND payment_date <= ?2)
                    OR status = 'pending'
              )
            ORDER BY payment_date ASC
            "#,
        )
        .bind(tenant_id)
        .bind(horizon)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DbError::from(e).into())
    }

    // =========================================================================
    // Spreadsheet round trips
    // =========================================================================

    /// Exports every check of the tenant through the given codec.
    pub async fn export(
        &self,
        tenant_id: &str,
        codec: &dyn TabularCodec,
    ) -> LedgerResult<Vec<u8>> {
        let checks = sqlx::query_as::<_, Check>(
            "SELECT * FROM checks WHERE tenant_id = ?1 ORDER BY payment_date ASC, created_at ASC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        let mut rows = Vec::with_capacity(checks.len() + 1);
        rows.push(
            EXPORT_HEADER
                .iter()
                .map(|h| h.to_string())
                .collect::<Vec<_>>(),
        );
        for check in &checks {
            rows.push(vec![
                check.number.clone(),
                check.bank.clone(),
                check.amount().to_string(),
                check.issue_date.to_string(),
                check.payment_date.to_string(),
                type_label(check.check_type).to_string(),
                status_label(check.status).to_string(),
                check.drawer_name.clone().unwrap_or_default(),
            ]);
        }

        Ok(codec.encode(&rows)?)
    }

    /// Best-effort import of checks from a decoded spreadsheet.
    ///
    /// Each data row becomes one `create` in its own transaction; rows
    /// that fail to parse, fail validation or collide with an existing
    /// `(number, bank)` are counted and skipped rather than aborting the
    /// batch. Amounts go through the lenient money parser to survive
    /// locale formatting ("1.234,50", "$1,234.50").
    pub async fn import(
        &self,
        tenant_id: &str,
        bytes: &[u8],
        codec: &dyn TabularCodec,
    ) -> LedgerResult<ImportSummary> {
        let rows = codec.decode(bytes)?;
        let mut summary = ImportSummary::default();

        // First row is the header.
        for (idx, row) in rows.iter().enumerate().skip(1) {
            match parse_import_row(row) {
                Some(new_check) => match self.create(tenant_id, new_check).await {
                    Ok(_) => summary.created += 1,
                    Err(e) => {
                        warn!(row = idx, error = %e, "Import row rejected");
                        summary.errors += 1;
                    }
                },
                None => {
                    warn!(row = idx, "Import row unparseable");
                    summary.errors += 1;
                }
            }
        }

        info!(
            created = summary.created,
            errors = summary.errors,
            "Check import finished"
        );
        Ok(summary)
    }
}

const EXPORT_HEADER: [&str; 8] = [
    "number",
    "bank",
    "amount",
    "issue_date",
    "payment_date",
    "type",
    "status",
    "drawer_name",
];

/// Which entity a freshly registered check credits, if any.
fn auto_posting_party(check: &Check) -> Option<Party> {
    match check.check_type {
        CheckType::Own | CheckType::Echeck => {
            check.provider_id.clone().map(Party::Provider)
        }
        CheckType::ThirdParty => check.client_id.clone().map(Party::Client),
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filters: &CheckFilters) {
    if let Some(search) = &filters.search {
        let pattern = format!("%{}%", search);
        qb.push(" AND (number LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR bank LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR drawer_name LIKE ");
        qb.push_bind(pattern);
        qb.push(")");
    }
    if let Some(status) = filters.status {
        qb.push(" AND status = ");
        qb.push_bind(status);
    }
    if let Some(check_type) = filters.check_type {
        qb.push(" AND check_type = ");
        qb.push_bind(check_type);
    }
    if let Some(provider_id) = &filters.provider_id {
        qb.push(" AND provider_id = ");
        qb.push_bind(provider_id.clone());
    }
    if let Some(from) = filters.date_from {
        qb.push(" AND payment_date >= ");
        qb.push_bind(from);
    }
    if let Some(to) = filters.date_to {
        qb.push(" AND payment_date <= ");
        qb.push_bind(to);
    }
    if filters.hide_finalized {
        let cutoff = Utc::now().date_naive() - Duration::days(FINALIZED_GRACE_DAYS);
        qb.push(
            " AND NOT (status IN ('paid', 'rejected', 'void') AND payment_date < ",
        );
        qb.push_bind(cutoff);
        qb.push(")");
    }
}

fn status_label(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pending => "pending",
        CheckStatus::Deposited => "deposited",
        CheckStatus::Paid => "paid",
        CheckStatus::Used => "used",
        CheckStatus::Lent => "lent",
        CheckStatus::Rejected => "rejected",
        CheckStatus::Void => "void",
    }
}

fn type_label(check_type: CheckType) -> &'static str {
    match check_type {
        CheckType::Own => "own",
        CheckType::ThirdParty => "third_party",
        CheckType::Echeck => "echeck",
    }
}

fn parse_type_label(label: &str) -> Option<CheckType> {
    match label.trim().to_ascii_lowercase().as_str() {
        "own" | "propio" => Some(CheckType::Own),
        "third_party" | "thirdparty" | "terceros" | "" => Some(CheckType::ThirdParty),
        "echeck" | "e-check" => Some(CheckType::Echeck),
        _ => None,
    }
}

/// Accepts ISO dates plus the day-first formats spreadsheets usually emit.
fn parse_date_lenient(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    for format in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date);
        }
    }
    None
}

/// Maps one spreadsheet row to a `NewCheck`, following `EXPORT_HEADER`
/// column order. Trailing columns are optional so exports from older
/// layouts still load.
fn parse_import_row(row: &[String]) -> Option<NewCheck> {
    if row.len() < 5 {
        return None;
    }

    let number = row[0].trim();
    let bank = row[1].trim();
    if number.is_empty() || bank.is_empty() {
        return None;
    }

    let amount = Money::parse_lenient(&row[2])?;
    let issue_date = parse_date_lenient(&row[3])?;
    let payment_date = parse_date_lenient(&row[4])?;
    let check_type = match row.get(5) {
        Some(label) => parse_type_label(label)?,
        None => CheckType::ThirdParty,
    };
    let drawer_name = row
        .get(7)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from);

    Some(NewCheck {
        number: number.to_string(),
        bank: bank.to_string(),
        amount_cents: amount.cents(),
        issue_date,
        payment_date,
        check_type,
        drawer_name,
        drawer_tax_id: None,
        client_id: None,
        provider_id: None,
        recipient_name: None,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
