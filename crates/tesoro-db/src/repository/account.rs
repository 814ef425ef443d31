//! # Current-Account Ledger
//!
//! Append-only signed movements against a client or a provider.
//!
//! ## Ledger Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Current Account = Running Debt                       │
//! │                                                                         │
//! │  balance(entity) = Σ(DEBIT.amount) − Σ(CREDIT.amount)                   │
//! │                                                                         │
//! │  DEBIT  = the entity owes more   (client bought on account,             │
//! │                                   we received goods from a provider)    │
//! │  CREDIT = the debt shrinks       (payment received, check handed over)  │
//! │                                                                         │
//! │  No movements ⇒ balance 0 (not an error)                               │
//! │                                                                         │
//! │  Rows are NEVER updated or deleted. Corrections are new ADJUSTMENT     │
//! │  movements. `post` is the only write path.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, LedgerResult};
use tesoro_core::validation::validate_positive_amount;
use tesoro_core::{AccountMovement, CoreError, Money, NewAccountMovement, Page, Party};

/// Ledger of per-entity running balances.
#[derive(Debug, Clone)]
pub struct AccountLedger {
    pool: SqlitePool,
}

impl AccountLedger {
    /// Creates a new AccountLedger.
    pub fn new(pool: SqlitePool) -> Self {
        AccountLedger { pool }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The entity's running balance: Σ debit − Σ credit, 0 when it has no
    /// movements.
    pub async fn balance(&self, tenant_id: &str, party: &Party) -> LedgerResult<Money> {
        let (column, entity_id) = party_column(party);

        let sql = format!(
            r#"
            SELECT COALESCE(SUM(
                CASE direction WHEN 'debit' THEN amount_cents ELSE -amount_cents END
            ), 0)
            FROM account_movements
            WHERE tenant_id = ?1 AND {column} = ?2
            "#
        );

        let cents: i64 = sqlx::query_scalar(&sql)
            .bind(tenant_id)
            .bind(entity_id)
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::from)?;

        Ok(Money::from_cents(cents))
    }

    /// One page of the entity's movements, most recent first
    /// (movement_date desc, then creation time desc).
    pub async fn movements(
        &self,
        tenant_id: &str,
        party: &Party,
        page: u32,
        page_size: u32,
    ) -> LedgerResult<Page<AccountMovement>> {
        let (column, entity_id) = party_column(party);
        let page_size = page_size.clamp(1, 500);
        // i64 before multiplying; u32 page * page_size can overflow.
        let offset = i64::from(page.saturating_sub(1)) * i64::from(page_size);

        let count_sql = format!(
            "SELECT COUNT(*) FROM account_movements WHERE tenant_id = ?1 AND {column} = ?2"
        );
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(tenant_id)
            .bind(entity_id)
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::from)?;

        let page_sql = format!(
            r#"
            SELECT id, tenant_id, direction, concept, amount_cents,
                   client_id, provider_id, check_id, payment_order_id,
                   reference, movement_date, created_at
            FROM account_movements
            WHERE tenant_id = ?1 AND {column} = ?2
            ORDER BY movement_date DESC, created_at DESC
            LIMIT ?3 OFFSET ?4
            "#
        );

        let rows = sqlx::query(&page_sql)
            .bind(tenant_id)
            .bind(entity_id)
            .bind(page_size as i64)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)?;

        let data = rows
            .iter()
            .map(movement_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(DbError::from)?;

        Ok(Page { data, total })
    }

    /// Movements linked to a payment order, oldest first.
    pub async fn movements_for_order(
        &self,
        tenant_id: &str,
        order_id: &str,
    ) -> LedgerResult<Vec<AccountMovement>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, direction, concept, amount_cents,
                   client_id, provider_id, check_id, payment_order_id,
                   reference, movement_date, created_at
            FROM account_movements
            WHERE tenant_id = ?1 AND payment_order_id = ?2
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant_id)
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        rows.iter()
            .map(movement_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DbError::from(e).into())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Posts a movement in its own transaction.
    pub async fn post(
        &self,
        tenant_id: &str,
        movement: NewAccountMovement,
    ) -> LedgerResult<AccountMovement> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let stored = self.post_in(&mut tx, tenant_id, movement).await?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(stored)
    }

    /// Posts a movement inside the caller's unit of work.
    ///
    /// The only write path into the current account. Sales, purchases,
    /// check auto-postings and settlements all come through here with
    /// their own transaction so the whole business operation commits as
    /// one.
    ///
    /// ## Errors
    /// - Validation if the amount is not strictly positive (the party
    ///   invariant is type-level at this point; raw nullable ids are
    ///   validated upstream by `Party::from_ids`)
    pub async fn post_in(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        movement: NewAccountMovement,
    ) -> LedgerResult<AccountMovement> {
        validate_positive_amount("amount", movement.amount_cents)
            .map_err(CoreError::Validation)?;

        let stored = AccountMovement {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            direction: movement.direction,
            concept: movement.concept,
            amount_cents: movement.amount_cents,
            party: movement.party,
            check_id: movement.check_id,
            payment_order_id: movement.payment_order_id,
            reference: movement.reference,
            movement_date: movement.movement_date,
            created_at: Utc::now(),
        };

        debug!(
            id = %stored.id,
            direction = ?stored.direction,
            concept = ?stored.concept,
            amount_cents = stored.amount_cents,
            entity = %stored.party.entity_id(),
            "Posting account movement"
        );

        sqlx::query(
            r#"
            INSERT INTO account_movements (
                id, tenant_id, direction, concept, amount_cents,
                client_id, provider_id, check_id, payment_order_id,
                reference, movement_date, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&stored.id)
        .bind(&stored.tenant_id)
        .bind(stored.direction)
        .bind(stored.concept)
        .bind(stored.amount_cents)
        .bind(stored.party.client_id())
        .bind(stored.party.provider_id())
        .bind(&stored.check_id)
        .bind(&stored.payment_order_id)
        .bind(&stored.reference)
        .bind(stored.movement_date)
        .bind(stored.created_at)
        .execute(&mut *conn)
        .await
        .map_err(DbError::from)?;

        Ok(stored)
    }
}

/// Which column scopes this party's movements.
fn party_column(party: &Party) -> (&'static str, &str) {
    match party {
        Party::Client(id) => ("client_id", id.as_str()),
        Party::Provider(id) => ("provider_id", id.as_str()),
    }
}

/// Maps a movement row, rebuilding the `Party` from the nullable-column
/// shape. The CHECK constraint guarantees `from_ids` cannot fail on rows
/// this ledger wrote; a corrupted row surfaces as a decode error rather
/// than a panic.
fn movement_from_row(row: &SqliteRow) -> Result<AccountMovement, sqlx::Error> {
    let client_id: Option<String> = row.try_get("client_id")?;
    let provider_id: Option<String> = row.try_get("provider_id")?;

    let party = Party::from_ids(client_id, provider_id).map_err(|e| sqlx::Error::ColumnDecode {
        index: "client_id/provider_id".to_string(),
        source: Box::new(e),
    })?;

    Ok(AccountMovement {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        direction: row.try_get("direction")?,
        concept: row.try_get("concept")?,
        amount_cents: row.try_get("amount_cents")?,
        party,
        check_id: row.try_get("check_id")?,
        payment_order_id: row.try_get("payment_order_id")?,
        reference: row.try_get("reference")?,
        movement_date: row.try_get("movement_date")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_db;
    use tesoro_core::{ErrorKind, MovementConcept, MovementDirection};

    fn movement(
        direction: MovementDirection,
        party: Party,
        amount_cents: i64,
    ) -> NewAccountMovement {
        NewAccountMovement {
            direction,
            concept: MovementConcept::Adjustment,
            amount_cents,
            party,
            check_id: None,
            payment_order_id: None,
            reference: None,
            movement_date: Utc::now().date_naive(),
        }
    }

    #[tokio::test]
    async fn test_empty_account_balances_to_zero() {
        let db = test_db().await;
        let balance = db
            .accounts()
            .balance("t1", &Party::Client("nobody".into()))
            .await
            .unwrap();
        assert_eq!(balance, Money::zero());
    }

    #[tokio::test]
    async fn test_balance_is_debits_minus_credits() {
        let db = test_db().await;
        let accounts = db.accounts();
        let client = Party::Client("c1".into());

        accounts
            .post("t1", movement(MovementDirection::Debit, client.clone(), 10_000))
            .await
            .unwrap();
        accounts
            .post("t1", movement(MovementDirection::Debit, client.clone(), 2_500))
            .await
            .unwrap();
        accounts
            .post("t1", movement(MovementDirection::Credit, client.clone(), 4_000))
            .await
            .unwrap();

        let balance = accounts.balance("t1", &client).await.unwrap();
        assert_eq!(balance.cents(), 8_500);
    }

    #[tokio::test]
    async fn test_accounts_are_isolated_by_party_and_tenant() {
        let db = test_db().await;
        let accounts = db.accounts();
        let client = Party::Client("x".into());
        let provider = Party::Provider("x".into());

        accounts
            .post("t1", movement(MovementDirection::Debit, client.clone(), 1_000))
            .await
            .unwrap();
        accounts
            .post("t1", movement(MovementDirection::Debit, provider.clone(), 7_000))
            .await
            .unwrap();

        // Same id, different side of the ledger.
        assert_eq!(accounts.balance("t1", &client).await.unwrap().cents(), 1_000);
        assert_eq!(
            accounts.balance("t1", &provider).await.unwrap().cents(),
            7_000
        );
        // Same party, different tenant.
        assert_eq!(accounts.balance("t2", &client).await.unwrap().cents(), 0);
    }

    #[tokio::test]
    async fn test_movements_are_paged_with_total() {
        let db = test_db().await;
        let accounts = db.accounts();
        let client = Party::Client("c1".into());

        for i in 1..=5 {
            accounts
                .post(
                    "t1",
                    movement(MovementDirection::Debit, client.clone(), i * 100),
                )
                .await
                .unwrap();
        }

        let page = accounts.movements("t1", &client, 1, 2).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.data.len(), 2);

        let last = accounts.movements("t1", &client, 3, 2).await.unwrap();
        assert_eq!(last.data.len(), 1);

        // A page number far past the data must come back empty, not panic
        // on offset arithmetic.
        let way_out = accounts
            .movements("t1", &client, u32::MAX, 500)
            .await
            .unwrap();
        assert_eq!(way_out.total, 5);
        assert!(way_out.data.is_empty());
    }

    #[tokio::test]
    async fn test_non_positive_amount_is_rejected() {
        let db = test_db().await;
        let err = db
            .accounts()
            .post(
                "t1",
                movement(MovementDirection::Debit, Party::Client("c1".into()), 0),
            )
            .await
            .unwrap_err();
        assert_eq!(err.as_core().unwrap().kind(), ErrorKind::Validation);
    }
}
