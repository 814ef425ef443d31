//! # Till Ledger
//!
//! Cash sessions and in-session cash movements.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Till Session Lifecycle                            │
//! │                                                                         │
//! │  1. OPEN                                                                │
//! │     └── open() → CashSession { status: Open }                           │
//! │     └── (Also inserts the OPENING leg in the same transaction)          │
//! │                                                                         │
//! │  2. RECORD LEGS                                                         │
//! │     └── record_leg() → CashLeg  (or record_leg_in() inside a sale's     │
//! │         transaction)                                                    │
//! │     └── Every insert recomputes the cached current_cents atomically     │
//! │                                                                         │
//! │  3. CLOSE                                                               │
//! │     └── close() → CashSession { status: Closed, difference }            │
//! │     └── Terminal: the session never reopens; cashiering resumes         │
//! │         with a new open()                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## The One-Open-Session Invariant
//! The pre-check inside `open` produces the friendly Conflict error; the
//! partial unique index `idx_cash_sessions_one_open` closes the race two
//! terminals can still lose.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, LedgerError, LedgerResult};
use tesoro_core::validation::{validate_non_negative_amount, validate_positive_amount};
use tesoro_core::{
    CashConcept, CashLeg, CashSession, CoreError, LegDirection, NewCashLeg, RequestContext,
    SessionStatus, TillStatus,
};

/// Ledger of cash sessions per user/branch.
#[derive(Debug, Clone)]
pub struct TillLedger {
    pool: SqlitePool,
}

impl TillLedger {
    /// Creates a new TillLedger.
    pub fn new(pool: SqlitePool) -> Self {
        TillLedger { pool }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Answers "does this user have a till open right now?".
    pub async fn status(&self, tenant_id: &str, user_id: &str) -> LedgerResult<TillStatus> {
        let session = self.find_open_session(tenant_id, user_id).await?;

        let Some(session) = session else {
            return Ok(TillStatus::Closed);
        };

        let leg_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM cash_legs WHERE session_id = ?1")
                .bind(&session.id)
                .fetch_one(&self.pool)
                .await
                .map_err(DbError::from)?;

        Ok(TillStatus::Open {
            session_id: session.id,
            opened_at: session.opened_at,
            opening_cents: session.opening_cents,
            current_cents: session.current_cents,
            leg_count,
        })
    }

    /// Legs of the currently open session, newest first.
    /// Returns an empty list when the till is closed.
    pub async fn history(&self, tenant_id: &str, user_id: &str) -> LedgerResult<Vec<CashLeg>> {
        let Some(session) = self.find_open_session(tenant_id, user_id).await? else {
            return Ok(Vec::new());
        };

        let legs = sqlx::query_as::<_, CashLeg>(
            r#"
            SELECT id, session_id, direction, concept, amount_cents,
                   description, reference, user_id, created_at
            FROM cash_legs
            WHERE session_id = ?1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(&session.id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(legs)
    }

    /// Fetches a session by id.
    pub async fn get_by_id(&self, tenant_id: &str, id: &str) -> LedgerResult<CashSession> {
        let session = sqlx::query_as::<_, CashSession>(
            "SELECT * FROM cash_sessions WHERE tenant_id = ?1 AND id = ?2",
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;

        session.ok_or_else(|| CoreError::SessionNotFound(id.to_string()).into())
    }

    // =========================================================================
    // Open / Close
    // =========================================================================

    /// Opens a till session for the acting user.
    ///
    /// ## Errors
    /// - Conflict (`SessionAlreadyOpen`) if the user already has one open
    /// - Validation if the opening balance is negative
    ///
    /// ## Atomicity
    /// The session row and its OPENING leg are written in one transaction,
    /// so balance and history agree from t0. A zero float opens without a
    /// leg (leg amounts are strictly positive).
    pub async fn open(
        &self,
        ctx: &RequestContext,
        opening_cents: i64,
        notes: Option<String>,
    ) -> LedgerResult<CashSession> {
        validate_non_negative_amount("opening_balance", opening_cents)
            .map_err(CoreError::Validation)?;

        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        if self
            .find_open_session_in(&mut tx, &ctx.tenant_id, &ctx.user_id)
            .await?
            .is_some()
        {
            return Err(CoreError::SessionAlreadyOpen {
                user_id: ctx.user_id.clone(),
            }
            .into());
        }

        let now = Utc::now();
        let session = CashSession {
            id: Uuid::new_v4().to_string(),
            tenant_id: ctx.tenant_id.clone(),
            branch_id: ctx.branch_id.clone(),
            user_id: ctx.user_id.clone(),
            status: SessionStatus::Open,
            opened_at: now,
            closed_at: None,
            opening_cents,
            current_cents: opening_cents,
            closing_cents: None,
            difference_cents: None,
            notes,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %session.id, user_id = %session.user_id, opening_cents, "Opening till session");

        let insert = sqlx::query(
            r#"
            INSERT INTO cash_sessions (
                id, tenant_id, branch_id, user_id, status,
                opened_at, closed_at, opening_cents, current_cents,
                closing_cents, difference_cents, notes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&session.id)
        .bind(&session.tenant_id)
        .bind(&session.branch_id)
        .bind(&session.user_id)
        .bind(session.status)
        .bind(session.opened_at)
        .bind(session.closed_at)
        .bind(session.opening_cents)
        .bind(session.current_cents)
        .bind(session.closing_cents)
        .bind(session.difference_cents)
        .bind(&session.notes)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(err) = insert {
            // A racing open on another connection hits the partial unique
            // index; surface the same Conflict as the pre-check.
            let db_err = DbError::from(err);
            if db_err.is_unique_violation_on("cash_sessions") {
                return Err(CoreError::SessionAlreadyOpen {
                    user_id: ctx.user_id.clone(),
                }
                .into());
            }
            return Err(db_err.into());
        }

        if opening_cents > 0 {
            insert_leg(
                &mut tx,
                &session.id,
                &ctx.user_id,
                &NewCashLeg {
                    direction: LegDirection::In,
                    concept: CashConcept::Opening,
                    amount_cents: opening_cents,
                    description: "opening balance".to_string(),
                    reference: None,
                },
            )
            .await?;
        }

        tx.commit().await.map_err(DbError::from)?;

        Ok(session)
    }

    /// Closes the user's open session against a counted cash amount.
    ///
    /// `difference = closing − current` (negative = shortage, positive =
    /// surplus). Terminal: the session never reopens.
    ///
    /// ## Errors
    /// - Precondition (`NoOpenSession`) if there is nothing to close
    pub async fn close(
        &self,
        tenant_id: &str,
        user_id: &str,
        closing_cents: i64,
        notes: Option<String>,
    ) -> LedgerResult<CashSession> {
        validate_non_negative_amount("closing_balance", closing_cents)
            .map_err(CoreError::Validation)?;

        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let Some(mut session) = self.find_open_session_in(&mut tx, tenant_id, user_id).await?
        else {
            return Err(CoreError::NoOpenSession {
                user_id: user_id.to_string(),
            }
            .into());
        };

        let now = Utc::now();
        let difference = closing_cents - session.current_cents;

        debug!(
            id = %session.id,
            closing_cents,
            difference,
            "Closing till session"
        );

        sqlx::query(
            r#"
            UPDATE cash_sessions SET
                status = 'closed',
                closed_at = ?2,
                closing_cents = ?3,
                difference_cents = ?4,
                notes = COALESCE(?5, notes),
                updated_at = ?2
            WHERE id = ?1 AND status = 'open'
            "#,
        )
        .bind(&session.id)
        .bind(now)
        .bind(closing_cents)
        .bind(difference)
        .bind(&notes)
        .execute(&mut *tx)
        .await
        .map_err(DbError::from)?;

        tx.commit().await.map_err(DbError::from)?;

        session.status = SessionStatus::Closed;
        session.closed_at = Some(now);
        session.closing_cents = Some(closing_cents);
        session.difference_cents = Some(difference);
        session.updated_at = now;
        if let Some(n) = notes {
            session.notes = Some(n);
        }

        Ok(session)
    }

    // =========================================================================
    // Legs
    // =========================================================================

    /// Records a cash movement against the user's open session, in its own
    /// transaction.
    pub async fn record_leg(
        &self,
        tenant_id: &str,
        user_id: &str,
        leg: NewCashLeg,
    ) -> LedgerResult<CashLeg> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let leg = self.record_leg_in(&mut tx, tenant_id, user_id, leg).await?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(leg)
    }

    /// Records a cash movement inside the caller's unit of work.
    ///
    /// This is how a sale or an expense makes its cash leg part of its own
    /// atomic commit: the leg insert and the `current_cents` recompute
    /// land together with the caller's writes, or not at all.
    ///
    /// ## Errors
    /// - Precondition (`NoOpenSession`) if the user has no open session
    /// - Validation if the amount is not strictly positive
    pub async fn record_leg_in(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        user_id: &str,
        leg: NewCashLeg,
    ) -> LedgerResult<CashLeg> {
        validate_positive_amount("amount", leg.amount_cents).map_err(CoreError::Validation)?;

        let Some(session) = self.find_open_session_in(conn, tenant_id, user_id).await? else {
            return Err(CoreError::NoOpenSession {
                user_id: user_id.to_string(),
            }
            .into());
        };

        let stored = insert_leg(conn, &session.id, user_id, &leg).await?;

        // Recompute the cached balance in the same unit of work. The legs
        // are the source of truth; this cache is never touched elsewhere.
        let delta = match leg.direction {
            LegDirection::In => leg.amount_cents,
            LegDirection::Out => -leg.amount_cents,
        };

        let updated = sqlx::query(
            r#"
            UPDATE cash_sessions SET
                current_cents = current_cents + ?2,
                updated_at = ?3
            WHERE id = ?1 AND status = 'open'
            "#,
        )
        .bind(&session.id)
        .bind(delta)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await
        .map_err(DbError::from)?;

        if updated.rows_affected() == 0 {
            // The session closed between the read and the write; the
            // enclosing transaction rolls the leg back with us.
            return Err(CoreError::NoOpenSession {
                user_id: user_id.to_string(),
            }
            .into());
        }

        debug!(
            session_id = %session.id,
            direction = ?leg.direction,
            concept = ?leg.concept,
            amount_cents = leg.amount_cents,
            "Recorded cash leg"
        );

        Ok(stored)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn find_open_session(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> LedgerResult<Option<CashSession>> {
        let session = sqlx::query_as::<_, CashSession>(
            "SELECT * FROM cash_sessions WHERE tenant_id = ?1 AND user_id = ?2 AND status = 'open'",
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(session)
    }

    async fn find_open_session_in(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        user_id: &str,
    ) -> LedgerResult<Option<CashSession>> {
        let session = sqlx::query_as::<_, CashSession>(
            "SELECT * FROM cash_sessions WHERE tenant_id = ?1 AND user_id = ?2 AND status = 'open'",
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(DbError::from)?;

        Ok(session)
    }
}

/// Inserts a leg row. Shared by `open` (the OPENING leg) and
/// `record_leg_in`.
async fn insert_leg(
    conn: &mut SqliteConnection,
    session_id: &str,
    user_id: &str,
    leg: &NewCashLeg,
) -> Result<CashLeg, LedgerError> {
    let stored = CashLeg {
        id: Uuid::new_v4().to_string(),
        session_id: session_id.to_string(),
        direction: leg.direction,
        concept: leg.concept,
        amount_cents: leg.amount_cents,
        description: leg.description.clone(),
        reference: leg.reference.clone(),
        user_id: user_id.to_string(),
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO cash_legs (
            id, session_id, direction, concept, amount_cents,
            description, reference, user_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&stored.id)
    .bind(&stored.session_id)
    .bind(stored.direction)
    .bind(stored.concept)
    .bind(stored.amount_cents)
    .bind(&stored.description)
    .bind(&stored.reference)
    .bind(&stored.user_id)
    .bind(stored.created_at)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(stored)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ctx, test_db};
    use tesoro_core::{CashConcept, ErrorKind, LegDirection};

    fn leg(direction: LegDirection, concept: CashConcept, amount_cents: i64) -> NewCashLeg {
        NewCashLeg {
            direction,
            concept,
            amount_cents,
            description: "test leg".to_string(),
            reference: None,
        }
    }

    #[tokio::test]
    async fn test_balance_tracks_legs() {
        let db = test_db().await;
        let till = db.till();
        let ctx = ctx();

        let session = till.open(&ctx, 10_000, None).await.unwrap();
        assert_eq!(session.current_cents, 10_000);

        till.record_leg(
            "t1",
            "u1",
            leg(LegDirection::In, CashConcept::Sale, 5_000),
        )
        .await
        .unwrap();
        till.record_leg(
            "t1",
            "u1",
            leg(LegDirection::Out, CashConcept::Expense, 2_000),
        )
        .await
        .unwrap();

        match till.status("t1", "u1").await.unwrap() {
            TillStatus::Open {
                current_cents,
                leg_count,
                ..
            } => {
                assert_eq!(current_cents, 13_000);
                // Opening float plus the two recorded legs.
                assert_eq!(leg_count, 3);
            }
            TillStatus::Closed => panic!("till should be open"),
        }

        let history = till.history("t1", "u1").await.unwrap();
        assert_eq!(history.len(), 3);
        let replayed: i64 = history.iter().map(|l| l.signed_amount().cents()).sum();
        assert_eq!(replayed, 13_000);
    }

    #[tokio::test]
    async fn test_second_open_is_conflict() {
        let db = test_db().await;
        let till = db.till();
        let ctx = ctx();

        till.open(&ctx, 0, None).await.unwrap();
        let err = till.open(&ctx, 5_000, None).await.unwrap_err();

        assert_eq!(err.as_core().unwrap().kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_same_user_other_tenant_can_open() {
        let db = test_db().await;
        let till = db.till();

        till.open(&RequestContext::new("t1", "u1", "b1"), 0, None)
            .await
            .unwrap();
        till.open(&RequestContext::new("t2", "u1", "b1"), 0, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_close_computes_difference_and_is_terminal() {
        let db = test_db().await;
        let till = db.till();
        let ctx = ctx();

        till.open(&ctx, 10_000, None).await.unwrap();
        till.record_leg("t1", "u1", leg(LegDirection::In, CashConcept::Sale, 2_000))
            .await
            .unwrap();

        // Counted 500 short of the expected 12_000.
        let closed = till.close("t1", "u1", 11_500, None).await.unwrap();
        assert_eq!(closed.status, SessionStatus::Closed);
        assert_eq!(closed.closing_cents, Some(11_500));
        assert_eq!(closed.difference_cents, Some(-500));
        assert!(closed.closed_at.is_some());

        let err = till.close("t1", "u1", 0, None).await.unwrap_err();
        assert_eq!(err.as_core().unwrap().kind(), ErrorKind::Precondition);

        let err = till
            .record_leg("t1", "u1", leg(LegDirection::In, CashConcept::Sale, 100))
            .await
            .unwrap_err();
        assert_eq!(err.as_core().unwrap().kind(), ErrorKind::Precondition);

        assert!(matches!(
            till.status("t1", "u1").await.unwrap(),
            TillStatus::Closed
        ));
    }

    #[tokio::test]
    async fn test_leg_without_open_session_is_precondition() {
        let db = test_db().await;
        let till = db.till();

        let err = till
            .record_leg("t1", "u1", leg(LegDirection::In, CashConcept::Sale, 100))
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::NoOpenSession { user_id }) if user_id == "u1"
        ));
    }

    #[tokio::test]
    async fn test_zero_float_opens_without_opening_leg() {
        let db = test_db().await;
        let till = db.till();
        let ctx = ctx();

        till.open(&ctx, 0, None).await.unwrap();
        assert!(till.history("t1", "u1").await.unwrap().is_empty());
    }
}
