//! # Payment Orchestrator
//!
//! Atomic provider settlements mixing cash, bank transfers, endorsed
//! third-party checks and freshly issued own checks.
//!
//! ## Settlement Flow
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                    settle(provider, instruments)                     │
//! │                                                                      │
//! │  1. Fetch referenced third-party checks  ──► not Pending? REJECT     │
//! │  2. total = cash + transfer + Σ checks + Σ own drafts                │
//! │            ──► total ≤ 0? REJECT (nothing written yet)              │
//! │  3. INSERT payment_orders (next per-tenant order_number)             │
//! │  4. cash / transfer     ──► CREDIT provider, linked to the order     │
//! │  5. third-party checks  ──► Pending→Used, provider set, CREDIT       │
//! │  6. own drafts          ──► CheckRegistry::create_in (auto-CREDIT)   │
//! │  7. COMMIT - any failure rolls back the whole order                  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The provider's balance drop always equals the order total, and every
//! movement the settlement produced carries the order id.

use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, LedgerResult};
use crate::repository::account::AccountLedger;
use crate::repository::check::CheckRegistry;
use tesoro_core::validation::validate_instruments;
use tesoro_core::{
    Check, CheckStatus, CheckType, CoreError, MovementConcept, NewAccountMovement, NewCheck,
    Page, Party, PaymentOrder, SettlementInstruments, ValidationError,
};

/// Orchestrates multi-instrument provider settlements.
#[derive(Debug, Clone)]
pub struct Settlements {
    pool: SqlitePool,
    accounts: AccountLedger,
    checks: CheckRegistry,
}

impl Settlements {
    /// Creates a new Settlements orchestrator.
    pub fn new(pool: SqlitePool) -> Self {
        let accounts = AccountLedger::new(pool.clone());
        let checks = CheckRegistry::new(pool.clone());
        Settlements {
            pool,
            accounts,
            checks,
        }
    }

    /// Settles a provider account with the given instrument mix.
    ///
    /// Everything happens in one transaction; an error on any leg leaves
    /// no trace of the order.
    ///
    /// ## Errors
    /// - Validation for negative amounts or a mix that totals ≤ 0
    /// - NotFound when a referenced third-party check does not exist
    /// - Conflict when a referenced check is no longer Pending
    pub async fn settle(
        &self,
        tenant_id: &str,
        provider_id: &str,
        order_date: NaiveDate,
        instruments: SettlementInstruments,
        observation: Option<String>,
    ) -> LedgerResult<PaymentOrder> {
        validate_instruments(&instruments).map_err(CoreError::Validation)?;

        // A physical check can only be handed over once; a repeated id
        // would pass the Pending gate twice and double-count its amount.
        let mut seen = HashSet::with_capacity(instruments.third_party_check_ids.len());
        for check_id in &instruments.third_party_check_ids {
            if !seen.insert(check_id.as_str()) {
                return Err(CoreError::Validation(ValidationError::InvalidFormat {
                    field: "third_party_check_ids".to_string(),
                    reason: format!("check {check_id} referenced more than once"),
                })
                .into());
            }
        }

        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        // Read every referenced check up front so the total (and every
        // precondition) is known before the first write.
        let mut third_party = Vec::with_capacity(instruments.third_party_check_ids.len());
        for check_id in &instruments.third_party_check_ids {
            let check = fetch_check(&mut tx, tenant_id, check_id).await?;
            if check.check_type != CheckType::ThirdParty {
                return Err(CoreError::CheckNotThirdParty {
                    check_id: check.id,
                    check_type: check.check_type,
                }
                .into());
            }
            if check.status != CheckStatus::Pending {
                return Err(CoreError::CheckNotPending {
                    check_id: check.id,
                    status: check.status,
                }
                .into());
            }
            third_party.push(check);
        }

        let total_cents = instruments.declared_cents()
            + third_party.iter().map(|c| c.amount_cents).sum::<i64>();
        if total_cents <= 0 {
            return Err(CoreError::EmptySettlement { total_cents }.into());
        }

        let order = self
            .insert_order(
                &mut tx,
                tenant_id,
                provider_id,
                order_date,
                total_cents,
                observation,
            )
            .await?;

        let provider = Party::Provider(provider_id.to_string());

        if let Some(cash) = instruments.cash_cents.filter(|c| *c > 0) {
            let movement = NewAccountMovement {
                payment_order_id: Some(order.id.clone()),
                movement_date: order_date,
                ..NewAccountMovement::credit(provider.clone(), MovementConcept::Payment, cash)
            };
            self.accounts.post_in(&mut tx, tenant_id, movement).await?;
        }

        if let Some(transfer) = instruments.transfer_cents.filter(|c| *c > 0) {
            let movement = NewAccountMovement {
                payment_order_id: Some(order.id.clone()),
                reference: instruments.transfer_reference.clone(),
                movement_date: order_date,
                ..NewAccountMovement::credit(provider.clone(), MovementConcept::Payment, transfer)
            };
            self.accounts.post_in(&mut tx, tenant_id, movement).await?;
        }

        for check in &third_party {
            self.endorse_check(&mut tx, tenant_id, check, provider_id, &order.id)
                .await?;
        }

        for draft in &instruments.own_checks_to_issue {
            let new_check = NewCheck {
                number: draft.number.clone(),
                bank: draft.bank.clone(),
                amount_cents: draft.amount_cents,
                issue_date: draft.issue_date,
                payment_date: draft.payment_date,
                check_type: CheckType::Own,
                drawer_name: None,
                drawer_tax_id: None,
                client_id: None,
                provider_id: Some(provider_id.to_string()),
                recipient_name: None,
            };
            self.checks
                .create_in(&mut tx, tenant_id, new_check, Some(order.id.clone()))
                .await?;
        }

        tx.commit().await.map_err(DbError::from)?;

        info!(
            order_id = %order.id,
            order_number = order.order_number,
            provider_id = %provider_id,
            total_cents,
            "Settlement committed"
        );
        Ok(order)
    }

    /// Fetches a payment order header.
    pub async fn get(&self, tenant_id: &str, order_id: &str) -> LedgerResult<PaymentOrder> {
        sqlx::query_as::<_, PaymentOrder>(
            "SELECT * FROM payment_orders WHERE tenant_id = ?1 AND id = ?2",
        )
        .bind(tenant_id)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?
        .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()).into())
    }

    /// Paged order history, newest first.
    pub async fn list(
        &self,
        tenant_id: &str,
        page: u32,
        page_size: u32,
    ) -> LedgerResult<Page<PaymentOrder>> {
        let page_size = page_size.clamp(1, 500);
        let offset = i64::from(page.saturating_sub(1)) * i64::from(page_size);

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM payment_orders WHERE tenant_id = ?1")
                .bind(tenant_id)
                .fetch_one(&self.pool)
                .await
                .map_err(DbError::from)?;

        let data = sqlx::query_as::<_, PaymentOrder>(
            r#"
            SELECT * FROM payment_orders
            WHERE tenant_id = ?1
            ORDER BY order_number DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(tenant_id)
        .bind(page_size as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(Page { data, total })
    }

    async fn insert_order(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        provider_id: &str,
        order_date: NaiveDate,
        total_cents: i64,
        observation: Option<String>,
    ) -> LedgerResult<PaymentOrder> {
        // Next business number, assigned inside the transaction so two
        // concurrent settlements cannot share one.
        let order_number: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(order_number), 0) + 1 FROM payment_orders WHERE tenant_id = ?1",
        )
        .bind(tenant_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(DbError::from)?;

        let order = PaymentOrder {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            provider_id: provider_id.to_string(),
            order_number,
            order_date,
            total_cents,
            observation,
            created_at: Utc::now(),
        };

        debug!(id = %order.id, order_number, total_cents, "Inserting payment order");

        sqlx::query(
            r#"
            INSERT INTO payment_orders (
                id, tenant_id, provider_id, order_number, order_date,
                total_cents, observation, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&order.id)
        .bind(&order.tenant_id)
        .bind(&order.provider_id)
        .bind(order.order_number)
        .bind(order.order_date)
        .bind(order.total_cents)
        .bind(&order.observation)
        .bind(order.created_at)
        .execute(&mut *conn)
        .await
        .map_err(DbError::from)?;

        Ok(order)
    }

    /// Hands a pending third-party check over to the provider: status to
    /// Used, provider reassigned, and a CREDIT for its face value linked
    /// to the order.
    async fn endorse_check(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        check: &Check,
        provider_id: &str,
        order_id: &str,
    ) -> LedgerResult<()> {
        sqlx::query(
            r#"
            UPDATE checks
            SET status = ?1, provider_id = ?2, updated_at = ?3
            WHERE tenant_id = ?4 AND id = ?5
            "#,
        )
        .bind(CheckStatus::Used)
        .bind(provider_id)
        .bind(Utc::now())
        .bind(tenant_id)
        .bind(&check.id)
        .execute(&mut *conn)
        .await
        .map_err(DbError::from)?;

        let movement = NewAccountMovement {
            check_id: Some(check.id.clone()),
            payment_order_id: Some(order_id.to_string()),
            movement_date: Utc::now().date_naive(),
            ..NewAccountMovement::credit(
                Party::Provider(provider_id.to_string()),
                MovementConcept::Check,
                check.amount_cents,
            )
        };
        self.accounts.post_in(conn, tenant_id, movement).await?;

        Ok(())
    }
}

async fn fetch_check(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    check_id: &str,
) -> LedgerResult<Check> {
    sqlx::query_as::<_, Check>("SELECT * FROM checks WHERE tenant_id = ?1 AND id = ?2")
        .bind(tenant_id)
        .bind(check_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(DbError::from)?
        .ok_or_else(|| CoreError::CheckNotFound(check_id.to_string()).into())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_db;
    use chrono::Duration;
    use tesoro_core::{CheckFilters, ErrorKind, OwnCheckDraft};

    fn third_party_check(number: &str, amount_cents: i64) -> NewCheck {
        let today = Utc::now().date_naive();
        NewCheck {
            number: number.to_string(),
            bank: "BNA".to_string(),
            amount_cents,
            issue_date: today,
            payment_date: today + Duration::days(30),
            check_type: CheckType::ThirdParty,
            drawer_name: Some("Some Drawer".to_string()),
            drawer_tax_id: None,
            client_id: None,
            provider_id: None,
            recipient_name: None,
        }
    }

    #[tokio::test]
    async fn test_settle_mixes_cash_and_endorsed_check() {
        let db = test_db().await;
        let today = Utc::now().date_naive();
        let provider = Party::Provider("p1".into());

        // We owe the provider 200.
        db.accounts()
            .post(
                "t1",
                NewAccountMovement::debit(provider.clone(), MovementConcept::Purchase, 20_000),
            )
            .await
            .unwrap();

        let check = db
            .checks()
            .create("t1", third_party_check("500", 5_000))
            .await
            .unwrap();

        let instruments = SettlementInstruments {
            cash_cents: Some(10_000),
            third_party_check_ids: vec![check.id.clone()],
            ..Default::default()
        };
        let order = db
            .settlements()
            .settle("t1", "p1", today, instruments, Some("august".into()))
            .await
            .unwrap();

        assert_eq!(order.order_number, 1);
        assert_eq!(order.total_cents, 15_000);

        // The provider's debt dropped by exactly the order total.
        let balance = db.accounts().balance("t1", &provider).await.unwrap();
        assert_eq!(balance.cents(), 5_000);

        // Both legs carry the order id.
        let legs = db
            .accounts()
            .movements_for_order("t1", &order.id)
            .await
            .unwrap();
        assert_eq!(legs.len(), 2);
        let leg_total: i64 = legs.iter().map(|m| m.amount_cents).sum();
        assert_eq!(leg_total, order.total_cents);

        // The check left the drawer.
        let endorsed = db.checks().get("t1", &check.id).await.unwrap();
        assert_eq!(endorsed.status, CheckStatus::Used);
        assert_eq!(endorsed.provider_id.as_deref(), Some("p1"));

        // Business numbers keep counting per tenant.
        let next = db
            .settlements()
            .settle(
                "t1",
                "p1",
                today,
                SettlementInstruments {
                    cash_cents: Some(100),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(next.order_number, 2);
    }

    #[tokio::test]
    async fn test_transfer_leg_carries_its_reference() {
        let db = test_db().await;
        let today = Utc::now().date_naive();

        let order = db
            .settlements()
            .settle(
                "t1",
                "p1",
                today,
                SettlementInstruments {
                    transfer_cents: Some(30_000),
                    transfer_reference: Some("TRF-0042".into()),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        let legs = db
            .accounts()
            .movements_for_order("t1", &order.id)
            .await
            .unwrap();
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].reference.as_deref(), Some("TRF-0042"));
    }

    #[tokio::test]
    async fn test_settle_issues_own_drafts_linked_to_the_order() {
        let db = test_db().await;
        let today = Utc::now().date_naive();

        let instruments = SettlementInstruments {
            own_checks_to_issue: vec![OwnCheckDraft {
                number: "A1".into(),
                bank: "Galicia".into(),
                amount_cents: 12_000,
                issue_date: today,
                payment_date: today + Duration::days(45),
            }],
            ..Default::default()
        };
        let order = db
            .settlements()
            .settle("t1", "p1", today, instruments, None)
            .await
            .unwrap();
        assert_eq!(order.total_cents, 12_000);

        let issued = db
            .checks()
            .find(
                "t1",
                &CheckFilters {
                    check_type: Some(CheckType::Own),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(issued.total, 1);
        assert_eq!(issued.data[0].status, CheckStatus::Pending);
        assert_eq!(issued.data[0].provider_id.as_deref(), Some("p1"));

        let legs = db
            .accounts()
            .movements_for_order("t1", &order.id)
            .await
            .unwrap();
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].check_id.as_deref(), Some(issued.data[0].id.as_str()));
    }

    #[tokio::test]
    async fn test_settle_rolls_back_on_non_pending_check() {
        let db = test_db().await;
        let today = Utc::now().date_naive();

        let good = db
            .checks()
            .create("t1", third_party_check("1", 5_000))
            .await
            .unwrap();
        let spent = db
            .checks()
            .create("t1", third_party_check("2", 5_000))
            .await
            .unwrap();
        db.checks()
            .update(
                "t1",
                &spent.id,
                tesoro_core::CheckPatch {
                    status: Some(CheckStatus::Deposited),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let instruments = SettlementInstruments {
            cash_cents: Some(10_000),
            third_party_check_ids: vec![good.id.clone(), spent.id.clone()],
            ..Default::default()
        };
        let err = db
            .settlements()
            .settle("t1", "p1", today, instruments, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::CheckNotPending { check_id, .. }) if *check_id == spent.id
        ));

        // Nothing happened: no order, no movements, check untouched.
        let orders = db.settlements().list("t1", 1, 10).await.unwrap();
        assert_eq!(orders.total, 0);
        assert_eq!(
            db.accounts()
                .balance("t1", &Party::Provider("p1".into()))
                .await
                .unwrap()
                .cents(),
            0
        );
        assert_eq!(
            db.checks().get("t1", &good.id).await.unwrap().status,
            CheckStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_settle_rejects_repeated_check_id() {
        let db = test_db().await;
        let today = Utc::now().date_naive();

        let check = db
            .checks()
            .create("t1", third_party_check("9", 5_000))
            .await
            .unwrap();

        // The same physical check listed twice must not be counted twice.
        let instruments = SettlementInstruments {
            third_party_check_ids: vec![check.id.clone(), check.id.clone()],
            ..Default::default()
        };
        let err = db
            .settlements()
            .settle("t1", "p1", today, instruments, None)
            .await
            .unwrap_err();
        assert_eq!(err.as_core().unwrap().kind(), ErrorKind::Validation);

        // No order, no provider credit, check still in the drawer.
        assert_eq!(db.settlements().list("t1", 1, 10).await.unwrap().total, 0);
        assert_eq!(
            db.accounts()
                .balance("t1", &Party::Provider("p1".into()))
                .await
                .unwrap()
                .cents(),
            0
        );
        assert_eq!(
            db.checks().get("t1", &check.id).await.unwrap().status,
            CheckStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_settle_rejects_own_check_as_endorsement() {
        let db = test_db().await;
        let today = Utc::now().date_naive();

        let mut own = third_party_check("A9", 5_000);
        own.check_type = CheckType::Own;
        let own = db.checks().create("t1", own).await.unwrap();

        let instruments = SettlementInstruments {
            cash_cents: Some(1_000),
            third_party_check_ids: vec![own.id.clone()],
            ..Default::default()
        };
        let err = db
            .settlements()
            .settle("t1", "p1", today, instruments, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::CheckNotThirdParty { check_id, .. }) if *check_id == own.id
        ));

        assert_eq!(db.settlements().list("t1", 1, 10).await.unwrap().total, 0);
        assert_eq!(
            db.checks().get("t1", &own.id).await.unwrap().status,
            CheckStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_settle_rejects_empty_mix() {
        let db = test_db().await;
        let today = Utc::now().date_naive();

        let err = db
            .settlements()
            .settle("t1", "p1", today, SettlementInstruments::default(), None)
            .await
            .unwrap_err();
        assert_eq!(err.as_core().unwrap().kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_settle_cannot_use_another_tenants_check() {
        let db = test_db().await;
        let today = Utc::now().date_naive();

        let foreign = db
            .checks()
            .create("t2", third_party_check("77", 5_000))
            .await
            .unwrap();

        let instruments = SettlementInstruments {
            third_party_check_ids: vec![foreign.id.clone()],
            ..Default::default()
        };
        let err = db
            .settlements()
            .settle("t1", "p1", today, instruments, None)
            .await
            .unwrap_err();
        assert_eq!(err.as_core().unwrap().kind(), ErrorKind::NotFound);
    }
}
