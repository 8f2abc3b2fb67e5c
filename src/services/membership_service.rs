use crate::database::DbPool;
use crate::error::{AppError, AppResult};
use crate::external::Notification;
use crate::models::*;
use crate::services::NotificationService;
use crate::utils::{Clock, add_months, day_start};
use chrono::{DateTime, Duration, Utc};

/// Auto-renewal is attempted this many days before expiry.
const RENEWAL_LEAD_DAYS: i64 = 3;
/// Access retained after a failed renewal before suspension.
const GRACE_PERIOD_DAYS: i64 = 7;
/// Reminder thresholds, days before expiry. Exact-day matches; a membership
/// receives each reminder once as the dates roll through.
const REMINDER_DAYS: [i64; 3] = [30, 14, 7];

/// The membership lifecycle engine: subscriptions, the append-mostly ledger,
/// the user-level projection, and the periodic sweeps that move entries
/// through expiry, renewal, grace and suspension.
#[derive(Clone)]
pub struct MembershipService {
    pool: DbPool,
    clock: Clock,
    notifications: NotificationService,
}

impl MembershipService {
    pub fn new(pool: DbPool, clock: Clock, notifications: NotificationService) -> Self {
        Self {
            pool,
            clock,
            notifications,
        }
    }

    // --- plan catalog -----------------------------------------------------

    pub async fn get_active_plans(&self) -> AppResult<Vec<PlanResponse>> {
        let plans = sqlx::query_as::<_, MembershipPlan>(
            "SELECT * FROM membership_plans WHERE is_active = 1 ORDER BY duration_months",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(plans.into_iter().map(PlanResponse::from).collect())
    }

    pub async fn get_plan(&self, plan_id: i64) -> AppResult<PlanResponse> {
        let plan = self
            .find_plan(plan_id)
            .await?
            .ok_or(AppError::PlanNotFound)?;
        Ok(PlanResponse::from(plan))
    }

    // --- subscribe / renew ------------------------------------------------

    pub async fn subscribe(
        &self,
        user_id: i64,
        req: SubscribeRequest,
    ) -> AppResult<SubscriptionResponse> {
        let plan = self
            .find_plan(req.plan_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or(AppError::PlanNotFound)?;
        let user = self.find_user(user_id).await?;

        let now = self.clock.now();
        let start_date = now;
        let expiry_date = add_months(start_date, plan.duration_months as u32);
        let next_renewal_date = expiry_date - Duration::days(RENEWAL_LEAD_DAYS);

        let mut tx = self.pool.begin().await?;

        // A fresh subscription supersedes whatever entry is still active so
        // the ledger never holds two active rows for one user. Leaving
        // Active also ends any grace window, or the suspension sweep would
        // revoke the new period.
        sqlx::query(
            "UPDATE membership_transactions SET status = ?, is_in_grace_period = 0 \
             WHERE user_id = ? AND status = ?",
        )
        .bind(MembershipStatus::Renewed)
        .bind(user_id)
        .bind(MembershipStatus::Active)
        .execute(&mut *tx)
        .await?;

        let transaction_id: i64 = sqlx::query_scalar(
            "INSERT INTO membership_transactions \
             (user_id, plan_id, transaction_date, start_date, expiry_date, amount, \
              payment_method, payment_status, status, auto_renewal, next_renewal_date) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?) RETURNING id",
        )
        .bind(user_id)
        .bind(plan.id)
        .bind(now)
        .bind(start_date)
        .bind(expiry_date)
        .bind(plan.price)
        .bind(req.payment_method)
        .bind(PaymentStatus::Pending)
        .bind(MembershipStatus::Active)
        .bind(next_renewal_date)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE users SET has_membership = 1, membership_start = ?, membership_expiry = ? \
             WHERE id = ?",
        )
        .bind(start_date)
        .bind(expiry_date)
        .bind(user.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(SubscriptionResponse {
            transaction_id,
            plan_id: plan.id,
            plan_name: plan.name,
            start_date,
            expiry_date,
            amount: plan.price,
            payment_method: req.payment_method,
            status: MembershipStatus::Active,
        })
    }

    /// Manual renewal restarts the period at `now`. The automatic path
    /// (`attempt_renewal`) instead chains on the old expiry; the two are
    /// deliberately different billing behaviors.
    pub async fn renew(&self, user_id: i64, plan_id: i64) -> AppResult<SubscriptionResponse> {
        self.subscribe(
            user_id,
            SubscribeRequest {
                plan_id,
                payment_method: PaymentMethod::Cod,
            },
        )
        .await
    }

    // --- status -----------------------------------------------------------

    pub async fn get_status(&self, user_id: i64) -> AppResult<MembershipStatusResponse> {
        let user = self.find_user(user_id).await?;
        let active = self.active_transaction(user_id).await?;

        let current_plan_name = match &active {
            Some(txn) => self.find_plan(txn.plan_id).await?.map(|p| p.name),
            None => None,
        };

        let days_remaining = match (user.has_membership, user.membership_expiry) {
            (true, Some(expiry)) => {
                Some((expiry.date_naive() - self.clock.today()).num_days().max(0))
            }
            _ => None,
        };

        let history = sqlx::query_as::<_, MembershipTransactionResponse>(
            "SELECT t.id, p.name AS plan_name, t.transaction_date, t.start_date, \
                    t.expiry_date, t.amount, t.payment_method, t.payment_status, \
                    t.status, t.auto_renewal \
             FROM membership_transactions t \
             JOIN membership_plans p ON p.id = t.plan_id \
             WHERE t.user_id = ? \
             ORDER BY t.transaction_date DESC, t.id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(MembershipStatusResponse {
            has_active_membership: user.has_membership,
            current_plan_name,
            membership_start: user.membership_start,
            membership_expiry: user.membership_expiry,
            days_remaining,
            history,
        })
    }

    // --- auto-renewal -----------------------------------------------------

    /// Renew one ledger entry. The attempt counter and timestamp are
    /// persisted before the renewal work so failed attempts stay counted;
    /// they are never rolled back. Failures propagate to the caller (the
    /// sweep logs them per entry), and a failure after the entry's expiry
    /// moves it into the grace window instead of leaving it to lapse.
    pub async fn attempt_renewal(&self, transaction_id: i64) -> AppResult<SubscriptionResponse> {
        let txn = self
            .find_transaction(transaction_id)
            .await?
            .ok_or(AppError::TransactionNotFound)?;
        let now = self.clock.now();

        sqlx::query(
            "UPDATE membership_transactions \
             SET renewal_attempts = renewal_attempts + 1, last_renewal_attempt = ? \
             WHERE id = ?",
        )
        .bind(now)
        .bind(txn.id)
        .execute(&self.pool)
        .await?;

        match self.renew_transaction(&txn, now).await {
            Ok(response) => Ok(response),
            Err(err) => {
                if txn.expiry_date <= now && !txn.is_in_grace_period {
                    if let Err(grace_err) = self.enter_grace_period(&txn).await {
                        log::error!(
                            "failed to start grace period for transaction {}: {grace_err:?}",
                            txn.id
                        );
                    }
                }
                Err(err)
            }
        }
    }

    async fn renew_transaction(
        &self,
        old: &MembershipTransaction,
        now: DateTime<Utc>,
    ) -> AppResult<SubscriptionResponse> {
        let plan = self
            .find_plan(old.plan_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or(AppError::PlanNotFound)?;
        let user = self.find_user(old.user_id).await?;

        // Chain on the old expiry so consecutive periods neither gap nor
        // overlap, regardless of when the attempt actually runs.
        let start_date = old.expiry_date;
        let expiry_date = add_months(start_date, plan.duration_months as u32);
        let next_renewal_date = expiry_date - Duration::days(RENEWAL_LEAD_DAYS);

        let mut tx = self.pool.begin().await?;

        let transaction_id: i64 = sqlx::query_scalar(
            "INSERT INTO membership_transactions \
             (user_id, plan_id, transaction_date, start_date, expiry_date, amount, \
              payment_method, payment_status, status, auto_renewal, next_renewal_date) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?) RETURNING id",
        )
        .bind(old.user_id)
        .bind(plan.id)
        .bind(now)
        .bind(start_date)
        .bind(expiry_date)
        .bind(plan.price)
        .bind(old.payment_method)
        .bind(PaymentStatus::Pending)
        .bind(MembershipStatus::Active)
        .bind(next_renewal_date)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE membership_transactions SET status = ?, is_in_grace_period = 0 WHERE id = ?",
        )
        .bind(MembershipStatus::Renewed)
        .bind(old.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE users SET has_membership = 1, membership_start = ?, membership_expiry = ? \
             WHERE id = ?",
        )
        .bind(start_date)
        .bind(expiry_date)
        .bind(user.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.notifications
            .dispatch(
                &user.email,
                &user.full_name,
                &Notification::RenewalSuccess {
                    plan_name: &plan.name,
                    start_date,
                    expiry_date,
                    amount: plan.price,
                },
            )
            .await;

        Ok(SubscriptionResponse {
            transaction_id,
            plan_id: plan.id,
            plan_name: plan.name,
            start_date,
            expiry_date,
            amount: plan.price,
            payment_method: old.payment_method,
            status: MembershipStatus::Active,
        })
    }

    async fn enter_grace_period(&self, txn: &MembershipTransaction) -> AppResult<()> {
        let grace_period_start = txn.expiry_date;
        let grace_period_end = txn.expiry_date + Duration::days(GRACE_PERIOD_DAYS);

        sqlx::query(
            "UPDATE membership_transactions \
             SET is_in_grace_period = 1, grace_period_start = ?, grace_period_end = ? \
             WHERE id = ?",
        )
        .bind(grace_period_start)
        .bind(grace_period_end)
        .bind(txn.id)
        .execute(&self.pool)
        .await?;

        if let Ok(user) = self.find_user(txn.user_id).await {
            let plan_name = self.plan_name(txn.plan_id).await;
            self.notifications
                .dispatch(
                    &user.email,
                    &user.full_name,
                    &Notification::GracePeriodNotice {
                        plan_name: &plan_name,
                        grace_period_end,
                    },
                )
                .await;
        }

        Ok(())
    }

    // --- periodic sweeps --------------------------------------------------

    /// Revoke access for projections past their expiry. Entries whose
    /// auto-renewal was tried and failed get the grace window instead;
    /// entries already in grace belong to the suspension sweep. Returns the
    /// number of memberships that changed state, so a second run with no
    /// time passing reports zero.
    pub async fn check_and_update_expired_memberships(&self) -> AppResult<u64> {
        let today = day_start(self.clock.today());
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users \
             WHERE has_membership = 1 AND membership_expiry IS NOT NULL AND membership_expiry < ?",
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await?;

        let mut changed = 0u64;
        for user in users {
            match self.expire_membership_for(&user).await {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(e) => log::error!("expiry sweep failed for user {}: {e:?}", user.id),
            }
        }
        Ok(changed)
    }

    async fn expire_membership_for(&self, user: &User) -> AppResult<bool> {
        let active = self.active_transaction(user.id).await?;

        if let Some(txn) = &active {
            if txn.is_in_grace_period {
                return Ok(false);
            }
            if txn.auto_renewal && txn.renewal_attempts > 0 {
                self.enter_grace_period(txn).await?;
                return Ok(true);
            }
        }

        sqlx::query("UPDATE users SET has_membership = 0 WHERE id = ?")
            .bind(user.id)
            .execute(&self.pool)
            .await?;

        if let Some(txn) = active {
            sqlx::query("UPDATE membership_transactions SET status = ? WHERE id = ?")
                .bind(MembershipStatus::Expired)
                .bind(txn.id)
                .execute(&self.pool)
                .await?;
        }

        Ok(true)
    }

    /// Attempt renewal for every active auto-renewing entry expiring in
    /// exactly `RENEWAL_LEAD_DAYS` days. One entry failing never stops the
    /// batch. Returns the number renewed.
    pub async fn process_auto_renewals(&self) -> AppResult<u64> {
        let target = self.clock.today() + Duration::days(RENEWAL_LEAD_DAYS);
        let due = sqlx::query_as::<_, MembershipTransaction>(
            "SELECT * FROM membership_transactions \
             WHERE status = ? AND auto_renewal = 1 AND expiry_date >= ? AND expiry_date < ?",
        )
        .bind(MembershipStatus::Active)
        .bind(day_start(target))
        .bind(day_start(target + Duration::days(1)))
        .fetch_all(&self.pool)
        .await?;

        let mut renewed = 0u64;
        for txn in due {
            match self.attempt_renewal(txn.id).await {
                Ok(_) => renewed += 1,
                Err(e) => {
                    log::error!("auto-renewal failed for transaction {}: {e:?}", txn.id);
                }
            }
        }
        Ok(renewed)
    }

    /// Send the 30/14/7-day reminders for active entries whose expiry lands
    /// exactly on each threshold today. Returns the number dispatched.
    pub async fn send_renewal_reminders(&self) -> AppResult<u64> {
        #[derive(sqlx::FromRow)]
        struct ReminderRow {
            email: String,
            full_name: String,
            plan_name: String,
            expiry_date: DateTime<Utc>,
        }

        let mut sent = 0u64;
        for days in REMINDER_DAYS {
            let target = self.clock.today() + Duration::days(days);
            let rows = sqlx::query_as::<_, ReminderRow>(
                "SELECT u.email, u.full_name, p.name AS plan_name, t.expiry_date \
                 FROM membership_transactions t \
                 JOIN membership_plans p ON p.id = t.plan_id \
                 JOIN users u ON u.id = t.user_id \
                 WHERE t.status = ? AND t.expiry_date >= ? AND t.expiry_date < ?",
            )
            .bind(MembershipStatus::Active)
            .bind(day_start(target))
            .bind(day_start(target + Duration::days(1)))
            .fetch_all(&self.pool)
            .await?;

            for row in rows {
                self.notifications
                    .dispatch(
                        &row.email,
                        &row.full_name,
                        &Notification::RenewalReminder {
                            plan_name: &row.plan_name,
                            days_before: days,
                            expiry_date: row.expiry_date,
                        },
                    )
                    .await;
                sent += 1;
            }
        }
        Ok(sent)
    }

    /// Suspend memberships whose grace window has closed. Returns the number
    /// suspended.
    pub async fn process_grace_period_expirations(&self) -> AppResult<u64> {
        let cutoff = day_start(self.clock.today() + Duration::days(1));
        let lapsed = sqlx::query_as::<_, MembershipTransaction>(
            "SELECT * FROM membership_transactions \
             WHERE is_in_grace_period = 1 AND grace_period_end IS NOT NULL \
               AND grace_period_end < ?",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut suspended = 0u64;
        for txn in lapsed {
            match self.suspend_membership(&txn).await {
                Ok(()) => suspended += 1,
                Err(e) => log::error!("suspension failed for transaction {}: {e:?}", txn.id),
            }
        }
        Ok(suspended)
    }

    async fn suspend_membership(&self, txn: &MembershipTransaction) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE users SET has_membership = 0 WHERE id = ?")
            .bind(txn.user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE membership_transactions SET status = ?, is_in_grace_period = 0 WHERE id = ?",
        )
        .bind(MembershipStatus::Suspended)
        .bind(txn.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if let Ok(user) = self.find_user(txn.user_id).await {
            let plan_name = self.plan_name(txn.plan_id).await;
            self.notifications
                .dispatch(
                    &user.email,
                    &user.full_name,
                    &Notification::MembershipSuspended {
                        plan_name: &plan_name,
                    },
                )
                .await;
        }

        Ok(())
    }

    // --- user-driven mutations --------------------------------------------

    pub async fn enable_auto_renewal(&self, user_id: i64) -> AppResult<()> {
        let txn = self
            .active_transaction(user_id)
            .await?
            .ok_or(AppError::NoActiveMembership)?;
        let next_renewal_date = txn.expiry_date - Duration::days(RENEWAL_LEAD_DAYS);

        sqlx::query(
            "UPDATE membership_transactions SET auto_renewal = 1, next_renewal_date = ? \
             WHERE id = ?",
        )
        .bind(next_renewal_date)
        .bind(txn.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn disable_auto_renewal(&self, user_id: i64) -> AppResult<()> {
        let txn = self
            .active_transaction(user_id)
            .await?
            .ok_or(AppError::NoActiveMembership)?;

        sqlx::query(
            "UPDATE membership_transactions SET auto_renewal = 0, next_renewal_date = NULL \
             WHERE id = ?",
        )
        .bind(txn.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Cancelling stops future renewals but does not revoke access: the
    /// projection stays as-is until the expiry sweep runs the date out.
    pub async fn cancel_membership(&self, user_id: i64, reason: Option<String>) -> AppResult<()> {
        self.find_user(user_id).await?;
        let txn = self
            .active_transaction(user_id)
            .await?
            .ok_or(AppError::NoActiveMembership)?;

        sqlx::query(
            "UPDATE membership_transactions \
             SET auto_renewal = 0, cancellation_date = ?, cancellation_reason = ?, \
                 status = ?, is_in_grace_period = 0 \
             WHERE id = ?",
        )
        .bind(self.clock.now())
        .bind(reason)
        .bind(MembershipStatus::Cancelled)
        .bind(txn.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Rebuild the projection from the ledger. The ledger is authoritative;
    /// this repairs a projection left stale by a partial failure.
    pub async fn reconcile_membership_projection(&self, user_id: i64) -> AppResult<()> {
        let user = self.find_user(user_id).await?;
        let now = self.clock.now();

        // Cancelled entries still grant access until their natural expiry.
        let granting = sqlx::query_as::<_, MembershipTransaction>(
            "SELECT * FROM membership_transactions \
             WHERE user_id = ? AND (status = ? OR (status = ? AND expiry_date > ?)) \
             ORDER BY transaction_date DESC, id DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(MembershipStatus::Active)
        .bind(MembershipStatus::Cancelled)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match granting {
            Some(txn) => {
                sqlx::query(
                    "UPDATE users SET has_membership = 1, membership_start = ?, \
                     membership_expiry = ? WHERE id = ?",
                )
                .bind(txn.start_date)
                .bind(txn.expiry_date)
                .bind(user.id)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query(
                    "UPDATE users SET has_membership = 0, membership_start = NULL, \
                     membership_expiry = NULL WHERE id = ?",
                )
                .bind(user.id)
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }

    // --- lookups ----------------------------------------------------------

    async fn find_plan(&self, plan_id: i64) -> AppResult<Option<MembershipPlan>> {
        let plan = sqlx::query_as::<_, MembershipPlan>(
            "SELECT * FROM membership_plans WHERE id = ?",
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(plan)
    }

    async fn plan_name(&self, plan_id: i64) -> String {
        match self.find_plan(plan_id).await {
            Ok(Some(plan)) => plan.name,
            _ => "Membership".to_string(),
        }
    }

    async fn find_user(&self, user_id: i64) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::UserNotFound)
    }

    async fn find_transaction(
        &self,
        transaction_id: i64,
    ) -> AppResult<Option<MembershipTransaction>> {
        let txn = sqlx::query_as::<_, MembershipTransaction>(
            "SELECT * FROM membership_transactions WHERE id = ?",
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(txn)
    }

    /// The single "current" ledger entry for a user, newest first in case a
    /// repair ever leaves more than one.
    async fn active_transaction(
        &self,
        user_id: i64,
    ) -> AppResult<Option<MembershipTransaction>> {
        let txn = sqlx::query_as::<_, MembershipTransaction>(
            "SELECT * FROM membership_transactions \
             WHERE user_id = ? AND status = ? \
             ORDER BY transaction_date DESC, id DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(MembershipStatus::Active)
        .fetch_optional(&self.pool)
        .await?;
        Ok(txn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::*;
    use std::sync::Arc;

    struct Ctx {
        pool: DbPool,
        clock: Clock,
        mailer: Arc<RecordingMailer>,
        service: MembershipService,
    }

    async fn setup(at: &str) -> Ctx {
        let pool = test_pool().await;
        let clock = Clock::fixed(utc(at));
        let mailer = Arc::new(RecordingMailer::default());
        let service = MembershipService::new(
            pool.clone(),
            clock.clone(),
            NotificationService::new(mailer.clone()),
        );
        Ctx {
            pool,
            clock,
            mailer,
            service,
        }
    }

    async fn transaction(pool: &DbPool, id: i64) -> MembershipTransaction {
        sqlx::query_as("SELECT * FROM membership_transactions WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn user(pool: &DbPool, id: i64) -> User {
        sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn active_count(pool: &DbPool, user_id: i64) -> i64 {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM membership_transactions WHERE user_id = ? AND status = 'Active'",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn subscribe_creates_active_transaction_and_projection() {
        let ctx = setup("2026-01-15T00:00:00Z").await;
        let user_id = insert_user(&ctx.pool, "linh@example.com").await;
        let plan_id = insert_plan(&ctx.pool, "1 Month", 1, 500000).await;

        let resp = ctx
            .service
            .subscribe(
                user_id,
                SubscribeRequest {
                    plan_id,
                    payment_method: PaymentMethod::VnPay,
                },
            )
            .await
            .unwrap();

        assert_eq!(resp.start_date, utc("2026-01-15T00:00:00Z"));
        assert_eq!(resp.expiry_date, utc("2026-02-15T00:00:00Z"));
        assert_eq!(resp.amount, 500000);
        assert_eq!(resp.status, MembershipStatus::Active);

        let txn = transaction(&ctx.pool, resp.transaction_id).await;
        assert_eq!(txn.payment_status, PaymentStatus::Pending);
        assert!(txn.auto_renewal);
        assert_eq!(txn.renewal_attempts, 0);
        assert_eq!(
            txn.next_renewal_date,
            Some(utc("2026-02-12T00:00:00Z"))
        );

        let u = user(&ctx.pool, user_id).await;
        assert!(u.has_membership);
        assert_eq!(u.membership_start, Some(utc("2026-01-15T00:00:00Z")));
        assert_eq!(u.membership_expiry, Some(utc("2026-02-15T00:00:00Z")));
    }

    #[tokio::test]
    async fn subscribe_rejects_missing_or_inactive_plan_and_missing_user() {
        let ctx = setup("2026-01-15T00:00:00Z").await;
        let user_id = insert_user(&ctx.pool, "linh@example.com").await;
        let plan_id = insert_plan(&ctx.pool, "1 Month", 1, 500000).await;

        let req = |plan_id| SubscribeRequest {
            plan_id,
            payment_method: PaymentMethod::Cod,
        };

        let err = ctx.service.subscribe(user_id, req(9999)).await.unwrap_err();
        assert!(matches!(err, AppError::PlanNotFound));

        sqlx::query("UPDATE membership_plans SET is_active = 0 WHERE id = ?")
            .bind(plan_id)
            .execute(&ctx.pool)
            .await
            .unwrap();
        let err = ctx.service.subscribe(user_id, req(plan_id)).await.unwrap_err();
        assert!(matches!(err, AppError::PlanNotFound));

        sqlx::query("UPDATE membership_plans SET is_active = 1 WHERE id = ?")
            .bind(plan_id)
            .execute(&ctx.pool)
            .await
            .unwrap();
        let err = ctx.service.subscribe(9999, req(plan_id)).await.unwrap_err();
        assert!(matches!(err, AppError::UserNotFound));
    }

    #[tokio::test]
    async fn subscribe_clamps_month_end_expiry() {
        let ctx = setup("2026-01-31T00:00:00Z").await;
        let user_id = insert_user(&ctx.pool, "linh@example.com").await;
        let plan_id = insert_plan(&ctx.pool, "1 Month", 1, 500000).await;

        let resp = ctx
            .service
            .subscribe(
                user_id,
                SubscribeRequest {
                    plan_id,
                    payment_method: PaymentMethod::Cod,
                },
            )
            .await
            .unwrap();

        assert_eq!(resp.expiry_date, utc("2026-02-28T00:00:00Z"));
    }

    #[tokio::test]
    async fn manual_renew_restarts_at_now_and_supersedes_the_old_entry() {
        let ctx = setup("2026-01-15T00:00:00Z").await;
        let user_id = insert_user(&ctx.pool, "linh@example.com").await;
        let plan_id = insert_plan(&ctx.pool, "1 Month", 1, 500000).await;

        let first = ctx
            .service
            .subscribe(
                user_id,
                SubscribeRequest {
                    plan_id,
                    payment_method: PaymentMethod::Cod,
                },
            )
            .await
            .unwrap();

        ctx.clock.set(utc("2026-02-10T00:00:00Z"));
        let renewed = ctx.service.renew(user_id, plan_id).await.unwrap();

        // Restarts at "now", not at the old expiry.
        assert_eq!(renewed.start_date, utc("2026-02-10T00:00:00Z"));
        assert_eq!(renewed.expiry_date, utc("2026-03-10T00:00:00Z"));

        let old = transaction(&ctx.pool, first.transaction_id).await;
        assert_eq!(old.status, MembershipStatus::Renewed);
        assert_eq!(active_count(&ctx.pool, user_id).await, 1);
    }

    #[tokio::test]
    async fn attempt_renewal_chains_contiguous_periods() {
        let ctx = setup("2026-01-15T00:00:00Z").await;
        let user_id = insert_user(&ctx.pool, "linh@example.com").await;
        let plan_id = insert_plan(&ctx.pool, "1 Month", 1, 500000).await;

        let first = ctx
            .service
            .subscribe(
                user_id,
                SubscribeRequest {
                    plan_id,
                    payment_method: PaymentMethod::VnPay,
                },
            )
            .await
            .unwrap();

        ctx.clock.set(utc("2026-02-12T09:00:00Z"));
        let renewed = ctx
            .service
            .attempt_renewal(first.transaction_id)
            .await
            .unwrap();

        // Chained on the old expiry, not on "now".
        assert_eq!(renewed.start_date, utc("2026-02-15T00:00:00Z"));
        assert_eq!(renewed.expiry_date, utc("2026-03-15T00:00:00Z"));
        assert_eq!(renewed.payment_method, PaymentMethod::VnPay);

        let old = transaction(&ctx.pool, first.transaction_id).await;
        assert_eq!(old.status, MembershipStatus::Renewed);
        assert_eq!(old.renewal_attempts, 1);
        assert_eq!(old.last_renewal_attempt, Some(utc("2026-02-12T09:00:00Z")));
        assert_eq!(active_count(&ctx.pool, user_id).await, 1);

        let u = user(&ctx.pool, user_id).await;
        assert_eq!(u.membership_expiry, Some(utc("2026-03-15T00:00:00Z")));

        // Renew again: still no gap.
        let second = ctx.service.attempt_renewal(renewed.transaction_id).await.unwrap();
        assert_eq!(second.start_date, utc("2026-03-15T00:00:00Z"));
        assert_eq!(second.expiry_date, utc("2026-04-15T00:00:00Z"));

        assert_eq!(
            ctx.mailer.subjects(),
            vec![
                "Membership Renewed Successfully",
                "Membership Renewed Successfully"
            ]
        );
    }

    #[tokio::test]
    async fn attempt_renewal_unknown_transaction() {
        let ctx = setup("2026-01-15T00:00:00Z").await;
        let err = ctx.service.attempt_renewal(12345).await.unwrap_err();
        assert!(matches!(err, AppError::TransactionNotFound));
    }

    #[tokio::test]
    async fn failed_renewal_after_expiry_enters_grace_and_keeps_the_attempt_count() {
        let ctx = setup("2026-01-15T00:00:00Z").await;
        let user_id = insert_user(&ctx.pool, "linh@example.com").await;
        let plan_id = insert_plan(&ctx.pool, "1 Month", 1, 500000).await;

        let sub = ctx
            .service
            .subscribe(
                user_id,
                SubscribeRequest {
                    plan_id,
                    payment_method: PaymentMethod::Cod,
                },
            )
            .await
            .unwrap();

        // Plan retired before the renewal ran, membership already lapsed.
        sqlx::query("UPDATE membership_plans SET is_active = 0 WHERE id = ?")
            .bind(plan_id)
            .execute(&ctx.pool)
            .await
            .unwrap();
        ctx.clock.set(utc("2026-02-16T00:00:00Z"));

        let err = ctx
            .service
            .attempt_renewal(sub.transaction_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PlanNotFound));

        let txn = transaction(&ctx.pool, sub.transaction_id).await;
        assert_eq!(txn.renewal_attempts, 1);
        assert!(txn.is_in_grace_period);
        assert_eq!(txn.grace_period_start, Some(utc("2026-02-15T00:00:00Z")));
        assert_eq!(txn.grace_period_end, Some(utc("2026-02-22T00:00:00Z")));
        // Access is retained through the grace window.
        assert!(user(&ctx.pool, user_id).await.has_membership);
        assert_eq!(
            ctx.mailer.subjects(),
            vec!["Membership Payment Issue - Grace Period"]
        );
    }

    #[tokio::test]
    async fn resubscribing_during_grace_ends_the_grace_window() {
        let ctx = setup("2026-01-15T00:00:00Z").await;
        let user_id = insert_user(&ctx.pool, "linh@example.com").await;
        let plan_id = insert_plan(&ctx.pool, "1 Month", 1, 500000).await;

        let sub = ctx
            .service
            .subscribe(
                user_id,
                SubscribeRequest {
                    plan_id,
                    payment_method: PaymentMethod::Cod,
                },
            )
            .await
            .unwrap();

        sqlx::query("UPDATE membership_plans SET is_active = 0 WHERE id = ?")
            .bind(plan_id)
            .execute(&ctx.pool)
            .await
            .unwrap();
        ctx.clock.set(utc("2026-02-16T00:00:00Z"));
        ctx.service
            .attempt_renewal(sub.transaction_id)
            .await
            .unwrap_err();
        assert!(transaction(&ctx.pool, sub.transaction_id).await.is_in_grace_period);

        // The user signs up again while in grace.
        let quarterly = insert_plan(&ctx.pool, "3 Months", 3, 1200000).await;
        ctx.service
            .subscribe(
                user_id,
                SubscribeRequest {
                    plan_id: quarterly,
                    payment_method: PaymentMethod::VnPay,
                },
            )
            .await
            .unwrap();

        let old = transaction(&ctx.pool, sub.transaction_id).await;
        assert_eq!(old.status, MembershipStatus::Renewed);
        assert!(!old.is_in_grace_period);

        // The closed grace window no longer suspends anything.
        ctx.clock.set(utc("2026-02-23T00:00:00Z"));
        assert_eq!(
            ctx.service.process_grace_period_expirations().await.unwrap(),
            0
        );
        assert!(user(&ctx.pool, user_id).await.has_membership);
    }

    #[tokio::test]
    async fn expiry_sweep_expires_and_is_idempotent() {
        let ctx = setup("2026-01-15T00:00:00Z").await;
        let user_id = insert_user(&ctx.pool, "linh@example.com").await;
        let plan_id = insert_plan(&ctx.pool, "1 Month", 1, 500000).await;

        let sub = ctx
            .service
            .subscribe(
                user_id,
                SubscribeRequest {
                    plan_id,
                    payment_method: PaymentMethod::Cod,
                },
            )
            .await
            .unwrap();

        // Not yet expired: nothing happens.
        ctx.clock.set(utc("2026-02-15T06:00:00Z"));
        assert_eq!(
            ctx.service.check_and_update_expired_memberships().await.unwrap(),
            0
        );

        ctx.clock.set(utc("2026-02-16T00:00:00Z"));
        assert_eq!(
            ctx.service.check_and_update_expired_memberships().await.unwrap(),
            1
        );

        let u = user(&ctx.pool, user_id).await;
        assert!(!u.has_membership);
        let txn = transaction(&ctx.pool, sub.transaction_id).await;
        assert_eq!(txn.status, MembershipStatus::Expired);

        // Second pass: no further change.
        assert_eq!(
            ctx.service.check_and_update_expired_memberships().await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn expiry_sweep_routes_failed_auto_renewals_into_grace() {
        let ctx = setup("2026-01-15T00:00:00Z").await;
        let user_id = insert_user(&ctx.pool, "linh@example.com").await;
        let plan_id = insert_plan(&ctx.pool, "1 Month", 1, 500000).await;

        let sub = ctx
            .service
            .subscribe(
                user_id,
                SubscribeRequest {
                    plan_id,
                    payment_method: PaymentMethod::Cod,
                },
            )
            .await
            .unwrap();

        // A renewal was attempted before expiry and failed.
        sqlx::query(
            "UPDATE membership_transactions SET renewal_attempts = 1 WHERE id = ?",
        )
        .bind(sub.transaction_id)
        .execute(&ctx.pool)
        .await
        .unwrap();

        ctx.clock.set(utc("2026-02-16T00:00:00Z"));
        assert_eq!(
            ctx.service.check_and_update_expired_memberships().await.unwrap(),
            1
        );

        let txn = transaction(&ctx.pool, sub.transaction_id).await;
        assert_eq!(txn.status, MembershipStatus::Active);
        assert!(txn.is_in_grace_period);
        assert!(user(&ctx.pool, user_id).await.has_membership);

        // Grace entries are skipped on the next pass.
        assert_eq!(
            ctx.service.check_and_update_expired_memberships().await.unwrap(),
            0
        );

        // Grace window closes: the suspension sweep takes over.
        ctx.clock.set(utc("2026-02-22T00:00:00Z"));
        assert_eq!(
            ctx.service.process_grace_period_expirations().await.unwrap(),
            1
        );
        let txn = transaction(&ctx.pool, sub.transaction_id).await;
        assert_eq!(txn.status, MembershipStatus::Suspended);
        assert!(!txn.is_in_grace_period);
        assert!(!user(&ctx.pool, user_id).await.has_membership);

        assert_eq!(
            ctx.mailer.subjects(),
            vec![
                "Membership Payment Issue - Grace Period",
                "Membership Suspended"
            ]
        );

        // And it is idempotent too.
        assert_eq!(
            ctx.service.process_grace_period_expirations().await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn auto_renewal_sweep_picks_entries_expiring_in_exactly_three_days() {
        let ctx = setup("2026-01-15T00:00:00Z").await;
        let plan_id = insert_plan(&ctx.pool, "1 Month", 1, 500000).await;

        let due_user = insert_user(&ctx.pool, "due@example.com").await;
        let due = ctx
            .service
            .subscribe(
                due_user,
                SubscribeRequest {
                    plan_id,
                    payment_method: PaymentMethod::Cod,
                },
            )
            .await
            .unwrap();

        // Same expiry but auto-renewal switched off: must be skipped.
        let opted_out = insert_user(&ctx.pool, "optout@example.com").await;
        ctx.service
            .subscribe(
                opted_out,
                SubscribeRequest {
                    plan_id,
                    payment_method: PaymentMethod::Cod,
                },
            )
            .await
            .unwrap();
        ctx.service.disable_auto_renewal(opted_out).await.unwrap();

        // Expiry further out: not due yet.
        let later_user = insert_user(&ctx.pool, "later@example.com").await;
        ctx.clock.set(utc("2026-01-20T00:00:00Z"));
        ctx.service
            .subscribe(
                later_user,
                SubscribeRequest {
                    plan_id,
                    payment_method: PaymentMethod::Cod,
                },
            )
            .await
            .unwrap();

        // Feb 12 is exactly three days before the Feb 15 expiry.
        ctx.clock.set(utc("2026-02-12T04:00:00Z"));
        assert_eq!(ctx.service.process_auto_renewals().await.unwrap(), 1);

        let old = transaction(&ctx.pool, due.transaction_id).await;
        assert_eq!(old.status, MembershipStatus::Renewed);
        let u = user(&ctx.pool, due_user).await;
        assert_eq!(u.membership_start, Some(utc("2026-02-15T00:00:00Z")));
        assert_eq!(u.membership_expiry, Some(utc("2026-03-15T00:00:00Z")));

        assert!(user(&ctx.pool, opted_out).await.membership_expiry
            == Some(utc("2026-02-15T00:00:00Z")));
    }

    #[tokio::test]
    async fn reminder_sweep_matches_each_threshold_exactly() {
        let ctx = setup("2026-03-01T00:00:00Z").await;
        let plan_id = insert_plan(&ctx.pool, "1 Month", 1, 500000).await;

        let mut expected = Vec::new();
        for (email, expiry, subject) in [
            ("a@example.com", "2026-03-31T10:00:00Z", "Your membership renews in 1 month"),
            ("b@example.com", "2026-03-15T00:00:00Z", "Your membership renews in 2 weeks"),
            ("c@example.com", "2026-03-08T23:00:00Z", "Your membership renews in 7 days"),
        ] {
            let user_id = insert_user(&ctx.pool, email).await;
            let sub = ctx
                .service
                .subscribe(
                    user_id,
                    SubscribeRequest {
                        plan_id,
                        payment_method: PaymentMethod::Cod,
                    },
                )
                .await
                .unwrap();
            sqlx::query("UPDATE membership_transactions SET expiry_date = ? WHERE id = ?")
                .bind(utc(expiry))
                .bind(sub.transaction_id)
                .execute(&ctx.pool)
                .await
                .unwrap();
            expected.push(subject.to_string());
        }

        // Off-threshold expiry: no reminder.
        let quiet = insert_user(&ctx.pool, "quiet@example.com").await;
        let sub = ctx
            .service
            .subscribe(
                quiet,
                SubscribeRequest {
                    plan_id,
                    payment_method: PaymentMethod::Cod,
                },
            )
            .await
            .unwrap();
        sqlx::query("UPDATE membership_transactions SET expiry_date = ? WHERE id = ?")
            .bind(utc("2026-03-20T00:00:00Z"))
            .bind(sub.transaction_id)
            .execute(&ctx.pool)
            .await
            .unwrap();

        assert_eq!(ctx.service.send_renewal_reminders().await.unwrap(), 3);
        assert_eq!(ctx.mailer.subjects(), expected);
    }

    #[tokio::test]
    async fn cancel_keeps_access_until_expiry() {
        let ctx = setup("2026-01-15T00:00:00Z").await;
        let user_id = insert_user(&ctx.pool, "linh@example.com").await;
        let plan_id = insert_plan(&ctx.pool, "1 Month", 1, 500000).await;

        let sub = ctx
            .service
            .subscribe(
                user_id,
                SubscribeRequest {
                    plan_id,
                    payment_method: PaymentMethod::Cod,
                },
            )
            .await
            .unwrap();

        ctx.clock.set(utc("2026-01-20T00:00:00Z"));
        ctx.service
            .cancel_membership(user_id, Some("moving away".to_string()))
            .await
            .unwrap();

        let txn = transaction(&ctx.pool, sub.transaction_id).await;
        assert_eq!(txn.status, MembershipStatus::Cancelled);
        assert!(!txn.auto_renewal);
        assert_eq!(txn.cancellation_date, Some(utc("2026-01-20T00:00:00Z")));
        assert_eq!(txn.cancellation_reason.as_deref(), Some("moving away"));

        // Access is untouched until the expiry sweep revokes it.
        assert!(user(&ctx.pool, user_id).await.has_membership);

        ctx.clock.set(utc("2026-02-16T00:00:00Z"));
        ctx.service
            .check_and_update_expired_memberships()
            .await
            .unwrap();
        assert!(!user(&ctx.pool, user_id).await.has_membership);

        // No active entry anymore: a second cancel reports it.
        let err = ctx.service.cancel_membership(user_id, None).await.unwrap_err();
        assert!(matches!(err, AppError::NoActiveMembership));
    }

    #[tokio::test]
    async fn auto_renewal_toggles_require_an_active_entry() {
        let ctx = setup("2026-01-15T00:00:00Z").await;
        let user_id = insert_user(&ctx.pool, "linh@example.com").await;
        let plan_id = insert_plan(&ctx.pool, "1 Month", 1, 500000).await;

        let err = ctx.service.enable_auto_renewal(user_id).await.unwrap_err();
        assert!(matches!(err, AppError::NoActiveMembership));
        let err = ctx.service.disable_auto_renewal(user_id).await.unwrap_err();
        assert!(matches!(err, AppError::NoActiveMembership));

        let sub = ctx
            .service
            .subscribe(
                user_id,
                SubscribeRequest {
                    plan_id,
                    payment_method: PaymentMethod::Cod,
                },
            )
            .await
            .unwrap();

        ctx.service.disable_auto_renewal(user_id).await.unwrap();
        let txn = transaction(&ctx.pool, sub.transaction_id).await;
        assert!(!txn.auto_renewal);
        assert_eq!(txn.next_renewal_date, None);

        ctx.service.enable_auto_renewal(user_id).await.unwrap();
        let txn = transaction(&ctx.pool, sub.transaction_id).await;
        assert!(txn.auto_renewal);
        assert_eq!(txn.next_renewal_date, Some(utc("2026-02-12T00:00:00Z")));
    }

    #[tokio::test]
    async fn status_reports_days_remaining_and_history_newest_first() {
        let ctx = setup("2026-01-15T00:00:00Z").await;
        let user_id = insert_user(&ctx.pool, "linh@example.com").await;
        let monthly = insert_plan(&ctx.pool, "1 Month", 1, 500000).await;
        let quarterly = insert_plan(&ctx.pool, "3 Months", 3, 1200000).await;

        ctx.service
            .subscribe(
                user_id,
                SubscribeRequest {
                    plan_id: monthly,
                    payment_method: PaymentMethod::Cod,
                },
            )
            .await
            .unwrap();
        ctx.clock.set(utc("2026-02-01T00:00:00Z"));
        ctx.service.renew(user_id, quarterly).await.unwrap();

        ctx.clock.set(utc("2026-02-11T15:00:00Z"));
        let status = ctx.service.get_status(user_id).await.unwrap();
        assert!(status.has_active_membership);
        assert_eq!(status.current_plan_name.as_deref(), Some("3 Months"));
        // Expiry 2026-05-01, today 2026-02-11: 79 days left.
        assert_eq!(status.days_remaining, Some(79));
        assert_eq!(status.history.len(), 2);
        assert_eq!(status.history[0].plan_name, "3 Months");
        assert_eq!(status.history[0].status, MembershipStatus::Active);
        assert_eq!(status.history[1].plan_name, "1 Month");
        assert_eq!(status.history[1].status, MembershipStatus::Renewed);
    }

    #[tokio::test]
    async fn reconcile_rebuilds_projection_from_the_ledger() {
        let ctx = setup("2026-01-15T00:00:00Z").await;
        let user_id = insert_user(&ctx.pool, "linh@example.com").await;
        let plan_id = insert_plan(&ctx.pool, "1 Month", 1, 500000).await;

        ctx.service
            .subscribe(
                user_id,
                SubscribeRequest {
                    plan_id,
                    payment_method: PaymentMethod::Cod,
                },
            )
            .await
            .unwrap();

        // Simulate a stale projection after a partial failure.
        sqlx::query(
            "UPDATE users SET has_membership = 0, membership_expiry = NULL WHERE id = ?",
        )
        .bind(user_id)
        .execute(&ctx.pool)
        .await
        .unwrap();

        ctx.service
            .reconcile_membership_projection(user_id)
            .await
            .unwrap();
        let u = user(&ctx.pool, user_id).await;
        assert!(u.has_membership);
        assert_eq!(u.membership_expiry, Some(utc("2026-02-15T00:00:00Z")));

        // Cancelled but unexpired still grants access.
        ctx.service.cancel_membership(user_id, None).await.unwrap();
        ctx.service
            .reconcile_membership_projection(user_id)
            .await
            .unwrap();
        assert!(user(&ctx.pool, user_id).await.has_membership);

        // Past expiry nothing grants access anymore.
        ctx.clock.set(utc("2026-03-01T00:00:00Z"));
        ctx.service
            .reconcile_membership_projection(user_id)
            .await
            .unwrap();
        let u = user(&ctx.pool, user_id).await;
        assert!(!u.has_membership);
        assert_eq!(u.membership_expiry, None);
    }
}
