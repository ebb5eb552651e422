//! SubscriptionLifecycle - applies provider lifecycle signals.
//!
//! Each signal is looked up by the provider's recurring-purchase id. Every
//! step is either a no-op when already applied or guarded by the entity
//! version, so a redelivered or re-swept event converges on the same state.

use std::sync::Arc;

use serde_json::json;

use crate::application::handlers::grace::{
    ResolveGracePeriodHandler, StartGracePeriodCommand, StartGracePeriodHandler,
};
use crate::application::handlers::jobs::TaskEnqueuer;
use crate::domain::foundation::{DomainError, ErrorCode, StateMachine, Timestamp, UserId};
use crate::domain::jobs::{NewTask, QueueClass, TaskType};
use crate::domain::subscription::{
    NewSubscription, PlanType, Platform, ProductCatalog, ReceiptHash, Subscription,
    SubscriptionStatus, Transaction,
};
use crate::domain::webhook::{LifecycleSignal, Provider, SignalKind};
use crate::ports::{SaveResult, SubscriptionRepository, TransactionRepository};

/// Length used for lifetime purchases, which never renew.
const LIFETIME_DAYS: i64 = 36_500;

/// Paid-through date when the provider did not report one.
pub(crate) fn default_expiry(plan_type: PlanType, now: Timestamp) -> Timestamp {
    now.add_days(plan_type.period_days().unwrap_or(LIFETIME_DAYS))
}

/// Follow-up work after a payment was recorded.
pub(crate) async fn enqueue_payment_follow_ups(
    enqueuer: &TaskEnqueuer,
    transaction: &Transaction,
    now: Timestamp,
) {
    enqueuer
        .enqueue_follow_up(
            NewTask::new(
                TaskType::LtvRecompute,
                json!({ "user_id": transaction.user_id.as_str() }),
            ),
            now,
        )
        .await;
    enqueuer
        .enqueue_follow_up(
            NewTask::new(
                TaskType::LedgerSync,
                json!({
                    "transaction_id": transaction.id,
                    "amount_cents": transaction.amount_cents,
                    "currency": transaction.currency,
                }),
            )
            .queue(QueueClass::Low)
            .dedupe_key(format!("ledger_sync:{}", transaction.id)),
            now,
        )
        .await;
}

pub struct SubscriptionLifecycle {
    subscriptions: Arc<dyn SubscriptionRepository>,
    transactions: Arc<dyn TransactionRepository>,
    start_grace: StartGracePeriodHandler,
    resolve_grace: ResolveGracePeriodHandler,
    enqueuer: TaskEnqueuer,
    catalog: ProductCatalog,
}

impl SubscriptionLifecycle {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        transactions: Arc<dyn TransactionRepository>,
        start_grace: StartGracePeriodHandler,
        resolve_grace: ResolveGracePeriodHandler,
        enqueuer: TaskEnqueuer,
        catalog: ProductCatalog,
    ) -> Self {
        Self {
            subscriptions,
            transactions,
            start_grace,
            resolve_grace,
            enqueuer,
            catalog,
        }
    }

    /// Applies one signal and returns the subscription it touched.
    pub async fn apply(
        &self,
        provider: Provider,
        signal: &LifecycleSignal,
        now: Timestamp,
    ) -> Result<Subscription, DomainError> {
        let platform = provider.platform();
        let existing = self
            .subscriptions
            .find_by_provider_id(platform, &signal.provider_subscription_id)
            .await?;

        let subscription = match (&signal.kind, existing) {
            (SignalKind::Renewed, Some(sub)) if sub.status.is_terminal() => {
                self.open(platform, signal, Some(sub.user_id), now).await?
            }
            (SignalKind::Renewed, Some(sub)) => self.renew(sub, signal, now).await?,
            (SignalKind::Renewed, None) => self.open(platform, signal, None, now).await?,
            (_, None) => return Err(not_found(signal)),
            (SignalKind::RenewalFailed, Some(sub)) => {
                self.start_grace
                    .handle(
                        StartGracePeriodCommand {
                            subscription_id: sub.id,
                            reason: signal
                                .reason
                                .clone()
                                .unwrap_or_else(|| "renewal_failed".to_string()),
                        },
                        now,
                    )
                    .await?
                    .subscription
            }
            (SignalKind::Recovered, Some(sub)) => {
                self.resolve_grace
                    .resolve_for_subscription(&sub.id, signal.expires_at, now)
                    .await?
                    .subscription
            }
            (SignalKind::AutoRenewChanged(auto_renew), Some(mut sub)) => {
                if sub.set_auto_renew(*auto_renew, now) {
                    self.subscriptions.update(&mut sub).await?;
                }
                sub
            }
            (SignalKind::Cancelled, Some(mut sub)) => {
                if sub.cancel(now)? {
                    self.subscriptions.update(&mut sub).await?;
                    tracing::info!(subscription_id = %sub.id, "Subscription cancelled by provider");
                }
                sub
            }
            (SignalKind::Expired, Some(mut sub)) => {
                if sub.expire(now)? {
                    self.subscriptions.update(&mut sub).await?;
                    tracing::info!(subscription_id = %sub.id, "Subscription expired by provider");
                }
                sub
            }
        };

        if matches!(signal.kind, SignalKind::Renewed) {
            self.record_payment(&subscription, platform, signal, now).await?;
        }
        Ok(subscription)
    }

    async fn renew(
        &self,
        mut sub: Subscription,
        signal: &LifecycleSignal,
        now: Timestamp,
    ) -> Result<Subscription, DomainError> {
        let expires_at = signal
            .expires_at
            .unwrap_or_else(|| default_expiry(sub.plan_type, now));

        if sub.status == SubscriptionStatus::Grace {
            // In grace: a successful charge resolves grace and dunning.
            return Ok(self
                .resolve_grace
                .resolve_for_subscription(&sub.id, Some(expires_at), now)
                .await?
                .subscription);
        }
        if sub.renew(expires_at, now)? {
            self.subscriptions.update(&mut sub).await?;
            tracing::info!(
                subscription_id = %sub.id,
                expires_at = %sub.expires_at,
                "Subscription renewed"
            );
        }
        Ok(sub)
    }

    /// Opens a subscription for a purchase we have not seen before.
    async fn open(
        &self,
        platform: Platform,
        signal: &LifecycleSignal,
        known_user: Option<UserId>,
        now: Timestamp,
    ) -> Result<Subscription, DomainError> {
        let user_id = match known_user {
            Some(user_id) => user_id,
            None => {
                let hint = signal.user_hint.as_deref().ok_or_else(|| not_found(signal))?;
                UserId::new(hint)?
            }
        };
        let product_id = signal.product_id.as_deref().ok_or_else(|| {
            DomainError::validation("product_id", "purchase does not name a product")
        })?;
        let entry = self.catalog.get(product_id).ok_or_else(|| {
            DomainError::validation("product_id", "unknown product")
                .with_detail("product_id", product_id)
        })?;

        let subscription = Subscription::activate(
            NewSubscription {
                user_id,
                plan_type: entry.plan_type,
                source: platform,
                product_id: product_id.to_string(),
                provider_subscription_id: Some(signal.provider_subscription_id.clone()),
                expires_at: signal
                    .expires_at
                    .unwrap_or_else(|| default_expiry(entry.plan_type, now)),
                auto_renew: entry.plan_type.period_days().is_some(),
            },
            now,
        );
        self.subscriptions.insert(&subscription).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            user_id = %subscription.user_id,
            source = %platform,
            plan_type = %subscription.plan_type,
            "Subscription opened from provider event"
        );
        self.enqueuer
            .enqueue_follow_up(
                NewTask::new(
                    TaskType::NotificationSend,
                    json!({
                        "user_id": subscription.user_id.as_str(),
                        "template": "subscription_started",
                    }),
                ),
                now,
            )
            .await;
        Ok(subscription)
    }

    async fn record_payment(
        &self,
        subscription: &Subscription,
        platform: Platform,
        signal: &LifecycleSignal,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        let (Some(amount_cents), Some(provider_tx_id)) =
            (signal.amount_cents, signal.provider_tx_id.as_deref())
        else {
            return Ok(());
        };
        let currency = signal.currency.as_deref().unwrap_or("USD");
        let transaction = Transaction::record(
            subscription.user_id.clone(),
            subscription.id,
            amount_cents,
            currency,
            ReceiptHash::of(&format!("{}:{}", platform, provider_tx_id))?,
            provider_tx_id,
            platform,
            now,
        )?;

        if self.transactions.insert(&transaction).await? == SaveResult::Inserted {
            enqueue_payment_follow_ups(&self.enqueuer, &transaction, now).await;
        }
        Ok(())
    }
}

fn not_found(signal: &LifecycleSignal) -> DomainError {
    DomainError::new(ErrorCode::SubscriptionNotFound, "no subscription for provider id")
        .with_detail("provider_subscription_id", signal.provider_subscription_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryDunningRepository, InMemoryGracePeriodRepository, InMemorySubscriptionRepository,
        InMemoryTaskStore, InMemoryTransactionRepository,
    };
    use crate::domain::subscription::CatalogEntry;
    use crate::domain::jobs::TaskStatus;
    use crate::ports::{DunningRepository, GracePeriodRepository};

    struct Fixture {
        subscriptions: Arc<InMemorySubscriptionRepository>,
        transactions: Arc<InMemoryTransactionRepository>,
        grace_periods: Arc<InMemoryGracePeriodRepository>,
        dunning: Arc<InMemoryDunningRepository>,
        tasks: Arc<InMemoryTaskStore>,
        lifecycle: SubscriptionLifecycle,
    }

    fn catalog() -> ProductCatalog {
        ProductCatalog::new().with(
            "premium_monthly",
            CatalogEntry {
                plan_type: PlanType::Monthly,
                price_cents: 999,
                currency: "USD".to_string(),
            },
        )
    }

    fn fixture() -> Fixture {
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let transactions = Arc::new(InMemoryTransactionRepository::new());
        let grace_periods = Arc::new(InMemoryGracePeriodRepository::new());
        let dunning = Arc::new(InMemoryDunningRepository::new());
        let tasks = Arc::new(InMemoryTaskStore::new());
        let enqueuer = TaskEnqueuer::new(tasks.clone(), 5);
        let lifecycle = SubscriptionLifecycle::new(
            subscriptions.clone(),
            transactions.clone(),
            StartGracePeriodHandler::new(
                subscriptions.clone(),
                grace_periods.clone(),
                dunning.clone(),
                enqueuer.clone(),
                16,
                5,
            ),
            ResolveGracePeriodHandler::new(
                subscriptions.clone(),
                grace_periods.clone(),
                dunning.clone(),
            ),
            enqueuer,
            catalog(),
        );
        Fixture {
            subscriptions,
            transactions,
            grace_periods,
            dunning,
            tasks,
            lifecycle,
        }
    }

    fn now() -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000)
    }

    fn signal(kind: SignalKind) -> LifecycleSignal {
        LifecycleSignal {
            kind,
            provider_subscription_id: "sub_1".to_string(),
            user_hint: Some("user-1".to_string()),
            product_id: Some("premium_monthly".to_string()),
            expires_at: Some(now().add_days(30)),
            amount_cents: Some(999),
            currency: Some("usd".to_string()),
            provider_tx_id: Some("in_1".to_string()),
            reason: None,
        }
    }

    #[tokio::test]
    async fn first_payment_opens_subscription_and_records_transaction() {
        let f = fixture();

        let sub = f
            .lifecycle
            .apply(Provider::Stripe, &signal(SignalKind::Renewed), now())
            .await
            .unwrap();

        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.source, Platform::Stripe);
        assert_eq!(sub.expires_at, now().add_days(30));
        let total = f.transactions.total_for_user(&sub.user_id).await.unwrap();
        assert_eq!(total, 999);
        assert!(!f.tasks.with_status(TaskStatus::Pending).await.is_empty());
    }

    #[tokio::test]
    async fn replayed_payment_is_recorded_once() {
        let f = fixture();
        let s = signal(SignalKind::Renewed);
        f.lifecycle.apply(Provider::Stripe, &s, now()).await.unwrap();
        let sub = f.lifecycle.apply(Provider::Stripe, &s, now()).await.unwrap();

        assert_eq!(f.transactions.total_for_user(&sub.user_id).await.unwrap(), 999);
        assert_eq!(sub.version, 1);
    }

    #[tokio::test]
    async fn renewal_moves_expiry_forward_only() {
        let f = fixture();
        f.lifecycle
            .apply(Provider::Stripe, &signal(SignalKind::Renewed), now())
            .await
            .unwrap();

        let mut later = signal(SignalKind::Renewed);
        later.expires_at = Some(now().add_days(60));
        later.provider_tx_id = Some("in_2".to_string());
        let sub = f.lifecycle.apply(Provider::Stripe, &later, now()).await.unwrap();
        assert_eq!(sub.expires_at, now().add_days(60));

        let mut stale = signal(SignalKind::Renewed);
        stale.expires_at = Some(now().add_days(10));
        stale.provider_tx_id = Some("in_0".to_string());
        let sub = f.lifecycle.apply(Provider::Stripe, &stale, now()).await.unwrap();
        assert_eq!(sub.expires_at, now().add_days(60));
    }

    #[tokio::test]
    async fn failure_then_recovery_round_trips_through_grace() {
        let f = fixture();
        let opened = f
            .lifecycle
            .apply(Provider::Stripe, &signal(SignalKind::Renewed), now())
            .await
            .unwrap();

        let failed = f
            .lifecycle
            .apply(Provider::Stripe, &signal(SignalKind::RenewalFailed), now())
            .await
            .unwrap();
        assert_eq!(failed.status, SubscriptionStatus::Grace);
        assert!(f
            .grace_periods
            .find_active_for_subscription(&opened.id)
            .await
            .unwrap()
            .is_some());

        let mut paid = signal(SignalKind::Renewed);
        paid.expires_at = Some(now().add_days(60));
        paid.provider_tx_id = Some("in_2".to_string());
        let recovered = f.lifecycle.apply(Provider::Stripe, &paid, now()).await.unwrap();

        assert_eq!(recovered.status, SubscriptionStatus::Active);
        assert_eq!(recovered.expires_at, now().add_days(60));
        assert!(f
            .grace_periods
            .find_active_for_subscription(&opened.id)
            .await
            .unwrap()
            .is_none());
        assert!(f.dunning.find_open_for_subscription(&opened.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancel_and_auto_renew_signals_apply_once() {
        let f = fixture();
        f.lifecycle
            .apply(Provider::Stripe, &signal(SignalKind::Renewed), now())
            .await
            .unwrap();

        let sub = f
            .lifecycle
            .apply(Provider::Stripe, &signal(SignalKind::AutoRenewChanged(false)), now())
            .await
            .unwrap();
        assert!(!sub.auto_renew);

        let sub = f
            .lifecycle
            .apply(Provider::Stripe, &signal(SignalKind::Cancelled), now())
            .await
            .unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Cancelled);

        let again = f
            .lifecycle
            .apply(Provider::Stripe, &signal(SignalKind::Cancelled), now())
            .await
            .unwrap();
        assert_eq!(again.version, sub.version);
    }

    #[tokio::test]
    async fn renewal_after_expiry_opens_a_new_subscription() {
        let f = fixture();
        let first = f
            .lifecycle
            .apply(Provider::Stripe, &signal(SignalKind::Renewed), now())
            .await
            .unwrap();
        f.lifecycle
            .apply(Provider::Stripe, &signal(SignalKind::Expired), now())
            .await
            .unwrap();

        let mut restarted = signal(SignalKind::Renewed);
        restarted.user_hint = None;
        restarted.provider_tx_id = Some("in_2".to_string());
        let second = f
            .lifecycle
            .apply(Provider::Stripe, &restarted, now().add_days(1))
            .await
            .unwrap();

        assert_ne!(second.id, first.id);
        assert_eq!(second.user_id, first.user_id);
        assert_eq!(second.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn unknown_purchase_without_user_is_not_found() {
        let f = fixture();
        let mut s = signal(SignalKind::Renewed);
        s.user_hint = None;

        let err = f.lifecycle.apply(Provider::Apple, &s, now()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SubscriptionNotFound);
    }

    #[tokio::test]
    async fn failure_for_unknown_purchase_is_not_found() {
        let f = fixture();
        let err = f
            .lifecycle
            .apply(Provider::Google, &signal(SignalKind::RenewalFailed), now())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SubscriptionNotFound);
        let user = UserId::new("user-1").unwrap();
        assert!(f.subscriptions.find_current_for_user(&user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_product_is_rejected() {
        let f = fixture();
        let mut s = signal(SignalKind::Renewed);
        s.product_id = Some("mystery".to_string());

        let err = f.lifecycle.apply(Provider::Stripe, &s, now()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[test]
    fn default_expiry_uses_plan_period() {
        assert_eq!(default_expiry(PlanType::Monthly, now()), now().add_days(30));
        assert_eq!(default_expiry(PlanType::Annual, now()), now().add_days(365));
        assert!(default_expiry(PlanType::Lifetime, now()).is_after(&now().add_days(365 * 50)));
    }

    #[tokio::test]
    async fn follow_ups_reach_the_task_store() {
        let f = fixture();
        f.lifecycle
            .apply(Provider::Stripe, &signal(SignalKind::Renewed), now())
            .await
            .unwrap();
        let pending = f.tasks.with_status(TaskStatus::Pending).await;
        assert!(pending.iter().any(|t| t.task_type == TaskType::LtvRecompute));
        assert!(pending.iter().any(|t| t.task_type == TaskType::LedgerSync));
    }
}
