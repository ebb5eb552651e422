//! ProcessReceiptHandler - client-submitted store receipts.

use std::sync::Arc;

use crate::application::handlers::grace::ResolveGracePeriodHandler;
use crate::application::handlers::jobs::TaskEnqueuer;
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::domain::subscription::{
    CatalogEntry, NewSubscription, Platform, ProductCatalog, ReceiptHash, Subscription,
    SubscriptionStatus, Transaction,
};
use crate::ports::{
    ReceiptError, ReceiptRequest, ReceiptVerifier, SaveResult, SubscriptionRepository,
    TransactionRepository, VerifiedReceipt,
};

use super::lifecycle::{default_expiry, enqueue_payment_follow_ups};

#[derive(Debug, Clone)]
pub struct ProcessReceiptCommand {
    pub user_id: UserId,
    pub platform: Platform,
    pub receipt: String,
    pub product_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProcessReceiptResult {
    pub subscription: Subscription,
    /// True when the receipt had already been processed.
    pub duplicate: bool,
}

pub struct ProcessReceiptHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    transactions: Arc<dyn TransactionRepository>,
    verifier: Arc<dyn ReceiptVerifier>,
    resolve_grace: ResolveGracePeriodHandler,
    enqueuer: TaskEnqueuer,
    catalog: ProductCatalog,
}

impl ProcessReceiptHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        transactions: Arc<dyn TransactionRepository>,
        verifier: Arc<dyn ReceiptVerifier>,
        resolve_grace: ResolveGracePeriodHandler,
        enqueuer: TaskEnqueuer,
        catalog: ProductCatalog,
    ) -> Self {
        Self {
            subscriptions,
            transactions,
            verifier,
            resolve_grace,
            enqueuer,
            catalog,
        }
    }

    pub async fn handle(
        &self,
        cmd: ProcessReceiptCommand,
        now: Timestamp,
    ) -> Result<ProcessReceiptResult, DomainError> {
        let receipt_hash = ReceiptHash::of(&cmd.receipt)?;

        // 1. Fast path: a receipt we already recorded changes nothing.
        if let Some(existing) = self.transactions.find_by_receipt_hash(&receipt_hash).await? {
            return self.duplicate(&cmd.user_id, &existing).await;
        }

        // 2. Ask the store
        let verified = self
            .verifier
            .verify(&ReceiptRequest {
                platform: cmd.platform,
                receipt: cmd.receipt.clone(),
                product_id: cmd.product_id.clone(),
            })
            .await
            .map_err(|e| match e {
                ReceiptError::Rejected(reason) => {
                    tracing::info!(user_id = %cmd.user_id, platform = %cmd.platform, reason = %reason, "Receipt rejected");
                    DomainError::validation("receipt", "receipt rejected by store")
                }
                ReceiptError::Unavailable(reason) => {
                    tracing::warn!(platform = %cmd.platform, reason = %reason, "Receipt verifier unavailable");
                    DomainError::new(ErrorCode::ExternalUnavailable, "receipt verification unavailable")
                }
            })?;

        let entry = self.catalog.get(&verified.product_id).cloned().ok_or_else(|| {
            DomainError::validation("product_id", "unknown product")
                .with_detail("product_id", verified.product_id.clone())
        })?;
        let expires_at = verified
            .expires_at
            .unwrap_or_else(|| default_expiry(entry.plan_type, now));

        // 3. Upsert the subscription, expiry only moves forward
        let subscription = self
            .upsert(&cmd, &verified, &entry, expires_at, now)
            .await?;

        // 4. Record the payment; the unique hash settles concurrent submissions
        let transaction = Transaction::record(
            cmd.user_id.clone(),
            subscription.id,
            verified.amount_cents.unwrap_or(entry.price_cents),
            verified.currency.as_deref().unwrap_or(&entry.currency),
            receipt_hash,
            verified.transaction_id.clone(),
            cmd.platform,
            now,
        )?;
        let duplicate = match self.transactions.insert(&transaction).await? {
            SaveResult::Inserted => {
                enqueue_payment_follow_ups(&self.enqueuer, &transaction, now).await;
                false
            }
            SaveResult::AlreadyExists => true,
        };

        tracing::info!(
            user_id = %cmd.user_id,
            subscription_id = %subscription.id,
            platform = %cmd.platform,
            duplicate,
            "Receipt processed"
        );
        Ok(ProcessReceiptResult {
            subscription,
            duplicate,
        })
    }

    async fn duplicate(
        &self,
        user_id: &UserId,
        existing: &Transaction,
    ) -> Result<ProcessReceiptResult, DomainError> {
        if &existing.user_id != user_id {
            tracing::warn!(user_id = %user_id, "Receipt already claimed by another user");
            return Err(DomainError::new(
                ErrorCode::Forbidden,
                "receipt belongs to another account",
            ));
        }
        let subscription = match self.subscriptions.find_current_for_user(user_id).await? {
            Some(current) => current,
            None => self
                .subscriptions
                .find_by_id(&existing.subscription_id)
                .await?
                .ok_or_else(|| {
                    DomainError::new(ErrorCode::SubscriptionNotFound, "subscription not found")
                })?,
        };
        tracing::debug!(user_id = %user_id, "Duplicate receipt, returning current state");
        Ok(ProcessReceiptResult {
            subscription,
            duplicate: true,
        })
    }

    async fn upsert(
        &self,
        cmd: &ProcessReceiptCommand,
        verified: &VerifiedReceipt,
        entry: &CatalogEntry,
        expires_at: Timestamp,
        now: Timestamp,
    ) -> Result<Subscription, DomainError> {
        if let Some(current) = self.subscriptions.find_current_for_user(&cmd.user_id).await? {
            return self.extend(current, expires_at, now).await;
        }

        let subscription = Subscription::activate(
            NewSubscription {
                user_id: cmd.user_id.clone(),
                plan_type: entry.plan_type,
                source: cmd.platform,
                product_id: verified.product_id.clone(),
                provider_subscription_id: Some(
                    verified
                        .provider_subscription_id
                        .clone()
                        .unwrap_or_else(|| verified.transaction_id.clone()),
                ),
                expires_at,
                auto_renew: verified.is_renewable,
            },
            now,
        );
        match self.subscriptions.insert(&subscription).await {
            Ok(()) => Ok(subscription),
            Err(e) if e.code == ErrorCode::DuplicateEntity => {
                // A concurrent receipt or webhook opened one first.
                let current = self
                    .subscriptions
                    .find_current_for_user(&cmd.user_id)
                    .await?
                    .ok_or_else(|| DomainError::conflict("subscription"))?;
                self.extend(current, expires_at, now).await
            }
            Err(e) => Err(e),
        }
    }

    async fn extend(
        &self,
        mut current: Subscription,
        expires_at: Timestamp,
        now: Timestamp,
    ) -> Result<Subscription, DomainError> {
        if current.status == SubscriptionStatus::Grace {
            return Ok(self
                .resolve_grace
                .resolve_for_subscription(&current.id, Some(expires_at), now)
                .await?
                .subscription);
        }
        if current.renew(expires_at, now)? {
            self.subscriptions.update(&mut current).await?;
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::adapters::memory::{
        InMemoryDunningRepository, InMemoryGracePeriodRepository, InMemorySubscriptionRepository,
        InMemoryTaskStore, InMemoryTransactionRepository,
    };
    use crate::domain::subscription::PlanType;

    /// Verifier double returning a scripted answer and counting calls.
    struct ScriptedVerifier {
        answer: Mutex<Result<VerifiedReceipt, ReceiptError>>,
        calls: AtomicUsize,
    }

    impl ScriptedVerifier {
        fn valid(expires_at: Timestamp) -> Self {
            Self {
                answer: Mutex::new(Ok(VerifiedReceipt {
                    valid: true,
                    transaction_id: "1000000001".to_string(),
                    product_id: "premium_monthly".to_string(),
                    expires_at: Some(expires_at),
                    is_renewable: true,
                    provider_subscription_id: Some("1000000000".to_string()),
                    amount_cents: None,
                    currency: None,
                })),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(err: ReceiptError) -> Self {
            Self {
                answer: Mutex::new(Err(err)),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ReceiptVerifier for ScriptedVerifier {
        async fn verify(&self, _: &ReceiptRequest) -> Result<VerifiedReceipt, ReceiptError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.lock().unwrap().clone()
        }
    }

    struct Fixture {
        subscriptions: Arc<InMemorySubscriptionRepository>,
        transactions: Arc<InMemoryTransactionRepository>,
        verifier: Arc<ScriptedVerifier>,
        handler: ProcessReceiptHandler,
    }

    fn fixture(verifier: ScriptedVerifier) -> Fixture {
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let transactions = Arc::new(InMemoryTransactionRepository::new());
        let verifier = Arc::new(verifier);
        let resolve = ResolveGracePeriodHandler::new(
            subscriptions.clone(),
            Arc::new(InMemoryGracePeriodRepository::new()),
            Arc::new(InMemoryDunningRepository::new()),
        );
        let handler = ProcessReceiptHandler::new(
            subscriptions.clone(),
            transactions.clone(),
            verifier.clone(),
            resolve,
            TaskEnqueuer::new(Arc::new(InMemoryTaskStore::new()), 5),
            ProductCatalog::new().with(
                "premium_monthly",
                CatalogEntry {
                    plan_type: PlanType::Monthly,
                    price_cents: 999,
                    currency: "USD".to_string(),
                },
            ),
        );
        Fixture {
            subscriptions,
            transactions,
            verifier,
            handler,
        }
    }

    fn now() -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000)
    }

    fn cmd(user: &str, receipt: &str) -> ProcessReceiptCommand {
        ProcessReceiptCommand {
            user_id: UserId::new(user).unwrap(),
            platform: Platform::Ios,
            receipt: receipt.to_string(),
            product_id: Some("premium_monthly".to_string()),
        }
    }

    #[tokio::test]
    async fn new_receipt_opens_subscription_with_catalog_price() {
        let f = fixture(ScriptedVerifier::valid(now().add_days(30)));

        let result = f.handler.handle(cmd("user-1", "receipt-A"), now()).await.unwrap();

        assert!(!result.duplicate);
        assert_eq!(result.subscription.status, SubscriptionStatus::Active);
        assert_eq!(result.subscription.plan_type, PlanType::Monthly);
        assert_eq!(result.subscription.source, Platform::Ios);
        assert_eq!(
            result.subscription.provider_subscription_id.as_deref(),
            Some("1000000000")
        );
        let user = UserId::new("user-1").unwrap();
        assert_eq!(f.transactions.total_for_user(&user).await.unwrap(), 999);
    }

    #[tokio::test]
    async fn duplicate_receipt_skips_verification_and_returns_current_state() {
        let f = fixture(ScriptedVerifier::valid(now().add_days(30)));
        let first = f.handler.handle(cmd("user-1", "receipt-A"), now()).await.unwrap();

        let second = f.handler.handle(cmd("user-1", "receipt-A"), now()).await.unwrap();

        assert!(second.duplicate);
        assert_eq!(second.subscription, first.subscription);
        assert_eq!(f.verifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.transactions.len().await, 1);
    }

    #[tokio::test]
    async fn duplicate_receipt_after_cancellation_returns_the_cancelled_subscription() {
        let f = fixture(ScriptedVerifier::valid(now().add_days(30)));
        let first = f.handler.handle(cmd("user-1", "receipt-A"), now()).await.unwrap();
        let mut sub = first.subscription.clone();
        assert!(sub.cancel(now().add_days(1)).unwrap());
        f.subscriptions.update(&mut sub).await.unwrap();

        let again = f
            .handler
            .handle(cmd("user-1", "receipt-A"), now().add_days(2))
            .await
            .unwrap();

        assert!(again.duplicate);
        assert_eq!(again.subscription.id, first.subscription.id);
        assert_eq!(again.subscription.status, SubscriptionStatus::Cancelled);
        assert_eq!(f.verifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.transactions.len().await, 1);
    }

    #[tokio::test]
    async fn whitespace_variants_hash_the_same() {
        let f = fixture(ScriptedVerifier::valid(now().add_days(30)));
        f.handler.handle(cmd("user-1", "receipt-A"), now()).await.unwrap();

        let again = f.handler.handle(cmd("user-1", "  receipt-A\n"), now()).await.unwrap();
        assert!(again.duplicate);
    }

    #[tokio::test]
    async fn receipt_claimed_by_another_user_is_forbidden() {
        let f = fixture(ScriptedVerifier::valid(now().add_days(30)));
        f.handler.handle(cmd("user-1", "receipt-A"), now()).await.unwrap();

        let err = f.handler.handle(cmd("user-2", "receipt-A"), now()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn second_receipt_extends_existing_subscription() {
        let f = fixture(ScriptedVerifier::valid(now().add_days(30)));
        let first = f.handler.handle(cmd("user-1", "receipt-A"), now()).await.unwrap();

        *f.verifier.answer.lock().unwrap() = ScriptedVerifier::valid(now().add_days(60))
            .answer
            .into_inner()
            .unwrap();
        let second = f.handler.handle(cmd("user-1", "receipt-B"), now()).await.unwrap();

        assert_eq!(second.subscription.id, first.subscription.id);
        assert_eq!(second.subscription.expires_at, now().add_days(60));
    }

    #[tokio::test]
    async fn rejected_receipt_is_a_validation_error() {
        let f = fixture(ScriptedVerifier::failing(ReceiptError::Rejected("21002".into())));
        let err = f.handler.handle(cmd("user-1", "bad"), now()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert!(f.transactions.is_empty().await);
    }

    #[tokio::test]
    async fn verifier_outage_is_unavailable() {
        let f = fixture(ScriptedVerifier::failing(ReceiptError::Unavailable("timeout".into())));
        let err = f.handler.handle(cmd("user-1", "receipt-A"), now()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ExternalUnavailable);
    }

    #[tokio::test]
    async fn blank_receipt_is_rejected_before_verification() {
        let f = fixture(ScriptedVerifier::valid(now().add_days(30)));
        assert!(f.handler.handle(cmd("user-1", "   "), now()).await.is_err());
        assert_eq!(f.verifier.calls.load(Ordering::SeqCst), 0);
    }
}
