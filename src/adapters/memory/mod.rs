//! In-memory implementations of the persistence ports.
//!
//! They enforce the same uniqueness and compare-and-swap rules as the
//! PostgreSQL schema, so application tests exercise the real invariants.

mod dunning;
mod grace_period;
mod subscription;
mod task_store;
mod transaction;
mod webhook_event;
mod winback;

pub use dunning::InMemoryDunningRepository;
pub use grace_period::InMemoryGracePeriodRepository;
pub use subscription::InMemorySubscriptionRepository;
pub use task_store::InMemoryTaskStore;
pub use transaction::InMemoryTransactionRepository;
pub use webhook_event::InMemoryWebhookEventRepository;
pub use winback::InMemoryWinbackRepository;

use std::collections::HashMap;
use std::hash::Hash;

use crate::domain::dunning::Dunning;
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::domain::grace_period::GracePeriod;
use crate::domain::subscription::Subscription;
use crate::domain::winback::WinbackOffer;

/// Entities updated with compare-and-swap on `version`.
pub(crate) trait Versioned: Clone {
    const ENTITY: &'static str;

    fn version_mut(&mut self) -> &mut i32;

    fn version(&self) -> i32;
}

macro_rules! versioned {
    ($ty:ty, $name:literal) => {
        impl Versioned for $ty {
            const ENTITY: &'static str = $name;

            fn version_mut(&mut self) -> &mut i32 {
                &mut self.version
            }

            fn version(&self) -> i32 {
                self.version
            }
        }
    };
}

versioned!(Subscription, "subscription");
versioned!(GracePeriod, "grace_period");
versioned!(Dunning, "dunning");
versioned!(WinbackOffer, "winback_offer");

/// Stores `entity` if the stored copy still has the caller's version.
pub(crate) fn compare_and_swap<K, T>(
    rows: &mut HashMap<K, T>,
    key: &K,
    entity: &mut T,
) -> Result<(), DomainError>
where
    K: Eq + Hash,
    T: Versioned,
{
    let stored = rows.get_mut(key).ok_or_else(|| {
        DomainError::new(ErrorCode::NotFound, format!("{} not found", T::ENTITY))
    })?;
    if stored.version() != entity.version() {
        return Err(DomainError::conflict(T::ENTITY));
    }
    *entity.version_mut() += 1;
    *stored = entity.clone();
    Ok(())
}
