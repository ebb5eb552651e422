//! Subscription domain module.
//!
//! # Module Structure
//!
//! - `aggregate` - Subscription aggregate entity
//! - `status` - SubscriptionStatus state machine
//! - `platform` - purchase source and plan type
//! - `transaction` - recorded payments and receipt hashing
//! - `catalog` - product id to plan and price

mod aggregate;
mod catalog;
mod platform;
mod status;
mod transaction;

pub use aggregate::{NewSubscription, Subscription};
pub use catalog::{CatalogEntry, ProductCatalog};
pub use platform::{PlanType, Platform};
pub use status::SubscriptionStatus;
pub use transaction::{ReceiptHash, Transaction};
