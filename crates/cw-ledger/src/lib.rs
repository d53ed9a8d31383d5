//! Cart, wishlist and account state for a client-resident storefront.
//!
//! Every ledger reads and writes the current owner's namespace in a
//! [`cw_storage::LocalStore`] and announces mutations on a shared
//! [`sync::ChangeNotifier`]. [`storefront::Storefront`] wires them together
//! with the backend for signed-in users.

pub mod addresses;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod orders;
pub mod pricing;
pub mod reconcile;
pub mod storefront;
pub mod sync;
pub mod wishlist;

#[cfg(test)]
pub(crate) mod testing;

pub use addresses::{AddressBook, AddressError};
pub use cart::{CartLedger, CouponError};
pub use catalog::{Category, normalize_category};
pub use checkout::{CheckoutError, PaymentCard, ShippingDetails};
pub use config::LedgerConfig;
pub use orders::{OrderBook, OrderError};
pub use pricing::{CartTotals, PricingPolicy, StandardPricing};
pub use reconcile::{IdentityReconciler, MergeReport};
pub use storefront::Storefront;
pub use sync::{AccountCounters, ChangeNotifier, LedgerEvent, Synchronizer};
pub use wishlist::WishlistLedger;
