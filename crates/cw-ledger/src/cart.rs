use crate::config::LedgerConfig;
use crate::pricing::{self, CartTotals, PricingPolicy};
use crate::sync::{ChangeNotifier, LedgerEvent};
use cw_api_types::{CartLine, CartMeta, CartMetaPatch, CouponCode, ProductId, ShippingMode};
use cw_identity::{IdentityResolver, OwnerId};
use cw_storage::LocalStore;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CouponError {
    #[error("coupon code is empty")]
    Empty,
    #[error("unknown coupon code `{0}`")]
    Unknown(String),
}

/// Fold `incoming` into `lines`: an existing line for the same product gains
/// the incoming quantity, otherwise the line is appended.
pub fn fold_line(lines: &mut Vec<CartLine>, incoming: CartLine) {
    match lines.iter_mut().find(|line| line.id == incoming.id) {
        Some(existing) => existing.quantity = existing.quantity.saturating_add(incoming.quantity),
        None => lines.push(incoming),
    }
}

/// Normalize lines read from storage or a backend.
pub fn normalize_lines(lines: impl IntoIterator<Item = CartLine>) -> Vec<CartLine> {
    let mut folded = Vec::new();
    for line in lines {
        fold_line(&mut folded, line.normalized());
    }
    folded
}

/// The current owner's cart lines and cart meta.
pub struct CartLedger {
    store: Arc<LocalStore>,
    identity: Arc<IdentityResolver>,
    notifier: ChangeNotifier,
    pricing: Arc<dyn PricingPolicy>,
    cart_prefix: String,
    meta_prefix: String,
    default_meta: CartMeta,
}

impl CartLedger {
    pub fn new(
        store: Arc<LocalStore>,
        identity: Arc<IdentityResolver>,
        notifier: ChangeNotifier,
        pricing: Arc<dyn PricingPolicy>,
        config: &LedgerConfig,
    ) -> Self {
        Self {
            store,
            identity,
            notifier,
            pricing,
            cart_prefix: config.cart_prefix(),
            meta_prefix: config.cart_meta_prefix(),
            default_meta: config.default_meta(),
        }
    }

    pub fn items(&self) -> Vec<CartLine> {
        self.items_of(&self.identity.current_owner_id())
    }

    pub fn items_of(&self, owner: &OwnerId) -> Vec<CartLine> {
        let key = owner.namespaced(&self.cart_prefix);
        let raw: Vec<serde_json::Value> = self.store.read_or_default(&key);
        let lines = raw.into_iter().filter_map(|value| {
            serde_json::from_value::<CartLine>(value)
                .map_err(|err| warn!(key = %key, error = %err, "dropping unreadable cart line"))
                .ok()
        });
        normalize_lines(lines)
    }

    pub fn add_item(&self, line: CartLine) -> Vec<CartLine> {
        let owner = self.identity.current_owner_id();
        let mut lines = self.items_of(&owner);
        fold_line(&mut lines, line.normalized());
        self.save(&owner, &lines);
        lines
    }

    /// A quantity of zero or less removes the line.
    pub fn set_quantity(&self, id: &ProductId, quantity: i64) -> Vec<CartLine> {
        if quantity <= 0 {
            return self.remove_item(id);
        }

        let owner = self.identity.current_owner_id();
        let mut lines = self.items_of(&owner);
        if let Some(line) = lines.iter_mut().find(|line| line.id == *id) {
            line.quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        } else {
            debug!(product_id = %id, "quantity change for product not in cart");
        }
        self.save(&owner, &lines);
        lines
    }

    pub fn remove_item(&self, id: &ProductId) -> Vec<CartLine> {
        let owner = self.identity.current_owner_id();
        let mut lines = self.items_of(&owner);
        lines.retain(|line| line.id != *id);
        self.save(&owner, &lines);
        lines
    }

    pub fn clear(&self) {
        let owner = self.identity.current_owner_id();
        self.save(&owner, &[]);
    }

    /// Overwrite an owner's lines with an authoritative list.
    pub fn replace_items(&self, owner: &OwnerId, lines: Vec<CartLine>) -> Vec<CartLine> {
        let lines = normalize_lines(lines);
        self.save(owner, &lines);
        lines
    }

    /// Delete an owner's cart and cart meta entirely.
    pub fn discard(&self, owner: &OwnerId) {
        self.store.remove(&owner.namespaced(&self.cart_prefix));
        self.store.remove(&owner.namespaced(&self.meta_prefix));
        self.notifier.notify(LedgerEvent::CartChanged);
    }

    pub fn meta(&self) -> CartMeta {
        self.meta_of(&self.identity.current_owner_id())
    }

    pub fn meta_of(&self, owner: &OwnerId) -> CartMeta {
        let stored: CartMetaPatch = self
            .store
            .read_or_default(&owner.namespaced(&self.meta_prefix));
        self.default_meta.clone().with_patch(stored)
    }

    pub fn set_meta(&self, patch: CartMetaPatch) -> CartMeta {
        let owner = self.identity.current_owner_id();
        let meta = self.meta_of(&owner).with_patch(patch);
        self.store.write(
            &owner.namespaced(&self.meta_prefix),
            &CartMetaPatch::from(&meta),
        );
        self.notifier.notify(LedgerEvent::CartChanged);
        meta
    }

    pub fn apply_coupon(&self, code: &str) -> Result<CouponCode, CouponError> {
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return Err(CouponError::Empty);
        }
        let coupon = CouponCode::parse(trimmed).ok_or_else(|| CouponError::Unknown(trimmed.to_owned()))?;
        self.set_meta(CartMetaPatch {
            coupon_code: Some(coupon.as_str().to_owned()),
            ..CartMetaPatch::default()
        });
        Ok(coupon)
    }

    pub fn clear_coupon(&self) -> CartMeta {
        self.set_meta(CartMetaPatch {
            coupon_code: Some(String::new()),
            ..CartMetaPatch::default()
        })
    }

    /// Sum of quantities, as shown on the header badge.
    pub fn item_count(&self) -> u32 {
        pricing::item_count(&self.items())
    }

    pub fn totals(&self, mode: ShippingMode) -> CartTotals {
        let owner = self.identity.current_owner_id();
        pricing::quote(
            self.pricing.as_ref(),
            &self.items_of(&owner),
            &self.meta_of(&owner),
            mode,
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.notifier.subscribe()
    }

    fn save(&self, owner: &OwnerId, lines: &[CartLine]) {
        self.store.write(&owner.namespaced(&self.cart_prefix), lines);
        self.notifier.notify(LedgerEvent::CartChanged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use cw_storage::KeyedStore;
    use rust_decimal::Decimal;

    fn line(id: &str, price: i64, quantity: u32) -> CartLine {
        CartLine::new(id, format!("Product {id}"), Decimal::from(price), quantity)
    }

    #[test]
    fn repeated_add_sums_quantities() {
        let harness = Harness::new();
        let cart = harness.cart();

        cart.add_item(line("p1", 10, 1));
        cart.add_item(line("p2", 5, 1));
        let lines = cart.add_item(line("p1", 10, 2));

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].id, ProductId::from("p1"));
        assert_eq!(lines[0].quantity, 3);
        assert_eq!(cart.item_count(), 4);
    }

    #[test]
    fn item_count_saturates_on_huge_quantities() {
        let harness = Harness::new();
        let cart = harness.cart();
        cart.add_item(line("p1", 1, 1));
        cart.set_quantity(&ProductId::from("p1"), i64::MAX);
        cart.add_item(line("p2", 1, 3));

        assert_eq!(cart.items()[0].quantity, u32::MAX);
        assert_eq!(cart.item_count(), u32::MAX);
        assert_eq!(cart.totals(ShippingMode::Standard).item_count, u32::MAX);
    }

    #[test]
    fn remove_is_idempotent() {
        let harness = Harness::new();
        let cart = harness.cart();
        cart.add_item(line("p1", 10, 1));
        cart.add_item(line("p2", 10, 1));

        let once = cart.remove_item(&ProductId::from("p1"));
        let twice = cart.remove_item(&ProductId::from("p1"));

        assert_eq!(once, twice);
        assert_eq!(twice.len(), 1);
    }

    #[test]
    fn non_positive_quantity_removes_line() {
        let harness = Harness::new();
        let cart = harness.cart();
        cart.add_item(line("p1", 10, 4));

        let lines = cart.set_quantity(&ProductId::from("p1"), 2);
        assert_eq!(lines[0].quantity, 2);

        assert!(cart.set_quantity(&ProductId::from("p1"), 0).is_empty());
        assert!(cart.set_quantity(&ProductId::from("ghost"), 3).is_empty());
    }

    #[test]
    fn carts_are_scoped_to_owner() {
        let harness = Harness::new();
        let cart = harness.cart();
        cart.add_item(line("p1", 10, 1));

        harness.sign_in("42");
        assert!(cart.items().is_empty());
        cart.add_item(line("p9", 1, 1));

        harness.sign_out();
        assert_eq!(cart.items()[0].id, ProductId::from("p1"));
    }

    #[test]
    fn legacy_lines_are_normalized_and_folded() -> anyhow::Result<()> {
        let harness = Harness::new();
        let cart = harness.cart();
        let key = harness.identity.current_owner_id().namespaced("app.cart.");
        harness.durable_backend.set_raw(
            &key,
            r#"[{"id":1,"title":"Mug","price":-3,"quantity":0},
                {"id":"1","name":"Mug","price":4,"quantity":2},
                {"broken":true}]"#,
        )?;

        let lines = cart.items();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 3);
        assert_eq!(lines[0].unit_price, Decimal::ZERO);
        Ok(())
    }

    #[test]
    fn coupons_are_whitelisted() {
        let harness = Harness::new();
        let cart = harness.cart();

        assert_eq!(cart.apply_coupon(" sale10"), Ok(CouponCode::Sale10));
        assert_eq!(cart.meta().coupon_code, Some(CouponCode::Sale10));
        assert_eq!(
            cart.apply_coupon("WELCOME5"),
            Err(CouponError::Unknown("WELCOME5".to_owned()))
        );
        assert_eq!(cart.meta().coupon_code, Some(CouponCode::Sale10));
        assert_eq!(cart.apply_coupon("  "), Err(CouponError::Empty));

        assert_eq!(cart.clear_coupon().coupon_code, None);
    }

    #[test]
    fn meta_falls_back_field_by_field() -> anyhow::Result<()> {
        let harness = Harness::new();
        let cart = harness.cart();
        let key = harness.identity.current_owner_id().namespaced("app.cartmeta.");
        harness
            .durable_backend
            .set_raw(&key, r#"{"shippingFee":5,"couponCode":"nope"}"#)?;

        let meta = cart.meta();
        assert_eq!(meta.shipping_fee, Decimal::from(5));
        assert_eq!(meta.free_shipping_threshold, Decimal::from(10_000));
        assert_eq!(meta.coupon_code, None);
        Ok(())
    }

    #[test]
    fn totals_use_current_meta() {
        let harness = Harness::new();
        let cart = harness.cart();
        cart.add_item(line("p1", 100, 2));
        cart.apply_coupon("SALE10").ok();

        let totals = cart.totals(ShippingMode::Standard);
        assert_eq!(totals.total, Decimal::from(188));
    }

    #[test]
    fn mutations_notify_subscribers() {
        let harness = Harness::new();
        let cart = harness.cart();
        let mut events = cart.subscribe();

        cart.add_item(line("p1", 1, 1));
        cart.clear();

        assert_eq!(events.try_recv().ok(), Some(LedgerEvent::CartChanged));
        assert_eq!(events.try_recv().ok(), Some(LedgerEvent::CartChanged));
        assert!(harness.cart().items().is_empty());
    }
}
