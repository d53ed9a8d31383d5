use crate::cart::{CartLedger, fold_line};
use crate::wishlist::WishlistLedger;
use cw_api_types::{CartItemRequest, ProductRefRequest, UserId, WishItem};
use cw_backend::StorefrontBackend;
use cw_identity::{IdentityResolver, OwnerId};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub lines_merged: usize,
    pub favorites_merged: usize,
    pub pushes_attempted: usize,
    pub pushes_failed: usize,
}

/// Moves guest state into a user's namespace on sign-in and drops the
/// user's local cart on sign-out.
pub struct IdentityReconciler {
    cart: Arc<CartLedger>,
    wishlist: Arc<WishlistLedger>,
    identity: Arc<IdentityResolver>,
    backend: Arc<dyn StorefrontBackend>,
}

impl IdentityReconciler {
    pub fn new(
        cart: Arc<CartLedger>,
        wishlist: Arc<WishlistLedger>,
        identity: Arc<IdentityResolver>,
        backend: Arc<dyn StorefrontBackend>,
    ) -> Self {
        Self {
            cart,
            wishlist,
            identity,
            backend,
        }
    }

    /// Local state is merged and the guest namespace deleted before any
    /// backend call; each push then succeeds or fails on its own.
    pub async fn merge_guest_into(&self, user_id: &UserId) -> MergeReport {
        let Some(guest) = self.identity.existing_guest() else {
            return MergeReport::default();
        };
        let user = OwnerId::user(user_id);

        let guest_lines = self.cart.items_of(&guest);
        if !guest_lines.is_empty() {
            let mut merged = self.cart.items_of(&user);
            for line in guest_lines.iter().cloned() {
                fold_line(&mut merged, line);
            }
            self.cart.replace_items(&user, merged);
        }

        let mut favorites = self.wishlist.list_of(&user);
        let new_favorites: Vec<WishItem> = self
            .wishlist
            .list_of(&guest)
            .into_iter()
            .filter(|item| !favorites.iter().any(|existing| existing.id == item.id))
            .collect();
        if !new_favorites.is_empty() {
            favorites.extend(new_favorites.iter().cloned());
            self.wishlist.replace(&user, favorites);
        }

        self.cart.discard(&guest);
        self.wishlist.discard(&guest);
        self.identity.forget_guest();

        let mut report = MergeReport {
            lines_merged: guest_lines.len(),
            favorites_merged: new_favorites.len(),
            ..MergeReport::default()
        };

        for line in &guest_lines {
            report.pushes_attempted += 1;
            let req = CartItemRequest {
                user_id: user_id.clone(),
                product_id: line.id.clone(),
                quantity: line.quantity,
            };
            if let Err(err) = self.backend.add_cart_item(req).await {
                report.pushes_failed += 1;
                warn!(product_id = %line.id, error = %err, "failed to push merged cart line");
            }
        }

        for item in &new_favorites {
            report.pushes_attempted += 1;
            let req = ProductRefRequest {
                user_id: user_id.clone(),
                product_id: item.id.clone(),
            };
            if let Err(err) = self.backend.add_favorite(req).await {
                report.pushes_failed += 1;
                warn!(product_id = %item.id, error = %err, "failed to push merged favorite");
            }
        }

        info!(
            user_id = %user_id,
            lines = report.lines_merged,
            favorites = report.favorites_merged,
            failed = report.pushes_failed,
            "guest state merged"
        );
        report
    }

    /// The backend keeps signed-in carts; the local copy is dropped.
    pub fn discard_user_state(&self, user_id: &UserId) {
        self.cart.discard(&OwnerId::user(user_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, product};
    use anyhow::Context;
    use cw_api_types::{CartLine, ProductId};
    use cw_backend::InMemoryBackend;
    use rust_decimal::Decimal;

    fn line(id: &str, quantity: u32) -> CartLine {
        CartLine::new(id, format!("Product {id}"), Decimal::from(10), quantity)
    }

    struct Setup {
        harness: Harness,
        cart: Arc<CartLedger>,
        wishlist: Arc<WishlistLedger>,
        backend: Arc<InMemoryBackend>,
        reconciler: IdentityReconciler,
    }

    fn setup() -> Setup {
        let harness = Harness::new();
        let cart = Arc::new(harness.cart());
        let wishlist = Arc::new(harness.wishlist());
        let backend = Arc::new(InMemoryBackend::with_products([
            product("p1", 10),
            product("p2", 10),
            product("p3", 10),
        ]));
        let reconciler = IdentityReconciler::new(
            cart.clone(),
            wishlist.clone(),
            harness.identity.clone(),
            backend.clone(),
        );
        Setup {
            harness,
            cart,
            wishlist,
            backend,
            reconciler,
        }
    }

    #[tokio::test]
    async fn guest_cart_folds_into_user_cart() -> anyhow::Result<()> {
        let s = setup();
        let user_id = UserId::from("42");
        let user = OwnerId::user(&user_id);
        s.cart.add_item(line("p1", 2));
        let guest = s.harness.identity.existing_guest().context("guest id")?;
        s.cart.replace_items(&user, vec![line("p1", 1), line("p2", 1)]);

        let report = s.reconciler.merge_guest_into(&user_id).await;

        let merged = s.cart.items_of(&user);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, ProductId::from("p1"));
        assert_eq!(merged[0].quantity, 3);
        assert_eq!(merged[1].quantity, 1);

        assert!(s.cart.items_of(&guest).is_empty());
        assert!(!s.harness.durable.contains(&guest.namespaced("app.cart.")));
        assert_eq!(s.harness.identity.existing_guest(), None);

        assert_eq!(report.lines_merged, 1);
        assert_eq!(report.pushes_attempted, 1);
        assert_eq!(report.pushes_failed, 0);
        assert_eq!(s.backend.calls().await, vec!["POST /cart/add p1".to_owned()]);
        Ok(())
    }

    #[tokio::test]
    async fn failed_pushes_do_not_block_each_other() {
        let s = setup();
        s.cart.add_item(line("p1", 1));
        s.cart.add_item(line("ghost", 1));
        s.cart.add_item(line("p3", 1));

        let report = s.reconciler.merge_guest_into(&UserId::from("42")).await;

        assert_eq!(report.pushes_attempted, 3);
        assert_eq!(report.pushes_failed, 1);
        assert_eq!(s.backend.calls().await.len(), 3);
        assert_eq!(s.cart.items_of(&OwnerId::user(&UserId::from("42"))).len(), 3);
    }

    #[tokio::test]
    async fn guest_favorites_union_into_user_wishlist() {
        let s = setup();
        let user = OwnerId::user(&UserId::from("42"));
        s.wishlist.add(WishItem::new("p1", "One", Decimal::ONE));
        s.wishlist.add(WishItem::new("p2", "Two", Decimal::ONE));
        s.wishlist
            .replace(&user, vec![WishItem::new("p2", "Two", Decimal::ONE)]);

        let report = s.reconciler.merge_guest_into(&UserId::from("42")).await;

        let ids: Vec<String> = s.wishlist.list_of(&user).into_iter().map(|i| i.id.0).collect();
        assert_eq!(ids, vec!["p2", "p1"]);
        assert_eq!(report.favorites_merged, 1);
        assert_eq!(s.backend.calls().await, vec!["POST /wishlist p1".to_owned()]);
    }

    #[tokio::test]
    async fn no_guest_means_nothing_to_merge() {
        let s = setup();
        let report = s.reconciler.merge_guest_into(&UserId::from("42")).await;

        assert_eq!(report, MergeReport::default());
        assert!(s.backend.calls().await.is_empty());
    }

    #[test]
    fn sign_out_discards_user_cart_only() {
        let s = setup();
        let user_id = UserId::from("42");
        s.cart.add_item(line("p1", 1));
        s.cart
            .replace_items(&OwnerId::user(&user_id), vec![line("p2", 1)]);

        s.reconciler.discard_user_state(&user_id);

        assert!(s.cart.items_of(&OwnerId::user(&user_id)).is_empty());
        assert_eq!(s.cart.items().len(), 1);
    }
}
