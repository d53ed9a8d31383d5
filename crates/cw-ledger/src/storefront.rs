use crate::addresses::{AddressBook, AddressError};
use crate::cart::CartLedger;
use crate::checkout::{CheckoutError, PaymentCard, ShippingDetails};
use crate::config::LedgerConfig;
use crate::orders::{OrderBook, OrderError};
use crate::pricing::{PricingPolicy, StandardPricing};
use crate::reconcile::{IdentityReconciler, MergeReport};
use crate::sync::{AccountCounters, ChangeNotifier, LedgerEvent, Synchronizer};
use crate::wishlist::WishlistLedger;
use cw_api_types::{
    Address, AddressDraft, AddressPayload, CartItemRequest, CartLine, CreateOrderRequest, Order,
    OrderItemPayload, OrderStatus, PaymentMethod, ProductId, ProductRefRequest, Session,
    ShippingMode, UserId, UserSnapshot, WishItem,
};
use cw_backend::StorefrontBackend;
use cw_identity::{IdentityResolver, OwnerId, StoredSession};
use cw_storage::{ForeignChanges, LocalStore};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Everything a storefront page needs, wired over one tab's stores.
///
/// Mutations commit locally first. For signed-in users the backend is then
/// called and, on success, its answer replaces the local state; on failure
/// the local state is kept and the error is logged.
pub struct Storefront {
    config: LedgerConfig,
    durable: Arc<LocalStore>,
    sessions: Arc<StoredSession>,
    identity: Arc<IdentityResolver>,
    backend: Arc<dyn StorefrontBackend>,
    notifier: ChangeNotifier,
    cart: Arc<CartLedger>,
    wishlist: Arc<WishlistLedger>,
    orders: OrderBook,
    addresses: AddressBook,
    reconciler: IdentityReconciler,
    synchronizer: Synchronizer,
}

impl Storefront {
    pub fn new(
        config: LedgerConfig,
        durable: Arc<LocalStore>,
        session_scope: Arc<LocalStore>,
        backend: Arc<dyn StorefrontBackend>,
    ) -> Self {
        let pricing = Arc::new(StandardPricing {
            express_surcharge: config.express_surcharge,
        });
        Self::with_pricing(config, durable, session_scope, backend, pricing)
    }

    pub fn with_pricing(
        config: LedgerConfig,
        durable: Arc<LocalStore>,
        session_scope: Arc<LocalStore>,
        backend: Arc<dyn StorefrontBackend>,
        pricing: Arc<dyn PricingPolicy>,
    ) -> Self {
        let notifier = ChangeNotifier::new(config.event_capacity);
        let sessions = Arc::new(StoredSession::new(durable.clone(), &config.key_prefix));
        let identity = Arc::new(IdentityResolver::new(
            sessions.clone(),
            session_scope,
            &config.key_prefix,
        ));
        let cart = Arc::new(CartLedger::new(
            durable.clone(),
            identity.clone(),
            notifier.clone(),
            pricing,
            &config,
        ));
        let wishlist = Arc::new(WishlistLedger::new(
            durable.clone(),
            identity.clone(),
            notifier.clone(),
            &config,
        ));
        let orders = OrderBook::new(durable.clone(), identity.clone(), notifier.clone(), &config);
        let addresses =
            AddressBook::new(durable.clone(), identity.clone(), notifier.clone(), &config);
        let reconciler = IdentityReconciler::new(
            cart.clone(),
            wishlist.clone(),
            identity.clone(),
            backend.clone(),
        );
        let synchronizer = Synchronizer::new(&config, notifier.clone());

        Self {
            config,
            durable,
            sessions,
            identity,
            backend,
            notifier,
            cart,
            wishlist,
            orders,
            addresses,
            reconciler,
            synchronizer,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn cart(&self) -> &CartLedger {
        &self.cart
    }

    pub fn wishlist(&self) -> &WishlistLedger {
        &self.wishlist
    }

    pub fn orders(&self) -> &OrderBook {
        &self.orders
    }

    pub fn addresses(&self) -> &AddressBook {
        &self.addresses
    }

    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.synchronizer
    }

    pub fn current_user(&self) -> Option<UserSnapshot> {
        self.identity.current_user()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.notifier.subscribe()
    }

    /// Storage changes made by other tabs, for feeding the synchronizer.
    pub fn foreign_changes(&self) -> Option<ForeignChanges> {
        self.durable.foreign_changes()
    }

    pub fn counters(&self) -> AccountCounters {
        AccountCounters {
            cart_items: self.cart.item_count(),
            wishlist: self.wishlist.count(),
            addresses: self.addresses.count(),
            orders: self.orders.count(),
        }
    }

    // ── Cart ──

    pub async fn add_to_cart(&self, line: CartLine) -> Vec<CartLine> {
        let local = self.cart.add_item(line.clone());
        let Some(user_id) = self.signed_in_user() else {
            return local;
        };
        let req = CartItemRequest {
            user_id: user_id.clone(),
            product_id: line.id,
            quantity: line.quantity.max(1),
        };
        let result = self.backend.add_cart_item(req).await;
        self.settle_cart(&user_id, "add_to_cart", result, local)
    }

    pub async fn set_cart_quantity(&self, id: &ProductId, quantity: i64) -> Vec<CartLine> {
        let local = self.cart.set_quantity(id, quantity);
        let Some(user_id) = self.signed_in_user() else {
            return local;
        };
        let result = if quantity <= 0 {
            self.backend
                .remove_cart_item(ProductRefRequest {
                    user_id: user_id.clone(),
                    product_id: id.clone(),
                })
                .await
        } else {
            self.backend
                .update_cart_item(CartItemRequest {
                    user_id: user_id.clone(),
                    product_id: id.clone(),
                    quantity: u32::try_from(quantity).unwrap_or(u32::MAX),
                })
                .await
        };
        self.settle_cart(&user_id, "set_cart_quantity", result, local)
    }

    pub async fn remove_from_cart(&self, id: &ProductId) -> Vec<CartLine> {
        let local = self.cart.remove_item(id);
        let Some(user_id) = self.signed_in_user() else {
            return local;
        };
        let result = self
            .backend
            .remove_cart_item(ProductRefRequest {
                user_id: user_id.clone(),
                product_id: id.clone(),
            })
            .await;
        self.settle_cart(&user_id, "remove_from_cart", result, local)
    }

    pub async fn clear_cart(&self) {
        self.cart.clear();
        let Some(user_id) = self.signed_in_user() else {
            return;
        };
        if let Err(err) = self.backend.clear_cart(&user_id).await {
            warn!(user_id = %user_id, error = %err, "clear_cart failed, keeping local state");
        }
    }

    /// Guests get their local cart back unchanged.
    pub async fn sync_cart_from_server(&self) -> Vec<CartLine> {
        let Some(user_id) = self.signed_in_user() else {
            return self.cart.items();
        };
        let local = self.cart.items_of(&OwnerId::user(&user_id));
        let result = self.backend.fetch_cart(&user_id).await;
        self.settle_cart(&user_id, "sync_cart_from_server", result, local)
    }

    // ── Wishlist ──

    pub async fn toggle_favorite(&self, item: WishItem) -> bool {
        let product_id = item.id.clone();
        let now_favorite = self.wishlist.toggle(item);
        if let Some(user_id) = self.signed_in_user() {
            let req = ProductRefRequest {
                user_id,
                product_id,
            };
            let result = if now_favorite {
                self.backend.add_favorite(req).await
            } else {
                self.backend.remove_favorite(req).await
            };
            if let Err(err) = result {
                warn!(error = %err, "toggle_favorite failed, keeping local state");
            }
        }
        now_favorite
    }

    pub async fn remove_favorite(&self, id: &ProductId) -> bool {
        let removed = self.wishlist.remove(id);
        if let Some(user_id) = self.signed_in_user() {
            let req = ProductRefRequest {
                user_id,
                product_id: id.clone(),
            };
            if let Err(err) = self.backend.remove_favorite(req).await {
                warn!(error = %err, "remove_favorite failed, keeping local state");
            }
        }
        removed
    }

    pub async fn clear_favorites(&self) {
        self.wishlist.clear();
        if let Some(user_id) = self.signed_in_user() {
            if let Err(err) = self.backend.clear_wishlist(&user_id).await {
                warn!(error = %err, "clear_favorites failed, keeping local state");
            }
        }
    }

    pub async fn sync_wishlist_from_server(&self) -> Vec<WishItem> {
        let Some(user_id) = self.signed_in_user() else {
            return self.wishlist.list();
        };
        let owner = OwnerId::user(&user_id);
        match self.backend.fetch_wishlist(&user_id).await {
            Ok(items) => self.wishlist.replace(&owner, items),
            Err(err) => {
                warn!(error = %err, "sync_wishlist_from_server failed, keeping local state");
                self.wishlist.list_of(&owner)
            }
        }
    }

    // ── Identity ──

    /// Persist the session, merge guest state, then pull the account's
    /// cart and wishlist. The pull is skipped when a merge push failed so
    /// the backend cannot overwrite lines it never received.
    pub async fn sign_in(&self, session: Session) -> MergeReport {
        let user_id = session.user.id.clone();
        self.sessions.sign_in(&session);
        self.notifier.notify(LedgerEvent::AuthChanged);

        let report = self.reconciler.merge_guest_into(&user_id).await;
        if report.pushes_failed == 0 {
            self.sync_cart_from_server().await;
            self.sync_wishlist_from_server().await;
        } else {
            warn!(
                failed = report.pushes_failed,
                "skipping server pull after incomplete merge"
            );
        }
        info!(user_id = %user_id, "signed in");
        report
    }

    pub fn sign_out(&self) {
        if let Some(user) = self.current_user() {
            self.reconciler.discard_user_state(&user.id);
            info!(user_id = %user.id, "signed out");
        }
        self.sessions.sign_out();
        self.notifier.notify(LedgerEvent::AuthChanged);
    }

    // ── Orders ──

    pub async fn checkout(
        &self,
        details: &ShippingDetails,
        card: &PaymentCard,
        mode: ShippingMode,
    ) -> Result<Order, CheckoutError> {
        let lines = self.cart.items();
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        details.validate()?;
        card.validate()?;

        let totals = self.cart.totals(mode);
        let meta = self.cart.meta();
        let user_id = self.signed_in_user();
        let owner = self.identity.current_owner_id();

        info!(card = %card.masked(), total = %totals.total, "payment simulated");
        let local = self.orders.place(&lines, &totals, user_id.clone());

        let mut order = local.clone();
        if let Some(user_id) = &user_id {
            let req = CreateOrderRequest {
                user_id: Some(user_id.clone()),
                items: lines
                    .iter()
                    .map(|line| OrderItemPayload {
                        product_id: line.id.clone(),
                        quantity: line.quantity,
                    })
                    .collect(),
                coupon_code: meta.coupon_code.map(|code| code.as_str().to_owned()),
                shipping_address: details.to_payload(),
                payment_method: PaymentMethod::Card,
            };
            match self.backend.create_order(req).await {
                Ok(remote) => {
                    order = Order {
                        user_id: remote.user_id.clone().or_else(|| Some(user_id.clone())),
                        ..remote
                    };
                    self.orders.replace_order(&owner, &local.id, order.clone());
                }
                Err(err) => warn!(error = %err, "create_order failed, keeping local order"),
            }
        }

        self.clear_cart().await;
        self.cart.clear_coupon();
        Ok(order)
    }

    pub async fn update_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<Order, OrderError> {
        let local = self.orders.update_status(order_id, status)?;
        let Some(user_id) = self.signed_in_user() else {
            return Ok(local);
        };
        match self.backend.update_order_status(order_id, status).await {
            Ok(remote) => {
                let order = Order {
                    user_id: remote.user_id.clone().or(local.user_id.clone()),
                    items: if remote.items.is_empty() {
                        local.items.clone()
                    } else {
                        remote.items.clone()
                    },
                    ..remote
                };
                self.orders
                    .replace_order(&OwnerId::user(&user_id), order_id, order.clone());
                Ok(order)
            }
            Err(err) => {
                warn!(error = %err, "update_order_status failed, keeping local state");
                Ok(local)
            }
        }
    }

    // ── Addresses ──

    pub async fn sync_addresses_from_server(&self) -> Vec<Address> {
        let Some(user_id) = self.signed_in_user() else {
            return self.addresses.list();
        };
        let owner = OwnerId::user(&user_id);
        match self.backend.list_addresses(&user_id).await {
            Ok(addresses) => self.addresses.replace(&owner, addresses),
            Err(err) => {
                warn!(error = %err, "sync_addresses_from_server failed, keeping local state");
                self.addresses.list_of(&owner)
            }
        }
    }

    /// Guests keep the locally assigned id. Signed-in users get the
    /// backend's copy, id included.
    pub async fn add_address(&self, draft: AddressDraft) -> Result<Address, AddressError> {
        let local = self.addresses.add(draft.clone())?;
        let Some(user_id) = self.signed_in_user() else {
            return Ok(local);
        };
        let payload = AddressPayload::from_draft(Some(user_id.clone()), &AddressDraft {
            is_default: local.is_default,
            ..draft
        });
        match self.backend.create_address(payload).await {
            Ok(remote) => Ok(self.addresses.adopt(&OwnerId::user(&user_id), &local.id, remote)),
            Err(err) => {
                warn!(error = %err, "create_address failed, keeping local state");
                Ok(local)
            }
        }
    }

    pub async fn update_address(
        &self,
        address_id: &str,
        draft: AddressDraft,
    ) -> Result<Address, AddressError> {
        let local = self.addresses.update(address_id, draft.clone())?;
        let Some(user_id) = self.signed_in_user() else {
            return Ok(local);
        };
        let payload = AddressPayload::from_draft(Some(user_id.clone()), &draft);
        match self.backend.update_address(address_id, payload).await {
            Ok(remote) => Ok(self.addresses.adopt(&OwnerId::user(&user_id), address_id, remote)),
            Err(err) => {
                warn!(error = %err, "update_address failed, keeping local state");
                Ok(local)
            }
        }
    }

    pub async fn remove_address(&self, address_id: &str) -> bool {
        let removed = self.addresses.remove(address_id);
        if !removed {
            return false;
        }
        if self.signed_in_user().is_some() {
            if let Err(err) = self.backend.delete_address(address_id).await {
                warn!(error = %err, "delete_address failed, keeping local state");
            }
        }
        true
    }

    pub async fn set_default_address(&self, address_id: &str) -> Result<Address, AddressError> {
        let local = self.addresses.set_default(address_id)?;
        let Some(user_id) = self.signed_in_user() else {
            return Ok(local);
        };
        match self.backend.set_default_address(address_id).await {
            Ok(remote) => Ok(self.addresses.adopt(&OwnerId::user(&user_id), address_id, remote)),
            Err(err) => {
                warn!(error = %err, "set_default_address failed, keeping local state");
                Ok(local)
            }
        }
    }

    /// Replace the signed-in owner's order history with the backend's.
    pub async fn sync_orders_from_server(&self) -> Vec<Order> {
        let Some(user_id) = self.signed_in_user() else {
            return self.orders.list();
        };
        let owner = OwnerId::user(&user_id);
        match self.backend.list_orders(&user_id).await {
            Ok(orders) => self.orders.replace(&owner, orders),
            Err(err) => {
                warn!(error = %err, "sync_orders_from_server failed, keeping local state");
                self.orders.list_of(&owner)
            }
        }
    }

    fn signed_in_user(&self) -> Option<UserId> {
        self.identity.current_user().map(|user| user.id)
    }

    fn settle_cart(
        &self,
        user_id: &UserId,
        op: &str,
        result: anyhow::Result<Vec<CartLine>>,
        local: Vec<CartLine>,
    ) -> Vec<CartLine> {
        match result {
            Ok(lines) => self.cart.replace_items(&OwnerId::user(user_id), lines),
            Err(err) => {
                warn!(op, error = %err, "backend call failed, keeping local state");
                local
            }
        }
    }
}
