//! Cartwheel storefront for the browser.
//!
//! Exposes [`CartwheelApp`] to JavaScript. State lives in `localStorage`
//! (carts, wishlists, session) and `sessionStorage` (guest id); signed-in
//! users are mirrored to the storefront API through `fetch`.
//!
//! ```js
//! const app = new CartwheelApp("https://api.shop.test", null);
//! app.onChange((event) => render(event));
//! await app.addToCart({ id: "p1", name: "Lamp", unitPrice: 39.9, quantity: 1 });
//! ```

pub mod fetch;
pub mod storage;

use cw_api_types::{
    AddressDraft, CartLine, OrderStatus, ProductId, Session, ShippingMode, WishItem,
};
use cw_identity::StoredSession;
use cw_ledger::{LedgerConfig, LedgerEvent, PaymentCard, ShippingDetails, Storefront};
use cw_storage::{LocalStore, StorageBus, StorageScope, TabId};
use fetch::FetchBackend;
use js_sys::{Function, Promise};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::rc::Rc;
use std::sync::Arc;
use storage::WebStorage;
use tokio::sync::broadcast::error::RecvError;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};

/// WASM entry point, called automatically when the module is instantiated.
#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(JsValue::from)
}

fn from_js<T: DeserializeOwned>(value: JsValue) -> Result<T, JsValue> {
    serde_wasm_bindgen::from_value(value).map_err(JsValue::from)
}

fn js_err(err: impl Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn shipping_mode(express: bool) -> ShippingMode {
    if express {
        ShippingMode::Express
    } else {
        ShippingMode::Standard
    }
}

fn parse_status(raw: &str) -> Result<OrderStatus, JsValue> {
    OrderStatus::parse(raw).ok_or_else(|| js_err(format!("unknown order status `{raw}`")))
}

#[wasm_bindgen]
pub struct CartwheelApp {
    shop: Rc<Storefront>,
}

#[wasm_bindgen]
impl CartwheelApp {
    /// Wire the storefront over this tab's storage and start listening for
    /// changes made in other tabs.
    #[wasm_bindgen(constructor)]
    pub fn new(api_url: Option<String>, key_prefix: Option<String>) -> Result<CartwheelApp, JsValue> {
        let mut config = LedgerConfig::default();
        if let Some(prefix) = key_prefix.filter(|prefix| !prefix.trim().is_empty()) {
            config.key_prefix = prefix;
        }

        let tab = TabId::new_random();
        let bus = StorageBus::new(config.event_capacity);
        let durable = Arc::new(
            LocalStore::new(Arc::new(WebStorage::local()), StorageScope::Durable, tab.clone())
                .with_bus(bus.clone()),
        );
        let session_scope = cw_identity::session_scope(Arc::new(WebStorage::session()), tab);
        let sessions = Arc::new(StoredSession::new(durable.clone(), &config.key_prefix));
        let backend = FetchBackend::new(api_url, sessions);
        gloo_console::log!("cartwheel: storefront API at", backend.endpoint());

        let shop = Rc::new(Storefront::new(
            config,
            durable,
            session_scope,
            Arc::new(backend),
        ));

        storage::forward_storage_events(bus)?;
        if let Some(changes) = shop.foreign_changes() {
            let shop = shop.clone();
            spawn_local(async move {
                shop.synchronizer().run(changes).await;
                gloo_console::warn!("cartwheel: storage bridge stopped");
            });
        }

        Ok(CartwheelApp { shop })
    }

    /// Call `callback(eventName)` for every ledger event, local or from
    /// another tab. Event names: `cartChanged`, `wishlistChanged`,
    /// `addressesChanged`, `ordersChanged`, `authChanged`.
    #[wasm_bindgen(js_name = onChange)]
    pub fn on_change(&self, callback: Function) {
        let mut events = self.shop.subscribe();
        spawn_local(async move {
            loop {
                let batch = match events.recv().await {
                    Ok(event) => vec![event],
                    Err(RecvError::Lagged(_)) => LedgerEvent::ALL.to_vec(),
                    Err(RecvError::Closed) => break,
                };
                for event in batch {
                    let Ok(name) = to_js(&event) else { continue };
                    if let Err(err) = callback.call1(&JsValue::NULL, &name) {
                        gloo_console::error!("cartwheel: onChange callback threw", err);
                    }
                }
            }
        });
    }

    #[wasm_bindgen(js_name = currentUser)]
    pub fn current_user(&self) -> Result<JsValue, JsValue> {
        to_js(&self.shop.current_user())
    }

    pub fn counters(&self) -> Result<JsValue, JsValue> {
        to_js(&self.shop.counters())
    }

    // ── Cart ──

    pub fn cart(&self) -> Result<JsValue, JsValue> {
        to_js(&self.shop.cart().items())
    }

    #[wasm_bindgen(js_name = cartTotals)]
    pub fn cart_totals(&self, express: bool) -> Result<JsValue, JsValue> {
        to_js(&self.shop.cart().totals(shipping_mode(express)))
    }

    #[wasm_bindgen(js_name = addToCart)]
    pub fn add_to_cart(&self, line: JsValue) -> Result<Promise, JsValue> {
        let line: CartLine = from_js(line)?;
        let shop = self.shop.clone();
        Ok(future_to_promise(async move {
            to_js(&shop.add_to_cart(line).await)
        }))
    }

    #[wasm_bindgen(js_name = setCartQuantity)]
    pub fn set_cart_quantity(&self, id: String, quantity: i32) -> Promise {
        let shop = self.shop.clone();
        future_to_promise(async move {
            let lines = shop
                .set_cart_quantity(&ProductId::from(id.as_str()), i64::from(quantity))
                .await;
            to_js(&lines)
        })
    }

    #[wasm_bindgen(js_name = removeFromCart)]
    pub fn remove_from_cart(&self, id: String) -> Promise {
        let shop = self.shop.clone();
        future_to_promise(async move {
            to_js(&shop.remove_from_cart(&ProductId::from(id.as_str())).await)
        })
    }

    #[wasm_bindgen(js_name = clearCart)]
    pub fn clear_cart(&self) -> Promise {
        let shop = self.shop.clone();
        future_to_promise(async move {
            shop.clear_cart().await;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = syncCart)]
    pub fn sync_cart(&self) -> Promise {
        let shop = self.shop.clone();
        future_to_promise(async move { to_js(&shop.sync_cart_from_server().await) })
    }

    /// Returns the cart meta after applying; rejects unknown codes.
    #[wasm_bindgen(js_name = applyCoupon)]
    pub fn apply_coupon(&self, code: &str) -> Result<JsValue, JsValue> {
        self.shop.cart().apply_coupon(code).map_err(js_err)?;
        to_js(&self.shop.cart().meta())
    }

    #[wasm_bindgen(js_name = clearCoupon)]
    pub fn clear_coupon(&self) -> Result<JsValue, JsValue> {
        to_js(&self.shop.cart().clear_coupon())
    }

    // ── Wishlist ──

    pub fn wishlist(&self) -> Result<JsValue, JsValue> {
        to_js(&self.shop.wishlist().list())
    }

    #[wasm_bindgen(js_name = isFavorite)]
    pub fn is_favorite(&self, id: String) -> bool {
        self.shop.wishlist().is_favorite(&ProductId::from(id.as_str()))
    }

    /// Resolves to `true` when the item is now a favorite.
    #[wasm_bindgen(js_name = toggleFavorite)]
    pub fn toggle_favorite(&self, item: JsValue) -> Result<Promise, JsValue> {
        let item: WishItem = from_js(item)?;
        let shop = self.shop.clone();
        Ok(future_to_promise(async move {
            Ok(JsValue::from_bool(shop.toggle_favorite(item).await))
        }))
    }

    #[wasm_bindgen(js_name = removeFavorite)]
    pub fn remove_favorite(&self, id: String) -> Promise {
        let shop = self.shop.clone();
        future_to_promise(async move {
            let removed = shop.remove_favorite(&ProductId::from(id.as_str())).await;
            Ok(JsValue::from_bool(removed))
        })
    }

    #[wasm_bindgen(js_name = clearFavorites)]
    pub fn clear_favorites(&self) -> Promise {
        let shop = self.shop.clone();
        future_to_promise(async move {
            shop.clear_favorites().await;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(js_name = syncWishlist)]
    pub fn sync_wishlist(&self) -> Promise {
        let shop = self.shop.clone();
        future_to_promise(async move { to_js(&shop.sync_wishlist_from_server().await) })
    }

    // ── Identity ──

    /// Resolves to the merge report for the guest state folded into the account.
    #[wasm_bindgen(js_name = signIn)]
    pub fn sign_in(&self, session: JsValue) -> Result<Promise, JsValue> {
        let session: Session = from_js(session)?;
        let shop = self.shop.clone();
        Ok(future_to_promise(async move {
            let report = shop.sign_in(session).await;
            if report.pushes_failed > 0 {
                gloo_console::warn!("cartwheel: some guest items were not pushed to the account");
            }
            to_js(&report)
        }))
    }

    #[wasm_bindgen(js_name = signOut)]
    pub fn sign_out(&self) {
        self.shop.sign_out();
    }

    // ── Orders ──

    pub fn checkout(&self, details: JsValue, card: JsValue, express: bool) -> Result<Promise, JsValue> {
        let details: ShippingDetails = from_js(details)?;
        let card: PaymentCard = from_js(card)?;
        let shop = self.shop.clone();
        Ok(future_to_promise(async move {
            let order = shop
                .checkout(&details, &card, shipping_mode(express))
                .await
                .map_err(js_err)?;
            to_js(&order)
        }))
    }

    /// Orders of the current owner, optionally filtered by status name.
    pub fn orders(&self, status: Option<String>) -> Result<JsValue, JsValue> {
        let status = status.as_deref().map(parse_status).transpose()?;
        to_js(&self.shop.orders().list_by_status(status))
    }

    #[wasm_bindgen(js_name = updateOrderStatus)]
    pub fn update_order_status(&self, id: String, status: &str) -> Result<Promise, JsValue> {
        let status = parse_status(status)?;
        let shop = self.shop.clone();
        Ok(future_to_promise(async move {
            let order = shop.update_order_status(&id, status).await.map_err(js_err)?;
            to_js(&order)
        }))
    }

    #[wasm_bindgen(js_name = cancelOrder)]
    pub fn cancel_order(&self, id: String) -> Promise {
        let shop = self.shop.clone();
        future_to_promise(async move {
            let order = shop
                .update_order_status(&id, OrderStatus::Cancelled)
                .await
                .map_err(js_err)?;
            to_js(&order)
        })
    }

    #[wasm_bindgen(js_name = syncOrders)]
    pub fn sync_orders(&self) -> Promise {
        let shop = self.shop.clone();
        future_to_promise(async move { to_js(&shop.sync_orders_from_server().await) })
    }

    // ── Addresses ──

    pub fn addresses(&self) -> Result<JsValue, JsValue> {
        to_js(&self.shop.addresses().list())
    }

    #[wasm_bindgen(js_name = addAddress)]
    pub fn add_address(&self, draft: JsValue) -> Result<Promise, JsValue> {
        let draft: AddressDraft = from_js(draft)?;
        let shop = self.shop.clone();
        Ok(future_to_promise(async move {
            let address = shop.add_address(draft).await.map_err(js_err)?;
            to_js(&address)
        }))
    }

    #[wasm_bindgen(js_name = updateAddress)]
    pub fn update_address(&self, id: String, draft: JsValue) -> Result<Promise, JsValue> {
        let draft: AddressDraft = from_js(draft)?;
        let shop = self.shop.clone();
        Ok(future_to_promise(async move {
            let address = shop.update_address(&id, draft).await.map_err(js_err)?;
            to_js(&address)
        }))
    }

    /// Resolves to `true` when the address existed.
    #[wasm_bindgen(js_name = removeAddress)]
    pub fn remove_address(&self, id: String) -> Promise {
        let shop = self.shop.clone();
        future_to_promise(async move { Ok(JsValue::from_bool(shop.remove_address(&id).await)) })
    }

    #[wasm_bindgen(js_name = setDefaultAddress)]
    pub fn set_default_address(&self, id: String) -> Promise {
        let shop = self.shop.clone();
        future_to_promise(async move {
            let address = shop.set_default_address(&id).await.map_err(js_err)?;
            to_js(&address)
        })
    }

    #[wasm_bindgen(js_name = syncAddresses)]
    pub fn sync_addresses(&self) -> Promise {
        let shop = self.shop.clone();
        future_to_promise(async move { to_js(&shop.sync_addresses_from_server().await) })
    }
}

/// Canonical category slug for a route segment or label, if it is known.
#[wasm_bindgen(js_name = normalizeCategory)]
pub fn normalize_category(raw: &str) -> Option<String> {
    cw_ledger::normalize_category(raw).map(|category| category.slug().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn express_flag_selects_mode() {
        assert_eq!(shipping_mode(true), ShippingMode::Express);
        assert_eq!(shipping_mode(false), ShippingMode::Standard);
    }

    #[test]
    fn category_slugs_come_from_alias_table() {
        assert_eq!(normalize_category("Électronique").as_deref(), Some("electronique"));
        assert_eq!(normalize_category("men%27s clothing").as_deref(), Some("men's clothing"));
        assert_eq!(normalize_category("garden"), None);
    }
}
