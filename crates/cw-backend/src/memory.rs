use crate::StorefrontBackend;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use cw_api_types::{
    Address, AddressPayload, CartItemRequest, CartLine, CreateOrderRequest, Order, OrderItem,
    OrderStatus, ProductId, ProductRefRequest, RemoteCart, RemoteCartItem, RemoteProduct, UserId,
    WishItem,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct State {
    catalog: HashMap<ProductId, RemoteProduct>,
    carts: HashMap<UserId, Vec<RemoteCartItem>>,
    wishlists: HashMap<UserId, Vec<ProductId>>,
    addresses: HashMap<UserId, Vec<Address>>,
    orders: Vec<Order>,
    calls: Vec<String>,
    offline: bool,
}

impl State {
    fn record(&mut self, call: String) -> Result<()> {
        debug!(%call, "in-memory backend call");
        self.calls.push(call);
        if self.offline {
            bail!("in-memory backend is offline");
        }
        Ok(())
    }

    fn product(&self, id: &ProductId) -> Result<RemoteProduct> {
        self.catalog
            .get(id)
            .cloned()
            .with_context(|| format!("unknown product {id}"))
    }

    fn cart_lines(&self, user_id: &UserId) -> Vec<CartLine> {
        RemoteCart {
            items: self.carts.get(user_id).cloned().unwrap_or_default(),
        }
        .into_lines()
    }

    fn address_owner(&self, address_id: &str) -> Result<UserId> {
        self.addresses
            .iter()
            .find(|(_, list)| list.iter().any(|address| address.id == address_id))
            .map(|(user_id, _)| user_id.clone())
            .with_context(|| format!("unknown address {address_id}"))
    }
}

/// Backend double holding every collection in process memory.
///
/// Records each call as `"<METHOD> <path>"` and can be switched offline to
/// exercise the retain-local-state paths.
#[derive(Default)]
pub struct InMemoryBackend {
    state: RwLock<State>,
}

impl InMemoryBackend {
    pub fn with_products(products: impl IntoIterator<Item = RemoteProduct>) -> Self {
        let catalog = products
            .into_iter()
            .map(|product| (product.id.clone(), product))
            .collect();
        Self {
            state: RwLock::new(State {
                catalog,
                ..State::default()
            }),
        }
    }

    pub async fn insert_product(&self, product: RemoteProduct) {
        let mut guard = self.state.write().await;
        guard.catalog.insert(product.id.clone(), product);
    }

    pub async fn set_offline(&self, offline: bool) {
        self.state.write().await.offline = offline;
    }

    pub async fn calls(&self) -> Vec<String> {
        self.state.read().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.state.write().await.calls.clear();
    }
}

#[async_trait(?Send)]
impl StorefrontBackend for InMemoryBackend {
    async fn fetch_cart(&self, user_id: &UserId) -> Result<Vec<CartLine>> {
        let mut guard = self.state.write().await;
        guard.record(format!("GET /cart/user/{user_id}"))?;
        Ok(guard.cart_lines(user_id))
    }

    async fn add_cart_item(&self, req: CartItemRequest) -> Result<Vec<CartLine>> {
        let mut guard = self.state.write().await;
        guard.record(format!("POST /cart/add {}", req.product_id))?;
        let product = guard.product(&req.product_id)?;
        let cart = guard.carts.entry(req.user_id.clone()).or_default();
        match cart.iter_mut().find(|item| item.product.id == req.product_id) {
            Some(item) => item.quantity = item.quantity.saturating_add(req.quantity.max(1)),
            None => cart.push(RemoteCartItem {
                product,
                quantity: req.quantity.max(1),
            }),
        }
        Ok(guard.cart_lines(&req.user_id))
    }

    async fn update_cart_item(&self, req: CartItemRequest) -> Result<Vec<CartLine>> {
        let mut guard = self.state.write().await;
        guard.record(format!("PUT /cart/update {}", req.product_id))?;
        let cart = guard.carts.entry(req.user_id.clone()).or_default();
        if req.quantity == 0 {
            cart.retain(|item| item.product.id != req.product_id);
        } else if let Some(item) = cart.iter_mut().find(|item| item.product.id == req.product_id) {
            item.quantity = req.quantity;
        } else {
            bail!("product {} is not in the cart", req.product_id);
        }
        Ok(guard.cart_lines(&req.user_id))
    }

    async fn remove_cart_item(&self, req: ProductRefRequest) -> Result<Vec<CartLine>> {
        let mut guard = self.state.write().await;
        guard.record(format!("DELETE /cart/remove {}", req.product_id))?;
        if let Some(cart) = guard.carts.get_mut(&req.user_id) {
            cart.retain(|item| item.product.id != req.product_id);
        }
        Ok(guard.cart_lines(&req.user_id))
    }

    async fn clear_cart(&self, user_id: &UserId) -> Result<()> {
        let mut guard = self.state.write().await;
        guard.record(format!("DELETE /cart/clear/{user_id}"))?;
        guard.carts.remove(user_id);
        Ok(())
    }

    async fn fetch_wishlist(&self, user_id: &UserId) -> Result<Vec<WishItem>> {
        let mut guard = self.state.write().await;
        guard.record(format!("GET /wishlist/{user_id}"))?;
        let ids = guard.wishlists.get(user_id).cloned().unwrap_or_default();
        ids.iter()
            .map(|id| guard.product(id).map(RemoteProduct::into_wish_item))
            .collect()
    }

    async fn add_favorite(&self, req: ProductRefRequest) -> Result<()> {
        let mut guard = self.state.write().await;
        guard.record(format!("POST /wishlist {}", req.product_id))?;
        guard.product(&req.product_id)?;
        let list = guard.wishlists.entry(req.user_id).or_default();
        if !list.contains(&req.product_id) {
            list.insert(0, req.product_id);
        }
        Ok(())
    }

    async fn remove_favorite(&self, req: ProductRefRequest) -> Result<()> {
        let mut guard = self.state.write().await;
        guard.record(format!("DELETE /wishlist {}", req.product_id))?;
        if let Some(list) = guard.wishlists.get_mut(&req.user_id) {
            list.retain(|id| *id != req.product_id);
        }
        Ok(())
    }

    async fn clear_wishlist(&self, user_id: &UserId) -> Result<()> {
        let mut guard = self.state.write().await;
        guard.record(format!("DELETE /wishlist/clear/{user_id}"))?;
        guard.wishlists.remove(user_id);
        Ok(())
    }

    async fn list_addresses(&self, user_id: &UserId) -> Result<Vec<Address>> {
        let mut guard = self.state.write().await;
        guard.record(format!("GET /addresses/user/{user_id}"))?;
        Ok(guard.addresses.get(user_id).cloned().unwrap_or_default())
    }

    async fn create_address(&self, payload: AddressPayload) -> Result<Address> {
        let mut guard = self.state.write().await;
        guard.record("POST /addresses".to_owned())?;
        let user_id = payload
            .user_id
            .clone()
            .context("address payload is missing userId")?;
        let list = guard.addresses.entry(user_id).or_default();
        let is_default = payload.is_default || list.is_empty();
        if is_default {
            list.iter_mut().for_each(|address| address.is_default = false);
        }
        let address = Address {
            id: Uuid::new_v4().to_string(),
            full_name: format!("{} {}", payload.first_name, payload.last_name)
                .trim()
                .to_owned(),
            line1: payload.line1,
            city: payload.city,
            country: payload.country,
            is_default,
        };
        list.push(address.clone());
        Ok(address)
    }

    async fn update_address(&self, address_id: &str, payload: AddressPayload) -> Result<Address> {
        let mut guard = self.state.write().await;
        guard.record(format!("PATCH /addresses/{address_id}"))?;
        let owner = guard.address_owner(address_id)?;
        let list = guard.addresses.entry(owner).or_default();
        if payload.is_default {
            list.iter_mut().for_each(|address| address.is_default = false);
        }
        let address = list
            .iter_mut()
            .find(|address| address.id == address_id)
            .with_context(|| format!("unknown address {address_id}"))?;
        address.full_name = format!("{} {}", payload.first_name, payload.last_name)
            .trim()
            .to_owned();
        address.line1 = payload.line1;
        address.city = payload.city;
        address.country = payload.country;
        address.is_default = address.is_default || payload.is_default;
        Ok(address.clone())
    }

    async fn delete_address(&self, address_id: &str) -> Result<()> {
        let mut guard = self.state.write().await;
        guard.record(format!("DELETE /addresses/{address_id}"))?;
        let owner = guard.address_owner(address_id)?;
        let list = guard.addresses.entry(owner).or_default();
        list.retain(|address| address.id != address_id);
        if !list.iter().any(|address| address.is_default) {
            if let Some(first) = list.first_mut() {
                first.is_default = true;
            }
        }
        Ok(())
    }

    async fn set_default_address(&self, address_id: &str) -> Result<Address> {
        let mut guard = self.state.write().await;
        guard.record(format!("PATCH /addresses/{address_id}/default"))?;
        let owner = guard.address_owner(address_id)?;
        let list = guard.addresses.entry(owner).or_default();
        list.iter_mut()
            .for_each(|address| address.is_default = address.id == address_id);
        list.iter()
            .find(|address| address.id == address_id)
            .cloned()
            .with_context(|| format!("unknown address {address_id}"))
    }

    async fn list_orders(&self, user_id: &UserId) -> Result<Vec<Order>> {
        let mut guard = self.state.write().await;
        guard.record(format!("GET /orders/user/{user_id}"))?;
        Ok(guard
            .orders
            .iter()
            .filter(|order| order.user_id.as_ref() == Some(user_id))
            .cloned()
            .collect())
    }

    async fn create_order(&self, req: CreateOrderRequest) -> Result<Order> {
        let mut guard = self.state.write().await;
        guard.record("POST /orders".to_owned())?;
        if req.items.is_empty() {
            bail!("order has no items");
        }

        let mut items = Vec::with_capacity(req.items.len());
        let mut total = Decimal::ZERO;
        for entry in &req.items {
            let product = guard.product(&entry.product_id)?;
            let price = product.unit_price();
            total += price * Decimal::from(entry.quantity);
            items.push(OrderItem {
                image: product.primary_image(),
                title: product.name,
                qty: entry.quantity,
                price,
            });
        }

        let date = Utc::now();
        let order = Order {
            id: Uuid::new_v4().to_string(),
            number: Order::number_for(date),
            date,
            estimated_delivery: Order::estimate_delivery(date),
            total,
            status: OrderStatus::Processing,
            items,
            user_id: req.user_id,
        };
        guard.orders.insert(0, order.clone());
        Ok(order)
    }

    async fn update_order_status(&self, order_id: &str, status: OrderStatus) -> Result<Order> {
        let mut guard = self.state.write().await;
        guard.record(format!("PATCH /orders/{order_id}/status"))?;
        let order = guard
            .orders
            .iter_mut()
            .find(|order| order.id == order_id)
            .with_context(|| format!("unknown order {order_id}"))?;
        if !order.status.can_transition_to(status) {
            bail!("cannot move order {order_id} from {} to {status}", order.status);
        }
        order.status = status;
        Ok(order.clone())
    }
}
