use anyhow::{Result, bail};
use async_trait::async_trait;
use cw_api_types::{
    Address, AddressPayload, CartItemRequest, CartLine, CreateOrderRequest, Order, OrderStatus,
    ProductRefRequest, UserId, WishItem,
};

mod memory;

pub use memory::InMemoryBackend;

/// Authoritative store for signed-in users.
///
/// Futures are not required to be `Send` so the same contract can be served
/// by a browser `fetch` implementation.
#[async_trait(?Send)]
pub trait StorefrontBackend {
    async fn fetch_cart(&self, user_id: &UserId) -> Result<Vec<CartLine>>;
    async fn add_cart_item(&self, req: CartItemRequest) -> Result<Vec<CartLine>>;
    async fn update_cart_item(&self, req: CartItemRequest) -> Result<Vec<CartLine>>;
    async fn remove_cart_item(&self, req: ProductRefRequest) -> Result<Vec<CartLine>>;
    async fn clear_cart(&self, user_id: &UserId) -> Result<()>;

    async fn fetch_wishlist(&self, user_id: &UserId) -> Result<Vec<WishItem>>;
    async fn add_favorite(&self, req: ProductRefRequest) -> Result<()>;
    async fn remove_favorite(&self, req: ProductRefRequest) -> Result<()>;
    async fn clear_wishlist(&self, user_id: &UserId) -> Result<()>;

    async fn list_addresses(&self, user_id: &UserId) -> Result<Vec<Address>>;
    async fn create_address(&self, payload: AddressPayload) -> Result<Address>;
    async fn update_address(&self, address_id: &str, payload: AddressPayload) -> Result<Address>;
    async fn delete_address(&self, address_id: &str) -> Result<()>;
    async fn set_default_address(&self, address_id: &str) -> Result<Address>;

    async fn list_orders(&self, user_id: &UserId) -> Result<Vec<Order>>;
    async fn create_order(&self, req: CreateOrderRequest) -> Result<Order>;
    async fn update_order_status(&self, order_id: &str, status: OrderStatus) -> Result<Order>;
}

/// Backend that is never reachable; every call fails and callers keep local state.
#[derive(Default)]
pub struct OfflineBackend;

const OFFLINE: &str = "storefront backend is offline";

#[async_trait(?Send)]
impl StorefrontBackend for OfflineBackend {
    async fn fetch_cart(&self, _user_id: &UserId) -> Result<Vec<CartLine>> {
        bail!(OFFLINE)
    }

    async fn add_cart_item(&self, _req: CartItemRequest) -> Result<Vec<CartLine>> {
        bail!(OFFLINE)
    }

    async fn update_cart_item(&self, _req: CartItemRequest) -> Result<Vec<CartLine>> {
        bail!(OFFLINE)
    }

    async fn remove_cart_item(&self, _req: ProductRefRequest) -> Result<Vec<CartLine>> {
        bail!(OFFLINE)
    }

    async fn clear_cart(&self, _user_id: &UserId) -> Result<()> {
        bail!(OFFLINE)
    }

    async fn fetch_wishlist(&self, _user_id: &UserId) -> Result<Vec<WishItem>> {
        bail!(OFFLINE)
    }

    async fn add_favorite(&self, _req: ProductRefRequest) -> Result<()> {
        bail!(OFFLINE)
    }

    async fn remove_favorite(&self, _req: ProductRefRequest) -> Result<()> {
        bail!(OFFLINE)
    }

    async fn clear_wishlist(&self, _user_id: &UserId) -> Result<()> {
        bail!(OFFLINE)
    }

    async fn list_addresses(&self, _user_id: &UserId) -> Result<Vec<Address>> {
        bail!(OFFLINE)
    }

    async fn create_address(&self, _payload: AddressPayload) -> Result<Address> {
        bail!(OFFLINE)
    }

    async fn update_address(&self, _address_id: &str, _payload: AddressPayload) -> Result<Address> {
        bail!(OFFLINE)
    }

    async fn delete_address(&self, _address_id: &str) -> Result<()> {
        bail!(OFFLINE)
    }

    async fn set_default_address(&self, _address_id: &str) -> Result<Address> {
        bail!(OFFLINE)
    }

    async fn list_orders(&self, _user_id: &UserId) -> Result<Vec<Order>> {
        bail!(OFFLINE)
    }

    async fn create_order(&self, _req: CreateOrderRequest) -> Result<Order> {
        bail!(OFFLINE)
    }

    async fn update_order_status(&self, _order_id: &str, _status: OrderStatus) -> Result<Order> {
        bail!(OFFLINE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_backend_rejects_everything() {
        let backend = OfflineBackend;
        let user = UserId::from("u1");

        assert!(backend.fetch_cart(&user).await.is_err());
        assert!(backend.fetch_wishlist(&user).await.is_err());
        let err = backend
            .clear_cart(&user)
            .await
            .expect_err("offline backend must fail");
        assert!(err.to_string().contains("offline"));
    }
}
