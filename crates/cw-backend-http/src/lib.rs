use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use cw_api_types::{
    Address, AddressPayload, CartItemRequest, CartLine, CreateOrderRequest, Order, OrderStatus,
    OrderStatusUpdate, ProductRefRequest, RemoteAddress, RemoteCart, RemoteOrder, RemoteWishlist,
    UserId, WishItem,
};
use cw_backend::StorefrontBackend;
use cw_identity::SessionProvider;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// REST adapter for the storefront API.
///
/// Reads `CARTWHEEL_API_URL` from environment at construction time
/// (default: `http://localhost:3000`). Requests carry the current session's
/// bearer token when one exists.
pub struct HttpBackend {
    endpoint: String,
    http: reqwest::Client,
    sessions: Arc<dyn SessionProvider>,
}

impl HttpBackend {
    pub fn new(endpoint: Option<String>, sessions: Arc<dyn SessionProvider>) -> Self {
        let endpoint = endpoint
            .or_else(|| std::env::var("CARTWHEEL_API_URL").ok())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            sessions,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        let token = self
            .sessions
            .current_session()
            .and_then(|session| session.token)
            .filter(|token| !token.trim().is_empty());
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, op: &str, builder: RequestBuilder) -> Result<reqwest::Response> {
        let response = builder
            .send()
            .await
            .with_context(|| format!("storefront {op} transport"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("storefront {op} HTTP {status}: {text}");
        }
        debug!(op, %status, "storefront call succeeded");
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, op: &str, builder: RequestBuilder) -> Result<T> {
        self.send(op, builder)
            .await?
            .json()
            .await
            .with_context(|| format!("storefront {op} parse"))
    }
}

#[async_trait(?Send)]
impl StorefrontBackend for HttpBackend {
    async fn fetch_cart(&self, user_id: &UserId) -> Result<Vec<CartLine>> {
        let builder = self.request(Method::GET, &format!("/cart/user/{user_id}"));
        let cart: RemoteCart = self.send_json("fetch_cart", builder).await?;
        Ok(cart.into_lines())
    }

    async fn add_cart_item(&self, req: CartItemRequest) -> Result<Vec<CartLine>> {
        let builder = self.request(Method::POST, "/cart/add").json(&req);
        let cart: RemoteCart = self.send_json("add_cart_item", builder).await?;
        Ok(cart.into_lines())
    }

    async fn update_cart_item(&self, req: CartItemRequest) -> Result<Vec<CartLine>> {
        let builder = self.request(Method::PUT, "/cart/update").json(&req);
        let cart: RemoteCart = self.send_json("update_cart_item", builder).await?;
        Ok(cart.into_lines())
    }

    async fn remove_cart_item(&self, req: ProductRefRequest) -> Result<Vec<CartLine>> {
        let builder = self.request(Method::DELETE, "/cart/remove").json(&req);
        let cart: RemoteCart = self.send_json("remove_cart_item", builder).await?;
        Ok(cart.into_lines())
    }

    async fn clear_cart(&self, user_id: &UserId) -> Result<()> {
        let builder = self.request(Method::DELETE, &format!("/cart/clear/{user_id}"));
        self.send("clear_cart", builder).await?;
        Ok(())
    }

    async fn fetch_wishlist(&self, user_id: &UserId) -> Result<Vec<WishItem>> {
        let builder = self.request(Method::GET, &format!("/wishlist/{user_id}"));
        let body: RemoteWishlist = self.send_json("fetch_wishlist", builder).await?;
        Ok(body.into_items())
    }

    async fn add_favorite(&self, req: ProductRefRequest) -> Result<()> {
        let builder = self.request(Method::POST, "/wishlist").json(&req);
        self.send("add_favorite", builder).await?;
        Ok(())
    }

    async fn remove_favorite(&self, req: ProductRefRequest) -> Result<()> {
        let builder = self.request(Method::DELETE, "/wishlist").json(&req);
        self.send("remove_favorite", builder).await?;
        Ok(())
    }

    async fn clear_wishlist(&self, user_id: &UserId) -> Result<()> {
        let builder = self.request(Method::DELETE, &format!("/wishlist/clear/{user_id}"));
        self.send("clear_wishlist", builder).await?;
        Ok(())
    }

    async fn list_addresses(&self, user_id: &UserId) -> Result<Vec<Address>> {
        let builder = self.request(Method::GET, &format!("/addresses/user/{user_id}"));
        let remote: Vec<RemoteAddress> = self.send_json("list_addresses", builder).await?;
        Ok(remote.into_iter().map(Address::from).collect())
    }

    async fn create_address(&self, payload: AddressPayload) -> Result<Address> {
        let builder = self.request(Method::POST, "/addresses").json(&payload);
        let remote: RemoteAddress = self.send_json("create_address", builder).await?;
        Ok(remote.into())
    }

    async fn update_address(&self, address_id: &str, payload: AddressPayload) -> Result<Address> {
        let builder = self
            .request(Method::PATCH, &format!("/addresses/{address_id}"))
            .json(&payload);
        let remote: RemoteAddress = self.send_json("update_address", builder).await?;
        Ok(remote.into())
    }

    async fn delete_address(&self, address_id: &str) -> Result<()> {
        let builder = self.request(Method::DELETE, &format!("/addresses/{address_id}"));
        self.send("delete_address", builder).await?;
        Ok(())
    }

    async fn set_default_address(&self, address_id: &str) -> Result<Address> {
        let builder = self
            .request(Method::PATCH, &format!("/addresses/{address_id}/default"))
            .json(&serde_json::json!({}));
        let remote: RemoteAddress = self.send_json("set_default_address", builder).await?;
        Ok(remote.into())
    }

    async fn list_orders(&self, user_id: &UserId) -> Result<Vec<Order>> {
        let builder = self.request(Method::GET, &format!("/orders/user/{user_id}"));
        let remote: Vec<RemoteOrder> = self.send_json("list_orders", builder).await?;
        Ok(remote
            .into_iter()
            .map(|order| order.into_order(Some(user_id.clone())))
            .collect())
    }

    async fn create_order(&self, req: CreateOrderRequest) -> Result<Order> {
        let user_id = req.user_id.clone();
        let builder = self.request(Method::POST, "/orders").json(&req);
        let remote: RemoteOrder = self.send_json("create_order", builder).await?;
        Ok(remote.into_order(user_id))
    }

    async fn update_order_status(&self, order_id: &str, status: OrderStatus) -> Result<Order> {
        let builder = self
            .request(Method::PATCH, &format!("/orders/{order_id}/status"))
            .json(&OrderStatusUpdate { status });
        let remote: RemoteOrder = self.send_json("update_order_status", builder).await?;
        Ok(remote.into_order(None))
    }
}
