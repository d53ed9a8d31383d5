//! `fetch`-based storefront API client.
//!
//! Same routes and payloads as the native REST adapter, sent through
//! `gloo-net`. Requests carry the stored session's bearer token.

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use cw_api_types::{
    Address, AddressPayload, CartItemRequest, CartLine, CreateOrderRequest, Order, OrderStatus,
    OrderStatusUpdate, ProductRefRequest, RemoteAddress, RemoteCart, RemoteOrder, RemoteWishlist,
    UserId, WishItem,
};
use cw_backend::StorefrontBackend;
use cw_identity::SessionProvider;
use gloo_net::http::{Request, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub const DEFAULT_API_URL: &str = "http://localhost:3000";

pub struct FetchBackend {
    endpoint: String,
    sessions: Arc<dyn SessionProvider>,
}

impl FetchBackend {
    pub fn new(endpoint: Option<String>, sessions: Arc<dyn SessionProvider>) -> Self {
        let endpoint = endpoint
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        Self {
            endpoint: endpoint.trim().trim_end_matches('/').to_string(),
            sessions,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    fn bearer_token(&self) -> Option<String> {
        self.sessions
            .current_session()
            .and_then(|session| session.token)
            .filter(|token| !token.trim().is_empty())
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.bearer_token() {
            Some(token) => builder.header("Authorization", &format!("Bearer {token}")),
            None => builder,
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.authorized(Request::get(&self.url(path)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.authorized(Request::post(&self.url(path)))
    }

    fn put(&self, path: &str) -> RequestBuilder {
        self.authorized(Request::put(&self.url(path)))
    }

    fn patch(&self, path: &str) -> RequestBuilder {
        self.authorized(Request::patch(&self.url(path)))
    }

    fn delete(&self, path: &str) -> RequestBuilder {
        self.authorized(Request::delete(&self.url(path)))
    }

    async fn send(&self, op: &str, builder: RequestBuilder) -> Result<Response> {
        let request = builder
            .build()
            .map_err(|err| anyhow!("storefront {op} request: {err}"))?;
        self.dispatch(op, request).await
    }

    async fn send_body<B: Serialize>(
        &self,
        op: &str,
        builder: RequestBuilder,
        body: &B,
    ) -> Result<Response> {
        let request = builder
            .json(body)
            .map_err(|err| anyhow!("storefront {op} encode: {err}"))?;
        self.dispatch(op, request).await
    }

    async fn dispatch(&self, op: &str, request: Request) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|err| anyhow!("storefront {op} transport: {err}"))?;
        if !response.ok() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("storefront {op} HTTP {status}: {text}");
        }
        Ok(response)
    }

    async fn parse<T: DeserializeOwned>(op: &str, response: Response) -> Result<T> {
        response
            .json()
            .await
            .map_err(|err| anyhow!("storefront {op} parse: {err}"))
    }
}

#[async_trait(?Send)]
impl StorefrontBackend for FetchBackend {
    async fn fetch_cart(&self, user_id: &UserId) -> Result<Vec<CartLine>> {
        let response = self
            .send("fetch_cart", self.get(&format!("/cart/user/{user_id}")))
            .await?;
        let cart: RemoteCart = Self::parse("fetch_cart", response).await?;
        Ok(cart.into_lines())
    }

    async fn add_cart_item(&self, req: CartItemRequest) -> Result<Vec<CartLine>> {
        let response = self
            .send_body("add_cart_item", self.post("/cart/add"), &req)
            .await?;
        let cart: RemoteCart = Self::parse("add_cart_item", response).await?;
        Ok(cart.into_lines())
    }

    async fn update_cart_item(&self, req: CartItemRequest) -> Result<Vec<CartLine>> {
        let response = self
            .send_body("update_cart_item", self.put("/cart/update"), &req)
            .await?;
        let cart: RemoteCart = Self::parse("update_cart_item", response).await?;
        Ok(cart.into_lines())
    }

    async fn remove_cart_item(&self, req: ProductRefRequest) -> Result<Vec<CartLine>> {
        let response = self
            .send_body("remove_cart_item", self.delete("/cart/remove"), &req)
            .await?;
        let cart: RemoteCart = Self::parse("remove_cart_item", response).await?;
        Ok(cart.into_lines())
    }

    async fn clear_cart(&self, user_id: &UserId) -> Result<()> {
        self.send("clear_cart", self.delete(&format!("/cart/clear/{user_id}")))
            .await?;
        Ok(())
    }

    async fn fetch_wishlist(&self, user_id: &UserId) -> Result<Vec<WishItem>> {
        let response = self
            .send("fetch_wishlist", self.get(&format!("/wishlist/{user_id}")))
            .await?;
        let body: RemoteWishlist = Self::parse("fetch_wishlist", response).await?;
        Ok(body.into_items())
    }

    async fn add_favorite(&self, req: ProductRefRequest) -> Result<()> {
        self.send_body("add_favorite", self.post("/wishlist"), &req)
            .await?;
        Ok(())
    }

    async fn remove_favorite(&self, req: ProductRefRequest) -> Result<()> {
        self.send_body("remove_favorite", self.delete("/wishlist"), &req)
            .await?;
        Ok(())
    }

    async fn clear_wishlist(&self, user_id: &UserId) -> Result<()> {
        self.send(
            "clear_wishlist",
            self.delete(&format!("/wishlist/clear/{user_id}")),
        )
        .await?;
        Ok(())
    }

    async fn list_addresses(&self, user_id: &UserId) -> Result<Vec<Address>> {
        let response = self
            .send("list_addresses", self.get(&format!("/addresses/user/{user_id}")))
            .await?;
        let remote: Vec<RemoteAddress> = Self::parse("list_addresses", response).await?;
        Ok(remote.into_iter().map(Address::from).collect())
    }

    async fn create_address(&self, payload: AddressPayload) -> Result<Address> {
        let response = self
            .send_body("create_address", self.post("/addresses"), &payload)
            .await?;
        let remote: RemoteAddress = Self::parse("create_address", response).await?;
        Ok(remote.into())
    }

    async fn update_address(&self, address_id: &str, payload: AddressPayload) -> Result<Address> {
        let response = self
            .send_body(
                "update_address",
                self.patch(&format!("/addresses/{address_id}")),
                &payload,
            )
            .await?;
        let remote: RemoteAddress = Self::parse("update_address", response).await?;
        Ok(remote.into())
    }

    async fn delete_address(&self, address_id: &str) -> Result<()> {
        self.send(
            "delete_address",
            self.delete(&format!("/addresses/{address_id}")),
        )
        .await?;
        Ok(())
    }

    async fn set_default_address(&self, address_id: &str) -> Result<Address> {
        let response = self
            .send_body(
                "set_default_address",
                self.patch(&format!("/addresses/{address_id}/default")),
                &serde_json::json!({}),
            )
            .await?;
        let remote: RemoteAddress = Self::parse("set_default_address", response).await?;
        Ok(remote.into())
    }

    async fn list_orders(&self, user_id: &UserId) -> Result<Vec<Order>> {
        let response = self
            .send("list_orders", self.get(&format!("/orders/user/{user_id}")))
            .await?;
        let remote: Vec<RemoteOrder> = Self::parse("list_orders", response).await?;
        Ok(remote
            .into_iter()
            .map(|order| order.into_order(Some(user_id.clone())))
            .collect())
    }

    async fn create_order(&self, req: CreateOrderRequest) -> Result<Order> {
        let user_id = req.user_id.clone();
        let response = self
            .send_body("create_order", self.post("/orders"), &req)
            .await?;
        let remote: RemoteOrder = Self::parse("create_order", response).await?;
        Ok(remote.into_order(user_id))
    }

    async fn update_order_status(&self, order_id: &str, status: OrderStatus) -> Result<Order> {
        let response = self
            .send_body(
                "update_order_status",
                self.patch(&format!("/orders/{order_id}/status")),
                &OrderStatusUpdate { status },
            )
            .await?;
        let remote: RemoteOrder = Self::parse("update_order_status", response).await?;
        Ok(remote.into_order(None))
    }
}
