use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const DEFAULT_SHIPPING_FEE: i64 = 8;
pub const DEFAULT_FREE_SHIPPING_THRESHOLD: i64 = 10_000;
pub const DELIVERY_ESTIMATE_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductId(#[serde(deserialize_with = "string_or_number")] pub String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(#[serde(deserialize_with = "string_or_number")] pub String);

impl ProductId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProductId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coupon codes the pricing policy recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CouponCode {
    /// 10% off the subtotal.
    Sale10,
    /// Waives the standard shipping fee (express surcharge still applies).
    FreeShip,
}

impl CouponCode {
    pub const ALL: [CouponCode; 2] = [CouponCode::Sale10, CouponCode::FreeShip];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sale10 => "SALE10",
            Self::FreeShip => "FREESHIP",
        }
    }

    /// Case-insensitive lookup; anything outside the whitelist is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let wanted = raw.trim();
        Self::ALL
            .into_iter()
            .find(|code| code.as_str().eq_ignore_ascii_case(wanted))
    }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMode {
    #[default]
    Standard,
    Express,
}

// ── Cart ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: ProductId,
    #[serde(alias = "title", default = "default_line_name")]
    pub name: String,
    #[serde(alias = "price", default)]
    pub unit_price: Decimal,
    #[serde(default)]
    pub image: String,
    #[serde(default = "one", deserialize_with = "lenient_quantity")]
    pub quantity: u32,
}

impl CartLine {
    pub fn new(id: impl Into<String>, name: impl Into<String>, unit_price: Decimal, quantity: u32) -> Self {
        Self {
            id: ProductId(id.into()),
            name: name.into(),
            unit_price,
            image: String::new(),
            quantity: quantity.max(1),
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    /// Clamp fields back inside their invariants after reading untrusted data.
    pub fn normalized(mut self) -> Self {
        if self.unit_price.is_sign_negative() {
            self.unit_price = Decimal::ZERO;
        }
        self.quantity = self.quantity.max(1);
        self
    }
}

/// Shipping and coupon settings attached to an owner's cart.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CartMeta {
    pub shipping_fee: Decimal,
    pub free_shipping_threshold: Decimal,
    #[serde(serialize_with = "serialize_coupon")]
    pub coupon_code: Option<CouponCode>,
}

impl Default for CartMeta {
    fn default() -> Self {
        Self {
            shipping_fee: Decimal::from(DEFAULT_SHIPPING_FEE),
            free_shipping_threshold: Decimal::from(DEFAULT_FREE_SHIPPING_THRESHOLD),
            coupon_code: None,
        }
    }
}

impl CartMeta {
    /// Overlay the fields present in `patch`; unknown coupon codes collapse to none.
    pub fn with_patch(mut self, patch: CartMetaPatch) -> Self {
        if let Some(fee) = patch.shipping_fee {
            self.shipping_fee = fee.max(Decimal::ZERO);
        }
        if let Some(threshold) = patch.free_shipping_threshold {
            self.free_shipping_threshold = threshold.max(Decimal::ZERO);
        }
        if let Some(code) = patch.coupon_code {
            self.coupon_code = CouponCode::parse(&code);
        }
        self
    }
}

/// Partial cart meta, as persisted and as accepted by `set_meta`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CartMetaPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_fee: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_shipping_threshold: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
}

impl From<&CartMeta> for CartMetaPatch {
    fn from(meta: &CartMeta) -> Self {
        Self {
            shipping_fee: Some(meta.shipping_fee),
            free_shipping_threshold: Some(meta.free_shipping_threshold),
            coupon_code: Some(meta.coupon_code.map(|c| c.as_str().to_owned()).unwrap_or_default()),
        }
    }
}

// ── Wishlist ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WishItem {
    pub id: ProductId,
    #[serde(alias = "name", default)]
    pub title: String,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub image: String,
}

impl WishItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>, price: Decimal) -> Self {
        Self {
            id: ProductId(id.into()),
            title: title.into(),
            price,
            image: String::new(),
        }
    }
}

// ── Orders ──

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "processing" | "pending" => Some(Self::Processing),
            "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    fn rank(&self) -> Option<u8> {
        match self {
            Self::Processing => Some(0),
            Self::Shipped => Some(1),
            Self::Delivered => Some(2),
            Self::Cancelled => None,
        }
    }

    /// Statuses only move forward; cancelling is refused once delivered.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match (self.rank(), next) {
            (None, _) => false,
            (Some(2), OrderStatus::Cancelled) => false,
            (Some(_), OrderStatus::Cancelled) => true,
            (Some(current), next) => next.rank().is_some_and(|rank| rank > current),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(alias = "name", default)]
    pub title: String,
    #[serde(alias = "quantity", default = "one", deserialize_with = "lenient_quantity")]
    pub qty: u32,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub image: String,
}

impl From<&CartLine> for OrderItem {
    fn from(line: &CartLine) -> Self {
        Self {
            title: line.name.clone(),
            qty: line.quantity,
            price: line.unit_price,
            image: line.image.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub number: String,
    pub date: DateTime<Utc>,
    pub estimated_delivery: DateTime<Utc>,
    pub total: Decimal,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

impl Order {
    pub fn number_for(date: DateTime<Utc>) -> String {
        format!("CMD{}", date.timestamp_millis())
    }

    pub fn estimate_delivery(date: DateTime<Utc>) -> DateTime<Utc> {
        date + Duration::days(DELIVERY_ESTIMATE_DAYS)
    }
}

// ── Addresses ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: String,
    pub full_name: String,
    pub line1: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub is_default: bool,
}

/// User-entered address fields, before an id is assigned.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddressDraft {
    pub full_name: String,
    pub line1: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub is_default: bool,
}

// ── Session ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    pub id: UserId,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub token: Option<String>,
    pub user: UserSnapshot,
}

// ── Backend wire types ──

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemRequest {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRefRequest {
    pub user_id: UserId,
    pub product_id: ProductId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProduct {
    #[serde(rename = "_id", alias = "id")]
    pub id: ProductId,
    #[serde(alias = "title", default)]
    pub name: String,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub promo_price: Option<Decimal>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub image: Option<String>,
}

impl RemoteProduct {
    /// The promo price wins only when it is a real reduction.
    pub fn unit_price(&self) -> Decimal {
        match self.promo_price {
            Some(promo) if promo > Decimal::ZERO && promo < self.price => promo,
            _ => self.price,
        }
    }

    pub fn primary_image(&self) -> String {
        self.images
            .first()
            .cloned()
            .or_else(|| self.image.clone())
            .unwrap_or_default()
    }

    pub fn into_wish_item(self) -> WishItem {
        WishItem {
            price: self.unit_price(),
            image: self.primary_image(),
            title: self.name,
            id: self.id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCartItem {
    pub product: RemoteProduct,
    #[serde(default = "one", deserialize_with = "lenient_quantity")]
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteCart {
    #[serde(default)]
    pub items: Vec<RemoteCartItem>,
}

impl RemoteCart {
    /// Flatten product snapshots into cart lines, folding repeated products.
    pub fn into_lines(self) -> Vec<CartLine> {
        let mut lines: Vec<CartLine> = Vec::with_capacity(self.items.len());
        for item in self.items {
            if let Some(existing) = lines.iter_mut().find(|line| line.id == item.product.id) {
                existing.quantity = existing.quantity.saturating_add(item.quantity);
                continue;
            }
            lines.push(CartLine {
                unit_price: item.product.unit_price(),
                image: item.product.primary_image(),
                name: item.product.name,
                id: item.product.id,
                quantity: item.quantity.max(1),
            });
        }
        lines
    }
}

/// Wishlist body: either a bare product array or an `{items}`/`{products}` wrapper.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RemoteWishlist {
    Products(Vec<RemoteProduct>),
    Wrapped {
        #[serde(alias = "products", default)]
        items: Vec<RemoteProduct>,
    },
}

impl RemoteWishlist {
    pub fn into_items(self) -> Vec<WishItem> {
        let products = match self {
            Self::Products(products) => products,
            Self::Wrapped { items } => items,
        };
        products.into_iter().map(RemoteProduct::into_wish_item).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAddress {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub is_default: bool,
}

impl From<RemoteAddress> for Address {
    fn from(remote: RemoteAddress) -> Self {
        let full_name = format!("{} {}", remote.first_name, remote.last_name)
            .trim()
            .to_owned();
        Self {
            id: remote.id,
            full_name,
            line1: remote.line1,
            city: remote.city,
            country: remote.country,
            is_default: remote.is_default,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub first_name: String,
    pub last_name: String,
    pub line1: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub city: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub country: String,
    pub is_default: bool,
}

impl AddressPayload {
    pub fn from_draft(user_id: Option<UserId>, draft: &AddressDraft) -> Self {
        let full_name = draft.full_name.trim();
        let (first_name, last_name) = match full_name.split_once(char::is_whitespace) {
            Some((first, last)) => (first.to_owned(), last.trim().to_owned()),
            None => (full_name.to_owned(), String::new()),
        };
        Self {
            user_id,
            first_name,
            last_name,
            line1: draft.line1.trim().to_owned(),
            city: draft.city.trim().to_owned(),
            country: draft.country.trim().to_owned(),
            is_default: draft.is_default,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentMethod {
    #[default]
    #[serde(rename = "CARD")]
    Card,
    #[serde(rename = "PAYPAL")]
    Paypal,
    #[serde(rename = "APPLEPAY")]
    ApplePay,
    #[serde(rename = "GOOGLEPAY")]
    GooglePay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemPayload {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddressPayload {
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub user_id: Option<UserId>,
    pub items: Vec<OrderItemPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    pub shipping_address: ShippingAddressPayload,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusUpdate {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOrder {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub total: Decimal,
    #[serde(default)]
    pub status: String,
    #[serde(alias = "date")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

impl RemoteOrder {
    pub fn into_order(self, user_id: Option<UserId>) -> Order {
        Order {
            number: self
                .number
                .unwrap_or_else(|| Order::number_for(self.created_at)),
            estimated_delivery: Order::estimate_delivery(self.created_at),
            date: self.created_at,
            total: self.total,
            status: OrderStatus::parse(&self.status).unwrap_or_default(),
            items: self.items,
            user_id,
            id: self.id,
        }
    }
}

// ── serde helpers ──

fn one() -> u32 {
    1
}

fn default_line_name() -> String {
    "Product".to_owned()
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Uint(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Int(n) => n.to_string(),
        Raw::Uint(n) => n.to_string(),
    })
}

fn lenient_quantity<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
    }

    let quantity = match Raw::deserialize(deserializer)? {
        Raw::Int(n) => n,
        Raw::Float(f) => f.trunc() as i64,
        Raw::Text(text) => text.trim().parse::<i64>().unwrap_or(0),
    };
    Ok(u32::try_from(quantity).ok().filter(|q| *q > 0).unwrap_or(1))
}

fn serialize_coupon<S>(code: &Option<CouponCode>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(code.map(|c| c.as_str()).unwrap_or(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_cart_line_is_normalized_on_read() {
        let raw = r#"[{"id":7,"title":"Mug","price":12.5,"quantity":0}]"#;
        let lines: Vec<CartLine> = serde_json::from_str(raw).expect("parse lines");

        assert_eq!(lines[0].id, ProductId::from("7"));
        assert_eq!(lines[0].name, "Mug");
        assert_eq!(lines[0].unit_price, Decimal::new(125, 1));
        assert_eq!(lines[0].quantity, 1);
        assert_eq!(lines[0].image, "");
    }

    #[test]
    fn coupon_lookup_is_case_insensitive_and_whitelisted() {
        assert_eq!(CouponCode::parse(" sale10 "), Some(CouponCode::Sale10));
        assert_eq!(CouponCode::parse("FreeShip"), Some(CouponCode::FreeShip));
        assert_eq!(CouponCode::parse("BOGUS"), None);
        assert_eq!(CouponCode::parse(""), None);
    }

    #[test]
    fn meta_patch_drops_unknown_coupon_and_keeps_defaults() {
        let patch: CartMetaPatch =
            serde_json::from_str(r#"{"couponCode":"WELCOME"}"#).expect("parse patch");
        let meta = CartMeta::default().with_patch(patch);

        assert_eq!(meta.coupon_code, None);
        assert_eq!(meta.shipping_fee, Decimal::from(8));
        assert_eq!(meta.free_shipping_threshold, Decimal::from(10_000));

        let json = serde_json::to_value(&meta).expect("serialize meta");
        assert_eq!(json["couponCode"], "");
    }

    #[test]
    fn promo_price_applies_only_when_lower() {
        let product: RemoteProduct = serde_json::from_str(
            r#"{"_id":"p1","name":"Lamp","price":40,"promoPrice":30,"images":["a.png"]}"#,
        )
        .expect("parse product");
        assert_eq!(product.unit_price(), Decimal::from(30));
        assert_eq!(product.primary_image(), "a.png");

        let inflated: RemoteProduct =
            serde_json::from_str(r#"{"id":"p2","title":"Desk","price":40,"promoPrice":55}"#)
                .expect("parse product");
        assert_eq!(inflated.unit_price(), Decimal::from(40));
    }

    #[test]
    fn remote_cart_folds_repeated_products() {
        let cart: RemoteCart = serde_json::from_str(
            r#"{"items":[
                {"product":{"_id":"p1","name":"Lamp","price":10},"quantity":2},
                {"product":{"_id":"p1","name":"Lamp","price":10},"quantity":1},
                {"product":{"_id":"p2","name":"Desk","price":90},"quantity":1}
            ]}"#,
        )
        .expect("parse cart");
        let lines = cart.into_lines();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].quantity, 3);
        assert_eq!(lines[1].id, ProductId::from("p2"));
    }

    #[test]
    fn order_status_moves_forward_and_cannot_cancel_after_delivery() {
        use OrderStatus::*;

        assert!(Processing.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(Processing.can_transition_to(Cancelled));
        assert!(!Shipped.can_transition_to(Processing));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Processing));
        assert!(!Delivered.can_transition_to(Delivered));
    }

    #[test]
    fn address_payload_splits_full_name() {
        let draft = AddressDraft {
            full_name: "Amira Ben Salah".to_owned(),
            line1: "12 rue de Marseille".to_owned(),
            ..AddressDraft::default()
        };
        let payload = AddressPayload::from_draft(Some(UserId::from("u1")), &draft);

        assert_eq!(payload.first_name, "Amira");
        assert_eq!(payload.last_name, "Ben Salah");
    }
}
