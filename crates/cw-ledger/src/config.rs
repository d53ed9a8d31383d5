use cw_api_types::{CartMeta, DEFAULT_FREE_SHIPPING_THRESHOLD, DEFAULT_SHIPPING_FEE};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_KEY_PREFIX: &str = "app.";
pub const DEFAULT_EXPRESS_SURCHARGE: i64 = 4;
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Storage layout and pricing defaults shared by every ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    pub key_prefix: String,
    pub shipping_fee: Decimal,
    pub free_shipping_threshold: Decimal,
    pub express_surcharge: Decimal,
    pub event_capacity: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_owned(),
            shipping_fee: Decimal::from(DEFAULT_SHIPPING_FEE),
            free_shipping_threshold: Decimal::from(DEFAULT_FREE_SHIPPING_THRESHOLD),
            express_surcharge: Decimal::from(DEFAULT_EXPRESS_SURCHARGE),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl LedgerConfig {
    /// Reads `CARTWHEEL_*` variables; unset or unparsable values keep their default.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            key_prefix: lookup("CARTWHEEL_KEY_PREFIX")
                .map(|prefix| prefix.trim().to_owned())
                .filter(|prefix| !prefix.is_empty())
                .unwrap_or(defaults.key_prefix),
            shipping_fee: parsed(&lookup, "CARTWHEEL_SHIPPING_FEE", defaults.shipping_fee)
                .max(Decimal::ZERO),
            free_shipping_threshold: parsed(
                &lookup,
                "CARTWHEEL_FREE_SHIPPING_THRESHOLD",
                defaults.free_shipping_threshold,
            )
            .max(Decimal::ZERO),
            express_surcharge: parsed(
                &lookup,
                "CARTWHEEL_EXPRESS_SURCHARGE",
                defaults.express_surcharge,
            )
            .max(Decimal::ZERO),
            event_capacity: parsed(&lookup, "CARTWHEEL_EVENT_CAPACITY", defaults.event_capacity)
                .max(1),
        }
    }

    pub fn key(&self, name: &str) -> String {
        format!("{}{name}", self.key_prefix)
    }

    pub fn cart_prefix(&self) -> String {
        self.key("cart.")
    }

    pub fn cart_meta_prefix(&self) -> String {
        self.key("cartmeta.")
    }

    pub fn wishlist_prefix(&self) -> String {
        self.key("wishlist.")
    }

    pub fn addresses_prefix(&self) -> String {
        self.key("addresses.")
    }

    pub fn orders_prefix(&self) -> String {
        self.key("orders.")
    }

    pub fn default_meta(&self) -> CartMeta {
        CartMeta {
            shipping_fee: self.shipping_fee,
            free_shipping_threshold: self.free_shipping_threshold,
            coupon_code: None,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T {
    match lookup(name) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(variable = name, value = %raw, "ignoring unparsable configuration value");
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_storefront_constants() {
        let config = LedgerConfig::default();
        assert_eq!(config.cart_prefix(), "app.cart.");
        assert_eq!(config.cart_meta_prefix(), "app.cartmeta.");
        assert_eq!(config.default_meta(), CartMeta::default());
        assert_eq!(config.express_surcharge, Decimal::from(4));
    }

    #[test]
    fn lookup_overrides_and_ignores_garbage() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("CARTWHEEL_KEY_PREFIX", "shop."),
            ("CARTWHEEL_SHIPPING_FEE", "5.5"),
            ("CARTWHEEL_FREE_SHIPPING_THRESHOLD", "lots"),
            ("CARTWHEEL_EVENT_CAPACITY", "0"),
        ]);
        let config = LedgerConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.wishlist_prefix(), "shop.wishlist.");
        assert_eq!(config.shipping_fee, Decimal::new(55, 1));
        assert_eq!(config.free_shipping_threshold, Decimal::from(10_000));
        assert_eq!(config.event_capacity, 1);
    }
}
