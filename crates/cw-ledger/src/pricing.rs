use crate::config::DEFAULT_EXPRESS_SURCHARGE;
use cw_api_types::{CartLine, CartMeta, CouponCode, ShippingMode};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

/// Discount and shipping rules applied to a cart.
pub trait PricingPolicy: Send + Sync {
    fn discount(&self, subtotal: Decimal, meta: &CartMeta) -> Decimal;
    fn shipping(&self, subtotal: Decimal, meta: &CartMeta, mode: ShippingMode) -> Decimal;
}

/// `SALE10` takes 10% off, `FREESHIP` waives the base fee, and the base fee
/// also disappears once the subtotal reaches the threshold.
#[derive(Debug, Clone)]
pub struct StandardPricing {
    pub express_surcharge: Decimal,
}

impl Default for StandardPricing {
    fn default() -> Self {
        Self {
            express_surcharge: Decimal::from(DEFAULT_EXPRESS_SURCHARGE),
        }
    }
}

impl PricingPolicy for StandardPricing {
    fn discount(&self, subtotal: Decimal, meta: &CartMeta) -> Decimal {
        match meta.coupon_code {
            Some(CouponCode::Sale10) if subtotal > Decimal::ZERO => round_cents(subtotal * Decimal::new(10, 2)),
            _ => Decimal::ZERO,
        }
    }

    fn shipping(&self, subtotal: Decimal, meta: &CartMeta, mode: ShippingMode) -> Decimal {
        if subtotal <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let base = match meta.coupon_code {
            Some(CouponCode::FreeShip) => Decimal::ZERO,
            _ if subtotal < meta.free_shipping_threshold => meta.shipping_fee,
            _ => Decimal::ZERO,
        };

        match mode {
            ShippingMode::Standard => base,
            ShippingMode::Express => base + self.express_surcharge,
        }
    }
}

/// Sum of quantities, saturating at `u32::MAX`.
pub fn item_count(lines: &[CartLine]) -> u32 {
    lines
        .iter()
        .fold(0u32, |count, line| count.saturating_add(line.quantity))
}

pub fn subtotal(lines: &[CartLine]) -> Decimal {
    lines.iter().map(CartLine::line_total).sum()
}

/// The discount never pushes the goods below zero; shipping is always paid.
pub fn total(subtotal: Decimal, shipping: Decimal, discount: Decimal) -> Decimal {
    (subtotal - discount).max(Decimal::ZERO) + shipping
}

pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub item_count: u32,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub mode: ShippingMode,
}

pub fn quote(policy: &dyn PricingPolicy, lines: &[CartLine], meta: &CartMeta, mode: ShippingMode) -> CartTotals {
    let subtotal = subtotal(lines);
    let discount = policy.discount(subtotal, meta);
    let shipping = policy.shipping(subtotal, meta, mode);
    CartTotals {
        item_count: item_count(lines),
        subtotal,
        discount,
        shipping,
        total: total(subtotal, shipping, discount),
        mode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(coupon: Option<CouponCode>) -> CartMeta {
        CartMeta {
            coupon_code: coupon,
            ..CartMeta::default()
        }
    }

    fn line(id: &str, price: i64, quantity: u32) -> CartLine {
        CartLine::new(id, id, Decimal::from(price), quantity)
    }

    #[test]
    fn sale10_quote_for_two_hundred() {
        let totals = quote(
            &StandardPricing::default(),
            &[line("p1", 100, 2)],
            &meta(Some(CouponCode::Sale10)),
            ShippingMode::Standard,
        );

        assert_eq!(totals.subtotal, Decimal::from(200));
        assert_eq!(totals.discount, Decimal::from(20));
        assert_eq!(totals.shipping, Decimal::from(8));
        assert_eq!(totals.total, Decimal::from(188));
        assert_eq!(totals.item_count, 2);
    }

    #[test]
    fn freeship_quote_for_two_hundred() {
        let totals = quote(
            &StandardPricing::default(),
            &[line("p1", 100, 2)],
            &meta(Some(CouponCode::FreeShip)),
            ShippingMode::Standard,
        );

        assert_eq!(totals.discount, Decimal::ZERO);
        assert_eq!(totals.shipping, Decimal::ZERO);
        assert_eq!(totals.total, Decimal::from(200));
    }

    #[test]
    fn empty_cart_ships_free_in_every_mode() {
        let policy = StandardPricing::default();
        for mode in [ShippingMode::Standard, ShippingMode::Express] {
            assert_eq!(policy.shipping(Decimal::ZERO, &meta(None), mode), Decimal::ZERO);
        }
    }

    #[test]
    fn threshold_is_inclusive() {
        let policy = StandardPricing::default();
        let threshold = CartMeta::default().free_shipping_threshold;

        assert_eq!(policy.shipping(threshold, &meta(None), ShippingMode::Standard), Decimal::ZERO);
        assert_eq!(
            policy.shipping(threshold - Decimal::ONE, &meta(None), ShippingMode::Standard),
            Decimal::from(8)
        );
    }

    #[test]
    fn express_adds_surcharge_even_with_freeship() {
        let policy = StandardPricing::default();
        assert_eq!(
            policy.shipping(Decimal::from(50), &meta(Some(CouponCode::FreeShip)), ShippingMode::Express),
            Decimal::from(4)
        );
        assert_eq!(
            policy.shipping(Decimal::from(50), &meta(None), ShippingMode::Express),
            Decimal::from(12)
        );
    }

    #[test]
    fn sale10_rounds_half_away_from_zero() {
        let policy = StandardPricing::default();
        let sale = meta(Some(CouponCode::Sale10));

        assert_eq!(policy.discount(Decimal::new(1005, 2), &sale), Decimal::new(101, 2));
        assert_eq!(policy.discount(Decimal::new(3333, 2), &sale), Decimal::new(333, 2));
        assert_eq!(policy.discount(Decimal::from(200), &meta(None)), Decimal::ZERO);
    }

    #[test]
    fn subtotal_ignores_line_order() {
        let lines = vec![line("a", 3, 2), line("b", 7, 1), line("c", 1, 5)];
        let mut reversed = lines.clone();
        reversed.reverse();

        assert_eq!(subtotal(&lines), Decimal::from(18));
        assert_eq!(subtotal(&lines), subtotal(&reversed));
    }

    #[test]
    fn total_never_goes_below_shipping() {
        assert_eq!(
            total(Decimal::from(5), Decimal::from(8), Decimal::from(9)),
            Decimal::from(8)
        );
    }
}
