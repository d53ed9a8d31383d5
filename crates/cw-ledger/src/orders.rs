use crate::config::LedgerConfig;
use crate::pricing::CartTotals;
use crate::sync::{ChangeNotifier, LedgerEvent};
use chrono::Utc;
use cw_api_types::{CartLine, Order, OrderItem, OrderStatus, UserId};
use cw_identity::{IdentityResolver, OwnerId};
use cw_storage::LocalStore;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("order `{0}` not found")]
    NotFound(String),
    #[error("order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}

/// Order history of the current owner, newest first.
pub struct OrderBook {
    store: Arc<LocalStore>,
    identity: Arc<IdentityResolver>,
    notifier: ChangeNotifier,
    prefix: String,
}

impl OrderBook {
    pub fn new(
        store: Arc<LocalStore>,
        identity: Arc<IdentityResolver>,
        notifier: ChangeNotifier,
        config: &LedgerConfig,
    ) -> Self {
        Self {
            store,
            identity,
            notifier,
            prefix: config.orders_prefix(),
        }
    }

    pub fn place(&self, lines: &[CartLine], totals: &CartTotals, user_id: Option<UserId>) -> Order {
        let date = Utc::now();
        let order = Order {
            id: Uuid::new_v4().to_string(),
            number: Order::number_for(date),
            date,
            estimated_delivery: Order::estimate_delivery(date),
            total: totals.total,
            status: OrderStatus::Processing,
            items: lines.iter().map(OrderItem::from).collect(),
            user_id,
        };

        let owner = self.identity.current_owner_id();
        let mut orders = self.list_of(&owner);
        orders.insert(0, order.clone());
        self.save(&owner, &orders);
        info!(number = %order.number, total = %order.total, "order placed");
        order
    }

    pub fn list(&self) -> Vec<Order> {
        self.list_of(&self.identity.current_owner_id())
    }

    pub fn list_of(&self, owner: &OwnerId) -> Vec<Order> {
        self.store.read_or_default(&owner.namespaced(&self.prefix))
    }

    /// `None` lists every order.
    pub fn list_by_status(&self, status: Option<OrderStatus>) -> Vec<Order> {
        let orders = self.list();
        match status {
            Some(status) => orders.into_iter().filter(|order| order.status == status).collect(),
            None => orders,
        }
    }

    pub fn get(&self, id: &str) -> Option<Order> {
        self.list().into_iter().find(|order| order.id == id)
    }

    pub fn count(&self) -> usize {
        self.list().len()
    }

    pub fn update_status(&self, id: &str, status: OrderStatus) -> Result<Order, OrderError> {
        let owner = self.identity.current_owner_id();
        let mut orders = self.list_of(&owner);
        let order = orders
            .iter_mut()
            .find(|order| order.id == id)
            .ok_or_else(|| OrderError::NotFound(id.to_owned()))?;
        if !order.status.can_transition_to(status) {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to: status,
            });
        }
        order.status = status;
        let updated = order.clone();
        self.save(&owner, &orders);
        Ok(updated)
    }

    pub fn cancel(&self, id: &str) -> Result<Order, OrderError> {
        self.update_status(id, OrderStatus::Cancelled)
    }

    /// Swap a locally recorded order for the backend's version, in place.
    pub fn replace_order(&self, owner: &OwnerId, local_id: &str, order: Order) {
        let mut orders = self.list_of(owner);
        match orders.iter_mut().find(|existing| existing.id == local_id) {
            Some(existing) => *existing = order,
            None => orders.insert(0, order),
        }
        self.save(owner, &orders);
    }

    /// Overwrite an owner's history with an authoritative list.
    pub fn replace(&self, owner: &OwnerId, orders: Vec<Order>) -> Vec<Order> {
        self.save(owner, &orders);
        orders
    }

    fn save(&self, owner: &OwnerId, orders: &[Order]) {
        self.store.write(&owner.namespaced(&self.prefix), orders);
        self.notifier.notify(LedgerEvent::OrdersChanged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::{StandardPricing, quote};
    use cw_api_types::{CartMeta, ShippingMode};
    use rust_decimal::Decimal;

    fn place_one(book: &OrderBook) -> Order {
        let lines = vec![CartLine::new("p1", "Lamp", Decimal::from(30), 2)];
        let totals = quote(
            &StandardPricing::default(),
            &lines,
            &CartMeta::default(),
            ShippingMode::Standard,
        );
        book.place(&lines, &totals, None)
    }

    #[test]
    fn placed_orders_are_listed_newest_first() {
        let harness = crate::testing::Harness::new();
        let book = harness.orders();

        let first = place_one(&book);
        let second = place_one(&book);

        let listed = book.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
        assert_eq!(first.total, Decimal::from(68));
        assert!(first.number.starts_with("CMD"));
        assert_eq!(first.estimated_delivery - first.date, chrono::Duration::days(7));
    }

    #[test]
    fn lifecycle_rejects_cancel_after_delivery() {
        let harness = crate::testing::Harness::new();
        let book = harness.orders();
        let order = place_one(&book);

        book.update_status(&order.id, OrderStatus::Shipped).ok();
        book.update_status(&order.id, OrderStatus::Delivered).ok();

        assert_eq!(
            book.cancel(&order.id),
            Err(OrderError::InvalidTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Cancelled,
            })
        );
        assert_eq!(book.get(&order.id).map(|o| o.status), Some(OrderStatus::Delivered));
    }

    #[test]
    fn cancelled_orders_are_terminal_and_filterable() {
        let harness = crate::testing::Harness::new();
        let book = harness.orders();
        let cancelled = place_one(&book);
        place_one(&book);

        assert!(book.cancel(&cancelled.id).is_ok());
        assert!(book.update_status(&cancelled.id, OrderStatus::Shipped).is_err());

        assert_eq!(book.list_by_status(Some(OrderStatus::Cancelled)).len(), 1);
        assert_eq!(book.list_by_status(Some(OrderStatus::Processing)).len(), 1);
        assert_eq!(book.list_by_status(None).len(), 2);
        assert_eq!(book.cancel("missing"), Err(OrderError::NotFound("missing".to_owned())));
    }
}
