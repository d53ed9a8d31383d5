use crate::config::LedgerConfig;
use cw_identity::SESSION_KEY;
use cw_storage::{ForeignChanges, StorageChange};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Signal that some projection must be recomputed. Carries no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LedgerEvent {
    CartChanged,
    WishlistChanged,
    AddressesChanged,
    OrdersChanged,
    AuthChanged,
}

impl LedgerEvent {
    pub const ALL: [LedgerEvent; 5] = [
        LedgerEvent::CartChanged,
        LedgerEvent::WishlistChanged,
        LedgerEvent::AddressesChanged,
        LedgerEvent::OrdersChanged,
        LedgerEvent::AuthChanged,
    ];
}

/// In-process publish/subscribe for ledger events.
#[derive(Clone)]
pub struct ChangeNotifier {
    sender: broadcast::Sender<LedgerEvent>,
}

impl ChangeNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn notify(&self, event: LedgerEvent) {
        debug!(?event, "ledger event");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EVENT_CAPACITY)
    }
}

/// Turns storage changes made by other tabs into ledger events.
pub struct Synchronizer {
    routes: Vec<(String, Vec<LedgerEvent>)>,
    notifier: ChangeNotifier,
}

impl Synchronizer {
    pub fn new(config: &LedgerConfig, notifier: ChangeNotifier) -> Self {
        use LedgerEvent::*;

        let routes = vec![
            (config.cart_prefix(), vec![CartChanged]),
            (config.cart_meta_prefix(), vec![CartChanged]),
            (config.wishlist_prefix(), vec![WishlistChanged]),
            (config.addresses_prefix(), vec![AddressesChanged]),
            (config.orders_prefix(), vec![OrdersChanged]),
            // A different user means every owner-scoped projection is stale.
            (config.key(SESSION_KEY), LedgerEvent::ALL.to_vec()),
        ];
        Self { routes, notifier }
    }

    pub fn events_for(&self, change: &StorageChange) -> Vec<LedgerEvent> {
        let Some(key) = change.key.as_deref() else {
            return LedgerEvent::ALL.to_vec();
        };

        let mut events = Vec::new();
        for (prefix, mapped) in &self.routes {
            if key.starts_with(prefix.as_str()) {
                for event in mapped {
                    if !events.contains(event) {
                        events.push(*event);
                    }
                }
            }
        }
        events
    }

    /// Publish the events for one change; returns how many were sent.
    pub fn apply(&self, change: &StorageChange) -> usize {
        let events = self.events_for(change);
        for event in &events {
            self.notifier.notify(*event);
        }
        events.len()
    }

    /// Forward pending changes without waiting.
    pub fn drain(&self, changes: &mut ForeignChanges) -> usize {
        let mut published = 0;
        while let Some(change) = changes.try_recv() {
            published += self.apply(&change);
        }
        published
    }

    /// Forward changes until the storage bus closes.
    pub async fn run(&self, mut changes: ForeignChanges) {
        while let Some(change) = changes.recv().await {
            self.apply(&change);
        }
        debug!("storage bus closed, synchronizer stopping");
    }
}

/// Header and account-menu badges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountCounters {
    pub cart_items: u32,
    pub wishlist: usize,
    pub addresses: usize,
    pub orders: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use cw_storage::{StorageScope, TabId};

    fn change(key: Option<&str>) -> StorageChange {
        StorageChange {
            key: key.map(str::to_owned),
            scope: StorageScope::Durable,
            origin: TabId::remote(),
        }
    }

    #[test]
    fn routes_by_key_prefix() {
        let sync = Synchronizer::new(&LedgerConfig::default(), ChangeNotifier::default());

        assert_eq!(sync.events_for(&change(Some("app.cart.guest-1"))), vec![LedgerEvent::CartChanged]);
        assert_eq!(
            sync.events_for(&change(Some("app.cartmeta.user-9"))),
            vec![LedgerEvent::CartChanged]
        );
        assert_eq!(
            sync.events_for(&change(Some("app.wishlist.user-9"))),
            vec![LedgerEvent::WishlistChanged]
        );
        assert!(sync.events_for(&change(Some("unrelated"))).is_empty());
    }

    #[test]
    fn session_and_cleared_storage_refresh_everything() {
        let sync = Synchronizer::new(&LedgerConfig::default(), ChangeNotifier::default());

        assert_eq!(sync.events_for(&change(Some("app.session"))).len(), 5);
        assert_eq!(sync.events_for(&change(None)), LedgerEvent::ALL.to_vec());
    }

    #[test]
    fn apply_publishes_to_subscribers() {
        let notifier = ChangeNotifier::new(8);
        let mut events = notifier.subscribe();
        let sync = Synchronizer::new(&LedgerConfig::default(), notifier);

        assert_eq!(sync.apply(&change(Some("app.orders.user-1"))), 1);
        assert_eq!(events.try_recv().ok(), Some(LedgerEvent::OrdersChanged));
    }
}
