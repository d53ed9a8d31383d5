use crate::config::LedgerConfig;
use crate::sync::{ChangeNotifier, LedgerEvent};
use cw_api_types::{ProductId, WishItem};
use cw_identity::{IdentityResolver, OwnerId};
use cw_storage::LocalStore;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Favorites of the current owner, newest first, one entry per product.
pub struct WishlistLedger {
    store: Arc<LocalStore>,
    identity: Arc<IdentityResolver>,
    notifier: ChangeNotifier,
    prefix: String,
}

impl WishlistLedger {
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
            prefix: config.wishlist_prefix(),
        }
    }

    pub fn list(&self) -> Vec<WishItem> {
        self.list_of(&self.identity.current_owner_id())
    }

    pub fn list_of(&self, owner: &OwnerId) -> Vec<WishItem> {
        let items: Vec<WishItem> = self.store.read_or_default(&owner.namespaced(&self.prefix));
        dedupe(items)
    }

    pub fn count(&self) -> usize {
        self.list().len()
    }

    pub fn is_favorite(&self, id: &ProductId) -> bool {
        self.list().iter().any(|item| item.id == *id)
    }

    /// Flip membership; returns whether the product is now a favorite.
    pub fn toggle(&self, item: WishItem) -> bool {
        let owner = self.identity.current_owner_id();
        let mut items = self.list_of(&owner);
        let now_favorite = match items.iter().position(|existing| existing.id == item.id) {
            Some(index) => {
                items.remove(index);
                false
            }
            None => {
                items.insert(0, item);
                true
            }
        };
        self.save(&owner, &items);
        now_favorite
    }

    /// Returns `false` when the product was already a favorite.
    pub fn add(&self, item: WishItem) -> bool {
        let owner = self.identity.current_owner_id();
        let mut items = self.list_of(&owner);
        if items.iter().any(|existing| existing.id == item.id) {
            return false;
        }
        items.insert(0, item);
        self.save(&owner, &items);
        true
    }

    pub fn remove(&self, id: &ProductId) -> bool {
        let owner = self.identity.current_owner_id();
        let mut items = self.list_of(&owner);
        let before = items.len();
        items.retain(|item| item.id != *id);
        self.save(&owner, &items);
        items.len() != before
    }

    pub fn clear(&self) {
        let owner = self.identity.current_owner_id();
        self.save(&owner, &[]);
    }

    pub fn replace(&self, owner: &OwnerId, items: Vec<WishItem>) -> Vec<WishItem> {
        let items = dedupe(items);
        self.save(owner, &items);
        items
    }

    pub fn discard(&self, owner: &OwnerId) {
        self.store.remove(&owner.namespaced(&self.prefix));
        self.notifier.notify(LedgerEvent::WishlistChanged);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.notifier.subscribe()
    }

    fn save(&self, owner: &OwnerId, items: &[WishItem]) {
        self.store.write(&owner.namespaced(&self.prefix), items);
        self.notifier.notify(LedgerEvent::WishlistChanged);
    }
}

fn dedupe(items: Vec<WishItem>) -> Vec<WishItem> {
    let mut unique: Vec<WishItem> = Vec::with_capacity(items.len());
    for item in items {
        if !unique.iter().any(|existing| existing.id == item.id) {
            unique.push(item);
        }
    }
    unique
}
