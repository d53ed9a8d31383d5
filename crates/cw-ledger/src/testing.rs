use crate::addresses::AddressBook;
use crate::cart::CartLedger;
use crate::config::LedgerConfig;
use crate::orders::OrderBook;
use crate::pricing::StandardPricing;
use crate::sync::ChangeNotifier;
use crate::wishlist::WishlistLedger;
use cw_api_types::{ProductId, RemoteProduct, Session, UserId, UserSnapshot};
use cw_identity::{IdentityResolver, StoredSession};
use cw_storage::{InMemoryStore, LocalStore, StorageBus, StorageScope, TabId};
use rust_decimal::Decimal;
use std::sync::Arc;

/// One tab's worth of stores and identity over in-memory storage.
pub(crate) struct Harness {
    pub config: LedgerConfig,
    pub durable_backend: Arc<InMemoryStore>,
    pub durable: Arc<LocalStore>,
    pub sessions: Arc<StoredSession>,
    pub identity: Arc<IdentityResolver>,
    pub notifier: ChangeNotifier,
}

impl Harness {
    pub fn new() -> Self {
        let durable_backend = Arc::new(InMemoryStore::default());
        let config = LedgerConfig::default();
        let tab = TabId::new_random();
        let durable = Arc::new(
            LocalStore::new(durable_backend.clone(), StorageScope::Durable, tab.clone())
                .with_bus(StorageBus::default()),
        );
        let sessions = Arc::new(StoredSession::new(durable.clone(), &config.key_prefix));
        let identity = Arc::new(IdentityResolver::new(
            sessions.clone(),
            cw_identity::session_scope(Arc::new(InMemoryStore::default()), tab),
            &config.key_prefix,
        ));
        Self {
            notifier: ChangeNotifier::new(config.event_capacity),
            config,
            durable_backend,
            durable,
            sessions,
            identity,
        }
    }

    pub fn sign_in(&self, user_id: &str) {
        self.sessions.sign_in(&session(user_id));
    }

    pub fn sign_out(&self) {
        self.sessions.sign_out();
    }

    pub fn cart(&self) -> CartLedger {
        CartLedger::new(
            self.durable.clone(),
            self.identity.clone(),
            self.notifier.clone(),
            Arc::new(StandardPricing::default()),
            &self.config,
        )
    }

    pub fn wishlist(&self) -> WishlistLedger {
        WishlistLedger::new(
            self.durable.clone(),
            self.identity.clone(),
            self.notifier.clone(),
            &self.config,
        )
    }

    pub fn orders(&self) -> OrderBook {
        OrderBook::new(
            self.durable.clone(),
            self.identity.clone(),
            self.notifier.clone(),
            &self.config,
        )
    }

    pub fn addresses(&self) -> AddressBook {
        AddressBook::new(
            self.durable.clone(),
            self.identity.clone(),
            self.notifier.clone(),
            &self.config,
        )
    }
}

pub(crate) fn session(user_id: &str) -> Session {
    Session {
        token: Some(format!("token-{user_id}")),
        user: UserSnapshot {
            id: UserId::from(user_id),
            email: format!("{user_id}@example.com"),
            first_name: "Nour".to_owned(),
            last_name: "Jaziri".to_owned(),
        },
    }
}

pub(crate) fn product(id: &str, price: i64) -> RemoteProduct {
    RemoteProduct {
        id: ProductId::from(id),
        name: format!("Product {id}"),
        price: Decimal::from(price),
        promo_price: None,
        images: vec![format!("{id}.png")],
        image: None,
    }
}
