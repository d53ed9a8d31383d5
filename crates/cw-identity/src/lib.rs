use cw_api_types::{Session, UserId, UserSnapshot};
use cw_storage::{KeyedStore, LocalStore, StorageScope, TabId};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Key suffix of the persisted session, durable scope.
pub const SESSION_KEY: &str = "session";
/// Key suffix of the per-session guest id, session scope.
pub const GUEST_KEY: &str = "guestId";

/// Source of the signed-in user, if any.
pub trait SessionProvider: Send + Sync {
    fn current_session(&self) -> Option<Session>;
}

/// Session persisted in durable storage under `<prefix>session`.
pub struct StoredSession {
    store: Arc<LocalStore>,
    key: String,
}

impl StoredSession {
    pub fn new(store: Arc<LocalStore>, prefix: &str) -> Self {
        Self {
            store,
            key: format!("{prefix}{SESSION_KEY}"),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn sign_in(&self, session: &Session) {
        info!(user_id = %session.user.id, "session stored");
        self.store.write(&self.key, session);
    }

    pub fn sign_out(&self) {
        info!("session cleared");
        self.store.remove(&self.key);
    }
}

impl SessionProvider for StoredSession {
    fn current_session(&self) -> Option<Session> {
        self.store
            .read::<Option<Session>>(&self.key, None)
            .filter(|session| !session.user.id.as_str().trim().is_empty())
    }
}

/// Fixed session, for hosts that resolve identity elsewhere.
#[derive(Default)]
pub struct StaticSession(pub Option<Session>);

impl SessionProvider for StaticSession {
    fn current_session(&self) -> Option<Session> {
        self.0.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    User(UserId),
    Guest(String),
}

impl Identity {
    pub fn owner_id(&self) -> OwnerId {
        match self {
            Self::User(id) => OwnerId::user(id),
            Self::Guest(id) => OwnerId::guest(id),
        }
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::User(id) => Some(id),
            Self::Guest(_) => None,
        }
    }
}

/// Namespace component of every owner-scoped storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn user(id: &UserId) -> Self {
        Self(format!("user-{id}"))
    }

    pub fn guest(id: &str) -> Self {
        Self(format!("guest-{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_guest(&self) -> bool {
        self.0.starts_with("guest-")
    }

    pub fn namespaced(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.0)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decides whose data the ledgers operate on.
pub struct IdentityResolver {
    sessions: Arc<dyn SessionProvider>,
    session_scope: Arc<LocalStore>,
    guest_key: String,
}

impl IdentityResolver {
    pub fn new(sessions: Arc<dyn SessionProvider>, session_scope: Arc<LocalStore>, prefix: &str) -> Self {
        Self {
            sessions,
            session_scope,
            guest_key: format!("{prefix}{GUEST_KEY}"),
        }
    }

    pub fn current_user(&self) -> Option<UserSnapshot> {
        self.current_session().map(|session| session.user)
    }

    pub fn current_identity(&self) -> Identity {
        match self.current_session() {
            Some(session) => Identity::User(session.user.id),
            None => Identity::Guest(self.guest_id()),
        }
    }

    pub fn current_owner_id(&self) -> OwnerId {
        self.current_identity().owner_id()
    }

    /// The guest id of this session, without creating one.
    pub fn existing_guest(&self) -> Option<OwnerId> {
        self.stored_guest_id().map(|id| OwnerId::guest(&id))
    }

    pub fn forget_guest(&self) {
        debug!("guest id discarded");
        self.session_scope.remove(&self.guest_key);
    }

    pub fn bearer_token(&self) -> Option<String> {
        self.current_session()
            .and_then(|session| session.token)
            .filter(|token| !token.trim().is_empty())
    }

    fn guest_id(&self) -> String {
        if let Some(id) = self.stored_guest_id() {
            return id;
        }
        let id = Uuid::new_v4().to_string();
        debug!(guest_id = %id, "created guest id");
        self.session_scope.write(&self.guest_key, &id);
        id
    }

    fn stored_guest_id(&self) -> Option<String> {
        self.session_scope
            .read::<Option<String>>(&self.guest_key, None)
            .filter(|id| !id.trim().is_empty())
    }
}

impl SessionProvider for IdentityResolver {
    fn current_session(&self) -> Option<Session> {
        self.sessions.current_session()
    }
}

/// Convenience for wiring a fresh session-scope store.
pub fn session_scope(backend: Arc<dyn KeyedStore>, origin: TabId) -> Arc<LocalStore> {
    Arc::new(LocalStore::new(backend, StorageScope::Session, origin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cw_storage::InMemoryStore;

    fn session(id: &str, token: Option<&str>) -> Session {
        Session {
            token: token.map(str::to_owned),
            user: UserSnapshot {
                id: UserId::from(id),
                email: format!("{id}@example.com"),
                first_name: "Lina".to_owned(),
                last_name: "Haddad".to_owned(),
            },
        }
    }

    struct Fixture {
        durable: Arc<LocalStore>,
        stored: Arc<StoredSession>,
        resolver: IdentityResolver,
    }

    fn fixture() -> Fixture {
        let tab = TabId::new_random();
        let durable = Arc::new(LocalStore::new(
            Arc::new(InMemoryStore::default()),
            StorageScope::Durable,
            tab.clone(),
        ));
        let stored = Arc::new(StoredSession::new(durable.clone(), "app."));
        let resolver = IdentityResolver::new(
            stored.clone(),
            session_scope(Arc::new(InMemoryStore::default()), tab),
            "app.",
        );
        Fixture {
            durable,
            stored,
            resolver,
        }
    }

    #[test]
    fn guest_id_is_created_once_per_session() {
        let fx = fixture();
        assert_eq!(fx.resolver.existing_guest(), None);

        let first = fx.resolver.current_owner_id();
        let second = fx.resolver.current_owner_id();

        assert!(first.is_guest());
        assert_eq!(first, second);
        assert_eq!(fx.resolver.existing_guest(), Some(first));
    }

    #[test]
    fn signed_in_user_takes_precedence_over_guest() {
        let fx = fixture();
        let guest = fx.resolver.current_owner_id();

        fx.stored.sign_in(&session("42", Some("tok")));

        assert_eq!(fx.resolver.current_owner_id().as_str(), "user-42");
        assert_eq!(fx.resolver.bearer_token().as_deref(), Some("tok"));
        assert_eq!(fx.resolver.existing_guest(), Some(guest));

        fx.stored.sign_out();
        assert!(fx.resolver.current_owner_id().is_guest());
        assert_eq!(fx.resolver.bearer_token(), None);
    }

    #[test]
    fn forgetting_guest_yields_fresh_identity() {
        let fx = fixture();
        let before = fx.resolver.current_owner_id();

        fx.resolver.forget_guest();

        assert_eq!(fx.resolver.existing_guest(), None);
        assert_ne!(fx.resolver.current_owner_id(), before);
    }

    #[test]
    fn malformed_session_reads_as_signed_out() -> anyhow::Result<()> {
        let backend = Arc::new(InMemoryStore::default());
        backend.set_raw("app.session", "{\"user\":")?;
        let durable = Arc::new(LocalStore::new(backend, StorageScope::Durable, TabId::new_random()));
        let stored = StoredSession::new(durable, "app.");

        assert_eq!(stored.current_session(), None);
        Ok(())
    }

    #[test]
    fn numeric_user_ids_are_accepted() -> anyhow::Result<()> {
        let fx = fixture();
        let session: Session =
            serde_json::from_str(r#"{"token":null,"user":{"id":7,"email":"a@b.c"}}"#)?;
        fx.durable.write("app.session", &session);

        assert_eq!(fx.resolver.current_owner_id().namespaced("app.cart."), "app.cart.user-7");
        assert_eq!(fx.resolver.bearer_token(), None);
        Ok(())
    }
}
