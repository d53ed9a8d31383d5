use crate::config::LedgerConfig;
use crate::sync::{ChangeNotifier, LedgerEvent};
use cw_api_types::{Address, AddressDraft};
use cw_identity::{IdentityResolver, OwnerId};
use cw_storage::LocalStore;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

const MIN_FULL_NAME: usize = 2;
const MIN_LINE1: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("full name must have at least 2 characters")]
    FullNameTooShort,
    #[error("address line must have at least 4 characters")]
    LineTooShort,
    #[error("address `{0}` not found")]
    NotFound(String),
}

pub fn validate(draft: &AddressDraft) -> Result<(), AddressError> {
    if draft.full_name.trim().chars().count() < MIN_FULL_NAME {
        return Err(AddressError::FullNameTooShort);
    }
    if draft.line1.trim().chars().count() < MIN_LINE1 {
        return Err(AddressError::LineTooShort);
    }
    Ok(())
}

/// Saved addresses of the current owner. At most one is the default, and
/// the book is never left without one while it has entries.
pub struct AddressBook {
    store: Arc<LocalStore>,
    identity: Arc<IdentityResolver>,
    notifier: ChangeNotifier,
    prefix: String,
}

impl AddressBook {
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
            prefix: config.addresses_prefix(),
        }
    }

    pub fn list(&self) -> Vec<Address> {
        self.list_of(&self.identity.current_owner_id())
    }

    pub fn list_of(&self, owner: &OwnerId) -> Vec<Address> {
        self.store.read_or_default(&owner.namespaced(&self.prefix))
    }

    pub fn count(&self) -> usize {
        self.list().len()
    }

    pub fn default_address(&self) -> Option<Address> {
        self.list().into_iter().find(|address| address.is_default)
    }

    pub fn add(&self, draft: AddressDraft) -> Result<Address, AddressError> {
        validate(&draft)?;
        let owner = self.identity.current_owner_id();
        let mut addresses = self.list_of(&owner);
        let address = Address {
            id: Uuid::new_v4().to_string(),
            full_name: draft.full_name.trim().to_owned(),
            line1: draft.line1.trim().to_owned(),
            city: draft.city.trim().to_owned(),
            country: draft.country.trim().to_owned(),
            is_default: draft.is_default || addresses.is_empty(),
        };
        if address.is_default {
            addresses.iter_mut().for_each(|existing| existing.is_default = false);
        }
        addresses.push(address.clone());
        self.save(&owner, addresses);
        Ok(address)
    }

    pub fn update(&self, id: &str, draft: AddressDraft) -> Result<Address, AddressError> {
        validate(&draft)?;
        let owner = self.identity.current_owner_id();
        let mut addresses = self.list_of(&owner);
        if draft.is_default {
            addresses.iter_mut().for_each(|existing| existing.is_default = false);
        }
        let address = addresses
            .iter_mut()
            .find(|address| address.id == id)
            .ok_or_else(|| AddressError::NotFound(id.to_owned()))?;
        address.full_name = draft.full_name.trim().to_owned();
        address.line1 = draft.line1.trim().to_owned();
        address.city = draft.city.trim().to_owned();
        address.country = draft.country.trim().to_owned();
        address.is_default |= draft.is_default;
        let updated = address.clone();
        self.save(&owner, addresses);
        Ok(updated)
    }

    /// Removing the default promotes the first remaining address.
    pub fn remove(&self, id: &str) -> bool {
        let owner = self.identity.current_owner_id();
        let mut addresses = self.list_of(&owner);
        let before = addresses.len();
        addresses.retain(|address| address.id != id);
        let removed = addresses.len() != before;
        self.save(&owner, addresses);
        removed
    }

    pub fn set_default(&self, id: &str) -> Result<Address, AddressError> {
        let owner = self.identity.current_owner_id();
        let mut addresses = self.list_of(&owner);
        if !addresses.iter().any(|address| address.id == id) {
            return Err(AddressError::NotFound(id.to_owned()));
        }
        addresses
            .iter_mut()
            .for_each(|address| address.is_default = address.id == id);
        let chosen = addresses.iter().find(|address| address.is_default).cloned();
        self.save(&owner, addresses);
        chosen.ok_or_else(|| AddressError::NotFound(id.to_owned()))
    }

    /// Swap a locally recorded address for the backend's copy, which may
    /// carry a different id.
    pub fn adopt(&self, owner: &OwnerId, local_id: &str, address: Address) -> Address {
        let mut addresses = self.list_of(owner);
        if address.is_default {
            addresses.iter_mut().for_each(|existing| existing.is_default = false);
        }
        match addresses.iter_mut().find(|existing| existing.id == local_id) {
            Some(existing) => *existing = address.clone(),
            None => addresses.push(address.clone()),
        }
        self.save(owner, addresses);
        self.list_of(owner)
            .into_iter()
            .find(|existing| existing.id == address.id)
            .unwrap_or(address)
    }

    pub fn replace(&self, owner: &OwnerId, addresses: Vec<Address>) -> Vec<Address> {
        self.save(owner, addresses);
        self.list_of(owner)
    }

    fn save(&self, owner: &OwnerId, mut addresses: Vec<Address>) {
        let mut seen_default = false;
        for address in addresses.iter_mut() {
            address.is_default = address.is_default && !seen_default;
            seen_default |= address.is_default;
        }
        if !seen_default {
            if let Some(first) = addresses.first_mut() {
                first.is_default = true;
            }
        }
        self.store.write(&owner.namespaced(&self.prefix), &addresses);
        self.notifier.notify(LedgerEvent::AddressesChanged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;

    fn draft(full_name: &str, line1: &str, is_default: bool) -> AddressDraft {
        AddressDraft {
            full_name: full_name.to_owned(),
            line1: line1.to_owned(),
            city: "Sfax".to_owned(),
            country: "TN".to_owned(),
            is_default,
        }
    }

    #[test]
    fn first_address_becomes_default() -> Result<(), AddressError> {
        let harness = Harness::new();
        let book = harness.addresses();

        let first = book.add(draft("Ines Mansour", "3 rue Ibn Khaldoun", false))?;
        let second = book.add(draft("Ines Mansour", "9 avenue de Carthage", false))?;

        assert!(first.is_default);
        assert!(!second.is_default);
        assert_eq!(book.default_address().map(|a| a.id), Some(first.id));
        Ok(())
    }

    #[test]
    fn new_default_demotes_previous() -> Result<(), AddressError> {
        let harness = Harness::new();
        let book = harness.addresses();
        book.add(draft("Ines Mansour", "3 rue Ibn Khaldoun", false))?;
        let office = book.add(draft("Ines Mansour", "Zone Industrielle", true))?;

        let defaults: Vec<_> = book.list().into_iter().filter(|a| a.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, office.id);
        Ok(())
    }

    #[test]
    fn removing_default_promotes_first_remaining() -> Result<(), AddressError> {
        let harness = Harness::new();
        let book = harness.addresses();
        let home = book.add(draft("Ines Mansour", "3 rue Ibn Khaldoun", false))?;
        let office = book.add(draft("Ines Mansour", "Zone Industrielle", false))?;

        assert!(book.remove(&home.id));
        assert!(!book.remove(&home.id));
        assert_eq!(book.default_address().map(|a| a.id), Some(office.id));
        Ok(())
    }

    #[test]
    fn set_default_and_update() -> Result<(), AddressError> {
        let harness = Harness::new();
        let book = harness.addresses();
        book.add(draft("Ines Mansour", "3 rue Ibn Khaldoun", false))?;
        let office = book.add(draft("Ines Mansour", "Zone Industrielle", false))?;

        assert!(book.set_default(&office.id)?.is_default);
        let updated = book.update(&office.id, draft("I. Mansour", "Zone Industrielle 2", false))?;
        assert!(updated.is_default);
        assert_eq!(updated.full_name, "I. Mansour");
        assert_eq!(book.set_default("nope"), Err(AddressError::NotFound("nope".to_owned())));
        Ok(())
    }

    #[test]
    fn adopt_swaps_local_id_for_backend_copy() -> Result<(), AddressError> {
        let harness = Harness::new();
        let book = harness.addresses();
        let home = book.add(draft("Ines Mansour", "3 rue Ibn Khaldoun", false))?;
        let office = book.add(draft("Ines Mansour", "Zone Industrielle", false))?;
        let owner = harness.identity.current_owner_id();

        let remote = Address {
            id: "srv-7".to_owned(),
            is_default: true,
            ..office.clone()
        };
        let adopted = book.adopt(&owner, &office.id, remote);

        assert_eq!(adopted.id, "srv-7");
        assert!(adopted.is_default);
        let ids: Vec<_> = book.list().into_iter().map(|a| (a.id, a.is_default)).collect();
        assert_eq!(ids, vec![(home.id, false), ("srv-7".to_owned(), true)]);
        Ok(())
    }

    #[test]
    fn validation_rejects_short_fields_without_writing() {
        let harness = Harness::new();
        let book = harness.addresses();

        assert_eq!(book.add(draft("I", "3 rue", false)), Err(AddressError::FullNameTooShort));
        assert_eq!(book.add(draft("Ines", "3r", false)), Err(AddressError::LineTooShort));
        assert_eq!(book.count(), 0);
    }
}
