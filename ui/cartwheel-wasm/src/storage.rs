//! Browser storage.
//!
//! `WebStorage` adapts `localStorage`/`sessionStorage` to [`KeyedStore`].
//! `forward_storage_events` turns the window's `storage` events, which only
//! fire for writes made by other tabs, into [`StorageBus`] changes.

use anyhow::{Context, Result, anyhow};
use cw_storage::{KeyedStore, StorageBus, StorageChange, StorageScope, TabId};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::StorageEvent;

/// Looks the storage area up on every call; `web_sys::Storage` cannot be
/// held by a `Send + Sync` store.
pub struct WebStorage {
    scope: StorageScope,
}

impl WebStorage {
    pub fn local() -> Self {
        Self {
            scope: StorageScope::Durable,
        }
    }

    pub fn session() -> Self {
        Self {
            scope: StorageScope::Session,
        }
    }

    fn area(&self) -> Result<web_sys::Storage> {
        let window = web_sys::window().context("no window")?;
        let area = match self.scope {
            StorageScope::Durable => window.local_storage(),
            StorageScope::Session => window.session_storage(),
        };
        area.map_err(|err| anyhow!("storage access denied: {err:?}"))?
            .context("storage unavailable")
    }
}

impl KeyedStore for WebStorage {
    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        self.area()?
            .get_item(key)
            .map_err(|err| anyhow!("getItem({key}) failed: {err:?}"))
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        self.area()?
            .set_item(key, value)
            .map_err(|err| anyhow!("setItem({key}) failed: {err:?}"))
    }

    fn remove_raw(&self, key: &str) -> Result<()> {
        self.area()?
            .remove_item(key)
            .map_err(|err| anyhow!("removeItem({key}) failed: {err:?}"))
    }
}

/// Publish every `storage` event on `bus` as a remote durable change.
/// A `null` key (another tab called `clear()`) becomes a full resync.
pub fn forward_storage_events(bus: StorageBus) -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;

    let cb = Closure::wrap(Box::new(move |event: StorageEvent| {
        bus.publish(StorageChange {
            key: event.key(),
            scope: StorageScope::Durable,
            origin: TabId::remote(),
        });
    }) as Box<dyn FnMut(StorageEvent)>);
    window.add_event_listener_with_callback("storage", cb.as_ref().unchecked_ref())?;
    cb.forget();
    Ok(())
}
