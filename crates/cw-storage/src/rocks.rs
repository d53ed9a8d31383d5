use crate::KeyedStore;
use anyhow::{Context, Result};
use rocksdb::{DB, Options};
use std::path::Path;
use std::sync::Arc;

/// Disk-backed [`KeyedStore`] for native hosts.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
}

impl RocksDbStore {
    pub fn open_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = DB::open(&options, path)
            .with_context(|| format!("failed to open rocksdb store at {}", path.display()))?;
        Ok(Self { db: Arc::new(db) })
    }
}

impl KeyedStore for RocksDbStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let value = self.db.get(key.as_bytes())?;
        match value {
            Some(bytes) => {
                let text = String::from_utf8(bytes)
                    .with_context(|| format!("stored value for {key} is not utf-8"))?;
                Ok(Some(text))
            }
            None => Ok(None),
        }
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        self.db.put(key.as_bytes(), value.as_bytes())?;
        Ok(())
    }

    fn remove_raw(&self, key: &str) -> Result<()> {
        self.db.delete(key.as_bytes())?;
        Ok(())
    }
}
