//! Record collections backed by flat JSON files or memory

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::{Activity, Bin, Citizen, Contractor, LedgerTransaction, Report};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed collection {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A record addressable by a string id.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> &str;
}

/// Whole-collection load/save. Locking is the caller's job.
#[async_trait]
pub trait Storage<T>: Send + Sync {
    async fn load(&self) -> Result<Vec<T>, StoreError>;
    async fn save(&self, items: &[T]) -> Result<(), StoreError>;
}

/// One pretty-printed JSON array per file.
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl<T: Record> Storage<T> for JsonFile {
    async fn load(&self) -> Result<Vec<T>, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })
    }

    async fn save(&self, items: &[T]) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        let body = serde_json::to_string_pretty(items).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        // Write beside the target, then rename so readers never see a partial file.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

pub struct InMemory<T> {
    items: Mutex<Vec<T>>,
}

impl<T> Default for InMemory<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl<T: Record> Storage<T> for InMemory<T> {
    async fn load(&self) -> Result<Vec<T>, StoreError> {
        Ok(self.items.lock().await.clone())
    }

    async fn save(&self, items: &[T]) -> Result<(), StoreError> {
        *self.items.lock().await = items.to_vec();
        Ok(())
    }
}

/// A keyed collection. Every read-modify-write runs under the collection lock.
pub struct Collection<T> {
    name: &'static str,
    storage: Box<dyn Storage<T>>,
    lock: Mutex<()>,
}

impl<T: Record> Collection<T> {
    pub fn new(name: &'static str, storage: Box<dyn Storage<T>>) -> Self {
        Self {
            name,
            storage,
            lock: Mutex::new(()),
        }
    }

    pub async fn read_all(&self) -> Result<Vec<T>, StoreError> {
        let _guard = self.lock.lock().await;
        self.storage.load().await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<T>, StoreError> {
        Ok(self.read_all().await?.into_iter().find(|item| item.id() == id))
    }

    /// Append a record.
    pub async fn create(&self, item: T) -> Result<T, StoreError> {
        let _guard = self.lock.lock().await;
        let mut items = self.storage.load().await?;
        items.push(item.clone());
        self.storage.save(&items).await?;
        debug!(collection = self.name, id = item.id(), "record created");
        Ok(item)
    }

    /// Replace the record with the same id, or append it.
    #[cfg(test)]
    pub async fn upsert(&self, item: T) -> Result<T, StoreError> {
        let _guard = self.lock.lock().await;
        let mut items = self.storage.load().await?;
        match items.iter_mut().find(|existing| existing.id() == item.id()) {
            Some(existing) => *existing = item.clone(),
            None => items.push(item.clone()),
        }
        self.storage.save(&items).await?;
        Ok(item)
    }

    /// Mutate one record in place against its latest persisted value.
    /// Returns `None` when no record has this id.
    pub async fn modify<R, F>(&self, id: &str, mutate: F) -> Result<Option<R>, StoreError>
    where
        F: FnOnce(&mut T) -> R + Send,
        R: Send,
    {
        let _guard = self.lock.lock().await;
        let mut items = self.storage.load().await?;
        let Some(item) = items.iter_mut().find(|item| item.id() == id) else {
            return Ok(None);
        };
        let result = mutate(item);
        self.storage.save(&items).await?;
        Ok(Some(result))
    }

    /// Mutate every record matching `filter`; returns the updated records.
    pub async fn modify_where<P, F>(&self, filter: P, mut mutate: F) -> Result<Vec<T>, StoreError>
    where
        P: Fn(&T) -> bool + Send,
        F: FnMut(&mut T) + Send,
    {
        let _guard = self.lock.lock().await;
        let mut items = self.storage.load().await?;
        let mut touched = Vec::new();
        for item in items.iter_mut() {
            if filter(&*item) {
                mutate(item);
                touched.push(item.clone());
            }
        }
        if !touched.is_empty() {
            self.storage.save(&items).await?;
        }
        Ok(touched)
    }

    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let mut items = self.storage.load().await?;
        let before = items.len();
        items.retain(|item| item.id() != id);
        if items.len() == before {
            return Ok(false);
        }
        self.storage.save(&items).await?;
        Ok(true)
    }
}

/// All collections the service persists.
pub struct Store {
    pub bins: Collection<Bin>,
    pub activities: Collection<Activity>,
    pub reports: Collection<Report>,
    pub citizens: Collection<Citizen>,
    pub contractors: Collection<Contractor>,
    pub ledger: Collection<LedgerTransaction>,
}

impl Store {
    pub fn open_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let file = |name: &str| Box::new(JsonFile::new(dir.join(format!("{name}.json"))));
        Self {
            bins: Collection::new("bins", file("bins")),
            activities: Collection::new("activities", file("activities")),
            reports: Collection::new("reports", file("reports")),
            citizens: Collection::new("citizens", file("citizens")),
            contractors: Collection::new("contractors", file("contractors")),
            ledger: Collection::new("ledger", file("ledger")),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            bins: Collection::new("bins", Box::<InMemory<Bin>>::default()),
            activities: Collection::new("activities", Box::<InMemory<Activity>>::default()),
            reports: Collection::new("reports", Box::<InMemory<Report>>::default()),
            citizens: Collection::new("citizens", Box::<InMemory<Citizen>>::default()),
            contractors: Collection::new("contractors", Box::<InMemory<Contractor>>::default()),
            ledger: Collection::new("ledger", Box::<InMemory<LedgerTransaction>>::default()),
        }
    }
}

/// In-memory storage whose first `failures` saves return an I/O error.
#[cfg(test)]
pub struct FailingSaves<T> {
    inner: InMemory<T>,
    remaining: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl<T> FailingSaves<T> {
    pub fn new(items: Vec<T>, failures: usize) -> Self {
        Self {
            inner: InMemory {
                items: Mutex::new(items),
            },
            remaining: std::sync::atomic::AtomicUsize::new(failures),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl<T: Record> Storage<T> for FailingSaves<T> {
    async fn load(&self) -> Result<Vec<T>, StoreError> {
        self.inner.load().await
    }

    async fn save(&self, items: &[T]) -> Result<(), StoreError> {
        use std::sync::atomic::Ordering;
        let failing = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Io {
                path: PathBuf::from("bins.json"),
                source: std::io::Error::new(ErrorKind::Other, "disk full"),
            });
        }
        self.inner.save(items).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BinStatus;
    use chrono::Utc;
    use tempfile::tempdir;

    fn bin(id: &str, fill_level: f64) -> Bin {
        Bin {
            id: id.to_string(),
            location: "Raja Park".to_string(),
            fill_level,
            gas_level: 1.0,
            status: BinStatus::Normal,
            last_updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty_collection() {
        let dir = tempdir().expect("tempdir");
        let store = Store::open_dir(dir.path());
        assert!(store.bins.read_all().await.unwrap().is_empty());
        assert!(store.bins.find_by_id("BIN001").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_backed_collection_persists_across_reopen() {
        let dir = tempdir().expect("tempdir");
        {
            let store = Store::open_dir(dir.path());
            store.bins.create(bin("BIN001", 40.0)).await.unwrap();
            store.bins.upsert(bin("BIN001", 55.0)).await.unwrap();
            store.bins.upsert(bin("BIN002", 10.0)).await.unwrap();
        }
        assert!(dir.path().join("bins.json").exists());

        let reopened = Store::open_dir(dir.path());
        let bins = reopened.bins.read_all().await.unwrap();
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].fill_level, 55.0);
    }

    #[tokio::test]
    async fn modify_reports_missing_ids() {
        let store = Store::in_memory();
        store.bins.create(bin("BIN001", 40.0)).await.unwrap();

        let missing = store.bins.modify("BIN404", |b| b.fill_level = 0.0).await.unwrap();
        assert!(missing.is_none());

        let prior = store
            .bins
            .modify("BIN001", |b| std::mem::replace(&mut b.fill_level, 0.0))
            .await
            .unwrap();
        assert_eq!(prior, Some(40.0));
        let saved = store.bins.find_by_id("BIN001").await.unwrap().unwrap();
        assert_eq!(saved.fill_level, 0.0);
    }

    #[tokio::test]
    async fn modify_where_and_delete() {
        let store = Store::in_memory();
        for (id, fill) in [("BIN001", 10.0), ("BIN002", 90.0), ("BIN003", 95.0)] {
            store.bins.create(bin(id, fill)).await.unwrap();
        }
        let touched = store
            .bins
            .modify_where(|b| b.fill_level >= 90.0, |b| b.fill_level = 0.0)
            .await
            .unwrap();
        assert_eq!(touched.len(), 2);

        assert!(store.bins.delete("BIN002").await.unwrap());
        assert!(!store.bins.delete("BIN002").await.unwrap());
        assert_eq!(store.bins.read_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn malformed_file_surfaces_json_error() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("bins.json"), "{not json").unwrap();
        let store = Store::open_dir(dir.path());
        let err = store.bins.read_all().await.unwrap_err();
        assert!(matches!(err, StoreError::Json { .. }));
    }
}
