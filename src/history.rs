//! JSON file backed watch history
//!
//! Stored at ~/.local/share/reelcast/history.json. Lists are ordered with
//! the most recent entry first.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::api::{HistoryKind, WatchHistoryStore};
use crate::models::Item;

/// Longest list kept per kind
const MAX_ENTRIES: usize = 200;

type Lists = HashMap<HistoryKind, Vec<Item>>;

pub struct JsonHistoryStore {
    path: PathBuf,
    // Serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl JsonHistoryStore {
    /// Store in the user data directory
    pub fn open_default() -> Result<Self> {
        let path = dirs::data_dir()
            .context("Could not determine data directory")?
            .join("reelcast")
            .join("history.json");
        Ok(Self::new(path))
    }

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Lists> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("Corrupt history file {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Lists::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, lists: &Lists) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string_pretty(lists)?;
        tokio::fs::write(&self.path, raw).await?;
        Ok(())
    }
}

#[async_trait]
impl WatchHistoryStore for JsonHistoryStore {
    async fn get(&self, kind: HistoryKind) -> Result<Vec<Item>> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.remove(&kind).unwrap_or_default())
    }

    /// Insert at the front; an item already present moves to the front
    async fn set(&self, kind: HistoryKind, item: &Item) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut lists = self.read().await?;
        let list = lists.entry(kind).or_default();
        list.retain(|existing| existing.ids != item.ids || existing.kind != item.kind);
        list.insert(0, item.clone());
        list.truncate(MAX_ENTRIES);
        self.write(&lists).await
    }
}
