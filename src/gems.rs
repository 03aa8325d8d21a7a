use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Error, Debug)]
pub enum GemError {
    #[error("No such gem {0} in channel")]
    NotFound(u64),

    #[error("Gem file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Gem file format error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, GemError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gem {
    pub id: u64,
    pub creator: String,
    pub date: DateTime<Utc>,
    pub text: String,
}

/// On-disk snapshot: the id counter plus every channel's gems.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GemDb {
    /// Next id to hand out; shared by all channels and never reused.
    count: u64,
    gems: HashMap<String, Vec<Gem>>,
}

impl GemDb {
    fn channel(&self, channel_id: &str) -> &[Gem] {
        self.gems.get(channel_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Channel-keyed quote store persisted as a single YAML file.
///
/// Every operation, reads included, runs under one lock. Mutations are made on
/// a copy of the snapshot and only replace the live one once it is on disk, so
/// a failed write leaves the store unchanged.
#[derive(Clone)]
pub struct GemStore {
    db: Arc<Mutex<GemDb>>,
    path: PathBuf,
}

impl GemStore {
    /// Open the store at `path`; a missing file starts an empty store.
    pub async fn open(path: &Path) -> Result<Self> {
        let db = match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let db: GemDb = serde_yaml::from_str(&content)?;
                info!("Loaded {}", path.display());
                db
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No gem file at {}, starting empty", path.display());
                GemDb::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            path: path.to_path_buf(),
        })
    }

    pub async fn add(
        &self,
        channel_id: &str,
        creator: &str,
        date: DateTime<Utc>,
        text: &str,
    ) -> Result<u64> {
        let mut db = self.db.lock().await;
        let mut next = db.clone();
        let id = next.count;
        next.count += 1;
        next.gems.entry(channel_id.to_string()).or_default().push(Gem {
            id,
            creator: creator.to_string(),
            date,
            text: text.to_string(),
        });
        self.flush(&next).await?;
        *db = next;
        Ok(id)
    }

    pub async fn get(&self, channel_id: &str, id: u64) -> Option<Gem> {
        let db = self.db.lock().await;
        db.channel(channel_id).iter().find(|g| g.id == id).cloned()
    }

    pub async fn random(&self, channel_id: &str) -> Option<Gem> {
        let db = self.db.lock().await;
        db.channel(channel_id)
            .choose(&mut rand::thread_rng())
            .cloned()
    }

    pub async fn count(&self, channel_id: &str) -> usize {
        let db = self.db.lock().await;
        db.channel(channel_id).len()
    }

    /// Case-insensitive match on creator or text, stopping at `limit` hits.
    pub async fn search(&self, channel_id: &str, term: &str, limit: Option<usize>) -> Vec<Gem> {
        let term = term.to_lowercase();
        let db = self.db.lock().await;
        db.channel(channel_id)
            .iter()
            .filter(|g| {
                g.creator.to_lowercase().contains(&term) || g.text.to_lowercase().contains(&term)
            })
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub async fn remove(&self, channel_id: &str, id: u64) -> Result<()> {
        let mut db = self.db.lock().await;
        if !db.channel(channel_id).iter().any(|g| g.id == id) {
            return Err(GemError::NotFound(id));
        }
        let mut next = db.clone();
        if let Some(list) = next.gems.get_mut(channel_id) {
            list.retain(|g| g.id != id);
        }
        self.flush(&next).await?;
        *db = next;
        Ok(())
    }

    /// Write the snapshot next to the target and rename it into place.
    async fn flush(&self, db: &GemDb) -> Result<()> {
        let yaml = serde_yaml::to_string(db)?;
        let tmp = self.path.with_extension("yml.tmp");
        tokio::fs::write(&tmp, yaml).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        info!("Saved {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_temp() -> (tempfile::TempDir, GemStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = GemStore::open(&dir.path().join("gems.yml")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_add_then_get() {
        let (_dir, store) = open_temp().await;
        let now = Utc::now();
        let id = store.add("chan", "alice", now, "hello").await.unwrap();

        let gem = store.get("chan", id).await.unwrap();
        assert_eq!(
            gem,
            Gem {
                id,
                creator: "alice".to_string(),
                date: now,
                text: "hello".to_string(),
            }
        );
        assert!(store.get("other", id).await.is_none());
    }

    #[tokio::test]
    async fn test_remove_then_get() {
        let (_dir, store) = open_temp().await;
        let id = store.add("chan", "alice", Utc::now(), "bye").await.unwrap();
        store.remove("chan", id).await.unwrap();
        assert!(store.get("chan", id).await.is_none());
        assert_eq!(store.count("chan").await, 0);
    }

    #[tokio::test]
    async fn test_remove_missing_is_not_found() {
        let (_dir, store) = open_temp().await;
        store.add("chan", "alice", Utc::now(), "x").await.unwrap();
        assert!(matches!(
            store.remove("chan", 42).await,
            Err(GemError::NotFound(42))
        ));
        assert!(matches!(
            store.remove("nowhere", 0).await,
            Err(GemError::NotFound(0))
        ));
        assert_eq!(store.count("chan").await, 1);
    }

    #[tokio::test]
    async fn test_ids_global_across_channels() {
        let (_dir, store) = open_temp().await;
        let mut last = None;
        for (i, chan) in ["a", "b", "a", "c", "b"].iter().enumerate() {
            let id = store
                .add(chan, "bob", Utc::now(), &format!("gem {}", i))
                .await
                .unwrap();
            if let Some(prev) = last {
                assert!(id > prev);
            }
            last = Some(id);
        }
        assert_eq!(store.count("a").await, 2);
        assert_eq!(store.count("b").await, 2);
        assert_eq!(store.count("c").await, 1);
    }

    #[tokio::test]
    async fn test_ids_not_reused_after_remove() {
        let (_dir, store) = open_temp().await;
        let first = store.add("chan", "a", Utc::now(), "1").await.unwrap();
        store.remove("chan", first).await.unwrap();
        let second = store.add("chan", "a", Utc::now(), "2").await.unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_concurrent_adds() {
        let (_dir, store) = open_temp().await;
        let n = 32;
        let handles: Vec<_> = (0..n)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .add("chan", "user", Utc::now(), &format!("gem {}", i))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), n);
        assert_eq!(store.count("chan").await, n);
    }

    #[tokio::test]
    async fn test_random() {
        let (_dir, store) = open_temp().await;
        assert!(store.random("chan").await.is_none());
        store.add("chan", "a", Utc::now(), "only").await.unwrap();
        assert_eq!(store.random("chan").await.unwrap().text, "only");
    }

    #[tokio::test]
    async fn test_search_matches_creator_or_text() {
        let (_dir, store) = open_temp().await;
        store.add("chan", "Alice", Utc::now(), "first").await.unwrap();
        store.add("chan", "bob", Utc::now(), "ALICE said hi").await.unwrap();
        store.add("chan", "carol", Utc::now(), "unrelated").await.unwrap();

        let hits = store.search("chan", "alice", None).await;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].creator, "Alice");

        let limited = store.search("chan", "alice", Some(1)).await;
        assert_eq!(limited.len(), 1);

        assert!(store.search("empty", "alice", None).await.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gems.yml");
        {
            let store = GemStore::open(&path).await.unwrap();
            store.add("chan", "a", Utc::now(), "kept").await.unwrap();
            let gone = store.add("chan", "a", Utc::now(), "gone").await.unwrap();
            store.remove("chan", gone).await.unwrap();
        }

        let store = GemStore::open(&path).await.unwrap();
        assert_eq!(store.get("chan", 0).await.unwrap().text, "kept");
        assert!(store.get("chan", 1).await.is_none());
        let next = store.add("chan", "a", Utc::now(), "new").await.unwrap();
        assert_eq!(next, 2);
    }

    #[tokio::test]
    async fn test_failed_add_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = GemStore::open(&dir.path().join("missing").join("gems.yml"))
            .await
            .unwrap();

        let result = store.add("chan", "alice", Utc::now(), "ghost").await;
        assert!(matches!(result, Err(GemError::Io(_))));
        assert!(store.get("chan", 0).await.is_none());
        assert_eq!(store.count("chan").await, 0);
        assert!(store.search("chan", "ghost", None).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_remove_keeps_gem() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir(&data).unwrap();
        let store = GemStore::open(&data.join("gems.yml")).await.unwrap();
        let id = store.add("chan", "alice", Utc::now(), "keep me").await.unwrap();

        std::fs::remove_dir_all(&data).unwrap();
        assert!(matches!(
            store.remove("chan", id).await,
            Err(GemError::Io(_))
        ));
        assert_eq!(store.get("chan", id).await.unwrap().text, "keep me");

        // The id counter did not move either.
        std::fs::create_dir(&data).unwrap();
        let next = store.add("chan", "alice", Utc::now(), "next").await.unwrap();
        assert_eq!(next, id + 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gems.yml");
        std::fs::write(&path, "count: [not a number").unwrap();
        assert!(matches!(
            GemStore::open(&path).await,
            Err(GemError::Yaml(_))
        ));
    }
}
