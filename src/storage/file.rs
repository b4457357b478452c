//! JSON file ledger backend
//!
//! The whole ledger is one JSON object keyed by event id:
//!
//! ```json
//! { "1208021": { "preMatchPosted": true, "matchThreadPosted": false, "postMatchPosted": false } }
//! ```
//!
//! Every write goes to a temp file that is synced and then renamed over the
//! ledger, so a crash leaves either the old or the new contents on disk. The
//! directory is synced after the rename so the new entry survives power loss.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::models::{EventId, Stage};
use crate::storage::ledger::{LedgerStore, StageFlags};
use crate::utils::error::LedgerError;

type LedgerMap = BTreeMap<String, StageFlags>;

/// Ledger stored in a local JSON file
pub struct FileLedgerStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<LedgerMap, LedgerError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LedgerMap::new()),
            Err(e) => return Err(LedgerError::io("read ledger", e)),
        };

        if raw.trim().is_empty() {
            return Ok(LedgerMap::new());
        }

        serde_json::from_str(&raw).map_err(|e| {
            LedgerError::Corrupted(format!("{}: {e}", self.path.display()))
        })
    }

    async fn save(&self, map: &LedgerMap) -> Result<(), LedgerError> {
        let parent = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent,
            None => Path::new("."),
        };
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| LedgerError::io("create ledger directory", e))?;

        let json = serde_json::to_vec_pretty(map)?;

        // Write to temp file first, then rename (atomic)
        let temp_path = temp_path_for(&self.path);
        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| LedgerError::io("create temp ledger", e))?;
        file.write_all(&json)
            .await
            .map_err(|e| LedgerError::io("write temp ledger", e))?;
        file.sync_all()
            .await
            .map_err(|e| LedgerError::io("sync temp ledger", e))?;
        drop(file);

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| LedgerError::io("rename ledger", e))?;
        sync_dir(parent)
            .await
            .map_err(|e| LedgerError::io("sync ledger directory", e))?;

        tracing::debug!(path = %self.path.display(), entries = map.len(), "Ledger saved");
        Ok(())
    }
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "ledger.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[async_trait]
impl LedgerStore for FileLedgerStore {
    async fn get(&self, event_id: EventId) -> Result<StageFlags, LedgerError> {
        let map = self.load().await?;
        Ok(map.get(&event_id.to_string()).copied().unwrap_or_default())
    }

    async fn put(&self, event_id: EventId, flags: StageFlags) -> Result<(), LedgerError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.load().await?;
        let entry = map.entry(event_id.to_string()).or_default();
        *entry = entry.merge(flags);
        self.save(&map).await
    }

    async fn mark(&self, event_id: EventId, stage: Stage) -> Result<bool, LedgerError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.load().await?;
        let newly_set = map.entry(event_id.to_string()).or_default().set(stage);
        if newly_set {
            self.save(&map).await?;
        }
        Ok(newly_set)
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileLedgerStore::new(dir.path().join("state.json"));
        assert_eq!(store.get(EventId(1)).await.unwrap(), StageFlags::default());
    }

    #[tokio::test]
    async fn test_mark_creates_parent_and_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("thread-state.json");
        let store = FileLedgerStore::new(&path);

        assert!(store.mark(EventId(1208021), Stage::PreEvent).await.unwrap());
        assert!(!store.mark(EventId(1208021), Stage::PreEvent).await.unwrap());

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"1208021\""));
        assert!(raw.contains("\"preMatchPosted\": true"));
        assert!(!temp_path_for(&path).exists());
    }

    #[tokio::test]
    async fn test_corrupted_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = FileLedgerStore::new(&path);
        let err = store.get(EventId(1)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Corrupted(_)));
    }

    #[tokio::test]
    async fn test_mark_is_visible_to_a_fresh_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("thread-state.json");

        FileLedgerStore::new(&path)
            .mark(EventId(7), Stage::PostEvent)
            .await
            .unwrap();
        sync_dir(dir.path()).await.unwrap();

        let flags = FileLedgerStore::new(&path).get(EventId(7)).await.unwrap();
        assert!(flags.post_event);
        assert!(!flags.pre_event);
    }

    #[test]
    fn test_temp_path() {
        assert_eq!(
            temp_path_for(Path::new("data/thread-state.json")),
            PathBuf::from("data/thread-state.json.tmp")
        );
    }
}
