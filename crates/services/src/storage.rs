//! Key-value persistence for the file tree and editor session.
//!
//! Everything lives under string keys in one store, the way the browser
//! shell keeps its state in local storage. [`PersistentTree`] loads the tree
//! on startup and flushes it after every successful mutation.

use anyhow::{Context, Result};
use shared::tree::{PathNotFound, Tree, TreeStore};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Key the serialized tree is stored under
pub const TREE_KEY: &str = "folderStructure";

/// String key-value storage
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// In-process store, nothing survives the process
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// All keys in a single JSON object on disk, rewritten on every change
pub struct JsonFileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`. An unreadable or corrupt
    /// file starts out empty instead of failing startup.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "storage file is corrupt, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "storage file is unreadable, starting empty");
                BTreeMap::new()
            }
        };
        Self { path, entries }
    }

    /// Platform data directory location, or `./storage.json` when none exists.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com.local", "Code Shell", "CodeShell")
            .map(|p| p.data_dir().join("storage.json"))
            .unwrap_or_else(|| PathBuf::from("./storage.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        // Write-then-rename so readers never see a half-written file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let previous = self.entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.flush() {
            match previous {
                Some(old) => self.entries.insert(key.to_string(), old),
                None => self.entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if let Some(old) = self.entries.remove(key) {
            if let Err(e) = self.flush() {
                self.entries.insert(key.to_string(), old);
                return Err(e);
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    PathNotFound(#[from] PathNotFound),

    #[error("failed to persist file tree: {0}")]
    Storage(#[from] anyhow::Error),
}

/// The tree store plus its backing storage.
pub struct PersistentTree<S> {
    store: TreeStore,
    backend: S,
}

impl<S: KeyValueStore> PersistentTree<S> {
    /// Loads the stored tree, defaulting to an empty forest when the key is
    /// absent or holds something that is not a tree.
    pub fn load(backend: S) -> Self {
        let tree = match backend.get(TREE_KEY) {
            Some(text) => match serde_json::from_str::<Tree>(&text) {
                Ok(tree) => tree,
                Err(e) => {
                    warn!(error = %e, "stored file tree is invalid, starting empty");
                    Tree::default()
                }
            },
            None => Tree::default(),
        };
        debug!(files = tree.file_paths().len(), "file tree loaded");
        Self {
            store: TreeStore::new(tree),
            backend,
        }
    }

    pub fn tree(&self) -> &Tree {
        self.store.tree()
    }

    pub fn resolve(&self, path: &str) -> Result<&str, PathNotFound> {
        self.store.resolve(path)
    }

    /// Single-file edit. Memory and storage change together or not at all.
    pub fn write(&mut self, path: &str, content: &str) -> Result<(), StoreError> {
        let updated = self.store.tree().write_content(path, content)?;
        self.persist(&updated)?;
        self.store.replace(updated);
        Ok(())
    }

    /// Whole-tree swap; returns the previous tree.
    pub fn replace(&mut self, tree: Tree) -> Result<Tree, StoreError> {
        self.persist(&tree)?;
        let files = tree.file_paths().len();
        let previous = self.store.replace(tree);
        info!(files, "file tree replaced");
        Ok(previous)
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut S {
        &mut self.backend
    }

    fn persist(&mut self, tree: &Tree) -> Result<(), StoreError> {
        let json = serde_json::to_string(tree).map_err(anyhow::Error::from)?;
        self.backend.set(TREE_KEY, &json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use shared::tree::Node;

    fn sample() -> Tree {
        Tree::new(vec![Node::folder("a", vec![Node::file("b.txt", "hi")])])
    }

    /// Accepts reads, refuses every write
    struct ReadOnlyStore(MemoryStore);

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, key: &str) -> Option<String> {
            self.0.get(key)
        }
        fn set(&mut self, _key: &str, _value: &str) -> Result<()> {
            Err(anyhow!("disk full"))
        }
        fn remove(&mut self, _key: &str) -> Result<()> {
            Err(anyhow!("disk full"))
        }
    }

    #[test]
    fn test_load_defaults_to_empty() {
        let tree = PersistentTree::load(MemoryStore::new());
        assert!(tree.tree().is_empty());

        let mut backend = MemoryStore::new();
        backend.set(TREE_KEY, "{not a tree").unwrap();
        assert!(PersistentTree::load(backend).tree().is_empty());

        let mut backend = MemoryStore::new();
        backend.set(TREE_KEY, r#"{"name":"object-not-array"}"#).unwrap();
        assert!(PersistentTree::load(backend).tree().is_empty());
    }

    #[test]
    fn test_write_flushes() {
        let mut tree = PersistentTree::load(MemoryStore::new());
        tree.replace(sample()).unwrap();
        tree.write("a/b.txt", "bye").unwrap();

        let reloaded = PersistentTree::load(tree.backend().clone());
        assert_eq!(reloaded.resolve("a/b.txt").unwrap(), "bye");
    }

    #[test]
    fn test_failed_write_leaves_everything() {
        let mut tree = PersistentTree::load(MemoryStore::new());
        tree.replace(sample()).unwrap();
        let stored = tree.backend().get(TREE_KEY);

        let err = tree.write("a/nope.txt", "x").unwrap_err();
        assert!(matches!(err, StoreError::PathNotFound(_)));
        assert_eq!(tree.tree(), &sample());
        assert_eq!(tree.backend().get(TREE_KEY), stored);
    }

    #[test]
    fn test_storage_failure_keeps_memory() {
        let mut backend = MemoryStore::new();
        backend
            .set(TREE_KEY, &serde_json::to_string(&sample()).unwrap())
            .unwrap();
        let mut tree = PersistentTree::load(ReadOnlyStore(backend));

        assert!(matches!(
            tree.write("a/b.txt", "bye"),
            Err(StoreError::Storage(_))
        ));
        assert!(tree.replace(Tree::default()).is_err());
        assert_eq!(tree.tree(), &sample());
    }

    #[test]
    fn test_replace_returns_previous() {
        let mut tree = PersistentTree::load(MemoryStore::new());
        tree.replace(sample()).unwrap();
        let previous = tree.replace(Tree::new(vec![Node::file("x", "y")])).unwrap();
        assert_eq!(previous, sample());
        assert_eq!(tree.resolve("x").unwrap(), "y");
    }

    #[test]
    fn test_json_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        let mut store = JsonFileStore::open(&path);
        assert!(store.get("k").is_none());
        store.set("k", "v").unwrap();
        store.set("other", "w").unwrap();
        store.remove("other").unwrap();

        let reopened = JsonFileStore::open(&path);
        assert_eq!(reopened.get("k").as_deref(), Some("v"));
        assert!(reopened.get("other").is_none());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_json_file_store_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "garbage").unwrap();

        let mut store = JsonFileStore::open(&path);
        assert!(store.get("k").is_none());
        store.set("k", "v").unwrap();
        assert_eq!(JsonFileStore::open(&path).get("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_json_file_store_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        assert!(JsonFileStore::open(&path).get("k").is_none());

        // A directory where the file should be cannot be read either
        let blocked = dir.path().join("blocked.json");
        fs::create_dir(&blocked).unwrap();
        let mut store = JsonFileStore::open(&blocked);
        assert!(store.get("k").is_none());
        assert!(store.set("k", "v").is_err());
        assert!(store.get("k").is_none());
    }

    #[test]
    fn test_tree_survives_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");

        let mut tree = PersistentTree::load(JsonFileStore::open(&path));
        tree.replace(sample()).unwrap();
        tree.write("a/b.txt", "persisted").unwrap();

        let reloaded = PersistentTree::load(JsonFileStore::open(&path));
        assert_eq!(reloaded.resolve("a/b.txt").unwrap(), "persisted");
    }
}
