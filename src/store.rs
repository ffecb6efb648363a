//! Opaque key-value hand-off for controller state.
//!
//! The controller rewrites both documents in full on every recomputation;
//! nothing is patched incrementally.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;

/// Document key for the routing-table set.
pub const TABLES_KEY: &str = "routing_tables";
/// Document key for the broadcast message.
pub const BROADCAST_KEY: &str = "broadcast";

pub trait StateStore: Send + Sync {
    fn put(&self, key: &str, document: &str) -> anyhow::Result<()>;
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
}

/// Stores each document as a pretty-printed JSON file under one directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating state directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StateStore for JsonFileStore {
    fn put(&self, key: &str, document: &str) -> anyhow::Result<()> {
        let path = self.path_for(key);
        fs::write(&path, document).with_context(|| format!("writing {}", path.display()))
    }

    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }
}
