//! Settings persisted to a TOML file
//!
//! Writes replace the file atomically. [`TomlSettings::watch`] picks up edits
//! made by other processes (e.g. `muffle hide` while `muffle run` is active)
//! and fires change handlers for the keys whose value actually changed.

use super::{HandlerRegistry, SettingsDocument};
use muffle_core::domain::store::{
    self, ChangeHandler, SettingKey, SettingsBackend, StoreError, SubscriptionId,
};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

pub type Result<T> = std::result::Result<T, SettingsError>;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),
}

impl From<SettingsError> for StoreError {
    fn from(e: SettingsError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

struct Shared {
    path: PathBuf,
    document: RwLock<SettingsDocument>,
    handlers: HandlerRegistry,
    // Serializes read-modify-write against reloads
    write_lock: Mutex<()>,
}

impl Shared {
    fn persist(&self, document: &SettingsDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(document)?;
        let tmp_path = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, contents)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn update(&self, key: SettingKey, apply: impl FnOnce(&mut SettingsDocument) -> store::Result<()>) -> store::Result<()> {
        {
            let _guard = self.write_lock.lock();
            let mut next = self.document.read().clone();
            apply(&mut next)?;
            self.persist(&next)?;
            *self.document.write() = next;
        }
        debug!(%key, path = %self.path.display(), "Setting written");
        self.handlers.notify(key);
        Ok(())
    }

    /// Re-read the file and notify keys that differ from memory
    fn reload(&self) {
        let changed = {
            let _guard = self.write_lock.lock();
            let loaded = match read_document(&self.path) {
                Ok(Some(document)) => document,
                Ok(None) => return,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Ignoring unreadable settings file");
                    return;
                }
            };
            let mut current = self.document.write();
            let changed = current.changed_keys(&loaded);
            *current = loaded;
            changed
        };

        if !changed.is_empty() {
            info!(keys = ?changed, "Settings changed on disk");
        }
        for key in changed {
            self.handlers.notify(key);
        }
    }
}

fn read_document(path: &Path) -> Result<Option<SettingsDocument>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(toml::from_str(&contents)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Settings stored in a TOML file.
///
/// `SettingsBackend` writes are synchronous: the file has been replaced by the
/// time a setter returns, so callers on a runtime block for one small write.
/// Only `open` goes through `tokio::fs`.
pub struct TomlSettings {
    shared: Arc<Shared>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl TomlSettings {
    /// Open the settings file. A missing file reads as all-empty.
    #[instrument(skip(path))]
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let document = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Settings file not found, starting empty");
                SettingsDocument::default()
            }
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), "Settings opened");
        Ok(Self {
            shared: Arc::new(Shared {
                path,
                document: RwLock::new(document),
                handlers: HandlerRegistry::default(),
                write_lock: Mutex::new(()),
            }),
            watcher: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn snapshot(&self) -> SettingsDocument {
        self.shared.document.read().clone()
    }

    /// Start reloading on external modification. Idempotent.
    pub fn watch(&self) -> Result<()> {
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return Ok(());
        }

        // Watch the directory: atomic replacement swaps the file's inode
        let dir = match self.shared.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let file_name = self.shared.path.file_name().map(|n| n.to_os_string());

        let shared = Arc::downgrade(&self.shared);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    error!("Settings watch error: {}", e);
                    return;
                }
            };
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                return;
            }
            let touches_file = event
                .paths
                .iter()
                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
            if !touches_file {
                return;
            }
            if let Some(shared) = shared.upgrade() {
                shared.reload();
            }
        })?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        info!(path = %self.shared.path.display(), "Settings watcher started");

        *slot = Some(watcher);
        Ok(())
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }

    /// Apply the file's current contents now instead of waiting for the watcher
    pub fn reload(&self) {
        self.shared.reload();
    }
}

impl SettingsBackend for TomlSettings {
    fn get_strv(&self, key: SettingKey) -> Vec<String> {
        self.shared.document.read().strv(key)
    }

    fn set_strv(&self, key: SettingKey, values: Vec<String>) -> store::Result<()> {
        self.shared.update(key, |doc| doc.set_strv(key, values))
    }

    fn get_bool(&self, key: SettingKey) -> bool {
        self.shared.document.read().flag(key)
    }

    fn set_bool(&self, key: SettingKey, value: bool) -> store::Result<()> {
        self.shared.update(key, |doc| doc.set_flag(key, value))
    }

    fn connect(&self, key: SettingKey, handler: ChangeHandler) -> SubscriptionId {
        self.shared.handlers.connect(key, handler)
    }

    fn disconnect(&self, id: SubscriptionId) -> bool {
        self.shared.handlers.disconnect(id)
    }
}
