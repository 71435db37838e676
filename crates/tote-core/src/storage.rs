//! Durable cart-id storage.
//!
//! A storefront keeps the cart id in a browser cookie so that the cart
//! survives a reload. Here the id lives behind [`CartIdStore`]; the file
//! implementation is a small JSON cookie jar guarded by an advisory lock.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::debug;

use crate::error::ErrorCode;
use crate::model::line::CartId;

/// Cookie name used when none is configured.
pub const DEFAULT_COOKIE: &str = "cartId";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("cookie jar lock timed out after {waited:?} at {}", path.display())]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("cookie jar {} is unreadable: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StorageError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::CartIdStorage
    }
}

/// Where the current cart id is remembered between sessions.
pub trait CartIdStore {
    /// # Errors
    ///
    /// Fails when the underlying medium cannot be read.
    fn load(&mut self) -> Result<Option<CartId>, StorageError>;

    /// # Errors
    ///
    /// Fails when the underlying medium cannot be written.
    fn save(&mut self, cart_id: &CartId) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Fails when the underlying medium cannot be written.
    fn clear(&mut self) -> Result<(), StorageError>;
}

impl<T: CartIdStore + ?Sized> CartIdStore for &mut T {
    fn load(&mut self) -> Result<Option<CartId>, StorageError> {
        (**self).load()
    }

    fn save(&mut self, cart_id: &CartId) -> Result<(), StorageError> {
        (**self).save(cart_id)
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        (**self).clear()
    }
}

/// Volatile store for tests and the simulator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryCartIdStore {
    current: Option<CartId>,
    writes: usize,
}

impl MemoryCartIdStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_id(cart_id: CartId) -> Self {
        Self {
            current: Some(cart_id),
            writes: 0,
        }
    }

    #[must_use]
    pub const fn current(&self) -> Option<&CartId> {
        self.current.as_ref()
    }

    /// Number of `save` and `clear` calls so far.
    #[must_use]
    pub const fn writes(&self) -> usize {
        self.writes
    }
}

impl CartIdStore for MemoryCartIdStore {
    fn load(&mut self) -> Result<Option<CartId>, StorageError> {
        Ok(self.current.clone())
    }

    fn save(&mut self, cart_id: &CartId) -> Result<(), StorageError> {
        self.current = Some(cart_id.clone());
        self.writes += 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.current = None;
        self.writes += 1;
        Ok(())
    }
}

/// Cookie jar on disk: a JSON object of cookie name to value.
///
/// Every access takes an exclusive lock on `<jar>.lock`; writes go to a
/// sibling temp file that is renamed over the jar.
#[derive(Debug, Clone)]
pub struct FileCartIdStore {
    path: PathBuf,
    cookie: String,
    lock_timeout: Duration,
}

impl FileCartIdStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cookie: DEFAULT_COOKIE.to_string(),
            lock_timeout: Duration::from_secs(2),
        }
    }

    #[must_use]
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = cookie.into();
        self
    }

    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn read_jar(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(err.into()),
        };
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|err| StorageError::Corrupt {
            path: self.path.clone(),
            reason: err.to_string(),
        })
    }

    fn write_jar(&self, jar: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let body = serde_json::to_string_pretty(jar).map_err(|err| StorageError::Corrupt {
            path: self.path.clone(),
            reason: err.to_string(),
        })?;
        let mut tmp = self.path.as_os_str().to_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), StorageError> {
        let _guard = JarLock::acquire(&self.lock_path(), self.lock_timeout)?;
        let mut jar = self.read_jar()?;
        f(&mut jar);
        self.write_jar(&jar)
    }
}

impl CartIdStore for FileCartIdStore {
    fn load(&mut self) -> Result<Option<CartId>, StorageError> {
        let _guard = JarLock::acquire(&self.lock_path(), self.lock_timeout)?;
        let jar = self.read_jar()?;
        Ok(jar
            .get(&self.cookie)
            .filter(|value| !value.is_empty())
            .map(|value| CartId::new(value.as_str())))
    }

    fn save(&mut self, cart_id: &CartId) -> Result<(), StorageError> {
        debug!(cookie = %self.cookie, cart = %cart_id, "persisting cart id");
        let cookie = self.cookie.clone();
        self.update(|jar| {
            jar.insert(cookie, cart_id.to_string());
        })
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        debug!(cookie = %self.cookie, "clearing cart id");
        let cookie = self.cookie.clone();
        self.update(|jar| {
            jar.remove(&cookie);
        })
    }
}

/// Exclusive advisory lock held for the duration of one jar access.
#[derive(Debug)]
struct JarLock {
    file: File,
}

impl JarLock {
    fn acquire(path: &Path, timeout: Duration) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(path)?;

            if file.try_lock_exclusive().is_ok() {
                return Ok(Self { file });
            }

            if start.elapsed() >= timeout {
                return Err(StorageError::LockTimeout {
                    path: path.to_path_buf(),
                    waited: start.elapsed(),
                });
            }

            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for JarLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
