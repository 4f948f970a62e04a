//! Mutually exclusive access to a single text file.
//!
//! [`LockedFile`] serializes every read and write on one instance behind an
//! async mutex. The owned guard is moved into the blocking I/O job, so a
//! caller that is cancelled while waiting on the job does not release the
//! lock until the I/O has finished.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

/// A file path guarded by a non-reentrant async mutex.
///
/// Clones share the same lock. Separate instances for the same path are not
/// synchronized with each other.
#[derive(Debug, Clone)]
pub struct LockedFile {
    path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl LockedFile {
    /// Creates a guard for `path`. Nothing touches the filesystem until the
    /// first access.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// The guarded path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether any other clone of this guard is alive.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.lock) > 1
    }

    /// Reads the whole file, creating it (and its parent directory) empty if
    /// absent.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors after the lock is released.
    pub async fn read(&self) -> io::Result<String> {
        self.run(|path| {
            ensure_exists(path)?;
            fs::read_to_string(path)
        })
        .await
    }

    /// Reads the whole file if it exists. Unlike [`LockedFile::read`] this
    /// never creates anything.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors other than not-found.
    pub async fn read_existing(&self) -> io::Result<Option<String>> {
        self.run(|path| match fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        })
        .await
    }

    /// Replaces the file contents atomically.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors after the lock is released.
    pub async fn write(&self, text: String) -> io::Result<()> {
        self.run(move |path| {
            ensure_exists(path)?;
            atomic_write(path, &text)
        })
        .await
    }

    /// Runs `f` over the current contents and, when it returns new text,
    /// writes that text back. Read, edit and write happen under one lock
    /// acquisition.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or an I/O error converted into `E`.
    pub async fn modify<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(String) -> Result<(Option<String>, T), E> + Send + 'static,
        T: Send + 'static,
        E: From<io::Error> + Send + 'static,
    {
        self.run(move |path| {
            ensure_exists(path)?;
            let current = fs::read_to_string(path)?;
            let (next, out) = f(current)?;
            if let Some(text) = next {
                atomic_write(path, &text)?;
            }
            Ok(out)
        })
        .await
    }

    async fn run<T, E, J>(&self, job: J) -> Result<T, E>
    where
        J: FnOnce(&Path) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<io::Error> + Send + 'static,
    {
        let guard = Arc::clone(&self.lock).lock_owned().await;
        let path = Arc::clone(&self.path);
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            job(&path)
        })
        .await
        .map_err(|e| E::from(io::Error::other(e)))?
    }
}

fn ensure_exists(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)?;
    Ok(())
}

/// Writes to a sibling temporary file, then renames it over `path`.
fn atomic_write(path: &Path, contents: &str) -> io::Result<()> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");
    let temp_path = path.with_file_name(format!(".{name}.tmp.{}", std::process::id()));
    fs::write(&temp_path, contents)?;
    fs::rename(&temp_path, path)
}
