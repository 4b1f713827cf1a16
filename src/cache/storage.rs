//! Snapshot storage trait and the lock-guarded file implementation.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::snapshot::Snapshot;

/// Environment variable that overrides the snapshot location.
const CACHE_PATH_ENV: &str = "KONG_CACHE";

const DAEMON_WARNING: &str = "daemon not running, check logs. Performing slow request.";

/// Trait for snapshot storage backends.
///
/// The store is the only thing processes share, so its lock is the only
/// synchronization between the daemon and CLI invocations.
pub trait SnapshotRepository: Send + Sync {
  /// Read the persisted snapshot, or an empty one if there is none.
  fn load(&self) -> Result<Snapshot>;

  /// Replace the persisted snapshot in full.
  fn write(&self, snapshot: &Snapshot) -> Result<()>;

  /// Read, modify and rewrite the persisted snapshot.
  ///
  /// The default is not atomic. [`FileStore`] runs all three steps under one
  /// exclusive lock so no other writer can commit in between.
  fn update(&self, apply: &mut dyn FnMut(&mut Snapshot)) -> Result<()> {
    let mut snapshot = self.load()?;
    apply(&mut snapshot);
    self.write(&snapshot)
  }
}

/// Snapshot stored as one bincode file, guarded by an advisory lock on the
/// file itself.
///
/// Lock acquisition blocks without a timeout.
pub struct FileStore {
  path: PathBuf,
}

impl FileStore {
  /// Open the store at the default location.
  pub fn open() -> Self {
    Self::at(Self::default_path())
  }

  pub fn at(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  /// `$KONG_CACHE` if set, otherwise `kong` in the system temp directory.
  pub fn default_path() -> PathBuf {
    std::env::var_os(CACHE_PATH_ENV)
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::temp_dir().join("kong"))
  }

  #[cfg(test)]
  pub fn path(&self) -> &std::path::Path {
    &self.path
  }

  fn lock_error(&self, source: std::io::Error) -> Error {
    Error::Lock {
      path: self.path.display().to_string(),
      source,
    }
  }

  /// Run `f` with the lock held and release it whatever `f` returns.
  fn with_lock<T>(
    &self,
    file: &File,
    exclusive: bool,
    f: impl FnOnce() -> Result<T>,
  ) -> Result<T> {
    let locked = if exclusive {
      FileExt::lock_exclusive(file)
    } else {
      FileExt::lock_shared(file)
    };
    locked.map_err(|e| self.lock_error(e))?;

    let result = f();
    let unlocked = FileExt::unlock(file).map_err(|e| self.lock_error(e));
    let value = result?;
    unlocked?;
    Ok(value)
  }

  /// Whether `file` is still the file at the store path. A corrupt file may
  /// have been unlinked and replaced while we waited for its lock.
  #[cfg(unix)]
  fn is_current(&self, file: &File) -> Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let opened = file.metadata()?;
    match std::fs::metadata(&self.path) {
      Ok(on_disk) => Ok(opened.dev() == on_disk.dev() && opened.ino() == on_disk.ino()),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
      Err(e) => Err(e.into()),
    }
  }

  #[cfg(not(unix))]
  fn is_current(&self, _file: &File) -> Result<bool> {
    Ok(self.path.exists())
  }

  /// Open the store file for writing, creating it if needed.
  fn open_for_write(&self) -> Result<File> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&self.path)?;
    Ok(file)
  }

  /// Take the exclusive lock on the current store file and run `f` on it.
  ///
  /// Retries when the file was unlinked while we were waiting, so writes never
  /// land in a deleted file.
  fn with_exclusive<T>(&self, mut f: impl FnMut(&File) -> Result<T>) -> Result<T> {
    loop {
      let file = self.open_for_write()?;
      let done = self.with_lock(&file, true, || {
        if !self.is_current(&file)? {
          return Ok(None);
        }
        f(&file).map(Some)
      })?;
      if let Some(value) = done {
        return Ok(value);
      }
      debug!(path = %self.path.display(), "snapshot file replaced while waiting, reopening");
    }
  }

  /// Re-read the snapshot under the exclusive lock after a failed decode.
  ///
  /// A writer may have committed since the shared read, in which case its
  /// snapshot is returned. Otherwise the file is still corrupt and is deleted
  /// before the lock is released.
  fn recover(&self, file: &File) -> Result<Snapshot> {
    self.with_lock(file, true, || {
      let bytes = read_all(file)?;
      if let Ok(snapshot) = bincode::deserialize::<Snapshot>(&bytes) {
        return Ok(snapshot);
      }
      if self.is_current(file)? {
        warn!(path = %self.path.display(), "snapshot potentially corrupt, deleting");
        match std::fs::remove_file(&self.path) {
          Ok(()) => {}
          Err(e) if e.kind() == ErrorKind::NotFound => {}
          Err(e) => return Err(e.into()),
        }
      }
      warn!("{}", DAEMON_WARNING);
      Ok(Snapshot::default())
    })
  }
}

fn read_all(file: &File) -> Result<Vec<u8>> {
  let mut reader = file;
  reader.seek(SeekFrom::Start(0))?;
  let mut bytes = Vec::new();
  reader.read_to_end(&mut bytes)?;
  Ok(bytes)
}

/// Decode what a writer left, treating an empty or unreadable file as empty.
fn decode_or_default(bytes: &[u8]) -> Snapshot {
  if bytes.is_empty() {
    return Snapshot::default();
  }
  bincode::deserialize(bytes).unwrap_or_else(|e| {
    warn!(error = %e, "snapshot potentially corrupt, replacing");
    Snapshot::default()
  })
}

fn rewrite(file: &File, bytes: &[u8]) -> Result<()> {
  let mut writer = file;
  writer.set_len(0)?;
  writer.seek(SeekFrom::Start(0))?;
  writer.write_all(bytes)?;
  writer.sync_data()?;
  Ok(())
}

impl SnapshotRepository for FileStore {
  fn load(&self) -> Result<Snapshot> {
    let file = match File::open(&self.path) {
      Ok(file) => file,
      Err(e) if e.kind() == ErrorKind::NotFound => {
        warn!("{}", DAEMON_WARNING);
        return Ok(Snapshot::default());
      }
      Err(e) => return Err(e.into()),
    };

    let bytes = self.with_lock(&file, false, || read_all(&file))?;

    // A writer has created the file but not filled it yet.
    if bytes.is_empty() {
      warn!("{}", DAEMON_WARNING);
      return Ok(Snapshot::default());
    }

    match bincode::deserialize::<Snapshot>(&bytes) {
      Ok(snapshot) => {
        debug!(path = %self.path.display(), timestamp = snapshot.timestamp, "snapshot loaded");
        Ok(snapshot)
      }
      Err(e) => {
        debug!(path = %self.path.display(), error = %e, "snapshot failed to decode");
        self.recover(&file)
      }
    }
  }

  fn write(&self, snapshot: &Snapshot) -> Result<()> {
    let bytes = bincode::serialize(snapshot)?;

    // Truncate only once the lock is held so readers never see a partial file.
    self.with_exclusive(|file| rewrite(file, &bytes))?;

    debug!(path = %self.path.display(), timestamp = snapshot.timestamp, "snapshot written");
    Ok(())
  }

  fn update(&self, apply: &mut dyn FnMut(&mut Snapshot)) -> Result<()> {
    self.with_exclusive(|file| {
      let mut snapshot = decode_or_default(&read_all(file)?);
      apply(&mut snapshot);
      rewrite(file, &bincode::serialize(&snapshot)?)
    })?;

    debug!(path = %self.path.display(), "snapshot updated");
    Ok(())
  }
}

/// In-memory store for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
  snapshot: std::sync::Mutex<Option<Snapshot>>,
  pub writes: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MemoryStore {
  pub fn with(snapshot: Snapshot) -> Self {
    Self {
      snapshot: std::sync::Mutex::new(Some(snapshot)),
      ..Default::default()
    }
  }

  pub fn stored(&self) -> Option<Snapshot> {
    self.snapshot.lock().unwrap().clone()
  }
}

#[cfg(test)]
impl SnapshotRepository for MemoryStore {
  fn load(&self) -> Result<Snapshot> {
    Ok(self.stored().unwrap_or_default())
  }

  fn write(&self, snapshot: &Snapshot) -> Result<()> {
    self
      .writes
      .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    *self.snapshot.lock().unwrap() = Some(snapshot.clone());
    Ok(())
  }
}
