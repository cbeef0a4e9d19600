//! File-backed [`KvStore`] shared by every process that opens the same path.
//!
//! Each operation takes an OS lock on a sidecar `<name>.lock` file (shared for reads, exclusive
//! for writes) and works against the snapshot currently on disk, so writers never clobber each
//! other's entries.

// std
use std::{
	fs::{self, File, OpenOptions},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{KvStore, StoreError, StoreFuture, StoredEntry},
};

type Snapshot = HashMap<String, StoredEntry>;

/// Persists entries to a JSON file, re-reading it on every operation.
///
/// Expired entries are dropped from the snapshot the next time the file is written.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	lock_path: PathBuf,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path and validates any existing snapshot.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();
		let mut lock_path = path.clone();

		lock_path.set_extension("lock");

		Self::ensure_parent_exists(&path)?;

		let store = Self { path, lock_path };

		store.read(|_| ())?;

		Ok(store)
	}

	/// Returns the snapshot path backing this store.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn read<T>(&self, f: impl FnOnce(&Snapshot) -> T) -> Result<T, StoreError> {
		let lock = self.open_lock()?;

		lock.lock_shared().map_err(|e| self.lock_error(e))?;

		let snapshot = Self::load_snapshot(&self.path)?;

		Ok(f(&snapshot))
	}

	// The lock is released when `lock` drops, after the new snapshot has been renamed in place.
	fn update<T>(&self, f: impl FnOnce(&mut Snapshot) -> (T, bool)) -> Result<T, StoreError> {
		let lock = self.open_lock()?;

		lock.lock().map_err(|e| self.lock_error(e))?;

		let mut snapshot = Self::load_snapshot(&self.path)?;
		let (out, dirty) = f(&mut snapshot);

		if dirty {
			self.persist(&mut snapshot)?;
		}

		Ok(out)
	}

	fn open_lock(&self) -> Result<File, StoreError> {
		OpenOptions::new()
			.create(true)
			.truncate(false)
			.read(true)
			.write(true)
			.open(&self.lock_path)
			.map_err(|e| StoreError::Backend {
				message: format!("Failed to open {}: {e}", self.lock_path.display()),
			})
	}

	fn lock_error(&self, e: std::io::Error) -> StoreError {
		StoreError::Backend { message: format!("Failed to lock {}: {e}", self.lock_path.display()) }
	}

	fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
		if !path.exists() {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(HashMap::new());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist(&self, contents: &mut Snapshot) -> Result<(), StoreError> {
		let now = OffsetDateTime::now_utc();

		contents.retain(|_, entry| entry.is_live_at(now));

		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(&*contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl KvStore for FileStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();

			self.read(|snapshot| {
				snapshot.get(key).filter(|entry| entry.is_live_at(now)).map(|entry| entry.value.clone())
			})
		})
	}

	fn set<'a>(&'a self, key: &'a str, value: Value, ttl: Option<Duration>) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.update(|snapshot| {
				snapshot.insert(key.to_owned(), StoredEntry::new(value, ttl, OffsetDateTime::now_utc()));

				((), true)
			})
		})
	}

	fn add<'a>(
		&'a self,
		key: &'a str,
		value: Value,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, bool> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();

			self.update(|snapshot| {
				if snapshot.get(key).is_some_and(|entry| entry.is_live_at(now)) {
					return (false, false);
				}

				snapshot.insert(key.to_owned(), StoredEntry::new(value, ttl, now));

				(true, true)
			})
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.update(|snapshot| {
				let removed = snapshot.remove(key).is_some();

				((), removed)
			})
		})
	}
}
