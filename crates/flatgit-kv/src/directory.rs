use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use filetime::FileTime;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::error::{KvError, KvResult};
use crate::traits::{KeyValueStore, ObjectMeta};

/// Staging area for in-flight writes, hidden from listings.
const STAGING_DIR: &str = ".flatgit-staging";

/// How often a write is retried when a concurrent delete prunes its parent.
const PLACE_RETRIES: u32 = 16;

/// A key-value store kept in a local directory, one file per key.
///
/// Writes go to a staging file and are renamed into place, so readers never
/// observe a partial value. Last-modified times come from file mtimes, which
/// the store sets itself so that every write from this process carries a
/// strictly later stamp than the one before. There is no versioning;
/// conditional writes are serialized within this process only.
#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
    staging: PathBuf,
    conditional: Mutex<()>,
    /// Last stamp handed out. Held while a file is renamed into place or
    /// removed, so directory pruning never interleaves with a write.
    placing: Mutex<Option<SystemTime>>,
}

impl DirectoryStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> KvResult<Self> {
        let root = root.into();
        let staging = root.join(STAGING_DIR);
        fs::create_dir_all(&staging)?;
        Ok(Self {
            root,
            staging,
            conditional: Mutex::new(()),
            placing: Mutex::new(None),
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> KvResult<PathBuf> {
        if key.is_empty() || key.ends_with('/') {
            return Err(KvError::InvalidKey(key.to_string()));
        }
        check_segments(key)?;
        Ok(self.root.join(key))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
        Some(parts?.join("/"))
    }

    fn write_from(&self, key: &str, reader: &mut dyn Read) -> KvResult<ObjectMeta> {
        let path = self.path_for(key)?;
        let mut staged = NamedTempFile::new_in(&self.staging)?;
        io::copy(reader, &mut staged)?;
        staged.as_file().sync_all()?;

        let mut last = self.lock_placing();
        let stamp = next_stamp(*last);
        filetime::set_file_mtime(staged.path(), FileTime::from_system_time(stamp))?;
        self.place(staged, &path)?;
        *last = Some(stamp);
        let metadata = fs::metadata(&path)?;
        meta(key, &metadata)
    }

    /// Rename `staged` to `path`, recreating parents another process pruned.
    fn place(&self, mut staged: NamedTempFile, path: &Path) -> KvResult<()> {
        let mut attempt = 0;
        loop {
            let retry = attempt < PLACE_RETRIES;
            attempt += 1;
            if let Some(parent) = path.parent() {
                match fs::create_dir_all(parent) {
                    Ok(()) => {}
                    Err(e) if retry && not_found(&e) => continue,
                    Err(e) => return Err(e.into()),
                }
            }
            match staged.persist(path) {
                Ok(_) => return Ok(()),
                Err(e) if retry && not_found(&e.error) => {
                    tracing::debug!(path = %path.display(), attempt, "parent vanished, retrying");
                    staged = e.file;
                }
                Err(e) => return Err(KvError::Io(e.error)),
            }
        }
    }

    /// Remove now-empty directories between `path` and the root.
    fn prune_parents(&self, path: &Path) {
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == self.root || fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
    }

    fn lock_conditional(&self) -> MutexGuard<'_, ()> {
        self.conditional.lock().expect("conditional write lock poisoned")
    }

    fn lock_placing(&self) -> MutexGuard<'_, Option<SystemTime>> {
        self.placing.lock().expect("placement lock poisoned")
    }
}

/// Current time, bumped past `last` when the clock has not moved.
fn next_stamp(last: Option<SystemTime>) -> SystemTime {
    let now = SystemTime::now();
    match last {
        Some(last) if now <= last => last + Duration::from_micros(1),
        _ => now,
    }
}

fn check_segments(key: &str) -> KvResult<()> {
    let mut segments = key.split('/');
    if segments.clone().next() == Some(STAGING_DIR) {
        return Err(KvError::InvalidKey(key.to_string()));
    }
    let bad = segments.any(|s| s.is_empty() || s == "." || s == ".." || s.contains(['\\', '\0']));
    if bad {
        return Err(KvError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn meta(key: &str, metadata: &fs::Metadata) -> KvResult<ObjectMeta> {
    Ok(ObjectMeta {
        key: key.to_string(),
        size: metadata.len(),
        last_modified: DateTime::<Utc>::from(metadata.modified()?),
    })
}

fn not_found(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::NotFound
}

impl KeyValueStore for DirectoryStore {
    fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn head(&self, key: &str) -> KvResult<Option<ObjectMeta>> {
        let path = self.path_for(key)?;
        match fs::metadata(&path) {
            Ok(m) if m.is_file() => Ok(Some(meta(key, &m)?)),
            Ok(_) => Ok(None),
            Err(e) if not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> KvResult<ObjectMeta> {
        let mut reader = value;
        self.write_from(key, &mut reader)
    }

    fn put_reader(&self, key: &str, reader: &mut dyn Read) -> KvResult<ObjectMeta> {
        self.write_from(key, reader)
    }

    fn delete(&self, key: &str) -> KvResult<()> {
        let path = self.path_for(key)?;
        let _placing = self.lock_placing();
        match fs::remove_file(&path) {
            Ok(()) => {
                self.prune_parents(&path);
                Ok(())
            }
            Err(e) if not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, prefix: &str) -> KvResult<Vec<ObjectMeta>> {
        // Walk only the deepest directory the prefix pins down.
        let start = match prefix.rfind('/') {
            Some(slash) => {
                let dir = &prefix[..slash];
                check_segments(dir)?;
                self.root.join(dir)
            }
            None => self.root.clone(),
        };
        if !start.is_dir() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        let walker = WalkDir::new(&start)
            .into_iter()
            .filter_entry(|e| e.file_name() != STAGING_DIR);
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                // Concurrent deletes can race the walk.
                Err(e) if e.io_error().map_or(false, not_found) => continue,
                Err(e) => return Err(KvError::Io(e.into())),
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(key) = self.key_for(entry.path()) else {
                tracing::debug!(path = %entry.path().display(), "skipping non-UTF-8 path");
                continue;
            };
            if !key.starts_with(prefix) {
                continue;
            }
            match entry.metadata() {
                Ok(m) => found.push(meta(&key, &m)?),
                Err(e) if e.io_error().map_or(false, not_found) => continue,
                Err(e) => return Err(KvError::Io(e.into())),
            }
        }
        found.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(found)
    }

    fn compare_and_put(&self, key: &str, expected: Option<&[u8]>, value: &[u8]) -> KvResult<bool> {
        let _guard = self.lock_conditional();
        if self.get(key)?.as_deref() != expected {
            return Ok(false);
        }
        self.put(key, value)?;
        Ok(true)
    }

    fn compare_and_delete(&self, key: &str, expected: &[u8]) -> KvResult<bool> {
        let _guard = self.lock_conditional();
        if self.get(key)?.as_deref() != Some(expected) {
            return Ok(false);
        }
        self.delete(key)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, DirectoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn put_get_head_delete() {
        let (_dir, store) = store();
        let meta = store.put(".git/refs/heads/main", b"abc\n").unwrap();
        assert_eq!(meta.size, 4);
        assert_eq!(store.get(".git/refs/heads/main").unwrap(), Some(b"abc\n".to_vec()));
        assert_eq!(store.head(".git/refs/heads/main").unwrap().unwrap().size, 4);

        store.delete(".git/refs/heads/main").unwrap();
        assert_eq!(store.get(".git/refs/heads/main").unwrap(), None);
        store.delete(".git/refs/heads/main").unwrap();
        // Empty parents are pruned.
        assert!(!store.root().join(".git/refs").exists());
    }

    #[test]
    fn files_land_at_key_paths() {
        let (dir, store) = store();
        store.put("objects/aa/bbcc", b"x").unwrap();
        assert!(dir.path().join("objects").join("aa").join("bbcc").is_file());
    }

    #[test]
    fn list_walks_prefix_and_hides_staging() {
        let (_dir, store) = store();
        store.put("p/objects/aa/1", b"1").unwrap();
        store.put("p/objects/bb/2", b"2").unwrap();
        store.put("p/objects-extra", b"3").unwrap();
        store.put("q/objects/cc/3", b"4").unwrap();

        let keys: Vec<String> = store.list("p/objects/").unwrap().into_iter().map(|m| m.key).collect();
        assert_eq!(keys, vec!["p/objects/aa/1", "p/objects/bb/2"]);

        let keys: Vec<String> = store.list("p/objects").unwrap().into_iter().map(|m| m.key).collect();
        assert_eq!(keys.len(), 3);

        assert_eq!(store.list("").unwrap().len(), 4);
        assert!(store.list("missing/").unwrap().is_empty());
    }

    #[test]
    fn rejects_escaping_keys() {
        let (_dir, store) = store();
        for key in ["", "../x", "a//b", "a/./b", "dir/", ".flatgit-staging/x"] {
            assert!(
                matches!(store.put(key, b"x"), Err(KvError::InvalidKey(_))),
                "{key:?} accepted"
            );
        }
        assert!(matches!(store.list("../"), Err(KvError::InvalidKey(_))));
    }

    #[test]
    fn streaming_put() {
        let (_dir, store) = store();
        let mut reader = io::Cursor::new(vec![7u8; 100_000]);
        let meta = store.put_reader("big", &mut reader).unwrap();
        assert_eq!(meta.size, 100_000);
    }

    #[test]
    fn conditional_writes() {
        let (_dir, store) = store();
        assert!(store.compare_and_put("HEAD", None, b"ref: refs/heads/main\n").unwrap());
        assert!(!store.compare_and_put("HEAD", None, b"ref: refs/heads/dev\n").unwrap());
        assert!(store
            .compare_and_put("HEAD", Some(b"ref: refs/heads/main\n"), b"ref: refs/heads/dev\n")
            .unwrap());
        assert!(!store.compare_and_delete("HEAD", b"ref: refs/heads/main\n").unwrap());
        assert!(store.compare_and_delete("HEAD", b"ref: refs/heads/dev\n").unwrap());
        assert!(!store.exists("HEAD").unwrap());
    }

    #[test]
    fn successive_writes_get_increasing_stamps() {
        let (_dir, store) = store();
        let mut previous = None;
        for i in 0..200 {
            let stamped = store.put(&format!(".git/locks/refs/{i:03}.lock"), b"").unwrap();
            if let Some(previous) = previous {
                assert!(stamped.last_modified > previous, "write {i} not after its predecessor");
            }
            previous = Some(stamped.last_modified);
        }
        let listed = store.list(".git/locks/refs/").unwrap();
        let mut stamps: Vec<_> = listed.iter().map(|m| m.last_modified).collect();
        stamps.dedup();
        assert_eq!(stamps.len(), 200);
    }

    #[test]
    fn writes_survive_sibling_deletes() {
        let (_dir, store) = store();
        let store = std::sync::Arc::new(store);
        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let mut failures = 0;
                    for i in 0..500 {
                        let key = format!(".git/locks/refs/{worker}-{i}.lock");
                        if store.put(&key, b"").is_err() {
                            failures += 1;
                        }
                        store.delete(&key).unwrap();
                    }
                    failures
                })
            })
            .collect();
        let failures: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
        assert_eq!(failures, 0);
        assert!(store.list(".git/locks/").unwrap().is_empty());
    }

    #[test]
    fn reopen_sees_existing_data() {
        let dir = tempfile::tempdir().unwrap();
        DirectoryStore::open(dir.path()).unwrap().put("k", b"v").unwrap();
        let again = DirectoryStore::open(dir.path()).unwrap();
        assert_eq!(again.get("k").unwrap(), Some(b"v".to_vec()));
    }
}
