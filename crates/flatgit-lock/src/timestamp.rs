use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use flatgit_kv::{KeyValueStore, ObjectMeta};
use flatgit_types::{Clock, KeyLayout, SystemClock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{LockError, LockResult};
use crate::guard::{LockGuard, Marker};
use crate::options::{ClockPolicy, LockOptions};
use crate::traits::{validate_lock_name, wait_for_turn, LockStrategy};

/// Lock ordered by the service timestamps of per-waiter marker keys.
///
/// Works on stores without versioning. Each waiter writes
/// `locks/<name>/<uuid>.lock`; the marker with the earliest last-modified
/// time holds the lock. A waiter at the head of the queue whose stamp equals
/// another marker's cannot tell which arrived first, so it rewrites its
/// marker for a fresh stamp instead of claiming.
///
/// Correctness rests on the service stamping markers in the order it lists
/// them. Clock drift inside the service or a lagging listing can let two
/// waiters both believe they are first; [`ClockPolicy::Strict`] narrows but
/// does not close that window.
pub struct TimestampLock {
    store: Arc<dyn KeyValueStore>,
    layout: KeyLayout,
    options: LockOptions,
    policy: ClockPolicy,
    clock: Arc<dyn Clock>,
}

impl TimestampLock {
    pub fn new(store: Arc<dyn KeyValueStore>, layout: KeyLayout) -> Self {
        Self {
            store,
            layout,
            options: LockOptions::default(),
            policy: ClockPolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_options(mut self, options: LockOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_clock_policy(mut self, policy: ClockPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Local clock used for the strict skew check.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    /// Markers of lock `name`, oldest first.
    fn queue(&self, name: &str) -> LockResult<Vec<ObjectMeta>> {
        let mut markers: Vec<ObjectMeta> = self
            .store
            .list(&self.layout.lock_marker_prefix(name))?
            .into_iter()
            .filter(|meta| self.layout.is_lock_marker_key(name, &meta.key))
            .collect();
        markers.sort_by(|a, b| (a.last_modified, &a.key).cmp(&(b.last_modified, &b.key)));
        Ok(markers)
    }

    /// Whether `key` heads the queue with a stamp no other marker shares.
    fn is_first(&self, name: &str, key: &str) -> LockResult<bool> {
        let queue = self.queue(name)?;
        let Some((head, rest)) = queue.split_first() else {
            return Ok(false);
        };
        if head.key != key {
            return Ok(false);
        }
        if rest.iter().any(|other| other.last_modified == head.last_modified) {
            let restamped = self.store.put(key, b"")?;
            debug!(lock = name, marker = %key, stamped = %restamped.last_modified, "stamp tied, requeued");
            return Ok(false);
        }
        Ok(true)
    }

    fn check_skew(&self, marker: &ObjectMeta) -> LockResult<()> {
        let ClockPolicy::Strict { max_skew } = self.policy else {
            return Ok(());
        };
        let local = self.clock.now();
        let delta = if local >= marker.last_modified {
            local - marker.last_modified
        } else {
            marker.last_modified - local
        };
        let skew = delta.to_std().unwrap_or(Duration::MAX);
        if skew > max_skew {
            return Err(LockError::ClockSkew { skew, max_skew });
        }
        Ok(())
    }
}

impl LockStrategy for TimestampLock {
    fn acquire(&self, name: &str) -> LockResult<LockGuard> {
        validate_lock_name(name)?;
        let key = self.layout.lock_marker_key(name, &Uuid::new_v4().to_string());
        let placed = self.store.put(&key, b"")?;
        debug!(lock = name, marker = %key, stamped = %placed.last_modified, "queued for lock");

        let marker = Marker::Key {
            store: self.store.clone(),
            key: key.clone(),
        };
        if let Err(e) = self.check_skew(&placed) {
            warn!(lock = name, error = %e, "refusing to queue");
            marker.discard(name);
            return Err(e);
        }

        let waited = wait_for_turn(name, &self.options, || self.is_first(name, &key));
        match waited {
            Ok(attempts) => {
                info!(lock = name, attempts, "acquired lock");
                Ok(LockGuard::new(name, marker, attempts))
            }
            Err(e) => {
                marker.discard(name);
                Err(e)
            }
        }
    }
}

impl fmt::Debug for TimestampLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimestampLock")
            .field("prefix", &self.layout.prefix())
            .field("options", &self.options)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;
    use crate::traits::critical_section;
    use flatgit_kv::{DirectoryStore, MemoryStore};
    use flatgit_types::ManualClock;

    fn fast() -> LockOptions {
        LockOptions::default().with_poll_interval(Duration::from_millis(2))
    }

    fn lock(store: &Arc<MemoryStore>) -> TimestampLock {
        TimestampLock::new(store.clone(), KeyLayout::default()).with_options(fast())
    }

    fn markers(store: &MemoryStore, name: &str) -> Vec<String> {
        store
            .list(&KeyLayout::default().lock_marker_prefix(name))
            .unwrap()
            .into_iter()
            .map(|meta| meta.key)
            .collect()
    }

    #[test]
    fn uncontended_acquire_takes_one_poll() {
        let store = Arc::new(MemoryStore::new());
        let guard = lock(&store).acquire("refs").unwrap();
        assert_eq!(guard.attempts(), 1);

        let keys = markers(&store, "refs");
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with(".git/locks/refs/") && keys[0].ends_with(".lock"));

        guard.release().unwrap();
        assert!(markers(&store, "refs").is_empty());
    }

    #[test]
    fn foreign_keys_do_not_block() {
        let store = Arc::new(MemoryStore::new());
        store.put(".git/locks/refs/notes.txt", b"").unwrap();
        store.put(".git/locks/refs/nested/x.lock", b"").unwrap();
        assert_eq!(lock(&store).acquire("refs").unwrap().attempts(), 1);
    }

    #[test]
    fn waiter_times_out_and_cleans_up() {
        let store = Arc::new(MemoryStore::new());
        let holder = lock(&store).acquire("refs").unwrap();

        let waiter = TimestampLock::new(store.clone(), KeyLayout::default())
            .with_options(fast().with_timeout(Duration::from_millis(20)));
        assert!(matches!(waiter.acquire("refs"), Err(LockError::Timeout { .. })));
        assert_eq!(markers(&store, "refs").len(), 1);
        drop(holder);
        assert!(markers(&store, "refs").is_empty());
    }

    #[test]
    fn mutual_exclusion_under_contention() {
        let store = Arc::new(MemoryStore::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let holders = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let lock = lock(&store);
                let counter = counter.clone();
                let holders = holders.clone();
                thread::spawn(move || {
                    for _ in 0..5 {
                        critical_section(&lock, "build-lock", || {
                            assert_eq!(holders.fetch_add(1, Ordering::SeqCst), 0);
                            let seen = counter.load(Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(1));
                            counter.store(seen + 1, Ordering::SeqCst);
                            holders.fetch_sub(1, Ordering::SeqCst);
                            Ok::<_, LockError>(())
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 20);
        assert!(markers(&store, "build-lock").is_empty());
    }

    #[test]
    fn strict_policy_rejects_skewed_service_clock() {
        let service_clock = Arc::new(ManualClock::at_epoch());
        let store = Arc::new(MemoryStore::with_clock(service_clock));
        let lock = lock(&store).with_clock_policy(ClockPolicy::Strict {
            max_skew: Duration::from_secs(5),
        });

        match lock.acquire("refs") {
            Err(LockError::ClockSkew { skew, max_skew }) => {
                assert!(skew > max_skew);
            }
            other => panic!("expected clock skew, got {other:?}"),
        }
        assert!(markers(&store, "refs").is_empty());
    }

    #[test]
    fn strict_policy_accepts_agreeing_clocks() {
        let clock = Arc::new(ManualClock::at_epoch());
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let lock = lock(&store)
            .with_clock(clock.clone())
            .with_clock_policy(ClockPolicy::Strict {
                max_skew: Duration::from_secs(5),
            });
        let guard = lock.acquire("refs").unwrap();
        assert_eq!(guard.attempts(), 1);
        drop(guard);

        clock.advance(chrono::Duration::seconds(60));
        let skewed = TimestampLock::new(store.clone(), KeyLayout::default())
            .with_clock(Arc::new(ManualClock::at_epoch()))
            .with_clock_policy(ClockPolicy::Strict {
                max_skew: Duration::from_secs(5),
            });
        assert!(matches!(skewed.acquire("refs"), Err(LockError::ClockSkew { .. })));
    }

    /// Service whose stamps only resolve whole seconds.
    #[derive(Debug)]
    struct CoarseStore(Arc<MemoryStore>);

    fn coarse(mut meta: ObjectMeta) -> ObjectMeta {
        use chrono::Timelike;
        meta.last_modified = meta.last_modified.with_nanosecond(0).unwrap();
        meta
    }

    impl KeyValueStore for CoarseStore {
        fn get(&self, key: &str) -> flatgit_kv::KvResult<Option<Vec<u8>>> {
            self.0.get(key)
        }
        fn head(&self, key: &str) -> flatgit_kv::KvResult<Option<ObjectMeta>> {
            Ok(self.0.head(key)?.map(coarse))
        }
        fn put(&self, key: &str, value: &[u8]) -> flatgit_kv::KvResult<ObjectMeta> {
            self.0.put(key, value).map(coarse)
        }
        fn delete(&self, key: &str) -> flatgit_kv::KvResult<()> {
            self.0.delete(key)
        }
        fn list(&self, prefix: &str) -> flatgit_kv::KvResult<Vec<ObjectMeta>> {
            Ok(self.0.list(prefix)?.into_iter().map(coarse).collect())
        }
    }

    #[test]
    fn tied_head_requeues_instead_of_claiming() {
        let clock = Arc::new(ManualClock::at_epoch());
        let inner = Arc::new(MemoryStore::with_clock(clock.clone()));
        let store = Arc::new(CoarseStore(inner));
        let lock = TimestampLock::new(store.clone(), KeyLayout::default()).with_options(fast());

        // The holder arrived first but drew the larger key; both land in the same second.
        let holder = ".git/locks/refs/ffffffff.lock";
        let newcomer = ".git/locks/refs/00000000.lock";
        store.put(holder, b"").unwrap();
        store.put(newcomer, b"").unwrap();

        clock.advance(chrono::Duration::seconds(1));
        assert!(!lock.is_first("refs", newcomer).unwrap());
        let queue = lock.queue("refs").unwrap();
        assert_eq!(queue[0].key, holder);
        assert!(queue[1].last_modified > queue[0].last_modified);
        assert!(!lock.is_first("refs", newcomer).unwrap());

        store.delete(holder).unwrap();
        assert!(lock.is_first("refs", newcomer).unwrap());
    }

    #[test]
    fn directory_mutual_exclusion_under_contention() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DirectoryStore::open(dir.path()).unwrap());
        let holders = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let entered = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let lock = TimestampLock::new(store.clone(), KeyLayout::default())
                    .with_options(LockOptions::default().with_poll_interval(Duration::from_millis(1)));
                let holders = holders.clone();
                let overlaps = overlaps.clone();
                let entered = entered.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        critical_section(&lock, "refs", || {
                            if holders.fetch_add(1, Ordering::SeqCst) != 0 {
                                overlaps.fetch_add(1, Ordering::SeqCst);
                            }
                            entered.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_micros(200));
                            holders.fetch_sub(1, Ordering::SeqCst);
                            Ok::<_, LockError>(())
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(entered.load(Ordering::SeqCst), 200);
        assert!(store.list(".git/locks/refs/").unwrap().is_empty());
    }

    #[test]
    fn works_over_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DirectoryStore::open(dir.path()).unwrap());
        let lock = TimestampLock::new(store, KeyLayout::default()).with_options(fast());
        let guard = lock.acquire("refs").unwrap();
        assert_eq!(guard.attempts(), 1);
        guard.release().unwrap();
        assert_eq!(lock.acquire("refs").unwrap().attempts(), 1);
    }
}
