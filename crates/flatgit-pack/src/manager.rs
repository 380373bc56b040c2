use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use flatgit_kv::KeyValueStore;
use flatgit_types::{Clock, KeyLayout, ObjectId, PackId, PackPart, StoredObject, SystemClock};

use crate::error::{PackError, PackResult};
use crate::index::PackIndex;
use crate::remote::RemotePack;

/// How long a pack listing is trusted before the namespace is listed again.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(5 * 60);

#[derive(Default)]
struct Listing {
    packs: BTreeMap<PackId, Arc<RemotePack>>,
    listed_at: Option<DateTime<Utc>>,
}

/// The packs visible in a repository, with a time-boxed listing cache.
///
/// A pack is visible once its index key is listed; a data key alone is
/// ignored. Indices are downloaded once and kept across refreshes, so a
/// refresh only fetches packs that are new since the last listing.
pub struct PackSet {
    kv: Arc<dyn KeyValueStore>,
    layout: KeyLayout,
    clock: Arc<dyn Clock>,
    freshness: Duration,
    listing: RwLock<Listing>,
}

impl PackSet {
    pub fn new(kv: Arc<dyn KeyValueStore>, layout: KeyLayout) -> Self {
        Self {
            kv,
            layout,
            clock: Arc::new(SystemClock),
            freshness: DEFAULT_FRESHNESS,
            listing: RwLock::new(Listing::default()),
        }
    }

    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Force the next access to list the pack namespace again.
    pub fn invalidate(&self) {
        self.listing.write().expect("pack listing lock poisoned").listed_at = None;
    }

    /// Make a pack this process just uploaded visible without re-listing.
    pub fn register(&self, index: PackIndex) {
        let mut listing = self.listing.write().expect("pack listing lock poisoned");
        listing
            .packs
            .entry(index.pack_id)
            .or_insert_with(|| Arc::new(RemotePack::new(index)));
    }

    /// Currently visible packs, refreshing the listing if it has gone stale.
    pub fn packs(&self) -> PackResult<Vec<Arc<RemotePack>>> {
        if !self.is_fresh() {
            self.refresh()?;
        }
        let listing = self.listing.read().expect("pack listing lock poisoned");
        Ok(listing.packs.values().cloned().collect())
    }

    /// Read `id` from whichever visible pack lists it.
    pub fn read_object(&self, id: &ObjectId) -> PackResult<Option<StoredObject>> {
        for pack in self.packs()? {
            if let Some(object) = pack.read_object(id, self.kv.as_ref(), &self.layout)? {
                return Ok(Some(object));
            }
        }
        Ok(None)
    }

    /// Whether any visible pack index lists `id`. Never fetches pack data.
    pub fn contains(&self, id: &ObjectId) -> PackResult<bool> {
        Ok(self.packs()?.iter().any(|pack| pack.index().contains(id)))
    }

    /// Every id listed by a visible pack index, sorted and deduplicated.
    pub fn object_ids(&self) -> PackResult<Vec<ObjectId>> {
        let mut ids: Vec<ObjectId> = self
            .packs()?
            .iter()
            .flat_map(|pack| pack.index().object_ids.iter().copied())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    fn is_fresh(&self) -> bool {
        let listing = self.listing.read().expect("pack listing lock poisoned");
        let Some(listed_at) = listing.listed_at else {
            return false;
        };
        // A clock that went backwards yields an error here: treat as stale.
        match (self.clock.now() - listed_at).to_std() {
            Ok(elapsed) => elapsed < self.freshness,
            Err(_) => false,
        }
    }

    fn refresh(&self) -> PackResult<()> {
        let started = self.clock.now();
        let listed = self.kv.list(&self.layout.pack_prefix())?;
        let visible: Vec<PackId> = listed
            .iter()
            .filter_map(|meta| self.layout.parse_pack_key(&meta.key))
            .filter(|(_, part)| *part == PackPart::Index)
            .map(|(id, _)| id)
            .collect();

        let known: Vec<PackId> = {
            let listing = self.listing.read().expect("pack listing lock poisoned");
            listing.packs.keys().copied().collect()
        };

        let mut fetched = Vec::new();
        for id in visible.into_iter().filter(|id| !known.contains(id)) {
            match self.fetch_index(&id) {
                Ok(Some(index)) => fetched.push(index),
                Ok(None) => tracing::debug!(pack = %id, "pack index vanished after listing"),
                Err(PackError::Storage(e)) => return Err(PackError::Storage(e)),
                Err(e) => tracing::warn!(pack = %id, error = %e, "skipping unreadable pack index"),
            }
        }

        let mut listing = self.listing.write().expect("pack listing lock poisoned");
        for index in fetched {
            listing
                .packs
                .entry(index.pack_id)
                .or_insert_with(|| Arc::new(RemotePack::new(index)));
        }
        listing.listed_at = Some(started);
        tracing::debug!(packs = listing.packs.len(), "refreshed pack listing");
        Ok(())
    }

    fn fetch_index(&self, id: &PackId) -> PackResult<Option<PackIndex>> {
        let Some(bytes) = self.kv.get(&self.layout.pack_key(id, PackPart::Index))? else {
            return Ok(None);
        };
        let index = PackIndex::from_bytes(&bytes)?;
        if index.pack_id != *id {
            return Err(PackError::IndexCorrupted(format!(
                "index names {}, key names {id}",
                index.pack_id
            )));
        }
        Ok(Some(index))
    }
}

impl std::fmt::Debug for PackSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackSet")
            .field("prefix", &self.layout.prefix())
            .field("freshness", &self.freshness)
            .finish()
    }
}
