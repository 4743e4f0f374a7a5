use hashbrown::HashMap;

use crate::launch::MAX_REG_STORAGE;
use crate::ElemWidth;

/// Highest number of planes per cube a key can encode.
pub const MAX_WARPS: u32 = 32;

/// Number of device ordinals a key can encode.
pub const MAX_DEVICES: u32 = 64;

/// Composite key of an occupancy query.
///
/// Mixed radix, most significant first: shared memory elements, device, element width class,
/// register storage and planes per cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OccupancyKey(u64);

impl OccupancyKey {
    /// Encode a key.
    ///
    /// # Panics
    ///
    /// Panics when `warps` is outside `1..=MAX_WARPS` or `device_id` isn't below `MAX_DEVICES`,
    /// since distinct configurations would collide on the same key.
    pub fn new(
        shared_elems: usize,
        device_id: u32,
        elem: ElemWidth,
        num_reg_storage: u32,
        warps: u32,
    ) -> Self {
        if warps == 0 || warps > MAX_WARPS {
            log::error!("Occupancy key overflow: {warps} planes per cube, max is {MAX_WARPS}");
            panic!("Occupancy key overflow: {warps} planes per cube, max is {MAX_WARPS}");
        }
        if device_id >= MAX_DEVICES {
            log::error!("Occupancy key overflow: device {device_id}, max is {MAX_DEVICES}");
            panic!("Occupancy key overflow: device {device_id}, max is {MAX_DEVICES}");
        }
        debug_assert!((1..=MAX_REG_STORAGE).contains(&num_reg_storage));

        let mut key = shared_elems as u64;
        key = key * MAX_DEVICES as u64 + device_id as u64;
        key = key * ElemWidth::NUM_CLASSES + elem.class();
        key = key * MAX_REG_STORAGE as u64 + (num_reg_storage - 1) as u64;
        key = key * MAX_WARPS as u64 + (warps - 1) as u64;

        Self(key)
    }

    /// The packed value of the key.
    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    active_cubes: u32,
    last_used: u64,
}

/// Bounded memo of occupancy queries.
///
/// Entries are never evicted below the capacity; once it is reached, the least recently used
/// entry is replaced.
#[derive(Debug)]
pub struct OccupancyCache {
    entries: HashMap<OccupancyKey, CacheEntry>,
    capacity: usize,
    clock: u64,
    hits: u64,
    misses: u64,
}

impl OccupancyCache {
    /// Create an empty cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            clock: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// The cached value of `key`.
    pub fn get(&mut self, key: &OccupancyKey) -> Option<u32> {
        self.clock += 1;
        let clock = self.clock;

        self.entries.get_mut(key).map(|entry| {
            entry.last_used = clock;
            entry.active_cubes
        })
    }

    /// Insert the value of `key`.
    pub fn insert(&mut self, key: OccupancyKey, active_cubes: u32) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.evict_least_recently_used();
        }

        self.clock += 1;
        self.entries.insert(
            key,
            CacheEntry {
                active_cubes,
                last_used: self.clock,
            },
        );
    }

    /// The cached value of `key`, computed and inserted on a miss.
    pub fn get_or_compute<F: FnOnce() -> u32>(&mut self, key: OccupancyKey, compute: F) -> u32 {
        if let Some(active_cubes) = self.get(&key) {
            self.hits += 1;
            return active_cubes;
        }

        self.misses += 1;
        let active_cubes = compute();
        self.insert(key, active_cubes);
        active_cubes
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Max number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lookups answered from the cache, and lookups that computed their value.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    fn evict_least_recently_used(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| *key);

        if let Some(key) = oldest {
            log::trace!("Occupancy cache full, evicting {key:?}");
            self.entries.remove(&key);
        }
    }
}
