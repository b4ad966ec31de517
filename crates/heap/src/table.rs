//! Open-addressing hash table keyed by interned strings.
//!
//! Linear probing over a power-of-two capacity, so the probe index is a
//! bitmask of the hash rather than a modulo. Deleted entries leave a
//! tombstone (no key, `true` value) so probe sequences running through them
//! still reach entries placed further along. Tombstones count toward the
//! load factor but not toward [`Table::len`]; growing the table drops them.

use lox_common::{ObjRef, Value};

/// Maximum load (live entries plus tombstones) before the table grows.
pub const TABLE_MAX_LOAD: f64 = 0.75;

/// A table key: an interned string handle together with its cached hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    pub obj: ObjRef,
    pub hash: u32,
}

impl Key {
    pub fn new(obj: ObjRef, hash: u32) -> Self {
        Self { obj, hash }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    key: Option<Key>,
    value: Value,
}

impl Entry {
    fn is_tombstone(&self) -> bool {
        self.key.is_none() && !self.value.is_nil()
    }
}

/// Map from interned strings to values.
#[derive(Debug, Clone, Default)]
pub struct Table {
    entries: Vec<Entry>,
    /// Occupied slots, tombstones included.
    used: usize,
    /// Live entries only.
    live: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of slots currently allocated.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Look up the value stored under `key`.
    pub fn get(&self, key: Key) -> Option<Value> {
        if self.live == 0 {
            return None;
        }
        let entry = &self.entries[find_entry(&self.entries, key)];
        entry.key.map(|_| entry.value)
    }

    /// Insert or overwrite. Returns true if `key` was not present before.
    pub fn set(&mut self, key: Key, value: Value) -> bool {
        if (self.used + 1) as f64 > self.entries.len() as f64 * TABLE_MAX_LOAD {
            let capacity = grow_capacity(self.entries.len());
            self.adjust_capacity(capacity);
        }

        let index = find_entry(&self.entries, key);
        let entry = &mut self.entries[index];
        let is_new = entry.key.is_none();
        // Reusing a tombstone does not change the used count.
        if is_new && entry.value.is_nil() {
            self.used += 1;
        }
        if is_new {
            self.live += 1;
        }
        entry.key = Some(key);
        entry.value = value;
        is_new
    }

    /// Remove `key`, leaving a tombstone. Returns true if it was present.
    pub fn delete(&mut self, key: Key) -> bool {
        if self.live == 0 {
            return false;
        }
        let index = find_entry(&self.entries, key);
        let entry = &mut self.entries[index];
        if entry.key.is_none() {
            return false;
        }
        entry.key = None;
        entry.value = Value::Bool(true);
        self.live -= 1;
        true
    }

    /// Copy every live entry into `to`, overwriting existing keys.
    pub fn add_all(&self, to: &mut Table) {
        for (key, value) in self.iter() {
            to.set(key, value);
        }
    }

    /// Probe for a key with the given hash that satisfies `matches`.
    ///
    /// Used by string interning, where the candidate is raw content rather
    /// than an existing handle.
    pub fn find_by(&self, hash: u32, mut matches: impl FnMut(ObjRef) -> bool) -> Option<ObjRef> {
        if self.live == 0 {
            return None;
        }
        let mask = self.entries.len() - 1;
        let mut index = hash as usize & mask;
        loop {
            let entry = &self.entries[index];
            match entry.key {
                None if !entry.is_tombstone() => return None,
                Some(key) if key.hash == hash && matches(key.obj) => return Some(key.obj),
                _ => {}
            }
            index = (index + 1) & mask;
        }
    }

    /// Delete every entry whose key does not satisfy `keep`.
    pub fn retain_keys(&mut self, mut keep: impl FnMut(ObjRef) -> bool) {
        for entry in &mut self.entries {
            if let Some(key) = entry.key {
                if !keep(key.obj) {
                    entry.key = None;
                    entry.value = Value::Bool(true);
                    self.live -= 1;
                }
            }
        }
    }

    /// Iterate over live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Key, Value)> + '_ {
        self.entries
            .iter()
            .filter_map(|entry| entry.key.map(|key| (key, entry.value)))
    }

    fn adjust_capacity(&mut self, capacity: usize) {
        let old = std::mem::replace(&mut self.entries, vec![Entry::default(); capacity]);
        self.used = 0;
        self.live = 0;
        for entry in old {
            if let Some(key) = entry.key {
                let index = find_entry(&self.entries, key);
                self.entries[index] = entry;
                self.used += 1;
                self.live += 1;
            }
        }
    }
}

fn grow_capacity(capacity: usize) -> usize {
    if capacity < 8 {
        8
    } else {
        capacity * 2
    }
}

/// Index of the slot holding `key`, or of the slot where it should go: the
/// first tombstone passed on the way, else the empty slot that ended the
/// probe.
fn find_entry(entries: &[Entry], key: Key) -> usize {
    let mask = entries.len() - 1;
    let mut index = key.hash as usize & mask;
    let mut tombstone = None;
    loop {
        let entry = &entries[index];
        match entry.key {
            None if entry.is_tombstone() => {
                tombstone.get_or_insert(index);
            }
            None => return tombstone.unwrap_or(index),
            Some(k) if k.obj == key.obj => return index,
            Some(_) => {}
        }
        index = (index + 1) & mask;
    }
}
