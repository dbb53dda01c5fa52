//! Compact in-memory index, optimized for mostly-increasing keys.
//!
//! The map is a list of [`CompactSection`]s, each owning a
//! pre-allocated slab of [`NeedleValue`]s kept sorted by key plus a
//! small overflow table. Inserts that arrive in increasing key order —
//! the overwhelmingly common case for an append-only volume — land at
//! the end of the slab in `O(log n)` with no per-insert allocation.
//! Out-of-order and over-capacity inserts fall back to the overflow
//! table.
//!
//! A section is *sealed* once its slab is full; an insert past a sealed
//! last section's key range opens a fresh section, so the list grows
//! linearly with the key space while staying sorted by section start.

use std::collections::HashMap;

use super::NeedleValue;

/// Slab capacity of one section. At 16 bytes per entry a full section
/// costs ~1.6 MiB.
pub const SECTION_CAPACITY: usize = 100_000;

// ------------------------------------------------------------------------------------------------
// CompactSection
// ------------------------------------------------------------------------------------------------

/// A fixed-capacity slab of index entries sorted by key, with an
/// overflow table for the entries that cannot keep the slab sorted.
#[derive(Debug)]
pub struct CompactSection {
    /// Sorted slab; allocated once at section creation.
    values: Vec<NeedleValue>,

    /// Out-of-order or over-capacity entries.
    overflow: HashMap<u64, NeedleValue>,

    /// First key ever inserted into this section.
    start: u64,

    /// Maximum key observed by this section.
    end: u64,
}

impl CompactSection {
    fn new(start: u64) -> Self {
        Self {
            values: Vec::with_capacity(SECTION_CAPACITY),
            overflow: HashMap::new(),
            start,
            end: 0,
        }
    }

    /// Inserts or overwrites `key`.
    fn set(&mut self, key: u64, offset: u32, size: u32) {
        if key > self.end {
            self.end = key;
        }
        match self.values.binary_search_by_key(&key, |v| v.key) {
            Ok(i) => {
                self.values[i].offset = offset;
                self.values[i].size = size;
            }
            // A key above everything in a non-full slab extends the
            // sorted prefix; anything else goes to overflow.
            Err(pos) if pos == self.values.len() && !self.is_sealed() => {
                self.values.push(NeedleValue { key, offset, size });
            }
            Err(_) => {
                self.overflow.insert(key, NeedleValue { key, offset, size });
            }
        }
    }

    /// Tombstones `key` in the slab and drops it from overflow.
    fn delete(&mut self, key: u64) {
        if let Ok(i) = self.values.binary_search_by_key(&key, |v| v.key) {
            self.values[i].size = 0;
        }
        self.overflow.remove(&key);
    }

    /// Looks `key` up, overflow first.
    fn get(&self, key: u64) -> Option<NeedleValue> {
        if let Some(v) = self.overflow.get(&key) {
            return Some(*v);
        }
        self.values
            .binary_search_by_key(&key, |v| v.key)
            .ok()
            .map(|i| self.values[i])
    }

    /// True once the slab has reached [`SECTION_CAPACITY`].
    pub fn is_sealed(&self) -> bool {
        self.values.len() >= SECTION_CAPACITY
    }

    /// Entries in the sorted slab.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the sorted slab is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries in the overflow table.
    pub fn overflow_len(&self) -> usize {
        self.overflow.len()
    }

    /// First key ever inserted into this section.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Maximum key observed by this section.
    pub fn end(&self) -> u64 {
        self.end
    }
}

// ------------------------------------------------------------------------------------------------
// CompactMap
// ------------------------------------------------------------------------------------------------

/// Ordered, append-only list of sections covering the key space.
///
/// Routing is by binary search on section `start`: a key belongs to the
/// last section starting at or below it (or the first section when the
/// key precedes every start — such inserts land in that section's
/// overflow). A new section is opened only when a key lands past the
/// end of a sealed last section.
#[derive(Debug, Default)]
pub struct CompactMap {
    sections: Vec<CompactSection>,
}

impl CompactMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites `key`.
    pub fn set(&mut self, key: u64, offset: u32, size: u32) {
        let idx = match self.locate(key) {
            None => {
                self.sections.push(CompactSection::new(key));
                0
            }
            Some(i) => {
                let section = &self.sections[i];
                if i == self.sections.len() - 1 && section.is_sealed() && key > section.end {
                    self.sections.push(CompactSection::new(key));
                    i + 1
                } else {
                    i
                }
            }
        };
        self.sections[idx].set(key, offset, size);
    }

    /// Tombstones `key` if any section covers it.
    pub fn delete(&mut self, key: u64) {
        if let Some(i) = self.locate(key) {
            self.sections[i].delete(key);
        }
    }

    /// Looks `key` up in its unique covering section.
    pub fn get(&self, key: u64) -> Option<NeedleValue> {
        self.sections[self.locate(key)?].get(key)
    }

    /// Sections currently in the map, sorted by start key.
    pub fn sections(&self) -> &[CompactSection] {
        &self.sections
    }

    /// Index of the section responsible for `key`; `None` only when the
    /// map is empty.
    fn locate(&self, key: u64) -> Option<usize> {
        if self.sections.is_empty() {
            return None;
        }
        let after = self.sections.partition_point(|s| s.start <= key);
        Some(after.saturating_sub(1))
    }
}
