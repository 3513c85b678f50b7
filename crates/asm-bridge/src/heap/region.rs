//! Heap regions and their space flags
//!
//! Every heap address belongs to a `REGION_SIZE`-aligned region. The first
//! bytes of a region form its header:
//!
//! ```text
//! region base ──► ┌──────────────────────────────┐
//!                 │ flag (u8)                    │  space this region belongs to
//!                 │ local-to-share set (ptr)     │  null until first recorded slot
//!                 ├──────────────────────────────┤  REGION_HEADER_SIZE
//!                 │ objects ...                  │
//!                 └──────────────────────────────┘  base + REGION_SIZE
//! ```
//!
//! The write barrier decides everything from flag bytes, so the numeric
//! ordering of flags is part of the barrier contract. The ordering is owned
//! by [`RegionFlagScheme`], which the allocator uses when it tags regions.

use serde::{Deserialize, Serialize};

use crate::defaults::{DEFAULT_REGION_MASK, REGION_SIZE};
use crate::error::ConfigError;

/// log2 of the tagged slot size, used to index the remembered set
pub const TAGGED_TYPE_SIZE_LOG: u32 = 3;

/// Which partition of the heap a region belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpaceKind {
    /// Thread-local young generation
    Young,
    /// Thread-local old generation
    Old,
    /// Shared heap, swept by the shared collector
    SharedOld,
    /// Shared heap, immutable after initialization
    SharedReadOnly,
}

/// Numeric region flags as assigned by the allocator.
///
/// Invariants checked by [`RegionFlagScheme::validate`]:
/// - every local flag (`young`, `old`) is below `shared_space_begin`
/// - `shared_space_begin <= shared_sweepable_begin <= shared_old <= shared_sweepable_end`
/// - `shared_read_only` is above `shared_sweepable_end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionFlagScheme {
    /// Flag of young-generation regions
    pub young: u8,
    /// Flag of old-generation regions
    pub old: u8,
    /// First flag of the shared heap
    pub shared_space_begin: u8,
    /// First flag of the shared sweepable range
    pub shared_sweepable_begin: u8,
    /// Flag of shared old regions
    pub shared_old: u8,
    /// Last flag of the shared sweepable range
    pub shared_sweepable_end: u8,
    /// Flag of shared read-only regions
    pub shared_read_only: u8,
}

impl RegionFlagScheme {
    /// Flag for a space
    pub fn flag_for(&self, kind: SpaceKind) -> u8 {
        match kind {
            SpaceKind::Young => self.young,
            SpaceKind::Old => self.old,
            SpaceKind::SharedOld => self.shared_old,
            SpaceKind::SharedReadOnly => self.shared_read_only,
        }
    }

    /// Is this flag in the shared heap?
    #[inline]
    pub fn is_shared(&self, flag: u8) -> bool {
        flag >= self.shared_space_begin
    }

    /// Is this flag at or past the shared sweepable begin?
    #[inline]
    pub fn is_shared_sweepable_or_read_only(&self, flag: u8) -> bool {
        flag >= self.shared_sweepable_begin
    }

    /// Is this the young flag?
    #[inline]
    pub fn is_young(&self, flag: u8) -> bool {
        flag == self.young
    }

    /// Check the ordering the barrier relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ordered = self.young < self.shared_space_begin
            && self.old < self.shared_space_begin
            && self.young != self.old
            && self.shared_space_begin <= self.shared_sweepable_begin
            && self.shared_sweepable_begin <= self.shared_old
            && self.shared_old <= self.shared_sweepable_end
            && self.shared_sweepable_end < self.shared_read_only;
        if ordered {
            Ok(())
        } else {
            Err(ConfigError::RegionScheme(*self))
        }
    }
}

impl Default for RegionFlagScheme {
    fn default() -> Self {
        Self {
            young: 0x09,
            old: 0x0A,
            shared_space_begin: 0x12,
            shared_sweepable_begin: 0x12,
            shared_old: 0x12,
            shared_sweepable_end: 0x14,
            shared_read_only: 0x15,
        }
    }
}

/// Base address of the region containing `addr`
#[inline]
pub fn region_base(addr: usize) -> usize {
    addr & !DEFAULT_REGION_MASK
}

/// Bitset with one bit per tagged slot of a region, recording slots of
/// local objects that point into the shared heap.
#[derive(Debug, Clone)]
pub struct RememberedSet {
    words: Vec<u32>,
}

impl RememberedSet {
    /// Empty set covering one region
    pub fn new() -> Self {
        let bits = REGION_SIZE >> TAGGED_TYPE_SIZE_LOG;
        Self {
            words: vec![0; bits / 32],
        }
    }

    /// Bit index for a byte offset inside the region
    #[inline]
    pub fn bit_index(offset_in_region: usize) -> usize {
        offset_in_region >> TAGGED_TYPE_SIZE_LOG
    }

    /// Is the slot at `offset_in_region` recorded?
    pub fn contains(&self, offset_in_region: usize) -> bool {
        let bit = Self::bit_index(offset_in_region);
        self.words[bit >> 5] & (1 << (bit & 31)) != 0
    }

    /// Record a slot; returns true if it was newly set
    pub fn insert(&mut self, offset_in_region: usize) -> bool {
        let bit = Self::bit_index(offset_in_region);
        let word = &mut self.words[bit >> 5];
        let mask = 1 << (bit & 31);
        let fresh = *word & mask == 0;
        *word |= mask;
        fresh
    }

    /// Number of recorded slots
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// No slot recorded?
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }
}

impl Default for RememberedSet {
    fn default() -> Self {
        Self::new()
    }
}

/// One heap region
#[derive(Debug)]
pub struct Region {
    /// Region base address
    pub base: usize,
    /// Space flag byte
    pub flag: u8,
    /// Next free byte offset
    pub(crate) cursor: usize,
    /// Local-to-shared remembered set, allocated lazily
    pub local_to_share_set: Option<RememberedSet>,
}

impl Region {
    /// Fresh region with its header reserved
    pub fn new(base: usize, flag: u8, header_size: usize) -> Self {
        Self {
            base,
            flag,
            cursor: header_size,
            local_to_share_set: None,
        }
    }

    /// Allocate `size` bytes; None when the region is full
    pub fn bump(&mut self, size: usize) -> Option<usize> {
        if self.cursor + size > REGION_SIZE {
            return None;
        }
        let addr = self.base + self.cursor;
        self.cursor += size;
        Some(addr)
    }

    /// Ensure the remembered set exists
    pub fn create_local_to_share_set(&mut self) -> &mut RememberedSet {
        self.local_to_share_set.get_or_insert_with(RememberedSet::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scheme_is_valid() {
        RegionFlagScheme::default().validate().unwrap();
    }

    #[test]
    fn test_scheme_rejects_local_flag_in_shared_range() {
        let scheme = RegionFlagScheme {
            young: 0x13,
            ..RegionFlagScheme::default()
        };
        assert!(scheme.validate().is_err());
    }

    #[test]
    fn test_scheme_rejects_read_only_inside_sweepable() {
        let scheme = RegionFlagScheme {
            shared_read_only: 0x13,
            ..RegionFlagScheme::default()
        };
        assert!(scheme.validate().is_err());
    }

    #[test]
    fn test_scheme_ranges() {
        let s = RegionFlagScheme::default();
        assert!(s.is_young(s.flag_for(SpaceKind::Young)));
        assert!(!s.is_shared(s.flag_for(SpaceKind::Old)));
        assert!(s.is_shared(s.flag_for(SpaceKind::SharedOld)));
        assert!(s.is_shared_sweepable_or_read_only(s.flag_for(SpaceKind::SharedReadOnly)));
    }

    #[test]
    fn test_remembered_set_insert() {
        let mut set = RememberedSet::new();
        assert!(set.is_empty());
        assert!(set.insert(0x48));
        assert!(!set.insert(0x48));
        assert!(set.contains(0x48));
        assert!(!set.contains(0x50));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_region_bump_and_base() {
        let mut r = Region::new(0x1_0000_0000, 0x09, 64);
        let a = r.bump(64).unwrap();
        assert_eq!(a, 0x1_0000_0040);
        assert_eq!(region_base(a + 8), 0x1_0000_0000);
        assert!(r.bump(REGION_SIZE).is_none());
    }
}
