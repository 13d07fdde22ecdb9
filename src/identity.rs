//! Surrogate key allocation.
//!
//! [`IdentityAllocator`] hands out dense integer ids per entity kind in
//! first-seen order and remembers the natural key each id was issued
//! for. One allocator spans one batch: every file merged together must
//! share it, otherwise the same segment seen in two files would get two
//! ids.
//!
//! An allocator can be seeded from an [`IdentitySnapshot`] of what the
//! warehouse already holds. Seeded keys resolve to their existing ids
//! and fresh keys are numbered above the highest id already loaded, so
//! successive append runs never collide.

use std::collections::{HashMap, HashSet};

/// Entity kinds with a natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Segment,
    Drive,
    Camera,
    Image,
    Category,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Segment,
        EntityKind::Drive,
        EntityKind::Camera,
        EntityKind::Image,
        EntityKind::Category,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Join tables: every row gets a fresh id, there is no natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowKind {
    CameraImage,
    ImageCategory,
}

impl RowKind {
    fn index(self) -> usize {
        self as usize
    }
}

/// The identifying value(s) of an entity in the source data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NaturalKey {
    Name(String),
    Pair(String, String),
}

impl NaturalKey {
    pub fn name(name: &str) -> Self {
        NaturalKey::Name(name.to_string())
    }

    /// Drives are unique per segment.
    pub fn drive(segment: &str, drive: &str) -> Self {
        NaturalKey::Pair(segment.to_string(), drive.to_string())
    }

    /// Cameras are keyed by `"{drive}_{camera}_{segment}"`.
    pub fn camera(segment: &str, drive: &str, camera: &str) -> Self {
        NaturalKey::Name(format!("{}_{}_{}", drive, camera, segment))
    }
}

/// Natural keys and ids already present in the destination.
#[derive(Debug, Clone, Default)]
pub struct IdentitySnapshot {
    pub keys: Vec<(EntityKind, NaturalKey, i64)>,
    /// Highest id per entity kind, including rows whose key could not be
    /// reconstructed.
    pub max_ids: HashMap<EntityKind, i64>,
    pub max_row_ids: HashMap<RowKind, i64>,
    /// Join rows already loaded, as (kind, left id, right id).
    pub links: HashSet<(RowKind, i64, i64)>,
}

#[derive(Debug, Clone)]
pub struct IdentityAllocator {
    maps: [HashMap<NaturalKey, i64>; 5],
    next: [i64; 5],
    next_row: [i64; 2],
    loaded_links: HashSet<(RowKind, i64, i64)>,
}

impl IdentityAllocator {
    pub fn new() -> Self {
        Self {
            maps: Default::default(),
            next: [1; 5],
            next_row: [1; 2],
            loaded_links: HashSet::new(),
        }
    }

    /// Seed from the destination so new ids continue after existing ones.
    pub fn from_snapshot(snapshot: &IdentitySnapshot) -> Self {
        let mut allocator = Self::new();
        for (kind, key, id) in &snapshot.keys {
            let i = kind.index();
            allocator.maps[i].entry(key.clone()).or_insert(*id);
            allocator.next[i] = allocator.next[i].max(id + 1);
        }
        for (kind, max) in &snapshot.max_ids {
            let i = kind.index();
            allocator.next[i] = allocator.next[i].max(max + 1);
        }
        for (kind, max) in &snapshot.max_row_ids {
            let i = kind.index();
            allocator.next_row[i] = allocator.next_row[i].max(max + 1);
        }
        allocator.loaded_links = snapshot.links.clone();
        allocator
    }

    /// Return the id for `key`, reserving the next one if it is new.
    pub fn allocate(&mut self, kind: EntityKind, key: NaturalKey) -> i64 {
        self.register(kind, key).0
    }

    /// Like [`allocate`](Self::allocate), also reporting whether the id was
    /// issued by this call.
    pub fn register(&mut self, kind: EntityKind, key: NaturalKey) -> (i64, bool) {
        let i = kind.index();
        if let Some(&id) = self.maps[i].get(&key) {
            return (id, false);
        }
        let id = self.next[i];
        self.next[i] += 1;
        self.maps[i].insert(key, id);
        (id, true)
    }

    pub fn lookup(&self, kind: EntityKind, key: &NaturalKey) -> Option<i64> {
        self.maps[kind.index()].get(key).copied()
    }

    /// Fresh id for a join-table row.
    pub fn next_row_id(&mut self, kind: RowKind) -> i64 {
        let i = kind.index();
        let id = self.next_row[i];
        self.next_row[i] += 1;
        id
    }

    /// Whether the destination already holds the join row `(left, right)`.
    /// Only rows from the seeding snapshot count; rows issued by this
    /// allocator never do.
    pub fn is_loaded_link(&self, kind: RowKind, left: i64, right: i64) -> bool {
        self.loaded_links.contains(&(kind, left, right))
    }

    /// The id the next new entity of `kind` would receive.
    pub fn peek_next(&self, kind: EntityKind) -> i64 {
        self.next[kind.index()]
    }

    /// Number of natural keys known for `kind`.
    pub fn known(&self, kind: EntityKind) -> usize {
        self.maps[kind.index()].len()
    }
}

impl Default for IdentityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_from_one() {
        let mut ids = IdentityAllocator::new();
        assert_eq!(ids.allocate(EntityKind::Segment, NaturalKey::name("a")), 1);
        assert_eq!(ids.allocate(EntityKind::Segment, NaturalKey::name("b")), 2);
        assert_eq!(ids.allocate(EntityKind::Segment, NaturalKey::name("c")), 3);
    }

    #[test]
    fn test_repeat_returns_same_id() {
        let mut ids = IdentityAllocator::new();
        let first = ids.allocate(EntityKind::Image, NaturalKey::name("1.jpg"));
        ids.allocate(EntityKind::Image, NaturalKey::name("2.jpg"));
        let (again, fresh) = ids.register(EntityKind::Image, NaturalKey::name("1.jpg"));
        assert_eq!(first, again);
        assert!(!fresh);
        assert_eq!(ids.known(EntityKind::Image), 2);
    }

    #[test]
    fn test_loaded_links_come_from_snapshot() {
        let mut snapshot = IdentitySnapshot::default();
        snapshot.links.insert((RowKind::CameraImage, 3, 9));
        let ids = IdentityAllocator::from_snapshot(&snapshot);
        assert!(ids.is_loaded_link(RowKind::CameraImage, 3, 9));
        assert!(!ids.is_loaded_link(RowKind::ImageCategory, 3, 9));
        assert!(!IdentityAllocator::new().is_loaded_link(RowKind::CameraImage, 3, 9));
    }

    #[test]
    fn test_kinds_have_independent_counters() {
        let mut ids = IdentityAllocator::new();
        assert_eq!(ids.allocate(EntityKind::Segment, NaturalKey::name("x")), 1);
        assert_eq!(ids.allocate(EntityKind::Category, NaturalKey::name("x")), 1);
        assert_eq!(ids.next_row_id(RowKind::CameraImage), 1);
        assert_eq!(ids.next_row_id(RowKind::CameraImage), 2);
        assert_eq!(ids.next_row_id(RowKind::ImageCategory), 1);
    }

    #[test]
    fn test_drive_key_is_scoped_to_segment() {
        let mut ids = IdentityAllocator::new();
        let a = ids.allocate(EntityKind::Drive, NaturalKey::drive("seg1", "d1"));
        let b = ids.allocate(EntityKind::Drive, NaturalKey::drive("seg2", "d1"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_camera_key_format() {
        assert_eq!(
            NaturalKey::camera("segment_1", "driveA", "cam1"),
            NaturalKey::Name("driveA_cam1_segment_1".to_string())
        );
    }

    #[test]
    fn test_deterministic_across_instances() {
        let keys = ["s3", "s1", "s2", "s1", "s3"];
        let run = || {
            let mut ids = IdentityAllocator::new();
            keys.iter()
                .map(|k| ids.allocate(EntityKind::Segment, NaturalKey::name(k)))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
        assert_eq!(run(), vec![1, 2, 3, 2, 1]);
    }

    #[test]
    fn test_snapshot_seeding() {
        let mut snapshot = IdentitySnapshot::default();
        snapshot
            .keys
            .push((EntityKind::Segment, NaturalKey::name("segment_0001"), 4));
        snapshot.max_ids.insert(EntityKind::Segment, 9);
        snapshot.max_row_ids.insert(RowKind::CameraImage, 20);

        let mut ids = IdentityAllocator::from_snapshot(&snapshot);
        assert_eq!(
            ids.register(EntityKind::Segment, NaturalKey::name("segment_0001")),
            (4, false)
        );
        assert_eq!(
            ids.allocate(EntityKind::Segment, NaturalKey::name("segment_0002")),
            10
        );
        assert_eq!(ids.next_row_id(RowKind::CameraImage), 21);
        assert_eq!(ids.next_row_id(RowKind::ImageCategory), 1);
        assert_eq!(ids.peek_next(EntityKind::Image), 1);
    }
}
