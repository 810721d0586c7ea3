//! # Broad Phase
//!
//! Sweep-and-prune over six sorted sequences: {static, moveable} × {X, Y, Z},
//! each ordered by the entity's minimum extent on that axis.
//!
//! ## Frame protocol
//!
//! 1. `UpdateDynamics`: systems call `set_bounds` / `set_swept` on their
//!    moveable proxies. Only the proxy's pending box changes.
//! 2. Phase boundary: `resort()` copies pending boxes into the moveable
//!    sequences and restores their order by insertion sort. Entities move a
//!    small fraction of their extent per frame, so each entry bubbles a few
//!    places at most.
//! 3. `UpdateLogic`: `compute_overlaps()` and `query()` read the sequences
//!    as of the last `resort`, and may run concurrently.
//!
//! Static proxies are binary-inserted once and never re-sorted.
//!
//! Intervals are closed: boxes that touch on a face overlap.

use std::collections::{HashMap, HashSet};

use atlas_core::{EntityId, Missing, SimError, SimResult};
use atlas_shared::{Aabb, Axis};

/// Whether a proxy may move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Mobility {
    /// Inserted once; extents never change.
    Static = 0,
    /// Re-sorted every frame.
    Moveable = 1,
}

impl Mobility {
    /// Converts from u8.
    #[must_use]
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Static),
            1 => Some(Self::Moveable),
            _ => None,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// One entity's projection on one axis.
#[derive(Clone, Copy, Debug)]
struct Entry {
    min: f32,
    max: f32,
    id: EntityId,
}

#[derive(Clone, Copy, Debug)]
struct Proxy {
    mobility: Mobility,
    /// Latest box set by the owner, swept if the owner moved fast.
    pending: Aabb,
    /// Latest box the entity itself occupies.
    own: Aabb,
    /// Box the sequences were last sorted with.
    synced: Aabb,
}

/// Sweep-and-prune broad phase.
#[derive(Default)]
pub struct BroadPhase {
    /// `[mobility][axis]`, each sorted by `min`.
    sequences: [[Vec<Entry>; 3]; 2],
    proxies: HashMap<EntityId, Proxy>,
    dirty: bool,
}

impl BroadPhase {
    /// Creates an empty broad phase.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of proxies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    /// Returns true if there are no proxies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Returns true if `id` has a proxy.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.proxies.contains_key(&id)
    }

    /// Latest box of a proxy (including moves not yet resorted).
    ///
    /// # Errors
    ///
    /// `NotFound` if `id` has no proxy.
    pub fn bounds(&self, id: EntityId) -> SimResult<Aabb> {
        self.proxy(id).map(|p| p.pending)
    }

    /// Box the entity occupies, without any sweep.
    ///
    /// # Errors
    ///
    /// `NotFound` if `id` has no proxy.
    pub fn own_bounds(&self, id: EntityId) -> SimResult<Aabb> {
        self.proxy(id).map(|p| p.own)
    }

    /// Mobility of a proxy.
    ///
    /// # Errors
    ///
    /// `NotFound` if `id` has no proxy.
    pub fn mobility(&self, id: EntityId) -> SimResult<Mobility> {
        self.proxy(id).map(|p| p.mobility)
    }

    /// Returns true if moved proxies are waiting for `resort`.
    #[must_use]
    pub const fn needs_resort(&self) -> bool {
        self.dirty
    }

    fn proxy(&self, id: EntityId) -> SimResult<&Proxy> {
        self.proxies
            .get(&id)
            .ok_or(SimError::NotFound(Missing::Proxy(id)))
    }

    /// Adds a proxy to all three sequences of its mobility.
    ///
    /// # Errors
    ///
    /// `AlreadyRegistered` if `id` already has a proxy.
    pub fn insert(&mut self, id: EntityId, aabb: Aabb, mobility: Mobility) -> SimResult<()> {
        if self.proxies.contains_key(&id) {
            return Err(SimError::AlreadyRegistered(format!("broad-phase proxy for entity {id}")));
        }
        for axis in Axis::ALL {
            let entry = Entry {
                min: aabb.min_on(axis),
                max: aabb.max_on(axis),
                id,
            };
            let seq = &mut self.sequences[mobility.index()][axis.index()];
            let at = seq.partition_point(|e| e.min <= entry.min);
            seq.insert(at, entry);
        }
        self.proxies.insert(
            id,
            Proxy {
                mobility,
                pending: aabb,
                own: aabb,
                synced: aabb,
            },
        );
        Ok(())
    }

    /// Removes a proxy from all its sequences.
    ///
    /// # Errors
    ///
    /// `NotFound` if `id` has no proxy.
    pub fn remove(&mut self, id: EntityId) -> SimResult<Aabb> {
        let proxy = self
            .proxies
            .remove(&id)
            .ok_or(SimError::NotFound(Missing::Proxy(id)))?;
        for axis in Axis::ALL {
            let seq = &mut self.sequences[proxy.mobility.index()][axis.index()];
            if let Some(at) = locate(seq, proxy.synced.min_on(axis), id) {
                seq.remove(at);
            }
        }
        Ok(proxy.pending)
    }

    /// Moves a moveable proxy. Takes effect in the sequences at `resort`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `id` has no proxy
    /// - `Immovable` if the proxy is static
    pub fn set_bounds(&mut self, id: EntityId, aabb: Aabb) -> SimResult<()> {
        self.move_proxy(id, aabb, aabb)
    }

    /// Moves a fast proxy to the box swept between `start` and `end`.
    ///
    /// The entity's own box becomes `end`.
    ///
    /// # Errors
    ///
    /// As for [`BroadPhase::set_bounds`].
    pub fn set_swept(&mut self, id: EntityId, start: Aabb, end: Aabb) -> SimResult<()> {
        self.move_proxy(id, start.union(&end), end)
    }

    fn move_proxy(&mut self, id: EntityId, pending: Aabb, own: Aabb) -> SimResult<()> {
        let proxy = self
            .proxies
            .get_mut(&id)
            .ok_or(SimError::NotFound(Missing::Proxy(id)))?;
        if proxy.mobility == Mobility::Static {
            return Err(SimError::Immovable(id));
        }
        proxy.pending = pending;
        proxy.own = own;
        self.dirty = true;
        Ok(())
    }

    /// Syncs moveable sequences with their proxies and restores their order.
    ///
    /// Returns the number of adjacent swaps performed.
    pub fn resort(&mut self) -> usize {
        let proxies = &mut self.proxies;
        let mut swaps = 0;

        for axis in Axis::ALL {
            let seq = &mut self.sequences[Mobility::Moveable.index()][axis.index()];
            for entry in seq.iter_mut() {
                if let Some(proxy) = proxies.get(&entry.id) {
                    entry.min = proxy.pending.min_on(axis);
                    entry.max = proxy.pending.max_on(axis);
                }
            }
            swaps += insertion_sort(seq);
        }

        for proxy in proxies.values_mut() {
            proxy.synced = proxy.pending;
        }
        self.dirty = false;
        swaps
    }

    /// Returns true if all six sequences are ordered by `min`.
    #[must_use]
    pub fn is_sorted(&self) -> bool {
        self.sequences
            .iter()
            .flatten()
            .all(|seq| seq.windows(2).all(|w| w[0].min <= w[1].min))
    }

    /// Every pair whose boxes overlap on X, Y and Z.
    ///
    /// Sweeps each axis over the merged static and moveable sequences with
    /// an active list, then intersects the three per-axis pair sets. Pairs
    /// are normalized (`a < b`) and sorted.
    #[must_use]
    pub fn compute_overlaps(&self) -> Vec<(EntityId, EntityId)> {
        let [x, y, z] = Axis::ALL.map(|axis| self.sweep_axis(axis));

        let mut pairs: Vec<_> = x
            .into_iter()
            .filter(|pair| y.contains(pair) && z.contains(pair))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    fn sweep_axis(&self, axis: Axis) -> HashSet<(EntityId, EntityId)> {
        let statics = &self.sequences[Mobility::Static.index()][axis.index()];
        let moveables = &self.sequences[Mobility::Moveable.index()][axis.index()];

        let mut pairs = HashSet::new();
        let mut active: Vec<Entry> = Vec::new();
        let (mut i, mut j) = (0, 0);

        while i < statics.len() || j < moveables.len() {
            let next = match (statics.get(i), moveables.get(j)) {
                (Some(s), Some(m)) if s.min <= m.min => {
                    i += 1;
                    *s
                }
                (_, Some(m)) => {
                    j += 1;
                    *m
                }
                (Some(s), None) => {
                    i += 1;
                    *s
                }
                (None, None) => break,
            };

            active.retain(|a| a.max >= next.min);
            for a in &active {
                pairs.insert(ordered(a.id, next.id));
            }
            active.push(next);
        }
        pairs
    }

    /// All-pairs reference for `compute_overlaps`.
    #[must_use]
    pub fn brute_force_overlaps(&self) -> Vec<(EntityId, EntityId)> {
        let proxies: Vec<(EntityId, Aabb)> = self
            .proxies
            .iter()
            .map(|(&id, proxy)| (id, proxy.synced))
            .collect();
        let mut pairs = Vec::new();
        for (n, &(a, box_a)) in proxies.iter().enumerate() {
            for &(b, box_b) in &proxies[n + 1..] {
                if box_a.overlaps(&box_b) {
                    pairs.push(ordered(a, b));
                }
            }
        }
        pairs.sort_unstable();
        pairs
    }

    /// Proxies whose box overlaps `aabb`, sorted.
    #[must_use]
    pub fn query(&self, aabb: &Aabb) -> Vec<EntityId> {
        let mut hits = Vec::new();
        for mobility in [Mobility::Static, Mobility::Moveable] {
            let seq = &self.sequences[mobility.index()][Axis::X.index()];
            let end = seq.partition_point(|e| e.min <= aabb.max.x);
            for entry in &seq[..end] {
                if entry.max < aabb.min.x {
                    continue;
                }
                if let Some(proxy) = self.proxies.get(&entry.id) {
                    if proxy.synced.overlaps(aabb) {
                        hits.push(entry.id);
                    }
                }
            }
        }
        hits.sort_unstable();
        hits
    }
}

fn ordered(a: EntityId, b: EntityId) -> (EntityId, EntityId) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Position of `id` in a sequence sorted by `min`, given the `min` it was
/// sorted with.
fn locate(seq: &[Entry], min: f32, id: EntityId) -> Option<usize> {
    let start = seq.partition_point(|e| e.min < min);
    seq[start..]
        .iter()
        .take_while(|e| e.min == min)
        .position(|e| e.id == id)
        .map(|at| start + at)
        .or_else(|| seq.iter().position(|e| e.id == id))
}

/// Stable insertion sort by `min`; returns the number of swaps.
fn insertion_sort(seq: &mut [Entry]) -> usize {
    let mut swaps = 0;
    for i in 1..seq.len() {
        let mut j = i;
        while j > 0 && seq[j - 1].min > seq[j].min {
            seq.swap(j - 1, j);
            swaps += 1;
            j -= 1;
        }
    }
    swaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_shared::Vec3;

    fn id(n: u32) -> EntityId {
        EntityId::new(n, 0)
    }

    fn cube(x: f32, y: f32, z: f32, half: f32) -> Aabb {
        Aabb::from_center(Vec3::new(x, y, z), Vec3::splat(half))
    }

    #[test]
    fn test_static_pairs_found() {
        let mut bp = BroadPhase::new();
        bp.insert(id(0), cube(0.0, 0.0, 0.0, 1.0), Mobility::Static).unwrap();
        bp.insert(id(1), cube(1.5, 0.0, 0.0, 1.0), Mobility::Static).unwrap();
        bp.insert(id(2), cube(10.0, 0.0, 0.0, 1.0), Mobility::Static).unwrap();

        assert_eq!(bp.compute_overlaps(), vec![(id(0), id(1))]);
    }

    #[test]
    fn test_touching_faces_overlap() {
        let mut bp = BroadPhase::new();
        bp.insert(id(0), cube(0.0, 0.0, 0.0, 1.0), Mobility::Static).unwrap();
        bp.insert(id(1), cube(2.0, 0.0, 0.0, 1.0), Mobility::Moveable).unwrap();
        assert_eq!(bp.compute_overlaps(), vec![(id(0), id(1))]);
    }

    #[test]
    fn test_overlap_needs_all_three_axes() {
        let mut bp = BroadPhase::new();
        bp.insert(id(0), cube(0.0, 0.0, 0.0, 1.0), Mobility::Static).unwrap();
        // Overlaps on X and Y, not Z.
        bp.insert(id(1), cube(0.5, 0.5, 5.0, 1.0), Mobility::Moveable).unwrap();
        assert!(bp.compute_overlaps().is_empty());
    }

    #[test]
    fn test_moves_apply_at_resort() {
        let mut bp = BroadPhase::new();
        bp.insert(id(0), cube(0.0, 0.0, 0.0, 1.0), Mobility::Static).unwrap();
        bp.insert(id(1), cube(10.0, 0.0, 0.0, 1.0), Mobility::Moveable).unwrap();
        bp.insert(id(2), cube(20.0, 0.0, 0.0, 1.0), Mobility::Moveable).unwrap();

        bp.set_bounds(id(2), cube(0.5, 0.0, 0.0, 1.0)).unwrap();
        assert!(bp.needs_resort());
        assert!(bp.compute_overlaps().is_empty());

        assert!(bp.resort() > 0);
        assert!(bp.is_sorted());
        assert_eq!(bp.compute_overlaps(), vec![(id(0), id(2))]);
    }

    #[test]
    fn test_static_is_immovable() {
        let mut bp = BroadPhase::new();
        bp.insert(id(0), cube(0.0, 0.0, 0.0, 1.0), Mobility::Static).unwrap();
        assert_eq!(
            bp.set_bounds(id(0), cube(1.0, 0.0, 0.0, 1.0)),
            Err(SimError::Immovable(id(0)))
        );
        assert!(matches!(
            bp.insert(id(0), cube(0.0, 0.0, 0.0, 1.0), Mobility::Moveable),
            Err(SimError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn test_remove_drops_pairs() {
        let mut bp = BroadPhase::new();
        bp.insert(id(0), cube(0.0, 0.0, 0.0, 1.0), Mobility::Static).unwrap();
        bp.insert(id(1), cube(0.0, 0.0, 0.0, 1.0), Mobility::Moveable).unwrap();
        bp.remove(id(1)).unwrap();
        assert!(bp.compute_overlaps().is_empty());
        assert!(matches!(
            bp.remove(id(1)),
            Err(SimError::NotFound(Missing::Proxy(_)))
        ));
    }

    #[test]
    fn test_swept_box_is_union() {
        let mut bp = BroadPhase::new();
        bp.insert(id(0), Aabb::new(Vec3::ZERO, Vec3::ZERO), Mobility::Moveable).unwrap();
        bp.set_swept(
            id(0),
            Aabb::new(Vec3::ZERO, Vec3::ZERO),
            Aabb::new(Vec3::new(10.0, 0.0, 0.0), Vec3::new(10.0, 0.0, 0.0)),
        )
        .unwrap();
        let swept = bp.bounds(id(0)).unwrap();
        assert_eq!(swept.min.x, 0.0);
        assert_eq!(swept.max.x, 10.0);

        let own = bp.own_bounds(id(0)).unwrap();
        assert_eq!(own.min.x, 10.0);
        assert_eq!(own.max.x, 10.0);

        bp.set_bounds(id(0), cube(3.0, 0.0, 0.0, 1.0)).unwrap();
        assert_eq!(bp.own_bounds(id(0)).unwrap(), bp.bounds(id(0)).unwrap());
    }

    #[test]
    fn test_remove_among_equal_keys() {
        let mut bp = BroadPhase::new();
        for n in 0..16 {
            let mobility = if n % 2 == 0 { Mobility::Static } else { Mobility::Moveable };
            bp.insert(id(n), cube(0.0, 0.0, 0.0, 1.0), mobility).unwrap();
        }
        bp.insert(id(16), cube(4.0, 0.0, 0.0, 1.0), Mobility::Moveable).unwrap();

        // Moved but not yet resorted: located by the box it was sorted with.
        bp.set_bounds(id(5), cube(-9.0, 0.0, 0.0, 1.0)).unwrap();
        let gone = [id(5), id(0), id(15), id(16)];
        for n in gone {
            bp.remove(n).unwrap();
        }
        assert_eq!(bp.len(), 13);
        assert!(bp.is_sorted());
        bp.resort();
        let pairs = bp.compute_overlaps();
        assert_eq!(pairs, bp.brute_force_overlaps());
        assert!(pairs.iter().all(|(a, b)| !gone.contains(a) && !gone.contains(b)));
        assert_eq!(pairs.len(), 13 * 12 / 2);
    }

    #[test]
    fn test_query() {
        let mut bp = BroadPhase::new();
        bp.insert(id(0), cube(0.0, 0.0, 0.0, 1.0), Mobility::Static).unwrap();
        bp.insert(id(1), cube(5.0, 0.0, 0.0, 1.0), Mobility::Moveable).unwrap();
        bp.insert(id(2), cube(5.0, 9.0, 0.0, 1.0), Mobility::Moveable).unwrap();

        assert_eq!(bp.query(&cube(3.0, 0.0, 0.0, 2.5)), vec![id(0), id(1)]);
    }
}
