//! Wire bundle resolution.
//!
//! Points joined by wire segments form bundles. Bundle lanes joined through
//! splitters form threads. Both are disjoint-set classes: bundles are kept
//! incrementally in a forest over points, threads are derived from the
//! bundles whenever the layout is rebuilt.
//!
//! Rebuilds are local. Only bundles containing a point touched since the
//! previous rebuild get new slots, and only threads reachable from them
//! through splitters are re-derived. Every other `BundleId` and `ThreadId`
//! keeps its value. Retired slots stay in the layout, empty, until a later
//! rebuild reuses them.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use super::disjoint::DisjointSet;
use crate::circuit::{PointId, SegmentId};
use crate::error::{GatesimError, Result};

/// Index of a bundle within a [`WireLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleId(pub usize);

/// Index of a thread within a [`WireLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub usize);

/// One output end of a splitter: a point and the combined lanes it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitEnd {
    pub point: PointId,
    /// Combined-lane index for each lane of this end, least significant first
    pub lanes: Vec<u8>,
}

/// A splitter joining lanes of a combined bundle to lanes of other bundles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitterSpec {
    pub combined: PointId,
    pub width: u8,
    pub ends: Vec<SplitEnd>,
}

/// Width of a bundle as determined by the ends attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleWidth {
    /// Nothing with a width is attached
    Unset,
    Fixed(u8),
    /// Attached ends disagree; the distinct widths seen
    Conflict(Vec<u8>),
}

/// A resolved bundle.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub points: Vec<PointId>,
    pub width: BundleWidth,
    /// One thread per lane; empty unless the width is fixed
    pub threads: Vec<ThreadId>,
}

impl Bundle {
    fn empty() -> Self {
        Self {
            points: Vec::new(),
            width: BundleWidth::Unset,
            threads: Vec::new(),
        }
    }
}

/// The resolved bundle and thread decomposition of a circuit.
#[derive(Debug, Clone, Default)]
pub struct WireLayout {
    point_bundle: Vec<BundleId>,
    bundles: Vec<Bundle>,
    threads: Vec<Vec<(BundleId, u8)>>,
}

impl WireLayout {
    /// Bundle containing `point`.
    pub fn bundle_of(&self, point: PointId) -> BundleId {
        self.point_bundle[point.0]
    }

    pub fn bundle(&self, id: BundleId) -> &Bundle {
        &self.bundles[id.0]
    }

    pub fn bundles(&self) -> &[Bundle] {
        &self.bundles
    }

    /// Number of bundle slots, including empty retired ones.
    pub fn bundle_count(&self) -> usize {
        self.bundles.len()
    }

    /// Number of thread slots, including empty retired ones.
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Every (bundle, lane) pair sharing a thread.
    pub fn thread_members(&self, id: ThreadId) -> &[(BundleId, u8)] {
        &self.threads[id.0]
    }

    /// Thread carrying `lane` of the bundle at `point`, if the bundle has a fixed width.
    pub fn thread_at(&self, point: PointId, lane: u8) -> Option<ThreadId> {
        self.bundle(self.bundle_of(point))
            .threads
            .get(lane as usize)
            .copied()
    }
}

/// Incrementally maintained bundle/thread resolver.
///
/// Adding a segment unites two classes immediately. Removing one cannot be
/// undone in a union-find, so both endpoints are marked dirty and only the
/// classes containing dirty points are dissolved and re-united from their
/// remaining segments on the next rebuild.
#[derive(Debug, Clone, Default)]
pub struct WireBundleResolver {
    forest: DisjointSet,
    /// Class members keyed by class root
    members: HashMap<usize, Vec<usize>>,
    segments: Vec<Option<[PointId; 2]>>,
    incident: Vec<Vec<SegmentId>>,
    /// Widths of the ends (pins, ports, splitter ends) attached at each point
    ends: Vec<Vec<u8>>,
    splitters: Vec<SplitterSpec>,
    /// Splitters attached at each point
    point_splitters: Vec<Vec<usize>>,
    /// Points whose class lost a segment
    dirty: HashSet<usize>,
    /// Points whose bundle must be re-derived on the next rebuild
    stale: HashSet<usize>,
    layout: Arc<WireLayout>,
    /// Whether `layout` reflects every edit
    fresh: bool,
    free_bundles: BTreeSet<usize>,
    free_threads: BTreeSet<usize>,
}

impl WireBundleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points known to the resolver.
    pub fn point_count(&self) -> usize {
        self.forest.len()
    }

    /// Register a new, unconnected point.
    pub fn add_point(&mut self) -> PointId {
        let idx = self.forest.push();
        self.members.insert(idx, vec![idx]);
        self.incident.push(Vec::new());
        self.ends.push(Vec::new());
        self.point_splitters.push(Vec::new());
        self.touch(idx);
        PointId(idx)
    }

    fn touch(&mut self, point: usize) {
        self.stale.insert(point);
        self.fresh = false;
    }

    fn check_point(&self, point: PointId) -> Result<()> {
        if point.0 < self.forest.len() {
            Ok(())
        } else {
            Err(GatesimError::point_not_found(point.to_string()))
        }
    }

    /// Attach an end of the given width at `point`.
    pub fn add_end(&mut self, point: PointId, width: u8) -> Result<()> {
        self.check_point(point)?;
        self.ends[point.0].push(width);
        self.touch(point.0);
        Ok(())
    }

    /// Register a splitter. Its ends are attached with their widths.
    pub fn add_splitter(&mut self, spec: SplitterSpec) -> Result<()> {
        self.check_point(spec.combined)?;
        for end in &spec.ends {
            self.check_point(end.point)?;
            if let Some(&lane) = end.lanes.iter().find(|&&l| l >= spec.width) {
                return Err(GatesimError::SplitterLane {
                    lane: lane as usize,
                    width: spec.width as usize,
                });
            }
        }
        let index = self.splitters.len();
        self.ends[spec.combined.0].push(spec.width);
        self.point_splitters[spec.combined.0].push(index);
        self.touch(spec.combined.0);
        for end in &spec.ends {
            self.ends[end.point.0].push(end.lanes.len() as u8);
            if !self.point_splitters[end.point.0].contains(&index) {
                self.point_splitters[end.point.0].push(index);
            }
            self.touch(end.point.0);
        }
        self.splitters.push(spec);
        Ok(())
    }

    /// Add a wire segment between two points.
    pub fn add_segment(&mut self, a: PointId, b: PointId) -> Result<SegmentId> {
        self.check_point(a)?;
        self.check_point(b)?;
        let id = SegmentId(self.segments.len());
        self.segments.push(Some([a, b]));
        self.incident[a.0].push(id);
        if a != b {
            self.incident[b.0].push(id);
        }
        self.join(a.0, b.0);
        self.touch(a.0);
        self.touch(b.0);
        Ok(id)
    }

    /// Remove a wire segment. Its endpoints' classes are recomputed lazily.
    pub fn remove_segment(&mut self, id: SegmentId) -> Result<()> {
        let [a, b] = self
            .segments
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(GatesimError::SegmentNotFound { segment: id.0 })?;
        self.incident[a.0].retain(|&s| s != id);
        self.incident[b.0].retain(|&s| s != id);
        self.invalidate(a);
        self.invalidate(b);
        Ok(())
    }

    /// Mark the class containing `point` for recomputation.
    pub fn invalidate(&mut self, point: PointId) {
        if point.0 < self.forest.len() {
            self.dirty.insert(point.0);
            self.fresh = false;
        }
    }

    /// Whether a rebuild is pending.
    pub fn is_dirty(&self) -> bool {
        !self.fresh
    }

    /// Live segments, with their ids.
    pub fn segments(&self) -> impl Iterator<Item = (SegmentId, [PointId; 2])> + '_ {
        self.segments
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.map(|pts| (SegmentId(i), pts)))
    }

    /// Widths attached at `point`.
    pub fn ends_at(&self, point: PointId) -> &[u8] {
        &self.ends[point.0]
    }

    pub fn splitters(&self) -> &[SplitterSpec] {
        &self.splitters
    }

    fn join(&mut self, a: usize, b: usize) {
        let ra = self.forest.find(a);
        let rb = self.forest.find(b);
        if let Some(root) = self.forest.unite(ra, rb) {
            let absorbed = if root == ra { rb } else { ra };
            let moved = self.members.remove(&absorbed).unwrap_or_default();
            self.members.entry(root).or_default().extend(moved);
        }
    }

    /// Root of the bundle class containing `point`, rebuilding first if needed.
    pub fn find(&mut self, point: PointId) -> usize {
        self.reunite_dirty();
        self.forest.find(point.0)
    }

    /// Whether two points are electrically connected by wires.
    pub fn same_bundle(&mut self, a: PointId, b: PointId) -> bool {
        self.find(a) == self.find(b)
    }

    /// Dissolve every class touched by a dirty point and re-unite it from
    /// its remaining segments.
    fn reunite_dirty(&mut self) {
        if self.dirty.is_empty() {
            return;
        }
        let mut roots = HashSet::new();
        let mut affected = Vec::new();
        for point in std::mem::take(&mut self.dirty) {
            let root = self.forest.find(point);
            if roots.insert(root) {
                affected.extend(self.members.remove(&root).unwrap_or_default());
            }
        }
        for &p in &affected {
            self.forest.reset(p);
            self.members.insert(p, vec![p]);
        }
        for &p in &affected {
            for i in 0..self.incident[p].len() {
                let seg = self.incident[p][i];
                if let Some([a, b]) = self.segments[seg.0] {
                    self.join(a.0, b.0);
                }
            }
        }
        debug!(points = affected.len(), "re-united dirty wire classes");
        self.stale.extend(affected);
    }

    /// Bring the layout up to date and return it.
    pub fn rebuild(&mut self) -> Arc<WireLayout> {
        if !self.fresh {
            self.reunite_dirty();
            let (bundles, threads) = self.update_layout();
            debug!(
                bundles,
                threads,
                bundle_slots = self.layout.bundle_count(),
                thread_slots = self.layout.thread_count(),
                "rebuilt wire layout"
            );
            self.fresh = true;
        }
        Arc::clone(&self.layout)
    }

    /// Re-derive the bundles of stale points and the threads reachable from
    /// them. Returns how many bundles and threads were rebuilt.
    fn update_layout(&mut self) -> (usize, usize) {
        if self.stale.is_empty() {
            return (0, 0);
        }
        let mut queue: Vec<usize> = self.stale.drain().collect();
        let layout = Arc::make_mut(&mut self.layout);
        let known = layout.point_bundle.len();

        // Every point sharing a class or an old bundle with a stale point
        let mut region: BTreeSet<usize> = BTreeSet::new();
        let mut retired: BTreeSet<usize> = BTreeSet::new();
        while let Some(p) = queue.pop() {
            if !region.insert(p) {
                continue;
            }
            let root = self.forest.find(p);
            if let Some(members) = self.members.get(&root) {
                queue.extend(members.iter().copied().filter(|m| !region.contains(m)));
            }
            if p < known {
                let old = layout.point_bundle[p].0;
                if retired.insert(old) {
                    queue.extend(layout.bundles[old].points.iter().map(|q| q.0));
                }
            }
        }

        // Retire the old bundles, remembering which threads they carried
        let mut seeds: Vec<usize> = Vec::new();
        let mut retired_threads: BTreeSet<usize> = BTreeSet::new();
        for &b in &retired {
            for t in std::mem::take(&mut layout.bundles[b].threads) {
                if retired_threads.insert(t.0) {
                    seeds.extend(layout.threads[t.0].iter().map(|(mb, _)| mb.0));
                }
            }
            layout.bundles[b] = Bundle::empty();
            self.free_bundles.insert(b);
        }

        // New bundles for the classes covering the region
        layout.point_bundle.resize(self.forest.len(), BundleId(0));
        let mut root_bundle: HashMap<usize, usize> = HashMap::new();
        let mut widths: HashMap<usize, Vec<u8>> = HashMap::new();
        for &p in &region {
            let root = self.forest.find(p);
            let id = *root_bundle.entry(root).or_insert_with(|| {
                let id = self.free_bundles.pop_first().unwrap_or(layout.bundles.len());
                if id == layout.bundles.len() {
                    layout.bundles.push(Bundle::empty());
                }
                id
            });
            layout.point_bundle[p] = BundleId(id);
            layout.bundles[id].points.push(PointId(p));
            let seen = widths.entry(id).or_default();
            for &w in &self.ends[p] {
                if !seen.contains(&w) {
                    seen.push(w);
                }
            }
        }
        for (&id, seen) in &widths {
            layout.bundles[id].width = match seen.as_slice() {
                [] => BundleWidth::Unset,
                [w] => BundleWidth::Fixed(*w),
                many => {
                    let mut sorted = many.to_vec();
                    sorted.sort_unstable();
                    BundleWidth::Conflict(sorted)
                }
            };
        }
        let rebuilt_bundles = root_bundle.len();
        seeds.extend(root_bundle.values().copied());

        // Bundles whose threads may have changed: closed over splitters and
        // over the old threads they shared
        let mut group: BTreeSet<usize> = BTreeSet::new();
        let mut splitters: BTreeSet<usize> = BTreeSet::new();
        while let Some(b) = seeds.pop() {
            if !group.insert(b) {
                continue;
            }
            for t in std::mem::take(&mut layout.bundles[b].threads) {
                if retired_threads.insert(t.0) {
                    seeds.extend(layout.threads[t.0].iter().map(|(mb, _)| mb.0));
                }
            }
            for p in &layout.bundles[b].points {
                for &s in &self.point_splitters[p.0] {
                    if splitters.insert(s) {
                        let spec = &self.splitters[s];
                        seeds.push(layout.point_bundle[spec.combined.0].0);
                        seeds.extend(spec.ends.iter().map(|e| layout.point_bundle[e.point.0].0));
                    }
                }
            }
        }
        for &t in &retired_threads {
            layout.threads[t].clear();
            self.free_threads.insert(t);
        }

        // Lane slots for every fixed-width bundle in the group
        let mut base: HashMap<usize, usize> = HashMap::new();
        let mut total_lanes = 0usize;
        for &b in &group {
            if let BundleWidth::Fixed(w) = layout.bundles[b].width {
                base.insert(b, total_lanes);
                total_lanes += w as usize;
            }
        }

        let mut lanes = DisjointSet::new(total_lanes);
        for &s in &splitters {
            let spec = &self.splitters[s];
            let cb = layout.point_bundle[spec.combined.0].0;
            let (Some(&cbase), BundleWidth::Fixed(cw)) = (base.get(&cb), &layout.bundles[cb].width) else {
                continue;
            };
            for end in &spec.ends {
                let eb = layout.point_bundle[end.point.0].0;
                let (Some(&ebase), BundleWidth::Fixed(ew)) = (base.get(&eb), &layout.bundles[eb].width)
                else {
                    continue;
                };
                for (k, &cl) in end.lanes.iter().enumerate() {
                    if cl < *cw && k < *ew as usize {
                        lanes.unite(cbase + cl as usize, ebase + k);
                    }
                }
            }
        }

        let mut root_thread: HashMap<usize, usize> = HashMap::new();
        for &b in &group {
            let (Some(&b0), BundleWidth::Fixed(w)) = (base.get(&b), layout.bundles[b].width.clone()) else {
                continue;
            };
            for lane in 0..w {
                let root = lanes.find(b0 + lane as usize);
                let tid = *root_thread.entry(root).or_insert_with(|| {
                    let id = self.free_threads.pop_first().unwrap_or(layout.threads.len());
                    if id == layout.threads.len() {
                        layout.threads.push(Vec::new());
                    }
                    id
                });
                layout.threads[tid].push((BundleId(b), lane));
                layout.bundles[b].threads.push(ThreadId(tid));
            }
        }

        (rebuilt_bundles, root_thread.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn points(resolver: &mut WireBundleResolver, n: usize) -> Vec<PointId> {
        (0..n).map(|_| resolver.add_point()).collect()
    }

    #[test]
    fn test_segments_form_bundles() {
        let mut r = WireBundleResolver::new();
        let p = points(&mut r, 5);
        r.add_segment(p[0], p[1]).unwrap();
        r.add_segment(p[1], p[2]).unwrap();
        r.add_segment(p[3], p[4]).unwrap();
        let layout = r.rebuild();
        assert_eq!(layout.bundle_count(), 2);
        assert_eq!(layout.bundle_of(p[0]), layout.bundle_of(p[2]));
        assert_ne!(layout.bundle_of(p[0]), layout.bundle_of(p[3]));
    }

    #[test]
    fn test_remove_splits_bundle() {
        let mut r = WireBundleResolver::new();
        let p = points(&mut r, 3);
        r.add_segment(p[0], p[1]).unwrap();
        let s = r.add_segment(p[1], p[2]).unwrap();
        assert!(r.same_bundle(p[0], p[2]));
        r.remove_segment(s).unwrap();
        assert!(r.is_dirty());
        assert!(r.same_bundle(p[0], p[1]));
        assert!(!r.same_bundle(p[1], p[2]));
        assert!(r.remove_segment(s).is_err());
    }

    #[test]
    fn test_parallel_segment_keeps_connection() {
        let mut r = WireBundleResolver::new();
        let p = points(&mut r, 2);
        let s1 = r.add_segment(p[0], p[1]).unwrap();
        r.add_segment(p[0], p[1]).unwrap();
        r.remove_segment(s1).unwrap();
        assert!(r.same_bundle(p[0], p[1]));
    }

    #[test]
    fn test_bundle_width_and_conflict() {
        let mut r = WireBundleResolver::new();
        let p = points(&mut r, 4);
        r.add_segment(p[0], p[1]).unwrap();
        r.add_end(p[0], 4).unwrap();
        r.add_end(p[1], 4).unwrap();
        r.add_segment(p[2], p[3]).unwrap();
        r.add_end(p[2], 1).unwrap();
        r.add_end(p[3], 2).unwrap();
        let layout = r.rebuild();
        let ok = layout.bundle(layout.bundle_of(p[0]));
        assert_eq!(ok.width, BundleWidth::Fixed(4));
        assert_eq!(ok.threads.len(), 4);
        let bad = layout.bundle(layout.bundle_of(p[2]));
        assert_eq!(bad.width, BundleWidth::Conflict(vec![1, 2]));
        assert!(bad.threads.is_empty());
    }

    #[test]
    fn test_splitter_joins_threads() {
        let mut r = WireBundleResolver::new();
        let p = points(&mut r, 3);
        // 2-lane bus at p0 split into lane 0 -> p1, lane 1 -> p2
        r.add_splitter(SplitterSpec {
            combined: p[0],
            width: 2,
            ends: vec![
                SplitEnd {
                    point: p[1],
                    lanes: vec![0],
                },
                SplitEnd {
                    point: p[2],
                    lanes: vec![1],
                },
            ],
        })
        .unwrap();
        let layout = r.rebuild();
        assert_eq!(layout.bundle_count(), 3);
        assert_eq!(layout.thread_count(), 2);
        assert_eq!(layout.thread_at(p[0], 0), layout.thread_at(p[1], 0));
        assert_eq!(layout.thread_at(p[0], 1), layout.thread_at(p[2], 0));
        assert_ne!(layout.thread_at(p[1], 0), layout.thread_at(p[2], 0));
    }

    #[test]
    fn test_splitter_rejects_bad_lane() {
        let mut r = WireBundleResolver::new();
        let p = points(&mut r, 2);
        let err = r.add_splitter(SplitterSpec {
            combined: p[0],
            width: 2,
            ends: vec![SplitEnd {
                point: p[1],
                lanes: vec![2],
            }],
        });
        assert!(matches!(err, Err(GatesimError::SplitterLane { lane: 2, width: 2 })));
    }

    fn reachable(n: usize, edges: &[(usize, usize)], from: usize) -> Vec<bool> {
        let mut seen = vec![false; n];
        let mut stack = vec![from];
        while let Some(x) = stack.pop() {
            if std::mem::replace(&mut seen[x], true) {
                continue;
            }
            for &(a, b) in edges {
                if a == x && !seen[b] {
                    stack.push(b);
                }
                if b == x && !seen[a] {
                    stack.push(a);
                }
            }
        }
        seen
    }

    #[test]
    fn test_random_edits_match_reachability() {
        for seed in 0..8u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut r = WireBundleResolver::new();
            let n = 12;
            let p = points(&mut r, n);
            let mut live: Vec<(SegmentId, usize, usize)> = Vec::new();

            for _ in 0..60 {
                if live.is_empty() || rng.random_bool(0.6) {
                    let a = rng.random_range(0..n);
                    let b = rng.random_range(0..n);
                    let id = r.add_segment(p[a], p[b]).unwrap();
                    live.push((id, a, b));
                } else {
                    let idx = rng.random_range(0..live.len());
                    let (id, _, _) = live.swap_remove(idx);
                    r.remove_segment(id).unwrap();
                }

                let edges: Vec<(usize, usize)> = live.iter().map(|&(_, a, b)| (a, b)).collect();
                let layout = r.rebuild();
                for a in 0..n {
                    let reach = reachable(n, &edges, a);
                    assert!(layout.bundle(layout.bundle_of(p[a])).points.contains(&p[a]));
                    for b in 0..n {
                        assert_eq!(
                            r.same_bundle(p[a], p[b]),
                            reach[b],
                            "seed {seed}: points {a} and {b}"
                        );
                        assert_eq!(
                            layout.bundle_of(p[a]) == layout.bundle_of(p[b]),
                            reach[b],
                            "seed {seed}: layout for points {a} and {b}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_local_edit_keeps_unrelated_ids() {
        let mut r = WireBundleResolver::new();
        let p = points(&mut r, 9);
        r.add_segment(p[0], p[1]).unwrap();
        let middle = r.add_segment(p[2], p[3]).unwrap();
        r.add_segment(p[4], p[5]).unwrap();
        for &q in &p[..6] {
            r.add_end(q, 1).unwrap();
        }
        // 2-lane bus at p6: lane 0 -> p7, lane 1 -> p4
        r.add_splitter(SplitterSpec {
            combined: p[6],
            width: 2,
            ends: vec![
                SplitEnd {
                    point: p[7],
                    lanes: vec![0],
                },
                SplitEnd {
                    point: p[4],
                    lanes: vec![1],
                },
            ],
        })
        .unwrap();
        let before = r.rebuild();

        r.remove_segment(middle).unwrap();
        let after = r.rebuild();
        assert_ne!(after.bundle_of(p[2]), after.bundle_of(p[3]));
        assert_eq!(after.bundle(after.bundle_of(p[3])).width, BundleWidth::Fixed(1));
        for &q in &[p[0], p[4], p[6], p[7]] {
            assert_eq!(after.bundle_of(q), before.bundle_of(q));
        }
        assert_eq!(after.bundle(after.bundle_of(p[0])).points, vec![p[0], p[1]]);
        assert_eq!(after.thread_at(p[4], 0), before.thread_at(p[4], 0));
        assert_eq!(after.thread_at(p[6], 0), before.thread_at(p[6], 0));
        assert_eq!(after.thread_at(p[6], 1), before.thread_at(p[4], 0));
        assert_ne!(after.thread_at(p[2], 0), after.thread_at(p[3], 0));
        // The earlier snapshot is not modified
        assert_eq!(before.bundle_of(p[2]), before.bundle_of(p[3]));

        // Extending a split lane re-derives only that thread
        r.add_segment(p[7], p[8]).unwrap();
        r.add_end(p[8], 1).unwrap();
        let extended = r.rebuild();
        assert_eq!(extended.thread_at(p[8], 0), extended.thread_at(p[6], 0));
        assert_eq!(extended.thread_at(p[6], 1), extended.thread_at(p[4], 0));
        assert_eq!(extended.bundle_of(p[0]), before.bundle_of(p[0]));
        assert_eq!(extended.bundle_of(p[4]), before.bundle_of(p[4]));
        assert_eq!(extended.thread_at(p[0], 0), before.thread_at(p[0], 0));
    }

    /// Resolver built in one go from the given segments.
    fn from_scratch(n: usize, segments: &[(usize, usize)]) -> (WireBundleResolver, Vec<PointId>) {
        let mut r = WireBundleResolver::new();
        let p = points(&mut r, n + 1);
        for &q in &p[..n] {
            r.add_end(q, 1).unwrap();
        }
        r.add_splitter(bus_splitter(&p, n)).unwrap();
        for &(a, b) in segments {
            r.add_segment(p[a], p[b]).unwrap();
        }
        (r, p)
    }

    /// 2-lane bus at the last point, lane 0 -> p0 and lane 1 -> p1.
    fn bus_splitter(p: &[PointId], n: usize) -> SplitterSpec {
        SplitterSpec {
            combined: p[n],
            width: 2,
            ends: vec![
                SplitEnd {
                    point: p[0],
                    lanes: vec![0],
                },
                SplitEnd {
                    point: p[1],
                    lanes: vec![1],
                },
            ],
        }
    }

    #[test]
    fn test_incremental_threads_match_full_build() {
        let n = 8;
        for seed in 0..8u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (mut r, p) = from_scratch(n, &[]);
            r.rebuild();
            let mut live: Vec<(SegmentId, usize, usize)> = Vec::new();

            for _ in 0..40 {
                if live.is_empty() || rng.random_bool(0.6) {
                    let a = rng.random_range(0..n);
                    let b = rng.random_range(0..n);
                    live.push((r.add_segment(p[a], p[b]).unwrap(), a, b));
                } else {
                    let idx = rng.random_range(0..live.len());
                    let (id, _, _) = live.swap_remove(idx);
                    r.remove_segment(id).unwrap();
                }

                let incremental = r.rebuild();
                let edges: Vec<(usize, usize)> = live.iter().map(|&(_, a, b)| (a, b)).collect();
                let (mut fresh, q) = from_scratch(n, &edges);
                let full = fresh.rebuild();
                let lanes: Vec<(usize, u8)> = (0..n).map(|i| (i, 0)).chain([(n, 0), (n, 1)]).collect();
                for &(a, la) in &lanes {
                    for &(b, lb) in &lanes {
                        assert_eq!(
                            incremental.thread_at(p[a], la) == incremental.thread_at(p[b], lb),
                            full.thread_at(q[a], la) == full.thread_at(q[b], lb),
                            "seed {seed}: lanes {a}.{la} and {b}.{lb}"
                        );
                    }
                }
            }
        }
    }
}
