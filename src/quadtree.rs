//! Quadtree spatial partition for the declutter index
//!
//! This module provides the adaptive quadtree built once per dataset and queried
//! repeatedly with a changing exclusion radius. The tree stores point ids in its
//! leaves; selection walks the leaves in a fixed depth-first order so that results
//! are reproducible for any (dataset, radius) pair.

use crate::select::{self, Separation};
use crate::store::PointStore;
use dashmap::DashMap;
use geo::{Coord, Rect};
use smallvec::SmallVec;
use std::sync::Arc;

/// Uniform-radius selections cached per radius bit pattern; interactive zoom
/// produces a fresh radius almost every frame, so the cache stays bounded.
const SELECTION_CACHE_LIMIT: usize = 64;

/// Spatial partition over a [`PointStore`] with radius-suppression queries.
///
/// The tree is immutable once built. Queries are read-only and may run from any
/// thread; repeated uniform-radius queries hit a shared selection cache.
#[derive(Debug)]
pub struct Quadtree {
    /// The coordinate storage this tree indexes
    store: Arc<PointStore>,
    root: Node,
    leaf_capacity: usize,
    /// Deepest level observed during the build
    depth: u32,
    /// Cache of uniform-radius selections, keyed by the radius bit pattern
    selection_cache: DashMap<u64, Arc<Vec<u32>>>,
}

/// A single node in the partition
#[derive(Debug)]
pub(crate) struct Node {
    /// Region covered by this node
    bounding_box: Rect<f64>,
    /// Leaf point ids, ascending; empty for subdivided nodes
    points: SmallVec<[u32; 16]>,
    /// Child nodes (NW, NE, SW, SE) if subdivided
    children: Option<Box<[Node; 4]>>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Quadtree {
    /// Build a partition over the store's finite points.
    ///
    /// Single bulk pass: regions split at their midpoint until a node holds at
    /// most `leaf_capacity` points, `max_depth` is reached, or the cell is too
    /// small for the midpoint to separate anything. O(n log n) for n points.
    pub fn build(store: &Arc<PointStore>, leaf_capacity: usize, max_depth: u32) -> Self {
        #[cfg(feature = "profiling")]
        profiling::scope!("quadtree::build");

        let leaf_capacity = leaf_capacity.max(1);
        let bounding_box = store
            .bounds()
            .unwrap_or_else(|| Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 0.0, y: 0.0 }));

        let ids = store.finite_ids().to_vec();
        let mut depth = 0;
        let root = Node::build(
            bounding_box,
            0,
            ids,
            store,
            leaf_capacity,
            max_depth,
            &mut depth,
        );

        tracing::debug!(
            points = store.point_count(),
            depth,
            "built declutter quadtree"
        );

        Self {
            store: store.clone(),
            root,
            leaf_capacity,
            depth,
            selection_cache: DashMap::new(),
        }
    }

    /// Select the maximal visible subset at a uniform exclusion radius.
    ///
    /// No two returned points are closer than `radius`; exact-distance ties are
    /// kept. A non-positive or NaN radius disables suppression and returns every
    /// finite id in traversal order. Results are cached per radius, so
    /// re-rendering at an unchanged zoom level costs a map lookup.
    ///
    /// Selections at different radii are independent: acceptance depends only on
    /// traversal order and the radius threshold, so a smaller radius need not
    /// yield a superset of a larger one. This keeps the query stateless and
    /// reproducible; use [`Quadtree::select_with_previous`] to bias consecutive
    /// zoom levels towards each other.
    pub fn select(&self, radius: f64) -> Arc<Vec<u32>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("quadtree::select");

        // All degenerate radii share the accept-all entry.
        let key = if radius > 0.0 {
            radius.to_bits()
        } else {
            0f64.to_bits()
        };
        if let Some(hit) = self.selection_cache.get(&key) {
            return hit.value().clone();
        }

        let result = Arc::new(select::run(self, Separation::Uniform(radius), None));
        if self.selection_cache.len() >= SELECTION_CACHE_LIMIT {
            self.selection_cache.clear();
        }
        self.selection_cache.insert(key, result.clone());
        result
    }

    /// Select with one data-space radius per id (original input order).
    ///
    /// The minimum separation between two selected points is the sum of their
    /// radii. Ids past the end of `radii`, and non-finite or negative entries,
    /// count as zero. Not cached: per-point radii have no cheap stable key.
    pub fn select_sized(&self, radii: &[f64]) -> Arc<Vec<u32>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("quadtree::select_sized");

        Arc::new(select::run(self, Separation::PerPoint(radii), None))
    }

    /// Select at a uniform radius, offering previously visible ids their spot
    /// first. Damps popping across consecutive zoom levels; the result is still
    /// deterministic for a given (dataset, radius, previous) triple. Not cached.
    pub fn select_with_previous(&self, radius: f64, previous: &[u32]) -> Arc<Vec<u32>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("quadtree::select_with_previous");

        Arc::new(select::run(
            self,
            Separation::Uniform(radius),
            Some(previous),
        ))
    }

    /// The store this partition indexes
    #[inline]
    pub fn store(&self) -> &Arc<PointStore> {
        &self.store
    }

    /// Deepest level reached during the build
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Leaf capacity the tree was built with
    #[inline]
    pub fn leaf_capacity(&self) -> usize {
        self.leaf_capacity
    }

    /// Total number of ids stored in leaves.
    ///
    /// Always equals the store's finite point count; exposed so callers can
    /// verify rebuild consistency.
    pub fn leaf_point_count(&self) -> usize {
        let mut count = 0;
        self.for_each_point(&mut |_| count += 1);
        count
    }

    /// Visit every leaf id in the fixed traversal order (depth-first, children
    /// NW, NE, SW, SE, ascending id within a leaf).
    pub(crate) fn for_each_point<F: FnMut(u32)>(&self, f: &mut F) {
        self.root.visit(f);
    }

    /// Root node, for the selection walk
    #[inline]
    pub(crate) fn root(&self) -> &Node {
        &self.root
    }
}

impl Node {
    fn build(
        bounding_box: Rect<f64>,
        level: u32,
        ids: Vec<u32>,
        store: &PointStore,
        leaf_capacity: usize,
        max_depth: u32,
        depth_seen: &mut u32,
    ) -> Self {
        *depth_seen = (*depth_seen).max(level);

        let min = bounding_box.min();
        let max = bounding_box.max();
        let mid_x = (min.x + max.x) / 2.0;
        let mid_y = (min.y + max.y) / 2.0;

        // Stop when the midpoint can no longer separate points on either axis,
        // which also terminates recursion on coincident clusters.
        let splittable =
            (mid_x > min.x && mid_x < max.x) || (mid_y > min.y && mid_y < max.y);

        if ids.len() <= leaf_capacity || level >= max_depth || !splittable {
            return Self {
                bounding_box,
                points: SmallVec::from_vec(ids),
                children: None,
            };
        }

        // Partition preserving input order so leaf ids stay ascending. Points
        // exactly on a midpoint go to the east/north child.
        let mut quads: [Vec<u32>; 4] = [Vec::new(), Vec::new(), Vec::new(), Vec::new()];
        for id in ids {
            let c = store.coord(id);
            let is_east = c.x >= mid_x;
            let is_north = c.y >= mid_y;
            let slot = match (is_east, is_north) {
                (false, true) => 0,  // NW
                (true, true) => 1,   // NE
                (false, false) => 2, // SW
                (true, false) => 3,  // SE
            };
            quads[slot].push(id);
        }
        let [nw_ids, ne_ids, sw_ids, se_ids] = quads;

        let child_level = level + 1;
        let children = Box::new([
            Self::build(
                Rect::new(Coord { x: min.x, y: mid_y }, Coord { x: mid_x, y: max.y }),
                child_level,
                nw_ids,
                store,
                leaf_capacity,
                max_depth,
                depth_seen,
            ),
            Self::build(
                Rect::new(Coord { x: mid_x, y: mid_y }, Coord { x: max.x, y: max.y }),
                child_level,
                ne_ids,
                store,
                leaf_capacity,
                max_depth,
                depth_seen,
            ),
            Self::build(
                Rect::new(Coord { x: min.x, y: min.y }, Coord { x: mid_x, y: mid_y }),
                child_level,
                sw_ids,
                store,
                leaf_capacity,
                max_depth,
                depth_seen,
            ),
            Self::build(
                Rect::new(Coord { x: mid_x, y: min.y }, Coord { x: max.x, y: mid_y }),
                child_level,
                se_ids,
                store,
                leaf_capacity,
                max_depth,
                depth_seen,
            ),
        ]);

        Self {
            bounding_box,
            points: SmallVec::new(),
            children: Some(children),
        }
    }

    fn visit<F: FnMut(u32)>(&self, f: &mut F) {
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.visit(f);
            }
        } else {
            for &id in &self.points {
                f(id);
            }
        }
    }

    /// Child nodes, if subdivided
    #[inline]
    pub(crate) fn children(&self) -> Option<&[Node; 4]> {
        self.children.as_deref()
    }

    /// Leaf point ids (empty for subdivided nodes)
    #[inline]
    pub(crate) fn points(&self) -> &[u32] {
        &self.points
    }

    /// Length of this node's region diagonal: an upper bound on the distance
    /// between any two points in the subtree.
    #[inline]
    pub(crate) fn diagonal(&self) -> f64 {
        let w = self.bounding_box.width();
        let h = self.bounding_box.height();
        (w * w + h * h).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn build_tree(raw: &[f64]) -> Quadtree {
        let store = PointStore::build(raw).unwrap();
        Quadtree::build(&store, 32, 20)
    }

    fn diagonal_points(n: usize) -> Vec<f64> {
        let mut raw = Vec::with_capacity(n * 2);
        for i in 0..n {
            raw.push(i as f64);
            raw.push(i as f64);
        }
        raw
    }

    fn uniform_points(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = SmallRng::seed_from_u64(seed);
        (0..n * 2).map(|_| rng.random::<f64>()).collect()
    }

    fn assert_separation(store: &PointStore, ids: &[u32], min_sep: f64) {
        for (i, &a) in ids.iter().enumerate() {
            let (ax, ay) = store.coordinates_of(a).unwrap();
            for &b in &ids[i + 1..] {
                let (bx, by) = store.coordinates_of(b).unwrap();
                let dist = ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt();
                assert!(
                    dist >= min_sep - 1e-12,
                    "points {a} and {b} are {dist} apart, expected >= {min_sep}"
                );
            }
        }
    }

    #[test]
    fn test_build_preserves_point_count() {
        let tree = build_tree(&uniform_points(5_000, 1));
        assert_eq!(tree.leaf_point_count(), 5_000);
        assert!(tree.depth() > 0);
    }

    #[test]
    fn test_build_empty_store() {
        let tree = build_tree(&[]);
        assert_eq!(tree.leaf_point_count(), 0);
        assert!(tree.select(0.5).is_empty());
    }

    #[test]
    fn test_build_coincident_points_terminates() {
        // 1000 identical points can never be separated by a midpoint split.
        let raw: Vec<f64> = std::iter::repeat([2.5, 2.5]).take(1_000).flatten().collect();
        let tree = build_tree(&raw);
        assert_eq!(tree.leaf_point_count(), 1_000);
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn test_radius_zero_returns_all_ids() {
        let tree = build_tree(&diagonal_points(8));
        let ids = tree.select(0.0);
        assert_eq!(ids.as_slice(), &[0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_negative_and_nan_radius_accept_all() {
        let tree = build_tree(&diagonal_points(8));
        assert_eq!(tree.select(-1.0).len(), 8);
        assert_eq!(tree.select(f64::NAN).len(), 8);
    }

    #[test]
    fn test_select_is_idempotent() {
        let tree = build_tree(&uniform_points(2_000, 2));
        let first = tree.select(0.03);
        let second = tree.select(0.03);
        assert_eq!(first.as_slice(), second.as_slice());
    }

    #[test]
    fn test_radius_larger_than_diagonal_keeps_one_point() {
        let raw = uniform_points(500, 3);
        let store = PointStore::build(&raw).unwrap();
        let tree = Quadtree::build(&store, 32, 20);
        let ids = tree.select(store.diagonal() * 2.0);
        assert_eq!(ids.len(), 1);

        // An infinite radius behaves the same way.
        assert_eq!(tree.select(f64::INFINITY).len(), 1);
    }

    #[test]
    fn test_diagonal_scenario() {
        // 8 points on the diagonal from (0,0) to (7,7)
        let raw = diagonal_points(8);
        let store = PointStore::build(&raw).unwrap();
        let tree = Quadtree::build(&store, 32, 20);

        assert_eq!(tree.select(0.0).len(), 8);

        // Adjacent diagonal points are sqrt(2) apart, so radius 3 keeps at most
        // every third point.
        let ids = tree.select(3.0);
        assert!(ids.len() <= 4, "got {} ids", ids.len());
        assert!(!ids.is_empty());
        assert_separation(&store, &ids, 3.0);
    }

    #[test]
    fn test_separation_invariant_random() {
        let raw = uniform_points(2_000, 4);
        let store = PointStore::build(&raw).unwrap();
        let tree = Quadtree::build(&store, 32, 20);

        let ids = tree.select(0.05);
        assert!(!ids.is_empty());
        assert!(ids.len() < 2_000);
        assert_separation(&store, &ids, 0.05);
    }

    #[test]
    fn test_exact_distance_tie_is_kept() {
        // Two points at distance exactly 1.0 with radius 1.0: ties favor inclusion.
        let tree = build_tree(&[0.0, 0.0, 1.0, 0.0]);
        let ids = tree.select(1.0);
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_select_sized_sum_of_radii() {
        // Three collinear points 1.0 apart with radii 0.6: adjacent pairs need
        // 1.2 separation (suppressed), the outer pair needs 1.2 over distance
        // 2.0 (kept).
        let raw = [0.0, 0.0, 1.0, 0.0, 2.0, 0.0];
        let store = PointStore::build(&raw).unwrap();
        let tree = Quadtree::build(&store, 32, 20);

        let ids = tree.select_sized(&[0.6, 0.6, 0.6]);
        assert_eq!(ids.as_slice(), &[0, 2]);
    }

    #[test]
    fn test_select_sized_zero_radii_accept_all() {
        let tree = build_tree(&diagonal_points(5));
        let ids = tree.select_sized(&[0.0; 5]);
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn test_select_sized_separation_invariant() {
        let raw = uniform_points(1_000, 5);
        let store = PointStore::build(&raw).unwrap();
        let tree = Quadtree::build(&store, 32, 20);

        let mut rng = SmallRng::seed_from_u64(6);
        let radii: Vec<f64> = (0..1_000).map(|_| rng.random::<f64>() * 0.05).collect();
        let ids = tree.select_sized(&radii);

        for (i, &a) in ids.iter().enumerate() {
            let (ax, ay) = store.coordinates_of(a).unwrap();
            for &b in &ids[i + 1..] {
                let (bx, by) = store.coordinates_of(b).unwrap();
                let dist = ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt();
                let min_sep = radii[a as usize] + radii[b as usize];
                assert!(
                    dist >= min_sep - 1e-12,
                    "points {a} and {b} are {dist} apart, expected >= {min_sep}"
                );
            }
        }
    }

    #[test]
    fn test_select_with_previous_keeps_survivors() {
        let raw = uniform_points(2_000, 7);
        let store = PointStore::build(&raw).unwrap();
        let tree = Quadtree::build(&store, 32, 20);

        let coarse = tree.select(0.1);
        let refined = tree.select_with_previous(0.05, &coarse);

        // Everything visible at the coarse radius stays visible after zooming
        // in: the previous selection already satisfies the smaller separation.
        for id in coarse.iter() {
            assert!(refined.contains(id), "id {id} popped out on zoom-in");
        }
        assert!(refined.len() >= coarse.len());
        assert_separation(&store, &refined, 0.05);
    }

    #[test]
    fn test_select_with_previous_is_deterministic() {
        let tree = build_tree(&uniform_points(1_000, 8));
        let previous = tree.select(0.2);
        let a = tree.select_with_previous(0.04, &previous);
        let b = tree.select_with_previous(0.04, &previous);
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_selection_cache_returns_shared_result() {
        let tree = build_tree(&uniform_points(500, 9));
        let first = tree.select(0.02);
        let second = tree.select(0.02);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_dropped_points_never_selected() {
        let raw = [0.0, 0.0, f64::NAN, f64::NAN, 5.0, 5.0];
        let store = PointStore::build(&raw).unwrap();
        let tree = Quadtree::build(&store, 32, 20);

        let ids = tree.select(0.0);
        assert_eq!(ids.as_slice(), &[0, 2]);
    }

    #[test]
    fn test_matches_naive_greedy() {
        let raw = uniform_points(3_000, 11);
        let store = PointStore::build(&raw).unwrap();
        let tree = Quadtree::build(&store, 16, 20);

        // Radius 0 yields the bare traversal order the greedy pass consumes.
        let order = tree.select(0.0);
        for radius in [0.01, 0.05, 0.2, 0.7] {
            let fast = tree.select(radius);

            let mut naive: Vec<u32> = Vec::new();
            for &id in order.iter() {
                let (x, y) = store.coordinates_of(id).unwrap();
                let ok = naive.iter().all(|&a| {
                    let (ax, ay) = store.coordinates_of(a).unwrap();
                    (ax - x).powi(2) + (ay - y).powi(2) >= radius * radius
                });
                if ok {
                    naive.push(id);
                }
            }

            assert_eq!(fast.as_slice(), naive.as_slice(), "radius {radius}");
        }
    }

    #[test]
    fn test_large_uniform_dataset() {
        // Smaller in-test version of the 10^6 scenario; the full size runs as a
        // criterion bench.
        let raw = uniform_points(20_000, 10);
        let store = PointStore::build(&raw).unwrap();
        let tree = Quadtree::build(&store, 32, 20);

        let ids = tree.select(0.02);
        assert!(!ids.is_empty());
        assert!(ids.len() < 20_000);
        assert_separation(&store, &ids, 0.02);
    }
}
