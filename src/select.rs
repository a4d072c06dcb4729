//! Greedy radius-suppression selection
//!
//! Walks the partition leaves in their fixed depth-first order and accepts a point
//! only if no previously accepted point lies within the required separation.
//! Accepted points are recorded in a uniform grid whose cell size equals the
//! maximum possible separation, so each acceptance test probes at most the 3x3
//! cell neighborhood around the candidate.

use crate::quadtree::{Node, Quadtree};
use crate::store::PointStore;
use geo::Coord;
use smallvec::SmallVec;
use std::collections::HashMap;

/// Separation requirement between two selected points.
pub(crate) enum Separation<'a> {
    /// Uniform exclusion radius: selected points keep at least this distance
    Uniform(f64),
    /// Per-id data-space radii: selected points keep at least the sum of theirs
    PerPoint(&'a [f64]),
}

impl Separation<'_> {
    /// Effective radius of one point. Half the exclusion radius in the uniform
    /// case, so the pairwise sum equals the configured minimum separation.
    #[inline]
    fn radius_of(&self, id: u32) -> f64 {
        match self {
            Self::Uniform(radius) => radius * 0.5,
            Self::PerPoint(radii) => sanitize(radii.get(id as usize).copied().unwrap_or(0.0)),
        }
    }

    /// Largest effective radius over the store's finite points.
    fn max_radius(&self, store: &PointStore) -> f64 {
        match self {
            Self::Uniform(radius) => radius * 0.5,
            Self::PerPoint(_) => store
                .finite_ids()
                .iter()
                .map(|&id| self.radius_of(id))
                .fold(0.0, f64::max),
        }
    }
}

/// Negative and non-finite radii count as zero footprint.
#[inline]
fn sanitize(radius: f64) -> f64 {
    if radius.is_finite() && radius > 0.0 {
        radius
    } else {
        0.0
    }
}

/// Uniform grid over the accepted points.
///
/// Cell size is the maximum possible separation (twice the largest effective
/// radius), so every point that could conflict with a candidate lives in the
/// candidate's 3x3 cell neighborhood.
struct AcceptGrid {
    cell: f64,
    buckets: HashMap<(i64, i64), SmallVec<[u32; 4]>>,
}

impl AcceptGrid {
    fn new(cell: f64, capacity: usize) -> Self {
        Self {
            cell,
            buckets: HashMap::with_capacity(capacity),
        }
    }

    #[inline]
    fn key(&self, c: Coord<f64>) -> (i64, i64) {
        ((c.x / self.cell).floor() as i64, (c.y / self.cell).floor() as i64)
    }

    /// True when an accepted point sits strictly closer than the required
    /// separation. Exact-distance ties are not conflicts.
    fn conflicts(
        &self,
        store: &PointStore,
        separation: &Separation<'_>,
        c: Coord<f64>,
        radius: f64,
    ) -> bool {
        let (kx, ky) = self.key(c);
        for dx in -1..=1i64 {
            for dy in -1..=1i64 {
                let Some(bucket) = self.buckets.get(&(kx + dx, ky + dy)) else {
                    continue;
                };
                for &other in bucket {
                    let o = store.coord(other);
                    let min_sep = radius + separation.radius_of(other);
                    let (ox, oy) = (o.x - c.x, o.y - c.y);
                    if ox * ox + oy * oy < min_sep * min_sep {
                        return true;
                    }
                }
            }
        }
        false
    }

    #[inline]
    fn insert(&mut self, id: u32, c: Coord<f64>) {
        let key = self.key(c);
        self.buckets.entry(key).or_default().push(id);
    }
}

/// Run the greedy suppression pass.
///
/// Pure function of (tree, separation, previous): repeated calls with identical
/// inputs on an unmutated tree return identical sequences. A degenerate
/// separation (zero, negative, or NaN everywhere) degrades to accept-all rather
/// than failing, so a best-effort scatter always reaches the renderer.
pub(crate) fn run(
    tree: &Quadtree,
    separation: Separation<'_>,
    previous: Option<&[u32]>,
) -> Vec<u32> {
    #[cfg(feature = "profiling")]
    profiling::scope!("select::run");

    let store: &PointStore = tree.store();
    if store.is_empty() {
        return Vec::new();
    }

    // Zero, negative, and NaN separations cannot suppress anything: accept all.
    // An infinite separation flows through the normal path and keeps a single
    // point, like any radius beyond the dataset diagonal.
    let cell = 2.0 * separation.max_radius(store);
    if !(cell > 0.0) {
        let mut all = Vec::with_capacity(store.point_count());
        tree.for_each_point(&mut |id| all.push(id));
        return all;
    }

    let mut ctx = SelectCtx {
        store,
        separation: &separation,
        // The subtree short-circuit needs the actual pairwise minimum, which
        // only exists in the uniform case.
        uniform_sep: match &separation {
            Separation::Uniform(radius) => Some(*radius),
            Separation::PerPoint(_) => None,
        },
        grid: AcceptGrid::new(cell, store.point_count() / 4 + 1),
        accepted: Vec::new(),
        seen: previous.map(|_| vec![false; store.raw_count()]),
    };

    // Previously visible points get first claim on their spot, damping popping
    // between consecutive radius changes.
    if let Some(previous) = previous {
        for &id in previous {
            if store.coordinates_of(id).is_none() {
                continue;
            }
            if let Some(seen) = ctx.seen.as_mut() {
                if std::mem::replace(&mut seen[id as usize], true) {
                    continue;
                }
            }
            ctx.try_accept(id);
        }
    }

    walk(tree.root(), &mut ctx);

    tracing::debug!(
        total = store.point_count(),
        selected = ctx.accepted.len(),
        "declutter selection complete"
    );

    ctx.accepted
}

/// Mutable state threaded through the suppression walk.
struct SelectCtx<'a> {
    store: &'a PointStore,
    separation: &'a Separation<'a>,
    /// Pairwise minimum separation when it is the same for every pair
    uniform_sep: Option<f64>,
    grid: AcceptGrid,
    accepted: Vec<u32>,
    /// Ids already handled by the previous-selection seeding pass
    seen: Option<Vec<bool>>,
}

impl SelectCtx<'_> {
    /// Greedy acceptance test for one candidate. Returns true when accepted.
    fn try_accept(&mut self, id: u32) -> bool {
        let c = self.store.coord(id);
        let radius = self.separation.radius_of(id);
        if self.grid.conflicts(self.store, self.separation, c, radius) {
            return false;
        }
        self.accepted.push(id);
        self.grid.insert(id, c);
        true
    }

    #[inline]
    fn already_seen(&self, id: u32) -> bool {
        match &self.seen {
            Some(seen) => seen[id as usize],
            None => false,
        }
    }
}

/// Depth-first suppression walk in the fixed traversal order.
///
/// When the whole subtree fits strictly inside the minimum separation, any two
/// of its points conflict with each other, so at most one can survive: accept
/// the first viable candidate and skip the rest of the subtree. This is what
/// makes zoomed-out queries (radius much larger than leaf cells) cheap.
fn walk(node: &Node, ctx: &mut SelectCtx<'_>) {
    if let Some(min_sep) = ctx.uniform_sep {
        if node.diagonal() < min_sep {
            accept_first(node, ctx);
            return;
        }
    }

    match node.children() {
        Some(children) => {
            for child in children {
                walk(child, ctx);
            }
        }
        None => {
            for &id in node.points() {
                if !ctx.already_seen(id) {
                    ctx.try_accept(id);
                }
            }
        }
    }
}

/// Accept the first viable point of the subtree in traversal order, then stop.
fn accept_first(node: &Node, ctx: &mut SelectCtx<'_>) -> bool {
    match node.children() {
        Some(children) => children.iter().any(|child| accept_first(child, ctx)),
        None => node
            .points()
            .iter()
            .any(|&id| !ctx.already_seen(id) && ctx.try_accept(id)),
    }
}
