//! Point storage module
//!
//! This module provides the `PointStore` struct for holding raw coordinate pairs
//! with precomputed metadata like the bounding box and the set of indexable ids.

use crate::{DeclutterError, Result};
use geo::{Coord, Rect};
use std::sync::Arc;

/// Immutable storage for a scatter dataset.
///
/// Built once from a flat `[x0, y0, x1, y1, ..]` slice and never mutated afterwards;
/// replacing the dataset means building a new store so that in-flight queries against
/// the old one stay valid. A point's id is the index of its pair in the original input,
/// so the render adapter can map selected ids straight back into its own copy of the
/// raw buffer. Non-finite pairs keep their id reserved but are excluded from indexing.
#[derive(Clone, Debug)]
pub struct PointStore {
    /// All input pairs in original order, including non-finite ones
    coords: Vec<Coord<f64>>,
    /// Ids of finite pairs, ascending
    finite_ids: Vec<u32>,
    /// Precomputed bounding box of the finite points (None when there are none)
    bounds: Option<Rect<f64>>,
    /// Number of non-finite pairs dropped from the index
    dropped: usize,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl PointStore {
    /// Build a store from a flat interleaved coordinate slice.
    ///
    /// Fails when the slice length is odd. Non-finite pairs are dropped from the
    /// index (counted, not fatal). Metadata is computed in a single pass.
    pub fn build(raw: &[f64]) -> Result<Arc<Self>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("store::build");

        if raw.len() % 2 != 0 {
            return Err(DeclutterError::InvalidInput {
                reason: format!("flat coordinate slice has odd length {}", raw.len()),
            });
        }
        if raw.len() / 2 > u32::MAX as usize {
            return Err(DeclutterError::InvalidInput {
                reason: format!("{} pairs exceed the u32 id space", raw.len() / 2),
            });
        }

        let mut coords = Vec::with_capacity(raw.len() / 2);
        let mut finite_ids = Vec::with_capacity(raw.len() / 2);
        let mut dropped = 0usize;

        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;

        for (id, pair) in raw.chunks_exact(2).enumerate() {
            let (x, y) = (pair[0], pair[1]);
            coords.push(Coord { x, y });

            if !x.is_finite() || !y.is_finite() {
                dropped += 1;
                continue;
            }

            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
            finite_ids.push(id as u32);
        }

        if dropped > 0 {
            tracing::warn!(dropped, "dropped non-finite coordinate pairs from the index");
        }

        let bounds = (!finite_ids.is_empty())
            .then(|| Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y }));

        Ok(Arc::new(Self {
            coords,
            finite_ids,
            bounds,
            dropped,
        }))
    }

    /// Number of finite points the index sees
    #[inline]
    pub fn point_count(&self) -> usize {
        self.finite_ids.len()
    }

    /// Number of coordinate pairs in the original input, including dropped ones
    #[inline]
    pub fn raw_count(&self) -> usize {
        self.coords.len()
    }

    /// Number of non-finite pairs dropped during the build
    #[inline]
    pub fn dropped_count(&self) -> usize {
        self.dropped
    }

    /// Coordinates of a point by id. `None` for out-of-range or non-finite ids.
    #[inline]
    pub fn coordinates_of(&self, id: u32) -> Option<(f64, f64)> {
        let c = self.coords.get(id as usize)?;
        (c.x.is_finite() && c.y.is_finite()).then_some((c.x, c.y))
    }

    /// Bounding box of the finite points, computed once at build time
    #[inline]
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.bounds
    }

    /// Ids of all finite points, ascending
    #[inline]
    pub fn finite_ids(&self) -> &[u32] {
        &self.finite_ids
    }

    /// Whether the store indexes no points at all
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.finite_ids.is_empty()
    }

    /// Raw coordinate access for ids known to be finite (internal hot path)
    #[inline]
    pub(crate) fn coord(&self, id: u32) -> Coord<f64> {
        self.coords[id as usize]
    }

    /// Length of the bounding-box diagonal (0.0 for empty or single-point stores)
    pub fn diagonal(&self) -> f64 {
        match self.bounds {
            Some(b) => (b.width() * b.width() + b.height() * b.height()).sqrt(),
            None => 0.0,
        }
    }
}
