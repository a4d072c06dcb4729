//! Viewport state and query lifecycle
//!
//! Maintains the scale/translate pair the render adapter consumes as its transform
//! uniform, computes the data-space exclusion radius implied by the current zoom and
//! point size, and issues epoch tickets so that a selection computed against an
//! outdated viewport is detected and discarded instead of rendered.

use crate::store::PointStore;
use std::sync::atomic::{AtomicU64, Ordering};

/// Smallest span the autorange denominators may take; spans below this are
/// treated as degenerate (all points coincident or collinear on one axis).
pub const MIN_SPAN: f64 = 1e-12;

/// Lower bound for axis scale components
pub const MIN_SCALE: f64 = 1e-10;

/// Scale/translate pair mapping data space into the normalized render area.
///
/// A point `(x, y)` lands at `((x + translate) * scale)` per axis; after
/// [`Viewport::autorange`] the dataset's bounding box fills the unit square and
/// the render adapter applies only its own device transform on top.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Per-axis zoom factors
    pub scale: [f64; 2],
    /// Data-space offset applied before scaling
    pub translate: [f64; 2],
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            scale: [1.0, 1.0],
            translate: [0.0, 0.0],
        }
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Viewport {
    /// New viewport with scale components clamped to [`MIN_SCALE`]
    pub fn new(scale: [f64; 2], translate: [f64; 2]) -> Self {
        Self {
            scale: [scale[0].max(MIN_SCALE), scale[1].max(MIN_SCALE)],
            translate,
        }
    }

    /// Scalar scale/translate broadcast to both axes
    pub fn uniform(scale: f64, translate: f64) -> Self {
        Self::new([scale, scale], [translate, translate])
    }

    /// Compute the transform that fits the store's bounding box into the unit
    /// square: per-axis scale `1/span`, translate `-min`.
    ///
    /// Degenerate spans (coincident or collinear points) are clamped to
    /// [`MIN_SPAN`] and logged, never fatal. An empty store keeps the identity
    /// transform.
    pub fn autorange(store: &PointStore) -> Self {
        let Some(bounds) = store.bounds() else {
            tracing::warn!("autorange on an empty dataset, keeping the identity transform");
            return Self::default();
        };

        let width = bounds.width();
        let height = bounds.height();
        if width < MIN_SPAN || height < MIN_SPAN {
            tracing::warn!(width, height, "degenerate bounds, clamping autorange scale");
        }

        Self::new(
            [1.0 / width.max(MIN_SPAN), 1.0 / height.max(MIN_SPAN)],
            [-bounds.min().x, -bounds.min().y],
        )
    }

    /// Convert an on-screen point size into the data-space exclusion radius.
    ///
    /// `size_px` is the nominal point size in device-independent pixels,
    /// `surface` the physical pixel dimensions of the render surface, and
    /// `pixel_ratio` the explicit device pixel ratio. The footprint is divided
    /// by the larger surface dimension and the x-axis scale, converting the
    /// visual size back into data units.
    #[inline]
    pub fn exclusion_radius(&self, size_px: f64, surface: (f64, f64), pixel_ratio: f64) -> f64 {
        let max_dim = surface.0.max(surface.1).max(1.0);
        (size_px * pixel_ratio) / max_dim / self.scale[0]
    }

    /// Map a data-space position through the transform
    #[inline]
    pub fn map(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x + self.translate[0]) * self.scale[0],
            (y + self.translate[1]) * self.scale[1],
        )
    }
}

/// Monotonic revision counter over dataset, viewport, size, and surface changes.
#[derive(Debug, Default)]
pub(crate) struct QueryEpoch(AtomicU64);

impl QueryEpoch {
    pub(crate) fn bump(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn ticket(&self) -> QueryTicket {
        QueryTicket(self.0.load(Ordering::Relaxed))
    }

    pub(crate) fn is_current(&self, ticket: QueryTicket) -> bool {
        self.0.load(Ordering::Relaxed) == ticket.0
    }
}

/// Revision stamp captured when a selection query begins.
///
/// Applying a result whose ticket is stale fails with [`ApplyOutcome::Stale`]:
/// only the most recent viewport's selection may reach the render adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryTicket(pub(crate) u64);

/// Result of applying an asynchronously computed selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The selection is now the current one
    Applied,
    /// A newer viewport or dataset superseded the query; the result was discarded
    Stale,
}

impl ApplyOutcome {
    /// Whether the result was discarded as superseded
    #[inline]
    pub fn is_stale(self) -> bool {
        matches!(self, Self::Stale)
    }
}
