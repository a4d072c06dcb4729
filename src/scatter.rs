//! Scatter - top-level manager for the store, partition, viewport, and selection
//!
//! This module provides the high-level API for loading a dataset, adjusting the
//! viewport, and obtaining the decluttered subset the render adapter should draw.
//! The store and partition are held behind `Arc` snapshots: replacing the dataset
//! swaps the snapshots, so a selection still running against the old ones stays
//! valid until it completes and is discarded by its stale ticket.

use crate::quadtree::Quadtree;
use crate::store::PointStore;
use crate::viewport::{ApplyOutcome, QueryEpoch, QueryTicket, Viewport};
use crate::{DeclutterError, Result};
use std::sync::Arc;

/// Default nominal point size in device-independent pixels
pub const DEFAULT_POINT_SIZE: f64 = 10.0;

/// Configuration for a scatter session
///
/// Immutable once the session is created; per-interaction inputs (viewport,
/// point size, surface size) have their own setters on [`Scatter`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of points a partition leaf may hold before subdividing
    pub leaf_capacity: usize,
    /// Maximum partition depth
    pub max_depth: u32,
    /// Device pixel ratio, passed explicitly rather than read from ambient
    /// window state
    pub pixel_ratio: f64,
    /// When false, selection is bypassed and every finite point is visible
    pub declutter: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            leaf_capacity: 32,
            max_depth: 20,
            pixel_ratio: 1.0,
            declutter: true,
        }
    }
}

/// Nominal on-screen point size in device-independent pixels
#[derive(Debug, Clone)]
pub enum PointSize {
    /// One size for every point
    Uniform(f64),
    /// One size per id, in original input order
    PerPoint(Vec<f64>),
}

impl Default for PointSize {
    fn default() -> Self {
        Self::Uniform(DEFAULT_POINT_SIZE)
    }
}

/// Statistics about the current session
#[derive(Debug, Clone, Default)]
pub struct ScatterInfo {
    /// Finite points in the current dataset
    pub point_count: usize,
    /// Non-finite pairs dropped during the last build
    pub dropped_count: usize,
    /// Points in the currently applied selection
    pub selected_count: usize,
}

/// Top-level manager for one scatter dataset session.
///
/// State machine: unbuilt until the first successful [`Scatter::set_positions`],
/// then built and queryable; replacing the positions rebuilds the store and
/// partition wholesale, while viewport changes only invalidate the selection.
pub struct Scatter {
    config: Config,
    /// Current dataset snapshot (None while unbuilt)
    store: Option<Arc<PointStore>>,
    /// Partition over the current store
    quadtree: Option<Arc<Quadtree>>,
    viewport: Viewport,
    point_size: PointSize,
    /// Physical surface dimensions in pixels
    surface_size: (f64, f64),
    /// Revision counter backing stale-query detection
    epoch: QueryEpoch,
    /// Most recently applied selection
    selection: Option<Arc<Vec<u32>>>,
}

/// Everything one selection query needs, detached from the session so it can
/// run on a worker task while the session keeps mutating.
pub struct VisibleQuery {
    ticket: QueryTicket,
    quadtree: Arc<Quadtree>,
    radii: Radii,
}

/// Data-space separation input resolved from point size and viewport
#[derive(Debug, Clone)]
enum Radii {
    Uniform(f64),
    PerPoint(Vec<f64>),
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Scatter {
    /// Create a new unbuilt session with the given configuration
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: None,
            quadtree: None,
            viewport: Viewport::default(),
            point_size: PointSize::default(),
            surface_size: (1024.0, 768.0),
            epoch: QueryEpoch::default(),
            selection: None,
        }
    }

    /// Replace the dataset and rebuild the partition.
    ///
    /// On error the previous store and partition remain intact and queryable.
    pub fn set_positions(&mut self, raw: &[f64]) -> Result<()> {
        #[cfg(feature = "profiling")]
        profiling::scope!("scatter::set_positions");

        let store = PointStore::build(raw)?;
        let quadtree = Quadtree::build(&store, self.config.leaf_capacity, self.config.max_depth);

        self.store = Some(store);
        self.quadtree = Some(Arc::new(quadtree));
        self.selection = None;
        self.epoch.bump();
        Ok(())
    }

    /// Fit the viewport to the dataset's bounding box
    pub fn autorange(&mut self) -> Result<()> {
        let store = self.store.as_ref().ok_or(DeclutterError::Unbuilt)?;
        self.viewport = Viewport::autorange(store);
        self.invalidate();
        Ok(())
    }

    /// Replace the whole viewport (scale components are clamped)
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = Viewport::new(viewport.scale, viewport.translate);
        self.invalidate();
    }

    /// Update the per-axis zoom factors
    pub fn set_scale(&mut self, sx: f64, sy: f64) {
        self.viewport = Viewport::new([sx, sy], self.viewport.translate);
        self.invalidate();
    }

    /// Update the data-space offset
    pub fn set_translate(&mut self, tx: f64, ty: f64) {
        self.viewport = Viewport::new(self.viewport.scale, [tx, ty]);
        self.invalidate();
    }

    /// Update the nominal point size.
    ///
    /// A per-point sequence must cover the whole id space of the current
    /// dataset (original pair count, dropped pairs included).
    pub fn set_point_size(&mut self, size: PointSize) -> Result<()> {
        if let (PointSize::PerPoint(sizes), Some(store)) = (&size, &self.store) {
            if sizes.len() < store.raw_count() {
                return Err(DeclutterError::SizeMismatch {
                    expected: store.raw_count(),
                    got: sizes.len(),
                });
            }
        }
        self.point_size = size;
        self.invalidate();
        Ok(())
    }

    /// Update the physical surface dimensions in pixels
    pub fn set_surface_size(&mut self, width: f64, height: f64) {
        self.surface_size = (width, height);
        self.invalidate();
    }

    /// Compute the visible subset for the current state and apply it.
    ///
    /// Synchronous path: equivalent to [`Scatter::begin_visible`] followed by
    /// running the query inline and applying its result.
    pub fn visible(&mut self) -> Result<Arc<Vec<u32>>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("scatter::visible");

        let query = self.begin_visible()?;
        let ids = query.run();
        self.selection = Some(ids.clone());
        Ok(ids)
    }

    /// Snapshot the current state into a query that can run on a worker task.
    ///
    /// The returned query holds its own `Arc` of the partition: dataset
    /// replacement does not invalidate the memory it reads, only the ticket.
    pub fn begin_visible(&self) -> Result<VisibleQuery> {
        let quadtree = self.quadtree.clone().ok_or(DeclutterError::Unbuilt)?;
        let radii = if self.config.declutter {
            self.data_radii()?
        } else {
            // Zero separation: the engine degrades to accept-all.
            Radii::Uniform(0.0)
        };
        Ok(VisibleQuery {
            ticket: self.epoch.ticket(),
            quadtree,
            radii,
        })
    }

    /// Apply a selection computed from [`Scatter::begin_visible`].
    ///
    /// Returns [`ApplyOutcome::Stale`] and discards the result if the viewport,
    /// point size, surface, or dataset changed since the query began; the
    /// rendered subset is always the most recent query's (last-write-wins).
    pub fn apply_visible(&mut self, ticket: QueryTicket, ids: Arc<Vec<u32>>) -> ApplyOutcome {
        if !self.epoch.is_current(ticket) {
            tracing::debug!("discarding stale selection result");
            return ApplyOutcome::Stale;
        }
        self.selection = Some(ids);
        ApplyOutcome::Applied
    }

    /// Current exclusion radius in data-space units.
    ///
    /// For per-point sizes this reports the radius implied by the largest size.
    pub fn exclusion_radius(&self) -> f64 {
        let size = match &self.point_size {
            PointSize::Uniform(size) => *size,
            PointSize::PerPoint(sizes) => sizes.iter().copied().fold(0.0, f64::max),
        };
        self.viewport
            .exclusion_radius(size, self.surface_size, self.config.pixel_ratio)
    }

    /// Most recently applied selection, if any
    #[inline]
    pub fn selection(&self) -> Option<&Arc<Vec<u32>>> {
        self.selection.as_ref()
    }

    /// Current viewport
    #[inline]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Scale pair for the render adapter's transform uniform
    #[inline]
    pub fn scale(&self) -> [f64; 2] {
        self.viewport.scale
    }

    /// Translate pair for the render adapter's transform uniform
    #[inline]
    pub fn translate(&self) -> [f64; 2] {
        self.viewport.translate
    }

    /// Current dataset snapshot, if built
    #[inline]
    pub fn store(&self) -> Option<&Arc<PointStore>> {
        self.store.as_ref()
    }

    /// Current partition snapshot, if built
    #[inline]
    pub fn quadtree(&self) -> Option<&Arc<Quadtree>> {
        self.quadtree.as_ref()
    }

    /// Number of finite points in the current dataset (0 while unbuilt)
    #[inline]
    pub fn point_count(&self) -> usize {
        self.store.as_ref().map_or(0, |s| s.point_count())
    }

    /// Session configuration
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Session statistics
    pub fn info(&self) -> ScatterInfo {
        ScatterInfo {
            point_count: self.point_count(),
            dropped_count: self.store.as_ref().map_or(0, |s| s.dropped_count()),
            selected_count: self.selection.as_ref().map_or(0, |s| s.len()),
        }
    }

    /// Drop the dataset and return to the unbuilt state
    pub fn clear(&mut self) {
        self.store = None;
        self.quadtree = None;
        self.selection = None;
        self.epoch.bump();
    }

    /// Resolve point size and viewport into data-space separation radii
    fn data_radii(&self) -> Result<Radii> {
        match &self.point_size {
            PointSize::Uniform(size) => Ok(Radii::Uniform(self.viewport.exclusion_radius(
                *size,
                self.surface_size,
                self.config.pixel_ratio,
            ))),
            PointSize::PerPoint(sizes) => {
                let expected = self.store.as_ref().map_or(0, |s| s.raw_count());
                if sizes.len() < expected {
                    return Err(DeclutterError::SizeMismatch {
                        expected,
                        got: sizes.len(),
                    });
                }
                // Half the converted footprint per point, so two equal-size
                // points end up separated by exactly the uniform radius.
                let radii = sizes
                    .iter()
                    .map(|&size| {
                        self.viewport.exclusion_radius(
                            size,
                            self.surface_size,
                            self.config.pixel_ratio,
                        ) * 0.5
                    })
                    .collect();
                Ok(Radii::PerPoint(radii))
            }
        }
    }

    /// Any viewport, size, or surface change invalidates the previous subset
    /// and requires a fresh selection before the next render.
    fn invalidate(&mut self) {
        self.selection = None;
        self.epoch.bump();
    }
}

impl VisibleQuery {
    /// Ticket to pass back into [`Scatter::apply_visible`]
    #[inline]
    pub fn ticket(&self) -> QueryTicket {
        self.ticket
    }

    /// Execute the selection against the snapshot.
    ///
    /// Read-only; safe to call from a worker task while the session mutates.
    pub fn run(&self) -> Arc<Vec<u32>> {
        match &self.radii {
            Radii::Uniform(radius) => self.quadtree.select(*radius),
            Radii::PerPoint(radii) => self.quadtree.select_sized(radii),
        }
    }
}
