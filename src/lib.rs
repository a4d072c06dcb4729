//! Point Declutter - Zoom-Adaptive Subset Selection for Large Scatter Plots
//!
//! This library provides efficient storage, indexing, and level-of-detail selection for
//! large 2D point datasets destined for a scatter-plot renderer. The core data structure
//! is a quadtree built once per dataset and queried repeatedly with a changing exclusion
//! radius, producing the subset of points that can be drawn without visual overlap at the
//! current zoom level.
//!
//! # Architecture
//!
//! - **[`PointStore`]**: Immutable storage for the raw coordinate pairs and their id space
//! - **[`Quadtree`]**: Spatial partition over the store with radius-suppression queries
//! - **[`Viewport`]**: Scale/translate state, autorange, and pixel-to-data radius conversion
//! - **[`Scatter`]**: High-level manager tying store, partition, viewport, and selection together
//!
//! # Performance Characteristics
//!
//! - **Build Time**: O(N log N), usable at N = 10^6
//! - **Query Time**: near-linear in N per fresh radius, O(1) for a repeated radius (cached)
//! - **Memory**: O(N) for coordinates + O(N) for the partition
//!
//! The renderer itself (GPU upload, shaders, draw calls) is an external collaborator: it
//! consumes the selected id sequence and the scale/translate pair and maps ids back into
//! the raw coordinate buffer.

mod quadtree;
mod scatter;
mod select;
mod store;
mod viewport;

// Public API exports
pub use quadtree::Quadtree;
pub use scatter::{Config, DEFAULT_POINT_SIZE, PointSize, Scatter, ScatterInfo, VisibleQuery};
pub use store::PointStore;
pub use viewport::{ApplyOutcome, MIN_SCALE, MIN_SPAN, QueryTicket, Viewport};

/// Error types for dataset ingestion and selection
#[derive(Debug, thiserror::Error)]
pub enum DeclutterError {
    #[error("invalid position input: {reason}")]
    InvalidInput { reason: String },

    #[error("per-point size sequence has {got} entries, expected {expected}")]
    SizeMismatch { expected: usize, got: usize },

    #[error("no dataset has been built")]
    Unbuilt,
}

pub type Result<T> = std::result::Result<T, DeclutterError>;
