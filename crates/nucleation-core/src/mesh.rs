//! The view of the adaptive mesh the pipeline needs.
//!
//! The mesh itself (cell hierarchy, degree-of-freedom layout, partitioning)
//! belongs to the host solver. The pipeline reads the locally owned cells
//! with their quadrature points, flags cells for refinement, and asks the
//! engine to apply the flags.
//!
//! Every operation is local to one worker. Ranks refine independently and
//! may call [`MeshEngine::apply_refinement`] a different number of times in
//! the same step, so an engine must not make it a collective operation.

use nucleation_types::Point;

/// Identifier of a cell, stable until the next refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellId(pub u32);

impl core::fmt::Display for CellId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "cell-{}", self.0)
    }
}

/// A sample location inside a cell with its integration weight (`JxW`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadraturePoint<const D: usize> {
    /// Physical position.
    pub position: Point<D>,
    /// Quadrature weight times the Jacobian determinant.
    pub weight: f64,
}

/// A locally owned cell.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalCell<const D: usize> {
    /// Cell identifier.
    pub id: CellId,
    /// Refinement level.
    pub level: u32,
    /// Quadrature points, in the engine's fixed order.
    pub points: Vec<QuadraturePoint<D>>,
}

/// Errors raised by a mesh engine.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    /// A flag named a cell this worker does not own.
    #[error("cell {cell} is not owned by this worker")]
    UnknownCell {
        /// The offending cell.
        cell: CellId,
    },

    /// Refinement would exceed a representable size.
    #[error("mesh capacity exceeded: {reason}")]
    Capacity {
        /// Explanation of which limit was hit.
        reason: String,
    },
}

/// Adaptive mesh operations used by the refinement trigger.
///
/// `local_cells` must return cells and points in a deterministic order;
/// the sampler's traversal order follows it. Degree-of-freedom counts are
/// per worker: they cover the cells this worker owns, and the refinement
/// loop only ever compares successive counts on the same worker.
pub trait MeshEngine<const D: usize> {
    /// Cells owned by this worker.
    fn local_cells(&self) -> Vec<LocalCell<D>>;

    /// Flag a cell to be split on the next [`apply_refinement`](Self::apply_refinement).
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::UnknownCell`] if the cell is not owned here.
    fn mark_for_refinement(&mut self, cell: CellId) -> Result<(), MeshError>;

    /// Split all flagged cells, rebuild the local discretization, and
    /// return this worker's new degree-of-freedom count.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError`] if the rebuild fails.
    fn apply_refinement(&mut self) -> Result<u64, MeshError>;

    /// This worker's current degree-of-freedom count.
    fn dof_count(&self) -> u64;
}
