//! Local mesh refinement around newly accepted events.
//!
//! A new nucleus is small compared to the coarse mesh, so cells near it are
//! refined before the seeding logic places it. Each iteration flags every
//! local cell below the maximum level that has a sample point within the
//! freeze radius of a new event, then asks the mesh engine to apply the
//! flags. The loop ends at the iteration cap, when nothing is flagged, or
//! when a rebuild leaves the degree-of-freedom count unchanged.
//!
//! The loop is per worker: a rank with nothing near the new events stops
//! without touching its mesh while other ranks keep refining.

use nucleation_types::NucleationEvent;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::mesh::{CellId, LocalCell, MeshEngine, MeshError};

/// Refinement trigger parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefinementParams {
    /// Coarsest mesh level.
    pub min_level: u32,
    /// Finest level a cell may reach.
    pub max_level: u32,
    /// Cells with a sample point closer than this to a new event are refined.
    pub freeze_radius: f64,
}

impl RefinementParams {
    /// Upper bound on refinement iterations per step.
    pub const fn max_iterations(&self) -> u32 {
        self.max_level.saturating_sub(self.min_level)
    }
}

/// Why the refinement loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementStop {
    /// No events were accepted this step; the loop did not run.
    NoEvents,
    /// An iteration flagged no cells.
    NothingMarked,
    /// A rebuild left the degree-of-freedom count unchanged.
    FixedPoint,
    /// The iteration bound was reached.
    IterationCap,
}

/// What the refinement loop did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementReport {
    /// Iterations that flagged cells and invoked the engine.
    pub iterations: u32,
    /// Cells flagged in each of those iterations.
    pub marked_per_iteration: Vec<usize>,
    /// Degree-of-freedom count after the loop.
    pub dofs: u64,
    /// Termination reason.
    pub stop: RefinementStop,
}

/// Cells that need refining for `events`.
pub fn cells_near_events<const D: usize>(
    cells: &[LocalCell<D>],
    events: &[NucleationEvent<D>],
    params: &RefinementParams,
) -> Vec<CellId> {
    cells
        .iter()
        .filter(|cell| cell.level < params.max_level)
        .filter(|cell| {
            cell.points.iter().any(|point| {
                events
                    .iter()
                    .any(|event| event.center().distance(&point.position) < params.freeze_radius)
            })
        })
        .map(|cell| cell.id)
        .collect()
}

/// Refine the mesh around `events` (the batch accepted this step).
///
/// # Errors
///
/// Returns [`MeshError`] if flagging or rebuilding fails.
pub fn refine_near_events<const D: usize, M>(
    mesh: &mut M,
    events: &[NucleationEvent<D>],
    params: &RefinementParams,
) -> Result<RefinementReport, MeshError>
where
    M: MeshEngine<D>,
{
    let mut report = RefinementReport {
        iterations: 0,
        marked_per_iteration: Vec::new(),
        dofs: mesh.dof_count(),
        stop: RefinementStop::IterationCap,
    };

    if events.is_empty() {
        report.stop = RefinementStop::NoEvents;
        return Ok(report);
    }

    for _ in 0..params.max_iterations() {
        let marked = cells_near_events(&mesh.local_cells(), events, params);
        if marked.is_empty() {
            report.stop = RefinementStop::NothingMarked;
            break;
        }
        for cell in &marked {
            mesh.mark_for_refinement(*cell)?;
        }

        let dofs = mesh.apply_refinement()?;
        report.iterations = report.iterations.saturating_add(1);
        report.marked_per_iteration.push(marked.len());
        debug!(
            iteration = report.iterations,
            marked = marked.len(),
            dofs,
            "Refinement iteration"
        );

        if dofs == report.dofs {
            report.stop = RefinementStop::FixedPoint;
            break;
        }
        report.dofs = dofs;
    }

    if report.iterations > 0 {
        info!(
            iterations = report.iterations,
            dofs = report.dofs,
            stop = ?report.stop,
            "Refined mesh around new events"
        );
    }
    Ok(report)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use nucleation_types::{EventId, Nucleus, Point};

    use super::*;
    use crate::mesh::QuadraturePoint;

    /// A one-dimensional row of cells; splitting a cell replaces it with
    /// two children one level finer.
    struct Row {
        cells: Vec<LocalCell<1>>,
        flagged: Vec<CellId>,
        next_id: u32,
        rebuilds: u32,
    }

    impl Row {
        fn new(count: u32, level: u32) -> Self {
            let width = 1.0 / f64::from(count);
            let cells = (0..count)
                .map(|i| cell(i, level, f64::from(i) * width, width))
                .collect();
            Self {
                cells,
                flagged: Vec::new(),
                next_id: count,
                rebuilds: 0,
            }
        }
    }

    fn cell(id: u32, level: u32, start: f64, width: f64) -> LocalCell<1> {
        LocalCell {
            id: CellId(id),
            level,
            points: vec![QuadraturePoint {
                position: Point::new([start + width / 2.0]),
                weight: width,
            }],
        }
    }

    impl MeshEngine<1> for Row {
        fn local_cells(&self) -> Vec<LocalCell<1>> {
            self.cells.clone()
        }

        fn mark_for_refinement(&mut self, id: CellId) -> Result<(), MeshError> {
            if self.cells.iter().any(|c| c.id == id) {
                self.flagged.push(id);
                Ok(())
            } else {
                Err(MeshError::UnknownCell { cell: id })
            }
        }

        fn apply_refinement(&mut self) -> Result<u64, MeshError> {
            self.rebuilds += 1;
            let mut next = Vec::new();
            for c in self.cells.drain(..) {
                if self.flagged.contains(&c.id) {
                    let width = c.points[0].weight / 2.0;
                    let start = c.points[0].position.0[0] - c.points[0].weight / 2.0;
                    next.push(cell(self.next_id, c.level + 1, start, width));
                    next.push(cell(self.next_id + 1, c.level + 1, start + width, width));
                    self.next_id += 2;
                } else {
                    next.push(c);
                }
            }
            self.cells = next;
            self.flagged.clear();
            Ok(self.dof_count())
        }

        fn dof_count(&self) -> u64 {
            u64::try_from(self.cells.len()).unwrap() * 2
        }
    }

    fn event_at(x: f64) -> NucleationEvent<1> {
        NucleationEvent {
            id: EventId(0),
            nucleus: Nucleus {
                center: Point::new([x]),
                radius: 0.01,
                created_at: 0.0,
                hold_duration: 0.0,
                created_step: 0,
            },
        }
    }

    fn params(freeze_radius: f64) -> RefinementParams {
        RefinementParams {
            min_level: 2,
            max_level: 4,
            freeze_radius,
        }
    }

    #[test]
    fn no_events_skips_the_loop() {
        let mut row = Row::new(4, 2);
        let report = refine_near_events(&mut row, &[], &params(0.5)).unwrap();
        assert_eq!(report.stop, RefinementStop::NoEvents);
        assert_eq!(row.rebuilds, 0);
    }

    #[test]
    fn nothing_near_means_engine_untouched() {
        let mut row = Row::new(4, 2);
        let before = row.dof_count();
        let report = refine_near_events(&mut row, &[event_at(0.5)], &params(0.01)).unwrap();
        assert_eq!(report.stop, RefinementStop::NothingMarked);
        assert_eq!(report.iterations, 0);
        assert_eq!(row.rebuilds, 0);
        assert_eq!(report.dofs, before);
    }

    #[test]
    fn refines_up_to_the_iteration_cap() {
        // Cell centers at 0.125, 0.375, ... ; event at 0.375 hits cell 1.
        let mut row = Row::new(4, 2);
        let report = refine_near_events(&mut row, &[event_at(0.375)], &params(0.1)).unwrap();
        assert_eq!(report.iterations, 2);
        assert_eq!(report.stop, RefinementStop::IterationCap);
        assert!(row.cells.iter().all(|c| c.level <= 4));
        assert!(row.cells.iter().any(|c| c.level == 4));
        assert_eq!(report.dofs, row.dof_count());
    }

    #[test]
    fn cells_at_max_level_are_not_marked() {
        let row = Row::new(4, 4);
        let marked = cells_near_events(&row.cells, &[event_at(0.375)], &params(0.5));
        assert!(marked.is_empty());
    }

    #[test]
    fn equal_levels_allow_no_iterations() {
        let p = RefinementParams {
            min_level: 3,
            max_level: 3,
            freeze_radius: 1.0,
        };
        let mut row = Row::new(2, 3);
        let report = refine_near_events(&mut row, &[event_at(0.5)], &p).unwrap();
        assert_eq!(report.iterations, 0);
        assert_eq!(report.stop, RefinementStop::IterationCap);
    }

    /// An engine whose rebuild never changes anything.
    struct Frozen {
        inner: Row,
    }

    impl MeshEngine<1> for Frozen {
        fn local_cells(&self) -> Vec<LocalCell<1>> {
            self.inner.local_cells()
        }

        fn mark_for_refinement(&mut self, id: CellId) -> Result<(), MeshError> {
            self.inner.mark_for_refinement(id)
        }

        fn apply_refinement(&mut self) -> Result<u64, MeshError> {
            self.inner.flagged.clear();
            self.inner.rebuilds += 1;
            Ok(self.inner.dof_count())
        }

        fn dof_count(&self) -> u64 {
            self.inner.dof_count()
        }
    }

    #[test]
    fn unchanged_dofs_is_a_fixed_point() {
        let mut mesh = Frozen {
            inner: Row::new(4, 2),
        };
        let report = refine_near_events(&mut mesh, &[event_at(0.375)], &params(0.1)).unwrap();
        assert_eq!(report.stop, RefinementStop::FixedPoint);
        assert_eq!(report.iterations, 1);
        assert_eq!(mesh.inner.rebuilds, 1);
    }
}
