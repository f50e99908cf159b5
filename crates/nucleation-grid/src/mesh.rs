//! A 2^D-tree grid over a box, partitioned into strips along the first axis.
//!
//! The coarse grid has `2^min_level` cells per axis. Refining a cell
//! replaces it with its `2^D` children. Every active cell carries the
//! tensor-product two-point Gauss rule, so each cell has `2^D` quadrature
//! points of weight `volume / 2^D`.
//!
//! Ownership is decided once on the coarse grid: rank `r` of `size` owns
//! the coarse cells whose center lies in the `r`-th of `size` equal strips
//! along axis 0. Children stay with their parent's owner.

use std::collections::BTreeSet;

use nucleation_core::mesh::{CellId, LocalCell, MeshEngine, MeshError, QuadraturePoint};
use nucleation_types::Point;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
struct GridCell<const D: usize> {
    id: CellId,
    level: u32,
    lower: [f64; D],
    width: [f64; D],
}

impl<const D: usize> GridCell<D> {
    fn center(&self) -> Point<D> {
        let mut coords = self.lower;
        for (c, w) in coords.iter_mut().zip(&self.width) {
            *c += w / 2.0;
        }
        Point::new(coords)
    }

    fn volume(&self) -> f64 {
        self.width.iter().product()
    }

    fn quadrature(&self) -> Vec<QuadraturePoint<D>> {
        let center = self.center();
        let gauss = 3.0_f64.sqrt().recip();
        let weight = self.volume() / corner_factor::<D>();
        (0..corner_count::<D>())
            .map(|mask| {
                let mut coords = *center.coords();
                for (axis, (c, w)) in coords.iter_mut().zip(&self.width).enumerate() {
                    let offset = w / 2.0 * gauss;
                    if bit(mask, axis) {
                        *c += offset;
                    } else {
                        *c -= offset;
                    }
                }
                QuadraturePoint {
                    position: Point::new(coords),
                    weight,
                }
            })
            .collect()
    }

    fn children(&self, next_id: &mut u32) -> Result<Vec<Self>, MeshError> {
        let mut width = self.width;
        for w in &mut width {
            *w /= 2.0;
        }
        (0..corner_count::<D>())
            .map(|mask| {
                let mut lower = self.lower;
                for (axis, (l, w)) in lower.iter_mut().zip(&width).enumerate() {
                    if bit(mask, axis) {
                        *l += w;
                    }
                }
                Ok(Self {
                    id: allocate(next_id)?,
                    level: self.level.saturating_add(1),
                    lower,
                    width,
                })
            })
            .collect()
    }
}

/// Number of corners (children, quadrature points) of a `D`-cube.
fn corner_count<const D: usize>() -> usize {
    u32::try_from(D)
        .ok()
        .and_then(|d| 1_usize.checked_shl(d))
        .unwrap_or(usize::MAX)
}

fn corner_factor<const D: usize>() -> f64 {
    2.0_f64.powi(i32::try_from(D).unwrap_or(i32::MAX))
}

fn bit(mask: usize, axis: usize) -> bool {
    u32::try_from(axis)
        .ok()
        .and_then(|a| mask.checked_shr(a))
        .is_some_and(|m| m & 1 == 1)
}

fn allocate(next_id: &mut u32) -> Result<CellId, MeshError> {
    let id = CellId(*next_id);
    *next_id = next_id.checked_add(1).ok_or_else(|| MeshError::Capacity {
        reason: "cell id space exhausted".to_owned(),
    })?;
    Ok(id)
}

/// Rank owning coarse column `index` of `columns` when split `size` ways.
fn strip_owner(index: usize, columns: usize, size: usize) -> Option<usize> {
    // floor((index + 0.5) / columns * size), in integers.
    let numerator = index.checked_mul(2)?.checked_add(1)?.checked_mul(size)?;
    numerator.checked_div(columns.checked_mul(2)?)
}

/// The locally owned part of a uniformly refinable grid.
#[derive(Debug, Clone)]
pub struct GridMesh<const D: usize> {
    max_level: u32,
    cells: Vec<GridCell<D>>,
    flagged: BTreeSet<CellId>,
    next_id: u32,
}

impl<const D: usize> GridMesh<D> {
    /// Build the coarse grid over `[0, extents]` at `min_level` and keep
    /// the cells owned by `rank` of `size`.
    ///
    /// Cell ids are global on the coarse grid, so they never collide
    /// across ranks before the first refinement.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::Capacity`] if the coarse grid has more cells
    /// than fit a `u32` id.
    pub fn new(
        extents: [f64; D],
        min_level: u32,
        max_level: u32,
        rank: usize,
        size: usize,
    ) -> Result<Self, MeshError> {
        let capacity = |what: &str| MeshError::Capacity {
            reason: format!("{what} overflows at level {min_level}"),
        };
        let per_axis = 1_usize
            .checked_shl(min_level)
            .ok_or_else(|| capacity("cells per axis"))?;
        let total = u32::try_from(D)
            .ok()
            .and_then(|d| per_axis.checked_pow(d))
            .ok_or_else(|| capacity("cell count"))?;
        let total_ids = u32::try_from(total).map_err(|_err| capacity("cell id"))?;

        let scale = 2.0_f64.powi(i32::try_from(min_level).unwrap_or(i32::MAX));
        let mut width = extents;
        for w in &mut width {
            *w /= scale;
        }

        let mut cells = Vec::new();
        for flat in 0..total {
            let mut index = [0_usize; D];
            let mut rest = flat;
            for slot in &mut index {
                *slot = rest.checked_rem(per_axis).unwrap_or(0);
                rest = rest.checked_div(per_axis).unwrap_or(0);
            }
            let column = index.first().copied().unwrap_or(0);
            if strip_owner(column, per_axis, size) != Some(rank) {
                continue;
            }

            let mut lower = [0.0; D];
            for ((l, i), w) in lower.iter_mut().zip(&index).zip(&width) {
                *l = f64::from(u32::try_from(*i).unwrap_or(u32::MAX)) * w;
            }
            cells.push(GridCell {
                id: CellId(u32::try_from(flat).unwrap_or(u32::MAX)),
                level: min_level,
                lower,
                width,
            });
        }

        debug!(rank, size, cells = cells.len(), min_level, "Coarse grid built");
        Ok(Self {
            max_level,
            cells,
            flagged: BTreeSet::new(),
            next_id: total_ids,
        })
    }

    /// Number of active locally owned cells.
    pub const fn active_cells(&self) -> usize {
        self.cells.len()
    }

    /// Level of the finest active cell, or `None` if this rank owns none.
    pub fn finest_level(&self) -> Option<u32> {
        self.cells.iter().map(|cell| cell.level).max()
    }
}

impl<const D: usize> MeshEngine<D> for GridMesh<D> {
    fn local_cells(&self) -> Vec<LocalCell<D>> {
        self.cells
            .iter()
            .map(|cell| LocalCell {
                id: cell.id,
                level: cell.level,
                points: cell.quadrature(),
            })
            .collect()
    }

    fn mark_for_refinement(&mut self, cell: CellId) -> Result<(), MeshError> {
        if !self.cells.iter().any(|c| c.id == cell) {
            return Err(MeshError::UnknownCell { cell });
        }
        self.flagged.insert(cell);
        Ok(())
    }

    fn apply_refinement(&mut self) -> Result<u64, MeshError> {
        let flagged = std::mem::take(&mut self.flagged);
        let mut next = Vec::with_capacity(self.cells.len());
        let mut split = 0_usize;
        for cell in self.cells.drain(..) {
            if flagged.contains(&cell.id) && cell.level < self.max_level {
                next.extend(cell.children(&mut self.next_id)?);
                split = split.saturating_add(1);
            } else {
                next.push(cell);
            }
        }
        self.cells = next;
        let dofs = self.dof_count();
        debug!(split, cells = self.cells.len(), dofs, "Grid refined");
        Ok(dofs)
    }

    fn dof_count(&self) -> u64 {
        let cells = u64::try_from(self.cells.len()).unwrap_or(u64::MAX);
        let per_cell = u64::try_from(corner_count::<D>()).unwrap_or(u64::MAX);
        cells.saturating_mul(per_cell)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn quadrature_volume(mesh: &GridMesh<2>) -> f64 {
        mesh.local_cells()
            .iter()
            .flat_map(|c| c.points.iter())
            .map(|q| q.weight)
            .sum()
    }

    #[test]
    fn strips_split_columns_evenly() {
        let owners: Vec<usize> = (0..4).map(|i| strip_owner(i, 4, 2).unwrap()).collect();
        assert_eq!(owners, vec![0, 0, 1, 1]);
        let owners: Vec<usize> = (0..4).map(|i| strip_owner(i, 4, 3).unwrap()).collect();
        assert_eq!(owners, vec![0, 1, 1, 2]);
    }

    #[test]
    fn ranks_partition_the_coarse_grid() {
        let meshes: Vec<GridMesh<2>> = (0..3)
            .map(|rank| GridMesh::new([1.0, 1.0], 2, 4, rank, 3).unwrap())
            .collect();
        let total: usize = meshes.iter().map(GridMesh::active_cells).sum();
        assert_eq!(total, 16);

        let ids: BTreeSet<CellId> = meshes
            .iter()
            .flat_map(|m| m.local_cells().into_iter().map(|c| c.id))
            .collect();
        assert_eq!(ids.len(), 16);

        let volume: f64 = meshes.iter().map(quadrature_volume).sum();
        assert!((volume - 1.0).abs() < 1e-12);
    }

    #[test]
    fn quadrature_weights_cover_the_cell() {
        let mesh = GridMesh::<2>::new([2.0, 1.0], 1, 3, 0, 1).unwrap();
        let cells = mesh.local_cells();
        assert_eq!(cells.len(), 4);
        for cell in &cells {
            assert_eq!(cell.points.len(), 4);
            let weight: f64 = cell.points.iter().map(|q| q.weight).sum();
            assert!((weight - 0.5).abs() < 1e-12);
        }
        // First cell spans [0, 1] x [0, 0.5]; Gauss points sit at
        // 0.5 -+ 0.5/sqrt(3) and 0.25 -+ 0.25/sqrt(3).
        let xs: Vec<f64> = cells[0].points.iter().map(|q| q.position.0[0]).collect();
        let offset = 0.5 / 3.0_f64.sqrt();
        assert!(xs.iter().any(|x| (x - (0.5 - offset)).abs() < 1e-12));
        assert!(xs.iter().any(|x| (x - (0.5 + offset)).abs() < 1e-12));
    }

    #[test]
    fn refining_a_cell_replaces_it_with_children() {
        let mut mesh = GridMesh::<2>::new([1.0, 1.0], 2, 3, 0, 2).unwrap();
        assert_eq!(mesh.dof_count(), 32);
        let first = mesh.local_cells()[0].id;

        mesh.mark_for_refinement(first).unwrap();
        let dofs = mesh.apply_refinement().unwrap();

        assert_eq!(mesh.active_cells(), 11);
        assert_eq!(dofs, 44);
        let fine = mesh.local_cells().iter().filter(|c| c.level == 3).count();
        assert_eq!(fine, 4);
        assert_eq!(mesh.finest_level(), Some(3));
        assert!((quadrature_volume(&mesh) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn dof_count_covers_only_the_owned_strip() {
        let whole = GridMesh::<2>::new([1.0, 1.0], 2, 3, 0, 1).unwrap();
        let mut left = GridMesh::<2>::new([1.0, 1.0], 2, 3, 0, 2).unwrap();
        let right = GridMesh::<2>::new([1.0, 1.0], 2, 3, 1, 2).unwrap();
        assert_eq!(left.dof_count() + right.dof_count(), whole.dof_count());

        // Refining one rank alone changes only that rank's count.
        let first = left.local_cells()[0].id;
        left.mark_for_refinement(first).unwrap();
        assert_eq!(left.apply_refinement().unwrap(), 44);
        assert_eq!(right.dof_count(), 32);
        assert_eq!(right.finest_level(), Some(2));
    }

    #[test]
    fn max_level_cells_are_not_split() {
        let mut mesh = GridMesh::<2>::new([1.0, 1.0], 2, 2, 0, 1).unwrap();
        let first = mesh.local_cells()[0].id;
        mesh.mark_for_refinement(first).unwrap();
        let before = mesh.dof_count();
        assert_eq!(mesh.apply_refinement().unwrap(), before);
    }

    #[test]
    fn foreign_cell_cannot_be_marked() {
        let mut mesh = GridMesh::<2>::new([1.0, 1.0], 2, 3, 1, 2).unwrap();
        assert!(matches!(
            mesh.mark_for_refinement(CellId(0)),
            Err(MeshError::UnknownCell { .. })
        ));
    }

    #[test]
    fn three_dimensional_grid() {
        let mesh = GridMesh::<3>::new([1.0, 1.0, 1.0], 1, 2, 0, 1).unwrap();
        let cells = mesh.local_cells();
        assert_eq!(cells.len(), 8);
        assert!(cells.iter().all(|c| c.points.len() == 8));
        let weight: f64 = cells.iter().flat_map(|c| c.points.iter()).map(|q| q.weight).sum();
        assert!((weight - 1.0).abs() < 1e-12);
        assert_eq!(mesh.dof_count(), 64);
    }
}
