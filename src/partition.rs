//! Cell partitioning - covers a volume with a grid of fixed-shape cells

use crate::error::{ExportError, ExportResult};
use crate::types::Triple;
use serde::{Deserialize, Serialize};

/// One cell of a grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellDescriptor {
    /// Grid coordinates of the cell
    pub position: Triple,
    /// Minimum corner in voxel coordinates
    pub min: Triple,
    /// Number of voxels along each axis
    pub extent: Triple,
}

impl CellDescriptor {
    /// Number of voxels in the cell
    pub fn num_voxels(&self) -> usize {
        self.extent.iter().product()
    }

    /// Exclusive maximum corner
    pub fn max(&self) -> Triple {
        [
            self.min[0] + self.extent[0],
            self.min[1] + self.extent[1],
            self.min[2] + self.extent[2],
        ]
    }
}

/// The grid of cells covering a volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellGrid {
    dimensions: Triple,
    cell_shape: Triple,
    num_cells: Triple,
    border: Triple,
}

impl CellGrid {
    /// Create the grid for `dimensions` split into cells of `cell_shape`
    pub fn new(dimensions: Triple, cell_shape: Triple) -> ExportResult<Self> {
        for d in 0..3 {
            if dimensions[d] == 0 {
                return Err(ExportError::Configuration(format!(
                    "volume dimension {} is zero in {:?}",
                    d, dimensions
                )));
            }
            if cell_shape[d] == 0 {
                return Err(ExportError::Configuration(format!(
                    "cell shape dimension {} is zero in {:?}",
                    d, cell_shape
                )));
            }
        }

        let mut num_cells = [0; 3];
        let mut border = [0; 3];
        for d in 0..3 {
            num_cells[d] = (dimensions[d] - 1) / cell_shape[d] + 1;
            border[d] = dimensions[d] - (num_cells[d] - 1) * cell_shape[d];
        }

        Ok(Self {
            dimensions,
            cell_shape,
            num_cells,
            border,
        })
    }

    /// Extent of the partitioned volume
    pub fn dimensions(&self) -> Triple {
        self.dimensions
    }

    /// Nominal cell shape; edge cells may be smaller
    pub fn cell_shape(&self) -> Triple {
        self.cell_shape
    }

    /// Number of cells along each axis
    pub fn num_cells(&self) -> Triple {
        self.num_cells
    }

    /// Extent of the last cell along each axis
    pub fn border(&self) -> Triple {
        self.border
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.num_cells.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Descriptor of the cell at grid `position`, if inside the grid
    pub fn cell(&self, position: Triple) -> Option<CellDescriptor> {
        if (0..3).any(|d| position[d] >= self.num_cells[d]) {
            return None;
        }

        let mut min = [0; 3];
        let mut extent = [0; 3];
        for d in 0..3 {
            min[d] = position[d] * self.cell_shape[d];
            extent[d] = if position[d] + 1 == self.num_cells[d] {
                self.border[d]
            } else {
                self.cell_shape[d]
            };
        }

        Some(CellDescriptor {
            position,
            min,
            extent,
        })
    }

    /// Convert a linear cell index (x fastest) to grid coordinates
    pub fn index_to_position(&self, index: usize) -> Option<Triple> {
        if index >= self.len() {
            return None;
        }
        let [nx, ny, _] = self.num_cells;
        Some([index % nx, (index / nx) % ny, index / (nx * ny)])
    }

    /// Convert grid coordinates to a linear cell index (x fastest)
    pub fn position_to_index(&self, position: Triple) -> usize {
        let [nx, ny, _] = self.num_cells;
        position[0] + nx * (position[1] + ny * position[2])
    }

    /// Iterate all cells, x varying fastest, then y, then z
    pub fn iter(&self) -> CellIter<'_> {
        CellIter {
            grid: self,
            next: 0,
        }
    }
}

impl<'a> IntoIterator for &'a CellGrid {
    type Item = CellDescriptor;
    type IntoIter = CellIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the cells of a [`CellGrid`]
#[derive(Debug, Clone)]
pub struct CellIter<'a> {
    grid: &'a CellGrid,
    next: usize,
}

impl Iterator for CellIter<'_> {
    type Item = CellDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        let position = self.grid.index_to_position(self.next)?;
        self.next += 1;
        self.grid.cell(position)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.grid.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for CellIter<'_> {}

/// Partition a volume into cells
pub fn partition(dimensions: Triple, cell_shape: Triple) -> ExportResult<CellGrid> {
    CellGrid::new(dimensions, cell_shape)
}
