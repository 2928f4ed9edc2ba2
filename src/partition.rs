use crate::cell::Cell;
use crate::grid::{BoundPolicy, CellGrid, Edge, GridError};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    #[error("cannot split {height} rows across {sectors} sectors; every sector needs at least 2 rows")]
    TooManySectors { height: i32, sectors: usize },
    #[error("global grid {width}x{height} is not positive")]
    BadDimensions { width: i32, height: i32 },
}

/// One worker's band of the global grid.
///
/// Bands are derived from a single invariant: every global row is updated by
/// exactly one sector, and each vertically adjacent pair shares exactly one
/// boundary row, present in both grids. The division remainder is absorbed
/// by the last (topmost) band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorGeometry {
    pub sector_id: usize,
    pub width: i32,
    /// Rows in this sector's grid, shared boundary rows included.
    pub height: i32,
    /// Global row of this sector's local row 0.
    pub y_offset: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub width: i32,
    pub height: i32,
    pub sectors: usize,
}

impl Layout {
    pub fn new(width: i32, height: i32, sectors: usize) -> Result<Self, PartitionError> {
        if width <= 0 || height <= 0 {
            return Err(PartitionError::BadDimensions { width, height });
        }
        // base < 2 would make a sector's shared top row and shared bottom
        // row the same row, which the lock bracket cannot express.
        if sectors == 0 || (height as usize) < 2 * sectors {
            return Err(PartitionError::TooManySectors { height, sectors });
        }
        Ok(Layout {
            width,
            height,
            sectors,
        })
    }

    fn base(&self) -> i32 {
        self.height / self.sectors as i32
    }

    pub fn geometry(&self, sector_id: usize) -> SectorGeometry {
        let base = self.base();
        let y_offset = sector_id as i32 * base;
        let top = if sector_id == self.sectors - 1 {
            self.height - 1
        } else {
            (sector_id as i32 + 1) * base
        };
        SectorGeometry {
            sector_id,
            width: self.width,
            height: top - y_offset + 1,
            y_offset,
        }
    }

    /// Number of shared boundary rows, one per adjacent sector pair. Block
    /// ids run 0..count, block `i` being the row shared by sectors `i` and
    /// `i + 1` and registered by sector `i`.
    pub fn block_count(&self) -> usize {
        self.sectors - 1
    }

    /// The block backing this sector's top row, if it has a successor.
    pub fn block_above(&self, sector_id: usize) -> Option<u32> {
        if sector_id + 1 < self.sectors {
            Some(sector_id as u32)
        } else {
            None
        }
    }

    /// The block backing this sector's bottom row, if it has a predecessor.
    pub fn block_below(&self, sector_id: usize) -> Option<u32> {
        if sector_id > 0 {
            Some(sector_id as u32 - 1)
        } else {
            None
        }
    }
}

/// A sector's grid plus its place in the global coordinate space.
pub struct Sector {
    pub grid: CellGrid,
    pub geometry: SectorGeometry,
}

impl Sector {
    /// Allocate a sector grid with the simulation's edge behaviour: the x
    /// edges wrap, while rows past the band's top and bottom are ignored so
    /// that fills expressed in global coordinates clip cleanly.
    pub fn new(geometry: SectorGeometry) -> Result<Self, GridError> {
        let mut grid = CellGrid::with_size(geometry.width, geometry.height)?;
        grid.set_bound_policy(Edge::Left, BoundPolicy::Wrap);
        grid.set_bound_policy(Edge::Right, BoundPolicy::Wrap);
        grid.set_bound_policy(Edge::Top, BoundPolicy::Ignore);
        grid.set_bound_policy(Edge::Bottom, BoundPolicy::Ignore);
        grid.fill(Cell::Earth);
        Ok(Sector { grid, geometry })
    }

    /// Local row index of the shared top row.
    pub fn top_row(&self) -> i32 {
        self.geometry.height - 1
    }
}
