use crate::cell::Cell;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("cell index ({x}, {y}) is outside the {width}x{height} grid")]
    OutOfBounds {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
    #[error("failed to allocate storage for {cells} cells")]
    AllocationFailed { cells: usize },
    #[error("grid dimensions {width}x{height} are not positive")]
    BadDimensions { width: i32, height: i32 },
    #[error("byte {byte:#04x} at ({x}, {y}) is not a cell code")]
    UnknownCell { byte: u8, x: i32, y: i32 },
    #[error("{width}x{height} region at ({x}, {y}) does not fit the grid")]
    RegionOutOfRange {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
}

/// How a coordinate past one edge of the grid is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundPolicy {
    /// Reads yield the given constant; writes are dropped.
    Constant(Cell),
    /// The coordinate wraps around to the opposite edge.
    Wrap,
    /// Any out-of-range access is an error.
    Reject,
    /// Reads yield `Cell::Boundary`; writes are dropped.
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Left = 0,
    Right = 1,
    Bottom = 2,
    Top = 3,
}

enum Resolved {
    Index(usize),
    Constant(Cell),
    Ignored,
}

/// Dense row-major 2D cell storage with a configurable bound policy per edge.
///
/// Every access goes through bound resolution before touching storage, so an
/// out-of-range coordinate can never read or corrupt adjacent memory. Rows are
/// contiguous bytes and can be borrowed directly for bulk transfer.
#[derive(Debug, Clone)]
pub struct CellGrid {
    width: i32,
    height: i32,
    cells: Vec<u8>,
    bounds: [BoundPolicy; 4],
}

impl CellGrid {
    /// An unsized grid; call `set_size` before use. All edges default to wrap.
    pub fn new() -> Self {
        CellGrid {
            width: 0,
            height: 0,
            cells: Vec::new(),
            bounds: [BoundPolicy::Wrap; 4],
        }
    }

    pub fn with_size(width: i32, height: i32) -> Result<Self, GridError> {
        let mut grid = CellGrid::new();
        grid.set_size(width, height)?;
        Ok(grid)
    }

    /// (Re)allocate storage, discarding any previous contents. The new grid
    /// is filled with `Cell::Air`. Allocation failure is reported, not fatal.
    pub fn set_size(&mut self, width: i32, height: i32) -> Result<(), GridError> {
        if width <= 0 || height <= 0 {
            return Err(GridError::BadDimensions { width, height });
        }
        let len = width as usize * height as usize;
        let mut cells = Vec::new();
        cells
            .try_reserve_exact(len)
            .map_err(|_| GridError::AllocationFailed { cells: len })?;
        cells.resize(len, Cell::Air.as_byte());

        self.width = width;
        self.height = height;
        self.cells = cells;
        Ok(())
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn set_bound_policy(&mut self, edge: Edge, policy: BoundPolicy) {
        self.bounds[edge as usize] = policy;
    }

    pub fn set_all_bounds(&mut self, policy: BoundPolicy) {
        self.bounds = [policy; 4];
    }

    pub fn bound_policy(&self, edge: Edge) -> BoundPolicy {
        self.bounds[edge as usize]
    }

    fn resolve(&self, mut x: i32, mut y: i32) -> Result<Resolved, GridError> {
        if x < 0 || x >= self.width {
            let edge = if x < 0 { Edge::Left } else { Edge::Right };
            match self.bounds[edge as usize] {
                BoundPolicy::Constant(cell) => return Ok(Resolved::Constant(cell)),
                BoundPolicy::Wrap => x = x.rem_euclid(self.width),
                BoundPolicy::Reject => {
                    return Err(GridError::OutOfBounds {
                        x,
                        y,
                        width: self.width,
                        height: self.height,
                    });
                }
                BoundPolicy::Ignore => return Ok(Resolved::Ignored),
            }
        }
        if y < 0 || y >= self.height {
            let edge = if y < 0 { Edge::Bottom } else { Edge::Top };
            match self.bounds[edge as usize] {
                BoundPolicy::Constant(cell) => return Ok(Resolved::Constant(cell)),
                BoundPolicy::Wrap => y = y.rem_euclid(self.height),
                BoundPolicy::Reject => {
                    return Err(GridError::OutOfBounds {
                        x,
                        y,
                        width: self.width,
                        height: self.height,
                    });
                }
                BoundPolicy::Ignore => return Ok(Resolved::Ignored),
            }
        }
        Ok(Resolved::Index(y as usize * self.width as usize + x as usize))
    }

    pub fn get(&self, x: i32, y: i32) -> Result<Cell, GridError> {
        match self.resolve(x, y)? {
            Resolved::Index(i) => {
                let byte = self.cells[i];
                Cell::from_byte(byte).ok_or(GridError::UnknownCell { byte, x, y })
            }
            Resolved::Constant(cell) => Ok(cell),
            Resolved::Ignored => Ok(Cell::Boundary),
        }
    }

    pub fn set(&mut self, x: i32, y: i32, cell: Cell) -> Result<(), GridError> {
        match self.resolve(x, y)? {
            Resolved::Index(i) => {
                self.cells[i] = cell.as_byte();
                Ok(())
            }
            // Constant and Ignore edges both drop writes.
            Resolved::Constant(_) | Resolved::Ignored => Ok(()),
        }
    }

    pub fn fill(&mut self, cell: Cell) {
        self.cells.fill(cell.as_byte());
    }

    /// Set a rectangular region to a constant cell. Coordinates go through
    /// the same bound resolution as single-cell writes, so a region hanging
    /// past an `Ignore` edge is silently clipped.
    pub fn fill_rect(
        &mut self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        cell: Cell,
    ) -> Result<(), GridError> {
        for cy in y..y + height {
            for cx in x..x + width {
                self.set(cx, cy, cell)?;
            }
        }
        Ok(())
    }

    /// One row's backing bytes. `y` must be in range; this is the bulk-copy
    /// escape hatch for the shared-memory protocol and the final gather.
    pub fn row(&self, y: i32) -> &[u8] {
        let w = self.width as usize;
        let start = y as usize * w;
        &self.cells[start..start + w]
    }

    pub fn row_mut(&mut self, y: i32) -> &mut [u8] {
        let w = self.width as usize;
        let start = y as usize * w;
        &mut self.cells[start..start + w]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.cells
    }

    /// Copy a `width`x`height` block of raw cell bytes into the grid at
    /// `(x, y)`. Used by the root worker to merge gathered sectors; the
    /// region must lie fully inside the grid.
    pub fn copy_cells(
        &mut self,
        data: &[u8],
        width: i32,
        height: i32,
        x: i32,
        y: i32,
    ) -> Result<(), GridError> {
        if x < 0
            || y < 0
            || width <= 0
            || height <= 0
            || x + width > self.width
            || y + height > self.height
            || data.len() < width as usize * height as usize
        {
            return Err(GridError::RegionOutOfRange {
                x,
                y,
                width,
                height,
            });
        }
        let w = width as usize;
        for row in 0..height as usize {
            let src = &data[row * w..(row + 1) * w];
            let start = (y as usize + row) * self.width as usize + x as usize;
            self.cells[start..start + w].copy_from_slice(src);
        }
        Ok(())
    }

    /// Count of each distinct cell byte, for end-of-run reporting.
    pub fn census(&self) -> Vec<(Cell, usize)> {
        let mut counts: Vec<(Cell, usize)> = Vec::new();
        for &byte in &self.cells {
            if let Some(cell) = Cell::from_byte(byte) {
                match counts.iter_mut().find(|(c, _)| *c == cell) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((cell, 1)),
                }
            }
        }
        counts
    }
}

impl Default for CellGrid {
    fn default() -> Self {
        CellGrid::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(width: i32, height: i32) -> CellGrid {
        let mut grid = CellGrid::with_size(width, height).unwrap();
        grid.fill(Cell::Earth);
        grid
    }

    #[test]
    fn constant_policy_reads_constant_and_drops_writes() {
        let mut grid = fresh(4, 3);
        grid.set_all_bounds(BoundPolicy::Constant(Cell::Air));

        assert_eq!(grid.get(-1, 1).unwrap(), Cell::Air);
        grid.set(-1, 1, Cell::Void).unwrap();
        // Nothing in storage may change.
        assert!(grid.as_bytes().iter().all(|&b| b == Cell::Earth.as_byte()));
    }

    #[test]
    fn wrap_policy_reads_opposite_edge() {
        let mut grid = fresh(4, 3);
        grid.set_all_bounds(BoundPolicy::Wrap);
        grid.set(3, 1, Cell::Coal).unwrap();

        assert_eq!(grid.get(-1, 1).unwrap(), Cell::Coal);
        assert_eq!(grid.get(7, 1).unwrap(), Cell::Coal);

        grid.set(-1, 0, Cell::Void).unwrap();
        assert_eq!(grid.get(3, 0).unwrap(), Cell::Void);
    }

    #[test]
    fn reject_policy_reports_error() {
        let mut grid = fresh(4, 3);
        grid.set_all_bounds(BoundPolicy::Reject);

        let err = grid.get(-1, 1).unwrap_err();
        assert!(matches!(err, GridError::OutOfBounds { .. }));
        assert!(grid.set(0, 99, Cell::Void).is_err());
        // In-range access still works.
        assert_eq!(grid.get(0, 0).unwrap(), Cell::Earth);
    }

    #[test]
    fn ignore_policy_reads_sentinel_and_drops_writes() {
        let mut grid = fresh(4, 3);
        grid.set_all_bounds(BoundPolicy::Ignore);

        assert_eq!(grid.get(-1, 1).unwrap(), Cell::Boundary);
        assert_eq!(grid.get(0, 3).unwrap(), Cell::Boundary);
        grid.set(-1, 1, Cell::Void).unwrap();
        grid.set(2, -5, Cell::Void).unwrap();
        assert!(grid.as_bytes().iter().all(|&b| b == Cell::Earth.as_byte()));
    }

    #[test]
    fn per_edge_policies_are_independent() {
        let mut grid = fresh(4, 3);
        grid.set_bound_policy(Edge::Left, BoundPolicy::Wrap);
        grid.set_bound_policy(Edge::Right, BoundPolicy::Wrap);
        grid.set_bound_policy(Edge::Top, BoundPolicy::Ignore);
        grid.set_bound_policy(Edge::Bottom, BoundPolicy::Ignore);

        grid.set(3, 2, Cell::Coal).unwrap();
        assert_eq!(grid.get(-1, 2).unwrap(), Cell::Coal);
        assert_eq!(grid.get(1, -1).unwrap(), Cell::Boundary);
        assert_eq!(grid.get(1, 3).unwrap(), Cell::Boundary);
    }

    #[test]
    fn set_size_discards_previous_contents() {
        let mut grid = fresh(4, 3);
        grid.set(0, 0, Cell::Coal).unwrap();
        grid.set_size(2, 2).unwrap();
        assert_eq!(grid.width(), 2);
        assert_eq!(grid.height(), 2);
        assert_eq!(grid.get(0, 0).unwrap(), Cell::Air);
    }

    #[test]
    fn bad_dimensions_are_rejected() {
        assert!(matches!(
            CellGrid::with_size(0, 5),
            Err(GridError::BadDimensions { .. })
        ));
        assert!(matches!(
            CellGrid::with_size(5, -1),
            Err(GridError::BadDimensions { .. })
        ));
    }

    #[test]
    fn fill_rect_clips_against_ignore_edges() {
        let mut grid = fresh(4, 4);
        grid.set_all_bounds(BoundPolicy::Ignore);
        // Region starts below the grid; only the in-range slice lands.
        grid.fill_rect(0, -2, 4, 3, Cell::Coal).unwrap();
        for x in 0..4 {
            assert_eq!(grid.get(x, 0).unwrap(), Cell::Coal);
            assert_eq!(grid.get(x, 1).unwrap(), Cell::Earth);
        }
    }

    #[test]
    fn rows_are_contiguous() {
        let mut grid = fresh(3, 2);
        grid.set(0, 1, Cell::Void).unwrap();
        grid.set(2, 1, Cell::Coal).unwrap();
        assert_eq!(
            grid.row(1),
            &[
                Cell::Void.as_byte(),
                Cell::Earth.as_byte(),
                Cell::Coal.as_byte()
            ]
        );

        grid.row_mut(0).fill(Cell::Air.as_byte());
        assert_eq!(grid.get(1, 0).unwrap(), Cell::Air);
    }

    #[test]
    fn copy_cells_places_block_at_offset() {
        let mut grid = fresh(3, 4);
        let block = vec![Cell::Void.as_byte(); 6]; // 3x2
        grid.copy_cells(&block, 3, 2, 0, 1).unwrap();

        for x in 0..3 {
            assert_eq!(grid.get(x, 0).unwrap(), Cell::Earth);
            assert_eq!(grid.get(x, 1).unwrap(), Cell::Void);
            assert_eq!(grid.get(x, 2).unwrap(), Cell::Void);
            assert_eq!(grid.get(x, 3).unwrap(), Cell::Earth);
        }
    }

    #[test]
    fn copy_cells_rejects_overhang() {
        let mut grid = fresh(3, 4);
        let block = vec![Cell::Void.as_byte(); 6];
        assert!(matches!(
            grid.copy_cells(&block, 3, 2, 0, 3),
            Err(GridError::RegionOutOfRange { .. })
        ));
    }
}
