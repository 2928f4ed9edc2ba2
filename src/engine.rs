use crate::cell::Cell;
use crate::grid::{CellGrid, GridError};
use crate::selection::SelectionSet;
use rand::Rng;

/// Traversal order of one update pass.
///
/// The automaton mutates the grid in place on a single buffer, so the pass
/// must visit every cell a rule can move *into* before the cell the rule
/// fires from. Voids rise (+y) and drills relocate toward +x first, which
/// makes `TopDown` (y descending, x descending within a row) the only
/// correct order. `BottomUp` re-visits moved cells within the same pass and
/// applies rules to them again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOrder {
    TopDown,
    BottomUp,
}

/// Neighbor scan order for a drill looking for more coal: forward,
/// backward, then the two vertical laterals.
const DRILL_SCAN: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// The per-cell transition rules, applied once per cell per iteration.
pub struct CaEngine {
    /// Weighted x-offsets a rising void may drift by.
    pub neighbourhood: SelectionSet<i32>,
    /// Chance per blocked-free step that a void collapses in place.
    pub kill_bubble: f64,
}

impl CaEngine {
    pub fn new(neighbourhood: SelectionSet<i32>, kill_bubble: f64) -> Self {
        CaEngine {
            neighbourhood,
            kill_bubble,
        }
    }

    /// One full update pass in the canonical order. The top row
    /// (`height - 1`) is never a rule source; it only receives writes from
    /// the row below, which keeps it consistent with a vertically adjacent
    /// sector sharing it.
    pub fn sweep<R: Rng>(&self, grid: &mut CellGrid, rng: &mut R) -> Result<(), GridError> {
        for y in (0..=grid.height() - 2).rev() {
            self.update_row(grid, y, rng)?;
        }
        Ok(())
    }

    /// One full update pass in an explicit order. Only `SweepOrder::TopDown`
    /// is correct for simulation; `BottomUp` exists so the ordering invariant
    /// stays observable rather than implicit in loop bounds.
    pub fn sweep_with_order<R: Rng>(
        &self,
        grid: &mut CellGrid,
        rng: &mut R,
        order: SweepOrder,
    ) -> Result<(), GridError> {
        match order {
            SweepOrder::TopDown => self.sweep(grid, rng),
            SweepOrder::BottomUp => {
                for y in 0..=grid.height() - 2 {
                    for x in 0..grid.width() {
                        self.update_cell(grid, x, y, rng)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Update one row, x descending. Exposed so a worker can interleave
    /// shared-row lock traffic between rows of the same pass.
    pub fn update_row<R: Rng>(
        &self,
        grid: &mut CellGrid,
        y: i32,
        rng: &mut R,
    ) -> Result<(), GridError> {
        for x in (0..grid.width()).rev() {
            self.update_cell(grid, x, y, rng)?;
        }
        Ok(())
    }

    fn update_cell<R: Rng>(
        &self,
        grid: &mut CellGrid,
        x: i32,
        y: i32,
        rng: &mut R,
    ) -> Result<(), GridError> {
        match grid.get(x, y)? {
            Cell::Void => self.update_void(grid, x, y, rng),
            Cell::Drill => self.update_drill(grid, x, y),
            Cell::Earth => self.update_earth(grid, x, y),
            // Air, coal, static voids and boundary sentinels are inert.
            _ => Ok(()),
        }
    }

    /// A void drifts one row up into earth or air, or collapses in place.
    fn update_void<R: Rng>(
        &self,
        grid: &mut CellGrid,
        x: i32,
        y: i32,
        rng: &mut R,
    ) -> Result<(), GridError> {
        let offset = self.neighbourhood.roulette_select(rng);
        let target = grid.get(x + offset, y + 1)?;
        if target == Cell::Earth || target == Cell::Air {
            if rng.random::<f64>() < self.kill_bubble {
                grid.set(x, y, Cell::StaticVoid)?;
            } else {
                grid.set(x, y, target)?;
                grid.set(x + offset, y + 1, Cell::Void)?;
            }
        }
        Ok(())
    }

    /// A drill leaves a void behind and relocates onto the first adjacent
    /// coal cell in the fixed scan order. With no coal left nearby it is
    /// extinguished.
    fn update_drill(&self, grid: &mut CellGrid, x: i32, y: i32) -> Result<(), GridError> {
        grid.set(x, y, Cell::Void)?;
        for (dx, dy) in DRILL_SCAN {
            if grid.get(x + dx, y + dy)? == Cell::Coal {
                grid.set(x + dx, y + dy, Cell::Drill)?;
                return Ok(());
            }
        }
        Ok(())
    }

    /// Undermined earth settles: if the cell below is open and the column is
    /// not laterally supported, every cell from the row below up to the top
    /// shifts down by one.
    fn update_earth(&self, grid: &mut CellGrid, x: i32, y: i32) -> Result<(), GridError> {
        let below = grid.get(x, y - 1)?;
        if below != Cell::Air && below != Cell::StaticVoid {
            return Ok(());
        }

        let mut unsupported = false;
        for (dx, dy) in [(-1, -1), (1, -1), (-1, 0), (1, 0)] {
            let cell = grid.get(x + dx, y + dy)?;
            if cell == Cell::Air || cell == Cell::StaticVoid {
                unsupported = true;
                break;
            }
        }
        if !unsupported {
            return Ok(());
        }

        for i in (y - 1)..(grid.height() - 1) {
            let above = grid.get(x, i + 1)?;
            grid.set(x, i, above)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{BoundPolicy, Edge};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// A set with a single zero offset makes void movement deterministic.
    fn straight_up() -> SelectionSet<i32> {
        let mut set = SelectionSet::new();
        set.add(1.0, 0);
        set
    }

    fn sim_grid(width: i32, height: i32) -> CellGrid {
        let mut grid = CellGrid::with_size(width, height).unwrap();
        grid.set_bound_policy(Edge::Left, BoundPolicy::Wrap);
        grid.set_bound_policy(Edge::Right, BoundPolicy::Wrap);
        grid.set_bound_policy(Edge::Top, BoundPolicy::Ignore);
        grid.set_bound_policy(Edge::Bottom, BoundPolicy::Ignore);
        grid.fill(Cell::Air);
        grid
    }

    #[test]
    fn void_rises_exactly_one_row_per_pass() {
        let mut grid = sim_grid(3, 4);
        grid.set(1, 0, Cell::Void).unwrap();

        let engine = CaEngine::new(straight_up(), 0.0);
        let mut rng = StdRng::seed_from_u64(1);
        engine.sweep(&mut grid, &mut rng).unwrap();

        assert_eq!(grid.get(1, 1).unwrap(), Cell::Void);
        assert_eq!(grid.get(1, 0).unwrap(), Cell::Air);
        // No other cell may have been touched.
        let voids = grid
            .as_bytes()
            .iter()
            .filter(|&&b| b == Cell::Void.as_byte())
            .count();
        assert_eq!(voids, 1);
    }

    #[test]
    fn bottom_up_order_double_applies_the_void_rule() {
        // Identical setup to the passing case above; only the order differs.
        let mut grid = sim_grid(3, 4);
        grid.set(1, 0, Cell::Void).unwrap();

        let engine = CaEngine::new(straight_up(), 0.0);
        let mut rng = StdRng::seed_from_u64(1);
        engine
            .sweep_with_order(&mut grid, &mut rng, SweepOrder::BottomUp)
            .unwrap();

        // The void is re-visited after each swap and cascades all the way to
        // the top usable row in a single pass.
        assert_eq!(grid.get(1, 0).unwrap(), Cell::Air);
        assert_eq!(grid.get(1, 1).unwrap(), Cell::Air);
        assert_ne!(grid.get(1, 1).unwrap(), Cell::Void);
        assert_eq!(grid.get(1, 3).unwrap(), Cell::Void);
    }

    #[test]
    fn void_swaps_through_earth() {
        let mut grid = sim_grid(3, 3);
        grid.fill(Cell::Coal); // coal is inert and never settles
        grid.set(1, 1, Cell::Earth).unwrap();
        grid.set(1, 0, Cell::Void).unwrap();

        let engine = CaEngine::new(straight_up(), 0.0);
        let mut rng = StdRng::seed_from_u64(2);
        engine.sweep(&mut grid, &mut rng).unwrap();

        assert_eq!(grid.get(1, 1).unwrap(), Cell::Void);
        assert_eq!(grid.get(1, 0).unwrap(), Cell::Earth);
    }

    #[test]
    fn void_blocked_by_another_void_stays_put() {
        let mut grid = sim_grid(3, 3);
        grid.set(1, 0, Cell::Void).unwrap();
        grid.set(1, 1, Cell::StaticVoid).unwrap();

        let engine = CaEngine::new(straight_up(), 0.0);
        let mut rng = StdRng::seed_from_u64(3);
        engine.update_row(&mut grid, 0, &mut rng).unwrap();

        assert_eq!(grid.get(1, 0).unwrap(), Cell::Void);
        assert_eq!(grid.get(1, 1).unwrap(), Cell::StaticVoid);
    }

    #[test]
    fn kill_bubble_collapses_void_in_place() {
        let mut grid = sim_grid(3, 3);
        grid.set(1, 0, Cell::Void).unwrap();

        let engine = CaEngine::new(straight_up(), 1.0);
        let mut rng = StdRng::seed_from_u64(4);
        engine.sweep(&mut grid, &mut rng).unwrap();

        assert_eq!(grid.get(1, 0).unwrap(), Cell::StaticVoid);
        assert_eq!(grid.get(1, 1).unwrap(), Cell::Air);
    }

    #[test]
    fn drill_relocates_onto_forward_coal_first() {
        let mut grid = sim_grid(3, 3);
        grid.fill(Cell::Coal);
        grid.set(1, 1, Cell::Drill).unwrap();

        let engine = CaEngine::new(straight_up(), 0.0);
        let mut rng = StdRng::seed_from_u64(5);
        engine.update_row(&mut grid, 1, &mut rng).unwrap();

        assert_eq!(grid.get(1, 1).unwrap(), Cell::Void);
        assert_eq!(grid.get(2, 1).unwrap(), Cell::Drill);
        assert_eq!(grid.get(0, 1).unwrap(), Cell::Coal);
    }

    #[test]
    fn drill_without_coal_is_extinguished() {
        let mut grid = sim_grid(3, 3);
        grid.set(1, 1, Cell::Drill).unwrap();

        let engine = CaEngine::new(straight_up(), 0.0);
        let mut rng = StdRng::seed_from_u64(6);
        engine.sweep(&mut grid, &mut rng).unwrap();

        // The drill becomes a void (which may then rise) and is not
        // recreated anywhere in the same pass.
        let drills = grid
            .as_bytes()
            .iter()
            .filter(|&&b| b == Cell::Drill.as_byte())
            .count();
        assert_eq!(drills, 0);
    }

    #[test]
    fn undermined_earth_settles_one_row() {
        let mut grid = sim_grid(3, 5);
        // A column of earth at x=1 above an air gap at y=1; the gap's
        // neighbors are air, so the column is unsupported.
        for y in 2..5 {
            grid.set(1, y, Cell::Earth).unwrap();
        }
        grid.set(1, 0, Cell::Earth).unwrap();

        let engine = CaEngine::new(straight_up(), 0.0);
        engine.update_earth(&mut grid, 1, 2).unwrap();

        // Everything from y=1 upward shifted down by one.
        assert_eq!(grid.get(1, 1).unwrap(), Cell::Earth);
        assert_eq!(grid.get(1, 2).unwrap(), Cell::Earth);
        assert_eq!(grid.get(1, 3).unwrap(), Cell::Earth);
        assert_eq!(grid.get(1, 4).unwrap(), Cell::Earth);
    }

    #[test]
    fn supported_earth_does_not_settle() {
        let mut grid = sim_grid(3, 4);
        grid.fill(Cell::Earth);
        grid.set(1, 1, Cell::Air).unwrap(); // open below, but fully walled in

        let engine = CaEngine::new(straight_up(), 0.0);
        engine.update_earth(&mut grid, 1, 2).unwrap();

        assert_eq!(grid.get(1, 1).unwrap(), Cell::Air);
        assert_eq!(grid.get(1, 2).unwrap(), Cell::Earth);
        assert_eq!(grid.get(1, 3).unwrap(), Cell::Earth);
    }
}
