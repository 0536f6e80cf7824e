// Per-color shared knowledge: explored cells and researched technologies.
//
// Exploration is a bit per cell, set whenever a unit of that color has the
// cell inside its view radius, and never cleared. Setting bits commutes, so
// the result does not depend on the order units are visited in.

use serde::{Deserialize, Serialize};

use crate::grid::Grid;
use crate::types::Point;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    /// One bit per cell, row-major.
    explored: Vec<u64>,
    /// Researched technology bits.
    pub tech: u32,
}

impl Share {
    pub fn new(grid: &Grid) -> Self {
        Self {
            explored: vec![0; grid.cell_count().div_ceil(64)],
            tech: 0,
        }
    }

    pub fn is_explored(&self, grid: &Grid, cell: Point) -> bool {
        grid.cell_index(cell)
            .is_some_and(|i| self.explored.get(i / 64).is_some_and(|w| w & (1 << (i % 64)) != 0))
    }

    /// Mark every cell within `radius` (square) of `center` as explored.
    pub fn explore(&mut self, grid: &Grid, center: Point, radius: i32) {
        for y in center.y - radius..=center.y + radius {
            for x in center.x - radius..=center.x + radius {
                if let Some(i) = grid.cell_index(Point::new(x, y))
                    && let Some(word) = self.explored.get_mut(i / 64)
                {
                    *word |= 1 << (i % 64);
                }
            }
        }
    }

    pub fn explored_count(&self) -> u32 {
        self.explored.iter().map(|w| w.count_ones()).sum()
    }

    pub fn has_tech(&self, bit: u32) -> bool {
        bit < 32 && self.tech & (1 << bit) != 0
    }

    pub fn grant_tech(&mut self, bit: u32) {
        if bit < 32 {
            self.tech |= 1 << bit;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explore_marks_square_and_clips_to_map() {
        let grid = Grid::new(16, 64, 32);
        let mut share = Share::new(&grid);
        share.explore(&grid, Point::new(0, 0), 1);
        // Only the in-map quarter of the 3x3 square.
        assert_eq!(share.explored_count(), 4);
        assert!(share.is_explored(&grid, Point::new(1, 1)));
        assert!(!share.is_explored(&grid, Point::new(2, 0)));
        assert!(!share.is_explored(&grid, Point::new(-1, 0)));
    }

    #[test]
    fn explore_is_idempotent() {
        let grid = Grid::new(16, 64, 32);
        let mut share = Share::new(&grid);
        share.explore(&grid, Point::new(8, 8), 2);
        share.explore(&grid, Point::new(8, 8), 2);
        assert_eq!(share.explored_count(), 25);
    }

    #[test]
    fn tech_bits() {
        let mut share = Share::default();
        share.grant_tech(3);
        assert!(share.has_tech(3));
        assert!(!share.has_tech(4));
        share.grant_tech(40);
        assert_eq!(share.tech, 1 << 3);
    }
}
