// A single unit and its per-tick motion.
//
// A unit's authoritative position is `grid_point`; `cart`, `cell` and
// `cart_grid_offset` are derived from it after every move and are kept on
// the struct so the renderer and the population index can read them without
// recomputing.
//
// Motion happens in two stages, both called by `Units` during the parallel
// part of a step:
// - `flow`: advance past reached path points and steer toward the next one.
//   Steering is bounded by `accel`; the last point of a path is approached
//   with a speed proportional to the remaining distance so the unit arrives
//   instead of orbiting. A separation push computed by the caller from the
//   start-of-tick neighbour positions is added on top.
// - `integrate`: clamp to `max_speed`, stop and snap onto the destination
//   when the path is finished and the unit is slow, then move and clamp to
//   the map.
//
// Neither stage looks at any other unit, which is what lets the population
// run them over disjoint slices in parallel.

use serde::{Deserialize, Serialize};

use crate::config::SimConfig;
use crate::grid::Grid;
use crate::points::Points;
use crate::types::{Color, Point, UnitId, UnitKind};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub color: Color,
    pub kind: UnitKind,
    /// Position in grid points.
    pub grid_point: Point,
    pub cart: Point,
    pub cell: Point,
    /// Offset of `grid_point` from the center of `cell`.
    pub cart_grid_offset: Point,
    /// Where inside the destination cell this unit settles.
    pub cart_grid_offset_goal: Point,
    pub velocity: Point,
    pub max_speed: i32,
    pub accel: i32,
    pub health: i32,
    /// Path in grid points. `path_index` is the next point to reach.
    pub path: Points,
    pub path_index: usize,
    /// Final resting point of the current order, if any.
    pub destination: Option<Point>,
    pub selected: bool,
    /// Tag shared by every unit that received the same order.
    pub command_group: Option<u32>,
    pub target: Option<UnitId>,
    pub stalled_cycles: u32,
    pub stall_cell: Point,
    /// Hit feedback for the renderer. Not simulation state.
    #[serde(skip)]
    pub flash_cycles: u8,
}

impl Unit {
    /// A fresh unit standing at the center of `cell`.
    pub fn new(id: UnitId, color: Color, kind: UnitKind, cell: Point, grid: &Grid) -> Self {
        let data = kind.data();
        let grid_point = grid.cell_to_grid_point(cell);
        let mut unit = Self {
            id,
            color,
            kind,
            grid_point,
            cart: Point::ZERO,
            cell,
            cart_grid_offset: Point::ZERO,
            cart_grid_offset_goal: Point::ZERO,
            velocity: Point::ZERO,
            max_speed: data.max_speed,
            accel: data.accel,
            health: data.health,
            path: Points::new(),
            path_index: 0,
            destination: None,
            selected: false,
            command_group: None,
            target: None,
            stalled_cycles: 0,
            stall_cell: cell,
            flash_cycles: 0,
        };
        unit.sync(grid);
        unit
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    pub fn has_path(&self) -> bool {
        self.path_index < self.path.len()
    }

    pub fn next_point(&self) -> Option<Point> {
        self.path.get(self.path_index)
    }

    /// Recompute the derived position fields from `grid_point`.
    pub fn sync(&mut self, grid: &Grid) {
        self.cart = grid.grid_point_to_cart(self.grid_point);
        self.cell = grid.grid_point_to_cell(self.grid_point);
        self.cart_grid_offset = grid.offset_from_grid_point(self.grid_point);
    }

    /// Follow `cells` (first cell = where the unit stands) and settle at
    /// `offset_goal` from the center of the last one.
    pub fn set_path(&mut self, cells: &Points, offset_goal: Point, grid: &Grid) {
        let last = cells.len().saturating_sub(1);
        self.path = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let point = grid.cell_to_grid_point(cell);
                if i == last {
                    grid.clamp_grid_point(point + offset_goal)
                } else {
                    point
                }
            })
            .collect();
        self.path_index = usize::from(cells.len() > 1);
        self.destination = self.path.last();
        self.cart_grid_offset_goal = offset_goal;
        self.stalled_cycles = 0;
        self.stall_cell = self.cell;
    }

    /// Drop the current path and destination. The unit brakes to a stop.
    pub fn clear_path(&mut self) {
        self.path.clear();
        self.path_index = 0;
        self.destination = None;
        self.stalled_cycles = 0;
    }

    /// Replan a straight path from the current cell to the destination.
    pub fn repath(&mut self, grid: &Grid) {
        if let Some(destination) = self.destination {
            let goal = grid.grid_point_to_cell(destination);
            let cells = Points::path_straight(self.cell, goal);
            self.set_path(&cells, self.cart_grid_offset_goal, grid);
        }
    }

    pub fn track_stall(&mut self) {
        if self.has_path() && self.cell == self.stall_cell {
            self.stalled_cycles = self.stalled_cycles.saturating_add(1);
        } else {
            self.stalled_cycles = 0;
            self.stall_cell = self.cell;
        }
    }

    pub fn is_stalled(&self, timeout: u32) -> bool {
        self.has_path() && self.stalled_cycles >= timeout
    }

    pub fn take_damage(&mut self, amount: i32, flash_cycles: u8) {
        if amount > 0 {
            self.health -= amount;
            self.flash_cycles = flash_cycles;
        }
    }

    pub fn tick_flash(&mut self) {
        self.flash_cycles = self.flash_cycles.saturating_sub(1);
    }

    pub fn flow(&mut self, config: &SimConfig, stress: Point) {
        while let Some(next) = self.next_point() {
            if (next - self.grid_point).mag() > config.goal_close_enough_mag {
                break;
            }
            self.path_index += 1;
        }

        let steer = match self.next_point() {
            Some(next) => {
                let delta = next - self.grid_point;
                let distance = delta.mag();
                if distance <= config.alignment_deadzone {
                    Point::ZERO
                } else {
                    let speed = if self.path_index + 1 == self.path.len() {
                        let arrive = distance.saturating_mul(config.velocity_divisor) / 2;
                        self.max_speed.min(arrive)
                    } else {
                        self.max_speed
                    };
                    (delta.normalize(speed) - self.velocity).clamp_mag(self.accel)
                }
            }
            None => (-self.velocity).clamp_mag(self.accel),
        };
        self.velocity = self.velocity + steer + stress.clamp_mag(self.accel);
    }

    pub fn integrate(&mut self, grid: &Grid, config: &SimConfig) {
        self.velocity = self.velocity.clamp_mag(self.max_speed);
        if !self.has_path() && self.velocity.mag() < config.velocity_deadzone {
            self.velocity = Point::ZERO;
            if let Some(destination) = self.destination.take() {
                self.grid_point = destination;
            }
        }
        let step = self.velocity.div_by(config.velocity_divisor.max(1));
        self.grid_point = grid.clamp_grid_point(self.grid_point + step);
        self.sync(grid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Grid {
        Grid::new(32, 64, 32)
    }

    fn villager(cell: Point) -> Unit {
        Unit::new(UnitId(1), Color::Blue, UnitKind::Villager, cell, &grid())
    }

    fn run(unit: &mut Unit, ticks: usize) {
        let (g, config) = (grid(), SimConfig::default());
        for _ in 0..ticks {
            unit.flow(&config, Point::ZERO);
            unit.integrate(&g, &config);
        }
    }

    #[test]
    fn new_unit_sits_at_cell_center() {
        let unit = villager(Point::new(3, 4));
        assert_eq!(unit.grid_point, Point::new(350, 450));
        assert_eq!(unit.cell, Point::new(3, 4));
        assert_eq!(unit.cart_grid_offset, Point::ZERO);
        assert_eq!(unit.cart, grid().cell_to_cart(Point::new(3, 4)));
        assert_eq!(unit.health, UnitKind::Villager.data().health);
    }

    #[test]
    fn set_path_skips_the_starting_cell() {
        let g = grid();
        let mut unit = villager(Point::new(2, 2));
        let cells = Points::path_straight(Point::new(2, 2), Point::new(5, 2));
        unit.set_path(&cells, Point::new(10, -10), &g);
        assert_eq!(unit.path.len(), 4);
        assert_eq!(unit.path_index, 1);
        assert_eq!(unit.next_point(), Some(Point::new(350, 250)));
        assert_eq!(unit.destination, Some(Point::new(560, 240)));
    }

    #[test]
    fn unit_walks_to_destination_and_stops() {
        let g = grid();
        let mut unit = villager(Point::new(2, 2));
        let cells = Points::path_straight(Point::new(2, 2), Point::new(6, 5));
        unit.set_path(&cells, Point::ZERO, &g);
        run(&mut unit, 300);
        assert_eq!(unit.cell, Point::new(6, 5));
        assert_eq!(unit.grid_point, g.cell_to_grid_point(Point::new(6, 5)));
        assert_eq!(unit.velocity, Point::ZERO);
        assert!(!unit.has_path());
        assert_eq!(unit.destination, None);
    }

    #[test]
    fn idle_unit_stays_put() {
        let mut unit = villager(Point::new(7, 7));
        let before = unit.clone();
        run(&mut unit, 20);
        assert_eq!(unit, before);
    }

    #[test]
    fn speed_never_exceeds_max() {
        let g = grid();
        let mut unit = villager(Point::new(0, 0));
        let cells = Points::path_straight(Point::new(0, 0), Point::new(20, 20));
        unit.set_path(&cells, Point::ZERO, &g);
        let config = SimConfig::default();
        for _ in 0..100 {
            unit.flow(&config, Point::new(500, -500));
            unit.integrate(&g, &config);
            assert!(unit.velocity.mag() <= unit.max_speed);
        }
    }

    #[test]
    fn motion_is_clamped_to_the_map() {
        let g = grid();
        let config = SimConfig::default();
        let mut unit = villager(Point::new(0, 0));
        unit.velocity = Point::new(-80, -80);
        unit.path = [Point::new(-500, -500), Point::new(-600, -600)].into_iter().collect();
        for _ in 0..30 {
            unit.flow(&config, Point::ZERO);
            unit.integrate(&g, &config);
        }
        assert_eq!(unit.grid_point, Point::ZERO);
        assert_eq!(unit.cell, Point::ZERO);
    }

    #[test]
    fn stall_counter_tracks_time_in_one_cell() {
        let g = grid();
        let mut unit = villager(Point::new(2, 2));
        let cells = Points::path_straight(Point::new(2, 2), Point::new(9, 2));
        unit.set_path(&cells, Point::ZERO, &g);
        for _ in 0..5 {
            unit.track_stall();
        }
        assert_eq!(unit.stalled_cycles, 5);
        assert!(unit.is_stalled(5));
        unit.grid_point = g.cell_to_grid_point(Point::new(3, 2));
        unit.sync(&g);
        unit.track_stall();
        assert_eq!(unit.stalled_cycles, 0);
    }

    #[test]
    fn repath_keeps_destination() {
        let g = grid();
        let mut unit = villager(Point::new(2, 2));
        let cells = Points::path_straight(Point::new(2, 2), Point::new(9, 2));
        unit.set_path(&cells, Point::new(20, 0), &g);
        let destination = unit.destination;
        unit.grid_point = g.cell_to_grid_point(Point::new(4, 6));
        unit.sync(&g);
        unit.repath(&g);
        assert_eq!(unit.destination, destination);
        assert_eq!(unit.path.get(0), Some(g.cell_to_grid_point(Point::new(4, 6))));
    }

    #[test]
    fn damage_sets_flash() {
        let mut unit = villager(Point::new(1, 1));
        unit.take_damage(3, 10);
        assert_eq!(unit.health, UnitKind::Villager.data().health - 3);
        assert_eq!(unit.flash_cycles, 10);
        unit.tick_flash();
        assert_eq!(unit.flash_cycles, 9);
        unit.take_damage(0, 10);
        assert_eq!(unit.flash_cycles, 9);
    }
}
