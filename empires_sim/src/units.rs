// The unit population and the deterministic tick.
//
// `Units` owns every unit plus the indexes built over them, the per-color
// shared knowledge, and the counters that feed id and group assignment.
// One call to `step` advances the population by one tick:
//
// 1. Command application: every occupied slot of the packet, in slot order,
//    is interpreted (`command.rs`) and executed. Selections and orders only
//    touch units of the slot's own color.
// 2. Maintenance (sequential): compact away units killed last tick, tick
//    hit flashes, track and repath stalled units within `repath_budget`
//    (rolling from `repath_index`), update attack pursuit, resolve melee
//    from start-of-tick positions and health, and mark explored cells.
// 3. Path following and motion (parallel): the population is split into
//    `cpu_count` contiguous ranges, each stepped on the rayon pool. A unit
//    only mutates itself; its separation push is computed from a copy of
//    every unit's start-of-tick position, so the result is the same for any
//    split.
// 4. The checksum: XOR of per-unit digests (`checksum.rs`).
//
// Indexes:
// - `index` maps `UnitId` to the unit's current position in `units`. Rebuilt
//   whenever units are removed.
// - `stacks` holds, per cell, the indices of the units standing on it, in
//   index order. Rebuilt after motion and after removals, so during command
//   application it reflects where units are.
//
// **Critical constraint: determinism.** No hash-map iteration order is ever
// observed (the id index is only used for point lookups), all arithmetic is
// integer, and every sequential pass runs in index order.

use empires_protocol::Packet;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::{debug, info, trace};

use crate::checksum;
use crate::command::{self, Command, SelectArea};
use crate::config::SimConfig;
use crate::grid::Grid;
use crate::points::Points;
use crate::restore::{Restore, RestoreError};
use crate::share::Share;
use crate::types::{COLOR_COUNT, Color, Point, UnitId, UnitKind};
use crate::unit::Unit;

type Stack = SmallVec<[u32; 4]>;

/// Settling offsets inside the destination cell, by position in the order.
const FORMATION: [Point; 9] = [
    Point::new(0, 0),
    Point::new(30, 0),
    Point::new(-30, 0),
    Point::new(0, 30),
    Point::new(0, -30),
    Point::new(30, 30),
    Point::new(-30, -30),
    Point::new(30, -30),
    Point::new(-30, 30),
];

fn formation_offset(n: usize) -> Point {
    FORMATION[n % FORMATION.len()]
}

#[derive(Clone, Debug)]
pub struct Units {
    units: Vec<Unit>,
    index: FxHashMap<UnitId, usize>,
    stacks: Vec<Stack>,
    share: [Share; COLOR_COUNT],
    grid: Grid,
    config: SimConfig,
    max: usize,
    cpu_count: usize,
    repath_index: usize,
    next_id: u32,
    next_command_group: u32,
    cycles: u64,
}

impl Units {
    /// An empty population for `grid`, holding at most `max` units and
    /// stepping motion over `cpu_count` ranges.
    pub fn new(grid: Grid, config: SimConfig, max: usize, cpu_count: usize) -> Self {
        Self {
            units: Vec::with_capacity(max),
            index: FxHashMap::default(),
            stacks: vec![Stack::new(); grid.cell_count()],
            share: std::array::from_fn(|_| Share::new(&grid)),
            grid,
            config,
            max,
            cpu_count: cpu_count.max(1),
            repath_index: 0,
            next_id: 0,
            next_command_group: 0,
            cycles: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.units.len()
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn capacity(&self) -> usize {
        self.units.capacity()
    }

    pub fn cpu_count(&self) -> usize {
        self.cpu_count
    }

    /// The motion split never changes the result, so this can be changed
    /// at any time.
    pub fn set_cpu_count(&mut self, cpu_count: usize) {
        self.cpu_count = cpu_count.max(1);
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn get(&self, id: UnitId) -> Option<&Unit> {
        self.index.get(&id).and_then(|&i| self.units.get(i))
    }

    pub fn share(&self, color: Color) -> &Share {
        &self.share[color.index()]
    }

    pub fn share_mut(&mut self, color: Color) -> &mut Share {
        &mut self.share[color.index()]
    }

    pub fn count_color(&self, color: Color) -> usize {
        self.units.iter().filter(|u| u.color == color).count()
    }

    pub fn selected(&self, color: Color) -> impl Iterator<Item = &Unit> {
        self.units
            .iter()
            .filter(move |u| u.color == color && u.selected)
    }

    /// Units standing on `cell`, in index order.
    pub fn units_at(&self, cell: Point) -> impl Iterator<Item = &Unit> {
        self.grid
            .cell_index(cell)
            .and_then(|i| self.stacks.get(i))
            .into_iter()
            .flat_map(|stack| stack.iter())
            .filter_map(|&i| self.units.get(i as usize))
    }

    // -----------------------------------------------------------------------
    // Population management (between ticks)
    // -----------------------------------------------------------------------

    /// Add a unit at the center of `cell`. `None` if the population is full
    /// or the cell is off the map.
    pub fn spawn(&mut self, color: Color, kind: UnitKind, cell: Point) -> Option<UnitId> {
        if self.units.len() >= self.max {
            return None;
        }
        let slot = self.grid.cell_index(cell)?;
        let id = UnitId(self.next_id);
        self.next_id += 1;
        let index = self.units.len();
        self.units.push(Unit::new(id, color, kind, cell, &self.grid));
        self.index.insert(id, index);
        self.stacks[slot].push(index as u32);
        Some(id)
    }

    /// Remove a unit, keeping the order of the others.
    pub fn remove(&mut self, id: UnitId) -> Option<Unit> {
        let i = self.index.get(&id).copied()?;
        let unit = self.units.remove(i);
        self.reindex();
        self.restack();
        Some(unit)
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (i, unit) in self.units.iter().enumerate() {
            self.index.insert(unit.id, i);
        }
    }

    fn restack(&mut self) {
        for stack in &mut self.stacks {
            stack.clear();
        }
        for (i, unit) in self.units.iter().enumerate() {
            if let Some(c) = self.grid.cell_index(unit.cell) {
                self.stacks[c].push(i as u32);
            }
        }
    }

    // -----------------------------------------------------------------------
    // The tick
    // -----------------------------------------------------------------------

    /// Advance one tick with `packet` as the tick's input and return the
    /// resulting checksum.
    pub fn step(&mut self, packet: &Packet) -> u64 {
        self.apply_packet(packet);
        self.caretake();
        self.float();
        self.cycles += 1;
        self.xor()
    }

    /// Order-independent checksum of the whole population.
    pub fn xor(&self) -> u64 {
        self.units
            .par_iter()
            .map(checksum::unit_digest)
            .reduce(|| 0, |a, b| a ^ b)
    }

    pub fn apply_packet(&mut self, packet: &Packet) {
        for (color, snapshot) in packet.commands() {
            if !snapshot.is_command() {
                continue;
            }
            for command in command::interpret(snapshot, &self.grid, &self.config) {
                match command {
                    Command::Select { area, additive } => self.select(color, area, additive),
                    Command::Order { cell } => self.order(color, cell),
                }
            }
        }
    }

    fn first_at(&self, cell: Point, pred: impl Fn(&Unit) -> bool) -> Option<usize> {
        let stack = self.stacks.get(self.grid.cell_index(cell)?)?;
        stack
            .iter()
            .map(|&i| i as usize)
            .find(|&i| self.units.get(i).is_some_and(|u| u.is_alive() && pred(u)))
    }

    fn select(&mut self, color: Color, area: SelectArea, additive: bool) {
        if !additive {
            for unit in self.units.iter_mut().filter(|u| u.color == color) {
                unit.selected = false;
            }
        }
        match area {
            SelectArea::Box {
                min,
                max,
                pan,
                resolution,
            } => {
                let grid = self.grid;
                for unit in self.units.iter_mut() {
                    if unit.color != color || !unit.is_alive() {
                        continue;
                    }
                    let p = grid.cart_to_screen(unit.cart, pan, resolution);
                    if (min.x..=max.x).contains(&p.x) && (min.y..=max.y).contains(&p.y) {
                        unit.selected = true;
                    }
                }
            }
            SelectArea::Click { cell } => {
                if let Some(i) = self.first_at(cell, |u| u.color == color) {
                    self.units[i].selected = true;
                }
            }
        }
    }

    /// Send the selection of `color` to `cell`. An enemy standing on the cell
    /// turns the move into an attack on it.
    fn order(&mut self, color: Color, cell: Point) {
        if !self.grid.contains_cell(cell) {
            return;
        }
        let chosen: Vec<usize> = self
            .units
            .iter()
            .enumerate()
            .filter(|(_, u)| u.color == color && u.selected && u.is_alive())
            .map(|(i, _)| i)
            .collect();
        if chosen.is_empty() {
            return;
        }
        let target = self
            .first_at(cell, |u| u.color != color)
            .map(|i| self.units[i].id);
        let group = self.next_command_group;
        self.next_command_group = self.next_command_group.wrapping_add(1);

        let grid = self.grid;
        for (n, &i) in chosen.iter().enumerate() {
            let unit = &mut self.units[i];
            unit.command_group = Some(group);
            unit.target = target;
            let cells = Points::path_straight(unit.cell, cell);
            unit.set_path(&cells, formation_offset(n), &grid);
        }
        debug!(%color, group, %cell, units = chosen.len(), attack = target.is_some(), "order issued");
    }

    fn caretake(&mut self) {
        self.compact();
        for unit in &mut self.units {
            unit.tick_flash();
            unit.track_stall();
        }
        self.repath_stalled();
        self.pursue();
        self.melee();
        self.explore();
    }

    fn compact(&mut self) {
        let before = self.units.len();
        self.units.retain(Unit::is_alive);
        let removed = before - self.units.len();
        if removed > 0 {
            debug!(removed, remaining = self.units.len(), "removed dead units");
            self.reindex();
            self.restack();
        }
    }

    fn repath_stalled(&mut self) {
        let n = self.units.len();
        let budget = self.config.repath_budget;
        if n == 0 || budget == 0 {
            return;
        }
        let timeout = self.config.pathing_timeout_cycles;
        let start = self.repath_index % n;
        let mut done = 0;
        for k in 0..n {
            let i = (start + k) % n;
            if self.units[i].is_stalled(timeout) {
                self.units[i].repath(&self.grid);
                done += 1;
                if done == budget {
                    self.repath_index = (i + 1) % n;
                    break;
                }
            }
        }
        if done > 0 {
            trace!(done, "repathed stalled units");
        }
    }

    fn pursue(&mut self) {
        enum Pursuit {
            Drop,
            Hold,
            Chase(Point),
        }

        let melee = self.config.melee_distance;
        let grid = self.grid;
        let plans: Vec<(usize, Pursuit)> = self
            .units
            .iter()
            .enumerate()
            .filter_map(|(i, unit)| {
                let id = unit.target?;
                let target = self
                    .index
                    .get(&id)
                    .and_then(|&j| self.units.get(j))
                    .filter(|t| t.is_alive());
                let plan = match target {
                    None => Pursuit::Drop,
                    Some(t) if (t.grid_point - unit.grid_point).mag() <= melee => {
                        if unit.destination.is_none() {
                            return None;
                        }
                        Pursuit::Hold
                    }
                    Some(t) => {
                        let heading = unit.destination.map(|d| grid.grid_point_to_cell(d));
                        if heading == Some(t.cell) {
                            return None;
                        }
                        Pursuit::Chase(t.cell)
                    }
                };
                Some((i, plan))
            })
            .collect();

        for (i, plan) in plans {
            let unit = &mut self.units[i];
            match plan {
                Pursuit::Drop => unit.target = None,
                Pursuit::Hold => unit.clear_path(),
                Pursuit::Chase(cell) => {
                    let cells = Points::path_straight(unit.cell, cell);
                    let offset = unit.cart_grid_offset_goal;
                    unit.set_path(&cells, offset, &grid);
                }
            }
        }
    }

    /// Every attacker in range hits its target. Damage is summed from
    /// start-of-tick state before any of it is applied.
    fn melee(&mut self) {
        let melee = self.config.melee_distance;
        let mut damage = vec![0i32; self.units.len()];
        for unit in &self.units {
            if !unit.is_alive() {
                continue;
            }
            let Some(j) = unit.target.and_then(|id| self.index.get(&id).copied()) else {
                continue;
            };
            let victim = &self.units[j];
            if victim.is_alive() && (victim.grid_point - unit.grid_point).mag() <= melee {
                damage[j] += unit.kind.data().attack;
            }
        }
        let flash = self.config.flash_cycles;
        for (unit, amount) in self.units.iter_mut().zip(damage) {
            unit.take_damage(amount, flash);
            if amount > 0 && !unit.is_alive() {
                debug!(id = %unit.id, color = %unit.color, "unit killed");
            }
        }
    }

    fn explore(&mut self) {
        for unit in &self.units {
            let radius = unit.kind.data().view_radius;
            self.share[unit.color.index()].explore(&self.grid, unit.cell, radius);
        }
    }

    fn float(&mut self) {
        let n = self.units.len();
        if n == 0 {
            return;
        }
        let bodies: Vec<Body> = self.units.iter().map(Body::of).collect();
        let chunk = n.div_ceil(self.cpu_count);
        let Units {
            units,
            stacks,
            grid,
            config,
            ..
        } = self;
        let (grid, config) = (&*grid, &*config);
        let neighbours = Neighbours {
            bodies: &bodies,
            stacks: stacks.as_slice(),
            grid,
            config,
        };
        units
            .par_chunks_mut(chunk)
            .enumerate()
            .for_each(|(c, slice)| {
                for (k, unit) in slice.iter_mut().enumerate() {
                    if !unit.is_alive() {
                        unit.velocity = Point::ZERO;
                        continue;
                    }
                    let stress = neighbours.stress(c * chunk + k);
                    unit.flow(config, stress);
                    unit.integrate(grid, config);
                }
            });
        self.restack();
    }

    // -----------------------------------------------------------------------
    // Restore
    // -----------------------------------------------------------------------

    pub fn pack_restore(&self) -> Restore {
        Restore {
            cycles: self.cycles,
            grid_size: self.grid.size,
            units: self
                .units
                .iter()
                .map(|u| Unit {
                    flash_cycles: 0,
                    ..u.clone()
                })
                .collect(),
            share: self.share.clone(),
            next_id: self.next_id,
            next_command_group: self.next_command_group,
            repath_index: self.repath_index,
        }
    }

    /// Replace the whole population with `restore`. On error nothing is
    /// changed.
    pub fn apply_restore(&mut self, restore: Restore) -> Result<(), RestoreError> {
        if restore.grid_size != self.grid.size {
            return Err(RestoreError::GridMismatch {
                expected: self.grid.size,
                got: restore.grid_size,
            });
        }
        if restore.units.len() > self.max {
            return Err(RestoreError::TooMany {
                got: restore.units.len(),
                max: self.max,
            });
        }
        let mut index = FxHashMap::default();
        for (i, unit) in restore.units.iter().enumerate() {
            if index.insert(unit.id, i).is_some() {
                return Err(RestoreError::DuplicateId(unit.id));
            }
        }

        self.units = restore.units;
        for unit in &mut self.units {
            unit.flash_cycles = 0;
            unit.sync(&self.grid);
        }
        self.index = index;
        self.share = restore.share;
        self.next_id = restore.next_id;
        self.next_command_group = restore.next_command_group;
        self.repath_index = restore.repath_index;
        self.cycles = restore.cycles;
        self.restack();
        info!(cycles = self.cycles, units = self.units.len(), "restore applied");
        Ok(())
    }

    pub fn apply_restore_bytes(&mut self, bytes: &[u8]) -> Result<(), RestoreError> {
        self.apply_restore(Restore::from_bytes(bytes)?)
    }
}

/// Start-of-tick copy of what neighbours need to see of a unit.
#[derive(Clone, Copy)]
struct Body {
    id: UnitId,
    grid_point: Point,
    cell: Point,
    alive: bool,
}

impl Body {
    fn of(unit: &Unit) -> Self {
        Self {
            id: unit.id,
            grid_point: unit.grid_point,
            cell: unit.cell,
            alive: unit.is_alive(),
        }
    }
}

struct Neighbours<'a> {
    bodies: &'a [Body],
    stacks: &'a [Stack],
    grid: &'a Grid,
    config: &'a SimConfig,
}

impl Neighbours<'_> {
    /// Separation push on unit `i` from at most `cohesion_count` live
    /// neighbours closer than `stressor_deadzone`, scanning the 3x3 block of
    /// cells around it row by row.
    fn stress(&self, i: usize) -> Point {
        let me = self.bodies[i];
        let deadzone = self.config.stressor_deadzone;
        let mut force = Point::ZERO;
        let mut counted = 0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                let Some(c) = self.grid.cell_index(me.cell + Point::new(dx, dy)) else {
                    continue;
                };
                for &j in &self.stacks[c] {
                    let j = j as usize;
                    let Some(other) = self.bodies.get(j) else {
                        continue;
                    };
                    if j == i || !other.alive {
                        continue;
                    }
                    let delta = me.grid_point - other.grid_point;
                    let distance = delta.mag();
                    if distance >= deadzone {
                        continue;
                    }
                    if counted == self.config.cohesion_count {
                        return force;
                    }
                    counted += 1;
                    // Coincident units split along x, lower id to the left.
                    let away = match delta {
                        Point::ZERO if me.id < other.id => Point::new(-1, 0),
                        Point::ZERO => Point::new(1, 0),
                        d => d,
                    };
                    force = force + away.normalize(deadzone - distance);
                }
            }
        }
        force
    }
}
