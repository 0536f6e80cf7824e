// empires_sim — deterministic unit simulation for lockstep multiplayer.
//
// Every client runs this crate on the same stream of relayed input packets
// and must arrive at bit-identical state. Clients compare the per-tick
// checksum (`Units::step` returns it; it is echoed to peers in each
// snapshot's `parity`) to detect divergence, and a diverged client is
// resynchronized with a `Restore`.
//
// Module overview:
// - `units.rs`:    `Units`, the population and the tick (commands,
//                  maintenance, parallel motion, checksum).
// - `unit.rs`:     `Unit` and its per-tick path following and motion.
// - `command.rs`:  Interpretation of input snapshots as select/order commands.
// - `grid.rs`:     Coordinate transforms (screen, iso, cart, grid point, cell).
// - `points.rs`:   `Points` path buffer and straight-line paths.
// - `share.rs`:    Per-color explored cells and technology bits.
// - `checksum.rs`: Per-unit digest and the order-independent fold.
// - `restore.rs`:  `Restore`, the full snapshot used to resync a client.
// - `config.rs`:   `SimConfig`, every tunable threshold.
// - `types.rs`:    `UnitId`, `UnitKind` and the re-exported protocol types.
//
// **Critical constraint: determinism.** No floating point anywhere in the
// step, no iteration over hash maps, no system time or entropy. Parallel
// work is split so that no unit reads state another unit writes in the same
// phase.

pub mod checksum;
pub mod command;
pub mod config;
pub mod grid;
pub mod points;
pub mod restore;
pub mod share;
pub mod types;
pub mod unit;
pub mod units;

pub use config::SimConfig;
pub use grid::{GRID_CELL_SIZE, Grid};
pub use points::Points;
pub use restore::{Restore, RestoreError};
pub use types::{Color, Point, UnitId, UnitKind};
pub use unit::Unit;
pub use units::Units;
