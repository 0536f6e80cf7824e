// Player commands derived from input snapshots.
//
// The relay only forwards raw input. Every client turns the same snapshot
// into the same commands here, which is what keeps the sims in lockstep:
// - left-button release selects. A drag whose screen box is at least
//   `selection_box_min_area` is a box select, anything smaller is a click on
//   the cell under the cursor. Holding left shift adds to the selection
//   instead of replacing it.
// - right-button release orders the selection to the cell under the cursor.
//   Whether that is a move or an attack is decided by `Units`, which knows
//   what stands on the cell.
//
// A snapshot with both releases yields the select first, then the order.
//
// See also: `units.rs` (`apply_packet`) which executes these.

use empires_protocol::{InputFlags, Snapshot};
use smallvec::SmallVec;

use crate::config::SimConfig;
use crate::grid::Grid;
use crate::types::Point;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectArea {
    /// Screen rectangle, inclusive. Units are tested by their projected
    /// position under the same camera.
    Box {
        min: Point,
        max: Point,
        pan: Point,
        resolution: Point,
    },
    Click { cell: Point },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Select { area: SelectArea, additive: bool },
    Order { cell: Point },
}

pub fn interpret(snapshot: &Snapshot, grid: &Grid, config: &SimConfig) -> SmallVec<[Command; 2]> {
    let mut commands = SmallVec::new();
    let flags = snapshot.flags;
    let cursor_cell = grid.cart_to_cell(grid.screen_to_cart(
        snapshot.cursor,
        snapshot.pan,
        snapshot.resolution,
    ));

    if flags.contains(InputFlags::MOUSE_LU) {
        let (a, b) = (snapshot.selection_a, snapshot.selection_b);
        let min = Point::new(a.x.min(b.x), a.y.min(b.y));
        let max = Point::new(a.x.max(b.x), a.y.max(b.y));
        let width = i64::from(max.x) - i64::from(min.x);
        let height = i64::from(max.y) - i64::from(min.y);
        let area = if width.saturating_mul(height) >= config.selection_box_min_area {
            SelectArea::Box {
                min,
                max,
                pan: snapshot.pan,
                resolution: snapshot.resolution,
            }
        } else {
            SelectArea::Click { cell: cursor_cell }
        };
        commands.push(Command::Select {
            area,
            additive: flags.contains(InputFlags::LEFT_SHIFT),
        });
    }

    if flags.contains(InputFlags::MOUSE_RU) {
        commands.push(Command::Order { cell: cursor_cell });
    }

    commands
}
