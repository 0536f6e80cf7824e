// Core types shared across the simulation.
//
// Defines unit identifiers and the unit-kind descriptor table. The protocol
// value types (`Color`, `Point`) are re-exported so sim code can import every
// foundational type from one place.
//
// **Critical constraint: determinism.** Ids are handed out by `Units` from a
// counter that is part of the restore, never from a global or from time.

use serde::{Deserialize, Serialize};
use std::fmt;

pub use empires_protocol::{COLOR_COUNT, Color, Point};

/// Stable identity of a unit. Unlike the population index, an id never
/// changes when other units are removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub u32);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a unit is. The kind selects an entry of the descriptor table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnitKind {
    Villager,
    Militia,
    Spearman,
    Scout,
}

/// Static per-kind numbers. Speeds are in velocity units (see
/// `SimConfig::velocity_divisor`), view radius in cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KindData {
    pub max_speed: i32,
    pub accel: i32,
    pub health: i32,
    pub attack: i32,
    pub view_radius: i32,
}

impl UnitKind {
    pub const ALL: [UnitKind; 4] = [
        UnitKind::Villager,
        UnitKind::Militia,
        UnitKind::Spearman,
        UnitKind::Scout,
    ];

    pub const fn data(self) -> KindData {
        match self {
            UnitKind::Villager => KindData {
                max_speed: 80,
                accel: 20,
                health: 25,
                attack: 1,
                view_radius: 4,
            },
            UnitKind::Militia => KindData {
                max_speed: 90,
                accel: 20,
                health: 40,
                attack: 2,
                view_radius: 4,
            },
            UnitKind::Spearman => KindData {
                max_speed: 100,
                accel: 25,
                health: 45,
                attack: 2,
                view_radius: 4,
            },
            UnitKind::Scout => KindData {
                max_speed: 140,
                accel: 30,
                health: 45,
                attack: 1,
                view_radius: 8,
            },
        }
    }

    /// Stable small integer for checksumming.
    pub const fn code(self) -> u8 {
        self as u8
    }
}
