// Data-driven simulation tunables.
//
// All thresholds the unit step compares against live in `SimConfig`. The sim
// never validates them: they are used as-is. Every client must run with an
// identical config, otherwise identical packets produce different states.
//
// Distances are in grid-point units (`grid::GRID_CELL_SIZE` per cell).
// Velocities are in grid-point units per tick multiplied by
// `velocity_divisor`, which gives sub-grid-point speed resolution without
// floating point.
//
// See also: `units.rs` for the step that reads these, `types.rs` for the
// per-kind speed/health table.

use serde::{Deserialize, Serialize};

/// Simulation tunables. Every field has a default, so a partial JSON object
/// is a valid config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// A unit stops re-steering once its offset to the next path point is
    /// inside this radius.
    pub alignment_deadzone: i32,
    /// Ticks a pathing unit may stay in the same cell before it is repathed.
    pub pathing_timeout_cycles: u32,
    /// Distance at which a path point counts as reached.
    pub goal_close_enough_mag: i32,
    /// Below this speed a unit with no path left is stopped and snapped.
    pub velocity_deadzone: i32,
    /// Velocity units per grid-point of movement.
    pub velocity_divisor: i32,
    /// Neighbours closer than this push each other apart.
    pub stressor_deadzone: i32,
    /// Maximum neighbours considered for separation.
    pub cohesion_count: usize,
    /// Attack range, center to center.
    pub melee_distance: i32,
    /// Ticks a unit flashes after being hit. Display only.
    pub flash_cycles: u8,
    /// Selection boxes with a smaller screen area count as a click.
    pub selection_box_min_area: i64,
    /// Maximum repaths per tick.
    pub repath_budget: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            alignment_deadzone: 5,
            pathing_timeout_cycles: 100,
            goal_close_enough_mag: 10,
            velocity_deadzone: 50,
            velocity_divisor: 10,
            stressor_deadzone: 40,
            cohesion_count: 10,
            melee_distance: 120,
            flash_cycles: 10,
            selection_box_min_area: 16,
            repath_budget: 32,
        }
    }
}

impl SimConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = SimConfig::from_json(r#"{"cohesion_count": 3}"#).unwrap();
        assert_eq!(config.cohesion_count, 3);
        assert_eq!(config.alignment_deadzone, SimConfig::default().alignment_deadzone);
    }

    #[test]
    fn json_roundtrip_preserves_config() {
        let config = SimConfig {
            melee_distance: 77,
            ..SimConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(SimConfig::from_json(&json).unwrap(), config);
    }
}
