// Full population snapshot for resynchronizing a client.
//
// `Restore` carries everything `Units` needs to continue stepping in
// lockstep: units (with paths and orders), shared knowledge, the tick
// counter and every counter that feeds id and group assignment. It is
// serialized with serde_json and shipped inside a protocol restore frame.
//
// Derived data (the id index, per-cell stacks) is not stored; `Units`
// rebuilds it on apply. Hit flashes are not stored either.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::share::Share;
use crate::types::{COLOR_COUNT, UnitId};
use crate::unit::Unit;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restore {
    pub cycles: u64,
    /// Cells per map edge the restore was taken on.
    pub grid_size: i32,
    pub units: Vec<Unit>,
    pub share: [Share; COLOR_COUNT],
    pub next_id: u32,
    pub next_command_group: u32,
    pub repath_index: usize,
}

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("restore encoding: {0}")]
    Json(#[from] serde_json::Error),
    #[error("restore was taken on a {got}-cell map, this map has {expected}")]
    GridMismatch { expected: i32, got: i32 },
    #[error("restore holds {got} units, the population limit is {max}")]
    TooMany { got: usize, max: usize },
    #[error("restore holds unit {0} twice")]
    DuplicateId(UnitId),
}

impl Restore {
    pub fn to_bytes(&self) -> Result<Vec<u8>, RestoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RestoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            Restore::from_bytes(b"not json {{"),
            Err(RestoreError::Json(_))
        ));
    }

    #[test]
    fn rejects_wrong_schema() {
        assert!(Restore::from_bytes(br#"{"cycles": "soon"}"#).is_err());
    }
}
