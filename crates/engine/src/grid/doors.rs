use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::Tile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoorState {
    Open,
    Closed,
}

impl DoorState {
    pub fn from_open(open: bool) -> Self {
        if open {
            Self::Open
        } else {
            Self::Closed
        }
    }

    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Open => Self::Closed,
            Self::Closed => Self::Open,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DoorError {
    #[error("no door registered at {tile}")]
    NoDoor { tile: Tile },
}

/// Door states keyed by map-relative tile. Single writer (door interaction),
/// many readers (every walkability query).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DoorRegistry {
    doors: HashMap<Tile, DoorState>,
}

impl DoorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a door. A second door on the same tile replaces the first.
    pub fn register(&mut self, tile: Tile, state: DoorState) -> Option<DoorState> {
        let previous = self.doors.insert(tile, state);
        if previous.is_some() {
            warn!(tile = %tile, "duplicate_door_registration_overwritten");
        }
        previous
    }

    pub fn unregister(&mut self, tile: Tile) -> Option<DoorState> {
        self.doors.remove(&tile)
    }

    pub fn door_at(&self, tile: Tile) -> Option<DoorState> {
        self.doors.get(&tile).copied()
    }

    /// Returns whether the stored state actually changed.
    pub fn set_open(&mut self, tile: Tile, open: bool) -> Result<bool, DoorError> {
        let state = self
            .doors
            .get_mut(&tile)
            .ok_or(DoorError::NoDoor { tile })?;
        let next = DoorState::from_open(open);
        if *state == next {
            return Ok(false);
        }
        *state = next;
        debug!(tile = %tile, open, "door_state_changed");
        Ok(true)
    }

    pub fn toggle(&mut self, tile: Tile) -> Result<DoorState, DoorError> {
        let state = self
            .doors
            .get_mut(&tile)
            .ok_or(DoorError::NoDoor { tile })?;
        *state = state.toggled();
        debug!(tile = %tile, open = state.is_open(), "door_state_changed");
        Ok(*state)
    }

    pub fn len(&self) -> usize {
        self.doors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doors.is_empty()
    }

    pub fn sorted_doors(&self) -> Vec<(Tile, DoorState)> {
        let mut doors = self
            .doors
            .iter()
            .map(|(tile, state)| (*tile, *state))
            .collect::<Vec<_>>();
        doors.sort_by_key(|(tile, _)| (tile.y, tile.x));
        doors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_flips_and_missing_door_errors() {
        let mut doors = DoorRegistry::new();
        let tile = Tile::new(2, 0);
        doors.register(tile, DoorState::Closed);

        assert_eq!(doors.toggle(tile), Ok(DoorState::Open));
        assert_eq!(doors.door_at(tile), Some(DoorState::Open));
        assert_eq!(
            doors.toggle(Tile::new(9, 9)),
            Err(DoorError::NoDoor {
                tile: Tile::new(9, 9)
            })
        );
    }

    #[test]
    fn set_open_reports_change_only_once() {
        let mut doors = DoorRegistry::new();
        let tile = Tile::new(0, 3);
        doors.register(tile, DoorState::Closed);

        assert_eq!(doors.set_open(tile, true), Ok(true));
        assert_eq!(doors.set_open(tile, true), Ok(false));
    }

    #[test]
    fn duplicate_registration_last_writer_wins() {
        let mut doors = DoorRegistry::new();
        let tile = Tile::new(1, 1);
        assert_eq!(doors.register(tile, DoorState::Closed), None);
        assert_eq!(doors.register(tile, DoorState::Open), Some(DoorState::Closed));
        assert_eq!(doors.door_at(tile), Some(DoorState::Open));
        assert_eq!(doors.len(), 1);
    }
}
