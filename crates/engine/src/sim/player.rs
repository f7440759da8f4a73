use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::Simulation;
use crate::clock::PacedAdvanceId;
use crate::events::SimEvent;
use crate::grid::{Direction, DoorError, DoorState, GridIndex, Tile, NEIGHBOR_ORDER};
use crate::path::find_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub move_cost_minutes: u32,
    pub encumbered_move_cost_minutes: u32,
    pub door_open_cost_minutes: u32,
    pub door_open_interval_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            move_cost_minutes: 1,
            encumbered_move_cost_minutes: 2,
            door_open_cost_minutes: 6,
            door_open_interval_ms: 500,
        }
    }
}

impl PlayerConfig {
    pub fn door_open_interval(&self) -> Duration {
        Duration::from_millis(self.door_open_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerState {
    tile: Tile,
    encumbered: bool,
    pending_action: Option<PacedAdvanceId>,
    config: PlayerConfig,
}

impl PlayerState {
    pub(crate) fn new(tile: Tile, config: PlayerConfig) -> Self {
        Self {
            tile,
            encumbered: false,
            pending_action: None,
            config,
        }
    }

    pub fn tile(&self) -> Tile {
        self.tile
    }

    pub fn is_encumbered(&self) -> bool {
        self.encumbered
    }

    /// Busy while a timed action (opening a door) is still running.
    pub fn is_busy(&self) -> bool {
        self.pending_action.is_some()
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn move_cost_minutes(&self) -> u32 {
        if self.encumbered {
            self.config.encumbered_move_cost_minutes
        } else {
            self.config.move_cost_minutes
        }
    }

    pub(super) fn finish_action(&mut self, id: PacedAdvanceId) {
        if self.pending_action == Some(id) {
            self.pending_action = None;
            debug!(id = id.0, "player_action_finished");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("player is busy with a timed action")]
    Busy,
    #[error("player has been caught")]
    Caught,
    #[error("tile {tile} is not walkable")]
    Blocked { tile: Tile },
    #[error("no path from {from} to {to}")]
    NoPath { from: Tile, to: Tile },
    #[error("no closed door next to {tile}")]
    NoClosedDoor { tile: Tile },
    #[error(transparent)]
    Door(#[from] DoorError),
}

impl Simulation {
    fn player_index(&self) -> GridIndex<'_> {
        self.world.index().with_occupancy(&self.occupancy)
    }

    fn ensure_player_can_act(&self) -> Result<(), ActionError> {
        if self.is_player_caught() {
            return Err(ActionError::Caught);
        }
        if self.player.is_busy() {
            return Err(ActionError::Busy);
        }
        Ok(())
    }

    pub fn set_player_encumbered(&mut self, encumbered: bool) {
        self.player.encumbered = encumbered;
    }

    /// Direct placement, e.g. from a scenario or a level load. No time passes.
    pub fn place_player(&mut self, tile: Tile) {
        let from = self.player.tile;
        self.player.tile = tile;
        if from != tile {
            self.events.emit(SimEvent::PlayerMoved { from, to: tile });
        }
    }

    /// One-tile move. Agents and closed doors block. The move cost is charged
    /// to the clock before the player's tile changes, so agents acting in
    /// those minutes still see the old tile.
    pub fn player_step(&mut self, direction: Direction) -> Result<(), ActionError> {
        self.ensure_player_can_act()?;
        let target = self.player.tile.step(direction);
        if !self.player_index().is_walkable(target) {
            return Err(ActionError::Blocked { tile: target });
        }
        self.commit_player_step(target);
        Ok(())
    }

    pub fn plan_player_path(&self, goal: Tile) -> Option<Vec<Tile>> {
        find_path(self.player.tile, goal, &self.player_index(), None)
    }

    /// Walks toward `goal` one step at a time and returns the number of steps
    /// taken. A blocked goal is swapped for its walkable neighbor closest to
    /// the player. The walk stops early when the next tile has become blocked
    /// or the player is caught.
    pub fn player_walk_to(&mut self, goal: Tile) -> Result<usize, ActionError> {
        self.ensure_player_can_act()?;
        let target = self.resolve_walk_target(goal);
        let from = self.player.tile;
        let path = self
            .plan_player_path(target)
            .ok_or(ActionError::NoPath { from, to: target })?;

        let mut steps = 0;
        for next in path {
            if self.is_player_caught() {
                break;
            }
            if !self.player_index().is_walkable(next) {
                debug!(from = %self.player.tile, blocked = %next, "player_walk_interrupted");
                break;
            }
            self.commit_player_step(next);
            steps += 1;
        }
        Ok(steps)
    }

    /// Opens the first closed door among the four neighbors and starts the
    /// paced door-opening advance. The player stays busy until it completes.
    pub fn player_open_adjacent_door(&mut self) -> Result<Tile, ActionError> {
        self.ensure_player_can_act()?;
        let player_tile = self.player.tile;
        let door_tile = NEIGHBOR_ORDER
            .iter()
            .map(|direction| player_tile.step(*direction))
            .find(|tile| self.world.doors.door_at(*tile) == Some(DoorState::Closed))
            .ok_or(ActionError::NoClosedDoor { tile: player_tile })?;

        self.set_door_open(door_tile, true)?;
        info!(tile = %door_tile, "player_opening_door");
        self.clock.reset_idle_timer();
        let id = self.clock.advance_minutes_paced(
            self.player.config.door_open_cost_minutes,
            self.player.config.door_open_interval(),
        );
        self.player.pending_action = Some(id);
        self.pump_clock();
        Ok(door_tile)
    }

    /// Returns whether the door state changed.
    pub fn set_door_open(&mut self, tile: Tile, open: bool) -> Result<bool, ActionError> {
        let changed = self.world.doors.set_open(tile, open)?;
        if changed {
            self.events.emit(SimEvent::DoorChanged {
                tile,
                state: DoorState::from_open(open),
            });
        }
        Ok(changed)
    }

    pub fn toggle_door(&mut self, tile: Tile) -> Result<DoorState, ActionError> {
        let state = self.world.doors.toggle(tile)?;
        self.events.emit(SimEvent::DoorChanged { tile, state });
        Ok(state)
    }

    fn commit_player_step(&mut self, target: Tile) {
        self.clock.reset_idle_timer();
        self.clock.advance_minutes(self.player.move_cost_minutes());
        self.pump_clock();

        let from = self.player.tile;
        self.player.tile = target;
        self.events.emit(SimEvent::PlayerMoved { from, to: target });
    }

    fn resolve_walk_target(&self, goal: Tile) -> Tile {
        let index = self.player_index();
        if index.is_walkable(goal) {
            return goal;
        }
        let player = self.player.tile;
        let mut best: Option<(i64, Tile)> = None;
        for neighbor in goal.neighbors() {
            if !index.is_walkable(neighbor) {
                continue;
            }
            let dx = i64::from(neighbor.x) - i64::from(player.x);
            let dy = i64::from(neighbor.y) - i64::from(player.y);
            let distance = dx * dx + dy * dy;
            if best.map_or(true, |(best_distance, _)| distance < best_distance) {
                best = Some((distance, neighbor));
            }
        }
        best.map_or(goal, |(_, tile)| tile)
    }
}
