use std::collections::HashMap;

use tracing::warn;

use super::Tile;
use crate::scheduler::AgentId;

/// Tiles currently held by tile-occupying agents. Each agent writes only its
/// own entry; conflicting claims are resolved last-writer-wins with a warning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OccupancyMap {
    by_tile: HashMap<Tile, AgentId>,
}

impl OccupancyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the displaced occupant when another agent already held `tile`.
    pub fn claim(&mut self, agent: AgentId, tile: Tile) -> Option<AgentId> {
        let previous = self.by_tile.insert(tile, agent);
        match previous {
            Some(other) if other != agent => {
                warn!(
                    tile = %tile,
                    agent = agent.0,
                    displaced = other.0,
                    "duplicate_occupancy_overwritten"
                );
                Some(other)
            }
            _ => None,
        }
    }

    /// Drops the entry only when `agent` still holds it.
    pub fn release(&mut self, agent: AgentId, tile: Tile) -> bool {
        if self.by_tile.get(&tile) == Some(&agent) {
            self.by_tile.remove(&tile);
            return true;
        }
        false
    }

    pub fn move_agent(&mut self, agent: AgentId, from: Tile, to: Tile) -> Option<AgentId> {
        self.release(agent, from);
        self.claim(agent, to)
    }

    pub fn occupant(&self, tile: Tile) -> Option<AgentId> {
        self.by_tile.get(&tile).copied()
    }

    pub fn is_occupied(&self, tile: Tile) -> bool {
        self.by_tile.contains_key(&tile)
    }

    pub fn len(&self) -> usize {
        self.by_tile.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tile.is_empty()
    }

    pub fn sorted_entries(&self) -> Vec<(Tile, AgentId)> {
        let mut entries = self
            .by_tile
            .iter()
            .map(|(tile, agent)| (*tile, *agent))
            .collect::<Vec<_>>();
        entries.sort_by_key(|(tile, _)| (tile.y, tile.x));
        entries
    }
}
