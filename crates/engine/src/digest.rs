use sha2::{Digest, Sha256};

use crate::grid::{OccupancyMap, Tile, WorldGrid};
use crate::scheduler::{Agent, AgentId};
use crate::sim::PlayerState;

/// Hashes everything that decides future behavior and is visible from the
/// outside. Collections are fed in sorted order; every field ends with NUL.
pub(crate) fn state_digest<'a>(
    total_minutes: u64,
    player: &PlayerState,
    world: &WorldGrid,
    occupancy: &OccupancyMap,
    agents: impl Iterator<Item = (AgentId, &'a dyn Agent)>,
) -> String {
    let mut hasher = StateHasher::default();

    hasher.field("time");
    hasher.field(&total_minutes.to_string());

    hasher.field("player");
    hasher.tile(player.tile());
    hasher.flag(player.is_encumbered());
    hasher.flag(player.is_busy());

    hasher.field("doors");
    for (tile, state) in world.doors.sorted_doors() {
        hasher.tile(tile);
        hasher.flag(state.is_open());
    }

    hasher.field("occupancy");
    for (tile, agent) in occupancy.sorted_entries() {
        hasher.tile(tile);
        hasher.field(&agent.0.to_string());
    }

    hasher.field("agents");
    for (id, agent) in agents {
        hasher.field(&id.0.to_string());
        hasher.field(agent.name());
        hasher.field(agent.kind().as_token());
        hasher.tile(agent.tile());
        hasher.field(agent.status().as_token());
        hasher.flag(agent.is_visible());
    }

    hasher.finish()
}

#[derive(Default)]
struct StateHasher {
    inner: Sha256,
}

impl StateHasher {
    fn field(&mut self, value: &str) {
        self.inner.update(value.as_bytes());
        self.inner.update([0u8]);
    }

    fn tile(&mut self, tile: Tile) {
        self.field(&format!("{},{}", tile.x, tile.y));
    }

    fn flag(&mut self, value: bool) {
        self.field(if value { "1" } else { "0" });
    }

    fn finish(self) -> String {
        to_hex_lower(&self.inner.finalize())
    }
}

fn to_hex_lower(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::PlayerConfig;

    fn digest_for(player_tile: Tile, world: &WorldGrid) -> String {
        let player = PlayerState::new(player_tile, PlayerConfig::default());
        state_digest(480, &player, world, &OccupancyMap::new(), std::iter::empty())
    }

    #[test]
    fn digest_is_lower_hex_sha256() {
        let digest = digest_for(Tile::ZERO, &WorldGrid::default());
        assert_eq!(digest.len(), 64);
        assert!(digest
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn digest_tracks_player_and_door_state() {
        let mut world = WorldGrid::default();
        world
            .doors
            .register(Tile::new(1, 0), crate::grid::DoorState::Closed);
        let closed = digest_for(Tile::ZERO, &world);
        assert_eq!(closed, digest_for(Tile::ZERO, &world));
        assert_ne!(closed, digest_for(Tile::new(0, 1), &world));

        world
            .doors
            .set_open(Tile::new(1, 0), true)
            .expect("door exists");
        assert_ne!(closed, digest_for(Tile::ZERO, &world));
    }
}
