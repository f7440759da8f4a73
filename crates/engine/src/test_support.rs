use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::events::{SimEvent, SimEventBus, SimEventKind};
use crate::grid::{OccupancyMap, Tile, WorldGrid};
use crate::scheduler::SchedulerEnv;

/// Owned world state a scheduler can borrow in tests.
pub struct Harness {
    pub world: WorldGrid,
    pub occupancy: OccupancyMap,
    pub player_tile: Option<Tile>,
    pub rng: ChaCha8Rng,
    pub events: SimEventBus,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            world: WorldGrid::new(Tile::ZERO),
            occupancy: OccupancyMap::new(),
            player_tile: None,
            rng: ChaCha8Rng::seed_from_u64(7),
            events: SimEventBus::default(),
        }
    }

    pub fn env(&mut self) -> SchedulerEnv<'_> {
        SchedulerEnv {
            world: &self.world,
            occupancy: &mut self.occupancy,
            player_tile: self.player_tile,
            rng: &mut self.rng,
            events: &mut self.events,
        }
    }

    pub fn drain_kind(&mut self, kind: SimEventKind) -> Vec<SimEvent> {
        self.events
            .drain()
            .into_iter()
            .filter(|event| event.kind() == kind)
            .collect()
    }
}
