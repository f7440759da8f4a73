use std::collections::HashSet;

use super::{DoorRegistry, OccupancyMap, Tile, TileLayer};
use crate::scheduler::AgentId;

/// Read-only walkability oracle over the live grid state.
///
/// Nothing is cached: every query re-reads occupancy and door state, so an
/// index may be rebuilt or reused freely between mutations. Obstacle lookups
/// use absolute coordinates (`tile + origin`); door, occupancy and override
/// lookups use map-relative coordinates.
#[derive(Clone, Copy)]
pub struct GridIndex<'a> {
    origin: Tile,
    obstacles: &'a TileLayer,
    doors: &'a DoorRegistry,
    occupancy: Option<&'a OccupancyMap>,
    exempt_agent: Option<AgentId>,
    occupancy_exemption: Option<&'a dyn Fn(Tile) -> bool>,
    door_overrides: Option<&'a HashSet<Tile>>,
    extra_condition: Option<&'a dyn Fn(Tile) -> bool>,
    allow_closed_doors: bool,
}

impl<'a> GridIndex<'a> {
    pub fn new(origin: Tile, obstacles: &'a TileLayer, doors: &'a DoorRegistry) -> Self {
        Self {
            origin,
            obstacles,
            doors,
            occupancy: None,
            exempt_agent: None,
            occupancy_exemption: None,
            door_overrides: None,
            extra_condition: None,
            allow_closed_doors: false,
        }
    }

    pub fn with_occupancy(mut self, occupancy: &'a OccupancyMap) -> Self {
        self.occupancy = Some(occupancy);
        self
    }

    /// Tiles held by `agent` itself never block its own queries.
    pub fn exempting_agent(mut self, agent: AgentId) -> Self {
        self.exempt_agent = Some(agent);
        self
    }

    pub fn with_occupancy_exemption(mut self, exemption: &'a dyn Fn(Tile) -> bool) -> Self {
        self.occupancy_exemption = Some(exemption);
        self
    }

    /// Doors in this set are treated as open for this index only.
    pub fn with_door_overrides(mut self, overrides: &'a HashSet<Tile>) -> Self {
        self.door_overrides = Some(overrides);
        self
    }

    pub fn with_extra_condition(mut self, condition: &'a dyn Fn(Tile) -> bool) -> Self {
        self.extra_condition = Some(condition);
        self
    }

    pub fn allowing_closed_doors(mut self, allow: bool) -> Self {
        self.allow_closed_doors = allow;
        self
    }

    pub fn origin(&self) -> Tile {
        self.origin
    }

    pub fn to_absolute(&self, relative: Tile) -> Tile {
        relative + self.origin
    }

    pub fn is_static_obstacle(&self, relative: Tile) -> bool {
        self.obstacles.has_tile(self.to_absolute(relative))
    }

    pub fn is_walkable(&self, tile: Tile) -> bool {
        if self.is_occupied_for_caller(tile) {
            return false;
        }

        if let Some(condition) = self.extra_condition {
            if !condition(tile) {
                return false;
            }
        }

        if self.is_static_obstacle(tile) {
            return false;
        }

        match self.doors.door_at(tile) {
            Some(state) => {
                if self
                    .door_overrides
                    .is_some_and(|overrides| overrides.contains(&tile))
                {
                    return true;
                }
                self.allow_closed_doors || state.is_open()
            }
            None => true,
        }
    }

    fn is_occupied_for_caller(&self, tile: Tile) -> bool {
        let Some(occupancy) = self.occupancy else {
            return false;
        };
        let Some(holder) = occupancy.occupant(tile) else {
            return false;
        };
        if self.exempt_agent == Some(holder) {
            return false;
        }
        !self
            .occupancy_exemption
            .is_some_and(|exemption| exemption(tile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::DoorState;

    struct Fixture {
        obstacles: TileLayer,
        doors: DoorRegistry,
        occupancy: OccupancyMap,
    }

    fn fixture() -> Fixture {
        let mut doors = DoorRegistry::new();
        doors.register(Tile::new(2, 0), DoorState::Closed);
        doors.register(Tile::new(3, 0), DoorState::Open);
        Fixture {
            obstacles: TileLayer::from_tiles([Tile::new(11, 10)]),
            doors,
            occupancy: OccupancyMap::new(),
        }
    }

    #[test]
    fn obstacle_lookup_applies_map_origin() {
        let fx = fixture();
        let index = GridIndex::new(Tile::new(10, 10), &fx.obstacles, &fx.doors);
        assert!(!index.is_walkable(Tile::new(1, 0)));
        assert!(index.is_walkable(Tile::new(11, 10)));
    }

    #[test]
    fn closed_door_rules() {
        let fx = fixture();
        let base = GridIndex::new(Tile::ZERO, &fx.obstacles, &fx.doors);
        assert!(!base.is_walkable(Tile::new(2, 0)));
        assert!(base.is_walkable(Tile::new(3, 0)));
        assert!(base.allowing_closed_doors(true).is_walkable(Tile::new(2, 0)));

        let overrides = HashSet::from([Tile::new(2, 0)]);
        assert!(base
            .with_door_overrides(&overrides)
            .is_walkable(Tile::new(2, 0)));
    }

    #[test]
    fn occupancy_is_exclusive_until_vacated() {
        let mut fx = fixture();
        let tile = Tile::new(5, 5);
        fx.occupancy.claim(AgentId(1), tile);
        {
            let index =
                GridIndex::new(Tile::ZERO, &fx.obstacles, &fx.doors).with_occupancy(&fx.occupancy);
            assert!(!index.is_walkable(tile));
            assert!(index.exempting_agent(AgentId(1)).is_walkable(tile));
            assert!(!index.exempting_agent(AgentId(2)).is_walkable(tile));
        }

        fx.occupancy.release(AgentId(1), tile);
        let index =
            GridIndex::new(Tile::ZERO, &fx.obstacles, &fx.doors).with_occupancy(&fx.occupancy);
        assert!(index.is_walkable(tile));
    }

    #[test]
    fn occupancy_exemption_and_extra_condition() {
        let mut fx = fixture();
        fx.occupancy.claim(AgentId(3), Tile::new(0, 1));
        let exempt_row_one = |tile: Tile| tile.y == 1;
        let forbid_negative_x = |tile: Tile| tile.x >= 0;
        let index = GridIndex::new(Tile::ZERO, &fx.obstacles, &fx.doors)
            .with_occupancy(&fx.occupancy)
            .with_occupancy_exemption(&exempt_row_one)
            .with_extra_condition(&forbid_negative_x);

        assert!(index.is_walkable(Tile::new(0, 1)));
        assert!(!index.is_walkable(Tile::new(-1, 4)));
    }

    #[test]
    fn repeated_queries_agree() {
        let fx = fixture();
        let index = GridIndex::new(Tile::ZERO, &fx.obstacles, &fx.doors);
        for tile in [Tile::new(2, 0), Tile::new(3, 0), Tile::new(-4, 8)] {
            assert_eq!(index.is_walkable(tile), index.is_walkable(tile));
        }
    }
}
