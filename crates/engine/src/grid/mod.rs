mod doors;
mod index;
mod layer;
mod occupancy;
mod tile;

pub use doors::{DoorError, DoorRegistry, DoorState};
pub use index::GridIndex;
pub use layer::TileLayer;
pub use occupancy::OccupancyMap;
pub use tile::{Direction, Tile, NEIGHBOR_ORDER};

/// Static map data plus the door registry. Occupancy lives beside it in the
/// simulation so agents can borrow the world immutably while moving.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorldGrid {
    pub origin: Tile,
    pub obstacles: TileLayer,
    pub hide_spots: TileLayer,
    pub doors: DoorRegistry,
}

impl WorldGrid {
    pub fn new(origin: Tile) -> Self {
        Self {
            origin,
            ..Self::default()
        }
    }

    /// Base walkability view with no occupancy and closed doors blocking.
    pub fn index(&self) -> GridIndex<'_> {
        GridIndex::new(self.origin, &self.obstacles, &self.doors)
    }

    pub fn is_static_obstacle(&self, relative: Tile) -> bool {
        self.obstacles.has_tile(relative + self.origin)
    }

    pub fn is_hide_spot(&self, relative: Tile) -> bool {
        self.hide_spots.has_tile(relative + self.origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_are_queried_in_absolute_space() {
        let mut world = WorldGrid::new(Tile::new(-3, 2));
        world.obstacles.insert(Tile::new(-3, 3));
        world.hide_spots.insert(Tile::new(0, 2));

        assert!(world.is_static_obstacle(Tile::new(0, 1)));
        assert!(world.is_hide_spot(Tile::new(3, 0)));
        assert!(!world.index().is_walkable(Tile::new(0, 1)));
    }
}
