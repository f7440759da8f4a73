use std::collections::HashSet;

use super::Tile;

/// Sparse set of painted tiles in absolute coordinates. Static obstacles and
/// hide spots are both layers; a tile "has" the layer when it is present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileLayer {
    tiles: HashSet<Tile>,
}

impl TileLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tiles(tiles: impl IntoIterator<Item = Tile>) -> Self {
        Self {
            tiles: tiles.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, absolute: Tile) -> bool {
        self.tiles.insert(absolute)
    }

    pub fn remove(&mut self, absolute: Tile) -> bool {
        self.tiles.remove(&absolute)
    }

    /// Paints every tile of the inclusive rectangle spanned by two corners.
    pub fn fill_rect(&mut self, corner_a: Tile, corner_b: Tile) -> usize {
        let (min_x, max_x) = (corner_a.x.min(corner_b.x), corner_a.x.max(corner_b.x));
        let (min_y, max_y) = (corner_a.y.min(corner_b.y), corner_a.y.max(corner_b.y));
        let mut added = 0usize;
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                if self.tiles.insert(Tile::new(x, y)) {
                    added = added.saturating_add(1);
                }
            }
        }
        added
    }

    pub fn has_tile(&self, absolute: Tile) -> bool {
        self.tiles.contains(&absolute)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Tiles in (y, x) order so callers hashing or printing the layer see a
    /// stable sequence.
    pub fn sorted_tiles(&self) -> Vec<Tile> {
        let mut tiles = self.tiles.iter().copied().collect::<Vec<_>>();
        tiles.sort_by_key(|tile| (tile.y, tile.x));
        tiles
    }
}
