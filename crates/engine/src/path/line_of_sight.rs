use crate::grid::Tile;

/// Bresenham rasterization from `origin` to `target`. The origin is not
/// yielded; the target is always the last tile. Ties in the error term step
/// both axes at once.
#[derive(Debug, Clone)]
pub struct LineTiles {
    current: Tile,
    target: Tile,
    dx: i32,
    dy: i32,
    step_x: i32,
    step_y: i32,
    error: i32,
    done: bool,
}

impl LineTiles {
    pub fn new(origin: Tile, target: Tile) -> Self {
        let dx = (target.x - origin.x).abs();
        let dy = (target.y - origin.y).abs();
        Self {
            current: origin,
            target,
            dx,
            dy,
            step_x: if origin.x < target.x { 1 } else { -1 },
            step_y: if origin.y < target.y { 1 } else { -1 },
            error: dx - dy,
            done: origin == target,
        }
    }
}

impl Iterator for LineTiles {
    type Item = Tile;

    fn next(&mut self) -> Option<Tile> {
        if self.done {
            return None;
        }
        let doubled = self.error * 2;
        if doubled >= -self.dy {
            self.error -= self.dy;
            self.current.x += self.step_x;
        }
        if doubled <= self.dx {
            self.error += self.dx;
            self.current.y += self.step_y;
        }
        if self.current == self.target {
            self.done = true;
        }
        Some(self.current)
    }
}

/// True when no tile on the line after `origin` (target included) is blocked.
pub fn has_line_of_sight(origin: Tile, target: Tile, blocked: impl Fn(Tile) -> bool) -> bool {
    LineTiles::new(origin, target).all(|tile| !blocked(tile))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_skips_origin_and_ends_on_target() {
        let tiles = LineTiles::new(Tile::new(0, 0), Tile::new(3, 0)).collect::<Vec<_>>();
        assert_eq!(tiles, vec![Tile::new(1, 0), Tile::new(2, 0), Tile::new(3, 0)]);
        assert_eq!(LineTiles::new(Tile::new(4, 4), Tile::new(4, 4)).count(), 0);
    }

    #[test]
    fn diagonal_and_steep_lines_are_connected() {
        let origin = Tile::new(-1, -2);
        for target in [Tile::new(3, 3), Tile::new(0, 5), Tile::new(-6, 1)] {
            let mut previous = origin;
            for tile in LineTiles::new(origin, target) {
                assert!(previous.chebyshev(tile) == 1);
                previous = tile;
            }
            assert_eq!(previous, target);
        }
    }

    #[test]
    fn wall_between_blocks_sight() {
        let wall = Tile::new(2, 0);
        assert!(!has_line_of_sight(Tile::ZERO, Tile::new(4, 0), |tile| tile == wall));
        assert!(has_line_of_sight(Tile::ZERO, Tile::new(4, 2), |tile| tile == Tile::new(9, 9)));
        assert!(has_line_of_sight(wall, Tile::new(4, 0), |tile| tile == wall));
    }

    #[test]
    fn error_ties_step_diagonally() {
        let tiles = LineTiles::new(Tile::ZERO, Tile::new(2, 1)).collect::<Vec<_>>();
        assert_eq!(tiles, vec![Tile::new(1, 1), Tile::new(2, 1)]);

        let mirrored = LineTiles::new(Tile::ZERO, Tile::new(-1, -2)).collect::<Vec<_>>();
        assert_eq!(mirrored, vec![Tile::new(-1, -1), Tile::new(-1, -2)]);

        let target = Tile::new(2, 1);
        assert!(has_line_of_sight(Tile::ZERO, target, |tile| tile == Tile::new(1, 0)));
        assert!(!has_line_of_sight(Tile::ZERO, target, |tile| tile == Tile::new(1, 1)));
    }
}
