use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::grid::{GridIndex, Tile};

/// Search safety valve. Exceeding it is reported as [`PathOutcome::TimedOut`],
/// which callers treat like "no path" but diagnostics keep distinct.
pub const MAX_SEARCH_ITERATIONS: u32 = 20_000;

pub type Heuristic = fn(Tile, Tile) -> u32;

/// Point walkability test used by the search and by random-target pickers.
pub trait Walkability {
    fn is_walkable(&self, tile: Tile) -> bool;
}

impl Walkability for GridIndex<'_> {
    fn is_walkable(&self, tile: Tile) -> bool {
        GridIndex::is_walkable(self, tile)
    }
}

impl<F> Walkability for F
where
    F: Fn(Tile) -> bool,
{
    fn is_walkable(&self, tile: Tile) -> bool {
        self(tile)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathOutcome {
    /// Steps from (excluding) the start to the goal; empty when start == goal.
    Found(Vec<Tile>),
    Unreachable,
    TimedOut { iterations: u32 },
}

impl PathOutcome {
    pub fn into_path(self) -> Option<Vec<Tile>> {
        match self {
            Self::Found(path) => Some(path),
            Self::Unreachable | Self::TimedOut { .. } => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

pub fn manhattan_heuristic(a: Tile, b: Tile) -> u32 {
    a.manhattan(b)
}

pub fn find_path(
    start: Tile,
    goal: Tile,
    walkability: &impl Walkability,
    heuristic: Option<Heuristic>,
) -> Option<Vec<Tile>> {
    search_path(start, goal, walkability, heuristic).into_path()
}

pub fn search_path(
    start: Tile,
    goal: Tile,
    walkability: &impl Walkability,
    heuristic: Option<Heuristic>,
) -> PathOutcome {
    search_path_with_limit(start, goal, walkability, heuristic, MAX_SEARCH_ITERATIONS)
}

/// A* over the 4-neighborhood with unit step cost. The start tile itself is
/// never tested for walkability; every other tile on the path is.
pub fn search_path_with_limit(
    start: Tile,
    goal: Tile,
    walkability: &impl Walkability,
    heuristic: Option<Heuristic>,
    max_iterations: u32,
) -> PathOutcome {
    if start == goal {
        return PathOutcome::Found(Vec::new());
    }

    let heuristic = heuristic.unwrap_or(manhattan_heuristic);
    let mut closed = HashSet::<Tile>::new();
    let mut best_g = HashMap::<Tile, u32>::new();
    let mut parent = HashMap::<Tile, Tile>::new();
    let mut open = Vec::new();
    let mut next_insertion = 0u64;

    let start_h = heuristic(start, goal);
    open.push(OpenNode {
        tile: start,
        h_cost: start_h,
        f_cost: start_h,
        insertion_order: next_insertion,
    });
    next_insertion = next_insertion.saturating_add(1);
    best_g.insert(start, 0);

    let mut iterations = 0u32;
    while !open.is_empty() {
        iterations = iterations.saturating_add(1);
        if iterations > max_iterations {
            warn!(
                start = %start,
                goal = %goal,
                iterations = max_iterations,
                "path_search_timed_out"
            );
            return PathOutcome::TimedOut {
                iterations: max_iterations,
            };
        }

        let best_index = pick_best_open_node_index(&open);
        let current = open.swap_remove(best_index);
        if !closed.insert(current.tile) {
            continue;
        }

        if current.tile == goal {
            return match reconstruct_path(&parent, start, goal) {
                Some(path) => PathOutcome::Found(path),
                None => PathOutcome::Unreachable,
            };
        }

        let current_g = best_g.get(&current.tile).copied().unwrap_or(u32::MAX);
        for neighbor in current.tile.neighbors() {
            if closed.contains(&neighbor) || !walkability.is_walkable(neighbor) {
                continue;
            }

            let tentative_g = current_g.saturating_add(1);
            if best_g
                .get(&neighbor)
                .is_some_and(|known| tentative_g >= *known)
            {
                continue;
            }

            best_g.insert(neighbor, tentative_g);
            parent.insert(neighbor, current.tile);
            let h_cost = heuristic(neighbor, goal);
            open.push(OpenNode {
                tile: neighbor,
                h_cost,
                f_cost: tentative_g.saturating_add(h_cost),
                insertion_order: next_insertion,
            });
            next_insertion = next_insertion.saturating_add(1);
        }
    }

    PathOutcome::Unreachable
}

#[derive(Debug, Clone, Copy)]
struct OpenNode {
    tile: Tile,
    h_cost: u32,
    f_cost: u32,
    insertion_order: u64,
}

fn pick_best_open_node_index(open: &[OpenNode]) -> usize {
    let mut best_index = 0usize;
    for index in 1..open.len() {
        if open_node_order_key(open[index]) < open_node_order_key(open[best_index]) {
            best_index = index;
        }
    }
    best_index
}

fn open_node_order_key(node: OpenNode) -> (u32, u32, u64) {
    (node.f_cost, node.h_cost, node.insertion_order)
}

fn reconstruct_path(parent: &HashMap<Tile, Tile>, start: Tile, goal: Tile) -> Option<Vec<Tile>> {
    let mut cursor = goal;
    let mut path = vec![cursor];
    while cursor != start {
        cursor = *parent.get(&cursor)?;
        if cursor != start {
            path.push(cursor);
        }
    }
    path.reverse();
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{DoorRegistry, DoorState, TileLayer};

    fn assert_contiguous(start: Tile, path: &[Tile]) {
        let mut previous = start;
        for tile in path {
            assert!(previous.is_adjacent(*tile), "{previous} -> {tile} is not one step");
            previous = *tile;
        }
    }

    fn u_shape_obstacles() -> TileLayer {
        // Goal (3,0) enclosed on left, right and bottom; open at (3,1).
        TileLayer::from_tiles([
            Tile::new(2, 1),
            Tile::new(2, 0),
            Tile::new(2, -1),
            Tile::new(3, -1),
            Tile::new(4, -1),
            Tile::new(4, 0),
            Tile::new(4, 1),
        ])
    }

    #[test]
    fn open_field_path_is_manhattan_length() {
        let open = |_: Tile| true;
        for goal in [Tile::new(4, 0), Tile::new(-3, 5), Tile::new(2, -7)] {
            let start = Tile::new(1, 1);
            let path = find_path(start, goal, &open, None).expect("reachable");
            assert_eq!(path.len() as u32, start.manhattan(goal));
            assert_eq!(path.last(), Some(&goal));
            assert_contiguous(start, &path);
        }
    }

    #[test]
    fn start_equals_goal_is_empty_path() {
        let blocked = |_: Tile| false;
        assert_eq!(
            search_path(Tile::new(2, 2), Tile::new(2, 2), &blocked, None),
            PathOutcome::Found(Vec::new())
        );
    }

    #[test]
    fn boxed_goal_is_unreachable() {
        let goal = Tile::new(5, 5);
        let walls = TileLayer::from_tiles(goal.neighbors());
        let doors = DoorRegistry::new();
        let inside_bounds = |tile: Tile| tile.x.abs() <= 8 && tile.y.abs() <= 8;
        let index =
            GridIndex::new(Tile::ZERO, &walls, &doors).with_extra_condition(&inside_bounds);

        assert_eq!(
            search_path(Tile::ZERO, goal, &index, None),
            PathOutcome::Unreachable
        );
    }

    #[test]
    fn unbounded_map_search_times_out_distinctly() {
        let goal = Tile::new(0, 3);
        let walkable = move |tile: Tile| !goal.is_adjacent(tile);
        let outcome = search_path_with_limit(Tile::ZERO, goal, &walkable, None, 200);
        assert_eq!(outcome, PathOutcome::TimedOut { iterations: 200 });
        assert_eq!(outcome.into_path(), None);
    }

    #[test]
    fn u_shaped_wall_forces_detour_through_opening() {
        let walls = u_shape_obstacles();
        let doors = DoorRegistry::new();
        let index = GridIndex::new(Tile::ZERO, &walls, &doors);

        // Manhattan 3, but the only way in is over the top of the left arm.
        let path = find_path(Tile::ZERO, Tile::new(3, 0), &index, None).expect("path");
        assert_eq!(path.len(), 7);
        assert_eq!(path[path.len() - 2], Tile::new(3, 1));
        assert_contiguous(Tile::ZERO, &path);
        assert!(path.iter().all(|tile| !walls.has_tile(*tile)));
    }

    #[test]
    fn closed_door_blocks_unless_overridden() {
        let walls = TileLayer::from_tiles([Tile::new(1, 1), Tile::new(1, -1)]);
        let mut doors = DoorRegistry::new();
        doors.register(Tile::new(1, 0), DoorState::Closed);
        let goal = Tile::new(2, 0);

        let index = GridIndex::new(Tile::ZERO, &walls, &doors);
        let around = find_path(Tile::ZERO, goal, &index, None).expect("detour");
        assert!(!around.contains(&Tile::new(1, 0)));
        assert!(around.len() > 2);

        let through = find_path(
            Tile::ZERO,
            goal,
            &index.allowing_closed_doors(true),
            None,
        )
        .expect("through door");
        assert_eq!(through, vec![Tile::new(1, 0), goal]);
    }

    #[test]
    fn tie_break_is_deterministic() {
        let walls = TileLayer::from_tiles([Tile::new(2, 2)]);
        let doors = DoorRegistry::new();
        let index = GridIndex::new(Tile::ZERO, &walls, &doors);
        let first = find_path(Tile::new(0, 2), Tile::new(4, 2), &index, None).expect("first");
        let second = find_path(Tile::new(0, 2), Tile::new(4, 2), &index, None).expect("second");
        assert_eq!(first, second);
        assert_eq!(first.len(), 6);
    }

    #[test]
    fn heuristic_override_still_finds_shortest_path() {
        let zero: Heuristic = |_, _| 0;
        let open = |_: Tile| true;
        let path = find_path(Tile::ZERO, Tile::new(3, 2), &open, Some(zero)).expect("path");
        assert_eq!(path.len(), 5);
    }
}
