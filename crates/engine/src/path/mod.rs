mod astar;
mod line_of_sight;

pub use astar::{
    find_path, manhattan_heuristic, search_path, search_path_with_limit, Heuristic, PathOutcome,
    Walkability, MAX_SEARCH_ITERATIONS,
};
pub use line_of_sight::{has_line_of_sight, LineTiles};
