use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod agents;
pub mod clock;
mod digest;
pub mod events;
pub mod grid;
pub mod path;
pub mod scenario;
pub mod scheduler;
pub mod sim;
#[cfg(test)]
mod test_support;

pub use agents::{
    MoveIntent, NpcAgent, NpcConfig, NpcState, PatrolSchedule, PoliceAgent, PoliceConfig,
    PoliceState, SCHEDULE_BLOCKS,
};
pub use clock::{Clock, ClockEvent, ClockSettings, PacedAdvanceId, TimeOfDay};
pub use events::{SimEvent, SimEventBus, SimEventCounts, SimEventKind};
pub use grid::{
    Direction, DoorError, DoorRegistry, DoorState, GridIndex, OccupancyMap, Tile, TileLayer,
    WorldGrid, NEIGHBOR_ORDER,
};
pub use path::{
    find_path, has_line_of_sight, search_path, Heuristic, PathOutcome, Walkability,
    MAX_SEARCH_ITERATIONS,
};
pub use scenario::{
    load_scenario, parse_scenario_json, Scenario, ScenarioError, ScriptAction,
};
pub use scheduler::{
    Agent, AgentContext, AgentError, AgentId, AgentKind, AgentScheduler, AgentStatus,
    DetectionReport, SchedulerEnv,
};
pub use sim::{ActionError, CaptureRecord, PlayerConfig, PlayerState, SimConfig, Simulation};

pub const ROOT_ENV_VAR: &str = "STEALTH_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub scenarios_dir: PathBuf,
}

impl AppPaths {
    pub fn default_scenario(&self) -> PathBuf {
        self.scenarios_dir.join("demo.json")
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error(
        "{env_var} is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or assets/."
    )]
    InvalidEnvRoot {
        path: PathBuf,
        env_var: &'static str,
    },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or assets/.\n\
Set {env_var} explicitly, for example: export {env_var}=\"/path/to/stealth\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    let scenarios_dir = root.join("assets").join("scenarios");
    Ok(AppPaths {
        root,
        scenarios_dir,
    })
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let normalized = normalize_path(&PathBuf::from(value));
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot {
                    path: normalized,
                    env_var: ROOT_ENV_VAR,
                })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            exe_dir
                .ancestors()
                .find(|candidate| is_repo_marker(candidate))
                .map(normalize_path)
                .ok_or_else(|| StartupError::RootNotFound {
                    start_dir: normalize_path(&exe_dir),
                    env_var: ROOT_ENV_VAR,
                })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    let cargo_toml = path.join("Cargo.toml").is_file();
    let has_crates = path.join("crates").is_dir();
    let has_assets = path.join("assets").is_dir();

    cargo_toml && (has_crates || has_assets)
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn repo_marker_requires_cargo_toml_and_a_content_dir() {
        let temp = TempDir::new().expect("tempdir");
        let root = temp.path();
        assert!(!is_repo_marker(root));

        fs::write(root.join("Cargo.toml"), "[workspace]\n").expect("write manifest");
        assert!(!is_repo_marker(root));

        fs::create_dir_all(root.join("assets").join("scenarios")).expect("mkdir");
        assert!(is_repo_marker(root));
    }
}
