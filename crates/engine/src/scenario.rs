use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::agents::{NpcConfig, PatrolSchedule, PoliceConfig, SCHEDULE_BLOCKS};
use crate::clock::{ClockSettings, HOURS_PER_DAY};
use crate::grid::{Direction, DoorState, Tile, WorldGrid};
use crate::sim::{PlayerConfig, SimConfig, Simulation};

/// A world description loaded from JSON. Obstacles and hide spots are in
/// absolute coordinates; doors, agents and the player are relative to
/// `map_origin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub map_origin: Tile,
    #[serde(default)]
    pub obstacles: Vec<Tile>,
    #[serde(default)]
    pub obstacle_rects: Vec<TileRect>,
    #[serde(default)]
    pub hide_spots: Vec<Tile>,
    #[serde(default)]
    pub doors: Vec<DoorPlacement>,
    pub player_start: Tile,
    #[serde(default)]
    pub clock: ClockSettings,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub npcs: Vec<NpcPlacement>,
    #[serde(default)]
    pub police: Vec<PolicePlacement>,
    #[serde(default)]
    pub script: Vec<ScriptAction>,
}

/// Largest obstacle rectangle a scenario may paint in one entry.
pub const MAX_RECT_TILES: u64 = 1 << 20;

/// Inclusive rectangle between two corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRect {
    pub from: Tile,
    pub to: Tile,
}

impl TileRect {
    pub fn tile_count(&self) -> u64 {
        let width = u64::from(self.from.x.abs_diff(self.to.x)) + 1;
        let height = u64::from(self.from.y.abs_diff(self.to.y)) + 1;
        width.saturating_mul(height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorPlacement {
    pub tile: Tile,
    #[serde(default)]
    pub open: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcPlacement {
    pub name: String,
    pub start: Tile,
    pub schedule: PatrolSchedule,
    #[serde(default)]
    pub config: NpcConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicePlacement {
    pub name: String,
    pub base: Tile,
    #[serde(default)]
    pub config: PoliceConfig,
}

/// Scripted player input for headless runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptAction {
    Step { direction: Direction },
    WalkTo { goal: Tile },
    Wait { minutes: u32 },
    /// Real time with no input, for idle advance and paced actions.
    Idle { millis: u64 },
    OpenDoor,
    ToggleDoor { tile: Tile },
    Encumber { encumbered: bool },
}

impl ScriptAction {
    pub fn as_token(self) -> &'static str {
        match self {
            Self::Step { .. } => "step",
            Self::WalkTo { .. } => "walk_to",
            Self::Wait { .. } => "wait",
            Self::Idle { .. } => "idle",
            Self::OpenDoor => "open_door",
            Self::ToggleDoor { .. } => "toggle_door",
            Self::Encumber { .. } => "encumber",
        }
    }
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse scenario json{}: {source}", at_suffix(.at))]
    Parse {
        at: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("validation failed at {field}: {message}")]
    Invalid { field: String, message: String },
}

fn at_suffix(at: &str) -> String {
    if at.is_empty() || at == "." {
        String::new()
    } else {
        format!(" at {at}")
    }
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ScenarioError {
    ScenarioError::Invalid {
        field: field.into(),
        message: message.into(),
    }
}

pub fn parse_scenario_json(raw: &str) -> Result<Scenario, ScenarioError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, Scenario>(&mut deserializer).map_err(|error| {
        let at = error.path().to_string();
        ScenarioError::Parse {
            at,
            source: error.into_inner(),
        }
    })
}

pub fn load_scenario(path: &Path) -> Result<Scenario, ScenarioError> {
    let raw = fs::read_to_string(path).map_err(|source| ScenarioError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let scenario = parse_scenario_json(&raw)?;
    info!(
        path = %path.display(),
        name = %scenario.name,
        npcs = scenario.npcs.len(),
        police = scenario.police.len(),
        script_actions = scenario.script.len(),
        "scenario_loaded"
    );
    Ok(scenario)
}

impl Scenario {
    pub fn sim_config(&self) -> SimConfig {
        SimConfig {
            seed: self.seed,
            clock: self.clock,
            player: self.player,
        }
    }

    pub fn build_world(&self) -> WorldGrid {
        let mut world = WorldGrid::new(self.map_origin);
        for tile in &self.obstacles {
            world.obstacles.insert(*tile);
        }
        for rect in &self.obstacle_rects {
            world.obstacles.fill_rect(rect.from, rect.to);
        }
        for tile in &self.hide_spots {
            world.hide_spots.insert(*tile);
        }
        for door in &self.doors {
            world
                .doors
                .register(door.tile, DoorState::from_open(door.open));
        }
        world
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        if u64::from(self.clock.starting_hour) >= HOURS_PER_DAY {
            return Err(invalid(
                "clock.starting_hour",
                format!("expected 0..{HOURS_PER_DAY}, got {}", self.clock.starting_hour),
            ));
        }

        for (index, rect) in self.obstacle_rects.iter().enumerate() {
            let tiles = rect.tile_count();
            if tiles > MAX_RECT_TILES {
                return Err(invalid(
                    format!("obstacle_rects[{index}]"),
                    format!("covers {tiles} tiles, limit is {MAX_RECT_TILES}"),
                ));
            }
        }

        let world = self.build_world();
        if world.is_static_obstacle(self.player_start) {
            return Err(invalid(
                "player_start",
                format!("{} is a static obstacle", self.player_start),
            ));
        }

        let mut names = HashSet::new();
        for (index, npc) in self.npcs.iter().enumerate() {
            if !names.insert(npc.name.as_str()) {
                return Err(invalid(
                    format!("npcs[{index}].name"),
                    format!("duplicate agent name '{}'", npc.name),
                ));
            }
            if !npc.schedule.is_complete() {
                return Err(invalid(
                    format!("npcs[{index}].schedule"),
                    format!(
                        "expected {SCHEDULE_BLOCKS} entries, got {}",
                        npc.schedule.centers().len()
                    ),
                ));
            }
            if world.is_static_obstacle(npc.start) {
                return Err(invalid(
                    format!("npcs[{index}].start"),
                    format!("{} is a static obstacle", npc.start),
                ));
            }
        }

        for (index, officer) in self.police.iter().enumerate() {
            if !names.insert(officer.name.as_str()) {
                return Err(invalid(
                    format!("police[{index}].name"),
                    format!("duplicate agent name '{}'", officer.name),
                ));
            }
            if officer.config.tiles_per_minute == 0 {
                return Err(invalid(
                    format!("police[{index}].config.tiles_per_minute"),
                    "must be at least 1",
                ));
            }
            if world.is_static_obstacle(officer.base) {
                return Err(invalid(
                    format!("police[{index}].base"),
                    format!("{} is a static obstacle", officer.base),
                ));
            }
        }
        Ok(())
    }
}

impl Simulation {
    /// Validated world plus every agent, NPCs first, in file order. The
    /// simulation is returned unstarted.
    pub fn from_scenario(scenario: &Scenario) -> Result<Self, ScenarioError> {
        scenario.validate()?;
        let mut sim = Simulation::new(
            scenario.sim_config(),
            scenario.build_world(),
            scenario.player_start,
        );
        for npc in &scenario.npcs {
            sim.register_npc(npc.name.clone(), npc.start, npc.schedule.clone(), npc.config);
        }
        for officer in &scenario.police {
            sim.register_police(officer.name.clone(), officer.base, officer.config);
        }
        Ok(sim)
    }
}
