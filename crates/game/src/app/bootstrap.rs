use std::env;
use std::path::PathBuf;

use stealth_engine::{
    load_scenario, resolve_app_paths, ScenarioError, ScriptAction, Simulation, StartupError,
};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::loop_runner::LoopConfig;

const SCENARIO_ENV_VAR: &str = "STEALTH_SCENARIO";
const REALTIME_ENV_VAR: &str = "STEALTH_REALTIME";

#[derive(Debug, Error)]
pub(crate) enum HostError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
}

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) scenario_path: PathBuf,
    pub(crate) sim: Simulation,
    pub(crate) script: Vec<ScriptAction>,
}

pub(crate) fn build_app() -> Result<AppWiring, HostError> {
    init_tracing();
    info!("=== Stealth Sim Startup ===");

    let scenario_path = match choose_scenario_path(env::args().nth(1), env::var(SCENARIO_ENV_VAR).ok()) {
        Some(path) => path,
        None => resolve_app_paths()?.default_scenario(),
    };
    let scenario = load_scenario(&scenario_path)?;
    let sim = Simulation::from_scenario(&scenario)?;

    let config = LoopConfig {
        realtime: parse_flag(env::var(REALTIME_ENV_VAR).ok().as_deref()),
        ..LoopConfig::default()
    };
    info!(
        scenario = %scenario_path.display(),
        realtime = config.realtime,
        agents = sim.agents().count(),
        "host_configured"
    );

    Ok(AppWiring {
        config,
        scenario_path,
        sim,
        script: scenario.script,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

/// CLI argument first, then the environment; `None` means the bundled demo.
fn choose_scenario_path(arg: Option<String>, env_value: Option<String>) -> Option<PathBuf> {
    [arg, env_value]
        .into_iter()
        .flatten()
        .map(|raw| raw.trim().to_string())
        .find(|raw| !raw.is_empty())
        .map(PathBuf::from)
}

fn parse_flag(raw: Option<&str>) -> bool {
    raw.map(str::trim).is_some_and(|value| {
        value == "1" || value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes")
    })
}
