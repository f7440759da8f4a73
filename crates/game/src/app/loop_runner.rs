use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use stealth_engine::Simulation;
use tracing::{error, info, warn};

use super::bootstrap::AppWiring;
use super::driver::{DriverStatus, ScriptDriver};
use super::metrics::MetricsAccumulator;

#[derive(Debug, Clone)]
pub(crate) struct LoopConfig {
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
    /// Pace ticks against the wall clock; otherwise feed synthetic time.
    pub realtime: bool,
    /// Safety stop for scripts that never finish.
    pub max_total_ticks: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            realtime: false,
            max_total_ticks: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunEnd {
    ScriptFinished,
    Caught,
    TickLimit,
}

impl RunEnd {
    fn as_token(self) -> &'static str {
        match self {
            Self::ScriptFinished => "script_finished",
            Self::Caught => "caught",
            Self::TickLimit => "tick_limit",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct RunSummary {
    pub scenario: String,
    pub end: &'static str,
    pub final_time: String,
    pub total_minutes: u64,
    pub player_tile: (i32, i32),
    pub caught: bool,
    pub capture_minute: Option<u64>,
    pub actions_executed: u32,
    pub actions_failed: u32,
    pub detections: u32,
    pub broadcasts: u32,
    pub agent_faults: u32,
    pub ticks: u64,
    pub digest: String,
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring {
        config,
        scenario_path,
        mut sim,
        script,
    } = app;

    let mut driver = ScriptDriver::new(script);
    sim.start();
    let (end, ticks) = run_loop(&config, &mut sim, &mut driver);

    let summary = summarize(&scenario_path.display().to_string(), end, ticks, &sim, &driver);
    info!(
        end = summary.end,
        time = %summary.final_time,
        caught = summary.caught,
        digest = %summary.digest,
        "run_finished"
    );
    match serde_json::to_string(&summary) {
        Ok(line) => println!("{line}"),
        Err(err) => {
            error!(error = %err, "summary_encode_failed");
            return ExitCode::FAILURE;
        }
    }

    if end == RunEnd::TickLimit {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

pub(crate) fn run_loop(
    config: &LoopConfig,
    sim: &mut Simulation,
    driver: &mut ScriptDriver,
) -> (RunEnd, u64) {
    let fixed_dt = Duration::from_secs_f64(1.0 / f64::from(config.target_tps.max(1)));
    let mut metrics = MetricsAccumulator::new(config.metrics_log_interval);
    let mut accumulator = Duration::ZERO;
    let mut last_frame_instant = Instant::now();
    let mut total_ticks = 0u64;

    loop {
        let frame_start = Instant::now();
        let raw_frame_dt = if config.realtime {
            frame_start.saturating_duration_since(last_frame_instant)
        } else {
            fixed_dt
        };
        last_frame_instant = frame_start;

        accumulator = accumulator.saturating_add(clamp_frame_delta(raw_frame_dt, config.max_frame_delta));
        let step_plan = plan_sim_steps(accumulator, fixed_dt, config.max_ticks_per_frame);
        for _ in 0..step_plan.ticks_to_run {
            let minutes_before = sim.total_minutes();
            let status = driver.tick(sim, fixed_dt);
            total_ticks = total_ticks.saturating_add(1);
            metrics.record_tick(sim.total_minutes().saturating_sub(minutes_before));

            match status {
                DriverStatus::Running => {}
                DriverStatus::Finished => return (RunEnd::ScriptFinished, total_ticks),
                DriverStatus::Caught => return (RunEnd::Caught, total_ticks),
            }
            if total_ticks >= config.max_total_ticks {
                warn!(total_ticks, "run_tick_limit_reached");
                return (RunEnd::TickLimit, total_ticks);
            }
        }
        accumulator = step_plan.remaining_accumulator;

        if step_plan.dropped_backlog > Duration::ZERO {
            warn!(
                dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                max_ticks_per_frame = config.max_ticks_per_frame,
                "sim_clamp_triggered"
            );
        }

        metrics.record_frame(raw_frame_dt);
        if let Some(snapshot) = metrics.maybe_snapshot(Instant::now()) {
            info!(
                tps = snapshot.tps,
                sim_minutes_per_second = snapshot.sim_minutes_per_second,
                frame_time_ms = snapshot.frame_time_ms,
                time = %sim.time_of_day(),
                "loop_metrics"
            );
        }

        if config.realtime {
            let spent = Instant::now().saturating_duration_since(frame_start);
            let sleep = fixed_dt.saturating_sub(spent);
            if sleep > Duration::ZERO {
                thread::sleep(sleep);
            }
        }
    }
}

fn summarize(
    scenario: &str,
    end: RunEnd,
    ticks: u64,
    sim: &Simulation,
    driver: &ScriptDriver,
) -> RunSummary {
    let counts = sim.event_counts();
    let player = sim.player().tile();
    RunSummary {
        scenario: scenario.to_string(),
        end: end.as_token(),
        final_time: sim.time_of_day().to_string(),
        total_minutes: sim.total_minutes(),
        player_tile: (player.x, player.y),
        caught: sim.is_player_caught(),
        capture_minute: sim.capture().map(|capture| capture.minute),
        actions_executed: driver.executed(),
        actions_failed: driver.failed(),
        detections: counts.detections,
        broadcasts: counts.broadcasts,
        agent_faults: sim.agent_faults(),
        ticks,
        digest: sim.state_digest(),
    }
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

#[cfg(test)]
mod tests {
    use stealth_engine::{parse_scenario_json, Direction, ScriptAction, Tile};

    use super::*;

    fn demo_sim() -> Simulation {
        let scenario = parse_scenario_json(
            r#"{ "player_start": { "x": 0, "y": 0 }, "doors": [{ "tile": { "x": 1, "y": 0 } }] }"#,
        )
        .expect("scenario");
        let mut sim = Simulation::from_scenario(&scenario).expect("sim");
        sim.start();
        sim
    }

    #[test]
    fn clamp_frame_delta_caps_large_frame() {
        let max_frame_delta = Duration::from_millis(250);
        assert_eq!(
            clamp_frame_delta(Duration::from_millis(600), max_frame_delta),
            max_frame_delta
        );
    }

    #[test]
    fn plan_sim_steps_runs_expected_ticks_without_drop() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(48), fixed_dt, 5);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_sim_steps_drops_backlog_when_tick_cap_hit() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(120), fixed_dt, 3);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::from_millis(72));
    }

    #[test]
    fn instant_loop_runs_script_to_completion() {
        let mut sim = demo_sim();
        let mut driver = ScriptDriver::new([
            ScriptAction::OpenDoor,
            ScriptAction::Step {
                direction: Direction::Right,
            },
            ScriptAction::WalkTo {
                goal: Tile::new(4, 0),
            },
        ]);

        let (end, ticks) = run_loop(&LoopConfig::default(), &mut sim, &mut driver);
        assert_eq!(end, RunEnd::ScriptFinished);
        assert!(ticks > 0);
        assert_eq!(sim.player().tile(), Tile::new(4, 0));
        assert_eq!(sim.total_minutes(), 480 + 6 + 1 + 3);

        let summary = summarize("inline", end, ticks, &sim, &driver);
        assert_eq!(summary.end, "script_finished");
        assert_eq!(summary.actions_executed, 3);
        assert!(!summary.caught);
        assert_eq!(summary.final_time, "08:10");
    }

    #[test]
    fn tick_limit_stops_runaway_scripts() {
        let mut sim = demo_sim();
        let mut driver = ScriptDriver::new([ScriptAction::Idle { millis: 60_000 }]);
        let config = LoopConfig {
            max_total_ticks: 10,
            ..LoopConfig::default()
        };

        let (end, ticks) = run_loop(&config, &mut sim, &mut driver);
        assert_eq!(end, RunEnd::TickLimit);
        assert_eq!(ticks, 10);
    }
}
