use std::collections::VecDeque;
use std::time::Duration;

use stealth_engine::{ActionError, ScriptAction, SimEvent, Simulation};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DriverStatus {
    Running,
    Finished,
    Caught,
}

/// Feeds scripted player actions into the simulation, one per tick, and only
/// while the player is free to act.
#[derive(Debug)]
pub(crate) struct ScriptDriver {
    pending: VecDeque<ScriptAction>,
    idle_remaining: Duration,
    executed: u32,
    failed: u32,
}

impl ScriptDriver {
    pub(crate) fn new(script: impl IntoIterator<Item = ScriptAction>) -> Self {
        Self {
            pending: script.into_iter().collect(),
            idle_remaining: Duration::ZERO,
            executed: 0,
            failed: 0,
        }
    }

    pub(crate) fn executed(&self) -> u32 {
        self.executed
    }

    pub(crate) fn failed(&self) -> u32 {
        self.failed
    }

    #[cfg(test)]
    pub(crate) fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// One fixed tick: real time first, then at most one scripted action.
    pub(crate) fn tick(&mut self, sim: &mut Simulation, dt: Duration) -> DriverStatus {
        sim.update(dt);
        let status = self.advance_script(sim, dt);
        for event in sim.drain_events() {
            log_event(&event);
        }
        if sim.is_player_caught() {
            DriverStatus::Caught
        } else {
            status
        }
    }

    fn advance_script(&mut self, sim: &mut Simulation, dt: Duration) -> DriverStatus {
        if sim.is_player_caught() {
            return DriverStatus::Caught;
        }
        if !self.idle_remaining.is_zero() {
            self.idle_remaining = self.idle_remaining.saturating_sub(dt);
            return DriverStatus::Running;
        }
        if sim.player().is_busy() {
            return DriverStatus::Running;
        }
        match self.pending.pop_front() {
            Some(action) => {
                self.apply(action, sim);
                DriverStatus::Running
            }
            None if sim.is_paced_advance_running() => DriverStatus::Running,
            None => DriverStatus::Finished,
        }
    }

    fn apply(&mut self, action: ScriptAction, sim: &mut Simulation) {
        let result: Result<(), ActionError> = match action {
            ScriptAction::Step { direction } => sim.player_step(direction),
            ScriptAction::WalkTo { goal } => sim.player_walk_to(goal).map(|steps| {
                debug!(goal = %goal, steps, "script_walk_finished");
            }),
            ScriptAction::Wait { minutes } => {
                sim.advance_minutes(minutes);
                Ok(())
            }
            ScriptAction::Idle { millis } => {
                self.idle_remaining = Duration::from_millis(millis);
                Ok(())
            }
            ScriptAction::OpenDoor => sim.player_open_adjacent_door().map(|_| ()),
            ScriptAction::ToggleDoor { tile } => sim.toggle_door(tile).map(|_| ()),
            ScriptAction::Encumber { encumbered } => {
                sim.set_player_encumbered(encumbered);
                Ok(())
            }
        };

        match result {
            Ok(()) => {
                self.executed = self.executed.saturating_add(1);
                debug!(
                    action = action.as_token(),
                    time = %sim.time_of_day(),
                    player = %sim.player().tile(),
                    "script_action_applied"
                );
            }
            Err(error) => {
                self.failed = self.failed.saturating_add(1);
                warn!(action = action.as_token(), %error, "script_action_failed");
            }
        }
    }
}

fn log_event(event: &SimEvent) {
    match *event {
        SimEvent::TimeChanged { time, .. } => debug!(time = %time, "time_changed"),
        SimEvent::PlayerCaught {
            agent,
            tile,
            minute,
        } => info!(agent = %agent, tile = %tile, minute, "game_over"),
        SimEvent::DetectionBroadcast { tile, minute } => {
            info!(tile = %tile, minute, "alarm_raised")
        }
        SimEvent::DoorChanged { tile, state } => {
            info!(tile = %tile, state = ?state, "door_changed")
        }
        SimEvent::AgentStatusChanged { agent, from, to } => debug!(
            agent = %agent,
            from = from.as_token(),
            to = to.as_token(),
            "agent_state"
        ),
        SimEvent::AgentFaulted { agent, minute } => warn!(agent = %agent, minute, "agent_faulted"),
        other => debug!(event = ?other.kind(), "sim_event"),
    }
}
