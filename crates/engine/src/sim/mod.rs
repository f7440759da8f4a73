mod player;

use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agents::{NpcAgent, NpcConfig, PatrolSchedule, PoliceAgent, PoliceConfig};
use crate::clock::{Clock, ClockEvent, ClockSettings, PacedAdvanceId, TimeOfDay};
use crate::digest;
use crate::events::{SimEvent, SimEventBus, SimEventCounts};
use crate::grid::{OccupancyMap, Tile, WorldGrid};
use crate::scheduler::{Agent, AgentError, AgentId, AgentScheduler, AgentStatus, SchedulerEnv};

pub use player::{ActionError, PlayerConfig, PlayerState};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub seed: u64,
    pub clock: ClockSettings,
    pub player: PlayerConfig,
}

/// First capture of the run. Later captures are still emitted as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRecord {
    pub agent: AgentId,
    pub tile: Tile,
    pub minute: u64,
}

/// Owns every piece of simulation state. The clock exists before the
/// scheduler, and the scheduler before any agent.
pub struct Simulation {
    clock: Clock,
    scheduler: AgentScheduler,
    world: WorldGrid,
    occupancy: OccupancyMap,
    player: PlayerState,
    rng: ChaCha8Rng,
    events: SimEventBus,
    started: bool,
    capture: Option<CaptureRecord>,
}

impl Simulation {
    pub fn new(config: SimConfig, world: WorldGrid, player_start: Tile) -> Self {
        let clock = Clock::new(config.clock);
        let scheduler = AgentScheduler::new(clock.total_minutes());
        info!(
            seed = config.seed,
            time = %clock.time_of_day(),
            origin = %world.origin,
            "simulation_created"
        );
        Self {
            clock,
            scheduler,
            world,
            occupancy: OccupancyMap::new(),
            player: PlayerState::new(player_start, config.player),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            events: SimEventBus::default(),
            started: false,
            capture: None,
        }
    }

    /// Announces the starting time and hands every registered agent its
    /// schedule for the current hour. Idempotent.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        info!(
            time = %self.clock.time_of_day(),
            agents = self.scheduler.len(),
            "simulation_started"
        );
        self.events.emit(SimEvent::TimeChanged {
            total_minutes: self.clock.total_minutes(),
            time: self.clock.time_of_day(),
        });
        self.with_scheduler(|scheduler, env| scheduler.dispatch_schedule(env));
        self.record_capture();
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn total_minutes(&self) -> u64 {
        self.clock.total_minutes()
    }

    pub fn time_of_day(&self) -> TimeOfDay {
        self.clock.time_of_day()
    }

    pub fn is_paced_advance_running(&self) -> bool {
        self.clock.is_paced_advance_running()
    }

    pub fn remaining_idle(&self) -> Option<Duration> {
        self.clock.remaining_idle()
    }

    pub fn reset_idle_timer(&mut self) {
        self.clock.reset_idle_timer();
    }

    pub fn advance_minutes(&mut self, minutes: u32) {
        self.clock.advance_minutes(minutes);
        self.pump_clock();
    }

    pub fn advance_minutes_paced(&mut self, minutes: u32, interval: Duration) -> PacedAdvanceId {
        let id = self.clock.advance_minutes_paced(minutes, interval);
        self.pump_clock();
        id
    }

    /// Real time entry point for idle advance and paced advances.
    pub fn update(&mut self, real_dt: Duration) {
        self.clock.update(real_dt);
        self.pump_clock();
    }

    pub fn world(&self) -> &WorldGrid {
        &self.world
    }

    pub fn occupancy(&self) -> &OccupancyMap {
        &self.occupancy
    }

    pub fn player(&self) -> &PlayerState {
        &self.player
    }

    pub fn capture(&self) -> Option<CaptureRecord> {
        self.capture
    }

    pub fn is_player_caught(&self) -> bool {
        self.capture.is_some()
    }

    pub fn register_npc(
        &mut self,
        name: impl Into<String>,
        start: Tile,
        schedule: PatrolSchedule,
        config: NpcConfig,
    ) -> AgentId {
        self.register_agent(Box::new(NpcAgent::new(name, schedule, config)), start)
    }

    pub fn register_police(
        &mut self,
        name: impl Into<String>,
        base: Tile,
        config: PoliceConfig,
    ) -> AgentId {
        self.register_agent(Box::new(PoliceAgent::new(name, base, config)), base)
    }

    /// Agents added after [`Simulation::start`] receive their schedule hook
    /// right away.
    pub fn register_agent(&mut self, agent: Box<dyn Agent>, tile: Tile) -> AgentId {
        let id = self
            .scheduler
            .register_agent(agent, tile, &mut self.occupancy);
        if self.started {
            let result =
                self.with_scheduler(|scheduler, env| scheduler.dispatch_schedule_for(id, env));
            if let Err(error) = result {
                warn!(agent = %id, %error, "late_schedule_dispatch_failed");
            }
            self.record_capture();
        }
        id
    }

    pub fn unregister_agent(&mut self, id: AgentId) -> Option<Box<dyn Agent>> {
        self.scheduler.unregister_agent(id, &mut self.occupancy)
    }

    pub fn place_agent(&mut self, id: AgentId, tile: Tile) -> Result<(), AgentError> {
        self.scheduler.place_agent(id, tile, &mut self.occupancy)
    }

    pub fn agent(&self, id: AgentId) -> Option<&dyn Agent> {
        self.scheduler.agent(id)
    }

    pub fn agents(&self) -> impl Iterator<Item = (AgentId, &dyn Agent)> {
        self.scheduler.agents()
    }

    pub fn find_agent(&self, name: &str) -> Option<AgentId> {
        self.scheduler.find_by_name(name)
    }

    pub fn agent_status(&self, id: AgentId) -> Option<AgentStatus> {
        self.scheduler.agent(id).map(|agent| agent.status())
    }

    pub fn agent_faults(&self) -> u32 {
        self.scheduler.total_faults()
    }

    pub fn order_agent_to(&mut self, id: AgentId, goal: Tile) -> Result<(), AgentError> {
        let result = self.with_scheduler(|scheduler, env| scheduler.order_agent_to(id, goal, env));
        self.record_capture();
        result
    }

    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        self.events.drain()
    }

    pub fn event_counts(&self) -> SimEventCounts {
        self.events.lifetime_counts()
    }

    /// Lower-hex SHA-256 over the authoritative state.
    pub fn state_digest(&self) -> String {
        digest::state_digest(
            self.clock.total_minutes(),
            &self.player,
            &self.world,
            &self.occupancy,
            self.scheduler.agents(),
        )
    }

    fn with_scheduler<R>(
        &mut self,
        run: impl FnOnce(&mut AgentScheduler, &mut SchedulerEnv<'_>) -> R,
    ) -> R {
        let mut env = SchedulerEnv {
            world: &self.world,
            occupancy: &mut self.occupancy,
            player_tile: Some(self.player.tile()),
            rng: &mut self.rng,
            events: &mut self.events,
        };
        run(&mut self.scheduler, &mut env)
    }

    /// Forwards clock notifications in order. Each time change catches the
    /// scheduler up before later notifications are handled.
    fn pump_clock(&mut self) {
        for event in self.clock.drain_events() {
            match event {
                ClockEvent::TimeChanged {
                    total_minutes,
                    time,
                } => {
                    self.events
                        .emit(SimEvent::TimeChanged { total_minutes, time });
                    self.with_scheduler(|scheduler, env| {
                        scheduler.process_until(total_minutes, env)
                    });
                }
                ClockEvent::PacedAdvanceCompleted { id, interrupted } => {
                    self.events
                        .emit(SimEvent::PacedAdvanceCompleted { id, interrupted });
                    self.player.finish_action(id);
                }
            }
        }
        self.record_capture();
    }

    fn record_capture(&mut self) {
        if self.capture.is_some() {
            return;
        }
        let first = self.events.iter_pending().find_map(|event| match *event {
            SimEvent::PlayerCaught {
                agent,
                tile,
                minute,
            } => Some(CaptureRecord {
                agent,
                tile,
                minute,
            }),
            _ => None,
        });
        if let Some(record) = first {
            info!(
                agent = %record.agent,
                tile = %record.tile,
                minute = record.minute,
                "run_captured"
            );
            self.capture = Some(record);
        }
    }
}
