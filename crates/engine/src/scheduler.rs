use std::collections::HashSet;
use std::fmt;

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::agents::{NpcState, PoliceState};
use crate::clock::{TimeOfDay, MINUTES_PER_HOUR};
use crate::events::{SimEvent, SimEventBus};
use crate::grid::{GridIndex, OccupancyMap, Tile, WorldGrid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    Npc,
    Police,
}

impl AgentKind {
    pub fn as_token(self) -> &'static str {
        match self {
            Self::Npc => "npc",
            Self::Police => "police",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    Npc(NpcState),
    Police(PoliceState),
}

impl AgentStatus {
    pub fn as_token(self) -> &'static str {
        match self {
            Self::Npc(state) => state.as_token(),
            Self::Police(state) => state.as_token(),
        }
    }
}

/// "Intruder seen here at this minute", tagged with the agent that saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionReport {
    pub tile: Tile,
    pub minute: u64,
    pub source: AgentId,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("{id} is not registered")]
    UnknownAgent { id: AgentId },
    #[error("agent '{name}' does not accept movement orders")]
    OrdersNotSupported { name: String },
    #[error("agent '{name}' found no path from {from} to {to}")]
    NoPath { name: String, from: Tile, to: Tile },
    #[error("agent '{name}' has no patrol center for hour {hour}")]
    MissingSchedule { name: String, hour: u32 },
}

/// A simulated actor driven one minute at a time. Implementations own their
/// authoritative tile and move it only through [`AgentContext::commit_move`].
pub trait Agent {
    fn name(&self) -> &str;
    fn kind(&self) -> AgentKind;
    fn tile(&self) -> Tile;
    fn status(&self) -> AgentStatus;

    fn is_visible(&self) -> bool {
        true
    }

    /// Whether this agent's tile is entered into the shared occupancy map.
    fn occupies_tile(&self) -> bool {
        true
    }

    /// World placement; the only position write that is not a completed step.
    fn place_at(&mut self, tile: Tile);

    /// Hour-boundary hook, run before that minute's per-minute updates.
    fn on_schedule(&mut self, ctx: &mut AgentContext<'_>) -> Result<(), AgentError>;

    fn on_minute(&mut self, ctx: &mut AgentContext<'_>) -> Result<(), AgentError>;

    fn on_detection_report(
        &mut self,
        _report: DetectionReport,
        _ctx: &mut AgentContext<'_>,
    ) -> Result<(), AgentError> {
        Ok(())
    }

    /// Externally ordered movement to `goal`.
    fn order_to(&mut self, _goal: Tile, _ctx: &mut AgentContext<'_>) -> Result<(), AgentError> {
        Err(AgentError::OrdersNotSupported {
            name: self.name().to_string(),
        })
    }
}

/// Mutable world access handed to the scheduler for one processing pass.
pub struct SchedulerEnv<'a> {
    pub world: &'a WorldGrid,
    pub occupancy: &'a mut OccupancyMap,
    pub player_tile: Option<Tile>,
    pub rng: &'a mut ChaCha8Rng,
    pub events: &'a mut SimEventBus,
}

/// Everything one agent may read or write during a single hook call.
pub struct AgentContext<'a> {
    pub agent: AgentId,
    pub minute: u64,
    pub world: &'a WorldGrid,
    pub player_tile: Option<Tile>,
    pub rng: &'a mut ChaCha8Rng,
    occupancy: &'a mut OccupancyMap,
    events: &'a mut SimEventBus,
    reports: &'a mut Vec<DetectionReport>,
    detections_seen: &'a mut HashSet<(AgentId, Tile, u64)>,
}

impl<'a> AgentContext<'a> {
    pub fn time_of_day(&self) -> TimeOfDay {
        TimeOfDay::from_total_minutes(self.minute)
    }

    pub fn occupancy(&self) -> &OccupancyMap {
        self.occupancy
    }

    /// Walkability as seen by a tile-occupying agent: other agents block, its
    /// own tile does not, closed doors block.
    pub fn occupancy_aware_index(&self) -> GridIndex<'_> {
        self.world
            .index()
            .with_occupancy(self.occupancy)
            .exempting_agent(self.agent)
    }

    pub fn player_is_hidden(&self) -> bool {
        self.player_tile
            .is_some_and(|tile| self.world.is_hide_spot(tile))
    }

    /// Completes one step: updates occupancy (when the agent holds a tile)
    /// and announces the move.
    pub fn commit_move(&mut self, from: Tile, to: Tile, occupies_tile: bool) {
        if occupies_tile {
            self.occupancy.move_agent(self.agent, from, to);
        }
        self.events.emit(SimEvent::AgentMoved {
            agent: self.agent,
            from,
            to,
        });
    }

    /// Raises a sighting. Repeats of the same (tile, minute) by this agent
    /// are dropped.
    pub fn report_detection(&mut self, tile: Tile) {
        if !self.detections_seen.insert((self.agent, tile, self.minute)) {
            return;
        }
        debug!(agent = %self.agent, tile = %tile, minute = self.minute, "player_detected");
        self.reports.push(DetectionReport {
            tile,
            minute: self.minute,
            source: self.agent,
        });
        self.events.emit(SimEvent::PlayerDetected {
            agent: self.agent,
            tile,
            minute: self.minute,
        });
    }

    pub fn report_capture(&mut self, tile: Tile) {
        info!(agent = %self.agent, tile = %tile, minute = self.minute, "player_caught");
        self.events.emit(SimEvent::PlayerCaught {
            agent: self.agent,
            tile,
            minute: self.minute,
        });
    }
}

struct AgentEntry {
    id: AgentId,
    agent: Box<dyn Agent>,
    faults: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hook {
    Schedule,
    Minute,
    Report(DetectionReport),
    Order(Tile),
}

impl Hook {
    fn as_token(self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Minute => "minute",
            Self::Report(_) => "detection_report",
            Self::Order(_) => "order",
        }
    }
}

/// Fans elapsed clock minutes out to every registered agent in registration
/// order, one minute at a time, and relays detection reports between them.
pub struct AgentScheduler {
    entries: Vec<AgentEntry>,
    next_id: u64,
    last_processed_minute: u64,
    broadcast_seen: HashSet<(Tile, u64)>,
    detections_seen: HashSet<(AgentId, Tile, u64)>,
    total_faults: u32,
}

impl AgentScheduler {
    pub fn new(start_minute: u64) -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
            last_processed_minute: start_minute,
            broadcast_seen: HashSet::new(),
            detections_seen: HashSet::new(),
            total_faults: 0,
        }
    }

    pub fn last_processed_minute(&self) -> u64 {
        self.last_processed_minute
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_faults(&self) -> u32 {
        self.total_faults
    }

    pub fn faults_for(&self, id: AgentId) -> Option<u32> {
        self.entry_index(id).map(|index| self.entries[index].faults)
    }

    pub fn register_agent(
        &mut self,
        mut agent: Box<dyn Agent>,
        initial_tile: Tile,
        occupancy: &mut OccupancyMap,
    ) -> AgentId {
        let id = AgentId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);

        agent.place_at(initial_tile);
        if agent.occupies_tile() {
            occupancy.claim(id, initial_tile);
        }
        info!(
            agent = %id,
            name = agent.name(),
            kind = agent.kind().as_token(),
            tile = %initial_tile,
            "agent_registered"
        );
        self.entries.push(AgentEntry {
            id,
            agent,
            faults: 0,
        });
        id
    }

    /// Re-initializes an agent's position from world placement. A tile that
    /// is already held by someone else is taken over with a warning.
    pub fn place_agent(
        &mut self,
        id: AgentId,
        tile: Tile,
        occupancy: &mut OccupancyMap,
    ) -> Result<(), AgentError> {
        let index = self
            .entry_index(id)
            .ok_or(AgentError::UnknownAgent { id })?;
        let agent = &mut self.entries[index].agent;
        if agent.occupies_tile() {
            occupancy.move_agent(id, agent.tile(), tile);
        }
        agent.place_at(tile);
        Ok(())
    }

    pub fn unregister_agent(
        &mut self,
        id: AgentId,
        occupancy: &mut OccupancyMap,
    ) -> Option<Box<dyn Agent>> {
        let index = self.entry_index(id)?;
        let entry = self.entries.remove(index);
        if entry.agent.occupies_tile() {
            occupancy.release(id, entry.agent.tile());
        }
        info!(agent = %id, name = entry.agent.name(), "agent_unregistered");
        Some(entry.agent)
    }

    pub fn agent(&self, id: AgentId) -> Option<&dyn Agent> {
        self.entry_index(id)
            .map(|index| self.entries[index].agent.as_ref())
    }

    pub fn agents(&self) -> impl Iterator<Item = (AgentId, &dyn Agent)> {
        self.entries
            .iter()
            .map(|entry| (entry.id, entry.agent.as_ref()))
    }

    pub fn find_by_name(&self, name: &str) -> Option<AgentId> {
        self.entries
            .iter()
            .find(|entry| entry.agent.name() == name)
            .map(|entry| entry.id)
    }

    /// Runs every agent's schedule hook for the current minute without
    /// advancing. Used once at simulation start.
    pub fn dispatch_schedule(&mut self, env: &mut SchedulerEnv<'_>) {
        let minute = self.last_processed_minute;
        for index in 0..self.entries.len() {
            self.run_hook(index, Hook::Schedule, minute, env);
        }
    }

    /// Schedule hook for a single agent, e.g. one registered after start.
    pub fn dispatch_schedule_for(
        &mut self,
        id: AgentId,
        env: &mut SchedulerEnv<'_>,
    ) -> Result<(), AgentError> {
        let index = self
            .entry_index(id)
            .ok_or(AgentError::UnknownAgent { id })?;
        let minute = self.last_processed_minute;
        self.run_hook(index, Hook::Schedule, minute, env);
        Ok(())
    }

    /// Hands `goal` to the agent's own path planner.
    pub fn order_agent_to(
        &mut self,
        id: AgentId,
        goal: Tile,
        env: &mut SchedulerEnv<'_>,
    ) -> Result<(), AgentError> {
        let index = self
            .entry_index(id)
            .ok_or(AgentError::UnknownAgent { id })?;
        let minute = self.last_processed_minute;
        let mut raised = Vec::new();
        let result = self.invoke(index, Hook::Order(goal), minute, env, &mut raised);
        self.broadcast(raised, env);
        result
    }

    /// Processes every minute in `(last_processed, total_minutes]` in order.
    /// Returns the number of minutes processed.
    pub fn process_until(&mut self, total_minutes: u64, env: &mut SchedulerEnv<'_>) -> u64 {
        if total_minutes <= self.last_processed_minute {
            return 0;
        }
        let first = self.last_processed_minute.saturating_add(1);
        for minute in first..=total_minutes {
            self.last_processed_minute = minute;
            self.broadcast_seen
                .retain(|(_, seen_minute)| *seen_minute >= minute);
            self.detections_seen
                .retain(|(_, _, seen_minute)| *seen_minute >= minute);

            if minute % MINUTES_PER_HOUR == 0 {
                for index in 0..self.entries.len() {
                    self.run_hook(index, Hook::Schedule, minute, env);
                }
            }
            for index in 0..self.entries.len() {
                self.run_hook(index, Hook::Minute, minute, env);
            }
        }
        total_minutes - first + 1
    }

    fn run_hook(&mut self, index: usize, hook: Hook, minute: u64, env: &mut SchedulerEnv<'_>) {
        let mut raised = Vec::new();
        if let Err(error) = self.invoke(index, hook, minute, env, &mut raised) {
            self.record_fault(index, hook, minute, &error, env);
        }
        self.broadcast(raised, env);
    }

    fn invoke(
        &mut self,
        index: usize,
        hook: Hook,
        minute: u64,
        env: &mut SchedulerEnv<'_>,
        raised: &mut Vec<DetectionReport>,
    ) -> Result<(), AgentError> {
        let entry = &mut self.entries[index];
        let mut ctx = build_context(env, entry.id, minute, raised, &mut self.detections_seen);
        observe_status_changes(entry, &mut ctx, |agent, ctx| match hook {
            Hook::Schedule => agent.on_schedule(ctx),
            Hook::Minute => agent.on_minute(ctx),
            Hook::Report(report) => agent.on_detection_report(report, ctx),
            Hook::Order(goal) => agent.order_to(goal, ctx),
        })
    }

    fn record_fault(
        &mut self,
        index: usize,
        hook: Hook,
        minute: u64,
        error: &AgentError,
        env: &mut SchedulerEnv<'_>,
    ) {
        let entry = &mut self.entries[index];
        entry.faults = entry.faults.saturating_add(1);
        self.total_faults = self.total_faults.saturating_add(1);
        warn!(
            agent = %entry.id,
            name = entry.agent.name(),
            hook = hook.as_token(),
            minute,
            %error,
            "agent_hook_failed"
        );
        env.events.emit(SimEvent::AgentFaulted {
            agent: entry.id,
            minute,
        });
    }

    /// Delivers each new (tile, minute) report to every agent in registration
    /// order, including reports raised while handling earlier ones.
    fn broadcast(&mut self, mut pending: Vec<DetectionReport>, env: &mut SchedulerEnv<'_>) {
        while !pending.is_empty() {
            let batch = std::mem::take(&mut pending);
            for report in batch {
                if !self.broadcast_seen.insert((report.tile, report.minute)) {
                    continue;
                }
                info!(
                    tile = %report.tile,
                    minute = report.minute,
                    source = %report.source,
                    "detection_broadcast"
                );
                env.events.emit(SimEvent::DetectionBroadcast {
                    tile: report.tile,
                    minute: report.minute,
                });
                for index in 0..self.entries.len() {
                    let hook = Hook::Report(report);
                    if let Err(error) = self.invoke(index, hook, report.minute, env, &mut pending) {
                        self.record_fault(index, hook, report.minute, &error, env);
                    }
                }
            }
        }
    }

    fn entry_index(&self, id: AgentId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == id)
    }
}

fn build_context<'a>(
    env: &'a mut SchedulerEnv<'_>,
    agent: AgentId,
    minute: u64,
    reports: &'a mut Vec<DetectionReport>,
    detections_seen: &'a mut HashSet<(AgentId, Tile, u64)>,
) -> AgentContext<'a> {
    AgentContext {
        agent,
        minute,
        world: env.world,
        player_tile: env.player_tile,
        rng: &mut *env.rng,
        occupancy: &mut *env.occupancy,
        events: &mut *env.events,
        reports,
        detections_seen,
    }
}

fn observe_status_changes(
    entry: &mut AgentEntry,
    ctx: &mut AgentContext<'_>,
    hook: impl FnOnce(&mut dyn Agent, &mut AgentContext<'_>) -> Result<(), AgentError>,
) -> Result<(), AgentError> {
    let status_before = entry.agent.status();
    let visible_before = entry.agent.is_visible();
    let result = hook(entry.agent.as_mut(), ctx);

    let status_after = entry.agent.status();
    if status_after != status_before {
        debug!(
            agent = %entry.id,
            from = status_before.as_token(),
            to = status_after.as_token(),
            minute = ctx.minute,
            "agent_status_changed"
        );
        ctx.events.emit(SimEvent::AgentStatusChanged {
            agent: entry.id,
            from: status_before,
            to: status_after,
        });
    }
    let visible_after = entry.agent.is_visible();
    if visible_after != visible_before {
        ctx.events.emit(SimEvent::AgentVisibilityChanged {
            agent: entry.id,
            visible: visible_after,
        });
    }
    result
}
