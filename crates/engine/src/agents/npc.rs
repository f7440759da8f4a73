use std::collections::VecDeque;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::grid::Tile;
use crate::path::{find_path, has_line_of_sight};
use crate::scheduler::{Agent, AgentContext, AgentError, AgentKind, AgentStatus};

/// Number of two-hour blocks in a day.
pub const SCHEDULE_BLOCKS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NpcConfig {
    pub patrol_radius: u32,
    /// Chebyshev half-width of the detection square (2 => 5x5).
    pub detection_range: u32,
    pub patrol_interval_minutes: u32,
    pub max_patrol_point_attempts: u32,
}

impl Default for NpcConfig {
    fn default() -> Self {
        Self {
            patrol_radius: 6,
            detection_range: 2,
            patrol_interval_minutes: 1,
            max_patrol_point_attempts: 50,
        }
    }
}

/// Patrol centers, one per two-hour block, starting at midnight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatrolSchedule {
    centers: Vec<Tile>,
}

impl PatrolSchedule {
    pub fn new(centers: Vec<Tile>) -> Self {
        Self { centers }
    }

    /// Same center for every block.
    pub fn uniform(center: Tile) -> Self {
        Self {
            centers: vec![center; SCHEDULE_BLOCKS],
        }
    }

    pub fn center_for_hour(&self, hour: u32) -> Option<Tile> {
        self.centers.get((hour / 2) as usize).copied()
    }

    pub fn centers(&self) -> &[Tile] {
        &self.centers
    }

    pub fn is_complete(&self) -> bool {
        self.centers.len() == SCHEDULE_BLOCKS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpcState {
    Idle,
    Busy,
    Patrolling,
}

impl NpcState {
    pub fn as_token(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Patrolling => "patrolling",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveIntent {
    None,
    ToPatrolCenter,
    PatrolPoint,
    Custom,
}

/// Schedule-driven civilian: walks to its block's patrol center, wanders
/// around it one tile per minute, and reports the player when it sees them.
#[derive(Debug, Clone)]
pub struct NpcAgent {
    name: String,
    config: NpcConfig,
    schedule: PatrolSchedule,
    tile: Tile,
    state: NpcState,
    intent: MoveIntent,
    path: VecDeque<Tile>,
    patrol_center: Option<Tile>,
    center_pending: bool,
    patrol_cooldown: u32,
    last_detection: Option<(u64, Tile)>,
}

impl NpcAgent {
    pub fn new(name: impl Into<String>, schedule: PatrolSchedule, config: NpcConfig) -> Self {
        Self {
            name: name.into(),
            config,
            schedule,
            tile: Tile::ZERO,
            state: NpcState::Idle,
            intent: MoveIntent::None,
            path: VecDeque::new(),
            patrol_center: None,
            center_pending: false,
            patrol_cooldown: 0,
            last_detection: None,
        }
    }

    pub fn state(&self) -> NpcState {
        self.state
    }

    pub fn intent(&self) -> MoveIntent {
        self.intent
    }

    pub fn patrol_center(&self) -> Option<Tile> {
        self.patrol_center
    }

    pub fn patrol_cooldown(&self) -> u32 {
        self.patrol_cooldown
    }

    pub fn queued_path(&self) -> impl Iterator<Item = &Tile> {
        self.path.iter()
    }

    fn cooldown_cycle(&self) -> u32 {
        self.config.patrol_interval_minutes.max(1)
    }

    fn enter_patrol(&mut self) {
        self.state = NpcState::Patrolling;
        self.intent = MoveIntent::None;
        self.patrol_cooldown = 0;
        self.center_pending = false;
    }

    fn assign_path(&mut self, path: Vec<Tile>, intent: MoveIntent) {
        self.path = path.into();
        self.intent = intent;
        self.state = NpcState::Busy;
    }

    fn complete_intent(&mut self) {
        match self.intent {
            MoveIntent::ToPatrolCenter => self.enter_patrol(),
            MoveIntent::PatrolPoint => {
                self.state = NpcState::Patrolling;
                self.patrol_cooldown = self.cooldown_cycle();
            }
            MoveIntent::Custom | MoveIntent::None => self.state = NpcState::Idle,
        }
        self.intent = MoveIntent::None;
    }

    /// Path from the current tile with this NPC's walkability view. A target
    /// that is itself blocked fails without a search.
    fn plan_path(&self, target: Tile, ctx: &AgentContext<'_>) -> Option<Vec<Tile>> {
        let index = ctx.occupancy_aware_index();
        if target != self.tile && !index.is_walkable(target) {
            return None;
        }
        find_path(self.tile, target, &index, None)
    }

    /// An empty path means the target is already reached and the intent
    /// resolves immediately.
    fn try_path_to(&mut self, target: Tile, intent: MoveIntent, ctx: &AgentContext<'_>) -> bool {
        let Some(path) = self.plan_path(target, ctx) else {
            debug!(npc = %self.name, from = %self.tile, to = %target, "npc_path_failed");
            return false;
        };
        if path.is_empty() {
            self.intent = intent;
            self.complete_intent();
        } else {
            self.assign_path(path, intent);
        }
        true
    }

    fn head_to_patrol_center(&mut self, ctx: &AgentContext<'_>) {
        let Some(center) = self.patrol_center else {
            return;
        };
        if self.tile == center {
            self.enter_patrol();
            return;
        }
        if self.try_path_to(center, MoveIntent::ToPatrolCenter, ctx) {
            self.center_pending = false;
        } else {
            self.path.clear();
            self.intent = MoveIntent::None;
            self.state = NpcState::Idle;
            self.center_pending = true;
            self.patrol_cooldown = self.cooldown_cycle();
        }
    }

    fn pick_patrol_point(&self, center: Tile, ctx: &mut AgentContext<'_>) -> Option<Tile> {
        let radius = self.config.patrol_radius.min(i32::MAX as u32) as i32;
        for _ in 0..self.config.max_patrol_point_attempts {
            let candidate = center.offset(
                ctx.rng.gen_range(-radius..=radius),
                ctx.rng.gen_range(-radius..=radius),
            );
            if ctx.occupancy_aware_index().is_walkable(candidate) {
                return Some(candidate);
            }
        }
        None
    }

    fn queue_random_patrol_destination(&mut self, ctx: &mut AgentContext<'_>) {
        let Some(center) = self.patrol_center else {
            return;
        };
        let Some(point) = self.pick_patrol_point(center, ctx) else {
            debug!(npc = %self.name, center = %center, "npc_patrol_point_exhausted");
            self.patrol_cooldown = self.cooldown_cycle();
            return;
        };
        if point == self.tile {
            self.patrol_cooldown = self.cooldown_cycle();
            return;
        }
        if !self.try_path_to(point, MoveIntent::PatrolPoint, ctx) {
            self.patrol_cooldown = self.cooldown_cycle();
        }
    }

    /// The next queued tile became unwalkable: re-plan to the same
    /// destination, or give up the path for one cooldown cycle.
    fn recover_blocked_step(&mut self, ctx: &AgentContext<'_>) -> bool {
        let Some(destination) = self.path.back().copied() else {
            return false;
        };
        let intent = self.intent;
        match self.plan_path(destination, ctx) {
            Some(path) if !path.is_empty() => {
                debug!(npc = %self.name, destination = %destination, "npc_step_blocked_repathed");
                self.assign_path(path, intent);
                true
            }
            _ => {
                debug!(npc = %self.name, destination = %destination, "npc_step_blocked_abandoned");
                self.path.clear();
                match intent {
                    MoveIntent::ToPatrolCenter => {
                        self.state = NpcState::Idle;
                        self.center_pending = true;
                    }
                    MoveIntent::PatrolPoint => self.state = NpcState::Patrolling,
                    MoveIntent::Custom | MoveIntent::None => self.state = NpcState::Idle,
                }
                self.intent = MoveIntent::None;
                self.patrol_cooldown = self.cooldown_cycle();
                false
            }
        }
    }

    fn step_along_path(&mut self, ctx: &mut AgentContext<'_>) {
        let Some(next) = self.path.front().copied() else {
            return;
        };
        if !ctx.occupancy_aware_index().is_walkable(next) && !self.recover_blocked_step(ctx) {
            return;
        }
        let Some(next) = self.path.pop_front() else {
            return;
        };

        let from = self.tile;
        self.tile = next;
        ctx.commit_move(from, next, true);

        if self.path.is_empty() {
            self.complete_intent();
        }
    }

    fn try_detect_player(&mut self, ctx: &mut AgentContext<'_>) {
        let Some(player) = ctx.player_tile else {
            return;
        };
        if self.config.detection_range == 0 || self.tile.chebyshev(player) > self.config.detection_range {
            return;
        }
        let world = ctx.world;
        if !has_line_of_sight(self.tile, player, |tile| world.is_static_obstacle(tile)) {
            return;
        }
        if self.last_detection == Some((ctx.minute, player)) {
            return;
        }
        self.last_detection = Some((ctx.minute, player));
        ctx.report_detection(player);
    }
}

impl Agent for NpcAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Npc
    }

    fn tile(&self) -> Tile {
        self.tile
    }

    fn status(&self) -> AgentStatus {
        AgentStatus::Npc(self.state)
    }

    fn place_at(&mut self, tile: Tile) {
        self.tile = tile;
    }

    fn on_schedule(&mut self, ctx: &mut AgentContext<'_>) -> Result<(), AgentError> {
        let hour = ctx.time_of_day().hour;
        let center = self
            .schedule
            .center_for_hour(hour)
            .ok_or_else(|| AgentError::MissingSchedule {
                name: self.name.clone(),
                hour,
            })?;
        debug!(npc = %self.name, hour, center = %center, "npc_patrol_center_assigned");
        self.patrol_center = Some(center);
        self.head_to_patrol_center(ctx);
        Ok(())
    }

    fn on_minute(&mut self, ctx: &mut AgentContext<'_>) -> Result<(), AgentError> {
        self.try_detect_player(ctx);

        if !self.path.is_empty() {
            self.step_along_path(ctx);
            return Ok(());
        }

        if self.center_pending {
            if self.patrol_cooldown > 0 {
                self.patrol_cooldown -= 1;
                return Ok(());
            }
            self.head_to_patrol_center(ctx);
            return Ok(());
        }

        if self.state != NpcState::Patrolling {
            return Ok(());
        }
        if self.patrol_cooldown > 0 {
            self.patrol_cooldown -= 1;
            return Ok(());
        }
        self.queue_random_patrol_destination(ctx);
        Ok(())
    }

    fn order_to(&mut self, goal: Tile, ctx: &mut AgentContext<'_>) -> Result<(), AgentError> {
        let path = self
            .plan_path(goal, ctx)
            .ok_or_else(|| AgentError::NoPath {
                name: self.name.clone(),
                from: self.tile,
                to: goal,
            })?;
        if path.is_empty() {
            warn!(npc = %self.name, goal = %goal, "npc_empty_order_ignored");
            return Ok(());
        }
        self.center_pending = false;
        self.assign_path(path, MoveIntent::Custom);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SimEventKind;
    use crate::scheduler::AgentScheduler;
    use crate::test_support::Harness;

    fn npc(name: &str, center: Tile) -> Box<NpcAgent> {
        Box::new(NpcAgent::new(
            name,
            PatrolSchedule::uniform(center),
            NpcConfig::default(),
        ))
    }

    fn npc_state(scheduler: &AgentScheduler, name: &str) -> (Tile, AgentStatus) {
        let id = scheduler.find_by_name(name).expect("registered");
        let agent = scheduler.agent(id).expect("agent");
        (agent.tile(), agent.status())
    }

    #[test]
    fn schedule_uses_two_hour_blocks() {
        let centers = (0..12).map(|block| Tile::new(block, 0)).collect::<Vec<_>>();
        let schedule = PatrolSchedule::new(centers);
        assert!(schedule.is_complete());
        assert_eq!(schedule.center_for_hour(0), Some(Tile::new(0, 0)));
        assert_eq!(schedule.center_for_hour(9), Some(Tile::new(4, 0)));
        assert_eq!(schedule.center_for_hour(23), Some(Tile::new(11, 0)));
        assert_eq!(PatrolSchedule::new(Vec::new()).center_for_hour(8), None);
    }

    #[test]
    fn walks_to_patrol_center_one_tile_per_minute() {
        let mut harness = Harness::new();
        let mut scheduler = AgentScheduler::new(480);
        scheduler.register_agent(npc("walker", Tile::new(3, 0)), Tile::ZERO, &mut harness.occupancy);

        scheduler.dispatch_schedule(&mut harness.env());
        assert_eq!(
            npc_state(&scheduler, "walker"),
            (Tile::ZERO, AgentStatus::Npc(NpcState::Busy))
        );

        scheduler.process_until(482, &mut harness.env());
        assert_eq!(npc_state(&scheduler, "walker").0, Tile::new(2, 0));

        scheduler.process_until(483, &mut harness.env());
        assert_eq!(
            npc_state(&scheduler, "walker"),
            (Tile::new(3, 0), AgentStatus::Npc(NpcState::Patrolling))
        );
        let moves = harness.drain_kind(SimEventKind::AgentMoved);
        assert_eq!(moves.len(), 3);
        let id = scheduler.find_by_name("walker").expect("walker");
        assert_eq!(harness.occupancy.occupant(Tile::new(3, 0)), Some(id));
        assert!(!harness.occupancy.is_occupied(Tile::ZERO));
    }

    #[test]
    fn already_at_center_enters_patrol_immediately() {
        let mut harness = Harness::new();
        let mut scheduler = AgentScheduler::new(480);
        scheduler.register_agent(npc("sitter", Tile::new(1, 1)), Tile::new(1, 1), &mut harness.occupancy);
        scheduler.dispatch_schedule(&mut harness.env());
        assert_eq!(
            npc_state(&scheduler, "sitter").1,
            AgentStatus::Npc(NpcState::Patrolling)
        );
    }

    #[test]
    fn patrolling_npc_stays_within_radius() {
        let mut harness = Harness::new();
        let mut scheduler = AgentScheduler::new(480);
        let center = Tile::new(10, 10);
        scheduler.register_agent(npc("roamer", center), center, &mut harness.occupancy);
        scheduler.dispatch_schedule(&mut harness.env());

        for minute in 481..=560 {
            scheduler.process_until(minute, &mut harness.env());
            let (tile, _) = npc_state(&scheduler, "roamer");
            assert!(tile.chebyshev(center) <= 6, "{tile} left the patrol square");
        }
        assert!(!harness.drain_kind(SimEventKind::AgentMoved).is_empty());
    }

    #[test]
    fn occupied_center_is_never_entered() {
        let mut harness = Harness::new();
        let mut scheduler = AgentScheduler::new(480);
        let target = Tile::new(4, 4);
        let pinned = NpcConfig {
            patrol_radius: 0,
            ..NpcConfig::default()
        };
        let holder = NpcAgent::new("holder", PatrolSchedule::uniform(target), pinned);
        scheduler.register_agent(Box::new(holder), target, &mut harness.occupancy);
        scheduler.register_agent(npc("seeker", target), Tile::new(0, 4), &mut harness.occupancy);
        scheduler.dispatch_schedule(&mut harness.env());

        for minute in 481..=490 {
            scheduler.process_until(minute, &mut harness.env());
            assert_ne!(npc_state(&scheduler, "seeker").0, target);
        }
        assert_eq!(npc_state(&scheduler, "holder").0, target);
        assert_eq!(scheduler.total_faults(), 0);
    }

    #[test]
    fn neighbor_patrol_never_picks_held_tile() {
        let mut harness = Harness::new();
        let mut scheduler = AgentScheduler::new(480);
        let held = Tile::new(4, 4);
        let pinned = NpcConfig {
            patrol_radius: 0,
            ..NpcConfig::default()
        };
        let holder = NpcAgent::new("holder", PatrolSchedule::uniform(held), pinned);
        scheduler.register_agent(Box::new(holder), held, &mut harness.occupancy);

        let tight = NpcConfig {
            patrol_radius: 1,
            ..NpcConfig::default()
        };
        let center = Tile::new(4, 3);
        let seeker = NpcAgent::new("seeker", PatrolSchedule::uniform(center), tight);
        scheduler.register_agent(Box::new(seeker), center, &mut harness.occupancy);
        scheduler.dispatch_schedule(&mut harness.env());

        for minute in 481..=539 {
            scheduler.process_until(minute, &mut harness.env());
            let (tile, _) = npc_state(&scheduler, "seeker");
            // Detours around the held tile may step one row outside the square.
            assert_ne!(tile, held);
            assert!(tile.chebyshev(center) <= 2);
        }
        assert_eq!(npc_state(&scheduler, "holder").0, held);
    }

    #[test]
    fn path_routes_around_occupied_tile() {
        let mut harness = Harness::new();
        for y in [-1, 1] {
            harness.world.obstacles.insert(Tile::new(2, y));
        }
        let mut scheduler = AgentScheduler::new(480);
        scheduler.register_agent(npc("blocker", Tile::new(2, 0)), Tile::new(2, 0), &mut harness.occupancy);
        let walker = scheduler.register_agent(npc("walker", Tile::new(4, 0)), Tile::ZERO, &mut harness.occupancy);

        scheduler
            .order_agent_to(walker, Tile::new(4, 0), &mut harness.env())
            .expect("order");
        for minute in 481..=500 {
            scheduler.process_until(minute, &mut harness.env());
            assert_ne!(npc_state(&scheduler, "walker").0, Tile::new(2, 0));
        }
        assert_eq!(npc_state(&scheduler, "walker").0, Tile::new(4, 0));
    }

    #[test]
    fn blocked_step_triggers_repath() {
        let mut harness = Harness::new();
        let mut scheduler = AgentScheduler::new(480);
        let walker = scheduler.register_agent(npc("walker", Tile::new(9, 9)), Tile::ZERO, &mut harness.occupancy);
        scheduler
            .order_agent_to(walker, Tile::new(3, 0), &mut harness.env())
            .expect("order");

        let intruder = scheduler.register_agent(npc("intruder", Tile::new(9, 9)), Tile::new(5, 5), &mut harness.occupancy);
        scheduler
            .place_agent(intruder, Tile::new(1, 0), &mut harness.occupancy)
            .expect("place");

        scheduler.process_until(481, &mut harness.env());
        let (tile, status) = npc_state(&scheduler, "walker");
        assert_ne!(tile, Tile::new(1, 0));
        assert!(tile.is_adjacent(Tile::ZERO));
        assert_eq!(status, AgentStatus::Npc(NpcState::Busy));
    }

    #[test]
    fn custom_order_ends_idle() {
        let mut harness = Harness::new();
        let mut scheduler = AgentScheduler::new(480);
        let id = scheduler.register_agent(npc("courier", Tile::new(9, 9)), Tile::ZERO, &mut harness.occupancy);
        scheduler
            .order_agent_to(id, Tile::new(0, 2), &mut harness.env())
            .expect("order");
        scheduler.process_until(482, &mut harness.env());
        assert_eq!(
            npc_state(&scheduler, "courier"),
            (Tile::new(0, 2), AgentStatus::Npc(NpcState::Idle))
        );

        let repeat = scheduler.order_agent_to(id, Tile::new(0, 2), &mut harness.env());
        assert_eq!(repeat, Ok(()));
    }

    #[test]
    fn missing_schedule_is_a_logged_fault_not_a_crash() {
        let mut harness = Harness::new();
        let mut scheduler = AgentScheduler::new(480);
        let agent = NpcAgent::new("lost", PatrolSchedule::default(), NpcConfig::default());
        let id = scheduler.register_agent(Box::new(agent), Tile::ZERO, &mut harness.occupancy);
        scheduler.dispatch_schedule(&mut harness.env());
        scheduler.process_until(481, &mut harness.env());

        assert_eq!(scheduler.faults_for(id), Some(1));
        assert_eq!(
            npc_state(&scheduler, "lost"),
            (Tile::ZERO, AgentStatus::Npc(NpcState::Idle))
        );
    }

    #[test]
    fn detection_needs_range_and_line_of_sight() {
        let mut harness = Harness::new();
        let mut scheduler = AgentScheduler::new(480);
        scheduler.register_agent(npc("watcher", Tile::ZERO), Tile::ZERO, &mut harness.occupancy);

        harness.player_tile = Some(Tile::new(2, 2));
        scheduler.process_until(481, &mut harness.env());
        assert_eq!(harness.drain_kind(SimEventKind::PlayerDetected).len(), 1);

        harness.player_tile = Some(Tile::new(3, 0));
        scheduler.process_until(482, &mut harness.env());
        assert!(harness.drain_kind(SimEventKind::PlayerDetected).is_empty());

        harness.world.obstacles.insert(Tile::new(1, 0));
        harness.player_tile = Some(Tile::new(2, 0));
        scheduler.process_until(483, &mut harness.env());
        assert!(harness.drain_kind(SimEventKind::PlayerDetected).is_empty());
    }
}
