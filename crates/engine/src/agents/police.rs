use std::collections::VecDeque;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::grid::Tile;
use crate::path::{find_path, has_line_of_sight};
use crate::scheduler::{
    Agent, AgentContext, AgentError, AgentKind, AgentStatus, DetectionReport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoliceConfig {
    pub tiles_per_minute: u32,
    pub patrol_radius: u32,
    pub patrol_duration_minutes: u32,
    pub hide_delay_minutes: u32,
    pub detection_range: u32,
    pub capture_radius: u32,
    pub max_patrol_point_attempts: u32,
}

impl Default for PoliceConfig {
    fn default() -> Self {
        Self {
            tiles_per_minute: 2,
            patrol_radius: 10,
            patrol_duration_minutes: 30,
            hide_delay_minutes: 10,
            detection_range: 5,
            capture_radius: 1,
            max_patrol_point_attempts: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoliceState {
    Hidden,
    Deploying,
    Patrolling,
    Returning,
    Cooldown,
}

impl PoliceState {
    pub fn as_token(self) -> &'static str {
        match self {
            Self::Hidden => "hidden",
            Self::Deploying => "deploying",
            Self::Patrolling => "patrolling",
            Self::Returning => "returning",
            Self::Cooldown => "cooldown",
        }
    }
}

/// Officer that waits hidden at its base, deploys to detection reports,
/// patrols around the last sighting for a fixed time, then returns and hides.
///
/// Pathing ignores occupancy and treats closed doors as passable. Officers
/// never enter the occupancy map.
#[derive(Debug, Clone)]
pub struct PoliceAgent {
    name: String,
    config: PoliceConfig,
    base: Tile,
    tile: Tile,
    state: PoliceState,
    visible: bool,
    path: VecDeque<Tile>,
    last_detection_tile: Tile,
    active_until: u64,
    cooldown_end: u64,
    step_budget: u32,
    budget_minute: Option<u64>,
    deploy_retry_used: bool,
    player_spotted: bool,
    capture_reported: bool,
    last_reported: Option<(u64, Tile)>,
}

impl PoliceAgent {
    pub fn new(name: impl Into<String>, base: Tile, config: PoliceConfig) -> Self {
        Self {
            name: name.into(),
            config,
            base,
            tile: base,
            state: PoliceState::Hidden,
            visible: false,
            path: VecDeque::new(),
            last_detection_tile: base,
            active_until: 0,
            cooldown_end: 0,
            step_budget: 0,
            budget_minute: None,
            deploy_retry_used: false,
            player_spotted: false,
            capture_reported: false,
            last_reported: None,
        }
    }

    pub fn state(&self) -> PoliceState {
        self.state
    }

    pub fn base(&self) -> Tile {
        self.base
    }

    pub fn active_until(&self) -> u64 {
        self.active_until
    }

    pub fn cooldown_end(&self) -> u64 {
        self.cooldown_end
    }

    pub fn player_spotted(&self) -> bool {
        self.player_spotted
    }

    pub fn capture_reported(&self) -> bool {
        self.capture_reported
    }

    fn teleport_to_base(&mut self, ctx: &mut AgentContext<'_>) {
        if self.tile != self.base {
            ctx.commit_move(self.tile, self.base, false);
            self.tile = self.base;
        }
    }

    fn deploy_from_base(&mut self, ctx: &mut AgentContext<'_>) {
        self.visible = true;
        self.teleport_to_base(ctx);
        self.state = PoliceState::Deploying;
        info!(officer = %self.name, minute = ctx.minute, "police_deployed");
    }

    fn enter_patrol(&mut self) {
        self.state = PoliceState::Patrolling;
        self.step_budget = 0;
    }

    fn begin_return(&mut self, ctx: &AgentContext<'_>) {
        self.build_path_to(self.base, ctx);
        self.state = PoliceState::Returning;
        self.player_spotted = false;
    }

    fn enter_cooldown(&mut self, minute: u64) {
        self.state = PoliceState::Cooldown;
        self.cooldown_end = minute.saturating_add(u64::from(self.config.hide_delay_minutes));
        self.step_budget = 0;
        self.player_spotted = false;
    }

    fn hide(&mut self, ctx: &mut AgentContext<'_>) {
        self.state = PoliceState::Hidden;
        self.path.clear();
        self.step_budget = 0;
        self.visible = false;
        self.teleport_to_base(ctx);
        self.player_spotted = false;
        info!(officer = %self.name, minute = ctx.minute, "police_hidden");
    }

    /// At most `tiles_per_minute` steps per simulated minute, however many
    /// hooks run in it.
    fn grant_budget(&mut self, minute: u64) {
        if self.budget_minute != Some(minute) {
            self.step_budget = self.config.tiles_per_minute;
            self.budget_minute = Some(minute);
        }
    }

    fn build_path_to(&mut self, target: Tile, ctx: &AgentContext<'_>) {
        let index = ctx.world.index().allowing_closed_doors(true);
        let path = if target != self.tile && !index.is_walkable(target) {
            None
        } else {
            find_path(self.tile, target, &index, None)
        };
        match path {
            Some(path) => self.path = path.into(),
            None => {
                debug!(officer = %self.name, from = %self.tile, to = %target, "police_path_failed");
                self.path.clear();
            }
        }
    }

    fn queue_random_patrol_destination(&mut self, ctx: &mut AgentContext<'_>) {
        let radius = self.config.patrol_radius.min(i32::MAX as u32) as i32;
        let center = self.last_detection_tile;
        for _ in 0..self.config.max_patrol_point_attempts {
            let candidate = center.offset(
                ctx.rng.gen_range(-radius..=radius),
                ctx.rng.gen_range(-radius..=radius),
            );
            if ctx.world.index().allowing_closed_doors(true).is_walkable(candidate) {
                self.build_path_to(candidate, ctx);
                return;
            }
        }
    }

    /// Called with an empty path and budget left. Returns whether a step can
    /// be taken now.
    fn refill_path(&mut self, ctx: &mut AgentContext<'_>) -> bool {
        match self.state {
            PoliceState::Patrolling => {
                self.queue_random_patrol_destination(ctx);
                !self.path.is_empty()
            }
            PoliceState::Returning => {
                if self.tile == self.base {
                    self.enter_cooldown(ctx.minute);
                    return false;
                }
                self.build_path_to(self.base, ctx);
                !self.path.is_empty()
            }
            PoliceState::Deploying => {
                if self.tile == self.last_detection_tile {
                    self.enter_patrol();
                    return false;
                }
                if !self.deploy_retry_used {
                    self.deploy_retry_used = true;
                    self.build_path_to(self.last_detection_tile, ctx);
                    if !self.path.is_empty() {
                        return true;
                    }
                }
                debug!(officer = %self.name, target = %self.last_detection_tile, "police_deploy_fallback_patrol");
                self.enter_patrol();
                false
            }
            PoliceState::Hidden | PoliceState::Cooldown => false,
        }
    }

    fn issue_steps(&mut self, ctx: &mut AgentContext<'_>) {
        while self.step_budget > 0 {
            if self.path.is_empty() && !self.refill_path(ctx) {
                return;
            }
            let Some(next) = self.path.pop_front() else {
                return;
            };
            self.step_budget -= 1;
            let from = self.tile;
            self.tile = next;
            ctx.commit_move(from, next, false);

            if self.path.is_empty() {
                match self.state {
                    PoliceState::Deploying => self.enter_patrol(),
                    PoliceState::Returning if self.tile == self.base => {
                        self.enter_cooldown(ctx.minute)
                    }
                    _ => {}
                }
            }
            self.check_player(ctx);
        }
    }

    fn check_player(&mut self, ctx: &mut AgentContext<'_>) {
        let Some(player) = ctx.player_tile else {
            return;
        };
        let hidden = ctx.player_is_hidden();
        let distance = self.tile.chebyshev(player);
        let in_range = distance <= self.config.detection_range;
        let world = ctx.world;
        let has_sight =
            in_range && has_line_of_sight(self.tile, player, |tile| world.is_static_obstacle(tile));

        if !hidden && has_sight && self.last_reported != Some((ctx.minute, player)) {
            self.last_reported = Some((ctx.minute, player));
            ctx.report_detection(player);
        }

        let caught = if hidden {
            has_sight && self.player_spotted
        } else {
            distance <= self.config.capture_radius
        };
        if caught && !self.capture_reported {
            self.capture_reported = true;
            ctx.report_capture(player);
        }
    }
}

impl Agent for PoliceAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Police
    }

    fn tile(&self) -> Tile {
        self.tile
    }

    fn status(&self) -> AgentStatus {
        AgentStatus::Police(self.state)
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn occupies_tile(&self) -> bool {
        false
    }

    /// Placement also moves the base; officers always start hidden there.
    fn place_at(&mut self, tile: Tile) {
        self.base = tile;
        self.tile = tile;
        if self.state == PoliceState::Hidden {
            self.last_detection_tile = tile;
        }
    }

    fn on_schedule(&mut self, _ctx: &mut AgentContext<'_>) -> Result<(), AgentError> {
        Ok(())
    }

    fn on_minute(&mut self, ctx: &mut AgentContext<'_>) -> Result<(), AgentError> {
        match self.state {
            PoliceState::Hidden => return Ok(()),
            PoliceState::Cooldown => {
                if ctx.minute >= self.cooldown_end {
                    self.hide(ctx);
                }
                return Ok(());
            }
            PoliceState::Patrolling if ctx.minute >= self.active_until => {
                debug!(officer = %self.name, minute = ctx.minute, "police_patrol_expired");
                self.begin_return(ctx);
            }
            _ => {}
        }

        self.grant_budget(ctx.minute);
        self.issue_steps(ctx);
        self.check_player(ctx);
        Ok(())
    }

    fn on_detection_report(
        &mut self,
        report: DetectionReport,
        ctx: &mut AgentContext<'_>,
    ) -> Result<(), AgentError> {
        self.last_detection_tile = report.tile;
        self.active_until = report
            .minute
            .saturating_add(u64::from(self.config.patrol_duration_minutes));
        self.player_spotted = true;
        self.deploy_retry_used = false;

        if matches!(self.state, PoliceState::Hidden | PoliceState::Cooldown) {
            self.deploy_from_base(ctx);
        }

        if self.tile == report.tile {
            self.enter_patrol();
            self.queue_random_patrol_destination(ctx);
            return Ok(());
        }

        self.build_path_to(report.tile, ctx);
        self.state = PoliceState::Deploying;
        self.grant_budget(report.minute);
        self.issue_steps(ctx);
        Ok(())
    }
}
