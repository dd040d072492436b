#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Patrol agent state machine.
//!
//! A [`PatrolAgent`] walks a patrol route, polls its vision cone against the
//! player, hears stimuli through the [`StimulusBus`], and requests routes from
//! the shared [`GridPathfinder`]. It never moves itself: every tick returns a
//! [`MovementIntent`] that the host applies before reporting the new position
//! through [`PatrolAgent::set_position`].
//!
//! State changes only happen through one internal transition function, which
//! resets the state timer and records an [`AgentEvent::StateChanged`] even
//! when the state is re-entered. Events raised while hearing a stimulus are
//! held until the next tick and handed out together with that tick's events.

use std::{
    cell::{Ref, RefCell, RefMut},
    f32::consts::TAU,
    rc::Rc,
    time::Duration,
};

use serde::Serialize;
use tracing::{debug, info, warn};
use warden_core::{
    AgentEvent, AgentId, AgentState, MovementIntent, ObstacleGrid, Path, PathOutcome,
    PlayerSnapshot, RoomId, StimulusEvent, StimulusKind, Timestamp, Vec2,
};
use warden_system_pathfinding::GridPathfinder;
use warden_system_perception::PerceptionPoller;
use warden_system_stimulus::{
    ListenerError, StimulusBus, StimulusListener, Subscription, SubscriptionId,
};

mod config;
mod route;

pub use config::{
    AgentConfig, AlertConfig, ChaseConfig, ConfigError, HearingConfig, InvestigateConfig,
    MovementConfig, RouteConfig, RouteMode, VisionConfig,
};

use route::PatrolRoute;

/// Everything needed to place a new agent in the level.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentSpawn {
    /// Identifier reported in every event the agent raises.
    pub id: AgentId,
    /// Initial world position.
    pub position: Vec2,
    /// Initial facing. Zero-length vectors fall back to `+X`.
    pub facing: Vec2,
    /// Patrol points in traversal order. May be empty.
    pub route: Vec<Vec2>,
    /// Room the agent belongs to, used to filter scoped stimuli.
    pub room: Option<RoomId>,
    /// Tunables.
    pub config: AgentConfig,
}

impl AgentSpawn {
    /// Creates a spawn description with default tunables and no route.
    #[must_use]
    pub fn new(id: AgentId, position: Vec2) -> Self {
        Self {
            id,
            position,
            facing: Vec2::X,
            route: Vec::new(),
            room: None,
            config: AgentConfig::default(),
        }
    }

    /// Sets the patrol points.
    #[must_use]
    pub fn with_route(mut self, route: Vec<Vec2>) -> Self {
        self.route = route;
        self
    }

    /// Sets the initial facing.
    #[must_use]
    pub fn facing(mut self, facing: Vec2) -> Self {
        self.facing = facing;
        self
    }

    /// Places the agent in a room.
    #[must_use]
    pub fn in_room(mut self, room: RoomId) -> Self {
        self.room = Some(room);
        self
    }

    /// Replaces the tunables.
    #[must_use]
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }
}

/// Services shared by every agent, constructed once by the host.
#[derive(Clone, Debug)]
pub struct AgentServices {
    /// Route planner over the static level.
    pub pathfinder: Rc<GridPathfinder>,
    /// Channel the agents listen on.
    pub bus: Rc<StimulusBus>,
}

/// Read-only export of an agent for renderers and trace output.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentSnapshot {
    /// Agent identifier.
    pub id: AgentId,
    /// Active state.
    pub state: AgentState,
    /// World position.
    pub position: Vec2,
    /// Unit facing vector.
    pub facing: Vec2,
    /// Index of the current patrol point, `None` for an empty route.
    pub route_index: Option<usize>,
    /// Destination of the cached path.
    pub target: Option<Vec2>,
    /// Waypoints of the cached path.
    pub path: Vec<Vec2>,
    /// Index of the next waypoint within `path`.
    pub path_cursor: usize,
    /// Result of the most recent perception poll.
    pub player_visible: bool,
}

#[derive(Clone, Debug, PartialEq)]
struct ActiveRoute {
    path: Path,
    cursor: usize,
    target: Vec2,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum InvestigationPhase {
    Travel { stalled: Duration, last_position: Vec2 },
    Search { elapsed: Duration },
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Investigation {
    source: Vec2,
    anchor: Vec2,
    phase: InvestigationPhase,
}

enum Step {
    Moving(MovementIntent),
    Arrived,
}

/// Guard that patrols, investigates noise and chases the player.
#[derive(Debug)]
pub struct PatrolAgent {
    id: AgentId,
    config: AgentConfig,
    pathfinder: Rc<GridPathfinder>,
    room: Option<RoomId>,
    position: Vec2,
    facing: Vec2,
    state: AgentState,
    state_timer: Duration,
    route: PatrolRoute,
    active: Option<ActiveRoute>,
    poller: PerceptionPoller,
    player_visible: bool,
    last_seen: Option<Vec2>,
    lose_sight_timer: Duration,
    chase_repath_timer: Duration,
    last_bark_at: Option<Timestamp>,
    investigation: Option<Investigation>,
    sweep_base: Vec2,
    alert_focus: Vec2,
    patrol_anchor: Vec2,
    return_anchor: Option<Vec2>,
    pending: Vec<AgentEvent>,
}

impl PatrolAgent {
    /// Creates an agent in the `Patrol` state.
    ///
    /// The agent is not subscribed to any bus; use [`AgentHandle::spawn`] for
    /// that.
    #[must_use]
    pub fn new(spawn: AgentSpawn, pathfinder: Rc<GridPathfinder>) -> Self {
        let AgentSpawn {
            id,
            position,
            facing,
            route,
            room,
            config,
        } = spawn;

        let route = PatrolRoute::new(route, config.route.mode);
        if route.is_empty() {
            warn!(agent = id.get(), "empty patrol route; agent idles until disturbed");
        }
        let facing = facing.try_normalize().unwrap_or(Vec2::X);

        Self {
            id,
            pathfinder,
            room,
            position,
            facing,
            state: AgentState::Patrol,
            state_timer: Duration::ZERO,
            route,
            active: None,
            poller: PerceptionPoller::new(config.vision.poll_interval()),
            player_visible: false,
            last_seen: None,
            lose_sight_timer: Duration::ZERO,
            chase_repath_timer: Duration::ZERO,
            last_bark_at: None,
            investigation: None,
            sweep_base: facing,
            alert_focus: facing,
            patrol_anchor: position,
            return_anchor: None,
            pending: Vec::new(),
            config,
        }
    }

    /// Agent identifier.
    #[must_use]
    pub const fn id(&self) -> AgentId {
        self.id
    }

    /// Active state.
    #[must_use]
    pub const fn state(&self) -> AgentState {
        self.state
    }

    /// Time spent in the active state.
    #[must_use]
    pub const fn state_timer(&self) -> Duration {
        self.state_timer
    }

    /// World position as last reported by the host.
    #[must_use]
    pub const fn position(&self) -> Vec2 {
        self.position
    }

    /// Unit facing vector.
    #[must_use]
    pub const fn facing(&self) -> Vec2 {
        self.facing
    }

    /// Room the agent belongs to.
    #[must_use]
    pub fn room(&self) -> Option<&RoomId> {
        self.room.as_ref()
    }

    /// Tunables in effect.
    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Result of the most recent perception poll.
    #[must_use]
    pub const fn is_player_visible(&self) -> bool {
        self.player_visible
    }

    /// Last position at which the player was seen.
    #[must_use]
    pub const fn last_seen_player(&self) -> Option<Vec2> {
        self.last_seen
    }

    /// Cached path the agent is following, if any.
    #[must_use]
    pub fn current_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|active| &active.path)
    }

    /// Reports the body position after the host applied movement.
    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
    }

    /// Captures the agent for external renderers.
    #[must_use]
    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id,
            state: self.state,
            position: self.position,
            facing: self.facing,
            route_index: self.route.index(),
            target: self.active.as_ref().map(|active| active.target),
            path: self
                .active
                .as_ref()
                .map(|active| active.path.waypoints().to_vec())
                .unwrap_or_default(),
            path_cursor: self.active.as_ref().map_or(0, |active| active.cursor),
            player_visible: self.player_visible,
        }
    }

    /// Advances the agent by `dt`.
    ///
    /// `player` is `None` when the host has no player to offer; the agent then
    /// treats the player as not visible. Events raised since the previous tick
    /// are appended to `out`.
    pub fn tick(
        &mut self,
        dt: Duration,
        player: Option<&PlayerSnapshot>,
        out: &mut Vec<AgentEvent>,
    ) -> MovementIntent {
        self.state_timer = self.state_timer.saturating_add(dt);

        let polled = self.poller.advance(dt).then(|| self.look(player));
        if let Some(visible) = polled {
            self.player_visible = visible;
            if visible {
                self.last_seen = player.map(|player| player.position);
                if self.state != AgentState::Chasing {
                    self.begin_chase();
                }
            }
        }

        let intent = match self.state {
            AgentState::Patrol => self.update_patrol(dt),
            AgentState::Waiting => self.update_waiting(),
            AgentState::Investigating => self.update_investigating(dt),
            AgentState::Alerted => self.update_alerted(),
            AgentState::Chasing => self.update_chasing(dt, player, polled),
        };

        out.append(&mut self.pending);
        intent
    }

    fn look(&self, player: Option<&PlayerSnapshot>) -> bool {
        let Some(player) = player.filter(|player| player.is_detectable()) else {
            return false;
        };
        self.config.vision.cone().sees(
            self.pathfinder.grid(),
            self.position,
            self.facing,
            player.position,
        )
    }

    fn idle(&self) -> MovementIntent {
        MovementIntent::stationary(self.facing)
    }

    fn transition(&mut self, to: AgentState) {
        let from = self.state;
        if from == AgentState::Chasing && to == AgentState::Chasing {
            return;
        }

        let on_route =
            |state: AgentState| matches!(state, AgentState::Patrol | AgentState::Waiting);
        if on_route(from) && !on_route(to) && self.return_anchor.take().is_none() {
            self.patrol_anchor = self.position;
        }

        self.state = to;
        self.state_timer = Duration::ZERO;
        self.active = None;
        if to == AgentState::Waiting {
            self.sweep_base = self.facing;
        }

        debug!(
            agent = self.id.get(),
            from = from.label(),
            to = to.label(),
            "state transition"
        );
        self.pending.push(AgentEvent::StateChanged {
            agent: self.id,
            from,
            to,
        });
    }

    fn return_to_route(&mut self) {
        self.return_anchor = Some(self.patrol_anchor);
        self.investigation = None;
        self.transition(AgentState::Patrol);
    }

    fn begin_chase(&mut self) {
        self.lose_sight_timer = Duration::ZERO;
        self.chase_repath_timer = Duration::ZERO;
        self.investigation = None;
        self.transition(AgentState::Chasing);
    }

    fn plan(&mut self, target: Vec2) {
        let path = self.pathfinder.find_path(self.position, target);
        if let PathOutcome::Fallback(reason) = path.outcome() {
            debug!(
                agent = self.id.get(),
                ?target,
                ?reason,
                "moving straight at unreachable target"
            );
            self.pending.push(AgentEvent::PathFallback {
                agent: self.id,
                target,
                reason,
            });
        }
        self.active = Some(ActiveRoute {
            path,
            cursor: 0,
            target,
        });
    }

    fn ensure_route(&mut self, target: Vec2) {
        let stale = match &self.active {
            Some(active) => active.target.distance(target) > self.config.movement.repath_tolerance,
            None => true,
        };
        if stale {
            self.plan(target);
        }
    }

    fn follow(&mut self, target: Vec2, speed: f32, dt: Duration) -> Step {
        self.ensure_route(target);

        let tolerance = self.config.movement.reach_tolerance;
        let position = self.position;
        let Some(active) = self.active.as_mut() else {
            return Step::Arrived;
        };
        while let Some(waypoint) = active.path.get(active.cursor) {
            if position.distance(waypoint) > tolerance {
                break;
            }
            active.cursor += 1;
        }
        let Some(waypoint) = active.path.get(active.cursor) else {
            return Step::Arrived;
        };

        let offset = waypoint - position;
        let Some(direction) = offset.try_normalize() else {
            return Step::Arrived;
        };
        let step = (speed * dt.as_secs_f32()).min(offset.length());
        self.facing = direction;
        Step::Moving(MovementIntent {
            delta: direction * step,
            facing: direction,
        })
    }

    fn update_patrol(&mut self, dt: Duration) -> MovementIntent {
        let speed = self.config.movement.patrol_speed;

        if let Some(anchor) = self.return_anchor {
            return match self.follow(anchor, speed, dt) {
                Step::Moving(intent) => intent,
                Step::Arrived => {
                    debug!(agent = self.id.get(), "back at patrol anchor");
                    self.return_anchor = None;
                    self.active = None;
                    self.idle()
                }
            };
        }

        let Some(target) = self.route.current() else {
            return self.idle();
        };
        match self.follow(target, speed, dt) {
            Step::Moving(intent) => intent,
            Step::Arrived => {
                self.route.advance();
                self.transition(AgentState::Waiting);
                self.idle()
            }
        }
    }

    fn update_waiting(&mut self) -> MovementIntent {
        let settings = self.config.route;
        if self.state_timer >= settings.wait() {
            self.transition(AgentState::Patrol);
            if let Some(target) = self.route.current() {
                self.plan(target);
            }
            return self.idle();
        }

        self.facing = sweep(
            self.sweep_base,
            settings.sweep_degrees,
            settings.sweep_period_seconds,
            self.state_timer,
        );
        self.idle()
    }

    fn update_alerted(&mut self) -> MovementIntent {
        let settings = self.config.alert;
        if self.state_timer >= settings.duration() {
            self.return_to_route();
            return self.idle();
        }

        self.facing = sweep(
            self.alert_focus,
            settings.scan_degrees,
            settings.scan_period_seconds,
            self.state_timer,
        );
        self.idle()
    }

    fn update_investigating(&mut self, dt: Duration) -> MovementIntent {
        let Some(mut investigation) = self.investigation else {
            self.return_to_route();
            return self.idle();
        };

        let intent = match investigation.phase {
            InvestigationPhase::Travel {
                stalled,
                last_position,
            } => {
                let stalled = if self.position == last_position {
                    stalled.saturating_add(dt)
                } else {
                    Duration::ZERO
                };
                if stalled >= self.config.investigate.timeout() {
                    debug!(
                        agent = self.id.get(),
                        anchor = ?investigation.anchor,
                        "investigation stalled"
                    );
                    self.return_to_route();
                    return self.idle();
                }
                investigation.phase = InvestigationPhase::Travel {
                    stalled,
                    last_position: self.position,
                };

                self.ensure_route(investigation.anchor);
                if self.active.as_ref().is_some_and(|active| active.path.is_fallback()) {
                    warn!(
                        agent = self.id.get(),
                        anchor = ?investigation.anchor,
                        "investigation anchor unreachable"
                    );
                    self.return_to_route();
                    return self.idle();
                }

                let speed = self.config.movement.investigate_speed;
                match self.follow(investigation.anchor, speed, dt) {
                    Step::Moving(intent) => intent,
                    Step::Arrived => {
                        debug!(agent = self.id.get(), anchor = ?investigation.anchor, "searching");
                        investigation.phase = InvestigationPhase::Search {
                            elapsed: Duration::ZERO,
                        };
                        let towards_source = investigation.source - self.position;
                        if let Some(direction) = towards_source.try_normalize() {
                            self.facing = direction;
                        }
                        self.idle()
                    }
                }
            }
            InvestigationPhase::Search { elapsed } => {
                let elapsed = elapsed.saturating_add(dt);
                if elapsed >= self.config.investigate.timeout() {
                    self.return_to_route();
                    return self.idle();
                }
                investigation.phase = InvestigationPhase::Search { elapsed };
                let turn = self.config.investigate.rotate_degrees_per_second.to_radians()
                    * dt.as_secs_f32();
                self.facing = Vec2::from_angle(turn)
                    .rotate(self.facing)
                    .try_normalize()
                    .unwrap_or(self.facing);
                self.idle()
            }
        };

        self.investigation = Some(investigation);
        intent
    }

    fn update_chasing(
        &mut self,
        dt: Duration,
        player: Option<&PlayerSnapshot>,
        polled: Option<bool>,
    ) -> MovementIntent {
        if polled == Some(true) {
            self.lose_sight_timer = Duration::ZERO;
        } else {
            self.lose_sight_timer = self.lose_sight_timer.saturating_add(dt);
        }

        if player.is_some_and(|player| !player.is_alive) {
            debug!(agent = self.id.get(), "player is gone; ending chase");
            self.return_to_route();
            return self.idle();
        }

        let live = player.filter(|player| player.is_detectable());
        if let (true, Some(player)) = (self.player_visible, live) {
            self.last_seen = Some(player.position);
        }

        if let Some(player) = live {
            if self.position.distance(player.position) <= self.config.chase.catch_distance {
                info!(agent = self.id.get(), position = ?player.position, "player caught");
                self.pending.push(AgentEvent::PlayerCaught {
                    agent: self.id,
                    position: player.position,
                });
                self.return_to_route();
                return self.idle();
            }
        }

        let Some(last_seen) = self.last_seen else {
            self.return_to_route();
            return self.idle();
        };

        let tracked = live.map_or(last_seen, |player| player.position);
        if self.position.distance(tracked) > self.config.chase.max_chase_distance {
            debug!(agent = self.id.get(), "player out of chase range");
            self.return_to_route();
            return self.idle();
        }

        if self.lose_sight_timer >= self.config.chase.lose_sight() {
            debug!(agent = self.id.get(), ?last_seen, "lost sight of player");
            self.give_up_chase(last_seen);
            return self.idle();
        }

        self.chase_repath_timer = self.chase_repath_timer.saturating_add(dt);
        let due = self.chase_repath_timer >= self.config.chase.repath_interval();
        let cached = self
            .active
            .as_ref()
            .map(|active| active.target)
            .filter(|_| !due);
        let destination = match cached {
            Some(target) => target,
            None => {
                self.chase_repath_timer = Duration::ZERO;
                self.plan(last_seen);
                last_seen
            }
        };

        match self.follow(destination, self.config.movement.chase_speed, dt) {
            Step::Moving(intent) => intent,
            Step::Arrived => self.idle(),
        }
    }

    fn give_up_chase(&mut self, last_seen: Vec2) {
        if !self.config.chase.investigate_after_losing_sight {
            self.return_to_route();
            return;
        }

        match self.investigate_anchor(last_seen) {
            Some(anchor) => self.begin_investigation(last_seen, anchor),
            None => self.return_to_route(),
        }
    }

    fn begin_investigation(&mut self, source: Vec2, anchor: Vec2) {
        self.investigation = Some(Investigation {
            source,
            anchor,
            phase: InvestigationPhase::Travel {
                stalled: Duration::ZERO,
                last_position: self.position,
            },
        });
        self.transition(AgentState::Investigating);
    }

    fn reachable(&self, point: Vec2) -> bool {
        !self.pathfinder.find_path(self.position, point).is_fallback()
    }

    // Reachable point near `source`, or `None` when the agent cannot get there.
    fn investigate_anchor(&self, source: Vec2) -> Option<Vec2> {
        let grid: &dyn ObstacleGrid = self.pathfinder.grid();
        let settings = self.config.investigate;
        let count = settings.candidate_count;

        let mut candidates: Vec<Vec2> = (0..count)
            .map(|index| {
                let angle = TAU * index as f32 / count as f32;
                source + Vec2::from_angle(angle) * settings.anchor_offset
            })
            .filter(|candidate| !grid.is_point_blocked(*candidate))
            .collect();
        candidates.sort_by(|a, b| {
            a.distance_squared(self.position)
                .total_cmp(&b.distance_squared(self.position))
        });
        if let Some(anchor) = candidates
            .into_iter()
            .find(|candidate| self.reachable(*candidate))
        {
            return Some(anchor);
        }

        let cell = grid.world_to_cell(source);
        let free = self
            .pathfinder
            .nearest_free_cell(cell, settings.free_cell_search_radius)
            .map(|free| grid.cell_center_world(free))
            .filter(|free| self.reachable(*free));
        if free.is_none() {
            warn!(agent = self.id.get(), ?source, "no reachable point near stimulus");
        }
        free
    }

    fn in_scope(&self, event: &StimulusEvent) -> bool {
        match &event.room {
            None => true,
            Some(room) => self.room.as_ref() == Some(room),
        }
    }

    fn in_range(&self, event: &StimulusEvent) -> bool {
        let hearing = &self.config.hearing;
        let radius = match event.kind {
            StimulusKind::Bark => hearing.bark_radius,
            StimulusKind::PuzzleTrigger => hearing.puzzle_radius,
        };
        let radius = match event.hearing_radius_hint {
            Some(hint) if hint.is_finite() && hint > 0.0 => radius.min(hint),
            _ => radius,
        };
        let distance = self.position.distance(event.position);
        distance.is_finite() && distance <= radius
    }

    fn hear_bark(&mut self, event: &StimulusEvent) {
        self.last_bark_at = Some(event.emitted_at);
        self.alert_focus = (event.position - self.position)
            .try_normalize()
            .unwrap_or(self.facing);
        self.facing = self.alert_focus;
        self.investigation = None;
        self.transition(AgentState::Alerted);
    }

    fn hear_puzzle(&mut self, event: &StimulusEvent) {
        if self.state == AgentState::Alerted {
            debug!(agent = self.id.get(), "puzzle noise ignored while alerted");
            return;
        }
        if let Some(last_bark) = self.last_bark_at {
            let window = self.config.hearing.bark_suppression();
            let suppressed = event
                .emitted_at
                .since(last_bark)
                .map_or(true, |gap| gap <= window);
            if suppressed {
                debug!(agent = self.id.get(), "puzzle noise suppressed by recent bark");
                return;
            }
        }

        match self.investigate_anchor(event.position) {
            Some(anchor) => self.begin_investigation(event.position, anchor),
            None => debug!(agent = self.id.get(), "puzzle noise from an unreachable spot ignored"),
        }
    }
}

impl StimulusListener for PatrolAgent {
    fn hear(&mut self, event: &StimulusEvent) -> Result<(), ListenerError> {
        if self.state == AgentState::Chasing {
            return Ok(());
        }
        if !self.in_scope(event) || !self.in_range(event) {
            return Ok(());
        }

        match event.kind {
            StimulusKind::Bark => self.hear_bark(event),
            StimulusKind::PuzzleTrigger => self.hear_puzzle(event),
        }
        Ok(())
    }
}

/// Owner of a spawned agent and of its bus subscription.
///
/// Dropping the handle unsubscribes the agent.
#[derive(Debug)]
pub struct AgentHandle {
    agent: Rc<RefCell<PatrolAgent>>,
    subscription: Subscription,
}

impl AgentHandle {
    /// Creates an agent and subscribes it to the shared bus.
    #[must_use]
    pub fn spawn(spawn: AgentSpawn, services: &AgentServices) -> Self {
        let agent = Rc::new(RefCell::new(PatrolAgent::new(
            spawn,
            Rc::clone(&services.pathfinder),
        )));
        let subscription = services.bus.subscribe(&agent);
        Self {
            agent,
            subscription,
        }
    }

    /// Agent identifier.
    #[must_use]
    pub fn id(&self) -> AgentId {
        self.agent.borrow().id()
    }

    /// Bus subscription held for the agent.
    #[must_use]
    pub fn subscription_id(&self) -> SubscriptionId {
        self.subscription.id()
    }

    /// Borrows the agent.
    ///
    /// # Panics
    ///
    /// Panics if the agent is mutably borrowed, which only happens while it
    /// is ticking or hearing.
    #[must_use]
    pub fn agent(&self) -> Ref<'_, PatrolAgent> {
        self.agent.borrow()
    }

    /// Mutably borrows the agent.
    ///
    /// # Panics
    ///
    /// Panics if the agent is already borrowed.
    #[must_use]
    pub fn agent_mut(&self) -> RefMut<'_, PatrolAgent> {
        self.agent.borrow_mut()
    }

    /// Ticks the agent. See [`PatrolAgent::tick`].
    pub fn tick(
        &self,
        dt: Duration,
        player: Option<&PlayerSnapshot>,
        out: &mut Vec<AgentEvent>,
    ) -> MovementIntent {
        self.agent.borrow_mut().tick(dt, player, out)
    }

    /// Captures the agent for external renderers.
    #[must_use]
    pub fn snapshot(&self) -> AgentSnapshot {
        self.agent.borrow().snapshot()
    }
}

// Facing that oscillates around `base` by up to `half_angle_degrees`.
fn sweep(base: Vec2, half_angle_degrees: f32, period_seconds: f32, elapsed: Duration) -> Vec2 {
    if period_seconds <= 0.0 {
        return base;
    }
    let phase = elapsed.as_secs_f32() / period_seconds * TAU;
    let angle = half_angle_degrees.to_radians() * phase.sin();
    Vec2::from_angle(angle).rotate(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_world::TileGrid;

    const DT: Duration = Duration::from_millis(100);

    fn pathfinder(rows: &[&str]) -> Rc<GridPathfinder> {
        let grid = TileGrid::from_rows(rows, 1.0).expect("layout");
        Rc::new(GridPathfinder::new(Rc::new(grid)))
    }

    fn open_pathfinder() -> Rc<GridPathfinder> {
        pathfinder(&[
            "........", "........", "........", "........", "........", "........",
        ])
    }

    fn agent_at(position: Vec2) -> PatrolAgent {
        PatrolAgent::new(AgentSpawn::new(AgentId::new(1), position), open_pathfinder())
    }

    fn at(seconds: f32) -> Timestamp {
        Timestamp::from_elapsed(Duration::from_secs_f32(seconds))
    }

    fn bark(position: Vec2, emitted_at: Timestamp) -> StimulusEvent {
        StimulusEvent::new(StimulusKind::Bark, position, emitted_at)
    }

    fn puzzle(position: Vec2, emitted_at: Timestamp) -> StimulusEvent {
        StimulusEvent::new(StimulusKind::PuzzleTrigger, position, emitted_at)
    }

    fn hear(agent: &mut PatrolAgent, event: &StimulusEvent) {
        agent.hear(event).expect("agents never reject stimuli");
    }

    fn run(
        agent: &mut PatrolAgent,
        player: Option<&PlayerSnapshot>,
        ticks: usize,
        events: &mut Vec<AgentEvent>,
    ) {
        for _ in 0..ticks {
            let intent = agent.tick(DT, player, events);
            agent.set_position(agent.position() + intent.delta);
        }
    }

    fn changed(events: &[AgentEvent], from: AgentState, to: AgentState) -> bool {
        events.iter().any(|event| {
            matches!(
                event,
                AgentEvent::StateChanged { from: f, to: t, .. } if *f == from && *t == to
            )
        })
    }

    #[test]
    fn patrol_reaches_point_then_waits_then_resumes() {
        let spawn = AgentSpawn::new(AgentId::new(1), Vec2::new(0.5, 0.5))
            .with_route(vec![Vec2::new(4.5, 0.5), Vec2::new(0.5, 0.5)]);
        let mut agent = PatrolAgent::new(spawn, open_pathfinder());
        let mut events = Vec::new();

        run(&mut agent, None, 30, &mut events);
        assert_eq!(agent.state(), AgentState::Waiting);
        assert!(agent.position().distance(Vec2::new(4.5, 0.5)) < 0.11);
        assert_eq!(agent.snapshot().route_index, Some(1));

        run(&mut agent, None, 10, &mut events);
        assert_eq!(agent.state(), AgentState::Patrol);
        assert!(changed(&events, AgentState::Waiting, AgentState::Patrol));
        assert_eq!(agent.snapshot().target, Some(Vec2::new(0.5, 0.5)));
    }

    #[test]
    fn waiting_sweeps_facing() {
        let spawn = AgentSpawn::new(AgentId::new(1), Vec2::new(0.5, 0.5))
            .with_route(vec![Vec2::new(0.5, 0.5)]);
        let mut agent = PatrolAgent::new(spawn, open_pathfinder());
        let mut events = Vec::new();

        run(&mut agent, None, 2, &mut events);
        assert_eq!(agent.state(), AgentState::Waiting);
        let before = agent.facing();
        run(&mut agent, None, 5, &mut events);
        assert!(agent.facing().angle_between(before).abs() > 0.1);
        assert!((agent.facing().length() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn empty_route_idles() {
        let mut agent = agent_at(Vec2::new(2.5, 2.5));
        let mut events = Vec::new();
        let intent = agent.tick(DT, None, &mut events);
        assert!(!intent.is_moving());
        assert_eq!(agent.state(), AgentState::Patrol);
        assert!(events.is_empty());
    }

    #[test]
    fn visible_player_starts_chase_on_first_poll() {
        let mut agent = agent_at(Vec2::new(0.5, 0.5));
        let player = PlayerSnapshot::at(Vec2::new(3.5, 0.5));
        let mut events = Vec::new();

        let _ = agent.tick(DT, Some(&player), &mut events);

        assert_eq!(agent.state(), AgentState::Chasing);
        assert!(changed(&events, AgentState::Patrol, AgentState::Chasing));
        assert_eq!(agent.last_seen_player(), Some(player.position));
    }

    #[test]
    fn hidden_or_behind_player_is_not_chased() {
        let mut agent = agent_at(Vec2::new(3.5, 0.5));
        let mut hidden = PlayerSnapshot::at(Vec2::new(5.5, 0.5));
        hidden.is_hidden = true;
        let behind = PlayerSnapshot::at(Vec2::new(1.5, 0.5));
        let mut events = Vec::new();

        run(&mut agent, Some(&hidden), 3, &mut events);
        run(&mut agent, Some(&behind), 3, &mut events);

        assert_eq!(agent.state(), AgentState::Patrol);
        assert!(!agent.is_player_visible());
    }

    #[test]
    fn chase_ends_with_single_catch() {
        let mut agent = agent_at(Vec2::new(0.5, 0.5));
        let mut player = PlayerSnapshot::at(Vec2::new(3.5, 0.5));
        let mut events = Vec::new();

        for _ in 0..20 {
            let intent = agent.tick(DT, Some(&player), &mut events);
            agent.set_position(agent.position() + intent.delta);
            if events
                .iter()
                .any(|event| matches!(event, AgentEvent::PlayerCaught { .. }))
            {
                player.is_alive = false;
            }
        }

        let catches = events
            .iter()
            .filter(|event| matches!(event, AgentEvent::PlayerCaught { .. }))
            .count();
        assert_eq!(catches, 1);
        assert_ne!(agent.state(), AgentState::Chasing);
    }

    #[test]
    fn losing_sight_returns_toward_patrol_anchor() {
        let anchor = Vec2::new(0.5, 0.5);
        let mut agent = agent_at(anchor);
        let visible = PlayerSnapshot::at(Vec2::new(4.5, 0.5));
        let mut hidden = visible;
        hidden.is_hidden = true;
        let mut events = Vec::new();

        run(&mut agent, Some(&visible), 1, &mut events);
        assert_eq!(agent.state(), AgentState::Chasing);

        run(&mut agent, Some(&hidden), 25, &mut events);
        assert_eq!(agent.state(), AgentState::Chasing);

        run(&mut agent, Some(&hidden), 8, &mut events);
        assert_eq!(agent.state(), AgentState::Patrol);
        assert!(changed(&events, AgentState::Chasing, AgentState::Patrol));
        assert_eq!(agent.snapshot().target, Some(anchor));
    }

    #[test]
    fn losing_sight_can_lead_to_investigation() {
        let mut config = AgentConfig::default();
        config.chase.investigate_after_losing_sight = true;
        let spawn = AgentSpawn::new(AgentId::new(1), Vec2::new(0.5, 0.5)).with_config(config);
        let mut agent = PatrolAgent::new(spawn, open_pathfinder());
        let visible = PlayerSnapshot::at(Vec2::new(4.5, 0.5));
        let mut hidden = visible;
        hidden.is_hidden = true;
        let mut events = Vec::new();

        run(&mut agent, Some(&visible), 1, &mut events);
        run(&mut agent, Some(&hidden), 32, &mut events);

        assert!(changed(&events, AgentState::Chasing, AgentState::Investigating));
    }

    #[test]
    fn bark_alerts_and_faces_source() {
        let mut agent = agent_at(Vec2::new(0.5, 0.5));
        hear(&mut agent, &bark(Vec2::new(0.5, 4.5), at(0.0)));

        assert_eq!(agent.state(), AgentState::Alerted);
        assert!(agent.facing().distance(Vec2::Y) < 1e-5);

        let mut events = Vec::new();
        let _ = agent.tick(Duration::ZERO, None, &mut events);
        assert!(changed(&events, AgentState::Patrol, AgentState::Alerted));
    }

    #[test]
    fn second_bark_reenters_alerted_and_resets_timer() {
        let mut agent = agent_at(Vec2::new(0.5, 0.5));
        let mut events = Vec::new();
        hear(&mut agent, &bark(Vec2::new(2.5, 0.5), at(0.0)));
        run(&mut agent, None, 10, &mut events);
        assert_eq!(agent.state_timer(), Duration::from_secs(1));

        hear(&mut agent, &bark(Vec2::new(2.5, 0.5), at(1.0)));
        run(&mut agent, None, 1, &mut events);

        assert_eq!(agent.state(), AgentState::Alerted);
        assert_eq!(agent.state_timer(), DT);
        assert!(changed(&events, AgentState::Alerted, AgentState::Alerted));
    }

    #[test]
    fn alert_expires_back_to_patrol() {
        let mut agent = agent_at(Vec2::new(0.5, 0.5));
        let mut events = Vec::new();
        hear(&mut agent, &bark(Vec2::new(2.5, 0.5), at(0.0)));
        run(&mut agent, None, 26, &mut events);
        assert_eq!(agent.state(), AgentState::Patrol);
        assert!(changed(&events, AgentState::Alerted, AgentState::Patrol));
    }

    #[test]
    fn bark_overrides_investigation() {
        let mut agent = agent_at(Vec2::new(0.5, 0.5));
        hear(&mut agent, &puzzle(Vec2::new(5.5, 0.5), at(0.0)));
        assert_eq!(agent.state(), AgentState::Investigating);

        hear(&mut agent, &bark(Vec2::new(1.5, 2.5), at(0.5)));
        assert_eq!(agent.state(), AgentState::Alerted);
    }

    #[test]
    fn puzzle_is_suppressed_shortly_after_bark() {
        let mut agent = agent_at(Vec2::new(0.5, 0.5));
        let mut events = Vec::new();
        hear(&mut agent, &bark(Vec2::new(2.5, 0.5), at(0.0)));

        hear(&mut agent, &puzzle(Vec2::new(3.5, 3.5), at(0.1)));
        assert_eq!(agent.state(), AgentState::Alerted);

        run(&mut agent, None, 26, &mut events);
        assert_eq!(agent.state(), AgentState::Patrol);

        hear(&mut agent, &puzzle(Vec2::new(3.5, 3.5), at(2.6)));
        assert_eq!(agent.state(), AgentState::Patrol);

        hear(&mut agent, &puzzle(Vec2::new(3.5, 3.5), at(3.5)));
        assert_eq!(agent.state(), AgentState::Investigating);
    }

    #[test]
    fn scoped_stimulus_requires_matching_room() {
        let spawn = AgentSpawn::new(AgentId::new(1), Vec2::new(0.5, 0.5))
            .in_room(RoomId::new("hall"));
        let mut agent = PatrolAgent::new(spawn, open_pathfinder());

        hear(
            &mut agent,
            &bark(Vec2::new(1.5, 0.5), at(0.0)).in_room(RoomId::new("cellar")),
        );
        assert_eq!(agent.state(), AgentState::Patrol);

        hear(
            &mut agent,
            &bark(Vec2::new(1.5, 0.5), at(0.0)).in_room(RoomId::new("hall")),
        );
        assert_eq!(agent.state(), AgentState::Alerted);
    }

    #[test]
    fn roomless_agent_ignores_scoped_but_hears_unscoped() {
        let mut agent = agent_at(Vec2::new(0.5, 0.5));
        hear(
            &mut agent,
            &bark(Vec2::new(1.5, 0.5), at(0.0)).in_room(RoomId::new("hall")),
        );
        assert_eq!(agent.state(), AgentState::Patrol);
        hear(&mut agent, &bark(Vec2::new(1.5, 0.5), at(0.0)));
        assert_eq!(agent.state(), AgentState::Alerted);
    }

    #[test]
    fn radius_hint_caps_hearing_radius() {
        let mut agent = agent_at(Vec2::new(0.5, 0.5));
        hear(
            &mut agent,
            &bark(Vec2::new(0.5, 8.5), at(0.0)).with_radius_hint(5.0),
        );
        assert_eq!(agent.state(), AgentState::Patrol);

        hear(
            &mut agent,
            &bark(Vec2::new(0.5, 8.5), at(0.0)).with_radius_hint(f32::NAN),
        );
        assert_eq!(agent.state(), AgentState::Alerted);
    }

    #[test]
    fn stimuli_are_ignored_while_chasing() {
        let mut agent = agent_at(Vec2::new(0.5, 0.5));
        let player = PlayerSnapshot::at(Vec2::new(4.5, 0.5));
        let mut events = Vec::new();
        run(&mut agent, Some(&player), 1, &mut events);
        assert_eq!(agent.state(), AgentState::Chasing);

        hear(&mut agent, &bark(Vec2::new(1.5, 0.5), at(0.1)));
        hear(&mut agent, &puzzle(Vec2::new(1.5, 0.5), at(0.1)));

        assert_eq!(agent.state(), AgentState::Chasing);
    }

    #[test]
    fn investigation_anchor_sits_beside_the_noise() {
        let mut agent = agent_at(Vec2::new(0.5, 3.5));
        let mut events = Vec::new();
        hear(&mut agent, &puzzle(Vec2::new(3.5, 3.5), at(0.0)));
        let _ = agent.tick(DT, None, &mut events);

        let target = agent.snapshot().target.expect("investigation target");
        assert!(target.distance(Vec2::new(2.5, 3.5)) < 1e-3, "target {target}");
    }

    #[test]
    fn investigation_searches_then_returns() {
        let mut agent = agent_at(Vec2::new(0.5, 0.5));
        let mut events = Vec::new();
        hear(&mut agent, &puzzle(Vec2::new(3.5, 0.5), at(0.0)));

        run(&mut agent, None, 20, &mut events);
        assert_eq!(agent.state(), AgentState::Investigating);
        let searching_facing = agent.facing();
        run(&mut agent, None, 3, &mut events);
        assert!(agent.facing().angle_between(searching_facing).abs() > 0.1);

        run(&mut agent, None, 30, &mut events);
        assert!(changed(&events, AgentState::Investigating, AgentState::Patrol));
    }

    #[test]
    fn blocked_candidates_fall_back_to_free_cell() {
        let pathfinder = pathfinder(&["#####", "#####", "##.##", "##.##", "....."]);
        let spawn = AgentSpawn::new(AgentId::new(1), Vec2::new(0.5, 4.5));
        let mut agent = PatrolAgent::new(spawn, Rc::clone(&pathfinder));

        hear(&mut agent, &puzzle(Vec2::new(2.5, 0.5), at(0.0)));
        let mut events = Vec::new();
        let _ = agent.tick(DT, None, &mut events);

        let target = agent.snapshot().target.expect("investigation target");
        assert_eq!(target, Vec2::new(2.5, 2.5));
        assert!(!pathfinder.grid().is_point_blocked(target));
    }

    #[test]
    fn noise_behind_a_sealed_wall_is_not_investigated() {
        let rows = [
            "......#.....",
            "......#.....",
            "......#.....",
            "......#.....",
            "......#.....",
        ];
        let pathfinder = pathfinder(&rows);
        let spawn = AgentSpawn::new(AgentId::new(1), Vec2::new(1.5, 2.5));
        let mut agent = PatrolAgent::new(spawn, Rc::clone(&pathfinder));
        let mut events = Vec::new();

        hear(&mut agent, &puzzle(Vec2::new(9.5, 2.5), at(0.0)));
        assert_eq!(agent.state(), AgentState::Patrol);

        for _ in 0..600 {
            let intent = agent.tick(DT, None, &mut events);
            let destination = agent.position() + intent.delta;
            if !pathfinder.grid().is_point_blocked(destination) {
                agent.set_position(destination);
            }
        }

        assert_eq!(agent.state(), AgentState::Patrol);
        assert!(!changed(&events, AgentState::Patrol, AgentState::Investigating));
        assert!(agent.position().x < 6.0);
    }

    #[test]
    fn investigation_gives_up_when_the_body_cannot_move() {
        let mut agent = agent_at(Vec2::new(0.5, 0.5));
        let mut events = Vec::new();
        hear(&mut agent, &puzzle(Vec2::new(5.5, 0.5), at(0.0)));
        assert_eq!(agent.state(), AgentState::Investigating);

        let timeout = agent.config().investigate.timeout();
        let ticks = (timeout.as_millis() / DT.as_millis()) as usize + 1;
        for _ in 0..ticks {
            let _ = agent.tick(DT, None, &mut events);
        }

        assert_eq!(agent.state(), AgentState::Patrol);
        assert!(changed(&events, AgentState::Investigating, AgentState::Patrol));
        assert_eq!(agent.position(), Vec2::new(0.5, 0.5));
    }

    #[test]
    fn chase_ends_when_player_runs_past_max_distance() {
        let mut config = AgentConfig::default();
        config.chase.max_chase_distance = 3.0;
        let spawn = AgentSpawn::new(AgentId::new(1), Vec2::new(0.5, 0.5)).with_config(config);
        let mut agent = PatrolAgent::new(spawn, open_pathfinder());
        let mut events = Vec::new();

        let near = PlayerSnapshot::at(Vec2::new(2.5, 0.5));
        run(&mut agent, Some(&near), 1, &mut events);
        assert_eq!(agent.state(), AgentState::Chasing);

        let far = PlayerSnapshot::at(Vec2::new(7.5, 0.5));
        run(&mut agent, Some(&far), 1, &mut events);

        assert_eq!(agent.state(), AgentState::Patrol);
        assert!(changed(&events, AgentState::Chasing, AgentState::Patrol));
        assert!(!events
            .iter()
            .any(|event| matches!(event, AgentEvent::PlayerCaught { .. })));
    }

    #[test]
    fn chase_repaths_only_on_the_fixed_interval() {
        let rows = ["...................."; 3];
        let spawn = AgentSpawn::new(AgentId::new(1), Vec2::new(0.5, 1.5));
        let mut agent = PatrolAgent::new(spawn, pathfinder(&rows));
        let interval = agent.config().chase.repath_interval();
        let ticks_per_repath = (interval.as_millis() / DT.as_millis()) as usize;
        assert_eq!(ticks_per_repath, 5);

        let mut player = PlayerSnapshot::at(Vec2::new(4.5, 1.5));
        let mut events = Vec::new();
        let mut targets = Vec::new();
        for tick in 0..=2 * ticks_per_repath {
            player.position.x = 4.5 + 0.25 * tick as f32;
            run(&mut agent, Some(&player), 1, &mut events);
            assert_eq!(agent.state(), AgentState::Chasing);
            targets.push(agent.snapshot().target.expect("chase target"));
        }

        let first = targets[0];
        let second = targets[ticks_per_repath];
        assert!(targets[..ticks_per_repath].iter().all(|target| *target == first));
        assert_ne!(second, first);
        assert!(targets[ticks_per_repath..2 * ticks_per_repath]
            .iter()
            .all(|target| *target == second));
        assert_ne!(targets[2 * ticks_per_repath], second);
    }

    #[test]
    fn unreachable_target_reports_path_fallback() {
        let pathfinder = pathfinder(&["..#..", "..#..", "..#.."]);
        let spawn = AgentSpawn::new(AgentId::new(1), Vec2::new(0.5, 0.5))
            .with_route(vec![Vec2::new(4.5, 1.5)]);
        let mut agent = PatrolAgent::new(spawn, pathfinder);
        let mut events = Vec::new();

        let intent = agent.tick(DT, None, &mut events);

        assert!(intent.is_moving());
        assert!(events
            .iter()
            .any(|event| matches!(event, AgentEvent::PathFallback { .. })));
    }

    #[test]
    fn snapshot_serializes_for_renderers() {
        let spawn = AgentSpawn::new(AgentId::new(7), Vec2::new(0.5, 0.5))
            .with_route(vec![Vec2::new(3.5, 0.5)]);
        let mut agent = PatrolAgent::new(spawn, open_pathfinder());
        let mut events = Vec::new();
        let _ = agent.tick(DT, None, &mut events);

        let json = serde_json::to_value(agent.snapshot()).expect("serialize");
        assert_eq!(json["state"], "Patrol");
        assert_eq!(json["route_index"], 0);
        assert!(json["path"].as_array().is_some_and(|path| !path.is_empty()));
    }
}
