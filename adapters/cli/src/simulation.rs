//! Headless fixed-step driver that wires a scenario into live agents.

use std::{cell::RefCell, io::Write, rc::Rc, time::Duration};

use anyhow::{Context, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info, warn};
use warden_core::{
    AgentEvent, AgentId, ObstacleGrid, PlayerSnapshot, StimulusEvent, StimulusKind, Timestamp,
    Vec2,
};
use warden_system_pathfinding::GridPathfinder;
use warden_system_patrol::{AgentHandle, AgentServices, AgentSnapshot, AgentSpawn};
use warden_system_stimulus::{
    BarkEmitter, ListenerError, StimulusBus, StimulusListener, Subscription,
};
use warden_world::{route, TileGrid};

use crate::scenario::{
    AgentSection, PlayerMotion, PlayerSection, Scenario, StimulusSection, TickWindow,
};

const CARDINALS: [Vec2; 4] = [Vec2::X, Vec2::NEG_X, Vec2::Y, Vec2::NEG_Y];

/// Parameters of a single run after command-line overrides are applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RunOptions {
    pub(crate) ticks: u32,
    pub(crate) dt: Duration,
    pub(crate) trace_json: bool,
}

/// Totals reported once a run ends.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Summary {
    pub(crate) ticks_run: u32,
    pub(crate) caught_by: Option<AgentId>,
    pub(crate) state_changes: usize,
    pub(crate) path_fallbacks: usize,
    pub(crate) barks: usize,
    pub(crate) refused_barks: usize,
    pub(crate) barks_heard: usize,
    pub(crate) puzzles_heard: usize,
}

impl Summary {
    fn record(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::StateChanged { .. } => self.state_changes += 1,
            AgentEvent::PathFallback { .. } => self.path_fallbacks += 1,
            AgentEvent::PlayerCaught { agent, .. } => self.caught_by = Some(*agent),
        }
    }

    pub(crate) fn write_to(&self, out: &mut impl Write) -> Result<()> {
        writeln!(out, "ticks run: {}", self.ticks_run)?;
        match self.caught_by {
            Some(agent) => writeln!(out, "player caught by agent {}", agent.get())?,
            None => writeln!(out, "player evaded every guard")?,
        }
        writeln!(out, "state changes: {}", self.state_changes)?;
        writeln!(out, "path fallbacks: {}", self.path_fallbacks)?;
        writeln!(
            out,
            "dog barks: {} ({} refused during cooldown)",
            self.barks, self.refused_barks
        )?;
        writeln!(
            out,
            "stimuli on the bus: {} barks, {} puzzle noises",
            self.barks_heard, self.puzzles_heard
        )?;
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum TraceLine<'a> {
    Event { tick: u32, event: &'a AgentEvent },
    Final { tick: u32, agent: &'a AgentSnapshot },
}

// Counts every stimulus travelling over the bus, independent of who hears it.
#[derive(Debug, Default)]
struct StimulusLog {
    barks: usize,
    puzzles: usize,
}

impl StimulusListener for StimulusLog {
    fn hear(&mut self, event: &StimulusEvent) -> Result<(), ListenerError> {
        match event.kind {
            StimulusKind::Bark => self.barks += 1,
            StimulusKind::PuzzleTrigger => self.puzzles += 1,
        }
        debug!(
            kind = ?event.kind,
            position = ?event.position,
            room = ?event.room,
            "stimulus emitted"
        );
        Ok(())
    }
}

#[derive(Debug)]
struct Dog {
    emitter: BarkEmitter,
    bark_at_ticks: Vec<u32>,
}

#[derive(Debug)]
struct PlayerBody {
    position: Vec2,
    motion: PlayerMotion,
    speed: f32,
    waypoints: Vec<Vec2>,
    next_waypoint: usize,
    heading: Vec2,
    turn_every_ticks: u32,
    hide_windows: Vec<TickWindow>,
    alive: bool,
    rng: ChaCha8Rng,
}

impl PlayerBody {
    fn new(section: &PlayerSection, seed: u64) -> Self {
        Self {
            position: section.start,
            motion: section.motion,
            speed: section.speed.max(0.0),
            waypoints: section.waypoints.clone(),
            next_waypoint: 0,
            heading: Vec2::X,
            turn_every_ticks: section.turn_every_ticks.max(1),
            hide_windows: section.hide_windows.clone(),
            alive: true,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn snapshot(&self, tick: u32) -> PlayerSnapshot {
        PlayerSnapshot {
            position: self.position,
            is_hidden: self.hide_windows.iter().any(|window| window.contains(tick)),
            is_alive: self.alive,
        }
    }

    fn advance(&mut self, tick: u32, dt: Duration, grid: &dyn ObstacleGrid) {
        let step = self.speed * dt.as_secs_f32();
        match self.motion {
            PlayerMotion::Waypoints => {
                let Some(&target) = self.waypoints.get(self.next_waypoint) else {
                    return;
                };
                let distance = self.position.distance(target);
                if distance <= step {
                    self.position = target;
                    self.next_waypoint += 1;
                } else {
                    self.position += (target - self.position) * (step / distance);
                }
            }
            PlayerMotion::RandomWalk => {
                if tick % self.turn_every_ticks == 0 {
                    self.turn();
                }
                let next = self.position + self.heading * step;
                if grid.is_point_blocked(next) {
                    self.turn();
                } else {
                    self.position = next;
                }
            }
        }
    }

    fn turn(&mut self) {
        self.heading = CARDINALS[self.rng.gen_range(0..CARDINALS.len())];
    }
}

/// Live state of a scenario run.
#[derive(Debug)]
pub(crate) struct Simulation {
    services: AgentServices,
    agents: Vec<AgentHandle>,
    dogs: Vec<Dog>,
    stimuli: Vec<StimulusSection>,
    player: PlayerBody,
    log: Rc<RefCell<StimulusLog>>,
    _log_subscription: Subscription,
    now: Timestamp,
}

impl Simulation {
    /// Builds the level, shared services, and every agent named by `scenario`.
    pub(crate) fn new(scenario: &Scenario, seed: u64) -> Result<Self> {
        let grid = TileGrid::from_rows(&scenario.level.rows, scenario.level.cell_size)
            .context("failed to build level grid")?;
        let pathfinder = GridPathfinder::with_config(Rc::new(grid), scenario.pathfinding);
        let services = AgentServices {
            pathfinder: Rc::new(pathfinder),
            bus: StimulusBus::new(),
        };

        let log = Rc::new(RefCell::new(StimulusLog::default()));
        let log_subscription = services.bus.subscribe(&log);

        let agents = scenario
            .agents
            .iter()
            .map(|section| spawn_agent(section, &services))
            .collect::<Result<Vec<_>>>()?;

        let dogs = scenario
            .dogs
            .iter()
            .map(|section| Dog {
                emitter: BarkEmitter::new(section.position, section.room.clone(), section.bark),
                bark_at_ticks: section.bark_at_ticks.clone(),
            })
            .collect();

        info!(
            agents = agents.len(),
            dogs = scenario.dogs.len(),
            stimuli = scenario.stimuli.len(),
            "simulation ready"
        );

        Ok(Self {
            services,
            agents,
            dogs,
            stimuli: scenario.stimuli.clone(),
            player: PlayerBody::new(&scenario.player, seed),
            log,
            _log_subscription: log_subscription,
            now: Timestamp::ZERO,
        })
    }

    /// Steps the simulation until `options.ticks` elapse or the player is
    /// caught, writing the event trace to `out`.
    pub(crate) fn run(&mut self, options: &RunOptions, out: &mut impl Write) -> Result<Summary> {
        let mut summary = Summary::default();
        let mut events = Vec::new();

        for tick in 0..options.ticks {
            self.fire_stimuli(tick);
            self.bark_dogs(tick, &mut summary);

            let player = self.player.snapshot(tick);
            let grid = self.services.pathfinder.grid();
            for handle in &self.agents {
                let intent = handle.tick(options.dt, Some(&player), &mut events);
                if !intent.is_moving() {
                    continue;
                }
                let mut agent = handle.agent_mut();
                let destination = agent.position() + intent.delta;
                if grid.is_point_blocked(destination) {
                    debug!(agent = agent.id().get(), ?destination, "movement blocked");
                } else {
                    agent.set_position(destination);
                }
            }

            for event in events.drain(..) {
                summary.record(&event);
                trace(out, tick, &event, options.trace_json)?;
                if let AgentEvent::PlayerCaught { .. } = event {
                    self.player.alive = false;
                }
            }

            summary.ticks_run = tick + 1;
            if !self.player.alive {
                break;
            }

            self.player.advance(tick, options.dt, grid);
            for dog in &mut self.dogs {
                dog.emitter.tick(options.dt);
            }
            self.now = self.now.advanced_by(options.dt);
        }

        if options.trace_json {
            for handle in &self.agents {
                let snapshot = handle.snapshot();
                let line = TraceLine::Final {
                    tick: summary.ticks_run,
                    agent: &snapshot,
                };
                writeln!(out, "{}", serde_json::to_string(&line)?)?;
            }
        }

        let log = self.log.borrow();
        summary.barks_heard = log.barks;
        summary.puzzles_heard = log.puzzles;
        info!(ticks = summary.ticks_run, caught = summary.caught_by.is_some(), "run finished");
        Ok(summary)
    }

    fn fire_stimuli(&self, tick: u32) {
        for section in self.stimuli.iter().filter(|section| section.at_tick == tick) {
            let mut event = StimulusEvent::new(section.kind, section.position, self.now);
            if let Some(room) = &section.room {
                event = event.in_room(room.clone());
            }
            if let Some(radius) = section.radius_hint {
                event = event.with_radius_hint(radius);
            }
            let report = self.services.bus.emit(&event);
            info!(tick, kind = ?section.kind, delivered = report.delivered, "scheduled stimulus");
        }
    }

    fn bark_dogs(&mut self, tick: u32, summary: &mut Summary) {
        for dog in &mut self.dogs {
            if !dog.bark_at_ticks.contains(&tick) {
                continue;
            }
            match dog.emitter.try_bark(self.now, &self.services.bus) {
                Some(_) => summary.barks += 1,
                None => summary.refused_barks += 1,
            }
        }
    }
}

fn spawn_agent(section: &AgentSection, services: &AgentServices) -> Result<AgentHandle> {
    let grid = services.pathfinder.grid();
    let points = if section.snap_route {
        route::snap_to_cell_centers(grid, &section.route)
    } else {
        section.route.clone()
    };
    if points.is_empty() {
        warn!(agent = section.id, "agent has no patrol route and will stand guard");
    } else {
        route::validate(grid, &points)
            .with_context(|| format!("agent {} has an invalid patrol route", section.id))?;
    }

    let mut spawn = AgentSpawn::new(AgentId::new(section.id), section.position)
        .with_route(points)
        .with_config(section.config);
    if let Some(facing) = section.facing {
        spawn = spawn.facing(facing);
    }
    if let Some(room) = &section.room {
        spawn = spawn.in_room(room.clone());
    }
    Ok(AgentHandle::spawn(spawn, services))
}

fn trace(out: &mut impl Write, tick: u32, event: &AgentEvent, json: bool) -> Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string(&TraceLine::Event { tick, event })?)?;
        return Ok(());
    }

    match event {
        AgentEvent::StateChanged { agent, from, to } => writeln!(
            out,
            "[{tick:>5}] agent {} {} -> {}",
            agent.get(),
            from.label(),
            to.label()
        )?,
        AgentEvent::PlayerCaught { agent, position } => writeln!(
            out,
            "[{tick:>5}] agent {} caught the player at ({:.1}, {:.1})",
            agent.get(),
            position.x,
            position.y
        )?,
        AgentEvent::PathFallback {
            agent,
            target,
            reason,
        } => writeln!(
            out,
            "[{tick:>5}] agent {} fell back to a straight line towards ({:.1}, {:.1}): {reason:?}",
            agent.get(),
            target.x,
            target.y
        )?,
    }
    Ok(())
}
