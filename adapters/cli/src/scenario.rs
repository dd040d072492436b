//! Scenario files driving the headless runner.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;
use warden_core::{RoomId, StimulusKind, Vec2};
use warden_system_pathfinding::PathfinderConfig;
use warden_system_patrol::AgentConfig;
use warden_system_stimulus::BarkEmitterConfig;

const DEMO_SCENARIO: &str = include_str!("../../../demos/guard_post.toml");

/// Complete description of a headless run.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Scenario {
    #[serde(default)]
    pub(crate) simulation: SimulationSection,
    pub(crate) level: LevelSection,
    #[serde(default)]
    pub(crate) pathfinding: PathfinderConfig,
    #[serde(default)]
    pub(crate) player: PlayerSection,
    #[serde(default)]
    pub(crate) agents: Vec<AgentSection>,
    #[serde(default)]
    pub(crate) dogs: Vec<DogSection>,
    #[serde(default)]
    pub(crate) stimuli: Vec<StimulusSection>,
}

impl Scenario {
    /// Reads and parses a scenario file.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario at {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("invalid scenario at {}", path.display()))
    }

    /// The bundled guard post scenario.
    pub(crate) fn demo() -> Result<Self> {
        Self::from_toml(DEMO_SCENARIO).context("bundled demo scenario is invalid")
    }

    pub(crate) fn from_toml(contents: &str) -> Result<Self> {
        let scenario: Self =
            toml::from_str(contents).context("failed to parse scenario toml contents")?;
        for agent in &scenario.agents {
            agent
                .config
                .validate()
                .with_context(|| format!("agent {} has invalid tunables", agent.id))?;
        }
        Ok(scenario)
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub(crate) struct SimulationSection {
    pub(crate) ticks: u32,
    pub(crate) dt_ms: u64,
    pub(crate) seed: u64,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            ticks: 600,
            dt_ms: 50,
            seed: 0,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct LevelSection {
    #[serde(default = "default_cell_size")]
    pub(crate) cell_size: f32,
    pub(crate) rows: Vec<String>,
}

fn default_cell_size() -> f32 {
    1.0
}

/// How the scripted player moves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum PlayerMotion {
    /// Walks the listed waypoints once, then stands still.
    #[default]
    Waypoints,
    /// Wanders in cardinal directions drawn from the seeded generator.
    RandomWalk,
}

/// Half-open tick range during which the player is hidden.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub(crate) struct TickWindow {
    pub(crate) from: u32,
    pub(crate) to: u32,
}

impl TickWindow {
    pub(crate) fn contains(&self, tick: u32) -> bool {
        (self.from..self.to).contains(&tick)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub(crate) struct PlayerSection {
    pub(crate) motion: PlayerMotion,
    pub(crate) start: Vec2,
    pub(crate) speed: f32,
    pub(crate) waypoints: Vec<Vec2>,
    pub(crate) turn_every_ticks: u32,
    pub(crate) hide_windows: Vec<TickWindow>,
}

impl Default for PlayerSection {
    fn default() -> Self {
        Self {
            motion: PlayerMotion::Waypoints,
            start: Vec2::new(0.5, 0.5),
            speed: 1.5,
            waypoints: Vec::new(),
            turn_every_ticks: 40,
            hide_windows: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct AgentSection {
    pub(crate) id: u32,
    pub(crate) position: Vec2,
    #[serde(default)]
    pub(crate) facing: Option<Vec2>,
    #[serde(default)]
    pub(crate) room: Option<RoomId>,
    #[serde(default)]
    pub(crate) route: Vec<Vec2>,
    #[serde(default = "default_snap_route")]
    pub(crate) snap_route: bool,
    #[serde(default)]
    pub(crate) config: AgentConfig,
}

fn default_snap_route() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct DogSection {
    pub(crate) position: Vec2,
    #[serde(default)]
    pub(crate) room: Option<RoomId>,
    #[serde(default)]
    pub(crate) bark: BarkEmitterConfig,
    #[serde(default)]
    pub(crate) bark_at_ticks: Vec<u32>,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct StimulusSection {
    pub(crate) at_tick: u32,
    pub(crate) kind: StimulusKind,
    pub(crate) position: Vec2,
    #[serde(default)]
    pub(crate) room: Option<RoomId>,
    #[serde(default)]
    pub(crate) radius_hint: Option<f32>,
}
