#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Warden stealth-agent engine.
//!
//! This crate defines the vocabulary that connects the host simulation, the
//! static obstacle grid, and the pure systems. The host owns the level and the
//! player; it exposes the level through [`ObstacleGrid`], hands agents a
//! [`PlayerSnapshot`] every tick, publishes [`StimulusEvent`] values, and
//! receives [`MovementIntent`] and [`AgentEvent`] values back. Nothing in here
//! performs work on its own.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use glam::Vec2;

/// Integer coordinate of a single grid cell.
///
/// Coordinates are signed so that hosts may anchor levels anywhere; whether a
/// cell is traversable is decided by an [`ObstacleGrid`], never stored here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    x: i32,
    y: i32,
}

impl CellCoord {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Column index of the cell.
    #[must_use]
    pub const fn x(&self) -> i32 {
        self.x
    }

    /// Row index of the cell.
    #[must_use]
    pub const fn y(&self) -> i32 {
        self.y
    }

    /// Returns the cell displaced by the provided offset.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x.saturating_add(dx), self.y.saturating_add(dy))
    }

    /// Computes the Manhattan distance between two cell coordinates.
    #[must_use]
    pub fn manhattan_distance(self, other: CellCoord) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// The four edge-adjacent neighbours in up, down, left, right order.
    #[must_use]
    pub const fn cardinal_neighbors(self) -> [CellCoord; 4] {
        [
            self.offset(0, 1),
            self.offset(0, -1),
            self.offset(-1, 0),
            self.offset(1, 0),
        ]
    }
}

/// Read-only query surface over the static obstacle layer.
///
/// Implementations must be pure: repeated calls with the same arguments return
/// the same answers for the lifetime of a pathfinding call.
pub trait ObstacleGrid {
    /// Reports whether the cell is blocked.
    fn has_obstacle(&self, cell: CellCoord) -> bool;

    /// Maps a world-space point onto the cell that contains it.
    fn world_to_cell(&self, point: Vec2) -> CellCoord;

    /// World-space centre of the provided cell.
    fn cell_center_world(&self, cell: CellCoord) -> Vec2;

    /// Edge length of a single square cell in world units.
    fn cell_size(&self) -> f32;

    /// Reports whether the cell containing `point` is blocked.
    fn is_point_blocked(&self, point: Vec2) -> bool {
        self.has_obstacle(self.world_to_cell(point))
    }
}

/// Why a pathfinding request produced a degenerate single-point path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FallbackReason {
    /// The search exhausted its iteration budget before reaching the goal.
    IterationCap,
    /// Every reachable cell was expanded without meeting the goal.
    Unreachable,
}

/// Classifies how a [`Path`] was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathOutcome {
    /// The search reached the goal; every waypoint lies on a free cell.
    Found,
    /// The search failed and the path holds only the requested goal point,
    /// which may lie on an obstacle.
    Fallback(FallbackReason),
}

/// Ordered sequence of world-space waypoints returned by the pathfinder.
///
/// The first waypoint is adjacent to the start cell, the last is the
/// destination. Paths are immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Path {
    waypoints: Vec<Vec2>,
    outcome: PathOutcome,
}

impl Path {
    /// Wraps a successful search result.
    #[must_use]
    pub fn found(waypoints: Vec<Vec2>) -> Self {
        Self {
            waypoints,
            outcome: PathOutcome::Found,
        }
    }

    /// Builds the single-point fallback path aimed straight at `goal`.
    #[must_use]
    pub fn fallback(goal: Vec2, reason: FallbackReason) -> Self {
        Self {
            waypoints: vec![goal],
            outcome: PathOutcome::Fallback(reason),
        }
    }

    /// Waypoints in traversal order.
    #[must_use]
    pub fn waypoints(&self) -> &[Vec2] {
        &self.waypoints
    }

    /// Waypoint at the provided index, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Vec2> {
        self.waypoints.get(index).copied()
    }

    /// Number of waypoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Reports whether the path holds no waypoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Final waypoint of the path.
    #[must_use]
    pub fn destination(&self) -> Option<Vec2> {
        self.waypoints.last().copied()
    }

    /// How the path was produced.
    #[must_use]
    pub const fn outcome(&self) -> PathOutcome {
        self.outcome
    }

    /// Reports whether the path is the degenerate fallback.
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self.outcome, PathOutcome::Fallback(_))
    }
}

/// Moment on the simulation clock, measured from simulation start.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Timestamp(Duration);

impl Timestamp {
    /// The instant the simulation started.
    pub const ZERO: Self = Self(Duration::ZERO);

    /// Creates a timestamp from elapsed simulation time.
    #[must_use]
    pub const fn from_elapsed(elapsed: Duration) -> Self {
        Self(elapsed)
    }

    /// Elapsed simulation time since start.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.0
    }

    /// Returns the timestamp advanced by `dt`.
    #[must_use]
    pub fn advanced_by(self, dt: Duration) -> Self {
        Self(self.0.saturating_add(dt))
    }

    /// Time elapsed from `earlier` to `self`, or `None` if `earlier` is later.
    #[must_use]
    pub fn since(self, earlier: Timestamp) -> Option<Duration> {
        self.0.checked_sub(earlier.0)
    }
}

/// Converts a tunable given in seconds to a [`Duration`].
///
/// Negative, NaN, and overflowing values clamp to zero.
#[must_use]
pub fn duration_from_secs(seconds: f32) -> Duration {
    Duration::try_from_secs_f32(seconds).unwrap_or(Duration::ZERO)
}

/// Identifier restricting a stimulus to agents in the same room.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Creates a room identifier.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Textual form of the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Kinds of noise agents can hear.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StimulusKind {
    /// A dog bark; always alarms agents that hear it.
    Bark,
    /// Noise from a puzzle mechanism; draws agents to investigate.
    PuzzleTrigger,
}

/// Noise emitted into the world at a single moment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StimulusEvent {
    /// What made the noise.
    pub kind: StimulusKind,
    /// Where the noise originated.
    pub position: Vec2,
    /// Loudness expressed as the farthest distance the noise carries.
    /// Listeners cap their own hearing radius with it when present.
    pub hearing_radius_hint: Option<f32>,
    /// Room the noise is confined to, if any.
    pub room: Option<RoomId>,
    /// Simulation time at which the noise was emitted.
    pub emitted_at: Timestamp,
}

impl StimulusEvent {
    /// Creates an unscoped stimulus without a loudness hint.
    #[must_use]
    pub fn new(kind: StimulusKind, position: Vec2, emitted_at: Timestamp) -> Self {
        Self {
            kind,
            position,
            hearing_radius_hint: None,
            room: None,
            emitted_at,
        }
    }

    /// Restricts the stimulus to the provided room.
    #[must_use]
    pub fn in_room(mut self, room: RoomId) -> Self {
        self.room = Some(room);
        self
    }

    /// Attaches a loudness hint.
    #[must_use]
    pub fn with_radius_hint(mut self, radius: f32) -> Self {
        self.hearing_radius_hint = Some(radius);
        self
    }
}

/// Read-only view of the player supplied by the host each tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// World-space position of the player.
    pub position: Vec2,
    /// Player is tucked into a hiding spot.
    pub is_hidden: bool,
    /// Player has not been caught yet.
    pub is_alive: bool,
}

impl PlayerSnapshot {
    /// Creates a visible, living player at the provided position.
    #[must_use]
    pub const fn at(position: Vec2) -> Self {
        Self {
            position,
            is_hidden: false,
            is_alive: true,
        }
    }

    /// Whether perception may report this player at all.
    #[must_use]
    pub const fn is_detectable(&self) -> bool {
        self.is_alive && !self.is_hidden
    }
}

/// Unique identifier assigned to a patrol agent.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct AgentId(u32);

impl AgentId {
    /// Creates a new agent identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Behaviour an agent is currently executing. Exactly one is active.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentState {
    /// Walking the patrol route.
    #[default]
    Patrol,
    /// Standing at a route point, sweeping the view.
    Waiting,
    /// Moving to and searching around a puzzle noise.
    Investigating,
    /// Facing a bark and scanning in place.
    Alerted,
    /// Pursuing the player.
    Chasing,
}

impl AgentState {
    /// Short lowercase label used in logs and exports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Patrol => "patrol",
            Self::Waiting => "waiting",
            Self::Investigating => "investigating",
            Self::Alerted => "alerted",
            Self::Chasing => "chasing",
        }
    }
}

/// Notifications agents raise for the host while ticking or hearing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AgentEvent {
    /// The agent left one state and entered another (possibly the same).
    StateChanged {
        /// Agent that transitioned.
        agent: AgentId,
        /// State that was exited.
        from: AgentState,
        /// State that was entered.
        to: AgentState,
    },
    /// The agent closed within catch distance of a living player.
    PlayerCaught {
        /// Agent that made the catch.
        agent: AgentId,
        /// Player position at the moment of capture.
        position: Vec2,
    },
    /// A route request degraded to the straight-line fallback.
    PathFallback {
        /// Agent whose request failed.
        agent: AgentId,
        /// Point the agent wanted to reach.
        target: Vec2,
        /// Why the search failed.
        reason: FallbackReason,
    },
}

/// Per-tick output the external mover applies to the agent's body.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MovementIntent {
    /// Desired displacement for this tick in world units.
    pub delta: Vec2,
    /// Desired unit facing vector.
    pub facing: Vec2,
}

impl MovementIntent {
    /// Intent that keeps the body in place with the provided facing.
    #[must_use]
    pub const fn stationary(facing: Vec2) -> Self {
        Self {
            delta: Vec2::ZERO,
            facing,
        }
    }

    /// Reports whether the intent requests translation.
    #[must_use]
    pub fn is_moving(&self) -> bool {
        self.delta.length_squared() > 0.0
    }
}
