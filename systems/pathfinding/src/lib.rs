#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Grid pathfinding service shared by every patrol agent.
//!
//! [`GridPathfinder`] converts world points to cells, substitutes nearby free
//! cells for blocked endpoints, runs a bounded A* search, and collapses the
//! resulting cell chain into direction-change waypoints. It never fails
//! loudly: when the search gives up the caller receives a single-point
//! fallback [`Path`] aimed at the requested goal.

use std::{fmt, rc::Rc};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use warden_core::{CellCoord, FallbackReason, ObstacleGrid, Path, Vec2};

mod search;

pub use search::CellSearch;

const DEFAULT_MAX_ITERATIONS: usize = 1000;
const DEFAULT_FREE_CELL_RADIUS: u32 = 10;

/// Tunables bounding the cost of a single pathfinding call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathfinderConfig {
    /// Maximum number of node expansions before the search is abandoned.
    pub max_iterations: usize,
    /// Breadth-first radius, in cells, searched for a free substitute when an
    /// endpoint is blocked.
    pub free_cell_search_radius: u32,
}

impl Default for PathfinderConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            free_cell_search_radius: DEFAULT_FREE_CELL_RADIUS,
        }
    }
}

/// Shortest-path service over a static obstacle grid.
pub struct GridPathfinder {
    grid: Rc<dyn ObstacleGrid>,
    config: PathfinderConfig,
}

impl GridPathfinder {
    /// Creates a pathfinder with default tunables.
    #[must_use]
    pub fn new(grid: Rc<dyn ObstacleGrid>) -> Self {
        Self::with_config(grid, PathfinderConfig::default())
    }

    /// Creates a pathfinder with explicit tunables.
    #[must_use]
    pub fn with_config(grid: Rc<dyn ObstacleGrid>, config: PathfinderConfig) -> Self {
        Self { grid, config }
    }

    /// Grid the pathfinder searches.
    #[must_use]
    pub fn grid(&self) -> &dyn ObstacleGrid {
        self.grid.as_ref()
    }

    /// Tunables in effect.
    #[must_use]
    pub const fn config(&self) -> &PathfinderConfig {
        &self.config
    }

    /// Plans a route between two world-space points.
    ///
    /// On success every waypoint is the centre of a free cell, the first one
    /// adjacent to (or equal to) the start cell and the last one the goal
    /// cell's centre. Start and goal in the same cell yield a single waypoint.
    /// A goal cell that stays blocked after substitution is never searched.
    /// On failure the path holds only `goal` and reports
    /// [`warden_core::PathOutcome::Fallback`].
    #[must_use]
    pub fn find_path(&self, start: Vec2, goal: Vec2) -> Path {
        let grid = self.grid();
        let start_cell = self.free_anchor(grid.world_to_cell(start), "start");
        let goal_cell = self.free_anchor(grid.world_to_cell(goal), "goal");
        if grid.has_obstacle(goal_cell) {
            warn!(?goal, ?goal_cell, "goal cell is blocked; falling back to straight line");
            return Path::fallback(goal, FallbackReason::Unreachable);
        }

        match self.search(start_cell, goal_cell) {
            CellSearch::Found { cells, iterations } => {
                let simplified = search::simplify(&cells[1..]);
                let waypoints: Vec<Vec2> = if simplified.is_empty() {
                    vec![grid.cell_center_world(goal_cell)]
                } else {
                    simplified
                        .iter()
                        .map(|cell| grid.cell_center_world(*cell))
                        .collect()
                };
                debug!(
                    ?start_cell,
                    ?goal_cell,
                    iterations,
                    raw = cells.len().saturating_sub(1),
                    simplified = waypoints.len(),
                    "path found"
                );
                Path::found(waypoints)
            }
            CellSearch::Failed { reason, iterations } => {
                warn!(
                    ?start,
                    ?goal,
                    ?reason,
                    iterations,
                    "no path found; falling back to straight line"
                );
                Path::fallback(goal, reason)
            }
        }
    }

    /// Runs the raw cell search without anchor substitution or simplification.
    ///
    /// The returned cells include both endpoints.
    #[must_use]
    pub fn search(&self, start: CellCoord, goal: CellCoord) -> CellSearch {
        search::astar(self.grid(), start, goal, self.config.max_iterations)
    }

    /// Closest free cell to `cell` within `max_radius` breadth-first steps.
    #[must_use]
    pub fn nearest_free_cell(&self, cell: CellCoord, max_radius: u32) -> Option<CellCoord> {
        search::nearest_free_cell(self.grid(), cell, max_radius)
    }

    fn free_anchor(&self, cell: CellCoord, role: &'static str) -> CellCoord {
        if !self.grid.has_obstacle(cell) {
            return cell;
        }

        match self.nearest_free_cell(cell, self.config.free_cell_search_radius) {
            Some(free) => {
                debug!(role, blocked = ?cell, substitute = ?free, "substituted free anchor");
                free
            }
            None => {
                warn!(
                    role,
                    ?cell,
                    radius = self.config.free_cell_search_radius,
                    "no free cell near blocked endpoint; searching from it anyway"
                );
                cell
            }
        }
    }
}

impl fmt::Debug for GridPathfinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridPathfinder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
