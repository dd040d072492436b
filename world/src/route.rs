//! Patrol route preparation helpers.

use thiserror::Error;
use tracing::debug;
use warden_core::{CellCoord, ObstacleGrid, Vec2};

/// A route point that sits on an obstacle cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockedRoutePoint {
    /// Position of the point within the route.
    pub index: usize,
    /// Obstacle cell the point falls into.
    pub cell: CellCoord,
}

/// Problems detected while validating a patrol route.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The route contains no points.
    #[error("patrol route is empty")]
    Empty,
    /// One or more points lie on obstacle cells.
    #[error("{} patrol point(s) lie on obstacles", .points.len())]
    PointsOnObstacles {
        /// Every offending point, in route order. Never empty.
        points: Vec<BlockedRoutePoint>,
    },
}

/// Moves every point onto the centre of the cell containing it.
#[must_use]
pub fn snap_to_cell_centers<G>(grid: &G, points: &[Vec2]) -> Vec<Vec2>
where
    G: ObstacleGrid + ?Sized,
{
    points
        .iter()
        .map(|&point| {
            let cell = grid.world_to_cell(point);
            let snapped = grid.cell_center_world(cell);
            if snapped != point {
                debug!(?point, ?snapped, ?cell, "snapped patrol point to cell centre");
            }
            snapped
        })
        .collect()
}

/// Checks that the route is non-empty and that no point lies on an obstacle.
pub fn validate<G>(grid: &G, points: &[Vec2]) -> Result<(), RouteError>
where
    G: ObstacleGrid + ?Sized,
{
    if points.is_empty() {
        return Err(RouteError::Empty);
    }

    let blocked: Vec<BlockedRoutePoint> = points
        .iter()
        .enumerate()
        .filter_map(|(index, &point)| {
            let cell = grid.world_to_cell(point);
            grid.has_obstacle(cell)
                .then_some(BlockedRoutePoint { index, cell })
        })
        .collect();

    if blocked.is_empty() {
        Ok(())
    } else {
        Err(RouteError::PointsOnObstacles { points: blocked })
    }
}
