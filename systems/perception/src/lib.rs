#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Stateless vision queries for patrol agents.
//!
//! [`can_see`] combines a range check, a field-of-view check and an occlusion
//! test, cheapest first. Occlusion is the expensive part, so agents only
//! evaluate vision on a fixed cadence managed by [`PerceptionPoller`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_core::{ObstacleGrid, Vec2};

const DEFAULT_FOV_DEGREES: f32 = 90.0;
const DEFAULT_VIEW_DISTANCE: f32 = 6.0;
const MIN_VECTOR_LENGTH: f32 = 1e-5;

/// Reports whether `target` is visible from `observer`.
///
/// Returns `false` as soon as any check fails: the target is farther than
/// `view_distance`, lies outside the cone of `fov_degrees` centred on
/// `observer_facing`, or `occluded(observer, target)` reports a hit. A
/// zero-length facing, a target on top of the observer and non-finite inputs
/// all count as not visible.
pub fn can_see<F>(
    observer: Vec2,
    observer_facing: Vec2,
    fov_degrees: f32,
    view_distance: f32,
    target: Vec2,
    occluded: F,
) -> bool
where
    F: FnOnce(Vec2, Vec2) -> bool,
{
    if !observer.is_finite() || !target.is_finite() || !observer_facing.is_finite() {
        return false;
    }
    if !fov_degrees.is_finite() || !view_distance.is_finite() {
        return false;
    }

    let to_target = target - observer;
    let distance = to_target.length();
    if distance > view_distance {
        return false;
    }

    let facing_length = observer_facing.length();
    if facing_length < MIN_VECTOR_LENGTH || distance < MIN_VECTOR_LENGTH {
        return false;
    }

    if angle_degrees(observer_facing / facing_length, to_target / distance) > fov_degrees * 0.5 {
        return false;
    }

    !occluded(observer, target)
}

/// Unsigned angle between two unit vectors, in degrees.
#[must_use]
pub fn angle_degrees(a: Vec2, b: Vec2) -> f32 {
    a.dot(b).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Walks the cells crossed by the segment `from -> to` and reports whether
/// any of them, other than the one containing `from`, is an obstacle.
///
/// The cell containing `to` is tested, so a target standing inside a wall
/// is occluded.
pub fn line_of_sight_blocked<G>(grid: &G, from: Vec2, to: Vec2) -> bool
where
    G: ObstacleGrid + ?Sized,
{
    let size = grid.cell_size();
    let mut cell = grid.world_to_cell(from);
    let end = grid.world_to_cell(to);
    if cell == end {
        return false;
    }

    let direction = to - from;
    let step_x = direction.x.signum() as i32;
    let step_y = direction.y.signum() as i32;
    let center = grid.cell_center_world(cell);

    let (mut t_max_x, t_delta_x) = axis_crossing(from.x, center.x, direction.x, size);
    let (mut t_max_y, t_delta_y) = axis_crossing(from.y, center.y, direction.y, size);

    let steps = cell.manhattan_distance(end);
    for _ in 0..steps {
        if t_max_x < t_max_y {
            cell = cell.offset(step_x, 0);
            t_max_x += t_delta_x;
        } else {
            cell = cell.offset(0, step_y);
            t_max_y += t_delta_y;
        }

        if grid.has_obstacle(cell) {
            return true;
        }
        if cell == end {
            return false;
        }
    }

    false
}

// Parametric distance along the segment to the first boundary crossing on
// one axis, and between successive crossings.
fn axis_crossing(origin: f32, cell_center: f32, delta: f32, size: f32) -> (f32, f32) {
    if delta.abs() < f32::EPSILON {
        return (f32::INFINITY, f32::INFINITY);
    }

    let boundary = cell_center + delta.signum() * size * 0.5;
    ((boundary - origin) / delta, size / delta.abs())
}

/// Shape of an agent's view cone.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionCone {
    /// Full opening angle of the cone in degrees.
    pub fov_degrees: f32,
    /// Farthest distance at which anything is seen.
    pub view_distance: f32,
}

impl VisionCone {
    /// Runs [`can_see`] with grid line-of-sight as the occlusion test.
    pub fn sees<G>(&self, grid: &G, observer: Vec2, facing: Vec2, target: Vec2) -> bool
    where
        G: ObstacleGrid + ?Sized,
    {
        can_see(
            observer,
            facing,
            self.fov_degrees,
            self.view_distance,
            target,
            |from, to| line_of_sight_blocked(grid, from, to),
        )
    }
}

impl Default for VisionCone {
    fn default() -> Self {
        Self {
            fov_degrees: DEFAULT_FOV_DEGREES,
            view_distance: DEFAULT_VIEW_DISTANCE,
        }
    }
}

/// Fixed-cadence gate for vision checks.
///
/// The first call to [`PerceptionPoller::advance`] always fires so newly
/// spawned agents look around immediately.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PerceptionPoller {
    interval: Duration,
    elapsed: Duration,
}

impl PerceptionPoller {
    /// Creates a poller that fires once every `interval`.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            elapsed: interval,
        }
    }

    /// Accumulates `dt` and reports whether a poll is due.
    ///
    /// At most one poll fires per call; leftover time carries over.
    pub fn advance(&mut self, dt: Duration) -> bool {
        self.elapsed = self.elapsed.saturating_add(dt);
        if self.elapsed < self.interval {
            return false;
        }

        self.elapsed = self.elapsed.saturating_sub(self.interval);
        if self.elapsed >= self.interval {
            self.elapsed = Duration::ZERO;
        }
        true
    }

    /// Forces the next call to [`PerceptionPoller::advance`] to fire.
    pub fn expedite(&mut self) {
        self.elapsed = self.interval;
    }

    /// Cadence of the poller.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_world::TileGrid;

    fn clear(_: Vec2, _: Vec2) -> bool {
        false
    }

    #[test]
    fn target_beyond_distance_is_never_seen() {
        let mut consulted = false;
        let seen = can_see(Vec2::ZERO, Vec2::X, 360.0, 5.0, Vec2::new(5.1, 0.0), |_, _| {
            consulted = true;
            false
        });
        assert!(!seen);
        assert!(!consulted, "occlusion must not run when out of range");
    }

    #[test]
    fn target_outside_cone_is_not_seen() {
        assert!(!can_see(Vec2::ZERO, Vec2::X, 90.0, 10.0, Vec2::new(1.0, 1.1), clear));
        assert!(can_see(Vec2::ZERO, Vec2::X, 90.0, 10.0, Vec2::new(1.0, 0.9), clear));
        assert!(!can_see(Vec2::ZERO, Vec2::X, 90.0, 10.0, Vec2::new(-3.0, 0.0), clear));
    }

    #[test]
    fn occlusion_hides_target() {
        assert!(!can_see(Vec2::ZERO, Vec2::X, 90.0, 10.0, Vec2::new(3.0, 0.0), |_, _| true));
    }

    #[test]
    fn degenerate_vectors_are_not_visible() {
        assert!(!can_see(Vec2::ZERO, Vec2::ZERO, 90.0, 10.0, Vec2::X, clear));
        assert!(!can_see(Vec2::ONE, Vec2::X, 90.0, 10.0, Vec2::ONE, clear));
        assert!(!can_see(Vec2::ZERO, Vec2::X, 90.0, f32::NAN, Vec2::X, clear));
    }

    #[test]
    fn wall_between_cells_blocks_sight() {
        let grid = TileGrid::from_rows(&[".....", "..#..", "....."], 1.0).expect("layout");
        assert!(line_of_sight_blocked(&grid, Vec2::new(0.5, 1.5), Vec2::new(4.5, 1.5)));
        assert!(!line_of_sight_blocked(&grid, Vec2::new(0.5, 0.5), Vec2::new(4.5, 0.5)));
        assert!(!line_of_sight_blocked(&grid, Vec2::new(0.5, 1.5), Vec2::new(1.5, 1.5)));
    }

    #[test]
    fn diagonal_ray_detects_wall() {
        let grid = TileGrid::from_rows(&["....", ".#..", "....", "...."], 1.0).expect("layout");
        assert!(line_of_sight_blocked(&grid, Vec2::new(0.5, 0.5), Vec2::new(3.5, 3.5)));
        assert!(!line_of_sight_blocked(&grid, Vec2::new(0.5, 3.5), Vec2::new(3.5, 3.5)));
    }

    #[test]
    fn target_inside_wall_is_occluded() {
        let grid = TileGrid::from_rows(&["..#"], 1.0).expect("layout");
        assert!(line_of_sight_blocked(&grid, Vec2::new(0.5, 0.5), Vec2::new(2.5, 0.5)));
    }

    #[test]
    fn vision_cone_uses_grid_occlusion() {
        let grid = TileGrid::from_rows(&["......", "...#..", "......"], 1.0).expect("layout");
        let cone = VisionCone::default();
        let observer = Vec2::new(0.5, 1.5);
        assert!(!cone.sees(&grid, observer, Vec2::X, Vec2::new(5.5, 1.5)));
        assert!(cone.sees(&grid, observer, Vec2::X, Vec2::new(2.5, 1.5)));
    }

    #[test]
    fn poller_fires_immediately_then_on_interval() {
        let mut poller = PerceptionPoller::new(Duration::from_millis(200));
        assert!(poller.advance(Duration::from_millis(16)));
        assert!(!poller.advance(Duration::from_millis(100)));
        assert!(poller.advance(Duration::from_millis(100)));
        assert!(!poller.advance(Duration::ZERO));
        poller.expedite();
        assert!(poller.advance(Duration::ZERO));
    }
}
