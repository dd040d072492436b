//! Patrol route traversal cursor.

use warden_core::Vec2;

use crate::RouteMode;

/// Patrol points plus the cursor walking them.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PatrolRoute {
    points: Vec<Vec2>,
    index: usize,
    mode: RouteMode,
    reversing: bool,
    finished: bool,
}

impl PatrolRoute {
    pub(crate) fn new(points: Vec<Vec2>, mode: RouteMode) -> Self {
        Self {
            points,
            index: 0,
            mode,
            reversing: false,
            finished: false,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub(crate) fn index(&self) -> Option<usize> {
        (!self.points.is_empty()).then_some(self.index)
    }

    /// Point the agent should walk to, or `None` when there is nothing left
    /// to walk.
    pub(crate) fn current(&self) -> Option<Vec2> {
        if self.finished {
            return None;
        }
        self.points.get(self.index).copied()
    }

    pub(crate) fn advance(&mut self) {
        let len = self.points.len();
        if len == 0 {
            return;
        }

        match self.mode {
            RouteMode::Loop => self.index = (self.index + 1) % len,
            RouteMode::PingPong => {
                if len == 1 {
                    return;
                }
                if self.reversing && self.index == 0 {
                    self.reversing = false;
                } else if !self.reversing && self.index + 1 == len {
                    self.reversing = true;
                }
                if self.reversing {
                    self.index -= 1;
                } else {
                    self.index += 1;
                }
            }
            RouteMode::Once => {
                if self.index + 1 < len {
                    self.index += 1;
                } else {
                    self.finished = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(mode: RouteMode, count: usize) -> PatrolRoute {
        let points = (0..count).map(|i| Vec2::new(i as f32, 0.0)).collect();
        PatrolRoute::new(points, mode)
    }

    fn visit(route: &mut PatrolRoute, steps: usize) -> Vec<Option<usize>> {
        let mut visited = vec![route.current().map(|point| point.x as usize)];
        for _ in 0..steps {
            route.advance();
            visited.push(route.current().map(|point| point.x as usize));
        }
        visited
    }

    #[test]
    fn loop_wraps_to_first_point() {
        let mut route = route(RouteMode::Loop, 3);
        assert_eq!(
            visit(&mut route, 4),
            vec![Some(0), Some(1), Some(2), Some(0), Some(1)]
        );
    }

    #[test]
    fn ping_pong_reverses_at_both_ends() {
        let mut route = route(RouteMode::PingPong, 3);
        assert_eq!(
            visit(&mut route, 6),
            vec![Some(0), Some(1), Some(2), Some(1), Some(0), Some(1), Some(2)]
        );
    }

    #[test]
    fn once_stops_after_final_point() {
        let mut route = route(RouteMode::Once, 2);
        assert_eq!(visit(&mut route, 3), vec![Some(0), Some(1), None, None]);
        assert_eq!(route.index(), Some(1));
    }

    #[test]
    fn single_point_routes_stay_put() {
        for mode in [RouteMode::Loop, RouteMode::PingPong] {
            let mut route = route(mode, 1);
            assert_eq!(visit(&mut route, 2), vec![Some(0), Some(0), Some(0)]);
        }
    }

    #[test]
    fn empty_route_has_no_target() {
        let mut route = route(RouteMode::Loop, 0);
        route.advance();
        assert!(route.is_empty());
        assert_eq!(route.current(), None);
        assert_eq!(route.index(), None);
    }
}
