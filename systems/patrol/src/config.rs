//! Tunables for a patrol agent, loadable from TOML.
//!
//! Every section falls back to its defaults, so a file only needs to name the
//! values it overrides:
//!
//! ```toml
//! [vision]
//! view_distance = 8.0
//!
//! [route]
//! mode = "ping_pong"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use warden_core::duration_from_secs;
use warden_system_perception::VisionCone;

/// Failure to load or validate an [`AgentConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document could not be parsed.
    #[error("failed to parse agent config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A tunable is NaN, infinite or negative.
    #[error("agent tunable `{name}` must be finite and non-negative, got {value}")]
    InvalidTunable {
        /// Dotted path of the offending field.
        name: &'static str,
        /// Value found in the configuration.
        value: f32,
    },
}

/// How the agent walks its patrol points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteMode {
    /// Returns to the first point after the last one.
    #[default]
    Loop,
    /// Reverses direction at either end of the route.
    PingPong,
    /// Walks the route once and idles at the final point.
    Once,
}

/// Speeds and arrival tolerances.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Walking speed along the patrol route, in world units per second.
    pub patrol_speed: f32,
    /// Speed while travelling to an investigation anchor.
    pub investigate_speed: f32,
    /// Speed while pursuing the player.
    pub chase_speed: f32,
    /// Distance at which a waypoint counts as reached.
    pub reach_tolerance: f32,
    /// How far a destination may drift before the cached path is replaced.
    pub repath_tolerance: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            patrol_speed: 2.0,
            investigate_speed: 2.0,
            chase_speed: 3.0,
            reach_tolerance: 0.1,
            repath_tolerance: 0.5,
        }
    }
}

/// Route traversal and the idle sweep performed at each route point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Traversal order.
    pub mode: RouteMode,
    /// Time spent waiting at each route point, in seconds.
    pub wait_seconds: f32,
    /// Half-angle of the facing sweep while waiting, in degrees.
    pub sweep_degrees: f32,
    /// Duration of one full sweep oscillation, in seconds.
    pub sweep_period_seconds: f32,
}

impl RouteConfig {
    /// Waiting time as a duration.
    #[must_use]
    pub fn wait(&self) -> Duration {
        duration_from_secs(self.wait_seconds)
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            mode: RouteMode::Loop,
            wait_seconds: 1.5,
            sweep_degrees: 45.0,
            sweep_period_seconds: 3.0,
        }
    }
}

/// Vision cone and polling cadence.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Full opening angle of the view cone, in degrees.
    pub fov_degrees: f32,
    /// Farthest distance at which the player is seen.
    pub view_distance: f32,
    /// Time between perception polls, in seconds.
    pub poll_interval_seconds: f32,
}

impl VisionConfig {
    /// View cone used for perception queries.
    #[must_use]
    pub const fn cone(&self) -> VisionCone {
        VisionCone {
            fov_degrees: self.fov_degrees,
            view_distance: self.view_distance,
        }
    }

    /// Polling cadence as a duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        duration_from_secs(self.poll_interval_seconds)
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        let cone = VisionCone::default();
        Self {
            fov_degrees: cone.fov_degrees,
            view_distance: cone.view_distance,
            poll_interval_seconds: 0.2,
        }
    }
}

/// Hearing radii per stimulus kind and the bark suppression window.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HearingConfig {
    /// Farthest distance at which a bark is heard.
    pub bark_radius: f32,
    /// Farthest distance at which a puzzle trigger is heard.
    pub puzzle_radius: f32,
    /// Puzzle noise emitted within this many seconds of the last bark is
    /// ignored.
    pub bark_suppression_seconds: f32,
}

impl HearingConfig {
    /// Suppression window as a duration.
    #[must_use]
    pub fn bark_suppression(&self) -> Duration {
        duration_from_secs(self.bark_suppression_seconds)
    }
}

impl Default for HearingConfig {
    fn default() -> Self {
        Self {
            bark_radius: 15.0,
            puzzle_radius: 12.0,
            bark_suppression_seconds: 3.0,
        }
    }
}

/// Investigation of puzzle noise.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvestigateConfig {
    /// Distance from the noise at which anchor candidates are sampled.
    pub anchor_offset: f32,
    /// Number of candidates, evenly spaced around the noise.
    pub candidate_count: u32,
    /// Radius, in cells, of the free-cell search used when every candidate
    /// is blocked.
    pub free_cell_search_radius: u32,
    /// Time spent searching at the anchor, in seconds.
    pub timeout_seconds: f32,
    /// Turning speed while searching, in degrees per second.
    pub rotate_degrees_per_second: f32,
}

impl InvestigateConfig {
    /// Search time as a duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        duration_from_secs(self.timeout_seconds)
    }
}

impl Default for InvestigateConfig {
    fn default() -> Self {
        Self {
            anchor_offset: 1.0,
            candidate_count: 8,
            free_cell_search_radius: 4,
            timeout_seconds: 3.0,
            rotate_degrees_per_second: 90.0,
        }
    }
}

/// Reaction to a bark.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Time spent alerted before returning to the route, in seconds.
    pub duration_seconds: f32,
    /// Half-angle of the scanning rotation around the bark direction, in
    /// degrees.
    pub scan_degrees: f32,
    /// Duration of one full scan oscillation, in seconds.
    pub scan_period_seconds: f32,
}

impl AlertConfig {
    /// Alert time as a duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        duration_from_secs(self.duration_seconds)
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 2.5,
            scan_degrees: 60.0,
            scan_period_seconds: 2.0,
        }
    }
}

/// Pursuit of a spotted player.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaseConfig {
    /// Time between path recomputations toward the player, in seconds.
    pub repath_interval_seconds: f32,
    /// Distance at which the player is caught.
    pub catch_distance: f32,
    /// Distance beyond which the agent gives up.
    pub max_chase_distance: f32,
    /// Time without seeing the player before the agent gives up, in seconds.
    pub lose_sight_seconds: f32,
    /// Search the last seen position instead of returning to the route after
    /// losing sight of the player.
    pub investigate_after_losing_sight: bool,
}

impl ChaseConfig {
    /// Path recompute cadence as a duration.
    #[must_use]
    pub fn repath_interval(&self) -> Duration {
        duration_from_secs(self.repath_interval_seconds)
    }

    /// Lose-sight timeout as a duration.
    #[must_use]
    pub fn lose_sight(&self) -> Duration {
        duration_from_secs(self.lose_sight_seconds)
    }
}

impl Default for ChaseConfig {
    fn default() -> Self {
        Self {
            repath_interval_seconds: 0.5,
            catch_distance: 1.2,
            max_chase_distance: 12.0,
            lose_sight_seconds: 3.0,
            investigate_after_losing_sight: false,
        }
    }
}

/// Complete tunable set for one patrol agent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Speeds and tolerances.
    pub movement: MovementConfig,
    /// Route traversal and waiting sweep.
    pub route: RouteConfig,
    /// Vision cone and polling.
    pub vision: VisionConfig,
    /// Hearing radii and suppression.
    pub hearing: HearingConfig,
    /// Puzzle noise investigation.
    pub investigate: InvestigateConfig,
    /// Bark reaction.
    pub alert: AlertConfig,
    /// Player pursuit.
    pub chase: ChaseConfig,
}

impl AgentConfig {
    /// Parses a TOML document and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::InvalidTunable`] for out-of-range values.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects NaN, infinite and negative tunables.
    ///
    /// # Errors
    ///
    /// Returns the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tunables = [
            ("movement.patrol_speed", self.movement.patrol_speed),
            ("movement.investigate_speed", self.movement.investigate_speed),
            ("movement.chase_speed", self.movement.chase_speed),
            ("movement.reach_tolerance", self.movement.reach_tolerance),
            ("movement.repath_tolerance", self.movement.repath_tolerance),
            ("route.wait_seconds", self.route.wait_seconds),
            ("route.sweep_degrees", self.route.sweep_degrees),
            ("route.sweep_period_seconds", self.route.sweep_period_seconds),
            ("vision.fov_degrees", self.vision.fov_degrees),
            ("vision.view_distance", self.vision.view_distance),
            ("vision.poll_interval_seconds", self.vision.poll_interval_seconds),
            ("hearing.bark_radius", self.hearing.bark_radius),
            ("hearing.puzzle_radius", self.hearing.puzzle_radius),
            (
                "hearing.bark_suppression_seconds",
                self.hearing.bark_suppression_seconds,
            ),
            ("investigate.anchor_offset", self.investigate.anchor_offset),
            ("investigate.timeout_seconds", self.investigate.timeout_seconds),
            (
                "investigate.rotate_degrees_per_second",
                self.investigate.rotate_degrees_per_second,
            ),
            ("alert.duration_seconds", self.alert.duration_seconds),
            ("alert.scan_degrees", self.alert.scan_degrees),
            ("alert.scan_period_seconds", self.alert.scan_period_seconds),
            ("chase.repath_interval_seconds", self.chase.repath_interval_seconds),
            ("chase.catch_distance", self.chase.catch_distance),
            ("chase.max_chase_distance", self.chase.max_chase_distance),
            ("chase.lose_sight_seconds", self.chase.lose_sight_seconds),
        ];

        for (name, value) in tunables {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidTunable { name, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AgentConfig::from_toml("").expect("parse");
        assert_eq!(config, AgentConfig::default());
        assert_eq!(config.vision.view_distance, 6.0);
        assert_eq!(config.vision.fov_degrees, 90.0);
        assert_eq!(config.route.mode, RouteMode::Loop);
    }

    #[test]
    fn partial_sections_override_single_fields() {
        let config = AgentConfig::from_toml(
            r#"
            [route]
            mode = "ping_pong"

            [hearing]
            bark_radius = 20.0
            "#,
        )
        .expect("parse");

        assert_eq!(config.route.mode, RouteMode::PingPong);
        assert_eq!(config.route.wait_seconds, 1.5);
        assert_eq!(config.hearing.bark_radius, 20.0);
        assert_eq!(config.hearing.puzzle_radius, 12.0);
    }

    #[test]
    fn negative_tunable_is_rejected() {
        let error = AgentConfig::from_toml("[chase]\ncatch_distance = -1.0").expect_err("invalid");
        match error {
            ConfigError::InvalidTunable { name, value } => {
                assert_eq!(name, "chase.catch_distance");
                assert_eq!(value, -1.0);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn non_finite_tunable_is_rejected() {
        let mut config = AgentConfig::default();
        config.vision.view_distance = f32::INFINITY;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTunable {
                name: "vision.view_distance",
                ..
            })
        ));
    }

    #[test]
    fn malformed_document_reports_parse_error() {
        let error = AgentConfig::from_toml("[route\nmode = 3").expect_err("invalid");
        assert!(matches!(error, ConfigError::Parse(_)));
    }

    #[test]
    fn durations_convert_from_seconds() {
        let config = AgentConfig::default();
        assert_eq!(config.route.wait(), Duration::from_millis(1500));
        assert_eq!(config.alert.duration(), Duration::from_millis(2500));
        assert_eq!(config.chase.lose_sight(), Duration::from_secs(3));
    }
}
