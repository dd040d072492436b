//! Bark producer with bark duration and skill cooldown countdowns.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use warden_core::{duration_from_secs, RoomId, StimulusEvent, StimulusKind, Timestamp, Vec2};

use crate::{EmitReport, StimulusBus};

/// Timing and loudness of a bark.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BarkEmitterConfig {
    /// How long a single bark lasts, in seconds.
    pub bark_seconds: f32,
    /// Time after a bark before another may be triggered, in seconds.
    pub cooldown_seconds: f32,
    /// Loudness hint attached to every bark.
    pub radius_hint: f32,
}

impl Default for BarkEmitterConfig {
    fn default() -> Self {
        Self {
            bark_seconds: 1.5,
            cooldown_seconds: 5.0,
            radius_hint: 10.0,
        }
    }
}

/// A dog (or anything else) that barks on demand, subject to a cooldown.
#[derive(Clone, Debug, PartialEq)]
pub struct BarkEmitter {
    position: Vec2,
    room: Option<RoomId>,
    config: BarkEmitterConfig,
    bark_remaining: Duration,
    cooldown_remaining: Duration,
}

impl BarkEmitter {
    /// Creates an idle emitter.
    #[must_use]
    pub fn new(position: Vec2, room: Option<RoomId>, config: BarkEmitterConfig) -> Self {
        Self {
            position,
            room,
            config,
            bark_remaining: Duration::ZERO,
            cooldown_remaining: Duration::ZERO,
        }
    }

    /// Moves the emitter, e.g. to follow a walking dog.
    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
    }

    /// Current position of the emitter.
    #[must_use]
    pub const fn position(&self) -> Vec2 {
        self.position
    }

    /// Emits a bark at `now` unless one is in progress or the cooldown is
    /// running. Returns `None` when refused.
    pub fn try_bark(&mut self, now: Timestamp, bus: &StimulusBus) -> Option<EmitReport> {
        if self.is_barking() || self.is_on_cooldown() {
            debug!(
                bark_remaining = ?self.bark_remaining,
                cooldown_remaining = ?self.cooldown_remaining,
                "bark refused"
            );
            return None;
        }

        let mut event = StimulusEvent::new(StimulusKind::Bark, self.position, now)
            .with_radius_hint(self.config.radius_hint);
        if let Some(room) = &self.room {
            event = event.in_room(room.clone());
        }

        self.bark_remaining = duration_from_secs(self.config.bark_seconds);
        self.cooldown_remaining = duration_from_secs(self.config.cooldown_seconds);
        info!(
            position = ?self.position,
            room = self.room.as_ref().map(RoomId::as_str),
            "bark"
        );
        Some(bus.emit(&event))
    }

    /// Counts both timers down by `dt`.
    pub fn tick(&mut self, dt: Duration) {
        self.bark_remaining = self.bark_remaining.saturating_sub(dt);
        self.cooldown_remaining = self.cooldown_remaining.saturating_sub(dt);
    }

    /// Reports whether a bark is still sounding.
    #[must_use]
    pub fn is_barking(&self) -> bool {
        !self.bark_remaining.is_zero()
    }

    /// Reports whether the skill cooldown is running.
    #[must_use]
    pub fn is_on_cooldown(&self) -> bool {
        !self.cooldown_remaining.is_zero()
    }

    /// Remaining cooldown as a fraction of the full cooldown, in `[0, 1]`.
    #[must_use]
    pub fn cooldown_progress(&self) -> f32 {
        let total = duration_from_secs(self.config.cooldown_seconds);
        if total.is_zero() {
            return 0.0;
        }
        (self.cooldown_remaining.as_secs_f32() / total.as_secs_f32()).clamp(0.0, 1.0)
    }
}
