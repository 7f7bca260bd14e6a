use crate::event::WorldEvent;
use crate::world::World;
use std::fmt;

/// Error type systems report back to the world.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Handle to a registered system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemId(pub u32);

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "system#{}", self.0)
    }
}

/// Which pipeline a system runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Runs on [`World::update`], once per simulation tick.
    Update,
    /// Runs on [`World::render`], once per drawn frame.
    Render,
}

/// Timing handed to every system invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    /// Seconds since the previous call of the same pipeline.
    pub delta: f32,
    /// Timestamp passed by the caller, in milliseconds.
    pub time: f64,
}

/// Per-frame behavior bound to one [`World`].
///
/// A system is taken out of the world while one of its hooks runs, so it can
/// receive `&mut World` freely. Events published from inside a hook are not
/// delivered back to the system that published them.
pub trait System {
    fn name(&self) -> &'static str;

    fn stage(&self) -> Stage;

    /// Called once on registration. Subscribe to events here.
    fn init(&mut self, _world: &mut World, _id: SystemId) {}

    fn run(&mut self, world: &mut World, frame: Frame) -> Result<(), BoxError>;

    /// Called for every event kind this system subscribed to.
    fn on_event(&mut self, _world: &mut World, _event: &WorldEvent) {}

    /// Called exactly once when the system is removed from the world.
    fn cleanup(&mut self, _world: &mut World) {}
}

/// Derives frame deltas from caller timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameClock {
    previous: f64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to `now` (milliseconds). A timestamp older than the previous
    /// one yields a zero delta.
    pub fn tick(&mut self, now: f64) -> Frame {
        let elapsed = now - self.previous;
        if elapsed < 0.0 {
            tracing::debug!(now, previous = self.previous, "frame timestamp went backwards");
        }
        self.previous = now;
        Frame {
            delta: (elapsed.max(0.0) * 0.001) as f32,
            time: now,
        }
    }

    pub fn previous(&self) -> f64 {
        self.previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_seeded_at_zero() {
        let mut clock = FrameClock::new();
        let frame = clock.tick(16.0);
        assert!((frame.delta - 0.016).abs() < 1e-6);
        assert_eq!(frame.time, 16.0);
    }

    #[test]
    fn clock_measures_between_ticks() {
        let mut clock = FrameClock::new();
        clock.tick(1000.0);
        let frame = clock.tick(1500.0);
        assert!((frame.delta - 0.5).abs() < 1e-6);
    }

    #[test]
    fn clock_clamps_backwards_time() {
        let mut clock = FrameClock::new();
        clock.tick(100.0);
        let frame = clock.tick(50.0);
        assert_eq!(frame.delta, 0.0);
        assert_eq!(clock.previous(), 50.0);
    }
}
