/// Single-shot countdown owned by a state machine.
///
/// Replaces a blocking wait: the owner ticks it from its update loop and acts on
/// the one tick where it fires. Dropping the timer cancels it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OneShotTimer {
    remaining: f32,
    fired: bool,
}

impl OneShotTimer {
    pub fn new(duration_secs: f32) -> Self {
        Self {
            remaining: duration_secs.max(0.0),
            fired: false,
        }
    }

    /// Advance by `dt` seconds. Returns true exactly once, on the tick the
    /// countdown reaches zero.
    pub fn tick(&mut self, dt: f32) -> bool {
        if self.fired {
            return false;
        }
        self.remaining -= dt;
        if self.remaining <= 0.0 {
            self.fired = true;
            return true;
        }
        false
    }

    #[cfg(test)]
    fn remaining(&self) -> f32 {
        self.remaining.max(0.0)
    }
}
