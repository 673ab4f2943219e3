//! Snapshot interpolation for entities whose motion is simulated elsewhere.
//!
//! The master sends timestamped poses at a fixed interval. Each remote keeps
//! a short, time-ordered buffer of them and plays the motion back `buffer_time`
//! seconds behind, interpolating between the two snapshots that bracket its
//! local interpolation clock. A growing backlog speeds playback up; a long gap
//! in the stream resets the buffer instead of interpolating across it.

use std::collections::VecDeque;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// A timestamped sample that can be buffered by a [`SnapshotInterpolator`].
pub trait Snapshot {
    /// Sender's clock when the sample was taken.
    fn remote_timestamp(&self) -> f64;
    /// Receiver's clock when the sample arrived.
    fn local_timestamp(&self) -> f64;
}

/// Position and rotation of a rigid body at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseSnapshot {
    pub remote_timestamp: f64,
    pub local_timestamp: f64,
    pub position: Vec3,
    pub rotation: Quat,
}

impl PoseSnapshot {
    pub fn new(remote_timestamp: f64, local_timestamp: f64, position: Vec3, rotation: Quat) -> Self {
        Self {
            remote_timestamp,
            local_timestamp,
            position,
            rotation,
        }
    }

    /// Lerp the position and slerp the rotation. Timestamps are not interpolated.
    pub fn interpolate(from: &Self, to: &Self, t: f64) -> Self {
        let t = t as f32;
        Self {
            remote_timestamp: 0.0,
            local_timestamp: 0.0,
            position: from.position.lerp(to.position, t),
            rotation: from.rotation.slerp(to.rotation, t),
        }
    }
}

impl Snapshot for PoseSnapshot {
    fn remote_timestamp(&self) -> f64 {
        self.remote_timestamp
    }

    fn local_timestamp(&self) -> f64 {
        self.local_timestamp
    }
}

/// Tuning for both ends of the snapshot stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Seconds between snapshots sent by the master.
    pub send_interval: f64,
    /// Playback delay as a multiple of `send_interval`.
    pub buffer_time_multiplier: f64,
    /// Snapshots arriving while the buffer holds this many are dropped.
    pub buffer_size_limit: usize,
    /// Playback accelerates once the buffer holds more than this many.
    pub catchup_threshold: usize,
    /// Speed-up per buffered snapshot beyond `catchup_threshold`.
    pub catchup_multiplier: f64,
    /// A gap of this many send intervals between snapshots resets the buffer.
    pub buffer_reset_multiplier: f64,
    /// Minimum movement (metres) before the sender emits a changed snapshot.
    pub position_sensitivity: f32,
    /// Minimum rotation (degrees) before the sender emits a changed snapshot.
    pub rotation_sensitivity: f32,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            send_interval: 0.1,
            buffer_time_multiplier: 1.0,
            buffer_size_limit: 64,
            catchup_threshold: 4,
            catchup_multiplier: 0.10,
            buffer_reset_multiplier: 5.0,
            position_sensitivity: 0.001,
            rotation_sensitivity: 0.001,
        }
    }
}

impl SnapshotConfig {
    pub fn buffer_time(&self) -> f64 {
        self.send_interval * self.buffer_time_multiplier
    }

    pub fn stale_gap(&self) -> f64 {
        self.send_interval * self.buffer_reset_multiplier
    }
}

/// Receiver side: bounded, time-ordered snapshot buffer plus interpolation clock.
#[derive(Debug, Clone)]
pub struct SnapshotInterpolator<T> {
    buffer: VecDeque<T>,
    interpolation_time: f64,
    config: SnapshotConfig,
}

impl<T: Snapshot> SnapshotInterpolator<T> {
    pub fn new(config: SnapshotConfig) -> Self {
        Self {
            buffer: VecDeque::new(),
            interpolation_time: 0.0,
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[cfg(test)]
    fn interpolation_time(&self) -> f64 {
        self.interpolation_time
    }

    pub fn newest_remote_timestamp(&self) -> Option<f64> {
        self.buffer.back().map(Snapshot::remote_timestamp)
    }

    /// Clear the buffer and restart the interpolation clock.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.interpolation_time = 0.0;
    }

    /// Buffer `snapshot` if it is newer than everything already buffered and the
    /// buffer has room. Returns whether it was kept.
    pub fn insert_if_new_enough(&mut self, snapshot: T) -> bool {
        if self.buffer.len() >= self.config.buffer_size_limit {
            return false;
        }
        if let Some(newest) = self.buffer.back()
            && snapshot.remote_timestamp() <= newest.remote_timestamp()
        {
            return false;
        }
        self.buffer.push_back(snapshot);
        true
    }

    /// Handle a snapshot arriving from the master. Drops it when the buffer is
    /// full, resets first when the stream went quiet for too long.
    pub fn receive(&mut self, snapshot: T) -> bool {
        if self.buffer.len() >= self.config.buffer_size_limit {
            tracing::trace!(len = self.buffer.len(), "snapshot buffer full, dropping");
            return false;
        }
        if let Some(newest) = self.newest_remote_timestamp()
            && newest + self.config.stale_gap() < snapshot.remote_timestamp()
        {
            tracing::trace!(
                gap = snapshot.remote_timestamp() - newest,
                "snapshot stream went stale, resetting"
            );
            self.reset();
        }
        self.insert_if_new_enough(snapshot)
    }

    /// At least `amount` snapshots arrived at or before `threshold` (local clock).
    fn has_amount_older_than(&self, threshold: f64, amount: usize) -> bool {
        amount > 0
            && self
                .buffer
                .get(amount - 1)
                .is_some_and(|s| s.local_timestamp() <= threshold)
    }

    fn catchup(&self) -> f64 {
        let excess = self.buffer.len().saturating_sub(self.config.catchup_threshold);
        excess as f64 * self.config.catchup_multiplier
    }

    fn first_delta(&self) -> Option<f64> {
        let first = self.buffer.front()?;
        let second = self.buffer.get(1)?;
        Some(second.remote_timestamp() - first.remote_timestamp())
    }

    /// Advance the interpolation clock by `delta_time` and return the pose
    /// between the two snapshots bracketing it, or `None` while fewer than two
    /// snapshots are older than the playback delay.
    pub fn compute<F>(&mut self, now: f64, delta_time: f64, interpolate: F) -> Option<T>
    where
        F: Fn(&T, &T, f64) -> T,
    {
        let threshold = now - self.config.buffer_time();
        if !self.has_amount_older_than(threshold, 2) {
            return None;
        }

        let delta_time = delta_time * (1.0 + self.catchup());
        self.interpolation_time += delta_time;

        let mut delta = self.first_delta()?;
        while self.interpolation_time >= delta && self.has_amount_older_than(threshold, 3) {
            self.interpolation_time -= delta;
            self.buffer.pop_front();
            delta = self.first_delta()?;
        }

        let t = if delta > 0.0 {
            (self.interpolation_time / delta).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let computed = interpolate(self.buffer.front()?, self.buffer.get(1)?, t);

        // Without a third snapshot to move on to, hold at the second one.
        if !self.has_amount_older_than(threshold, 3) {
            self.interpolation_time = self.interpolation_time.min(delta);
        }
        Some(computed)
    }
}

/// Sender side: emits a pose only when it moved beyond the configured
/// sensitivity since the last *sent* pose, plus at most one "unchanged" update
/// in a row so the receiver learns the body settled.
#[derive(Debug, Clone)]
pub struct SnapshotSender {
    last_sent: Option<(Vec3, Quat)>,
    sent_unchanged: bool,
    position_sensitivity: f32,
    rotation_sensitivity: f32,
}

impl SnapshotSender {
    pub fn new(config: &SnapshotConfig) -> Self {
        Self {
            last_sent: None,
            sent_unchanged: false,
            position_sensitivity: config.position_sensitivity,
            rotation_sensitivity: config.rotation_sensitivity,
        }
    }

    fn unchanged(&self, position: Vec3, rotation: Quat) -> bool {
        let Some((last_pos, last_rot)) = self.last_sent else {
            return false;
        };
        let moved = last_pos.distance_squared(position)
            > self.position_sensitivity * self.position_sensitivity;
        let turned = last_rot.angle_between(rotation).to_degrees() > self.rotation_sensitivity;
        !moved && !turned
    }

    /// Decide whether this pose goes on the wire, recording it if so.
    pub fn should_send(&mut self, position: Vec3, rotation: Quat) -> bool {
        let unchanged = self.unchanged(position, rotation);
        if unchanged && self.sent_unchanged {
            return false;
        }
        if unchanged {
            self.sent_unchanged = true;
        } else {
            self.sent_unchanged = false;
            self.last_sent = Some((position, rotation));
        }
        true
    }

    pub fn reset(&mut self) {
        self.last_sent = None;
        self.sent_unchanged = false;
    }
}
