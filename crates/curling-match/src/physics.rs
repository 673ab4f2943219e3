use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use curling_core::math::planar_speed;

use crate::config::StoneTuning;

pub const GRAVITY: f32 = 9.81;

/// Yaw rates below this (rad/s) are treated as at rest.
const ANGULAR_SLEEP: f32 = 1e-3;

/// A disc sliding on the ice. Motion is planar (XZ); rotation is yaw only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBody {
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    /// Yaw rate around +Y, radians per second.
    pub angular_velocity: f32,
    pub mass: f32,
    pub radius: f32,
    /// Ice friction coefficient currently under this body.
    pub ice_friction: f32,
    pub angular_drag: f32,
    /// Kinematic bodies are not moved by forces, friction or collisions.
    pub kinematic: bool,
    force: Vec3,
    torque: f32,
}

impl RigidBody {
    pub fn new(position: Vec3, rotation: Quat, tuning: &StoneTuning) -> Self {
        Self {
            position,
            rotation,
            velocity: Vec3::ZERO,
            angular_velocity: 0.0,
            mass: tuning.mass,
            radius: tuning.radius,
            ice_friction: tuning.default_friction,
            angular_drag: tuning.default_angular_drag,
            kinematic: false,
            force: Vec3::ZERO,
            torque: 0.0,
        }
    }

    pub fn speed(&self) -> f32 {
        planar_speed(self.velocity)
    }

    /// Moment of inertia of a uniform disc about its vertical axis.
    pub fn inertia(&self) -> f32 {
        0.5 * self.mass * self.radius * self.radius
    }

    /// Accumulate a force for the next step. Only the planar part is used.
    pub fn add_force(&mut self, force: Vec3) {
        self.force += Vec3::new(force.x, 0.0, force.z);
    }

    /// Accumulate a torque for the next step. Only the yaw component is used.
    pub fn add_torque(&mut self, torque: Vec3) {
        self.torque += torque.y;
    }

    pub fn stop(&mut self) {
        self.velocity = Vec3::ZERO;
        self.angular_velocity = 0.0;
        self.force = Vec3::ZERO;
        self.torque = 0.0;
    }

    fn integrate(&mut self, dt: f32, stone_friction: f32) {
        if self.kinematic {
            self.force = Vec3::ZERO;
            self.torque = 0.0;
            return;
        }

        self.velocity += self.force / self.mass * dt;
        self.velocity.y = 0.0;
        self.angular_velocity += self.torque / self.inertia() * dt;
        self.force = Vec3::ZERO;
        self.torque = 0.0;

        // Coulomb friction with the two surfaces' coefficients averaged.
        let mu = (self.ice_friction + stone_friction) * 0.5;
        let decel = mu * GRAVITY * dt;
        let speed = self.speed();
        if speed <= decel {
            self.velocity = Vec3::ZERO;
        } else {
            self.velocity -= self.velocity / speed * decel;
        }

        self.angular_velocity *= (1.0 - self.angular_drag * dt).clamp(0.0, 1.0);
        if self.angular_velocity.abs() < ANGULAR_SLEEP {
            self.angular_velocity = 0.0;
        }

        self.position += self.velocity * dt;
        if self.angular_velocity != 0.0 {
            self.rotation =
                (Quat::from_rotation_y(self.angular_velocity * dt) * self.rotation).normalize();
        }
    }
}

/// Steps every body on the sheet and resolves stone-on-stone hits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IcePhysics {
    pub stone_friction: f32,
    pub restitution: f32,
}

impl IcePhysics {
    pub fn new(tuning: &StoneTuning) -> Self {
        Self {
            stone_friction: tuning.stone_friction,
            restitution: tuning.restitution,
        }
    }

    pub fn step(&self, bodies: &mut [&mut RigidBody], dt: f32) {
        for body in bodies.iter_mut() {
            body.integrate(dt, self.stone_friction);
        }
        for i in 0..bodies.len() {
            let (head, tail) = bodies.split_at_mut(i + 1);
            let a = &mut head[i];
            for b in tail.iter_mut() {
                self.collide(a, b);
            }
        }
    }

    /// Resolve one pair of discs. Impulses assume equal masses.
    fn collide(&self, a: &mut RigidBody, b: &mut RigidBody) {
        if a.kinematic || b.kinematic {
            return;
        }
        let mut delta = b.position - a.position;
        delta.y = 0.0;
        let min_dist = a.radius + b.radius;
        let dist_sq = delta.length_squared();
        if dist_sq >= min_dist * min_dist || dist_sq == 0.0 {
            return;
        }
        let dist = dist_sq.sqrt();
        let normal = delta / dist;

        let overlap = min_dist - dist;
        a.position -= normal * (overlap * 0.5);
        b.position += normal * (overlap * 0.5);

        let closing = (a.velocity - b.velocity).dot(normal);
        if closing <= 0.0 {
            return;
        }
        let impulse = normal * (closing * (1.0 + self.restitution) * 0.5);
        a.velocity -= impulse;
        b.velocity += impulse;
    }
}
