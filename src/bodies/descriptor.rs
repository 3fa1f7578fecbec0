use crate::bodies::CollisionShape;
use crate::error::SyncError;
use crate::math::Vector3;
use crate::Result;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// The declarative configuration a native rigid body is built from
///
/// Owned by a `RigidBodyProxy`; the proxy's setters are the only mutation
/// path and decide whether a change needs a rebuild (mass, shape) or a
/// property push (everything else). The field set is the canonical schema
/// for asset persistence.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct RigidBodyDescriptor {
    /// The body's mass; 0 means static (immovable)
    pub mass: f32,

    /// Friction coefficient
    pub friction: f32,

    /// Damping factor for linear velocity
    pub linear_damping: f32,

    /// Damping factor for angular velocity
    pub angular_damping: f32,

    /// The "bouncyness" of the body; best performance at 0
    pub restitution: f32,

    /// Linear velocity below which the body may be deactivated
    pub linear_sleep_threshold: f32,

    /// Angular velocity below which the body may be deactivated
    pub angular_sleep_threshold: f32,

    /// Scale applied to the collision shape
    pub local_scale: Vector3,

    /// The collision shape the body is built with
    pub shape: CollisionShape,
}

impl RigidBodyDescriptor {
    /// Creates a descriptor with the given mass and shape, other
    /// properties at their defaults
    pub fn new(mass: f32, shape: CollisionShape) -> Self {
        Self {
            mass,
            shape,
            ..Self::default()
        }
    }

    /// Returns whether the descriptor describes a static body
    pub fn is_static(&self) -> bool {
        self.mass == 0.0
    }

    /// Validates every field
    ///
    /// Negative mass is rejected, not clamped; mass 0 is the static case.
    pub fn validate(&self) -> Result<()> {
        if !self.mass.is_finite() || self.mass < 0.0 {
            return Err(SyncError::InvalidDescriptor(format!(
                "mass must be finite and non-negative, got {}",
                self.mass
            )));
        }
        for (name, value) in [
            ("friction", self.friction),
            ("linear_damping", self.linear_damping),
            ("angular_damping", self.angular_damping),
            ("restitution", self.restitution),
            ("linear_sleep_threshold", self.linear_sleep_threshold),
            ("angular_sleep_threshold", self.angular_sleep_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SyncError::InvalidDescriptor(format!(
                    "{} must be finite and non-negative, got {}",
                    name, value
                )));
            }
        }
        if !self.local_scale.is_finite()
            || self.local_scale.x <= 0.0
            || self.local_scale.y <= 0.0
            || self.local_scale.z <= 0.0
        {
            return Err(SyncError::InvalidDescriptor(format!(
                "local_scale components must be positive, got {}",
                self.local_scale
            )));
        }
        self.shape.validate()
    }
}

impl Default for RigidBodyDescriptor {
    fn default() -> Self {
        Self {
            mass: 1.0,
            friction: 1.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            restitution: 0.0,
            linear_sleep_threshold: 0.8,
            angular_sleep_threshold: 1.0,
            local_scale: Vector3::one(),
            shape: CollisionShape::default(),
        }
    }
}
