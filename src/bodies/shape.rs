use crate::error::SyncError;
use crate::math::Vector3;
use crate::Result;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// A declarative collision shape a native body is built from
///
/// Geometry construction belongs to the simulation backend; this type only
/// names the shape and its dimensions, and supplies the mass properties the
/// built-in backend needs.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum CollisionShape {
    /// An axis-aligned box given by its half extents
    Box {
        /// Half the box size along each local axis
        half_extents: Vector3,
    },

    /// A sphere given by its radius
    Sphere {
        /// The sphere radius
        radius: f32,
    },

    /// A capsule aligned with the local y axis
    Capsule {
        /// The capsule radius
        radius: f32,

        /// Half the length of the cylindrical section
        half_height: f32,
    },
}

impl CollisionShape {
    /// Creates a box shape from half extents
    pub fn new_box(x: f32, y: f32, z: f32) -> Self {
        Self::Box {
            half_extents: Vector3::new(x, y, z),
        }
    }

    /// Creates a sphere shape
    pub fn new_sphere(radius: f32) -> Self {
        Self::Sphere { radius }
    }

    /// Validates the shape dimensions
    pub fn validate(&self) -> Result<()> {
        let valid = match self {
            Self::Box { half_extents } => {
                half_extents.is_finite()
                    && half_extents.x > 0.0
                    && half_extents.y > 0.0
                    && half_extents.z > 0.0
            }
            Self::Sphere { radius } => radius.is_finite() && *radius > 0.0,
            Self::Capsule { radius, half_height } => {
                radius.is_finite() && *radius > 0.0 && half_height.is_finite() && *half_height > 0.0
            }
        };

        if valid {
            Ok(())
        } else {
            Err(SyncError::InvalidDescriptor(format!(
                "degenerate collision shape: {:?}",
                self
            )))
        }
    }

    /// Returns the volume of the shape
    pub fn get_volume(&self) -> f32 {
        match self {
            Self::Box { half_extents } => {
                8.0 * half_extents.x * half_extents.y * half_extents.z
            }
            Self::Sphere { radius } => 4.0 / 3.0 * std::f32::consts::PI * radius.powi(3),
            Self::Capsule { radius, half_height } => {
                let cylinder = std::f32::consts::PI * radius.powi(2) * (2.0 * half_height);
                let caps = 4.0 / 3.0 * std::f32::consts::PI * radius.powi(3);
                cylinder + caps
            }
        }
    }

    /// Returns the diagonal of the inertia tensor for the given mass,
    /// with the scale applied to the shape dimensions
    ///
    /// The capsule uses the cylinder formula; the caps' contribution is
    /// folded into the cylinder term.
    pub fn inertia_diagonal(&self, mass: f32, scale: Vector3) -> Vector3 {
        match self {
            Self::Box { half_extents } => {
                let x = half_extents.x * scale.x;
                let y = half_extents.y * scale.y;
                let z = half_extents.z * scale.z;
                Vector3::new(
                    mass / 3.0 * (y * y + z * z),
                    mass / 3.0 * (x * x + z * z),
                    mass / 3.0 * (x * x + y * y),
                )
            }
            Self::Sphere { radius } => {
                let r = radius * scale.x.max(scale.y).max(scale.z);
                Vector3::splat(2.0 / 5.0 * mass * r * r)
            }
            Self::Capsule { radius, half_height } => {
                let r = radius * scale.x.max(scale.z);
                let h = 2.0 * half_height * scale.y;
                let lateral = mass * (h * h / 12.0 + r * r / 4.0);
                Vector3::new(lateral, mass * r * r / 2.0, lateral)
            }
        }
    }
}

impl Default for CollisionShape {
    fn default() -> Self {
        Self::Box {
            half_extents: Vector3::splat(0.5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_shape_is_a_unit_box() {
        let shape = CollisionShape::default();
        assert_eq!(shape, CollisionShape::new_box(0.5, 0.5, 0.5));
        assert_relative_eq!(shape.get_volume(), 1.0);
    }

    #[test]
    fn validation_rejects_degenerate_dimensions() {
        assert!(CollisionShape::new_sphere(1.0).validate().is_ok());
        assert!(CollisionShape::new_sphere(0.0).validate().is_err());
        assert!(CollisionShape::new_box(1.0, -1.0, 1.0).validate().is_err());
        assert!(CollisionShape::new_sphere(f32::NAN).validate().is_err());
    }

    #[test]
    fn inertia_grows_with_scale() {
        let shape = CollisionShape::new_box(0.5, 0.5, 0.5);
        let base = shape.inertia_diagonal(1.0, Vector3::one());
        let scaled = shape.inertia_diagonal(1.0, Vector3::splat(2.0));
        assert!(scaled.x > base.x);
        assert!(scaled.y > base.y);
        assert!(scaled.z > base.z);
    }
}
